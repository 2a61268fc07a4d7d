//! Target records and flash methods

use crate::error::{ErrorKind, FlashError, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Class of interface hardware on a board
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceType {
    /// DAPLink mass-storage interface firmware
    Daplink,
    /// SEGGER J-Link probe
    Jlink,
    /// ST-LINK probe
    Stlink,
    /// Anything else the enumerator reports
    Other,
}

impl DeviceType {
    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daplink => "daplink",
            Self::Jlink => "jlink",
            Self::Stlink => "stlink",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = FlashError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "daplink" => Ok(Self::Daplink),
            "jlink" => Ok(Self::Jlink),
            "stlink" => Ok(Self::Stlink),
            "other" => Ok(Self::Other),
            _ => Err(FlashError::new(
                ErrorKind::MisuseCmd,
                format!("Unknown device type: {}", s),
            )),
        }
    }
}

/// How an operation reaches the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    /// Copy onto the mass-storage volume
    Simple,
    /// In-process CMSIS-DAP probe library (the `pyocd` method name)
    Pyocd,
    /// SEGGER J-Link commander subprocess
    Jlink,
    /// ST-LINK tool subprocess
    Stlink,
    /// Atmel EDBG tool subprocess
    Edbg,
}

impl Method {
    /// All methods, in CLI order
    pub const ALL: [Method; 5] = [
        Method::Simple,
        Method::Pyocd,
        Method::Jlink,
        Method::Stlink,
        Method::Edbg,
    ];

    /// Name accepted on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Pyocd => "pyocd",
            Self::Jlink => "jlink",
            Self::Stlink => "stlink",
            Self::Edbg => "edbg",
        }
    }

    /// Whether this method drives a debug probe rather than a volume
    pub fn needs_probe(&self) -> bool {
        !matches!(self, Self::Simple)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = FlashError;

    fn from_str(s: &str) -> Result<Self> {
        Method::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| FlashError::new(ErrorKind::MisuseCmd, format!("Unknown method: {}", s)))
    }
}

/// One physical board as seen by the host
///
/// `mount_point` and `serial_port` can change while a flash is in progress;
/// they are always re-resolved by `target_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRecord {
    /// Stable board identifier
    pub target_id: String,
    /// Interface hardware class
    pub device_type: DeviceType,
    /// Vendor/board name
    pub platform_name: String,
    /// Root of the exposed volume
    pub mount_point: Option<PathBuf>,
    /// CDC serial port
    pub serial_port: Option<String>,
    /// USB serial number of an attached debug probe
    pub probe_usb_id: Option<String>,
}

impl TargetRecord {
    /// A DAPLink target exposing a volume and, optionally, a serial port
    pub fn daplink(
        target_id: impl Into<String>,
        platform_name: impl Into<String>,
        mount_point: impl Into<PathBuf>,
        serial_port: Option<String>,
    ) -> Self {
        Self {
            target_id: target_id.into(),
            device_type: DeviceType::Daplink,
            platform_name: platform_name.into(),
            mount_point: Some(mount_point.into()),
            serial_port,
            probe_usb_id: None,
        }
    }

    /// A target reachable only through a debug probe
    pub fn probe(
        target_id: impl Into<String>,
        device_type: DeviceType,
        platform_name: impl Into<String>,
        probe_usb_id: impl Into<String>,
    ) -> Self {
        Self {
            target_id: target_id.into(),
            device_type,
            platform_name: platform_name.into(),
            mount_point: None,
            serial_port: None,
            probe_usb_id: Some(probe_usb_id.into()),
        }
    }

    /// Check the record invariants
    pub fn validate(&self) -> Result<()> {
        if self.target_id.is_empty() {
            return Err(FlashError::new(
                ErrorKind::TargetIdMissing,
                "Target record has an empty target id",
            ));
        }
        if self.mount_point.is_none() && self.probe_usb_id.is_none() {
            return Err(FlashError::new(
                ErrorKind::CouldNotMapDevice,
                format!(
                    "Target {} has neither a mount point nor a probe",
                    self.target_id
                ),
            ));
        }
        Ok(())
    }

    /// Mount point, or `mount_point_missing`
    pub fn require_mount_point(&self) -> Result<&PathBuf> {
        self.mount_point.as_ref().ok_or_else(|| {
            FlashError::new(
                ErrorKind::MountPointMissing,
                format!("Target {} has no mount point", self.target_id),
            )
        })
    }
}

impl fmt::Display for TargetRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}", self.target_id, self.platform_name)?;
        if let Some(mount) = &self.mount_point {
            write!(f, ", {}", mount.display())?;
        }
        if let Some(port) = &self.serial_port {
            write!(f, ", {}", port)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_parse() {
        assert_eq!("simple".parse::<Method>().unwrap(), Method::Simple);
        assert_eq!("PyOCD".parse::<Method>().unwrap(), Method::Pyocd);
        assert_eq!(
            "avrdude".parse::<Method>().unwrap_err().kind,
            ErrorKind::MisuseCmd
        );
    }

    #[test]
    fn test_validate() {
        let t = TargetRecord::daplink("0240ABC", "K64F", "/mnt/x", None);
        assert!(t.validate().is_ok());

        let mut empty = t.clone();
        empty.target_id.clear();
        assert_eq!(empty.validate().unwrap_err().kind, ErrorKind::TargetIdMissing);

        let mut orphan = t;
        orphan.mount_point = None;
        assert_eq!(
            orphan.validate().unwrap_err().kind,
            ErrorKind::CouldNotMapDevice
        );
    }

    #[test]
    fn test_probe_target() {
        let t = TargetRecord::probe("683", DeviceType::Jlink, "NRF52_DK", "000683");
        assert!(t.validate().is_ok());
        assert_eq!(
            t.require_mount_point().unwrap_err().kind,
            ErrorKind::MountPointMissing
        );
    }
}
