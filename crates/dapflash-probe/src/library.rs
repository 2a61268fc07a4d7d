//! In-process back-end over the probe-rs library
//!
//! This is the `pyocd` method: it drives CMSIS-DAP (DAPLink), J-Link and
//! ST-LINK probes directly. Without the `probe-rs` feature the back-end is
//! still listed but reports itself as not installed.

use crate::chips::{chip_for_platform, platform_names};
use crate::{probe_serial, require_method};
#[cfg(feature = "probe-rs")]
use crate::error::ProbeError;
use dapflash_core::{
    Enumerator, ErrorKind, FirmwareImage, FlashError, FlashOptions, Flasher, Method, Result,
    TargetRecord,
};
use std::sync::Arc;

const METHODS: &[Method] = &[Method::Pyocd];

/// probe-rs back-end
pub struct ProbeRsFlasher {
    enumerator: Arc<dyn Enumerator>,
}

impl ProbeRsFlasher {
    /// Back-end listing probes through `enumerator`
    pub fn new(enumerator: Arc<dyn Enumerator>) -> Self {
        Self { enumerator }
    }

    fn chip_name(target: &TargetRecord) -> Result<&'static str> {
        chip_for_platform(&target.platform_name)
            .map(|c| c.probe_rs_target)
            .ok_or_else(|| {
                FlashError::new(
                    ErrorKind::UnsupportedPlatform,
                    format!("No probe-rs target known for {}", target.platform_name),
                )
            })
    }
}

#[cfg(feature = "probe-rs")]
mod session {
    use super::*;
    use ::probe_rs::flashing::{self, Format};
    use ::probe_rs::probe::list::Lister;
    use ::probe_rs::{Permissions, Session};
    use std::path::Path;

    fn library(e: impl std::fmt::Display) -> ProbeError {
        ProbeError::LibraryInternal(e.to_string())
    }

    pub(super) fn attach(serial: &str, chip: &str) -> std::result::Result<Session, ProbeError> {
        let lister = Lister::new();
        let info = lister
            .list_all()
            .into_iter()
            .find(|p| p.serial_number.as_deref() == Some(serial))
            .ok_or_else(|| ProbeError::Library(format!("Probe {} not found", serial)))?;
        let probe = info.open().map_err(library)?;
        probe
            .attach(chip, Permissions::default())
            .map_err(|e| ProbeError::Library(e.to_string()))
    }

    pub(super) fn download(
        session: &mut Session,
        path: &Path,
        hex: bool,
        base: u32,
    ) -> std::result::Result<(), ProbeError> {
        let format = if hex {
            Format::Hex
        } else {
            Format::Bin(flashing::BinOptions {
                base_address: Some(u64::from(base)),
                skip: 0,
            })
        };
        flashing::download_file(session, path, format).map_err(library)
    }

    pub(super) fn erase(session: &mut Session) -> std::result::Result<(), ProbeError> {
        flashing::erase_all(session, None).map_err(library)
    }

    pub(super) fn reset(session: &mut Session) -> std::result::Result<(), ProbeError> {
        session.core(0).and_then(|mut core| core.reset()).map_err(library)
    }
}

impl Flasher for ProbeRsFlasher {
    fn name(&self) -> &'static str {
        "probe-rs"
    }

    fn methods(&self) -> &'static [Method] {
        METHODS
    }

    fn supported_targets(&self) -> Vec<String> {
        platform_names()
    }

    fn available_devices(&self) -> Result<Vec<TargetRecord>> {
        Ok(self
            .enumerator
            .list_devices()?
            .into_iter()
            .filter(|t| self.can_flash(t))
            .collect())
    }

    fn can_flash(&self, target: &TargetRecord) -> bool {
        target.probe_usb_id.is_some()
    }

    fn is_executable_installed(&self) -> bool {
        cfg!(feature = "probe-rs")
    }

    #[cfg(feature = "probe-rs")]
    fn flash(
        &self,
        image: &FirmwareImage,
        target: &TargetRecord,
        method: Method,
        options: &FlashOptions,
    ) -> Result<TargetRecord> {
        use dapflash_core::image::ImageExtension;

        require_method(self.name(), METHODS, method)?;
        let serial = probe_serial(target)?;
        let chip = Self::chip_name(target)?;
        let extension = image.extension();
        if !matches!(extension, ImageExtension::Bin | ImageExtension::Hex) {
            return Err(ProbeError::UnsupportedImage(extension.to_string()).into());
        }
        let base = chip_for_platform(&target.platform_name)
            .map(|c| c.flash_base)
            .unwrap_or(0);

        log::info!("Programming {} through probe {}", chip, serial);
        let mut session = session::attach(serial, chip)?;
        session::download(
            &mut session,
            image.path(),
            extension == ImageExtension::Hex,
            base,
        )?;
        if !options.no_reset {
            session::reset(&mut session)?;
        }
        Ok(target.clone())
    }

    #[cfg(not(feature = "probe-rs"))]
    fn flash(
        &self,
        _image: &FirmwareImage,
        target: &TargetRecord,
        method: Method,
        _options: &FlashOptions,
    ) -> Result<TargetRecord> {
        require_method(self.name(), METHODS, method)?;
        probe_serial(target)?;
        Self::chip_name(target)?;
        Err(not_built())
    }

    #[cfg(feature = "probe-rs")]
    fn erase(&self, target: &TargetRecord, options: &FlashOptions) -> Result<TargetRecord> {
        let serial = probe_serial(target)?;
        let chip = Self::chip_name(target)?;
        let mut session = session::attach(serial, chip)?;
        session::erase(&mut session)?;
        if !options.no_reset {
            session::reset(&mut session)?;
        }
        Ok(target.clone())
    }

    #[cfg(not(feature = "probe-rs"))]
    fn erase(&self, target: &TargetRecord, _options: &FlashOptions) -> Result<TargetRecord> {
        probe_serial(target)?;
        Err(not_built())
    }

    #[cfg(feature = "probe-rs")]
    fn reset(&self, target: &TargetRecord) -> Result<TargetRecord> {
        let serial = probe_serial(target)?;
        let chip = Self::chip_name(target)?;
        let mut session = session::attach(serial, chip)?;
        session::reset(&mut session)?;
        Ok(target.clone())
    }

    #[cfg(not(feature = "probe-rs"))]
    fn reset(&self, target: &TargetRecord) -> Result<TargetRecord> {
        probe_serial(target)?;
        Err(not_built())
    }
}

#[cfg(not(feature = "probe-rs"))]
fn not_built() -> FlashError {
    FlashError::new(
        ErrorKind::ImplementationMissing,
        "dapflash was built without the probe-rs feature",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use dapflash_core::enumerate::StaticEnumerator;
    use dapflash_core::DeviceType;

    fn flasher() -> ProbeRsFlasher {
        ProbeRsFlasher::new(Arc::new(StaticEnumerator::default()))
    }

    #[test]
    fn test_requires_probe() {
        let target = TargetRecord::daplink("Z", "K64F", "/mnt/z", None);
        assert!(!flasher().can_flash(&target));
        assert_eq!(
            flasher()
                .reset(&target)
                .unwrap_err()
                .kind,
            ErrorKind::CouldNotMapTargetIdToDevice
        );
    }

    #[cfg(not(feature = "probe-rs"))]
    #[test]
    fn test_not_built() {
        assert!(!flasher().is_executable_installed());
        let target = TargetRecord::probe("0240AB", DeviceType::Daplink, "K64F", "0240AB");
        assert_eq!(
            flasher()
                .erase(&target, &FlashOptions::default())
                .unwrap_err()
                .kind,
            ErrorKind::ImplementationMissing
        );
    }

    #[test]
    fn test_unknown_chip() {
        let target = TargetRecord::probe("683", DeviceType::Jlink, "unknown", "683");
        assert_eq!(
            ProbeRsFlasher::chip_name(&target).unwrap_err().kind,
            ErrorKind::UnsupportedPlatform
        );
    }
}
