//! Error taxonomy for dapflash
//!
//! Every failure the tool can report is one [`ErrorKind`]. Each kind has a
//! stable numeric code which doubles as the process exit status, so the
//! values below must never be renumbered.

use std::fmt;
use std::io;
use thiserror::Error;

/// Closed set of outcomes a flash, erase or reset can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    /// Operation completed
    Success,
    /// Something failed outside the taxonomy (bug or unexpected condition)
    UnhandledException,
    /// Command line was not usable
    MisuseCmd,

    // Mapping and back-end selection
    /// No back-end can serve the requested method for this target
    ImplementationMissing,
    /// The device reported (or the tool detected) a failed flash
    FlashFailed,
    /// Erase did not complete
    EraseFailed,
    /// Requested platform is not supported by the selected back-end
    UnsupportedPlatform,
    /// A target could not be mapped to a host device
    CouldNotMapDevice,
    /// A non-empty selector did not resolve to a device usable for the method
    CouldNotMapTargetIdToDevice,
    /// Two host endpoints claim the same target id
    TargetIdConflict,
    /// No target id given, or the target vanished
    TargetIdMissing,
    /// Image file does not exist
    FileMissing,
    /// Device does not accept drag-and-drop erase requests
    EraseNotSupported,
    /// Host I/O failure
    OsError,
    /// Selected targets belong to another platform than requested
    PlatformMismatch,
    /// Enumerator returned no devices at all
    DevicesMissing,

    // Serial port failures
    /// Target exposes no serial port
    SerialPortMissing,
    /// Serial port exists but could not be opened
    SerialPortOpenFailed,
    /// Serial port did not come back after remount
    SerialPortReappearTimeout,
    /// Target could not be reset
    ResetFailed,

    // Mount point failures
    /// Target exposes no mount point, or it did not come back after remount
    MountPointMissing,
    /// Copied image was not consumed by the interface firmware
    FileStillPresent,

    // Probe library back-end
    /// Probe library rejected the request
    ProbeUserError,
    /// Probe library failed unexpectedly
    ProbeUnhandledException,

    // DAPLink error classes reported through FAIL.TXT
    /// Interface firmware internal error
    DaplinkSoftwareError,
    /// Transient transfer problem, usually fixed by copying again
    DaplinkTransientError,
    /// The image or the way it was delivered is wrong
    DaplinkUserError,
    /// Target MCU could not be programmed
    DaplinkTargetError,
    /// Interface firmware is in a bad state
    DaplinkInterfaceError,
}

impl ErrorKind {
    /// Every kind, in code order
    pub const ALL: [ErrorKind; 29] = [
        ErrorKind::Success,
        ErrorKind::UnhandledException,
        ErrorKind::MisuseCmd,
        ErrorKind::ImplementationMissing,
        ErrorKind::FlashFailed,
        ErrorKind::EraseFailed,
        ErrorKind::UnsupportedPlatform,
        ErrorKind::CouldNotMapDevice,
        ErrorKind::CouldNotMapTargetIdToDevice,
        ErrorKind::TargetIdConflict,
        ErrorKind::TargetIdMissing,
        ErrorKind::FileMissing,
        ErrorKind::EraseNotSupported,
        ErrorKind::OsError,
        ErrorKind::PlatformMismatch,
        ErrorKind::DevicesMissing,
        ErrorKind::SerialPortMissing,
        ErrorKind::SerialPortOpenFailed,
        ErrorKind::SerialPortReappearTimeout,
        ErrorKind::ResetFailed,
        ErrorKind::MountPointMissing,
        ErrorKind::FileStillPresent,
        ErrorKind::ProbeUserError,
        ErrorKind::ProbeUnhandledException,
        ErrorKind::DaplinkSoftwareError,
        ErrorKind::DaplinkTransientError,
        ErrorKind::DaplinkUserError,
        ErrorKind::DaplinkTargetError,
        ErrorKind::DaplinkInterfaceError,
    ];

    /// Stable numeric code, used as the process exit status
    pub const fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::UnhandledException => 1,
            Self::MisuseCmd => 2,
            Self::ImplementationMissing => 10,
            Self::FlashFailed => 11,
            Self::EraseFailed => 12,
            Self::UnsupportedPlatform => 13,
            Self::CouldNotMapDevice => 20,
            Self::CouldNotMapTargetIdToDevice => 21,
            Self::TargetIdConflict => 22,
            Self::TargetIdMissing => 23,
            Self::FileMissing => 24,
            Self::EraseNotSupported => 25,
            Self::OsError => 26,
            Self::PlatformMismatch => 27,
            Self::DevicesMissing => 28,
            Self::SerialPortMissing => 40,
            Self::SerialPortOpenFailed => 41,
            Self::SerialPortReappearTimeout => 42,
            Self::ResetFailed => 43,
            Self::MountPointMissing => 50,
            Self::FileStillPresent => 51,
            Self::ProbeUserError => 60,
            Self::ProbeUnhandledException => 61,
            Self::DaplinkSoftwareError => 100,
            Self::DaplinkTransientError => 101,
            Self::DaplinkUserError => 102,
            Self::DaplinkTargetError => 103,
            Self::DaplinkInterfaceError => 104,
        }
    }

    /// Look a kind up by its numeric code
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.code() == code)
    }

    /// Snake-case identifier, as printed in reports
    pub const fn name(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::UnhandledException => "unhandled_exception",
            Self::MisuseCmd => "misuse_cmd",
            Self::ImplementationMissing => "implementation_missing",
            Self::FlashFailed => "flash_failed",
            Self::EraseFailed => "erase_failed",
            Self::UnsupportedPlatform => "unsupported_platform",
            Self::CouldNotMapDevice => "could_not_map_device",
            Self::CouldNotMapTargetIdToDevice => "could_not_map_target_id_to_device",
            Self::TargetIdConflict => "target_id_conflict",
            Self::TargetIdMissing => "target_id_missing",
            Self::FileMissing => "file_missing",
            Self::EraseNotSupported => "erase_not_supported",
            Self::OsError => "os_error",
            Self::PlatformMismatch => "platform_mismatch",
            Self::DevicesMissing => "devices_missing",
            Self::SerialPortMissing => "serial_port_missing",
            Self::SerialPortOpenFailed => "serial_port_open_failed",
            Self::SerialPortReappearTimeout => "serial_port_reappear_timeout",
            Self::ResetFailed => "reset_failed",
            Self::MountPointMissing => "mount_point_missing",
            Self::FileStillPresent => "file_still_present",
            Self::ProbeUserError => "probe_user_error",
            Self::ProbeUnhandledException => "probe_unhandled_exception",
            Self::DaplinkSoftwareError => "daplink_software_error",
            Self::DaplinkTransientError => "daplink_transient_error",
            Self::DaplinkUserError => "daplink_user_error",
            Self::DaplinkTargetError => "daplink_target_error",
            Self::DaplinkInterfaceError => "daplink_interface_error",
        }
    }

    /// Canonical one-line summary shown to the user
    pub const fn description(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::UnhandledException => "Unhandled exception",
            Self::MisuseCmd => "Misuse of command",
            Self::ImplementationMissing => "Flash method not available for this target",
            Self::FlashFailed => "Flashing failed",
            Self::EraseFailed => "Erasing failed",
            Self::UnsupportedPlatform => "Platform is not supported",
            Self::CouldNotMapDevice => "Could not map device",
            Self::CouldNotMapTargetIdToDevice => "Could not map given target id to a device",
            Self::TargetIdConflict => "Target id is shared by multiple devices",
            Self::TargetIdMissing => "Target id is missing",
            Self::FileMissing => "Could not find given file",
            Self::EraseNotSupported => "Erase is not supported by the device",
            Self::OsError => "Operating system error",
            Self::PlatformMismatch => "Target platform does not match the given platform",
            Self::DevicesMissing => "Could not find any connected device",
            Self::SerialPortMissing => "Serial port is missing",
            Self::SerialPortOpenFailed => "Could not open serial port",
            Self::SerialPortReappearTimeout => "Serial port did not reappear",
            Self::ResetFailed => "Reset failed",
            Self::MountPointMissing => "Mount point is missing",
            Self::FileStillPresent => "Flashed file is still present on the device",
            Self::ProbeUserError => "Probe back-end rejected the request",
            Self::ProbeUnhandledException => "Probe back-end failed unexpectedly",
            Self::DaplinkSoftwareError => "DAPLink software error",
            Self::DaplinkTransientError => "DAPLink transient error",
            Self::DaplinkUserError => "DAPLink user error",
            Self::DaplinkTargetError => "DAPLink target error",
            Self::DaplinkInterfaceError => "DAPLink interface error",
        }
    }

    /// Kinds the retry engine re-attempts by default
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::OsError | Self::DaplinkTransientError | Self::DaplinkSoftwareError
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A failed operation: its kind, what went wrong, and optionally the text
/// the device itself wrote
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {message}", kind.description())]
pub struct FlashError {
    /// Taxonomy entry
    pub kind: ErrorKind,
    /// Human-readable detail
    pub message: String,
    /// Verbatim status-file text, if the device produced any
    pub device_message: Option<String>,
}

impl FlashError {
    /// Create an error of the given kind
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            device_message: None,
        }
    }

    /// Attach the verbatim device message
    pub fn with_device_message(mut self, message: impl Into<String>) -> Self {
        self.device_message = Some(message.into());
        self
    }

    /// Exit code for this error
    pub fn code(&self) -> u8 {
        self.kind.code()
    }

    /// Whether the default retry policy applies
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

impl From<io::Error> for FlashError {
    fn from(e: io::Error) -> Self {
        FlashError::new(ErrorKind::OsError, e.to_string())
    }
}

/// Result type alias using [`FlashError`]
pub type Result<T> = std::result::Result<T, FlashError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_codes_are_unique() {
        let codes: HashSet<u8> = ErrorKind::ALL.iter().map(|k| k.code()).collect();
        assert_eq!(codes.len(), ErrorKind::ALL.len());
    }

    #[test]
    fn test_required_codes() {
        assert_eq!(ErrorKind::Success.code(), 0);
        assert_eq!(ErrorKind::UnhandledException.code(), 1);
        assert_eq!(ErrorKind::MisuseCmd.code(), 2);
        assert_eq!(ErrorKind::CouldNotMapTargetIdToDevice.code(), 21);
        assert_eq!(ErrorKind::FileMissing.code(), 24);
        assert_eq!(ErrorKind::DevicesMissing.code(), 28);
        assert_eq!(ErrorKind::DaplinkSoftwareError.code(), 100);
        assert_eq!(ErrorKind::DaplinkTransientError.code(), 101);
        assert_eq!(ErrorKind::DaplinkUserError.code(), 102);
        assert_eq!(ErrorKind::DaplinkTargetError.code(), 103);
        assert_eq!(ErrorKind::DaplinkInterfaceError.code(), 104);
    }

    #[test]
    fn test_code_ranges() {
        for kind in ErrorKind::ALL {
            let code = kind.code();
            assert!(
                code <= 2
                    || (10..=28).contains(&code)
                    || (40..=43).contains(&code)
                    || (50..=51).contains(&code)
                    || (60..=61).contains(&code)
                    || (100..=104).contains(&code),
                "{} has out-of-range code {}",
                kind,
                code
            );
        }
    }

    #[test]
    fn test_from_code() {
        for kind in ErrorKind::ALL {
            assert_eq!(ErrorKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(ErrorKind::from_code(99), None);
    }

    #[test]
    fn test_retryable_set() {
        let retryable: Vec<ErrorKind> = ErrorKind::ALL
            .iter()
            .copied()
            .filter(|k| k.is_retryable())
            .collect();
        assert_eq!(
            retryable,
            vec![
                ErrorKind::OsError,
                ErrorKind::DaplinkSoftwareError,
                ErrorKind::DaplinkTransientError
            ]
        );
    }

    #[test]
    fn test_io_error_is_os_error() {
        let err: FlashError = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert_eq!(err.kind, ErrorKind::OsError);
        assert!(err.to_string().contains("denied"));
    }
}
