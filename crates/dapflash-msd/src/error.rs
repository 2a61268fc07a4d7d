//! Error types for mass-storage operations

use dapflash_core::{ErrorKind, FlashError};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Mass-storage specific errors
#[derive(Debug, Error)]
pub enum MsdError {
    /// Copying the image onto the volume failed
    #[error("Failed to copy {src} to {dst}: {source}")]
    CopyFailed {
        src: PathBuf,
        dst: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A status or metadata file could not be read
    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A by-id or mount table listing failed
    #[error("Failed to list {what}: {source}")]
    ListFailed {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    /// Target vanished from the enumerator
    #[error("Target {0} is no longer connected")]
    TargetGone(String),

    /// Serial port did not come back in time
    #[error("Serial port for {target_id} did not reappear within {secs:.1} s")]
    SerialTimeout { target_id: String, secs: f64 },

    /// Volume did not come back in time
    #[error("Mount point for {target_id} did not reappear within {secs:.1} s")]
    MountTimeout { target_id: String, secs: f64 },

    /// More than one host endpoint carries the same target id
    #[error("Target id {target_id} matches {count} {what} entries")]
    Conflict {
        target_id: String,
        what: &'static str,
        count: usize,
    },

    /// The copied file is still on the volume
    #[error("{file} is still present on {mount}")]
    FileStillPresent { file: String, mount: PathBuf },

    /// Device does not allow erase through the volume
    #[error("Target {0} does not allow automation (DETAILS.TXT)")]
    AutomationNotAllowed(String),

    /// MPS2 log file missing after deployment
    #[error("LOG.TXT missing on {0}, sdcard corrupt")]
    LogMissing(PathBuf),

    /// MPS2 log file reported a failure
    #[error("LOG.TXT reported: {0}")]
    LogError(String),

    /// The enumerator itself failed
    #[error(transparent)]
    Enumeration(FlashError),
}

/// Result type for mass-storage operations
pub type Result<T> = std::result::Result<T, MsdError>;

impl MsdError {
    /// Taxonomy entry for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CopyFailed { .. } | Self::ReadFailed { .. } | Self::ListFailed { .. } => {
                ErrorKind::OsError
            }
            Self::TargetGone(_) => ErrorKind::TargetIdMissing,
            Self::SerialTimeout { .. } => ErrorKind::SerialPortReappearTimeout,
            Self::MountTimeout { .. } => ErrorKind::MountPointMissing,
            Self::Conflict { .. } => ErrorKind::TargetIdConflict,
            Self::FileStillPresent { .. } => ErrorKind::FileStillPresent,
            Self::AutomationNotAllowed(_) => ErrorKind::EraseNotSupported,
            Self::LogMissing(_) | Self::LogError(_) => ErrorKind::FlashFailed,
            Self::Enumeration(e) => e.kind,
        }
    }
}

impl From<MsdError> for FlashError {
    fn from(e: MsdError) -> Self {
        let kind = e.kind();
        match e {
            MsdError::LogError(line) => {
                FlashError::new(kind, format!("LOG.TXT reported: {}", line))
                    .with_device_message(line)
            }
            MsdError::Enumeration(e) => e,
            other => FlashError::new(kind, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let e = MsdError::SerialTimeout {
            target_id: "0240".into(),
            secs: 20.0,
        };
        assert_eq!(FlashError::from(e).kind, ErrorKind::SerialPortReappearTimeout);

        let e = MsdError::LogMissing(PathBuf::from("/mnt/x"));
        let f = FlashError::from(e);
        assert_eq!(f.kind, ErrorKind::FlashFailed);
        assert!(f.message.contains("sdcard corrupt"));
    }

    #[test]
    fn test_enumeration_error_passes_through() {
        let inner = FlashError::new(ErrorKind::OsError, "udev went away");
        let f = FlashError::from(MsdError::Enumeration(inner));
        assert_eq!(f.kind, ErrorKind::OsError);
        assert_eq!(f.message, "udev went away");
        assert!(f.is_retryable());
    }
}
