//! Error types for probe back-ends

use dapflash_core::{ErrorKind, FlashError};
use std::io;
use thiserror::Error;

/// Probe back-end errors
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The tool could not be started
    #[error("Failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    /// Waiting on the tool failed
    #[error("Failed to wait for {tool}: {source}")]
    Wait {
        tool: String,
        #[source]
        source: io::Error,
    },

    /// The tool ran past the flash timeout and was stopped
    #[error("{tool} did not finish within {secs:.1} s")]
    Timeout { tool: String, secs: f64 },

    /// The tool exited unsuccessfully
    #[error("{tool} failed ({status}): {output}")]
    Failed {
        tool: String,
        status: String,
        output: String,
    },

    /// A scratch file (e.g. a command script) could not be written
    #[error("Failed to write {what}: {source}")]
    Scratch {
        what: &'static str,
        #[source]
        source: io::Error,
    },

    /// The target has no probe serial number
    #[error("Target {0} has no debug probe")]
    NoProbe(String),

    /// No device name is known for the platform
    #[error("Platform {0} is not supported by this probe back-end")]
    UnsupportedPlatform(String),

    /// Probe tools only program `.bin` and `.hex` images
    #[error("Cannot program a .{0} file through a debug probe")]
    UnsupportedImage(String),

    /// The probe library rejected the request
    #[error("Probe library: {0}")]
    Library(String),

    /// The probe library failed unexpectedly
    #[error("Probe library failure: {0}")]
    LibraryInternal(String),

    /// USB enumeration failed
    #[error("Failed to list USB devices: {0}")]
    Usb(String),
}

/// Result type for probe operations
pub type Result<T> = std::result::Result<T, ProbeError>;

impl ProbeError {
    /// Taxonomy entry for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound => {
                ErrorKind::ImplementationMissing
            }
            Self::Spawn { .. } | Self::Wait { .. } | Self::Scratch { .. } | Self::Usb(_) => {
                ErrorKind::OsError
            }
            Self::Timeout { .. } | Self::Failed { .. } => ErrorKind::FlashFailed,
            Self::NoProbe(_) => ErrorKind::CouldNotMapTargetIdToDevice,
            Self::UnsupportedPlatform(_) => ErrorKind::UnsupportedPlatform,
            Self::UnsupportedImage(_) | Self::Library(_) => ErrorKind::ProbeUserError,
            Self::LibraryInternal(_) => ErrorKind::ProbeUnhandledException,
        }
    }
}

impl From<ProbeError> for FlashError {
    fn from(e: ProbeError) -> Self {
        let kind = e.kind();
        match e {
            ProbeError::Failed { ref output, .. } if !output.is_empty() => {
                let device = output.clone();
                FlashError::new(kind, e.to_string()).with_device_message(device)
            }
            other => FlashError::new(kind, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool_is_implementation_missing() {
        let e = ProbeError::Spawn {
            tool: "JLinkExe".into(),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(FlashError::from(e).kind, ErrorKind::ImplementationMissing);

        let e = ProbeError::Spawn {
            tool: "JLinkExe".into(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(FlashError::from(e).kind, ErrorKind::OsError);
    }

    #[test]
    fn test_failed_keeps_output() {
        let e = ProbeError::Failed {
            tool: "st-flash".into(),
            status: "exit status: 255".into(),
            output: "Couldn't find any ST-Link devices".into(),
        };
        let f = FlashError::from(e);
        assert_eq!(f.kind, ErrorKind::FlashFailed);
        assert_eq!(
            f.device_message.as_deref(),
            Some("Couldn't find any ST-Link devices")
        );
    }

    #[test]
    fn test_no_probe() {
        let f = FlashError::from(ProbeError::NoProbe("Z".into()));
        assert_eq!(f.code(), 21);
    }
}
