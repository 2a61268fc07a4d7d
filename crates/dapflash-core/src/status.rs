//! Parsing of device-written status files (`FAIL.TXT`, `LOG.TXT`)

use crate::classify::{Classification, DaplinkErrorClass};
use crate::error::{ErrorKind, FlashError};

/// Prefix of an error line in the legacy format
pub const LEGACY_ERROR_PREFIX: &str = "ERROR:";

/// Shape of a status file after a flash
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReport {
    /// No status file on the volume
    Absent,
    /// Status file exists but holds nothing
    Empty,
    /// `ERROR: <message>` lines
    Legacy {
        /// Bodies of the `ERROR:` lines; when there are none, the whole text
        errors: Vec<String>,
    },
    /// `error:` / `error type:` fields
    Typed {
        /// Free-text message
        message: String,
        /// Classes in the order the firmware listed them
        classes: Vec<DaplinkErrorClass>,
    },
}

impl StatusReport {
    /// Parse file contents; `None` means the file does not exist
    pub fn parse(contents: Option<&str>) -> Self {
        let Some(text) = contents else {
            return Self::Absent;
        };
        if text.trim().is_empty() {
            return Self::Empty;
        }

        if let Some(typed) = parse_typed(text) {
            return typed;
        }

        let errors: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter_map(|line| line.strip_prefix(LEGACY_ERROR_PREFIX))
            .map(|body| body.trim().to_string())
            .collect();

        if errors.is_empty() {
            Self::Legacy {
                errors: vec![text.trim().to_string()],
            }
        } else {
            Self::Legacy { errors }
        }
    }

    /// Classify the report
    ///
    /// Returns `None` for [`StatusReport::Absent`], which callers treat as
    /// success for `FAIL.TXT`.
    pub fn classify(&self) -> Option<Classification> {
        match self {
            Self::Absent => None,
            Self::Empty => Some(Classification::Unknown {
                message: String::new(),
            }),
            Self::Legacy { errors } => Some(Classification::from_messages(
                errors.iter().map(String::as_str),
            )),
            Self::Typed { message, classes } => Some(match classes.first() {
                Some(class) => Classification::Known {
                    class: *class,
                    message: message.clone(),
                },
                None => Classification::Unknown {
                    message: message.clone(),
                },
            }),
        }
    }

    /// The error a failure-indicator file implies, or `None` when absent
    pub fn into_error(self) -> Option<FlashError> {
        match self {
            Self::Absent => None,
            Self::Empty => Some(FlashError::new(
                ErrorKind::FlashFailed,
                "Error in status file is unknown",
            )),
            other => other.classify().map(Classification::into_error),
        }
    }
}

fn parse_typed(text: &str) -> Option<StatusReport> {
    let mut message = None;
    let mut classes = None;

    for line in text.lines().map(str::trim) {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            // Upper-case ERROR: belongs to the legacy form
            "error" if key.trim() != "ERROR" => message = Some(value.trim().to_string()),
            "error type" | "type" => {
                classes = Some(
                    value
                        .split(',')
                        .filter_map(DaplinkErrorClass::from_name)
                        .collect::<Vec<_>>(),
                )
            }
            _ => {}
        }
    }

    Some(StatusReport::Typed {
        message: message?,
        classes: classes?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_and_empty() {
        assert_eq!(StatusReport::parse(None), StatusReport::Absent);
        assert_eq!(StatusReport::parse(Some(" \r\n")), StatusReport::Empty);
        assert!(StatusReport::parse(None).into_error().is_none());

        let err = StatusReport::parse(Some("")).into_error().unwrap();
        assert_eq!(err.kind, ErrorKind::FlashFailed);
        assert_eq!(err.message, "Error in status file is unknown");
    }

    #[test]
    fn test_legacy_form() {
        let report = StatusReport::parse(Some("ERROR: The transfer timed out.\r\n"));
        assert_eq!(
            report,
            StatusReport::Legacy {
                errors: vec!["The transfer timed out.".to_string()]
            }
        );
        let err = report.into_error().unwrap();
        assert_eq!(err.kind, ErrorKind::DaplinkUserError);
        assert_eq!(err.code(), 102);
    }

    #[test]
    fn test_legacy_transient() {
        let err = StatusReport::parse(Some("ERROR: An error occurred during the transfer\n"))
            .into_error()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::DaplinkTransientError);
    }

    #[test]
    fn test_typed_form_uses_first_class() {
        let text = "error: The transfer timed out.\r\nerror type: transient, user\r\n";
        let report = StatusReport::parse(Some(text));
        assert_eq!(
            report,
            StatusReport::Typed {
                message: "The transfer timed out.".to_string(),
                classes: vec![DaplinkErrorClass::Transient, DaplinkErrorClass::User],
            }
        );
        let err = report.into_error().unwrap();
        assert_eq!(err.kind, ErrorKind::DaplinkTransientError);
        assert_eq!(err.device_message.as_deref(), Some("The transfer timed out."));
    }

    #[test]
    fn test_typed_form_short_type_key() {
        let text = "error: The bootloader CRC did not pass.\ntype: interface\n";
        let err = StatusReport::parse(Some(text)).into_error().unwrap();
        assert_eq!(err.kind, ErrorKind::DaplinkInterfaceError);
    }

    #[test]
    fn test_typed_without_known_class() {
        let text = "error: weird\nerror type: cosmic\n";
        let err = StatusReport::parse(Some(text)).into_error().unwrap();
        assert_eq!(err.kind, ErrorKind::FlashFailed);
    }

    #[test]
    fn test_text_without_error_lines() {
        let err = StatusReport::parse(Some("The interface firmware FAILED to initialize the target MCU"))
            .into_error()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::DaplinkTargetError);
    }

    #[test]
    fn test_multiple_legacy_errors() {
        let text = "ERROR: The transfer timed out.\nERROR: The bootloader CRC did not pass.\n";
        let err = StatusReport::parse(Some(text)).into_error().unwrap();
        assert_eq!(err.kind, ErrorKind::FlashFailed);
        assert!(err.message.starts_with("Multiple errors"));
    }
}
