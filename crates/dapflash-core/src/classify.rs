//! DAPLink status message classification
//!
//! The interface firmware reports failures as fixed English sentences. This
//! module maps those sentences onto the DAPLink error classes and from there
//! onto [`ErrorKind`]s.

use crate::error::{ErrorKind, FlashError};
use std::fmt;

/// Error classes used by DAPLink interface firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DaplinkErrorClass {
    /// Interface firmware internal error
    Software,
    /// Transfer problem that usually clears on the next copy
    Transient,
    /// Bad image or bad delivery
    User,
    /// Target MCU could not be programmed
    Target,
    /// Interface firmware in a bad state
    Interface,
}

impl DaplinkErrorClass {
    /// Parse a class name from the typed status form
    ///
    /// DAPLink writes `internal` for software errors; both spellings are
    /// accepted.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "software" | "internal" => Some(Self::Software),
            "transient" => Some(Self::Transient),
            "user" => Some(Self::User),
            "target" => Some(Self::Target),
            "interface" => Some(Self::Interface),
            _ => None,
        }
    }

    /// Error kind reported for this class
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Software => ErrorKind::DaplinkSoftwareError,
            Self::Transient => ErrorKind::DaplinkTransientError,
            Self::User => ErrorKind::DaplinkUserError,
            Self::Target => ErrorKind::DaplinkTargetError,
            Self::Interface => ErrorKind::DaplinkInterfaceError,
        }
    }
}

impl fmt::Display for DaplinkErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Software => "software",
            Self::Transient => "transient",
            Self::User => "user",
            Self::Target => "target",
            Self::Interface => "interface",
        };
        f.write_str(name)
    }
}

/// Messages written by DAPLink firmware families, with their class
pub const KNOWN_MESSAGES: &[(&str, DaplinkErrorClass)] = &[
    // Interface firmware internals
    ("An error has occurred", DaplinkErrorClass::Software),
    ("An internal error has occurred", DaplinkErrorClass::Software),
    ("End of stream has been reached", DaplinkErrorClass::Software),
    ("End of stream is unknown", DaplinkErrorClass::Software),
    // Transfer
    ("An error occurred during the transfer", DaplinkErrorClass::Transient),
    ("The transfer timed out.", DaplinkErrorClass::User),
    (
        "Possible mismatch between file size and size programmed",
        DaplinkErrorClass::Transient,
    ),
    (
        "File sent out of order by PC. Target might not be programmed correctly.",
        DaplinkErrorClass::Transient,
    ),
    // Target programming
    (
        "The interface firmware FAILED to reset/halt the target MCU",
        DaplinkErrorClass::Target,
    ),
    (
        "The interface firmware FAILED to download the flash programming algorithms to the target MCU",
        DaplinkErrorClass::Target,
    ),
    (
        "The flash algorithm can not be found",
        DaplinkErrorClass::Interface,
    ),
    (
        "The interface firmware FAILED to download the flash data contents to the target MCU",
        DaplinkErrorClass::Target,
    ),
    (
        "The interface firmware FAILED to initialize the target MCU",
        DaplinkErrorClass::Target,
    ),
    (
        "The interface firmware ABORTED programming. Image is trying to set security bits",
        DaplinkErrorClass::User,
    ),
    (
        "The interface firmware FAILED to unlock the target for programming",
        DaplinkErrorClass::Target,
    ),
    (
        "Flash algorithm erase sector command FAILURE",
        DaplinkErrorClass::Target,
    ),
    (
        "Flash algorithm erase all command FAILURE",
        DaplinkErrorClass::Target,
    ),
    ("Flash algorithm write command FAILURE", DaplinkErrorClass::Target),
    (
        "Flash algorithm write verify command FAILURE",
        DaplinkErrorClass::Target,
    ),
    // Image decoding
    (
        "The hex file cannot be decoded. Checksum calculation failure occurred.",
        DaplinkErrorClass::User,
    ),
    (
        "The hex file cannot be programmed. Logic, address, or order error occurred.",
        DaplinkErrorClass::User,
    ),
    (
        "The hex file you dropped isn't compatible with this mode or device.",
        DaplinkErrorClass::User,
    ),
    (
        "The hex file offset load address is not correct",
        DaplinkErrorClass::User,
    ),
    (
        "The starting address for the bootloader update is wrong.",
        DaplinkErrorClass::User,
    ),
    (
        "The starting address for the interface update is wrong.",
        DaplinkErrorClass::User,
    ),
    (
        "The application file format is unknown and cannot be parsed and/or processed.",
        DaplinkErrorClass::User,
    ),
    // In-application programming of the interface itself
    (
        "In application programming initialization failed.",
        DaplinkErrorClass::Interface,
    ),
    (
        "In application programming uninit failed.",
        DaplinkErrorClass::Interface,
    ),
    (
        "In application programming write failed.",
        DaplinkErrorClass::Interface,
    ),
    (
        "In application programming sector erase failed.",
        DaplinkErrorClass::Interface,
    ),
    (
        "In application programming mass erase failed.",
        DaplinkErrorClass::Interface,
    ),
    (
        "In application programming aborted due to an out of bounds address.",
        DaplinkErrorClass::Interface,
    ),
    (
        "In application programming not supported on this device.",
        DaplinkErrorClass::Interface,
    ),
    (
        "In application programming update aborted due to an incomplete update.",
        DaplinkErrorClass::Interface,
    ),
    ("The bootloader CRC did not pass.", DaplinkErrorClass::Interface),
];

/// Every known message contained in `text`, in table order
pub fn known_messages_in(text: &str) -> Vec<(&'static str, DaplinkErrorClass)> {
    KNOWN_MESSAGES
        .iter()
        .filter(|(msg, _)| text.contains(msg))
        .copied()
        .collect()
}

/// Verdict on a status file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// A single recognized error
    Known {
        /// Class selected for the exit kind
        class: DaplinkErrorClass,
        /// Full device message
        message: String,
    },
    /// Several distinct known messages in one file
    Multiple {
        /// The distinct messages, in table order
        messages: Vec<String>,
    },
    /// Error text that matches nothing in the table
    Unknown {
        /// Verbatim text
        message: String,
    },
}

impl Classification {
    /// Classify a set of error strings taken from one status file
    pub fn from_messages<'a, I>(errors: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let errors: Vec<&str> = errors.into_iter().collect();
        let mut matched: Vec<(&'static str, DaplinkErrorClass)> = Vec::new();
        for error in &errors {
            for hit in known_messages_in(error) {
                if !matched.iter().any(|(m, _)| *m == hit.0) {
                    matched.push(hit);
                }
            }
        }

        match matched.len() {
            0 => Self::Unknown {
                message: errors.join("\n"),
            },
            1 => Self::Known {
                class: matched[0].1,
                message: errors.join("\n"),
            },
            _ => Self::Multiple {
                messages: matched.iter().map(|(m, _)| m.to_string()).collect(),
            },
        }
    }

    /// Exit kind for this verdict
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Known { class, .. } => class.kind(),
            Self::Multiple { .. } | Self::Unknown { .. } => ErrorKind::FlashFailed,
        }
    }

    /// Turn the verdict into the error reported to the caller
    pub fn into_error(self) -> FlashError {
        let kind = self.kind();
        match self {
            Self::Known { class, message } => {
                FlashError::new(kind, format!("DAPLink reported a {} error", class))
                    .with_device_message(message)
            }
            Self::Multiple { messages } => {
                let composite = messages.join("; ");
                FlashError::new(kind, format!("Multiple errors reported: {}", composite))
                    .with_device_message(composite)
            }
            Self::Unknown { message } => {
                FlashError::new(kind, format!("Unknown error: {}", message))
                    .with_device_message(message)
            }
        }
    }
}
