//! Firmware image references
//!
//! The image is read once to compute its size and digest; it is never
//! modified or parsed.

use crate::error::{ErrorKind, FlashError, Result};
use sha2::{Digest, Sha256};
use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// File extensions the interface firmware accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageExtension {
    /// Raw binary
    Bin,
    /// Intel HEX
    Hex,
    /// DAPLink action file
    Act,
    /// DAPLink configuration file
    Cfg,
}

impl ImageExtension {
    /// Match a file extension, ignoring case
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "bin" => Some(Self::Bin),
            "hex" => Some(Self::Hex),
            "act" => Some(Self::Act),
            "cfg" => Some(Self::Cfg),
            _ => None,
        }
    }

    /// Lowercase extension
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bin => "bin",
            Self::Hex => "hex",
            Self::Act => "act",
            Self::Cfg => "cfg",
        }
    }
}

impl fmt::Display for ImageExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated firmware image on the host filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    path: PathBuf,
    extension: ImageExtension,
    size: u64,
    digest: String,
}

impl FirmwareImage {
    /// Validate and read an image
    ///
    /// Fails with `file_missing` if the path does not name a regular file and
    /// with `daplink_user_error` if the extension is not one the interface
    /// firmware accepts.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(FlashError::new(
                ErrorKind::FileMissing,
                format!("Could not find given file: {}", path.display()),
            ));
        }

        let extension = path
            .extension()
            .and_then(OsStr::to_str)
            .and_then(ImageExtension::from_extension)
            .ok_or_else(|| {
                FlashError::new(
                    ErrorKind::DaplinkUserError,
                    format!(
                        "Unsupported file extension for {} (expected bin, hex, act or cfg)",
                        path.display()
                    ),
                )
            })?;

        let data = fs::read(path)?;
        let digest = hex::encode(Sha256::digest(&data));

        log::debug!(
            "Image {}: {} bytes, sha256 {}",
            path.display(),
            data.len(),
            digest
        );

        Ok(Self {
            path: path.to_path_buf(),
            extension,
            size: data.len() as u64,
            digest,
        })
    }

    /// Path on the host
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Base name, as it will appear on the target volume
    pub fn file_name(&self) -> &OsStr {
        // open() only accepts regular files, which always have a final component
        self.path.file_name().unwrap_or_else(|| self.path.as_os_str())
    }

    /// Validated extension
    pub fn extension(&self) -> ImageExtension {
        self.extension
    }

    /// Size in bytes at the time the image was opened
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Hex SHA-256 of the contents at the time the image was opened
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_valid_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.BIN");
        fs::write(&path, b"abc").unwrap();

        let image = FirmwareImage::open(&path).unwrap();
        assert_eq!(image.extension(), ImageExtension::Bin);
        assert_eq!(image.size(), 3);
        assert_eq!(image.file_name(), "hello.BIN");
        assert_eq!(
            image.digest(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FirmwareImage::open(dir.path().join("missing.bin")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::FileMissing);
    }

    #[test]
    fn test_directory_is_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FirmwareImage::open(dir.path()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::FileMissing);
    }

    #[test]
    fn test_bad_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.elf");
        fs::write(&path, b"\x7fELF").unwrap();
        let err = FirmwareImage::open(&path).unwrap_err();
        assert_eq!(err.kind, ErrorKind::DaplinkUserError);
    }
}
