//! Files on a DAPLink volume
//!
//! FAT is case-insensitive, so every lookup here ignores case.

use crate::error::{MsdError, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Metadata file written by the interface firmware
pub const DETAILS_FILE: &str = "DETAILS.TXT";
/// Failure indicator written after a bad flash
pub const FAIL_FILE: &str = "FAIL.TXT";
/// MPS2 deployment log
pub const LOG_FILE: &str = "LOG.TXT";
/// Mass-erase request file
pub const ERASE_FILE: &str = "ERASE.ACT";

/// Find `name` in `dir`, ignoring case
pub fn find_file(dir: &Path, name: &str) -> io::Result<Option<PathBuf>> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().eq_ignore_ascii_case(name) {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

/// Every `*.htm` file in `dir`
pub fn list_htm(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let is_htm = Path::new(&entry.file_name())
            .extension()
            .map(|e| e.eq_ignore_ascii_case("htm"))
            .unwrap_or(false);
        if is_htm {
            found.push(entry.path());
        }
    }
    Ok(found)
}

/// Read `name` from `dir` if it exists
///
/// The content is decoded lossily; firmware files are ASCII but a damaged
/// volume may return garbage.
pub fn read_optional(dir: &Path, name: &str) -> Result<Option<String>> {
    let path = match find_file(dir, name) {
        Ok(Some(path)) => path,
        Ok(None) => return Ok(None),
        Err(source) => {
            return Err(MsdError::ReadFailed {
                path: dir.to_path_buf(),
                source,
            })
        }
    };
    let bytes = fs::read(&path).map_err(|source| MsdError::ReadFailed { path, source })?;
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

/// Parsed `DETAILS.TXT`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Details {
    entries: Vec<(String, String)>,
}

impl Details {
    /// Parse `Key: value` lines; other lines are ignored
    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .filter(|line| !line.trim_start().starts_with('#'))
            .filter_map(|line| line.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        Self { entries }
    }

    /// Read `DETAILS.TXT` from a volume root
    pub fn read(mount_point: &Path) -> Result<Option<Self>> {
        Ok(read_optional(mount_point, DETAILS_FILE)?.map(|t| Self::parse(&t)))
    }

    /// Value for `key`, ignoring case
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Board unique id, which is the target id
    pub fn unique_id(&self) -> Option<&str> {
        self.get("Unique ID").filter(|v| !v.is_empty())
    }

    /// Whether the firmware accepts automation files such as `ERASE.ACT`
    pub fn automation_allowed(&self) -> bool {
        self.get("Automation allowed") == Some("1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAILS: &str = "# DAPLink Firmware - see https://mbed.com/daplink\r\n\
Unique ID: 0240000032044e4500257009997b00386781000097969900\r\n\
HIC ID: 97969900\r\n\
Auto Reset: 0\r\n\
Automation allowed: 1\r\n\
Daplink Mode: Interface\r\n\
Interface Version: 0244\r\n";

    #[test]
    fn test_parse_details() {
        let d = Details::parse(DETAILS);
        assert_eq!(
            d.unique_id(),
            Some("0240000032044e4500257009997b00386781000097969900")
        );
        assert_eq!(d.get("hic id"), Some("97969900"));
        assert!(d.automation_allowed());
        assert_eq!(d.get("Version"), None);
    }

    #[test]
    fn test_automation_disabled() {
        let d = Details::parse("Unique ID: 1\nAutomation allowed: 0\n");
        assert!(!d.automation_allowed());
        assert!(!Details::parse("").automation_allowed());
    }

    #[test]
    fn test_find_file_ignores_case() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("fail.txt"), "x").unwrap();
        fs::write(dir.path().join("MBED.HTM"), "").unwrap();
        fs::write(dir.path().join("readme.html"), "").unwrap();

        assert!(find_file(dir.path(), FAIL_FILE).unwrap().is_some());
        assert!(find_file(dir.path(), LOG_FILE).unwrap().is_none());
        assert_eq!(list_htm(dir.path()).unwrap().len(), 1);
        assert_eq!(
            read_optional(dir.path(), "FAIL.TXT").unwrap().as_deref(),
            Some("x")
        );
    }

    #[test]
    fn test_listing_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_htm(&dir.path().join("gone")).is_err());
        assert!(read_optional(&dir.path().join("gone"), FAIL_FILE).is_err());
    }
}
