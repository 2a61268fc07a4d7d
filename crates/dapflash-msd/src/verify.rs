//! Post-flash status check

use crate::error::MsdError;
use crate::volume::{self, FAIL_FILE, LOG_FILE};
use dapflash_core::platform::is_mps2;
use dapflash_core::status::{StatusReport, LEGACY_ERROR_PREFIX};
use dapflash_core::{Result, TargetRecord};

/// Decides whether a flash succeeded from the files on the remounted volume
#[derive(Debug, Default, Clone, Copy)]
pub struct PostFlashVerifier;

impl PostFlashVerifier {
    /// Check `target`'s volume
    ///
    /// MPS2 boards must leave a `LOG.TXT` behind; every other family signals
    /// failure through `FAIL.TXT` and success through its absence.
    pub fn verify(&self, target: &TargetRecord) -> Result<()> {
        let mount = target.require_mount_point()?;

        if is_mps2(&target.platform_name) {
            let log = volume::read_optional(mount, LOG_FILE)?
                .ok_or_else(|| MsdError::LogMissing(mount.clone()))?;
            if let Some(line) = log
                .lines()
                .map(str::trim)
                .find(|line| line.starts_with(LEGACY_ERROR_PREFIX))
            {
                return Err(MsdError::LogError(line.to_string()).into());
            }
            return Ok(());
        }

        let contents = volume::read_optional(mount, FAIL_FILE)?;
        match StatusReport::parse(contents.as_deref()).into_error() {
            None => Ok(()),
            Some(e) => {
                log::debug!("{}: {} says {:?}", target.target_id, FAIL_FILE, contents);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dapflash_core::ErrorKind;
    use std::fs;

    fn board(dir: &std::path::Path, platform: &str) -> TargetRecord {
        TargetRecord::daplink("0240AA", platform, dir, None)
    }

    #[test]
    fn test_no_fail_file_is_success() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("MBED.HTM"), "").unwrap();
        assert!(PostFlashVerifier.verify(&board(dir.path(), "K64F")).is_ok());
    }

    #[test]
    fn test_empty_fail_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("FAIL.TXT"), "\r\n").unwrap();
        let err = PostFlashVerifier
            .verify(&board(dir.path(), "K64F"))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::FlashFailed);
        assert_eq!(err.message, "Error in status file is unknown");
    }

    #[test]
    fn test_classified_fail_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("fail.txt"), "ERROR: The transfer timed out.\r\n").unwrap();
        let err = PostFlashVerifier
            .verify(&board(dir.path(), "K64F"))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DaplinkUserError);
        assert_eq!(err.code(), 102);
        assert!(err
            .device_message
            .as_deref()
            .unwrap()
            .contains("The transfer timed out."));
    }

    #[test]
    fn test_mps2_requires_log() {
        let dir = tempfile::tempdir().unwrap();
        let target = board(dir.path(), "ARM_MPS2");
        let err = PostFlashVerifier.verify(&target).unwrap_err();
        assert_eq!(err.kind, ErrorKind::FlashFailed);
        assert!(err.message.contains("sdcard corrupt"));

        fs::write(dir.path().join("LOG.TXT"), "Copying image\nDone\n").unwrap();
        assert!(PostFlashVerifier.verify(&target).is_ok());

        fs::write(dir.path().join("LOG.TXT"), "Copying image\nERROR: bad checksum\n").unwrap();
        let err = PostFlashVerifier.verify(&target).unwrap_err();
        assert_eq!(err.kind, ErrorKind::FlashFailed);
        assert_eq!(err.device_message.as_deref(), Some("ERROR: bad checksum"));
    }

    #[test]
    fn test_missing_mount_point() {
        let mut target = board(std::path::Path::new("/nonexistent"), "K64F");
        target.mount_point = None;
        assert_eq!(
            PostFlashVerifier.verify(&target).unwrap_err().kind,
            ErrorKind::MountPointMissing
        );
    }
}
