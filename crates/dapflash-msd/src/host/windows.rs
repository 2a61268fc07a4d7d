//! Windows host: drive letters, write-through copies

use super::{is_volume_root, serial_break, write_synced};
use dapflash_core::{HostIo, MountEntry};
use std::fs::{self, OpenOptions};
use std::io;
use std::os::windows::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const FILE_FLAG_WRITE_THROUGH: u32 = 0x8000_0000;

/// Windows host services
#[derive(Debug, Clone, Default)]
pub struct WindowsHost;

impl WindowsHost {
    /// Create the host
    pub fn new() -> Self {
        Self
    }
}

impl HostIo for WindowsHost {
    fn copy_image(&self, src: &Path, dst: &Path) -> io::Result<()> {
        let data = fs::read(src)?;
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .custom_flags(FILE_FLAG_WRITE_THROUGH)
            .open(dst)?;
        write_synced(file, &data)
    }

    fn has_by_id(&self) -> bool {
        false
    }

    fn list_by_id_serial(&self, _target_id: &str) -> io::Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    fn list_by_id_block(&self, _target_id: &str) -> io::Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    fn list_vfat_mounts(&self) -> io::Result<Vec<MountEntry>> {
        // A: and B: are floppy letters, C: is the system drive
        Ok((b'D'..=b'Z')
            .map(|letter| PathBuf::from(format!("{}:\\", letter as char)))
            .filter(|root| is_volume_root(root))
            .map(|root| MountEntry {
                device: root.clone(),
                mount_point: root,
            })
            .collect())
    }

    fn send_serial_break(&self, port: &str, duration: Duration) -> dapflash_core::Result<()> {
        serial_break(port, duration)
    }
}
