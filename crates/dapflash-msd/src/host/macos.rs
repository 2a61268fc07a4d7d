//! macOS host: volumes under `/Volumes`, uncached copies

use super::{is_volume_root, serial_break, write_synced};
use dapflash_core::{HostIo, MountEntry};
use std::fs::{self, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where removable volumes are mounted
pub const VOLUMES_ROOT: &str = "/Volumes";

/// macOS host services
#[derive(Debug, Clone, Default)]
pub struct MacHost;

impl MacHost {
    /// Create the host
    pub fn new() -> Self {
        Self
    }
}

impl HostIo for MacHost {
    fn copy_image(&self, src: &Path, dst: &Path) -> io::Result<()> {
        let data = fs::read(src)?;
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(dst)?;
        // SAFETY: the descriptor belongs to `file`, which is alive for the call
        let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_NOCACHE, 1) };
        if rc == -1 {
            log::debug!(
                "F_NOCACHE refused for {}: {}",
                dst.display(),
                io::Error::last_os_error()
            );
        }
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
        let mut mounts = Vec::new();
        for entry in fs::read_dir(VOLUMES_ROOT)? {
            let path = entry?.path();
            if is_volume_root(&path) {
                mounts.push(MountEntry {
                    device: path.clone(),
                    mount_point: path,
                });
            }
        }
        Ok(mounts)
    }

    fn send_serial_break(&self, port: &str, duration: Duration) -> dapflash_core::Result<()> {
        serial_break(port, duration)
    }
}
