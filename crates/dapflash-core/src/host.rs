//! Host filesystem and serial capability
//!
//! Everything the mass-storage pipeline needs from the operating system goes
//! through [`HostIo`], so platform differences stay in one place and tests
//! can substitute a simulated board.

use crate::error::Result;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One mounted FAT volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Block device node (e.g. `/dev/sdb`)
    pub device: PathBuf,
    /// Where it is mounted
    pub mount_point: PathBuf,
}

/// Platform services used by the mass-storage back-end
pub trait HostIo: Send + Sync {
    /// Copy `src` to `dst` so the bytes reach the device before returning
    fn copy_image(&self, src: &Path, dst: &Path) -> io::Result<()>;

    /// Whether the host exposes by-id directories
    ///
    /// When false, the mount verifier falls back to the enumerator.
    fn has_by_id(&self) -> bool;

    /// Serial port nodes whose by-id entry mentions `target_id`
    fn list_by_id_serial(&self, target_id: &str) -> io::Result<Vec<PathBuf>>;

    /// Block device nodes whose by-id entry mentions `target_id`
    fn list_by_id_block(&self, target_id: &str) -> io::Result<Vec<PathBuf>>;

    /// Currently mounted vfat volumes
    fn list_vfat_mounts(&self) -> io::Result<Vec<MountEntry>>;

    /// Hold a break condition on `port` for `duration`
    ///
    /// Fails with `serial_port_open_failed` when the port cannot be opened.
    fn send_serial_break(&self, port: &str, duration: Duration) -> Result<()>;
}
