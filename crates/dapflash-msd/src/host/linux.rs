//! Linux host: by-id symlinks, `/proc/mounts`, direct I/O copies

use super::{serial_break, write_synced};
use dapflash_core::{HostIo, MountEntry};
use std::fs::{self, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of serial port by-id links
pub const SERIAL_BY_ID: &str = "/dev/serial/by-id";
/// Default location of block device by-id links
pub const DISK_BY_ID: &str = "/dev/disk/by-id";
/// Default mount table
pub const MOUNT_TABLE: &str = "/proc/mounts";

/// Linux host services
#[derive(Debug, Clone)]
pub struct LinuxHost {
    serial_by_id: PathBuf,
    disk_by_id: PathBuf,
    mount_table: PathBuf,
}

impl Default for LinuxHost {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxHost {
    /// Host using the standard system locations
    pub fn new() -> Self {
        Self::with_roots(SERIAL_BY_ID, DISK_BY_ID, MOUNT_TABLE)
    }

    /// Host reading by-id links and the mount table from other locations
    pub fn with_roots(
        serial_by_id: impl Into<PathBuf>,
        disk_by_id: impl Into<PathBuf>,
        mount_table: impl Into<PathBuf>,
    ) -> Self {
        Self {
            serial_by_id: serial_by_id.into(),
            disk_by_id: disk_by_id.into(),
            mount_table: mount_table.into(),
        }
    }

    fn copy_direct(&self, data: &[u8], dst: &Path) -> io::Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .custom_flags(libc::O_DIRECT)
            .open(dst)?;
        write_synced(file, data)
    }

    fn copy_sync(&self, data: &[u8], dst: &Path) -> io::Result<()> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .custom_flags(libc::O_SYNC)
            .open(dst)?;
        write_synced(file, data)
    }
}

/// Resolved targets of every link in `dir` whose name contains `needle`
///
/// A missing directory means no matching devices. Partition links are
/// skipped so a volume counts once.
fn list_by_id(dir: &Path, needle: &str) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.contains(needle) || name.contains("-part") {
            continue;
        }
        let link = entry.path();
        found.push(fs::canonicalize(&link).unwrap_or(link));
    }
    found.sort();
    found.dedup();
    Ok(found)
}

/// Decode the octal escapes the kernel uses in `/proc/mounts`
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = &bytes[i + 1..i + 4];
            if digits.iter().all(|b| (b'0'..=b'7').contains(b)) {
                let value = digits.iter().fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
                if let Ok(v) = u8::try_from(value) {
                    out.push(v);
                    i += 4;
                    continue;
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// vfat entries of a mount table in `/proc/mounts` format
pub fn parse_mounts(table: &str) -> Vec<MountEntry> {
    table
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let mount_point = fields.next()?;
            let fstype = fields.next()?;
            (fstype == "vfat").then(|| MountEntry {
                device: PathBuf::from(unescape_mount_field(device)),
                mount_point: PathBuf::from(unescape_mount_field(mount_point)),
            })
        })
        .collect()
}

impl HostIo for LinuxHost {
    fn copy_image(&self, src: &Path, dst: &Path) -> io::Result<()> {
        let data = fs::read(src)?;
        match self.copy_direct(&data, dst) {
            Ok(()) => Ok(()),
            // O_DIRECT needs block-aligned buffers and is refused by some
            // filesystems; O_SYNC still gets the bytes out before close
            Err(e) if e.raw_os_error() == Some(libc::EINVAL) => {
                log::debug!("Direct I/O refused for {}, using O_SYNC", dst.display());
                self.copy_sync(&data, dst)
            }
            Err(e) => Err(e),
        }
    }

    fn has_by_id(&self) -> bool {
        true
    }

    fn list_by_id_serial(&self, target_id: &str) -> io::Result<Vec<PathBuf>> {
        list_by_id(&self.serial_by_id, target_id)
    }

    fn list_by_id_block(&self, target_id: &str) -> io::Result<Vec<PathBuf>> {
        list_by_id(&self.disk_by_id, target_id)
    }

    fn list_vfat_mounts(&self) -> io::Result<Vec<MountEntry>> {
        Ok(parse_mounts(&fs::read_to_string(&self.mount_table)?))
    }

    fn send_serial_break(&self, port: &str, duration: Duration) -> dapflash_core::Result<()> {
        serial_break(port, duration)
    }
}
