//! Native [`HostIo`] implementations
//!
//! Linux exposes by-id directories and a mount table, which lets the mount
//! verifier follow a board across remounts precisely. macOS and Windows only
//! provide the copy, the volume list and the serial break; the verifier uses
//! the enumerator there.

use dapflash_core::{ErrorKind, FlashError};
use std::fs::File;
use std::io::{self, Write};
use std::thread;
use std::time::Duration;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(windows)]
mod windows;

#[cfg(target_os = "linux")]
pub use linux::{parse_mounts, LinuxHost};
#[cfg(target_os = "macos")]
pub use macos::MacHost;
#[cfg(windows)]
pub use windows::WindowsHost;

/// Host implementation for the platform being built
#[cfg(target_os = "linux")]
pub type NativeHost = LinuxHost;
/// Host implementation for the platform being built
#[cfg(target_os = "macos")]
pub type NativeHost = MacHost;
/// Host implementation for the platform being built
#[cfg(windows)]
pub type NativeHost = WindowsHost;

/// Write all of `data` through an already opened handle and flush it to the
/// device before the handle is closed
pub(crate) fn write_synced(mut file: File, data: &[u8]) -> io::Result<()> {
    file.write_all(data)?;
    file.flush()?;
    file.sync_all()
}

/// Hold a break condition on a serial port
///
/// DAPLink resets the target MCU when it sees a break on its CDC port.
pub(crate) fn serial_break(port: &str, duration: Duration) -> dapflash_core::Result<()> {
    let mut serial = serialport::new(port, 115_200)
        .timeout(Duration::from_secs(1))
        .open()
        .map_err(|e| {
            FlashError::new(
                ErrorKind::SerialPortOpenFailed,
                format!("Failed to open serial port {}: {}", port, e),
            )
        })?;

    let reset_failed = |e: serialport::Error| {
        FlashError::new(
            ErrorKind::ResetFailed,
            format!("Failed to send break on {}: {}", port, e),
        )
    };

    serial.set_break().map_err(reset_failed)?;
    if !duration.is_zero() {
        thread::sleep(duration);
    }
    serial.clear_break().map_err(reset_failed)?;
    log::debug!("Sent serial break on {}", port);
    Ok(())
}

/// Whether `path` names an existing directory that looks like a volume root
#[cfg(any(target_os = "macos", windows))]
pub(crate) fn is_volume_root(path: &std::path::Path) -> bool {
    path.is_dir()
}
