//! Finds DAPLink boards by their mounted volumes

use crate::volume::{self, Details};
use dapflash_core::platform::platform_for_target_id;
use dapflash_core::{Enumerator, ErrorKind, FlashError, HostIo, Result, TargetRecord};
use std::path::Path;
use std::sync::Arc;

/// Platform name used when the board code is not in the table
pub const UNKNOWN_PLATFORM: &str = "unknown";

/// Enumerates every mounted volume that carries a `DETAILS.TXT` with a
/// unique id
pub struct VolumeEnumerator {
    host: Arc<dyn HostIo>,
    scan_ports: bool,
}

impl VolumeEnumerator {
    /// Enumerate through `host`
    ///
    /// Without by-id directories the serial port is matched through the USB
    /// serial number reported by the serial port scan.
    pub fn new(host: Arc<dyn HostIo>) -> Self {
        let scan_ports = !host.has_by_id();
        Self { host, scan_ports }
    }

    fn probe_volume(&self, mount_point: &Path) -> Option<TargetRecord> {
        let details = match Details::read(mount_point) {
            Ok(Some(details)) => details,
            Ok(None) => return None,
            Err(e) => {
                log::debug!("Skipping {}: {}", mount_point.display(), e);
                return None;
            }
        };
        let target_id = details.unique_id()?.to_string();

        if volume::find_file(mount_point, volume::FAIL_FILE)
            .ok()
            .flatten()
            .is_some()
        {
            log::debug!("{} carries a FAIL.TXT from an earlier flash", target_id);
        }

        let platform = platform_for_target_id(&target_id).unwrap_or(UNKNOWN_PLATFORM);
        let serial_port = self.serial_port_for(&target_id);
        Some(TargetRecord::daplink(
            target_id,
            platform,
            mount_point,
            serial_port,
        ))
    }

    fn serial_port_for(&self, target_id: &str) -> Option<String> {
        if !self.scan_ports {
            let ports = self.host.list_by_id_serial(target_id).ok()?;
            return ports.first().map(|p| p.to_string_lossy().into_owned());
        }

        let ports = match serialport::available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                log::debug!("Serial port scan failed: {}", e);
                return None;
            }
        };
        ports.into_iter().find_map(|port| match port.port_type {
            serialport::SerialPortType::UsbPort(usb)
                if usb
                    .serial_number
                    .as_deref()
                    .is_some_and(|sn| sn.eq_ignore_ascii_case(target_id)) =>
            {
                Some(port.port_name)
            }
            _ => None,
        })
    }
}

impl Enumerator for VolumeEnumerator {
    fn list_devices(&self) -> Result<Vec<TargetRecord>> {
        let mounts = self.host.list_vfat_mounts().map_err(|e| {
            FlashError::new(
                ErrorKind::OsError,
                format!("Failed to list mounted volumes: {}", e),
            )
        })?;

        let mut targets: Vec<TargetRecord> = mounts
            .iter()
            .filter_map(|m| self.probe_volume(&m.mount_point))
            .collect();
        targets.dedup_by(|a, b| a.mount_point == b.mount_point);
        log::debug!("Found {} DAPLink volume(s)", targets.len());
        Ok(targets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dapflash_core::MountEntry;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::time::Duration;

    struct Volumes(Vec<MountEntry>);

    impl HostIo for Volumes {
        fn copy_image(&self, _src: &Path, _dst: &Path) -> io::Result<()> {
            Ok(())
        }

        fn has_by_id(&self) -> bool {
            true
        }

        fn list_by_id_serial(&self, target_id: &str) -> io::Result<Vec<PathBuf>> {
            if target_id.starts_with("0240") {
                Ok(vec![PathBuf::from("/dev/ttyACM0")])
            } else {
                Ok(Vec::new())
            }
        }

        fn list_by_id_block(&self, _target_id: &str) -> io::Result<Vec<PathBuf>> {
            Ok(Vec::new())
        }

        fn list_vfat_mounts(&self) -> io::Result<Vec<MountEntry>> {
            Ok(self.0.clone())
        }

        fn send_serial_break(&self, _port: &str, _duration: Duration) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_lists_daplink_volumes_only() {
        let root = tempfile::tempdir().unwrap();
        let k64f = root.path().join("DAPLINK");
        let nrf = root.path().join("JLINK");
        let usb = root.path().join("STICK");
        for dir in [&k64f, &nrf, &usb] {
            fs::create_dir(dir).unwrap();
        }
        fs::write(
            k64f.join("DETAILS.TXT"),
            "Unique ID: 0240000032044e45\nAutomation allowed: 1\n",
        )
        .unwrap();
        fs::write(nrf.join("details.txt"), "Unique ID: 99990000\n").unwrap();
        fs::write(usb.join("notes.txt"), "hello").unwrap();

        let host = Arc::new(Volumes(
            [(&k64f, "/dev/sdb"), (&nrf, "/dev/sdc"), (&usb, "/dev/sdd")]
                .iter()
                .map(|(m, d)| MountEntry {
                    device: PathBuf::from(d),
                    mount_point: m.to_path_buf(),
                })
                .collect(),
        ));
        let targets = VolumeEnumerator::new(host).list_devices().unwrap();

        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].target_id, "0240000032044e45");
        assert_eq!(targets[0].platform_name, "K64F");
        assert_eq!(targets[0].serial_port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(targets[1].platform_name, UNKNOWN_PLATFORM);
        assert_eq!(targets[1].serial_port, None);
        assert!(targets.iter().all(|t| t.validate().is_ok()));
    }
}
