//! Mount verification
//!
//! After a flash the interface firmware drops off the bus and comes back,
//! possibly under a different block device, mount point and serial port.
//! [`MountVerifier`] follows the board by its target id and hands back a
//! refreshed [`TargetRecord`].

use crate::error::{MsdError, Result};
use crate::volume;
use dapflash_core::{Enumerator, HostIo, Settings, TargetRecord};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

/// What one poll of the volume saw
enum Volume {
    /// Target or volume could not be listed (board off the bus)
    Unreadable,
    /// Volume listed but the firmware is not done yet
    Pending { mount: PathBuf, file_present: bool },
    /// File consumed and the volume is back
    Ready(TargetRecord),
}

/// Re-resolves a target's endpoints by target id
pub struct MountVerifier<'a> {
    host: &'a dyn HostIo,
    enumerator: &'a dyn Enumerator,
    settings: &'a Settings,
}

impl<'a> MountVerifier<'a> {
    /// Create a verifier over the given host and enumerator
    pub fn new(host: &'a dyn HostIo, enumerator: &'a dyn Enumerator, settings: &'a Settings) -> Self {
        Self {
            host,
            enumerator,
            settings,
        }
    }

    /// Current record for `target_id`
    ///
    /// If several records share the id the first one is used. Enumerator
    /// failures keep their own kind; only an empty listing means the target
    /// is gone.
    pub fn refresh(&self, target_id: &str) -> Result<TargetRecord> {
        let mut found = self
            .enumerator
            .find(target_id)
            .map_err(MsdError::Enumeration)?;
        if found.len() > 1 {
            log::warn!(
                "{} devices report target id {}, using the first",
                found.len(),
                target_id
            );
        }
        if found.is_empty() {
            return Err(MsdError::TargetGone(target_id.to_string()));
        }
        Ok(found.swap_remove(0))
    }

    /// Confirm the target still has one serial port, one block device and a
    /// mount point, following any renames
    pub fn verify(&self, target: &TargetRecord) -> Result<TargetRecord> {
        let refreshed = if self.host.has_by_id() {
            self.verify_by_id(target)?
        } else {
            self.verify_via_enumerator(target)?
        };
        debug_assert_eq!(refreshed.target_id, target.target_id);
        log::debug!("{} verified as {}", target.target_id, refreshed);
        Ok(refreshed)
    }

    fn verify_by_id(&self, target: &TargetRecord) -> Result<TargetRecord> {
        let mut refreshed = target.clone();

        if let Some(port) = &target.serial_port {
            refreshed.serial_port = Some(self.check_serial(&target.target_id, port)?);
        }

        if let Some(device) = self.check_device(&target.target_id)? {
            let previous = match &target.mount_point {
                Some(mount) => self.device_for_mount(mount),
                None => None,
            };
            if previous.as_deref() != Some(device.as_path()) {
                log::info!(
                    "{}: block device is now {}",
                    target.target_id,
                    device.display()
                );
                refreshed.mount_point = Some(self.wait_for_mount(&target.target_id, &device)?);
            }
        }

        match &refreshed.mount_point {
            Some(mount) if !mount.is_dir() => {
                self.wait_for_directory(&target.target_id, mount)?;
            }
            _ => {}
        }
        Ok(refreshed)
    }

    fn verify_via_enumerator(&self, target: &TargetRecord) -> Result<TargetRecord> {
        let deadline = Instant::now() + self.settings.mount_point_timeout;
        loop {
            match self.refresh(&target.target_id) {
                Ok(current) if current.mount_point.as_deref().is_some_and(Path::is_dir) => {
                    return Ok(current)
                }
                _ if Instant::now() >= deadline => {
                    return Err(MsdError::MountTimeout {
                        target_id: target.target_id.clone(),
                        secs: self.settings.mount_point_timeout.as_secs_f64(),
                    })
                }
                _ => self.pause(),
            }
        }
    }

    /// Poll the serial by-id directory until exactly one port matches
    fn check_serial(&self, target_id: &str, previous: &str) -> Result<String> {
        let deadline = Instant::now() + self.settings.serial_point_timeout;
        loop {
            match self.host.list_by_id_serial(target_id) {
                Ok(ports) if ports.len() == 1 => {
                    let port = &ports[0];
                    if port.file_name() != Path::new(previous).file_name() {
                        log::info!(
                            "{}: serial port moved from {} to {}",
                            target_id,
                            previous,
                            port.display()
                        );
                        return Ok(port.to_string_lossy().into_owned());
                    }
                    return Ok(previous.to_string());
                }
                Ok(ports) if ports.len() > 1 => {
                    return Err(MsdError::Conflict {
                        target_id: target_id.to_string(),
                        what: "serial port",
                        count: ports.len(),
                    })
                }
                Ok(_) => {}
                Err(e) => log::debug!("Listing serial ports for {} failed: {}", target_id, e),
            }

            if Instant::now() >= deadline {
                return Err(MsdError::SerialTimeout {
                    target_id: target_id.to_string(),
                    secs: self.settings.serial_point_timeout.as_secs_f64(),
                });
            }
            self.pause();
        }
    }

    /// Block device currently carrying the target, if any
    fn check_device(&self, target_id: &str) -> Result<Option<PathBuf>> {
        let mut devices = self
            .host
            .list_by_id_block(target_id)
            .map_err(|source| MsdError::ListFailed {
                what: "block devices",
                source,
            })?;
        match devices.len() {
            0 => Ok(None),
            1 => Ok(devices.pop()),
            count => Err(MsdError::Conflict {
                target_id: target_id.to_string(),
                what: "block device",
                count,
            }),
        }
    }

    fn device_for_mount(&self, mount: &Path) -> Option<PathBuf> {
        self.host
            .list_vfat_mounts()
            .ok()?
            .into_iter()
            .find(|m| m.mount_point == mount)
            .map(|m| m.device)
    }

    /// Poll the mount table until `device` is mounted
    fn wait_for_mount(&self, target_id: &str, device: &Path) -> Result<PathBuf> {
        let deadline = Instant::now() + self.settings.mount_point_timeout;
        loop {
            if let Ok(mounts) = self.host.list_vfat_mounts() {
                if let Some(entry) = mounts.into_iter().find(|m| m.device == device) {
                    log::info!(
                        "{}: mounted at {}",
                        target_id,
                        entry.mount_point.display()
                    );
                    return Ok(entry.mount_point);
                }
            }
            if Instant::now() >= deadline {
                return Err(MsdError::MountTimeout {
                    target_id: target_id.to_string(),
                    secs: self.settings.mount_point_timeout.as_secs_f64(),
                });
            }
            self.pause();
        }
    }

    fn wait_for_directory(&self, target_id: &str, mount: &Path) -> Result<()> {
        let deadline = Instant::now() + self.settings.mount_point_timeout;
        while !mount.is_dir() {
            if Instant::now() >= deadline {
                return Err(MsdError::MountTimeout {
                    target_id: target_id.to_string(),
                    secs: self.settings.mount_point_timeout.as_secs_f64(),
                });
            }
            self.pause();
        }
        Ok(())
    }

    /// Wait until the firmware has consumed `file_name`
    ///
    /// Succeeds once the file is gone from the (re-resolved) volume and at
    /// least one `*.htm` file can be listed there. Only polls that could list
    /// the volume count against `file_disappear_polls`; while the board is
    /// off the bus the wait is bounded by `mount_point_timeout` on top of the
    /// poll budget.
    pub fn wait_for_file_disappearance(
        &self,
        target: &TargetRecord,
        file_name: &OsStr,
    ) -> Result<TargetRecord> {
        let name = file_name.to_string_lossy();
        let budget = self.settings.file_disappear_polls.max(1);
        let deadline = Instant::now()
            + self.settings.poll_interval * budget
            + self.settings.mount_point_timeout;
        let mut last_mount = target.mount_point.clone().unwrap_or_default();
        let mut still_present = false;
        let mut polls = 0;

        loop {
            if polls >= budget || Instant::now() >= deadline {
                break;
            }

            match self.poll_volume(&target.target_id, &name) {
                Volume::Unreadable => log::trace!("{}: volume not readable yet", target.target_id),
                Volume::Ready(current) => {
                    log::debug!("{}: {} consumed", target.target_id, name);
                    return Ok(current);
                }
                Volume::Pending { mount, file_present } => {
                    polls += 1;
                    last_mount = mount;
                    still_present = file_present;
                }
            }
            self.pause();
        }

        if still_present {
            Err(MsdError::FileStillPresent {
                file: name.into_owned(),
                mount: last_mount,
            })
        } else {
            let waited = self.settings.poll_interval * budget + self.settings.mount_point_timeout;
            Err(MsdError::MountTimeout {
                target_id: target.target_id.clone(),
                secs: waited.as_secs_f64(),
            })
        }
    }

    /// One look at the volume while waiting for a file to be consumed
    fn poll_volume(&self, target_id: &str, name: &str) -> Volume {
        let current = match self.refresh(target_id) {
            Ok(current) => current,
            Err(e) => {
                log::debug!("Refreshing {} failed: {}", target_id, e);
                return Volume::Unreadable;
            }
        };
        let Some(mount) = current.mount_point.clone() else {
            return Volume::Unreadable;
        };

        match volume::find_file(&mount, name) {
            Ok(Some(_)) => {
                return Volume::Pending {
                    mount,
                    file_present: true,
                }
            }
            Ok(None) => {}
            Err(e) => {
                log::debug!("Listing {} failed: {}", mount.display(), e);
                return Volume::Unreadable;
            }
        }

        match volume::list_htm(&mount) {
            Ok(htm) if !htm.is_empty() => Volume::Ready(current),
            Ok(_) => Volume::Pending {
                mount,
                file_present: false,
            },
            Err(e) => {
                log::debug!("Listing {} failed: {}", mount.display(), e);
                Volume::Unreadable
            }
        }
    }

    fn pause(&self) {
        let interval = self.settings.poll_interval;
        if interval > Duration::ZERO {
            thread::sleep(interval);
        }
    }
}
