//! Drag-and-drop flashing through the DAPLink volume

use crate::error::MsdError;
use crate::mount::MountVerifier;
use crate::verify::PostFlashVerifier;
use crate::volume::{Details, ERASE_FILE};
use dapflash_core::platform::PLATFORMS;
use dapflash_core::state::{FlashState, StateTracker};
use dapflash_core::{
    DeviceType, Enumerator, ErrorKind, FirmwareImage, FlashError, FlashOptions, Flasher, HostIo,
    Method, Result, Settings, TargetRecord,
};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

const METHODS: &[Method] = &[Method::Simple];

/// Mass-storage back-end
///
/// One call to [`Flasher::flash`] is one attempt: refresh, copy, wait for
/// the firmware to consume the file, reset, re-resolve, check the status
/// files. Retrying is up to the caller, which passes its per-target
/// [`StateTracker`] through [`Flasher::flash_tracked`] to see the stages.
pub struct MsdFlasher {
    host: Arc<dyn HostIo>,
    enumerator: Arc<dyn Enumerator>,
    settings: Settings,
}

impl MsdFlasher {
    /// Create a back-end over a host and the enumerator that finds boards on it
    pub fn new(host: Arc<dyn HostIo>, enumerator: Arc<dyn Enumerator>, settings: Settings) -> Self {
        Self {
            host,
            enumerator,
            settings,
        }
    }

    fn verifier(&self) -> MountVerifier<'_> {
        MountVerifier::new(self.host.as_ref(), self.enumerator.as_ref(), &self.settings)
    }

    /// Drop `src` onto the target's volume and follow it through to the
    /// status check
    fn deliver(
        &self,
        state: &mut StateTracker,
        target: &TargetRecord,
        src: &Path,
        file_name: &OsStr,
        options: &FlashOptions,
    ) -> Result<TargetRecord> {
        let verifier = self.verifier();

        let current = verifier.refresh(&target.target_id)?;
        let mount = current.require_mount_point()?;
        let dst = mount.join(file_name);
        state.advance(FlashState::Copying);

        log::info!("Copying {} to {}", src.display(), dst.display());
        if let Err(source) = self.host.copy_image(src, &dst) {
            return Err(MsdError::CopyFailed {
                src: src.to_path_buf(),
                dst,
                source,
            }
            .into());
        }
        state.advance(FlashState::AwaitingRemount);

        self.finish(state, &current, file_name, options)
    }

    fn finish(
        &self,
        state: &mut StateTracker,
        current: &TargetRecord,
        file_name: &OsStr,
        options: &FlashOptions,
    ) -> Result<TargetRecord> {
        let verifier = self.verifier();
        let mut current = verifier.wait_for_file_disappearance(current, file_name)?;

        if !options.no_reset {
            state.advance(FlashState::Resetting);
            match self.send_break(&current) {
                Ok(()) => {}
                Err(e) if e.kind == ErrorKind::SerialPortMissing => {
                    log::debug!("{}: no serial port, skipping reset", current.target_id)
                }
                // The copy may still have programmed the device
                Err(e) if e.kind == ErrorKind::SerialPortOpenFailed => {
                    log::warn!("{}: {}, continuing without reset", current.target_id, e.message)
                }
                Err(e) => return Err(e),
            }
        }

        current = verifier.verify(&current)?;
        state.advance(FlashState::Verifying);
        PostFlashVerifier.verify(&current)?;
        Ok(current)
    }

    fn send_break(&self, target: &TargetRecord) -> Result<()> {
        let port = target.serial_port.as_deref().ok_or_else(|| {
            FlashError::new(
                ErrorKind::SerialPortMissing,
                format!("Target {} has no serial port", target.target_id),
            )
        })?;
        log::info!("Resetting {} via {}", target.target_id, port);
        self.host
            .send_serial_break(port, self.settings.serial_break_duration)
    }
}

impl Flasher for MsdFlasher {
    fn name(&self) -> &'static str {
        "msd"
    }

    fn methods(&self) -> &'static [Method] {
        METHODS
    }

    fn supported_targets(&self) -> Vec<String> {
        PLATFORMS.iter().map(|p| p.name.to_string()).collect()
    }

    fn available_devices(&self) -> Result<Vec<TargetRecord>> {
        self.enumerator.list_devices()
    }

    fn can_flash(&self, target: &TargetRecord) -> bool {
        target.device_type == DeviceType::Daplink && target.mount_point.is_some()
    }

    fn is_executable_installed(&self) -> bool {
        true
    }

    fn flash(
        &self,
        image: &FirmwareImage,
        target: &TargetRecord,
        method: Method,
        options: &FlashOptions,
    ) -> Result<TargetRecord> {
        let mut state = StateTracker::new(target.target_id.as_str());
        let result = self.flash_tracked(image, target, method, options, &mut state);
        state.settle(&result, false);
        result
    }

    fn flash_tracked(
        &self,
        image: &FirmwareImage,
        target: &TargetRecord,
        method: Method,
        options: &FlashOptions,
        state: &mut StateTracker,
    ) -> Result<TargetRecord> {
        if method != Method::Simple {
            return Err(FlashError::new(
                ErrorKind::ImplementationMissing,
                format!("Mass-storage flashing does not support method {}", method),
            ));
        }
        log::debug!(
            "Flashing {} ({} bytes, sha256 {}) to {}",
            image.path().display(),
            image.size(),
            image.digest(),
            target.target_id
        );
        self.deliver(state, target, image.path(), image.file_name(), options)
    }

    fn erase(&self, target: &TargetRecord, options: &FlashOptions) -> Result<TargetRecord> {
        let mut state = StateTracker::new(target.target_id.as_str());
        let result = self.erase_tracked(target, options, &mut state);
        state.settle(&result, false);
        result
    }

    fn erase_tracked(
        &self,
        target: &TargetRecord,
        options: &FlashOptions,
        state: &mut StateTracker,
    ) -> Result<TargetRecord> {
        let current = self.verifier().refresh(&target.target_id)?;
        let mount = current.require_mount_point()?;

        let allowed = Details::read(mount)?
            .map(|d| d.automation_allowed())
            .unwrap_or(false);
        if !allowed {
            return Err(MsdError::AutomationNotAllowed(current.target_id.clone()).into());
        }

        // The firmware reacts to the file name; contents are ignored.
        let scratch = tempfile::tempdir().map_err(|e| {
            FlashError::new(
                ErrorKind::OsError,
                format!("Failed to create a scratch directory: {}", e),
            )
        })?;
        let request = scratch.path().join(ERASE_FILE);
        std::fs::write(&request, b"").map_err(|e| {
            FlashError::new(
                ErrorKind::OsError,
                format!("Failed to create {}: {}", request.display(), e),
            )
        })?;
        self.deliver(state, &current, &request, OsStr::new(ERASE_FILE), options)
    }

    fn reset(&self, target: &TargetRecord) -> Result<TargetRecord> {
        let current = self.verifier().refresh(&target.target_id)?;
        self.send_break(&current)?;
        Ok(current)
    }
}
