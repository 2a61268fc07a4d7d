//! ST-LINK back-end driving the open source `st-flash` tool

use crate::chips::{chip_for_platform, platform_names};
use crate::error::{ProbeError, Result};
use crate::runner::{find_executable, ToolRunner};
use crate::{probe_serial, require_method};
use dapflash_core::image::ImageExtension;
use dapflash_core::{
    DeviceType, Enumerator, FirmwareImage, FlashOptions, Flasher, Method, Settings, TargetRecord,
};
use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

const METHODS: &[Method] = &[Method::Stlink];

/// STM32 flash starts here unless the chip table says otherwise
pub const DEFAULT_FLASH_BASE: u32 = 0x0800_0000;

/// `st-flash` arguments for writing an image
pub fn write_args(
    serial: &str,
    path: &Path,
    extension: ImageExtension,
    base: u32,
    no_reset: bool,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["--serial".into(), serial.into()];
    if !no_reset {
        args.push("--reset".into());
    }
    if extension == ImageExtension::Hex {
        args.push("--format".into());
        args.push("ihex".into());
    }
    args.push("write".into());
    args.push(path.as_os_str().to_os_string());
    if extension == ImageExtension::Bin {
        args.push(format!("0x{:08x}", base).into());
    }
    args
}

/// `st-flash` arguments for a command without operands
pub fn command_args(serial: &str, command: &str) -> Vec<OsString> {
    vec!["--serial".into(), serial.into(), command.into()]
}

/// ST-LINK back-end
pub struct StlinkFlasher {
    settings: Settings,
    runner: ToolRunner,
    enumerator: Arc<dyn Enumerator>,
}

impl StlinkFlasher {
    /// Back-end using `settings.st_flash`
    pub fn new(settings: Settings, enumerator: Arc<dyn Enumerator>) -> Self {
        let runner = ToolRunner::new(&settings);
        Self {
            settings,
            runner,
            enumerator,
        }
    }

    fn st_flash(&self, args: Vec<OsString>) -> Result<()> {
        let out = self.runner.run_checked(&self.settings.st_flash, args)?;
        log::debug!("st-flash: {}", out.text());
        Ok(())
    }
}

impl Flasher for StlinkFlasher {
    fn name(&self) -> &'static str {
        "stlink"
    }

    fn methods(&self) -> &'static [Method] {
        METHODS
    }

    fn supported_targets(&self) -> Vec<String> {
        platform_names()
            .into_iter()
            .filter(|p| {
                chip_for_platform(p).is_some_and(|c| c.flash_base == DEFAULT_FLASH_BASE)
            })
            .collect()
    }

    fn available_devices(&self) -> dapflash_core::Result<Vec<TargetRecord>> {
        Ok(self
            .enumerator
            .list_devices()?
            .into_iter()
            .filter(|t| self.can_flash(t))
            .collect())
    }

    fn can_flash(&self, target: &TargetRecord) -> bool {
        target.device_type == DeviceType::Stlink && target.probe_usb_id.is_some()
    }

    fn is_executable_installed(&self) -> bool {
        find_executable(&self.settings.st_flash).is_some()
    }

    fn flash(
        &self,
        image: &FirmwareImage,
        target: &TargetRecord,
        method: Method,
        options: &FlashOptions,
    ) -> dapflash_core::Result<TargetRecord> {
        require_method(self.name(), METHODS, method)?;
        let serial = probe_serial(target)?;
        let extension = image.extension();
        if !matches!(extension, ImageExtension::Bin | ImageExtension::Hex) {
            return Err(ProbeError::UnsupportedImage(extension.to_string()).into());
        }
        let base = chip_for_platform(&target.platform_name)
            .map(|c| c.flash_base)
            .unwrap_or(DEFAULT_FLASH_BASE);

        log::info!("Writing {} through ST-LINK {}", image.path().display(), serial);
        self.st_flash(write_args(
            serial,
            image.path(),
            extension,
            base,
            options.no_reset,
        ))?;
        Ok(target.clone())
    }

    fn erase(
        &self,
        target: &TargetRecord,
        options: &FlashOptions,
    ) -> dapflash_core::Result<TargetRecord> {
        let serial = probe_serial(target)?;
        self.st_flash(command_args(serial, "erase"))?;
        if !options.no_reset {
            self.st_flash(command_args(serial, "reset"))?;
        }
        Ok(target.clone())
    }

    fn reset(&self, target: &TargetRecord) -> dapflash_core::Result<TargetRecord> {
        let serial = probe_serial(target)?;
        self.st_flash(command_args(serial, "reset"))?;
        Ok(target.clone())
    }
}
