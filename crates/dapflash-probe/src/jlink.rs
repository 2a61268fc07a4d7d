//! SEGGER J-Link back-end driving J-Link Commander
//!
//! Every operation writes a commander script to a scratch file and runs
//! `JLinkExe` on it against the probe selected by serial number.

use crate::chips::{chip_for_platform, platform_names, Chip};
use crate::error::{ProbeError, Result};
use crate::runner::{find_executable, ToolOutput, ToolRunner};
use crate::{probe_serial, require_method};
use dapflash_core::image::ImageExtension;
use dapflash_core::{
    DeviceType, Enumerator, FirmwareImage, FlashOptions, Flasher, Method, Settings, TargetRecord,
};
use std::ffi::OsString;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

const METHODS: &[Method] = &[Method::Jlink];

/// Output fragments J-Link Commander prints on failure even when it exits 0
const FAILURE_MARKERS: &[&str] = &[
    "Cannot connect to target",
    "Failed to open file",
    "Could not find emulator",
    "Connecting to J-Link via USB...FAILED",
];

/// What a commander script does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script<'a> {
    /// Program an image
    Load {
        path: &'a Path,
        extension: ImageExtension,
        base: u32,
    },
    /// Mass-erase the chip
    Erase,
    /// Reset and run
    Reset,
}

/// Render a commander script
pub fn commander_script(script: Script<'_>, no_reset: bool) -> String {
    let mut lines = vec!["r".to_string(), "h".to_string()];
    match script {
        Script::Load {
            path,
            extension: ImageExtension::Bin,
            base,
        } => lines.push(format!("loadbin \"{}\", 0x{:08X}", path.display(), base)),
        Script::Load { path, .. } => lines.push(format!("loadfile \"{}\"", path.display())),
        Script::Erase => lines.push("erase".to_string()),
        Script::Reset => {}
    }
    if !no_reset || script == Script::Reset {
        lines.push("r".to_string());
        lines.push("g".to_string());
    }
    lines.push("q".to_string());
    lines.join("\n") + "\n"
}

/// J-Link serial numbers are decimal; the USB string may be zero padded
pub fn emulator_serial(usb_serial: &str) -> &str {
    let trimmed = usb_serial.trim_start_matches('0');
    if trimmed.is_empty() {
        usb_serial
    } else {
        trimmed
    }
}

/// Command line for one commander run
pub fn commander_args(chip: &Chip, serial: &str, script_path: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "-NoGui",
        "1",
        "-ExitOnError",
        "1",
        "-AutoConnect",
        "1",
        "-if",
        "SWD",
        "-speed",
        "auto",
        "-device",
        chip.jlink_device,
        "-SelectEmuBySN",
        emulator_serial(serial),
        "-CommanderScript",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(script_path.as_os_str().to_os_string());
    args
}

/// J-Link back-end
pub struct JlinkFlasher {
    settings: Settings,
    runner: ToolRunner,
    enumerator: Arc<dyn Enumerator>,
}

impl JlinkFlasher {
    /// Back-end using `settings.jlink_exe`
    pub fn new(settings: Settings, enumerator: Arc<dyn Enumerator>) -> Self {
        let runner = ToolRunner::new(&settings);
        Self {
            settings,
            runner,
            enumerator,
        }
    }

    fn run(&self, target: &TargetRecord, script: Script<'_>, no_reset: bool) -> Result<ToolOutput> {
        let serial = probe_serial(target)?;
        let chip = chip_for_platform(&target.platform_name)
            .ok_or_else(|| ProbeError::UnsupportedPlatform(target.platform_name.clone()))?;

        let mut file = tempfile::Builder::new()
            .prefix("dapflash-")
            .suffix(".jlink")
            .tempfile()
            .map_err(|source| ProbeError::Scratch {
                what: "J-Link script",
                source,
            })?;
        let text = commander_script(script, no_reset);
        log::trace!("J-Link script:\n{}", text);
        file.write_all(text.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|source| ProbeError::Scratch {
                what: "J-Link script",
                source,
            })?;

        log::info!("Running J-Link on {} ({})", target.target_id, chip.jlink_device);
        let out = self.runner.run_checked(
            &self.settings.jlink_exe,
            commander_args(chip, serial, file.path()),
        )?;
        check_output(&out)?;
        Ok(out)
    }
}

fn check_output(out: &ToolOutput) -> Result<()> {
    let text = out.text();
    match FAILURE_MARKERS.iter().find(|m| text.contains(*m)) {
        Some(marker) => Err(ProbeError::Failed {
            tool: "JLinkExe".to_string(),
            status: marker.to_string(),
            output: text,
        }),
        None => Ok(()),
    }
}

impl Flasher for JlinkFlasher {
    fn name(&self) -> &'static str {
        "jlink"
    }

    fn methods(&self) -> &'static [Method] {
        METHODS
    }

    fn supported_targets(&self) -> Vec<String> {
        platform_names()
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
        target.device_type == DeviceType::Jlink && target.probe_usb_id.is_some()
    }

    fn is_executable_installed(&self) -> bool {
        find_executable(&self.settings.jlink_exe).is_some()
    }

    fn flash(
        &self,
        image: &FirmwareImage,
        target: &TargetRecord,
        method: Method,
        options: &FlashOptions,
    ) -> dapflash_core::Result<TargetRecord> {
        require_method(self.name(), METHODS, method)?;
        let extension = image.extension();
        if !matches!(extension, ImageExtension::Bin | ImageExtension::Hex) {
            return Err(ProbeError::UnsupportedImage(extension.to_string()).into());
        }
        let base = chip_for_platform(&target.platform_name)
            .map(|c| c.flash_base)
            .unwrap_or(0);
        self.run(
            target,
            Script::Load {
                path: image.path(),
                extension,
                base,
            },
            options.no_reset,
        )?;
        Ok(target.clone())
    }

    fn erase(
        &self,
        target: &TargetRecord,
        options: &FlashOptions,
    ) -> dapflash_core::Result<TargetRecord> {
        self.run(target, Script::Erase, options.no_reset)?;
        Ok(target.clone())
    }

    fn reset(&self, target: &TargetRecord) -> dapflash_core::Result<TargetRecord> {
        self.run(target, Script::Reset, false)?;
        Ok(target.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dapflash_core::enumerate::StaticEnumerator;
    use dapflash_core::ErrorKind;

    #[test]
    fn test_load_bin_script() {
        let script = commander_script(
            Script::Load {
                path: Path::new("/tmp/hello.bin"),
                extension: ImageExtension::Bin,
                base: 0x0800_0000,
            },
            false,
        );
        assert_eq!(
            script,
            "r\nh\nloadbin \"/tmp/hello.bin\", 0x08000000\nr\ng\nq\n"
        );
    }

    #[test]
    fn test_load_hex_no_reset() {
        let script = commander_script(
            Script::Load {
                path: Path::new("/tmp/hello.hex"),
                extension: ImageExtension::Hex,
                base: 0,
            },
            true,
        );
        assert_eq!(script, "r\nh\nloadfile \"/tmp/hello.hex\"\nq\n");
    }

    #[test]
    fn test_reset_always_runs() {
        assert_eq!(commander_script(Script::Reset, true), "r\nh\nr\ng\nq\n");
        assert_eq!(commander_script(Script::Erase, false), "r\nh\nerase\nr\ng\nq\n");
    }

    #[test]
    fn test_args() {
        let chip = chip_for_platform("NRF52_DK").unwrap();
        let args = commander_args(chip, "000683512345", Path::new("/tmp/s.jlink"));
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        let pos = args.iter().position(|a| a == "-SelectEmuBySN").unwrap();
        assert_eq!(args[pos + 1], "683512345");
        assert!(args.contains(&"nRF52832_xxAA".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/s.jlink");
    }

    #[test]
    fn test_target_without_probe() {
        let flasher = JlinkFlasher::new(
            Settings::default(),
            Arc::new(StaticEnumerator::default()),
        );
        let target = TargetRecord::daplink("Z", "NRF52_DK", "/mnt/z", None);
        assert!(!flasher.can_flash(&target));
        assert_eq!(
            flasher
                .erase(&target, &FlashOptions::default())
                .unwrap_err()
                .kind,
            ErrorKind::CouldNotMapTargetIdToDevice
        );
    }

    #[test]
    fn test_unknown_platform() {
        let flasher = JlinkFlasher::new(
            Settings::default(),
            Arc::new(StaticEnumerator::default()),
        );
        let target = TargetRecord::probe("683", DeviceType::Jlink, "unknown", "683");
        assert_eq!(
            flasher.reset(&target).unwrap_err().kind,
            ErrorKind::UnsupportedPlatform
        );
    }
}
