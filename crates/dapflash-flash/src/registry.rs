//! Back-end registry and selection
//!
//! The table of back-ends is fixed when the orchestrator is built; which
//! entries exist depends on the features dapflash was compiled with.
//! Selecting a back-end for a target is a pure function of the target
//! record, the requested method and that table.

use dapflash_core::{DeviceType, ErrorKind, FlashError, Flasher, Method, Result, TargetRecord};
use std::fmt;
use std::sync::Arc;

/// How a back-end reaches the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Copy onto the interface firmware's volume
    MassStorage,
    /// Run an external probe tool
    ProbeTool,
    /// Drive a probe in-process
    ProbeLibrary,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MassStorage => "mass storage",
            Self::ProbeTool => "probe tool",
            Self::ProbeLibrary => "probe library",
        })
    }
}

/// Static description of a back-end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendInfo {
    /// Back-end name
    pub name: &'static str,
    /// Transport
    pub kind: BackendKind,
    /// Short description
    pub description: &'static str,
}

/// One entry in the back-end table
#[derive(Clone)]
pub struct Backend {
    /// What it is
    pub info: BackendInfo,
    /// The implementation
    pub flasher: Arc<dyn Flasher>,
}

impl Backend {
    /// Wrap a flasher
    pub fn new(kind: BackendKind, description: &'static str, flasher: Arc<dyn Flasher>) -> Self {
        Self {
            info: BackendInfo {
                name: flasher.name(),
                kind,
                description,
            },
            flasher,
        }
    }

    /// Methods this back-end implements
    pub fn methods(&self) -> &'static [Method] {
        self.flasher.methods()
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend").field("info", &self.info).finish()
    }
}

/// Method used when none is requested
///
/// DAPLink boards go through their volume when they have one; probes go
/// through their own tool.
pub fn default_method(target: &TargetRecord) -> Method {
    match target.device_type {
        DeviceType::Jlink => Method::Jlink,
        DeviceType::Stlink => Method::Stlink,
        DeviceType::Daplink | DeviceType::Other => {
            if target.mount_point.is_none() && target.probe_usb_id.is_some() {
                Method::Pyocd
            } else {
                Method::Simple
            }
        }
    }
}

/// Pick the back-end that runs `method` on `target`
///
/// Fails with:
/// - `could_not_map_target_id_to_device` for a probe method on a target
///   without probe metadata
/// - `implementation_missing` when `simple` is asked of a target without a
///   mount point, when no back-end for the method was compiled in, when the
///   back-end cannot drive this kind of device, or when its tool is missing
pub fn select<'a>(
    backends: &'a [Backend],
    target: &TargetRecord,
    method: Method,
) -> Result<&'a Backend> {
    if method.needs_probe() && target.probe_usb_id.is_none() {
        return Err(FlashError::new(
            ErrorKind::CouldNotMapTargetIdToDevice,
            format!(
                "Target {} has no debug probe for method {}",
                target.target_id, method
            ),
        ));
    }
    if method == Method::Simple && target.mount_point.is_none() {
        return Err(FlashError::new(
            ErrorKind::ImplementationMissing,
            format!(
                "Target {} has no mass-storage volume for method {}",
                target.target_id, method
            ),
        ));
    }

    let backend = backends
        .iter()
        .find(|b| b.methods().contains(&method))
        .ok_or_else(|| {
            FlashError::new(
                ErrorKind::ImplementationMissing,
                format!("No back-end for method {} was compiled in", method),
            )
        })?;

    if !backend.flasher.can_flash(target) {
        return Err(FlashError::new(
            ErrorKind::ImplementationMissing,
            format!(
                "The {} back-end cannot drive {} target {}",
                backend.info.name, target.device_type, target.target_id
            ),
        ));
    }
    if !backend.flasher.is_executable_installed() {
        return Err(FlashError::new(
            ErrorKind::ImplementationMissing,
            format!("The {} back-end is not installed", backend.info.name),
        ));
    }

    log::debug!(
        "{}: using {} back-end for method {}",
        target.target_id,
        backend.info.name,
        method
    );
    Ok(backend)
}

/// Back-ends compiled into this build
#[allow(unused_mut, clippy::vec_init_then_push)]
pub fn available_backends() -> Vec<BackendInfo> {
    let mut backends = Vec::new();

    #[cfg(feature = "msd")]
    backends.push(BackendInfo {
        name: "msd",
        kind: BackendKind::MassStorage,
        description: "DAPLink drag-and-drop over the mass-storage volume (method simple)",
    });

    #[cfg(any(feature = "jlink", feature = "stlink", feature = "probe-rs"))]
    backends.push(BackendInfo {
        name: "probe-rs",
        kind: BackendKind::ProbeLibrary,
        description: "CMSIS-DAP, J-Link and ST-LINK probes through probe-rs (method pyocd)",
    });

    #[cfg(feature = "jlink")]
    backends.push(BackendInfo {
        name: "jlink",
        kind: BackendKind::ProbeTool,
        description: "SEGGER J-Link through J-Link Commander (method jlink)",
    });

    #[cfg(feature = "stlink")]
    backends.push(BackendInfo {
        name: "stlink",
        kind: BackendKind::ProbeTool,
        description: "ST-LINK through st-flash (method stlink)",
    });

    backends
}

/// Description for a compiled-in back-end
#[allow(dead_code)]
fn describe(name: &str) -> &'static str {
    available_backends()
        .into_iter()
        .find(|b| b.name == name)
        .map(|b| b.description)
        .unwrap_or("")
}

/// Build the native back-end table and the enumerator that feeds it
#[allow(unused_mut, unused_variables, clippy::vec_init_then_push)]
pub fn native_backends(
    settings: &dapflash_core::Settings,
) -> (Vec<Backend>, Arc<dyn dapflash_core::Enumerator>) {
    let mut backends = Vec::new();
    let mut sources: Vec<Arc<dyn dapflash_core::Enumerator>> = Vec::new();

    #[cfg(feature = "msd")]
    {
        use dapflash_msd::{MsdFlasher, NativeHost, VolumeEnumerator};

        let host: Arc<dyn dapflash_core::HostIo> = Arc::new(NativeHost::new());
        let volumes: Arc<dyn dapflash_core::Enumerator> =
            Arc::new(VolumeEnumerator::new(host.clone()));
        sources.push(volumes.clone());
        backends.push(Backend::new(
            BackendKind::MassStorage,
            describe("msd"),
            Arc::new(MsdFlasher::new(host, volumes, settings.clone())),
        ));
    }

    #[cfg(any(feature = "jlink", feature = "stlink", feature = "probe-rs"))]
    {
        use dapflash_probe::{ProbeEnumerator, ProbeRsFlasher};

        let probes: Arc<dyn dapflash_core::Enumerator> =
            Arc::new(ProbeEnumerator::new(settings.clone()));
        sources.push(probes.clone());
        backends.push(Backend::new(
            BackendKind::ProbeLibrary,
            describe("probe-rs"),
            Arc::new(ProbeRsFlasher::new(probes.clone())),
        ));

        #[cfg(feature = "jlink")]
        backends.push(Backend::new(
            BackendKind::ProbeTool,
            describe("jlink"),
            Arc::new(dapflash_probe::JlinkFlasher::new(
                settings.clone(),
                probes.clone(),
            )),
        ));

        #[cfg(feature = "stlink")]
        backends.push(Backend::new(
            BackendKind::ProbeTool,
            describe("stlink"),
            Arc::new(dapflash_probe::StlinkFlasher::new(settings.clone(), probes)),
        ));
    }

    let enumerator = Arc::new(crate::enumerate::CompositeEnumerator::new(sources));
    (backends, enumerator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dapflash_core::{FirmwareImage, FlashOptions};

    /// Flasher that accepts one device type
    struct Fake {
        name: &'static str,
        methods: &'static [Method],
        device_type: DeviceType,
        installed: bool,
    }

    impl Flasher for Fake {
        fn name(&self) -> &'static str {
            self.name
        }

        fn methods(&self) -> &'static [Method] {
            self.methods
        }

        fn supported_targets(&self) -> Vec<String> {
            Vec::new()
        }

        fn available_devices(&self) -> Result<Vec<TargetRecord>> {
            Ok(Vec::new())
        }

        fn can_flash(&self, target: &TargetRecord) -> bool {
            target.device_type == self.device_type
        }

        fn is_executable_installed(&self) -> bool {
            self.installed
        }

        fn flash(
            &self,
            _image: &FirmwareImage,
            target: &TargetRecord,
            _method: Method,
            _options: &FlashOptions,
        ) -> Result<TargetRecord> {
            Ok(target.clone())
        }

        fn erase(&self, target: &TargetRecord, _options: &FlashOptions) -> Result<TargetRecord> {
            Ok(target.clone())
        }

        fn reset(&self, target: &TargetRecord) -> Result<TargetRecord> {
            Ok(target.clone())
        }
    }

    fn table(jlink_installed: bool) -> Vec<Backend> {
        vec![
            Backend::new(
                BackendKind::MassStorage,
                "",
                Arc::new(Fake {
                    name: "msd",
                    methods: &[Method::Simple],
                    device_type: DeviceType::Daplink,
                    installed: true,
                }),
            ),
            Backend::new(
                BackendKind::ProbeTool,
                "",
                Arc::new(Fake {
                    name: "jlink",
                    methods: &[Method::Jlink],
                    device_type: DeviceType::Jlink,
                    installed: jlink_installed,
                }),
            ),
        ]
    }

    fn kind(r: Result<&Backend>) -> ErrorKind {
        r.unwrap_err().kind
    }

    #[test]
    fn test_select_by_method() {
        let backends = table(true);
        let board = TargetRecord::daplink("0240AA", "K64F", "/mnt/a", None);
        assert_eq!(select(&backends, &board, Method::Simple).unwrap().info.name, "msd");

        let probe = TargetRecord::probe("683", DeviceType::Jlink, "NRF52_DK", "683");
        assert_eq!(select(&backends, &probe, Method::Jlink).unwrap().info.name, "jlink");
    }

    #[test]
    fn test_probe_method_without_probe() {
        let backends = table(true);
        let board = TargetRecord::daplink("Z", "K64F", "/mnt/z", None);
        assert_eq!(
            kind(select(&backends, &board, Method::Pyocd)),
            ErrorKind::CouldNotMapTargetIdToDevice
        );
    }

    #[test]
    fn test_implementation_missing() {
        let backends = table(false);
        let probe = TargetRecord::probe("683", DeviceType::Jlink, "NRF52_DK", "683");
        // no mount point
        assert_eq!(
            kind(select(&backends, &probe, Method::Simple)),
            ErrorKind::ImplementationMissing
        );
        // tool missing
        assert_eq!(
            kind(select(&backends, &probe, Method::Jlink)),
            ErrorKind::ImplementationMissing
        );
        // no back-end
        assert_eq!(
            kind(select(&backends, &probe, Method::Edbg)),
            ErrorKind::ImplementationMissing
        );
        // wrong device class
        let st = TargetRecord::probe("066D", DeviceType::Stlink, "NUCLEO_F401RE", "066D");
        assert_eq!(
            kind(select(&table(true), &st, Method::Jlink)),
            ErrorKind::ImplementationMissing
        );
    }

    #[test]
    fn test_default_method() {
        let board = TargetRecord::daplink("0240AA", "K64F", "/mnt/a", None);
        assert_eq!(default_method(&board), Method::Simple);
        let cmsis = TargetRecord::probe("0240AA", DeviceType::Daplink, "K64F", "0240AA");
        assert_eq!(default_method(&cmsis), Method::Pyocd);
        let st = TargetRecord::probe("066D", DeviceType::Stlink, "NUCLEO_F401RE", "066D");
        assert_eq!(default_method(&st), Method::Stlink);
    }
}
