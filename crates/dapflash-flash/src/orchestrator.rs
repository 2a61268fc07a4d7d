//! Flash orchestration
//!
//! The [`Orchestrator`] resolves target selectors against the enumerator,
//! picks a back-end for every resolved target, and runs each target's
//! pipeline on its own thread under the retry policy. Results come back
//! over a channel and are reported per target. A panic on one target's
//! thread becomes that target's `unhandled_exception` outcome.

use crate::registry::{self, Backend};
use dapflash_core::retry::RetryPolicy;
use dapflash_core::state::{FlashState, StateTracker};
use dapflash_core::{
    selector, Enumerator, ErrorKind, FirmwareImage, FlashError, FlashOptions, Method, Result,
    Settings, TargetRecord,
};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{mpsc, Arc};
use std::thread;

/// What to do to each target
#[derive(Debug, Clone, Copy)]
pub enum Operation<'a> {
    /// Program an image
    Flash(&'a FirmwareImage),
    /// Mass-erase
    Erase,
    /// Reset and run
    Reset,
}

impl Operation<'_> {
    fn verb(&self) -> &'static str {
        match self {
            Self::Flash(_) => "flash",
            Self::Erase => "erase",
            Self::Reset => "reset",
        }
    }
}

/// Which targets, and how
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Target id selectors: full ids, prefixes or `all`
    pub selectors: Vec<String>,
    /// Only consider targets of this platform
    pub platform: Option<String>,
    /// Method to use; chosen per target when absent
    pub method: Option<Method>,
    /// Per-operation options
    pub options: FlashOptions,
}

impl Request {
    /// Request for the given selectors with every other field defaulted
    pub fn new<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selectors: selectors.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// Result for one target
#[derive(Debug)]
pub struct TargetOutcome {
    /// Target id as resolved
    pub target_id: String,
    /// Back-end that ran the operation, if one was selected
    pub backend: Option<&'static str>,
    /// Refreshed record on success
    pub result: Result<TargetRecord>,
    /// Attempts made
    pub attempts: u32,
    /// Pipeline states entered across every attempt
    pub states: Vec<FlashState>,
}

impl TargetOutcome {
    /// Outcome for a target that failed before any attempt was made
    fn rejected(mut state: StateTracker, target: &TargetRecord, error: FlashError) -> Self {
        log::error!("{}: {}", target.target_id, error.message);
        state.settle::<()>(&Err(error.clone()), false);
        Self {
            target_id: target.target_id.clone(),
            backend: None,
            result: Err(error),
            attempts: 0,
            states: state.history().to_vec(),
        }
    }

    /// Outcome for a target whose thread panicked
    fn panicked(target: &TargetRecord, payload: Box<dyn Any + Send>) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        log::error!("{}: unhandled exception: {}", target.target_id, detail);
        Self {
            target_id: target.target_id.clone(),
            backend: None,
            result: Err(FlashError::new(
                ErrorKind::UnhandledException,
                format!("Unhandled exception while handling {}: {}", target.target_id, detail),
            )),
            attempts: 0,
            states: Vec::new(),
        }
    }

    /// Exit code for this target
    pub fn code(&self) -> u8 {
        match &self.result {
            Ok(_) => ErrorKind::Success.code(),
            Err(e) => e.code(),
        }
    }
}

/// Results for every resolved target, sorted by target id
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// One entry per target
    pub outcomes: Vec<TargetOutcome>,
}

impl BatchOutcome {
    /// Highest exit code across targets, 0 when all succeeded
    pub fn exit_code(&self) -> u8 {
        self.outcomes
            .iter()
            .map(TargetOutcome::code)
            .max()
            .unwrap_or(0)
    }

    /// Whether every target succeeded
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }
}

/// Drives operations across targets
pub struct Orchestrator {
    backends: Vec<Backend>,
    enumerator: Arc<dyn Enumerator>,
    settings: Settings,
}

impl Orchestrator {
    /// Orchestrator over an explicit back-end table
    pub fn new(backends: Vec<Backend>, enumerator: Arc<dyn Enumerator>, settings: Settings) -> Self {
        Self {
            backends,
            enumerator,
            settings,
        }
    }

    /// Orchestrator over the back-ends compiled into this build
    pub fn native(settings: Settings) -> Self {
        let (backends, enumerator) = registry::native_backends(&settings);
        Self::new(backends, enumerator, settings)
    }

    /// The back-end table
    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    /// Every target the enumerator currently sees
    pub fn list(&self) -> Result<Vec<TargetRecord>> {
        self.enumerator.list_devices()
    }

    /// Program the image at `image_path` onto every selected target
    ///
    /// The image is checked before any device is touched.
    pub fn flash(&self, image_path: &Path, request: &Request) -> Result<BatchOutcome> {
        let image = FirmwareImage::open(image_path)?;
        log::info!(
            "Image {}: {} bytes, sha256 {}",
            image.path().display(),
            image.size(),
            image.digest()
        );
        self.run_batch(Operation::Flash(&image), request)
    }

    /// Erase every selected target
    pub fn erase(&self, request: &Request) -> Result<BatchOutcome> {
        self.run_batch(Operation::Erase, request)
    }

    /// Reset every selected target
    pub fn reset(&self, request: &Request) -> Result<BatchOutcome> {
        self.run_batch(Operation::Reset, request)
    }

    /// Resolve the request and run `operation` on each target concurrently
    ///
    /// Resolution failures fail the whole batch. Failures after that are
    /// reported per target and never affect the other targets.
    pub fn run_batch(&self, operation: Operation<'_>, request: &Request) -> Result<BatchOutcome> {
        let devices = self.enumerator.list_devices()?;
        log::debug!("Enumerated {} device(s)", devices.len());
        let targets = selector::resolve(&request.selectors, request.platform.as_deref(), &devices)?;

        let (tx, rx) = mpsc::channel();
        thread::scope(|s| {
            for target in &targets {
                let tx = tx.clone();
                s.spawn(move || {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        self.run_target(operation, target, request)
                    }))
                    .unwrap_or_else(|payload| TargetOutcome::panicked(target, payload));
                    // The receiver outlives every sender in this scope
                    let _ = tx.send(outcome);
                });
            }
        });
        drop(tx);

        let mut outcomes: Vec<TargetOutcome> = rx.into_iter().collect();
        outcomes.sort_by(|a, b| a.target_id.cmp(&b.target_id));
        Ok(BatchOutcome { outcomes })
    }

    fn run_target(
        &self,
        operation: Operation<'_>,
        target: &TargetRecord,
        request: &Request,
    ) -> TargetOutcome {
        let mut state = StateTracker::new(target.target_id.as_str());
        if let Err(e) = target.validate() {
            return TargetOutcome::rejected(state, target, e);
        }

        let method = request
            .method
            .unwrap_or_else(|| registry::default_method(target));

        let backend = match registry::select(&self.backends, target, method) {
            Ok(backend) => backend,
            Err(e) => return TargetOutcome::rejected(state, target, e),
        };

        let policy = match operation {
            Operation::Reset => RetryPolicy::once(),
            Operation::Flash(_) | Operation::Erase => self.settings.retry_policy(),
        };
        let flasher = backend.flasher.as_ref();

        let report = policy.run(|attempt| {
            state.begin_attempt();
            log::info!(
                "{}: {} attempt {}/{} ({} via {})",
                target.target_id,
                operation.verb(),
                attempt,
                policy.max_attempts(),
                method,
                backend.info.name
            );
            let result = match operation {
                Operation::Flash(image) => {
                    flasher.flash_tracked(image, target, method, &request.options, &mut state)
                }
                Operation::Erase => flasher.erase_tracked(target, &request.options, &mut state),
                Operation::Reset => flasher.reset(target),
            };
            let retry = result
                .as_ref()
                .err()
                .is_some_and(|e| policy.will_retry(attempt, e.kind));
            state.settle(&result, retry);
            result
        });

        let attempts = report.attempt_count();
        match &report.result {
            Ok(record) => {
                debug_assert_eq!(record.target_id, target.target_id);
                log::info!("{}: {} done", target.target_id, operation.verb());
            }
            Err(e) => log::error!(
                "{}: {} failed after {} attempt(s): {}",
                target.target_id,
                operation.verb(),
                attempts,
                e
            ),
        }

        TargetOutcome {
            target_id: target.target_id.clone(),
            backend: Some(backend.info.name),
            result: report.result,
            attempts,
            states: state.history().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::BackendKind;
    use dapflash_core::enumerate::StaticEnumerator;
    use dapflash_core::{DeviceType, Flasher, HostIo};
    use dapflash_dummy::{Behavior, BoardConfig, SimulatedHost};
    use dapflash_msd::MsdFlasher;
    use std::fs;
    use std::path::PathBuf;

    struct Bench {
        dir: tempfile::TempDir,
        host: Arc<SimulatedHost>,
        orchestrator: Orchestrator,
    }

    impl Bench {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let host = Arc::new(SimulatedHost::new(dir.path().join("media")));
            let io: Arc<dyn HostIo> = host.clone();
            let enumerator: Arc<dyn Enumerator> = host.clone();
            let flasher = MsdFlasher::new(io, enumerator.clone(), Settings::fast());
            let backends = vec![Backend::new(
                BackendKind::MassStorage,
                "simulated",
                Arc::new(flasher),
            )];
            let orchestrator = Orchestrator::new(backends, enumerator, Settings::fast());
            Self {
                dir,
                host,
                orchestrator,
            }
        }

        fn board(&self, target_id: &str) -> PathBuf {
            self.host
                .add_board(BoardConfig::new(target_id, "K64F"))
                .unwrap()
        }

        fn board_with(&self, config: BoardConfig) -> PathBuf {
            self.host.add_board(config).unwrap()
        }

        fn image(&self) -> PathBuf {
            let path = self.dir.path().join("hello.bin");
            fs::write(&path, [0xA5u8; 128]).unwrap();
            path
        }
    }

    fn request(selector: &str) -> Request {
        Request {
            platform: Some("K64F".into()),
            ..Request::new([selector])
        }
    }

    #[test]
    fn test_flash_success() {
        let bench = Bench::new();
        let mount = bench.board("0240000032044E45");
        let image = bench.image();

        let batch = bench
            .orchestrator
            .flash(&image, &request("0240000032044E45"))
            .unwrap();
        assert_eq!(batch.exit_code(), 0);
        assert!(batch.is_success());
        assert_eq!(batch.outcomes[0].attempts, 1);
        assert_eq!(batch.outcomes[0].backend, Some("msd"));
        assert!(!mount.join("hello.bin").exists());

        let stats = bench.host.stats("0240000032044E45").unwrap();
        assert_eq!(stats.copies, 1);
        assert_eq!(stats.resets, 1);
        assert_eq!(stats.image.as_deref(), Some(&[0xA5u8; 128][..]));
    }

    #[test]
    fn test_flash_follows_remount() {
        let bench = Bench::new();
        let old = bench.board("0240000032044E45");
        bench
            .host
            .script("0240000032044E45", [Behavior::Remount]);

        let batch = bench
            .orchestrator
            .flash(&bench.image(), &request("0240"))
            .unwrap();
        assert_eq!(batch.exit_code(), 0);
        let record = batch.outcomes[0].result.as_ref().unwrap();
        assert_eq!(record.target_id, "0240000032044E45");
        assert_ne!(record.mount_point.as_deref(), Some(old.as_path()));
        assert_eq!(record.serial_port.as_deref(), Some("/dev/ttyACM1"));
        assert_eq!(bench.host.stats("0240000032044E45").unwrap().resets, 1);
    }

    #[test]
    fn test_user_error_is_not_retried() {
        let bench = Bench::new();
        bench.board("0240000032044E45");
        bench.host.script(
            "0240000032044E45",
            [Behavior::Fail("ERROR: The transfer timed out.\n".into())],
        );

        let batch = bench
            .orchestrator
            .flash(&bench.image(), &request("0240000032044E45"))
            .unwrap();
        assert_eq!(batch.exit_code(), 102);
        assert_eq!(batch.outcomes[0].attempts, 1);
        assert_eq!(bench.host.stats("0240000032044E45").unwrap().copies, 1);
    }

    #[test]
    fn test_transient_error_is_retried() {
        let bench = Bench::new();
        bench.board("0240000032044E45");
        let transient = "ERROR: An error occurred during the transfer\n";
        bench.host.script(
            "0240000032044E45",
            [
                Behavior::Fail(transient.into()),
                Behavior::Fail(transient.into()),
            ],
        );

        let batch = bench
            .orchestrator
            .flash(&bench.image(), &request("0240000032044E45"))
            .unwrap();
        assert_eq!(batch.exit_code(), 0);
        assert_eq!(batch.outcomes[0].attempts, 3);
        assert_eq!(bench.host.stats("0240000032044E45").unwrap().copies, 3);
    }

    #[test]
    fn test_missing_image_touches_nothing() {
        let bench = Bench::new();
        bench.board("0240000032044E45");

        let err = bench
            .orchestrator
            .flash(
                &bench.dir.path().join("missing.bin"),
                &request("0240000032044E45"),
            )
            .unwrap_err();
        assert_eq!(err.code(), 24);
        assert_eq!(bench.host.stats("0240000032044E45").unwrap().copies, 0);
    }

    #[test]
    fn test_probe_method_without_probe() {
        let bench = Bench::new();
        bench.board("Z");

        let req = Request {
            method: Some(Method::Pyocd),
            ..Request::new(["Z"])
        };
        let batch = bench.orchestrator.flash(&bench.image(), &req).unwrap();
        assert_eq!(batch.exit_code(), 21);
        assert_eq!(batch.outcomes[0].backend, None);
        assert_eq!(batch.outcomes[0].attempts, 0);
    }

    #[test]
    fn test_reset_without_devices() {
        let bench = Bench::new();
        let err = bench.orchestrator.reset(&Request::new(["all"])).unwrap_err();
        assert_eq!(err.code(), 28);
        assert!(err.message.contains("Could not find any connected device"));
    }

    #[test]
    fn test_erase_through_volume() {
        let bench = Bench::new();
        bench.board("0240000032044E45");

        let batch = bench.orchestrator.erase(&Request::new(["all"])).unwrap();
        assert_eq!(batch.exit_code(), 0);
        assert_eq!(bench.host.stats("0240000032044E45").unwrap().erases, 1);
    }

    #[test]
    fn test_batch_reports_highest_code() {
        let bench = Bench::new();
        bench.board("0240000032044E45");
        bench.board("0231000032044E45");
        bench.host.script(
            "0231000032044E45",
            [Behavior::Fail("ERROR: The flash algorithm can not be found\n".into())],
        );

        let batch = bench
            .orchestrator
            .flash(&bench.image(), &Request::new(["all"]))
            .unwrap();
        assert_eq!(batch.outcomes.len(), 2);
        assert_eq!(batch.outcomes[0].target_id, "0231000032044E45");
        assert_eq!(batch.outcomes[0].code(), 104);
        assert!(batch.outcomes[1].result.is_ok());
        assert_eq!(batch.exit_code(), 104);
        assert!(!batch.is_success());
    }

    #[test]
    fn test_incompatible_target_does_not_stop_others() {
        let board = TargetRecord::daplink("0240AA", "K64F", "/nonexistent/a", None);
        let probe = TargetRecord::probe("683", DeviceType::Jlink, "NRF52_DK", "683");
        let enumerator: Arc<dyn Enumerator> =
            Arc::new(StaticEnumerator::new(vec![board, probe]));
        let orchestrator = Orchestrator::new(Vec::new(), enumerator, Settings::fast());

        let batch = orchestrator.reset(&Request::new(["all"])).unwrap();
        assert_eq!(batch.outcomes.len(), 2);
        assert!(batch.outcomes.iter().all(|o| o.code() == 10));
    }

    #[test]
    fn test_states_follow_target_across_attempts() {
        use FlashState::*;

        let bench = Bench::new();
        bench.board("0240000032044E45");
        let transient = "ERROR: An error occurred during the transfer\n";
        bench.host.script(
            "0240000032044E45",
            [
                Behavior::Fail(transient.into()),
                Behavior::Fail(transient.into()),
            ],
        );

        let batch = bench
            .orchestrator
            .flash(&bench.image(), &request("0240000032044E45"))
            .unwrap();
        let attempt = [Selected, Copying, AwaitingRemount, Resetting, Verifying];
        let mut expected = Vec::new();
        for _ in 0..2 {
            expected.extend(attempt);
            expected.push(Retrying);
        }
        expected.extend(attempt);
        expected.push(Success);
        assert_eq!(batch.outcomes[0].states, expected);
    }

    #[test]
    fn test_final_failure_state() {
        let bench = Bench::new();
        bench.board("0240000032044E45");
        bench.host.script(
            "0240000032044E45",
            [Behavior::Fail("ERROR: The transfer timed out.\n".into())],
        );

        let batch = bench
            .orchestrator
            .flash(&bench.image(), &request("0240000032044E45"))
            .unwrap();
        assert_eq!(batch.outcomes[0].states.last(), Some(&FlashState::Failed));
        assert!(!batch.outcomes[0].states.contains(&FlashState::Retrying));
    }

    #[test]
    fn test_stuck_file_reports_still_present() {
        let bench = Bench::new();
        bench.board("0240000032044E45");
        bench.host.script("0240000032044E45", [Behavior::Stuck]);

        let batch = bench
            .orchestrator
            .flash(&bench.image(), &request("0240000032044E45"))
            .unwrap();
        assert_eq!(batch.exit_code(), 51);
        assert_eq!(batch.outcomes[0].attempts, 1);
        assert_eq!(
            batch.outcomes[0].states.last(),
            Some(&FlashState::Failed)
        );
        assert_eq!(bench.host.stats("0240000032044E45").unwrap().resets, 0);
    }

    #[test]
    fn test_busy_serial_port_still_flashes() {
        let bench = Bench::new();
        bench.board_with(BoardConfig {
            busy_port: true,
            ..BoardConfig::new("0240000032044E45", "K64F")
        });

        let batch = bench
            .orchestrator
            .flash(&bench.image(), &request("0240000032044E45"))
            .unwrap();
        assert_eq!(batch.exit_code(), 0);
        let stats = bench.host.stats("0240000032044E45").unwrap();
        assert_eq!(stats.copies, 1);
        assert_eq!(stats.resets, 0);
    }

    #[test]
    fn test_board_without_serial_port() {
        let bench = Bench::new();
        bench.board_with(BoardConfig {
            serial: false,
            ..BoardConfig::new("0240000032044E45", "K64F")
        });

        let batch = bench
            .orchestrator
            .flash(&bench.image(), &request("0240000032044E45"))
            .unwrap();
        assert_eq!(batch.exit_code(), 0);
        let record = batch.outcomes[0].result.as_ref().unwrap();
        assert_eq!(record.serial_port, None);
        assert_eq!(bench.host.stats("0240000032044E45").unwrap().resets, 0);
    }

    #[test]
    fn test_erase_without_automation() {
        let bench = Bench::new();
        bench.board_with(BoardConfig {
            automation_allowed: false,
            ..BoardConfig::new("0240000032044E45", "K64F")
        });

        let batch = bench.orchestrator.erase(&Request::new(["all"])).unwrap();
        assert_eq!(batch.exit_code(), 25);
        assert_eq!(batch.outcomes[0].attempts, 1);
        let stats = bench.host.stats("0240000032044E45").unwrap();
        assert_eq!(stats.copies, 0);
        assert_eq!(stats.erases, 0);
    }

    #[test]
    fn test_record_without_endpoints_is_rejected() {
        let mut bare = TargetRecord::daplink("0240AA", "K64F", "/nonexistent/a", None);
        bare.mount_point = None;
        let enumerator: Arc<dyn Enumerator> = Arc::new(StaticEnumerator::new(vec![bare]));
        let orchestrator = Orchestrator::new(Vec::new(), enumerator, Settings::fast());

        let batch = orchestrator.reset(&Request::new(["0240AA"])).unwrap();
        assert_eq!(batch.exit_code(), 20);
        assert_eq!(batch.outcomes[0].attempts, 0);
        assert_eq!(
            batch.outcomes[0].states,
            [FlashState::Selected, FlashState::Failed]
        );
    }

    /// Back-end that panics on reset for one target id
    struct Exploding;

    impl Flasher for Exploding {
        fn name(&self) -> &'static str {
            "exploding"
        }

        fn methods(&self) -> &'static [Method] {
            &[Method::Simple]
        }

        fn supported_targets(&self) -> Vec<String> {
            Vec::new()
        }

        fn available_devices(&self) -> Result<Vec<TargetRecord>> {
            Ok(Vec::new())
        }

        fn can_flash(&self, _target: &TargetRecord) -> bool {
            true
        }

        fn is_executable_installed(&self) -> bool {
            true
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
            if target.target_id == "0666BB" {
                panic!("lost the board");
            }
            Ok(target.clone())
        }
    }

    #[test]
    fn test_panic_becomes_unhandled_exception() {
        let good = TargetRecord::daplink("0240AA", "K64F", "/nonexistent/a", None);
        let bad = TargetRecord::daplink("0666BB", "K64F", "/nonexistent/b", None);
        let enumerator: Arc<dyn Enumerator> = Arc::new(StaticEnumerator::new(vec![good, bad]));
        let backends = vec![Backend::new(
            BackendKind::MassStorage,
            "panics on reset",
            Arc::new(Exploding),
        )];
        let orchestrator = Orchestrator::new(backends, enumerator, Settings::fast());

        let batch = orchestrator.reset(&Request::new(["all"])).unwrap();
        assert_eq!(batch.outcomes.len(), 2);
        assert!(batch.outcomes[0].result.is_ok());
        let err = batch.outcomes[1].result.as_ref().unwrap_err();
        assert_eq!(err.kind, ErrorKind::UnhandledException);
        assert!(err.message.contains("lost the board"));
        assert_eq!(batch.exit_code(), 1);
    }
}
