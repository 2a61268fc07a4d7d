//! Device commands: flash, erase and reset
//!
//! Each command runs one orchestrator batch behind a spinner and prints a
//! line per target. The exit code is the highest code across targets, or
//! the code of the error that stopped the batch before any target ran.

use dapflash_core::{FlashError, Result};
use dapflash_flash::{BatchOutcome, Orchestrator, Request, TargetOutcome};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

/// Create the spinner style used while a batch runs
fn create_spinner_style() -> std::result::Result<ProgressStyle, Box<dyn std::error::Error>> {
    Ok(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?)
}

fn spinner(message: String, silent: bool) -> ProgressBar {
    if silent {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(create_spinner_style().unwrap_or_else(|_| ProgressStyle::default_spinner()));
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Program `input` onto the selected targets
pub fn run_flash(orchestrator: &Orchestrator, input: &Path, request: &Request, silent: bool) -> u8 {
    let pb = spinner(format!("Flashing {}", input.display()), silent);
    let result = orchestrator.flash(input, request);
    pb.finish_and_clear();
    report("Flashed", result)
}

/// Erase the selected targets
pub fn run_erase(orchestrator: &Orchestrator, request: &Request, silent: bool) -> u8 {
    let pb = spinner("Erasing".to_string(), silent);
    let result = orchestrator.erase(request);
    pb.finish_and_clear();
    report("Erased", result)
}

/// Reset the selected targets
pub fn run_reset(orchestrator: &Orchestrator, request: &Request, silent: bool) -> u8 {
    let pb = spinner("Resetting".to_string(), silent);
    let result = orchestrator.reset(request);
    pb.finish_and_clear();
    report("Reset", result)
}

/// Print the outcome of a batch and return the exit code
fn report(done: &str, result: Result<BatchOutcome>) -> u8 {
    match result {
        Ok(batch) => {
            for outcome in &batch.outcomes {
                for line in outcome_lines(done, outcome) {
                    println!("{}", line);
                }
            }
            batch.exit_code()
        }
        Err(e) => {
            for line in error_lines(&e) {
                println!("{}", line);
            }
            e.code()
        }
    }
}

fn outcome_lines(done: &str, outcome: &TargetOutcome) -> Vec<String> {
    match &outcome.result {
        Ok(record) => {
            let attempts = if outcome.attempts > 1 {
                format!(" after {} attempts", outcome.attempts)
            } else {
                String::new()
            };
            vec![format!("{}: {} {}{}", outcome.target_id, done, record, attempts)]
        }
        Err(e) => {
            let mut lines = vec![format!(
                "{}: error {} ({})",
                outcome.target_id,
                e.code(),
                e.kind.description()
            )];
            lines.extend(error_lines(e).into_iter().skip(1).map(|l| format!("  {}", l)));
            lines
        }
    }
}

/// Summary line, then the detail message, then the device's own text
fn error_lines(e: &FlashError) -> Vec<String> {
    let mut lines = vec![e.kind.description().to_string()];
    if e.message != e.kind.description() {
        lines.push(e.message.clone());
    }
    if let Some(device) = &e.device_message {
        lines.push(format!("Device says: {}", device.trim()));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use dapflash_core::enumerate::StaticEnumerator;
    use dapflash_core::{ErrorKind, Settings, TargetRecord};
    use std::sync::Arc;

    fn orchestrator(targets: Vec<TargetRecord>) -> Orchestrator {
        Orchestrator::new(
            Vec::new(),
            Arc::new(StaticEnumerator::new(targets)),
            Settings::fast(),
        )
    }

    #[test]
    fn test_no_devices() {
        let code = run_reset(&orchestrator(Vec::new()), &Request::new(["all"]), true);
        assert_eq!(code, 28);

        let err = FlashError::new(ErrorKind::DevicesMissing, "Could not find any connected device");
        assert_eq!(error_lines(&err), ["Could not find any connected device"]);
    }

    #[test]
    fn test_missing_image() {
        let board = TargetRecord::daplink("0240AA", "K64F", "/mnt/a", None);
        let code = run_flash(
            &orchestrator(vec![board]),
            Path::new("/nonexistent/missing.bin"),
            &Request::new(["0240AA"]),
            true,
        );
        assert_eq!(code, 24);
    }

    #[test]
    fn test_backend_missing() {
        let board = TargetRecord::daplink("0240AA", "K64F", "/mnt/a", None);
        let code = run_erase(&orchestrator(vec![board]), &Request::new(["0240"]), true);
        assert_eq!(code, 10);
    }

    #[test]
    fn test_failure_lines() {
        let outcome = TargetOutcome {
            target_id: "0240AA".into(),
            backend: Some("msd"),
            result: Err(FlashError::new(
                ErrorKind::DaplinkUserError,
                "The transfer timed out.",
            )
            .with_device_message("error: The transfer timed out.\n")),
            attempts: 1,
            states: Vec::new(),
        };
        let lines = outcome_lines("Flashed", &outcome);
        assert_eq!(lines[0], "0240AA: error 102 (DAPLink user error)");
        assert_eq!(lines[1], "  The transfer timed out.");
        assert_eq!(lines[2], "  Device says: error: The transfer timed out.");
    }

    #[test]
    fn test_success_line() {
        let board = TargetRecord::daplink("0240AA", "K64F", "/mnt/a", None);
        let outcome = TargetOutcome {
            target_id: "0240AA".into(),
            backend: Some("msd"),
            result: Ok(board),
            attempts: 3,
            states: Vec::new(),
        };
        assert_eq!(
            outcome_lines("Flashed", &outcome),
            ["0240AA: Flashed 0240AA (K64F, /mnt/a) after 3 attempts"]
        );
    }
}
