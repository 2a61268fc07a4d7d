//! dapflash - Flash DAPLink and debug-probe boards
//!
//! dapflash programs, erases and resets development boards. Boards running
//! DAPLink interface firmware are flashed by copying the image onto their
//! USB volume; boards behind a J-Link or ST-LINK probe are flashed through
//! the vendor tools, or in-process through probe-rs.
//!
//! Every failure maps to a stable exit code, so scripts can tell a
//! transient transfer error from a bad image or a missing board.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands, TargetArgs};
use dapflash_core::{ErrorKind, FlashOptions, Settings};
use dapflash_flash::{Orchestrator, Request};
use std::panic::{self, AssertUnwindSafe};
use std::process::ExitCode;

/// Orchestrator request for the shared target arguments
fn request_for(target: TargetArgs) -> Request {
    Request {
        selectors: target.target_id,
        platform: None,
        method: target.method,
        options: FlashOptions {
            no_reset: target.no_reset,
        },
    }
}

/// Run `command`, turning a panic into `unhandled_exception`
fn guarded(command: impl FnOnce() -> u8) -> u8 {
    match panic::catch_unwind(AssertUnwindSafe(command)) {
        Ok(code) => code,
        Err(_) => {
            log::error!("Unhandled exception, giving up");
            ErrorKind::UnhandledException.code()
        }
    }
}

fn run(command: Commands, settings: Settings, silent: bool) -> u8 {
    match command {
        Commands::Version => {
            commands::print_version();
            0
        }
        Commands::Flashers => {
            commands::list_flashers(&Orchestrator::native(settings));
            0
        }
        Commands::List => commands::list_targets(&Orchestrator::native(settings)),
        Commands::Flash {
            input,
            platform,
            target,
        } => {
            let request = Request {
                platform,
                ..request_for(target)
            };
            commands::device::run_flash(&Orchestrator::native(settings), &input, &request, silent)
        }
        Commands::Erase { target } => commands::device::run_erase(
            &Orchestrator::native(settings),
            &request_for(target),
            silent,
        ),
        Commands::Reset { target } => commands::device::run_reset(
            &Orchestrator::native(settings),
            &request_for(target),
            silent,
        ),
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(ErrorKind::MisuseCmd.code())
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Set log level based on verbosity
    match (cli.silent, cli.verbose) {
        (true, _) => log::set_max_level(log::LevelFilter::Error),
        (false, 0) => {} // default (info)
        (false, 1) => log::set_max_level(log::LevelFilter::Debug),
        (false, _) => log::set_max_level(log::LevelFilter::Trace),
    }

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(e.code());
        }
    };

    let silent = cli.silent;
    let code = guarded(|| run(cli.command, settings, silent));
    ExitCode::from(code)
}
