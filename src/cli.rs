//! CLI argument parsing

use clap::{Args, Parser, Subcommand};
use dapflash_core::Method;
use std::path::PathBuf;

/// Parse a flash method name
fn parse_method(s: &str) -> Result<Method, String> {
    s.parse::<Method>().map_err(|e| e.message)
}

/// Help text for `--method`, listing every method name
fn method_help() -> String {
    let names: Vec<&str> = Method::ALL.iter().map(Method::as_str).collect();
    format!(
        "Flash method [possible values: {}] (default: chosen per target)",
        names.join(", ")
    )
}

#[derive(Parser, Debug)]
#[command(name = "dapflash")]
#[command(author, version, about = "Flash DAPLink and debug-probe boards", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub silent: bool,

    /// Configuration file (TOML)
    /// Defaults to ./dapflash.toml, then the user and system config directories
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Target selection shared by every device command
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Target id, a prefix of one, or "all" (repeatable)
    #[arg(long = "tid", visible_alias = "target_id", value_name = "TARGET_ID")]
    pub target_id: Vec<String>,

    #[arg(long, value_parser = parse_method, help = method_help())]
    pub method: Option<Method>,

    /// Do not reset the target afterwards
    #[arg(long)]
    pub no_reset: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List connected targets
    List,

    /// List compiled-in flash back-ends
    Flashers,

    /// Print the version
    Version,

    /// Program a firmware image
    Flash {
        /// Firmware image (.bin, .hex, .act or .cfg)
        #[arg(short, long)]
        input: PathBuf,

        /// Only flash targets of this platform
        #[arg(short = 't', long = "platform_name", value_name = "PLATFORM")]
        platform: Option<String>,

        #[command(flatten)]
        target: TargetArgs,
    },

    /// Mass-erase targets
    Erase {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// Reset targets
    Reset {
        #[command(flatten)]
        target: TargetArgs,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_command_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flash_args() {
        let cli = parse(&[
            "dapflash", "flash", "-i", "hello.bin", "-t", "K64F", "--tid", "0240", "--target_id",
            "0231", "--method", "simple", "--no-reset",
        ]);
        match cli.command {
            Commands::Flash {
                input,
                platform,
                target,
            } => {
                assert_eq!(input, PathBuf::from("hello.bin"));
                assert_eq!(platform.as_deref(), Some("K64F"));
                assert_eq!(target.target_id, ["0240", "0231"]);
                assert_eq!(target.method, Some(Method::Simple));
                assert!(target.no_reset);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_flash_requires_input() {
        assert!(Cli::try_parse_from(["dapflash", "flash", "--tid", "all"]).is_err());
    }

    #[test]
    fn test_unknown_method() {
        let err = Cli::try_parse_from(["dapflash", "reset", "--tid", "all", "--method", "dfu"])
            .unwrap_err();
        assert!(err.to_string().contains("Unknown method"));
    }

    #[test]
    fn test_global_flags() {
        let cli = parse(&["dapflash", "erase", "--tid", "all", "-vv"]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.silent);
        assert!(matches!(cli.command, Commands::Erase { .. }));

        let cli = parse(&["dapflash", "-s", "list"]);
        assert!(cli.silent);
        assert!(Cli::try_parse_from(["dapflash", "-s", "-v", "list"]).is_err());
    }
}
