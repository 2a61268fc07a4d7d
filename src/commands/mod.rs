//! CLI command implementations
//!
//! The informational commands (`version`, `flashers`, `list`) live here;
//! the device commands (`flash`, `erase`, `reset`) are in [`device`].

pub mod device;
mod list;

pub use list::{list_flashers, list_targets};

/// Print the package version
pub fn print_version() {
    println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
}
