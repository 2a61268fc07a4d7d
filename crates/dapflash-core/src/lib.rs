//! dapflash-core - types and policies shared by every dapflash crate
//!
//! This crate holds the pieces of the flash pipeline that do not touch
//! hardware:
//!
//! - [`error`]: the closed error taxonomy and its exit codes
//! - [`target`]: target records and flash methods
//! - [`image`]: validated firmware image references
//! - [`classify`] and [`status`]: interpretation of DAPLink status files
//! - [`retry`]: the retry engine
//! - [`selector`]: target id selector resolution
//! - [`state`]: the per-target pipeline state machine
//! - [`config`]: tunable settings
//! - [`flasher`], [`host`], [`enumerate`]: the seams back-ends plug into

pub mod classify;
pub mod config;
pub mod enumerate;
pub mod error;
pub mod flasher;
pub mod host;
pub mod image;
pub mod platform;
pub mod retry;
pub mod selector;
pub mod state;
pub mod status;
pub mod target;

pub use config::Settings;
pub use enumerate::Enumerator;
pub use error::{ErrorKind, FlashError, Result};
pub use flasher::{FlashOptions, Flasher};
pub use host::{HostIo, MountEntry};
pub use image::FirmwareImage;
pub use target::{DeviceType, Method, TargetRecord};
