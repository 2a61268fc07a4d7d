//! dapflash-probe - Debug probe back-ends
//!
//! - [`JlinkFlasher`]: SEGGER J-Link through J-Link Commander
//! - [`StlinkFlasher`]: ST-LINK through `st-flash`
//! - [`ProbeRsFlasher`]: any supported probe through the probe-rs library
//!   (the `pyocd` method, behind the `probe-rs` feature)
//! - [`ProbeEnumerator`]: finds probes on USB
//!
//! The subprocess back-ends share [`ToolRunner`], which enforces the flash
//! timeout and the terminate-then-kill shutdown.

pub mod chips;
pub mod error;
pub mod jlink;
pub mod library;
pub mod runner;
pub mod stlink;
pub mod usb;

pub use error::ProbeError;
pub use jlink::JlinkFlasher;
pub use library::ProbeRsFlasher;
pub use runner::{ToolOutput, ToolRunner};
pub use stlink::StlinkFlasher;
pub use usb::ProbeEnumerator;

use dapflash_core::{ErrorKind, FlashError, Method, TargetRecord};

/// Serial number of the probe attached to `target`
pub(crate) fn probe_serial(target: &TargetRecord) -> error::Result<&str> {
    target
        .probe_usb_id
        .as_deref()
        .ok_or_else(|| ProbeError::NoProbe(target.target_id.clone()))
}

/// Reject methods a back-end does not implement
pub(crate) fn require_method(
    backend: &str,
    methods: &[Method],
    method: Method,
) -> dapflash_core::Result<()> {
    if methods.contains(&method) {
        Ok(())
    } else {
        Err(FlashError::new(
            ErrorKind::ImplementationMissing,
            format!("The {} back-end does not implement method {}", backend, method),
        ))
    }
}
