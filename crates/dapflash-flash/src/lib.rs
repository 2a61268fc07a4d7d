//! dapflash-flash - Flash orchestration for dapflash
//!
//! This crate ties the back-ends together:
//!
//! - [`registry`]: the back-end table, compiled in per feature, and
//!   back-end selection per target
//! - [`enumerate`]: a composite enumerator merging volume and USB probe views
//! - [`orchestrator`]: selector resolution, per-target threads, retries and
//!   result aggregation
//!
//! # Features
//!
//! - `msd`: DAPLink drag-and-drop over the mass-storage volume
//! - `jlink`: SEGGER J-Link Commander
//! - `stlink`: `st-flash`
//! - `probe-rs`: in-process probe access through probe-rs

pub mod enumerate;
pub mod orchestrator;
pub mod registry;

pub use enumerate::CompositeEnumerator;
pub use orchestrator::{BatchOutcome, Operation, Orchestrator, Request, TargetOutcome};
pub use registry::{available_backends, default_method, Backend, BackendInfo, BackendKind};
