//! dapflash-msd - Mass-storage flashing for DAPLink boards
//!
//! DAPLink interface firmware exposes a FAT volume. Copying a firmware image
//! onto it programs the target MCU, after which the volume is remounted and a
//! `FAIL.TXT` (or, on MPS2 boards, a `LOG.TXT`) reports the outcome.
//!
//! This crate implements that path on top of the [`HostIo`] seam from
//! `dapflash-core`:
//! - [`MsdFlasher`]: the back-end, one attempt per call
//! - [`MountVerifier`]: follows a board across remounts by its target id
//! - [`PostFlashVerifier`]: reads the status files
//! - [`VolumeEnumerator`]: finds boards by their `DETAILS.TXT`
//!
//! [`HostIo`]: dapflash_core::HostIo

pub mod enumerator;
pub mod error;
pub mod flasher;
pub mod host;
pub mod mount;
pub mod verify;
pub mod volume;

pub use enumerator::VolumeEnumerator;
pub use error::MsdError;
pub use flasher::MsdFlasher;
pub use host::NativeHost;
pub use mount::MountVerifier;
pub use verify::PostFlashVerifier;
