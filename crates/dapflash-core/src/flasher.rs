//! Back-end flasher capability
//!
//! Every way of reaching a board (mass-storage copy, probe tool subprocess,
//! in-process probe library) implements [`Flasher`] with the same contract.

use crate::error::Result;
use crate::image::FirmwareImage;
use crate::state::StateTracker;
use crate::target::{Method, TargetRecord};

/// Per-operation options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlashOptions {
    /// Skip the reset that normally follows a flash or erase
    pub no_reset: bool,
}

/// A flashing back-end
pub trait Flasher: Send + Sync {
    /// Short back-end name
    fn name(&self) -> &'static str;

    /// Methods this back-end serves
    fn methods(&self) -> &'static [Method];

    /// Platform names this back-end knows how to program
    fn supported_targets(&self) -> Vec<String>;

    /// Targets this back-end can currently see
    fn available_devices(&self) -> Result<Vec<TargetRecord>>;

    /// Whether `target` has the endpoints this back-end needs
    fn can_flash(&self, target: &TargetRecord) -> bool;

    /// Whether the external tool or library this back-end drives is present
    fn is_executable_installed(&self) -> bool;

    /// Program `image` into `target`
    ///
    /// Returns the target as seen after the operation; endpoints may have
    /// changed.
    fn flash(
        &self,
        image: &FirmwareImage,
        target: &TargetRecord,
        method: Method,
        options: &FlashOptions,
    ) -> Result<TargetRecord>;

    /// Mass-erase `target`
    fn erase(&self, target: &TargetRecord, options: &FlashOptions) -> Result<TargetRecord>;

    /// Reset `target`
    fn reset(&self, target: &TargetRecord) -> Result<TargetRecord>;

    /// One flash attempt that reports its pipeline stages into `state`
    ///
    /// The tracker follows the target across attempts and is left in a
    /// non-terminal state; the caller settles it. Back-ends without stages
    /// of their own just call [`Flasher::flash`].
    fn flash_tracked(
        &self,
        image: &FirmwareImage,
        target: &TargetRecord,
        method: Method,
        options: &FlashOptions,
        _state: &mut StateTracker,
    ) -> Result<TargetRecord> {
        self.flash(image, target, method, options)
    }

    /// One erase attempt that reports its pipeline stages into `state`
    fn erase_tracked(
        &self,
        target: &TargetRecord,
        options: &FlashOptions,
        _state: &mut StateTracker,
    ) -> Result<TargetRecord> {
        self.erase(target, options)
    }
}
