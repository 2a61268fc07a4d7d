//! Per-target pipeline states
//!
//! One [`StateTracker`] follows a target across every attempt of an
//! operation, so a retried flash reads as one history:
//! `selected -> ... -> retrying -> selected -> ... -> success`.

use crate::error::Result;
use std::fmt;

/// Where a single target's flash currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlashState {
    /// Target refreshed, destination computed
    Selected,
    /// Image bytes are being written to the volume
    Copying,
    /// Waiting for the firmware to consume the file and remount
    AwaitingRemount,
    /// Serial break in progress
    Resetting,
    /// Reading the status file
    Verifying,
    /// Operation done, no failure reported
    Success,
    /// Attempt failed with a retryable kind and budget remains
    Retrying,
    /// Operation failed for good
    Failed,
}

impl FlashState {
    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition(self, next: FlashState) -> bool {
        use FlashState::*;
        match (self, next) {
            (_, Failed) => !matches!(self, Success | Failed),
            (_, Retrying) => !matches!(self, Success | Failed | Retrying),
            (Selected, Copying) => true,
            (Copying, AwaitingRemount) => true,
            (AwaitingRemount, Resetting) | (AwaitingRemount, Verifying) => true,
            (Resetting, Verifying) => true,
            (Verifying, Success) => true,
            (Retrying, Selected) => true,
            _ => false,
        }
    }

    /// Whether the pipeline stops here
    pub fn is_terminal(self) -> bool {
        matches!(self, FlashState::Success | FlashState::Failed)
    }
}

impl fmt::Display for FlashState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Selected => "selected",
            Self::Copying => "copying",
            Self::AwaitingRemount => "awaiting_remount",
            Self::Resetting => "resetting",
            Self::Verifying => "verifying",
            Self::Success => "success",
            Self::Retrying => "retrying",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Tracks and logs the state of one target's pipeline
#[derive(Debug)]
pub struct StateTracker {
    target_id: String,
    state: FlashState,
    history: Vec<FlashState>,
}

impl StateTracker {
    /// Start in [`FlashState::Selected`]
    pub fn new(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            state: FlashState::Selected,
            history: vec![FlashState::Selected],
        }
    }

    /// Current state
    pub fn state(&self) -> FlashState {
        self.state
    }

    /// Every state entered, in order
    pub fn history(&self) -> &[FlashState] {
        &self.history
    }

    /// Move to `next`
    ///
    /// Panics on an illegal transition; that is a bug in the pipeline, not a
    /// runtime condition.
    pub fn advance(&mut self, next: FlashState) {
        assert!(
            self.state.can_transition(next),
            "illegal transition {} -> {} for {}",
            self.state,
            next,
            self.target_id
        );
        log::debug!("{}: {} -> {}", self.target_id, self.state, next);
        self.state = next;
        self.history.push(next);
    }

    /// Start an attempt, coming back to [`FlashState::Selected`] after a retry
    pub fn begin_attempt(&mut self) {
        if self.state == FlashState::Retrying {
            self.advance(FlashState::Selected);
        }
    }

    /// Record how an attempt ended
    ///
    /// A success only completes the pipeline from [`FlashState::Verifying`];
    /// back-ends that do not report intermediate states stay where they are.
    /// A failure moves to [`FlashState::Retrying`] when another attempt will
    /// follow, otherwise to [`FlashState::Failed`].
    pub fn settle<T>(&mut self, result: &Result<T>, will_retry: bool) {
        match result {
            Ok(_) if self.state.can_transition(FlashState::Success) => {
                self.advance(FlashState::Success)
            }
            Ok(_) => {}
            Err(_) if will_retry => self.advance(FlashState::Retrying),
            Err(_) => self.advance(FlashState::Failed),
        }
    }
}
