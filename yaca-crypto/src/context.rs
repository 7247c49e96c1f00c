#![forbid(unsafe_code)]

//! Lifecycle shared by every streaming context.

use crate::error::{Error, Result};

/// Where a context is in its initialize / update / finalize life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Created; properties may still be changed.
    Initialized,
    /// At least one update succeeded.
    Updating,
    /// Finalize succeeded; only property reads remain valid.
    Finalized,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Lifecycle {
    phase: Phase,
}

impl Lifecycle {
    pub(crate) const fn new() -> Self {
        Self { phase: Phase::Initialized }
    }

    pub(crate) const fn phase(self) -> Phase {
        self.phase
    }

    pub(crate) fn check_update(self) -> Result<()> {
        match self.phase {
            Phase::Finalized => Err(Error::invalid("context already finalized")),
            _ => Ok(()),
        }
    }

    pub(crate) fn check_finalize(self) -> Result<()> {
        self.check_update()
    }

    /// Properties that shape the stream can only change before the first update.
    pub(crate) fn check_configurable(self) -> Result<()> {
        match self.phase {
            Phase::Initialized => Ok(()),
            Phase::Updating => Err(Error::invalid("property must be set before the first update")),
            Phase::Finalized => Err(Error::invalid("context already finalized")),
        }
    }

    pub(crate) fn updated(&mut self) {
        self.phase = Phase::Updating;
    }

    pub(crate) fn finalized(&mut self) {
        self.phase = Phase::Finalized;
    }
}
