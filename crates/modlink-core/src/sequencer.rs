//! # Ordering Sequencer
//!
//! Top-level units have no declared relationship to each other, yet must run
//! in registration order. The sequencer gives each one a synthetic
//! identifier and remembers the previous one, which the context then injects
//! as an extra dependency of the next.

use crate::types::Identifier;

/// Assigns synthetic identifiers and tracks the previous top-level unit.
#[derive(Debug, Default)]
pub struct Sequencer {
    issued: u64,
    previous: Option<Identifier>,
}

/// One sequenced top-level registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequenced {
    /// Synthetic identifier of the new unit.
    pub id: Identifier,
    /// The unit it must wait for, if any.
    pub after: Option<Identifier>,
}

impl Sequencer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence the next top-level unit.
    pub fn next_unit(&mut self) -> Sequenced {
        self.issued = self.issued.saturating_add(1);
        let id = Identifier::synthetic(self.issued);
        let after = self.previous.replace(id.clone());
        Sequenced { id, after }
    }

    /// Identifier of the most recently sequenced unit.
    #[must_use]
    pub fn previous(&self) -> Option<&Identifier> {
        self.previous.as_ref()
    }

    /// Number of top-level units sequenced so far.
    #[must_use]
    pub fn issued(&self) -> u64 {
        self.issued
    }
}
