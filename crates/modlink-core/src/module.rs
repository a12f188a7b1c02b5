//! # Module Record
//!
//! The resolution state of one uniquely identified unit of code.
//!
//! A module is created by the [`Registry`](crate::Registry) on first
//! reference, accumulates waiting dependents, and becomes terminal
//! (resolved or failed) exactly once. The protocol that drives it lives in
//! [`Context`](crate::Context); this type only holds the state and enforces
//! the monotonic transitions.

use crate::normalize::base_path;
use crate::types::{Exports, Factory, Identifier, ModuleIdx, ModuleMeta, ModuleState};
use std::collections::BTreeSet;
use std::fmt;

/// Token of a queued continuation waiting on one or more modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WaiterId(pub u64);

/// One module in the registry.
pub struct Module {
    id: Identifier,
    base: Identifier,
    exports: Exports,
    state: ModuleState,
    /// Continuations to wake on resolution, in registration order.
    pending_notifications: Vec<WaiterId>,
    needs_load: bool,
    top_level: bool,
    defined: bool,
    factory: Option<Factory>,
    /// Dependencies the declaration is still waiting on.
    awaiting: BTreeSet<ModuleIdx>,
}

impl Module {
    /// A module first referenced as someone's dependency.
    pub(crate) fn referenced(id: Identifier) -> Self {
        let base = base_path(&id);
        Self::with_base(id, base, true, false)
    }

    /// A top-level unit; its code is already running.
    pub(crate) fn top_level(id: Identifier, base: Identifier) -> Self {
        Self::with_base(id, base_path(&base), false, true)
    }

    fn with_base(id: Identifier, base: Identifier, needs_load: bool, top_level: bool) -> Self {
        Self {
            id,
            base,
            exports: Exports::new(),
            state: ModuleState::Unresolved,
            pending_notifications: Vec::new(),
            needs_load,
            top_level,
            defined: false,
            factory: None,
            awaiting: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &Identifier {
        &self.id
    }

    /// Base against which this module's relative specifiers resolve.
    #[must_use]
    pub fn base(&self) -> &Identifier {
        &self.base
    }

    #[must_use]
    pub fn exports(&self) -> &Exports {
        &self.exports
    }

    #[must_use]
    pub fn state(&self) -> &ModuleState {
        &self.state
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.state == ModuleState::Resolved
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.state, ModuleState::Failed(_))
    }

    /// Whether the loader still has to be asked for this module's code.
    #[must_use]
    pub fn needs_load(&self) -> bool {
        self.needs_load
    }

    #[must_use]
    pub fn is_top_level(&self) -> bool {
        self.top_level
    }

    /// Whether `define` has been accepted for this module.
    #[must_use]
    pub fn is_defined(&self) -> bool {
        self.defined
    }

    /// Number of dependents currently waiting on this module.
    #[must_use]
    pub fn waiting_dependents(&self) -> usize {
        self.pending_notifications.len()
    }

    #[must_use]
    pub fn meta(&self) -> ModuleMeta {
        ModuleMeta {
            id: self.id.clone(),
            base: self.base.clone(),
            top_level: self.top_level,
        }
    }

    pub(crate) fn awaiting(&self) -> &BTreeSet<ModuleIdx> {
        &self.awaiting
    }

    // =========================================================================
    // TRANSITIONS
    // =========================================================================

    /// Flip `needs_load` off; true only for the first caller.
    pub(crate) fn take_load(&mut self) -> bool {
        std::mem::replace(&mut self.needs_load, false)
    }

    /// Mark defined and install the factory. False if already defined.
    pub(crate) fn declare(&mut self, factory: Option<Factory>) -> bool {
        if self.defined {
            return false;
        }
        self.defined = true;
        self.factory = factory;
        true
    }

    pub(crate) fn take_factory(&mut self) -> Option<Factory> {
        self.factory.take()
    }

    pub(crate) fn set_awaiting(&mut self, awaiting: BTreeSet<ModuleIdx>) {
        self.awaiting = awaiting;
    }

    pub(crate) fn stop_awaiting(&mut self, dep: ModuleIdx) {
        self.awaiting.remove(&dep);
    }

    pub(crate) fn push_notification(&mut self, waiter: WaiterId) {
        self.pending_notifications.push(waiter);
    }

    /// Move to `Resolved` and hand back the notification list.
    ///
    /// Returns `None` if the module was already terminal; the list is
    /// therefore drained at most once.
    pub(crate) fn resolve(&mut self) -> Option<Vec<WaiterId>> {
        if self.state.is_terminal() {
            return None;
        }
        self.state = ModuleState::Resolved;
        self.awaiting.clear();
        Some(std::mem::take(&mut self.pending_notifications))
    }

    /// Move to `Failed`. Returns the notification list, which the caller may
    /// drop (strand) or walk (propagate). `None` if already terminal.
    pub(crate) fn fail(&mut self, reason: String) -> Option<Vec<WaiterId>> {
        if self.state.is_terminal() {
            return None;
        }
        self.state = ModuleState::Failed(reason);
        self.awaiting.clear();
        self.factory = None;
        Some(std::mem::take(&mut self.pending_notifications))
    }
}

impl fmt::Debug for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("base", &self.base)
            .field("state", &self.state)
            .field("exports", &self.exports.keys())
            .field("pending_notifications", &self.pending_notifications.len())
            .field("needs_load", &self.needs_load)
            .field("top_level", &self.top_level)
            .field("defined", &self.defined)
            .field("has_factory", &self.factory.is_some())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
