//! # Core Type Definitions
//!
//! This module contains the shared types of the modlink resolution engine:
//! - Identifiers (`Identifier`, `ModuleIdx`)
//! - Exported values (`Exports`)
//! - What a factory receives (`Import`, `Require`, `ModuleMeta`)
//! - Module lifecycle (`ModuleState`)
//! - Error types (`ResolveError`)
//!
//! ## Ownership
//!
//! The engine is single-threaded. `Exports` is a shared handle
//! (`Rc<RefCell<..>>`) so that a dependency's exports object can be handed
//! to every dependent while its own factory is still filling it in.

use crate::context::Context;
use crate::primitives::{SEQUENCE_HOST, SEQUENCE_SCHEME};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Canonical absolute identifier of a module.
///
/// Only constructible through the normalizer ([`Identifier::parse`]) or the
/// ordering sequencer, so two identifiers naming the same resource are
/// byte-identical.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    /// Normalize a raw absolute locator into an identifier.
    pub fn parse(raw: &str) -> Result<Self, ResolveError> {
        crate::normalize::normalize(raw)
    }

    /// Wrap a string that is already canonical.
    pub(crate) fn from_canonical(canonical: String) -> Self {
        Self(canonical)
    }

    /// Synthetic identifier for the `n`th top-level unit.
    pub(crate) fn synthetic(n: u64) -> Self {
        Self(format!("{SEQUENCE_SCHEME}://{SEQUENCE_HOST}/{n}"))
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for identifiers minted by the ordering sequencer.
    #[must_use]
    pub fn is_synthetic(&self) -> bool {
        self.0
            .strip_prefix(SEQUENCE_SCHEME)
            .is_some_and(|rest| rest.starts_with("://"))
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identifier {
    type Error = ResolveError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

/// Arena index of a module inside the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleIdx(pub usize);

// =============================================================================
// EXPORTS
// =============================================================================

/// A module's exported values: an open, ordered mapping from name to value.
///
/// Cloning an `Exports` clones the handle, not the contents. Every dependent
/// of a module observes the same object, so values set later by a factory
/// (or by a cyclic partner) are visible through handles taken earlier.
#[derive(Debug, Clone, Default)]
pub struct Exports(Rc<RefCell<BTreeMap<String, serde_json::Value>>>);

impl Exports {
    /// Create a new empty exports object.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an exported value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<serde_json::Value> {
        self.0.borrow().get(name).cloned()
    }

    /// Set an exported value, returning the previous one.
    pub fn set(
        &self,
        name: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Option<serde_json::Value> {
        self.0.borrow_mut().insert(name.into(), value.into())
    }

    /// Check if an export exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.borrow().contains_key(name)
    }

    /// Export names in deterministic order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    /// Copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, serde_json::Value> {
        self.0.borrow().clone()
    }

    /// True if both handles refer to the same exports object.
    #[must_use]
    pub fn same(&self, other: &Exports) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

// =============================================================================
// FACTORY ARGUMENTS
// =============================================================================

/// Factories and require callbacks.
///
/// Both receive the context (so they may issue further `require` calls) and
/// one [`Import`] per declared dependency, positionally.
pub type Factory = Box<dyn FnOnce(&mut Context, Vec<Import>) -> Result<(), ResolveError>>;

/// Box a closure as a [`Factory`].
///
/// Going through a generic bound lets the compiler infer the higher-ranked
/// signature of the closure.
pub fn factory<F>(f: F) -> Option<Factory>
where
    F: FnOnce(&mut Context, Vec<Import>) -> Result<(), ResolveError> + 'static,
{
    Some(Box::new(f))
}

/// Read-only facts about the module a factory belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleMeta {
    /// The module's own identifier.
    pub id: Identifier,
    /// Base used to resolve the module's relative specifiers.
    pub base: Identifier,
    /// Whether the module was registered as a top-level unit.
    pub top_level: bool,
}

/// The `require` function bound to one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Require {
    module: Identifier,
}

impl Require {
    pub(crate) fn new(module: Identifier) -> Self {
        Self { module }
    }

    /// The module this handle resolves specifiers against.
    #[must_use]
    pub fn module(&self) -> &Identifier {
        &self.module
    }

    /// Require `deps` relative to the bound module.
    pub fn require<I, S>(
        &self,
        ctx: &mut Context,
        deps: I,
        callback: Option<Factory>,
    ) -> Result<(), ResolveError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ctx.require_from(&self.module, deps, callback)
    }

    /// Define the bound module.
    pub fn define<I, S>(
        &self,
        ctx: &mut Context,
        deps: I,
        factory: Option<Factory>,
    ) -> Result<(), ResolveError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ctx.define_module(&self.module, deps, factory)
    }
}

/// One positional argument handed to a factory.
#[derive(Debug, Clone)]
pub enum Import {
    /// A dependency's exports object (or the module's own, for `"exports"`).
    Exports(Exports),
    /// The module's bound require (for `"require"`).
    Require(Require),
    /// Facts about the module itself (for `"meta"`).
    Meta(ModuleMeta),
}

impl Import {
    #[must_use]
    pub fn as_exports(&self) -> Option<&Exports> {
        match self {
            Self::Exports(exports) => Some(exports),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_require(&self) -> Option<&Require> {
        match self {
            Self::Require(require) => Some(require),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_meta(&self) -> Option<&ModuleMeta> {
        match self {
            Self::Meta(meta) => Some(meta),
            _ => None,
        }
    }
}

// =============================================================================
// MODULE STATE
// =============================================================================

/// Lifecycle of a module. Both `Resolved` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum ModuleState {
    /// Waiting for its code, its dependencies, or its factory.
    Unresolved,
    /// Factory has run (or there was none); exports are final.
    Resolved,
    /// Load or factory failed; dependents are never woken by it.
    Failed(String),
}

impl ModuleState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolved => f.write_str("unresolved"),
            Self::Resolved => f.write_str("resolved"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur while declaring or resolving modules.
///
/// - Specifier problems fail the call synchronously and leave no partial state
/// - Load and factory failures are recorded on the module itself
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The specifier cannot be normalized into an identifier.
    #[error("Unresolvable specifier '{specifier}': {reason}")]
    UnresolvableSpecifier { specifier: String, reason: String },

    /// Bare names (no scheme, no `./`, `../` or `/`) are not locators.
    #[error("Bare specifier '{0}' is not supported; use a relative or absolute locator")]
    BareSpecifier(String),

    /// `define` was called a second time for the same module.
    #[error("Module already defined: {0}")]
    DoubleDefinition(Identifier),

    /// The loader could not obtain or execute the module's code.
    #[error("Load failed for {id}: {reason}")]
    LoadFailure { id: Identifier, reason: String },

    /// An announcement is already waiting to be claimed.
    #[error("Announcement for {requested} rejected: {pending} is still pending")]
    AnnouncementBusy {
        pending: Identifier,
        requested: Identifier,
    },

    /// The registry has never seen this identifier.
    #[error("Unknown module: {0}")]
    UnknownModule(Identifier),

    /// A factory or callback reported failure.
    #[error("Factory of {id} failed: {reason}")]
    Factory { id: Identifier, reason: String },
}

// =============================================================================
// TESTS
// =============================================================================
