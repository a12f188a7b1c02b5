//! # modlink-core
//!
//! The module-dependency resolution engine for modlink - THE LOGIC.
//!
//! Given the dependency specifiers a unit of code declares, the engine loads
//! each dependency exactly once, waits for the whole dependency graph to
//! resolve, and only then runs the unit's factory with each dependency's
//! exports as positional arguments. Independently declared top-level units
//! additionally run in registration order.
//!
//! ## Components
//!
//! - `normalize` - canonical identifiers and base paths
//! - `registry` - one [`Module`] per identifier, never removed
//! - `module` - per-module state and its monotonic transitions
//! - `sequencer` - synthetic identifiers and ordering of top-level units
//! - `context` - the define/require protocol tying it all together
//! - `loader` - the collaborator interface that fetches code
//!
//! ## Architectural Constraints
//!
//! - Single-threaded: all bookkeeping runs synchronously on one thread
//! - Passive: the engine never fetches code; a [`Loader`] does
//! - Deterministic: `BTreeMap`/`BTreeSet` only
//! - No async runtime and no network dependencies

// =============================================================================
// MODULES
// =============================================================================

pub mod config;
pub mod context;
pub mod loader;
pub mod module;
pub mod normalize;
pub mod primitives;
pub mod registry;
pub mod sequencer;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Exports, Factory, Identifier, Import, ModuleIdx, ModuleMeta, ModuleState, Require,
    ResolveError, factory,
};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use config::{CyclePolicy, FailurePolicy, ResolverConfig};
pub use context::{CallbackFailure, Context, PendingModule};
pub use loader::{Announcement, LoadQueue, Loader};
pub use module::{Module, WaiterId};
pub use normalize::{base_path, normalize, resolve_relative};
pub use registry::Registry;
pub use sequencer::{Sequenced, Sequencer};
