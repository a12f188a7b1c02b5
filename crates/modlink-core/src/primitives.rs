//! # Primitives
//!
//! Fixed constants of the resolution engine.
//!
//! ## Reserved specifiers
//!
//! Three dependency names never refer to another module:
//! 1. `"exports"`: the declaring module's own exports object.
//! 2. `"require"`: the declaring module's bound require.
//! 3. `"meta"`: facts about the declaring module (its identifier).

/// Resolves to the declaring module's own exports object.
pub const EXPORTS_SPECIFIER: &str = "exports";

/// Resolves to the declaring module's bound require.
pub const REQUIRE_SPECIFIER: &str = "require";

/// Resolves to a [`crate::ModuleMeta`] for the declaring module.
pub const META_SPECIFIER: &str = "meta";

/// A specifier containing this is treated as absolute.
pub const SCHEME_SEPARATOR: &str = "://";

/// Scheme of synthetic top-level identifiers.
///
/// Loaders never serve this scheme, so synthetic identifiers cannot collide
/// with real resource locators.
pub const SEQUENCE_SCHEME: &str = "seq";

/// Host part of synthetic top-level identifiers.
pub const SEQUENCE_HOST: &str = "top-level";

/// Base for top-level units registered without one.
pub const DEFAULT_DOCUMENT_BASE: &str = "file:///";
