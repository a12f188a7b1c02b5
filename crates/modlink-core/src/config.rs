//! # Resolver Configuration
//!
//! Policies for the two situations the basic protocol leaves open:
//! cyclic declarations and failed loads. Deserializable so the binary can
//! read it from the `[resolver]` table of its TOML config.

use crate::primitives::DEFAULT_DOCUMENT_BASE;
use crate::types::Identifier;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What to do when a declaration would wait on a module that is already
/// (transitively) waiting on the declaring module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CyclePolicy {
    /// Don't wait: hand over the dependency's live exports object.
    #[default]
    Break,
    /// Wait anyway. The cycle never resolves.
    Wait,
}

/// What happens to dependents of a failed module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Dependents stay unresolved forever.
    #[default]
    Strand,
    /// Dependents fail too, naming the root cause.
    Propagate,
}

/// Resolver settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverConfig {
    pub cycle_policy: CyclePolicy,
    pub failure_policy: FailurePolicy,
    /// Base of top-level units registered without an explicit one.
    pub document_base: Identifier,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cycle_policy: CyclePolicy::default(),
            failure_policy: FailurePolicy::default(),
            document_base: Identifier::from_canonical(DEFAULT_DOCUMENT_BASE.to_string()),
        }
    }
}

impl FromStr for CyclePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "break" => Ok(Self::Break),
            "wait" => Ok(Self::Wait),
            other => Err(format!("unknown cycle policy '{other}' (expected break|wait)")),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "strand" => Ok(Self::Strand),
            "propagate" => Ok(Self::Propagate),
            other => Err(format!(
                "unknown failure policy '{other}' (expected strand|propagate)"
            )),
        }
    }
}

impl fmt::Display for CyclePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Break => f.write_str("break"),
            Self::Wait => f.write_str("wait"),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strand => f.write_str("strand"),
            Self::Propagate => f.write_str("propagate"),
        }
    }
}
