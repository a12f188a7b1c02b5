//! # Unit Format
//!
//! A unit is a TOML document describing one module's `define` call. The
//! driver "executes" a unit by issuing that call against the context.
//!
//! ```toml
//! [define]
//! deps = ["./util.toml", "meta"]
//! lazy = ["./extra.toml"]
//!
//! [define.exports]
//! name = "main"
//!
//! [[define.copy]]
//! from = "./util.toml"
//! key = "greeting"
//! as = "util_greeting"
//! ```
//!
//! A document without a `[define]` table never calls `define`; the module
//! resolves with empty exports once its load finishes.

use modlink_core::{Context, Exports, Identifier, Import, ResolveError, factory};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Specifiers the factory always asks for, whether or not the unit lists them.
const OWN_EXPORTS: &str = "exports";
const OWN_META: &str = "meta";
const OWN_REQUIRE: &str = "require";

/// Key under which a unit that requests `meta` records its own identifier.
pub const ID_EXPORT: &str = "__id";

/// A parsed unit document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnitSource {
    pub define: Option<Definition>,
}

/// The `[define]` table.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Definition {
    /// Raw dependency specifiers, in declaration order.
    pub deps: Vec<String>,
    /// Specifiers required from inside the factory.
    pub lazy: Vec<String>,
    /// Constant exports.
    pub exports: BTreeMap<String, serde_json::Value>,
    /// Values copied from dependency exports.
    pub copy: Vec<CopyRule>,
}

/// One `[[define.copy]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CopyRule {
    /// Dependency specifier exactly as listed in `deps`.
    pub from: String,
    pub key: String,
    #[serde(rename = "as")]
    pub alias: Option<String>,
}

impl CopyRule {
    fn target(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.key)
    }
}

impl UnitSource {
    /// Parse a unit document.
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Execute the unit as the code of a module being loaded.
    ///
    /// The `define` call claims the pending announcement.
    pub fn execute(self, ctx: &mut Context) -> Result<Option<Identifier>, ResolveError> {
        let Some(definition) = self.define else {
            return Ok(None);
        };
        let (deps, build) = definition.into_call()?;
        ctx.define(deps, build).map(Some)
    }

    /// Execute the unit as a top-level entry whose relative specifiers
    /// resolve against `base`.
    pub fn execute_top_level(
        self,
        ctx: &mut Context,
        base: &Identifier,
    ) -> Result<Identifier, ResolveError> {
        let (deps, build) = self.define.unwrap_or_default().into_call()?;
        ctx.define_at(base, deps, build)
    }
}

impl Definition {
    /// Turn the table into the arguments of a `define` call.
    ///
    /// The wire dependency list is `deps` followed by whichever of
    /// `exports`, `meta` and `require` the factory needs but the unit did
    /// not list.
    fn into_call(self) -> Result<(Vec<String>, Option<modlink_core::Factory>), ResolveError> {
        for rule in &self.copy {
            if !self.deps.contains(&rule.from) {
                return Err(ResolveError::UnresolvableSpecifier {
                    specifier: rule.from.clone(),
                    reason: "copy source is not listed in deps".to_string(),
                });
            }
        }

        let mut wire = self.deps.clone();
        let mut position = |specifier: &str| match wire.iter().position(|d| d == specifier) {
            Some(at) => at,
            None => {
                wire.push(specifier.to_string());
                wire.len() - 1
            }
        };
        let exports_at = position(OWN_EXPORTS);
        let meta_at = position(OWN_META);
        let require_at = (!self.lazy.is_empty()).then(|| position(OWN_REQUIRE));

        let record_id = self.deps.iter().any(|d| d == OWN_META);
        let sources: Vec<Option<usize>> = self
            .copy
            .iter()
            .map(|rule| self.deps.iter().position(|d| *d == rule.from))
            .collect();
        let Definition {
            lazy,
            exports: constants,
            copy,
            ..
        } = self;

        let build = factory(move |ctx, imports| {
            let meta = imports
                .get(meta_at)
                .and_then(Import::as_meta)
                .cloned()
                .ok_or_else(|| missing_import(OWN_META))?;
            let own = imports
                .get(exports_at)
                .and_then(Import::as_exports)
                .cloned()
                .ok_or_else(|| factory_error(&meta.id, "no exports import"))?;

            for (name, value) in constants {
                own.set(name, value);
            }
            if record_id {
                own.set(ID_EXPORT, meta.id.as_str());
            }
            for (rule, source) in copy.iter().zip(sources) {
                let from = source
                    .and_then(|at| imports.get(at))
                    .and_then(Import::as_exports);
                copy_value(&meta.id, &own, from, rule)?;
            }

            if let Some(at) = require_at {
                let handle = imports
                    .get(at)
                    .and_then(Import::as_require)
                    .cloned()
                    .ok_or_else(|| factory_error(&meta.id, "no require import"))?;
                let module = meta.id.clone();
                handle.require(
                    ctx,
                    lazy,
                    factory(move |_, loaded| {
                        tracing::debug!(module = %module, count = loaded.len(), "lazy dependencies ready");
                        Ok(())
                    }),
                )?;
            }
            Ok(())
        });

        Ok((wire, build))
    }
}

fn copy_value(
    id: &Identifier,
    own: &Exports,
    from: Option<&Exports>,
    rule: &CopyRule,
) -> Result<(), ResolveError> {
    let source = from.ok_or_else(|| {
        factory_error(id, &format!("'{}' did not deliver exports", rule.from))
    })?;
    let value = source.get(&rule.key).ok_or_else(|| {
        factory_error(id, &format!("'{}' exports no '{}'", rule.from, rule.key))
    })?;
    own.set(rule.target(), value);
    Ok(())
}

fn factory_error(id: &Identifier, reason: &str) -> ResolveError {
    ResolveError::Factory {
        id: id.clone(),
        reason: reason.to_string(),
    }
}

fn missing_import(specifier: &str) -> ResolveError {
    ResolveError::UnresolvableSpecifier {
        specifier: specifier.to_string(),
        reason: "reserved import was not delivered".to_string(),
    }
}

// =============================================================================
// TESTS
// =============================================================================
