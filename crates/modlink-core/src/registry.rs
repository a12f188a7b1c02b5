//! # Module Registry
//!
//! Canonical mapping from [`Identifier`] to exactly one [`Module`].
//!
//! Modules live in an arena and are addressed by [`ModuleIdx`]; the index
//! map is a `BTreeMap` for deterministic iteration. There is no removal:
//! a module, once created, exists for the lifetime of the registry.

use crate::module::Module;
use crate::types::{Identifier, ModuleIdx};
use std::collections::BTreeMap;

/// The sole creator and owner of modules.
#[derive(Debug, Default)]
pub struct Registry {
    modules: Vec<Module>,
    index: BTreeMap<Identifier, ModuleIdx>,
}

impl Registry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the module for `id`, creating it (with `needs_load = true`)
    /// on first reference.
    pub fn get_or_create(&mut self, id: &Identifier) -> ModuleIdx {
        if let Some(&idx) = self.index.get(id) {
            return idx;
        }
        tracing::debug!(module = %id, "registering module");
        self.insert(Module::referenced(id.clone()))
    }

    /// Register a top-level unit under a fresh synthetic identifier.
    pub(crate) fn insert_top_level(&mut self, id: Identifier, base: Identifier) -> ModuleIdx {
        tracing::debug!(module = %id, base = %base, "registering top-level unit");
        self.insert(Module::top_level(id, base))
    }

    fn insert(&mut self, module: Module) -> ModuleIdx {
        let idx = ModuleIdx(self.modules.len());
        self.index.insert(module.id().clone(), idx);
        self.modules.push(module);
        idx
    }

    /// Look up without creating.
    #[must_use]
    pub fn lookup(&self, id: &Identifier) -> Option<ModuleIdx> {
        self.index.get(id).copied()
    }

    /// Module at `idx`. Indices are only handed out by this registry.
    #[must_use]
    pub fn get(&self, idx: ModuleIdx) -> &Module {
        &self.modules[idx.0]
    }

    pub(crate) fn get_mut(&mut self, idx: ModuleIdx) -> &mut Module {
        &mut self.modules[idx.0]
    }

    #[must_use]
    pub fn find(&self, id: &Identifier) -> Option<&Module> {
        self.lookup(id).map(|idx| self.get(idx))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Modules ordered by identifier.
    pub fn iter(&self) -> impl Iterator<Item = &Module> {
        self.index.values().map(|&idx| self.get(idx))
    }
}

// =============================================================================
// TESTS
// =============================================================================
