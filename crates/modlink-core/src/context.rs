//! # Resolution Context
//!
//! The process-wide state of the engine and the define/require protocol.
//!
//! ## Protocol
//!
//! - `define` installs a module's declaration and waits for its
//!   dependencies; once the last one resolves, the factory runs, the module
//!   becomes resolved and every waiting dependent is notified in
//!   registration order.
//! - `require` waits for dependencies and then calls a callback, without
//!   resolving anything itself.
//!
//! Waiting is represented by explicit continuation records ("waiters")
//! with a remaining-count, queued on each awaited module. A module
//! resolving decrements each of its waiters; a waiter reaching zero fires
//! synchronously. Wake-ups go through a FIFO worklist, so resolving a long
//! chain never nests calls. Nothing here blocks: control returns to the caller while
//! loads are outstanding and resumes when the loader reports back.
//!
//! ## Top-level units
//!
//! A `define` with no pending announcement is a top-level unit. It gets a
//! synthetic identifier and an extra dependency on the previous top-level
//! unit, so top-level factories run in registration order.

use crate::config::{CyclePolicy, FailurePolicy, ResolverConfig};
use crate::loader::{Announcement, Loader};
use crate::module::{Module, WaiterId};
use crate::normalize::resolve_relative;
use crate::primitives::{EXPORTS_SPECIFIER, META_SPECIFIER, REQUIRE_SPECIFIER};
use crate::registry::Registry;
use crate::sequencer::Sequencer;
use crate::types::{
    Exports, Factory, Identifier, Import, ModuleIdx, ModuleState, Require, ResolveError,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

// =============================================================================
// WAITERS
// =============================================================================

/// What to do once a waiter's dependencies have all resolved.
enum Continuation {
    /// Run the owner's factory and resolve the owner.
    Declaration,
    /// Call a require callback on behalf of the owner.
    Callback(Option<Factory>),
}

/// A queued continuation.
struct Waiter {
    owner: ModuleIdx,
    remaining: usize,
    imports: Vec<Import>,
    then: Continuation,
}

/// A dependency specifier after classification.
enum Target {
    OwnExports,
    OwnRequire,
    OwnMeta,
    Module(Identifier),
}

// =============================================================================
// REPORTS
// =============================================================================

/// A require callback that returned an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackFailure {
    /// Module on whose behalf the callback ran.
    pub module: Identifier,
    pub error: ResolveError,
}

/// An unresolved, non-failed module and what it is stuck on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingModule {
    pub id: Identifier,
    /// False if its code never declared itself (load still outstanding).
    pub defined: bool,
    /// Dependencies its declaration is still waiting on.
    pub awaiting: Vec<Identifier>,
}

// =============================================================================
// CONTEXT
// =============================================================================

/// Registry, sequencer, announcement slot and waiter queue in one place.
///
/// Single-threaded by construction (`!Send`): every mutation happens on the
/// thread that owns the context.
pub struct Context {
    config: ResolverConfig,
    registry: Registry,
    sequencer: Sequencer,
    announcement: Announcement,
    loader: Box<dyn Loader>,
    waiters: BTreeMap<WaiterId, Waiter>,
    /// The waiter of each module's own declaration, while it waits.
    declarations: BTreeMap<ModuleIdx, WaiterId>,
    next_waiter: u64,
    /// Notifications not yet delivered: (waiter, dependency that resolved).
    wakeups: VecDeque<(WaiterId, ModuleIdx)>,
    draining: bool,
    resolution_order: Vec<Identifier>,
    callback_failures: Vec<CallbackFailure>,
}

impl Context {
    /// Create an empty context.
    pub fn new(loader: impl Loader + 'static, config: ResolverConfig) -> Self {
        Self {
            config,
            registry: Registry::new(),
            sequencer: Sequencer::new(),
            announcement: Announcement::default(),
            loader: Box::new(loader),
            waiters: BTreeMap::new(),
            declarations: BTreeMap::new(),
            next_waiter: 0,
            wakeups: VecDeque::new(),
            draining: false,
            resolution_order: Vec::new(),
            callback_failures: Vec::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    // =========================================================================
    // AMBIENT ENTRY POINTS
    // =========================================================================

    /// Declare a unit.
    ///
    /// If a load announcement is pending, the declaration claims it and
    /// defines that module. Otherwise the unit is top-level: it is sequenced
    /// after the previous top-level unit and its relative specifiers resolve
    /// against the configured document base.
    ///
    /// Returns the identifier of the defined module.
    pub fn define<I, S>(&mut self, deps: I, factory: Option<Factory>) -> Result<Identifier, ResolveError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(id) = self.announcement.claim() {
            tracing::debug!(module = %id, "declaration claimed announcement");
            self.define_module(&id, deps, factory)?;
            return Ok(id);
        }
        let base = self.config.document_base.clone();
        self.define_top_level(&base, deps, factory)
    }

    /// Declare a top-level unit whose relative specifiers resolve against
    /// `base` instead of the document base.
    ///
    /// Never claims an announcement.
    pub fn define_at<I, S>(
        &mut self,
        base: &Identifier,
        deps: I,
        factory: Option<Factory>,
    ) -> Result<Identifier, ResolveError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.define_top_level(base, deps, factory)
    }

    /// Ambient require: a top-level unit whose factory is `callback`.
    pub fn require<I, S>(
        &mut self,
        deps: I,
        callback: Option<Factory>,
    ) -> Result<Identifier, ResolveError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let base = self.config.document_base.clone();
        self.define_top_level(&base, deps, callback)
    }

    fn define_top_level<I, S>(
        &mut self,
        base: &Identifier,
        deps: I,
        factory: Option<Factory>,
    ) -> Result<Identifier, ResolveError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut deps: Vec<String> = deps.into_iter().map(Into::into).collect();
        let delivered = deps.len();

        // Validate before a synthetic identifier is spent.
        let base_dir = crate::normalize::base_path(base);
        for specifier in &deps {
            if !is_reserved(specifier) {
                resolve_relative(&base_dir, specifier)?;
            }
        }

        let unit = self.sequencer.next_unit();
        let idx = self.registry.insert_top_level(unit.id.clone(), base.clone());
        if let Some(after) = unit.after {
            deps.push(after.to_string());
        }
        self.declare(idx, deps, delivered, factory)?;
        Ok(unit.id)
    }

    // =========================================================================
    // BOUND ENTRY POINTS
    // =========================================================================

    /// Define the module `id`. A module accepts exactly one definition.
    pub fn define_module<I, S>(
        &mut self,
        id: &Identifier,
        deps: I,
        factory: Option<Factory>,
    ) -> Result<(), ResolveError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let idx = self.index_of(id)?;
        let deps: Vec<String> = deps.into_iter().map(Into::into).collect();
        let delivered = deps.len();
        self.declare(idx, deps, delivered, factory)
    }

    /// Require `deps` on behalf of module `id`, then call `callback`.
    ///
    /// The callback runs synchronously if every dependency is already
    /// resolved.
    pub fn require_from<I, S>(
        &mut self,
        id: &Identifier,
        deps: I,
        callback: Option<Factory>,
    ) -> Result<(), ResolveError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let idx = self.index_of(id)?;
        let deps: Vec<String> = deps.into_iter().map(Into::into).collect();
        let targets = self.classify(idx, &deps)?;
        let delivered = deps.len();
        self.attach(idx, targets, delivered, Continuation::Callback(callback));
        Ok(())
    }

    // =========================================================================
    // LOADER HAND-OFF
    // =========================================================================

    /// The loader is about to execute the code of `id`.
    ///
    /// The next ambient `define` claims this announcement.
    pub fn announce(&mut self, id: &Identifier) -> Result<(), ResolveError> {
        self.index_of(id)?;
        self.announcement.offer(id.clone())
    }

    /// The code of `id` has finished executing.
    ///
    /// If it never claimed its announcement it is treated as a unit with no
    /// dependencies and resolves now.
    pub fn finish_load(&mut self, id: &Identifier) -> Result<(), ResolveError> {
        let idx = self.index_of(id)?;
        if self.announcement.release(id) {
            tracing::debug!(module = %id, "no declaration, resolving implicitly");
            return self.declare(idx, Vec::new(), 0, None);
        }
        Ok(())
    }

    /// The loader could not obtain or execute the code of `id`.
    pub fn fail_load(&mut self, id: &Identifier, reason: impl Into<String>) -> Result<(), ResolveError> {
        let idx = self.index_of(id)?;
        self.announcement.release(id);
        self.fail(idx, reason.into());
        Ok(())
    }

    /// Announcement waiting to be claimed, if any.
    #[must_use]
    pub fn pending_announcement(&self) -> Option<&Identifier> {
        self.announcement.pending()
    }

    // =========================================================================
    // INTROSPECTION
    // =========================================================================

    #[must_use]
    pub fn module(&self, id: &Identifier) -> Option<&Module> {
        self.registry.find(id)
    }

    #[must_use]
    pub fn state(&self, id: &Identifier) -> Option<&ModuleState> {
        self.module(id).map(Module::state)
    }

    #[must_use]
    pub fn exports(&self, id: &Identifier) -> Option<Exports> {
        self.module(id).map(|m| m.exports().clone())
    }

    #[must_use]
    pub fn is_resolved(&self, id: &Identifier) -> bool {
        self.module(id).is_some_and(Module::is_resolved)
    }

    /// Identifiers in the order their modules became resolved.
    #[must_use]
    pub fn resolution_order(&self) -> &[Identifier] {
        &self.resolution_order
    }

    /// Unresolved modules that have not failed, ordered by identifier.
    #[must_use]
    pub fn pending_modules(&self) -> Vec<PendingModule> {
        self.registry
            .iter()
            .filter(|m| *m.state() == ModuleState::Unresolved)
            .map(|m| PendingModule {
                id: m.id().clone(),
                defined: m.is_defined(),
                awaiting: m
                    .awaiting()
                    .iter()
                    .map(|&dep| self.registry.get(dep).id().clone())
                    .collect(),
            })
            .collect()
    }

    /// Failed modules and their reasons, ordered by identifier.
    #[must_use]
    pub fn failed_modules(&self) -> Vec<(Identifier, String)> {
        self.registry
            .iter()
            .filter_map(|m| match m.state() {
                ModuleState::Failed(reason) => Some((m.id().clone(), reason.clone())),
                _ => None,
            })
            .collect()
    }

    /// Drain recorded callback failures.
    pub fn take_callback_failures(&mut self) -> Vec<CallbackFailure> {
        std::mem::take(&mut self.callback_failures)
    }

    // =========================================================================
    // PROTOCOL
    // =========================================================================

    fn index_of(&self, id: &Identifier) -> Result<ModuleIdx, ResolveError> {
        self.registry
            .lookup(id)
            .ok_or_else(|| ResolveError::UnknownModule(id.clone()))
    }

    /// Install a declaration and wait for its dependencies.
    ///
    /// `delivered` is how many leading imports the factory sees; anything
    /// after it is an ordering-only dependency.
    fn declare(
        &mut self,
        idx: ModuleIdx,
        deps: Vec<String>,
        delivered: usize,
        factory: Option<Factory>,
    ) -> Result<(), ResolveError> {
        let module = self.registry.get(idx);
        if let ModuleState::Failed(reason) = module.state() {
            return Err(ResolveError::LoadFailure {
                id: module.id().clone(),
                reason: reason.clone(),
            });
        }
        if module.is_defined() {
            return Err(ResolveError::DoubleDefinition(module.id().clone()));
        }

        let targets = self.classify(idx, &deps)?;
        self.registry.get_mut(idx).declare(factory);
        self.attach(idx, targets, delivered, Continuation::Declaration);
        Ok(())
    }

    /// Resolve every specifier up front so a bad one leaves no partial state.
    fn classify(&self, owner: ModuleIdx, deps: &[String]) -> Result<Vec<Target>, ResolveError> {
        let base = self.registry.get(owner).base();
        deps.iter()
            .map(|specifier| match specifier.as_str() {
                EXPORTS_SPECIFIER => Ok(Target::OwnExports),
                REQUIRE_SPECIFIER => Ok(Target::OwnRequire),
                META_SPECIFIER => Ok(Target::OwnMeta),
                other => resolve_relative(base, other).map(Target::Module),
            })
            .collect()
    }

    /// Collect imports, queue a waiter on every unresolved dependency and
    /// trigger their loads. Fires the continuation immediately if nothing
    /// needs waiting for.
    fn attach(
        &mut self,
        owner: ModuleIdx,
        targets: Vec<Target>,
        delivered: usize,
        then: Continuation,
    ) {
        let is_declaration = matches!(then, Continuation::Declaration);
        let mut imports = Vec::with_capacity(targets.len());
        let mut awaited: BTreeSet<ModuleIdx> = BTreeSet::new();
        let mut failed: Option<(Identifier, String)> = None;

        for (position, target) in targets.into_iter().enumerate() {
            // Past `delivered` is the injected ordering dependency on the
            // previous top-level unit, which nothing else can be waiting on.
            let ordering_only = position >= delivered;
            let dep = match target {
                Target::OwnExports => {
                    imports.push(Import::Exports(self.registry.get(owner).exports().clone()));
                    continue;
                }
                Target::OwnRequire => {
                    let id = self.registry.get(owner).id().clone();
                    imports.push(Import::Require(Require::new(id)));
                    continue;
                }
                Target::OwnMeta => {
                    imports.push(Import::Meta(self.registry.get(owner).meta()));
                    continue;
                }
                Target::Module(id) => self.registry.get_or_create(&id),
            };

            let module = self.registry.get(dep);
            imports.push(Import::Exports(module.exports().clone()));
            match module.state() {
                ModuleState::Resolved => continue,
                ModuleState::Failed(reason) => {
                    if failed.is_none() {
                        failed = Some((module.id().clone(), reason.clone()));
                    }
                }
                ModuleState::Unresolved => {}
            }

            if is_declaration
                && !ordering_only
                && self.config.cycle_policy == CyclePolicy::Break
                && self.awaits(dep, owner)
            {
                tracing::debug!(
                    module = %self.registry.get(owner).id(),
                    dependency = %self.registry.get(dep).id(),
                    "breaking dependency cycle with live exports"
                );
                self.trigger_load_if_needed(dep);
                continue;
            }

            awaited.insert(dep);
            self.trigger_load_if_needed(dep);
        }

        if let Some((dep_id, reason)) = failed {
            if self.config.failure_policy == FailurePolicy::Propagate {
                self.abandon(owner, then, &dep_id, &reason);
                return;
            }
        }

        imports.truncate(delivered);

        if awaited.is_empty() {
            self.run(owner, imports, then);
            return;
        }

        let waiter = WaiterId(self.next_waiter);
        self.next_waiter = self.next_waiter.saturating_add(1);
        for &dep in &awaited {
            self.registry.get_mut(dep).push_notification(waiter);
        }
        if is_declaration {
            self.registry.get_mut(owner).set_awaiting(awaited.clone());
            self.declarations.insert(owner, waiter);
        }
        self.waiters.insert(
            waiter,
            Waiter {
                owner,
                remaining: awaited.len(),
                imports,
                then,
            },
        );
    }

    /// True if `from` is, directly or transitively, waiting on `target`.
    fn awaits(&self, from: ModuleIdx, target: ModuleIdx) -> bool {
        let mut stack = vec![from];
        let mut seen = BTreeSet::new();
        while let Some(idx) = stack.pop() {
            if idx == target {
                return true;
            }
            if seen.insert(idx) {
                stack.extend(self.registry.get(idx).awaiting().iter().copied());
            }
        }
        false
    }

    /// Ask the loader for `idx`'s code unless someone already did.
    fn trigger_load_if_needed(&mut self, idx: ModuleIdx) {
        if self.registry.get_mut(idx).take_load() {
            let id = self.registry.get(idx).id().clone();
            tracing::debug!(module = %id, "triggering load");
            self.loader.load(&id);
        }
    }

    /// One awaited dependency of `waiter` has resolved.
    fn notify(&mut self, waiter: WaiterId, resolved: ModuleIdx) {
        let Some(entry) = self.waiters.get_mut(&waiter) else {
            // Cancelled: its owner failed meanwhile.
            return;
        };
        entry.remaining = entry.remaining.saturating_sub(1);
        let owner = entry.owner;
        let done = entry.remaining == 0;

        if matches!(entry.then, Continuation::Declaration) {
            self.registry.get_mut(owner).stop_awaiting(resolved);
        }
        if done {
            if let Some(entry) = self.waiters.remove(&waiter) {
                if matches!(entry.then, Continuation::Declaration) {
                    self.declarations.remove(&owner);
                }
                self.run(entry.owner, entry.imports, entry.then);
            }
        }
    }

    /// Deliver queued notifications until none are left.
    ///
    /// Re-entrant calls (a factory resolving another module) only enqueue;
    /// the outermost caller does the draining.
    fn drain_wakeups(&mut self) {
        if self.draining {
            return;
        }
        self.draining = true;
        while let Some((waiter, resolved)) = self.wakeups.pop_front() {
            self.notify(waiter, resolved);
        }
        self.draining = false;
    }

    fn run(&mut self, owner: ModuleIdx, imports: Vec<Import>, then: Continuation) {
        match then {
            Continuation::Declaration => self.complete_definition(owner, imports),
            Continuation::Callback(Some(callback)) => {
                if let Err(error) = callback(self, imports) {
                    let module = self.registry.get(owner).id().clone();
                    tracing::warn!(module = %module, error = %error, "require callback failed");
                    self.callback_failures.push(CallbackFailure { module, error });
                }
            }
            Continuation::Callback(None) => {}
        }
    }

    /// Run the factory, resolve, and queue dependents in registration order.
    fn complete_definition(&mut self, idx: ModuleIdx, imports: Vec<Import>) {
        if let Some(factory) = self.registry.get_mut(idx).take_factory() {
            if let Err(error) = factory(self, imports) {
                let reason = error.to_string();
                self.fail(idx, reason);
                return;
            }
        }

        let Some(waiting) = self.registry.get_mut(idx).resolve() else {
            return;
        };
        let id = self.registry.get(idx).id().clone();
        tracing::debug!(module = %id, dependents = waiting.len(), "module resolved");
        self.resolution_order.push(id);

        self.wakeups
            .extend(waiting.into_iter().map(|waiter| (waiter, idx)));
        self.drain_wakeups();
    }

    /// Mark `idx` failed and apply the failure policy to its dependents.
    ///
    /// Propagation walks a worklist of failing declarations.
    fn fail(&mut self, idx: ModuleIdx, reason: String) {
        let mut failing = VecDeque::from([(idx, reason)]);

        while let Some((idx, reason)) = failing.pop_front() {
            let Some(waiting) = self.registry.get_mut(idx).fail(reason.clone()) else {
                continue;
            };
            let id = self.registry.get(idx).id().clone();
            tracing::warn!(module = %id, reason = %reason, "module failed");

            // Its own declaration will never complete.
            if let Some(own) = self.declarations.remove(&idx) {
                self.waiters.remove(&own);
            }

            match self.config.failure_policy {
                FailurePolicy::Strand => {
                    tracing::debug!(module = %id, dependents = waiting.len(), "dependents stranded");
                }
                FailurePolicy::Propagate => {
                    for waiter in waiting {
                        let Some(entry) = self.waiters.remove(&waiter) else {
                            continue;
                        };
                        match entry.then {
                            Continuation::Declaration => {
                                self.declarations.remove(&entry.owner);
                                failing.push_back((entry.owner, failure_cause(&id, &reason)));
                            }
                            Continuation::Callback(_) => {
                                self.abandon_callback(entry.owner, &id, &reason);
                            }
                        }
                    }
                }
            }
        }
    }

    /// A continuation can never run because `dep` failed.
    fn abandon(&mut self, owner: ModuleIdx, then: Continuation, dep: &Identifier, reason: &str) {
        match then {
            Continuation::Declaration => self.fail(owner, failure_cause(dep, reason)),
            Continuation::Callback(_) => self.abandon_callback(owner, dep, reason),
        }
    }

    fn abandon_callback(&mut self, owner: ModuleIdx, dep: &Identifier, reason: &str) {
        let module = self.registry.get(owner).id().clone();
        self.callback_failures.push(CallbackFailure {
            module,
            error: ResolveError::LoadFailure {
                id: dep.clone(),
                reason: reason.to_string(),
            },
        });
    }
}

fn failure_cause(dep: &Identifier, reason: &str) -> String {
    format!("dependency {dep} failed: {reason}")
}

fn is_reserved(specifier: &str) -> bool {
    matches!(
        specifier,
        EXPORTS_SPECIFIER | REQUIRE_SPECIFIER | META_SPECIFIER
    )
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("modules", &self.registry.len())
            .field("waiters", &self.waiters.len())
            .field("pending_announcement", &self.announcement.pending())
            .field("top_level_units", &self.sequencer.issued())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
