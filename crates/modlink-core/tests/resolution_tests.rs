//! # Resolution Scenarios
//!
//! End-to-end behaviour of the define/require protocol against a scripted
//! loader: each requested identifier is "executed" by looking up a prepared
//! declaration.

use modlink_core::{
    Context, CyclePolicy, Exports, Factory, Identifier, Import, LoadQueue, ModuleState,
    ResolverConfig, factory,
};
use serde_json::json;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

// =============================================================================
// HARNESS
// =============================================================================

type Log = Rc<RefCell<Vec<String>>>;

/// A declaration a scripted unit makes when executed.
struct Unit {
    deps: Vec<&'static str>,
    factory: Option<Factory>,
}

struct World {
    ctx: Context,
    queue: LoadQueue,
    units: BTreeMap<Identifier, Unit>,
    loads: Vec<Identifier>,
}

impl World {
    fn new(config: ResolverConfig) -> Self {
        let queue = LoadQueue::new();
        Self {
            ctx: Context::new(queue.clone(), config),
            queue,
            units: BTreeMap::new(),
            loads: Vec::new(),
        }
    }

    fn with_defaults() -> Self {
        Self::new(ResolverConfig {
            document_base: id("file:///site/"),
            ..ResolverConfig::default()
        })
    }

    fn unit(&mut self, raw: &str, deps: Vec<&'static str>, factory: Option<Factory>) {
        self.units.insert(id(raw), Unit { deps, factory });
    }

    /// Execute one outstanding load. Unknown identifiers fail.
    fn step(&mut self) -> bool {
        let Some(next) = self.queue.pop() else {
            return false;
        };
        self.loads.push(next.clone());
        match self.units.remove(&next) {
            Some(unit) => {
                self.ctx.announce(&next).expect("announce");
                self.ctx.define(unit.deps, unit.factory).expect("define");
                self.ctx.finish_load(&next).expect("finish");
            }
            None => self.ctx.fail_load(&next, "no such unit").expect("fail"),
        }
        true
    }

    fn run(&mut self) {
        while self.step() {}
    }
}

fn id(raw: &str) -> Identifier {
    Identifier::parse(raw).expect("parse")
}

fn logging(log: &Log, name: &'static str) -> Option<Factory> {
    let log = Rc::clone(log);
    factory(move |_, _| {
        log.borrow_mut().push(name.to_string());
        Ok(())
    })
}

fn exports_of(import: &Import) -> Exports {
    import.as_exports().cloned().expect("exports import")
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[test]
fn dependency_factory_runs_before_dependent() {
    let mut world = World::with_defaults();
    let log: Log = Rc::default();
    let y = id("file:///site/Y.js");
    let x = id("file:///site/X.js");

    let g_log = Rc::clone(&log);
    world.unit(
        y.as_str(),
        vec!["exports"],
        factory(move |_, imports| {
            exports_of(&imports[0]).set("value", "from-y");
            g_log.borrow_mut().push("g".into());
            Ok(())
        }),
    );
    let f_log = Rc::clone(&log);
    let y_id = y.clone();
    world.unit(
        x.as_str(),
        vec!["./Y.js"],
        factory(move |ctx, imports| {
            let y_exports = ctx.exports(&y_id).expect("y exports");
            assert!(exports_of(&imports[0]).same(&y_exports));
            assert_eq!(y_exports.get("value"), Some(json!("from-y")));
            assert!(ctx.is_resolved(&y_id));
            f_log.borrow_mut().push("f".into());
            Ok(())
        }),
    );

    let top = world
        .ctx
        .define(["./X.js"], logging(&log, "top"))
        .expect("define");
    assert!(!world.ctx.is_resolved(&top));
    world.run();

    assert_eq!(*log.borrow(), vec!["g", "f", "top"]);
    assert!(world.ctx.is_resolved(&x));
    assert!(world.ctx.is_resolved(&top));
    assert_eq!(world.ctx.resolution_order(), &[y, x, top]);
}

#[test]
fn top_level_units_run_in_registration_order() {
    let mut world = World::with_defaults();
    let log: Log = Rc::default();
    world.unit("file:///site/slow.js", vec![], None);

    let first = world
        .ctx
        .define(["./slow.js"], logging(&log, "first"))
        .expect("define");
    let second = world
        .ctx
        .define(Vec::<String>::new(), logging(&log, "second"))
        .expect("define");

    // The second unit has nothing to wait for except the first.
    assert!(log.borrow().is_empty());
    assert!(!world.ctx.is_resolved(&second));

    world.run();

    assert_eq!(*log.borrow(), vec!["first", "second"]);
    assert!(world.ctx.is_resolved(&first));
    assert!(world.ctx.is_resolved(&second));
}

#[test]
fn independent_inline_units_execute_in_document_order() {
    let mut world = World::with_defaults();
    let log: Log = Rc::default();

    for name in ["one", "two", "three"] {
        world
            .ctx
            .define(Vec::<String>::new(), logging(&log, name))
            .expect("define");
    }

    assert_eq!(*log.borrow(), vec!["one", "two", "three"]);
}

#[test]
fn ambient_require_is_sequenced_like_define() {
    let mut world = World::with_defaults();
    let log: Log = Rc::default();
    world.unit("file:///site/dep.js", vec![], None);

    world
        .ctx
        .define(["./dep.js"], logging(&log, "define"))
        .expect("define");
    world
        .ctx
        .require(Vec::<String>::new(), logging(&log, "require"))
        .expect("require");

    assert!(log.borrow().is_empty());
    world.run();
    assert_eq!(*log.borrow(), vec!["define", "require"]);
}

#[test]
fn shared_dependency_from_sibling_directories_loads_once() {
    let mut world = World::with_defaults();
    let log: Log = Rc::default();
    world.unit("file:///site/left/a.js", vec!["../shared.js"], None);
    world.unit("file:///site/right/b.js", vec!["../shared.js"], None);
    world.unit("file:///site/shared.js", vec![], logging(&log, "shared"));

    let top = world
        .ctx
        .define(["./left/a.js", "./right/b.js"], None)
        .expect("define");
    world.run();

    let shared = id("file:///site/shared.js");
    assert_eq!(world.loads.iter().filter(|l| **l == shared).count(), 1);
    assert_eq!(*log.borrow(), vec!["shared"]);
    assert!(world.ctx.is_resolved(&top));
}

#[test]
fn diamond_dependency_resolves_once_before_both_sides() {
    let mut world = World::with_defaults();
    let log: Log = Rc::default();
    world.unit("file:///site/b.js", vec!["./d.js"], logging(&log, "b"));
    world.unit("file:///site/c.js", vec!["./d.js"], logging(&log, "c"));
    world.unit("file:///site/d.js", vec![], logging(&log, "d"));

    world
        .ctx
        .define(["./b.js", "./c.js"], logging(&log, "top"))
        .expect("define");
    world.run();

    assert_eq!(*log.borrow(), vec!["d", "b", "c", "top"]);
    assert_eq!(world.loads.len(), 3);
    let d = world.ctx.module(&id("file:///site/d.js")).expect("d");
    assert_eq!(d.waiting_dependents(), 0);
}

#[test]
fn factory_receives_one_import_per_dependency_in_order() {
    let mut world = World::with_defaults();
    for name in ["a", "b", "c"] {
        let path = format!("file:///site/{name}.js");
        world.unit(
            &path,
            vec!["exports"],
            factory(move |_, imports| {
                exports_of(&imports[0]).set("name", name);
                Ok(())
            }),
        );
    }

    let names = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&names);
    world
        .ctx
        .define(
            ["./c.js", "meta", "./a.js", "./b.js"],
            factory(move |_, imports| {
                assert_eq!(imports.len(), 4);
                assert!(imports[1].as_meta().is_some());
                for import in imports.iter().filter_map(Import::as_exports) {
                    sink.borrow_mut().push(import.get("name").expect("name"));
                }
                Ok(())
            }),
        )
        .expect("define");
    world.run();

    assert_eq!(*names.borrow(), vec![json!("c"), json!("a"), json!("b")]);
}

#[test]
fn sequencing_dependency_is_not_delivered() {
    let mut world = World::with_defaults();
    world.ctx.define(Vec::<String>::new(), None).expect("define");

    let count = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&count);
    world
        .ctx
        .define(
            ["exports"],
            factory(move |_, imports| {
                *sink.borrow_mut() = Some(imports.len());
                Ok(())
            }),
        )
        .expect("define");

    assert_eq!(*count.borrow(), Some(1));
}

#[test]
fn cyclic_pair_resolves_with_live_exports() {
    let mut world = World::with_defaults();
    let seen_by_b = Rc::new(RefCell::new(None));
    let seen_by_a = Rc::new(RefCell::new(None));

    let sink = Rc::clone(&seen_by_a);
    world.unit(
        "file:///site/a.js",
        vec!["exports", "./b.js"],
        factory(move |_, imports| {
            exports_of(&imports[0]).set("name", "a");
            *sink.borrow_mut() = Some(exports_of(&imports[1]));
            Ok(())
        }),
    );
    let sink = Rc::clone(&seen_by_b);
    world.unit(
        "file:///site/b.js",
        vec!["exports", "./a.js"],
        factory(move |_, imports| {
            let a = exports_of(&imports[1]);
            // A's factory has not run yet.
            assert!(a.is_empty());
            exports_of(&imports[0]).set("name", "b");
            *sink.borrow_mut() = Some(a);
            Ok(())
        }),
    );

    let top = world.ctx.define(["./a.js"], None).expect("define");
    world.run();

    let a = id("file:///site/a.js");
    let b = id("file:///site/b.js");
    assert!(world.ctx.is_resolved(&a));
    assert!(world.ctx.is_resolved(&b));
    assert!(world.ctx.is_resolved(&top));

    let a_exports = world.ctx.exports(&a).expect("a");
    let b_exports = world.ctx.exports(&b).expect("b");
    let from_b = seen_by_b.borrow().clone().expect("b saw a");
    let from_a = seen_by_a.borrow().clone().expect("a saw b");
    assert!(from_b.same(&a_exports));
    assert!(from_a.same(&b_exports));
    // Populated later through the same object.
    assert_eq!(from_b.get("name"), Some(json!("a")));
    assert_eq!(from_a.get("name"), Some(json!("b")));
}

#[test]
fn cyclic_pair_deadlocks_under_wait_policy() {
    let mut world = World::new(ResolverConfig {
        cycle_policy: CyclePolicy::Wait,
        document_base: id("file:///site/"),
        ..ResolverConfig::default()
    });
    world.unit("file:///site/a.js", vec!["./b.js"], None);
    world.unit("file:///site/b.js", vec!["./a.js"], None);

    let top = world.ctx.define(["./a.js"], None).expect("define");
    world.run();

    let pending = world.ctx.pending_modules();
    let ids: Vec<_> = pending.iter().map(|p| p.id.clone()).collect();
    assert_eq!(ids, vec![id("file:///site/a.js"), id("file:///site/b.js"), top]);
    assert!(pending.iter().all(|p| p.defined));
    assert_eq!(pending[0].awaiting, vec![id("file:///site/b.js")]);
    assert_eq!(pending[1].awaiting, vec![id("file:///site/a.js")]);
}

#[test]
fn dynamic_require_loads_lazily_through_bound_handle() {
    let mut world = World::with_defaults();
    let log: Log = Rc::default();
    world.unit("file:///site/lib/lazy.js", vec!["exports"], {
        let log = Rc::clone(&log);
        factory(move |_, imports| {
            exports_of(&imports[0]).set("ready", true);
            log.borrow_mut().push("lazy".into());
            Ok(())
        })
    });

    let callback_log = Rc::clone(&log);
    world.unit(
        "file:///site/lib/main.js",
        vec!["require", "exports"],
        factory(move |ctx, imports| {
            let require = imports[0].as_require().cloned().expect("require");
            let own = exports_of(&imports[1]);
            require.require(
                ctx,
                ["./lazy.js"],
                factory(move |_, imports| {
                    own.set("lazy_ready", exports_of(&imports[0]).get("ready").unwrap_or_default());
                    callback_log.borrow_mut().push("callback".into());
                    Ok(())
                }),
            )
        }),
    );

    world.ctx.define(["./lib/main.js"], logging(&log, "top")).expect("define");
    world.run();

    // main resolves without waiting for its dynamic require.
    assert_eq!(*log.borrow(), vec!["top", "lazy", "callback"]);
    let main = world.ctx.exports(&id("file:///site/lib/main.js")).expect("main");
    assert_eq!(main.get("lazy_ready"), Some(json!(true)));
}

#[test]
fn unit_that_never_defines_resolves_empty() {
    let mut world = World::with_defaults();
    let plain = id("file:///site/plain.js");
    let top = world.ctx.define(["./plain.js"], None).expect("define");

    let next = world.queue.pop().expect("load");
    assert_eq!(next, plain);
    world.ctx.announce(&plain).expect("announce");
    world.ctx.finish_load(&plain).expect("finish");

    assert!(world.ctx.is_resolved(&plain));
    assert!(world.ctx.exports(&plain).expect("exports").is_empty());
    assert!(world.ctx.is_resolved(&top));
}

#[test]
fn second_announcement_is_rejected_while_first_is_unclaimed() {
    let mut world = World::with_defaults();
    world.ctx.define(["./a.js", "./b.js"], None).expect("define");
    let a = world.queue.pop().expect("a");
    let b = world.queue.pop().expect("b");

    world.ctx.announce(&a).expect("announce a");
    assert!(world.ctx.announce(&b).is_err());
    world.ctx.finish_load(&a).expect("finish a");
    world.ctx.announce(&b).expect("announce b");
}

#[test]
fn failed_load_never_wakes_dependents() {
    let mut world = World::with_defaults();
    let log: Log = Rc::default();

    let top = world
        .ctx
        .define(["./missing.js"], logging(&log, "top"))
        .expect("define");
    world.run();

    assert!(log.borrow().is_empty());
    assert_eq!(world.ctx.state(&top), Some(&ModuleState::Unresolved));
    assert_eq!(
        world.ctx.failed_modules(),
        vec![(id("file:///site/missing.js"), "no such unit".to_string())]
    );
}

// =============================================================================
// SCALE
// =============================================================================

/// Load and define `file:///site/m{i}.js` for every outstanding request,
/// each depending on the next one until `len`.
fn drive_chain(ctx: &mut Context, queue: &LoadQueue, len: usize) {
    while let Some(next) = queue.pop() {
        let n: usize = next
            .as_str()
            .trim_start_matches("file:///site/m")
            .trim_end_matches(".js")
            .parse()
            .expect("chain index");
        ctx.announce(&next).expect("announce");
        if n + 1 < len {
            ctx.define([format!("./m{}.js", n + 1)], None).expect("define");
        } else {
            ctx.define(Vec::<String>::new(), None).expect("define");
        }
        ctx.finish_load(&next).expect("finish");
    }
}

#[test]
fn many_top_level_units_behind_one_load_resolve_in_order() {
    const UNITS: usize = 10_000;
    let mut world = World::with_defaults();
    let started = std::time::Instant::now();

    let first = world.ctx.define(["./slow.js"], None).expect("define");
    let mut units = vec![first];
    for _ in 1..UNITS {
        units.push(world.ctx.define(Vec::<String>::new(), None).expect("define"));
    }
    assert!(units.iter().all(|u| !world.ctx.is_resolved(u)));

    let slow = world.queue.pop().expect("slow load requested");
    world.ctx.announce(&slow).expect("announce");
    world.ctx.finish_load(&slow).expect("finish");

    let order = world.ctx.resolution_order();
    assert_eq!(order.len(), UNITS + 1);
    assert_eq!(order[0], slow);
    assert_eq!(&order[1..], units.as_slice());
    // Linear work finishes far inside this bound even unoptimized.
    assert!(started.elapsed() < std::time::Duration::from_secs(20));
}

#[test]
fn long_dependency_chain_resolves_without_deep_recursion() {
    const LEN: usize = 10_000;
    let queue = LoadQueue::new();
    let mut ctx = Context::new(
        queue.clone(),
        ResolverConfig {
            document_base: id("file:///site/"),
            ..ResolverConfig::default()
        },
    );

    let top = ctx.define(["./m0.js"], None).expect("define");
    drive_chain(&mut ctx, &queue, LEN);

    assert!(ctx.is_resolved(&top));
    let order = ctx.resolution_order();
    assert_eq!(order.len(), LEN + 1);
    assert_eq!(order[0], id(&format!("file:///site/m{}.js", LEN - 1)));
    assert_eq!(order[LEN - 1], id("file:///site/m0.js"));
    assert_eq!(order[LEN], top);
}

#[test]
fn failure_propagates_up_a_long_chain() {
    const LEN: usize = 10_000;
    let queue = LoadQueue::new();
    let mut ctx = Context::new(
        queue.clone(),
        ResolverConfig {
            document_base: id("file:///site/"),
            failure_policy: modlink_core::FailurePolicy::Propagate,
            ..ResolverConfig::default()
        },
    );

    let top = ctx.define(["./m0.js"], None).expect("define");
    // Define every link but leave the last load unanswered.
    while let Some(next) = queue.pop() {
        let n: usize = next
            .as_str()
            .trim_start_matches("file:///site/m")
            .trim_end_matches(".js")
            .parse()
            .expect("chain index");
        if n + 1 == LEN {
            ctx.fail_load(&next, "gone").expect("fail");
            continue;
        }
        ctx.announce(&next).expect("announce");
        ctx.define([format!("./m{}.js", n + 1)], None).expect("define");
        ctx.finish_load(&next).expect("finish");
    }

    assert_eq!(ctx.failed_modules().len(), LEN + 1);
    assert!(matches!(ctx.state(&top), Some(ModuleState::Failed(_))));
    assert!(ctx.pending_modules().is_empty());
}
