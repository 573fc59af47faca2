//! The two-phase test kit.
//!
//! A test body runs twice per forked test. In the build phase every `pick`
//! registers a forker and every `execute` registers a deferred side effect;
//! nothing touches the outside world. The registered forkers are multiplied
//! into cases. In the execute phase the body runs once per case, and the
//! same call sites consume that case's slots in order: picks get their
//! values, executes run their side effects.

use crate::context::{downcast, Context, DynValue, RecordKey};
use crate::error::{ForkcaseError, PathEntry, Result};
use crate::fork::{ForkResult, Forker};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

mod branch;
mod var;

pub use branch::{KitBranches, KitIf};
pub use var::{format_var, Symbolic, Var};

type CallFn = Rc<dyn Fn(&mut Runtime) -> Result<DynValue>>;
type Deferred = Box<dyn FnOnce(&mut Runtime) -> Result<()>>;

/// One position of a materialized case.
#[derive(Clone)]
pub enum Slot {
    /// The value a pick resolved to.
    Value(DynValue),
    /// A side effect with its arguments already bound.
    Call(CallFn),
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Value(_) => f.write_str("Slot::Value"),
            Slot::Call(_) => f.write_str("Slot::Call"),
        }
    }
}

/// Per-case mutable state shared by all side effects of the case.
#[derive(Default)]
pub struct Runtime {
    results: HashMap<RecordKey, DynValue>,
    path: Vec<PathEntry>,
    defers: Vec<Deferred>,
    counters: HashMap<String, u64>,
}

impl Runtime {
    pub fn new() -> Self {
        Runtime::default()
    }

    pub fn path(&self) -> &[PathEntry] {
        &self.path
    }

    pub fn take_path(&mut self) -> Vec<PathEntry> {
        std::mem::take(&mut self.path)
    }

    pub fn log_path(&mut self, topic: impl Into<String>, message: impl Into<String>) {
        self.path.push(PathEntry::new(topic, message));
    }

    /// Run deferred cleanups in registration order. Every cleanup runs; the
    /// first error is returned.
    pub fn run_defers(&mut self) -> Result<()> {
        let defers = std::mem::take(&mut self.defers);
        let mut first_error = None;
        for deferred in defers {
            if let Err(error) = deferred(self) {
                tracing::debug!(error = %error, "deferred cleanup failed");
                first_error.get_or_insert(error);
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// What a side effect or an expression sees when it is evaluated.
pub struct Env<'a> {
    context: &'a Context,
    runtime: Option<&'a mut Runtime>,
}

impl<'a> Env<'a> {
    pub fn new(context: &'a Context, runtime: Option<&'a mut Runtime>) -> Self {
        Env { context, runtime }
    }

    pub fn context(&self) -> &Context {
        self.context
    }

    /// Resolve a placeholder.
    pub fn get<T: Clone + 'static>(&self, var: &Var<T>) -> Result<T> {
        var.eval(self)
    }

    /// Whether side effects may run, i.e. a case is executing.
    pub fn is_executing(&self) -> bool {
        self.runtime.is_some()
    }

    pub fn result<T: Clone + 'static>(&self, key: &RecordKey) -> Result<T> {
        let unresolved = || ForkcaseError::Unresolved {
            key: key.to_string(),
        };
        let runtime = self.runtime.as_ref().ok_or_else(unresolved)?;
        let value = runtime.results.get(key).ok_or_else(unresolved)?;
        downcast(key, value)
    }

    pub fn log_path(&mut self, topic: impl Into<String>, message: impl Into<String>) {
        if let Some(runtime) = self.runtime.as_mut() {
            runtime.log_path(topic, message);
        }
    }

    /// Register a cleanup for the end of the case.
    pub fn defer<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        let runtime = self.runtime_mut()?;
        runtime.defers.push(Box::new(move |_| f()));
        Ok(())
    }

    /// Next number of the per-case sequence `scope`, starting at 1.
    pub fn allocate_id(&mut self, scope: &str) -> Result<u64> {
        let runtime = self.runtime_mut()?;
        let counter = runtime.counters.entry(scope.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    fn runtime_mut(&mut self) -> Result<&mut Runtime> {
        self.runtime
            .as_deref_mut()
            .ok_or_else(|| ForkcaseError::usage("side effects only run while executing a case"))
    }
}

enum Phase {
    Build {
        forkers: Vec<Forker<Slot>>,
    },
    Execute {
        slots: std::vec::IntoIter<Slot>,
        runtime: Runtime,
    },
}

/// The handle a forked test body receives.
pub struct TestKit {
    name: Option<Var<String>>,
    phase: Phase,
}

impl TestKit {
    /// A kit for the build phase.
    pub fn builder() -> Self {
        TestKit {
            name: None,
            phase: Phase::Build {
                forkers: Vec::new(),
            },
        }
    }

    /// A kit replaying the slots of one case.
    pub fn executor(slots: Vec<Slot>) -> Self {
        TestKit {
            name: None,
            phase: Phase::Execute {
                slots: slots.into_iter(),
                runtime: Runtime::new(),
            },
        }
    }

    pub fn is_building(&self) -> bool {
        matches!(self.phase, Phase::Build { .. })
    }

    /// Name cases after `name`, which may depend on picked values.
    pub fn set_name(&mut self, name: impl Into<Var<String>>) {
        self.name = Some(name.into());
    }

    pub fn name(&self) -> Option<&Var<String>> {
        self.name.as_ref()
    }

    /// Choose a value of `forker`; one case per value.
    pub fn pick<T>(&mut self, forker: Forker<T>) -> Result<Var<T>>
    where
        T: Clone + fmt::Debug + 'static,
    {
        match &mut self.phase {
            Phase::Build { forkers } => {
                let recorded = forker.record_as(RecordKey::generate("tk_v_"));
                forkers.push(
                    recorded
                        .forker
                        .map_value(|value| Slot::Value(Rc::new(value) as DynValue)),
                );
                Ok(Var::lookup(recorded.key))
            }
            Phase::Execute { slots, runtime } => match slots.next() {
                Some(Slot::Value(value)) => {
                    let value: T = downcast(&RecordKey::new("pick"), &value)?;
                    runtime.log_path("pick", format!("{:?}", value));
                    Ok(Var::Concrete(value))
                }
                Some(Slot::Call(_)) => Err(ForkcaseError::desync(
                    "a pick met the slot of an execute",
                )),
                None => Err(ForkcaseError::desync("a pick ran past the last slot")),
            },
        }
    }

    /// Half-open integer range.
    pub fn pick_range(&mut self, lo: i64, hi: i64) -> Result<Var<i64>> {
        self.pick(Forker::range(lo..hi))
    }

    pub fn pick_enum<T, I>(&mut self, values: I) -> Result<Var<T>>
    where
        T: Clone + fmt::Debug + 'static,
        I: IntoIterator<Item = T>,
    {
        self.pick(Forker::of(values))
    }

    pub fn pick_bool(&mut self) -> Result<Var<bool>> {
        self.pick(Forker::bool())
    }

    /// Run a side effect in the execute phase.
    ///
    /// During the build phase `f` is stored with the context of its position
    /// and a placeholder for its result is returned. During the execute phase
    /// the stored side effect of the case runs and its result comes back
    /// concrete; the `f` passed on that run is not called.
    pub fn execute<R, F>(&mut self, f: F) -> Result<Var<R>>
    where
        R: Clone + 'static,
        F: Fn(&mut Env<'_>) -> Result<R> + 'static,
    {
        match &mut self.phase {
            Phase::Build { forkers } => {
                let key = RecordKey::generate("tk_x_");
                let result_key = key.clone();
                let f = Rc::new(f);
                forkers.push(Forker::from_fn(move |context| {
                    let f = f.clone();
                    let key = result_key.clone();
                    let bound = context.clone();
                    let call: CallFn = Rc::new(move |runtime: &mut Runtime| {
                        let value = {
                            let mut env = Env::new(&bound, Some(&mut *runtime));
                            f(&mut env)?
                        };
                        let value: DynValue = Rc::new(value);
                        runtime.results.insert(key.clone(), value.clone());
                        Ok(value)
                    });
                    ForkResult::single(context.clone(), Slot::Call(call))
                }));
                Ok(Var::result(key))
            }
            Phase::Execute { slots, runtime } => match slots.next() {
                Some(Slot::Call(call)) => {
                    let value = call(runtime)?;
                    Ok(Var::Concrete(downcast(&RecordKey::new("execute"), &value)?))
                }
                Some(Slot::Value(_)) => Err(ForkcaseError::desync(
                    "an execute met the slot of a pick",
                )),
                None => Err(ForkcaseError::desync("an execute ran past the last slot")),
            },
        }
    }

    /// Append `message` under `topic` to the case's execute path.
    pub fn log_path(&mut self, topic: &str, message: impl Into<Var<String>>) -> Result<()> {
        let topic = topic.to_string();
        let message = message.into();
        self.execute(move |env| {
            let message = env.get(&message)?;
            env.log_path(topic.clone(), message);
            Ok(())
        })?;
        Ok(())
    }

    /// Run `f` when the case ends, pass or fail. Cleanups run in registration
    /// order.
    pub fn defer<F>(&mut self, f: F) -> Result<()>
    where
        F: Fn(&mut Env<'_>) -> Result<()> + 'static,
    {
        let f = Rc::new(f);
        self.execute(move |env| {
            let f = f.clone();
            let bound = env.context().clone();
            let runtime = env.runtime_mut()?;
            runtime.defers.push(Box::new(move |runtime: &mut Runtime| {
                let mut env = Env::new(&bound, Some(runtime));
                f(&mut env)
            }));
            Ok(())
        })?;
        Ok(())
    }

    pub fn print(&mut self, message: impl Into<Var<String>>) -> Result<()> {
        let message = message.into();
        self.execute(move |env| {
            println!("{}", env.get(&message)?);
            Ok(())
        })?;
        Ok(())
    }

    /// See [`format_var`].
    pub fn format(&self, template: &str, args: Vec<Var<String>>) -> Result<Var<String>> {
        format_var(template, args)
    }

    /// Check `left == right` when the case executes.
    pub fn assert_eq<T>(&mut self, left: Var<T>, right: Var<T>) -> Result<()>
    where
        T: Clone + PartialEq + fmt::Debug + 'static,
    {
        self.execute(move |env| {
            let (l, r) = (env.get(&left)?, env.get(&right)?);
            if l == r {
                Ok(())
            } else {
                Err(ForkcaseError::assertion(format!("{:?} != {:?}", l, r)))
            }
        })?;
        Ok(())
    }

    /// Check `cond` holds when the case executes.
    pub fn ensure(&mut self, cond: impl Into<Var<bool>>, message: &str) -> Result<()> {
        let cond = cond.into();
        let message = message.to_string();
        self.execute(move |env| {
            if env.get(&cond)? {
                Ok(())
            } else {
                Err(ForkcaseError::assertion(message.clone()))
            }
        })?;
        Ok(())
    }

    /// Branch on a var, which may be forked.
    pub fn if_<T>(&mut self, cond: impl Into<Var<bool>>) -> KitIf<'_, T>
    where
        T: Clone + fmt::Debug + 'static,
    {
        KitIf::new(self, cond.into())
    }

    pub fn if_not<T>(&mut self, cond: impl Into<Var<bool>>) -> KitIf<'_, T>
    where
        T: Clone + fmt::Debug + 'static,
    {
        let cond: Var<bool> = cond.into();
        KitIf::new(self, !cond)
    }

    /// The forkers registered by the build phase.
    pub(crate) fn into_forkers(self) -> Result<Vec<Forker<Slot>>> {
        match self.phase {
            Phase::Build { forkers } => Ok(forkers),
            Phase::Execute { .. } => Err(ForkcaseError::usage("the kit is not building")),
        }
    }

    /// End the execute phase. Unconsumed slots mean the body took another
    /// path than during the build phase.
    pub(crate) fn finish(self) -> (Runtime, Result<()>) {
        match self.phase {
            Phase::Execute { slots, runtime } => {
                let left = slots.len();
                let outcome = if left == 0 {
                    Ok(())
                } else {
                    Err(ForkcaseError::desync(format!(
                        "{} slot(s) left unconsumed",
                        left
                    )))
                };
                (runtime, outcome)
            }
            Phase::Build { .. } => (
                Runtime::new(),
                Err(ForkcaseError::usage("the kit is not executing")),
            ),
        }
    }
}
