//! Model-based exploration of guarded actions.
//!
//! A [`StateDriver`] walks a state machine depth first. At every state the
//! actions whose condition holds are candidates; a candidate is dropped when
//! the same action was already taken from a state with the same signature
//! anywhere in the exploration. A path ends when no candidate is left.

use crate::case::{panic_error, RunConfig};
use crate::condition::Condition;
use crate::context::Context;
use crate::error::{CaseOutcome, ForkcaseError, PathEntry, Report, Result};
use crate::fork::generation::Generate;
use crate::fork::{ForkItem, ForkResult, Forker};
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

/// The part of a state that decides whether two states are interchangeable.
pub trait Signature {
    type Value: Clone + Eq + Hash + fmt::Debug + 'static;

    fn signature(&self) -> Self::Value;
}

/// A model state the explorer can drive.
pub trait State: Signature + 'static {
    /// Called once on a fresh state before the first action.
    fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once when a path ends, including replays.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Where an action sits in the path being executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    index: usize,
}

impl Step {
    /// 0-based position of the running action in its path.
    pub fn current_action_index(&self) -> usize {
        self.index
    }
}

type Handler<S> = Rc<dyn Fn(&mut S, &Step) -> Result<()>>;

/// A named, guarded transition.
pub struct Action<S> {
    name: String,
    cond: Condition<S>,
    args: Option<String>,
    handler: Handler<S>,
}

impl<S: State> Action<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn condition(&self) -> &Condition<S> {
        &self.cond
    }

    /// Debug rendering of the fixed arguments, if the action has any.
    pub fn args(&self) -> Option<&str> {
        self.args.as_deref()
    }

    pub fn is_enabled(&self, state: &S) -> bool {
        self.cond.evaluate(state)
    }

    /// Run the handler. Errors are reported as failures of this action.
    pub fn invoke(&self, state: &mut S, step: &Step) -> Result<()> {
        (self.handler)(state, step).map_err(|error| match error {
            ForkcaseError::Action { .. } => error,
            other => ForkcaseError::Action {
                action: self.name.clone(),
                message: other.to_string(),
            },
        })
    }
}

impl<S> fmt::Display for Action<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.args {
            Some(args) => write!(f, "{}{}", self.name, args),
            None => f.write_str(&self.name),
        }
    }
}

impl<S> fmt::Debug for Action<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Action({} if {})", self, self.cond)
    }
}

fn render_args<A: fmt::Debug>(args: &A) -> String {
    let rendered = format!("{:?}", args);
    if rendered.starts_with('(') {
        rendered
    } else {
        format!("({})", rendered)
    }
}

/// Builder for the actions of a model.
pub struct ActionSet<S> {
    actions: Vec<Action<S>>,
}

impl<S: State> Default for ActionSet<S> {
    fn default() -> Self {
        ActionSet::new()
    }
}

impl<S: State> ActionSet<S> {
    pub fn new() -> Self {
        ActionSet {
            actions: Vec::new(),
        }
    }

    pub fn action<F>(mut self, name: impl Into<String>, cond: Condition<S>, f: F) -> Self
    where
        F: Fn(&mut S, &Step) -> Result<()> + 'static,
    {
        self.actions.push(Action {
            name: name.into(),
            cond,
            args: None,
            handler: Rc::new(f),
        });
        self
    }

    /// Register `f` once per `(name, args)` entry. Every copy is guarded by
    /// `cond` and called with its own arguments.
    ///
    /// ```
    /// # use forkcase_core::{ActionSet, Condition, Signature, State};
    /// # struct Counter(u8);
    /// # impl Signature for Counter {
    /// #     type Value = u8;
    /// #     fn signature(&self) -> u8 { self.0 }
    /// # }
    /// # impl State for Counter {}
    /// let actions = ActionSet::<Counter>::new().generate(
    ///     Condition::always(),
    ///     (1..=3u8).map(|v| (format!("move{}", v), v)),
    ///     |state, _, v| {
    ///         state.0 = (state.0 + v) % 4;
    ///         Ok(())
    ///     },
    /// );
    /// assert_eq!(actions.len(), 3);
    /// ```
    pub fn generate<N, A, I, F>(self, cond: Condition<S>, entries: I, f: F) -> Self
    where
        N: Into<String>,
        A: fmt::Debug + 'static,
        I: IntoIterator<Item = (N, A)>,
        F: Fn(&mut S, &Step, &A) -> Result<()> + 'static,
    {
        self.generate_guarded(
            entries
                .into_iter()
                .map(move |(name, args)| (name, args, cond.clone())),
            f,
        )
    }

    /// Like [`ActionSet::generate`], with a guard for each entry.
    pub fn generate_guarded<N, A, I, F>(mut self, entries: I, f: F) -> Self
    where
        N: Into<String>,
        A: fmt::Debug + 'static,
        I: IntoIterator<Item = (N, A, Condition<S>)>,
        F: Fn(&mut S, &Step, &A) -> Result<()> + 'static,
    {
        let f = Rc::new(f);
        for (name, args, cond) in entries {
            let f = f.clone();
            let rendered = render_args(&args);
            self.actions.push(Action {
                name: name.into(),
                cond,
                args: Some(rendered),
                handler: Rc::new(move |state: &mut S, step: &Step| f(state, step, &args)),
            });
        }
        self
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Bounds of one exploration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExploreConfig {
    /// End every path after this many actions.
    pub max_depth: Option<usize>,
}

impl ExploreConfig {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }
}

/// One finished exploration path.
pub struct Explored<S: Signature> {
    /// The model state after the last action, already closed.
    pub state: S,
    /// Actions in the order they ran.
    pub path: Vec<Rc<Action<S>>>,
    /// `(signature before the action, action name)` per step.
    pub trail: Vec<(S::Value, String)>,
}

impl<S: State> Explored<S> {
    pub fn action_names(&self) -> Vec<&str> {
        self.path.iter().map(|action| action.name()).collect()
    }

    /// Run the same actions against `fresh`, typically a state bound to a
    /// live resource. `close` runs even when an action fails.
    pub fn replay(&self, mut fresh: S) -> Result<S> {
        let outcome = fresh.setup().and_then(|()| {
            for (index, action) in self.path.iter().enumerate() {
                tracing::debug!(index, action = %action, "replaying action");
                action.invoke(&mut fresh, &Step { index })?;
            }
            Ok(())
        });
        let closed = fresh.close();
        outcome.and(closed).map(|()| fresh)
    }

    fn path_entries(&self) -> Vec<PathEntry> {
        self.path
            .iter()
            .zip(&self.trail)
            .map(|(action, (signature, _))| {
                PathEntry::new("action", format!("{} @ {:?}", action, signature))
            })
            .collect()
    }
}

impl<S: State> fmt::Debug for Explored<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Explored")
            .field("path", &self.action_names())
            .field("trail", &self.trail)
            .finish()
    }
}

type Seen<V> = Rc<RefCell<HashSet<(V, String)>>>;

/// The enabled actions at one state that were not taken from an equal
/// signature yet. Filtering is lazy so actions taken by sibling paths
/// after this fork point opened are skipped too. Yields a single `None` when
/// nothing is left at all.
struct Candidates<S: Signature> {
    seen: Seen<S::Value>,
    signature: S::Value,
    actions: std::vec::IntoIter<Rc<Action<S>>>,
    context: Context,
    yielded: bool,
}

impl<S: State> Iterator for Candidates<S> {
    type Item = Result<ForkItem<Option<Rc<Action<S>>>>>;

    fn next(&mut self) -> Option<Self::Item> {
        for action in self.actions.by_ref() {
            let key = (self.signature.clone(), action.name.clone());
            if self.seen.borrow().contains(&key) {
                tracing::trace!(signature = ?self.signature, action = %action.name, "skipping seen transition");
                continue;
            }
            self.yielded = true;
            return Some(Ok(ForkItem::new(self.context.clone(), Some(action))));
        }
        if self.yielded {
            None
        } else {
            self.yielded = true;
            Some(Ok(ForkItem::new(self.context.clone(), None)))
        }
    }
}

fn candidates<S: State>(
    seen: Seen<S::Value>,
    signature: S::Value,
    enabled: Vec<Rc<Action<S>>>,
) -> Forker<Option<Rc<Action<S>>>> {
    Forker::from_fn(move |context| {
        ForkResult::new(Candidates::<S> {
            seen: seen.clone(),
            signature: signature.clone(),
            actions: enabled.clone().into_iter(),
            context: context.clone(),
            yielded: false,
        })
    })
    .named("candidates")
}

/// Explores and verifies a model.
pub struct StateDriver<S> {
    actions: Rc<[Rc<Action<S>>]>,
    config: ExploreConfig,
}

impl<S: State> StateDriver<S> {
    /// Fails if two actions share a name.
    pub fn new(actions: ActionSet<S>) -> Result<Self> {
        let mut names = HashSet::new();
        for action in &actions.actions {
            if !names.insert(action.name.as_str()) {
                return Err(ForkcaseError::DuplicateAction {
                    name: action.name.clone(),
                });
            }
        }
        let actions: Vec<Rc<Action<S>>> = actions.actions.into_iter().map(Rc::new).collect();
        Ok(StateDriver {
            actions: actions.into(),
            config: ExploreConfig::default(),
        })
    }

    pub fn with_config(mut self, config: ExploreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn actions(&self) -> impl Iterator<Item = &Action<S>> {
        self.actions.iter().map(|action| action.as_ref())
    }

    /// All paths from states built by `init`.
    ///
    /// Every enumeration of the returned forker starts with an empty set of
    /// seen transitions, so the forker can be enumerated again.
    pub fn explore<I>(&self, init: I) -> Forker<Explored<S>>
    where
        I: Fn() -> S + 'static,
    {
        let actions = self.actions.clone();
        let max_depth = self.config.max_depth;
        Forker::generate_with(
            || -> Seen<S::Value> { Rc::new(RefCell::new(HashSet::new())) },
            move |generate: &mut Generate, seen: &mut Seen<S::Value>| {
                let mut state = init();
                state.setup()?;
                let mut path = Vec::new();
                let mut trail = Vec::new();
                while max_depth.map_or(true, |max| path.len() < max) {
                    let signature = state.signature();
                    let enabled: Vec<Rc<Action<S>>> = actions
                        .iter()
                        .filter(|action| action.is_enabled(&state))
                        .cloned()
                        .collect();
                    let next = generate.pick(&candidates::<S>(
                        seen.clone(),
                        signature.clone(),
                        enabled,
                    ))?;
                    let Some(action) = next else {
                        break;
                    };
                    seen.borrow_mut()
                        .insert((signature.clone(), action.name.clone()));
                    tracing::debug!(signature = ?signature, action = %action, "explorer step");
                    let step = Step { index: path.len() };
                    trail.push((signature, action.name.clone()));
                    path.push(action.clone());
                    action.invoke(&mut state, &step)?;
                }
                state.close()?;
                tracing::debug!(steps = path.len(), "explored path finished");
                Ok(Explored { state, path, trail })
            },
        )
        .named("explore")
    }

    /// Explore from `init`, then replay every path on a state built by
    /// `online`, which receives the 1-based case index. Cases are named
    /// `fork_<n>`; the skip list of `config` applies.
    pub fn verify<I, O>(&self, name: &str, init: I, online: O, config: &RunConfig) -> Result<Report>
    where
        I: Fn() -> S + 'static,
        O: Fn(usize) -> S,
    {
        let mut report = Report::new(name);
        for (count, explored) in self.explore(init).fork().enumerate() {
            if config.limit.map_or(false, |limit| count >= limit) {
                break;
            }
            let explored = explored?.value;
            let index = count + 1;
            let case = format!("fork_{}", index);
            if config.is_skipped(index) {
                tracing::debug!(index, name = %case, "case skipped");
                report.outcomes.push(CaseOutcome::Skipped { index, name: case });
                continue;
            }
            let replayed = catch_unwind(AssertUnwindSafe(|| explored.replay(online(index))))
                .unwrap_or_else(|payload| Err(panic_error(payload)));
            let outcome = match replayed {
                Ok(_) => CaseOutcome::Pass { index, name: case },
                Err(error) => CaseOutcome::Fail {
                    index,
                    name: case,
                    error: error.to_string(),
                    path: explored.path_entries(),
                },
            };
            tracing::debug!(index, failed = outcome.is_failure(), "verified explored path");
            let failed = outcome.is_failure();
            report.outcomes.push(outcome);
            if failed && config.fail_fast {
                break;
            }
        }
        tracing::info!(
            test = name,
            cases = report.outcomes.len(),
            passed = report.passed(),
            "verification finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Position on a ring of four cells.
    #[derive(Debug, Default)]
    struct Ring {
        at: u8,
        closed: bool,
        log: Vec<usize>,
    }

    impl Signature for Ring {
        type Value = u8;

        fn signature(&self) -> u8 {
            self.at
        }
    }

    impl State for Ring {
        fn close(&mut self) -> Result<()> {
            self.closed = true;
            Ok(())
        }
    }

    fn ring_actions() -> ActionSet<Ring> {
        ActionSet::new().generate(
            Condition::always(),
            (1..=3u8).map(|v| (format!("move{}", v), v)),
            |state: &mut Ring, step: &Step, v: &u8| {
                state.at = (state.at + v) % 4;
                state.log.push(step.current_action_index());
                Ok(())
            },
        )
    }

    #[test]
    fn test_every_transition_taken_once() {
        let driver = StateDriver::new(ring_actions()).unwrap();
        let paths = driver.explore(Ring::default).collect_values().unwrap();
        let mut trail: Vec<(u8, String)> = paths.iter().flat_map(|p| p.trail.clone()).collect();
        let taken = trail.len();
        trail.sort();
        trail.dedup();
        assert_eq!(trail.len(), taken);
        assert_eq!(taken, 4 * 3);
        assert!(paths.iter().all(|p| p.state.closed));
    }

    #[test]
    fn test_first_path_is_greedy() {
        let driver = StateDriver::new(ring_actions()).unwrap();
        let paths = driver.explore(Ring::default).collect_values().unwrap();
        // the first path keeps taking unseen transitions until none is left
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].action_names()[..4], ["move1"; 4]);
        assert_eq!(paths[0].state.log, (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn test_exploration_is_restartable() {
        let driver = StateDriver::new(ring_actions())
            .unwrap()
            .with_config(ExploreConfig::default().with_max_depth(2));
        let forker = driver.explore(Ring::default);
        let first = forker.collect_values().unwrap().len();
        let second = forker.collect_values().unwrap().len();
        assert_eq!(first, 9);
        assert_eq!(second, 9);
    }

    #[test]
    fn test_conditions_guard_actions() {
        let below_two = Condition::new("below_two", |s: &Ring| s.at < 2);
        let actions = ActionSet::new().action("step", below_two, |s: &mut Ring, _: &Step| {
            s.at += 1;
            Ok(())
        });
        let driver = StateDriver::new(actions).unwrap();
        let paths = driver.explore(Ring::default).collect_values().unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].state.at, 2);
    }

    #[test]
    fn test_no_enabled_action_yields_initial_state() {
        let never = !Condition::<Ring>::always();
        let actions = ActionSet::new().action("noop", never, |_: &mut Ring, _: &Step| Ok(()));
        let driver = StateDriver::new(actions).unwrap();
        let paths = driver.explore(Ring::default).collect_values().unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].path.is_empty());
    }

    #[test]
    fn test_max_depth() {
        let driver = StateDriver::new(ring_actions())
            .unwrap()
            .with_config(ExploreConfig::default().with_max_depth(1));
        let paths = driver.explore(Ring::default).collect_values().unwrap();
        assert!(paths.iter().all(|p| p.path.len() <= 1));
        assert_eq!(paths.len(), 3);
    }

    #[test]
    fn test_duplicate_action_names() {
        let actions = ring_actions().action("move2", Condition::always(), |_: &mut Ring, _: &Step| Ok(()));
        assert!(matches!(
            StateDriver::new(actions),
            Err(ForkcaseError::DuplicateAction { name }) if name == "move2"
        ));
    }

    #[test]
    fn test_replay_runs_same_actions_and_closes() {
        let driver = StateDriver::new(ring_actions()).unwrap();
        let explored = driver.explore(Ring::default).fork().next().unwrap().unwrap().value;
        let replayed = explored.replay(Ring::default()).unwrap();
        assert_eq!(replayed.at, explored.state.at);
        assert_eq!(replayed.log, explored.state.log);
        assert!(replayed.closed);
    }

    #[test]
    fn test_verify_reports_failing_replays() {
        let driver = StateDriver::new(ring_actions())
            .unwrap()
            .with_config(ExploreConfig::default().with_max_depth(2));
        let report = driver
            .verify("ring", Ring::default, |_| Ring::default(), &RunConfig::default().with_skip(1))
            .unwrap();
        assert_eq!(report.outcomes.len(), 9);
        assert_eq!(report.passed(), 8);
        assert_eq!(report.outcomes[8].name(), "fork_9");
        assert_eq!(report.outcomes[0].name(), "fork_1");
        assert!(matches!(report.outcomes[0], CaseOutcome::Skipped { .. }));
        assert!(report.is_success());

        // an online state that starts elsewhere trips a failing action
        let actions = ring_actions().action(
            "check",
            Condition::new("at_zero", |s: &Ring| s.at == 0),
            |s: &mut Ring, _: &Step| {
                if s.at == 0 {
                    Ok(())
                } else {
                    Err(ForkcaseError::assertion("left the origin"))
                }
            },
        );
        let driver = StateDriver::new(actions).unwrap();
        let report = driver
            .verify("ring", Ring::default, |_| Ring { at: 1, ..Ring::default() }, &RunConfig::default())
            .unwrap();
        assert!(!report.is_success());
    }

    #[test]
    fn test_generated_actions_keep_their_own_guards() {
        let at_zero = Condition::new("at_zero", |ring: &Ring| ring.at == 0);
        let actions = ActionSet::new().generate_guarded(
            vec![
                ("move1", 1u8, Condition::always()),
                ("move2", 2u8, at_zero),
            ],
            |state: &mut Ring, _: &Step, v: &u8| {
                state.at = (state.at + v) % 4;
                Ok(())
            },
        );
        let driver = StateDriver::new(actions).unwrap();
        let enabled = |at: u8| -> Vec<String> {
            let ring = Ring { at, ..Ring::default() };
            driver
                .actions()
                .filter(|action| action.is_enabled(&ring))
                .map(|action| action.to_string())
                .collect()
        };
        assert_eq!(enabled(0), vec!["move1(1)", "move2(2)"]);
        assert_eq!(enabled(1), vec!["move1(1)"]);

        let paths = driver.explore(Ring::default).collect_values().unwrap();
        let taken: HashSet<(u8, String)> = paths
            .iter()
            .flat_map(|path| path.trail.iter().cloned())
            .collect();
        assert!(taken.contains(&(0, "move2".to_string())));
        assert!(!taken.iter().any(|(at, name)| *at != 0 && name == "move2"));
    }
}
