//! Forkers written as imperative closures.
//!
//! A generation closure asks a [`Generate`] handle for values with `pick`. The
//! closure is re-run once per combination. Picks below the current stack depth
//! replay the value their iterator currently points at; a pick past the top
//! opens a new iterator. After every run the deepest iterator advances and
//! exhausted ones are popped, so the first pick varies slowest.
//!
//! An error item takes the place of one combination: the run that reaches it
//! gets the error from `pick` and yields it, and the next run moves past it.

use super::{ForkItem, ForkResult, Forker};
use crate::context::{downcast, Context, DynValue, RecordKey};
use crate::error::{ForkcaseError, Result};
use std::fmt;
use std::rc::Rc;

struct Frame {
    current: Result<ForkItem<DynValue>>,
    rest: ForkResult<DynValue>,
}

/// Handle passed to a generation closure for one run.
pub struct Generate {
    frames: Vec<Frame>,
    depth: usize,
    context: Context,
    pruned: bool,
    failed: Option<ForkcaseError>,
}

impl Generate {
    fn new(frames: Vec<Frame>, context: Context) -> Self {
        Generate {
            frames,
            depth: 0,
            context,
            pruned: false,
            failed: None,
        }
    }

    /// The context after the latest pick.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Number of picks made so far in this run.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Choose a value of `forker`.
    ///
    /// An empty forker prunes the current path: this and every later pick of
    /// the run return [`ForkcaseError::Pruned`], and the run's output is
    /// discarded.
    ///
    /// When the forker yields an error item, this and every later pick of the
    /// run return that error, and it becomes the run's output whatever the
    /// closure returns.
    pub fn pick<V: Clone + 'static>(&mut self, forker: &Forker<V>) -> Result<V> {
        if let Some(error) = &self.failed {
            return Err(error.clone());
        }
        if self.pruned {
            return Err(ForkcaseError::Pruned);
        }
        let depth = self.depth;
        if depth >= self.frames.len() {
            let mut rest = forker
                .map_value(|value| Rc::new(value) as DynValue)
                .do_fork(&self.context);
            match rest.next() {
                Some(current) => self.frames.push(Frame { current, rest }),
                None => {
                    self.pruned = true;
                    return Err(ForkcaseError::Pruned);
                }
            }
        }
        self.depth += 1;
        match &self.frames[depth].current {
            Ok(current) => {
                let value = downcast(&RecordKey::new(format!("pick#{depth}")), &current.value)?;
                self.context = current.context.clone();
                Ok(value)
            }
            Err(error) => {
                self.failed = Some(error.clone());
                Err(error.clone())
            }
        }
    }

    pub fn pick_enum<V, I>(&mut self, values: I) -> Result<V>
    where
        V: Clone + fmt::Debug + 'static,
        I: IntoIterator<Item = V>,
    {
        self.pick(&Forker::of(values))
    }

    pub fn pick_bool(&mut self) -> Result<bool> {
        self.pick(&Forker::bool())
    }

    /// Half-open, like [`Forker::range`].
    pub fn pick_range(&mut self, lo: i64, hi: i64) -> Result<i64> {
        self.pick(&Forker::range(lo..hi))
    }
}

type GenerateFn<S, T> = Rc<dyn Fn(&mut Generate, &mut S) -> Result<T>>;

struct GenerateIter<S, T> {
    f: GenerateFn<S, T>,
    scratch: S,
    base: Context,
    frames: Vec<Frame>,
    done: bool,
}

impl<S, T> GenerateIter<S, T> {
    /// Move to the next combination.
    fn advance(&mut self) {
        while let Some(mut frame) = self.frames.pop() {
            if let Some(current) = frame.rest.next() {
                frame.current = current;
                self.frames.push(frame);
                return;
            }
        }
        self.done = true;
    }
}

impl<S, T> Iterator for GenerateIter<S, T> {
    type Item = Result<ForkItem<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let mut handle = Generate::new(std::mem::take(&mut self.frames), self.base.clone());
            let output = (self.f)(&mut handle, &mut self.scratch);
            let Generate {
                mut frames,
                depth,
                context,
                pruned,
                failed,
            } = handle;
            // frames the run never reached belong to another branch
            frames.truncate(depth);
            self.frames = frames;
            self.advance();
            match output {
                _ if failed.is_some() => return failed.map(Err),
                _ if pruned => continue,
                Ok(value) => return Some(Ok(ForkItem::new(context, value))),
                Err(error) => return Some(Err(error)),
            }
        }
        None
    }
}

impl<T: 'static> Forker<T> {
    /// A forker whose combinations are the pick sequences of `f`.
    pub fn generate<F>(f: F) -> Forker<T>
    where
        F: Fn(&mut Generate) -> Result<T> + 'static,
    {
        Forker::generate_with(|| (), move |generate, _: &mut ()| f(generate))
    }

    /// Like [`Forker::generate`], with scratch state created afresh for every
    /// enumeration and shared by all runs within it.
    pub fn generate_with<S, I, F>(init: I, f: F) -> Forker<T>
    where
        S: 'static,
        I: Fn() -> S + 'static,
        F: Fn(&mut Generate, &mut S) -> Result<T> + 'static,
    {
        let f: GenerateFn<S, T> = Rc::new(f);
        Forker::from_fn(move |context| {
            ForkResult::new(GenerateIter {
                f: f.clone(),
                scratch: init(),
                base: context.clone(),
                frames: Vec::new(),
                done: false,
            })
        })
        .named("generate")
    }
}
