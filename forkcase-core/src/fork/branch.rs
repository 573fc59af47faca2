//! Conditional forkers (`if` / `elif` / `else`).
//!
//! The builder is typestate driven: [`IfThen`] only offers `then`, and
//! [`Branches`] offers everything but `then`, so a second `then` on the same
//! arm does not compile.

use super::chain::React;
use super::{ForkResult, Forker};

/// An `if` whose first branch is still missing.
#[must_use = "an if without a then branch produces nothing"]
pub struct IfThen<T> {
    arms: Vec<(Forker<bool>, Forker<T>)>,
    cond: Forker<bool>,
}

/// Start a conditional on `cond`, which may fork into both outcomes.
pub fn if_fork<T>(cond: Forker<bool>) -> IfThen<T> {
    IfThen {
        arms: Vec::new(),
        cond,
    }
}

impl<T> IfThen<T> {
    pub fn then(self, branch: Forker<T>) -> Branches<T> {
        let mut arms = self.arms;
        arms.push((self.cond, branch));
        Branches { arms }
    }
}

/// An `if` with at least one branch.
#[must_use = "finish the conditional with else_then or end"]
pub struct Branches<T> {
    arms: Vec<(Forker<bool>, Forker<T>)>,
}

impl<T: Clone + 'static> Branches<T> {
    /// Open another arm; its branch is supplied with `then`.
    pub fn elif(self, cond: Forker<bool>) -> IfThen<T> {
        IfThen {
            arms: self.arms,
            cond,
        }
    }

    pub fn elif_then(self, cond: Forker<bool>, branch: Forker<T>) -> Branches<T> {
        self.elif(cond).then(branch)
    }

    pub fn else_then(self, branch: Forker<T>) -> Forker<T> {
        dispatch(self.arms, branch)
    }

    /// Finish without an else arm; combinations matching no arm yield `None`.
    pub fn end(self) -> Forker<Option<T>> {
        let arms = self
            .arms
            .into_iter()
            .map(|(cond, branch)| (cond, branch.map_value(Some)))
            .collect();
        dispatch(
            arms,
            Forker::from_fn(|context| ForkResult::single(context.clone(), None)),
        )
    }
}

/// For every condition item, true takes the arm's branch and false moves to
/// the next arm, both with the condition item's context.
fn dispatch<O: Clone + 'static>(arms: Vec<(Forker<bool>, Forker<O>)>, fallback: Forker<O>) -> Forker<O> {
    let mut next = React::defer(&fallback);
    for (cond, branch) in arms.into_iter().rev() {
        let otherwise = next;
        next = React::Fork(cond.map_value(move |taken| {
            if taken {
                React::defer(&branch)
            } else {
                otherwise.clone()
            }
        }));
    }
    Forker::from_fn(move |context| ForkResult::single(context.clone(), next.clone()))
        .react()
        .named("if")
}
