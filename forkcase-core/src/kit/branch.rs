//! `if_` inside a test body.
//!
//! Arms hold a plain value, a pick or a side effect. Value-only conditionals
//! stay an expression. Arms that pick fork together with the condition, and
//! arms that execute become one side effect choosing its arm when the case
//! runs.

use super::{Env, TestKit, Var};
use crate::context::Context;
use crate::error::{ForkcaseError, Result};
use crate::fork::{ForkResult, Forker};
use std::fmt;
use std::rc::Rc;

type ExecFn<T> = Rc<dyn Fn(&mut Env<'_>) -> Result<T>>;

enum Arm<T> {
    Value(Var<T>),
    Pick(Forker<T>),
    Execute(ExecFn<T>),
}

impl<T: Clone + 'static> Arm<T> {
    fn map_some(self) -> Arm<Option<T>> {
        match self {
            Arm::Value(var) => Arm::Value(var.map(Some)),
            Arm::Pick(forker) => Arm::Pick(forker.map_value(Some)),
            Arm::Execute(f) => Arm::Execute(Rc::new(move |env: &mut Env<'_>| f(env).map(Some))),
        }
    }
}

/// An `if_` waiting for the branch of its current arm.
#[must_use = "an if_ without a then branch does nothing"]
pub struct KitIf<'k, T> {
    kit: &'k mut TestKit,
    arms: Vec<(Var<bool>, Arm<T>)>,
    cond: Var<bool>,
}

/// An `if_` with at least one branch.
#[must_use = "finish the if_ with an else branch or end"]
pub struct KitBranches<'k, T> {
    kit: &'k mut TestKit,
    arms: Vec<(Var<bool>, Arm<T>)>,
}

impl<'k, T: Clone + fmt::Debug + 'static> KitIf<'k, T> {
    pub(crate) fn new(kit: &'k mut TestKit, cond: Var<bool>) -> Self {
        KitIf {
            kit,
            arms: Vec::new(),
            cond,
        }
    }

    fn arm(self, arm: Arm<T>) -> KitBranches<'k, T> {
        let mut arms = self.arms;
        arms.push((self.cond, arm));
        KitBranches {
            kit: self.kit,
            arms,
        }
    }

    pub fn then_return(self, value: impl Into<Var<T>>) -> KitBranches<'k, T> {
        self.arm(Arm::Value(value.into()))
    }

    /// Fork over `forker` in the combinations taking this arm.
    pub fn then_pick(self, forker: Forker<T>) -> KitBranches<'k, T> {
        self.arm(Arm::Pick(forker))
    }

    /// Run `f` in the cases taking this arm.
    pub fn then_execute<F>(self, f: F) -> KitBranches<'k, T>
    where
        F: Fn(&mut Env<'_>) -> Result<T> + 'static,
    {
        self.arm(Arm::Execute(Rc::new(f)))
    }
}

impl<'k, T: Clone + fmt::Debug + 'static> KitBranches<'k, T> {
    pub fn elif(self, cond: impl Into<Var<bool>>) -> KitIf<'k, T> {
        KitIf {
            kit: self.kit,
            arms: self.arms,
            cond: cond.into(),
        }
    }

    pub fn else_return(self, value: impl Into<Var<T>>) -> Result<Var<T>> {
        resolve(self.kit, self.arms, Arm::Value(value.into()))
    }

    pub fn else_pick(self, forker: Forker<T>) -> Result<Var<T>> {
        resolve(self.kit, self.arms, Arm::Pick(forker))
    }

    pub fn else_execute<F>(self, f: F) -> Result<Var<T>>
    where
        F: Fn(&mut Env<'_>) -> Result<T> + 'static,
    {
        resolve(self.kit, self.arms, Arm::Execute(Rc::new(f)))
    }

    /// Finish without an else arm; `None` where no arm is taken.
    pub fn end(self) -> Result<Var<Option<T>>> {
        let arms = self
            .arms
            .into_iter()
            .map(|(cond, arm)| (cond, arm.map_some()))
            .collect();
        resolve(self.kit, arms, Arm::Value(Var::Concrete(None)))
    }
}

/// Index of the first arm whose condition holds, `conds.len()` for the else arm.
fn choose(conds: &[Var<bool>], env: &Env<'_>) -> Result<usize> {
    for (index, cond) in conds.iter().enumerate() {
        if cond.eval(env)? {
            return Ok(index);
        }
    }
    Ok(conds.len())
}

fn arm_label(index: usize, arms: usize) -> String {
    match index {
        0 if arms > 0 => "then".to_string(),
        i if i == arms => "else".to_string(),
        i => format!("elif#{}", i),
    }
}

fn resolve<O: Clone + fmt::Debug + 'static>(
    kit: &mut TestKit,
    arms: Vec<(Var<bool>, Arm<O>)>,
    fallback: Arm<O>,
) -> Result<Var<O>> {
    let (conds, mut bodies): (Vec<Var<bool>>, Vec<Arm<O>>) = arms.into_iter().unzip();
    bodies.push(fallback);
    let picks = bodies.iter().any(|arm| matches!(arm, Arm::Pick(_)));
    let executes = bodies.iter().any(|arm| matches!(arm, Arm::Execute(_)));
    if picks && executes {
        return Err(ForkcaseError::usage(
            "an if_ cannot mix pick arms and execute arms",
        ));
    }
    let conds: Rc<[Var<bool>]> = conds.into();
    let bodies: Rc<[Arm<O>]> = bodies.into();

    if picks {
        let forker = Forker::from_fn(move |context| {
            let index = match choose(&conds, &Env::new(context, None)) {
                Ok(index) => index,
                Err(error) => return ForkResult::error(error),
            };
            match &bodies[index] {
                Arm::Value(var) => var.to_forker().do_fork(context),
                Arm::Pick(forker) => forker.do_fork(context),
                Arm::Execute(_) => ForkResult::empty(),
            }
        });
        return kit.pick(forker.named("if_"));
    }

    if executes {
        return kit.execute(move |env| {
            let index = choose(&conds, env)?;
            env.log_path("if", arm_label(index, conds.len()));
            match &bodies[index] {
                Arm::Value(var) => env.get(var),
                Arm::Execute(f) => f(env),
                Arm::Pick(_) => Err(ForkcaseError::usage("pick arm in an executing if_")),
            }
        });
    }

    let concrete = conds.iter().all(Var::is_concrete)
        && bodies.iter().all(|arm| match arm {
            Arm::Value(var) => var.is_concrete(),
            _ => false,
        });
    let expr = Var::symbolic("if_", move |env| match &bodies[choose(&conds, env)?] {
        Arm::Value(var) => var.eval(env),
        _ => Err(ForkcaseError::usage("if_ arm is not a value")),
    });
    if concrete {
        return Ok(Var::Concrete(expr.eval_in(&Context::new())?));
    }
    Ok(expr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fork::chain::Chain;
    use crate::kit::Slot;
    use std::cell::RefCell;

    fn run<R, F>(body: F) -> Vec<Result<R>>
    where
        F: Fn(&mut TestKit) -> Result<R>,
    {
        let mut kit = TestKit::builder();
        body(&mut kit).map(|_| ()).unwrap();
        let cases: Vec<Vec<Slot>> = Chain::of(kit.into_forkers().unwrap())
            .build()
            .collect_values()
            .unwrap();
        cases
            .into_iter()
            .map(|slots| {
                let mut kit = TestKit::executor(slots);
                let out = body(&mut kit);
                kit.finish().1.and(out)
            })
            .collect()
    }

    #[test]
    fn test_then_return_else_return() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let outcomes = run(move |kit| {
            let x = kit.pick_bool()?;
            let v = kit.if_::<i32>(x.clone()).then_return(10).else_return(20)?;
            let (sink, value) = (sink.clone(), v.clone());
            kit.execute(move |env| {
                sink.borrow_mut().push((env.get(&x)?, env.get(&value)?));
                Ok(())
            })?;
            Ok(v)
        });
        let values: Vec<i32> = outcomes
            .into_iter()
            .map(|v| *v.unwrap().as_concrete().unwrap())
            .collect();
        assert_eq!(values, vec![20, 10]);
        assert_eq!(*seen.borrow(), vec![(false, 20), (true, 10)]);
    }

    #[test]
    fn test_end_and_elif() {
        let outcomes = run(|kit| {
            let n = kit.pick_range(0, 3)?;
            kit.if_::<&'static str>(n.is_eq(&Var::from(0)))
                .then_return("zero")
                .elif(n.is_eq(&Var::from(1)))
                .then_return("one")
                .end()
        });
        let values: Vec<Option<&str>> = outcomes
            .into_iter()
            .map(|v| *v.unwrap().as_concrete().unwrap())
            .collect();
        assert_eq!(values, vec![Some("zero"), Some("one"), None]);
    }

    #[test]
    fn test_then_pick_forks_with_condition() {
        let outcomes = run(|kit| {
            let wide = kit.pick_bool()?;
            kit.if_::<i64>(wide)
                .then_pick(Forker::range(0i64..3).map_value(|v| v * 10))
                .else_pick(Forker::of([-1]))
        });
        let values: Vec<i64> = outcomes
            .into_iter()
            .map(|v| *v.unwrap().as_concrete().unwrap())
            .collect();
        assert_eq!(values, vec![-1, 0, 10, 20]);
    }

    #[test]
    fn test_then_execute_runs_only_taken_arm() {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let sink = calls.clone();
        let outcomes = run(move |kit| {
            let flag = kit.pick_bool()?;
            let sink = sink.clone();
            kit.if_not::<()>(flag)
                .then_execute(move |_| {
                    sink.borrow_mut().push("cleanup");
                    Ok(())
                })
                .end()
        });
        assert_eq!(outcomes.len(), 2);
        assert_eq!(*calls.borrow(), vec!["cleanup"]);
    }

    #[test]
    fn test_mixing_pick_and_execute_is_usage_error() {
        let mut kit = TestKit::builder();
        let flag = kit.pick_bool().unwrap();
        let result = kit
            .if_::<i32>(flag)
            .then_pick(Forker::of([1]))
            .else_execute(|_| Ok(2));
        assert!(matches!(result, Err(ForkcaseError::Usage { .. })));
    }
}
