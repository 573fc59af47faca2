//! Placeholders for values that only exist once a case is materialized.
//!
//! During the build phase a pick or an execute hands back a symbolic
//! [`Var`]: an expression over the case context and the results of earlier
//! side effects. During the execute phase the same call sites hand back
//! concrete values. Operators on vars build new expressions instead of
//! evaluating anything.

use super::Env;
use crate::context::{Context, RecordKey};
use crate::error::{ForkcaseError, Result};
use crate::fork::{ForkResult, Forker};
use std::fmt;
use std::ops::{Add, BitAnd, BitOr, Div, Mul, Neg, Not, Rem, Sub};
use std::rc::Rc;

type Expr<T> = Rc<dyn Fn(&Env<'_>) -> Result<T>>;

/// A deferred expression, evaluated against an [`Env`].
pub struct Symbolic<T> {
    expr: Expr<T>,
    label: Rc<str>,
}

impl<T> Clone for Symbolic<T> {
    fn clone(&self) -> Self {
        Symbolic {
            expr: self.expr.clone(),
            label: self.label.clone(),
        }
    }
}

impl<T> Symbolic<T> {
    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Either a value already known, or an expression to evaluate later.
pub enum Var<T> {
    Concrete(T),
    Symbolic(Symbolic<T>),
}

impl<T: Clone> Clone for Var<T> {
    fn clone(&self) -> Self {
        match self {
            Var::Concrete(value) => Var::Concrete(value.clone()),
            Var::Symbolic(symbolic) => Var::Symbolic(symbolic.clone()),
        }
    }
}

impl<T: Clone + 'static> Var<T> {
    pub fn symbolic<F>(label: impl Into<String>, expr: F) -> Self
    where
        F: Fn(&Env<'_>) -> Result<T> + 'static,
    {
        Var::Symbolic(Symbolic {
            expr: Rc::new(expr),
            label: Rc::from(label.into()),
        })
    }

    /// The value recorded in the case context under `key`.
    pub fn lookup(key: RecordKey) -> Self {
        let label = format!("${}", key);
        Var::symbolic(label, move |env| env.context().lookup(&key))
    }

    /// The result a side effect stored under `key` while executing.
    pub fn result(key: RecordKey) -> Self {
        let label = format!("${}", key);
        Var::symbolic(label, move |env| env.result(&key))
    }

    pub fn is_concrete(&self) -> bool {
        matches!(self, Var::Concrete(_))
    }

    pub fn as_concrete(&self) -> Option<&T> {
        match self {
            Var::Concrete(value) => Some(value),
            Var::Symbolic(_) => None,
        }
    }

    pub fn eval(&self, env: &Env<'_>) -> Result<T> {
        match self {
            Var::Concrete(value) => Ok(value.clone()),
            Var::Symbolic(symbolic) => (symbolic.expr)(env),
        }
    }

    /// Evaluate against a context alone; side-effect results are unresolved.
    pub fn eval_in(&self, context: &Context) -> Result<T> {
        self.eval(&Env::new(context, None))
    }

    /// Project the value, e.g. a field or an index.
    pub fn map<U, F>(&self, f: F) -> Var<U>
    where
        U: Clone + 'static,
        F: Fn(T) -> U + 'static,
    {
        match self {
            Var::Concrete(value) => Var::Concrete(f(value.clone())),
            Var::Symbolic(symbolic) => {
                let inner = symbolic.clone();
                Var::symbolic(symbolic.label.to_string(), move |env| {
                    (inner.expr)(env).map(&f)
                })
            }
        }
    }

    /// Like [`Var::map`] for projections that can fail.
    pub fn try_map<U, F>(&self, f: F) -> Var<U>
    where
        U: Clone + 'static,
        F: Fn(T) -> Result<U> + 'static,
    {
        let inner = self.clone();
        let label = self.to_label();
        Var::symbolic(label, move |env| f(inner.eval(env)?))
    }

    pub fn zip_with<U, R, F>(&self, other: &Var<U>, label: &str, f: F) -> Var<R>
    where
        U: Clone + 'static,
        R: Clone + 'static,
        F: Fn(T, U) -> R + 'static,
    {
        match (self, other) {
            (Var::Concrete(a), Var::Concrete(b)) => Var::Concrete(f(a.clone(), b.clone())),
            _ => {
                let (a, b) = (self.clone(), other.clone());
                let label = format!("({} {} {})", self.to_label(), label, other.to_label());
                Var::symbolic(label, move |env| Ok(f(a.eval(env)?, b.eval(env)?)))
            }
        }
    }

    /// A forker producing this var's value in each context it is forked with.
    pub fn to_forker(&self) -> Forker<T> {
        let var = self.clone();
        Forker::from_fn(move |context| match var.eval_in(context) {
            Ok(value) => ForkResult::single(context.clone(), value),
            Err(error) => ForkResult::error(error),
        })
        .named(self.to_label())
    }

    fn to_label(&self) -> String {
        match self {
            Var::Concrete(_) => "<value>".to_string(),
            Var::Symbolic(symbolic) => symbolic.label.to_string(),
        }
    }
}

impl<T: Clone + fmt::Display + 'static> Var<T> {
    pub fn display(&self) -> Var<String> {
        self.map(|value| value.to_string())
    }
}

macro_rules! compare {
    ($($method:ident => $op:tt),*) => {
        impl<T: Clone + PartialOrd + 'static> Var<T> {
            $(
                pub fn $method(&self, other: &Var<T>) -> Var<bool> {
                    self.zip_with(other, stringify!($op), |a, b| a $op b)
                }
            )*
        }
    };
}

compare!(is_eq => ==, is_ne => !=, is_lt => <, is_le => <=, is_gt => >, is_ge => >=);

macro_rules! binary_op {
    ($($trait:ident::$method:ident => $op:tt),*) => {
        $(
            impl<T> $trait for Var<T>
            where
                T: $trait<Output = T> + Clone + 'static,
            {
                type Output = Var<T>;

                fn $method(self, rhs: Var<T>) -> Var<T> {
                    self.zip_with(&rhs, stringify!($op), |a, b| a $op b)
                }
            }
        )*
    };
}

binary_op!(
    Add::add => +,
    Sub::sub => -,
    Mul::mul => *,
    Div::div => /,
    Rem::rem => %,
    BitAnd::bitand => &,
    BitOr::bitor => |
);

impl<T> Neg for Var<T>
where
    T: Neg<Output = T> + Clone + 'static,
{
    type Output = Var<T>;

    fn neg(self) -> Var<T> {
        self.map(|v| -v)
    }
}

impl<T> Not for Var<T>
where
    T: Not<Output = T> + Clone + 'static,
{
    type Output = Var<T>;

    fn not(self) -> Var<T> {
        self.map(|v| !v)
    }
}

impl<T> From<T> for Var<T> {
    fn from(value: T) -> Self {
        Var::Concrete(value)
    }
}

impl From<&str> for Var<String> {
    fn from(value: &str) -> Self {
        Var::Concrete(value.to_string())
    }
}

impl<T: fmt::Debug> fmt::Debug for Var<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Var::Concrete(value) => write!(f, "{:?}", value),
            Var::Symbolic(symbolic) => f.write_str(&symbolic.label),
        }
    }
}

enum Segment {
    Text(String),
    Arg(usize),
}

fn parse_template(template: &str, args: usize) -> Result<Vec<Segment>> {
    let error = |message: String| ForkcaseError::Template { message };
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut next_auto = 0;
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                text.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                text.push('}');
            }
            '{' => {
                let mut spec = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => spec.push(c),
                        None => return Err(error(format!("unclosed '{{' in {:?}", template))),
                    }
                }
                let index = if spec.is_empty() {
                    next_auto += 1;
                    next_auto - 1
                } else {
                    spec.trim()
                        .parse::<usize>()
                        .map_err(|_| error(format!("bad placeholder {{{}}}", spec)))?
                };
                if index >= args {
                    return Err(error(format!(
                        "placeholder {} out of range for {} arguments",
                        index, args
                    )));
                }
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                segments.push(Segment::Arg(index));
            }
            '}' => return Err(error(format!("single '}}' in {:?}", template))),
            c => text.push(c),
        }
    }
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    Ok(segments)
}

/// Fill `{}` / `{n}` placeholders of `template` with `args`. `{{` and `}}`
/// are literal braces. The template is checked right away; the result stays
/// symbolic while any argument is.
pub fn format_var(template: &str, args: Vec<Var<String>>) -> Result<Var<String>> {
    let segments = Rc::new(parse_template(template, args.len())?);
    let render = move |values: &[String]| {
        let mut out = String::new();
        for segment in segments.iter() {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Arg(index) => out.push_str(&values[*index]),
            }
        }
        out
    };
    if args.iter().all(Var::is_concrete) {
        let values: Vec<String> = args.iter().filter_map(|a| a.as_concrete().cloned()).collect();
        return Ok(Var::Concrete(render(&values)));
    }
    Ok(Var::symbolic(format!("format({:?})", template), move |env| {
        let values = args
            .iter()
            .map(|arg| arg.eval(env))
            .collect::<Result<Vec<_>>>()?;
        Ok(render(&values))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concrete_arithmetic() {
        let a = Var::from(2);
        let b = Var::from(3);
        let sum = a.clone() + b.clone() * Var::from(4);
        assert_eq!(sum.as_concrete(), Some(&14));
        assert_eq!((-a).as_concrete(), Some(&-2));
        assert_eq!(b.is_lt(&Var::from(5)).as_concrete(), Some(&true));
    }

    #[test]
    fn test_symbolic_arithmetic() {
        let key = RecordKey::new("n");
        let n: Var<i64> = Var::lookup(key.clone());
        let expr = (n.clone() + Var::from(1)) * n.clone();
        assert!(!expr.is_concrete());
        assert_eq!(format!("{:?}", expr), "(($n + <value>) * $n)");

        let ctx = Context::new().set(key, 4i64);
        assert_eq!(expr.eval_in(&ctx), Ok(20));
        assert_eq!(n.is_ge(&Var::from(4)).eval_in(&ctx), Ok(true));
        assert!(matches!(
            expr.eval_in(&Context::new()),
            Err(ForkcaseError::MissingBinding { .. })
        ));
    }

    #[test]
    fn test_boolean_ops() {
        let key = RecordKey::new("flag");
        let flag: Var<bool> = Var::lookup(key.clone());
        let expr = !flag.clone() | (flag & Var::from(false));
        let ctx = Context::new().set(key, true);
        assert_eq!(expr.eval_in(&ctx), Ok(false));
    }

    #[test]
    fn test_map_projects() {
        let key = RecordKey::new("pair");
        let pair: Var<(i32, String)> = Var::lookup(key.clone());
        let name = pair.map(|p| p.1);
        let ctx = Context::new().set(key, (1, "ta".to_string()));
        assert_eq!(name.eval_in(&ctx), Ok("ta".to_string()));
    }

    #[test]
    fn test_result_unresolved_without_runtime() {
        let var: Var<i32> = Var::result(RecordKey::new("r"));
        assert!(matches!(
            var.eval_in(&Context::new()),
            Err(ForkcaseError::Unresolved { .. })
        ));
    }

    #[test]
    fn test_to_forker() {
        let key = RecordKey::new("x");
        let recorded = Forker::of([1, 2]).record_as(key.clone());
        let doubled = Var::<i32>::lookup(key).map(|x| x * 2).to_forker();
        let forker = recorded.forker.and_then(move |_| doubled.clone());
        assert_eq!(forker.collect_values().unwrap(), vec![2, 4]);
    }

    #[test]
    fn test_format() {
        let var = format_var("{} and {1} {{x}}", vec!["a".into(), "b".into()]).unwrap();
        assert_eq!(var.as_concrete().map(String::as_str), Some("a and b {x}"));

        let key = RecordKey::new("t");
        let table: Var<String> = Var::lookup(key.clone());
        let var = format_var("create table {}", vec![table]).unwrap();
        let ctx = Context::new().set(key, "ta".to_string());
        assert_eq!(var.eval_in(&ctx), Ok("create table ta".to_string()));
    }

    #[test]
    fn test_format_errors() {
        assert!(matches!(
            format_var("{} {}", vec!["a".into()]),
            Err(ForkcaseError::Template { .. })
        ));
        assert!(matches!(
            format_var("{oops}", vec!["a".into()]),
            Err(ForkcaseError::Template { .. })
        ));
        assert!(matches!(
            format_var("open {", vec![]),
            Err(ForkcaseError::Template { .. })
        ));
        assert!(matches!(
            format_var("close }", vec![]),
            Err(ForkcaseError::Template { .. })
        ));
    }
}
