//! Guard conditions for model actions.
//!
//! Conditions compose with `&`, `|` and `!`. They never coerce to `bool`; the
//! only way to get a truth value is [`Condition::evaluate`].

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::rc::Rc;

type Predicate<S> = Rc<dyn Fn(&S) -> bool>;

enum Node<S> {
    Match(Predicate<S>),
    And(Vec<Condition<S>>),
    Or(Vec<Condition<S>>),
    Not(Box<Condition<S>>),
}

/// A named predicate over a state, or a combination of them.
pub struct Condition<S> {
    node: Rc<Node<S>>,
    name: Option<Rc<str>>,
}

impl<S> Clone for Condition<S> {
    fn clone(&self) -> Self {
        Condition {
            node: self.node.clone(),
            name: self.name.clone(),
        }
    }
}

impl<S: 'static> Condition<S> {
    /// A leaf condition. `name` is how it renders.
    pub fn new<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&S) -> bool + 'static,
    {
        Condition {
            node: Rc::new(Node::Match(Rc::new(predicate))),
            name: Some(Rc::from(name.into())),
        }
    }

    /// Holds for every state.
    pub fn always() -> Self {
        Condition::new("always", |_| true)
    }

    /// Render composite conditions as `name` instead of their structure.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(Rc::from(name.into()));
        self
    }

    pub fn evaluate(&self, state: &S) -> bool {
        match &*self.node {
            Node::Match(predicate) => predicate(state),
            Node::And(children) => children.iter().all(|c| c.evaluate(state)),
            Node::Or(children) => children.iter().any(|c| c.evaluate(state)),
            Node::Not(child) => !child.evaluate(state),
        }
    }

    /// Children of an and/or node, empty for leaves and negations.
    pub fn children(&self) -> &[Condition<S>] {
        match &*self.node {
            Node::And(children) | Node::Or(children) => children,
            _ => &[],
        }
    }

    fn is_and(&self) -> bool {
        matches!(&*self.node, Node::And(_))
    }

    fn is_or(&self) -> bool {
        matches!(&*self.node, Node::Or(_))
    }

    /// Unnamed nodes of the same operator are spliced in, so `(a & b) & c`
    /// stores three children.
    fn combine(self, other: Self, and: bool) -> Self {
        let mut children = Vec::new();
        for cond in [self, other] {
            let same_op = if and { cond.is_and() } else { cond.is_or() };
            if same_op && cond.name.is_none() {
                children.extend(cond.children().iter().cloned());
            } else {
                children.push(cond);
            }
        }
        let node = if and {
            Node::And(children)
        } else {
            Node::Or(children)
        };
        Condition {
            node: Rc::new(node),
            name: None,
        }
    }
}

impl<S: 'static> BitAnd for Condition<S> {
    type Output = Condition<S>;

    fn bitand(self, rhs: Self) -> Self::Output {
        self.combine(rhs, true)
    }
}

impl<S: 'static> BitOr for Condition<S> {
    type Output = Condition<S>;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.combine(rhs, false)
    }
}

impl<S: 'static> Not for Condition<S> {
    type Output = Condition<S>;

    fn not(self) -> Self::Output {
        Condition {
            node: Rc::new(Node::Not(Box::new(self))),
            name: None,
        }
    }
}

impl<S> fmt::Display for Condition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            return f.write_str(name);
        }
        let (connector, children) = match &*self.node {
            Node::Match(_) => return f.write_str("<predicate>"),
            Node::Not(child) => return write!(f, "!{}", child),
            Node::And(children) => (" && ", children),
            Node::Or(children) => (" || ", children),
        };
        f.write_str("(")?;
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                f.write_str(connector)?;
            }
            write!(f, "{}", child)?;
        }
        f.write_str(")")
    }
}

impl<S> fmt::Debug for Condition<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Condition({})", self)
    }
}
