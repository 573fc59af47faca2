//! Ordered products (chains) and recursive flattening (reaction).

use super::{ForkItem, ForkResult, Forker};
use crate::context::Context;
use std::fmt;
use std::rc::Rc;

/// A value that is either final or needs more forking.
pub enum React<T> {
    Done(T),
    Fork(Forker<React<T>>),
}

impl<T: 'static> React<T> {
    /// Defer to another plain forker.
    pub fn defer(forker: &Forker<T>) -> Self {
        React::Fork(forker.map_value(React::Done))
    }
}

impl<T: Clone> Clone for React<T> {
    fn clone(&self) -> Self {
        match self {
            React::Done(value) => React::Done(value.clone()),
            React::Fork(forker) => React::Fork(forker.clone()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for React<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            React::Done(value) => f.debug_tuple("Done").field(value).finish(),
            React::Fork(forker) => write!(f, "Fork({})", forker),
        }
    }
}

impl<T: 'static> Forker<React<T>> {
    /// Re-fork every forker-valued item with its own context until plain
    /// values are reached. Nesting depth does not show in the output.
    pub fn react(&self) -> Forker<T> {
        reaction(self.clone())
    }
}

/// See [`Forker::react`].
pub fn reaction<T: 'static>(seed: Forker<React<T>>) -> Forker<T> {
    let name = format!("reaction({})", seed);
    Forker::from_fn(move |context| react_result(seed.do_fork(context))).named(name)
}

fn react_result<T: 'static>(result: ForkResult<React<T>>) -> ForkResult<T> {
    result.flat_map(|item| match item.value {
        React::Done(value) => ForkResult::single(item.context, value),
        React::Fork(next) => react_result(next.do_fork(&item.context)),
    })
}

/// One stage of a [`Chain`].
pub enum Link<V, A> {
    /// A stage fixed up front.
    Fixed(Forker<V>),
    /// A stage computed from the combination accumulated so far.
    Dependent(Rc<dyn Fn(&A) -> Forker<V>>),
}

impl<V, A> Clone for Link<V, A> {
    fn clone(&self) -> Self {
        match self {
            Link::Fixed(forker) => Link::Fixed(forker.clone()),
            Link::Dependent(f) => Link::Dependent(f.clone()),
        }
    }
}

impl<V: 'static, A> Link<V, A> {
    pub fn dependent<F>(f: F) -> Self
    where
        F: Fn(&A) -> Forker<V> + 'static,
    {
        Link::Dependent(Rc::new(f))
    }

    fn resolve(&self, acc: &A) -> Forker<V> {
        match self {
            Link::Fixed(forker) => forker.clone(),
            Link::Dependent(f) => f(acc),
        }
    }
}

impl<V, A> From<Forker<V>> for Link<V, A> {
    fn from(forker: Forker<V>) -> Self {
        Link::Fixed(forker)
    }
}

/// The n-ary ordered product.
///
/// Forks the first link, and for every produced value forks the rest with the
/// accumulator folded so far and the item's context. The first link varies
/// slowest.
pub struct Chain<V, A> {
    links: Rc<[Link<V, A>]>,
    init: A,
    reduce: Rc<dyn Fn(&A, V) -> A>,
}

impl<V: Clone + 'static> Chain<V, Vec<V>> {
    /// Accumulate values into a vector in link order.
    pub fn new<I>(links: I) -> Self
    where
        I: IntoIterator<Item = Link<V, Vec<V>>>,
    {
        Chain::with_reducer(links, Vec::new(), |acc: &Vec<V>, value| {
            let mut next = acc.clone();
            next.push(value);
            next
        })
    }

    pub fn of(forkers: Vec<Forker<V>>) -> Self {
        Chain::new(forkers.into_iter().map(Link::Fixed))
    }
}

impl<V: 'static, A: Clone + 'static> Chain<V, A> {
    pub fn with_reducer<I, F>(links: I, init: A, reduce: F) -> Self
    where
        I: IntoIterator<Item = Link<V, A>>,
        F: Fn(&A, V) -> A + 'static,
    {
        Chain {
            links: links.into_iter().collect::<Vec<_>>().into(),
            init,
            reduce: Rc::new(reduce),
        }
    }

    /// With no links the product is a single item holding the initial value.
    pub fn build(self) -> Forker<A> {
        let Chain {
            links,
            init,
            reduce,
        } = self;
        Forker::from_fn(move |context| {
            fold_from(links.clone(), reduce.clone(), 0, init.clone(), context.clone())
        })
        .named("chain")
    }
}

fn fold_from<V: 'static, A: Clone + 'static>(
    links: Rc<[Link<V, A>]>,
    reduce: Rc<dyn Fn(&A, V) -> A>,
    index: usize,
    acc: A,
    context: Context,
) -> ForkResult<A> {
    if index == links.len() {
        return ForkResult::single(context, acc);
    }
    let forker = links[index].resolve(&acc);
    forker.do_fork(&context).flat_map(move |item: ForkItem<V>| {
        let next = reduce(&acc, item.value);
        fold_from(links.clone(), reduce.clone(), index + 1, next, item.context)
    })
}

/// One stage of a budgeted product: given the remaining budget, the choices
/// and what each costs.
pub type BudgetStage<V> = Rc<dyn Fn(u32) -> Forker<(V, u32)>>;

/// A product in which every stage spends from a shared budget.
///
/// Choices costing more than what is left are dropped, so no combination ever
/// exceeds `total`.
pub fn budgeted<V: Clone + 'static>(total: u32, stages: Vec<BudgetStage<V>>) -> Forker<Vec<V>> {
    let links = stages.into_iter().map(|stage| {
        Link::dependent(move |acc: &(Vec<V>, u32)| {
            let remaining = acc.1;
            stage(remaining).filter_value(move |(_, cost)| *cost <= remaining)
        })
    });
    Chain::with_reducer(links, (Vec::new(), total), |acc: &(Vec<V>, u32), (value, cost)| {
        let mut values = acc.0.clone();
        values.push(value);
        (values, acc.1 - cost)
    })
    .build()
    .map_value(|(values, _)| values)
}
