//! The forker algebra: lazy enumeration of (context, value) pairs.

use crate::context::{Context, RecordKey};
use crate::error::{ForkcaseError, Result};
use std::fmt;
use std::ops::Range;
use std::rc::Rc;

pub mod branch;
pub mod chain;
pub mod container;
pub mod generation;

/// A value together with the context that produced it.
#[derive(Debug, Clone)]
pub struct ForkItem<T> {
    pub context: Context,
    pub value: T,
}

impl<T> ForkItem<T> {
    pub fn new(context: Context, value: T) -> Self {
        ForkItem { context, value }
    }

    /// Replace the value, keeping the context.
    pub fn with_value<U>(self, value: U) -> ForkItem<U> {
        ForkItem {
            context: self.context,
            value,
        }
    }

    pub fn map<U, F>(self, f: F) -> ForkItem<U>
    where
        F: FnOnce(T) -> U,
    {
        ForkItem {
            context: self.context,
            value: f(self.value),
        }
    }
}

impl<T: PartialEq> PartialEq for ForkItem<T> {
    fn eq(&self, other: &Self) -> bool {
        self.context == other.context && self.value == other.value
    }
}

/// A single-pass sequence of fork items.
///
/// Consuming a result moves it, so it can only be read once; forking the
/// producing [`Forker`] again yields a fresh one.
pub struct ForkResult<T> {
    items: Box<dyn Iterator<Item = Result<ForkItem<T>>>>,
}

impl<T: 'static> ForkResult<T> {
    pub fn new<I>(items: I) -> Self
    where
        I: Iterator<Item = Result<ForkItem<T>>> + 'static,
    {
        ForkResult {
            items: Box::new(items),
        }
    }

    pub fn empty() -> Self {
        ForkResult::new(std::iter::empty())
    }

    pub fn single(context: Context, value: T) -> Self {
        ForkResult::new(std::iter::once(Ok(ForkItem::new(context, value))))
    }

    pub fn error(error: ForkcaseError) -> Self {
        ForkResult::new(std::iter::once(Err(error)))
    }

    /// Pair every value with the same context.
    pub fn from_values<I>(context: Context, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        ForkResult::new(
            values
                .into_iter()
                .map(move |value| Ok(ForkItem::new(context.clone(), value))),
        )
    }

    pub fn map<U, F>(self, mut f: F) -> ForkResult<U>
    where
        U: 'static,
        F: FnMut(ForkItem<T>) -> ForkItem<U> + 'static,
    {
        ForkResult::new(self.items.map(move |item| item.map(&mut f)))
    }

    pub fn map_value<U, F>(self, mut f: F) -> ForkResult<U>
    where
        U: 'static,
        F: FnMut(T) -> U + 'static,
    {
        self.map(move |item| item.map(&mut f))
    }

    pub fn filter<F>(self, mut f: F) -> ForkResult<T>
    where
        F: FnMut(&ForkItem<T>) -> bool + 'static,
    {
        ForkResult::new(self.items.filter(move |item| match item {
            Ok(item) => f(item),
            Err(_) => true,
        }))
    }

    pub fn filter_value<F>(self, mut f: F) -> ForkResult<T>
    where
        F: FnMut(&T) -> bool + 'static,
    {
        self.filter(move |item| f(&item.value))
    }

    /// Expand every item into a sub-result.
    pub fn flat_map<U, F>(self, mut f: F) -> ForkResult<U>
    where
        U: 'static,
        F: FnMut(ForkItem<T>) -> ForkResult<U> + 'static,
    {
        ForkResult::new(self.items.flat_map(move |item| match item {
            Ok(item) => f(item),
            Err(error) => ForkResult::error(error),
        }))
    }

    /// Items of `self` followed by items of `other`.
    pub fn chain(self, other: ForkResult<T>) -> ForkResult<T> {
        ForkResult::new(self.items.chain(other.items))
    }

    /// Drop the contexts.
    pub fn values(self) -> impl Iterator<Item = Result<T>> {
        self.items.map(|item| item.map(|item| item.value))
    }

    pub fn collect_values(self) -> Result<Vec<T>> {
        self.values().collect()
    }

    pub fn collect_items(self) -> Result<Vec<ForkItem<T>>> {
        self.items.collect()
    }
}

impl<T> Iterator for ForkResult<T> {
    type Item = Result<ForkItem<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.items.next()
    }
}

/// Anything that can enumerate items for a context.
pub trait Fork<T> {
    fn do_fork(&self, context: &Context) -> ForkResult<T>;

    fn describe(&self) -> String {
        "forker".to_string()
    }
}

type ResultFn<T> = Rc<dyn Fn(ForkResult<T>) -> ForkResult<T>>;

/// A composable, restartable enumerator of values of type `T`.
///
/// Forkers are explicit first-class values. Each call to [`Forker::do_fork`]
/// produces a fresh lazy [`ForkResult`]; nothing is enumerated until the
/// result is consumed.
pub struct Forker<T> {
    inner: Rc<dyn Fork<T>>,
    pipeline: Vec<ResultFn<T>>,
    name: Option<Rc<str>>,
}

impl<T> Clone for Forker<T> {
    fn clone(&self) -> Self {
        Forker {
            inner: self.inner.clone(),
            pipeline: self.pipeline.clone(),
            name: self.name.clone(),
        }
    }
}

struct FnFork<F>(F);

impl<T, F> Fork<T> for FnFork<F>
where
    F: Fn(&Context) -> ForkResult<T>,
{
    fn do_fork(&self, context: &Context) -> ForkResult<T> {
        (self.0)(context)
    }
}

struct ValuesFork<T> {
    values: Rc<[T]>,
}

impl<T: fmt::Debug + Clone + 'static> Fork<T> for ValuesFork<T> {
    fn do_fork(&self, context: &Context) -> ForkResult<T> {
        let values = self.values.clone();
        let context = context.clone();
        ForkResult::new(
            (0..values.len()).map(move |i| Ok(ForkItem::new(context.clone(), values[i].clone()))),
        )
    }

    fn describe(&self) -> String {
        format!("{:?}", self.values)
    }
}

struct RangeFork<T> {
    range: Range<T>,
}

impl<T> Fork<T> for RangeFork<T>
where
    T: fmt::Debug + 'static,
    Range<T>: Iterator<Item = T> + Clone,
{
    fn do_fork(&self, context: &Context) -> ForkResult<T> {
        ForkResult::from_values(context.clone(), self.range.clone())
    }

    fn describe(&self) -> String {
        format!("{:?}", self.range)
    }
}

struct LookupFork {
    key: RecordKey,
}

impl<T: Clone + 'static> Fork<T> for LookupFork {
    fn do_fork(&self, context: &Context) -> ForkResult<T> {
        match context.lookup::<T>(&self.key) {
            Ok(value) => ForkResult::single(context.clone(), value),
            Err(error) => ForkResult::error(error),
        }
    }

    fn describe(&self) -> String {
        format!("${}", self.key)
    }
}

struct DefaultFork<T> {
    base: Forker<T>,
    default: T,
}

struct DefaultIter<T> {
    inner: ForkResult<T>,
    fallback: Option<ForkItem<T>>,
}

impl<T> Iterator for DefaultIter<T> {
    type Item = Result<ForkItem<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next() {
            Some(item) => {
                self.fallback = None;
                Some(item)
            }
            None => self.fallback.take().map(Ok),
        }
    }
}

impl<T: Clone + 'static> Fork<T> for DefaultFork<T> {
    fn do_fork(&self, context: &Context) -> ForkResult<T> {
        ForkResult::new(DefaultIter {
            inner: self.base.do_fork(context),
            fallback: Some(ForkItem::new(context.clone(), self.default.clone())),
        })
    }

    fn describe(&self) -> String {
        format!("default({})", self.base)
    }
}

impl<T: 'static> Forker<T> {
    pub fn new<F>(fork: F) -> Self
    where
        F: Fork<T> + 'static,
    {
        Forker {
            inner: Rc::new(fork),
            pipeline: Vec::new(),
            name: None,
        }
    }

    /// Build a forker from a plain function of the context.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Context) -> ForkResult<T> + 'static,
    {
        Forker::new(FnFork(f))
    }

    /// A forker producing no items.
    pub fn empty() -> Self {
        Forker::from_fn(|_| ForkResult::empty()).named("empty")
    }

    /// A forker whose only item is `error`.
    pub fn failing(error: ForkcaseError) -> Self {
        Forker::from_fn(move |_| ForkResult::error(error.clone()))
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(Rc::from(name.into()));
        self
    }

    pub fn do_fork(&self, context: &Context) -> ForkResult<T> {
        let mut result = self.inner.do_fork(context);
        for func in &self.pipeline {
            result = func(result);
        }
        result
    }

    /// Fork from an empty context.
    pub fn fork(&self) -> ForkResult<T> {
        self.do_fork(&Context::new())
    }

    /// Every value produced from an empty context.
    pub fn collect_values(&self) -> Result<Vec<T>> {
        self.fork().collect_values()
    }

    /// Append a result-to-result step. Successive calls extend one pipeline
    /// instead of wrapping the forker again.
    pub fn transform_result<F>(&self, f: F) -> Forker<T>
    where
        F: Fn(ForkResult<T>) -> ForkResult<T> + 'static,
    {
        let mut forker = self.clone();
        forker.pipeline.push(Rc::new(f));
        forker
    }

    pub fn filter<F>(&self, f: F) -> Forker<T>
    where
        F: Fn(&ForkItem<T>) -> bool + 'static,
    {
        let f = Rc::new(f);
        self.transform_result(move |result| {
            let f = f.clone();
            result.filter(move |item| f(item))
        })
    }

    pub fn filter_value<F>(&self, f: F) -> Forker<T>
    where
        F: Fn(&T) -> bool + 'static,
    {
        let f = Rc::new(f);
        self.transform_result(move |result| {
            let f = f.clone();
            result.filter_value(move |value| f(value))
        })
    }

    /// Map whole items, so the function may also replace the context.
    ///
    /// The pipeline of [`Forker::transform_result`] keeps the item type, so a
    /// map starts a new forker over this one instead of extending it.
    pub fn map<U, F>(&self, f: F) -> Forker<U>
    where
        U: 'static,
        F: Fn(ForkItem<T>) -> ForkItem<U> + 'static,
    {
        let base = self.clone();
        let f = Rc::new(f);
        Forker::from_fn(move |context| {
            let f = f.clone();
            base.do_fork(context).map(move |item| f(item))
        })
    }

    pub fn map_value<U, F>(&self, f: F) -> Forker<U>
    where
        U: 'static,
        F: Fn(T) -> U + 'static,
    {
        self.map(move |item| item.map(&f))
    }

    /// Map values and let `update` derive the item's new context from the
    /// mapped value.
    pub fn map_value_update<U, F, G>(&self, f: F, update: G) -> Forker<U>
    where
        U: 'static,
        F: Fn(T) -> U + 'static,
        G: Fn(&Context, &U) -> Context + 'static,
    {
        self.map(move |item| {
            let value = f(item.value);
            ForkItem::new(update(&item.context, &value), value)
        })
    }

    /// Expand each value into many, all sharing the item's context.
    pub fn flat_map_value<U, I, F>(&self, f: F) -> Forker<U>
    where
        U: 'static,
        I: IntoIterator<Item = U>,
        I::IntoIter: 'static,
        F: Fn(T) -> I + 'static,
    {
        let base = self.clone();
        let f = Rc::new(f);
        Forker::from_fn(move |context| {
            let f = f.clone();
            base.do_fork(context)
                .flat_map(move |item| ForkResult::from_values(item.context, f(item.value)))
        })
    }

    /// Fork the forker returned for each value, with that value's context.
    pub fn and_then<U, F>(&self, f: F) -> Forker<U>
    where
        U: 'static,
        F: Fn(T) -> Forker<U> + 'static,
    {
        let base = self.clone();
        let f = Rc::new(f);
        Forker::from_fn(move |context| {
            let f = f.clone();
            base.do_fork(context)
                .flat_map(move |item| f(item.value).do_fork(&item.context))
        })
    }

    /// Items of `self` followed by items of `other`, each forked from the
    /// same incoming context.
    pub fn concat(&self, other: &Forker<T>) -> Forker<T> {
        Forker::concat_all(vec![self.clone(), other.clone()])
    }

    pub fn concat_all(forkers: Vec<Forker<T>>) -> Forker<T> {
        let forkers: Rc<[Forker<T>]> = forkers.into();
        Forker::from_fn(move |context| {
            let forkers = forkers.clone();
            let context = context.clone();
            ForkResult::new((0..forkers.len()).flat_map(move |i| forkers[i].do_fork(&context)))
        })
    }

    /// `None` when `self` produces nothing, each value wrapped otherwise.
    pub fn optional(&self) -> Forker<Option<T>>
    where
        T: Clone,
    {
        self.map_value(Some).or_default(None)
    }
}

impl<T: Clone + 'static> Forker<T> {
    /// Literal-set enumerator.
    pub fn of<I>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: fmt::Debug,
    {
        Forker::new(ValuesFork {
            values: values.into_iter().collect::<Vec<_>>().into(),
        })
    }

    pub fn single(value: T) -> Self
    where
        T: fmt::Debug,
    {
        Forker::of([value])
    }

    /// Half-open integer range enumerator.
    pub fn range(range: Range<T>) -> Self
    where
        T: fmt::Debug,
        Range<T>: Iterator<Item = T> + Clone,
    {
        Forker::new(RangeFork { range })
    }

    /// Read a value some recorded forker wrote into the context.
    pub fn lookup(key: RecordKey) -> Self {
        Forker::new(LookupFork { key })
    }

    /// Produce exactly one `default` item when `self` produces none.
    pub fn or_default(&self, default: T) -> Forker<T> {
        Forker::new(DefaultFork {
            base: self.clone(),
            default,
        })
    }

    /// Write every produced value into the item context under a fresh key.
    pub fn record(&self) -> Recorded<T> {
        self.record_as(RecordKey::generate("rec_"))
    }

    /// Write every produced value into the item context under `key`.
    pub fn record_as(&self, key: RecordKey) -> Recorded<T> {
        let record_key = key.clone();
        let forker = self.map(move |item| {
            let context = item.context.set(record_key.clone(), item.value.clone());
            ForkItem::new(context, item.value)
        });
        Recorded { key, forker }
    }
}

impl Forker<bool> {
    pub fn bool() -> Self {
        Forker::of([false, true])
    }
}

impl<T: 'static> Fork<T> for Forker<T> {
    fn do_fork(&self, context: &Context) -> ForkResult<T> {
        Forker::do_fork(self, context)
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl<T> fmt::Display for Forker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => f.write_str(name),
            None if self.pipeline.is_empty() => f.write_str(&self.inner.describe()),
            None => write!(f, "transform({})", self.inner.describe()),
        }
    }
}

/// A recording forker plus the key it records under.
pub struct Recorded<T> {
    pub key: RecordKey,
    pub forker: Forker<T>,
}

impl<T: Clone + 'static> Recorded<T> {
    /// A lookup-only forker that reads the recorded value back without
    /// enumerating the underlying forker again.
    pub fn lookup(&self) -> Forker<T> {
        Forker::lookup(self.key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_values() {
        let forker = Forker::of(["a", "b", "c"]);
        assert_eq!(forker.collect_values(), Ok(vec!["a", "b", "c"]));
        // restartable
        assert_eq!(forker.collect_values(), Ok(vec!["a", "b", "c"]));
    }

    #[test]
    fn test_items_keep_incoming_context() {
        let ctx = Context::new().set("k", 1i32);
        let items = Forker::of([1, 2]).do_fork(&ctx).collect_items().unwrap();
        assert_eq!(items[0], ForkItem::new(ctx.clone(), 1));
        assert_eq!(items[1], ForkItem::new(ctx, 2));
    }

    #[test]
    fn test_range_is_half_open() {
        assert_eq!(Forker::range(0..3).collect_values(), Ok(vec![0, 1, 2]));
        assert_eq!(Forker::range(5i64..5).collect_values(), Ok(vec![]));
    }

    #[test]
    fn test_transform_pipeline() {
        let forker = Forker::of([1, 2, 3]).transform_result(|r| r.map_value(|v| v + 1));
        assert_eq!(forker.collect_values(), Ok(vec![2, 3, 4]));

        let forker = forker.filter_value(|v| *v >= 3);
        assert_eq!(forker.pipeline.len(), 2);
        assert_eq!(forker.collect_values(), Ok(vec![3, 4]));
    }

    #[test]
    fn test_map_may_replace_context() {
        let other = Context::new().set("other", true);
        let replaced = other.clone();
        let forker = Forker::of([1, 2, 3]).map(move |item| {
            if item.value < 2 {
                ForkItem::new(replaced.clone(), item.value + 1)
            } else {
                item.map(|v| v + 2)
            }
        });
        let ctx = Context::new();
        let items = forker.do_fork(&ctx).collect_items().unwrap();
        assert_eq!(items[0].context, other);
        assert_eq!(items[1].context, ctx);
        assert_eq!(
            items.into_iter().map(|i| i.value).collect::<Vec<_>>(),
            vec![2, 4, 5]
        );
    }

    #[test]
    fn test_filter_items() {
        let forker = Forker::of([1, 2, 3]).filter(|item| item.value > 1);
        assert_eq!(forker.collect_values(), Ok(vec![2, 3]));
    }

    #[test]
    fn test_flat_map_value() {
        let forker = Forker::of([1, 2]).flat_map_value(|v| vec![v * 10, v * 10 + 1]);
        assert_eq!(forker.collect_values(), Ok(vec![10, 11, 20, 21]));
    }

    #[test]
    fn test_and_then_threads_context() {
        let first = Forker::of([1, 2]).record_as(RecordKey::new("first"));
        let forker = first
            .forker
            .and_then(|v| Forker::range(0..v).map_value(move |w| (v, w)));
        assert_eq!(
            forker.collect_values(),
            Ok(vec![(1, 0), (2, 0), (2, 1)])
        );
    }

    #[test]
    fn test_concat() {
        let forker = Forker::of(["a", "b"]).concat(&Forker::of(["c"]));
        assert_eq!(forker.collect_values(), Ok(vec!["a", "b", "c"]));
    }

    #[test]
    fn test_default_substitution() {
        let empty: Forker<i32> = Forker::empty();
        assert_eq!(empty.or_default(7).collect_values(), Ok(vec![7]));
        assert_eq!(
            Forker::of([1, 2]).or_default(7).collect_values(),
            Ok(vec![1, 2])
        );
        assert_eq!(empty.optional().collect_values(), Ok(vec![None]));
    }

    #[test]
    fn test_record_and_lookup() {
        let recorded = Forker::of([3, 4]).record();
        let lookup = recorded.lookup();
        for item in recorded.forker.fork() {
            let item = item.unwrap();
            let read = lookup.do_fork(&item.context).collect_values().unwrap();
            assert_eq!(read, vec![item.value]);
        }
    }

    #[test]
    fn test_lookup_missing_is_error() {
        let forker: Forker<i32> = Forker::lookup(RecordKey::new("absent"));
        assert!(matches!(
            forker.collect_values(),
            Err(ForkcaseError::MissingBinding { .. })
        ));
    }

    #[test]
    fn test_map_value_update() {
        let key = RecordKey::new("doubled");
        let read_key = key.clone();
        let forker = Forker::of([1, 2]).map_value_update(
            |v| v * 2,
            move |ctx, v| ctx.set(key.clone(), *v),
        );
        let items = forker.fork().collect_items().unwrap();
        assert_eq!(items[1].context.lookup::<i32>(&read_key), Ok(4));
    }

    #[test]
    fn test_display() {
        assert_eq!(Forker::of([1, 2]).to_string(), "[1, 2]");
        assert_eq!(Forker::range(0..2).named("points").to_string(), "points");
    }
}
