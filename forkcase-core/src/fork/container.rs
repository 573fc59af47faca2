//! Products shaped like containers: vectors, maps and tuples.

use super::chain::{Chain, Link};
use super::{ForkResult, Forker};
use crate::error::ForkcaseError;
use std::collections::BTreeMap;
use std::fmt;

/// The product of `forkers` as vectors, element `i` drawn from `forkers[i]`.
///
/// No forkers means one empty vector.
pub fn fork_vec<T: Clone + 'static>(forkers: Vec<Forker<T>>) -> Forker<Vec<T>> {
    Chain::of(forkers).build().named("vec")
}

/// The product of keyed forkers as maps. Keys vary in the order given, the
/// first key slowest.
pub fn fork_map<K, V, I>(entries: I) -> Forker<BTreeMap<K, V>>
where
    K: Ord + Clone + 'static,
    V: Clone + 'static,
    I: IntoIterator<Item = (K, Forker<V>)>,
{
    let links = entries
        .into_iter()
        .map(|(key, forker)| Link::Fixed(forker.map_value(move |value| (key.clone(), value))));
    Chain::with_reducer(
        links,
        BTreeMap::new(),
        |acc: &BTreeMap<K, V>, (key, value)| {
            let mut next = acc.clone();
            next.insert(key, value);
            next
        },
    )
    .build()
    .named("map")
}

/// Like [`fork_vec`] over optional slots.
///
/// Lenient mode leaves `None` slots out of the vector. Strict mode turns the
/// first `None` into an [`ForkcaseError::EmptySlot`] error item.
pub fn fork_vec_optional<T: Clone + 'static>(
    forkers: Vec<Forker<Option<T>>>,
    strict: bool,
) -> Forker<Vec<T>> {
    let product = Chain::of(forkers).build();
    Forker::from_fn(move |context| {
        product.do_fork(context).flat_map(move |item| {
            match item.value.iter().position(|slot| slot.is_none()) {
                Some(index) if strict => ForkResult::error(ForkcaseError::EmptySlot { index }),
                _ => {
                    let values: Vec<T> = item.value.iter().flatten().cloned().collect();
                    ForkResult::single(item.context, values)
                }
            }
        })
    })
    .named("vec?")
}

impl<T: Clone + 'static> Forker<T> {
    /// Ordered product of two forkers.
    pub fn zip<U: Clone + 'static>(&self, other: &Forker<U>) -> Forker<(T, U)> {
        let other = other.clone();
        self.and_then(move |left| {
            other.map_value(move |right| (left.clone(), right))
        })
    }
}

pub fn pair<A, B>(a: &Forker<A>, b: &Forker<B>) -> Forker<(A, B)>
where
    A: Clone + 'static,
    B: Clone + 'static,
{
    a.zip(b)
}

pub fn triple<A, B, C>(a: &Forker<A>, b: &Forker<B>, c: &Forker<C>) -> Forker<(A, B, C)>
where
    A: Clone + 'static,
    B: Clone + 'static,
    C: Clone + 'static,
{
    a.zip(b).zip(c).map_value(|((a, b), c)| (a, b, c))
}

/// Display helper for a forked map.
pub struct MapDisplay<'a, K, V>(pub &'a BTreeMap<K, V>);

impl<K: fmt::Display, V: fmt::Debug> fmt::Display for MapDisplay<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {:?}", key, value)?;
        }
        f.write_str("}")
    }
}
