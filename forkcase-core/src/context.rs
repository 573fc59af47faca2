//! Immutable variable bindings threaded through every enumeration.

use crate::error::{ForkcaseError, Result};
use std::any::{type_name, Any};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A type-erased value stored in a [`Context`] or carried by a case slot.
pub type DynValue = Rc<dyn Any>;

static NEXT_RECORD_ID: AtomicU64 = AtomicU64::new(1);

/// Key under which a forked value is recorded in a [`Context`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey(String);

impl RecordKey {
    /// Use an explicit key.
    pub fn new(key: impl Into<String>) -> Self {
        RecordKey(key.into())
    }

    /// Allocate a process-wide unique key starting with `prefix`.
    pub fn generate(prefix: &str) -> Self {
        let id = NEXT_RECORD_ID.fetch_add(1, Ordering::Relaxed);
        RecordKey(format!("{prefix}{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordKey {
    fn from(key: &str) -> Self {
        RecordKey::new(key)
    }
}

struct Binding {
    key: RecordKey,
    value: DynValue,
    parent: Option<Rc<Binding>>,
}

/// Immutable key to value bindings.
///
/// `set` returns a new context sharing every older binding with its parent,
/// so holders of the parent never observe the change. Lookups walk the chain
/// newest first, which makes a later `set` of the same key shadow the older one.
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Rc<Binding>>,
}

impl Context {
    pub fn new() -> Self {
        Context { head: None }
    }

    /// Bind `key` to `value` in a new context.
    pub fn set<T: 'static>(&self, key: impl Into<RecordKey>, value: T) -> Context {
        self.set_dyn(key.into(), Rc::new(value))
    }

    /// Bind an already type-erased value.
    pub fn set_dyn(&self, key: RecordKey, value: DynValue) -> Context {
        Context {
            head: Some(Rc::new(Binding {
                key,
                value,
                parent: self.head.clone(),
            })),
        }
    }

    /// Type-erased lookup.
    pub fn get_dyn(&self, key: &RecordKey) -> Option<&DynValue> {
        let mut cursor = self.head.as_ref();
        while let Some(binding) = cursor {
            if &binding.key == key {
                return Some(&binding.value);
            }
            cursor = binding.parent.as_ref();
        }
        None
    }

    /// Typed lookup. Missing keys and values of another type both yield `None`.
    pub fn get<T: 'static>(&self, key: &RecordKey) -> Option<&T> {
        self.get_dyn(key)?.downcast_ref()
    }

    /// Typed lookup falling back to `default`.
    pub fn get_or<T: Clone + 'static>(&self, key: &RecordKey, default: T) -> T {
        self.get(key).cloned().unwrap_or(default)
    }

    /// Typed lookup that explains why it failed.
    pub fn lookup<T: Clone + 'static>(&self, key: &RecordKey) -> Result<T> {
        let value = self
            .get_dyn(key)
            .ok_or_else(|| ForkcaseError::MissingBinding {
                key: key.to_string(),
            })?;
        downcast(key, value)
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        self.get_dyn(key).is_some()
    }

    /// Number of bindings, shadowed ones included.
    pub fn len(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.head.as_ref();
        while let Some(binding) = cursor {
            count += 1;
            cursor = binding.parent.as_ref();
        }
        count
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Keys from newest to oldest.
    pub fn keys(&self) -> Vec<RecordKey> {
        let mut keys = Vec::new();
        let mut cursor = self.head.as_ref();
        while let Some(binding) = cursor {
            keys.push(binding.key.clone());
            cursor = binding.parent.as_ref();
        }
        keys
    }
}

/// Contexts are equal when they are the same binding chain.
impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        match (&self.head, &other.head) {
            (None, None) => true,
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("keys", &self.keys()).finish()
    }
}

/// Clone a `T` out of a type-erased value.
pub fn downcast<T: Clone + 'static>(key: &RecordKey, value: &DynValue) -> Result<T> {
    value
        .downcast_ref::<T>()
        .cloned()
        .ok_or_else(|| ForkcaseError::TypeMismatch {
            key: key.to_string(),
            expected: type_name::<T>(),
        })
}
