// Copyright 2025 The scenario_replay Authors
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use alloc::sync::Arc;
use core::{
    any::{Any, TypeId},
    fmt::{self, Debug, Display},
    hash::{Hash, Hasher},
};

use indexmap::IndexSet;

trait ArgValue: Any + Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn eq_dyn(&self, other: &dyn ArgValue) -> bool;
    fn hash_dyn(&self, state: &mut dyn Hasher);
}

impl<T: Any + Debug + Eq + Hash + Send + Sync> ArgValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_dyn(&self, other: &dyn ArgValue) -> bool {
        other.as_any().downcast_ref::<T>() == Some(self)
    }

    fn hash_dyn(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<T>().hash(&mut state);
        self.hash(&mut state);
    }
}

/// Type-erased theory argument.
///
/// Two arguments are equal when they have the same type and equal values.
/// String arguments are displayed as they are, anything else using the `Debug`
/// representation of its value.
#[derive(Clone)]
pub struct Arg {
    value: Arc<dyn ArgValue>,
    display: Arc<str>,
}

impl Arg {
    /// Wrap a theory argument value.
    pub fn new<T: Debug + Eq + Hash + Send + Sync + 'static>(value: T) -> Self {
        let display = render(&value);
        Self {
            value: Arc::new(value),
            display,
        }
    }

    /// Borrow the wrapped value, if it has type `T`.
    #[must_use]
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.as_any().downcast_ref()
    }
}

fn render<T: Debug + 'static>(value: &T) -> Arc<str> {
    let any: &dyn Any = value;
    if let Some(s) = any.downcast_ref::<&str>() {
        return (*s).into();
    }
    if let Some(s) = any.downcast_ref::<String>() {
        return s.as_str().into();
    }
    format!("{value:?}").into()
}

impl PartialEq for Arg {
    fn eq(&self, other: &Self) -> bool {
        self.value.eq_dyn(&*other.value)
    }
}

impl Eq for Arg {}

impl Hash for Arg {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash_dyn(state);
    }
}

impl Debug for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

/// Theory arguments already tested for one target, across all passes of its cycle.
///
/// The ledger only grows. Once it holds `limit` arguments, no more passes are
/// issued for the target.
#[derive(Debug)]
pub struct ArgumentLedger {
    limit: usize,
    tested: IndexSet<Arg>,
}

impl ArgumentLedger {
    pub(crate) fn new(limit: usize) -> Self {
        debug_assert!(limit > 0);
        Self {
            limit,
            tested: IndexSet::new(),
        }
    }

    /// Maximum number of arguments tested for the target.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of distinct arguments tested so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tested.len()
    }

    /// Whether no argument has been tested yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tested.is_empty()
    }

    /// Whether the limit has been reached.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.tested.len() >= self.limit
    }

    /// Whether `arg` has already been tested.
    #[must_use]
    pub fn contains(&self, arg: &Arg) -> bool {
        self.tested.contains(arg)
    }

    /// Tested arguments, in the order they were first tested.
    pub fn iter(&self) -> impl Iterator<Item = &Arg> {
        self.tested.iter()
    }

    // Returns false when the argument was already present.
    pub(crate) fn insert(&mut self, arg: Arg) -> bool {
        self.tested.insert(arg)
    }
}
