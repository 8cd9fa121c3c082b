// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Caller-attached values keyed by static keys.

use core::any::Any;
use core::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Identity for a user data slot.
///
/// Keys are compared by address, so each key must be a `static`:
///
/// ```
/// use understory_draw::{UserData, UserDataKey};
///
/// static LABEL: UserDataKey = UserDataKey::new("label");
///
/// let data = UserData::default();
/// data.add(&LABEL, String::from("hello"));
/// assert_eq!(data.get::<String>(&LABEL).as_deref().map(String::as_str), Some("hello"));
/// ```
#[derive(Debug)]
pub struct UserDataKey {
    name: &'static str,
}

impl UserDataKey {
    /// Create a key. The name is only used for debugging.
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    /// Debug name.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

type Entry = (&'static UserDataKey, Arc<dyn Any + Send + Sync>);

/// Set of values attached to an owner.
///
/// A value is dropped when it is replaced, removed or when the owner is
/// dropped, whichever comes first. Handles returned by [`get`](Self::get)
/// keep their value alive on their own.
#[derive(Default)]
pub struct UserData {
    entries: Mutex<Vec<Entry>>,
}

impl fmt::Debug for UserData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_list()
            .entries(entries.iter().map(|(k, _)| k.name))
            .finish()
    }
}

impl UserData {
    /// Attach `value` under `key`, replacing any previous value.
    pub fn add<T: Any + Send + Sync>(&self, key: &'static UserDataKey, value: T) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let value: Arc<dyn Any + Send + Sync> = Arc::new(value);
        if let Some(slot) = entries.iter_mut().find(|(k, _)| core::ptr::eq(*k, key)) {
            slot.1 = value;
        } else {
            entries.push((key, value));
        }
    }

    /// Value under `key`, if present and of type `T`.
    pub fn get<T: Any + Send + Sync>(&self, key: &'static UserDataKey) -> Option<Arc<T>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let (_, value) = entries.iter().find(|(k, _)| core::ptr::eq(*k, key))?;
        Arc::clone(value).downcast::<T>().ok()
    }

    /// Drop the value under `key`. Returns `true` if one was present.
    pub fn remove(&self, key: &'static UserDataKey) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(k, _)| !core::ptr::eq(*k, key));
        entries.len() != before
    }

    /// Number of attached values.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing is attached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static A: UserDataKey = UserDataKey::new("a");
    static B: UserDataKey = UserDataKey::new("b");

    struct Counted(Arc<AtomicUsize>);

    impl Drop for Counted {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn keys_are_distinct_by_address() {
        let data = UserData::default();
        data.add(&A, 1_u32);
        data.add(&B, 2_u32);
        assert_eq!(data.get::<u32>(&A).as_deref(), Some(&1));
        assert_eq!(data.get::<u32>(&B).as_deref(), Some(&2));
        assert!(data.get::<String>(&A).is_none());
        data.add(&A, 3_u32);
        assert_eq!(data.len(), 2);
        assert_eq!(data.get::<u32>(&A).as_deref(), Some(&3));
    }

    #[test]
    fn values_drop_with_owner_and_on_replace() {
        let drops = Arc::new(AtomicUsize::new(0));
        let data = UserData::default();
        data.add(&A, Counted(drops.clone()));
        data.add(&A, Counted(drops.clone()));
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        data.add(&B, Counted(drops.clone()));
        assert!(data.remove(&B));
        assert_eq!(drops.load(Ordering::SeqCst), 2);
        drop(data);
        assert_eq!(drops.load(Ordering::SeqCst), 3);
    }
}
