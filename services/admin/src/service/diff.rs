//! Three-way sync of keyed child collections.
//!
//! Every child set in the admin model (menu actions, menu resources, role
//! grants, user role edges) is replaced the same way: keys only in the new
//! set are created, keys only in the old set are deleted, and keys in both
//! are updated from the new value.
use std::collections::HashSet;
use std::hash::Hash;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffPlan<T> {
    pub create: Vec<T>,
    /// Old values whose key is gone from the new set.
    pub delete: Vec<T>,
    /// New values whose key was already present.
    pub update: Vec<T>,
}

impl<T> DiffPlan<T> {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.delete.is_empty() && self.update.is_empty()
    }
}

pub fn diff_by_key<T, K, F>(old: &[T], new: &[T], key: F) -> DiffPlan<T>
where
    T: Clone,
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let old_keys: HashSet<K> = old.iter().map(&key).collect();
    let new_keys: HashSet<K> = new.iter().map(&key).collect();

    let mut plan = DiffPlan {
        create: Vec::new(),
        delete: Vec::new(),
        update: Vec::new(),
    };
    for item in new {
        if old_keys.contains(&key(item)) {
            plan.update.push(item.clone());
        } else {
            plan.create.push(item.clone());
        }
    }
    for item in old {
        if !new_keys.contains(&key(item)) {
            plan.delete.push(item.clone());
        }
    }
    plan
}

/// First key appearing twice in `items`, if any.
pub fn first_duplicate<T, K, F>(items: &[T], key: F) -> Option<K>
where
    K: Eq + Hash + Clone,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    items.iter().map(key).find(|k| !seen.insert(k.clone()))
}
