//! Insertion-ordered, name-keyed collection used for both modules and themes.

use std::collections::HashMap;

use crate::error::{LookupKind, RegistryError, Result};

/// Anything stored in a [`Repository`].
pub trait Named {
    /// Lookup kind reported when an item of this type is missing.
    const KIND: LookupKind;

    fn name(&self) -> &str;
}

/// Name → item mapping that keeps first-seen order.
///
/// Adding an item whose name is already present replaces it in place, so
/// registration order stays deterministic across re-adds.
#[derive(Debug, Clone)]
pub struct Repository<T> {
    items: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for Repository<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Named> Repository<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by name. Returns the replaced item, if any.
    pub fn add(&mut self, item: T) -> Option<T> {
        match self.index.get(item.name()) {
            Some(&pos) => Some(std::mem::replace(&mut self.items[pos], item)),
            None => {
                self.index.insert(item.name().to_string(), self.items.len());
                self.items.push(item);
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Result<&T> {
        self.index
            .get(name)
            .map(|&pos| &self.items[pos])
            .ok_or_else(|| RegistryError::not_found(T::KIND, name))
    }

    pub fn get_mut(&mut self, name: &str) -> Result<&mut T> {
        match self.index.get(name) {
            Some(&pos) => Ok(&mut self.items[pos]),
            None => Err(RegistryError::not_found(T::KIND, name)),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// `(name, item)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.items.iter().map(|item| (item.name(), item))
    }

    pub fn values(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn values_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    pub fn names(&self) -> Vec<&str> {
        self.items.iter().map(Named::name).collect()
    }

    /// Name-keyed results of `f`, in insertion order.
    pub fn map<R>(&self, mut f: impl FnMut(&T) -> R) -> Vec<(String, R)> {
        self.items
            .iter()
            .map(|item| (item.name().to_string(), f(item)))
            .collect()
    }
}

impl<T: Named + Clone> Repository<T> {
    /// New repository holding clones of the matching items, same order.
    pub fn filter(&self, mut predicate: impl FnMut(&T) -> bool) -> Self {
        self.items
            .iter()
            .filter(|item| predicate(item))
            .cloned()
            .collect()
    }
}

impl<T: Named> FromIterator<T> for Repository<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut repo = Repository::new();
        for item in iter {
            repo.add(item);
        }
        repo
    }
}

impl<T> IntoIterator for Repository<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
