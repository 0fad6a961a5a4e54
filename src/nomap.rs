/// Insertion-ordered map keyed by name. Attribute and variable collections
/// are small and are iterated far more often than they are looked up, so the
/// store is a plain vector scanned linearly; removal swaps with the last
/// entry instead of shifting.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct Nomap<T> {
    nodes: Vec<(String, T)>,
}

impl<T> Nomap<T> {
    /// Create an empty map.
    pub fn new() -> Self {
        Nomap { nodes: Vec::new() }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether an entry with this key exists.
    pub fn contains(&self, key: &str) -> bool {
        self.nodes.iter().any(|(k, _)| k == key)
    }

    /// Borrow the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&T> {
        self.nodes.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Mutably borrow the value stored under `key`.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        self.nodes
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Insert a value, appending it to the iteration order. Replacing an
    /// existing key keeps its position and returns the previous value.
    pub fn insert(&mut self, key: String, value: T) -> Option<T> {
        match self.nodes.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.nodes.push((key, value));
                None
            }
        }
    }

    /// Remove and return the value stored under `key`. The last entry takes
    /// the removed slot, so only iteration past the hole changes order.
    pub fn remove(&mut self, key: &str) -> Option<T> {
        let index = self.nodes.iter().position(|(k, _)| k == key)?;
        Some(self.nodes.swap_remove(index).1)
    }

    /// Iterate over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.nodes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterate over values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.nodes.iter().map(|(_, v)| v)
    }

    /// Iterate over values mutably in insertion order.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.nodes.iter_mut().map(|(_, v)| v)
    }

    /// Iterate over keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|(k, _)| k.as_str())
    }
}

impl<T> Default for Nomap<T> {
    fn default() -> Self {
        Nomap::new()
    }
}

// Two maps are equal when they hold the same entries, regardless of the
// order they were inserted in.
impl<T: PartialEq> PartialEq for Nomap<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key) == Some(value))
    }
}

impl<T> IntoIterator for Nomap<T> {
    type Item = (String, T);
    type IntoIter = std::vec::IntoIter<(String, T)>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

impl<T> std::ops::Index<&str> for Nomap<T> {
    type Output = T;

    fn index(&self, key: &str) -> &T {
        self.get(key).expect("key not found")
    }
}
