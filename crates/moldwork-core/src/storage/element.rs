//! # Element Storage
//!
//! Ordered, name-keyed, multi-valued container for graph children.
//!
//! - Insertion order is preserved and is the traversal order everywhere.
//! - The same name may appear several times; each occurrence carries a
//!   validity window so that version strata of one logical entry coexist.
//! - The storage knows nothing about what it stores.

use crate::types::{MoldError, Version, VersionWindow};
use std::collections::BTreeMap;

/// One stored entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Element<T> {
    name: String,
    window: VersionWindow,
    item: T,
}

impl<T> Element<T> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn window(&self) -> VersionWindow {
        self.window
    }

    #[must_use]
    pub fn item(&self) -> &T {
        &self.item
    }

    #[must_use]
    pub fn into_item(self) -> T {
        self.item
    }
}

/// Ordered storage of named, version-windowed entries.
#[derive(Debug, Clone)]
pub struct ElementStorage<T> {
    /// Entries in insertion order.
    entries: Vec<Element<T>>,
    /// Name -> positions in `entries`, ascending.
    index: BTreeMap<String, Vec<usize>>,
}

impl<T> Default for ElementStorage<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: BTreeMap::new(),
        }
    }
}

impl<T> ElementStorage<T> {
    /// Create a new empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Duplicate names are allowed.
    pub fn insert(
        &mut self,
        name: impl Into<String>,
        window: VersionWindow,
        item: T,
    ) -> Result<(), MoldError> {
        let name = name.into();
        self.entries
            .try_reserve(1)
            .map_err(|e| MoldError::NoMemory(format!("element storage: {}", e)))?;

        let position = self.entries.len();
        self.index.entry(name.clone()).or_default().push(position);
        self.entries.push(Element { name, window, item });
        Ok(())
    }

    /// Append an entry unless an entry of the same name has an overlapping window.
    pub fn insert_unique(
        &mut self,
        name: impl Into<String>,
        window: VersionWindow,
        item: T,
    ) -> Result<(), MoldError> {
        let name = name.into();
        if let Some(existing) = self
            .find_entries(&name)
            .find(|e| e.window.overlaps(&window))
        {
            return Err(MoldError::Exists(format!(
                "element '{}' already declared for {} (new entry covers {})",
                name, existing.window, window
            )));
        }
        self.insert(name, window, item)
    }

    fn find_entries<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Element<T>> + 'a {
        self.index
            .get(name)
            .into_iter()
            .flat_map(move |positions| positions.iter().filter_map(|&p| self.entries.get(p)))
    }

    /// All items stored under `name`, in insertion order.
    pub fn find_all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a T> + 'a {
        self.find_entries(name).map(|e| &e.item)
    }

    /// The item stored under `name` whose window contains `version`.
    ///
    /// When several windows contain the version, the entry introduced last wins.
    #[must_use]
    pub fn find_at(&self, name: &str, version: Version) -> Option<&T> {
        self.find_entries(name)
            .filter(|e| e.window.contains(version))
            .max_by_key(|e| e.window.introduced)
            .map(|e| &e.item)
    }

    /// Remove the first entry holding `item`, returning it.
    pub fn remove(&mut self, item: &T) -> Option<Element<T>>
    where
        T: PartialEq,
    {
        let position = self.entries.iter().position(|e| &e.item == item)?;
        let removed = self.entries.remove(position);
        self.rebuild_index();
        Some(removed)
    }

    /// Remove every entry, returning the items in insertion order.
    pub fn drain(&mut self) -> Vec<T> {
        self.index.clear();
        self.entries.drain(..).map(|e| e.item).collect()
    }

    /// Iterate all entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Element<T>> {
        self.entries.iter()
    }

    /// Distinct names in order of first appearance.
    pub fn names(&self) -> Vec<&str> {
        let mut firsts: Vec<(usize, &str)> = self
            .index
            .iter()
            .filter_map(|(name, positions)| positions.first().map(|&p| (p, name.as_str())))
            .collect();
        firsts.sort_unstable();
        firsts.into_iter().map(|(_, name)| name).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for (position, entry) in self.entries.iter().enumerate() {
            self.index
                .entry(entry.name.clone())
                .or_default()
                .push(position);
        }
    }
}

impl<T> FromIterator<(String, VersionWindow, T)> for ElementStorage<T> {
    fn from_iter<I: IntoIterator<Item = (String, VersionWindow, T)>>(iter: I) -> Self {
        let mut storage = Self::new();
        for (name, window, item) in iter {
            let position = storage.entries.len();
            storage.index.entry(name.clone()).or_default().push(position);
            storage.entries.push(Element { name, window, item });
        }
        storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(from: u32, to: Option<u32>) -> VersionWindow {
        VersionWindow::new(Version::new(from, 0, 0), to.map(|t| Version::new(t, 0, 0)))
    }

    #[test]
    fn find_all_preserves_insertion_order() {
        let mut storage = ElementStorage::new();
        storage.insert("port", window(3, None), 'c').expect("insert");
        storage.insert("host", window(1, None), 'x').expect("insert");
        storage.insert("port", window(1, Some(2)), 'a').expect("insert");
        storage.insert("port", window(2, Some(3)), 'b').expect("insert");

        let found: Vec<char> = storage.find_all("port").copied().collect();
        assert_eq!(found, vec!['c', 'a', 'b']);
    }

    #[test]
    fn find_at_uses_closed_open_windows() {
        let mut storage = ElementStorage::new();
        storage.insert("port", window(1, Some(2)), 1).expect("insert");
        storage.insert("port", window(2, None), 2).expect("insert");

        assert_eq!(storage.find_at("port", Version::new(1, 5, 0)), Some(&1));
        assert_eq!(storage.find_at("port", Version::new(2, 0, 0)), Some(&2));
        assert_eq!(storage.find_at("port", Version::new(0, 9, 0)), None);
    }

    #[test]
    fn find_at_prefers_latest_introduction() {
        let storage: ElementStorage<i32> = [
            ("mode".to_string(), window(1, None), 1),
            ("mode".to_string(), window(3, None), 3),
        ]
        .into_iter()
        .collect();

        assert_eq!(storage.find_at("mode", Version::new(4, 0, 0)), Some(&3));
        assert_eq!(storage.find_at("mode", Version::new(2, 0, 0)), Some(&1));
    }

    #[test]
    fn insert_unique_rejects_overlap() {
        let mut storage = ElementStorage::new();
        storage
            .insert_unique("port", window(1, Some(2)), 1)
            .expect("insert");
        storage
            .insert_unique("port", window(2, None), 2)
            .expect("adjacent window is fine");

        let err = storage
            .insert_unique("port", window(1, None), 3)
            .expect_err("overlap");
        assert!(matches!(err, MoldError::Exists(_)));
        assert_eq!(storage.len(), 2);
    }

    #[test]
    fn remove_keeps_lookups_consistent() {
        let mut storage = ElementStorage::new();
        storage.insert("a", VersionWindow::ALWAYS, 1).expect("insert");
        storage.insert("b", VersionWindow::ALWAYS, 2).expect("insert");
        storage.insert("a", VersionWindow::ALWAYS, 3).expect("insert");

        let removed = storage.remove(&1).expect("present");
        assert_eq!(removed.name(), "a");
        assert_eq!(storage.find_all("a").copied().collect::<Vec<_>>(), vec![3]);
        assert_eq!(storage.find_all("b").copied().collect::<Vec<_>>(), vec![2]);
        assert!(storage.remove(&42).is_none());
    }

    #[test]
    fn names_in_first_appearance_order() {
        let mut storage = ElementStorage::new();
        storage.insert("zeta", VersionWindow::ALWAYS, ()).expect("insert");
        storage.insert("alpha", VersionWindow::ALWAYS, ()).expect("insert");
        storage.insert("zeta", VersionWindow::ALWAYS, ()).expect("insert");

        assert_eq!(storage.names(), vec!["zeta", "alpha"]);
    }

    #[test]
    fn drain_empties_storage() {
        let mut storage = ElementStorage::new();
        storage.insert("a", VersionWindow::ALWAYS, 1).expect("insert");
        storage.insert("b", VersionWindow::ALWAYS, 2).expect("insert");

        assert_eq!(storage.drain(), vec![1, 2]);
        assert!(storage.is_empty());
        assert_eq!(storage.find_all("a").count(), 0);
    }
}
