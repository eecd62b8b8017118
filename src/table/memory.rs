use std::collections::btree_map::{Entry, Iter};
use std::collections::BTreeMap;
use std::iter::FromIterator;

use serde::{Deserialize, Serialize};

use crate::crdt::convergent::Convergent;
use crate::table::Table;
use crate::Result;

/// In-memory table. Merging two tables keeps the greatest timestamp of every element, which makes
/// the table itself a convergent data type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "E: Serialize, T: Serialize",
    deserialize = "E: Ord + Deserialize<'de>, T: Deserialize<'de>"
))]
pub struct MemoryTable<E, T>(BTreeMap<E, T>);

impl<E: Ord, T: Ord> MemoryTable<E, T> {
    pub fn new() -> Self {
        MemoryTable(BTreeMap::new())
    }

    pub fn get(&self, element: &E) -> Option<&T> {
        self.0.get(element)
    }

    pub fn contains_key(&self, element: &E) -> bool {
        self.0.contains_key(element)
    }

    /// Puts a timestamp of a given element, if it's more recent than the one already stored.
    /// Returns true if the table has been updated.
    pub fn insert_max(&mut self, element: E, timestamp: T) -> bool {
        match self.0.entry(element) {
            Entry::Vacant(e) => {
                e.insert(timestamp);
                true
            }
            Entry::Occupied(mut e) => {
                if *e.get() < timestamp {
                    e.insert(timestamp);
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn iter(&self) -> Iter<'_, E, T> { self.0.iter() }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl<E, T> Default for MemoryTable<E, T> {
    fn default() -> Self {
        MemoryTable(BTreeMap::new())
    }
}

impl<E: Ord + Clone, T: Ord + Clone> Convergent for MemoryTable<E, T> {
    fn merge(&mut self, other: &Self) -> bool {
        let mut changed = false;
        for (element, timestamp) in other.0.iter() {
            let newer = match self.0.get(element) {
                Some(current) => current < timestamp,
                None => true,
            };
            if newer {
                self.0.insert(element.clone(), timestamp.clone());
                changed = true;
            }
        }
        changed
    }
}

impl<E: Ord, T: Ord> FromIterator<(E, T)> for MemoryTable<E, T> {
    fn from_iter<I: IntoIterator<Item=(E, T)>>(iter: I) -> Self {
        let mut table = MemoryTable::new();
        for (element, timestamp) in iter {
            table.insert_max(element, timestamp);
        }
        table
    }
}

impl<E: Ord + Clone, T: Ord + Clone> Table<E, T> for MemoryTable<E, T> {
    fn get(&self, element: &E) -> Result<Option<T>> {
        Ok(self.0.get(element).cloned())
    }

    fn put_max(&mut self, element: E, timestamp: T) -> Result<bool> {
        Ok(self.insert_max(element, timestamp))
    }

    fn keys(&self) -> Result<Vec<E>> {
        Ok(self.0.keys().cloned().collect())
    }

    fn entries(&self) -> Result<Vec<(E, T)>> {
        Ok(self.0.iter().map(|(e, t)| (e.clone(), t.clone())).collect())
    }
}

#[cfg(test)]
mod test {
    use crate::crdt::convergent::Convergent;
    use crate::table::{MemoryTable, Table};

    fn table(entries: &[(&'static str, u64)]) -> MemoryTable<&'static str, u64> {
        entries.iter().cloned().collect()
    }

    #[test]
    fn memory_table_insert_max() {
        let mut t = MemoryTable::new();
        assert!(t.insert_max("a", 2));
        assert!(!t.insert_max("a", 1));
        assert!(!t.insert_max("a", 2));
        assert_eq!(t.get(&"a"), Some(&2));
        assert!(t.insert_max("a", 3));
        assert_eq!(t.get(&"a"), Some(&3));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn memory_table_from_iter_keeps_max() {
        let t = table(&[("a", 3), ("a", 1), ("b", 2)]);
        assert_eq!(t.get(&"a"), Some(&3));
        assert_eq!(t.get(&"b"), Some(&2));
    }

    #[test]
    fn memory_table_merge() {
        fn assert_merge(mut left: MemoryTable<&'static str, u64>, right: MemoryTable<&'static str, u64>,
                        expected: MemoryTable<&'static str, u64>, changed: bool) {
            assert_eq!(left.merge(&right), changed);
            assert_eq!(left, expected);
        }

        assert_merge(table(&[]), table(&[]), table(&[]), false);
        assert_merge(table(&[("a", 2)]), table(&[("a", 1)]), table(&[("a", 2)]), false);
        assert_merge(table(&[("a", 1)]), table(&[("a", 1)]), table(&[("a", 1)]), false);
        assert_merge(table(&[("a", 1)]), table(&[("a", 2)]), table(&[("a", 2)]), true);
        assert_merge(table(&[("a", 1)]), table(&[("b", 1)]), table(&[("a", 1), ("b", 1)]), true);
    }

    #[test]
    fn memory_table_as_table() {
        let mut t: MemoryTable<String, u64> = MemoryTable::default();
        assert_eq!(Table::get(&t, &"a".to_string()).unwrap(), None);
        assert!(t.put_max("b".to_string(), 1).unwrap());
        assert!(t.put_max("a".to_string(), 5).unwrap());
        assert!(!t.put_max("a".to_string(), 4).unwrap());

        assert_eq!(Table::get(&t, &"a".to_string()).unwrap(), Some(5));
        assert_eq!(Table::keys(&t).unwrap(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(t.entries().unwrap(), vec![("a".to_string(), 5), ("b".to_string(), 1)]);
    }
}
