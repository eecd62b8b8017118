//! Storage for the per-element timestamp tables of a replicated set.
//!
//! A set keeps two tables (added and removed elements), each of them mapping an element to the
//! latest timestamp observed for it. Tables only ever move forward: `put_max` is the single write
//! operation and it never replaces a timestamp with an older one.

mod memory;
mod retry;
mod sled_table;

pub use memory::MemoryTable;
pub use retry::RetryPolicy;
pub use sled_table::SledTable;

use crate::Result;

/// Ordered element -> timestamp storage capability.
pub trait Table<E, T> {
    /// Returns the timestamp stored for a given `element`, if any.
    fn get(&self, element: &E) -> Result<Option<T>>;

    /// Stores `timestamp` for `element` only if there was no entry for it yet or the stored one
    /// is strictly older. The check and the write happen as one atomic step. Returns true if the
    /// table has been changed.
    fn put_max(&mut self, element: E, timestamp: T) -> Result<bool>;

    /// Lists all elements that have an entry in the table.
    fn keys(&self) -> Result<Vec<E>>;

    /// Lists all entries of the table.
    fn entries(&self) -> Result<Vec<(E, T)>>;
}
