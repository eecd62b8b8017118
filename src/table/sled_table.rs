use std::fmt::{Debug, Formatter};
use std::marker::PhantomData;

use log::trace;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::table::{RetryPolicy, Table};
use crate::Result;

/// Table persisted in a `sled` tree. Elements and timestamps are stored CBOR-encoded.
///
/// Handles are cheap to clone and all clones (as well as tables opened under the same name on the
/// same database) share their state. `put_max` only writes when the stored timestamp is older, and
/// does so with a compare-and-swap loop, so concurrent writers never overwrite a newer timestamp
/// with an older one.
pub struct SledTable<E, T> {
    tree: sled::Tree,
    retry: RetryPolicy,
    _marker: PhantomData<fn() -> (E, T)>,
}

impl<E, T> SledTable<E, T> {
    pub fn new(tree: sled::Tree) -> Self {
        SledTable {
            tree,
            retry: RetryPolicy::default(),
            _marker: PhantomData,
        }
    }

    /// Opens (creating if necessary) a tree called `name` in a given database, using the default
    /// retry policy.
    pub fn open(db: &sled::Db, name: &str) -> Result<Self> {
        Self::open_with_retry(db, name, RetryPolicy::default())
    }

    /// Opens a tree called `name`, retrying the open itself and every later operation according
    /// to `retry`.
    pub fn open_with_retry(db: &sled::Db, name: &str, retry: RetryPolicy) -> Result<Self> {
        let tree = retry.run("open_tree", || db.open_tree(name))?;
        Ok(SledTable::new(tree).with_retry(retry))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry(&self) -> RetryPolicy { self.retry }

    /// Flushes dirty pages of the underlying database to disk. Returns the number of bytes
    /// written.
    pub fn flush(&self) -> Result<usize> {
        self.retry.run("flush", || self.tree.flush())
    }

    pub fn tree(&self) -> &sled::Tree { &self.tree }
}

impl<E, T> Clone for SledTable<E, T> {
    fn clone(&self) -> Self {
        SledTable {
            tree: self.tree.clone(),
            retry: self.retry,
            _marker: PhantomData,
        }
    }
}

impl<E, T> Debug for SledTable<E, T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledTable")
            .field("tree", &String::from_utf8_lossy(&self.tree.name()))
            .field("retry", &self.retry)
            .finish()
    }
}

impl<E, T> Table<E, T> for SledTable<E, T>
    where E: Serialize + DeserializeOwned,
          T: Serialize + DeserializeOwned + Ord {

    fn get(&self, element: &E) -> Result<Option<T>> {
        let key = serde_cbor::to_vec(element)?;
        match self.retry.run("get", || self.tree.get(&key))? {
            Some(bytes) => Ok(Some(serde_cbor::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_max(&mut self, element: E, timestamp: T) -> Result<bool> {
        let key = serde_cbor::to_vec(&element)?;
        let value = serde_cbor::to_vec(&timestamp)?;
        loop {
            let current = self.retry.run("put_max", || self.tree.get(&key))?;
            if let Some(bytes) = &current {
                // undecodable entries are never overwritten
                let stored: T = serde_cbor::from_slice(bytes)?;
                if stored >= timestamp {
                    return Ok(false);
                }
            }

            let swapped = self.retry.run("put_max", || {
                self.tree.compare_and_swap(&key, current.as_ref(), Some(value.as_slice()))
            })?;
            match swapped {
                Ok(()) => return Ok(true),
                Err(_) => trace!("put_max lost a race on {:?}, retrying", self.tree.name()),
            }
        }
    }

    fn keys(&self) -> Result<Vec<E>> {
        let keys = self.retry.run("keys", || self.tree.iter().keys().collect::<sled::Result<Vec<_>>>())?;
        let mut result = Vec::with_capacity(keys.len());
        for key in keys {
            result.push(serde_cbor::from_slice(&key)?);
        }
        Ok(result)
    }

    fn entries(&self) -> Result<Vec<(E, T)>> {
        let entries = self.retry.run("entries", || self.tree.iter().collect::<sled::Result<Vec<_>>>())?;
        let mut result = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            result.push((serde_cbor::from_slice(&key)?, serde_cbor::from_slice(&value)?));
        }
        Ok(result)
    }
}
