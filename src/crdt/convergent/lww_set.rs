use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Display};
use std::str::FromStr;

use log::{debug, trace};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::crdt::convergent::{Convergent, DeltaConvergent, Materialize};
use crate::element::Element;
use crate::error::Error;
use crate::table::{MemoryTable, RetryPolicy, SledTable, Table};
use crate::time::Timestamp;
use crate::{Clock, Result};

/// Last-writer-wins element set. Every element is tracked in two tables: the latest timestamp at
/// which it was added and the latest timestamp at which it was removed. An element is a member
/// of the set when it was added after it was last removed. When both timestamps are equal the
/// removal wins.
///
/// Tables are never shrunk: a removal is just a newer entry in the remove table, so a later add
/// can still be compared against it.
///
/// Storage of both tables is pluggable (see `Table`). The default is an in-memory table, which
/// also makes the set `Convergent` and `DeltaConvergent`. Sets over any other table can be merged
/// with `try_merge` and `try_merge_delta`.
#[derive(Debug, Clone)]
pub struct LWWSet<E, T = Timestamp, S = MemoryTable<E, T>> {
    adds: S,
    removes: S,
    delta: Option<Delta<E, T>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Add,
    Remove,
}

impl Side {
    fn name(&self) -> &'static str {
        match self {
            Side::Add => "add",
            Side::Remove => "remove",
        }
    }
}

/// Decides membership from the latest add and remove timestamps of an element.
#[inline]
fn is_present<T: Ord>(added: Option<&T>, removed: Option<&T>) -> bool {
    match (added, removed) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(added), Some(removed)) => added > removed,
    }
}

fn parse_timestamp<T>(input: &str) -> Result<T> where T: FromStr, T::Err: Display {
    input.parse::<T>().map_err(|e| {
        debug!("rejected timestamp '{}': {}", input, e);
        Error::invalid_timestamp(input, e)
    })
}

impl<E: Ord, T: Ord> LWWSet<E, T> {
    /// Creates an empty set stored in memory.
    pub fn new() -> Self {
        LWWSet::with_tables(MemoryTable::new(), MemoryTable::new())
    }
}

impl<E: Ord, T: Ord> Default for LWWSet<E, T> {
    fn default() -> Self {
        LWWSet::new()
    }
}

impl<E, T, S> LWWSet<E, T, S> {
    pub fn with_tables(adds: S, removes: S) -> Self {
        LWWSet {
            adds,
            removes,
            delta: None,
        }
    }

    /// Table of add timestamps.
    pub fn adds(&self) -> &S { &self.adds }

    /// Table of remove timestamps.
    pub fn removes(&self) -> &S { &self.removes }
}

impl<E, T, S> LWWSet<E, T, S>
    where E: Element,
          T: Ord + Clone + Debug,
          S: Table<E, T> {

    /// Marks `element` as added at the current time. The time is read from the clock on every
    /// call.
    pub fn add(&mut self, element: E) -> Result<bool> where T: Clock {
        self.apply(Side::Add, element, T::now())
    }

    /// Marks `element` as added at a given `timestamp`. Returns true if the add table changed,
    /// false if it already held the same or a more recent timestamp for that element.
    pub fn add_at(&mut self, element: E, timestamp: T) -> Result<bool> {
        self.apply(Side::Add, element, timestamp)
    }

    /// Same as `add_at`, but the timestamp is parsed from a string first. If it can't be parsed,
    /// `Error::InvalidTimestamp` is returned and the set is left untouched.
    pub fn add_str(&mut self, element: E, timestamp: &str) -> Result<bool>
        where T: FromStr, T::Err: Display {
        let timestamp = parse_timestamp(timestamp)?;
        self.apply(Side::Add, element, timestamp)
    }

    /// Marks `element` as removed at the current time.
    pub fn remove(&mut self, element: E) -> Result<bool> where T: Clock {
        self.apply(Side::Remove, element, T::now())
    }

    pub fn remove_at(&mut self, element: E, timestamp: T) -> Result<bool> {
        self.apply(Side::Remove, element, timestamp)
    }

    pub fn remove_str(&mut self, element: E, timestamp: &str) -> Result<bool>
        where T: FromStr, T::Err: Display {
        let timestamp = parse_timestamp(timestamp)?;
        self.apply(Side::Remove, element, timestamp)
    }

    fn apply(&mut self, side: Side, element: E, timestamp: T) -> Result<bool> {
        if element.is_empty() {
            debug!("{} rejected: empty element", side.name());
            return Err(Error::InvalidElement);
        }

        let table = match side {
            Side::Add => &mut self.adds,
            Side::Remove => &mut self.removes,
        };
        let changed = table.put_max(element.clone(), timestamp.clone())?;
        if changed {
            let delta = self.delta.get_or_insert_with(Delta::default);
            match side {
                Side::Add => delta.adds.insert_max(element, timestamp),
                Side::Remove => delta.removes.insert_max(element, timestamp),
            };
        } else {
            debug!("{} {:?} at {:?} ignored: already seen at the same or later time",
                   side.name(), element, timestamp);
        }
        Ok(changed)
    }

    /// Checks if `element` is a member of the set.
    pub fn exists(&self, element: &E) -> Result<bool> {
        let added = match self.adds.get(element)? {
            None => return Ok(false),
            Some(added) => added,
        };
        let removed = self.removes.get(element)?;
        Ok(is_present(Some(&added), removed.as_ref()))
    }

    /// Returns all members of the set.
    pub fn get(&self) -> Result<BTreeSet<E>> {
        let removes: BTreeMap<E, T> = self.removes.entries()?.into_iter().collect();
        let members = self.adds.entries()?
            .into_iter()
            .filter(|(element, added)| is_present(Some(added), removes.get(element)))
            .map(|(element, _)| element)
            .collect();
        Ok(members)
    }

    pub fn add_timestamp(&self, element: &E) -> Result<Option<T>> {
        self.adds.get(element)
    }

    pub fn remove_timestamp(&self, element: &E) -> Result<Option<T>> {
        self.removes.get(element)
    }

    /// Merges the state of another replica into the current one, keeping the latest timestamp of
    /// every element in each table. Replicas don't need to share the storage type. Returns true
    /// if the current replica changed.
    ///
    /// Merged entries are not added to the local delta.
    pub fn try_merge<S2: Table<E, T>>(&mut self, other: &LWWSet<E, T, S2>) -> Result<bool> {
        let mut changed = false;
        for (element, timestamp) in other.adds.entries()? {
            changed = self.adds.put_max(element, timestamp)? || changed;
        }
        for (element, timestamp) in other.removes.entries()? {
            changed = self.removes.put_max(element, timestamp)? || changed;
        }
        trace!("merged replica state (changed: {})", changed);
        Ok(changed)
    }

    /// Applies a delta received from another replica.
    pub fn try_merge_delta(&mut self, delta: &Delta<E, T>) -> Result<bool> {
        let mut changed = false;
        for (element, timestamp) in delta.adds.iter() {
            changed = self.adds.put_max(element.clone(), timestamp.clone())? || changed;
        }
        for (element, timestamp) in delta.removes.iter() {
            changed = self.removes.put_max(element.clone(), timestamp.clone())? || changed;
        }
        trace!("merged delta of {} add(s) and {} remove(s) (changed: {})",
               delta.adds.len(), delta.removes.len(), changed);
        Ok(changed)
    }

    /// Moves out updates made locally since the last call. Works for every storage type; the
    /// in-memory set also exposes it through `DeltaConvergent`.
    pub fn take_delta(&mut self) -> Option<Delta<E, T>> {
        self.delta.take()
    }

    /// Copies the current state into an in-memory replica.
    pub fn snapshot(&self) -> Result<LWWSet<E, T>> {
        let adds = self.adds.entries()?.into_iter().collect();
        let removes = self.removes.entries()?.into_iter().collect();
        Ok(LWWSet::with_tables(adds, removes))
    }
}

impl<E, T> LWWSet<E, T, SledTable<E, T>>
    where E: Element + Serialize + DeserializeOwned,
          T: Ord + Clone + Debug + Serialize + DeserializeOwned {

    /// Opens a set persisted in a given database. Its tables are kept in trees named
    /// `<name>/adds` and `<name>/removes`, so sets opened under the same name share their state.
    pub fn open(db: &sled::Db, name: &str) -> Result<Self> {
        Self::open_with_retry(db, name, RetryPolicy::default())
    }

    /// Like `open`, but `retry` governs opening the trees as well as every later operation.
    pub fn open_with_retry(db: &sled::Db, name: &str, retry: RetryPolicy) -> Result<Self> {
        let adds = SledTable::open_with_retry(db, &format!("{}/adds", name), retry)?;
        let removes = SledTable::open_with_retry(db, &format!("{}/removes", name), retry)?;
        Ok(LWWSet::with_tables(adds, removes))
    }

    /// Replaces the retry policy of both tables. Trees already opened are unaffected, use
    /// `open_with_retry` to apply a policy from the start.
    pub fn with_retry(self, retry: RetryPolicy) -> Self {
        LWWSet {
            adds: self.adds.with_retry(retry),
            removes: self.removes.with_retry(retry),
            delta: self.delta,
        }
    }
}

impl<E, T> LWWSet<E, T>
    where E: Element,
          T: Ord + Clone + Debug {

    /// Infallible version of `exists` for sets kept in memory.
    pub fn contains(&self, element: &E) -> bool {
        is_present(self.adds.get(element), self.removes.get(element))
    }

    pub fn len(&self) -> usize {
        self.adds.iter()
            .filter(|(element, added)| is_present(Some(*added), self.removes.get(element)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        !self.adds.iter().any(|(element, added)| is_present(Some(added), self.removes.get(element)))
    }
}

impl<E: Ord + Clone, T: Ord + Clone> Convergent for LWWSet<E, T> {
    fn merge(&mut self, other: &Self) -> bool {
        let adds_changed = self.adds.merge(&other.adds);
        let removes_changed = self.removes.merge(&other.removes);
        adds_changed || removes_changed
    }
}

impl<E: Ord + Clone, T: Ord + Clone> DeltaConvergent for LWWSet<E, T> {
    type Delta = Delta<E, T>;

    fn delta(&mut self) -> Option<Self::Delta> {
        self.delta.take()
    }

    fn merge_delta(&mut self, other: &Self::Delta) -> bool {
        let adds_changed = self.adds.merge(&other.adds);
        let removes_changed = self.removes.merge(&other.removes);
        adds_changed || removes_changed
    }
}

impl<'mat, E: Ord, T: Ord> Materialize for &'mat LWWSet<E, T> {
    type Value = BTreeSet<&'mat E>;

    fn value(&self) -> Self::Value {
        let set: &'mat LWWSet<E, T> = *self;
        set.adds.iter()
            .filter(|(element, added)| is_present(Some(*added), set.removes.get(element)))
            .map(|(element, _)| element)
            .collect()
    }
}

/// Updates made by a replica since its delta was last taken. Deltas merge the same way full
/// replicas do, so several of them can be combined before shipping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(
    serialize = "E: Serialize, T: Serialize",
    deserialize = "E: Ord + Deserialize<'de>, T: Deserialize<'de>"
))]
pub struct Delta<E, T> {
    adds: MemoryTable<E, T>,
    removes: MemoryTable<E, T>,
}

impl<E, T> Delta<E, T> {
    pub fn adds(&self) -> &MemoryTable<E, T> { &self.adds }

    pub fn removes(&self) -> &MemoryTable<E, T> { &self.removes }
}

impl<E: Ord, T: Ord> Delta<E, T> {
    pub fn is_empty(&self) -> bool { self.adds.is_empty() && self.removes.is_empty() }
}

impl<E: Serialize, T: Serialize> Delta<E, T> {
    /// Encodes the delta using CBOR.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_cbor::to_vec(self)?)
    }
}

impl<E: Ord + DeserializeOwned, T: DeserializeOwned> Delta<E, T> {
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_cbor::from_slice(bytes)?)
    }
}

impl<E, T> Default for Delta<E, T> {
    fn default() -> Self {
        Delta {
            adds: MemoryTable::default(),
            removes: MemoryTable::default(),
        }
    }
}

impl<E: Ord + Clone, T: Ord + Clone> Convergent for Delta<E, T> {
    fn merge(&mut self, other: &Self) -> bool {
        let adds_changed = self.adds.merge(&other.adds);
        let removes_changed = self.removes.merge(&other.removes);
        adds_changed || removes_changed
    }
}
