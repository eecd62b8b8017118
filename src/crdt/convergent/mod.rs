pub mod lww_set;

/// State-based replicated data type. `merge` folds the state of another replica into the current
/// one and returns true when the current replica learned something new from `other`, or false
/// when `other` carried nothing it didn't already know.
///
/// `merge` operation is expected to be:
/// - idempotent: `a.merge(a) <=> a`
/// - commutative: `a.merge(b) <=> b.merge(a)`
/// - associative: `a.merge(b).merge(c) <=> a.merge(b.merge(c))`
///
/// These three properties guarantee that replicas which received the same set of updates, in any
/// order and any number of times, end up in the same state.
pub trait Convergent {
    fn merge(&mut self, other: &Self) -> bool;
}

/// Like `Convergent`, but replicas exchange deltas instead of their full state. A delta carries
/// only the updates made locally since the last time it was taken.
///
/// A delta accumulates inside of the data type while it's being updated and is moved out by
/// `delta`, leaving nothing behind until the next local update.
pub trait DeltaConvergent {
    type Delta;
    /// Move delta from within the CRDT.
    fn delta(&mut self) -> Option<Self::Delta>;
    fn merge_delta(&mut self, other: &Self::Delta) -> bool;
}

/// Materializes a replicated value into its user-facing form, stripped of timestamps and other
/// replication metadata.
pub trait Materialize {
    type Value;
    fn value(&self) -> Self::Value;
}
