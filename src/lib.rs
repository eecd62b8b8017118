use std::time::SystemTime;

pub mod crdt;
pub mod element;
pub mod error;
pub mod hlc;
pub mod table;
pub mod time;

pub use crate::crdt::convergent::lww_set::{Delta, LWWSet};
pub use crate::crdt::convergent::{Convergent, DeltaConvergent, Materialize};
pub use crate::element::Element;
pub use crate::error::Error;
pub use crate::hlc::HybridTime;
pub use crate::table::{MemoryTable, RetryPolicy, SledTable, Table};
pub use crate::time::Timestamp;

pub type Result<T> = std::result::Result<T, Error>;

/// Source of timestamps used whenever an operation is not given one explicitly.
pub trait Clock {
    /// Reads the current time. Called anew for every operation.
    fn now() -> Self;
}

impl Clock for SystemTime {
    fn now() -> Self {
        SystemTime::now()
    }
}
