//! Per-object reference counting
//!
//! Objects do not destroy themselves. [`ReferenceCounter::unref_object`]
//! returns the new count and the caller (the object manager) is responsible
//! for handing a zero-count object to the garbage collector.
//!
//! # Example
//!
//! ```
//! use cellmaster_core_object::ReferenceCounter;
//!
//! let mut refs = ReferenceCounter::new();
//! refs.ref_object();
//! refs.ref_object();
//! assert_eq!(refs.ref_counter(), 2);
//!
//! refs.unref_object();
//! assert_eq!(refs.unref_object(), 0);
//! assert!(!refs.is_alive());
//! ```

use serde::{Deserialize, Serialize};

use crate::id::ObjectId;

/// Strong/weak reference bookkeeping carried by every master object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceCounter {
    ref_counter: i32,
    weak_ref_counter: i32,
    /// Transaction that created the object and has not committed yet
    staging_transaction: Option<ObjectId>,
}

impl ReferenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the strong counter and return the new value
    pub fn ref_object(&mut self) -> i32 {
        assert!(
            self.ref_counter >= 0,
            "Reference counter is negative: {}",
            self.ref_counter
        );
        self.ref_counter += 1;
        self.ref_counter
    }

    /// Decrement the strong counter and return the new value
    ///
    /// # Panics
    ///
    /// Panics if the counter is already zero; that means ref/unref pairs are
    /// out of balance somewhere and the object graph can no longer be trusted.
    pub fn unref_object(&mut self) -> i32 {
        assert!(
            self.ref_counter > 0,
            "Reference counter underflow: {}",
            self.ref_counter
        );
        self.ref_counter -= 1;
        self.ref_counter
    }

    pub fn weak_ref_object(&mut self) -> i32 {
        self.weak_ref_counter += 1;
        self.weak_ref_counter
    }

    pub fn weak_unref_object(&mut self) -> i32 {
        assert!(
            self.weak_ref_counter > 0,
            "Weak reference counter underflow: {}",
            self.weak_ref_counter
        );
        self.weak_ref_counter -= 1;
        self.weak_ref_counter
    }

    pub fn ref_counter(&self) -> i32 {
        self.ref_counter
    }

    pub fn weak_ref_counter(&self) -> i32 {
        self.weak_ref_counter
    }

    /// An object is alive while it holds at least one strong reference
    pub fn is_alive(&self) -> bool {
        self.ref_counter > 0
    }

    pub fn staging_transaction(&self) -> Option<ObjectId> {
        self.staging_transaction
    }

    pub fn set_staging_transaction(&mut self, transaction_id: Option<ObjectId>) {
        self.staging_transaction = transaction_id;
    }

    pub fn is_staged(&self) -> bool {
        self.staging_transaction.is_some()
    }
}
