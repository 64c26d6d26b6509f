//! Placeholders for remote values that become known at the next barrier.

use std::sync::Arc;

use parking_lot::Mutex;
use zerocopy::FromBytes;

use crate::serialize::{decode_elems, Flat};
use crate::world::GetTarget;

/// The slot a scalar get resolves into.
pub(crate) struct FutureSlot<T> {
    cell: Mutex<Option<T>>,
}

impl<T: Flat> GetTarget for FutureSlot<T> {
    fn fulfil(&self, bytes: &[u8]) {
        match T::read_from_bytes(bytes) {
            Ok(value) => *self.cell.lock() = Some(value),
            Err(_) => tracing::error!(
                len = bytes.len(),
                "get snapshot does not match the future's value width"
            ),
        }
    }
}

/// The slot a slice get resolves into.
pub(crate) struct FutureSliceSlot<T> {
    count: usize,
    cell: Mutex<Option<Vec<T>>>,
}

impl<T> FutureSliceSlot<T> {
    pub(crate) fn new(count: usize) -> Self {
        Self {
            count,
            cell: Mutex::new(None),
        }
    }
}

impl<T: Flat> GetTarget for FutureSliceSlot<T> {
    fn fulfil(&self, bytes: &[u8]) {
        match decode_elems(self.count, bytes) {
            Ok(values) => *self.cell.lock() = Some(values),
            Err(err) => tracing::error!(%err, "get snapshot does not match the future's slice"),
        }
    }
}

/// A value that becomes known in the upcoming superstep.
///
/// Returned by `get` on a variable or coarray-element image. The slot is
/// undefined until the next barrier completes; early reads fail cleanly.
pub struct Future<T: Flat> {
    slot: Arc<FutureSlot<T>>,
}

impl<T: Flat> Future<T> {
    pub(crate) fn new() -> (Self, Arc<FutureSlot<T>>) {
        let slot = Arc::new(FutureSlot {
            cell: Mutex::new(None),
        });
        (Self { slot: slot.clone() }, slot)
    }

    /// The remote value as it was at the start of the barrier, or `None`
    /// if the barrier has not completed yet.
    pub fn try_value(&self) -> Option<T> {
        *self.slot.cell.lock()
    }

    /// The remote value as it was at the start of the barrier.
    ///
    /// # Panics
    /// Panics when read before the barrier that resolves this future.
    pub fn value(&self) -> T {
        match self.try_value() {
            Some(value) => value,
            None => panic!("future read before its barrier completed"),
        }
    }
}

/// A slice of remote values that becomes known in the upcoming superstep.
pub struct FutureSlice<T: Flat> {
    slot: Arc<FutureSliceSlot<T>>,
}

impl<T: Flat> FutureSlice<T> {
    pub(crate) fn new(count: usize) -> (Self, Arc<FutureSliceSlot<T>>) {
        let slot = Arc::new(FutureSliceSlot::new(count));
        (Self { slot: slot.clone() }, slot)
    }

    /// The remote elements as they were at the start of the barrier, or
    /// `None` if the barrier has not completed yet.
    pub fn try_value(&self) -> Option<Vec<T>> {
        self.slot.cell.lock().clone()
    }

    /// The remote elements as they were at the start of the barrier.
    ///
    /// # Panics
    /// Panics when read before the barrier that resolves this future.
    pub fn value(&self) -> Vec<T> {
        match self.try_value() {
            Some(values) => values,
            None => panic!("future read before its barrier completed"),
        }
    }
}
