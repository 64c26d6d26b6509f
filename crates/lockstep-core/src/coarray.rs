//! Coarrays: array-shaped variables addressed by `(processor, index)`.

use std::mem;
use std::ops::{Deref, DerefMut, Range};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use zerocopy::IntoBytes;

use crate::error::{CoreError, CoreResult};
use crate::future::{Future, FutureSlice};
use crate::serialize::Flat;
use crate::world::{RegistrationId, VarTarget, World};

/// Storage shared between a [`Coarray`] and the barrier of its world.
struct CoarraySlot<T> {
    cells: RwLock<Vec<T>>,
}

impl<T: Flat> VarTarget for CoarraySlot<T> {
    fn size_bytes(&self) -> usize {
        self.cells.read().len() * mem::size_of::<T>()
    }

    fn copy_out(&self, offset: usize, dst: &mut [u8]) {
        let cells = self.cells.read();
        dst.copy_from_slice(&cells.as_bytes()[offset..offset + dst.len()]);
    }

    fn apply(&self, offset: usize, bytes: &[u8]) {
        let mut cells = self.cells.write();
        cells.as_mut_bytes()[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

/// A variable whose value is an array, addressable element-wise or by
/// half-open slice from any processor.
///
/// The local length is fixed at construction and may differ between
/// processors; remote windows are validated against the destination's
/// extent. Like [`Var`](crate::Var), construction and destruction are
/// collective.
pub struct Coarray<'w, T: Flat> {
    world: &'w dyn World,
    slot: Arc<CoarraySlot<T>>,
    id: RegistrationId,
}

impl<'w, T: Flat> Coarray<'w, T> {
    /// Creates and collectively registers a coarray of `len` local
    /// elements, all set to `fill`.
    pub fn new(world: &'w dyn World, len: usize, fill: T) -> CoreResult<Self> {
        let slot = Arc::new(CoarraySlot {
            cells: RwLock::new(vec![fill; len]),
        });
        let id = world.register_variable(slot.clone())?;
        Ok(Self { world, slot, id })
    }

    /// Number of local elements.
    pub fn len(&self) -> usize {
        self.slot.cells.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read access to the local elements.
    ///
    /// The guard must not be held across `sync`.
    pub fn local(&self) -> impl Deref<Target = [T]> + '_ {
        RwLockReadGuard::map(self.slot.cells.read(), |cells| cells.as_slice())
    }

    /// Write access to the local elements.
    ///
    /// The guard must not be held across `sync`.
    pub fn local_mut(&self) -> impl DerefMut<Target = [T]> + '_ {
        RwLockWriteGuard::map(self.slot.cells.write(), |cells| cells.as_mut_slice())
    }

    /// The dense id this coarray carries on every processor.
    pub fn registration_id(&self) -> RegistrationId {
        self.id
    }

    /// A handle onto this coarray's instance on processor `dst`.
    pub fn image(&self, dst: usize) -> CoarrayImage<'_, 'w, T> {
        CoarrayImage { arr: self, dst }
    }
}

impl<T: Flat> Drop for Coarray<'_, T> {
    fn drop(&mut self) {
        self.world.unregister_variable(self.id);
    }
}

/// A `(coarray, remote processor)` pair; yields element and slice views.
pub struct CoarrayImage<'c, 'w, T: Flat> {
    arr: &'c Coarray<'w, T>,
    dst: usize,
}

impl<'c, 'w, T: Flat> CoarrayImage<'c, 'w, T> {
    /// A single-element view at local index `index` on the remote side.
    pub fn elem(&self, index: usize) -> ElemImage<'c, 'w, T> {
        ElemImage {
            arr: self.arr,
            dst: self.dst,
            index,
        }
    }

    /// A half-open slice view over `range` on the remote side.
    pub fn slice(&self, range: Range<usize>) -> SliceImage<'c, 'w, T> {
        SliceImage {
            arr: self.arr,
            dst: self.dst,
            range,
        }
    }
}

/// One remote element of a coarray.
pub struct ElemImage<'c, 'w, T: Flat> {
    arr: &'c Coarray<'w, T>,
    dst: usize,
    index: usize,
}

impl<T: Flat> ElemImage<'_, '_, T> {
    /// Schedules a write of `value` into the remote element.
    pub fn put(&self, value: T) -> CoreResult<()> {
        self.arr.world.schedule_put(
            self.dst,
            self.arr.id,
            self.index * mem::size_of::<T>(),
            value.as_bytes(),
        )
    }

    /// Schedules a read of the remote element.
    pub fn get(&self) -> CoreResult<Future<T>> {
        let (future, slot) = Future::new();
        self.arr.world.schedule_get(
            self.dst,
            self.arr.id,
            self.index * mem::size_of::<T>(),
            mem::size_of::<T>(),
            slot,
        )?;
        Ok(future)
    }
}

/// A half-open range of remote elements of a coarray.
pub struct SliceImage<'c, 'w, T: Flat> {
    arr: &'c Coarray<'w, T>,
    dst: usize,
    range: Range<usize>,
}

impl<T: Flat> SliceImage<'_, '_, T> {
    fn width(&self) -> usize {
        self.range.end.saturating_sub(self.range.start)
    }

    /// Schedules a write of `values` over the remote slice. The value
    /// count must equal the slice width.
    pub fn put(&self, values: &[T]) -> CoreResult<()> {
        if values.len() != self.width() {
            return Err(CoreError::CountMismatch {
                expected: self.width(),
                got: values.len(),
            });
        }
        self.arr.world.schedule_put(
            self.dst,
            self.arr.id,
            self.range.start * mem::size_of::<T>(),
            values.as_bytes(),
        )
    }

    /// Schedules a read of the remote slice.
    pub fn get(&self) -> CoreResult<FutureSlice<T>> {
        let count = self.width();
        let (future, slot) = FutureSlice::new(count);
        self.arr.world.schedule_get(
            self.dst,
            self.arr.id,
            self.range.start * mem::size_of::<T>(),
            count * mem::size_of::<T>(),
            slot,
        )?;
        Ok(future)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_applies_element_windows() {
        let slot = CoarraySlot {
            cells: RwLock::new(vec![0u32; 4]),
        };
        assert_eq!(slot.size_bytes(), 16);

        slot.apply(4, 9u32.as_bytes());
        slot.apply(8, [7u32, 5].as_bytes());
        assert_eq!(*slot.cells.read(), vec![0, 9, 7, 5]);

        let mut out = [0u8; 8];
        slot.copy_out(4, &mut out);
        let mut reader = crate::serialize::ByteReader::new(&out);
        assert_eq!(reader.flat::<u32>().unwrap(), 9);
        assert_eq!(reader.flat::<u32>().unwrap(), 7);
    }
}
