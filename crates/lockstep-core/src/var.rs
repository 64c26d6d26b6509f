//! Distributed variables: owned values with a globally known handle.

use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::RwLock;
use zerocopy::IntoBytes;

use crate::error::CoreResult;
use crate::future::Future;
use crate::serialize::Flat;
use crate::world::{RegistrationId, VarTarget, World};

/// Storage shared between a [`Var`] and the barrier of its world.
struct VarSlot<T> {
    value: RwLock<T>,
}

impl<T: Flat> VarTarget for VarSlot<T> {
    fn size_bytes(&self) -> usize {
        mem::size_of::<T>()
    }

    fn copy_out(&self, offset: usize, dst: &mut [u8]) {
        let value = self.value.read();
        dst.copy_from_slice(&value.as_bytes()[offset..offset + dst.len()]);
    }

    fn apply(&self, offset: usize, bytes: &[u8]) {
        let mut value = self.value.write();
        value.as_mut_bytes()[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

/// A value stored on every processor, remotely addressable by rank.
///
/// Construction and destruction are collective: every processor creates
/// and drops its vars in the same program order, which is what makes the
/// registration id, and therefore `x.image(p).put(..)`, well defined.
/// Each processor's value is its own; only puts and gets relate them.
pub struct Var<'w, T: Flat> {
    world: &'w dyn World,
    slot: Arc<VarSlot<T>>,
    id: RegistrationId,
}

impl<'w, T: Flat> Var<'w, T> {
    /// Creates and collectively registers a variable holding `value`.
    pub fn new(world: &'w dyn World, value: T) -> CoreResult<Self> {
        let slot = Arc::new(VarSlot {
            value: RwLock::new(value),
        });
        let id = world.register_variable(slot.clone())?;
        Ok(Self { world, slot, id })
    }

    /// Read access to the local value.
    ///
    /// The guard must not be held across `sync`.
    pub fn value(&self) -> impl Deref<Target = T> + '_ {
        self.slot.value.read()
    }

    /// Write access to the local value.
    ///
    /// The guard must not be held across `sync`.
    pub fn value_mut(&self) -> impl DerefMut<Target = T> + '_ {
        self.slot.value.write()
    }

    /// Replaces the local value.
    pub fn set(&self, value: T) {
        *self.slot.value.write() = value;
    }

    /// The dense id this variable carries on every processor.
    pub fn registration_id(&self) -> RegistrationId {
        self.id
    }

    /// A handle onto this variable's instance on processor `dst`.
    pub fn image(&self, dst: usize) -> VarImage<'_, 'w, T> {
        VarImage { var: self, dst }
    }
}

impl<T: Flat> Drop for Var<'_, T> {
    fn drop(&mut self) {
        self.world.unregister_variable(self.id);
    }
}

/// A `(variable, remote processor)` pair used to schedule one-sided
/// transfers.
pub struct VarImage<'v, 'w, T: Flat> {
    var: &'v Var<'w, T>,
    dst: usize,
}

impl<T: Flat> VarImage<'_, '_, T> {
    /// Schedules a write of `value` into the remote variable at the next
    /// barrier. The bytes are captured now; later local changes to the
    /// source do not affect what is transmitted.
    pub fn put(&self, value: T) -> CoreResult<()> {
        self.var
            .world
            .schedule_put(self.dst, self.var.id, 0, value.as_bytes())
    }

    /// Schedules a read of the remote value, resolved at the next barrier
    /// to the value held at the start of that barrier.
    pub fn get(&self) -> CoreResult<Future<T>> {
        let (future, slot) = Future::new();
        self.var
            .world
            .schedule_get(self.dst, self.var.id, 0, mem::size_of::<T>(), slot)?;
        Ok(future)
    }
}
