//! The per-processor world: the contract every backend fulfils.
//!
//! A world represents one processor's view of the collective run. All
//! communication (one-sided puts and gets, queue sends, the barrier) is
//! issued through it, and it owns the registration tables that give
//! collectively created objects their dense, world-wide ids.

use std::sync::Arc;

use crate::error::CoreResult;

/// Dense id naming a registered variable or queue inside a world.
///
/// Ids are allocated lowest-unused-first, so processors that create and
/// destroy objects in the same program order observe the same ids.
pub type RegistrationId = usize;

/// Barrier-time write access to a registered variable's storage.
///
/// The owning processor's barrier uses this to serve snapshot reads for
/// remote gets and to apply incoming puts. Offsets and lengths are in
/// bytes; callers stay inside `size_bytes()`.
pub trait VarTarget: Send + Sync {
    /// Current extent of the storage in bytes.
    fn size_bytes(&self) -> usize;

    /// Copies `dst.len()` bytes out of the storage, starting at `offset`.
    fn copy_out(&self, offset: usize, dst: &mut [u8]);

    /// Overwrites storage bytes starting at `offset` with `bytes`.
    fn apply(&self, offset: usize, bytes: &[u8]);
}

/// Barrier-time delivery access to a registered queue.
///
/// For each destination queue the barrier first announces the total
/// incoming payload size, then pushes every message in delivery order,
/// and finally clears the buffer at the start of the *next* barrier.
pub trait QueueSink: Send + Sync {
    /// Announces the summed wire size of the messages about to be pushed.
    fn reserve(&self, total_bytes: usize);

    /// Decodes one serialized message into the local delivery buffer.
    fn push_message(&self, bytes: &[u8]) -> CoreResult<()>;

    /// Decodes one bulk message: `count` raw elements plus serialized
    /// trailing fields.
    fn push_array(&self, count: usize, elems: &[u8], tail: &[u8]) -> CoreResult<()>;

    /// Empties the local delivery buffer, retaining its storage.
    fn clear(&self);
}

/// Receiver for the bytes a scheduled get snapshots at the barrier.
pub trait GetTarget: Send + Sync {
    /// Delivers the snapshotted bytes into the future's slot.
    fn fulfil(&self, bytes: &[u8]);
}

/// One processor's façade onto the collective run.
///
/// Exactly one world exists per logical processor. Between barriers a
/// world is owned by a single thread of execution; it is not meant to be
/// shared across threads within a processor.
pub trait World {
    /// Total number of processors in the collective run.
    fn active_processors(&self) -> usize;

    /// Rank of this processor, in `[0, active_processors())`.
    fn processor_id(&self) -> usize;

    /// Rank of the next processor in the ring.
    fn next_processor(&self) -> usize {
        (self.processor_id() + 1) % self.active_processors()
    }

    /// Rank of the previous processor in the ring.
    fn prev_processor(&self) -> usize {
        (self.processor_id() + self.active_processors() - 1) % self.active_processors()
    }

    /// Performs the collective barrier and resolves all communication
    /// issued in the preceding superstep: delivery buffers from the
    /// previous superstep are cleared, scheduled gets snapshot their
    /// sources before any put lands, incoming puts are applied in
    /// per-source order, queue messages are delivered, and buffered log
    /// output is flushed with processor attribution.
    ///
    /// Every processor must call `sync` the same number of times. Returns
    /// [`CoreError::Aborted`](crate::CoreError::Aborted) when the
    /// collective run has been poisoned.
    fn sync(&self) -> CoreResult<()>;

    /// Performs a collective barrier *without* resolving outstanding
    /// communication; queue delivery buffers are left untouched. Mixing
    /// `barrier` with `sync` across processors is a collective mismatch.
    fn barrier(&self) -> CoreResult<()>;

    /// Terminates the collective run. Every processor's current or next
    /// barrier wait fails with `Aborted`. This is not a normal exit; it
    /// signals that an unrecoverable error occurred.
    fn abort(&self);

    /// Buffers a diagnostic line, flushed at the next `sync` sorted by
    /// processor id with per-processor order preserved.
    fn log(&self, message: String);

    /// Registers variable storage, returning the lowest unused id.
    /// Collective: every processor must register in the same order.
    fn register_variable(&self, target: Arc<dyn VarTarget>) -> CoreResult<RegistrationId>;

    /// Releases a variable id for reuse. Collective, like registration.
    fn unregister_variable(&self, id: RegistrationId);

    /// Registers a queue's delivery sink, returning the lowest unused id.
    /// Collective: every processor must register in the same order.
    fn register_queue(&self, sink: Arc<dyn QueueSink>) -> CoreResult<RegistrationId>;

    /// Releases a queue id for reuse. Collective, like registration.
    fn unregister_queue(&self, id: RegistrationId);

    /// Schedules a remote write of `bytes` into the variable `var_id` on
    /// processor `dst`, starting at `offset` bytes. The bytes are captured
    /// now; the write lands during the next barrier. Out-of-range targets
    /// and windows are rejected here and nothing is scheduled.
    fn schedule_put(
        &self,
        dst: usize,
        var_id: RegistrationId,
        offset: usize,
        bytes: &[u8],
    ) -> CoreResult<()>;

    /// Schedules a remote read of `len` bytes from the variable `var_id`
    /// on processor `src`, starting at `offset`. The snapshot is taken at
    /// the start of the next barrier, before any put of the same
    /// superstep lands, and handed to `target`.
    fn schedule_get(
        &self,
        src: usize,
        var_id: RegistrationId,
        offset: usize,
        len: usize,
        target: Arc<dyn GetTarget>,
    ) -> CoreResult<()>;

    /// Enqueues one serialized message for queue `queue_id` on processor
    /// `dst`, delivered at the next barrier.
    fn send_message(
        &self,
        dst: usize,
        queue_id: RegistrationId,
        payload: Box<[u8]>,
    ) -> CoreResult<()>;

    /// Enqueues one bulk message: `count` raw fixed-width elements plus
    /// the serialized trailing fields of the message tuple.
    fn send_array(
        &self,
        dst: usize,
        queue_id: RegistrationId,
        count: usize,
        elems: Box<[u8]>,
        tail: Box<[u8]>,
    ) -> CoreResult<()>;
}
