//! Typed mailboxes with per-destination send and post-barrier delivery.

use std::mem;
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use zerocopy::IntoBytes;

use crate::error::CoreResult;
use crate::message::{encode_message, ArrayMessage, Message};
use crate::world::{QueueSink, RegistrationId, World};

/// Delivery buffer shared between a [`Queue`] and the barrier of its
/// world.
struct QueueCore<M> {
    delivered: RwLock<Vec<M>>,
}

impl<M: Message> QueueSink for QueueCore<M> {
    fn reserve(&self, total_bytes: usize) {
        // Wire size only approximates the in-memory footprint, but it
        // bounds the message count.
        let hint = total_bytes / mem::size_of::<M>().max(1);
        self.delivered.write().reserve(hint);
    }

    fn push_message(&self, bytes: &[u8]) -> CoreResult<()> {
        let mut reader = crate::serialize::ByteReader::new(bytes);
        let msg = M::read(&mut reader)?;
        self.delivered.write().push(msg);
        Ok(())
    }

    fn push_array(&self, count: usize, elems: &[u8], tail: &[u8]) -> CoreResult<()> {
        let msg = M::from_array_parts(count, elems, tail)?;
        self.delivered.write().push(msg);
        Ok(())
    }

    fn clear(&self) {
        self.delivered.write().clear();
    }
}

/// A typed multi-producer mailbox.
///
/// Senders on any processor append messages bound for this queue on a
/// chosen destination; the destination's delivery buffer fills only
/// during the barrier and is read-only in between. Construction and
/// destruction are collective, like variables.
///
/// ```ignore
/// let q: Queue<(u32, i64)> = Queue::new(&world)?;
/// q.sender(world.next_processor()).send((me, 1))?;
/// world.sync()?;
/// for (tag, payload) in q.messages().iter() { /* ... */ }
/// ```
pub struct Queue<'w, M: Message> {
    world: &'w dyn World,
    core: Arc<QueueCore<M>>,
    id: RegistrationId,
}

impl<'w, M: Message> Queue<'w, M> {
    /// Creates and collectively registers a queue.
    pub fn new(world: &'w dyn World) -> CoreResult<Self> {
        let core = Arc::new(QueueCore {
            delivered: RwLock::new(Vec::new()),
        });
        let id = world.register_queue(core.clone())?;
        Ok(Self { world, core, id })
    }

    /// A sender bound to the queue's instance on processor `dst`.
    pub fn sender(&self, dst: usize) -> Sender<'_, 'w, M> {
        Sender { queue: self, dst }
    }

    /// The messages delivered to this processor at the last barrier.
    ///
    /// The guard must not be held across `sync`.
    pub fn messages(&self) -> impl Deref<Target = [M]> + '_ {
        RwLockReadGuard::map(self.core.delivered.read(), |msgs| msgs.as_slice())
    }

    /// Number of messages in the local delivery buffer.
    pub fn len(&self) -> usize {
        self.core.delivered.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The dense id this queue carries on every processor.
    pub fn registration_id(&self) -> RegistrationId {
        self.id
    }
}

impl<M: Message> Drop for Queue<'_, M> {
    fn drop(&mut self) {
        self.world.unregister_queue(self.id);
    }
}

/// A queue handle bound to one destination processor.
pub struct Sender<'q, 'w, M: Message> {
    queue: &'q Queue<'w, M>,
    dst: usize,
}

impl<M: Message> Sender<'_, '_, M> {
    /// Appends one message to the outbound stream for this destination.
    /// Messages from one sender are delivered in send order.
    pub fn send(&self, msg: M) -> CoreResult<()> {
        self.queue
            .world
            .send_message(self.dst, self.queue.id, encode_message(&msg))
    }

    /// Sends every message in turn, equivalent to repeated `send` calls.
    pub fn send_all(&self, msgs: impl IntoIterator<Item = M>) -> CoreResult<()> {
        for msg in msgs {
            self.send(msg)?;
        }
        Ok(())
    }
}

impl<M: ArrayMessage> Sender<'_, '_, M> {
    /// Sends one message whose array content is `elems`; only available
    /// when the message carries no trailing fields.
    pub fn send_many(&self, elems: &[M::Elem]) -> CoreResult<()>
    where
        M: ArrayMessage<Tail = ()>,
    {
        self.send_many_with(elems, ())
    }

    /// Sends one message whose array content is `elems` and whose
    /// remaining fields are set from `tail`.
    pub fn send_many_with(&self, elems: &[M::Elem], tail: M::Tail) -> CoreResult<()> {
        self.queue.world.send_array(
            self.dst,
            self.queue.id,
            elems.len(),
            elems.as_bytes().into(),
            encode_message(&tail),
        )
    }
}
