//! State shared by every processor of one spawned world.
//!
//! There is a single `WorldState` per spawn; each thread holds its own
//! [`ThreadWorld`](crate::ThreadWorld) over it. Registration tables are
//! dense rows of per-processor slots, so the id of a collectively created
//! object is its row index everywhere. Outbound communication is staged
//! per `(destination, source)` pair, which keeps sends uncontended before
//! the barrier and makes delivery order source-rank major.

use std::collections::BTreeMap;
use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;

use lockstep_core::{CoreError, CoreResult, QueueSink, RegistrationId, VarTarget};

use crate::barrier::{BarrierWait, SenseBarrier};

// Phase tags published at every barrier wait; a mismatch means the
// program issued asymmetric collective operations.
pub(crate) const TAG_REGISTER_VAR: u32 = 1;
pub(crate) const TAG_REGISTER_QUEUE: u32 = 2;
pub(crate) const TAG_REGISTER_CONFIRM: u32 = 3;
pub(crate) const TAG_SYNC_ENTER: u32 = 4;
pub(crate) const TAG_SYNC_EXCHANGE: u32 = 5;
pub(crate) const TAG_SYNC_EXIT: u32 = 6;
pub(crate) const TAG_BARRIER: u32 = 7;

pub(crate) type LogCallback = Arc<dyn Fn(usize, &str) + Send + Sync>;

/// One staged remote write, captured at the `put` call site.
pub(crate) struct PutRecord {
    pub(crate) var_id: RegistrationId,
    pub(crate) offset: usize,
    pub(crate) bytes: Box<[u8]>,
}

/// One staged queue message in its wire form.
pub(crate) enum QueuePayload {
    Message(Box<[u8]>),
    Array {
        count: usize,
        elems: Box<[u8]>,
        tail: Box<[u8]>,
    },
}

impl QueuePayload {
    fn wire_len(&self) -> usize {
        match self {
            QueuePayload::Message(bytes) => bytes.len(),
            QueuePayload::Array { elems, tail, .. } => elems.len() + tail.len(),
        }
    }
}

pub(crate) struct SendRecord {
    pub(crate) queue_id: RegistrationId,
    pub(crate) payload: QueuePayload,
}

pub(crate) struct WorldState {
    processors: usize,
    pub(crate) barrier: SenseBarrier,
    vars: Mutex<Vec<Vec<Option<Arc<dyn VarTarget>>>>>,
    queues: Mutex<Vec<Vec<Option<Arc<dyn QueueSink>>>>>,
    staged_puts: Vec<Vec<Mutex<Vec<PutRecord>>>>,
    staged_sends: Vec<Vec<Mutex<Vec<SendRecord>>>>,
    announced_ids: Mutex<Vec<Option<RegistrationId>>>,
    logs: Mutex<Vec<(usize, String)>>,
    log_callback: Option<LogCallback>,
}

impl WorldState {
    pub(crate) fn new(processors: usize, log_callback: Option<LogCallback>) -> Self {
        Self {
            processors,
            barrier: SenseBarrier::new(processors),
            vars: Mutex::new(Vec::new()),
            queues: Mutex::new(Vec::new()),
            staged_puts: staging_grid(processors),
            staged_sends: staging_grid(processors),
            announced_ids: Mutex::new(vec![None; processors]),
            logs: Mutex::new(Vec::new()),
            log_callback,
        }
    }

    pub(crate) fn processors(&self) -> usize {
        self.processors
    }

    /// Maps a poisoned barrier onto the collective failure error.
    pub(crate) fn wait(&self, rank: usize, tag: u32) -> CoreResult<()> {
        match self.barrier.wait(rank, tag) {
            BarrierWait::Poisoned => Err(CoreError::Aborted),
            _ => Ok(()),
        }
    }

    // ---- registration ----------------------------------------------------

    pub(crate) fn register_var(
        &self,
        rank: usize,
        target: Arc<dyn VarTarget>,
    ) -> CoreResult<RegistrationId> {
        let id = claim_slot(&mut *self.vars.lock(), self.processors, rank, target);
        self.confirm_collective_id(rank, id, TAG_REGISTER_VAR)
    }

    pub(crate) fn unregister_var(&self, rank: usize, id: RegistrationId) {
        release_slot(&mut *self.vars.lock(), rank, id, "variable");
    }

    pub(crate) fn register_queue(
        &self,
        rank: usize,
        sink: Arc<dyn QueueSink>,
    ) -> CoreResult<RegistrationId> {
        let id = claim_slot(&mut *self.queues.lock(), self.processors, rank, sink);
        self.confirm_collective_id(rank, id, TAG_REGISTER_QUEUE)
    }

    pub(crate) fn unregister_queue(&self, rank: usize, id: RegistrationId) {
        release_slot(&mut *self.queues.lock(), rank, id, "queue");
    }

    /// Collective id agreement: every rank publishes the id it allocated
    /// and checks it against rank 0's. A divergence means the program
    /// created objects in different orders, which poisons the run.
    fn confirm_collective_id(
        &self,
        rank: usize,
        id: RegistrationId,
        tag: u32,
    ) -> CoreResult<RegistrationId> {
        self.announced_ids.lock()[rank] = Some(id);
        self.wait(rank, tag)?;

        let expected = self.announced_ids.lock()[0];
        let outcome = match expected {
            Some(expected) if expected != id => {
                tracing::error!(rank, id, expected, "collective registration mismatch");
                self.barrier.poison();
                Err(CoreError::RegistrationMismatch {
                    processor: rank,
                    got: id,
                    expected,
                })
            }
            _ => Ok(id),
        };

        // Nobody may start the next registration before every rank has
        // read this round's announcement.
        let confirm = self.wait(rank, TAG_REGISTER_CONFIRM);
        match outcome {
            Err(err) => Err(err),
            Ok(id) => {
                confirm?;
                Ok(id)
            }
        }
    }

    pub(crate) fn var_target(
        &self,
        id: RegistrationId,
        rank: usize,
    ) -> Option<Arc<dyn VarTarget>> {
        self.vars.lock().get(id)?.get(rank)?.clone()
    }

    pub(crate) fn queue_sink(
        &self,
        id: RegistrationId,
        rank: usize,
    ) -> Option<Arc<dyn QueueSink>> {
        self.queues.lock().get(id)?.get(rank)?.clone()
    }

    // ---- staging ---------------------------------------------------------

    pub(crate) fn stage_put(&self, dst: usize, src: usize, record: PutRecord) {
        self.staged_puts[dst][src].lock().push(record);
    }

    pub(crate) fn stage_send(&self, dst: usize, src: usize, record: SendRecord) {
        self.staged_sends[dst][src].lock().push(record);
    }

    // ---- barrier-time resolution -----------------------------------------

    /// Empties the delivery buffers of every queue this rank registered.
    pub(crate) fn clear_local_queues(&self, rank: usize) {
        for sink in self.queue_column(rank).into_iter().flatten() {
            sink.clear();
        }
    }

    /// Applies the puts staged for this rank, source rank by source rank,
    /// preserving per-source issue order.
    pub(crate) fn apply_incoming_puts(&self, rank: usize) {
        let column = self.var_column(rank);
        #[cfg(debug_assertions)]
        let mut written: BTreeMap<RegistrationId, Vec<(usize, std::ops::Range<usize>)>> =
            BTreeMap::new();

        for src in 0..self.processors {
            let records = mem::take(&mut *self.staged_puts[rank][src].lock());
            for record in records {
                let Some(Some(target)) = column.get(record.var_id) else {
                    tracing::warn!(
                        var_id = record.var_id,
                        "put for an unregistered variable dropped"
                    );
                    continue;
                };
                #[cfg(debug_assertions)]
                reject_cross_source_overlap(&mut written, src, &record);
                target.apply(record.offset, &record.bytes);
            }
        }
    }

    /// Delivers the queue messages staged for this rank: per queue, the
    /// total payload size is announced first, then the messages land in
    /// source-rank-major send order.
    pub(crate) fn deliver_incoming_sends(&self, rank: usize) -> CoreResult<()> {
        let column = self.queue_column(rank);
        let mut buckets: BTreeMap<RegistrationId, Vec<QueuePayload>> = BTreeMap::new();
        for src in 0..self.processors {
            let records = mem::take(&mut *self.staged_sends[rank][src].lock());
            for record in records {
                buckets.entry(record.queue_id).or_default().push(record.payload);
            }
        }

        for (queue_id, payloads) in buckets {
            let Some(Some(sink)) = column.get(queue_id) else {
                tracing::warn!(queue_id, "messages for an unregistered queue dropped");
                continue;
            };
            let total = payloads.iter().map(QueuePayload::wire_len).sum();
            sink.reserve(total);
            for payload in payloads {
                match payload {
                    QueuePayload::Message(bytes) => sink.push_message(&bytes)?,
                    QueuePayload::Array { count, elems, tail } => {
                        sink.push_array(count, &elems, &tail)?
                    }
                }
            }
        }
        Ok(())
    }

    // ---- logging ---------------------------------------------------------

    pub(crate) fn log(&self, rank: usize, message: String) {
        self.logs.lock().push((rank, message));
    }

    /// Rank 0 flushes the buffered logs, stable-sorted by rank so each
    /// processor's messages stay in issue order.
    pub(crate) fn flush_logs(&self, rank: usize) {
        if rank != 0 {
            return;
        }
        let mut logs = self.logs.lock();
        logs.sort_by_key(|(processor, _)| *processor);
        for (processor, message) in logs.drain(..) {
            match &self.log_callback {
                Some(callback) => callback(processor, &message),
                None => println!("p{processor}: {message}"),
            }
        }
    }

    fn var_column(&self, rank: usize) -> Vec<Option<Arc<dyn VarTarget>>> {
        self.vars
            .lock()
            .iter()
            .map(|row| row[rank].clone())
            .collect()
    }

    fn queue_column(&self, rank: usize) -> Vec<Option<Arc<dyn QueueSink>>> {
        self.queues
            .lock()
            .iter()
            .map(|row| row[rank].clone())
            .collect()
    }
}

/// One `[destination][source]` grid of staging lists.
fn staging_grid<T>(processors: usize) -> Vec<Vec<Mutex<Vec<T>>>> {
    (0..processors)
        .map(|_| (0..processors).map(|_| Mutex::new(Vec::new())).collect())
        .collect()
}

/// Claims the lowest row with a free slot for `rank`, growing the table
/// when every row is taken. Collective creation order therefore yields
/// the same row index on every rank.
fn claim_slot<T: Clone>(
    rows: &mut Vec<Vec<Option<T>>>,
    processors: usize,
    rank: usize,
    entry: T,
) -> RegistrationId {
    for (id, row) in rows.iter_mut().enumerate() {
        if row[rank].is_none() {
            row[rank] = Some(entry);
            return id;
        }
    }
    let mut row = vec![None; processors];
    row[rank] = Some(entry);
    rows.push(row);
    rows.len() - 1
}

fn release_slot<T>(rows: &mut [Vec<Option<T>>], rank: usize, id: RegistrationId, kind: &str) {
    match rows.get_mut(id) {
        Some(row) => row[rank] = None,
        None => tracing::warn!(id, "unregistering an unknown {kind}"),
    }
}

/// Puts from different sources to overlapping windows of one variable
/// are undefined; fail fast while debug assertions are on.
#[cfg(debug_assertions)]
fn reject_cross_source_overlap(
    written: &mut BTreeMap<RegistrationId, Vec<(usize, std::ops::Range<usize>)>>,
    src: usize,
    record: &PutRecord,
) {
    let range = record.offset..record.offset + record.bytes.len();
    if range.is_empty() {
        return;
    }
    let ranges = written.entry(record.var_id).or_default();
    for (other, prior) in ranges.iter() {
        if *other != src && range.start < prior.end && prior.start < range.end {
            panic!(
                "overlapping puts from processors {other} and {src} to variable {}",
                record.var_id
            );
        }
    }
    ranges.push((src, range));
}
