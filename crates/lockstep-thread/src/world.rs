//! The per-thread world over the shared state.

use std::cell::RefCell;
use std::sync::Arc;

use smallvec::SmallVec;

use lockstep_core::{
    CoreError, CoreResult, GetTarget, QueueSink, RegistrationId, VarTarget, World,
};

use crate::state::{
    PutRecord, QueuePayload, SendRecord, WorldState, TAG_BARRIER, TAG_SYNC_ENTER,
    TAG_SYNC_EXCHANGE, TAG_SYNC_EXIT,
};

/// One scheduled remote read, resolved during the next barrier.
struct GetTask {
    src: usize,
    var_id: RegistrationId,
    offset: usize,
    len: usize,
    target: Arc<dyn GetTarget>,
}

/// A processor's world in a thread-backed collective run.
///
/// Each spawned thread owns exactly one `ThreadWorld`; between barriers
/// it must not be shared with other threads.
pub struct ThreadWorld {
    state: Arc<WorldState>,
    rank: usize,
    get_tasks: RefCell<SmallVec<[GetTask; 8]>>,
}

impl ThreadWorld {
    pub(crate) fn new(state: Arc<WorldState>, rank: usize) -> Self {
        Self {
            state,
            rank,
            get_tasks: RefCell::new(SmallVec::new()),
        }
    }

    fn check_processor(&self, processor: usize) -> CoreResult<()> {
        if processor >= self.state.processors() {
            return Err(CoreError::InvalidProcessor {
                processor,
                count: self.state.processors(),
            });
        }
        Ok(())
    }

    /// The four-phase barrier. Any failure between the waits poisons the
    /// collective run before surfacing, so no processor is left blocked.
    fn sync_phases(&self) -> CoreResult<()> {
        // Delivery buffers of the previous superstep expire now.
        self.state.clear_local_queues(self.rank);
        self.state.wait(self.rank, TAG_SYNC_ENTER)?;

        // Gets snapshot their sources while no put has landed anywhere.
        self.serve_gets();
        self.state.wait(self.rank, TAG_SYNC_EXCHANGE)?;

        self.state.apply_incoming_puts(self.rank);
        self.state.deliver_incoming_sends(self.rank)?;
        self.state.flush_logs(self.rank);
        self.state.wait(self.rank, TAG_SYNC_EXIT)?;
        Ok(())
    }

    fn serve_gets(&self) {
        let tasks = self.get_tasks.take();
        for task in tasks {
            let Some(target) = self.state.var_target(task.var_id, task.src) else {
                tracing::warn!(var_id = task.var_id, "get from an unregistered variable dropped");
                continue;
            };
            let mut bytes = vec![0u8; task.len];
            target.copy_out(task.offset, &mut bytes);
            task.target.fulfil(&bytes);
        }
    }
}

impl World for ThreadWorld {
    fn active_processors(&self) -> usize {
        self.state.processors()
    }

    fn processor_id(&self) -> usize {
        self.rank
    }

    fn sync(&self) -> CoreResult<()> {
        match self.sync_phases() {
            Err(err) if !matches!(err, CoreError::Aborted) => {
                self.state.barrier.poison();
                Err(err)
            }
            other => other,
        }
    }

    fn barrier(&self) -> CoreResult<()> {
        self.state.wait(self.rank, TAG_BARRIER)
    }

    fn abort(&self) {
        self.state.barrier.poison();
    }

    fn log(&self, message: String) {
        self.state.log(self.rank, message);
    }

    fn register_variable(&self, target: Arc<dyn VarTarget>) -> CoreResult<RegistrationId> {
        self.state.register_var(self.rank, target)
    }

    fn unregister_variable(&self, id: RegistrationId) {
        self.state.unregister_var(self.rank, id);
    }

    fn register_queue(&self, sink: Arc<dyn QueueSink>) -> CoreResult<RegistrationId> {
        self.state.register_queue(self.rank, sink)
    }

    fn unregister_queue(&self, id: RegistrationId) {
        self.state.unregister_queue(self.rank, id);
    }

    fn schedule_put(
        &self,
        dst: usize,
        var_id: RegistrationId,
        offset: usize,
        bytes: &[u8],
    ) -> CoreResult<()> {
        self.check_processor(dst)?;
        let target = self
            .state
            .var_target(var_id, dst)
            .ok_or(CoreError::UnknownVariable(var_id))?;
        check_window(offset, bytes.len(), target.size_bytes())?;
        self.state.stage_put(
            dst,
            self.rank,
            PutRecord {
                var_id,
                offset,
                bytes: bytes.into(),
            },
        );
        Ok(())
    }

    fn schedule_get(
        &self,
        src: usize,
        var_id: RegistrationId,
        offset: usize,
        len: usize,
        target: Arc<dyn GetTarget>,
    ) -> CoreResult<()> {
        self.check_processor(src)?;
        let remote = self
            .state
            .var_target(var_id, src)
            .ok_or(CoreError::UnknownVariable(var_id))?;
        check_window(offset, len, remote.size_bytes())?;
        self.get_tasks.borrow_mut().push(GetTask {
            src,
            var_id,
            offset,
            len,
            target,
        });
        Ok(())
    }

    fn send_message(
        &self,
        dst: usize,
        queue_id: RegistrationId,
        payload: Box<[u8]>,
    ) -> CoreResult<()> {
        self.check_processor(dst)?;
        if self.state.queue_sink(queue_id, dst).is_none() {
            return Err(CoreError::UnknownQueue(queue_id));
        }
        self.state.stage_send(
            dst,
            self.rank,
            SendRecord {
                queue_id,
                payload: QueuePayload::Message(payload),
            },
        );
        Ok(())
    }

    fn send_array(
        &self,
        dst: usize,
        queue_id: RegistrationId,
        count: usize,
        elems: Box<[u8]>,
        tail: Box<[u8]>,
    ) -> CoreResult<()> {
        self.check_processor(dst)?;
        if self.state.queue_sink(queue_id, dst).is_none() {
            return Err(CoreError::UnknownQueue(queue_id));
        }
        self.state.stage_send(
            dst,
            self.rank,
            SendRecord {
                queue_id,
                payload: QueuePayload::Array { count, elems, tail },
            },
        );
        Ok(())
    }
}

fn check_window(offset: usize, len: usize, extent: usize) -> CoreResult<()> {
    let oob = CoreError::OutOfBounds {
        offset,
        len,
        extent,
    };
    match offset.checked_add(len) {
        Some(end) if end <= extent => Ok(()),
        _ => Err(oob),
    }
}
