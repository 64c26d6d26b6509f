//! Spawning thread-backed collective runs.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use lockstep_core::{CoreError, CoreResult};

use crate::error::{ThreadError, ThreadResult};
use crate::state::{LogCallback, WorldState};
use crate::world::ThreadWorld;

/// Host-side entry point: spawns `P` OS threads, each running the same
/// program over its own [`ThreadWorld`].
///
/// ```no_run
/// use lockstep_core::World;
/// use lockstep_thread::ThreadEnvironment;
///
/// let env = ThreadEnvironment::new();
/// let ranks = env
///     .spawn(4, |world| Ok(world.processor_id()))
///     .expect("collective run");
/// assert_eq!(ranks, vec![0, 1, 2, 3]);
/// ```
#[derive(Default)]
pub struct ThreadEnvironment {
    log_callback: Option<LogCallback>,
}

impl ThreadEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of hardware threads available to back processors.
    pub fn available_processors(&self) -> usize {
        thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    }

    /// Intercepts `world.log(..)` output instead of printing to stdout.
    /// The callback observes `(processor, message)` pairs in flush order.
    pub fn set_log_callback(&mut self, callback: impl Fn(usize, &str) + Send + Sync + 'static) {
        self.log_callback = Some(Arc::new(callback));
    }

    /// Runs `program` on `processors` threads, one world each, and
    /// returns the per-processor results in rank order.
    ///
    /// A processor that returns an error or panics poisons the barrier,
    /// so the remaining processors fail out of their next collective
    /// operation instead of blocking forever; `spawn` then reports the
    /// failure. Log lines buffered after the last `sync` are flushed
    /// before returning.
    pub fn spawn<R, F>(&self, processors: usize, program: F) -> ThreadResult<Vec<R>>
    where
        F: Fn(&ThreadWorld) -> CoreResult<R> + Sync,
        R: Send,
    {
        if processors == 0 {
            return Err(ThreadError::EmptyWorld);
        }

        let state = Arc::new(WorldState::new(processors, self.log_callback.clone()));
        let program = &program;
        let results: Vec<ThreadResult<R>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..processors)
                .map(|rank| {
                    let state = Arc::clone(&state);
                    scope.spawn(move || {
                        let world = ThreadWorld::new(Arc::clone(&state), rank);
                        match panic::catch_unwind(AssertUnwindSafe(|| program(&world))) {
                            Ok(Ok(value)) => Ok(value),
                            Ok(Err(err)) => {
                                state.barrier.poison();
                                Err(ThreadError::Core(err))
                            }
                            Err(_) => {
                                state.barrier.poison();
                                Err(ThreadError::Panicked { processor: rank })
                            }
                        }
                    })
                })
                .collect();
            handles
                .into_iter()
                .enumerate()
                .map(|(rank, handle)| {
                    handle
                        .join()
                        .unwrap_or(Err(ThreadError::Panicked { processor: rank }))
                })
                .collect()
        });

        state.flush_logs(0);

        let mut values = Vec::with_capacity(processors);
        let mut aborted = false;
        let mut first_error = None;
        for result in results {
            match result {
                Ok(value) => values.push(value),
                Err(ThreadError::Core(CoreError::Aborted)) => aborted = true,
                Err(err) => {
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None if aborted => Err(ThreadError::Core(CoreError::Aborted)),
            None => Ok(values),
        }
    }
}
