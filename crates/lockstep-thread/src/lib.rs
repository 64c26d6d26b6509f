//! Shared-memory thread backend for the `lockstep` BSP runtime.
//!
//! [`ThreadEnvironment::spawn`] runs the same program on `P` OS threads,
//! each holding its own [`ThreadWorld`] over one shared world state. The
//! barrier is a futex-parked sense-reversing barrier with phase tags, so
//! asymmetric collective programs fail with a diagnostic instead of
//! deadlocking.

mod barrier;
mod environment;
mod error;
mod state;
mod world;

pub use environment::ThreadEnvironment;
pub use error::{ThreadError, ThreadResult};
pub use world::ThreadWorld;

// Everything a superstep program needs, re-exported for convenience.
pub use lockstep_core::{
    Coarray, CoreError, CoreResult, Future, FutureSlice, Queue, Var, World,
};
