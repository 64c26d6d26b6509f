//! Portable core of the `lockstep` bulk-synchronous parallel runtime.
//!
//! A program spawns a fixed set of processors that alternate between
//! local computation and barrier-synchronised communication. This crate
//! defines the backend contract and the user-facing primitives:
//! * [`World`] – the per-processor façade every backend implements:
//!   barriers, one-sided transfers, message sends and registration.
//! * [`Var`] / [`Future`] – remotely addressable values and the slots
//!   that receive `get` results after the next barrier.
//! * [`Coarray`] – array-shaped variables addressed by
//!   `(processor, index)` or half-open slice.
//! * [`Queue`] – typed mailboxes drained locally after each barrier.
//! * [`serialize`] – the flat byte format carrying payloads between
//!   processors of one world.
//!
//! Backends live in sibling crates; this crate holds no threads and no
//! global state.

mod coarray;
mod error;
mod future;
mod message;
mod queue;
pub mod serialize;
mod var;
mod world;

pub use coarray::{Coarray, CoarrayImage, ElemImage, SliceImage};
pub use error::{CoreError, CoreResult};
pub use future::{Future, FutureSlice};
pub use message::{ArrayMessage, Message};
pub use queue::{Queue, Sender};
pub use serialize::Flat;
pub use var::{Var, VarImage};
pub use world::{GetTarget, QueueSink, RegistrationId, VarTarget, World};
