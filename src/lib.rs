//! Single-assignment pledges with deferred continuations.
//!
//! A [`Pledge`] is a Promise/A+ style result container: it starts out
//! pending, settles exactly once (fulfilled with a value or rejected with
//! a reason) and is immutable forever after. Continuations registered
//! with [`Pledge::then`], [`Pledge::catch`] and [`Pledge::finally`] never
//! run synchronously; they are queued on an injected [`Scheduler`] and
//! run in FIFO order once the current call stack has unwound, so a caller
//! never observes a handler firing before its own synchronous code
//! finishes.
//!
//! # Examples
//!
//! ```
//! use pledge::{Pledge, Scheduler};
//!
//! let scheduler = Scheduler::new();
//! let pledge: Pledge<i32, String> = Pledge::new(&scheduler);
//! let doubled = pledge.then(|v| Ok(v * 2));
//!
//! pledge.resolve(21);
//! // The handler has not run yet; it only runs once the queue drains.
//! scheduler.run_until_idle();
//!
//! assert_eq!(doubled.settlement(), Some(Ok(42)));
//! ```

use thiserror::Error;

pub mod outcome;
pub mod pledge;
pub mod scheduler;

pub use crate::outcome::{IntoOutcome, Outcome};
pub use crate::pledge::{Pledge, PledgeState};
pub use crate::scheduler::Scheduler;

/// Duck-typed continuation capability.
///
/// Anything exposing a `then` operation that accepts two callables can
/// feed its eventual outcome into a pledge through
/// [`Pledge::resolve_outcome`] or [`Outcome::thenable`]. [`Pledge`]
/// implements it itself, so pledges adopt one another; foreign future
/// types implement it to interoperate.
pub trait Thenable<T, E> {
    /// Register the continuation pair. At most one of the two may ever
    /// be invoked; an adopting pledge ignores any call after the first
    /// either way.
    fn then(self: Box<Self>, on_fulfilled: Box<dyn FnOnce(T)>, on_rejected: Box<dyn FnOnce(E)>);
}

/// Failures raised by the pledge machinery itself, as opposed to
/// rejection reasons supplied by callers.
///
/// Methods that can produce one of these require `E: From<PledgeError>`
/// on the rejection channel. A `From<PledgeError> for String` impl is
/// provided for string-reason pledges.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PledgeError {
    /// A pledge was asked to adopt its own outcome.
    #[error("a pledge cannot adopt its own outcome")]
    SelfResolution,
    /// [`Pledge::all_dyn`] was handed something that is not an ordered
    /// sequence.
    #[error("Pledge::all expects an ordered sequence of outcomes")]
    NotASequence,
}

impl From<PledgeError> for String {
    fn from(err: PledgeError) -> Self {
        err.to_string()
    }
}
