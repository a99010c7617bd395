//! What a continuation handler (or an executor) produced, and the
//! conversion applied to every handler return value.

use crate::pledge::Pledge;
use crate::Thenable;

/// The result of running a handler: a plain value, a failure, or
/// something that settles later and should be adopted.
///
/// Feeding an `Outcome` to [`Pledge::resolve_outcome`] fulfills on
/// `Value`, rejects on `Error` and adopts the eventual outcome of a
/// `Pledge` or `Thenable` instead of treating it as a payload.
pub enum Outcome<T, E> {
    /// Fulfill with the value as-is.
    Value(T),
    /// Reject with the reason as-is.
    Error(E),
    /// Adopt the eventual outcome of another pledge.
    Pledge(Pledge<T, E>),
    /// Adopt the eventual outcome of a foreign thenable.
    Thenable(Box<dyn Thenable<T, E>>),
}

impl<T, E> Outcome<T, E> {
    pub fn value(value: T) -> Self {
        Outcome::Value(value)
    }

    pub fn error(reason: E) -> Self {
        Outcome::Error(reason)
    }

    pub fn pledge(pledge: Pledge<T, E>) -> Self {
        Outcome::Pledge(pledge)
    }

    pub fn thenable(thenable: impl Thenable<T, E> + 'static) -> Self {
        Outcome::Thenable(Box::new(thenable))
    }
}

/// Conversion applied to every handler and executor return value.
///
/// Implemented for `Result<T, E>` (the everyday case: `Ok` fulfills,
/// `Err` rejects), for [`Pledge`] (returning a pledge from a handler
/// defers the derived pledge until it settles) and for [`Outcome`]
/// itself.
pub trait IntoOutcome<T, E> {
    fn into_outcome(self) -> Outcome<T, E>;
}

impl<T, E> IntoOutcome<T, E> for Outcome<T, E> {
    fn into_outcome(self) -> Outcome<T, E> {
        self
    }
}

impl<T, E> IntoOutcome<T, E> for Result<T, E> {
    fn into_outcome(self) -> Outcome<T, E> {
        match self {
            Ok(value) => Outcome::Value(value),
            Err(reason) => Outcome::Error(reason),
        }
    }
}

impl<T, E> IntoOutcome<T, E> for Pledge<T, E> {
    fn into_outcome(self) -> Outcome<T, E> {
        Outcome::Pledge(self)
    }
}
