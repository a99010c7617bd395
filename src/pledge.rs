//! The pledge state machine: one-shot settlement, deferred reactions
//! and the static combinators built on top.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::outcome::{IntoOutcome, Outcome};
use crate::scheduler::Scheduler;
use crate::{PledgeError, Thenable};

/// Observable lifecycle of a pledge. `Pending` transitions once, to
/// either `Fulfilled` or `Rejected`, and never again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PledgeState {
    Pending,
    Fulfilled,
    Rejected,
}

type Reaction<T, E> = Box<dyn FnOnce(Result<T, E>)>;

struct Core<T, E> {
    /// `None` while pending; written exactly once.
    outcome: Option<Result<T, E>>,
    /// Drained in insertion order the moment the pledge settles.
    reactions: Vec<Reaction<T, E>>,
    /// Wakers from callers polling this pledge as a [`Future`].
    wakers: Vec<Waker>,
}

/// Single-assignment asynchronous result.
///
/// Cloning yields another handle onto the same underlying pledge; any
/// handle may settle it, and all of them observe the same outcome.
/// Continuations are queued on the pledge's [`Scheduler`] and never run
/// synchronously, even when the pledge is already settled when they are
/// registered.
///
/// # Examples
///
/// ```
/// use pledge::{Pledge, Scheduler};
///
/// let scheduler = Scheduler::new();
/// let pledge: Pledge<&str, String> = Pledge::with_executor(&scheduler, |handle| {
///     handle.resolve("ready");
///     Ok(())
/// });
///
/// let shouted = pledge.then(|v| Ok(v.to_uppercase()));
/// scheduler.run_until_idle();
/// assert_eq!(shouted.settlement(), Some(Ok("READY".to_string())));
/// ```
pub struct Pledge<T, E> {
    core: Rc<RefCell<Core<T, E>>>,
    scheduler: Scheduler,
}

impl<T, E> Clone for Pledge<T, E> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Pledge<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pledge").field("state", &self.state()).finish()
    }
}

impl<T, E> Pledge<T, E> {
    /// Current point in the lifecycle. Instance `resolve`/`reject` move
    /// the state synchronously; only the handlers are deferred.
    pub fn state(&self) -> PledgeState {
        match self.core.borrow().outcome {
            None => PledgeState::Pending,
            Some(Ok(_)) => PledgeState::Fulfilled,
            Some(Err(_)) => PledgeState::Rejected,
        }
    }

    /// True when both handles refer to the same underlying pledge.
    pub fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.core, &other.core)
    }

    /// The scheduler this pledge queues its continuations on. Derived
    /// pledges inherit it.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

impl<T, E> Pledge<T, E>
where
    T: Clone + 'static,
    E: Clone + From<PledgeError> + 'static,
{
    /// Create a pending pledge bound to `scheduler`.
    pub fn new(scheduler: &Scheduler) -> Self {
        Self {
            core: Rc::new(RefCell::new(Core {
                outcome: None,
                reactions: Vec::new(),
                wakers: Vec::new(),
            })),
            scheduler: scheduler.clone(),
        }
    }

    /// Create a pledge and hand a settling handle to `executor`, which
    /// runs synchronously. The handle's `resolve`/`reject` methods are
    /// the bound settling pair; an `Err` returned by the executor
    /// rejects the pledge before any reaction has run, unless the
    /// executor already settled it.
    pub fn with_executor<F>(scheduler: &Scheduler, executor: F) -> Self
    where
        F: FnOnce(Pledge<T, E>) -> Result<(), E>,
    {
        let pledge = Self::new(scheduler);
        if let Err(reason) = executor(pledge.clone()) {
            pledge.reject(reason);
        }
        pledge
    }

    /// Pledge that fulfills with `value` on the next scheduler turn.
    ///
    /// The settlement itself is deferred: the returned pledge still
    /// reads as pending until the scheduler runs.
    ///
    /// # Examples
    ///
    /// ```
    /// use pledge::{Pledge, PledgeState, Scheduler};
    ///
    /// let scheduler = Scheduler::new();
    /// let pledge: Pledge<&str, String> = Pledge::resolved(&scheduler, "some_value");
    /// assert_eq!(pledge.state(), PledgeState::Pending);
    ///
    /// scheduler.run_until_idle();
    /// assert_eq!(pledge.state(), PledgeState::Fulfilled);
    /// ```
    pub fn resolved(scheduler: &Scheduler, value: T) -> Self {
        let pledge = Self::new(scheduler);
        let target = pledge.clone();
        scheduler.defer(move || target.resolve(value));
        pledge
    }

    /// Pledge that rejects with `reason` on the next scheduler turn.
    /// The reason is used verbatim, never adopted.
    pub fn rejected(scheduler: &Scheduler, reason: E) -> Self {
        let pledge = Self::new(scheduler);
        let target = pledge.clone();
        scheduler.defer(move || target.reject(reason));
        pledge
    }

    /// Lift an outcome into a pledge. An [`Outcome::Pledge`] comes back
    /// as-is, identity preserved, never rewrapped; values and errors
    /// become [`Pledge::resolved`] / [`Pledge::rejected`]; a thenable is
    /// adopted by a fresh pledge.
    pub fn of(scheduler: &Scheduler, outcome: Outcome<T, E>) -> Self {
        match outcome {
            Outcome::Pledge(pledge) => pledge,
            Outcome::Value(value) => Self::resolved(scheduler, value),
            Outcome::Error(reason) => Self::rejected(scheduler, reason),
            Outcome::Thenable(thenable) => {
                let pledge = Self::new(scheduler);
                pledge.adopt(thenable);
                pledge
            }
        }
    }

    /// Fulfill with a plain value. No-op once settled.
    pub fn resolve(&self, value: T) {
        self.settle(Ok(value));
    }

    /// Reject with `reason`. No-op once settled.
    pub fn reject(&self, reason: E) {
        self.settle(Err(reason));
    }

    /// Settle from a handler outcome: values fulfill, errors reject,
    /// pledges and thenables are adopted rather than used as payloads.
    /// Asking a pledge to adopt itself rejects it with
    /// [`PledgeError::SelfResolution`].
    pub fn resolve_outcome(&self, outcome: Outcome<T, E>) {
        match outcome {
            Outcome::Value(value) => self.settle(Ok(value)),
            Outcome::Error(reason) => self.settle(Err(reason)),
            Outcome::Pledge(inner) => {
                if self.same(&inner) {
                    self.settle(Err(PledgeError::SelfResolution.into()));
                } else {
                    let target = self.clone();
                    inner.subscribe(move |settled| target.settle(settled));
                }
            }
            Outcome::Thenable(thenable) => self.adopt(thenable),
        }
    }

    fn adopt(&self, thenable: Box<dyn Thenable<T, E>>) {
        // Whichever continuation fires first wins; settle() ignores the
        // other one.
        let fulfill = self.clone();
        let fail = self.clone();
        thenable.then(
            Box::new(move |value| fulfill.resolve(value)),
            Box::new(move |reason| fail.reject(reason)),
        );
    }

    /// Register a fulfillment continuation and return the derived
    /// pledge fed by the handler's outcome. A rejection skips the
    /// handler and passes through to the derived pledge unchanged.
    ///
    /// The handler never runs synchronously; its return value converts
    /// through [`IntoOutcome`], so returning `Err` rejects the derived
    /// pledge and returning a pledge defers it until that one settles.
    ///
    /// # Examples
    ///
    /// ```
    /// use pledge::{Pledge, Scheduler};
    ///
    /// let scheduler = Scheduler::new();
    /// let pledge: Pledge<i32, String> = Pledge::resolved(&scheduler, 99);
    /// let derived = pledge.then(|v| Ok(v + 1));
    ///
    /// scheduler.run_until_idle();
    /// assert_eq!(derived.settlement(), Some(Ok(100)));
    /// ```
    pub fn then<U, R, F>(&self, on_fulfilled: F) -> Pledge<U, E>
    where
        U: Clone + 'static,
        R: IntoOutcome<U, E>,
        F: FnOnce(T) -> R + 'static,
    {
        let derived = Pledge::new(&self.scheduler);
        let target = derived.clone();
        self.subscribe(move |settled| match settled {
            Ok(value) => target.resolve_outcome(on_fulfilled(value).into_outcome()),
            Err(reason) => target.reject(reason),
        });
        derived
    }

    /// The full two-handler registration: both handlers feed the same
    /// derived pledge.
    pub fn then_else<U, R, S, F, G>(&self, on_fulfilled: F, on_rejected: G) -> Pledge<U, E>
    where
        U: Clone + 'static,
        R: IntoOutcome<U, E>,
        S: IntoOutcome<U, E>,
        F: FnOnce(T) -> R + 'static,
        G: FnOnce(E) -> S + 'static,
    {
        let derived = Pledge::new(&self.scheduler);
        let target = derived.clone();
        self.subscribe(move |settled| match settled {
            Ok(value) => target.resolve_outcome(on_fulfilled(value).into_outcome()),
            Err(reason) => target.resolve_outcome(on_rejected(reason).into_outcome()),
        });
        derived
    }

    /// Register a rejection continuation; fulfillment passes through
    /// unchanged. This is [`Pledge::then_else`] with the fulfillment
    /// side left out, so a handler returning `Ok` recovers the chain.
    pub fn catch<R, G>(&self, on_rejected: G) -> Pledge<T, E>
    where
        R: IntoOutcome<T, E>,
        G: FnOnce(E) -> R + 'static,
    {
        let derived = Pledge::new(&self.scheduler);
        let target = derived.clone();
        self.subscribe(move |settled| match settled {
            Ok(value) => target.resolve(value),
            Err(reason) => target.resolve_outcome(on_rejected(reason).into_outcome()),
        });
        derived
    }

    /// Run `on_finally` once the pledge settles either way.
    ///
    /// The handler takes no arguments and its value is discarded; the
    /// original outcome flows through to the derived pledge. Returning
    /// a pledge delays the pass-through until it settles. A handler
    /// `Err`, or a returned pledge that rejects, supersedes the
    /// original outcome and rejects the derived pledge.
    pub fn finally<U, R, F>(&self, on_finally: F) -> Pledge<T, E>
    where
        U: Clone + 'static,
        R: IntoOutcome<U, E>,
        F: FnOnce() -> R + 'static,
    {
        let derived = Pledge::new(&self.scheduler);
        let target = derived.clone();
        let scheduler = self.scheduler.clone();
        self.subscribe(move |settled| match on_finally().into_outcome() {
            Outcome::Value(_) => target.settle(settled),
            Outcome::Error(reason) => target.reject(reason),
            outcome => {
                let gate = Pledge::of(&scheduler, outcome);
                gate.subscribe(move |gated| match gated {
                    Ok(_) => target.settle(settled),
                    Err(reason) => target.reject(reason),
                });
            }
        });
        derived
    }

    /// Error-first terminal sink. `Some(callback)` receives the
    /// settlement as a `Result` via the scheduler like any other
    /// continuation; `None` is a no-op. No derived pledge is created.
    pub fn handle_callback<F>(&self, callback: Option<F>)
    where
        F: FnOnce(Result<T, E>) + 'static,
    {
        if let Some(callback) = callback {
            self.subscribe(callback);
        }
    }

    /// Clone of the settled outcome, `None` while pending.
    pub fn settlement(&self) -> Option<Result<T, E>> {
        self.core.borrow().outcome.clone()
    }

    /// Combine outcomes into one pledge that fulfills with every value
    /// in input order, or rejects with the first rejection reason
    /// observed. An empty input fulfills with an empty vector. Later
    /// settlements after a rejection are observed but discarded.
    ///
    /// # Examples
    ///
    /// ```
    /// use pledge::{Outcome, Pledge, Scheduler};
    ///
    /// let scheduler = Scheduler::new();
    /// let all: Pledge<Vec<&str>, String> = Pledge::all(
    ///     &scheduler,
    ///     vec![
    ///         Outcome::value("hello"),
    ///         Outcome::pledge(Pledge::resolved(&scheduler, "world")),
    ///     ],
    /// );
    ///
    /// scheduler.run_until_idle();
    /// assert_eq!(all.settlement(), Some(Ok(vec!["hello", "world"])));
    /// ```
    pub fn all<I>(scheduler: &Scheduler, outcomes: I) -> Pledge<Vec<T>, E>
    where
        I: IntoIterator<Item = Outcome<T, E>>,
    {
        let elements: Vec<Pledge<T, E>> = outcomes
            .into_iter()
            .map(|outcome| Pledge::of(scheduler, outcome))
            .collect();
        if elements.is_empty() {
            return Pledge::resolved(scheduler, Vec::new());
        }

        let aggregate = Pledge::new(scheduler);
        let slots: Rc<RefCell<Vec<Option<T>>>> =
            Rc::new(RefCell::new(vec![None; elements.len()]));
        for (index, element) in elements.into_iter().enumerate() {
            let slots = slots.clone();
            let aggregate = aggregate.clone();
            element.subscribe(move |settled| match settled {
                Ok(value) => {
                    let mut filled = slots.borrow_mut();
                    filled[index] = Some(value);
                    if filled.iter().all(Option::is_some) {
                        let values: Option<Vec<T>> =
                            filled.iter_mut().map(Option::take).collect();
                        drop(filled);
                        if let Some(values) = values {
                            aggregate.resolve(values);
                        }
                    }
                }
                // First rejection wins; the aggregate ignores the rest.
                Err(reason) => aggregate.reject(reason),
            });
        }
        aggregate
    }

    /// Loosely-typed entry to [`Pledge::all`] for dynamic callers.
    ///
    /// The boxed value is probed for one of the sequence shapes —
    /// outcomes, pledges or plain values — and anything else (unit,
    /// `None`, numbers, booleans, plain objects) rejects with
    /// [`PledgeError::NotASequence`]. A non-sequence is never treated
    /// as an empty or single-element sequence.
    pub fn all_dyn(scheduler: &Scheduler, input: Box<dyn Any>) -> Pledge<Vec<T>, E> {
        let input = match input.downcast::<Vec<Outcome<T, E>>>() {
            Ok(outcomes) => return Self::all(scheduler, *outcomes),
            Err(other) => other,
        };
        let input = match input.downcast::<Vec<Pledge<T, E>>>() {
            Ok(pledges) => {
                return Self::all(scheduler, pledges.into_iter().map(Outcome::Pledge))
            }
            Err(other) => other,
        };
        match input.downcast::<Vec<T>>() {
            Ok(values) => Self::all(scheduler, values.into_iter().map(Outcome::Value)),
            Err(_) => Pledge::rejected(scheduler, PledgeError::NotASequence.into()),
        }
    }

    /// Register a raw reaction. Runs via the scheduler exactly once
    /// with the settled outcome, immediately deferred when the pledge
    /// already settled.
    fn subscribe(&self, reaction: impl FnOnce(Result<T, E>) + 'static) {
        let settled = self.core.borrow().outcome.clone();
        match settled {
            Some(outcome) => self.scheduler.defer(move || reaction(outcome)),
            None => self.core.borrow_mut().reactions.push(Box::new(reaction)),
        }
    }

    /// One-shot settlement: the first write wins, every later call is
    /// ignored. Snapshots and clears the reaction list before
    /// dispatching, so reactions registered while draining land in a
    /// fresh list.
    fn settle(&self, result: Result<T, E>) {
        let reactions;
        let wakers;
        {
            let mut core = self.core.borrow_mut();
            if core.outcome.is_some() {
                return;
            }
            core.outcome = Some(result.clone());
            reactions = std::mem::take(&mut core.reactions);
            wakers = std::mem::take(&mut core.wakers);
        }
        tracing::trace!(reactions = reactions.len(), "pledge settled");
        for reaction in reactions {
            let settled = result.clone();
            self.scheduler.defer(move || reaction(settled));
        }
        for waker in wakers {
            waker.wake();
        }
    }
}

impl<T, E> Thenable<T, E> for Pledge<T, E>
where
    T: Clone + 'static,
    E: Clone + From<PledgeError> + 'static,
{
    fn then(self: Box<Self>, on_fulfilled: Box<dyn FnOnce(T)>, on_rejected: Box<dyn FnOnce(E)>) {
        self.subscribe(move |settled| match settled {
            Ok(value) => on_fulfilled(value),
            Err(reason) => on_rejected(reason),
        });
    }
}

impl<T, E> Future for Pledge<T, E>
where
    T: Clone + 'static,
    E: Clone + From<PledgeError> + 'static,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut core = self.core.borrow_mut();
        match &core.outcome {
            Some(settled) => Poll::Ready(settled.clone()),
            None => {
                // Every poller's waker is kept; settling wakes them all.
                core.wakers.push(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}
