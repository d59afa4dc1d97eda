//! Singleton Activation Guard
//!
//! Ensures the engine module is fetched, decompressed, and instantiated
//! exactly once per hosting context, no matter how many callers request
//! activation or how many times.
//!
//! The guard is an explicit state machine behind one `RefCell`:
//!
//! ```text
//! Uninitialized --ensure_active--> Activating --complete(Ok)--> Active
//!                                      |
//!                                      +------complete(Err)--> Uninitialized
//! ```
//!
//! The `Uninitialized -> Activating` transition and the decision to
//! initiate are a single step: `ensure_active` returns [`Ensure::Start`]
//! to exactly one caller, which must run the activation and report the
//! outcome via [`ActivationGuard::complete`]. There is no window in
//! which an in-flight handle exists but is unobservable, so no retry
//! poll is needed.
//!
//! `Active` is terminal: once reached, every further `ensure_active`
//! resolves immediately with the held engine and no side effects. A
//! failed attempt drains all waiters with the error and resets to
//! `Uninitialized` so a later call retries from scratch.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::ActivationError;

/// Observable activation state, derived from the phase
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivationState {
    Uninitialized,
    Activating,
    Active,
}

/// Continuation invoked once activation settles
pub type ActivationWaiter<E> = Box<dyn FnOnce(Result<Rc<E>, ActivationError>)>;

/// What `ensure_active` decided for this caller
#[derive(Debug, PartialEq, Eq)]
pub enum Ensure {
    /// Already active; the waiter was invoked before returning
    Ready,
    /// An activation is in flight; the waiter was queued behind it
    Pending,
    /// This caller won the race and must run the activation, then
    /// call [`ActivationGuard::complete`]
    Start,
}

enum Phase<E> {
    Uninitialized,
    Activating(Vec<ActivationWaiter<E>>),
    Active(Rc<E>),
}

/// Exclusive owner of the activation state for one hosting context
pub struct ActivationGuard<E> {
    phase: RefCell<Phase<E>>,
}

impl<E> ActivationGuard<E> {
    pub fn new() -> Self {
        Self {
            phase: RefCell::new(Phase::Uninitialized),
        }
    }

    pub fn state(&self) -> ActivationState {
        match *self.phase.borrow() {
            Phase::Uninitialized => ActivationState::Uninitialized,
            Phase::Activating(_) => ActivationState::Activating,
            Phase::Active(_) => ActivationState::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == ActivationState::Active
    }

    /// Register interest in the active engine.
    ///
    /// The waiter is invoked exactly once: immediately if already
    /// active, otherwise when the in-flight activation settles. The
    /// caller that receives [`Ensure::Start`] owns the attempt.
    pub fn ensure_active(&self, waiter: ActivationWaiter<E>) -> Ensure {
        // Resolve the decision inside the borrow, invoke the waiter
        // outside it: a waiter may re-enter the guard.
        let engine = {
            let mut phase = self.phase.borrow_mut();
            match &mut *phase {
                Phase::Active(engine) => Rc::clone(engine),
                Phase::Activating(waiters) => {
                    waiters.push(waiter);
                    return Ensure::Pending;
                }
                Phase::Uninitialized => {
                    *phase = Phase::Activating(vec![waiter]);
                    return Ensure::Start;
                }
            }
        };
        waiter(Ok(engine));
        Ensure::Ready
    }

    /// Settle the in-flight activation.
    ///
    /// Success stores the engine and becomes permanent; failure resets
    /// to `Uninitialized`. Either way every queued waiter is notified.
    /// Calling `complete` with no activation in flight is ignored.
    pub fn complete(&self, result: Result<E, ActivationError>) {
        let (waiters, outcome) = {
            let mut phase = self.phase.borrow_mut();
            let waiters = match std::mem::replace(&mut *phase, Phase::Uninitialized) {
                Phase::Activating(waiters) => waiters,
                other => {
                    // Not activating: restore and ignore the stray call.
                    *phase = other;
                    return;
                }
            };
            match result {
                Ok(engine) => {
                    let engine = Rc::new(engine);
                    *phase = Phase::Active(Rc::clone(&engine));
                    (waiters, Ok(engine))
                }
                Err(e) => (waiters, Err(e)),
            }
        };
        for waiter in waiters {
            waiter(outcome.clone());
        }
    }

    /// The active engine, if activation has completed
    pub fn engine(&self) -> Option<Rc<E>> {
        match &*self.phase.borrow() {
            Phase::Active(engine) => Some(Rc::clone(engine)),
            _ => None,
        }
    }
}

impl<E> Default for ActivationGuard<E> {
    fn default() -> Self {
        Self::new()
    }
}
