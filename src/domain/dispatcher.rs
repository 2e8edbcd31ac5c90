//! Typed completion handlers behind a type-erased dispatch point.
//!
//! The public command API is narrowly typed (`look_at` hands back a
//! [`LookAtAchievedInfo`](super::LookAtAchievedInfo), `subscribe_motion` a
//! [`MotionInfo`](super::MotionInfo), ...) while the registry stores every
//! pending transaction behind one [`Dispatch`] trait object. [`Callback`]
//! bridges the two.

use std::fmt;
use std::marker::PhantomData;

use super::callback_info::{CallbackInfo, ResultKind, ResultPayload};
use crate::error::ToolkitError;

/// Boxed completion handler receiving a typed result.
pub type Completion<T> = Box<dyn FnMut(Result<T, ToolkitError>) + Send + 'static>;

/// What happened when a delivery reached a [`Dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The handler was invoked.
    Delivered,
    /// The payload was the wrong variant; the handler was not invoked.
    Mismatched,
}

/// Type-erased invocation point stored by the registry.
pub trait Dispatch: Send + fmt::Debug {
    /// Result kind the wrapped handler expects.
    fn expected(&self) -> ResultKind;

    /// Delivers a decoded payload or an error.
    ///
    /// Errors always reach the handler. A payload reaches it only when it
    /// is the variant the handler expects.
    fn execute(&mut self, outcome: Result<CallbackInfo, ToolkitError>) -> Delivery;
}

/// Binds a typed completion to the [`Dispatch`] entry point.
pub struct Callback<T: ResultPayload> {
    handler: Completion<T>,
    _payload: PhantomData<fn(T)>,
}

impl<T: ResultPayload> Callback<T> {
    /// Wraps a completion handler.
    #[must_use]
    pub fn new(handler: impl FnMut(Result<T, ToolkitError>) + Send + 'static) -> Self {
        Self::from_boxed(Box::new(handler))
    }

    /// Wraps an already boxed completion handler.
    #[must_use]
    pub fn from_boxed(handler: Completion<T>) -> Self {
        Self {
            handler,
            _payload: PhantomData,
        }
    }

    /// Invokes the handler directly with an error.
    ///
    /// Used when a command fails before it is ever registered.
    pub fn fail(mut self, error: ToolkitError) {
        (self.handler)(Err(error));
    }
}

impl<T: ResultPayload> fmt::Debug for Callback<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("expected", &T::KIND)
            .finish_non_exhaustive()
    }
}

impl<T: ResultPayload> Dispatch for Callback<T> {
    fn expected(&self) -> ResultKind {
        T::KIND
    }

    fn execute(&mut self, outcome: Result<CallbackInfo, ToolkitError>) -> Delivery {
        match outcome {
            Ok(info) => match T::from_info(info) {
                Some(value) => {
                    (self.handler)(Ok(value));
                    Delivery::Delivered
                }
                None => Delivery::Mismatched,
            },
            Err(error) => {
                (self.handler)(Err(error));
                Delivery::Delivered
            }
        }
    }
}
