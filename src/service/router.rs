//! Routing of decoded inbound envelopes.
//!
//! Correlated envelopes go to the transaction registry, decoded with the
//! kind recorded at registration. Everything else is published on the
//! event bus.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::{
    CallbackInfo, DecodeError, Decoded, EventBus, EventEnvelope, Resolution, SessionEvent, TransactionId,
    TransactionRegistry, decode,
};
use crate::error::ToolkitError;

/// What happened to one routed envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A payload reached its transaction's callback.
    Resolved,
    /// An error (device-reported or decode failure) reached the callback.
    Failed,
    /// A progress notification; the transaction stays pending.
    Progress,
    /// The event does not answer this transaction; dropped.
    Mismatched,
    /// No pending transaction has this id; dropped.
    UnknownTransaction,
    /// No transaction id; published to this many bus subscribers.
    Broadcast(usize),
}

/// Routes envelopes to the registry or the event bus.
#[derive(Debug, Clone)]
pub struct EventRouter {
    registry: Arc<TransactionRegistry>,
    event_bus: EventBus,
}

impl EventRouter {
    /// Creates a router over a registry and a bus.
    #[must_use]
    pub fn new(registry: Arc<TransactionRegistry>, event_bus: EventBus) -> Self {
        Self {
            registry,
            event_bus,
        }
    }

    /// Routes one envelope. Never blocks beyond the registry lock and the
    /// callback it invokes.
    pub fn route(&self, envelope: EventEnvelope) -> RouteOutcome {
        let EventEnvelope {
            event_type,
            transaction_id,
            payload,
        } = envelope;

        let Some(transaction_id) = transaction_id else {
            let receivers = self.event_bus.publish(SessionEvent::Unsolicited {
                event_type,
                payload,
                timestamp: Utc::now(),
            });
            tracing::debug!(%event_type, receivers, "broadcast unsolicited event");
            return RouteOutcome::Broadcast(receivers);
        };

        let Some(expected) = self.registry.expected_kind(transaction_id) else {
            tracing::debug!(%transaction_id, %event_type, "event for unknown transaction dropped");
            return RouteOutcome::UnknownTransaction;
        };

        match decode(expected, event_type, &payload) {
            Ok(Decoded::Info(info)) => self.settle(transaction_id, Ok(info), RouteOutcome::Resolved),
            Ok(Decoded::Failure(error)) => {
                tracing::debug!(%transaction_id, %event_type, %error, "device reported failure");
                self.settle(
                    transaction_id,
                    Err(ToolkitError::Device(error)),
                    RouteOutcome::Failed,
                )
            }
            Ok(Decoded::Progress) => {
                tracing::debug!(%transaction_id, %event_type, "transaction in progress");
                RouteOutcome::Progress
            }
            Err(DecodeError::Mismatch { expected, actual }) => {
                tracing::debug!(
                    %transaction_id,
                    %expected,
                    %actual,
                    "event does not answer transaction, dropped"
                );
                RouteOutcome::Mismatched
            }
            Err(error) => {
                tracing::warn!(%transaction_id, %event_type, %error, "correlated decode failed");
                self.settle(
                    transaction_id,
                    Err(ToolkitError::CorrelatedDecode {
                        transaction_id,
                        reason: error.to_string(),
                    }),
                    RouteOutcome::Failed,
                )
            }
        }
    }

    fn settle(
        &self,
        transaction_id: TransactionId,
        outcome: Result<CallbackInfo, ToolkitError>,
        delivered: RouteOutcome,
    ) -> RouteOutcome {
        match self.registry.resolve(transaction_id, outcome) {
            Resolution::Delivered => delivered,
            Resolution::Mismatched => RouteOutcome::Mismatched,
            Resolution::Unknown => RouteOutcome::UnknownTransaction,
        }
    }
}
