//! Command builders, one file per capability.
//!
//! Every command follows the same path: gate on the session state, wrap
//! the completion in a typed [`Callback`], register the transaction, hand
//! the request to the transport, and watch the acknowledgement. A failed
//! acknowledgement rejects the transaction so the caller hears about it
//! at once.

mod assets;
mod capture;
mod config;
mod display;
mod expression;
mod listen;
mod perception;

use std::sync::Arc;

use super::session::SessionShared;
use crate::domain::{
    Callback, Command, CommandRequest, Completion, ResultPayload, TransactionId, TransactionKind,
};
use crate::error::ToolkitError;
use crate::transport::RequestHandle;

/// Issues commands on behalf of a [`super::RobotSession`].
///
/// Every method is synchronous and returns the new transaction's id, or
/// `None` when the command was refused; in that case the completion has
/// already been called with the reason.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    shared: Arc<SessionShared>,
}

impl CommandChannel {
    pub(crate) const fn new(shared: Arc<SessionShared>) -> Self {
        Self { shared }
    }

    /// Checks the session state, failing `completion` inline if commands
    /// are not accepted.
    fn admit<U>(&self, command: &'static str, completion: &mut Completion<U>) -> bool {
        match self.shared.gate() {
            Ok(()) => true,
            Err(error) => {
                tracing::debug!(command, %error, "command refused");
                completion(Err(error));
                false
            }
        }
    }

    /// Registers a transaction whose callback is built from its id, then
    /// sends the command.
    fn submit<T: ResultPayload>(
        &self,
        kind: TransactionKind,
        command: Command,
        make: impl FnOnce(TransactionId) -> Callback<T>,
    ) -> TransactionId {
        let name = command.name();
        let transaction_id = self
            .shared
            .registry
            .register_with(kind, |id| Box::new(make(id)));
        let handle = self.shared.transport.send(CommandRequest {
            transaction_id,
            command,
        });
        tracing::debug!(%transaction_id, command = name, "command sent");
        self.watch(handle);
        transaction_id
    }

    /// Gates, registers and sends a command completed by a plain callback.
    fn issue<T: ResultPayload>(
        &self,
        kind: TransactionKind,
        command: Command,
        mut completion: Completion<T>,
    ) -> Option<TransactionId> {
        if !self.admit(command.name(), &mut completion) {
            return None;
        }
        Some(self.submit(kind, command, move |_| Callback::from_boxed(completion)))
    }

    /// Rejects the transaction if the transport fails to send it.
    fn watch(&self, handle: RequestHandle) {
        let registry = Arc::clone(&self.shared.registry);
        let RequestHandle {
            transaction_id,
            acknowledged,
        } = handle;
        self.shared.runtime.spawn(async move {
            if let Err(error) = acknowledged.await {
                tracing::warn!(%transaction_id, %error, "command not acknowledged");
                let error = match error {
                    ToolkitError::TransportSend(_) => error,
                    other => ToolkitError::TransportSend(other.to_string()),
                };
                registry.reject(transaction_id, error);
            }
        });
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;

    use crate::config::SessionConfig;
    use crate::domain::callback_info::{GetConfigInfo, SayCompletedInfo};
    use crate::domain::{Command, EventEnvelope, EventType};
    use crate::error::ToolkitError;
    use crate::service::RouteOutcome;
    use crate::service::test_support::{Harness, completion};
    use crate::transport::memory::AckMode;

    #[tokio::test]
    async fn sent_request_carries_returned_id() {
        let h = Harness::new(SessionConfig::default());
        h.connect().await;
        let (_rx, done) = completion::<SayCompletedInfo>();
        let Some(id) = h.session.commands().say("hello there", done) else {
            panic!("command should be accepted");
        };
        let Some(request) = h.transport.last_sent() else {
            panic!("request should be sent");
        };
        assert_eq!(request.transaction_id, id);
        assert!(matches!(request.command, Command::Say { ref phrase } if phrase == "hello there"));
    }

    #[tokio::test]
    async fn ids_are_distinct_across_commands() {
        let h = Harness::new(SessionConfig::default());
        h.connect().await;
        let mut ids = std::collections::HashSet::new();
        for _ in 0..50 {
            let (_rx, done) = completion::<GetConfigInfo>();
            let Some(id) = h.session.commands().get_config(done) else {
                panic!("command should be accepted");
            };
            ids.insert(id);
        }
        assert_eq!(ids.len(), 50);
    }

    #[tokio::test]
    async fn manual_ack_failure_after_send() {
        let h = Harness::new(SessionConfig::default());
        h.connect().await;
        h.transport.set_ack_mode(AckMode::Manual);

        let (mut rx, done) = completion::<GetConfigInfo>();
        let Some(id) = h.session.commands().get_config(done) else {
            panic!("command should be accepted");
        };
        assert!(h.session.registry().contains(id));
        assert!(h.transport.fail(id, ToolkitError::Internal("queue closed".to_string())));

        let Some(Err(ToolkitError::TransportSend(reason))) = rx.recv().await else {
            panic!("expected a send failure");
        };
        assert!(reason.contains("queue closed"));
        assert!(!h.session.registry().contains(id));
    }

    #[tokio::test]
    async fn acknowledged_command_waits_for_result() {
        let h = Harness::new(SessionConfig::default());
        h.connect().await;
        h.transport.set_ack_mode(AckMode::Manual);

        let (mut rx, done) = completion::<SayCompletedInfo>();
        let Some(id) = h.session.commands().say("hi", done) else {
            panic!("command should be accepted");
        };
        assert!(h.transport.acknowledge(id));
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
        assert!(h.session.registry().contains(id));

        let outcome = h
            .transport
            .deliver(EventEnvelope::correlated(EventType::AsyncStop, id, json!({})));
        assert_eq!(outcome, Some(RouteOutcome::Resolved));
        let Some(Ok(info)) = rx.recv().await else {
            panic!("expected a say result");
        };
        assert_eq!(info.event_type, EventType::AsyncStop);
    }
}
