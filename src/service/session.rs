//! Authentication and connection lifecycle for one robot.
//!
//! [`RobotSession`] owns the two state axes (signed in or not, connected
//! or not), gates every command on both, and is the single place where
//! transactions are cancelled. Its [`CommandChannel`] issues the commands;
//! the transport feeds inbound traffic back through an [`InboundSink`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::Utc;
use tokio::runtime::Handle;
use tokio::sync::broadcast;

use super::channel::CommandChannel;
use super::media::MediaSlots;
use super::router::{EventRouter, RouteOutcome};
use crate::config::{SessionConfig, simulated_robot_info};
use crate::domain::{
    ConnectionState, EventBus, EventEnvelope, PendingSummary, Robot, RobotInfo, SessionEvent,
    TransactionId, TransactionRegistry,
};
use crate::error::ToolkitError;
use crate::transport::{Authenticator, MediaFetcher, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthState {
    Unauthenticated,
    Authenticating,
    Authenticated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LinkState {
    Disconnected,
    Connecting(Robot),
    Connected(Robot),
}

#[derive(Debug)]
struct Status {
    auth: AuthState,
    link: LinkState,
    /// Bumped on every connect and disconnect so a sink from an earlier
    /// connection cannot tear down a later one.
    epoch: u64,
}

impl Status {
    fn project(&self) -> ConnectionState {
        match (&self.link, self.auth) {
            (LinkState::Connected(_), _) => ConnectionState::Connected,
            (LinkState::Connecting(_), _) => ConnectionState::Connecting,
            (LinkState::Disconnected, AuthState::Authenticated) => {
                ConnectionState::AuthenticatedDisconnected
            }
            (LinkState::Disconnected, AuthState::Authenticating) => ConnectionState::Authenticating,
            (LinkState::Disconnected, AuthState::Unauthenticated) => ConnectionState::Disconnected,
        }
    }
}

/// State shared by the session, its command channel, and its inbound sinks.
#[derive(Debug)]
pub(crate) struct SessionShared {
    pub(crate) config: SessionConfig,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) authenticator: Arc<dyn Authenticator>,
    pub(crate) fetcher: Arc<dyn MediaFetcher>,
    pub(crate) registry: Arc<TransactionRegistry>,
    pub(crate) media: MediaSlots,
    pub(crate) runtime: Handle,
    router: EventRouter,
    event_bus: EventBus,
    status: Mutex<Status>,
    /// Held for the whole of a sign-in attempt.
    sign_in: tokio::sync::Mutex<()>,
}

impl SessionShared {
    fn status(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies `change` and announces the new state if the projection moved.
    fn update<R>(&self, reason: Option<&str>, change: impl FnOnce(&mut Status) -> R) -> R {
        let mut status = self.status();
        let before = status.project();
        let out = change(&mut status);
        let after = status.project();
        if before != after {
            tracing::info!(from = ?before, to = ?after, reason, "connection state changed");
            let _ = self.event_bus.publish(SessionEvent::ConnectionStateChanged {
                state: after,
                reason: reason.map(str::to_string),
                timestamp: Utc::now(),
            });
        }
        out
    }

    /// Succeeds only when signed in and connected.
    pub(crate) fn gate(&self) -> Result<(), ToolkitError> {
        let status = self.status();
        if status.auth != AuthState::Authenticated {
            return Err(ToolkitError::NotAuthenticated);
        }
        match status.link {
            LinkState::Connected(_) => Ok(()),
            _ => Err(ToolkitError::NotConnected),
        }
    }

    /// The robot the session is connected to.
    pub(crate) fn connected_robot(&self) -> Option<Robot> {
        match &self.status().link {
            LinkState::Connected(robot) => Some(robot.clone()),
            _ => None,
        }
    }

    fn is_authenticated(&self) -> bool {
        self.status().auth == AuthState::Authenticated
    }

    fn connection_lost(&self, epoch: u64, reason: &str) {
        let dropped = self.update(Some(reason), |status| {
            if status.epoch != epoch || status.link == LinkState::Disconnected {
                return false;
            }
            status.link = LinkState::Disconnected;
            status.epoch = status.epoch.wrapping_add(1);
            true
        });
        if dropped {
            tracing::warn!(reason, "connection lost");
        }
    }
}

/// Entry point for inbound traffic, handed to [`Transport::connect`].
///
/// Cheap to clone. A sink stays valid for routing after its connection
/// ends, but only the sink of the current connection can report it lost.
#[derive(Debug, Clone)]
pub struct InboundSink {
    router: EventRouter,
    session: Weak<SessionShared>,
    epoch: u64,
}

impl InboundSink {
    /// Routes one decoded inbound envelope.
    pub fn deliver(&self, envelope: EventEnvelope) -> RouteOutcome {
        self.router.route(envelope)
    }

    /// Reports that the transport lost its connection.
    pub fn connection_lost(&self, reason: &str) {
        if let Some(session) = self.session.upgrade() {
            session.connection_lost(self.epoch, reason);
        }
    }
}

/// One logical session with one robot.
///
/// Cheap to clone; clones share the same state.
#[derive(Debug, Clone)]
pub struct RobotSession {
    shared: Arc<SessionShared>,
    commands: CommandChannel,
}

impl RobotSession {
    /// Creates a signed-out, disconnected session on the current Tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ToolkitError::Internal`] when called outside a Tokio
    /// runtime.
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        authenticator: Arc<dyn Authenticator>,
        fetcher: Arc<dyn MediaFetcher>,
    ) -> Result<Self, ToolkitError> {
        let runtime = Handle::try_current().map_err(|e| ToolkitError::Internal(e.to_string()))?;
        let registry = Arc::new(TransactionRegistry::new());
        let event_bus = EventBus::new(config.event_bus_capacity);
        let router = EventRouter::new(Arc::clone(&registry), event_bus.clone());

        let shared = Arc::new(SessionShared {
            config,
            transport,
            authenticator,
            fetcher,
            registry,
            media: MediaSlots::default(),
            runtime,
            router,
            event_bus,
            status: Mutex::new(Status {
                auth: AuthState::Unauthenticated,
                link: LinkState::Disconnected,
                epoch: 0,
            }),
            sign_in: tokio::sync::Mutex::new(()),
        });

        Ok(Self {
            commands: CommandChannel::new(Arc::clone(&shared)),
            shared,
        })
    }

    /// Command builders for every capability.
    #[must_use]
    pub const fn commands(&self) -> &CommandChannel {
        &self.commands
    }

    /// Subscribes to connection-state changes and unsolicited events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.event_bus.subscribe()
    }

    /// Current projected connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.status().project()
    }

    /// `true` once sign-in has succeeded.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.shared.is_authenticated()
    }

    /// `true` while connected to a robot.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// The robot the session is connected to.
    #[must_use]
    pub fn robot(&self) -> Option<Robot> {
        self.shared.connected_robot()
    }

    /// Signs in. Returns `true` immediately when already signed in and
    /// `false` when the user declined.
    ///
    /// A call made while another sign-in is in flight waits for it and
    /// reports its outcome instead of prompting again.
    ///
    /// # Errors
    ///
    /// Returns [`ToolkitError::Authentication`] if the token exchange fails.
    pub async fn sign_in(&self) -> Result<bool, ToolkitError> {
        let _attempt = self.shared.sign_in.lock().await;
        let already = self.shared.update(None, |status| {
            if status.auth == AuthState::Authenticated {
                return true;
            }
            status.auth = AuthState::Authenticating;
            false
        });
        if already {
            return Ok(true);
        }

        let outcome = self.shared.authenticator.authenticate().await;
        let accepted = matches!(outcome, Ok(true));
        let reason = match &outcome {
            Ok(true) => None,
            Ok(false) => Some("sign-in declined".to_string()),
            Err(error) => Some(error.to_string()),
        };
        self.shared.update(reason.as_deref(), |status| {
            status.auth = if accepted {
                AuthState::Authenticated
            } else {
                AuthState::Unauthenticated
            };
        });
        outcome
    }

    /// Disconnects, drops credentials, and returns to
    /// [`ConnectionState::Disconnected`].
    ///
    /// # Errors
    ///
    /// Returns the first error reported by the transport or authenticator.
    /// The session is signed out either way.
    pub async fn log_out(&self) -> Result<(), ToolkitError> {
        let disconnected = self.disconnect().await;
        let invalidated = self.shared.authenticator.invalidate().await;
        self.shared.update(None, |status| {
            status.auth = AuthState::Unauthenticated;
        });
        tracing::info!("signed out");
        disconnected.and(invalidated)
    }

    /// Lists robots on the account.
    ///
    /// In simulator mode this is the simulated robot alone.
    ///
    /// # Errors
    ///
    /// Returns [`ToolkitError::NotAuthenticated`] before sign-in, or
    /// [`ToolkitError::Discovery`] if the list cannot be fetched.
    pub async fn get_robots(&self) -> Result<Vec<RobotInfo>, ToolkitError> {
        if self.shared.config.simulator {
            return Ok(vec![simulated_robot_info()]);
        }
        if !self.shared.is_authenticated() {
            return Err(ToolkitError::NotAuthenticated);
        }
        self.shared.authenticator.robots().await
    }

    /// Resolves the address of an account robot.
    ///
    /// In simulator mode this is always the simulated robot.
    ///
    /// # Errors
    ///
    /// Returns [`ToolkitError::NotAuthenticated`] before sign-in, or
    /// [`ToolkitError::Discovery`] if the robot cannot be located.
    pub async fn get_ip_address(&self, info: &RobotInfo) -> Result<Robot, ToolkitError> {
        if self.shared.config.simulator {
            return Ok(self.shared.config.simulated_robot());
        }
        if !self.shared.is_authenticated() {
            return Err(ToolkitError::NotAuthenticated);
        }
        self.shared.authenticator.ip_address(info).await
    }

    /// Connects to `robot`.
    ///
    /// Idempotent for the robot already connected; connecting to another
    /// robot disconnects first. In simulator mode the simulated robot is
    /// used instead of `robot`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolkitError::NotAuthenticated`] before sign-in, or the
    /// transport's error if the connection cannot be opened.
    pub async fn connect(&self, robot: Robot) -> Result<(), ToolkitError> {
        let robot = if self.shared.config.simulator {
            self.shared.config.simulated_robot()
        } else {
            robot
        };

        let (authenticated, current) = {
            let status = self.shared.status();
            (status.auth == AuthState::Authenticated, status.link.clone())
        };
        if !authenticated {
            return Err(ToolkitError::NotAuthenticated);
        }
        match current {
            LinkState::Connected(connected) if connected == robot => return Ok(()),
            LinkState::Disconnected => {}
            LinkState::Connected(_) | LinkState::Connecting(_) => self.disconnect().await?,
        }

        let epoch = self.shared.update(None, |status| {
            status.link = LinkState::Connecting(robot.clone());
            status.epoch = status.epoch.wrapping_add(1);
            status.epoch
        });
        let sink = InboundSink {
            router: self.shared.router.clone(),
            session: Arc::downgrade(&self.shared),
            epoch,
        };

        tracing::info!(ip = robot.ip(), port = robot.port(), "connecting");
        let opened = self.shared.transport.connect(&robot, sink).await;

        let reason = opened.as_ref().err().map(ToString::to_string);
        let current = self.shared.update(reason.as_deref(), |status| {
            if status.epoch != epoch {
                return false;
            }
            status.link = if opened.is_ok() {
                LinkState::Connected(robot.clone())
            } else {
                LinkState::Disconnected
            };
            true
        });

        match opened {
            Ok(()) if current => Ok(()),
            Ok(()) => Err(ToolkitError::NotConnected),
            Err(error) => {
                tracing::warn!(%error, "connect failed");
                Err(error)
            }
        }
    }

    /// Disconnects from the robot. Idempotent.
    ///
    /// Pending transactions stay pending.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if closing the socket fails. The
    /// session is disconnected either way.
    pub async fn disconnect(&self) -> Result<(), ToolkitError> {
        let was_linked = self.shared.update(None, |status| {
            if status.link == LinkState::Disconnected {
                return false;
            }
            status.link = LinkState::Disconnected;
            status.epoch = status.epoch.wrapping_add(1);
            true
        });
        if !was_linked {
            return Ok(());
        }
        tracing::info!("disconnecting");
        self.shared.transport.disconnect().await
    }

    /// Cancels a transaction.
    ///
    /// The registry entry and any media fetch for `transaction_id` are
    /// dropped before this returns its first await point; a result that
    /// arrives later is discarded. When connected, the robot is asked to
    /// stop as well. Returns `true` if anything was cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`ToolkitError::Cancel`] when nothing was pending locally
    /// and the robot could not be reached.
    pub async fn cancel(&self, transaction_id: TransactionId) -> Result<bool, ToolkitError> {
        let local = self.cancel_local(transaction_id);
        if self.shared.connected_robot().is_none() {
            return Ok(local);
        }
        match self.shared.transport.cancel(transaction_id).await {
            Ok(remote) => Ok(local || remote),
            Err(error) => {
                tracing::warn!(%transaction_id, %error, "remote cancel failed");
                if local {
                    Ok(true)
                } else {
                    Err(ToolkitError::Cancel(error.to_string()))
                }
            }
        }
    }

    /// Drops a transaction and its media fetch without telling the robot.
    ///
    /// Safe to call from inside a completion.
    pub fn cancel_local(&self, transaction_id: TransactionId) -> bool {
        let removed = self.shared.registry.remove(transaction_id);
        let aborted = self.shared.media.release(transaction_id);
        if removed || aborted {
            tracing::debug!(%transaction_id, "transaction cancelled");
        }
        removed || aborted
    }

    /// Returns an inbound sink not tied to any connection.
    ///
    /// Useful for transports that deliver events outside `connect`.
    #[must_use]
    pub fn inbound_sink(&self) -> InboundSink {
        InboundSink {
            router: self.shared.router.clone(),
            session: Weak::new(),
            epoch: 0,
        }
    }

    /// Snapshot of pending transactions, oldest first.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingSummary> {
        self.shared.registry.pending()
    }

    /// `true` while a photo download is in flight.
    #[must_use]
    pub fn photo_fetch_active(&self) -> bool {
        self.shared.media.photo.is_active()
    }

    /// `true` while a video stream is open.
    #[must_use]
    pub fn video_fetch_active(&self) -> bool {
        self.shared.media.video.is_active()
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &TransactionRegistry {
        &self.shared.registry
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    use super::*;
    use crate::domain::callback_info::{LookAtAchievedInfo, MotionInfo};
    use crate::domain::{AngleVector, EventType, LookAt};
    use crate::service::test_support::{Harness, completion};
    use crate::transport::memory::AckMode;

    #[tokio::test]
    async fn starts_disconnected_and_gates_commands() {
        let h = Harness::new(SessionConfig::default());
        assert_eq!(h.session.state(), ConnectionState::Disconnected);
        assert!(!h.session.is_authenticated());

        let (mut rx, done) = completion::<MotionInfo>();
        assert!(h.session.commands().subscribe_motion(done).is_none());
        assert!(matches!(rx.try_recv(), Ok(Err(ToolkitError::NotAuthenticated))));
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn sign_in_is_idempotent() {
        let h = Harness::new(SessionConfig::default());
        assert!(matches!(h.session.sign_in().await, Ok(true)));
        assert!(matches!(h.session.sign_in().await, Ok(true)));
        assert_eq!(h.auth.authentications(), 1);
        assert_eq!(h.session.state(), ConnectionState::AuthenticatedDisconnected);
    }

    #[tokio::test]
    async fn concurrent_sign_in_prompts_once() {
        let h = Harness::new(SessionConfig::default());
        let gate = h.auth.pause_authentication();

        let session = h.session.clone();
        let first = tokio::spawn(async move { session.sign_in().await });
        while h.session.state() != ConnectionState::Authenticating {
            tokio::task::yield_now().await;
        }
        let session = h.session.clone();
        let second = tokio::spawn(async move { session.sign_in().await });
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        gate.notify_one();

        let (Ok(first), Ok(second)) = (first.await, second.await) else {
            panic!("sign-in task panicked");
        };
        assert!(matches!(first, Ok(true)));
        assert!(matches!(second, Ok(true)));
        assert_eq!(h.auth.authentications(), 1);
        assert_eq!(h.session.state(), ConnectionState::AuthenticatedDisconnected);
    }

    #[tokio::test]
    async fn declined_sign_in_stays_signed_out() {
        let h = Harness::new(SessionConfig::default());
        h.auth.set_accept(false);
        assert!(matches!(h.session.sign_in().await, Ok(false)));
        assert!(!h.session.is_authenticated());
        assert_eq!(h.session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn failed_sign_in_surfaces_error() {
        let h = Harness::new(SessionConfig::default());
        h.auth
            .fail_next_authentication(ToolkitError::Authentication("bad token".to_string()));
        assert_err!(h.session.sign_in().await);
        assert!(!h.session.is_authenticated());
    }

    #[tokio::test]
    async fn connect_requires_authentication() {
        let h = Harness::new(SessionConfig::default());
        let robot = Robot::new("10.0.0.2".to_string(), 8160, RobotInfo::default());
        assert!(matches!(
            h.session.connect(robot).await,
            Err(ToolkitError::NotAuthenticated)
        ));
        assert!(h.transport.connects().is_empty());
    }

    #[tokio::test]
    async fn command_while_disconnected_fails_without_registering() {
        let h = Harness::new(SessionConfig::default());
        assert_ok!(h.session.sign_in().await);
        let before = h.session.registry().len();

        let (mut rx, done) = completion::<LookAtAchievedInfo>();
        let id = h
            .session
            .commands()
            .look_at(LookAt::angle(AngleVector::new(1.0, 0.0)), done);
        assert!(id.is_none());
        assert!(matches!(rx.try_recv(), Ok(Err(ToolkitError::NotConnected))));
        assert_eq!(h.session.registry().len(), before);
        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn state_changes_are_broadcast() {
        let h = Harness::new(SessionConfig::default());
        let mut rx = h.session.subscribe();
        h.connect().await;

        let mut states = Vec::new();
        while let Ok(SessionEvent::ConnectionStateChanged { state, .. }) = rx.try_recv() {
            states.push(state);
        }
        assert_eq!(
            states,
            vec![
                ConnectionState::Authenticating,
                ConnectionState::AuthenticatedDisconnected,
                ConnectionState::Connecting,
                ConnectionState::Connected,
            ]
        );
    }

    #[tokio::test]
    async fn connect_is_idempotent_and_switches_robots() {
        let h = Harness::new(SessionConfig::default());
        let first = h.connect().await;
        assert_ok!(h.session.connect(first.clone()).await);
        assert_eq!(h.transport.connects().len(), 1);

        let other = Robot::new("10.0.0.9".to_string(), 8160, RobotInfo::default());
        assert_ok!(h.session.connect(other.clone()).await);
        assert_eq!(h.transport.disconnects(), 1);
        assert_eq!(h.transport.connects(), vec![first, other.clone()]);
        assert_eq!(h.session.robot(), Some(other));
    }

    #[tokio::test]
    async fn failed_connect_returns_to_authenticated() {
        let h = Harness::new(SessionConfig::default());
        assert_ok!(h.session.sign_in().await);
        h.transport
            .fail_next_connect(ToolkitError::TransportSend("refused".to_string()));
        let robot = Robot::new("10.0.0.2".to_string(), 8160, RobotInfo::default());
        assert_err!(h.session.connect(robot).await);
        assert_eq!(h.session.state(), ConnectionState::AuthenticatedDisconnected);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_keeps_pending() {
        let h = Harness::new(SessionConfig::default());
        h.connect().await;
        let (_rx, done) = completion::<MotionInfo>();
        let Some(id) = h.session.commands().subscribe_motion(done) else {
            panic!("command should be accepted");
        };

        assert_ok!(h.session.disconnect().await);
        assert_ok!(h.session.disconnect().await);
        assert_eq!(h.transport.disconnects(), 1);
        assert_eq!(h.session.state(), ConnectionState::AuthenticatedDisconnected);
        assert!(h.session.registry().contains(id));
    }

    #[tokio::test]
    async fn connection_loss_from_transport() {
        let h = Harness::new(SessionConfig::default());
        h.connect().await;
        let mut rx = h.session.subscribe();
        assert!(h.transport.drop_connection("robot rebooted"));
        assert!(!h.session.is_connected());

        let Ok(SessionEvent::ConnectionStateChanged { state, reason, .. }) = rx.try_recv() else {
            panic!("expected a state change");
        };
        assert_eq!(state, ConnectionState::AuthenticatedDisconnected);
        assert_eq!(reason.as_deref(), Some("robot rebooted"));
    }

    #[tokio::test]
    async fn stale_sink_cannot_drop_new_connection() {
        let h = Harness::new(SessionConfig::default());
        h.connect().await;
        let Some(stale) = h.transport.sink() else {
            panic!("connected transport holds a sink");
        };
        let other = Robot::new("10.0.0.9".to_string(), 8160, RobotInfo::default());
        assert_ok!(h.session.connect(other).await);

        stale.connection_lost("old socket closed");
        assert!(h.session.is_connected());
    }

    #[tokio::test]
    async fn log_out_disconnects_and_invalidates() {
        let h = Harness::new(SessionConfig::default());
        h.connect().await;
        assert_ok!(h.session.log_out().await);
        assert_eq!(h.session.state(), ConnectionState::Disconnected);
        assert_eq!(h.transport.disconnects(), 1);
        assert_eq!(h.auth.invalidations(), 1);
        assert!(!h.session.is_authenticated());
    }

    #[tokio::test]
    async fn simulator_redirects_discovery_and_connect() {
        let h = Harness::new(SessionConfig::simulator());
        let Ok(robots) = h.session.get_robots().await else {
            panic!("simulator lists robots without sign-in");
        };
        assert_eq!(robots, vec![simulated_robot_info()]);

        let Ok(robot) = h.session.get_ip_address(&RobotInfo::default()).await else {
            panic!("simulator resolves any robot");
        };
        assert_eq!(robot.ip(), "127.0.0.1");

        assert_ok!(h.session.sign_in().await);
        let elsewhere = Robot::new("10.0.0.2".to_string(), 9000, RobotInfo::default());
        assert_ok!(h.session.connect(elsewhere).await);
        let Some(connected) = h.transport.connected_robot() else {
            panic!("transport should be connected");
        };
        assert_eq!(connected.ip(), "127.0.0.1");
        assert_eq!(connected.port(), 8160);
    }

    #[tokio::test]
    async fn discovery_requires_sign_in_outside_simulator() {
        let h = Harness::new(SessionConfig::default());
        assert!(matches!(
            h.session.get_robots().await,
            Err(ToolkitError::NotAuthenticated)
        ));
        assert_ok!(h.session.sign_in().await);
        let Ok(robots) = h.session.get_robots().await else {
            panic!("robot list should load");
        };
        assert_eq!(robots.len(), 1);
    }

    #[tokio::test]
    async fn cancel_removes_locally_and_notifies_robot() {
        let h = Harness::new(SessionConfig::default());
        h.connect().await;
        let (_rx, done) = completion::<MotionInfo>();
        let Some(id) = h.session.commands().subscribe_motion(done) else {
            panic!("command should be accepted");
        };
        assert!(matches!(h.session.cancel(id).await, Ok(true)));
        assert!(!h.session.registry().contains(id));
        assert_eq!(h.transport.cancelled(), vec![id]);
    }

    #[tokio::test]
    async fn cancel_while_disconnected_is_local_only() {
        let h = Harness::new(SessionConfig::default());
        h.connect().await;
        let (_rx, done) = completion::<MotionInfo>();
        let Some(id) = h.session.commands().subscribe_motion(done) else {
            panic!("command should be accepted");
        };
        assert_ok!(h.session.disconnect().await);
        assert!(matches!(h.session.cancel(id).await, Ok(true)));
        assert!(matches!(h.session.cancel(id).await, Ok(false)));
        assert!(h.transport.cancelled().is_empty());
    }

    #[tokio::test]
    async fn ack_failure_rejects_transaction() {
        let h = Harness::new(SessionConfig::default());
        h.connect().await;
        h.transport.set_ack_mode(AckMode::Fail("buffer full".to_string()));

        let (mut rx, done) = completion::<MotionInfo>();
        let Some(id) = h.session.commands().subscribe_motion(done) else {
            panic!("command should be accepted");
        };
        let Some(Err(ToolkitError::TransportSend(reason))) = rx.recv().await else {
            panic!("expected a send failure");
        };
        assert_eq!(reason, "buffer full");
        assert!(!h.session.registry().contains(id));
    }

    #[tokio::test]
    async fn motion_subscription_until_cancelled() {
        let h = Harness::new(SessionConfig::default());
        h.connect().await;
        let (mut rx, done) = completion::<MotionInfo>();
        let Some(id) = h.session.commands().subscribe_motion(done) else {
            panic!("command should be accepted");
        };

        for intensity in [0.2, 0.5, 0.9] {
            let outcome = h.transport.deliver(EventEnvelope::correlated(
                EventType::MotionDetected,
                id,
                json!({ "motions": [{ "intensity": intensity }] }),
            ));
            assert_eq!(outcome, Some(RouteOutcome::Resolved));
        }
        assert!(h.session.registry().contains(id));

        assert_ok!(h.session.cancel(id).await);
        let outcome = h.transport.deliver(EventEnvelope::correlated(
            EventType::MotionDetected,
            id,
            json!({ "motions": [] }),
        ));
        assert_eq!(outcome, Some(RouteOutcome::UnknownTransaction));

        let mut delivered = 0;
        while let Ok(result) = rx.try_recv() {
            assert!(result.is_ok());
            delivered += 1;
        }
        assert_eq!(delivered, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_resolve_and_cancel_fire_at_most_once() {
        let h = Harness::new(SessionConfig::default());
        h.connect().await;

        for _ in 0..100 {
            let (mut rx, done) = completion::<LookAtAchievedInfo>();
            let Some(id) = h
                .session
                .commands()
                .look_at(LookAt::entity(4), done)
            else {
                panic!("command should be accepted");
            };

            let transport = std::sync::Arc::clone(&h.transport);
            let resolver = tokio::spawn(async move {
                transport.deliver(EventEnvelope::correlated(
                    EventType::LookAtAchieved,
                    id,
                    json!({}),
                ))
            });
            let session = h.session.clone();
            let canceller = tokio::spawn(async move { session.cancel_local(id) });

            let Ok(routed) = resolver.await else {
                panic!("resolver panicked");
            };
            let Ok(cancelled) = canceller.await else {
                panic!("canceller panicked");
            };

            let mut fired = 0;
            while rx.try_recv().is_ok() {
                fired += 1;
            }
            assert!(fired <= 1);
            assert_eq!(fired == 1, routed == Some(RouteOutcome::Resolved));
            assert_ne!(fired == 1, cancelled);
            assert!(!h.session.registry().contains(id));
        }
    }
}
