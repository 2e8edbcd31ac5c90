//! In-process implementations of the collaborator traits.
//!
//! Each double records what the session asked of it and can be scripted
//! to fail. [`MemoryTransport`] also stands in for the robot: tests settle
//! acknowledgements and push inbound envelopes through it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use tokio::sync::Notify;

use super::{
    AckSender, Authenticator, Certificate, FrameStream, MediaFetcher, RequestHandle, Transport,
};
use crate::domain::{CommandRequest, EventEnvelope, Robot, RobotInfo, TransactionId};
use crate::error::ToolkitError;
use crate::service::{InboundSink, RouteOutcome};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// How [`MemoryTransport`] settles acknowledgements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AckMode {
    /// Every send is acknowledged at once.
    #[default]
    Immediate,
    /// Acknowledgements wait for [`MemoryTransport::acknowledge`] or
    /// [`MemoryTransport::fail`].
    Manual,
    /// Every send fails with this reason.
    Fail(String),
}

#[derive(Debug, Default)]
struct TransportState {
    ack_mode: AckMode,
    sink: Option<InboundSink>,
    robot: Option<Robot>,
    connect_failure: Option<ToolkitError>,
    connects: Vec<Robot>,
    disconnects: usize,
    sent: Vec<CommandRequest>,
    held: HashMap<TransactionId, AckSender>,
    cancelled: Vec<TransactionId>,
}

/// Recording transport that loops inbound events back into the session.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: Mutex<TransportState>,
}

impl MemoryTransport {
    /// Creates a transport that acknowledges every send.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Changes how subsequent sends are acknowledged.
    pub fn set_ack_mode(&self, mode: AckMode) {
        locked(&self.state).ack_mode = mode;
    }

    /// Makes the next `connect` fail with `error`.
    pub fn fail_next_connect(&self, error: ToolkitError) {
        locked(&self.state).connect_failure = Some(error);
    }

    /// Robot the transport is connected to, if any.
    #[must_use]
    pub fn connected_robot(&self) -> Option<Robot> {
        locked(&self.state).robot.clone()
    }

    /// Sink of the open connection, if any.
    #[must_use]
    pub fn sink(&self) -> Option<InboundSink> {
        locked(&self.state).sink.clone()
    }

    /// Every robot `connect` was called with, in order.
    #[must_use]
    pub fn connects(&self) -> Vec<Robot> {
        locked(&self.state).connects.clone()
    }

    /// Number of `disconnect` calls.
    #[must_use]
    pub fn disconnects(&self) -> usize {
        locked(&self.state).disconnects
    }

    /// Every request sent so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<CommandRequest> {
        locked(&self.state).sent.clone()
    }

    /// The most recent request.
    #[must_use]
    pub fn last_sent(&self) -> Option<CommandRequest> {
        locked(&self.state).sent.last().cloned()
    }

    /// Ids passed to `cancel`, in order.
    #[must_use]
    pub fn cancelled(&self) -> Vec<TransactionId> {
        locked(&self.state).cancelled.clone()
    }

    /// Acknowledges a held send. Returns `false` if none was held.
    pub fn acknowledge(&self, transaction_id: TransactionId) -> bool {
        let held = locked(&self.state).held.remove(&transaction_id);
        held.map(AckSender::acknowledge).is_some()
    }

    /// Fails a held send. Returns `false` if none was held.
    pub fn fail(&self, transaction_id: TransactionId, error: ToolkitError) -> bool {
        let held = locked(&self.state).held.remove(&transaction_id);
        held.map(|ack| ack.fail(error)).is_some()
    }

    /// Pushes an inbound envelope as if the robot had sent it.
    ///
    /// Returns `None` when no connection is open.
    pub fn deliver(&self, envelope: EventEnvelope) -> Option<RouteOutcome> {
        let sink = locked(&self.state).sink.clone();
        sink.map(|sink| sink.deliver(envelope))
    }

    /// Drops the connection from the robot side.
    ///
    /// Returns `false` when no connection was open.
    pub fn drop_connection(&self, reason: &str) -> bool {
        let sink = {
            let mut state = locked(&self.state);
            state.robot = None;
            state.sink.take()
        };
        let Some(sink) = sink else {
            return false;
        };
        sink.connection_lost(reason);
        true
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self, robot: &Robot, sink: InboundSink) -> Result<(), ToolkitError> {
        let mut state = locked(&self.state);
        if let Some(error) = state.connect_failure.take() {
            return Err(error);
        }
        state.connects.push(robot.clone());
        state.robot = Some(robot.clone());
        state.sink = Some(sink);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ToolkitError> {
        let mut state = locked(&self.state);
        state.disconnects = state.disconnects.saturating_add(1);
        state.robot = None;
        state.sink = None;
        Ok(())
    }

    fn send(&self, request: CommandRequest) -> RequestHandle {
        let transaction_id = request.transaction_id;
        let mut state = locked(&self.state);
        state.sent.push(request);

        if state.sink.is_none() {
            return RequestHandle::failed(
                transaction_id,
                ToolkitError::TransportSend("socket closed".to_string()),
            );
        }

        match state.ack_mode.clone() {
            AckMode::Immediate => RequestHandle::acknowledged(transaction_id),
            AckMode::Fail(reason) => {
                RequestHandle::failed(transaction_id, ToolkitError::TransportSend(reason))
            }
            AckMode::Manual => {
                let (handle, ack) = RequestHandle::new(transaction_id);
                state.held.insert(transaction_id, ack);
                handle
            }
        }
    }

    async fn cancel(&self, transaction_id: TransactionId) -> Result<bool, ToolkitError> {
        locked(&self.state).cancelled.push(transaction_id);
        Ok(true)
    }
}

#[derive(Debug)]
struct AccountState {
    accept: bool,
    gate: Option<Arc<Notify>>,
    auth_failure: Option<ToolkitError>,
    robots: Vec<RobotInfo>,
    address: (String, u16),
    certificate_failure: Option<ToolkitError>,
    authentications: usize,
    invalidations: usize,
    certificates: usize,
}

/// Account service double with one robot on the account.
#[derive(Debug)]
pub struct MemoryAuthenticator {
    state: Mutex<AccountState>,
}

impl Default for MemoryAuthenticator {
    fn default() -> Self {
        Self {
            state: Mutex::new(AccountState {
                accept: true,
                gate: None,
                auth_failure: None,
                robots: vec![RobotInfo {
                    id: Some("memory-robot".to_string()),
                    name: Some("Memory Robot".to_string()),
                    robot_name: Some("memory-robot.local".to_string()),
                }],
                address: ("192.168.1.20".to_string(), 8160),
                certificate_failure: None,
                authentications: 0,
                invalidations: 0,
                certificates: 0,
            }),
        }
    }
}

impl MemoryAuthenticator {
    /// Creates an authenticator that accepts sign-in.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether sign-in is accepted (`false` models a declined prompt).
    pub fn set_accept(&self, accept: bool) {
        locked(&self.state).accept = accept;
    }

    /// Makes every later sign-in wait for one notification on the
    /// returned handle before answering.
    #[must_use]
    pub fn pause_authentication(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        locked(&self.state).gate = Some(Arc::clone(&gate));
        gate
    }

    /// Makes the next sign-in fail with `error`.
    pub fn fail_next_authentication(&self, error: ToolkitError) {
        locked(&self.state).auth_failure = Some(error);
    }

    /// Replaces the robots on the account.
    pub fn set_robots(&self, robots: Vec<RobotInfo>) {
        locked(&self.state).robots = robots;
    }

    /// Makes every certificate request fail with `error`.
    pub fn fail_certificates(&self, error: ToolkitError) {
        locked(&self.state).certificate_failure = Some(error);
    }

    /// Number of sign-in attempts.
    #[must_use]
    pub fn authentications(&self) -> usize {
        locked(&self.state).authentications
    }

    /// Number of `invalidate` calls.
    #[must_use]
    pub fn invalidations(&self) -> usize {
        locked(&self.state).invalidations
    }

    /// Number of certificate requests.
    #[must_use]
    pub fn certificates(&self) -> usize {
        locked(&self.state).certificates
    }
}

#[async_trait]
impl Authenticator for MemoryAuthenticator {
    async fn authenticate(&self) -> Result<bool, ToolkitError> {
        let gate = locked(&self.state).gate.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let mut state = locked(&self.state);
        state.authentications = state.authentications.saturating_add(1);
        match state.auth_failure.take() {
            Some(error) => Err(error),
            None => Ok(state.accept),
        }
    }

    async fn invalidate(&self) -> Result<(), ToolkitError> {
        let mut state = locked(&self.state);
        state.invalidations = state.invalidations.saturating_add(1);
        Ok(())
    }

    async fn robots(&self) -> Result<Vec<RobotInfo>, ToolkitError> {
        Ok(locked(&self.state).robots.clone())
    }

    async fn ip_address(&self, info: &RobotInfo) -> Result<Robot, ToolkitError> {
        let state = locked(&self.state);
        let known = state.robots.iter().any(|r| r.id == info.id);
        if !known {
            return Err(ToolkitError::Discovery(format!(
                "robot {:?} is not on this account",
                info.id
            )));
        }
        let (ip, port) = state.address.clone();
        Ok(Robot::new(ip, port, info.clone()))
    }

    async fn certificate(&self, _robot: &Robot) -> Result<Certificate, ToolkitError> {
        let mut state = locked(&self.state);
        state.certificates = state.certificates.saturating_add(1);
        match &state.certificate_failure {
            Some(error) => Err(error.clone()),
            None => Ok(Certificate::new(b"memory-certificate".to_vec())),
        }
    }
}

#[derive(Debug)]
struct MediaState {
    photo: Result<Vec<u8>, ToolkitError>,
    frames: Vec<Vec<u8>>,
    hold_open: bool,
    stream_failure: Option<ToolkitError>,
    requests: Vec<String>,
    live: Arc<()>,
}

/// Media server double serving canned bytes.
#[derive(Debug)]
pub struct MemoryMediaFetcher {
    state: Mutex<MediaState>,
}

impl Default for MemoryMediaFetcher {
    fn default() -> Self {
        Self {
            state: Mutex::new(MediaState {
                photo: Ok(vec![0xFF, 0xD8, 0xFF, 0xE0]),
                frames: vec![vec![1, 1], vec![2, 2], vec![3, 3]],
                hold_open: true,
                stream_failure: None,
                requests: Vec::new(),
                live: Arc::new(()),
            }),
        }
    }
}

impl MemoryMediaFetcher {
    /// Creates a fetcher serving a small photo and three video frames.
    ///
    /// The video stream stays open after the last frame until the
    /// consuming task is aborted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the photo bytes or failure.
    pub fn set_photo(&self, photo: Result<Vec<u8>, ToolkitError>) {
        locked(&self.state).photo = photo;
    }

    /// Sets the video frames and whether the stream ends after them.
    pub fn set_frames(&self, frames: Vec<Vec<u8>>, hold_open: bool) {
        let mut state = locked(&self.state);
        state.frames = frames;
        state.hold_open = hold_open;
    }

    /// Makes every stream request fail with `error`.
    pub fn fail_streams(&self, error: ToolkitError) {
        locked(&self.state).stream_failure = Some(error);
    }

    /// Every URL requested, in order.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        locked(&self.state).requests.clone()
    }

    /// Number of video streams handed out and not yet dropped.
    #[must_use]
    pub fn open_streams(&self) -> usize {
        Arc::strong_count(&locked(&self.state).live).saturating_sub(1)
    }
}

#[async_trait]
impl MediaFetcher for MemoryMediaFetcher {
    async fn fetch_photo(
        &self,
        url: &str,
        _certificate: &Certificate,
    ) -> Result<Vec<u8>, ToolkitError> {
        let mut state = locked(&self.state);
        state.requests.push(url.to_string());
        state.photo.clone()
    }

    async fn stream_video(
        &self,
        url: &str,
        _certificate: &Certificate,
    ) -> Result<FrameStream, ToolkitError> {
        let mut state = locked(&self.state);
        state.requests.push(url.to_string());
        if let Some(error) = &state.stream_failure {
            return Err(error.clone());
        }
        let live = Arc::clone(&state.live);
        let frames = stream::iter(state.frames.clone().into_iter().map(Ok)).map(move |frame| {
            let _open = &live;
            frame
        });
        if state.hold_open {
            Ok(frames.chain(stream::pending()).boxed())
        } else {
            Ok(frames.boxed())
        }
    }
}
