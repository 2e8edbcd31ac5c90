//! Collaborator boundaries: the command socket, the account service, and
//! the media side channel.
//!
//! The session core only ever talks to these traits. Real socket,
//! token-exchange and HTTPS implementations live outside this crate;
//! [`memory`] provides recording in-process implementations used by the
//! test suites and the demo binary.

pub mod memory;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio::sync::oneshot;

use crate::domain::{CommandRequest, Robot, RobotInfo, TransactionId};
use crate::error::ToolkitError;
use crate::service::InboundSink;

/// Stream of raw video frames from the media side channel.
pub type FrameStream = BoxStream<'static, Result<Vec<u8>, ToolkitError>>;

/// Future that settles once, when the transport confirms (or fails) a send.
///
/// If the transport drops its [`AckSender`] without settling, the
/// acknowledgement resolves to [`ToolkitError::TransportSend`].
#[derive(Debug)]
#[must_use = "an acknowledgement does nothing unless awaited"]
pub struct Acknowledgement {
    receiver: oneshot::Receiver<Result<(), ToolkitError>>,
}

impl Future for Acknowledgement {
    type Output = Result<(), ToolkitError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|settled| {
            settled.unwrap_or_else(|_| {
                Err(ToolkitError::TransportSend(
                    "acknowledgement dropped".to_string(),
                ))
            })
        })
    }
}

/// Transport-side half of an [`Acknowledgement`].
#[derive(Debug)]
pub struct AckSender {
    sender: oneshot::Sender<Result<(), ToolkitError>>,
}

impl AckSender {
    /// Confirms the command reached the robot.
    pub fn acknowledge(self) {
        let _ = self.sender.send(Ok(()));
    }

    /// Reports that the command could not be sent.
    pub fn fail(self, error: ToolkitError) {
        let _ = self.sender.send(Err(error));
    }
}

/// What [`Transport::send`] hands back for one command.
#[derive(Debug)]
pub struct RequestHandle {
    /// Transaction the command belongs to.
    pub transaction_id: TransactionId,
    /// Settles when the transport has sent (or failed to send) the command.
    pub acknowledged: Acknowledgement,
}

impl RequestHandle {
    /// Creates an unsettled handle and the sender that settles it.
    pub fn new(transaction_id: TransactionId) -> (Self, AckSender) {
        let (sender, receiver) = oneshot::channel();
        let handle = Self {
            transaction_id,
            acknowledged: Acknowledgement { receiver },
        };
        (handle, AckSender { sender })
    }

    /// Creates a handle that is already acknowledged.
    #[must_use]
    pub fn acknowledged(transaction_id: TransactionId) -> Self {
        let (handle, ack) = Self::new(transaction_id);
        ack.acknowledge();
        handle
    }

    /// Creates a handle that has already failed.
    #[must_use]
    pub fn failed(transaction_id: TransactionId, error: ToolkitError) -> Self {
        let (handle, ack) = Self::new(transaction_id);
        ack.fail(error);
        handle
    }
}

/// Short-lived client certificate for the media side channel.
#[derive(Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
}

impl Certificate {
    /// Wraps DER-encoded certificate bytes.
    #[must_use]
    pub const fn new(der: Vec<u8>) -> Self {
        Self { der }
    }

    /// Raw DER bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.der
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("len", &self.der.len())
            .finish()
    }
}

/// The command socket to one robot.
///
/// `send` is synchronous: it queues the request and returns immediately
/// with a handle whose acknowledgement settles later.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Opens the connection. Inbound events are fed to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolkitError::TransportSend`] if the socket cannot be opened.
    async fn connect(&self, robot: &Robot, sink: InboundSink) -> Result<(), ToolkitError>;

    /// Closes the connection. Must be idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket reports a failure while closing.
    async fn disconnect(&self) -> Result<(), ToolkitError>;

    /// Queues one command.
    fn send(&self, request: CommandRequest) -> RequestHandle;

    /// Asks the robot to stop a transaction.
    ///
    /// Returns `true` if the robot reports it cancelled something.
    ///
    /// # Errors
    ///
    /// Returns [`ToolkitError::Cancel`] if the request cannot be delivered.
    async fn cancel(&self, transaction_id: TransactionId) -> Result<bool, ToolkitError>;
}

/// The account service: sign-in, robot discovery, and media certificates.
#[async_trait]
pub trait Authenticator: Send + Sync + fmt::Debug {
    /// Runs the sign-in flow. `Ok(false)` means the user declined.
    ///
    /// # Errors
    ///
    /// Returns [`ToolkitError::Authentication`] if the token exchange fails.
    async fn authenticate(&self) -> Result<bool, ToolkitError>;

    /// Drops any stored credentials.
    ///
    /// # Errors
    ///
    /// Returns [`ToolkitError::Authentication`] if revocation fails.
    async fn invalidate(&self) -> Result<(), ToolkitError>;

    /// Lists robots on the signed-in account.
    ///
    /// # Errors
    ///
    /// Returns [`ToolkitError::Discovery`] if the list cannot be fetched.
    async fn robots(&self) -> Result<Vec<RobotInfo>, ToolkitError>;

    /// Resolves the address of an account robot.
    ///
    /// # Errors
    ///
    /// Returns [`ToolkitError::Discovery`] if the robot cannot be located.
    async fn ip_address(&self, info: &RobotInfo) -> Result<Robot, ToolkitError>;

    /// Fetches a certificate for the robot's media server.
    ///
    /// # Errors
    ///
    /// Returns [`ToolkitError::CertificateFetch`] on failure.
    async fn certificate(&self, robot: &Robot) -> Result<Certificate, ToolkitError>;
}

/// The media side channel.
#[async_trait]
pub trait MediaFetcher: Send + Sync + fmt::Debug {
    /// Downloads one photo.
    ///
    /// # Errors
    ///
    /// Returns [`ToolkitError::MediaFetch`] on failure.
    async fn fetch_photo(&self, url: &str, certificate: &Certificate)
    -> Result<Vec<u8>, ToolkitError>;

    /// Opens a video stream. Frames arrive until the stream ends or the
    /// consuming task is aborted.
    ///
    /// # Errors
    ///
    /// Returns [`ToolkitError::MediaFetch`] if the stream cannot be opened.
    async fn stream_video(
        &self,
        url: &str,
        certificate: &Certificate,
    ) -> Result<FrameStream, ToolkitError>;
}
