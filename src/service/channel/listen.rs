//! Speech recognition and screen gestures.

use super::CommandChannel;
use crate::domain::callback_info::{ListenInfo, ScreenGestureInfo};
use crate::domain::command::{ListenParams, ScreenGestureParams};
use crate::domain::{Command, TransactionId, TransactionKind};
use crate::error::ToolkitError;

impl CommandChannel {
    /// Listens for one utterance.
    ///
    /// Completes once with the recognised speech, or with a stop reason
    /// when the robot gives up.
    pub fn listen_for_speech(
        &self,
        params: ListenParams,
        completion: impl FnMut(Result<ListenInfo, ToolkitError>) + Send + 'static,
    ) -> Option<TransactionId> {
        self.issue(
            TransactionKind::SingleShot,
            Command::Listen(params),
            Box::new(completion),
        )
    }

    /// Reports screen taps or swipes until cancelled.
    pub fn listen_for_gesture(
        &self,
        params: ScreenGestureParams,
        completion: impl FnMut(Result<ScreenGestureInfo, ToolkitError>) + Send + 'static,
    ) -> Option<TransactionId> {
        self.issue(
            TransactionKind::Standing,
            Command::ScreenGesture(params),
            Box::new(completion),
        )
    }
}
