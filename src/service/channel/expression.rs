//! Head movement and speech.

use super::CommandChannel;
use crate::domain::callback_info::{LookAtAchievedInfo, SayCompletedInfo};
use crate::domain::{Command, LookAt, TransactionId, TransactionKind};
use crate::error::ToolkitError;

impl CommandChannel {
    /// Turns the head toward `target`.
    ///
    /// Completes once with [`LookAtAchievedInfo`], or with
    /// [`ToolkitError::Device`] if the tracked entity is lost.
    pub fn look_at(
        &self,
        target: LookAt,
        completion: impl FnMut(Result<LookAtAchievedInfo, ToolkitError>) + Send + 'static,
    ) -> Option<TransactionId> {
        self.issue(
            TransactionKind::SingleShot,
            Command::LookAt(target),
            Box::new(completion),
        )
    }

    /// Speaks `phrase`. Completes once the robot stops talking.
    pub fn say(
        &self,
        phrase: impl Into<String>,
        completion: impl FnMut(Result<SayCompletedInfo, ToolkitError>) + Send + 'static,
    ) -> Option<TransactionId> {
        self.issue(
            TransactionKind::SingleShot,
            Command::Say {
                phrase: phrase.into(),
            },
            Box::new(completion),
        )
    }
}
