//! Standing subscriptions to the robot's senses.
//!
//! Each subscription delivers every matching event until the session
//! cancels it.

use super::CommandChannel;
use crate::domain::callback_info::{HeadTouchInfo, MotionInfo, TrackedEntityInfo};
use crate::domain::{Command, TransactionId, TransactionKind};
use crate::error::ToolkitError;

impl CommandChannel {
    /// Reports motion in the robot's field of view.
    pub fn subscribe_motion(
        &self,
        completion: impl FnMut(Result<MotionInfo, ToolkitError>) + Send + 'static,
    ) -> Option<TransactionId> {
        self.issue(TransactionKind::Standing, Command::Motion, Box::new(completion))
    }

    /// Reports head touches.
    pub fn subscribe_head_touch(
        &self,
        completion: impl FnMut(Result<HeadTouchInfo, ToolkitError>) + Send + 'static,
    ) -> Option<TransactionId> {
        self.issue(
            TransactionKind::Standing,
            Command::HeadTouch,
            Box::new(completion),
        )
    }

    /// Reports faces as they are gained, move, and are lost.
    pub fn subscribe_face(
        &self,
        completion: impl FnMut(Result<TrackedEntityInfo, ToolkitError>) + Send + 'static,
    ) -> Option<TransactionId> {
        self.issue(TransactionKind::Standing, Command::Entity, Box::new(completion))
    }
}
