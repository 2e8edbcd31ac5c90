//! Screen views.

use super::CommandChannel;
use crate::domain::callback_info::DisplayInfo;
use crate::domain::command::DisplayView;
use crate::domain::{Command, TransactionId, TransactionKind};
use crate::error::ToolkitError;

impl CommandChannel {
    /// Replaces what is on screen with `view`.
    pub fn swap_view(
        &self,
        view: impl Into<DisplayView>,
        completion: impl FnMut(Result<DisplayInfo, ToolkitError>) + Send + 'static,
    ) -> Option<TransactionId> {
        self.issue(
            TransactionKind::SingleShot,
            Command::Display { view: view.into() },
            Box::new(completion),
        )
    }
}
