//! Robot configuration.

use super::CommandChannel;
use crate::domain::callback_info::{GetConfigInfo, SetConfigInfo};
use crate::domain::command::SetConfigOptions;
use crate::domain::{Command, TransactionId, TransactionKind};
use crate::error::ToolkitError;

impl CommandChannel {
    /// Reads volume, battery and wifi status.
    pub fn get_config(
        &self,
        completion: impl FnMut(Result<GetConfigInfo, ToolkitError>) + Send + 'static,
    ) -> Option<TransactionId> {
        self.issue(
            TransactionKind::SingleShot,
            Command::GetConfig,
            Box::new(completion),
        )
    }

    /// Applies `options`.
    pub fn set_config(
        &self,
        options: SetConfigOptions,
        completion: impl FnMut(Result<SetConfigInfo, ToolkitError>) + Send + 'static,
    ) -> Option<TransactionId> {
        self.issue(
            TransactionKind::SingleShot,
            Command::SetConfig { options },
            Box::new(completion),
        )
    }
}
