//! Asset caching on the robot.

use super::CommandChannel;
use crate::domain::callback_info::FetchAssetInfo;
use crate::domain::{Command, TransactionId, TransactionKind};
use crate::error::ToolkitError;

impl CommandChannel {
    /// Asks the robot to download `uri` into its cache under `name`.
    ///
    /// Fails with [`ToolkitError::Device`] if the robot cannot fetch it.
    pub fn load_asset(
        &self,
        uri: impl Into<String>,
        name: impl Into<String>,
        completion: impl FnMut(Result<FetchAssetInfo, ToolkitError>) + Send + 'static,
    ) -> Option<TransactionId> {
        self.issue(
            TransactionKind::SingleShot,
            Command::FetchAsset {
                uri: uri.into(),
                name: name.into(),
            },
            Box::new(completion),
        )
    }
}
