use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters shared by `sync_push` and `sync_pull`.
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct SyncParams {
    #[schemars(description = "Optional note recorded in the tool log, e.g. why the sync was started")]
    pub reason: Option<String>,
}
