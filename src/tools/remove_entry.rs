use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RemoveEntryParams {
    #[schemars(description = "Entry kind: 'knowledge', 'decision', or 'skill'")]
    pub kind: String,

    #[schemars(description = "Entry id: knowledge key, ADR id (e.g. 'ADR-0003'), or skill name")]
    pub id: String,
}
