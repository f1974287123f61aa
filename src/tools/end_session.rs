use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EndSessionParams {
    #[schemars(description = "Session id returned by onboarding")]
    pub session_id: String,

    #[schemars(description = "Short summary of what was done in the session")]
    pub summary: Option<String>,
}
