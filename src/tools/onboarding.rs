use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct OnboardingParams {
    #[schemars(description = "Number of recently updated entries to include. Defaults to the configured value.")]
    pub recent_items: Option<usize>,

    #[schemars(description = "Number of recent sync events to include. Defaults to the configured value.")]
    pub recent_syncs: Option<usize>,

    #[schemars(description = "If set, also start a session for this agent and return its id")]
    pub agent: Option<String>,
}
