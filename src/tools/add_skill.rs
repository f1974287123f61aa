use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AddSkillParams {
    #[schemars(description = "Skill name (a-z, 0-9, '-', '_'), e.g. 'deploy-staging'")]
    pub name: String,

    #[schemars(description = "One-line description of when to use the skill")]
    pub description: String,

    #[schemars(description = "Step-by-step instructions in markdown")]
    pub instructions: String,
}
