//! Core entry type definitions.
//!
//! Defines [`EntryKind`] (the three stored context categories), the kind-specific
//! payloads ([`KnowledgeContent`], [`DecisionContent`], [`SkillContent`]) wrapped in
//! [`EntryContent`], and [`Entry`] (a full record with identity and revision).

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// The three kinds of stored context.
///
/// Variant order is alphabetical so that the derived `Ord` agrees with the
/// string ordering used by the search index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Architecture decision records, sequentially numbered (`ADR-0001`).
    Decision,
    /// Free-form notes keyed by a human-chosen slug.
    Knowledge,
    /// Reusable skill definitions keyed by name.
    Skill,
}

impl EntryKind {
    pub const ALL: [EntryKind; 3] = [Self::Decision, Self::Knowledge, Self::Skill];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decision => "decision",
            Self::Knowledge => "knowledge",
            Self::Skill => "skill",
        }
    }

    /// Top-level directory holding this kind's documents.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Decision => "decisions",
            Self::Knowledge => "knowledge",
            Self::Skill => "skills",
        }
    }

    /// Whether ids for this kind come from a manifest counter.
    pub fn is_sequential(&self) -> bool {
        matches!(self, Self::Decision)
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "decision" | "decisions" | "adr" => Ok(Self::Decision),
            "knowledge" => Ok(Self::Knowledge),
            "skill" | "skills" => Ok(Self::Skill),
            _ => Err(format!("unknown entry kind: {s}")),
        }
    }
}

/// Lifecycle status of a decision record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Proposed,
    #[default]
    Accepted,
    Superseded,
    Deprecated,
}

impl DecisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::Accepted => "accepted",
            Self::Superseded => "superseded",
            Self::Deprecated => "deprecated",
        }
    }
}

impl std::fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DecisionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "proposed" => Ok(Self::Proposed),
            "accepted" => Ok(Self::Accepted),
            "superseded" => Ok(Self::Superseded),
            "deprecated" => Ok(Self::Deprecated),
            _ => Err(format!("unknown decision status: {s}")),
        }
    }
}

/// Free-text note. The key becomes the entry id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeContent {
    pub key: String,
    pub content: String,
}

/// Architecture decision record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionContent {
    pub title: String,
    pub context: String,
    pub decision: String,
    pub consequences: String,
    #[serde(default)]
    pub status: DecisionStatus,
}

/// Reusable skill. The name becomes the entry id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillContent {
    pub name: String,
    pub description: String,
    pub instructions: String,
}

/// Kind-specific payload of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryContent {
    Knowledge(KnowledgeContent),
    Decision(DecisionContent),
    Skill(SkillContent),
}

impl EntryContent {
    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Knowledge(_) => EntryKind::Knowledge,
            Self::Decision(_) => EntryKind::Decision,
            Self::Skill(_) => EntryKind::Skill,
        }
    }
}

/// A stored context entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Kind-scoped identifier: knowledge key, `ADR-NNNN`, or skill name.
    pub id: String,
    pub kind: EntryKind,
    pub content: EntryContent,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Starts at 1, incremented on every local mutation.
    pub revision: u64,
}

impl Entry {
    /// Short human-readable label: the key, decision title, or skill name.
    pub fn title(&self) -> &str {
        match &self.content {
            EntryContent::Knowledge(k) => &k.key,
            EntryContent::Decision(d) => &d.title,
            EntryContent::Skill(s) => &s.name,
        }
    }

    /// Text lines fed to the search index. Line 0 is the title field and gets
    /// boosted; the rest is body text.
    pub fn search_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        match &self.content {
            EntryContent::Knowledge(k) => {
                lines.push(k.key.clone());
                lines.extend(k.content.lines().map(str::to_string));
            }
            EntryContent::Decision(d) => {
                lines.push(d.title.clone());
                for section in [&d.context, &d.decision, &d.consequences] {
                    lines.extend(section.lines().map(str::to_string));
                }
            }
            EntryContent::Skill(s) => {
                lines.push(format!("{} {}", s.name, s.description));
                lines.extend(s.instructions.lines().map(str::to_string));
            }
        }
        lines
    }
}

/// Current time truncated to millisecond precision, which is what the document
/// format stores. Keeps `create` followed by `read` structurally equal.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in EntryKind::ALL {
            assert_eq!(kind.as_str().parse::<EntryKind>().unwrap(), kind);
        }
        assert_eq!("decisions".parse::<EntryKind>().unwrap(), EntryKind::Decision);
        assert!("note".parse::<EntryKind>().is_err());
    }

    #[test]
    fn kind_order_matches_string_order() {
        let mut by_enum = EntryKind::ALL.to_vec();
        by_enum.sort();
        let mut by_str = EntryKind::ALL.to_vec();
        by_str.sort_by_key(|k| k.as_str());
        assert_eq!(by_enum, by_str);
    }

    #[test]
    fn decision_search_lines_put_title_first() {
        let entry = Entry {
            id: "ADR-0001".into(),
            kind: EntryKind::Decision,
            content: EntryContent::Decision(DecisionContent {
                title: "Use Postgres".into(),
                context: "Need a database".into(),
                decision: "Postgres 16".into(),
                consequences: "Ops must run it\nBackups nightly".into(),
                status: DecisionStatus::Accepted,
            }),
            created_at: now(),
            updated_at: now(),
            revision: 1,
        };
        let lines = entry.search_lines();
        assert_eq!(lines[0], "Use Postgres");
        assert_eq!(lines.len(), 5);
    }
}
