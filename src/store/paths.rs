//! On-disk layout of a context store.
//!
//! Every entry lives at a path derived from its kind and id, so paths are stable
//! per entry and the version-control layer can reason about changes by path alone.

use crate::store::types::EntryKind;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const GITIGNORE_FILE: &str = ".gitignore";
pub const STATE_DIR: &str = "state";
pub const SESSIONS_DIR: &str = "sessions";
pub const SKILL_FILE: &str = "SKILL.md";

/// Files under `state/`.
pub const INDEX_FILE: &str = "index.db";
pub const SYNC_MARKER_FILE: &str = "sync.marker.json";
pub const CONFLICTS_FILE: &str = "conflicts.json";
pub const SYNC_LOG_FILE: &str = "sync.log.jsonl";

const CONFLICT_SUFFIX: &str = ".conflict.md";

/// Paths committed to the context branch.
pub const TRACKED_PATHS: [&str; 6] = [
    GITIGNORE_FILE,
    MANIFEST_FILE,
    "decisions",
    "knowledge",
    "skills",
    SESSIONS_DIR,
];

/// Contents written to the store's `.gitignore`.
pub const GITIGNORE: &str = "# local bookkeeping, never shared\nstate/\n*.conflict.md\n*.tmp\n";

/// Longest accepted knowledge key or skill name.
pub const MAX_SLUG_LEN: usize = 64;

/// Store-relative path of an entry document.
pub fn entry_path(kind: EntryKind, id: &str) -> String {
    match kind {
        EntryKind::Knowledge => format!("knowledge/{id}.md"),
        EntryKind::Decision => format!("decisions/{id}.md"),
        EntryKind::Skill => format!("skills/{id}/{SKILL_FILE}"),
    }
}

/// Map a store-relative path back to the entry it holds, if any.
///
/// Conflict copies and other siblings do not classify.
pub fn classify(path: &str) -> Option<(EntryKind, String)> {
    let parts: Vec<&str> = path.split('/').collect();
    match parts.as_slice() {
        ["knowledge", file] => {
            let key = file.strip_suffix(".md")?;
            is_slug(key).then(|| (EntryKind::Knowledge, key.to_string()))
        }
        ["decisions", file] => {
            let id = file.strip_suffix(".md")?;
            parse_decision_id(id).map(|_| (EntryKind::Decision, id.to_string()))
        }
        ["skills", name, file] if *file == SKILL_FILE => {
            is_slug(name).then(|| (EntryKind::Skill, name.to_string()))
        }
        _ => None,
    }
}

/// Sibling path holding the remote variant of a conflicted document.
///
/// `decisions/ADR-0003.md` becomes `decisions/ADR-0003.conflict.md`.
pub fn conflict_copy_path(path: &str) -> String {
    match path.strip_suffix(".md") {
        Some(stem) => format!("{stem}{CONFLICT_SUFFIX}"),
        None => format!("{path}{CONFLICT_SUFFIX}"),
    }
}

/// Whether a path is excluded from history by the store's `.gitignore`.
pub fn is_ignored(path: &str) -> bool {
    path == STATE_DIR
        || path.starts_with("state/")
        || path.ends_with(CONFLICT_SUFFIX)
        || path.ends_with(".tmp")
}

/// Format a decision sequence number as its id.
pub fn decision_id(number: u64) -> String {
    format!("ADR-{number:04}")
}

/// Parse `ADR-NNNN` (at least four digits) into its sequence number.
pub fn parse_decision_id(id: &str) -> Option<u64> {
    let digits = id.strip_prefix("ADR-")?;
    if digits.len() < 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Lowercase ASCII letters, digits, `-` and `_`, starting with a letter or digit.
pub fn is_slug(s: &str) -> bool {
    let mut bytes = s.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_lowercase() || b.is_ascii_digit() => {}
        _ => return false,
    }
    s.len() <= MAX_SLUG_LEN
        && bytes.all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
}
