//! Line-oriented document format for entries.
//!
//! Each document is a `key: value` header block, a `---` separator, and a body.
//! Decisions lay their body out as fixed `## Context` / `## Decision` /
//! `## Consequences` sections. Everything is plain text so git's line merge works.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::error::{Result, StoreError};
use crate::store::paths;
use crate::store::types::{
    DecisionContent, DecisionStatus, Entry, EntryContent, EntryKind, KnowledgeContent,
    SkillContent,
};

const SEPARATOR: &str = "---";
const CONTEXT_HEADING: &str = "## Context";
const DECISION_HEADING: &str = "## Decision";
const CONSEQUENCES_HEADING: &str = "## Consequences";

/// Serialize an entry to its on-disk text. The body always ends with exactly one
/// extra newline, which [`parse`] strips.
pub fn encode(entry: &Entry) -> String {
    let mut out = String::new();
    let mut header = |key: &str, value: &str| {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    };

    match &entry.content {
        EntryContent::Knowledge(k) => header("key", &k.key),
        EntryContent::Decision(d) => {
            header("id", &entry.id);
            header("title", &d.title);
            header("status", d.status.as_str());
        }
        EntryContent::Skill(s) => {
            header("name", &s.name);
            header("description", &s.description);
        }
    }
    header("revision", &entry.revision.to_string());
    header("created_at", &format_time(&entry.created_at));
    header("updated_at", &format_time(&entry.updated_at));

    out.push_str(SEPARATOR);
    out.push('\n');

    match &entry.content {
        EntryContent::Knowledge(k) => out.push_str(&k.content),
        EntryContent::Decision(d) => {
            out.push_str(&format!(
                "{CONTEXT_HEADING}\n\n{}\n\n{DECISION_HEADING}\n\n{}\n\n{CONSEQUENCES_HEADING}\n\n{}",
                d.context, d.decision, d.consequences
            ));
        }
        EntryContent::Skill(s) => out.push_str(&s.instructions),
    }
    out.push('\n');
    out
}

/// Parse a document back into an entry. `id` comes from the path.
pub fn parse(kind: EntryKind, id: &str, text: &str) -> Result<Entry> {
    let malformed = |msg: &str| StoreError::validation(kind, format!("{id}: {msg}"));

    let (header_text, body) =
        split_document(text).ok_or_else(|| malformed("missing header separator"))?;
    let body = body.strip_suffix('\n').unwrap_or(body);
    let header = Header::new(kind, id, header_text);

    let revision: u64 = header
        .required("revision")?
        .trim()
        .parse()
        .map_err(|_| malformed("revision is not a number"))?;
    let created_at =
        parse_time(header.required("created_at")?).ok_or_else(|| malformed("bad created_at"))?;
    let updated_at =
        parse_time(header.required("updated_at")?).ok_or_else(|| malformed("bad updated_at"))?;

    let content = match kind {
        EntryKind::Knowledge => EntryContent::Knowledge(KnowledgeContent {
            key: header.required("key")?.to_string(),
            content: body.to_string(),
        }),
        EntryKind::Decision => {
            let (context, decision, consequences) =
                split_sections(body).ok_or_else(|| malformed("decision sections are malformed"))?;
            let status: DecisionStatus = match header.get("status") {
                Some(s) => s.trim().parse().map_err(|e: String| malformed(&e))?,
                None => DecisionStatus::default(),
            };
            EntryContent::Decision(DecisionContent {
                title: header.required("title")?.to_string(),
                context,
                decision,
                consequences,
                status,
            })
        }
        EntryKind::Skill => EntryContent::Skill(SkillContent {
            name: header.required("name")?.to_string(),
            description: header.required("description")?.to_string(),
            instructions: body.to_string(),
        }),
    };

    Ok(Entry {
        id: id.to_string(),
        kind,
        content,
        created_at,
        updated_at,
        revision,
    })
}

/// `key: value` lines preceding the separator.
struct Header<'a> {
    kind: EntryKind,
    id: &'a str,
    fields: Vec<(&'a str, &'a str)>,
}

impl<'a> Header<'a> {
    fn new(kind: EntryKind, id: &'a str, text: &'a str) -> Self {
        let fields = text
            .lines()
            .filter_map(|line| {
                let (k, v) = line.split_once(": ").or_else(|| line.split_once(':'))?;
                Some((k.trim(), v))
            })
            .collect();
        Self { kind, id, fields }
    }

    fn get(&self, key: &str) -> Option<&'a str> {
        self.fields.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    fn required(&self, key: &str) -> Result<&'a str> {
        self.get(key).ok_or_else(|| {
            StoreError::validation(
                self.kind,
                format!("{}: missing header field `{key}`", self.id),
            )
        })
    }
}

/// Validate a payload before anything is written. Returns the id the payload
/// implies (`None` for sequential kinds, whose id is allocated later).
pub fn validate(content: &EntryContent) -> Result<Option<String>> {
    let kind = content.kind();
    let fail = |msg: String| Err(StoreError::validation(kind, msg));

    match content {
        EntryContent::Knowledge(k) => {
            if !paths::is_slug(&k.key) {
                return fail(format!(
                    "key `{}` must be 1-{} lowercase letters, digits, '-' or '_'",
                    k.key,
                    paths::MAX_SLUG_LEN
                ));
            }
            require_text(kind, "content", &k.content)?;
            Ok(Some(k.key.clone()))
        }
        EntryContent::Decision(d) => {
            require_single_line(kind, "title", &d.title)?;
            for (field, value) in [
                ("context", &d.context),
                ("decision", &d.decision),
                ("consequences", &d.consequences),
            ] {
                require_text(kind, field, value)?;
                if value.lines().any(|l| {
                    l == CONTEXT_HEADING || l == DECISION_HEADING || l == CONSEQUENCES_HEADING
                }) {
                    return fail(format!("{field} must not contain a section heading line"));
                }
            }
            Ok(None)
        }
        EntryContent::Skill(s) => {
            let name = s.name.to_ascii_lowercase();
            if !paths::is_slug(&name) {
                return fail(format!(
                    "name `{}` must be 1-{} letters, digits, '-' or '_'",
                    s.name,
                    paths::MAX_SLUG_LEN
                ));
            }
            require_single_line(kind, "description", &s.description)?;
            require_text(kind, "instructions", &s.instructions)?;
            Ok(Some(name))
        }
    }
}

/// SHA-256 of the encoded document, hex encoded.
pub fn digest(entry: &Entry) -> String {
    digest_bytes(encode(entry).as_bytes())
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn require_text(kind: EntryKind, field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(StoreError::validation(kind, format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_single_line(kind: EntryKind, field: &str, value: &str) -> Result<()> {
    require_text(kind, field, value)?;
    if value.contains('\n') || value.contains('\r') {
        return Err(StoreError::validation(kind, format!("{field} must be a single line")));
    }
    if value.trim() != value {
        return Err(StoreError::validation(
            kind,
            format!("{field} must not have leading or trailing whitespace"),
        ));
    }
    Ok(())
}

fn split_document(text: &str) -> Option<(&str, &str)> {
    if let Some(rest) = text.strip_prefix("---\n") {
        return Some(("", rest));
    }
    let idx = text.find("\n---\n")?;
    Some((&text[..idx], &text[idx + 5..]))
}

fn split_sections(body: &str) -> Option<(String, String, String)> {
    let rest = body.strip_prefix(&format!("{CONTEXT_HEADING}\n\n"))?;
    let (context, rest) = rest.split_once(&format!("\n\n{DECISION_HEADING}\n\n"))?;
    let (decision, consequences) = rest.split_once(&format!("\n\n{CONSEQUENCES_HEADING}\n\n"))?;
    Some((context.to_string(), decision.to_string(), consequences.to_string()))
}

fn format_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn parse_time(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
