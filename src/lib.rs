//! Shared, git-backed project context for AI coding agents.
//!
//! ctxvault keeps a project's knowledge notes, architecture decision records,
//! and reusable skills as plain markdown documents in a dedicated git branch,
//! and serves them to agents over [MCP](https://modelcontextprotocol.io/).
//! Teammates' agents exchange context by syncing that branch.
//!
//! | Kind | Id | File |
//! |------|----|------|
//! | **Knowledge** | key slug | `knowledge/<key>.md` |
//! | **Decision** | `ADR-NNNN` (allocated) | `decisions/<id>.md` |
//! | **Skill** | name slug | `skills/<name>/SKILL.md` |
//!
//! # Architecture
//!
//! - **Storage**: documents on disk are the source of truth; every write is an
//!   atomic rename under an exclusive OS lock on `state/lock`
//! - **Search**: a derived SQLite keyword index, rebuildable from the documents
//! - **Sync**: commit, pull, merge, push over the `git` CLI; conflicting edits
//!   keep the local version in place and park the remote one in a conflict copy
//! - **Transport**: MCP over stdio (primary) or streamable HTTP
//!
//! # Modules
//!
//! - [`store`]: Entry CRUD, document format, and crash recovery
//! - [`manifest`]: Project metadata, id counters, and last-sync state
//! - [`index`]: Keyword search index
//! - [`vcs`]: Version control abstraction with git and in-memory backends
//! - [`sync`]: Sync state machine and conflict policy
//! - [`session`]: Agent sessions and the onboarding summary
//! - [`resources`]: `context://` read surface
//! - [`adapters`]: MCP client config writers for agent tools
//! - [`config`]: Configuration loading from TOML files and environment variables

pub mod adapters;
pub mod config;
pub mod error;
pub mod fsio;
pub mod index;
pub mod lock;
pub mod manifest;
pub mod resources;
pub mod session;
pub mod store;
pub mod sync;
pub mod vcs;
