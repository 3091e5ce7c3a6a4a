//! Update events and typed patch dispatch.
//!
//! An [`UpdatePayload`] is what a client submits; a [`StoredUpdate`] is the
//! immutable journal record after the server assigns its timestamp. The
//! `(type, action)` pair of an update resolves to a [`PatchOp`] through a
//! closed enum table, so adding or misspelling an entity kind is caught by
//! the compiler instead of silently matching nothing at runtime. Pairs that
//! do not resolve are deliberate no-ops: newer clients may emit kinds this
//! server does not fold into canonical state yet.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::SyncError;

/// Source recorded when a client omits one.
pub const DEFAULT_SOURCE: &str = "unknown";

/// A client-submitted change notification, before acceptance.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UpdatePayload {
    /// Entity kind (`"task"`, `"note"`, ...). Free-form on the wire.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Action (`"create"`, `"update"`, `"delete"`, ...).
    #[serde(default)]
    pub action: String,
    /// Entity payload. `Null` when the client omitted it.
    #[serde(default)]
    pub data: Value,
    /// Originating client, if declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl UpdatePayload {
    /// Create a payload with the default source.
    #[must_use]
    pub fn new(kind: impl Into<String>, action: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            action: action.into(),
            data,
            source: None,
        }
    }

    /// Set the originating client.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Validate acceptance requirements: non-empty `type` and `action`,
    /// non-null `data`.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.kind.is_empty() || self.action.is_empty() || self.data.is_null() {
            return Err(SyncError::invalid("Missing type, action, or data"));
        }
        Ok(())
    }

    /// The declared source, or [`DEFAULT_SOURCE`].
    #[must_use]
    pub fn source_or_default(&self) -> &str {
        self.source.as_deref().unwrap_or(DEFAULT_SOURCE)
    }
}

/// An accepted journal record. Immutable once appended; `ts` is assigned by
/// the server at acceptance time (client-supplied timestamps are ignored).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredUpdate {
    /// Server-assigned ISO-8601 timestamp.
    pub ts: String,
    /// Entity kind.
    #[serde(rename = "type")]
    pub kind: String,
    /// Action.
    pub action: String,
    /// Originating client.
    pub source: String,
    /// Entity payload.
    pub data: Value,
}

// ─────────────────────────────────────────────────────────────────────────────
// Patch dispatch
// ─────────────────────────────────────────────────────────────────────────────

/// Entity kinds that fold into canonical state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityKind {
    /// Document entry → `documents`.
    Document,
    /// Task entry → `tasks` (fields shallow-merge on update).
    Task,
    /// Activity log entry → `logs` (append-only).
    Log,
    /// Workflow entry → `workflows`.
    Workflow,
    /// Goal entry → `goals`.
    Goal,
    /// Note entry → `notes` (insert-if-absent, explicit delete).
    Note,
    /// Connected-system card → `connectedSystems`.
    ConnectedSystems,
}

impl EntityKind {
    /// Parse a wire `type` string. Unknown strings return `None`.
    #[must_use]
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "document" => Some(Self::Document),
            "task" => Some(Self::Task),
            "log" => Some(Self::Log),
            "workflow" => Some(Self::Workflow),
            "goal" => Some(Self::Goal),
            "note" => Some(Self::Note),
            "connectedSystems" => Some(Self::ConnectedSystems),
            _ => None,
        }
    }

    /// Canonical-state collection this kind lives in.
    #[must_use]
    pub fn collection(self) -> &'static str {
        match self {
            Self::Document => "documents",
            Self::Task => "tasks",
            Self::Log => "logs",
            Self::Workflow => "workflows",
            Self::Goal => "goals",
            Self::Note => "notes",
            Self::ConnectedSystems => "connectedSystems",
        }
    }
}

/// Actions recognized by the patch layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    /// Insert (alias of create).
    Add,
    /// Insert.
    Create,
    /// Modify an existing entry.
    Update,
    /// Remove an entry by id.
    Delete,
}

impl ActionKind {
    /// Parse a wire `action` string. Unknown strings return `None`.
    #[must_use]
    pub fn parse(action: &str) -> Option<Self> {
        match action {
            "add" => Some(Self::Add),
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// A resolved patch operation against one tracked collection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchOp {
    /// Replace the entry with a matching `id`, or append when absent.
    /// With `merge_fields`, new fields shallow-merge over the old entry
    /// instead of replacing it wholesale.
    Upsert {
        /// Target collection.
        collection: &'static str,
        /// Shallow-merge instead of wholesale replace.
        merge_fields: bool,
    },
    /// Append unconditionally (chronological collections).
    Append {
        /// Target collection.
        collection: &'static str,
    },
    /// Append only when no entry shares the `id`.
    InsertIfAbsent {
        /// Target collection.
        collection: &'static str,
    },
    /// Remove the entry with the matching `id`. The only deletion path.
    Remove {
        /// Target collection.
        collection: &'static str,
    },
}

impl PatchOp {
    /// Resolve a `(type, action)` pair to its patch operation.
    ///
    /// `None` means the pair is tolerated but not folded into canonical
    /// state — the caller records a no-op rather than an error.
    #[must_use]
    pub fn resolve(kind: &str, action: &str) -> Option<Self> {
        let kind = EntityKind::parse(kind)?;
        let action = ActionKind::parse(action)?;
        let collection = kind.collection();
        match (kind, action) {
            (EntityKind::Task, ActionKind::Add | ActionKind::Create | ActionKind::Update) => {
                Some(Self::Upsert {
                    collection,
                    merge_fields: true,
                })
            }
            (
                EntityKind::Document
                | EntityKind::Workflow
                | EntityKind::Goal
                | EntityKind::ConnectedSystems,
                ActionKind::Add | ActionKind::Create | ActionKind::Update,
            ) => Some(Self::Upsert {
                collection,
                merge_fields: false,
            }),
            (EntityKind::Log, ActionKind::Add | ActionKind::Create) => {
                Some(Self::Append { collection })
            }
            (EntityKind::Note, ActionKind::Add | ActionKind::Create) => {
                Some(Self::InsertIfAbsent { collection })
            }
            (EntityKind::Note | EntityKind::Task, ActionKind::Delete) => {
                Some(Self::Remove { collection })
            }
            // Logs are append-only; other kinds have no sanctioned delete,
            // and note updates were never supported.
            (EntityKind::Log, ActionKind::Update | ActionKind::Delete)
            | (EntityKind::Note, ActionKind::Update)
            | (
                EntityKind::Document
                | EntityKind::Workflow
                | EntityKind::Goal
                | EntityKind::ConnectedSystems,
                ActionKind::Delete,
            ) => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
