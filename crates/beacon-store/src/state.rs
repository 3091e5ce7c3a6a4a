//! Canonical state document: additive merge and typed patching.
//!
//! The canonical state is one open JSON document per deployment. Eight
//! *tracked collections* get loss-resistant merge semantics; every other
//! top-level key passes through a full-state upload verbatim.
//!
//! The load-bearing invariant: a full-state replace can never lose a tracked
//! item the server knows about unless the incoming payload names the same
//! `id`. Omitting an item from an upload does NOT delete it — deletion only
//! happens through an explicit `(note|task, delete)` patch. Clients that
//! drop an item locally will see it resurrected on the next full sync.

use beacon_core::errors::PatchError;
use beacon_core::update::{PatchOp, StoredUpdate};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// The canonical state document.
pub type StateDoc = Map<String, Value>;

/// Collections with merge semantics. Items are objects keyed by `id`;
/// order is insertion order (`logs` is chronological).
pub const TRACKED_COLLECTIONS: [&str; 8] = [
    "documents",
    "tasks",
    "logs",
    "workflows",
    "goals",
    "memoryFiles",
    "notes",
    "connectedSystems",
];

/// What a patch did to the document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The update was folded into the named collection.
    Applied(&'static str),
    /// The `(type, action)` pair is not folded into canonical state.
    Ignored,
}

/// Additively merge a full-state upload over the current document.
///
/// Per tracked collection: incoming items win wholesale on `id` collision;
/// server items absent from the incoming payload are appended after the
/// incoming items; a missing or non-sequence incoming value is replaced by
/// the server's sequence. Untracked keys pass through from `incoming`
/// unchanged. Finally the notes sanitation pass runs (see
/// [`sanitize_notes`]).
#[must_use]
pub fn additive_merge(current: &StateDoc, incoming: Value) -> StateDoc {
    let mut incoming = into_doc(incoming);
    for key in TRACKED_COLLECTIONS {
        let Some(current_items) = current.get(key).and_then(Value::as_array) else {
            continue;
        };
        match incoming.get_mut(key) {
            Some(Value::Array(incoming_items)) => {
                let incoming_ids: HashSet<String> = incoming_items
                    .iter()
                    .filter_map(|item| item.get("id"))
                    .filter(|id| id_is_present(id))
                    .map(Value::to_string)
                    .collect();
                for item in current_items {
                    let survives = item
                        .get("id")
                        .is_some_and(|id| id_is_present(id) && !incoming_ids.contains(&id.to_string()));
                    if survives {
                        incoming_items.push(item.clone());
                    }
                }
            }
            _ => {
                let _ = incoming.insert(key.to_string(), Value::Array(current_items.clone()));
            }
        }
    }
    sanitize_notes(&mut incoming);
    incoming
}

/// Drop malformed `notes` entries: `content` missing, non-string, or the
/// literal string `"undefined"` (log entries leaked into notes by old
/// clients serialize that way).
pub fn sanitize_notes(doc: &mut StateDoc) {
    if let Some(Value::Array(notes)) = doc.get_mut("notes") {
        notes.retain(|note| {
            matches!(note.get("content"), Some(Value::String(content)) if content != "undefined")
        });
    }
}

/// Fold one accepted update into the document.
///
/// Unknown `(type, action)` pairs are tolerated no-ops. A tracked collection
/// that holds a non-sequence value is a [`PatchError`]; the caller logs it
/// and the journal append stands (at-least-once application — canonical
/// state stays stale until the next full sync or a retried push).
pub fn apply_patch(doc: &mut StateDoc, update: &StoredUpdate) -> Result<PatchOutcome, PatchError> {
    let Some(op) = PatchOp::resolve(&update.kind, &update.action) else {
        return Ok(PatchOutcome::Ignored);
    };
    let collection = match op {
        PatchOp::Upsert { collection, .. }
        | PatchOp::Append { collection }
        | PatchOp::InsertIfAbsent { collection }
        | PatchOp::Remove { collection } => collection,
    };
    let entry = doc
        .entry(collection.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    let Value::Array(items) = entry else {
        return Err(PatchError::new(
            &update.kind,
            &update.action,
            format!("collection {collection} is not a sequence"),
        ));
    };

    match op {
        PatchOp::Upsert { merge_fields, .. } => {
            let position = update
                .data
                .get("id")
                .and_then(|id| items.iter().position(|item| item.get("id") == Some(id)));
            match position {
                Some(i) if merge_fields => shallow_merge(&mut items[i], &update.data),
                Some(i) => items[i] = update.data.clone(),
                None => items.push(update.data.clone()),
            }
        }
        PatchOp::Append { .. } => items.push(update.data.clone()),
        PatchOp::InsertIfAbsent { .. } => {
            let id = update.data.get("id");
            let exists = id.is_some() && items.iter().any(|item| item.get("id") == id);
            if !exists {
                items.push(update.data.clone());
            }
        }
        PatchOp::Remove { .. } => {
            if let Some(id) = update.data.get("id") {
                items.retain(|item| item.get("id") != Some(id));
            } else {
                return Ok(PatchOutcome::Ignored);
            }
        }
    }
    Ok(PatchOutcome::Applied(collection))
}

/// Shallow-merge `data`'s fields over `target` when both are objects;
/// otherwise replace wholesale.
fn shallow_merge(target: &mut Value, data: &Value) {
    match (target.as_object_mut(), data.as_object()) {
        (Some(existing), Some(new_fields)) => {
            for (k, v) in new_fields {
                let _ = existing.insert(k.clone(), v.clone());
            }
        }
        _ => *target = data.clone(),
    }
}

/// Coerce an arbitrary upload into a document map. Non-object uploads merge
/// as empty documents, so the server's tracked collections all survive.
fn into_doc(value: Value) -> StateDoc {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Whether an `id` value counts as present for merge bookkeeping.
///
/// Mirrors the truthiness filter of the original bookkeeping: null, `false`,
/// `0`, and `""` ids are treated as absent.
fn id_is_present(id: &Value) -> bool {
    match id {
        Value::Null | Value::Bool(false) => false,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> StateDoc {
        match value {
            Value::Object(map) => map,
            _ => panic!("test doc must be an object"),
        }
    }

    fn update(kind: &str, action: &str, data: Value) -> StoredUpdate {
        StoredUpdate {
            ts: "2026-02-11T08:17:02.123Z".into(),
            kind: kind.into(),
            action: action.into(),
            source: "test".into(),
            data,
        }
    }

    // ── additive_merge ──────────────────────────────────────────────

    #[test]
    fn merge_is_additive() {
        let current = doc(json!({"tasks": [{"id": 1}, {"id": 2}]}));
        let merged = additive_merge(&current, json!({"tasks": [{"id": 2, "title": "x"}]}));
        assert_eq!(
            merged["tasks"],
            json!([{"id": 2, "title": "x"}, {"id": 1}])
        );
    }

    #[test]
    fn merge_incoming_wins_wholesale_on_collision() {
        let current = doc(json!({"tasks": [{"id": "t1", "title": "old", "status": "open"}]}));
        let merged = additive_merge(
            &current,
            json!({"tasks": [{"id": "t1", "title": "new"}]}),
        );
        // No field-by-field merge on the full-state path: "status" is gone.
        assert_eq!(merged["tasks"], json!([{"id": "t1", "title": "new"}]));
    }

    #[test]
    fn merge_is_idempotent() {
        let current = doc(json!({
            "tasks": [{"id": "t1"}, {"id": "t2"}],
            "notes": [{"id": "n1", "content": "hi"}],
            "theme": "dark"
        }));
        let merged = additive_merge(&current, Value::Object(current.clone()));
        assert_eq!(merged, current);
    }

    #[test]
    fn merge_substitutes_server_sequence_for_missing_key() {
        let current = doc(json!({"goals": [{"id": "g1"}]}));
        let merged = additive_merge(&current, json!({"tasks": []}));
        assert_eq!(merged["goals"], json!([{"id": "g1"}]));
    }

    #[test]
    fn merge_substitutes_server_sequence_for_invalid_value() {
        let current = doc(json!({"tasks": [{"id": "t1"}]}));
        let merged = additive_merge(&current, json!({"tasks": "corrupted"}));
        assert_eq!(merged["tasks"], json!([{"id": "t1"}]));
    }

    #[test]
    fn merge_passes_untracked_keys_through() {
        let current = doc(json!({"settingsVersion": 3}));
        let merged = additive_merge(&current, json!({"settingsVersion": 7, "theme": "dark"}));
        // Untracked keys come from incoming alone; the server's value is not
        // resurrected.
        assert_eq!(merged["settingsVersion"], 7);
        assert_eq!(merged["theme"], "dark");
    }

    #[test]
    fn omission_does_not_delete() {
        let current = doc(json!({"tasks": [{"id": "t1", "title": "keep me"}]}));
        let merged = additive_merge(&current, json!({"tasks": []}));
        assert_eq!(merged["tasks"], json!([{"id": "t1", "title": "keep me"}]));
    }

    #[test]
    fn merge_ignores_items_without_ids() {
        let current = doc(json!({"tasks": [{"id": "t1"}, {"title": "no id"}]}));
        let merged = additive_merge(&current, json!({"tasks": []}));
        // Only id-carrying server items are appended back.
        assert_eq!(merged["tasks"], json!([{"id": "t1"}]));
    }

    #[test]
    fn merge_distinguishes_numeric_and_string_ids() {
        let current = doc(json!({"tasks": [{"id": 2}]}));
        let merged = additive_merge(&current, json!({"tasks": [{"id": "2"}]}));
        // "2" and 2 are different ids; both survive.
        assert_eq!(merged["tasks"], json!([{"id": "2"}, {"id": 2}]));
    }

    #[test]
    fn merge_with_non_object_incoming_keeps_server_collections() {
        let current = doc(json!({"tasks": [{"id": "t1"}]}));
        let merged = additive_merge(&current, json!("garbage"));
        assert_eq!(merged["tasks"], json!([{"id": "t1"}]));
    }

    #[test]
    fn merge_sanitizes_notes() {
        let current = doc(json!({"notes": []}));
        let merged = additive_merge(
            &current,
            json!({"notes": [
                {"id": "n1", "content": "hi"},
                {"id": "n2", "content": "undefined"},
                {"id": "n3"},
                {"id": "n4", "content": 42}
            ]}),
        );
        assert_eq!(merged["notes"], json!([{"id": "n1", "content": "hi"}]));
    }

    #[test]
    fn sanitize_skips_non_array_notes() {
        let mut d = doc(json!({"notes": "not an array"}));
        sanitize_notes(&mut d);
        assert_eq!(d["notes"], json!("not an array"));
    }

    // ── apply_patch ─────────────────────────────────────────────────

    #[test]
    fn patch_upsert_appends_new_task() {
        let mut d = doc(json!({}));
        let outcome =
            apply_patch(&mut d, &update("task", "create", json!({"id": "T1", "title": "A"})))
                .unwrap();
        assert_eq!(outcome, PatchOutcome::Applied("tasks"));
        assert_eq!(d["tasks"], json!([{"id": "T1", "title": "A"}]));
    }

    #[test]
    fn patch_task_update_shallow_merges() {
        let mut d = doc(json!({}));
        let _ = apply_patch(&mut d, &update("task", "create", json!({"id": "T1", "title": "A"})))
            .unwrap();
        let _ = apply_patch(
            &mut d,
            &update("task", "update", json!({"id": "T1", "status": "done"})),
        )
        .unwrap();
        assert_eq!(
            d["tasks"],
            json!([{"id": "T1", "title": "A", "status": "done"}])
        );
    }

    #[test]
    fn patch_document_update_replaces_wholesale() {
        let mut d = doc(json!({"documents": [{"id": "d1", "title": "old", "body": "text"}]}));
        let _ = apply_patch(
            &mut d,
            &update("document", "update", json!({"id": "d1", "title": "new"})),
        )
        .unwrap();
        assert_eq!(d["documents"], json!([{"id": "d1", "title": "new"}]));
    }

    #[test]
    fn patch_log_appends_unconditionally() {
        let mut d = doc(json!({}));
        let _ = apply_patch(&mut d, &update("log", "add", json!({"id": "l1"}))).unwrap();
        let _ = apply_patch(&mut d, &update("log", "add", json!({"id": "l1"}))).unwrap();
        assert_eq!(d["logs"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn patch_note_insert_if_absent() {
        let mut d = doc(json!({}));
        let _ = apply_patch(&mut d, &update("note", "add", json!({"id": "n1", "content": "a"})))
            .unwrap();
        let _ = apply_patch(&mut d, &update("note", "add", json!({"id": "n1", "content": "b"})))
            .unwrap();
        assert_eq!(d["notes"], json!([{"id": "n1", "content": "a"}]));
    }

    #[test]
    fn patch_delete_removes_by_id() {
        let mut d = doc(json!({"tasks": [{"id": "T1"}, {"id": "T2"}]}));
        let outcome =
            apply_patch(&mut d, &update("task", "delete", json!({"id": "T1"}))).unwrap();
        assert_eq!(outcome, PatchOutcome::Applied("tasks"));
        assert_eq!(d["tasks"], json!([{"id": "T2"}]));
    }

    #[test]
    fn patch_delete_without_id_is_ignored() {
        let mut d = doc(json!({"notes": [{"id": "n1", "content": "x"}]}));
        let outcome = apply_patch(&mut d, &update("note", "delete", json!({}))).unwrap();
        assert_eq!(outcome, PatchOutcome::Ignored);
        assert_eq!(d["notes"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn patch_unknown_pair_is_ignored() {
        let mut d = doc(json!({}));
        let outcome =
            apply_patch(&mut d, &update("calendar", "add", json!({"id": "c1"}))).unwrap();
        assert_eq!(outcome, PatchOutcome::Ignored);
        assert!(d.is_empty());
    }

    #[test]
    fn patch_goal_delete_is_ignored() {
        let mut d = doc(json!({"goals": [{"id": "g1"}]}));
        let outcome = apply_patch(&mut d, &update("goal", "delete", json!({"id": "g1"}))).unwrap();
        assert_eq!(outcome, PatchOutcome::Ignored);
        assert_eq!(d["goals"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn patch_non_sequence_collection_errors() {
        let mut d = doc(json!({"logs": "corrupted"}));
        let err = apply_patch(&mut d, &update("log", "add", json!({"id": "l1"}))).unwrap_err();
        assert!(err.to_string().contains("logs"));
        // Document unchanged
        assert_eq!(d["logs"], json!("corrupted"));
    }

    #[test]
    fn patch_upsert_without_id_appends() {
        let mut d = doc(json!({"workflows": [{"id": "w1"}]}));
        let _ = apply_patch(&mut d, &update("workflow", "add", json!({"name": "anon"}))).unwrap();
        assert_eq!(d["workflows"].as_array().unwrap().len(), 2);
    }

    // ── end-to-end: deletion only via explicit delete ───────────────

    #[test]
    fn deletion_only_via_explicit_delete() {
        let mut d = doc(json!({}));
        let _ = apply_patch(&mut d, &update("task", "create", json!({"id": "T1", "title": "A"})))
            .unwrap();
        let _ = apply_patch(
            &mut d,
            &update("task", "update", json!({"id": "T1", "status": "done"})),
        )
        .unwrap();

        // A full-state upload omitting T1 resurrects it.
        let merged = additive_merge(&d, json!({"tasks": []}));
        assert_eq!(
            merged["tasks"],
            json!([{"id": "T1", "title": "A", "status": "done"}])
        );

        // Only the explicit delete removes it.
        let mut d = merged;
        let _ = apply_patch(&mut d, &update("task", "delete", json!({"id": "T1"}))).unwrap();
        assert_eq!(d["tasks"], json!([]));
    }
}
