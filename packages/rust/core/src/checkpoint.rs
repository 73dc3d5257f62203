//! Identity assignment and the discovery checkpoint.
//!
//! The checkpoint is a pretty-printed JSON array of opportunities, written
//! once after ids are assigned. It is the hand-off between a discovery run
//! and a later enrich-only run.

use std::path::{Path, PathBuf};

use grantscout_shared::{FundingOpportunity, GrantScoutError, OpportunityId, OpportunityKind, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::report::{SkipReason, SkippedItem};

/// Records read back from a checkpoint file.
#[derive(Debug, Default)]
pub struct LoadedCheckpoint {
    pub opportunities: Vec<FundingOpportunity>,
    /// Entries that could not be read as an opportunity at all.
    pub skipped: Vec<SkippedItem>,
}

/// Give every opportunity a freshly generated id, replacing any existing one.
pub fn assign_ids(opportunities: &mut [FundingOpportunity]) {
    for opportunity in opportunities.iter_mut() {
        opportunity.id = Some(OpportunityId::new());
    }
}

/// Give an id to opportunities that lack one. Returns how many were assigned.
pub fn assign_missing_ids(opportunities: &mut [FundingOpportunity]) -> usize {
    let mut assigned = 0;
    for opportunity in opportunities.iter_mut().filter(|o| o.id.is_none()) {
        opportunity.id = Some(OpportunityId::new());
        assigned += 1;
    }
    assigned
}

/// Persist the checkpoint atomically.
#[instrument(skip_all, fields(path = %path.display(), count = opportunities.len()))]
pub fn save_checkpoint(path: &Path, opportunities: &[FundingOpportunity]) -> Result<()> {
    write_json_atomic(path, opportunities)?;
    info!("checkpoint written");
    Ok(())
}

/// Load a checkpoint written by [`save_checkpoint`] (or by hand).
///
/// Only a file that is not a JSON array is an error. Records are read one by
/// one: an unrecognized `id` or `type` is dropped so the record reaches
/// enrichment without it, and a record that still cannot be read is skipped.
pub fn load_checkpoint(path: &Path) -> Result<LoadedCheckpoint> {
    let content = std::fs::read_to_string(path).map_err(|e| GrantScoutError::io(path, e))?;
    let records: Vec<Value> = serde_json::from_str(&content).map_err(|e| {
        GrantScoutError::checkpoint(format!("{} is not a JSON array: {e}", path.display()))
    })?;

    let mut loaded = LoadedCheckpoint::default();
    for (index, record) in records.into_iter().enumerate() {
        let label = record_label(index, &record);
        match read_record(record, &label) {
            Ok(opportunity) => loaded.opportunities.push(opportunity),
            Err(e) => {
                warn!(origin = %label, error = %e, "unreadable checkpoint record skipped");
                loaded
                    .skipped
                    .push(SkippedItem::new(index, label, SkipReason::InvalidRecord, e));
            }
        }
    }

    debug!(
        path = %path.display(),
        count = loaded.opportunities.len(),
        skipped = loaded.skipped.len(),
        "checkpoint loaded"
    );
    Ok(loaded)
}

fn read_record(mut record: Value, label: &str) -> serde_json::Result<FundingOpportunity> {
    if let Some(fields) = record.as_object_mut() {
        drop_unreadable::<OpportunityId>(fields, "id", label);
        drop_unreadable::<OpportunityKind>(fields, "type", label);
    }
    serde_json::from_value(record)
}

fn drop_unreadable<T: DeserializeOwned>(fields: &mut Map<String, Value>, key: &str, label: &str) {
    let unreadable = fields
        .get(key)
        .is_some_and(|v| !v.is_null() && serde_json::from_value::<T>(v.clone()).is_err());
    if unreadable {
        if let Some(value) = fields.remove(key) {
            warn!(origin = %label, field = key, %value, "unrecognized value dropped");
        }
    }
}

fn record_label(index: usize, record: &Value) -> String {
    record
        .get("origin")
        .and_then(Value::as_str)
        .map(|origin| origin.chars().take(40).collect())
        .unwrap_or_else(|| format!("record {}", index + 1))
}

/// Write `value` as pretty UTF-8 JSON via a temp file and rename.
///
/// Readers never observe a half-written file. Parent directories are created.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| GrantScoutError::io(parent, e))?;
    }

    let json = serde_json::to_string_pretty(value)
        .map_err(|e| GrantScoutError::checkpoint(format!("failed to serialize: {e}")))?;

    let tmp = temp_path(path);
    std::fs::write(&tmp, json).map_err(|e| GrantScoutError::io(&tmp, e))?;
    std::fs::rename(&tmp, path).map_err(|e| GrantScoutError::io(path, e))?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grantscout_shared::OpportunityKind;
    use std::collections::HashSet;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("gs-checkpoint-test-{}", uuid::Uuid::new_v4()))
    }

    fn opportunity(origin: &str) -> FundingOpportunity {
        FundingOpportunity {
            id: None,
            kind: Some(OpportunityKind::International),
            origin: origin.into(),
            description: "Grants".into(),
            financing_type: None,
            main_requirements: vec!["Registered NGO".into()],
            application_deadline: Some("2025-06-30".into()),
            opportunity_url: None,
        }
    }

    #[test]
    fn assign_ids_is_total_and_unique() {
        let mut opportunities: Vec<_> = (0..50).map(|i| opportunity(&format!("o{i}"))).collect();
        opportunities[3].id = Some("stale".into());

        assign_ids(&mut opportunities);

        let ids: HashSet<_> = opportunities.iter().filter_map(|o| o.id.clone()).collect();
        assert_eq!(ids.len(), 50);
        assert!(!ids.contains(&OpportunityId::from("stale")));
        assert_eq!(opportunities[7].origin, "o7");
        assert_eq!(opportunities[7].main_requirements, vec!["Registered NGO"]);
    }

    #[test]
    fn assign_missing_ids_keeps_existing() {
        let mut opportunities = vec![opportunity("a"), opportunity("b")];
        opportunities[0].id = Some("abc123".into());

        assert_eq!(assign_missing_ids(&mut opportunities), 1);
        assert_eq!(opportunities[0].id, Some("abc123".into()));
        assert!(opportunities[1].id.is_some());
    }

    #[test]
    fn checkpoint_round_trips_through_disk() {
        let dir = temp_dir();
        let path = dir.join("nested").join("preliminary_results.json");
        let mut opportunities = vec![opportunity("a"), opportunity("b")];
        assign_ids(&mut opportunities);

        save_checkpoint(&path, &opportunities).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("[\n  {"));
        assert!(text.contains("\"type\": \"International\""));
        assert!(!path.with_file_name("preliminary_results.json.tmp").exists());
        assert_eq!(load_checkpoint(&path).unwrap().opportunities, opportunities);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_accepts_records_without_ids() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("input.json");
        std::fs::write(
            &path,
            r#"[{"type": "National", "origin": "Minciencias", "description": "AI call", "main_requirements": null}]"#,
        )
        .unwrap();

        let loaded = load_checkpoint(&path).unwrap().opportunities;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, None);
        assert!(loaded[0].main_requirements.is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn bad_records_do_not_sink_the_file() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("input.json");
        std::fs::write(
            &path,
            r#"[
                {"id": "ok", "type": "National", "origin": "Minciencias", "description": "AI call"},
                {"id": "r1", "type": "Regional", "origin": "Gobernación", "description": "Regional call"},
                {"id": 42, "type": "International", "origin": "EU", "description": "Horizon"},
                {"id": "x", "type": "National", "description": "no origin"},
                "not an object"
            ]"#,
        )
        .unwrap();

        let loaded = load_checkpoint(&path).unwrap();

        let origins: Vec<_> = loaded.opportunities.iter().map(|o| o.origin.as_str()).collect();
        assert_eq!(origins, vec!["Minciencias", "Gobernación", "EU"]);
        assert_eq!(loaded.opportunities[1].id, Some("r1".into()));
        assert_eq!(loaded.opportunities[1].kind, None);
        assert_eq!(loaded.opportunities[2].id, None);
        assert_eq!(loaded.opportunities[2].kind, Some(OpportunityKind::International));

        assert_eq!(loaded.skipped.len(), 2);
        assert!(loaded.skipped.iter().all(|s| s.reason == SkipReason::InvalidRecord));
        assert_eq!(loaded.skipped[0].index, 3);
        assert_eq!(loaded.skipped[1].label, "record 5");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn load_errors() {
        let dir = temp_dir();
        std::fs::create_dir_all(&dir).unwrap();

        let missing = load_checkpoint(&dir.join("missing.json")).unwrap_err();
        assert!(matches!(missing, GrantScoutError::Io { .. }));

        let path = dir.join("bad.json");
        std::fs::write(&path, r#"{"not": "a list"}"#).unwrap();
        let bad = load_checkpoint(&path).unwrap_err();
        assert!(matches!(bad, GrantScoutError::Checkpoint { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
