//! JSON data file for the envelope store.
//!
//! The whole record set is rewritten after every mutation, atomically via
//! temp file + rename, so a crash leaves either the old or the new snapshot.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use sv_core::VaultEnvelopeRecord;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    records: Vec<VaultEnvelopeRecord>,
}

/// Read a snapshot. A missing file is an empty store.
pub(crate) fn load(path: &Path) -> Result<Vec<VaultEnvelopeRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading data file: {}", path.display()))?;
    let snapshot: Snapshot = serde_json::from_str(&content)
        .with_context(|| format!("parsing data file: {}", path.display()))?;

    if snapshot.version != SNAPSHOT_VERSION {
        anyhow::bail!(
            "unsupported data file version {} in {}",
            snapshot.version,
            path.display()
        );
    }
    Ok(snapshot.records)
}

pub(crate) async fn flush<'a>(
    path: &Path,
    records: impl IntoIterator<Item = &'a VaultEnvelopeRecord>,
) -> Result<()> {
    let mut records: Vec<VaultEnvelopeRecord> = records.into_iter().cloned().collect();
    records.sort_by(|a, b| a.id.cmp(&b.id));
    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        records,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating data dir: {}", parent.display()))?;
    }

    let json = serde_json::to_vec_pretty(&snapshot).context("serializing data file")?;

    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, &json)
        .await
        .with_context(|| format!("writing data file temp: {}", tmp_path.display()))?;
    tokio::fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("renaming data file: {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sv_core::{CipherEnvelope, RecordId};

    fn record(id: &str) -> VaultEnvelopeRecord {
        VaultEnvelopeRecord {
            id: RecordId::from(id),
            owner_id: "owner".into(),
            envelope: CipherEnvelope {
                ciphertext: format!("ct-{id}"),
                iv: format!("iv-{id}"),
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_missing_file_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let records = load(&tmp.path().join("absent.json")).unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_flush_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("vault.json");
        let recs = vec![record("b"), record("a")];

        flush(&path, &recs).await.unwrap();
        assert!(!path.with_extension("tmp").exists(), "temp file must be renamed away");

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id.as_str(), "a");
        assert_eq!(loaded[1].envelope.ciphertext, "ct-b");
    }

    #[test]
    fn test_garbage_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vault.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load(&path).is_err());
    }

    #[test]
    fn test_unknown_version_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vault.json");
        std::fs::write(&path, r#"{"version": 9, "records": []}"#).unwrap();
        let err = load(&path).unwrap_err();
        assert!(err.to_string().contains("version 9"));
    }
}
