//! Durable policy store backed by redb.
//!
//! # Table design
//!
//! `POLICIES` maps policy id to the JSON-encoded [`PolicyDocument`].
//! `META` holds two counters: the next `seq_no` to hand out and the
//! store's `primary_term`, which is fixed when the file is first created.
//!
//! redb admits one write transaction at a time, so a put's version check,
//! counter bump and insert commit together or not at all.

use std::path::Path;

use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};

use super::{check_put, DocVersion, PolicyDocument, PolicyStore, PutOutcome};
use crate::error::{IsmError, Result};
use crate::policy::Policy;

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const POLICIES: TableDefinition<&str, &[u8]> = TableDefinition::new("policies");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const SEQ_NO_KEY: &str = "seq_no";
const PRIMARY_TERM_KEY: &str = "primary_term";

fn storage(e: impl std::fmt::Display) -> IsmError {
    IsmError::Storage(e.to_string())
}

// ---------------------------------------------------------------------------
// RedbPolicyStore
// ---------------------------------------------------------------------------

pub struct RedbPolicyStore {
    db: Database,
    primary_term: u64,
}

impl RedbPolicyStore {
    /// Open or create the database at `path`, creating both tables.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).map_err(storage)?;
        let wt = db.begin_write().map_err(storage)?;
        let primary_term = {
            wt.open_table(POLICIES).map_err(storage)?;
            let mut meta = wt.open_table(META).map_err(storage)?;
            let existing = meta
                .get(PRIMARY_TERM_KEY)
                .map_err(storage)?
                .map(|g| g.value());
            match existing {
                Some(term) => term,
                None => {
                    meta.insert(PRIMARY_TERM_KEY, 1u64).map_err(storage)?;
                    meta.insert(SEQ_NO_KEY, 0u64).map_err(storage)?;
                    1
                }
            }
        };
        wt.commit().map_err(storage)?;
        tracing::debug!(path = %path.display(), primary_term, "opened policy store");
        Ok(Self { db, primary_term })
    }
}

fn decode(bytes: &[u8]) -> Result<PolicyDocument> {
    serde_json::from_slice(bytes).map_err(storage)
}

impl PolicyStore for RedbPolicyStore {
    fn get(&self, id: &str) -> Result<PolicyDocument> {
        let rt = self.db.begin_read().map_err(storage)?;
        let table = rt.open_table(POLICIES).map_err(storage)?;
        let guard = table.get(id).map_err(storage)?;
        match guard {
            Some(v) => decode(v.value()),
            None => Err(IsmError::policy_not_found(id)),
        }
    }

    fn put(&self, id: &str, policy: Policy, if_version: Option<DocVersion>) -> Result<PutOutcome> {
        let wt = self.db.begin_write().map_err(storage)?;
        let version = {
            let mut table = wt.open_table(POLICIES).map_err(storage)?;
            let mut meta = wt.open_table(META).map_err(storage)?;

            let existing = match table.get(id).map_err(storage)? {
                Some(v) => Some(decode(v.value())?),
                None => None,
            };
            check_put(id, &policy, existing.as_ref(), if_version)?;

            let seq_no = meta
                .get(SEQ_NO_KEY)
                .map_err(storage)?
                .map(|g| g.value())
                .unwrap_or(0);
            meta.insert(SEQ_NO_KEY, seq_no + 1).map_err(storage)?;

            let version = DocVersion::new(seq_no, self.primary_term);
            let doc = PolicyDocument {
                id: id.to_string(),
                version,
                last_updated_time: Utc::now(),
                policy,
            };
            let value = serde_json::to_vec(&doc)?;
            table.insert(id, value.as_slice()).map_err(storage)?;
            version
        };
        // Dropping `wt` on the error paths above aborts the transaction.
        wt.commit().map_err(storage)?;
        tracing::debug!(policy = id, %version, "policy written");
        Ok(PutOutcome {
            id: id.to_string(),
            version,
        })
    }

    fn delete(&self, id: &str) -> Result<()> {
        let wt = self.db.begin_write().map_err(storage)?;
        {
            let mut table = wt.open_table(POLICIES).map_err(storage)?;
            let removed = table.remove(id).map_err(storage)?.is_some();
            if !removed {
                return Err(IsmError::policy_not_found(id));
            }
            let mut meta = wt.open_table(META).map_err(storage)?;
            let seq_no = meta
                .get(SEQ_NO_KEY)
                .map_err(storage)?
                .map(|g| g.value())
                .unwrap_or(0);
            meta.insert(SEQ_NO_KEY, seq_no + 1).map_err(storage)?;
        }
        wt.commit().map_err(storage)?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<PolicyDocument>> {
        let rt = self.db.begin_read().map_err(storage)?;
        let table = rt.open_table(POLICIES).map_err(storage)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(storage)? {
            let (_, v) = entry.map_err(storage)?;
            result.push(decode(v.value())?);
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
