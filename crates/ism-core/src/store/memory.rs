use super::{check_put, DocVersion, PolicyDocument, PolicyStore, PutOutcome};
use crate::error::{IsmError, Result};
use crate::policy::Policy;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// In-process policy store. One lock guards the whole map, so a put's
/// version check and write are a single atomic step.
pub struct MemoryPolicyStore {
    inner: Mutex<Inner>,
    primary_term: u64,
}

struct Inner {
    docs: BTreeMap<String, PolicyDocument>,
    next_seq_no: u64,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::with_primary_term(1)
    }

    pub fn with_primary_term(primary_term: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                docs: BTreeMap::new(),
                next_seq_no: 0,
            }),
            primary_term,
        }
    }
}

impl Default for MemoryPolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyStore for MemoryPolicyStore {
    fn get(&self, id: &str) -> Result<PolicyDocument> {
        self.inner
            .lock()
            .docs
            .get(id)
            .cloned()
            .ok_or_else(|| IsmError::policy_not_found(id))
    }

    fn put(&self, id: &str, policy: Policy, if_version: Option<DocVersion>) -> Result<PutOutcome> {
        let mut inner = self.inner.lock();
        check_put(id, &policy, inner.docs.get(id), if_version)?;

        let version = DocVersion::new(inner.next_seq_no, self.primary_term);
        inner.next_seq_no += 1;
        inner.docs.insert(
            id.to_string(),
            PolicyDocument {
                id: id.to_string(),
                version,
                last_updated_time: Utc::now(),
                policy,
            },
        );
        tracing::debug!(policy = id, %version, "policy written");
        Ok(PutOutcome {
            id: id.to_string(),
            version,
        })
    }

    fn delete(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.docs.remove(id).is_none() {
            return Err(IsmError::policy_not_found(id));
        }
        inner.next_seq_no += 1;
        Ok(())
    }

    fn list(&self) -> Result<Vec<PolicyDocument>> {
        Ok(self.inner.lock().docs.values().cloned().collect())
    }
}
