//! Persisted record of handled dumps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// File names of dumps that were delivered, rejected or found missing,
/// with the time they were handled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DumpLedger {
    #[serde(default)]
    pub uploaded: BTreeMap<String, DateTime<Utc>>,
}

impl DumpLedger {
    pub fn contains(&self, file_name: &str) -> bool {
        self.uploaded.contains_key(file_name)
    }

    pub fn len(&self) -> usize {
        self.uploaded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uploaded.is_empty()
    }

    /// Copy of the ledger with `file_name` recorded now.
    pub fn with_entry(&self, file_name: &str) -> Self {
        let mut next = self.clone();
        next.uploaded.insert(file_name.to_string(), Utc::now());
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_entry_and_contains() {
        let ledger = DumpLedger::default().with_entry("a.dmp");
        assert!(ledger.contains("a.dmp"));
        assert!(!ledger.contains("b.dmp"));
        assert_eq!(ledger.len(), 1);
    }
}
