// 👥 Roster - identity -> contact details
// Reference data only. Reloaded from disk on every call so edits to the file
// show up immediately.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub identity_id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: HashMap<String, RosterEntry>,
}

impl Roster {
    /// Load `identity_id,name,email` rows from a CSV file.
    pub fn load(path: &Path) -> Result<Self> {
        let rdr = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open roster {}", path.display()))?;
        Self::from_reader(rdr)
    }

    pub fn from_reader<R: std::io::Read>(mut rdr: csv::Reader<R>) -> Result<Self> {
        let mut entries = Vec::new();
        for result in rdr.deserialize() {
            let entry: RosterEntry = result.context("Failed to deserialize roster row")?;
            entries.push(entry);
        }
        Ok(Self::from_entries(entries))
    }

    /// First entry wins when an identity appears twice.
    pub fn from_entries(entries: impl IntoIterator<Item = RosterEntry>) -> Self {
        let mut map = HashMap::new();
        for entry in entries {
            map.entry(entry.identity_id.clone()).or_insert(entry);
        }
        Roster { entries: map }
    }

    pub fn lookup(&self, identity_id: &str) -> Option<&RosterEntry> {
        self.entries.get(identity_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_roster_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roster.csv");
        std::fs::write(
            &path,
            "identity_id,name,email\n\
             1234567,Ada Lovelace,ada@example.test\n\
             0012345,Grace Hopper,grace@example.test\n",
        )
        .unwrap();

        let roster = Roster::load(&path).unwrap();

        assert_eq!(roster.len(), 2);
        assert_eq!(roster.lookup("1234567").unwrap().name, "Ada Lovelace");
        // Leading zeros survive: ids are text
        assert_eq!(roster.lookup("0012345").unwrap().email, "grace@example.test");
        assert!(roster.lookup("12345").is_none());
    }

    #[test]
    fn test_duplicate_identity_keeps_first() {
        let roster = Roster::from_entries(vec![
            RosterEntry {
                identity_id: "1234567".into(),
                name: "First".into(),
                email: "first@example.test".into(),
            },
            RosterEntry {
                identity_id: "1234567".into(),
                name: "Second".into(),
                email: "second@example.test".into(),
            },
        ]);

        assert_eq!(roster.lookup("1234567").unwrap().name, "First");
    }

    #[test]
    fn test_missing_roster_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Roster::load(&dir.path().join("nope.csv")).is_err());
    }
}
