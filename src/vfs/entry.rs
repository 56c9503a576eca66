//! VFS entry types.

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use zeroize::Zeroizing;

/// Timestamps are kept at microsecond precision, which is what the payload
/// encoding stores.
pub type Timestamp = DateTime<Utc>;

pub fn now() -> Timestamp {
    Utc::now().trunc_subsecs(6)
}

/// A node in the vault tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Directory(Directory),
    File(FileEntry),
}

impl Entry {
    pub fn name(&self) -> &str {
        match self {
            Entry::Directory(d) => d.name(),
            Entry::File(f) => f.name(),
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::Directory(_) => EntryKind::Directory,
            Entry::File(_) => EntryKind::File,
        }
    }

    pub fn info(&self) -> EntryInfo {
        match self {
            Entry::Directory(d) => d.info(),
            Entry::File(f) => f.info(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    pub(crate) name: String,
    pub(crate) created_at: Timestamp,
    pub(crate) children: BTreeMap<String, Entry>,
}

impl Directory {
    pub(crate) fn new(name: String) -> Self {
        Self::with_created(name, now())
    }

    pub(crate) fn with_created(name: String, created_at: Timestamp) -> Self {
        Self {
            name,
            created_at,
            children: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    /// Children in name order.
    pub fn children(&self) -> impl Iterator<Item = &Entry> {
        self.children.values()
    }

    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.children.get(name)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn info(&self) -> EntryInfo {
        EntryInfo {
            name: self.name.clone(),
            kind: EntryKind::Directory,
            size: 0,
            created_at: self.created_at,
            modified_at: None,
        }
    }
}

/// A file and its plaintext content. The content buffer is wiped on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub(crate) name: String,
    pub(crate) created_at: Timestamp,
    pub(crate) modified_at: Timestamp,
    pub(crate) content: Zeroizing<Vec<u8>>,
}

impl FileEntry {
    pub(crate) fn new(name: String, content: Vec<u8>) -> Self {
        let now = now();
        Self {
            name,
            created_at: now,
            modified_at: now,
            content: Zeroizing::new(content),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn modified_at(&self) -> Timestamp {
        self.modified_at
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn info(&self) -> EntryInfo {
        EntryInfo {
            name: self.name.clone(),
            kind: EntryKind::File,
            size: self.size(),
            created_at: self.created_at,
            modified_at: Some(self.modified_at),
        }
    }
}

impl fmt::Debug for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileEntry")
            .field("name", &self.name)
            .field("size", &self.content.len())
            .field("created_at", &self.created_at)
            .field("modified_at", &self.modified_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    File,
}

/// Metadata snapshot of an entry, detached from the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub created_at: Timestamp,
    pub modified_at: Option<Timestamp>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_debug_hides_content() {
        let file = FileEntry::new("secret.txt".into(), b"hunter2".to_vec());
        let shown = format!("{file:?}");
        assert!(shown.contains("secret.txt"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn file_info_reports_size() {
        let file = FileEntry::new("a.bin".into(), vec![0u8; 42]);
        let info = Entry::File(file).info();
        assert_eq!(info.kind, EntryKind::File);
        assert_eq!(info.size, 42);
        assert!(info.modified_at.is_some());
    }

    #[test]
    fn timestamps_are_microsecond_precise() {
        let ts = now();
        assert_eq!(ts.timestamp_subsec_nanos() % 1_000, 0);
    }

    #[test]
    fn info_serializes_kind_lowercase() {
        let dir = Directory::new("docs".into());
        let json = serde_json::to_string(&dir.info()).unwrap();
        assert!(json.contains("\"kind\":\"directory\""));
    }
}
