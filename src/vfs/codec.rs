//! Binary encoding of the tree into the plaintext payload.
//!
//! ```text
//! payload := VERSION (1) entry(root)
//! entry   := KIND (1) NAME_LEN (2) NAME CREATED_US (8)
//!            dir:  CHILD_COUNT (4) entry*
//!            file: MODIFIED_US (8) SIZE (8) CONTENT
//! ```
//!
//! Integers are little-endian, children are written in name order, so equal
//! trees always encode to equal bytes.

use chrono::DateTime;
use std::collections::btree_map;
use zeroize::Zeroizing;

use super::entry::{Directory, Entry, FileEntry, Timestamp};
use super::path::{MAX_DEPTH, validate_name};
use super::tree::Tree;
use crate::error::{Result, VaultError};

pub const VFS_VERSION: u8 = 1;

const KIND_DIR: u8 = 0;
const KIND_FILE: u8 = 1;

pub fn serialize(tree: &Tree) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(Vec::new());
    out.push(VFS_VERSION);
    write_dir(&mut out, tree.root());
    out
}

fn write_header(out: &mut Vec<u8>, kind: u8, name: &str, created_at: Timestamp) {
    out.push(kind);
    // names are capped well below u16::MAX by validate_name
    out.extend_from_slice(&(name.len() as u16).to_le_bytes());
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(&created_at.timestamp_micros().to_le_bytes());
}

fn write_dir(out: &mut Vec<u8>, dir: &Directory) {
    write_header(out, KIND_DIR, dir.name(), dir.created_at());
    out.extend_from_slice(&(dir.len() as u32).to_le_bytes());
    for child in dir.children() {
        match child {
            Entry::Directory(d) => write_dir(out, d),
            Entry::File(f) => write_file(out, f),
        }
    }
}

fn write_file(out: &mut Vec<u8>, file: &FileEntry) {
    write_header(out, KIND_FILE, file.name(), file.created_at());
    out.extend_from_slice(&file.modified_at().timestamp_micros().to_le_bytes());
    out.extend_from_slice(&file.size().to_le_bytes());
    out.extend_from_slice(file.content());
}

/// Rebuilds a tree from its encoding.
///
/// # Errors
///
/// [`VaultError::FormatCorruption`] on truncation, trailing bytes, bad
/// kind tags, invalid names, duplicate siblings or size fields that disagree
/// with the data.
pub fn deserialize(data: &[u8]) -> Result<Tree> {
    let mut reader = Reader { data, pos: 0 };

    let version = reader.u8()?;
    if version != VFS_VERSION {
        return Err(corrupt(format!("unknown tree encoding version {version}")));
    }

    let root = match reader.entry(0, true)? {
        Entry::Directory(d) => d,
        Entry::File(_) => return Err(corrupt("root is not a directory")),
    };

    if reader.pos != data.len() {
        return Err(corrupt("trailing bytes after tree"));
    }

    Ok(Tree::from_root(root))
}

fn corrupt(msg: impl Into<String>) -> VaultError {
    VaultError::FormatCorruption(msg.into())
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| corrupt("truncated payload"))?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn timestamp(&mut self) -> Result<Timestamp> {
        let micros = i64::from_le_bytes(self.array()?);
        DateTime::from_timestamp_micros(micros).ok_or_else(|| corrupt("timestamp out of range"))
    }

    fn entry(&mut self, depth: usize, is_root: bool) -> Result<Entry> {
        if depth > MAX_DEPTH {
            return Err(corrupt("tree nested too deeply"));
        }

        let kind = self.u8()?;
        let name_len = self.u16()? as usize;
        let name = std::str::from_utf8(self.take(name_len)?)
            .map_err(|_| corrupt("entry name is not UTF-8"))?
            .to_string();

        if is_root {
            if !name.is_empty() {
                return Err(corrupt("root entry has a name"));
            }
        } else {
            validate_name(&name).map_err(|_| corrupt(format!("invalid entry name '{name}'")))?;
        }

        let created_at = self.timestamp()?;

        match kind {
            KIND_DIR => {
                let count = self.u32()?;
                let mut dir = Directory::with_created(name, created_at);
                for _ in 0..count {
                    let child = self.entry(depth + 1, false)?;
                    match dir.children.entry(child.name().to_string()) {
                        btree_map::Entry::Vacant(slot) => {
                            slot.insert(child);
                        }
                        btree_map::Entry::Occupied(slot) => {
                            return Err(corrupt(format!("duplicate sibling '{}'", slot.key())));
                        }
                    }
                }
                Ok(Entry::Directory(dir))
            }
            KIND_FILE => {
                let modified_at = self.timestamp()?;
                let size = usize::try_from(self.u64()?)
                    .map_err(|_| corrupt("file size does not fit in memory"))?;
                if size > self.data.len() - self.pos {
                    return Err(corrupt(format!("size of '{name}' exceeds remaining payload")));
                }
                let content = Zeroizing::new(self.take(size)?.to_vec());
                Ok(Entry::File(FileEntry {
                    name,
                    created_at,
                    modified_at,
                    content,
                }))
            }
            other => Err(corrupt(format!("unknown entry kind {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::VfsPath;
    use proptest::prelude::*;

    fn p(s: &str) -> VfsPath {
        VfsPath::parse(s).unwrap()
    }

    fn sample() -> Tree {
        let mut tree = Tree::new();
        tree.create_dir(&p("/"), "photos").unwrap();
        tree.create_dir(&p("/photos"), "2024").unwrap();
        tree.add_file(&p("/"), "notes.txt", b"hello".to_vec()).unwrap();
        tree.add_file(&p("/photos/2024"), "empty.bin", Vec::new()).unwrap();
        tree.add_file(&p("/photos"), "cat.jpg", vec![0xFF; 300]).unwrap();
        tree
    }

    #[test]
    fn sample_roundtrips() {
        let tree = sample();
        let bytes = serialize(&tree);
        assert_eq!(deserialize(&bytes).unwrap(), tree);
    }

    #[test]
    fn empty_tree_roundtrips() {
        let tree = Tree::new();
        assert_eq!(deserialize(&serialize(&tree)).unwrap(), tree);
    }

    #[test]
    fn encoding_is_deterministic() {
        let tree = sample();
        assert_eq!(*serialize(&tree), *serialize(&tree.clone()));
    }

    #[test]
    fn every_truncation_is_corruption() {
        let bytes = serialize(&sample());
        for len in 0..bytes.len() {
            assert!(
                matches!(deserialize(&bytes[..len]), Err(VaultError::FormatCorruption(_))),
                "truncated to {len} bytes"
            );
        }
    }

    #[test]
    fn trailing_bytes_are_corruption() {
        let mut bytes = serialize(&sample()).to_vec();
        bytes.push(0);
        assert!(matches!(deserialize(&bytes), Err(VaultError::FormatCorruption(_))));
    }

    #[test]
    fn oversized_file_length_is_corruption() {
        let mut tree = Tree::new();
        tree.add_file(&p("/"), "f", b"abc".to_vec()).unwrap();
        let mut bytes = serialize(&tree).to_vec();

        // size field sits right before the 3 content bytes
        let size_at = bytes.len() - 3 - 8;
        bytes[size_at..size_at + 8].copy_from_slice(&1000u64.to_le_bytes());
        assert!(matches!(deserialize(&bytes), Err(VaultError::FormatCorruption(_))));
    }

    fn raw_file(name: &str) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(KIND_FILE);
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&0i64.to_le_bytes());
        out.extend_from_slice(&0i64.to_le_bytes());
        out.extend_from_slice(&1u64.to_le_bytes());
        out.push(b'x');
        out
    }

    fn raw_root(children: &[Vec<u8>]) -> Vec<u8> {
        let mut out = vec![VFS_VERSION, KIND_DIR, 0, 0];
        out.extend_from_slice(&0i64.to_le_bytes());
        out.extend_from_slice(&(children.len() as u32).to_le_bytes());
        for c in children {
            out.extend_from_slice(c);
        }
        out
    }

    #[test]
    fn hand_built_payload_decodes() {
        let tree = deserialize(&raw_root(&[raw_file("a"), raw_file("b")])).unwrap();
        assert_eq!(tree.read_file(&p("/a")).unwrap(), b"x");
        assert_eq!(tree.root().len(), 2);
    }

    #[test]
    fn duplicate_siblings_are_corruption() {
        let bytes = raw_root(&[raw_file("same"), raw_file("same")]);
        assert!(matches!(deserialize(&bytes), Err(VaultError::FormatCorruption(_))));
    }

    #[test]
    fn traversal_names_are_corruption() {
        let bytes = raw_root(&[raw_file("..")]);
        assert!(matches!(deserialize(&bytes), Err(VaultError::FormatCorruption(_))));
    }

    #[test]
    fn unknown_kind_is_corruption() {
        let mut child = raw_file("a");
        child[0] = 9;
        assert!(matches!(
            deserialize(&raw_root(&[child])),
            Err(VaultError::FormatCorruption(_))
        ));
    }

    #[test]
    fn unknown_version_is_corruption() {
        let mut bytes = serialize(&Tree::new()).to_vec();
        bytes[0] = 2;
        assert!(matches!(deserialize(&bytes), Err(VaultError::FormatCorruption(_))));
    }

    /// `levels` nested directories named "d" under the root.
    fn raw_chain(levels: usize) -> Vec<u8> {
        let mut inner: Vec<u8> = Vec::new();
        for i in 0..levels {
            let mut dir = vec![KIND_DIR];
            dir.extend_from_slice(&1u16.to_le_bytes());
            dir.push(b'd');
            dir.extend_from_slice(&0i64.to_le_bytes());
            let count: u32 = if i == 0 { 0 } else { 1 };
            dir.extend_from_slice(&count.to_le_bytes());
            dir.extend_from_slice(&inner);
            inner = dir;
        }
        raw_root(&[inner])
    }

    #[test]
    fn nesting_at_max_depth_decodes() {
        let tree = deserialize(&raw_chain(MAX_DEPTH)).unwrap();
        let deepest = VfsPath::parse(&"/d".repeat(MAX_DEPTH)).unwrap();
        assert!(tree.exists(&deepest));
        assert_eq!(deserialize(&serialize(&tree)).unwrap(), tree);
    }

    #[test]
    fn nesting_past_max_depth_is_corruption() {
        assert!(matches!(
            deserialize(&raw_chain(MAX_DEPTH + 1)),
            Err(VaultError::FormatCorruption(_))
        ));
    }

    fn name_strategy() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 ._-]{1,12}".prop_filter("reserved name", |n| n != "." && n != "..")
    }

    proptest! {
        #[test]
        fn any_tree_roundtrips(
            ops in prop::collection::vec(
                (0usize..4, name_strategy(), prop::option::of(prop::collection::vec(any::<u8>(), 0..64))),
                0..40,
            )
        ) {
            let mut tree = Tree::new();
            let mut dirs = vec![VfsPath::root()];

            for (parent_idx, name, content) in ops {
                let parent = dirs[parent_idx % dirs.len()].clone();
                match content {
                    Some(bytes) => {
                        let _ = tree.add_file(&parent, &name, bytes);
                    }
                    None => {
                        if tree.create_dir(&parent, &name).is_ok() {
                            dirs.push(parent.join(&name).unwrap());
                        }
                    }
                }
            }

            let bytes = serialize(&tree);
            prop_assert_eq!(deserialize(&bytes).unwrap(), tree);
        }
    }
}
