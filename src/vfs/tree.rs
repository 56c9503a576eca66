//! The in-memory vault tree.
//!
//! Every mutation validates fully before touching the tree, so a failed call
//! leaves it exactly as it was.

use tracing::debug;

use super::entry::{Directory, Entry, EntryInfo, FileEntry};
use super::path::{MAX_DEPTH, VfsPath, validate_name};
use crate::error::{Result, VaultError};

/// Counts reported by [`Tree::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VaultStats {
    pub files: usize,
    pub directories: usize,
    pub total_bytes: u64,
}

/// Tree of entries under a single unnamed root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    root: Directory,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    pub fn new() -> Self {
        Self {
            root: Directory::new(String::new()),
        }
    }

    pub(crate) fn from_root(root: Directory) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Directory {
        &self.root
    }

    fn not_found(path: &VfsPath) -> VaultError {
        VaultError::PathNotFound(path.to_string())
    }

    fn dir(&self, path: &VfsPath) -> Result<&Directory> {
        let mut current = &self.root;
        for component in path.components() {
            current = match current.children.get(component) {
                Some(Entry::Directory(d)) => d,
                Some(Entry::File(_)) | None => return Err(Self::not_found(path)),
            };
        }
        Ok(current)
    }

    fn dir_mut(&mut self, path: &VfsPath) -> Result<&mut Directory> {
        let mut current = &mut self.root;
        for component in path.components() {
            current = match current.children.get_mut(component) {
                Some(Entry::Directory(d)) => d,
                Some(Entry::File(_)) | None => return Err(Self::not_found(path)),
            };
        }
        Ok(current)
    }

    /// Resolves a non-root path to its entry.
    pub fn entry(&self, path: &VfsPath) -> Result<&Entry> {
        let (parent, name) = split(path)?;
        self.dir(&parent)
            .ok()
            .and_then(|d| d.children.get(name))
            .ok_or_else(|| Self::not_found(path))
    }

    pub fn exists(&self, path: &VfsPath) -> bool {
        path.is_root() || self.entry(path).is_ok()
    }

    pub fn info(&self, path: &VfsPath) -> Result<EntryInfo> {
        if path.is_root() {
            return Ok(self.root.info());
        }
        Ok(self.entry(path)?.info())
    }

    /// Lists the children of the directory at `path`, in name order.
    pub fn list(&self, path: &VfsPath) -> Result<Vec<EntryInfo>> {
        Ok(self.dir(path)?.children().map(Entry::info).collect())
    }

    /// Adds a file named `name` under the directory `parent`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::InvalidName`] if `name` is not a valid entry name
    /// - [`VaultError::PathNotFound`] if `parent` is not an existing directory
    /// - [`VaultError::NameConflict`] if a sibling named `name` exists
    /// - [`VaultError::InvalidPath`] if the entry would sit deeper than
    ///   [`MAX_DEPTH`]
    pub fn add_file(&mut self, parent: &VfsPath, name: &str, content: Vec<u8>) -> Result<()> {
        let size = content.len();
        self.insert(parent, name, || Entry::File(FileEntry::new(name.to_string(), content)))?;
        debug!(parent = %parent, name, size, "file added");
        Ok(())
    }

    /// Creates an empty directory named `name` under `parent`.
    pub fn create_dir(&mut self, parent: &VfsPath, name: &str) -> Result<()> {
        self.insert(parent, name, || {
            Entry::Directory(Directory::new(name.to_string()))
        })?;
        debug!(parent = %parent, name, "directory created");
        Ok(())
    }

    fn insert(&mut self, parent: &VfsPath, name: &str, make: impl FnOnce() -> Entry) -> Result<()> {
        validate_name(name)?;

        // anything deeper could be saved but never decoded again
        if parent.depth() >= MAX_DEPTH {
            return Err(VaultError::InvalidPath(format!(
                "{} is nested deeper than {MAX_DEPTH} levels",
                parent.join(name)?
            )));
        }

        let dir = self.dir_mut(parent)?;
        if dir.children.contains_key(name) {
            return Err(VaultError::NameConflict(parent.join(name)?.to_string()));
        }

        dir.children.insert(name.to_string(), make());
        Ok(())
    }

    /// Removes the entry at `path`; a directory goes with all descendants.
    ///
    /// Returns the detached subtree.
    pub fn remove(&mut self, path: &VfsPath) -> Result<Entry> {
        if path.is_root() {
            return Err(VaultError::InvalidPath("cannot remove the root directory".into()));
        }

        let (parent, name) = split(path)?;
        let dir = self.dir_mut(&parent).map_err(|_| Self::not_found(path))?;
        let removed = dir
            .children
            .remove(name)
            .ok_or_else(|| Self::not_found(path))?;

        debug!(path = %path, kind = ?removed.kind(), "entry removed");
        Ok(removed)
    }

    /// Returns the content of the file at `path`.
    ///
    /// # Errors
    ///
    /// - [`VaultError::PathNotFound`] if nothing lives at `path`
    /// - [`VaultError::NotAFile`] if `path` is a directory
    pub fn read_file(&self, path: &VfsPath) -> Result<&[u8]> {
        if path.is_root() {
            return Err(VaultError::NotAFile(path.to_string()));
        }
        match self.entry(path)? {
            Entry::File(f) => Ok(f.content()),
            Entry::Directory(_) => Err(VaultError::NotAFile(path.to_string())),
        }
    }

    pub fn stats(&self) -> VaultStats {
        fn walk(dir: &Directory, stats: &mut VaultStats) {
            for child in dir.children() {
                match child {
                    Entry::Directory(d) => {
                        stats.directories += 1;
                        walk(d, stats);
                    }
                    Entry::File(f) => {
                        stats.files += 1;
                        stats.total_bytes += f.size();
                    }
                }
            }
        }

        let mut stats = VaultStats::default();
        walk(&self.root, &mut stats);
        stats
    }
}

fn split(path: &VfsPath) -> Result<(VfsPath, &str)> {
    match (path.parent(), path.name()) {
        (Some(parent), Some(name)) => Ok((parent, name)),
        _ => Err(VaultError::InvalidPath(path.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::EntryKind;

    fn p(s: &str) -> VfsPath {
        VfsPath::parse(s).unwrap()
    }

    fn sample() -> Tree {
        let mut tree = Tree::new();
        tree.create_dir(&p("/"), "docs").unwrap();
        tree.create_dir(&p("/docs"), "old").unwrap();
        tree.add_file(&p("/"), "notes.txt", b"hello".to_vec()).unwrap();
        tree.add_file(&p("/docs"), "a.txt", b"aaa".to_vec()).unwrap();
        tree.add_file(&p("/docs/old"), "b.txt", b"bbbb".to_vec()).unwrap();
        tree
    }

    #[test]
    fn new_tree_is_empty() {
        let tree = Tree::new();
        assert!(tree.root().is_empty());
        assert_eq!(tree.root().name(), "");
        assert!(tree.list(&VfsPath::root()).unwrap().is_empty());
    }

    #[test]
    fn extract_returns_added_bytes() {
        let tree = sample();
        assert_eq!(tree.read_file(&p("/notes.txt")).unwrap(), b"hello");
        assert_eq!(tree.read_file(&p("/docs/old/b.txt")).unwrap(), b"bbbb");
    }

    #[test]
    fn duplicate_name_conflicts_and_leaves_tree_unchanged() {
        let mut tree = sample();
        let before = tree.clone();

        let err = tree.add_file(&p("/"), "notes.txt", b"other".to_vec()).unwrap_err();
        assert!(matches!(err, VaultError::NameConflict(ref n) if n == "/notes.txt"));

        assert!(matches!(
            tree.create_dir(&p("/"), "docs"),
            Err(VaultError::NameConflict(_))
        ));
        assert_eq!(tree, before);
    }

    #[test]
    fn add_into_missing_parent_fails() {
        let mut tree = sample();
        let before = tree.clone();
        assert!(matches!(
            tree.add_file(&p("/nope"), "x", vec![]),
            Err(VaultError::PathNotFound(_))
        ));
        // a file is not a valid parent
        assert!(matches!(
            tree.add_file(&p("/notes.txt"), "x", vec![]),
            Err(VaultError::PathNotFound(_))
        ));
        assert_eq!(tree, before);
    }

    #[test]
    fn add_with_bad_name_fails() {
        let mut tree = sample();
        let before = tree.clone();
        for bad in ["", ".", "..", "a/b", "..\\x", "nul\0"] {
            assert!(matches!(
                tree.add_file(&p("/"), bad, vec![1]),
                Err(VaultError::InvalidName(_))
            ));
        }
        assert_eq!(tree, before);
    }

    #[test]
    fn remove_directory_takes_descendants() {
        let mut tree = sample();
        let removed = tree.remove(&p("/docs")).unwrap();
        assert_eq!(removed.kind(), EntryKind::Directory);

        assert!(!tree.exists(&p("/docs")));
        assert!(!tree.exists(&p("/docs/a.txt")));
        assert!(!tree.exists(&p("/docs/old/b.txt")));
        assert_eq!(tree.stats(), VaultStats { files: 1, directories: 0, total_bytes: 5 });
    }

    #[test]
    fn remove_missing_fails() {
        let mut tree = sample();
        assert!(matches!(
            tree.remove(&p("/docs/zzz")),
            Err(VaultError::PathNotFound(_))
        ));
        assert!(matches!(
            tree.remove(&p("/notes.txt/inner")),
            Err(VaultError::PathNotFound(_))
        ));
        assert!(tree.remove(&VfsPath::root()).is_err());
    }

    #[test]
    fn read_directory_is_not_a_file() {
        let tree = sample();
        assert!(matches!(
            tree.read_file(&p("/docs")),
            Err(VaultError::NotAFile(_))
        ));
        assert!(matches!(
            tree.read_file(&VfsPath::root()),
            Err(VaultError::NotAFile(_))
        ));
        assert!(matches!(
            tree.read_file(&p("/missing")),
            Err(VaultError::PathNotFound(_))
        ));
    }

    #[test]
    fn list_is_name_ordered() {
        let tree = sample();
        let names: Vec<_> = tree
            .list(&VfsPath::root())
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["docs", "notes.txt"]);

        assert!(matches!(
            tree.list(&p("/notes.txt")),
            Err(VaultError::PathNotFound(_))
        ));
    }

    #[test]
    fn stats_count_everything() {
        let stats = sample().stats();
        assert_eq!(stats.files, 3);
        assert_eq!(stats.directories, 2);
        assert_eq!(stats.total_bytes, 12);
    }

    #[test]
    fn clones_do_not_observe_later_edits() {
        let mut tree = sample();
        let snapshot = tree.clone();
        tree.remove(&p("/notes.txt")).unwrap();

        assert!(snapshot.exists(&p("/notes.txt")));
        assert!(!tree.exists(&p("/notes.txt")));
    }

    fn nest(tree: &mut Tree, levels: usize) -> VfsPath {
        let mut path = VfsPath::root();
        for _ in 0..levels {
            tree.create_dir(&path, "d").unwrap();
            path = path.join("d").unwrap();
        }
        path
    }

    #[test]
    fn nesting_stops_at_max_depth() {
        let mut tree = Tree::new();
        let deepest = nest(&mut tree, MAX_DEPTH);
        assert_eq!(deepest.depth(), MAX_DEPTH);
        let before = tree.clone();

        assert!(matches!(
            tree.create_dir(&deepest, "d"),
            Err(VaultError::InvalidPath(_))
        ));
        assert!(matches!(
            tree.add_file(&deepest, "f", b"x".to_vec()),
            Err(VaultError::InvalidPath(_))
        ));
        assert_eq!(tree, before);
    }

    #[test]
    fn file_fits_at_max_depth() {
        let mut tree = Tree::new();
        let parent = nest(&mut tree, MAX_DEPTH - 1);
        tree.add_file(&parent, "leaf", b"x".to_vec()).unwrap();
        assert_eq!(tree.read_file(&parent.join("leaf").unwrap()).unwrap(), b"x");
    }
}
