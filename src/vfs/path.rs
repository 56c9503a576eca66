//! VFS path handling and entry name rules.

use crate::error::{Result, VaultError};

/// Longest allowed entry name, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Deepest entry below the root. The root has depth 0, its children depth 1.
pub const MAX_DEPTH: usize = 255;

/// Checks that `name` is usable as a single entry name.
///
/// Rejects empty names, `.` and `..`, separators, NUL and other control
/// characters, and names longer than [`MAX_NAME_LEN`] bytes.
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = || Err(VaultError::InvalidName(name.to_string()));

    if name.is_empty() || name == "." || name == ".." {
        return invalid();
    }
    if name.len() > MAX_NAME_LEN {
        return invalid();
    }
    if name
        .chars()
        .any(|c| c == '/' || c == '\\' || c.is_control())
    {
        return invalid();
    }
    Ok(())
}

/// A validated path inside the vault.
///
/// Entries are addressed by path against the current tree, never by
/// reference into it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VfsPath {
    components: Vec<String>,
}

impl VfsPath {
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Parse a path string.
    ///
    /// The leading `/` is optional and `\` is accepted as a separator. Empty
    /// components are skipped; `.` and `..` are rejected.
    pub fn parse(path: &str) -> Result<Self> {
        let normalized = path.replace('\\', "/");

        let mut components = Vec::new();
        for component in normalized.split('/').filter(|s| !s.is_empty()) {
            if component == "." || component == ".." {
                return Err(VaultError::InvalidPath(path.to_string()));
            }
            validate_name(component).map_err(|_| VaultError::InvalidPath(path.to_string()))?;
            components.push(component.to_string());
        }

        Ok(Self { components })
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            Some(Self {
                components: self.components[..self.components.len() - 1].to_vec(),
            })
        }
    }

    /// Get the file/directory name (last component).
    pub fn name(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    /// Join a child path component.
    pub fn join(&self, name: &str) -> Result<Self> {
        validate_name(name)?;

        let mut components = self.components.clone();
        components.push(name.to_string());
        Ok(Self { components })
    }

    pub fn depth(&self) -> usize {
        self.components.len()
    }
}

impl std::fmt::Display for VfsPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_root() {
            write!(f, "/")
        } else {
            write!(f, "/{}", self.components.join("/"))
        }
    }
}
