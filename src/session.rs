//! Unlocked vault sessions.
//!
//! A [`VaultSession`] owns the derived key, the container lock and the
//! decrypted tree for as long as the vault is open. Nothing else keeps a
//! reference into the tree; callers address entries by path.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::crypto::{self, KdfParams, NonceSource, OsNonces, VaultKey};
use crate::error::{Result, VaultError};
use crate::format::VaultHeader;
use crate::storage::{self, Storage, VaultLock};
use crate::vfs::{self, EntryInfo, Tree, VaultStats, VfsPath};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Tree matches what was last persisted (or was just created).
    Clean,
    /// Tree has changes that `save` has not written yet.
    Dirty,
    /// Key wiped and lock released; every call fails with `SessionClosed`.
    Closed,
}

struct Unlocked {
    lock: VaultLock,
    key: VaultKey,
    header: VaultHeader,
    tree: Tree,
    dirty: bool,
    // false until the first save of a freshly created vault
    persisted: bool,
    nonces: Box<dyn NonceSource>,
}

/// An open vault.
pub struct VaultSession {
    inner: Option<Unlocked>,
}

impl VaultSession {
    /// Starts a new, empty vault at `storage`.
    ///
    /// The lock is taken immediately, but nothing is written until the first
    /// [`save`](Self::save).
    ///
    /// # Errors
    ///
    /// - [`VaultError::VaultBusy`] if another handle holds the lock
    /// - [`VaultError::VaultExists`] if a container is already there
    /// - [`VaultError::KdfFailure`] if `kdf` is out of bounds
    pub fn create(storage: Storage, password: Zeroizing<String>, kdf: KdfParams) -> Result<Self> {
        kdf.validate()?;

        storage.create_parent_dir()?;
        let lock = storage.lock()?;
        if storage.exists() {
            return Err(VaultError::VaultExists(storage.path().to_path_buf()));
        }

        let salt = crypto::generate_salt()?;
        let key = crypto::derive_key(&password, &salt, kdf)?;
        drop(password);

        info!(path = %storage.path().display(), "vault created");

        Ok(Self {
            inner: Some(Unlocked {
                lock,
                key,
                header: VaultHeader::new(salt, kdf),
                tree: Tree::new(),
                dirty: false,
                persisted: false,
                nonces: Box::new(OsNonces),
            }),
        })
    }

    /// Unlocks the vault at `storage`.
    ///
    /// The lock is acquired before any byte of the container is read and is
    /// kept until the session closes.
    ///
    /// # Errors
    ///
    /// - [`VaultError::VaultBusy`] if another handle holds the lock
    /// - [`VaultError::VaultNotFound`] if there is no container
    /// - [`VaultError::NotAVault`] / [`VaultError::UnsupportedVersion`]
    /// - [`VaultError::AuthenticationFailure`] for a wrong password or any
    ///   tampering with header or ciphertext
    /// - [`VaultError::FormatCorruption`] if authenticated content is malformed
    pub fn open(storage: Storage, password: Zeroizing<String>) -> Result<Self> {
        // a mistyped path must not leave a sidecar or directories behind
        if !storage.exists() {
            return Err(VaultError::VaultNotFound(storage.path().to_path_buf()));
        }

        let lock = storage.lock()?;
        if !storage.exists() {
            return Err(VaultError::VaultNotFound(storage.path().to_path_buf()));
        }

        let (header, payload) = lock.read_container()?;

        // out-of-range parameters can only come from a damaged header
        let key = crypto::derive_key(&password, header.salt(), *header.kdf()).map_err(|e| {
            debug!(error = %e, "header KDF parameters rejected");
            VaultError::AuthenticationFailure
        })?;
        drop(password);

        let packed = crypto::decrypt(&key, &header.to_bytes(), &payload)?;
        let plaintext = crypto::decompress(&packed)?;
        let tree = vfs::deserialize(&plaintext)?;

        info!(path = %storage.path().display(), entries = tree.stats().files, "vault unlocked");

        Ok(Self {
            inner: Some(Unlocked {
                lock,
                key,
                header,
                tree,
                dirty: false,
                persisted: true,
                nonces: Box::new(OsNonces),
            }),
        })
    }

    /// Replaces the nonce source used by later saves.
    pub fn with_nonce_source(mut self, nonces: impl NonceSource + 'static) -> Self {
        if let Some(inner) = self.inner.as_mut() {
            inner.nonces = Box::new(nonces);
        }
        self
    }

    fn unlocked(&self) -> Result<&Unlocked> {
        self.inner.as_ref().ok_or(VaultError::SessionClosed)
    }

    fn unlocked_mut(&mut self) -> Result<&mut Unlocked> {
        self.inner.as_mut().ok_or(VaultError::SessionClosed)
    }

    pub fn state(&self) -> SessionState {
        match &self.inner {
            None => SessionState::Closed,
            Some(inner) if inner.dirty => SessionState::Dirty,
            Some(_) => SessionState::Clean,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.state() == SessionState::Dirty
    }

    pub fn path(&self) -> Result<&Path> {
        Ok(self.unlocked()?.lock.storage().path())
    }

    pub fn header(&self) -> Result<&VaultHeader> {
        Ok(&self.unlocked()?.header)
    }

    /// Lists the directory at `path`.
    pub fn list(&self, path: &str) -> Result<Vec<EntryInfo>> {
        self.unlocked()?.tree.list(&VfsPath::parse(path)?)
    }

    pub fn info(&self, path: &str) -> Result<EntryInfo> {
        self.unlocked()?.tree.info(&VfsPath::parse(path)?)
    }

    pub fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.unlocked()?.tree.exists(&VfsPath::parse(path)?))
    }

    pub fn stats(&self) -> Result<VaultStats> {
        Ok(self.unlocked()?.tree.stats())
    }

    /// Adds a file named `name` holding `bytes` under `parent_path`.
    pub fn add(&mut self, parent_path: &str, name: &str, bytes: Vec<u8>) -> Result<()> {
        let parent = VfsPath::parse(parent_path)?;
        let inner = self.unlocked_mut()?;
        inner.tree.add_file(&parent, name, bytes)?;
        inner.dirty = true;
        Ok(())
    }

    /// Imports `host_path` from disk under its own file name.
    ///
    /// Returns the vault path of the new entry.
    pub fn add_file(&mut self, host_path: &Path, parent_path: &str) -> Result<String> {
        let parent = VfsPath::parse(parent_path)?;
        self.unlocked()?;

        let name = host_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| VaultError::InvalidName(host_path.display().to_string()))?
            .to_string();
        vfs::validate_name(&name)?;

        let bytes = fs::read(host_path)?;
        self.add(parent_path, &name, bytes)?;

        Ok(parent.join(&name)?.to_string())
    }

    /// Creates an empty directory `name` under `parent_path`.
    pub fn mkdir(&mut self, parent_path: &str, name: &str) -> Result<()> {
        let parent = VfsPath::parse(parent_path)?;
        let inner = self.unlocked_mut()?;
        inner.tree.create_dir(&parent, name)?;
        inner.dirty = true;
        Ok(())
    }

    /// Removes the entry at `path` together with everything below it.
    pub fn remove(&mut self, path: &str) -> Result<()> {
        let path = VfsPath::parse(path)?;
        let inner = self.unlocked_mut()?;
        inner.tree.remove(&path)?;
        inner.dirty = true;
        Ok(())
    }

    /// Returns a copy of the file content at `path`.
    pub fn extract(&self, path: &str) -> Result<Zeroizing<Vec<u8>>> {
        let path = VfsPath::parse(path)?;
        let content = self.unlocked()?.tree.read_file(&path)?;
        Ok(Zeroizing::new(content.to_vec()))
    }

    /// Writes the file at `path` into `dest_dir`, keeping its name.
    ///
    /// Replaces an existing host file of the same name; a symlink in its place
    /// is replaced, never followed. Returns the host path that was written.
    pub fn extract_to(&self, path: &str, dest_dir: &Path) -> Result<PathBuf> {
        let vpath = VfsPath::parse(path)?;
        let content = self.unlocked()?.tree.read_file(&vpath)?;
        let name = vpath
            .name()
            .ok_or_else(|| VaultError::NotAFile(vpath.to_string()))?;

        let target = storage::write_host_file(dest_dir, name, content)?;

        debug!(path = %vpath, target = %target.display(), "file extracted");
        Ok(target)
    }

    /// Re-encrypts the tree under a fresh nonce and atomically replaces the
    /// container.
    ///
    /// A clean session whose container is already on disk has nothing to
    /// write and returns immediately. On error the session stays dirty and
    /// the previous container is untouched.
    pub fn save(&mut self) -> Result<()> {
        let inner = self.unlocked_mut()?;

        if !inner.dirty && inner.persisted {
            debug!("no changes to save");
            return Ok(());
        }

        let plaintext = vfs::serialize(&inner.tree);
        let packed = crypto::compress(&plaintext)?;
        let aad = inner.header.to_bytes();
        let payload = crypto::encrypt_with(inner.nonces.as_mut(), &inner.key, &aad, &packed)?;

        inner.lock.write_container(&inner.header, &payload)?;
        inner.dirty = false;
        inner.persisted = true;

        info!(
            path = %inner.lock.storage().path().display(),
            bytes = payload.ciphertext().len(),
            "vault saved"
        );
        Ok(())
    }

    /// Wipes the key and plaintext and releases the lock.
    ///
    /// Unsaved changes are discarded. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(inner) = self.inner.take() {
            if inner.dirty {
                warn!(
                    path = %inner.lock.storage().path().display(),
                    "closing vault with unsaved changes"
                );
            }
            debug!(path = %inner.lock.storage().path().display(), "vault closed");
        }
    }
}

impl std::fmt::Debug for VaultSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultSession")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
