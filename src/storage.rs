//! Storage backend for vault container files.
//!
//! Handles exclusive locking, crash-safe replacement of the container file and
//! validation of host paths.

use getrandom::fill;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use crate::crypto::EncryptedPayload;
use crate::error::{Result, VaultError};
use crate::format::{self, VaultHeader};
use crate::vfs;

/// Suffix of the sidecar file that carries the advisory lock.
pub const LOCK_SUFFIX: &str = ".lock";

/// A storage backend for persisting the vault container.
///
/// `Storage` only names the file; locking and container I/O go through the
/// [`VaultLock`] returned by [`Storage::lock`]. Raw reads are not available
/// without the lock:
///
/// ```compile_fail
/// let storage = coffer::Storage::new("vault.coffer").unwrap();
/// let _bytes = storage.load();
/// ```
#[derive(Debug, Clone)]
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    /// Creates a new Storage instance for `path`.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidPath`] if the path is empty, has no file
    /// name or contains `..` components.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        validate_container_path(&path)?;
        Ok(Self { path })
    }

    /// Returns `true` if the container file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Returns the path to the container file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the sidecar lock file.
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(LOCK_SUFFIX);
        PathBuf::from(name)
    }

    /// Acquires the exclusive advisory lock for this container.
    ///
    /// The lock lives on a sidecar file rather than the container itself, so it
    /// survives the rename performed by every save. It is held until the
    /// returned guard is dropped. Never blocks: if another handle holds the
    /// lock this fails with [`VaultError::VaultBusy`].
    ///
    /// The parent directory must already exist; nothing is created on disk
    /// apart from the sidecar. Use [`Storage::create_parent_dir`] first when
    /// setting up a new vault.
    pub fn lock(&self) -> Result<VaultLock> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.lock_path())?;

        match file.try_lock() {
            Ok(()) => {
                debug!(path = %self.path.display(), "vault lock acquired");
                Ok(VaultLock {
                    storage: self.clone(),
                    file,
                })
            }
            Err(TryLockError::WouldBlock) => {
                warn!(path = %self.path.display(), "vault is locked by another handle");
                Err(VaultError::VaultBusy(self.path.clone()))
            }
            Err(TryLockError::Error(e)) => Err(e.into()),
        }
    }

    /// Creates the directory the container will live in.
    pub fn create_parent_dir(&self) -> Result<()> {
        fs::create_dir_all(self.parent_dir())?;
        Ok(())
    }

    /// Loads the entire container file into memory.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::VaultNotFound`] if the file is missing.
    pub(crate) fn load(&self) -> Result<Vec<u8>> {
        fs::read(&self.path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => VaultError::VaultNotFound(self.path.clone()),
            _ => e.into(),
        })
    }

    /// Saves data to the container file using atomic write.
    ///
    /// This method ensures crash-safety by:
    /// 1. Writing data to a temporary file with random name
    /// 2. Syncing the temporary file to disk
    /// 3. Atomically replacing the old file with the new one
    /// 4. Syncing the parent directory to ensure the rename is persisted
    ///
    /// If a crash occurs during save, either the old or new file will be present,
    /// never a corrupted partial write.
    ///
    /// Creates parent directories if they don't exist.
    pub(crate) fn save(&self, data: &[u8]) -> Result<()> {
        self.stage(data)?.commit()
    }

    /// Performs steps 1 and 2 of [`Storage::save`].
    ///
    /// The target file is untouched until [`StagedWrite::commit`]; dropping the
    /// staged write discards the temporary file.
    pub(crate) fn stage(&self, data: &[u8]) -> Result<StagedWrite> {
        fs::create_dir_all(self.parent_dir())?;

        let tmp_path = self.random_tmp_path()?;

        // securely create temp file (fail if exists)
        let mut tmp_file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;

        let staged = StagedWrite {
            tmp_path,
            target: self.clone(),
            committed: false,
        };

        tmp_file.write_all(data)?;
        tmp_file.sync_all()?;

        Ok(staged)
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Generates a unique temporary file path in the same directory.
    ///
    /// Format: `filename.tmp.<randomhex>`
    fn random_tmp_path(&self) -> Result<PathBuf> {
        let mut buf = [0u8; 8]; // 64 bit entropy
        fill(&mut buf).map_err(|e| io::Error::other(format!("random generator failed: {e}")))?;

        let rand_string = buf.iter().map(|b| format!("{:02x}", b)).collect::<String>();

        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| VaultError::InvalidPath(self.path.display().to_string()))?
            .to_string_lossy();

        let tmp_name = format!("{}.tmp.{}", file_name, rand_string);

        Ok(self.path.with_file_name(tmp_name))
    }

    /// Atomically replaces the target file with the temporary file.
    ///
    /// Uses Windows `ReplaceFileW` API with `REPLACEFILE_WRITE_THROUGH` flag
    /// when the target exists; a first write is a plain rename.
    #[cfg(target_os = "windows")]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;
        use windows_sys::Win32::Storage::FileSystem::{REPLACEFILE_WRITE_THROUGH, ReplaceFileW};

        if !self.path.exists() {
            fs::rename(tmp_path, &self.path)?;
            return Ok(());
        }

        fn to_wide(s: &OsStr) -> Vec<u16> {
            s.encode_wide().chain(std::iter::once(0)).collect()
        }

        let target_w = to_wide(self.path.as_os_str());
        let tmp_w = to_wide(tmp_path.as_os_str());

        // SAFETY:
        // - Strings are valid UTF-16 and null-terminated
        // - Pointers remain valid during the call
        // - Windows does not retain the pointers after return
        let result = unsafe {
            ReplaceFileW(
                target_w.as_ptr(),
                tmp_w.as_ptr(),
                std::ptr::null(),
                REPLACEFILE_WRITE_THROUGH,
                std::ptr::null(),
                std::ptr::null(),
            )
        };

        if result == 0 {
            return Err(io::Error::last_os_error().into());
        }

        Ok(())
    }

    /// Atomically replaces the target file with the temporary file.
    ///
    /// On Unix, `rename()` is atomic when both paths are on the same filesystem.
    #[cfg(not(target_os = "windows"))]
    fn atomic_replace(&self, tmp_path: &Path) -> Result<()> {
        fs::rename(tmp_path, &self.path)?;
        Ok(())
    }

    #[cfg(not(target_os = "windows"))]
    fn sync_parent_dir(&self) -> Result<()> {
        File::open(self.parent_dir())?.sync_all()?;
        Ok(())
    }

    // directory handles cannot be fsynced through std on Windows; ReplaceFileW
    // with write-through covers durability there
    #[cfg(target_os = "windows")]
    fn sync_parent_dir(&self) -> Result<()> {
        Ok(())
    }
}

/// A fully written and synced temporary file waiting to replace the target.
#[must_use = "a staged write does nothing until committed"]
#[derive(Debug)]
pub(crate) struct StagedWrite {
    tmp_path: PathBuf,
    target: Storage,
    committed: bool,
}

impl StagedWrite {
    #[cfg(test)]
    pub fn tmp_path(&self) -> &Path {
        &self.tmp_path
    }

    /// Atomically replaces the target with the staged content.
    pub fn commit(mut self) -> Result<()> {
        self.target.atomic_replace(&self.tmp_path)?;
        self.committed = true;
        self.target.sync_parent_dir()?;
        debug!(path = %self.target.path.display(), "container replaced");
        Ok(())
    }
}

impl Drop for StagedWrite {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.tmp_path);
        }
    }
}

/// Exclusive hold on a container path.
///
/// Container reads and writes are only reachable through this guard. The
/// lock is released when the guard is dropped.
#[derive(Debug)]
pub struct VaultLock {
    storage: Storage,
    file: File,
}

impl VaultLock {
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Reads the container and splits it into header and encrypted payload.
    ///
    /// # Errors
    ///
    /// - [`VaultError::VaultNotFound`] if the file does not exist
    /// - [`VaultError::NotAVault`] / [`VaultError::UnsupportedVersion`] on a
    ///   bad magic or version
    /// - [`VaultError::IoFailure`] for other I/O errors
    pub fn read_container(&self) -> Result<(VaultHeader, EncryptedPayload)> {
        let data = self.storage.load()?;
        format::parse(&data)
    }

    /// Frames header, nonce and ciphertext and atomically replaces the
    /// container file.
    pub fn write_container(&self, header: &VaultHeader, payload: &EncryptedPayload) -> Result<()> {
        let bytes = format::serialize(header, payload)?;
        self.storage.save(&bytes)
    }
}

impl Drop for VaultLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        debug!(path = %self.storage.path.display(), "vault lock released");
    }
}

fn validate_container_path(path: &Path) -> Result<()> {
    let invalid = || VaultError::InvalidPath(path.display().to_string());

    if path.as_os_str().is_empty() || path.file_name().is_none() {
        return Err(invalid());
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(invalid());
    }
    Ok(())
}

/// Joins an entry name onto `dir`, refusing anything that would land outside
/// of `dir`.
pub fn safe_join(dir: &Path, name: &str) -> Result<PathBuf> {
    vfs::validate_name(name).map_err(|_| VaultError::InvalidPath(name.to_string()))?;

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(dir.join(name)),
        _ => Err(VaultError::InvalidPath(name.to_string())),
    }
}

/// Writes `content` to `dir/name` on the host.
///
/// The file is staged next to the target and renamed over it, so a symlink
/// already sitting at the target is replaced instead of followed.
pub(crate) fn write_host_file(dir: &Path, name: &str, content: &[u8]) -> Result<PathBuf> {
    let target = safe_join(dir, name)?;
    fs::create_dir_all(dir)?;

    Storage {
        path: target.clone(),
    }
    .save(content)?;

    Ok(target)
}
