//! In-memory virtual file system stored inside the encrypted payload.

pub mod codec;
pub mod entry;
pub mod path;
pub mod tree;

pub use codec::{deserialize, serialize};
pub use entry::{Directory, Entry, EntryInfo, EntryKind, FileEntry, Timestamp};
pub use path::{MAX_DEPTH, MAX_NAME_LEN, VfsPath, validate_name};
pub use tree::{Tree, VaultStats};
