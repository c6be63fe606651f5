//! Read/write virtual file system over Nintendo 3DS (CCI/NCSD, CIA, NCCH,
//! ExeFS, RomFS) and Nintendo DS ROM containers.
//!
//! A ROM opens into one POSIX-like tree (`/ExeFS/`, `/RomFS/`,
//! `/Header.bin`, …). Reads come from the decoded image; writes, deletes
//! and new files land in a copy-on-write overlay; the ExeFS/RomFS
//! rebuilders turn the merged tree back into valid container bytes.
//! Images are assumed decrypted on entry.

pub mod accessor;
pub mod error;
pub mod host;
pub mod nintendo;
pub mod progress;
pub mod util;
pub mod vfs;

pub use accessor::{
    ByteAccessor, ByteAccessorExt, ByteAccessorMut, FileAccessor, MemoryAccessor, Region,
    SharedMemoryAccessor,
};
pub use error::{RomVfsError, RomVfsResult};
pub use host::{DiskFs, HostFs, MemoryFs};
pub use progress::{CancelToken, ExtractStatus, ProgressAggregator, ProgressToken};
pub use vfs::{Rom, RomBacking};
