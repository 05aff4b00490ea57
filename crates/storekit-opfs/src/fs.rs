//! The slice of the File System API the OPFS adapters rely on.

use storekit_core::platform::MaybeSendSync;
use storekit_core::{async_trait, BackendError};

use crate::sync_file::SyncAccessHandle;

pub type FsResult<T> = std::result::Result<T, BackendError>;

/// Source of the origin-private root directory (`navigator.storage.getDirectory()`).
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait RootProvider: MaybeSendSync {
    type Directory: DirectoryHandle;

    async fn open_root(&self) -> FsResult<Self::Directory>;
}

/// `FileSystemDirectoryHandle`, restricted to flat file entries.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait DirectoryHandle: MaybeSendSync {
    type File: FileHandle;

    /// `getFileHandle(name, { create })`. A missing entry without `create` is `NotFoundError`.
    async fn get_file_handle(&self, name: &str, create: bool) -> FsResult<Self::File>;

    /// `removeEntry(name)`. A missing entry is `NotFoundError`.
    async fn remove_entry(&self, name: &str) -> FsResult<()>;

    /// Entry names, in the directory's own iteration order.
    async fn keys(&self) -> FsResult<Vec<String>>;

    async fn entries(&self) -> FsResult<Vec<(String, Self::File)>>;
}

/// `FileSystemFileHandle`.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait FileHandle: MaybeSendSync {
    type Writable: WritableFile;
    type SyncHandle: SyncAccessHandle + MaybeSendSync;

    /// `(await getFile()).text()`.
    async fn text(&self) -> FsResult<String>;

    /// `createWritable()`: a stream whose contents replace the file on close.
    async fn create_writable(&self) -> FsResult<Self::Writable>;

    /// `createSyncAccessHandle()`. Only one handle per file may be open at a time, and in the
    /// browser only dedicated workers may call this.
    async fn create_sync_access_handle(&self) -> FsResult<Self::SyncHandle>;
}

/// `FileSystemWritableFileStream`.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait WritableFile: MaybeSendSync {
    async fn write(&mut self, data: &str) -> FsResult<()>;

    /// Commit the written data.
    async fn close(&mut self) -> FsResult<()>;
}

/// Reject names the browser would refuse (`TypeError`), which natively could also escape the
/// root directory.
pub fn validate_name(name: &str) -> FsResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(BackendError::new(
            "TypeError",
            format!("name is not allowed: {name:?}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::validate_name;

    #[test]
    fn names_that_escape_the_root_are_rejected() {
        for bad in ["", ".", "..", "a/b", "a\\b"] {
            assert_eq!(validate_name(bad).unwrap_err().name, "TypeError");
        }
        validate_name("hello world.json").unwrap();
    }
}
