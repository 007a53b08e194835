//! Filesystem contract exposed to callers.
//!
//! Every operation takes a [`Context`] first and is synchronous. Returned
//! readers are released on drop; returned writers must be `close`d to
//! commit anything.

use std::{io::Read, path::Path, time::SystemTime};

use crate::{
    model::fs::{
        ContentSummary, DirEntry, FSError, FileInfo, FileReader, FileWriter, FsInfo,
    },
    util::context::Context,
};

/// Visitor for `walk`.
pub type WalkFn<'a> = &'a mut dyn FnMut(&str, &FileInfo) -> Result<(), FSError>;

pub trait Dfs: Send + Sync {
    fn user(&self, ctx: &Context) -> Result<String, FSError>;

    fn read_file(&self, ctx: &Context, path: &str) -> Result<Vec<u8>, FSError>;

    /// Downloads the object at `src` to the local file `dst`.
    fn copy_to_local(&self, ctx: &Context, src: &str, dst: &Path) -> Result<(), FSError>;

    /// Uploads the local file `src` to the object at `dst`.
    fn copy_to_remote(&self, ctx: &Context, src: &Path, dst: &str) -> Result<(), FSError>;

    fn close(&self, ctx: &Context) -> Result<(), FSError>;

    fn get_content_summary(&self, ctx: &Context, path: &str) -> Result<ContentSummary, FSError>;

    fn open(&self, ctx: &Context, path: &str) -> Result<Box<dyn FileReader>, FSError>;

    fn create(&self, ctx: &Context, path: &str) -> Result<Box<dyn FileWriter>, FSError>;

    /// `create` with HDFS-style parameters that have no object store meaning.
    fn create_file(
        &self,
        ctx: &Context,
        path: &str,
        replication: u16,
        block_size: u64,
        perm: u32,
    ) -> Result<Box<dyn FileWriter>, FSError>;

    fn append(&self, ctx: &Context, path: &str) -> Result<Box<dyn FileWriter>, FSError>;

    fn create_empty_file(&self, ctx: &Context, path: &str) -> Result<(), FSError>;

    fn mkdir(&self, ctx: &Context, path: &str, perm: u32) -> Result<(), FSError>;

    fn mkdir_all(&self, ctx: &Context, path: &str, perm: u32) -> Result<(), FSError>;

    fn chmod(&self, ctx: &Context, path: &str, perm: u32) -> Result<(), FSError>;

    fn chown(&self, ctx: &Context, path: &str, user: &str, group: &str) -> Result<(), FSError>;

    fn chtimes(
        &self,
        ctx: &Context,
        path: &str,
        atime: SystemTime,
        mtime: SystemTime,
    ) -> Result<(), FSError>;

    fn read_dir(&self, ctx: &Context, path: &str) -> Result<Vec<DirEntry>, FSError>;

    fn remove(&self, ctx: &Context, path: &str) -> Result<(), FSError>;

    /// Removes `path` and everything under it. A missing path is not an error.
    fn remove_all(&self, ctx: &Context, path: &str) -> Result<(), FSError>;

    fn rename(&self, ctx: &Context, old_path: &str, new_path: &str) -> Result<(), FSError>;

    fn rename_with_overwrite_option(
        &self,
        ctx: &Context,
        old_path: &str,
        new_path: &str,
        overwrite: bool,
    ) -> Result<(), FSError>;

    fn stat(&self, ctx: &Context, path: &str) -> Result<FileInfo, FSError>;

    fn stat_fs(&self, ctx: &Context) -> Result<FsInfo, FSError>;

    fn walk(&self, ctx: &Context, root: &str, visitor: WalkFn<'_>) -> Result<(), FSError>;
}

/// Context-aware streaming copies into and out of the store.
pub trait DfsUtil {
    /// Streams `reader` into the object `name`, returning the bytes written.
    fn stream_into_dfs(
        &self,
        ctx: &Context,
        reader: &mut dyn Read,
        name: &str,
        overwrite: bool,
    ) -> Result<u64, FSError>;

    /// Streams the object `name` into `writer` and closes it, returning the bytes read.
    fn stream_from_dfs(
        &self,
        ctx: &Context,
        writer: &mut dyn FileWriter,
        name: &str,
    ) -> Result<u64, FSError>;
}
