use std::{fs::File, path::Path, time::SystemTime};

use tracing::{debug, error, info, span, warn, Level};

use crate::{
    api::{Dfs, WalkFn},
    fs::ObjectFS,
    model::fs::{
        ContentSummary, DirEntry, FSError, FSListEntry, FileInfo, FileReader, FileWriter, FsInfo,
    },
    util::{
        context::Context,
        interruptible,
        object::{dir_prefix, object_key},
    },
};

impl ObjectFS {
    fn rename_object(
        &self,
        ctx: &Context,
        old_path: &str,
        new_path: &str,
    ) -> Result<(), FSError> {
        let session = self.session(ctx)?;
        info!(tx_id=%session.tx_id, old_path=old_path, new_path=new_path, "called");

        let old_key = object_key(old_path)?;
        let new_key = object_key(new_path)?;

        if session.client.fs_head_object(session.bucket, old_key)?.is_none() {
            return Err(FSError::NotFound {
                location: session.location(old_key),
            });
        }

        if old_key == new_key {
            return Ok(());
        }

        if let Err(err) = self.copy_with_retry(ctx, &session, old_key, new_key) {
            error!(error_message=%err, error_group="copy_object");
            return Err(err);
        }

        if !self.config.delete_source_on_rename {
            return Ok(());
        }

        session
            .client
            .fs_delete_object(session.bucket, old_key)
            .map_err(|err| {
                error!(error_message=%err, error_group="delete_object");
                err
            })
    }
}

impl Dfs for ObjectFS {
    fn user(&self, _ctx: &Context) -> Result<String, FSError> {
        let span = span!(Level::INFO, "user", context = "user");
        let _e = span.enter();
        info!("called");

        self.throw_unimplemented("user")?;
        Ok(String::new())
    }

    fn read_file(&self, ctx: &Context, path: &str) -> Result<Vec<u8>, FSError> {
        let span = span!(Level::INFO, "read_file", context = "read_file");
        let _e = span.enter();

        let session = self.session(ctx)?;
        info!(tx_id=%session.tx_id, path=path, "called");

        let key = object_key(path)?;
        let mut reader = session.client.fs_open_object(session.bucket, key)?;

        let mut data = Vec::new();
        let (n, res) = interruptible::copy(&mut reader, &mut data);
        res.map_err(|err| {
            error!(error_message=%err, error_group="read_object");
            FSError::Transfer {
                location: session.location(key),
                transferred: n,
                message: err.to_string(),
            }
        })?;

        Ok(data)
    }

    fn copy_to_local(&self, ctx: &Context, src: &str, dst: &Path) -> Result<(), FSError> {
        let span = span!(Level::INFO, "copy_to_local", context = "copy_to_local");
        let _e = span.enter();

        let session = self.session(ctx)?;
        info!(tx_id=%session.tx_id, src=src, dst=%dst.display(), "called");

        let key = object_key(src)?;
        let mut reader = session.client.fs_open_object(session.bucket, key)?;
        let mut file = File::create(dst)?;

        let (n, res) = interruptible::copy(&mut reader, &mut file);
        res.map_err(|err| FSError::Transfer {
            location: session.location(key),
            transferred: n,
            message: err.to_string(),
        })?;

        file.close()
    }

    fn copy_to_remote(&self, ctx: &Context, src: &Path, dst: &str) -> Result<(), FSError> {
        let span = span!(Level::INFO, "copy_to_remote", context = "copy_to_remote");
        let _e = span.enter();

        let session = self.session(ctx)?;
        info!(tx_id=%session.tx_id, src=%src.display(), dst=dst, "called");

        let key = object_key(dst)?;
        let mut file = File::open(src)?;
        let mut writer = session.writer(key, false);

        let (n, res) = interruptible::copy(&mut file, &mut writer);
        res.map_err(|err| FSError::Transfer {
            location: session.location(key),
            transferred: n,
            message: err.to_string(),
        })?;

        writer.close()
    }

    fn close(&self, _ctx: &Context) -> Result<(), FSError> {
        // Sessions end with their call; nothing is held between calls.
        Ok(())
    }

    fn get_content_summary(&self, ctx: &Context, path: &str) -> Result<ContentSummary, FSError> {
        let span = span!(Level::INFO, "get_content_summary", context = "get_content_summary");
        let _e = span.enter();

        let info = self.stat(ctx, path)?;

        Ok(ContentSummary {
            length: info.size,
            ..Default::default()
        })
    }

    fn open(&self, ctx: &Context, path: &str) -> Result<Box<dyn FileReader>, FSError> {
        let span = span!(Level::INFO, "open", context = "open");
        let _e = span.enter();

        let session = self.session(ctx)?;
        info!(tx_id=%session.tx_id, path=path, "called");

        let key = object_key(path)?;
        session.client.fs_open_object(session.bucket, key)
    }

    fn create(&self, ctx: &Context, path: &str) -> Result<Box<dyn FileWriter>, FSError> {
        let span = span!(Level::INFO, "create", context = "create");
        let _e = span.enter();

        let session = self.session(ctx)?;
        info!(tx_id=%session.tx_id, path=path, "called");

        let key = object_key(path)?;
        Ok(Box::new(session.writer(key, false)))
    }

    fn create_file(
        &self,
        ctx: &Context,
        path: &str,
        replication: u16,
        block_size: u64,
        perm: u32,
    ) -> Result<Box<dyn FileWriter>, FSError> {
        debug!(
            path = path,
            replication = replication,
            block_size = block_size,
            perm = perm,
            "ignoring hdfs parameters"
        );
        self.create(ctx, path)
    }

    fn append(&self, _ctx: &Context, path: &str) -> Result<Box<dyn FileWriter>, FSError> {
        let span = span!(Level::INFO, "append", context = "append");
        let _e = span.enter();
        info!(path = path, "called");

        // Objects are replaced whole; an append would race with other writers.
        Err(FSError::NotImplemented {
            operation: "append",
        })
    }

    fn create_empty_file(&self, ctx: &Context, path: &str) -> Result<(), FSError> {
        let span = span!(Level::INFO, "create_empty_file", context = "create_empty_file");
        let _e = span.enter();

        let session = self.session(ctx)?;
        info!(tx_id=%session.tx_id, path=path, "called");

        let key = object_key(path)?;
        session.writer(key, false).close()
    }

    fn mkdir(&self, _ctx: &Context, path: &str, _perm: u32) -> Result<(), FSError> {
        debug!(path = path, "mkdir is a no-op");
        Ok(())
    }

    fn mkdir_all(&self, _ctx: &Context, path: &str, _perm: u32) -> Result<(), FSError> {
        debug!(path = path, "mkdir_all is a no-op");
        Ok(())
    }

    fn chmod(&self, _ctx: &Context, path: &str, perm: u32) -> Result<(), FSError> {
        let span = span!(Level::INFO, "chmod", context = "chmod");
        let _e = span.enter();
        info!(path = path, perm = perm, "called");

        self.throw_unimplemented("chmod")
    }

    fn chown(&self, _ctx: &Context, path: &str, user: &str, group: &str) -> Result<(), FSError> {
        let span = span!(Level::INFO, "chown", context = "chown");
        let _e = span.enter();
        info!(path = path, user = user, group = group, "called");

        self.throw_unimplemented("chown")
    }

    fn chtimes(
        &self,
        _ctx: &Context,
        path: &str,
        _atime: SystemTime,
        _mtime: SystemTime,
    ) -> Result<(), FSError> {
        let span = span!(Level::INFO, "chtimes", context = "chtimes");
        let _e = span.enter();
        info!(path = path, "called");

        self.throw_unimplemented("chtimes")
    }

    fn read_dir(&self, ctx: &Context, path: &str) -> Result<Vec<DirEntry>, FSError> {
        let span = span!(Level::INFO, "read_dir", context = "read_dir");
        let _e = span.enter();

        let session = self.session(ctx)?;
        info!(tx_id=%session.tx_id, path=path, "called");

        let prefix = dir_prefix(path)?;
        let listing = session
            .client
            .fs_list_objects(session.bucket, &prefix, Some("/"))
            .map_err(|err| {
                error!(error_message=%err, error_group="list_objects");
                err
            })?;

        let mut entries = Vec::with_capacity(listing.len());
        for entry in listing {
            match entry {
                // Zero-length "folder/" markers stand for the directory itself.
                FSListEntry::Object(obj) if obj.key == prefix => continue,
                FSListEntry::Object(obj) => entries.push(DirEntry::File(FileInfo::from_object(&obj))),
                FSListEntry::Prefix(p) => entries.push(DirEntry::Dir(FileInfo::from_prefix(&p))),
            }
        }

        Ok(entries)
    }

    fn remove(&self, ctx: &Context, path: &str) -> Result<(), FSError> {
        let span = span!(Level::INFO, "remove", context = "remove");
        let _e = span.enter();

        let session = self.session(ctx)?;
        info!(tx_id=%session.tx_id, path=path, "called");

        let key = object_key(path)?;
        if session.client.fs_head_object(session.bucket, key)?.is_none() {
            return Err(FSError::NotFound {
                location: session.location(key),
            });
        }

        session.client.fs_delete_object(session.bucket, key)
    }

    fn remove_all(&self, ctx: &Context, path: &str) -> Result<(), FSError> {
        let span = span!(Level::INFO, "remove_all", context = "remove_all");
        let _e = span.enter();

        let session = self.session(ctx)?;
        info!(tx_id=%session.tx_id, path=path, "called");

        let prefix = dir_prefix(path)?;
        let mut keys = Vec::new();

        if let Ok(key) = object_key(path) {
            if !key.ends_with('/') && session.client.fs_head_object(session.bucket, key)?.is_some() {
                keys.push(key.to_string());
            }
        }

        for entry in session.client.fs_list_objects(session.bucket, &prefix, None)? {
            if let FSListEntry::Object(obj) = entry {
                keys.push(obj.key);
            }
        }

        if prefix.is_empty() {
            warn!(tx_id=%session.tx_id, count = keys.len(), "removing every object in bucket");
        }

        for key in keys {
            match session.client.fs_delete_object(session.bucket, &key) {
                Ok(()) => debug!(key = %key, "deleted"),
                // Removed concurrently; the goal state already holds.
                Err(FSError::NotFound { .. }) => continue,
                Err(err) => {
                    error!(error_message=%err, error_group="delete_object");
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    fn rename(&self, ctx: &Context, old_path: &str, new_path: &str) -> Result<(), FSError> {
        let span = span!(Level::INFO, "rename", context = "rename");
        let _e = span.enter();

        self.rename_object(ctx, old_path, new_path)
    }

    fn rename_with_overwrite_option(
        &self,
        ctx: &Context,
        old_path: &str,
        new_path: &str,
        overwrite: bool,
    ) -> Result<(), FSError> {
        let span = span!(
            Level::INFO,
            "rename_with_overwrite_option",
            context = "rename_with_overwrite_option"
        );
        let _e = span.enter();

        // Objects are always replaced; the flag changes nothing.
        debug!(overwrite = overwrite, "ignoring overwrite flag");
        self.rename_object(ctx, old_path, new_path)
    }

    fn stat(&self, ctx: &Context, path: &str) -> Result<FileInfo, FSError> {
        let span = span!(Level::INFO, "stat", context = "stat");
        let _e = span.enter();

        let session = self.session(ctx)?;
        info!(tx_id=%session.tx_id, path=path, "called");

        let key = object_key(path)?;
        match session.client.fs_head_object(session.bucket, key)? {
            Some(obj) => Ok(FileInfo::from_object(&obj)),
            None => Err(FSError::NotFound {
                location: session.location(key),
            }),
        }
    }

    fn stat_fs(&self, _ctx: &Context) -> Result<FsInfo, FSError> {
        Ok(FsInfo {
            name: self.client.fs_name().to_string(),
        })
    }

    fn walk(&self, _ctx: &Context, root: &str, _visitor: WalkFn<'_>) -> Result<(), FSError> {
        let span = span!(Level::INFO, "walk", context = "walk");
        let _e = span.enter();
        info!(root = root, "called");

        self.throw_unimplemented("walk")
    }
}
