use std::{io, io::Read, sync::Arc};

use tracing::{error, info, span, Level};

use crate::{
    adapters::{self, ObjectWriter},
    api::DfsUtil,
    fs::ObjectFS,
    model::fs::{FSError, FileWriter},
    util::{
        self,
        context::Context,
        interruptible::{self, InterruptibleReader},
    },
};

fn transfer_error(location: String, transferred: u64, err: io::Error) -> FSError {
    match interruptible::context_error(&err) {
        Some(ctx_err) => FSError::Context(ctx_err),
        None => FSError::Transfer {
            location,
            transferred,
            message: err.to_string(),
        },
    }
}

/// Streams `reader` into `bucket/key`.
///
/// Without `overwrite` the key must not exist, checked up front and again
/// as a store-side precondition when the object is committed. The object is
/// committed only after the whole source has been read.
pub fn stream_into_store(
    ctx: &Context,
    client: &Arc<dyn adapters::Object>,
    bucket: &str,
    reader: &mut dyn Read,
    key: &str,
    overwrite: bool,
) -> Result<u64, FSError> {
    let location = util::object::location(client.fs_scheme(), bucket, key);

    if !overwrite && client.fs_head_object(bucket, key)?.is_some() {
        return Err(FSError::AlreadyExists { location });
    }

    let mut source = InterruptibleReader::new(ctx, reader);
    let mut writer = ObjectWriter::new(client.clone(), bucket, key, !overwrite);

    let (n, res) = interruptible::copy(&mut source, &mut writer);
    if let Err(err) = res {
        error!(error_message=%err, error_group="copy", location=%location);
        return Err(transfer_error(location, n, err));
    }

    writer.close().map_err(|err| match err {
        FSError::AlreadyExists { .. } | FSError::Context(_) => err,
        other => FSError::Transfer {
            location: location.clone(),
            transferred: n,
            message: other.to_string(),
        },
    })?;

    Ok(n)
}

/// Streams `bucket/object` into `writer`, closing `writer` only after a full copy.
pub fn stream_from_store(
    ctx: &Context,
    client: &dyn adapters::Object,
    bucket: &str,
    object: &str,
    writer: &mut dyn FileWriter,
) -> Result<u64, FSError> {
    let location = util::object::location(client.fs_scheme(), bucket, object);

    let source = client.fs_open_object(bucket, object).map_err(|err| match err {
        FSError::NotFound { .. } => err,
        other => FSError::Backend {
            operation: "read_object",
            location: location.clone(),
            message: other.to_string(),
        },
    })?;
    let mut source = InterruptibleReader::new(ctx, source);

    let (n, res) = interruptible::copy(&mut source, &mut *writer);
    if let Err(err) = res {
        error!(error_message=%err, error_group="copy", location=%location);
        return Err(transfer_error(location, n, err));
    }

    writer.close().map_err(|err| FSError::Transfer {
        location: location.clone(),
        transferred: n,
        message: format!("failed to close destination: {}", err),
    })?;

    Ok(n)
}

impl DfsUtil for ObjectFS {
    fn stream_into_dfs(
        &self,
        ctx: &Context,
        reader: &mut dyn Read,
        name: &str,
        overwrite: bool,
    ) -> Result<u64, FSError> {
        let span = span!(Level::INFO, "stream_into_dfs", context = "stream_into_dfs");
        let _e = span.enter();

        let session = self.session(ctx)?;
        info!(tx_id=%session.tx_id, name=name, overwrite=overwrite, "called");

        let key = util::object::object_key(name)?;
        let n = stream_into_store(ctx, session.client, session.bucket, reader, key, overwrite)?;

        info!(tx_id=%session.tx_id, bytes=n, "done");
        Ok(n)
    }

    fn stream_from_dfs(
        &self,
        ctx: &Context,
        writer: &mut dyn FileWriter,
        name: &str,
    ) -> Result<u64, FSError> {
        let span = span!(Level::INFO, "stream_from_dfs", context = "stream_from_dfs");
        let _e = span.enter();

        let session = self.session(ctx)?;
        info!(tx_id=%session.tx_id, name=name, "called");

        let key = util::object::object_key(name)?;
        let n = stream_from_store(ctx, session.client.as_ref(), session.bucket, key, writer)?;

        info!(tx_id=%session.tx_id, bytes=n, "done");
        Ok(n)
    }
}
