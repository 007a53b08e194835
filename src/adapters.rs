use std::{
    io::{self, Write},
    sync::Arc,
};

use tracing::{debug, warn};

use crate::{
    model::{
        self,
        fs::{FSError, FileReader, FileWriter},
    },
    util,
};

pub mod gcs;
pub mod mock;
pub mod s3;

/// Object store primitives the filesystem is built from.
///
/// Implementations report a missing key as `FSError::NotFound` from
/// `fs_open_object` and `fs_copy_object`, and as `Ok(None)` from
/// `fs_head_object`. `fs_delete_object` on a missing key may succeed, as S3
/// does, or fail with `FSError::NotFound`.
pub trait Object: Send + Sync {
    /// Short backend name reported by `stat_fs`.
    fn fs_name(&self) -> &'static str;

    /// URI scheme used when rendering locations.
    fn fs_scheme(&self) -> &'static str;

    fn fs_bucket_exists(&self, bucket: &str) -> Result<bool, FSError>;

    /// Replaces the object at `key` with `body`. With `if_not_exists` the write
    /// fails with `FSError::AlreadyExists` when the key is already present.
    fn fs_put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        if_not_exists: bool,
    ) -> Result<(), FSError>;

    fn fs_open_object(&self, bucket: &str, key: &str) -> Result<Box<dyn FileReader>, FSError>;

    fn fs_head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<model::fs::FSObject>, FSError>;

    fn fs_delete_object(&self, bucket: &str, key: &str) -> Result<(), FSError>;

    /// Lists keys starting with `prefix`. With a delimiter, keys with a further
    /// delimiter after the prefix collapse into `FSListEntry::Prefix` rows.
    fn fs_list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> Result<Vec<model::fs::FSListEntry>, FSError>;

    /// Starts a chunked upload to `key`. With `if_not_exists` the commit fails
    /// with `FSError::AlreadyExists` when the key is already present.
    fn fs_begin_upload(
        &self,
        bucket: &str,
        key: &str,
        if_not_exists: bool,
    ) -> Result<Box<dyn Upload>, FSError>;

    /// Server-side copy, replacing `dst` unconditionally.
    fn fs_copy_object(&self, bucket: &str, src: &str, dst: &str) -> Result<(), FSError>;
}

/// Bytes buffered by an `ObjectWriter` before a chunk is sent. A multiple of
/// 256 KiB and above the 5 MiB S3 minimum part size.
pub const CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// A chunked upload in progress. Nothing is visible at the key until
/// `fs_complete` succeeds.
pub trait Upload: Send {
    /// Sends one full chunk.
    fn fs_upload_part(&mut self, chunk: &[u8]) -> Result<(), FSError>;

    /// Sends the final chunk and publishes the object. Calling it again after
    /// a failure retries the same commit.
    fn fs_complete(&mut self, last: &[u8]) -> Result<(), FSError>;

    /// Discards everything uploaded so far.
    fn fs_abort(&mut self) -> Result<(), FSError>;
}

/// Writer for a whole object.
///
/// At most one chunk is held locally. Small objects go out in a single put
/// on `close`; larger ones start a chunked upload once the first chunk
/// fills. A writer dropped before a successful `close` aborts its upload, so
/// the key is left as it was.
pub struct ObjectWriter {
    client: Arc<dyn Object>,
    bucket: String,
    key: String,
    if_not_exists: bool,
    chunk_size: usize,
    buf: Vec<u8>,
    upload: Option<Box<dyn Upload>>,
    closed: bool,
}

impl ObjectWriter {
    pub fn new(client: Arc<dyn Object>, bucket: &str, key: &str, if_not_exists: bool) -> Self {
        Self::with_chunk_size(client, bucket, key, if_not_exists, CHUNK_SIZE)
    }

    pub(crate) fn with_chunk_size(
        client: Arc<dyn Object>,
        bucket: &str,
        key: &str,
        if_not_exists: bool,
        chunk_size: usize,
    ) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            key: key.to_string(),
            if_not_exists,
            chunk_size: chunk_size.max(1),
            buf: Vec::new(),
            upload: None,
            closed: false,
        }
    }

    pub fn location(&self) -> String {
        util::object::location(self.client.fs_scheme(), &self.bucket, &self.key)
    }

    fn send_chunk(&mut self) -> Result<(), FSError> {
        if self.upload.is_none() {
            debug!(location = %self.location(), "starting chunked upload");
            let upload = self
                .client
                .fs_begin_upload(&self.bucket, &self.key, self.if_not_exists)?;
            self.upload = Some(upload);
        }

        // The chunk stays buffered until the store has accepted it.
        if let Some(upload) = self.upload.as_mut() {
            upload.fs_upload_part(&self.buf)?;
        }
        self.buf.clear();

        Ok(())
    }
}

impl Write for ObjectWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::other(format!(
                "write to closed object {}",
                self.location()
            )));
        }
        if data.is_empty() {
            return Ok(0);
        }

        // A full chunk is sent only once more bytes arrive, so the final
        // chunk handed to `fs_complete` is never empty after a part went out.
        if self.buf.len() >= self.chunk_size {
            self.send_chunk().map_err(io::Error::other)?;
        }

        let n = data.len().min(self.chunk_size - self.buf.len());
        self.buf.extend_from_slice(&data[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl FileWriter for ObjectWriter {
    fn close(&mut self) -> Result<(), FSError> {
        if self.closed {
            return Ok(());
        }

        debug!(location = %self.location(), pending = self.buf.len(), "finalizing object");
        match self.upload.as_mut() {
            Some(upload) => upload.fs_complete(&self.buf)?,
            None => self.client.fs_put_object(
                &self.bucket,
                &self.key,
                self.buf.clone(),
                self.if_not_exists,
            )?,
        }

        self.buf = Vec::new();
        self.upload = None;
        self.closed = true;

        Ok(())
    }
}

impl Drop for ObjectWriter {
    fn drop(&mut self) {
        if let Some(mut upload) = self.upload.take() {
            if let Err(err) = upload.fs_abort() {
                warn!(error_message=%err, location=%self.location(), "failed to abort upload");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    #[test]
    fn test_writer_commits_on_close() {
        let client = Arc::new(mock::MockClient::new());
        let mut writer = ObjectWriter::new(client.clone(), "bucket", "key", false);

        writer.write_all(b"abc").unwrap();
        assert!(client.fs_head_object("bucket", "key").unwrap().is_none());

        writer.close().unwrap();
        let mut out = Vec::new();
        client
            .fs_open_object("bucket", "key")
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();

        assert_eq!(out, b"abc");
    }

    #[test]
    fn test_dropped_writer_commits_nothing() {
        let client = Arc::new(mock::MockClient::new());
        {
            let mut writer = ObjectWriter::new(client.clone(), "bucket", "key", false);
            writer.write_all(b"abc").unwrap();
        }

        assert!(client.fs_head_object("bucket", "key").unwrap().is_none());
    }

    #[test]
    fn test_write_after_close_fails() {
        let client = Arc::new(mock::MockClient::new());
        let mut writer = ObjectWriter::new(client, "bucket", "key", false);

        writer.close().unwrap();
        assert!(writer.write_all(b"late").is_err());
        assert!(writer.close().is_ok(), "second close is a no-op");
    }

    #[test]
    fn test_if_not_exists_conflict() {
        let client = Arc::new(mock::MockClient::new());
        client.insert("bucket", "key", b"old".to_vec());

        let mut writer = ObjectWriter::new(client.clone(), "bucket", "key", true);
        writer.write_all(b"new").unwrap();

        assert!(writer.close().unwrap_err().is_already_exists());
        assert_eq!(client.get("bucket", "key"), Some(b"old".to_vec()));
    }

    #[test]
    fn test_close_retry_after_conflict_commits_payload() {
        // (chunk size, payload): single put, and a chunked upload with parts already sent
        let cases = vec![
            (CHUNK_SIZE, b"payload".to_vec()),
            (4, b"payload-spanning-chunks".to_vec()),
        ];

        for (chunk_size, payload) in cases {
            let client = Arc::new(mock::MockClient::new());
            client.insert("bucket", "key", b"old".to_vec());

            let mut writer =
                ObjectWriter::with_chunk_size(client.clone(), "bucket", "key", true, chunk_size);
            writer.write_all(&payload).unwrap();

            let err = writer.close().unwrap_err();
            assert!(err.is_already_exists(), "failed for case: {}", chunk_size);

            client.fs_delete_object("bucket", "key").unwrap();
            writer.close().unwrap();

            assert_eq!(
                client.get("bucket", "key"),
                Some(payload),
                "failed for case: {}",
                chunk_size
            );
        }
    }

    #[test]
    fn test_chunked_upload_holds_one_chunk() {
        let client = Arc::new(mock::MockClient::new());
        let mut writer = ObjectWriter::with_chunk_size(client.clone(), "bucket", "key", false, 4);

        for byte in b"0123456789" {
            writer.write_all(&[*byte]).unwrap();
            assert!(writer.buf.len() <= 4);
        }
        assert_eq!(client.uploads_started(), 1);
        assert!(client.fs_head_object("bucket", "key").unwrap().is_none());

        writer.close().unwrap();
        assert_eq!(client.get("bucket", "key"), Some(b"0123456789".to_vec()));
        assert_eq!(client.uploads_aborted(), 0);
    }

    #[test]
    fn test_exact_chunk_multiple() {
        let client = Arc::new(mock::MockClient::new());
        let mut writer = ObjectWriter::with_chunk_size(client.clone(), "bucket", "key", false, 4);

        writer.write_all(b"abcdefgh").unwrap();
        assert_eq!(writer.buf, b"efgh", "last full chunk waits for close");

        writer.close().unwrap();
        assert_eq!(client.get("bucket", "key"), Some(b"abcdefgh".to_vec()));
    }

    #[test]
    fn test_dropped_chunked_writer_aborts() {
        let client = Arc::new(mock::MockClient::new());
        {
            let mut writer =
                ObjectWriter::with_chunk_size(client.clone(), "bucket", "key", false, 4);
            writer.write_all(b"0123456789").unwrap();
        }

        assert_eq!(client.uploads_aborted(), 1);
        assert!(client.fs_head_object("bucket", "key").unwrap().is_none());
    }
}
