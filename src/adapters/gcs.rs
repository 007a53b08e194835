use std::time::SystemTime;

use futures::StreamExt;
use google_cloud_storage::http::{
    buckets::get::GetBucketRequest,
    resumable_upload_client::{ChunkSize, ResumableUploadClient, UploadStatus},
    objects::{
        delete::DeleteObjectRequest,
        download::Range,
        get::GetObjectRequest,
        list::ListObjectsRequest,
        rewrite::RewriteObjectRequest,
        upload::{Media, UploadObjectRequest, UploadType},
        Object as GcsObject,
    },
    Error,
};
use tracing::debug;

use crate::{
    adapters,
    model::{
        self,
        fs::{FSError, FileReader},
    },
    util,
};

const SCHEME: &str = "gs";

fn response_code(err: &Error) -> Option<u16> {
    match err {
        Error::Response(resp) => Some(resp.code),
        _ => None,
    }
}

fn to_fs_object(obj: GcsObject) -> model::fs::FSObject {
    model::fs::FSObject {
        key: obj.name,
        size: obj.size.max(0) as u64,
        modified_time: obj
            .updated
            .map(SystemTime::from)
            .unwrap_or(SystemTime::UNIX_EPOCH),
    }
}

fn map_error(operation: &'static str, bucket: &str, key: &str, err: Error) -> FSError {
    let location = util::object::location(SCHEME, bucket, key);
    match response_code(&err) {
        Some(404) => FSError::NotFound { location },
        Some(412) => FSError::AlreadyExists { location },
        _ => FSError::Backend {
            operation,
            location,
            message: err.to_string(),
        },
    }
}

fn upload_request(bucket: &str, if_not_exists: bool) -> UploadObjectRequest {
    // Generation 0 matches only when no live object exists.
    UploadObjectRequest {
        bucket: bucket.to_string(),
        if_generation_match: if_not_exists.then_some(0),
        ..Default::default()
    }
}

/// Resumable upload session. The object appears when the final chunk, which
/// carries the total size, is accepted.
struct GcsUpload {
    session: Option<ResumableUploadClient>,
    bucket: String,
    key: String,
    offset: u64,
}

impl GcsUpload {
    fn location(&self) -> String {
        util::object::location(SCHEME, &self.bucket, &self.key)
    }

    fn session(&self) -> Result<&ResumableUploadClient, FSError> {
        self.session.as_ref().ok_or_else(|| FSError::Backend {
            operation: "upload_object",
            location: self.location(),
            message: "upload session already cancelled".to_string(),
        })
    }
}

impl adapters::Upload for GcsUpload {
    fn fs_upload_part(&mut self, chunk: &[u8]) -> Result<(), FSError> {
        if chunk.is_empty() {
            return Ok(());
        }

        let last_byte = self.offset + chunk.len() as u64 - 1;
        let range = ChunkSize::new(self.offset, last_byte, None);
        let status = util::poll::poll_until_ready_error(
            self.session()?.upload_multiple_chunk(chunk.to_vec(), &range),
        )
        .map_err(|err| map_error("upload_part", &self.bucket, &self.key, err))?;

        if let UploadStatus::Ok(_) = status {
            return Err(FSError::Backend {
                operation: "upload_part",
                location: self.location(),
                message: "object finalized before the last chunk".to_string(),
            });
        }

        self.offset = last_byte + 1;
        Ok(())
    }

    fn fs_complete(&mut self, last: &[u8]) -> Result<(), FSError> {
        let total = self.offset + last.len() as u64;
        // An empty final request only declares the total size.
        let range = if last.is_empty() {
            ChunkSize::new(self.offset, self.offset, Some(total))
        } else {
            ChunkSize::new(self.offset, total - 1, Some(total))
        };

        let status = util::poll::poll_until_ready_error(
            self.session()?.upload_multiple_chunk(last.to_vec(), &range),
        )
        .map_err(|err| map_error("complete_upload", &self.bucket, &self.key, err))?;

        match status {
            UploadStatus::Ok(obj) => {
                debug!(key = %obj.name, size = obj.size, "upload finalized");
                Ok(())
            }
            other => Err(FSError::Backend {
                operation: "complete_upload",
                location: self.location(),
                message: format!("upload not finalized: {:?}", other),
            }),
        }
    }

    fn fs_abort(&mut self) -> Result<(), FSError> {
        if let Some(session) = self.session.take() {
            util::poll::poll_until_ready_error(session.cancel())
                .map_err(|err| map_error("cancel_upload", &self.bucket, &self.key, err))?;
        }
        Ok(())
    }
}

impl adapters::Object for google_cloud_storage::client::Client {
    fn fs_name(&self) -> &'static str {
        "gcs"
    }

    fn fs_scheme(&self) -> &'static str {
        SCHEME
    }

    fn fs_bucket_exists(&self, bucket: &str) -> Result<bool, FSError> {
        let req = GetBucketRequest {
            bucket: bucket.to_string(),
            ..Default::default()
        };

        match util::poll::poll_until_ready_error(self.get_bucket(&req)) {
            Ok(_) => Ok(true),
            Err(err) if response_code(&err) == Some(404) => Ok(false),
            Err(err) => Err(map_error("get_bucket", bucket, "", err)),
        }
    }

    fn fs_put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        if_not_exists: bool,
    ) -> Result<(), FSError> {
        let req = upload_request(bucket, if_not_exists);

        util::poll::poll_until_ready_error(self.upload_object(
            &req,
            body,
            &UploadType::Simple(Media::new(key.to_string())),
        ))
        .map_err(|err| map_error("put_object", bucket, key, err))?;

        Ok(())
    }

    fn fs_open_object(&self, bucket: &str, key: &str) -> Result<Box<dyn FileReader>, FSError> {
        let req = GetObjectRequest {
            bucket: bucket.to_string(),
            object: key.to_string(),
            ..Default::default()
        };

        let stream = util::poll::poll_until_ready_error(
            self.download_streamed_object(&req, &Range::default()),
        )
        .map_err(|err| map_error("download_object", bucket, key, err))?;

        Ok(Box::new(util::poll::StreamReader::new(
            stream.boxed(),
            util::object::location(SCHEME, bucket, key),
        )))
    }

    fn fs_head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<model::fs::FSObject>, FSError> {
        let req = GetObjectRequest {
            bucket: bucket.to_string(),
            object: key.to_string(),
            ..Default::default()
        };

        match util::poll::poll_until_ready_error(self.get_object(&req)) {
            Ok(obj) => Ok(Some(to_fs_object(obj))),
            Err(err) if response_code(&err) == Some(404) => Ok(None),
            Err(err) => Err(map_error("head_object", bucket, key, err)),
        }
    }

    fn fs_delete_object(&self, bucket: &str, key: &str) -> Result<(), FSError> {
        let req = DeleteObjectRequest {
            bucket: bucket.to_string(),
            object: key.to_string(),
            ..Default::default()
        };

        util::poll::poll_until_ready_error(self.delete_object(&req))
            .map_err(|err| map_error("delete_object", bucket, key, err))
    }

    fn fs_list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> Result<Vec<model::fs::FSListEntry>, FSError> {
        let mut entries = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let req = ListObjectsRequest {
                bucket: bucket.to_string(),
                prefix: Some(prefix.to_string()),
                delimiter: delimiter.map(|d| d.to_string()),
                page_token: continuation_token.clone(),
                ..Default::default()
            };

            let lo = util::poll::poll_until_ready_error(self.list_objects(&req))
                .map_err(|err| map_error("list_objects", bucket, prefix, err))?;

            for common in lo.prefixes.unwrap_or_default() {
                entries.push(model::fs::FSListEntry::Prefix(common));
            }

            for obj in lo.items.unwrap_or_default() {
                entries.push(model::fs::FSListEntry::Object(to_fs_object(obj)));
            }

            continuation_token = lo.next_page_token;
            if continuation_token.is_none() {
                break;
            }
        }

        Ok(entries)
    }

    fn fs_begin_upload(
        &self,
        bucket: &str,
        key: &str,
        if_not_exists: bool,
    ) -> Result<Box<dyn adapters::Upload>, FSError> {
        let req = upload_request(bucket, if_not_exists);

        let session = util::poll::poll_until_ready_error(
            self.prepare_resumable_upload(&req, &UploadType::Simple(Media::new(key.to_string()))),
        )
        .map_err(|err| map_error("start_upload", bucket, key, err))?;

        Ok(Box::new(GcsUpload {
            session: Some(session),
            bucket: bucket.to_string(),
            key: key.to_string(),
            offset: 0,
        }))
    }

    fn fs_copy_object(&self, bucket: &str, src: &str, dst: &str) -> Result<(), FSError> {
        // Large objects take several rewrite calls; each resumes from the last token.
        let mut rewrite_token: Option<String> = None;

        loop {
            let req = RewriteObjectRequest {
                destination_bucket: bucket.to_string(),
                destination_object: dst.to_string(),
                source_bucket: bucket.to_string(),
                source_object: src.to_string(),
                rewrite_token: rewrite_token.clone(),
                ..Default::default()
            };

            let res = util::poll::poll_until_ready_error(self.rewrite_object(&req))
                .map_err(|err| map_error("copy_object", bucket, src, err))?;

            debug!(
                src = src,
                dst = dst,
                rewritten = res.total_bytes_rewritten,
                size = res.object_size,
                "rewrite progress"
            );

            if res.done {
                return Ok(());
            }

            rewrite_token = res.rewrite_token;
            if rewrite_token.is_none() {
                return Err(FSError::Backend {
                    operation: "copy_object",
                    location: util::object::location(SCHEME, bucket, dst),
                    message: "rewrite incomplete without a resume token".to_string(),
                });
            }
        }
    }
}
