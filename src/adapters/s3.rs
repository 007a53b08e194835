use std::time::{Duration, SystemTime};

use aws_sdk_s3::{
    error::SdkError,
    primitives::ByteStream,
    primitives::DateTime,
    types::{CompletedMultipartUpload, CompletedPart},
};
use futures::{stream, StreamExt};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::{
    adapters,
    model::{
        self,
        fs::{FSError, FileReader},
    },
    util,
};

const SCHEME: &str = "s3";

// x-amz-copy-source is URL-encoded; unreserved characters and '/' stay literal.
const COPY_SOURCE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn copy_source(bucket: &str, key: &str) -> String {
    format!("{}/{}", bucket, utf8_percent_encode(key, COPY_SOURCE))
}

fn status_code<E>(err: &SdkError<E>) -> Option<u16> {
    err.raw_response().map(|resp| resp.status().as_u16())
}

fn to_system_time(last_modified: Option<&DateTime>) -> SystemTime {
    match last_modified {
        Some(dt) if dt.secs() >= 0 => {
            SystemTime::UNIX_EPOCH + Duration::new(dt.secs() as u64, dt.subsec_nanos())
        }
        _ => SystemTime::UNIX_EPOCH,
    }
}

fn backend_error<E>(operation: &'static str, bucket: &str, key: &str, err: SdkError<E>) -> FSError
where
    E: std::error::Error + 'static,
{
    let location = util::object::location(SCHEME, bucket, key);
    match status_code(&err) {
        Some(404) => FSError::NotFound { location },
        Some(412) => FSError::AlreadyExists { location },
        _ => FSError::Backend {
            operation,
            location,
            message: aws_sdk_s3::error::DisplayErrorContext(&err).to_string(),
        },
    }
}

/// Multipart upload. Parts stay invisible until `complete_multipart_upload`.
struct S3Upload {
    client: aws_sdk_s3::Client,
    bucket: String,
    key: String,
    upload_id: String,
    if_not_exists: bool,
    parts: Vec<CompletedPart>,
    last: Option<CompletedPart>,
}

impl S3Upload {
    fn send_part(&self, number: i32, chunk: &[u8]) -> Result<CompletedPart, FSError> {
        let req = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .part_number(number)
            .body(ByteStream::from(chunk.to_vec()));

        let up = util::poll::poll_until_ready_error(req.send())
            .map_err(|err| backend_error("upload_part", &self.bucket, &self.key, err))?;

        Ok(CompletedPart::builder()
            .set_e_tag(up.e_tag().map(|tag| tag.to_string()))
            .part_number(number)
            .build())
    }
}

impl adapters::Upload for S3Upload {
    fn fs_upload_part(&mut self, chunk: &[u8]) -> Result<(), FSError> {
        let part = self.send_part(self.parts.len() as i32 + 1, chunk)?;
        self.parts.push(part);
        Ok(())
    }

    fn fs_complete(&mut self, last: &[u8]) -> Result<(), FSError> {
        // A retried commit reuses the last part if it already went out.
        if self.last.is_none() {
            let part = self.send_part(self.parts.len() as i32 + 1, last)?;
            self.last = Some(part);
        }

        let mut parts = self.parts.clone();
        parts.extend(self.last.clone());

        let mut req = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(parts))
                    .build(),
            );

        if self.if_not_exists {
            req = req.if_none_match("*");
        }

        util::poll::poll_until_ready_error(req.send())
            .map_err(|err| backend_error("complete_upload", &self.bucket, &self.key, err))?;

        Ok(())
    }

    fn fs_abort(&mut self) -> Result<(), FSError> {
        let req = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(&self.key)
            .upload_id(&self.upload_id);

        util::poll::poll_until_ready_error(req.send())
            .map_err(|err| backend_error("abort_upload", &self.bucket, &self.key, err))?;

        Ok(())
    }
}

impl adapters::Object for aws_sdk_s3::Client {
    fn fs_name(&self) -> &'static str {
        "s3"
    }

    fn fs_scheme(&self) -> &'static str {
        SCHEME
    }

    fn fs_bucket_exists(&self, bucket: &str) -> Result<bool, FSError> {
        let req = self.head_bucket().bucket(bucket);

        match util::poll::poll_until_ready_error(req.send()) {
            Ok(_) => Ok(true),
            Err(err) => {
                if let Some(svc_err) = err.as_service_error() {
                    if svc_err.is_not_found() {
                        return Ok(false);
                    }
                }
                Err(backend_error("head_bucket", bucket, "", err))
            }
        }
    }

    fn fs_put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        if_not_exists: bool,
    ) -> Result<(), FSError> {
        let mut req = self
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(body));

        if if_not_exists {
            req = req.if_none_match("*");
        }

        util::poll::poll_until_ready_error(req.send())
            .map_err(|err| backend_error("put_object", bucket, key, err))?;

        Ok(())
    }

    fn fs_open_object(&self, bucket: &str, key: &str) -> Result<Box<dyn FileReader>, FSError> {
        let req = self.get_object().bucket(bucket).key(key);

        let o = match util::poll::poll_until_ready_error(req.send()) {
            Err(err) => {
                if let Some(svc_err) = err.as_service_error() {
                    if svc_err.is_no_such_key() {
                        return Err(FSError::NotFound {
                            location: util::object::location(SCHEME, bucket, key),
                        });
                    }
                }
                return Err(backend_error("get_object", bucket, key, err));
            }
            Ok(o) => o,
        };

        let chunks = stream::unfold(o.body, |mut body| async move {
            body.next().await.map(|chunk| (chunk, body))
        });

        Ok(Box::new(util::poll::StreamReader::new(
            chunks.boxed(),
            util::object::location(SCHEME, bucket, key),
        )))
    }

    fn fs_head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<model::fs::FSObject>, FSError> {
        let req = self.head_object().bucket(bucket).key(key);

        let ho = match util::poll::poll_until_ready_error(req.send()) {
            Err(err) => {
                if let Some(svc_err) = err.as_service_error() {
                    if svc_err.is_not_found() {
                        return Ok(None);
                    }
                }

                return Err(backend_error("head_object", bucket, key, err));
            }
            Ok(ho) => ho,
        };

        Ok(Some(model::fs::FSObject {
            key: key.to_string(),
            size: ho.content_length().unwrap_or(0).max(0) as u64,
            modified_time: to_system_time(ho.last_modified()),
        }))
    }

    fn fs_delete_object(&self, bucket: &str, key: &str) -> Result<(), FSError> {
        // DeleteObject also succeeds for missing keys.
        let req = self.delete_object().bucket(bucket).key(key);
        util::poll::poll_until_ready_error(req.send())
            .map_err(|err| backend_error("delete_object", bucket, key, err))?;

        Ok(())
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
            let mut req = self
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_delimiter(delimiter.map(|d| d.to_string()));

            if let Some(tok) = continuation_token {
                req = req.continuation_token(tok);
            }

            let lo = util::poll::poll_until_ready_error(req.send())
                .map_err(|err| backend_error("list_objects", bucket, prefix, err))?;

            for cp in lo.common_prefixes() {
                if let Some(p) = cp.prefix() {
                    entries.push(model::fs::FSListEntry::Prefix(p.to_string()));
                }
            }

            for o in lo.contents() {
                entries.push(model::fs::FSListEntry::Object(model::fs::FSObject {
                    key: o.key().unwrap_or("").to_string(),
                    size: o.size().unwrap_or(0).max(0) as u64,
                    modified_time: to_system_time(o.last_modified()),
                }));
            }

            continuation_token = lo.next_continuation_token().map(|tok| tok.to_string());
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
        let req = self.create_multipart_upload().bucket(bucket).key(key);

        let cu = util::poll::poll_until_ready_error(req.send())
            .map_err(|err| backend_error("start_upload", bucket, key, err))?;

        let upload_id = match cu.upload_id() {
            Some(id) => id.to_string(),
            None => {
                return Err(FSError::Backend {
                    operation: "start_upload",
                    location: util::object::location(SCHEME, bucket, key),
                    message: "no upload id returned".to_string(),
                })
            }
        };

        Ok(Box::new(S3Upload {
            client: self.clone(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id,
            if_not_exists,
            parts: Vec::new(),
            last: None,
        }))
    }

    fn fs_copy_object(&self, bucket: &str, src: &str, dst: &str) -> Result<(), FSError> {
        let req = self
            .copy_object()
            .bucket(bucket)
            .key(dst)
            .copy_source(copy_source(bucket, src));

        util::poll::poll_until_ready_error(req.send())
            .map_err(|err| backend_error("copy_object", bucket, src, err))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_system_time() {
        let cases = vec![
            (None, SystemTime::UNIX_EPOCH),
            (
                Some(DateTime::from_secs(10)),
                SystemTime::UNIX_EPOCH + Duration::from_secs(10),
            ),
            (Some(DateTime::from_secs(-10)), SystemTime::UNIX_EPOCH),
        ];

        for (input, expected) in cases {
            assert_eq!(to_system_time(input.as_ref()), expected, "failed for case: {:?}", input);
        }
    }

    #[test]
    fn test_copy_source() {
        let cases = vec![
            ("dir/file.txt", "bucket/dir/file.txt"),
            ("a b+c", "bucket/a%20b%2Bc"),
            ("100%?#", "bucket/100%25%3F%23"),
            ("caf\u{e9}/~x_y-z", "bucket/caf%C3%A9/~x_y-z"),
        ];

        for (key, expected) in cases {
            assert_eq!(copy_source("bucket", key), expected, "failed for case: {}", key);
        }
    }
}
