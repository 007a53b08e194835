use crate::model::fs::FSError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    AWS,
    GCS,
}

impl Provider {
    pub fn is_aws(&self) -> bool {
        matches!(self, Provider::AWS)
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Provider::AWS => "s3",
            Provider::GCS => "gs",
        }
    }
}

pub fn parse_provider_from_uri(bucket_uri: &str) -> Result<Provider, FSError> {
    if bucket_uri.starts_with("s3://") {
        Ok(Provider::AWS)
    } else if bucket_uri.starts_with("gs://") {
        Ok(Provider::GCS)
    } else {
        Err(FSError::InvalidUri {
            uri: bucket_uri.to_string(),
        })
    }
}

pub fn parse_bucket_from_uri(bucket_uri: &str) -> Result<&str, FSError> {
    match bucket_uri.split_once("://") {
        Some((_, rest)) => {
            let bucket = rest.trim_end_matches('/');
            if bucket.is_empty() || bucket.contains('/') {
                return Err(FSError::InvalidUri {
                    uri: bucket_uri.to_string(),
                });
            }
            Ok(bucket)
        }
        None => Err(FSError::InvalidUri {
            uri: bucket_uri.to_string(),
        }),
    }
}

/// Renders `scheme://bucket/key` for error messages and logs.
pub fn location(scheme: &str, bucket: &str, key: &str) -> String {
    if key.is_empty() {
        format!("{}://{}", scheme, bucket)
    } else {
        format!("{}://{}/{}", scheme, bucket, key)
    }
}

/// Maps a filesystem path to an object key. The root and empty paths have no key.
pub fn object_key(path: &str) -> Result<&str, FSError> {
    let key = path.trim_start_matches('/');
    if key.is_empty() {
        return Err(FSError::InvalidPath {
            path: path.to_string(),
        });
    }
    Ok(key)
}

/// Maps a filesystem path to the prefix its children share. The root maps to "".
pub fn dir_prefix(path: &str) -> Result<String, FSError> {
    if path.is_empty() {
        return Err(FSError::InvalidPath {
            path: path.to_string(),
        });
    }

    let key = path.trim_start_matches('/');
    if key.is_empty() || key.ends_with('/') {
        Ok(key.to_string())
    } else {
        Ok(format!("{}/", key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider() {
        assert!(matches!(parse_provider_from_uri("s3://bucket"), Ok(Provider::AWS)));
        assert!(matches!(parse_provider_from_uri("gs://bucket"), Ok(Provider::GCS)));
        assert!(matches!(parse_provider_from_uri("ftp://bucket"), Err(_)));
    }

    #[test]
    fn test_parse_bucket() {
        let cases = vec![
            ("s3://bucket", Some("bucket")),
            ("gs://bucket", Some("bucket")),
            ("gs://bucket/", Some("bucket")),
            ("gs://bucket/key", None),
            ("gs://", None),
            ("bucket", None),
        ];

        for (input, expected) in cases {
            let result = parse_bucket_from_uri(input).ok();
            assert_eq!(result, expected, "failed for case: {}", input);
        }
    }

    #[test]
    fn test_location() {
        assert_eq!(location("gs", "bucket", "a/b"), "gs://bucket/a/b");
        assert_eq!(location("s3", "bucket", ""), "s3://bucket");
    }

    #[test]
    fn test_object_key() {
        let cases = vec![
            ("file", Some("file")),
            ("/file", Some("file")),
            ("//folder/file", Some("folder/file")),
            ("folder/", Some("folder/")),
            ("/", None),
            ("", None),
        ];

        for (input, expected) in cases {
            let result = object_key(input).ok();
            assert_eq!(result, expected, "failed for case: {}", input);
        }
    }

    #[test]
    fn test_dir_prefix() {
        let cases = vec![
            ("a", Some("a/")),
            ("a/", Some("a/")),
            ("/a/b", Some("a/b/")),
            ("/", Some("")),
            ("", None),
        ];

        for (input, expected) in cases {
            let result = dir_prefix(input).ok();
            assert_eq!(result.as_deref(), expected, "failed for case: {}", input);
        }
    }
}
