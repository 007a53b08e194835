use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    io::Cursor,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::SystemTime,
};

use crate::{
    adapters,
    model::{
        self,
        fs::{FSError, FileReader},
    },
    util,
};

const SCHEME: &str = "mem";

#[derive(Clone, Debug)]
struct StoredObject {
    body: Vec<u8>,
    modified_time: SystemTime,
}

type Store = Arc<Mutex<BTreeMap<(String, String), StoredObject>>>;

fn lock_store(
    store: &Store,
) -> Result<MutexGuard<'_, BTreeMap<(String, String), StoredObject>>, FSError> {
    store.lock().map_err(|err| FSError::Backend {
        operation: "acquire_guard",
        location: SCHEME.to_string(),
        message: err.to_string(),
    })
}

fn commit(
    store: &Store,
    bucket: &str,
    key: &str,
    body: Vec<u8>,
    if_not_exists: bool,
) -> Result<(), FSError> {
    let mut objects = lock_store(store)?;
    let id = (bucket.to_string(), key.to_string());

    if if_not_exists && objects.contains_key(&id) {
        return Err(FSError::AlreadyExists {
            location: util::object::location(SCHEME, bucket, key),
        });
    }

    objects.insert(
        id,
        StoredObject {
            body,
            modified_time: SystemTime::now(),
        },
    );

    Ok(())
}

/// Chunked upload that keeps its parts aside until completion.
struct MockUpload {
    store: Store,
    bucket: String,
    key: String,
    if_not_exists: bool,
    parts: Vec<u8>,
    aborted: Arc<AtomicU32>,
}

impl adapters::Upload for MockUpload {
    fn fs_upload_part(&mut self, chunk: &[u8]) -> Result<(), FSError> {
        self.parts.extend_from_slice(chunk);
        Ok(())
    }

    fn fs_complete(&mut self, last: &[u8]) -> Result<(), FSError> {
        let mut body = self.parts.clone();
        body.extend_from_slice(last);
        commit(&self.store, &self.bucket, &self.key, body, self.if_not_exists)
    }

    fn fs_abort(&mut self) -> Result<(), FSError> {
        self.parts.clear();
        self.aborted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory object store with failure injection, used by tests.
#[derive(Default)]
pub struct MockClient {
    objects: Store,
    buckets: Mutex<BTreeSet<String>>,
    uploads_started: AtomicU32,
    uploads_aborted: Arc<AtomicU32>,
    copy_failures: AtomicU32,
    copy_calls: AtomicU32,
    failing_deletes: Mutex<HashSet<String>>,
    lenient_deletes: AtomicBool,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bucket(bucket: &str) -> Self {
        let client = Self::default();
        if let Ok(mut buckets) = client.buckets.lock() {
            buckets.insert(bucket.to_string());
        }
        client
    }

    pub fn insert(&self, bucket: &str, key: &str, body: Vec<u8>) {
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert(
                (bucket.to_string(), key.to_string()),
                StoredObject {
                    body,
                    modified_time: SystemTime::now(),
                },
            );
        }
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .ok()?
            .get(&(bucket.to_string(), key.to_string()))
            .map(|obj| obj.body.clone())
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        match self.objects.lock() {
            Ok(objects) => objects
                .keys()
                .filter(|(b, _)| b == bucket)
                .map(|(_, k)| k.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// The next `count` copies fail with a transient backend error.
    pub fn fail_next_copies(&self, count: u32) {
        self.copy_failures.store(count, Ordering::SeqCst);
    }

    pub fn copy_calls(&self) -> u32 {
        self.copy_calls.load(Ordering::SeqCst)
    }

    pub fn uploads_started(&self) -> u32 {
        self.uploads_started.load(Ordering::SeqCst)
    }

    pub fn uploads_aborted(&self) -> u32 {
        self.uploads_aborted.load(Ordering::SeqCst)
    }

    /// Deleting a missing key succeeds, as it does on S3.
    pub fn lenient_deletes(&self) {
        self.lenient_deletes.store(true, Ordering::SeqCst);
    }

    /// Deleting `key` fails with a backend error until the process ends.
    pub fn fail_delete(&self, key: &str) {
        if let Ok(mut failing) = self.failing_deletes.lock() {
            failing.insert(key.to_string());
        }
    }

    fn lock_objects(
        &self,
    ) -> Result<MutexGuard<'_, BTreeMap<(String, String), StoredObject>>, FSError> {
        lock_store(&self.objects)
    }

    fn not_found(bucket: &str, key: &str) -> FSError {
        FSError::NotFound {
            location: util::object::location(SCHEME, bucket, key),
        }
    }
}

impl adapters::Object for MockClient {
    fn fs_name(&self) -> &'static str {
        "memory"
    }

    fn fs_scheme(&self) -> &'static str {
        SCHEME
    }

    fn fs_bucket_exists(&self, bucket: &str) -> Result<bool, FSError> {
        let buckets = self.buckets.lock().map_err(|err| FSError::Backend {
            operation: "acquire_guard",
            location: SCHEME.to_string(),
            message: err.to_string(),
        })?;
        Ok(buckets.contains(bucket))
    }

    fn fs_put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        if_not_exists: bool,
    ) -> Result<(), FSError> {
        commit(&self.objects, bucket, key, body, if_not_exists)
    }

    fn fs_open_object(&self, bucket: &str, key: &str) -> Result<Box<dyn FileReader>, FSError> {
        let objects = self.lock_objects()?;
        match objects.get(&(bucket.to_string(), key.to_string())) {
            Some(obj) => Ok(Box::new(Cursor::new(obj.body.clone()))),
            None => Err(Self::not_found(bucket, key)),
        }
    }

    fn fs_head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<model::fs::FSObject>, FSError> {
        let objects = self.lock_objects()?;
        Ok(objects
            .get(&(bucket.to_string(), key.to_string()))
            .map(|obj| model::fs::FSObject {
                key: key.to_string(),
                size: obj.body.len() as u64,
                modified_time: obj.modified_time,
            }))
    }

    fn fs_delete_object(&self, bucket: &str, key: &str) -> Result<(), FSError> {
        let failing = self
            .failing_deletes
            .lock()
            .map(|failing| failing.contains(key))
            .unwrap_or(false);
        if failing {
            return Err(FSError::Backend {
                operation: "delete_object",
                location: util::object::location(SCHEME, bucket, key),
                message: "injected failure".to_string(),
            });
        }

        let mut objects = self.lock_objects()?;
        match objects.remove(&(bucket.to_string(), key.to_string())) {
            Some(_) => Ok(()),
            None if self.lenient_deletes.load(Ordering::SeqCst) => Ok(()),
            None => Err(Self::not_found(bucket, key)),
        }
    }

    fn fs_list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> Result<Vec<model::fs::FSListEntry>, FSError> {
        let objects = self.lock_objects()?;
        let mut entries = Vec::new();
        let mut seen_prefixes = BTreeSet::new();

        for ((b, key), obj) in objects.iter() {
            if b != bucket || !key.starts_with(prefix) {
                continue;
            }

            let rest = &key[prefix.len()..];
            if let Some(delim) = delimiter.filter(|d| !d.is_empty()) {
                if let Some(pos) = rest.find(delim) {
                    let common = format!("{}{}", prefix, &rest[..pos + delim.len()]);
                    if seen_prefixes.insert(common.clone()) {
                        entries.push(model::fs::FSListEntry::Prefix(common));
                    }
                    continue;
                }
            }

            entries.push(model::fs::FSListEntry::Object(model::fs::FSObject {
                key: key.clone(),
                size: obj.body.len() as u64,
                modified_time: obj.modified_time,
            }));
        }

        Ok(entries)
    }

    fn fs_begin_upload(
        &self,
        bucket: &str,
        key: &str,
        if_not_exists: bool,
    ) -> Result<Box<dyn adapters::Upload>, FSError> {
        self.uploads_started.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockUpload {
            store: self.objects.clone(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            if_not_exists,
            parts: Vec::new(),
            aborted: self.uploads_aborted.clone(),
        }))
    }

    fn fs_copy_object(&self, bucket: &str, src: &str, dst: &str) -> Result<(), FSError> {
        self.copy_calls.fetch_add(1, Ordering::SeqCst);

        let pending = self.copy_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.copy_failures.store(pending - 1, Ordering::SeqCst);
            return Err(FSError::Backend {
                operation: "copy_object",
                location: util::object::location(SCHEME, bucket, dst),
                message: "injected transient failure".to_string(),
            });
        }

        let mut objects = self.lock_objects()?;
        let source = match objects.get(&(bucket.to_string(), src.to_string())) {
            Some(obj) => obj.body.clone(),
            None => return Err(Self::not_found(bucket, src)),
        };

        objects.insert(
            (bucket.to_string(), dst.to_string()),
            StoredObject {
                body: source,
                modified_time: SystemTime::now(),
            },
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::adapters::Object;

    use super::*;

    fn seeded() -> MockClient {
        let client = MockClient::with_bucket("bucket");
        for key in ["a/1", "a/2", "a/sub/3", "a/sub/deeper/4", "b/1", "top"] {
            client.insert("bucket", key, key.as_bytes().to_vec());
        }
        client
    }

    #[test]
    fn test_list_with_delimiter() {
        let client = seeded();

        let cases = vec![
            (
                "a/",
                vec![
                    model::fs::FSListEntry::Object(model::fs::FSObject {
                        key: "a/1".to_string(),
                        size: 3,
                        modified_time: SystemTime::UNIX_EPOCH,
                    }),
                    model::fs::FSListEntry::Object(model::fs::FSObject {
                        key: "a/2".to_string(),
                        size: 3,
                        modified_time: SystemTime::UNIX_EPOCH,
                    }),
                    model::fs::FSListEntry::Prefix("a/sub/".to_string()),
                ],
            ),
            ("", vec![
                model::fs::FSListEntry::Prefix("a/".to_string()),
                model::fs::FSListEntry::Prefix("b/".to_string()),
                model::fs::FSListEntry::Object(model::fs::FSObject {
                    key: "top".to_string(),
                    size: 3,
                    modified_time: SystemTime::UNIX_EPOCH,
                }),
            ]),
        ];

        for (prefix, expected) in cases {
            let result: Vec<_> = client
                .fs_list_objects("bucket", prefix, Some("/"))
                .unwrap()
                .into_iter()
                .map(|entry| match entry {
                    model::fs::FSListEntry::Object(obj) => {
                        model::fs::FSListEntry::Object(model::fs::FSObject {
                            modified_time: SystemTime::UNIX_EPOCH,
                            ..obj
                        })
                    }
                    other => other,
                })
                .collect();
            assert_eq!(result, expected, "failed for case: {}", prefix);
        }
    }

    #[test]
    fn test_list_without_delimiter() {
        let client = seeded();

        let keys: Vec<String> = client
            .fs_list_objects("bucket", "a/", None)
            .unwrap()
            .into_iter()
            .filter_map(|entry| match entry {
                model::fs::FSListEntry::Object(obj) => Some(obj.key),
                model::fs::FSListEntry::Prefix(_) => None,
            })
            .collect();

        assert_eq!(keys, vec!["a/1", "a/2", "a/sub/3", "a/sub/deeper/4"]);
    }

    #[test]
    fn test_missing_keys() {
        let client = seeded();

        assert!(client.fs_open_object("bucket", "nope").err().unwrap().is_not_found());
        assert!(client.fs_delete_object("bucket", "nope").unwrap_err().is_not_found());
        assert!(client.fs_copy_object("bucket", "nope", "x").unwrap_err().is_not_found());
        assert!(client.fs_head_object("bucket", "nope").unwrap().is_none());
        assert!(client.fs_head_object("other", "top").unwrap().is_none());
    }

    #[test]
    fn test_copy_failure_injection() {
        let client = seeded();
        client.fail_next_copies(2);

        assert!(client.fs_copy_object("bucket", "top", "copy").is_err());
        assert!(client.fs_copy_object("bucket", "top", "copy").is_err());
        assert!(client.fs_copy_object("bucket", "top", "copy").is_ok());

        assert_eq!(client.copy_calls(), 3);
        assert_eq!(client.get("bucket", "copy"), Some(b"top".to_vec()));
    }

    #[test]
    fn test_bucket_exists() {
        let client = seeded();

        assert!(client.fs_bucket_exists("bucket").unwrap());
        assert!(!client.fs_bucket_exists("missing").unwrap());
    }
}
