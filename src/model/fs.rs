use std::{
    fs::File,
    io::{Read, Write},
    time::SystemTime,
};

use crate::util::context::ContextError;

/// Mode reported for every object, since the store has no permission bits.
pub const FILE_MODE: u32 = 0o666;
/// Mode reported for prefixes inferred as directories.
pub const DIR_MODE: u32 = 0o777;

#[derive(Debug, thiserror::Error)]
pub enum FSError {
    #[error("not found: {location}")]
    NotFound { location: String },

    #[error("already exists: {location}")]
    AlreadyExists { location: String },

    #[error("{operation} not implemented")]
    NotImplemented { operation: &'static str },

    #[error("{operation} not implemented (fatal)")]
    Fatal { operation: &'static str },

    #[error("failed to copy {location} after {transferred} bytes: {message}")]
    Transfer {
        location: String,
        transferred: u64,
        message: String,
    },

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("invalid path: {path:?}")]
    InvalidPath { path: String },

    #[error("failed to parse bucket uri: {uri}")]
    InvalidUri { uri: String },

    #[error("failed to {operation} at: {location}, {message}")]
    Backend {
        operation: &'static str,
        location: String,
        message: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl FSError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, FSError::Fatal { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FSError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, FSError::AlreadyExists { .. })
    }
}

/// An object as reported by a listing or attribute fetch.
#[derive(Clone, Debug, PartialEq)]
pub struct FSObject {
    pub key: String,
    pub size: u64,
    pub modified_time: SystemTime,
}

/// One row of a prefix listing. `Prefix` only appears when a delimiter was given.
#[derive(Clone, Debug, PartialEq)]
pub enum FSListEntry {
    Object(FSObject),
    Prefix(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FileInfo {
    /// Last path component.
    pub name: String,
    /// Full object key, or the prefix for inferred directories.
    pub key: String,
    pub size: u64,
    pub mode: u32,
    pub modified_time: SystemTime,
    pub is_dir: bool,
}

impl FileInfo {
    pub fn from_object(object: &FSObject) -> Self {
        Self {
            name: base_name(&object.key).to_string(),
            key: object.key.clone(),
            size: object.size,
            mode: FILE_MODE,
            modified_time: object.modified_time,
            is_dir: false,
        }
    }

    pub fn from_prefix(prefix: &str) -> Self {
        Self {
            name: base_name(prefix).to_string(),
            key: prefix.to_string(),
            size: 0,
            mode: DIR_MODE,
            modified_time: SystemTime::UNIX_EPOCH,
            is_dir: true,
        }
    }
}

/// Entry returned by `read_dir`.
#[derive(Clone, Debug, PartialEq)]
pub enum DirEntry {
    File(FileInfo),
    Dir(FileInfo),
}

impl DirEntry {
    pub fn info(&self) -> &FileInfo {
        match self {
            DirEntry::File(info) | DirEntry::Dir(info) => info,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, DirEntry::Dir(_))
    }
}

/// Aggregate size information; only `length` is ever populated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContentSummary {
    pub length: u64,
    pub file_count: u64,
    pub directory_count: u64,
    pub quota: u64,
    pub space_consumed: u64,
    pub space_quota: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FsInfo {
    pub name: String,
}

/// Read side of an open object. Released on drop.
pub trait FileReader: Read + Send {}

impl<T: Read + Send> FileReader for T {}

/// Write side of an open object or local file.
///
/// Nothing written is guaranteed durable until `close` returns `Ok`.
/// Dropping a writer without closing it abandons the write.
pub trait FileWriter: Write + Send {
    fn close(&mut self) -> Result<(), FSError>;
}

impl FileWriter for File {
    fn close(&mut self) -> Result<(), FSError> {
        self.flush()?;
        self.sync_all()?;
        Ok(())
    }
}

impl FileWriter for Vec<u8> {
    fn close(&mut self) -> Result<(), FSError> {
        Ok(())
    }
}

pub fn base_name(key: &str) -> &str {
    let key = key.strip_suffix('/').unwrap_or(key);
    match key.rfind('/') {
        Some(pos) => &key[pos + 1..],
        None => key,
    }
}
