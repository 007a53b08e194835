//! Hierarchical filesystem view over a flat object store bucket.
//!
//! [`ObjectFS`] implements the [`Dfs`] contract on top of any
//! [`adapters::Object`] backend (Google Cloud Storage, S3, or the in-memory
//! mock). Directories are inferred from key prefixes, rename is a copy
//! followed by a delete, and writes replace whole objects. Operations the
//! store has no equivalent for follow the configured [`Behaviour`].

pub mod adapters;
pub mod api;
pub mod config;
pub mod dfs;
pub mod fs;
pub mod ioutil;
pub mod model;
pub mod util;

pub use api::{Dfs, DfsUtil};
pub use config::{Behaviour, Config, RetryPolicy};
pub use fs::{abort_on_fatal, ObjectFS};
pub use model::fs::{DirEntry, FSError, FileInfo, FileReader, FileWriter};
pub use util::context::{Context, ContextError};
