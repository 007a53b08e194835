use std::sync::Arc;

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::{
    adapters::{self, ObjectWriter},
    config::{Behaviour, Config},
    model::fs::FSError,
    util::{self, context::Context},
};

/// Filesystem view over a single bucket.
///
/// Holds no mutable state of its own, so one instance can serve any number
/// of threads. The client is shared; each call opens its own `Session`.
pub struct ObjectFS {
    pub client: Arc<dyn adapters::Object>,
    pub bucket: String,
    pub config: Config,
}

/// Per-call binding of the shared client to this filesystem's bucket.
pub struct Session<'a> {
    pub tx_id: Uuid,
    pub client: &'a Arc<dyn adapters::Object>,
    pub bucket: &'a str,
}

impl Session<'_> {
    pub fn location(&self, key: &str) -> String {
        util::object::location(self.client.fs_scheme(), self.bucket, key)
    }

    pub fn writer(&self, key: &str, if_not_exists: bool) -> ObjectWriter {
        ObjectWriter::new(self.client.clone(), self.bucket, key, if_not_exists)
    }
}

impl ObjectFS {
    pub fn new(client: Arc<dyn adapters::Object>, bucket: &str, config: Config) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            config,
        }
    }

    /// Opens the session for one call, failing if `ctx` has already fired.
    pub fn session(&self, ctx: &Context) -> Result<Session<'_>, FSError> {
        ctx.err()?;

        let session = Session {
            tx_id: Uuid::new_v4(),
            client: &self.client,
            bucket: &self.bucket,
        };
        debug!(tx_id = %session.tx_id, bucket = %self.bucket, "session opened");

        Ok(session)
    }

    /// Applies the configured `Behaviour` to an operation the store cannot express.
    pub fn throw_unimplemented(&self, operation: &'static str) -> Result<(), FSError> {
        match self.config.behaviour {
            Behaviour::FailFast => {
                error!(operation = operation, error_group = "not_implemented", "fatal");
                Err(FSError::Fatal { operation })
            }
            Behaviour::Report => {
                warn!(operation = operation, "{} not implemented", operation);
                Err(FSError::NotImplemented { operation })
            }
            Behaviour::Ignore => Ok(()),
        }
    }

    /// Copies `src` to `dst` under the retry policy. A missing source is not retried.
    pub fn copy_with_retry(
        &self,
        ctx: &Context,
        session: &Session<'_>,
        src: &str,
        dst: &str,
    ) -> Result<(), FSError> {
        util::retry::retry(
            ctx,
            &self.config.retry,
            |err| !err.is_not_found(),
            |attempt| {
                debug!(tx_id = %session.tx_id, src = src, dst = dst, attempt = attempt + 1, "copy_object");
                session.client.fs_copy_object(session.bucket, src, dst)
            },
        )
    }
}

/// Harness hook for `Behaviour::FailFast`: panics on a fatal error and passes
/// everything else through.
pub fn abort_on_fatal<T>(res: Result<T, FSError>) -> Result<T, FSError> {
    match res {
        Err(err) if err.is_fatal() => panic!("{}", err),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{adapters::mock::MockClient, config::RetryPolicy};

    fn new_fs(behaviour: Behaviour) -> ObjectFS {
        ObjectFS::new(
            Arc::new(MockClient::new()),
            "dummy-bucket",
            Config {
                behaviour,
                retry: RetryPolicy {
                    attempts: 5,
                    initial_delay: Duration::from_millis(1),
                    multiplier: 2,
                    max_delay: Duration::from_millis(4),
                },
                delete_source_on_rename: true,
            },
        )
    }

    #[test]
    fn test_sessions_are_distinct() {
        let fs = new_fs(Behaviour::Report);
        let ctx = Context::background();

        let first = fs.session(&ctx).unwrap();
        let second = fs.session(&ctx).unwrap();

        assert_ne!(first.tx_id, second.tx_id);
        assert_eq!(first.bucket, "dummy-bucket");
        assert_eq!(first.location("k"), "mem://dummy-bucket/k");
    }

    #[test]
    fn test_session_refused_after_cancel() {
        let fs = new_fs(Behaviour::Report);
        let ctx = Context::background();
        ctx.cancel();

        assert!(matches!(fs.session(&ctx), Err(FSError::Context(_))));
    }

    #[test]
    fn test_throw_unimplemented() {
        let cases = vec![
            (Behaviour::Ignore, None),
            (Behaviour::Report, Some(false)),
            (Behaviour::FailFast, Some(true)),
        ];

        for (behaviour, expected) in cases {
            let fs = new_fs(behaviour);
            let result = fs.throw_unimplemented("chmod").err().map(|err| err.is_fatal());
            assert_eq!(result, expected, "failed for case: {:?}", behaviour);
        }
    }

    #[test]
    fn test_abort_on_fatal_passes_through() {
        let ok: Result<u8, FSError> = Ok(1);
        assert_eq!(abort_on_fatal(ok).unwrap(), 1);

        let reported: Result<(), FSError> = Err(FSError::NotImplemented { operation: "chmod" });
        assert!(abort_on_fatal(reported).is_err());
    }

    #[test]
    #[should_panic(expected = "chmod not implemented")]
    fn test_abort_on_fatal_panics() {
        let fs = new_fs(Behaviour::FailFast);
        let _ = abort_on_fatal(fs.throw_unimplemented("chmod"));
    }
}
