use std::{
    thread,
    time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;

const SLEEP_SLICE: Duration = Duration::from_millis(10);

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("context cancelled")]
    Cancelled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation and deadline signal passed as the first argument of every
/// filesystem operation.
///
/// Cloning shares the signal. `with_cancel`, `with_timeout` and
/// `with_deadline` derive a child that fires when its parent does, but
/// cancelling a child leaves the parent untouched.
#[derive(Clone, Debug)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl Context {
    /// A context that never fires on its own.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    pub fn with_cancel(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };

        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Reports why the context has fired, if it has.
    pub fn err(&self) -> Result<(), ContextError> {
        if self.token.is_cancelled() {
            return Err(ContextError::Cancelled);
        }

        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ContextError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Blocks for `duration`, waking early with an error if the context fires.
    pub fn sleep(&self, duration: Duration) -> Result<(), ContextError> {
        let until = Instant::now() + duration;

        loop {
            self.err()?;

            let now = Instant::now();
            if now >= until {
                return Ok(());
            }

            thread::sleep(SLEEP_SLICE.min(until - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_never_fires() {
        let ctx = Context::background();
        assert_eq!(ctx.err(), Ok(()));
        assert_eq!(ctx.deadline, None);
    }

    #[test]
    fn test_cancel_propagates_to_children() {
        let parent = Context::background();
        let child = parent.with_cancel();
        let sibling = parent.with_timeout(Duration::from_secs(60));

        child.cancel();
        assert_eq!(child.err(), Err(ContextError::Cancelled));
        assert_eq!(parent.err(), Ok(()), "child cancel must not reach parent");

        parent.cancel();
        assert_eq!(sibling.err(), Err(ContextError::Cancelled));
    }

    #[test]
    fn test_deadline() {
        let ctx = Context::background().with_deadline(Instant::now());
        assert_eq!(ctx.err(), Err(ContextError::DeadlineExceeded));

        let ctx = Context::background().with_timeout(Duration::from_secs(60));
        assert_eq!(ctx.err(), Ok(()));
    }

    #[test]
    fn test_child_deadline_never_extends_parent() {
        let parent = Context::background().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::from_secs(3600));

        assert_eq!(child.deadline, parent.deadline);
    }

    #[test]
    fn test_sleep_wakes_on_cancel() {
        let ctx = Context::background();
        let remote = ctx.clone();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });

        let started = Instant::now();
        let res = ctx.sleep(Duration::from_secs(30));
        handle.join().unwrap();

        assert_eq!(res, Err(ContextError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_sleep_completes() {
        let ctx = Context::background();
        assert_eq!(ctx.sleep(Duration::from_millis(20)), Ok(()));
    }
}
