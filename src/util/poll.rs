use std::{
    cmp,
    fmt::Display,
    future::Future,
    io::{self, Read},
    task::{Context, Poll},
    thread,
    time::Duration,
};

use bytes::{Buf, Bytes};
use futures::{stream::BoxStream, task::noop_waker_ref, StreamExt};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub fn poll_until_ready_error<Fut, T, E>(future: Fut) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
{
    poll_until_ready(future)
}

pub fn poll_until_ready<Fut, T>(future: Fut) -> T
where
    Fut: Future<Output = T>,
{
    let mut future = Box::pin(future);
    let mut context = Context::from_waker(noop_waker_ref());

    loop {
        match future.as_mut().poll(&mut context) {
            Poll::Ready(result) => {
                return result;
            }
            Poll::Pending => {
                thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

/// Blocking `Read` over an async stream of byte chunks, as returned by the
/// object store SDKs for downloads.
pub struct StreamReader<E> {
    stream: BoxStream<'static, Result<Bytes, E>>,
    chunk: Bytes,
    location: String,
    done: bool,
}

impl<E> StreamReader<E> {
    pub fn new(stream: BoxStream<'static, Result<Bytes, E>>, location: String) -> Self {
        Self {
            stream,
            chunk: Bytes::new(),
            location,
            done: false,
        }
    }
}

impl<E: Display> Read for StreamReader<E> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.chunk.is_empty() {
            if self.done {
                return Ok(0);
            }

            match poll_until_ready(self.stream.next()) {
                None => self.done = true,
                Some(Ok(chunk)) => self.chunk = chunk,
                Some(Err(err)) => {
                    return Err(io::Error::other(format!(
                        "failed to read {}: {}",
                        self.location, err
                    )))
                }
            }
        }

        let n = cmp::min(buf.len(), self.chunk.len());
        buf[..n].copy_from_slice(&self.chunk[..n]);
        self.chunk.advance(n);

        Ok(n)
    }
}
