use std::io::{self, Read, Write};

use crate::util::context::{Context, ContextError};

/// `Read` decorator that checks a `Context` before every read.
///
/// Once the context has fired no further reads reach the inner reader.
pub struct InterruptibleReader<R> {
    ctx: Context,
    inner: R,
}

impl<R: Read> InterruptibleReader<R> {
    pub fn new(ctx: &Context, inner: R) -> Self {
        Self {
            ctx: ctx.clone(),
            inner,
        }
    }
}

impl<R: Read> Read for InterruptibleReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // io::Error::other keeps the kind away from Interrupted, which copy loops retry.
        self.ctx.err().map_err(io::Error::other)?;
        self.inner.read(buf)
    }
}

/// Recovers the `ContextError` an `InterruptibleReader` raised, if any.
pub fn context_error(err: &io::Error) -> Option<ContextError> {
    err.get_ref()
        .and_then(|inner| inner.downcast_ref::<ContextError>())
        .copied()
}

/// Copies until EOF and reports how far it got even when it fails.
pub fn copy<R, W>(reader: &mut R, writer: &mut W) -> (u64, io::Result<()>)
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buf = vec![0u8; 64 * 1024];
    let mut transferred = 0u64;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return (transferred, Ok(())),
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return (transferred, Err(err)),
        };

        if let Err(err) = writer.write_all(&buf[..n]) {
            return (transferred, Err(err));
        }
        transferred += n as u64;
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    struct CountingReader {
        reads: usize,
    }

    impl Read for CountingReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.reads += 1;
            buf[0] = 7;
            Ok(1)
        }
    }

    #[test]
    fn test_passes_through_when_live() {
        let ctx = Context::background();
        let mut reader = InterruptibleReader::new(&ctx, Cursor::new(b"hello".to_vec()));

        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();

        assert_eq!(out, b"hello");
    }

    #[test]
    fn test_cancelled_context_skips_inner_read() {
        let ctx = Context::background();
        ctx.cancel();

        let mut reader = InterruptibleReader::new(&ctx, CountingReader { reads: 0 });
        let mut buf = [0u8; 4];
        let err = reader.read(&mut buf).unwrap_err();

        assert_eq!(context_error(&err), Some(ContextError::Cancelled));
        assert_ne!(err.kind(), io::ErrorKind::Interrupted);
        assert_eq!(reader.inner.reads, 0);
    }

    #[test]
    fn test_copy_counts_bytes() {
        let data = vec![1u8; 200 * 1024];
        let mut out = Vec::new();

        let (n, res) = copy(&mut Cursor::new(data.clone()), &mut out);

        assert!(res.is_ok());
        assert_eq!(n, data.len() as u64);
        assert_eq!(out, data);
    }

    #[test]
    fn test_copy_reports_progress_on_failure() {
        let ctx = Context::background();
        let data = vec![1u8; 100];
        let mut reader = InterruptibleReader::new(&ctx, Cursor::new(data));
        ctx.cancel();

        let (n, res) = copy(&mut reader, &mut Vec::new());

        assert_eq!(n, 0);
        assert_eq!(
            context_error(&res.unwrap_err()),
            Some(ContextError::Cancelled)
        );
    }

    #[test]
    fn test_context_error_ignores_plain_errors() {
        let err = io::Error::other("boom");
        assert_eq!(context_error(&err), None);
    }
}
