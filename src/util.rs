use std::io::{Error, ErrorKind, Read, Result};

/// A reader that yields exactly `len` bytes from the inner reader and then reports EOF.
///
/// This is the body-side counterpart to a tar header: the header declares a size, and the body
/// must provide exactly that many bytes.  Reading stops at `len` even if the inner reader has
/// more to give, and if the inner reader hits EOF early the read fails with
/// ErrorKind::UnexpectedEof rather than silently producing a short entry.
///
/// Interrupted reads are retried.
pub(crate) struct ExactReader<R> {
    inner: R,
    remaining: u64,
}

impl<R: Read> ExactReader<R> {
    pub(crate) fn new(inner: R, len: u64) -> Self {
        Self {
            inner,
            remaining: len,
        }
    }
}

impl<R: Read> Read for ExactReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let max = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        loop {
            match self.inner.read(&mut buf[..max]) {
                Ok(0) => {
                    return Err(Error::new(
                        ErrorKind::UnexpectedEof,
                        format!("body ended {} bytes early", self.remaining),
                    ))
                }
                Ok(n) => {
                    self.remaining -= n as u64;
                    return Ok(n);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

/// Formats a raw tar name for messages.  Names are bytes on the wire and need not be UTF-8.
pub(crate) fn display_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}
