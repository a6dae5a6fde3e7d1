//! Appending externally supplied content to an open tar stream as a new entry.
//!
//! A tar header carries the size of its entry, and the header comes before the data.  Content
//! that can't report its length up front is therefore first drained into a spill area (memory up
//! to a limit, then an unnamed temporary file) to measure it, and only then is the header
//! written.  Content that knows its length is streamed directly.

use std::{
    fs::File,
    io::{self, Cursor, Read, Seek, SeekFrom, Write},
    os::unix::fs::PermissionsExt,
    time::{SystemTime, UNIX_EPOCH},
};

use log::trace;
use tar::{EntryType, Header};
use tempfile::SpooledTempFile;

use crate::{
    error::{ArchiveError, Result},
    writer::{set_raw_name, ArchiveWriter},
};

/// Permission bits used when the content source has no mode of its own.
pub const DEFAULT_ENTRY_MODE: u32 = 0o644;

/// How much content is spilled to memory before moving to a temporary file.
pub const DEFAULT_SPILL_LIMIT: usize = 1024 * 1024;

/// What a content source knows about itself before it is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceInfo {
    /// The exact number of bytes the source will yield, if known.
    pub len: Option<u64>,
    /// Permission bits from the backing metadata, if any.
    pub mode: Option<u32>,
}

/// A readable source of entry content.
///
/// Sources that can tell their remaining length skip the spill area.  Wrap a reader of unknown
/// length in [`Stream`].
pub trait EntrySource: Read {
    fn info(&mut self) -> io::Result<SourceInfo> {
        Ok(SourceInfo::default())
    }
}

/// A source of unknown length.  Its content is always spilled before it is written.
#[derive(Debug)]
pub struct Stream<R>(pub R);

impl<R: Read> Read for Stream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read> EntrySource for Stream<R> {}

impl EntrySource for &[u8] {
    fn info(&mut self) -> io::Result<SourceInfo> {
        Ok(SourceInfo {
            len: Some(self.len() as u64),
            mode: None,
        })
    }
}

impl<T: AsRef<[u8]>> EntrySource for Cursor<T> {
    fn info(&mut self) -> io::Result<SourceInfo> {
        let total = self.get_ref().as_ref().len() as u64;
        Ok(SourceInfo {
            len: Some(total.saturating_sub(self.position())),
            mode: None,
        })
    }
}

impl EntrySource for File {
    /// Regular files report the bytes left from the current position.  Anything else (pipes,
    /// character devices, ...) only reports its mode.
    fn info(&mut self) -> io::Result<SourceInfo> {
        let metadata = self.metadata()?;
        let len = if metadata.is_file() {
            Some(metadata.len().saturating_sub(self.stream_position()?))
        } else {
            None
        };
        Ok(SourceInfo {
            len,
            mode: Some(metadata.permissions().mode() & 0o7777),
        })
    }
}

impl<S: EntrySource + ?Sized> EntrySource for &mut S {
    fn info(&mut self) -> io::Result<SourceInfo> {
        (**self).info()
    }
}

impl<S: EntrySource + ?Sized> EntrySource for Box<S> {
    fn info(&mut self) -> io::Result<SourceInfo> {
        (**self).info()
    }
}

/// Appends content to tar archives, with configurable spill and mode behaviour.
#[derive(Debug, Clone)]
pub struct Appender {
    spill_limit: usize,
    default_mode: u32,
}

impl Default for Appender {
    fn default() -> Self {
        Self {
            spill_limit: DEFAULT_SPILL_LIMIT,
            default_mode: DEFAULT_ENTRY_MODE,
        }
    }
}

impl Appender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content of unknown length up to this many bytes is spilled to memory; beyond that it goes
    /// to an unnamed temporary file which is removed when the call returns.
    pub fn spill_limit(mut self, limit: usize) -> Self {
        self.spill_limit = limit;
        self
    }

    /// Permission bits for entries whose source has no mode of its own.
    pub fn default_mode(mut self, mode: u32) -> Self {
        self.default_mode = mode;
        self
    }

    /// Appends `body` to `output` as a regular file called `name`.
    ///
    /// The preconditions are checked in order before any I/O: `name` must be non-empty
    /// ([`ArchiveError::EmptyName`]), `body` must be present ([`ArchiveError::NilBody`]) and
    /// `output` must be present ([`ArchiveError::NilOutput`]).
    ///
    /// The modification time is the current time.  `output` is not finalized.
    ///
    /// Failures while measuring the content leave `output` untouched.  Failures after the
    /// header was written poison `output`.
    pub fn append<S: EntrySource, W: Write>(
        &self,
        name: &str,
        body: Option<S>,
        output: Option<&mut ArchiveWriter<W>>,
    ) -> Result<()> {
        if name.is_empty() {
            return Err(ArchiveError::EmptyName);
        }
        let Some(mut body) = body else {
            return Err(ArchiveError::NilBody);
        };
        let Some(output) = output else {
            return Err(ArchiveError::NilOutput);
        };

        let info = body.info().map_err(|err| {
            ArchiveError::io(format!("unable to inspect content of {name:?}"), err)
        })?;
        let mode = info.mode.unwrap_or(self.default_mode);

        match info.len {
            Some(len) => {
                trace!("appending {name:?} ({len} bytes, streamed)");
                write_entry(output, name, len, mode, body)
            }
            None => {
                let mut spill = SpooledTempFile::new(self.spill_limit);
                let len = io::copy(&mut body, &mut spill).map_err(|err| {
                    ArchiveError::io(
                        format!("unable to write content of {name:?} to spill area"),
                        err,
                    )
                })?;
                spill.seek(SeekFrom::Start(0)).map_err(|err| {
                    ArchiveError::io(format!("unable to rewind spill area for {name:?}"), err)
                })?;
                trace!(
                    "appending {name:?} ({len} bytes, spilled to {})",
                    if spill.is_rolled() { "disk" } else { "memory" }
                );
                write_entry(output, name, len, mode, spill)
            }
        }
    }
}

fn write_entry<W: Write>(
    output: &mut ArchiveWriter<W>,
    name: &str,
    len: u64,
    mode: u32,
    body: impl Read,
) -> Result<()> {
    let mtime = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);

    let mut header = Header::new_gnu();
    set_raw_name(&mut header, name.as_bytes());
    header.set_mode(mode);
    header.set_uid(0);
    header.set_gid(0);
    header.set_mtime(mtime);
    header.set_size(len);
    header.set_entry_type(EntryType::Regular);
    header.set_cksum();

    output
        .append_raw(&header, name.as_bytes(), None, &[], len, body)
        .map_err(|err| ArchiveError::io(format!("unable to write {name:?} to tar archive"), err))
}

/// Appends `body` to `output` as a regular file called `name`, with the default [`Appender`]
/// settings.
pub fn append_entry<S: EntrySource, W: Write>(
    name: &str,
    body: Option<S>,
    output: Option<&mut ArchiveWriter<W>>,
) -> Result<()> {
    Appender::new().append(name, body, output)
}
