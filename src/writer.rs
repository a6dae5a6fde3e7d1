//! The output side of a tar rewrite.
//!
//! [`ArchiveWriter`] is a thin layer over [`tar::Builder`] that adds two guarantees the builder
//! alone doesn't give:
//!
//!  - finalization (writing the two zero blocks that end an archive) happens exactly once, in
//!    [`ArchiveWriter::finish`], which consumes the writer
//!  - once an operation has failed after it started writing, the writer is poisoned: further
//!    writes fail and no end-of-archive marker is ever written, not even from `Drop`, so a
//!    half-written archive can't be mistaken for a complete one

use std::io::{self, Error, ErrorKind, Read, Write};

use tar::{Builder, EntryType, Header};

use crate::{
    error::{ArchiveError, Result},
    util::ExactReader,
};

/// Wraps the caller's sink.  After `poison()` every write fails.
struct FusedWriter<W> {
    inner: W,
    poisoned: bool,
}

impl<W: Write> Write for FusedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.poisoned {
            return Err(Error::new(
                ErrorKind::BrokenPipe,
                "archive writer is unusable after an earlier failure",
            ));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.poisoned {
            return Ok(());
        }
        self.inner.flush()
    }
}

/// An open tar stream that entries can be appended to.
pub struct ArchiveWriter<W: Write> {
    builder: Builder<FusedWriter<W>>,
}

impl<W: Write> ArchiveWriter<W> {
    /// Starts a new archive on `output`.  Nothing is written until the first entry.
    pub fn new(output: W) -> Self {
        Self {
            builder: Builder::new(FusedWriter {
                inner: output,
                poisoned: false,
            }),
        }
    }

    pub fn is_poisoned(&self) -> bool {
        self.builder.get_ref().poisoned
    }

    pub(crate) fn poison(&mut self) {
        if !self.is_poisoned() {
            log::debug!("archive writer poisoned, the output will not be finalized");
        }
        self.builder.get_mut().poisoned = true;
    }

    /// Writes the end-of-archive marker, flushes, and returns the underlying sink.
    ///
    /// Fails without writing anything if the writer was poisoned.
    pub fn finish(self) -> Result<W> {
        if self.is_poisoned() {
            return Err(ArchiveError::io(
                "unable to finalize archive",
                Error::new(
                    ErrorKind::BrokenPipe,
                    "an earlier failure left the archive incomplete",
                ),
            ));
        }

        let mut fused = self
            .builder
            .into_inner()
            .map_err(|err| ArchiveError::io("unable to finalize archive", err))?;
        fused
            .inner
            .flush()
            .map_err(|err| ArchiveError::io("unable to flush archive", err))?;
        Ok(fused.inner)
    }

    /// Writes a GNU long name ('L') or long link ('K') record carrying `bytes`.  It applies to
    /// the header that is written next.
    fn append_long_record(&mut self, kind: EntryType, bytes: &[u8]) -> io::Result<()> {
        const LONG_LINK_NAME: &[u8] = b"././@LongLink";

        let mut header = Header::new_gnu();
        if let Some(gnu) = header.as_gnu_mut() {
            gnu.name[..LONG_LINK_NAME.len()].copy_from_slice(LONG_LINK_NAME);
        }
        header.set_mode(0o644);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(0);
        // the trailing NUL is counted, like GNU tar does
        header.set_size(bytes.len() as u64 + 1);
        header.set_entry_type(kind);
        header.set_cksum();

        self.builder
            .append(&header, bytes.chain(io::repeat(0).take(1)))
    }

    /// Appends one entry: any extension records, then `header`, then exactly `size` bytes of
    /// `body`, padded to the block size.
    ///
    /// `size` is the resolved body size, which differs from the size field of `header` when a
    /// PAX `size` record overrides it.
    ///
    /// `name`/`link_name` are the resolved names.  If they don't fit into `header` (which must
    /// already carry their truncated form), GNU long records are emitted ahead of it.  `pax`
    /// records are written as a PAX extended header.
    ///
    /// Any failure poisons the writer: by then part of the entry may already be in the output.
    pub(crate) fn append_raw(
        &mut self,
        header: &Header,
        name: &[u8],
        link_name: Option<&[u8]>,
        pax: &[(String, Vec<u8>)],
        size: u64,
        body: impl Read,
    ) -> io::Result<()> {
        let result = self.append_raw_inner(header, name, link_name, pax, size, body);
        if result.is_err() {
            self.poison();
        }
        result
    }

    fn append_raw_inner(
        &mut self,
        header: &Header,
        name: &[u8],
        link_name: Option<&[u8]>,
        pax: &[(String, Vec<u8>)],
        size: u64,
        body: impl Read,
    ) -> io::Result<()> {
        if !pax.is_empty() {
            self.builder.append_pax_extensions(
                pax.iter()
                    .map(|(key, value)| (key.as_str(), value.as_slice())),
            )?;
        }

        let has_pax = |key: &str| pax.iter().any(|(k, _)| k == key);

        if !has_pax("path") && header.path_bytes().as_ref() != name {
            self.append_long_record(EntryType::GNULongName, name)?;
        }
        if let Some(link_name) = link_name {
            let short = header.link_name_bytes();
            if !has_pax("linkpath") && short.as_deref() != Some(link_name) {
                self.append_long_record(EntryType::GNULongLink, link_name)?;
            }
        }

        self.builder.append(header, ExactReader::new(body, size))
    }
}

/// Copies the first (up to) 100 bytes of `name` into the name field of `header`.
///
/// Unlike `Header::set_path()` this doesn't normalize or reject anything: the entry name is
/// whatever bytes the caller asked for.  Longer names are carried by a GNU long name record, see
/// [`ArchiveWriter::append_raw`].
pub(crate) fn set_raw_name(header: &mut Header, name: &[u8]) {
    let field = &mut header.as_old_mut().name;
    let len = name.len().min(field.len());
    field.fill(0);
    field[..len].copy_from_slice(&name[..len]);
}
