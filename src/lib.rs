//! Streaming rewrites of tar archives.
//!
//! This crate provides two operations that work one entry at a time, so memory use is bounded
//! by the needs of a single entry rather than the size of the archive:
//!
//!  - [`filter_archive`] / [`filter_into`] copy a tar stream, dropping every entry whose name
//!    matches one of a set of shell-style glob patterns ([`ExclusionSet`])
//!  - [`append_entry`] / [`Appender`] add content from any [`EntrySource`] as a new entry
//!
//! Both write through an [`ArchiveWriter`], which finalizes the archive exactly once and refuses
//! to finalize an archive after a failed write.
//!
//! # Example
//!
//! ```
//! use tar_rewrite::{append_entry, filter_into, ArchiveWriter, ExclusionSet, Stream};
//!
//! # fn main() -> tar_rewrite::Result<()> {
//! # let input: &[u8] = &[0; 1024];
//! let mut writer = ArchiveWriter::new(Vec::new());
//! let mut exclusions = ExclusionSet::new(["second/*"])?;
//! filter_into(input, &mut writer, &mut exclusions)?;
//! append_entry("component-descriptor.yaml", Some(Stream(&b"meta: {}"[..])), Some(&mut writer))?;
//! let archive: Vec<u8> = writer.finish()?;
//! # assert_eq!(archive.len(), 512 * 2 + 1024);
//! # Ok(())
//! # }
//! ```

pub mod append;
pub mod error;
pub mod filter;
pub mod pattern;
pub mod writer;

mod util;

pub use append::{append_entry, Appender, EntrySource, SourceInfo, Stream};
pub use error::{ArchiveError, Result};
pub use filter::{filter_archive, filter_into};
pub use pattern::{Decision, ExclusionSet};
pub use writer::ArchiveWriter;
