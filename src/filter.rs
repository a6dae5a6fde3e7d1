//! Copying a tar stream while dropping entries that match exclusion patterns.

use std::{
    borrow::Cow,
    io::{self, Read, Write},
};

use log::{debug, trace};
use tar::{Archive, Entry, EntryType};

use crate::{
    error::{ArchiveError, Result},
    pattern::{Decision, ExclusionSet},
    util::{display_name, ExactReader},
    writer::ArchiveWriter,
};

fn decode_error(index: usize) -> impl FnOnce(io::Error) -> ArchiveError {
    move |source| ArchiveError::Decode { index, source }
}

/// Collects the PAX extended records that apply to `entry`, in their original order.
fn pax_records<R: Read>(
    entry: &mut Entry<'_, R>,
    index: usize,
) -> Result<Vec<(String, Vec<u8>)>> {
    let mut records = vec![];
    if let Some(extensions) = entry.pax_extensions().map_err(decode_error(index))? {
        for extension in extensions {
            let extension = extension.map_err(decode_error(index))?;
            let key = extension.key().map_err(|err| {
                decode_error(index)(io::Error::new(io::ErrorKind::InvalidData, err))
            })?;
            records.push((key.to_string(), extension.value_bytes().to_vec()));
        }
    }
    Ok(records)
}

fn filter_entries<R: Read, W: Write>(
    input: R,
    output: &mut ArchiveWriter<W>,
    exclusions: &mut ExclusionSet,
) -> Result<()> {
    let mut archive = Archive::new(input);
    let entries = archive.entries().map_err(decode_error(0))?;

    let (mut kept, mut excluded) = (0usize, 0usize);
    for (index, entry) in entries.enumerate() {
        let mut entry = entry.map_err(decode_error(index))?;
        let header = entry.header().clone();
        let name = entry.path_bytes().into_owned();

        if header.entry_type() == EntryType::GNUSparse {
            return Err(decode_error(index)(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("sparse entry {:?} is not supported", display_name(&name)),
            )));
        }
        // a PAX `size` record overrides the header field
        let size = entry.size();

        match exclusions.decide(&name)? {
            Decision::Exclude { pattern } => {
                debug!(
                    "excluding {:?} (matches {:?})",
                    display_name(&name),
                    exclusions.patterns()[pattern]
                );
                io::copy(&mut ExactReader::new(&mut entry, size), &mut io::sink()).map_err(
                    |err| {
                        ArchiveError::io(
                            format!("unable to skip entry {:?}", display_name(&name)),
                            err,
                        )
                    },
                )?;
                excluded += 1;
            }
            Decision::Keep => {
                trace!("copying {:?} ({size} bytes)", display_name(&name));
                let link_name = entry.link_name_bytes().map(Cow::into_owned);
                let pax = pax_records(&mut entry, index)?;
                output
                    .append_raw(&header, &name, link_name.as_deref(), &pax, size, &mut entry)
                    .map_err(|err| {
                        ArchiveError::io(
                            format!("unable to copy entry {:?}", display_name(&name)),
                            err,
                        )
                    })?;
                kept += 1;
            }
        }
    }

    debug!("filtered archive: kept {kept} entries, excluded {excluded}");
    Ok(())
}

/// Copies every entry of the tar stream `input` whose name matches none of `exclusions` to
/// `output`, in input order.  `output` is not finalized, so more entries can be appended
/// afterwards.
///
/// Excluded entries are drained from `input` and dropped together with any extension records
/// (GNU long names, PAX headers) that belong to them.  Kept entries are written with their
/// original header.
///
/// On failure `output` is poisoned: it holds whatever entries were written so far and will
/// never be finalized.
pub fn filter_into<R: Read, W: Write>(
    input: R,
    output: &mut ArchiveWriter<W>,
    exclusions: &mut ExclusionSet,
) -> Result<()> {
    let result = filter_entries(input, output, exclusions);
    if result.is_err() {
        output.poison();
    }
    result
}

/// Filters the tar stream `input` into `output`, dropping every entry whose name matches one of
/// `patterns`, and finalizes the result.
///
/// Returns the output sink once the end-of-archive marker has been written.  If anything fails
/// the end-of-archive marker is never written.
pub fn filter_archive<R, W, I, S>(input: R, output: W, patterns: I) -> Result<W>
where
    R: Read,
    W: Write,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut exclusions = ExclusionSet::new(patterns)?;
    let mut writer = ArchiveWriter::new(output);
    filter_into(input, &mut writer, &mut exclusions)?;
    writer.finish()
}
