//! End-to-end scenarios: build an archive with the tar crate, run it through the filter and the
//! appender, and decode the result again.

use std::{collections::HashMap, io::Read};

use similar_asserts::assert_eq;
use tar::{Archive, Builder, EntryType, Header};

use tar_rewrite::{
    append_entry, filter_archive, filter_into, ArchiveError, ArchiveWriter, ExclusionSet, Stream,
};

fn make_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut tar_data = Vec::new();
    {
        let mut builder = Builder::new(&mut tar_data);
        for (path, content) in files {
            let mut header = Header::new_gnu();
            header.set_mode(0o600);
            header.set_mtime(1234567890);
            header.set_size(content.len() as u64);
            header.set_entry_type(EntryType::Regular);
            builder.append_data(&mut header, path, *content).unwrap();
        }
        builder.finish().unwrap();
    }
    tar_data
}

/// Decodes `data` and checks that it contains exactly `expected`, each name once.
fn check_tar_archive(data: &[u8], mut expected: HashMap<&str, &[u8]>) {
    let mut archive = Archive::new(data);
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = String::from_utf8(entry.path_bytes().into_owned()).unwrap();
        let mut content = vec![];
        entry.read_to_end(&mut content).unwrap();

        let Some(expected_content) = expected.remove(name.as_str()) else {
            panic!("unexpected entry {name:?}");
        };
        assert_eq!(content, expected_content, "content of {name}");
    }
    assert!(expected.is_empty(), "missing entries: {expected:?}");
}

#[test]
fn filter_drops_matching_directory() {
    let input = make_archive(&[
        ("first/testfile", b"some-content".as_slice()),
        ("second/testfile", b"more-content".as_slice()),
        ("second/testfile-2", b"other-content".as_slice()),
    ]);

    let output = filter_archive(input.as_slice(), Vec::new(), ["second/*"]).unwrap();

    check_tar_archive(
        &output,
        HashMap::from([("first/testfile", b"some-content".as_slice())]),
    );
}

#[test]
fn filter_preserves_order() {
    let names = ["z", "a/1", "m", "a/2", "b"];
    let files: Vec<(&str, &[u8])> = names.iter().map(|n| (*n, n.as_bytes())).collect();
    let input = make_archive(&files);

    let output = filter_archive(input.as_slice(), Vec::new(), ["a/*"]).unwrap();

    let mut archive = Archive::new(output.as_slice());
    let got: Vec<String> = archive
        .entries()
        .unwrap()
        .map(|e| String::from_utf8(e.unwrap().path_bytes().into_owned()).unwrap())
        .collect();
    assert_eq!(got, vec!["z", "m", "b"]);
}

#[test]
fn filter_empty_archive() {
    let input = make_archive(&[]);
    let output = filter_archive(input.as_slice(), Vec::new(), Vec::<String>::new()).unwrap();
    check_tar_archive(&output, HashMap::new());
    assert_eq!(output, input);
}

#[test]
fn filter_with_directories_and_links() {
    let mut input = Vec::new();
    {
        let mut builder = Builder::new(&mut input);

        let mut dir = Header::new_ustar();
        dir.set_mode(0o755);
        dir.set_size(0);
        dir.set_entry_type(EntryType::Directory);
        builder
            .append_data(&mut dir, "etc/", std::io::empty())
            .unwrap();

        let mut file = Header::new_ustar();
        file.set_mode(0o644);
        file.set_size(5);
        file.set_entry_type(EntryType::Regular);
        builder
            .append_data(&mut file, "etc/hosts", b"hosts".as_slice())
            .unwrap();

        let mut link = Header::new_ustar();
        link.set_mode(0o777);
        link.set_size(0);
        link.set_entry_type(EntryType::Symlink);
        builder
            .append_link(&mut link, "etc/localtime", "/usr/share/zoneinfo/UTC")
            .unwrap();

        builder.finish().unwrap();
    }

    let output = filter_archive(input.as_slice(), Vec::new(), ["etc/h*"]).unwrap();

    let list = |data: &[u8]| -> Vec<(Vec<u8>, EntryType)> {
        let mut archive = Archive::new(data);
        archive
            .entries()
            .unwrap()
            .map(|e| {
                let e = e.unwrap();
                (e.path_bytes().into_owned(), e.header().entry_type())
            })
            .collect()
    };

    let mut expected = list(&input);
    expected.retain(|(name, _)| name.as_slice() != b"etc/hosts");
    assert_eq!(expected.len(), 2);
    assert_eq!(list(&output), expected);
    assert_eq!(expected[0].1, EntryType::Directory);
    assert_eq!(expected[1].1, EntryType::Symlink);
}

#[test]
fn append_writes_file() {
    let mut writer = ArchiveWriter::new(Vec::new());
    append_entry(
        "testfile",
        Some(Stream(b"testcontent".as_slice())),
        Some(&mut writer),
    )
    .unwrap();
    let data = writer.finish().unwrap();

    let mut archive = Archive::new(data.as_slice());
    let mut entries = archive.entries().unwrap();

    let mut entry = entries.next().unwrap().unwrap();
    assert_eq!(entry.path_bytes().as_ref(), b"testfile");
    let mut content = vec![];
    entry.read_to_end(&mut content).unwrap();
    assert_eq!(content, b"testcontent");
    drop(entry);

    assert!(entries.next().is_none());
}

#[test]
fn append_writes_empty_file() {
    let mut writer = ArchiveWriter::new(Vec::new());
    append_entry("testfile", Some(Stream(std::io::empty())), Some(&mut writer)).unwrap();
    let data = writer.finish().unwrap();

    let mut archive = Archive::new(data.as_slice());
    let mut entries = archive.entries().unwrap();

    let mut entry = entries.next().unwrap().unwrap();
    assert_eq!(entry.path_bytes().as_ref(), b"testfile");
    assert_eq!(entry.header().size().unwrap(), 0);
    let mut content = vec![];
    assert_eq!(entry.read_to_end(&mut content).unwrap(), 0);
    drop(entry);

    assert!(entries.next().is_none());
}

#[test]
fn append_rejects_empty_name() {
    let mut writer = ArchiveWriter::new(Vec::new());
    let err = append_entry("", Some(b"".as_slice()), Some(&mut writer)).unwrap_err();
    assert!(matches!(err, ArchiveError::EmptyName));
    assert_eq!(err.to_string(), "filename must not be empty");
}

#[test]
fn append_rejects_missing_body() {
    let mut writer = ArchiveWriter::new(Vec::new());
    let err = append_entry::<Stream<&[u8]>, _>("testfile", None, Some(&mut writer)).unwrap_err();
    assert!(matches!(err, ArchiveError::NilBody));
}

#[test]
fn append_rejects_missing_output() {
    let err = append_entry::<_, Vec<u8>>("testfile", Some(b"".as_slice()), None).unwrap_err();
    assert!(matches!(err, ArchiveError::NilOutput));
}

#[test]
fn filter_then_append_then_finalize() {
    let input = make_archive(&[
        ("blobs/a", b"aaaa".as_slice()),
        ("blobs/b", b"bbbb".as_slice()),
        ("component-descriptor.yaml", b"old".as_slice()),
    ]);

    let mut writer = ArchiveWriter::new(Vec::new());
    let mut exclusions = ExclusionSet::new(["component-descriptor.yaml"]).unwrap();
    filter_into(input.as_slice(), &mut writer, &mut exclusions).unwrap();
    append_entry(
        "component-descriptor.yaml",
        Some(Stream(b"new".as_slice())),
        Some(&mut writer),
    )
    .unwrap();
    let output = writer.finish().unwrap();

    check_tar_archive(
        &output,
        HashMap::from([
            ("blobs/a", b"aaaa".as_slice()),
            ("blobs/b", b"bbbb".as_slice()),
            ("component-descriptor.yaml", b"new".as_slice()),
        ]),
    );
}

#[test]
fn exclusion_set_is_reusable() {
    let mut exclusions = ExclusionSet::new(["*.tmp"]).unwrap();

    for round in 0..3 {
        let input = make_archive(&[
            ("keep", b"k".as_slice()),
            ("scratch.tmp", b"t".as_slice()),
        ]);
        let mut writer = ArchiveWriter::new(Vec::new());
        filter_into(input.as_slice(), &mut writer, &mut exclusions).unwrap();
        let output = writer.finish().unwrap();
        check_tar_archive(&output, HashMap::from([("keep", b"k".as_slice())]));
        assert_eq!(exclusions.patterns(), &["*.tmp".to_string()][..], "round {round}");
    }
}

#[test]
fn failed_filter_is_never_finalized() {
    let mut input = make_archive(&[("a", b"1".as_slice()), ("b", b"2".as_slice())]);
    // corrupt the checksum of the second header
    input[1024 + 148] ^= 0x01;

    let mut output = Vec::new();
    let err = filter_archive(input.as_slice(), &mut output, ["nothing"]).unwrap_err();
    assert!(matches!(err, ArchiveError::Decode { index: 1, .. }), "{err}");

    // the first entry made it out, but no end-of-archive marker follows it
    assert_eq!(output.len(), 1024);
    assert!(output[512..].iter().any(|b| *b != 0));
}
