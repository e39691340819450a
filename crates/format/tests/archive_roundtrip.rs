//! End-to-end tests for the archive reader and writer.

use std::io::{Cursor, Read, Seek, SeekFrom};

use cpiofs_format::{
    ArchiveReader, ArchiveWriter, CpioEntry, DataErrorKind, Device, FileType, Format, FormatError,
    SeekableSubStream, StateError,
};

/// Read every entry of a sequential archive, draining bodies.
fn read_all(bytes: &[u8]) -> Vec<(CpioEntry, Vec<u8>)> {
    let mut reader = ArchiveReader::new(bytes);
    let mut entries: Vec<(CpioEntry, Vec<u8>)> = Vec::new();
    while let Some(mut entry) = reader.next_entry().unwrap() {
        let body: Vec<u8> = entry.read_body().unwrap();
        entries.push((entry.into_record(), body));
    }
    entries
}

fn sample_archive() -> Vec<u8> {
    let mut writer: ArchiveWriter<Vec<u8>> = ArchiveWriter::new(Vec::new());

    writer
        .add_entry(&CpioEntry::directory("dir1").with_ino(1).with_mtime(1_600_000_000))
        .unwrap();
    writer
        .add_file(
            &CpioEntry::regular_file("dir1/file1.txt", 11)
                .with_ino(2)
                .with_mode(0o640)
                .with_owner(1000, 100)
                .with_mtime(1_600_000_001),
            b"Hello World".as_slice(),
        )
        .unwrap();
    writer
        .add_entry(
            &CpioEntry::symlink("dir1/link", "file1.txt")
                .with_ino(3)
                .with_mtime(1_600_000_002),
        )
        .unwrap();
    writer
        .add_entry(
            &CpioEntry::char_device("null", Device::new(1, 3))
                .with_ino(4)
                .with_mode(0o666),
        )
        .unwrap();

    writer.into_inner().unwrap()
}

#[test]
fn test_manual_single_entry() {
    let mut writer: ArchiveWriter<Vec<u8>> = ArchiveWriter::new(Vec::new());
    let entry: CpioEntry = CpioEntry::regular_file("test.txt", 11)
        .with_mode(0o600)
        .with_mtime(1_262_304_000)
        .with_dev(Device::new(1, 3));
    writer.add_file(&entry, b"Hello World".as_slice()).unwrap();
    let bytes: Vec<u8> = writer.into_inner().unwrap();

    let entries: Vec<(CpioEntry, Vec<u8>)> = read_all(&bytes);
    assert_eq!(entries.len(), 1);

    let (record, body) = &entries[0];
    assert_eq!(record.name, "test.txt");
    assert_eq!(record.file_type, FileType::RegularFile);
    assert_eq!(record.mode, 0o600);
    assert_eq!(record.nlink, 1);
    assert_eq!(record.mtime, 1_262_304_000);
    assert_eq!(record.dev, Device::new(1, 3));
    assert_eq!(record.file_size, 11);
    assert_eq!(body, b"Hello World");
}

#[test]
fn test_archive_round_trip_is_byte_exact() {
    let original: Vec<u8> = sample_archive();
    let entries: Vec<(CpioEntry, Vec<u8>)> = read_all(&original);

    let mut writer: ArchiveWriter<Vec<u8>> = ArchiveWriter::new(Vec::new());
    for (record, body) in &entries {
        if record.file_type == FileType::RegularFile {
            writer.add_file(record, body.as_slice()).unwrap();
        } else {
            writer.add_entry(record).unwrap();
        }
    }
    let rewritten: Vec<u8> = writer.into_inner().unwrap();

    assert_eq!(rewritten, original);
}

#[test]
fn test_symlink_target_round_trips() {
    let entries: Vec<(CpioEntry, Vec<u8>)> = read_all(&sample_archive());
    let link: &CpioEntry = &entries
        .iter()
        .find(|(record, _)| record.file_type == FileType::Symlink)
        .unwrap()
        .0;

    assert_eq!(link.name, "dir1/link");
    assert_eq!(link.link_target.as_deref(), Some("file1.txt"));
    assert_eq!(link.file_size, 9);
    assert_eq!(link.nlink, 1);
}

#[test]
fn test_trailer_only_archive_yields_no_entries() {
    let mut writer: ArchiveWriter<Vec<u8>> = ArchiveWriter::new(Vec::new());
    writer.finish().unwrap();
    let bytes: Vec<u8> = writer.into_inner().unwrap();
    assert_eq!(bytes.len(), 124);

    let mut reader = ArchiveReader::new(bytes.as_slice());
    assert!(reader.next_entry().unwrap().is_none());
    // Iteration stays finished.
    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn test_sequential_reader_requires_body_consumption() {
    let bytes: Vec<u8> = sample_archive();
    let mut reader = ArchiveReader::new(bytes.as_slice());

    // Directory, then the regular file whose body we refuse to drain.
    assert!(reader.next_entry().unwrap().is_some());
    {
        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.record().file_type, FileType::RegularFile);
    }

    let error: FormatError = reader.next_entry().unwrap_err();
    assert!(matches!(
        error,
        FormatError::State(StateError::UnconsumedData { remaining: 11 })
    ));

    // The protocol violation poisons the reader.
    assert!(matches!(
        reader.next_entry().unwrap_err(),
        FormatError::State(StateError::Poisoned)
    ));
}

#[test]
fn test_sequential_reader_accepts_partial_tail_within_padding() {
    let mut writer: ArchiveWriter<Vec<u8>> = ArchiveWriter::new(Vec::new());
    writer
        .add_file(&CpioEntry::regular_file("f", 6), b"abcdef".as_slice())
        .unwrap();
    writer.add_entry(&CpioEntry::directory("d")).unwrap();
    let bytes: Vec<u8> = writer.into_inner().unwrap();

    let mut reader = ArchiveReader::new(bytes.as_slice());
    {
        let mut entry = reader.next_entry().unwrap().unwrap();
        // Five of six bytes: one data byte plus two padding bytes remain,
        // which is within the alignment allowance.
        let mut buf: [u8; 5] = [0; 5];
        entry.data().unwrap().read_exact(&mut buf).unwrap();
    }
    let next = reader.next_entry().unwrap().unwrap();
    assert_eq!(next.record().name, "d");
}

#[test]
fn test_seekable_reader_skips_unread_bodies() {
    let bytes: Vec<u8> = sample_archive();
    let mut reader = ArchiveReader::new_seekable(Cursor::new(bytes));

    let mut names: Vec<String> = Vec::new();
    while let Some(entry) = reader.next_entry().unwrap() {
        names.push(entry.record().name.clone());
    }
    assert_eq!(names, ["dir1", "dir1/file1.txt", "dir1/link", "null"]);
}

#[test]
fn test_bad_magic_is_reported_at_offset() {
    let mut bytes: Vec<u8> = sample_archive();
    // First entry is "dir1": header 110 + name 5 -> padded to 116.
    bytes[116] = b'X';

    let mut reader = ArchiveReader::new(bytes.as_slice());
    assert!(reader.next_entry().unwrap().is_some());
    match reader.next_entry().unwrap_err() {
        FormatError::Data { offset, kind } => {
            assert_eq!(offset, 116);
            assert!(matches!(kind, DataErrorKind::BadMagic(_)));
        }
        other => panic!("expected data error, got {:?}", other),
    }
}

#[test]
fn test_truncated_archive_is_a_data_error() {
    let bytes: Vec<u8> = sample_archive();
    let cut: &[u8] = &bytes[..bytes.len() - 130];

    let mut reader = ArchiveReader::new(cut);
    let error: FormatError = loop {
        match reader.next_entry() {
            Ok(Some(mut entry)) => {
                entry.read_body().unwrap();
            }
            Ok(None) => panic!("truncated archive ended cleanly"),
            Err(error) => break error,
        }
    };
    assert!(matches!(
        error,
        FormatError::Data {
            kind: DataErrorKind::Truncated,
            ..
        }
    ));
}

#[test]
fn test_crc_checksum_round_trip() {
    let mut writer: ArchiveWriter<Vec<u8>> = ArchiveWriter::with_format(Vec::new(), Format::NewcCrc);
    writer
        .add_file(&CpioEntry::regular_file("f", 5), b"hello".as_slice())
        .unwrap();
    let bytes: Vec<u8> = writer.into_inner().unwrap();

    let mut reader = ArchiveReader::new(bytes.as_slice());
    let mut entry = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry.record().format, Format::NewcCrc);
    let body: Vec<u8> = entry.read_body().unwrap();
    entry.verify_checksum(&body).unwrap();

    // A corrupted body no longer matches the header checksum.
    let mut tampered: Vec<u8> = body.clone();
    tampered[0] ^= 0x01;
    assert!(matches!(
        entry.verify_checksum(&tampered),
        Err(FormatError::Data {
            kind: DataErrorKind::ChecksumMismatch { .. },
            ..
        })
    ));
}

#[test]
fn test_non_utf8_name_is_a_data_error() {
    let mut writer: ArchiveWriter<Vec<u8>> = ArchiveWriter::new(Vec::new());
    writer.add_entry(&CpioEntry::directory("ab")).unwrap();
    let mut bytes: Vec<u8> = writer.into_inner().unwrap();
    bytes[110] = 0xFF;

    let mut reader = ArchiveReader::new(bytes.as_slice());
    assert!(matches!(
        reader.next_entry().unwrap_err(),
        FormatError::Data {
            kind: DataErrorKind::NameNotUtf8,
            ..
        }
    ));
}

#[test]
fn test_file_backed_archive_with_seekable_window() {
    let mut file: std::fs::File = tempfile::tempfile().unwrap();
    {
        let mut writer: ArchiveWriter<&mut std::fs::File> = ArchiveWriter::new(&mut file);
        writer
            .add_file(&CpioEntry::regular_file("f.txt", 11), b"Hello World".as_slice())
            .unwrap();
        writer.finish().unwrap();
    }

    file.seek(SeekFrom::Start(0)).unwrap();
    // Header (110) + "f.txt\0" (6) lands on the alignment boundary.
    let body_start: u64 = 116;
    {
        let mut reader = ArchiveReader::new_seekable(&mut file);
        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.record().name, "f.txt");
        assert_eq!(entry.offset(), 0);
        drop(entry);
        assert!(reader.next_entry().unwrap().is_none());
    }

    // Re-read the body through a standalone seekable window; the window
    // re-establishes the cursor on its own.
    file.seek(SeekFrom::Start(3)).unwrap();
    let mut window: SeekableSubStream<&mut std::fs::File> =
        SeekableSubStream::new(&mut file, body_start, 11);
    let mut body: String = String::new();
    window.read_to_string(&mut body).unwrap();
    assert_eq!(body, "Hello World");

    window.seek(SeekFrom::Start(6)).unwrap();
    let mut tail: String = String::new();
    window.read_to_string(&mut tail).unwrap();
    assert_eq!(tail, "World");
}

#[test]
fn test_writer_validates_before_emitting() {
    let mut writer: ArchiveWriter<Vec<u8>> = ArchiveWriter::new(Vec::new());

    assert!(writer.add_entry(&CpioEntry::directory("a//b")).is_err());
    assert!(writer.add_entry(&CpioEntry::directory("../up")).is_err());
    assert!(writer
        .add_entry(&CpioEntry::symlink("l", "").with_nlink(1))
        .is_err());

    // Nothing reached the sink.
    assert_eq!(writer.offset(), 0);
    let bytes: Vec<u8> = writer.into_inner().unwrap();
    assert_eq!(bytes.len(), 124);
}
