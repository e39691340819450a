//! Translation between archive entry streams and the filesystem tree.
//!
//! Reading correlates entries through the archive's inode numbers so that
//! hard-linked occurrences land on one filesystem inode; writing does the
//! reverse, emitting each shared inode's body exactly once (on its last
//! occurrence, which is where common producers put it). The filesystem's
//! own inode indices are used as the emitted archive inode numbers, so
//! hard-link groupings survive a full round trip.

use std::collections::HashMap;
use std::io::Write;

use tracing::{debug, trace};

use cpiofs_format::reader::ArchiveReader;
use cpiofs_format::substream::Source;
use cpiofs_format::writer::ArchiveWriter;
use cpiofs_format::{CpioEntry, Device, FileType, Format};

use crate::content::FileContent;
use crate::entry::DirEntry;
use crate::enumerate::SearchOption;
use crate::error::FsError;
use crate::filesystem::{DeviceKind, UnixFs};
use crate::inode::InodeKind;

/// Populate `fs` from an archive.
///
/// Intermediate directories are created as needed. `overwrite` controls
/// whether an archive entry may replace an existing non-directory at its
/// path; directory entries merge with existing directories either way.
/// Returns the number of entries consumed.
pub fn read_archive<S: Source>(
    fs: &UnixFs,
    reader: &mut ArchiveReader<S>,
    overwrite: bool,
) -> Result<usize, FsError> {
    // Archive inode number to the first materialized entry of that group.
    let mut seen: HashMap<u32, DirEntry> = HashMap::new();
    let mut count: usize = 0;

    while let Some(mut entry) = reader.next_entry()? {
        let body: Option<Vec<u8>> = match entry.record().file_type {
            FileType::RegularFile => Some(entry.read_body()?),
            _ => None,
        };
        let record: CpioEntry = entry.into_record();
        count += 1;

        // Archives commonly open with a "." entry for the root itself.
        if record.name == "." || record.name == "./" {
            apply_metadata(fs.root(), &record);
            continue;
        }
        let path: String = format!("/{}", record.name.trim_start_matches('/'));

        if let Some(linked) = seen.get(&record.ino).cloned() {
            materialize_hard_link(fs, &linked, &path, &record, body, overwrite)?;
            continue;
        }

        let kind: InodeKind = InodeKind::from_file_type(record.file_type)
            .ok_or(FsError::UnsupportedEntryKind(record.file_type))?;
        trace!(path = path.as_str(), kind = ?kind, "archive entry");

        if let Some(prior) = fs.try_get(&path)? {
            if prior.is_directory() && kind.is_directory() {
                apply_metadata(&prior, &record);
                continue;
            }
            if prior.is_directory() || !overwrite {
                return Err(FsError::AlreadyExists(path));
            }
            fs.delete(&path)?;
        }

        let created: DirEntry = match kind {
            InodeKind::Directory => fs.create_dir(&path, true)?,
            InodeKind::RegularFile => fs.create_file(
                &path,
                FileContent::Bytes(body.unwrap_or_default()),
                true,
            )?,
            InodeKind::Symlink => {
                let target: String = record.link_target.clone().unwrap_or_default();
                fs.create_symlink(&path, &target, true)?
            }
            InodeKind::CharDevice => fs.create_device(&path, DeviceKind::Char, record.rdev, true)?,
            InodeKind::BlockDevice => {
                fs.create_device(&path, DeviceKind::Block, record.rdev, true)?
            }
        };
        apply_metadata(&created, &record);

        if record.nlink > 1 && !kind.is_directory() {
            seen.insert(record.ino, created);
        }
    }

    Ok(count)
}

/// A repeated archive inode number: attach another entry to the existing
/// inode, and accept a payload if this occurrence carries one.
fn materialize_hard_link(
    fs: &UnixFs,
    linked: &DirEntry,
    path: &str,
    record: &CpioEntry,
    body: Option<Vec<u8>>,
    overwrite: bool,
) -> Result<(), FsError> {
    if let Some(prior) = fs.try_get(path)? {
        if prior.is_directory() || !overwrite {
            return Err(FsError::AlreadyExists(path.to_string()));
        }
        fs.delete(path)?;
    }
    let entry: DirEntry = fs.create_hard_link(path, linked, true)?;

    // Producers disagree on whether the first or the last occurrence of a
    // group carries the payload; accept it wherever it shows up.
    if let Some(body) = body {
        if !body.is_empty() {
            let inode = entry.inode();
            if let Some(current) = inode.content() {
                if !current.is_empty() && current.to_bytes()? != body {
                    debug!(
                        path = path,
                        "hard-link group carries conflicting bodies; keeping the newest"
                    );
                }
            }
            inode.set_content(FileContent::Bytes(body));
        }
    }
    if let Some(target) = &record.link_target {
        if !target.is_empty() {
            entry.inode().set_link_target(target.clone());
        }
    }
    Ok(())
}

fn apply_metadata(entry: &DirEntry, record: &CpioEntry) {
    entry.inode().update_metadata(|meta| {
        meta.mode = record.mode;
        meta.uid = record.uid;
        meta.gid = record.gid;
        meta.mtime = record.mtime;
        meta.dev = record.dev;
    });
}

/// Serialize the tree under `fs` into `writer`, pre-order and name-sorted.
///
/// The root itself is not emitted. The writer is left unfinished so the
/// caller can append further entries or pick the moment the trailer goes
/// out. Returns the number of entries emitted.
pub fn write_archive<W: Write>(
    fs: &UnixFs,
    writer: &mut ArchiveWriter<W>,
) -> Result<usize, FsError> {
    // Remaining references per shared inode; the body goes out when the
    // counter reaches zero.
    let mut remaining: HashMap<u64, u32> = HashMap::new();
    let mut count: usize = 0;

    for entry in fs.enumerate(SearchOption::Recursive, None)? {
        let inode = entry.inode();
        let meta = inode.metadata();
        let name: String = entry.full_path()?.trim_start_matches('/').to_string();

        let mut record: CpioEntry = CpioEntry {
            format: Format::Newc,
            ino: inode.index() as u32,
            file_type: entry.kind().file_type(),
            mode: meta.mode,
            uid: meta.uid,
            gid: meta.gid,
            nlink: inode.nlink(),
            mtime: meta.mtime,
            file_size: 0,
            dev: meta.dev,
            rdev: inode.device().unwrap_or(Device::NONE),
            checksum: 0,
            name,
            link_target: None,
        };

        match entry.kind() {
            InodeKind::RegularFile => {
                let emit_body: bool = if record.nlink > 1 {
                    let slot: &mut u32 = remaining.entry(inode.index()).or_insert(record.nlink);
                    *slot -= 1;
                    *slot == 0
                } else {
                    true
                };

                if emit_body {
                    let content: FileContent = inode.content().expect("regular file payload");
                    record.file_size = content.len();
                    add_file_content(writer, &record, &content)?;
                } else {
                    // Earlier occurrences of a hard-link group carry no
                    // body and declare no size.
                    writer.add_entry(&record)?;
                }
            }
            InodeKind::Symlink => {
                let target: String = inode.link_target().expect("symlink payload");
                record.file_size = target.len() as u64;
                record.link_target = Some(target);
                writer.add_entry(&record)?;
            }
            InodeKind::Directory | InodeKind::CharDevice | InodeKind::BlockDevice => {
                writer.add_entry(&record)?;
            }
        }
        count += 1;
    }

    debug!(entries = count, "filesystem serialized");
    Ok(count)
}

fn add_file_content<W: Write>(
    writer: &mut ArchiveWriter<W>,
    record: &CpioEntry,
    content: &FileContent,
) -> Result<(), FsError> {
    if record.file_size == 0 {
        writer.add_entry(record)?;
        return Ok(());
    }
    match content {
        FileContent::Bytes(bytes) => writer.add_file(record, bytes.as_slice())?,
        FileContent::Text(text) => writer.add_file(record, text.as_bytes())?,
        FileContent::Stream { source, .. } => {
            let mut source = source.lock();
            writer.add_file(record, &mut *source)?;
        }
        FileContent::Lazy { producer, .. } => {
            let bytes: Vec<u8> = (**producer)()?;
            writer.add_file(record, bytes.as_slice())?;
        }
    }
    Ok(())
}
