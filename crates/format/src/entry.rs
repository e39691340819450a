//! Codec-facing entry record.

use cpiofs_common::path;

use crate::error::EntryValidationError;
use crate::header::{FileType, Format};

/// A device number pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Device {
    pub major: u32,
    pub minor: u32,
}

impl Device {
    /// The zero device, used where no device applies.
    pub const NONE: Device = Device { major: 0, minor: 0 };

    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

/// Metadata for one archive entry.
///
/// `ino` is the archive's inode number and only serves to group hard-linked
/// occurrences of one file within a single archive; it carries no meaning
/// outside it. File bodies travel separately from this record: the reader
/// exposes them as bounded sub-streams and the writer receives them
/// alongside `add_entry`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpioEntry {
    pub format: Format,
    pub ino: u32,
    pub file_type: FileType,
    /// Nine permission bits; the file type bits live in `file_type`.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub nlink: u32,
    /// Seconds since the epoch, as wide as the wire field.
    pub mtime: u32,
    pub file_size: u64,
    pub dev: Device,
    pub rdev: Device,
    pub checksum: u32,
    pub name: String,
    pub link_target: Option<String>,
}

impl CpioEntry {
    fn base(name: impl Into<String>, file_type: FileType, mode: u32, nlink: u32) -> Self {
        Self {
            format: Format::Newc,
            ino: 0,
            file_type,
            mode,
            uid: 0,
            gid: 0,
            nlink,
            mtime: 0,
            file_size: 0,
            dev: Device::NONE,
            rdev: Device::NONE,
            checksum: 0,
            name: name.into(),
            link_target: None,
        }
    }

    /// A regular file of `file_size` bytes.
    pub fn regular_file(name: impl Into<String>, file_size: u64) -> Self {
        Self {
            file_size,
            ..Self::base(name, FileType::RegularFile, 0o644, 1)
        }
    }

    /// A directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self::base(name, FileType::Directory, 0o755, 2)
    }

    /// A symbolic link; the target is stored as the entry body.
    pub fn symlink(name: impl Into<String>, target: impl Into<String>) -> Self {
        let target: String = target.into();
        Self {
            file_size: target.len() as u64,
            link_target: Some(target),
            ..Self::base(name, FileType::Symlink, 0o777, 1)
        }
    }

    /// A character device with the given device numbers.
    pub fn char_device(name: impl Into<String>, rdev: Device) -> Self {
        Self {
            rdev,
            ..Self::base(name, FileType::CharDevice, 0o644, 1)
        }
    }

    /// A block device with the given device numbers.
    pub fn block_device(name: impl Into<String>, rdev: Device) -> Self {
        Self {
            rdev,
            ..Self::base(name, FileType::BlockDevice, 0o644, 1)
        }
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    pub fn with_ino(mut self, ino: u32) -> Self {
        self.ino = ino;
        self
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode & 0o777;
        self
    }

    pub fn with_owner(mut self, uid: u32, gid: u32) -> Self {
        self.uid = uid;
        self.gid = gid;
        self
    }

    pub fn with_nlink(mut self, nlink: u32) -> Self {
        self.nlink = nlink;
        self
    }

    pub fn with_mtime(mut self, mtime: u32) -> Self {
        self.mtime = mtime;
        self
    }

    pub fn with_dev(mut self, dev: Device) -> Self {
        self.dev = dev;
        self
    }

    /// The full mode word as it appears on the wire.
    pub fn mode_word(&self) -> u32 {
        self.file_type.mode_with(self.mode)
    }

    /// Check the record against the format's entry rules.
    ///
    /// `data_len` is the length of the body the caller intends to supply,
    /// or `None` when there is none.
    pub fn validate(&self, data_len: Option<u64>) -> Result<(), EntryValidationError> {
        if self.name.is_empty() {
            return Err(EntryValidationError::EmptyName);
        }
        if self.name.contains('\0') {
            return Err(EntryValidationError::NameHasNul(self.name.clone()));
        }
        if !path::is_normalized(&self.name) {
            return Err(EntryValidationError::NameNotNormalized(self.name.clone()));
        }
        if self.name == ".." || self.name.starts_with("../") {
            return Err(EntryValidationError::NameEscapesRoot(self.name.clone()));
        }
        if self.file_size > u64::from(u32::MAX) {
            return Err(EntryValidationError::FileTooLarge(self.file_size));
        }

        if let Some(target) = &self.link_target {
            if self.file_type != FileType::Symlink {
                return Err(EntryValidationError::LinkTargetOnNonSymlink(self.file_type));
            }
            if target.is_empty() {
                return Err(EntryValidationError::EmptyLinkTarget(self.name.clone()));
            }
        }

        match self.file_type {
            FileType::RegularFile => {
                if self.nlink < 1 {
                    return Err(EntryValidationError::LinkCount {
                        file_type: self.file_type,
                        nlink: self.nlink,
                    });
                }
                match data_len {
                    Some(actual) if actual != self.file_size => {
                        return Err(EntryValidationError::DataLengthMismatch {
                            declared: self.file_size,
                            actual,
                        });
                    }
                    None if self.file_size > 0 => {
                        return Err(EntryValidationError::MissingData(self.file_size));
                    }
                    _ => {}
                }
            }
            FileType::Symlink => {
                let target: &String = self
                    .link_target
                    .as_ref()
                    .ok_or_else(|| EntryValidationError::EmptyLinkTarget(self.name.clone()))?;
                if self.file_size != target.len() as u64 {
                    return Err(EntryValidationError::DataLengthMismatch {
                        declared: self.file_size,
                        actual: target.len() as u64,
                    });
                }
                if data_len.is_some() {
                    return Err(EntryValidationError::UnexpectedData(self.file_type));
                }
                if self.nlink != 1 {
                    return Err(EntryValidationError::LinkCount {
                        file_type: self.file_type,
                        nlink: self.nlink,
                    });
                }
            }
            FileType::Directory => {
                if data_len.is_some() || self.file_size != 0 {
                    return Err(EntryValidationError::UnexpectedData(self.file_type));
                }
                if self.nlink < 2 {
                    return Err(EntryValidationError::DirectoryLinkCount(self.nlink));
                }
            }
            _ => {
                if data_len.is_some() || self.file_size != 0 {
                    return Err(EntryValidationError::UnexpectedData(self.file_type));
                }
                if self.nlink != 1 {
                    return Err(EntryValidationError::LinkCount {
                        file_type: self.file_type,
                        nlink: self.nlink,
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regular_file_defaults() {
        let entry: CpioEntry = CpioEntry::regular_file("a/b.txt", 11);
        assert_eq!(entry.file_type, FileType::RegularFile);
        assert_eq!(entry.mode, 0o644);
        assert_eq!(entry.nlink, 1);
        assert_eq!(entry.file_size, 11);
        assert!(entry.validate(Some(11)).is_ok());
    }

    #[test]
    fn test_symlink_size_is_target_length() {
        let entry: CpioEntry = CpioEntry::symlink("l", "dir1/file1.txt");
        assert_eq!(entry.file_size, 14);
        assert!(entry.validate(None).is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        assert!(matches!(
            CpioEntry::directory("").validate(None),
            Err(EntryValidationError::EmptyName)
        ));
        assert!(matches!(
            CpioEntry::directory("a/./b").validate(None),
            Err(EntryValidationError::NameNotNormalized(_))
        ));
        assert!(matches!(
            CpioEntry::directory("../up").validate(None),
            Err(EntryValidationError::NameEscapesRoot(_))
        ));
    }

    #[test]
    fn test_validate_data_length_agreement() {
        let entry: CpioEntry = CpioEntry::regular_file("f", 4);
        assert!(matches!(
            entry.validate(Some(3)),
            Err(EntryValidationError::DataLengthMismatch { declared: 4, actual: 3 })
        ));
        assert!(matches!(
            entry.validate(None),
            Err(EntryValidationError::MissingData(4))
        ));
        assert!(entry.validate(Some(4)).is_ok());
    }

    #[test]
    fn test_validate_link_counts() {
        assert!(matches!(
            CpioEntry::directory("d").with_nlink(1).validate(None),
            Err(EntryValidationError::DirectoryLinkCount(1))
        ));
        assert!(matches!(
            CpioEntry::char_device("c", Device::new(1, 3))
                .with_nlink(2)
                .validate(None),
            Err(EntryValidationError::LinkCount { .. })
        ));
        // Hard-linked regular files legitimately carry nlink > 1.
        assert!(CpioEntry::regular_file("f", 0)
            .with_nlink(2)
            .validate(None)
            .is_ok());
    }

    #[test]
    fn test_validate_rejects_data_on_special_files() {
        let device: CpioEntry = CpioEntry::block_device("b", Device::new(8, 1));
        assert!(matches!(
            device.validate(Some(1)),
            Err(EntryValidationError::UnexpectedData(FileType::BlockDevice))
        ));

        let mut dir: CpioEntry = CpioEntry::directory("d");
        dir.file_size = 2;
        assert!(matches!(
            dir.validate(None),
            Err(EntryValidationError::UnexpectedData(FileType::Directory))
        ));
    }
}
