//! Classification of caller-supplied storage paths.
//!
//! Accepted forms are drive letters (`C`, `C:`, `C:\`), volume GUID paths
//! (`\\?\Volume{guid}\`), physical drive paths (`\\.\PhysicalDriveN`) and
//! other device interface paths (`\\?\scsi#disk&...#{guid}`). Nothing here
//! touches the OS.

use uuid::Uuid;

use crate::error::{Error, Result};

const LOCAL_DEVICE_PREFIX: &str = r"\\.\";
const WIN32_FILE_PREFIX: &str = r"\\?\";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum PathKind {
    /// A drive letter, always upper case.
    Drive(char),
    Volume(Uuid),
    PhysicalDrive(u32),
    /// Any other device node, typically a bus/vendor interface path.
    DevicePath,
}

/// A validated storage path and the form it should be opened with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ClassifiedPath {
    kind: PathKind,
    local_device_path: String,
}

pub fn physical_drive_path(ordinal: u32) -> String {
    format!(r"{LOCAL_DEVICE_PREFIX}PhysicalDrive{ordinal}")
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

/// `C`, `C:` or `C:\`; the bare letter only when `allow_bare` is set.
fn parse_drive(rest: &str, allow_bare: bool) -> Option<char> {
    let mut chars = rest.chars();
    let letter = chars.next().filter(char::is_ascii_alphabetic)?;
    match chars.as_str() {
        "" if allow_bare => Some(letter.to_ascii_uppercase()),
        ":" | r":\" => Some(letter.to_ascii_uppercase()),
        _ => None,
    }
}

impl ClassifiedPath {
    pub fn classify(input: &str) -> Result<Self> {
        let invalid = || Error::InvalidPath {
            path: input.to_owned(),
        };
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let (prefix, rest) = if let Some(rest) = trimmed.strip_prefix(LOCAL_DEVICE_PREFIX) {
            (LOCAL_DEVICE_PREFIX, rest)
        } else if let Some(rest) = trimmed.strip_prefix(WIN32_FILE_PREFIX) {
            (WIN32_FILE_PREFIX, rest)
        } else {
            let letter = parse_drive(trimmed, true).ok_or_else(invalid)?;
            return Ok(Self::drive(letter));
        };

        if let Some(letter) = parse_drive(rest, false) {
            return Ok(Self::drive(letter));
        }

        if let Some(tail) = strip_prefix_ignore_case(rest, "Volume{") {
            let tail = tail.strip_suffix('\\').unwrap_or(tail);
            let guid_text = tail.strip_suffix('}').ok_or_else(invalid)?;
            // Only the 36 character hyphenated form.
            if guid_text.len() != 36 {
                return Err(invalid());
            }
            let guid = Uuid::try_parse(guid_text).map_err(|_| invalid())?;
            return Ok(Self {
                kind: PathKind::Volume(guid),
                local_device_path: format!(r"{WIN32_FILE_PREFIX}Volume{{{}}}", guid.hyphenated()),
            });
        }

        if let Some(digits) = strip_prefix_ignore_case(rest, "PhysicalDrive") {
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                let ordinal = digits.parse().map_err(|_| invalid())?;
                return Ok(Self::physical_drive(ordinal));
            }
            return Err(invalid());
        }

        let node = rest.strip_suffix('\\').unwrap_or(rest);
        if node.is_empty() || node.contains('\\') || node.chars().any(char::is_whitespace) {
            return Err(invalid());
        }
        Ok(Self {
            kind: PathKind::DevicePath,
            local_device_path: format!("{prefix}{node}"),
        })
    }

    pub fn physical_drive(ordinal: u32) -> Self {
        Self {
            kind: PathKind::PhysicalDrive(ordinal),
            local_device_path: physical_drive_path(ordinal),
        }
    }

    fn drive(letter: char) -> Self {
        Self {
            kind: PathKind::Drive(letter),
            local_device_path: format!("{LOCAL_DEVICE_PREFIX}{letter}:"),
        }
    }

    pub fn kind(&self) -> PathKind {
        self.kind
    }

    pub fn local_device_path(&self) -> &str {
        &self.local_device_path
    }

    pub fn is_drive(&self) -> bool {
        matches!(self.kind, PathKind::Drive(_))
    }

    pub fn is_volume(&self) -> bool {
        matches!(self.kind, PathKind::Volume(_))
    }

    pub fn is_device(&self) -> bool {
        matches!(self.kind, PathKind::PhysicalDrive(_) | PathKind::DevicePath)
    }

    /// Drive letters and volume paths address a volume rather than a disk.
    pub(crate) fn has_volume_context(&self) -> bool {
        self.is_drive() || self.is_volume()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_letter_forms() {
        for input in ["C", "c", "C:", r"C:\", r"\\.\C:", r"\\?\c:\", " D: "] {
            let path = ClassifiedPath::classify(input).unwrap();
            assert!(path.is_drive(), "{input}");
            assert!(!path.is_volume() && !path.is_device());
        }
        let path = ClassifiedPath::classify(r"e:\").unwrap();
        assert_eq!(path.kind(), PathKind::Drive('E'));
        assert_eq!(path.local_device_path(), r"\\.\E:");
    }

    #[test]
    fn volume_guid_path() {
        let path =
            ClassifiedPath::classify(r"\\?\Volume{3f2504e0-4f89-11d3-9a0c-0305e82c3301}\").unwrap();
        assert!(path.is_volume());
        assert_eq!(
            path.kind(),
            PathKind::Volume(uuid::uuid!("3f2504e0-4f89-11d3-9a0c-0305e82c3301"))
        );
        assert_eq!(
            path.local_device_path(),
            r"\\?\Volume{3f2504e0-4f89-11d3-9a0c-0305e82c3301}"
        );
    }

    #[test]
    fn physical_drive_path_is_normalized() {
        let path = ClassifiedPath::classify(r"\\?\physicaldrive12").unwrap();
        assert_eq!(path.kind(), PathKind::PhysicalDrive(12));
        assert_eq!(path.local_device_path(), r"\\.\PhysicalDrive12");
        assert_eq!(path, ClassifiedPath::physical_drive(12));
        assert!(path.is_device());
        assert!(!path.has_volume_context());
    }

    #[test]
    fn vendor_device_path() {
        let input = r"\\?\scsi#disk&ven_samsung&prod_ssd#4&1a2b3c&0&000000#{53f56307-b6bf-11d0-94f2-00a0c91efb8b}";
        let path = ClassifiedPath::classify(input).unwrap();
        assert_eq!(path.kind(), PathKind::DevicePath);
        assert_eq!(path.local_device_path(), input);

        let cdrom = ClassifiedPath::classify(r"\\.\CdRom0").unwrap();
        assert_eq!(cdrom.local_device_path(), r"\\.\CdRom0");
    }

    #[test]
    fn volume_path_is_rebuilt_from_the_guid() {
        let path =
            ClassifiedPath::classify(r"\\?\Volume{3F2504E0-4F89-11D3-9A0C-0305E82C3301}").unwrap();
        assert_eq!(
            path.local_device_path(),
            r"\\?\Volume{3f2504e0-4f89-11d3-9a0c-0305e82c3301}"
        );
    }

    #[test]
    fn malformed_input_is_rejected() {
        for input in [
            "",
            "   ",
            "CC",
            "1:",
            r"C:\Windows",
            r"\\.\PhysicalDrive",
            r"\\.\PhysicalDriveX",
            r"\\?\Volume{not-a-guid}\",
            r"\\?\Volume{3f2504e0-4f89-11d3-9a0c-0305e82c3301",
            r"\\?\Volume{{3f2504e0-4f89-11d3-9a0c-0305e82c3301}}\",
            r"\\?\Volume{3f2504e04f8911d39a0c0305e82c3301}\",
            r"\\?\Volume{urn:uuid:3f2504e0-4f89-11d3-9a0c-0305e82c3301}\",
            r"\\?\",
            r"\\server\share",
            r"\\?\a\b",
        ] {
            assert_eq!(
                ClassifiedPath::classify(input),
                Err(Error::InvalidPath {
                    path: input.to_owned()
                }),
                "{input:?}"
            );
        }
    }
}
