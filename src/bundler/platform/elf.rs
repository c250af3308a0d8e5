//! ELF shared objects and executables.
//!
//! Dependencies come from `DT_NEEDED`, search paths from `DT_RUNPATH` (or the
//! legacy `DT_RPATH`). Both are rewritten in place inside `.dynstr`: a new
//! value must fit into the bytes the old string occupies plus the NUL padding
//! that follows it. The file layout never changes.

use super::{BinaryFormat, ContentId, PlatformAdapter, Signature, hash_masked};
use crate::bundler::error::{Error, Result};
use goblin::elf::{
    Elf,
    dynamic::{DT_NEEDED, DT_RPATH, DT_RUNPATH, DT_SONAME},
};
use sha2::{Digest, Sha256};
use std::{ops::Range, path::Path};

const DT_CONFIG: u64 = 0x6fff_fefa;
const DT_DEPAUDIT: u64 = 0x6fff_fefb;
const DT_AUDIT: u64 = 0x6fff_fefc;
const DT_AUXILIARY: u64 = 0x7fff_fffd;
const DT_FILTER: u64 = 0x7fff_ffff;

/// Dynamic tags whose value is an offset into `.dynstr`.
const STRING_TAGS: [u64; 9] = [
    DT_NEEDED,
    DT_SONAME,
    DT_RPATH,
    DT_RUNPATH,
    DT_CONFIG,
    DT_DEPAUDIT,
    DT_AUDIT,
    DT_AUXILIARY,
    DT_FILTER,
];

/// [`PlatformAdapter`] for ELF.
pub struct ElfAdapter;

#[derive(Clone, Copy, Debug)]
struct StringRef {
    tag: u64,
    offset: usize,
}

/// Where a string lives in the file and how far it may grow.
#[derive(Debug)]
struct Slot {
    start: usize,
    len: usize,
    /// Exclusive bound for the string including its terminating NUL.
    limit: usize,
    /// Another string ends inside this one (suffix sharing).
    shared: bool,
}

impl Slot {
    fn available(&self) -> usize {
        self.limit.saturating_sub(self.start + 1)
    }

    fn span(&self) -> Range<usize> {
        if self.shared {
            self.start..self.start + self.len + 1
        } else {
            self.start..self.limit
        }
    }
}

/// Owned view of the dynamic string table, detached from the parsed [`Elf`]
/// so the bytes can be mutated afterwards.
#[derive(Debug, Default)]
struct DynamicStrings {
    table: Range<usize>,
    entries: Vec<StringRef>,
    referenced: Vec<usize>,
}

impl DynamicStrings {
    fn parse(path: &Path, bytes: &[u8]) -> Result<Self> {
        let elf = Elf::parse(bytes).map_err(|e| Error::parse(path, e))?;
        let Some(dynamic) = elf.dynamic.as_ref() else {
            return Ok(Self::default());
        };

        let start = dynamic.info.strtab;
        let end = start
            .checked_add(dynamic.info.strsz)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| Error::parse(path, "dynamic string table out of bounds"))?;

        let mut entries = Vec::new();
        let mut referenced = Vec::new();
        for d in &dynamic.dyns {
            if STRING_TAGS.contains(&d.d_tag) {
                if d.d_val as usize >= end - start {
                    return Err(Error::parse(
                        path,
                        format!("dynamic tag {:#x} points outside .dynstr", d.d_tag),
                    ));
                }
                referenced.push(d.d_val as usize);
                if matches!(d.d_tag, DT_NEEDED | DT_RPATH | DT_RUNPATH) {
                    entries.push(StringRef {
                        tag: d.d_tag,
                        offset: d.d_val as usize,
                    });
                }
            }
        }
        referenced.extend(elf.dynsyms.iter().map(|sym| sym.st_name));
        referenced.sort_unstable();
        referenced.dedup();

        Ok(Self {
            table: start..end,
            entries,
            referenced,
        })
    }

    fn string(&self, path: &Path, bytes: &[u8], offset: usize) -> Result<String> {
        let table = &bytes[self.table.clone()];
        let tail = table
            .get(offset..)
            .ok_or_else(|| Error::parse(path, format!("string offset {offset} out of bounds")))?;
        let len = tail.iter().position(|b| *b == 0).unwrap_or(tail.len());
        String::from_utf8(tail[..len].to_vec())
            .map_err(|_| Error::parse(path, format!("string at offset {offset} is not UTF-8")))
    }

    fn tagged(&self, tag: u64) -> impl Iterator<Item = StringRef> + '_ {
        self.entries.iter().copied().filter(move |e| e.tag == tag)
    }

    /// The string table entry holding the search path, preferring `DT_RUNPATH`
    /// since the loader ignores `DT_RPATH` when both are present.
    fn search_path_entry(&self) -> Option<StringRef> {
        self.tagged(DT_RUNPATH)
            .next()
            .or_else(|| self.tagged(DT_RPATH).next())
    }

    fn slot(&self, bytes: &[u8], entry: StringRef) -> Slot {
        let table = &bytes[self.table.clone()];
        let offset = entry.offset;
        let len = table[offset..]
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(table.len() - offset);
        let end = offset + len;

        let shared = self
            .referenced
            .iter()
            .any(|r| *r > offset && *r <= end);

        let mut limit = end + 1;
        while limit < table.len() && table[limit] == 0 {
            limit += 1;
        }
        if let Some(next) = self.referenced.iter().find(|r| **r > end) {
            limit = limit.min(*next);
        }
        let limit = limit.min(table.len()).max(end + 1);

        Slot {
            start: self.table.start + offset,
            len,
            limit: self.table.start + limit,
            shared,
        }
    }

    fn write(
        &self,
        path: &Path,
        bytes: &mut [u8],
        entry: StringRef,
        value: &str,
        what: &str,
    ) -> Result<()> {
        let slot = self.slot(bytes, entry);
        if &bytes[slot.start..slot.start + slot.len] == value.as_bytes() {
            return Ok(());
        }
        if slot.start + slot.len >= self.table.end {
            return Err(Error::parse(path, format!("{what} is not NUL-terminated")));
        }
        if value.as_bytes().contains(&0) {
            return Err(Error::RewriteConflict {
                path: path.to_path_buf(),
                reason: format!("{what} contains a NUL byte"),
            });
        }
        if slot.shared {
            return Err(Error::RewriteConflict {
                path: path.to_path_buf(),
                reason: format!("{what} shares its string table bytes with another entry"),
            });
        }
        if value.len() > slot.available() {
            return Err(Error::InsufficientSpace {
                path: path.to_path_buf(),
                what: what.to_string(),
                needed: value.len(),
                available: slot.available(),
            });
        }

        let end = slot.start + value.len();
        bytes[slot.start..end].copy_from_slice(value.as_bytes());
        let old_end = slot.start + slot.len;
        bytes[end..old_end.max(end) + 1].fill(0);
        Ok(())
    }
}

impl PlatformAdapter for ElfAdapter {
    fn format(&self) -> BinaryFormat {
        BinaryFormat::Elf
    }

    fn list_dependencies(&self, path: &Path, bytes: &[u8]) -> Result<Vec<String>> {
        let strings = DynamicStrings::parse(path, bytes)?;
        strings
            .tagged(DT_NEEDED)
            .map(|e| strings.string(path, bytes, e.offset))
            .collect()
    }

    fn search_paths(&self, path: &Path, bytes: &[u8]) -> Result<Vec<String>> {
        let strings = DynamicStrings::parse(path, bytes)?;
        let Some(entry) = strings.search_path_entry() else {
            return Ok(Vec::new());
        };
        let value = strings.string(path, bytes, entry.offset)?;
        if value.is_empty() {
            return Ok(Vec::new());
        }
        Ok(value.split(':').map(str::to_string).collect())
    }

    fn set_search_paths(&self, path: &Path, bytes: &mut [u8], paths: &[String]) -> Result<()> {
        let strings = DynamicStrings::parse(path, bytes)?;
        let value = paths.join(":");
        match strings.search_path_entry() {
            Some(entry) => strings.write(path, bytes, entry, &value, "DT_RUNPATH"),
            None if value.is_empty() => Ok(()),
            None => Err(Error::InsufficientSpace {
                path: path.to_path_buf(),
                what: "DT_RUNPATH (the binary has no run path entry to reuse)".into(),
                needed: value.len(),
                available: 0,
            }),
        }
    }

    fn replace_dependency(
        &self,
        path: &Path,
        bytes: &mut [u8],
        old: &str,
        new: &str,
    ) -> Result<bool> {
        let strings = DynamicStrings::parse(path, bytes)?;
        let mut found = None;
        for entry in strings.tagged(DT_NEEDED) {
            if strings.string(path, bytes, entry.offset)? == old {
                found = Some(entry);
                break;
            }
        }
        let Some(entry) = found else {
            return Ok(false);
        };
        strings.write(path, bytes, entry, new, &format!("DT_NEEDED '{new}'"))?;
        Ok(true)
    }

    fn signature(&self, _path: &Path, _bytes: &[u8]) -> Result<Option<Signature>> {
        Ok(None)
    }

    fn compute_identity(&self, path: &Path, bytes: &[u8]) -> Result<ContentId> {
        let strings = DynamicStrings::parse(path, bytes)?;
        let masked: Vec<Range<usize>> = strings
            .entries
            .iter()
            .map(|e| strings.slot(bytes, *e).span())
            .collect();

        let mut hasher = Sha256::new();
        hash_masked(&mut hasher, bytes, &masked);
        Ok(ContentId::from_hasher(hasher))
    }
}
