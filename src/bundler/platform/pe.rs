//! Portable Executable images (DLLs and `.pyd` extension modules).
//!
//! PE has no embedded library search path. Windows resolves a DLL's imports
//! from the directory of the loading module, so bundled DLLs are placed in
//! known directories and the directories are recorded in the manifest.

use super::{BinaryFormat, ContentId, PlatformAdapter, Signature, hash_masked};
use crate::bundler::error::{Error, Result};
use goblin::pe::PE;
use sha2::{Digest, Sha256};
use std::{ops::Range, path::Path};

const PE32_MAGIC: u16 = 0x10b;
const PE32_PLUS_MAGIC: u16 = 0x20b;
const IMPORT_DIRECTORY: usize = 1;
const CERTIFICATE_DIRECTORY: usize = 4;

/// [`PlatformAdapter`] for PE.
pub struct PeAdapter;

fn u16_at(bytes: &[u8], at: usize) -> Option<u16> {
    let raw = bytes.get(at..at + 2)?;
    Some(u16::from_le_bytes([raw[0], raw[1]]))
}

fn u32_at(bytes: &[u8], at: usize) -> Option<u32> {
    let raw = bytes.get(at..at + 4)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

#[derive(Debug)]
struct SectionRange {
    virtual_address: usize,
    virtual_size: usize,
    raw_offset: usize,
    raw_size: usize,
}

/// Offsets of the header fields the adapter reads or masks.
#[derive(Debug)]
struct Layout {
    checksum: usize,
    directories: usize,
    directory_count: usize,
    sections: Vec<SectionRange>,
}

impl Layout {
    fn parse(path: &Path, bytes: &[u8]) -> Result<Self> {
        let truncated = || Error::parse(path, "truncated PE header");
        let pe = u32_at(bytes, 0x3c).ok_or_else(truncated)? as usize;
        let coff = pe + 4;
        let section_count = u16_at(bytes, coff + 2).ok_or_else(truncated)? as usize;
        let optional_size = u16_at(bytes, coff + 16).ok_or_else(truncated)? as usize;
        let optional = coff + 20;

        let directories = match u16_at(bytes, optional).ok_or_else(truncated)? {
            PE32_MAGIC => optional + 96,
            PE32_PLUS_MAGIC => optional + 112,
            magic => {
                return Err(Error::parse(path, format!("unknown optional header magic {magic:#x}")));
            }
        };
        let directory_count = u32_at(bytes, directories - 4).ok_or_else(truncated)? as usize;

        let table = optional + optional_size;
        let mut sections = Vec::with_capacity(section_count);
        for i in 0..section_count {
            let s = table + i * 40;
            sections.push(SectionRange {
                virtual_size: u32_at(bytes, s + 8).ok_or_else(truncated)? as usize,
                virtual_address: u32_at(bytes, s + 12).ok_or_else(truncated)? as usize,
                raw_size: u32_at(bytes, s + 16).ok_or_else(truncated)? as usize,
                raw_offset: u32_at(bytes, s + 20).ok_or_else(truncated)? as usize,
            });
        }

        Ok(Self {
            checksum: optional + 64,
            directories,
            directory_count,
            sections,
        })
    }

    fn directory(&self, bytes: &[u8], index: usize) -> Option<(usize, usize)> {
        if index >= self.directory_count {
            return None;
        }
        let at = self.directories + index * 8;
        let address = u32_at(bytes, at)? as usize;
        let size = u32_at(bytes, at + 4)? as usize;
        (size > 0).then_some((address, size))
    }

    /// The attribute certificate table. Its directory entry holds a file
    /// offset, not an RVA.
    fn certificates(&self, bytes: &[u8]) -> Option<Range<usize>> {
        self.directory(bytes, CERTIFICATE_DIRECTORY)
            .map(|(offset, size)| offset..offset + size)
    }

    fn file_offset(&self, rva: usize) -> Option<usize> {
        self.sections.iter().find_map(|s| {
            let span = s.virtual_size.max(s.raw_size);
            (rva >= s.virtual_address && rva < s.virtual_address + span)
                .then(|| rva - s.virtual_address + s.raw_offset)
                .filter(|offset| *offset < s.raw_offset + s.raw_size)
        })
    }

    /// File offsets of every import descriptor's DLL name.
    fn import_names(&self, bytes: &[u8]) -> Vec<usize> {
        let Some(start) = self
            .directory(bytes, IMPORT_DIRECTORY)
            .and_then(|(rva, _)| self.file_offset(rva))
        else {
            return Vec::new();
        };

        let mut names = Vec::new();
        let mut descriptor = start;
        while let Some(raw) = bytes.get(descriptor..descriptor + 20) {
            if raw.iter().all(|b| *b == 0) {
                break;
            }
            if let Some(offset) = u32_at(raw, 12).and_then(|rva| self.file_offset(rva as usize)) {
                names.push(offset);
            }
            descriptor += 20;
        }
        names
    }
}

fn c_string(bytes: &[u8], offset: usize) -> &[u8] {
    let tail = &bytes[offset.min(bytes.len())..];
    let len = tail.iter().position(|b| *b == 0).unwrap_or(tail.len());
    &tail[..len]
}

/// An import name together with the NUL bytes after it. A shorter rename
/// zero-fills within this span, so it is the same before and after.
fn name_slot(bytes: &[u8], offset: usize) -> Range<usize> {
    let start = offset.min(bytes.len());
    let name_end = start + c_string(bytes, start).len();
    let padding = bytes[name_end..].iter().take_while(|b| **b == 0).count();
    start..name_end + padding
}

impl PlatformAdapter for PeAdapter {
    fn format(&self) -> BinaryFormat {
        BinaryFormat::Pe
    }

    fn list_dependencies(&self, path: &Path, bytes: &[u8]) -> Result<Vec<String>> {
        let pe = PE::parse(bytes).map_err(|e| Error::parse(path, e))?;
        let mut deps: Vec<String> = Vec::new();
        for import in &pe.imports {
            if !deps.iter().any(|d| d.eq_ignore_ascii_case(import.dll)) {
                deps.push(import.dll.to_string());
            }
        }
        Ok(deps)
    }

    fn search_paths(&self, _path: &Path, _bytes: &[u8]) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn set_search_paths(&self, path: &Path, _bytes: &mut [u8], paths: &[String]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }
        Err(Error::RewriteConflict {
            path: path.to_path_buf(),
            reason: "PE images carry no library search path; bundled DLLs must sit in the \
                     module's directory or one registered by the package"
                .into(),
        })
    }

    /// Renames an imported DLL in place. The new name may not be longer than
    /// the old one.
    fn replace_dependency(
        &self,
        path: &Path,
        bytes: &mut [u8],
        old: &str,
        new: &str,
    ) -> Result<bool> {
        let layout = Layout::parse(path, bytes)?;
        let targets: Vec<(usize, usize)> = layout
            .import_names(bytes)
            .into_iter()
            .map(|offset| (offset, c_string(bytes, offset)))
            .filter(|(_, name)| name.eq_ignore_ascii_case(old.as_bytes()))
            .map(|(offset, name)| (offset, name.len()))
            .collect();

        if targets.is_empty() {
            return Ok(false);
        }
        for (offset, len) in targets {
            if &bytes[offset..offset + len] == new.as_bytes() {
                continue;
            }
            if new.len() > len {
                return Err(Error::InsufficientSpace {
                    path: path.to_path_buf(),
                    what: format!("import name '{new}'"),
                    needed: new.len(),
                    available: len,
                });
            }
            bytes[offset..offset + new.len()].copy_from_slice(new.as_bytes());
            bytes[offset + new.len()..offset + len].fill(0);
        }
        Ok(true)
    }

    fn signature(&self, path: &Path, bytes: &[u8]) -> Result<Option<Signature>> {
        let layout = Layout::parse(path, bytes)?;
        Ok(layout
            .certificates(bytes)
            .map(|_| Signature::Authenticode))
    }

    fn compute_identity(&self, path: &Path, bytes: &[u8]) -> Result<ContentId> {
        PE::parse(bytes).map_err(|e| Error::parse(path, e))?;
        let layout = Layout::parse(path, bytes)?;

        let mut masked = vec![layout.checksum..layout.checksum + 4];
        if layout.directory_count > CERTIFICATE_DIRECTORY {
            let entry = layout.directories + CERTIFICATE_DIRECTORY * 8;
            masked.push(entry..entry + 8);
        }
        masked.extend(layout.certificates(bytes));
        masked.extend(
            layout
                .import_names(bytes)
                .into_iter()
                .map(|offset| name_slot(bytes, offset)),
        );

        let mut hasher = Sha256::new();
        hash_masked(&mut hasher, bytes, &masked);
        Ok(ContentId::from_hasher(hasher))
    }
}
