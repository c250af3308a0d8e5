//! Mach-O images, thin or universal.
//!
//! goblin reads dependencies and run paths. Rewrites work on the raw load
//! command area: the commands are rebuilt in the padding between the end of
//! the load commands and the first section, so the file size and every
//! segment offset stay the same.

use super::{BinaryFormat, ContentId, PlatformAdapter, Signature, hash_masked};
use crate::bundler::error::{Error, Result};
use goblin::mach::MachO;
use sha2::{Digest, Sha256};
use std::{ops::Range, path::Path};

const MH_MAGIC: u32 = 0xfeed_face;
const MH_MAGIC_64: u32 = 0xfeed_facf;
const MH_CIGAM: u32 = 0xcefa_edfe;
const MH_CIGAM_64: u32 = 0xcffa_edfe;
const FAT_MAGIC: u32 = 0xcafe_babe;
const FAT_MAGIC_64: u32 = 0xcafe_babf;

const LC_SEGMENT: u32 = 0x1;
const LC_LOAD_DYLIB: u32 = 0xc;
const LC_ID_DYLIB: u32 = 0xd;
const LC_SEGMENT_64: u32 = 0x19;
const LC_CODE_SIGNATURE: u32 = 0x1d;
const LC_LAZY_LOAD_DYLIB: u32 = 0x20;
const LC_LOAD_WEAK_DYLIB: u32 = 0x8000_0018;
const LC_RPATH: u32 = 0x8000_001c;
const LC_REEXPORT_DYLIB: u32 = 0x8000_001f;
const LC_LOAD_UPWARD_DYLIB: u32 = 0x8000_0023;

const DEPENDENCY_COMMANDS: [u32; 5] = [
    LC_LOAD_DYLIB,
    LC_LOAD_WEAK_DYLIB,
    LC_REEXPORT_DYLIB,
    LC_LAZY_LOAD_DYLIB,
    LC_LOAD_UPWARD_DYLIB,
];

const S_ZEROFILL: u32 = 0x1;
const S_GB_ZEROFILL: u32 = 0xc;
const S_THREAD_LOCAL_ZEROFILL: u32 = 0x12;

/// [`PlatformAdapter`] for Mach-O.
pub struct MachOAdapter;

#[derive(Clone, Copy, Debug)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn u32(self, data: &[u8], at: usize) -> u32 {
        let raw = [data[at], data[at + 1], data[at + 2], data[at + 3]];
        match self {
            Self::Little => u32::from_le_bytes(raw),
            Self::Big => u32::from_be_bytes(raw),
        }
    }

    fn u64(self, data: &[u8], at: usize) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&data[at..at + 8]);
        match self {
            Self::Little => u64::from_le_bytes(raw),
            Self::Big => u64::from_be_bytes(raw),
        }
    }

    fn put_u32(self, data: &mut [u8], at: usize, value: u32) {
        let raw = match self {
            Self::Little => value.to_le_bytes(),
            Self::Big => value.to_be_bytes(),
        };
        data[at..at + 4].copy_from_slice(&raw);
    }
}

fn be32(bytes: &[u8], at: usize) -> Option<u32> {
    let raw = bytes.get(at..at + 4)?;
    Some(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

fn be64(bytes: &[u8], at: usize) -> Option<u64> {
    let raw = bytes.get(at..at + 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(raw);
    Some(u64::from_be_bytes(buf))
}

/// True if `head`, the first bytes of a file, starts a universal binary.
pub fn is_universal(head: &[u8]) -> bool {
    BinaryFormat::sniff(head) == Some(BinaryFormat::MachO)
        && matches!(be32(head, 0), Some(FAT_MAGIC | FAT_MAGIC_64))
}

/// Byte ranges of the thin images inside `bytes`.
fn slices(path: &Path, bytes: &[u8]) -> Result<Vec<Range<usize>>> {
    let magic = be32(bytes, 0).ok_or_else(|| Error::parse(path, "file too short"))?;
    if magic != FAT_MAGIC && magic != FAT_MAGIC_64 {
        return Ok(vec![0..bytes.len()]);
    }

    let truncated = || Error::parse(path, "truncated universal header");
    let nfat = be32(bytes, 4).ok_or_else(truncated)? as usize;
    let entry_size = if magic == FAT_MAGIC { 20 } else { 32 };

    let mut ranges = Vec::with_capacity(nfat);
    for i in 0..nfat {
        let entry = 8 + i * entry_size;
        let (offset, size) = if magic == FAT_MAGIC {
            (
                be32(bytes, entry + 8).ok_or_else(truncated)? as u64,
                be32(bytes, entry + 12).ok_or_else(truncated)? as u64,
            )
        } else {
            (
                be64(bytes, entry + 8).ok_or_else(truncated)?,
                be64(bytes, entry + 16).ok_or_else(truncated)?,
            )
        };
        let start = offset as usize;
        let end = start
            .checked_add(size as usize)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| Error::parse(path, format!("architecture {i} lies outside the file")))?;
        ranges.push(start..end);
    }
    Ok(ranges)
}

fn parse_thin<'a>(path: &Path, data: &'a [u8]) -> Result<MachO<'a>> {
    MachO::parse(data, 0).map_err(|e| Error::parse(path, e))
}

#[derive(Clone, Copy, Debug)]
struct LoadCommand {
    offset: usize,
    cmd: u32,
    size: usize,
}

/// Raw layout of one thin image's load commands.
#[derive(Debug)]
struct Image {
    endian: Endian,
    is_64: bool,
    header_size: usize,
    commands: Vec<LoadCommand>,
    commands_end: usize,
    /// First byte that belongs to segment content; load commands must end
    /// before it.
    limit: usize,
}

impl Image {
    fn parse(path: &Path, data: &[u8]) -> Result<Self> {
        let magic = data
            .get(..4)
            .map(|m| u32::from_le_bytes([m[0], m[1], m[2], m[3]]))
            .ok_or_else(|| Error::parse(path, "file too short"))?;
        let (endian, is_64) = match magic {
            MH_MAGIC => (Endian::Little, false),
            MH_MAGIC_64 => (Endian::Little, true),
            MH_CIGAM => (Endian::Big, false),
            MH_CIGAM_64 => (Endian::Big, true),
            _ => return Err(Error::parse(path, format!("bad Mach-O magic {magic:#x}"))),
        };
        let header_size = if is_64 { 32 } else { 28 };
        if data.len() < header_size {
            return Err(Error::parse(path, "truncated Mach-O header"));
        }

        let ncmds = endian.u32(data, 16) as usize;
        let commands_end = header_size + endian.u32(data, 20) as usize;
        if commands_end > data.len() {
            return Err(Error::parse(path, "load commands extend past end of file"));
        }

        let mut commands = Vec::with_capacity(ncmds);
        let mut offset = header_size;
        for _ in 0..ncmds {
            if offset + 8 > commands_end {
                return Err(Error::parse(path, "truncated load command"));
            }
            let cmd = endian.u32(data, offset);
            let size = endian.u32(data, offset + 4) as usize;
            if size < 8 || offset + size > commands_end {
                return Err(Error::parse(
                    path,
                    format!("load command {cmd:#x} at {offset:#x} has bad size {size}"),
                ));
            }
            commands.push(LoadCommand { offset, cmd, size });
            offset += size;
        }

        let mut image = Self {
            endian,
            is_64,
            header_size,
            commands,
            commands_end,
            limit: data.len(),
        };
        image.limit = image.content_start(data).unwrap_or(data.len());
        if image.limit < commands_end {
            return Err(Error::parse(path, "load commands overlap segment content"));
        }
        Ok(image)
    }

    /// Lowest file offset of any segment or section content.
    fn content_start(&self, data: &[u8]) -> Option<usize> {
        let e = self.endian;
        let mut starts = Vec::new();
        for c in &self.commands {
            let (fileoff, filesize, nsects, first, sect_size, off_field, flags_field) =
                match c.cmd {
                    LC_SEGMENT_64 if c.size >= 72 => (
                        e.u64(data, c.offset + 40),
                        e.u64(data, c.offset + 48),
                        e.u32(data, c.offset + 64) as usize,
                        72,
                        80,
                        48,
                        64,
                    ),
                    LC_SEGMENT if c.size >= 56 => (
                        e.u32(data, c.offset + 32) as u64,
                        e.u32(data, c.offset + 36) as u64,
                        e.u32(data, c.offset + 48) as usize,
                        56,
                        68,
                        40,
                        56,
                    ),
                    _ => continue,
                };
            if fileoff > 0 && filesize > 0 {
                starts.push(fileoff as usize);
            }
            for i in 0..nsects {
                let sect = c.offset + first + i * sect_size;
                if sect + sect_size > c.offset + c.size {
                    break;
                }
                let offset = e.u32(data, sect + off_field);
                let kind = e.u32(data, sect + flags_field) & 0xff;
                let zerofill = matches!(kind, S_ZEROFILL | S_GB_ZEROFILL | S_THREAD_LOCAL_ZEROFILL);
                if offset > 0 && !zerofill {
                    starts.push(offset as usize);
                }
            }
        }
        starts.into_iter().min()
    }

    fn bytes<'a>(&self, data: &'a [u8], c: &LoadCommand) -> &'a [u8] {
        &data[c.offset..c.offset + c.size]
    }

    /// Reads an `lc_str` whose offset is stored at `field` within the command.
    fn lc_str(&self, path: &Path, data: &[u8], c: &LoadCommand, field: usize) -> Result<String> {
        let raw = self.bytes(data, c);
        if field + 4 > raw.len() {
            return Err(Error::parse(path, format!("load command {:#x} too small", c.cmd)));
        }
        let start = self.endian.u32(raw, field) as usize;
        let tail = raw
            .get(start..)
            .ok_or_else(|| Error::parse(path, format!("load command {:#x} string out of bounds", c.cmd)))?;
        let len = tail.iter().position(|b| *b == 0).unwrap_or(tail.len());
        String::from_utf8(tail[..len].to_vec())
            .map_err(|_| Error::parse(path, format!("load command {:#x} string is not UTF-8", c.cmd)))
    }

    fn segment_name<'a>(&self, data: &'a [u8], c: &LoadCommand) -> &'a [u8] {
        let raw = &self.bytes(data, c)[8..24];
        let len = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        &raw[..len]
    }

    fn signature_blob(&self, data: &[u8]) -> Option<Range<usize>> {
        let c = self.commands.iter().find(|c| c.cmd == LC_CODE_SIGNATURE && c.size >= 16)?;
        let start = self.endian.u32(data, c.offset + 8) as usize;
        let size = self.endian.u32(data, c.offset + 12) as usize;
        Some(start..start + size)
    }

    fn pad(&self, len: usize) -> usize {
        let align = if self.is_64 { 8 } else { 4 };
        len.div_ceil(align) * align
    }

    fn rpath_command(&self, value: &str) -> Vec<u8> {
        let size = self.pad(12 + value.len() + 1);
        let mut out = vec![0u8; size];
        self.endian.put_u32(&mut out, 0, LC_RPATH);
        self.endian.put_u32(&mut out, 4, size as u32);
        self.endian.put_u32(&mut out, 8, 12);
        out[12..12 + value.len()].copy_from_slice(value.as_bytes());
        out
    }

    /// Copies a dylib command with a new install name, keeping its
    /// timestamp and version fields.
    fn dylib_command(&self, original: &[u8], name: &str) -> Vec<u8> {
        let name_at = (self.endian.u32(original, 8) as usize).min(original.len());
        let size = self.pad(name_at + name.len() + 1);
        let mut out = vec![0u8; size];
        out[..name_at].copy_from_slice(&original[..name_at]);
        self.endian.put_u32(&mut out, 4, size as u32);
        out[name_at..name_at + name.len()].copy_from_slice(name.as_bytes());
        out
    }

    /// Writes a new load command list. Leaves `data` untouched on failure
    /// or when the list is unchanged.
    fn commit(&self, path: &Path, data: &mut [u8], commands: Vec<Vec<u8>>, what: &str) -> Result<()> {
        let new_size: usize = commands.iter().map(Vec::len).sum();
        let old = &data[self.header_size..self.commands_end];
        if commands.len() == self.commands.len()
            && new_size == old.len()
            && commands.iter().flatten().eq(old.iter())
        {
            return Ok(());
        }

        let available = self.limit - self.header_size;
        if new_size > available {
            return Err(Error::InsufficientSpace {
                path: path.to_path_buf(),
                what: what.to_string(),
                needed: new_size,
                available,
            });
        }

        let mut cursor = self.header_size;
        for command in &commands {
            data[cursor..cursor + command.len()].copy_from_slice(command);
            cursor += command.len();
        }
        if cursor < self.commands_end {
            data[cursor..self.commands_end].fill(0);
        }
        self.endian.put_u32(data, 16, commands.len() as u32);
        self.endian.put_u32(data, 20, new_size as u32);
        Ok(())
    }

    fn set_rpaths(&self, path: &Path, data: &mut [u8], paths: &[String]) -> Result<()> {
        let mut wanted = paths.iter();
        let mut out = Vec::with_capacity(self.commands.len() + paths.len());
        let mut after_rpaths = None;
        let mut signature_at = None;

        for c in &self.commands {
            match c.cmd {
                LC_RPATH => {
                    if let Some(value) = wanted.next() {
                        if self.lc_str(path, data, c, 8)? == *value {
                            out.push(self.bytes(data, c).to_vec());
                        } else {
                            out.push(self.rpath_command(value));
                        }
                        after_rpaths = Some(out.len());
                    }
                }
                LC_CODE_SIGNATURE => {
                    signature_at = Some(out.len());
                    out.push(self.bytes(data, c).to_vec());
                }
                _ => out.push(self.bytes(data, c).to_vec()),
            }
        }

        let at = after_rpaths.or(signature_at).unwrap_or(out.len());
        let extra: Vec<Vec<u8>> = wanted.map(|value| self.rpath_command(value)).collect();
        out.splice(at..at, extra);

        self.commit(path, data, out, "LC_RPATH commands")
    }

    fn replace_dylib(&self, path: &Path, data: &mut [u8], old: &str, new: &str) -> Result<bool> {
        let mut found = false;
        let mut out = Vec::with_capacity(self.commands.len());
        for c in &self.commands {
            let raw = self.bytes(data, c);
            if DEPENDENCY_COMMANDS.contains(&c.cmd) && self.lc_str(path, data, c, 8)? == old {
                found = true;
                out.push(self.dylib_command(raw, new));
            } else {
                out.push(raw.to_vec());
            }
        }
        if found {
            self.commit(path, data, out, &format!("install name '{new}'"))?;
        }
        Ok(found)
    }

    fn hash_into(&self, path: &Path, data: &[u8], hasher: &mut Sha256) -> Result<()> {
        hasher.update(&data[..16]);
        hasher.update(&data[24..self.header_size]);

        for c in &self.commands {
            match c.cmd {
                LC_RPATH | LC_CODE_SIGNATURE => {}
                cmd if cmd == LC_ID_DYLIB || DEPENDENCY_COMMANDS.contains(&cmd) => {
                    let name = self.lc_str(path, data, c, 8)?;
                    let base = name.rsplit('/').next().unwrap_or(&name);
                    hasher.update(cmd.to_le_bytes());
                    hasher.update(base.as_bytes());
                    hasher.update([0]);
                }
                LC_SEGMENT | LC_SEGMENT_64 if c.size >= 24 && self.segment_name(data, c) == b"__LINKEDIT" => {
                    hasher.update(b"__LINKEDIT");
                }
                _ => hasher.update(self.bytes(data, c)),
            }
        }

        let tail = &data[self.limit..];
        let masked: Vec<Range<usize>> = self
            .signature_blob(data)
            .into_iter()
            .map(|r| r.start.saturating_sub(self.limit)..r.end.saturating_sub(self.limit))
            .collect();
        hash_masked(hasher, tail, &masked);
        Ok(())
    }
}

impl PlatformAdapter for MachOAdapter {
    fn format(&self) -> BinaryFormat {
        BinaryFormat::MachO
    }

    fn list_dependencies(&self, path: &Path, bytes: &[u8]) -> Result<Vec<String>> {
        let mut deps: Vec<String> = Vec::new();
        for range in slices(path, bytes)? {
            let macho = parse_thin(path, &bytes[range])?;
            // goblin reports the image itself as "self" in first position
            for lib in macho.libs.iter().skip(1) {
                if !deps.iter().any(|d| d == lib) {
                    deps.push(lib.to_string());
                }
            }
        }
        Ok(deps)
    }

    fn search_paths(&self, path: &Path, bytes: &[u8]) -> Result<Vec<String>> {
        let Some(first) = slices(path, bytes)?.into_iter().next() else {
            return Ok(Vec::new());
        };
        let macho = parse_thin(path, &bytes[first])?;
        Ok(macho.rpaths.iter().map(|r| r.to_string()).collect())
    }

    fn set_search_paths(&self, path: &Path, bytes: &mut [u8], paths: &[String]) -> Result<()> {
        // Validate every slice before touching any of them.
        let mut plans = Vec::new();
        for range in slices(path, bytes)? {
            let image = Image::parse(path, &bytes[range.clone()])?;
            let mut scratch = bytes[range.clone()].to_vec();
            image.set_rpaths(path, &mut scratch, paths)?;
            plans.push((range, scratch));
        }
        for (range, scratch) in plans {
            bytes[range].copy_from_slice(&scratch);
        }
        Ok(())
    }

    fn replace_dependency(
        &self,
        path: &Path,
        bytes: &mut [u8],
        old: &str,
        new: &str,
    ) -> Result<bool> {
        let mut plans = Vec::new();
        let mut found = false;
        for range in slices(path, bytes)? {
            let image = Image::parse(path, &bytes[range.clone()])?;
            let mut scratch = bytes[range.clone()].to_vec();
            found |= image.replace_dylib(path, &mut scratch, old, new)?;
            plans.push((range, scratch));
        }
        for (range, scratch) in plans {
            bytes[range].copy_from_slice(&scratch);
        }
        Ok(found)
    }

    fn signature(&self, path: &Path, bytes: &[u8]) -> Result<Option<Signature>> {
        for range in slices(path, bytes)? {
            let data = &bytes[range];
            let image = Image::parse(path, data)?;
            if image.signature_blob(data).is_some() {
                return Ok(Some(Signature::CodeSignature));
            }
        }
        Ok(None)
    }

    fn compute_identity(&self, path: &Path, bytes: &[u8]) -> Result<ContentId> {
        let mut hasher = Sha256::new();
        for range in slices(path, bytes)? {
            let data = &bytes[range];
            Image::parse(path, data)?.hash_into(path, data, &mut hasher)?;
        }
        Ok(ContentId::from_hasher(hasher))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::platform::testdata::{self, CPU_TYPE_ARM64, MachOSpec};

    fn path() -> &'static Path {
        Path::new("/pkg/QtCore.abi3.so")
    }

    fn strs(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn identity(bytes: &[u8]) -> ContentId {
        MachOAdapter.compute_identity(path(), bytes).unwrap()
    }

    #[test]
    fn lists_dependencies_without_own_id() {
        let bytes = MachOSpec {
            install_id: Some("@rpath/QtCore.framework/Versions/A/QtCore".into()),
            dylibs: strs(&["@rpath/QtCore.framework/Versions/A/QtCore", "/usr/lib/libc++.1.dylib"]),
            ..Default::default()
        }
        .build();
        assert_eq!(
            MachOAdapter.list_dependencies(path(), &bytes).unwrap(),
            ["@rpath/QtCore.framework/Versions/A/QtCore", "/usr/lib/libc++.1.dylib"]
        );
    }

    #[test]
    fn rpath_round_trip() {
        let bytes = testdata::macho(&["@rpath/libcore.dylib"], &["@loader_path/../lib", "/opt/qt/lib"]);
        let paths = MachOAdapter.search_paths(path(), &bytes).unwrap();
        assert_eq!(paths, ["@loader_path/../lib", "/opt/qt/lib"]);

        let mut copy = bytes.clone();
        MachOAdapter.set_search_paths(path(), &mut copy, &paths).unwrap();
        assert_eq!(copy, bytes);
    }

    #[test]
    fn rewrite_rpaths_in_header_padding() {
        let bytes = testdata::macho(&["@rpath/libcore.dylib"], &["/opt/qt/lib"]);
        let before = identity(&bytes);

        let mut copy = bytes.clone();
        let new = strs(&["@loader_path/lib", "@loader_path/../shared/lib", "@loader_path"]);
        MachOAdapter.set_search_paths(path(), &mut copy, &new).unwrap();

        assert_eq!(copy.len(), bytes.len());
        assert_eq!(MachOAdapter.search_paths(path(), &copy).unwrap(), new);
        assert_eq!(identity(&copy), before);

        let macho = MachO::parse(&copy, 0).unwrap();
        assert_eq!(macho.header.ncmds, 5);
        assert_eq!(macho.libs[1..], ["@rpath/libcore.dylib"]);

        // shrinking back to no run paths at all
        MachOAdapter.set_search_paths(path(), &mut copy, &[]).unwrap();
        assert!(MachOAdapter.search_paths(path(), &copy).unwrap().is_empty());
        assert_eq!(identity(&copy), before);
    }

    #[test]
    fn not_enough_header_padding() {
        let bytes = MachOSpec {
            dylibs: strs(&["@rpath/libcore.dylib"]),
            header_pad: 0,
            ..Default::default()
        }
        .build();

        let mut copy = bytes.clone();
        let long = "@loader_path/".to_string() + &"x".repeat(64);
        let err = MachOAdapter
            .set_search_paths(path(), &mut copy, &[long])
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientSpace { .. }), "{err}");
        assert_eq!(copy, bytes);
    }

    #[test]
    fn replace_install_name() {
        let bytes = testdata::macho(&["/opt/qt/lib/libcore.dylib", "/usr/lib/libSystem.B.dylib"], &[]);
        let mut copy = bytes.clone();

        assert!(MachOAdapter
            .replace_dependency(path(), &mut copy, "/opt/qt/lib/libcore.dylib", "@rpath/libcore.dylib")
            .unwrap());
        assert_eq!(
            MachOAdapter.list_dependencies(path(), &copy).unwrap(),
            ["@rpath/libcore.dylib", "/usr/lib/libSystem.B.dylib"]
        );
        // only the directory changed
        assert_eq!(identity(&copy), identity(&bytes));

        assert!(!MachOAdapter
            .replace_dependency(path(), &mut copy, "/nowhere/libx.dylib", "@rpath/libx.dylib")
            .unwrap());
    }

    #[test]
    fn universal_binary_rewrites_every_slice() {
        let x86 = testdata::macho(&["/opt/qt/lib/libcore.dylib"], &["/opt/qt/lib"]);
        let arm = MachOSpec {
            cputype: CPU_TYPE_ARM64,
            dylibs: strs(&["/opt/qt/lib/libcore.dylib", "/opt/qt/lib/libarm.dylib"]),
            rpaths: strs(&["/opt/qt/lib"]),
            ..Default::default()
        }
        .build();
        let bytes = testdata::fat(&[x86, arm]);

        assert_eq!(
            MachOAdapter.list_dependencies(path(), &bytes).unwrap(),
            ["/opt/qt/lib/libcore.dylib", "/opt/qt/lib/libarm.dylib"]
        );

        let mut copy = bytes.clone();
        MachOAdapter
            .set_search_paths(path(), &mut copy, &strs(&["@loader_path/lib"]))
            .unwrap();
        assert_eq!(copy.len(), bytes.len());
        for range in slices(path(), &copy).unwrap() {
            let macho = MachO::parse(&copy[range], 0).unwrap();
            assert_eq!(macho.rpaths, ["@loader_path/lib"]);
        }
        assert_eq!(identity(&copy), identity(&bytes));
    }

    #[test]
    fn detects_universal_header() {
        let thin = testdata::macho(&[], &[]);
        let fat = testdata::fat(&[thin.clone()]);
        assert!(is_universal(&fat[..8]));
        assert!(!is_universal(&thin[..8]));
        assert!(!is_universal(&[0xca, 0xfe, 0xba, 0xbe, 0x00, 0x00, 0x00, 0x34]));
        assert!(!is_universal(b"\xca\xfe"));
    }

    #[test]
    fn code_signature_is_reported_and_ignored_by_identity() {
        let unsigned = testdata::macho(&["@rpath/libcore.dylib"], &[]);
        let signed = MachOSpec {
            dylibs: strs(&["@rpath/libcore.dylib"]),
            signed: true,
            ..Default::default()
        }
        .build();

        assert_eq!(MachOAdapter.signature(path(), &unsigned).unwrap(), None);
        assert_eq!(
            MachOAdapter.signature(path(), &signed).unwrap(),
            Some(Signature::CodeSignature)
        );

        let mut resigned = signed.clone();
        let end = resigned.len();
        resigned[end - 8..].fill(0x11);
        assert_eq!(identity(&resigned), identity(&signed));
    }

    #[test]
    fn identity_depends_on_code() {
        let a = MachOSpec {
            payload: b"one".to_vec(),
            ..Default::default()
        }
        .build();
        let b = MachOSpec {
            payload: b"two".to_vec(),
            ..Default::default()
        }
        .build();
        assert_ne!(identity(&a), identity(&b));
    }
}
