//! Synthetic ELF, Mach-O and PE images for tests.
//!
//! The images are minimal but well formed: goblin parses them and the
//! adapters can rewrite them. This file is also included by the integration
//! tests, so it must not refer to anything else in the crate.

#![allow(dead_code)]

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn align(value: usize, to: usize) -> usize {
    value.div_ceil(to) * to
}

fn put_u16(out: &mut [u8], at: usize, value: u16) {
    out[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut [u8], at: usize, value: u32) {
    out[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(out: &mut [u8], at: usize, value: u64) {
    out[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

/// A 64-bit little-endian ELF shared object without section headers.
#[derive(Clone, Debug, Default)]
pub struct ElfSpec {
    pub needed: Vec<String>,
    pub soname: Option<String>,
    pub runpath: Option<String>,
    pub rpath: Option<String>,
    /// Extra NUL bytes reserved after the search path strings.
    pub slack: usize,
    pub payload: Vec<u8>,
}

impl ElfSpec {
    pub fn build(&self) -> Vec<u8> {
        const EHDR: usize = 64;
        const PHDR: usize = 56;

        let mut strtab = vec![0u8];
        let mut dyns: Vec<(u64, u64)> = Vec::new();
        for name in &self.needed {
            dyns.push((1, strtab.len() as u64));
            strtab.extend_from_slice(name.as_bytes());
            strtab.push(0);
        }
        if let Some(soname) = &self.soname {
            dyns.push((14, strtab.len() as u64));
            strtab.extend_from_slice(soname.as_bytes());
            strtab.push(0);
        }
        for (tag, value) in [(15u64, &self.rpath), (29u64, &self.runpath)] {
            if let Some(value) = value {
                dyns.push((tag, strtab.len() as u64));
                strtab.extend_from_slice(value.as_bytes());
                strtab.push(0);
                strtab.extend(std::iter::repeat_n(0u8, self.slack));
            }
        }

        let dyn_off = EHDR + 2 * PHDR;
        let dyn_size = (dyns.len() + 3) * 16;
        let str_off = dyn_off + dyn_size;
        dyns.push((5, str_off as u64));
        dyns.push((10, strtab.len() as u64));
        dyns.push((0, 0));

        let payload_off = str_off + strtab.len();
        let total = payload_off + self.payload.len();
        let mut out = vec![0u8; total];

        out[0..4].copy_from_slice(b"\x7fELF");
        out[4] = 2; // ELFCLASS64
        out[5] = 1; // ELFDATA2LSB
        out[6] = 1; // EV_CURRENT
        put_u16(&mut out, 16, 3); // ET_DYN
        put_u16(&mut out, 18, 62); // EM_X86_64
        put_u32(&mut out, 20, 1);
        put_u64(&mut out, 32, EHDR as u64);
        put_u16(&mut out, 52, EHDR as u16);
        put_u16(&mut out, 54, PHDR as u16);
        put_u16(&mut out, 56, 2);
        put_u16(&mut out, 58, 64);

        // PT_LOAD covering the whole file, vaddr == offset
        let ph = EHDR;
        put_u32(&mut out, ph, 1);
        put_u32(&mut out, ph + 4, 5);
        put_u64(&mut out, ph + 32, total as u64);
        put_u64(&mut out, ph + 40, total as u64);
        put_u64(&mut out, ph + 48, 0x1000);

        // PT_DYNAMIC
        let ph = EHDR + PHDR;
        put_u32(&mut out, ph, 2);
        put_u32(&mut out, ph + 4, 6);
        put_u64(&mut out, ph + 8, dyn_off as u64);
        put_u64(&mut out, ph + 16, dyn_off as u64);
        put_u64(&mut out, ph + 24, dyn_off as u64);
        put_u64(&mut out, ph + 32, dyn_size as u64);
        put_u64(&mut out, ph + 40, dyn_size as u64);
        put_u64(&mut out, ph + 48, 8);

        for (i, (tag, value)) in dyns.iter().enumerate() {
            put_u64(&mut out, dyn_off + i * 16, *tag);
            put_u64(&mut out, dyn_off + i * 16 + 8, *value);
        }

        out[str_off..payload_off].copy_from_slice(&strtab);
        out[payload_off..].copy_from_slice(&self.payload);
        out
    }
}

/// ELF shared object with the given `DT_NEEDED` entries and `DT_RUNPATH`.
pub fn elf(needed: &[&str], runpath: Option<&str>) -> Vec<u8> {
    elf_with_payload(needed, runpath, b"elf payload")
}

/// Like [`elf`] but with distinguishing content.
pub fn elf_with_payload(needed: &[&str], runpath: Option<&str>, payload: &[u8]) -> Vec<u8> {
    ElfSpec {
        needed: strings(needed),
        runpath: runpath.map(str::to_string),
        slack: 64,
        payload: payload.to_vec(),
        ..Default::default()
    }
    .build()
}

pub const CPU_TYPE_X86_64: u32 = 0x0100_0007;
pub const CPU_TYPE_ARM64: u32 = 0x0100_000c;

/// A 64-bit little-endian Mach-O dylib with a single `__TEXT` segment.
#[derive(Clone, Debug)]
pub struct MachOSpec {
    pub cputype: u32,
    pub install_id: Option<String>,
    pub dylibs: Vec<String>,
    pub rpaths: Vec<String>,
    pub signed: bool,
    /// Free bytes between the load commands and the first section.
    pub header_pad: usize,
    pub payload: Vec<u8>,
}

impl Default for MachOSpec {
    fn default() -> Self {
        Self {
            cputype: CPU_TYPE_X86_64,
            install_id: None,
            dylibs: Vec::new(),
            rpaths: Vec::new(),
            signed: false,
            header_pad: 512,
            payload: b"macho payload".to_vec(),
        }
    }
}

fn macho_dylib_command(cmd: u32, name: &str) -> Vec<u8> {
    let size = align(24 + name.len() + 1, 8);
    let mut out = vec![0u8; size];
    put_u32(&mut out, 0, cmd);
    put_u32(&mut out, 4, size as u32);
    put_u32(&mut out, 8, 24);
    put_u32(&mut out, 12, 2);
    put_u32(&mut out, 16, 0x0001_0000);
    put_u32(&mut out, 20, 0x0001_0000);
    out[24..24 + name.len()].copy_from_slice(name.as_bytes());
    out
}

fn macho_rpath_command(path: &str) -> Vec<u8> {
    let size = align(12 + path.len() + 1, 8);
    let mut out = vec![0u8; size];
    put_u32(&mut out, 0, 0x8000_001c);
    put_u32(&mut out, 4, size as u32);
    put_u32(&mut out, 8, 12);
    out[12..12 + path.len()].copy_from_slice(path.as_bytes());
    out
}

fn name16(out: &mut [u8], at: usize, name: &str) {
    out[at..at + name.len()].copy_from_slice(name.as_bytes());
}

impl MachOSpec {
    pub fn build(&self) -> Vec<u8> {
        const HEADER: usize = 32;
        const SEGMENT: usize = 72 + 80;

        let mut tail: Vec<Vec<u8>> = Vec::new();
        if let Some(id) = &self.install_id {
            tail.push(macho_dylib_command(0xd, id));
        }
        for dylib in &self.dylibs {
            tail.push(macho_dylib_command(0xc, dylib));
        }
        for rpath in &self.rpaths {
            tail.push(macho_rpath_command(rpath));
        }
        let sig_cmd = if self.signed { 16 } else { 0 };
        let sizeofcmds = SEGMENT + tail.iter().map(Vec::len).sum::<usize>() + sig_cmd;
        let ncmds = 1 + tail.len() + usize::from(self.signed);

        let text_off = align(HEADER + sizeofcmds + self.header_pad, 16);
        let payload_end = text_off + self.payload.len();
        let sig_off = align(payload_end, 16);
        let total = if self.signed { sig_off + 32 } else { payload_end };

        let mut out = vec![0u8; total];
        put_u32(&mut out, 0, 0xfeed_facf);
        put_u32(&mut out, 4, self.cputype);
        put_u32(&mut out, 8, 3);
        put_u32(&mut out, 12, 6); // MH_DYLIB
        put_u32(&mut out, 16, ncmds as u32);
        put_u32(&mut out, 20, sizeofcmds as u32);

        let seg = HEADER;
        put_u32(&mut out, seg, 0x19);
        put_u32(&mut out, seg + 4, SEGMENT as u32);
        name16(&mut out, seg + 8, "__TEXT");
        put_u64(&mut out, seg + 32, total as u64);
        put_u64(&mut out, seg + 48, total as u64);
        put_u32(&mut out, seg + 56, 5);
        put_u32(&mut out, seg + 60, 5);
        put_u32(&mut out, seg + 64, 1);

        let sect = seg + 72;
        name16(&mut out, sect, "__text");
        name16(&mut out, sect + 16, "__TEXT");
        put_u64(&mut out, sect + 32, text_off as u64);
        put_u64(&mut out, sect + 40, self.payload.len() as u64);
        put_u32(&mut out, sect + 48, text_off as u32);
        put_u32(&mut out, sect + 52, 2);
        put_u32(&mut out, sect + 64, 0x8000_0400);

        let mut cursor = seg + SEGMENT;
        for cmd in &tail {
            out[cursor..cursor + cmd.len()].copy_from_slice(cmd);
            cursor += cmd.len();
        }
        if self.signed {
            put_u32(&mut out, cursor, 0x1d);
            put_u32(&mut out, cursor + 4, 16);
            put_u32(&mut out, cursor + 8, sig_off as u32);
            put_u32(&mut out, cursor + 12, 32);
            out[sig_off..].fill(0xfa);
        }

        out[text_off..payload_end].copy_from_slice(&self.payload);
        out
    }
}

/// Mach-O dylib loading `dylibs` with the given `LC_RPATH` entries.
pub fn macho(dylibs: &[&str], rpaths: &[&str]) -> Vec<u8> {
    MachOSpec {
        dylibs: strings(dylibs),
        rpaths: strings(rpaths),
        ..Default::default()
    }
    .build()
}

/// Universal binary wrapping the given thin slices.
pub fn fat(slices: &[Vec<u8>]) -> Vec<u8> {
    const SLICE_ALIGN: usize = 0x1000;

    let mut offsets = Vec::new();
    let mut cursor = SLICE_ALIGN;
    for slice in slices {
        offsets.push(cursor);
        cursor = align(cursor + slice.len(), SLICE_ALIGN);
    }
    let total = offsets
        .last()
        .zip(slices.last())
        .map(|(off, s)| off + s.len())
        .unwrap_or(8);

    let mut out = vec![0u8; total];
    out[0..4].copy_from_slice(&0xcafe_babe_u32.to_be_bytes());
    out[4..8].copy_from_slice(&(slices.len() as u32).to_be_bytes());
    for (i, (slice, off)) in slices.iter().zip(&offsets).enumerate() {
        let entry = 8 + i * 20;
        out[entry..entry + 4].copy_from_slice(&slice[4..8].iter().rev().copied().collect::<Vec<_>>());
        out[entry + 4..entry + 8].copy_from_slice(&slice[8..12].iter().rev().copied().collect::<Vec<_>>());
        out[entry + 8..entry + 12].copy_from_slice(&(*off as u32).to_be_bytes());
        out[entry + 12..entry + 16].copy_from_slice(&(slice.len() as u32).to_be_bytes());
        out[entry + 16..entry + 20].copy_from_slice(&12u32.to_be_bytes());
        out[*off..off + slice.len()].copy_from_slice(slice);
    }
    out
}

/// A PE32+ DLL importing one function from each of `dlls`.
#[derive(Clone, Debug, Default)]
pub struct PeSpec {
    pub dlls: Vec<String>,
    pub signed: bool,
    pub checksum: u32,
    pub payload: Vec<u8>,
}

impl PeSpec {
    pub fn build(&self) -> Vec<u8> {
        const PE_OFF: usize = 0x80;
        const COFF: usize = PE_OFF + 4;
        const OPT: usize = COFF + 20;
        const OPT_SIZE: usize = 240;
        const SECTIONS: usize = OPT + OPT_SIZE;
        const RAW_OFF: usize = 0x200;
        const SECTION_RVA: usize = 0x1000;

        // .idata contents, addressed by RVA
        let descriptors = (self.dlls.len() + 1) * 20;
        let mut sec = vec![0u8; descriptors];
        let mut push = |sec: &mut Vec<u8>, bytes: &[u8], to: usize| -> usize {
            let at = align(sec.len(), to);
            sec.resize(at, 0);
            sec.extend_from_slice(bytes);
            SECTION_RVA + at
        };
        for (i, dll) in self.dlls.iter().enumerate() {
            let mut hint_name = vec![0u8, 0u8];
            hint_name.extend_from_slice(format!("function_{i}").as_bytes());
            hint_name.push(0);
            let hint_rva = push(&mut sec, &hint_name, 2);

            let mut thunk = (hint_rva as u64).to_le_bytes().to_vec();
            thunk.extend_from_slice(&0u64.to_le_bytes());
            let ilt = push(&mut sec, &thunk, 8);
            let iat = push(&mut sec, &thunk, 8);

            let mut name = dll.as_bytes().to_vec();
            name.push(0);
            let name_rva = push(&mut sec, &name, 2);

            let d = i * 20;
            put_u32(&mut sec, d, ilt as u32);
            put_u32(&mut sec, d + 12, name_rva as u32);
            put_u32(&mut sec, d + 16, iat as u32);
        }
        push(&mut sec, &self.payload, 8);

        let raw_size = align(sec.len().max(1), 0x200);
        let image_end = RAW_OFF + raw_size;
        let cert_off = align(image_end, 8);
        let total = if self.signed { cert_off + 16 } else { image_end };
        let mut out = vec![0u8; total];

        out[0] = b'M';
        out[1] = b'Z';
        put_u32(&mut out, 0x3c, PE_OFF as u32);
        out[PE_OFF..PE_OFF + 4].copy_from_slice(b"PE\0\0");

        put_u16(&mut out, COFF, 0x8664);
        put_u16(&mut out, COFF + 2, 1);
        put_u16(&mut out, COFF + 16, OPT_SIZE as u16);
        put_u16(&mut out, COFF + 18, 0x2022);

        put_u16(&mut out, OPT, 0x20b);
        out[OPT + 2] = 14;
        put_u32(&mut out, OPT + 8, raw_size as u32);
        put_u32(&mut out, OPT + 20, SECTION_RVA as u32);
        put_u64(&mut out, OPT + 24, 0x1_8000_0000);
        put_u32(&mut out, OPT + 32, 0x1000);
        put_u32(&mut out, OPT + 36, 0x200);
        put_u16(&mut out, OPT + 40, 6);
        put_u16(&mut out, OPT + 48, 6);
        put_u32(&mut out, OPT + 56, (SECTION_RVA + align(sec.len(), 0x1000)) as u32);
        put_u32(&mut out, OPT + 60, RAW_OFF as u32);
        put_u32(&mut out, OPT + 64, self.checksum);
        put_u16(&mut out, OPT + 68, 2);
        put_u16(&mut out, OPT + 70, 0x160);
        put_u64(&mut out, OPT + 72, 0x10_0000);
        put_u64(&mut out, OPT + 80, 0x1000);
        put_u64(&mut out, OPT + 88, 0x10_0000);
        put_u64(&mut out, OPT + 96, 0x1000);
        put_u32(&mut out, OPT + 108, 16);

        let dirs = OPT + 112;
        put_u32(&mut out, dirs + 8, SECTION_RVA as u32);
        put_u32(&mut out, dirs + 12, descriptors as u32);
        if self.signed {
            put_u32(&mut out, dirs + 32, cert_off as u32);
            put_u32(&mut out, dirs + 36, 16);
        }

        name16(&mut out, SECTIONS, ".idata");
        put_u32(&mut out, SECTIONS + 8, sec.len() as u32);
        put_u32(&mut out, SECTIONS + 12, SECTION_RVA as u32);
        put_u32(&mut out, SECTIONS + 16, raw_size as u32);
        put_u32(&mut out, SECTIONS + 20, RAW_OFF as u32);
        put_u32(&mut out, SECTIONS + 36, 0xc000_0040);

        out[RAW_OFF..RAW_OFF + sec.len()].copy_from_slice(&sec);

        if self.signed {
            put_u32(&mut out, cert_off, 16);
            put_u16(&mut out, cert_off + 4, 0x0200);
            put_u16(&mut out, cert_off + 6, 0x0002);
            out[cert_off + 8..].fill(0x5a);
        }
        out
    }
}

/// PE DLL importing from each of `dlls`.
pub fn pe(dlls: &[&str]) -> Vec<u8> {
    PeSpec {
        dlls: strings(dlls),
        payload: b"pe payload".to_vec(),
        ..Default::default()
    }
    .build()
}
