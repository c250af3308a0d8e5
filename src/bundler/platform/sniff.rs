//! Magic-number detection.

use super::BinaryFormat;

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";
const MH_MAGIC: u32 = 0xfeed_face;
const MH_MAGIC_64: u32 = 0xfeed_facf;
const MH_CIGAM: u32 = 0xcefa_edfe;
const MH_CIGAM_64: u32 = 0xcffa_edfe;
const FAT_MAGIC: u32 = 0xcafe_babe;
const FAT_MAGIC_64: u32 = 0xcafe_babf;

/// Universal binaries rarely carry more than a handful of slices; Java class
/// files share the fat magic but put their version number here.
const MAX_FAT_ARCHES: u32 = 30;

pub(super) fn has_magic(prefix: &[u8]) -> bool {
    if prefix.starts_with(ELF_MAGIC) || prefix.starts_with(b"MZ") {
        return true;
    }
    match prefix.get(..4) {
        Some(head) => {
            let le = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
            let be = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
            matches!(le, MH_MAGIC | MH_MAGIC_64 | MH_CIGAM | MH_CIGAM_64)
                || matches!(be, FAT_MAGIC | FAT_MAGIC_64)
        }
        None => false,
    }
}

pub(super) fn sniff(bytes: &[u8]) -> Option<BinaryFormat> {
    if bytes.starts_with(ELF_MAGIC) {
        return Some(BinaryFormat::Elf);
    }
    if is_pe(bytes) {
        return Some(BinaryFormat::Pe);
    }
    if is_macho(bytes) {
        return Some(BinaryFormat::MachO);
    }
    None
}

fn is_pe(bytes: &[u8]) -> bool {
    if !bytes.starts_with(b"MZ") || bytes.len() < 0x40 {
        return false;
    }
    let e_lfanew = u32::from_le_bytes([bytes[0x3c], bytes[0x3d], bytes[0x3e], bytes[0x3f]]) as usize;
    bytes.get(e_lfanew..e_lfanew + 4) == Some(b"PE\0\0".as_slice())
}

fn is_macho(bytes: &[u8]) -> bool {
    let Some(head) = bytes.get(..8) else {
        return false;
    };
    let le = u32::from_le_bytes([head[0], head[1], head[2], head[3]]);
    if matches!(le, MH_MAGIC | MH_MAGIC_64 | MH_CIGAM | MH_CIGAM_64) {
        return true;
    }
    let be = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
    if matches!(be, FAT_MAGIC | FAT_MAGIC_64) {
        let nfat = u32::from_be_bytes([head[4], head[5], head[6], head[7]]);
        return (1..=MAX_FAT_ARCHES).contains(&nfat);
    }
    false
}
