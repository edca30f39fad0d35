//! ELF wrapper inspection.
//!
//! Every bundle is an ELF runtime with a filesystem image appended. The
//! header gives the machine type, the end of the section header table
//! gives the image offset, and an optional `.upd_info` section carries
//! the embedded update hint. Only small windows of the file are read;
//! bundles routinely run to gigabytes.

use crate::error::ExtractError;
use goblin::container::Ctx;
use goblin::elf::{header, Elf, SectionHeader};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// Update hint section name.
const UPDATE_INFO_SECTION: &str = ".upd_info";

/// Update hints longer than this are truncated.
const UPDATE_INFO_MAX: usize = 4096;

/// Bytes to read for the ELF header (the 64-bit header size; the 32-bit
/// header is shorter and parses out of the same window).
const EHDR_WINDOW: usize = 64;

/// What the ELF wrapper tells us about a bundle.
#[derive(Debug, Clone)]
pub struct ElfInfo {
    /// Short architecture name, when `e_machine` is recognized
    pub arch: Option<&'static str>,
    /// Byte offset where the appended filesystem image starts
    pub image_offset: u64,
    /// Contents of the `.upd_info` section, trimmed
    pub update_hint: Option<String>,
}

/// Inspect the ELF wrapper of `path`.
pub fn inspect(path: &Path) -> Result<ElfInfo, ExtractError> {
    let mut file = File::open(path).map_err(|e| ExtractError::BadElf {
        reason: format!("{}: {e}", path.display()),
    })?;

    let mut head = [0u8; EHDR_WINDOW];
    file.read_exact(&mut head).map_err(|e| ExtractError::BadElf {
        reason: format!("short read of ELF header: {e}"),
    })?;
    let hdr = Elf::parse_header(&head).map_err(|e| ExtractError::BadElf {
        reason: e.to_string(),
    })?;

    let arch = machine_name(hdr.e_machine);
    let image_offset = hdr.e_shoff + u64::from(hdr.e_shnum) * u64::from(hdr.e_shentsize);

    let update_hint = read_update_hint(&mut file, &hdr).unwrap_or_else(|e| {
        log::debug!("no update hint in {}: {e}", path.display());
        None
    });

    Ok(ElfInfo {
        arch,
        image_offset,
        update_hint,
    })
}

fn machine_name(e_machine: u16) -> Option<&'static str> {
    match e_machine {
        header::EM_X86_64 => Some("x86_64"),
        header::EM_AARCH64 => Some("aarch64"),
        header::EM_ARM => Some("armv7l"),
        header::EM_386 => Some("i686"),
        _ => None,
    }
}

fn read_update_hint(
    file: &mut File,
    hdr: &header::Header,
) -> Result<Option<String>, ExtractError> {
    if hdr.e_shoff == 0 || hdr.e_shnum == 0 {
        return Ok(None);
    }
    let ctx = Ctx::new(
        hdr.container().map_err(bad_elf)?,
        hdr.endianness().map_err(bad_elf)?,
    );

    let table_len = usize::from(hdr.e_shnum) * usize::from(hdr.e_shentsize);
    let table = read_window(file, hdr.e_shoff, table_len)?;
    let sections = SectionHeader::parse(&table, 0, usize::from(hdr.e_shnum), ctx)
        .map_err(bad_elf)?;

    let strtab_hdr = sections
        .get(usize::from(hdr.e_shstrndx))
        .ok_or_else(|| ExtractError::BadElf {
            reason: "section name table index out of range".to_string(),
        })?;
    // Corrupt images can claim absurd table sizes; a megabyte is far
    // beyond any real runtime's section names.
    let strtab_len = (strtab_hdr.sh_size as usize).min(1 << 20);
    let strtab = read_window(file, strtab_hdr.sh_offset, strtab_len)?;

    for section in &sections {
        if section_name(&strtab, section.sh_name) != Some(UPDATE_INFO_SECTION) {
            continue;
        }
        let len = (section.sh_size as usize).min(UPDATE_INFO_MAX);
        let raw = read_window(file, section.sh_offset, len)?;
        let terminated = match raw.iter().position(|&b| b == 0) {
            Some(nul) => &raw[..nul],
            None => &raw[..],
        };
        let hint = String::from_utf8_lossy(terminated).trim().to_string();
        return Ok(if hint.is_empty() { None } else { Some(hint) });
    }
    Ok(None)
}

fn section_name(strtab: &[u8], offset: usize) -> Option<&str> {
    let tail = strtab.get(offset..)?;
    let end = tail.iter().position(|&b| b == 0)?;
    std::str::from_utf8(&tail[..end]).ok()
}

fn read_window(file: &mut File, offset: u64, len: usize) -> Result<Vec<u8>, ExtractError> {
    file.seek(SeekFrom::Start(offset)).map_err(|e| ExtractError::BadElf {
        reason: format!("seek to {offset}: {e}"),
    })?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf).map_err(|e| ExtractError::BadElf {
        reason: format!("read {len} bytes at {offset}: {e}"),
    })?;
    Ok(buf)
}

fn bad_elf(e: goblin::error::Error) -> ExtractError {
    ExtractError::BadElf {
        reason: e.to_string(),
    }
}
