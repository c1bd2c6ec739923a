//! Symbol Resolver: per-image lookup by name (GNU hash preferred, ELF hash
//! next, linear fallback last) and the global resolver that searches
//! published images in load order before falling back to the host's
//! default symbol namespace.

use std::ffi::CString;

use crate::error::LinkResult;
use crate::hash::{elf_hash, gnu_hash};
use crate::image::Image;
use crate::prelude::*;
use crate::region::Region;
use crate::types::Sym;

/// A fixed cap on the number of symbol-table entries the linear fallback
/// scans when no hash table bounds the search (GNU-hash-only images don't
/// expose a symbol count).
const LINEAR_SCAN_CAP: usize = 8192;

fn sym_entry_size(syment: usize) -> usize {
    if syment == 0 {
        std::mem::size_of::<Sym>()
    } else {
        syment
    }
}

fn read_sym(region: &Region, symtab: usize, syment: usize, index: usize) -> LinkResult<Sym> {
    unsafe { region.read_at(symtab + index * sym_entry_size(syment)) }
}

/// Looks up `name` within a single image's symbol table, without consulting
/// any other image or the host namespace. Returns the image-relative
/// `(index, symbol)` pair of the first qualifying definition.
pub fn lookup_in_image(image: &Image, name: &str) -> LinkResult<Option<(usize, Sym)>> {
    let region = image.region();
    let info = &image.info;

    if let Some(gnu) = &info.gnu_hash {
        return lookup_gnu_hash(&region, gnu, info.symtab, info.syment, info.strtab, name);
    }
    if let Some(hash) = &info.hash {
        let found = lookup_elf_hash(&region, hash, info.symtab, info.syment, info.strtab, name)?;
        return Ok(found);
    }
    let bound = LINEAR_SCAN_CAP;
    lookup_linear(&region, info.symtab, info.syment, info.strtab, bound, name)
}

fn qualifies(region: &Region, sym: &Sym, strtab: usize, name: &str) -> LinkResult<bool> {
    if !sym.is_defined() || !sym.is_global_or_weak() {
        return Ok(false);
    }
    let sym_name = region.read_cstr_at(strtab + sym.st_name as usize)?;
    Ok(sym_name == name)
}

fn lookup_gnu_hash(
    region: &Region,
    gnu: &crate::dynamic::GnuHashTable,
    symtab: usize,
    syment: usize,
    strtab: usize,
    name: &str,
) -> LinkResult<Option<(usize, Sym)>> {
    let h1 = gnu_hash(name);

    let word_index = (h1 as usize / 64) % gnu.bloom_size.max(1) as usize;
    let bitmask = (1u64 << (h1 % 64)) | (1u64 << ((h1 >> gnu.bloom_shift) % 64));
    let bloom_word: u64 = unsafe { region.read_at(gnu.bloom_addr + word_index * 8)? };
    if bloom_word & bitmask != bitmask {
        return Ok(None);
    }

    let bucket: u32 =
        unsafe { region.read_at(gnu.buckets_addr + (h1 as usize % gnu.nbuckets.max(1) as usize) * 4)? };
    if bucket == 0 {
        return Ok(None);
    }

    let mut index = bucket as usize;
    loop {
        let chain_word: u32 = unsafe {
            region.read_at(gnu.chain_addr + (index - gnu.symoffset as usize) * 4)?
        };
        let sym = read_sym(region, symtab, syment, index)?;
        if (chain_word ^ h1) >> 1 == 0 && qualifies(region, &sym, strtab, name)? {
            return Ok(Some((index, sym)));
        }
        if chain_word & 1 != 0 {
            return Ok(None);
        }
        index += 1;
    }
}

fn lookup_elf_hash(
    region: &Region,
    hash: &crate::dynamic::ElfHashTable,
    symtab: usize,
    syment: usize,
    strtab: usize,
    name: &str,
) -> LinkResult<Option<(usize, Sym)>> {
    let h = elf_hash(name);
    let mut index: u32 =
        unsafe { region.read_at(hash.buckets_addr + (h as usize % hash.nbucket.max(1) as usize) * 4)? };

    while index != 0 {
        let sym = read_sym(region, symtab, syment, index as usize)?;
        if qualifies(region, &sym, strtab, name)? {
            return Ok(Some((index as usize, sym)));
        }
        index = unsafe { region.read_at(hash.chain_addr + index as usize * 4)? };
    }
    Ok(None)
}

fn lookup_linear(
    region: &Region,
    symtab: usize,
    syment: usize,
    strtab: usize,
    bound: usize,
    name: &str,
) -> LinkResult<Option<(usize, Sym)>> {
    if symtab == 0 {
        return Ok(None);
    }
    for index in 1..bound {
        let sym = match read_sym(region, symtab, syment, index) {
            Ok(sym) => sym,
            Err(_) => break, // ran off the end of the mapped region
        };
        if sym.st_name == 0 {
            continue;
        }
        if qualifies(region, &sym, strtab, name)? {
            return Ok(Some((index, sym)));
        }
    }
    Ok(None)
}

/// Queries the host's default symbol namespace (`dlsym(RTLD_DEFAULT, ...)`),
/// so images can call into the C runtime already linked into this process.
pub fn lookup_host(name: &str) -> Option<u64> {
    if std::env::var("MINILD_DISABLE_HOST_FALLBACK").as_deref() == Ok("1") {
        return None;
    }
    let cname = CString::new(name).ok()?;
    let addr = unsafe { libc::dlsym(libc::RTLD_DEFAULT, cname.as_ptr()) };
    if addr.is_null() {
        debug!("host fallback miss for {name:?}");
        None
    } else {
        debug!("host fallback hit for {name:?} -> {:#x}", addr as usize);
        Some(addr as u64)
    }
}

/// Searches every published image (newest first, matching load order) for
/// `name`, then falls back to the host namespace.
pub fn lookup_global(images: &[Image], name: &str) -> LinkResult<Option<u64>> {
    for image in images {
        if let Some((_, sym)) = lookup_in_image(image, name)? {
            return Ok(Some(image.load_bias + sym.st_value));
        }
    }
    Ok(lookup_host(name))
}
