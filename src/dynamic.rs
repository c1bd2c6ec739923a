//! Dynamic-Section Interpreter: walks an image's `PT_DYNAMIC` array (once
//! mapped) and records load-bias-adjusted pointers to the symbol/string
//! tables, hash tables, relocation tables, and init/fini hooks.

use crate::consts::dt;
use crate::error::{LinkError, LinkResult};
use crate::prelude::*;
use crate::region::Region;
use crate::types::Dyn;

/// Header of an ELF-style (`DT_HASH`) hash table, plus its bucket/chain
/// array addresses.
#[derive(Debug, Clone, Copy)]
pub struct ElfHashTable {
    pub nbucket: u32,
    pub nchain: u32,
    pub buckets_addr: usize,
    pub chain_addr: usize,
}

/// Header of a GNU-style (`DT_GNU_HASH`) hash table, plus its bloom/bucket/
/// chain array addresses.
#[derive(Debug, Clone, Copy)]
pub struct GnuHashTable {
    pub nbuckets: u32,
    pub symoffset: u32,
    pub bloom_size: u32,
    pub bloom_shift: u32,
    pub bloom_addr: usize,
    pub buckets_addr: usize,
    pub chain_addr: usize,
}

/// Everything the loader extracted from an image's dynamic array, with
/// every pointer already adjusted by `load_bias`.
#[derive(Debug, Clone, Default)]
pub struct DynamicInfo {
    pub symtab: usize,
    pub strtab: usize,
    pub strtab_size: usize,
    pub syment: usize,
    pub hash: Option<ElfHashTable>,
    pub gnu_hash: Option<GnuHashTable>,
    pub rela: usize,
    pub rela_count: usize,
    pub plt_rela: usize,
    pub plt_rela_count: usize,
    pub init_func: Option<u64>,
    pub fini_func: Option<u64>,
    pub init_array: usize,
    pub init_array_count: usize,
    pub fini_array: usize,
    pub fini_array_count: usize,
}

const RELA_ENTSIZE: u64 = std::mem::size_of::<crate::types::Rela>() as u64;

impl DynamicInfo {
    /// Walks the dynamic array at `dynamic_addr` (already load-bias
    /// adjusted) until the terminating `DT_NULL` tag, recording the tags
    /// this loader consumes.
    pub fn parse(region: &Region, dynamic_addr: usize, load_bias: u64) -> LinkResult<Self> {
        let mut info = DynamicInfo::default();
        let mut relasz: u64 = 0;
        let mut pltrelsz: u64 = 0;
        let mut init_array_sz: u64 = 0;
        let mut fini_array_sz: u64 = 0;
        let mut hash_addr: Option<u64> = None;
        let mut gnu_hash_addr: Option<u64> = None;

        let entsize = std::mem::size_of::<Dyn>();
        let mut i = 0usize;
        loop {
            let entry: Dyn = unsafe { region.read_at(dynamic_addr + i * entsize)? };
            if entry.d_tag == dt::NULL {
                break;
            }

            match entry.d_tag {
                dt::SYMTAB => info.symtab = (load_bias + entry.d_val) as usize,
                dt::STRTAB => info.strtab = (load_bias + entry.d_val) as usize,
                dt::STRSZ => info.strtab_size = entry.d_val as usize,
                dt::SYMENT => info.syment = entry.d_val as usize,
                dt::HASH => hash_addr = Some(load_bias + entry.d_val),
                dt::GNU_HASH => gnu_hash_addr = Some(load_bias + entry.d_val),
                dt::RELA => info.rela = (load_bias + entry.d_val) as usize,
                dt::RELASZ => relasz = entry.d_val,
                dt::JMPREL => info.plt_rela = (load_bias + entry.d_val) as usize,
                dt::PLTRELSZ => pltrelsz = entry.d_val,
                dt::INIT => info.init_func = Some(load_bias + entry.d_val),
                dt::FINI => info.fini_func = Some(load_bias + entry.d_val),
                dt::INIT_ARRAY => info.init_array = (load_bias + entry.d_val) as usize,
                dt::INIT_ARRAYSZ => init_array_sz = entry.d_val,
                dt::FINI_ARRAY => info.fini_array = (load_bias + entry.d_val) as usize,
                dt::FINI_ARRAYSZ => fini_array_sz = entry.d_val,
                other => debug!("ignoring unrecognized dynamic tag {other:#x}"),
            }

            i += 1;
        }

        info.rela_count = (relasz / RELA_ENTSIZE.max(1)) as usize;
        info.plt_rela_count = (pltrelsz / RELA_ENTSIZE.max(1)) as usize;
        info.init_array_count = (init_array_sz / 8) as usize;
        info.fini_array_count = (fini_array_sz / 8) as usize;

        if let Some(addr) = hash_addr {
            info.hash = Some(Self::parse_elf_hash(region, addr as usize)?);
        }
        if let Some(addr) = gnu_hash_addr {
            info.gnu_hash = Some(Self::parse_gnu_hash(region, addr as usize)?);
        }

        let needs_symbols = info.rela_count > 0 || info.plt_rela_count > 0;
        if needs_symbols && (info.symtab == 0 || info.strtab == 0) {
            return Err(LinkError::bad_format(
                "relocations present but no symbol/string table",
            ));
        }

        Ok(info)
    }

    fn parse_elf_hash(region: &Region, addr: usize) -> LinkResult<ElfHashTable> {
        let nbucket: u32 = unsafe { region.read_at(addr)? };
        let nchain: u32 = unsafe { region.read_at(addr + 4)? };
        Ok(ElfHashTable {
            nbucket,
            nchain,
            buckets_addr: addr + 8,
            chain_addr: addr + 8 + nbucket as usize * 4,
        })
    }

    fn parse_gnu_hash(region: &Region, addr: usize) -> LinkResult<GnuHashTable> {
        let nbuckets: u32 = unsafe { region.read_at(addr)? };
        let symoffset: u32 = unsafe { region.read_at(addr + 4)? };
        let bloom_size: u32 = unsafe { region.read_at(addr + 8)? };
        let bloom_shift: u32 = unsafe { region.read_at(addr + 12)? };
        let bloom_addr = addr + 16;
        let buckets_addr = bloom_addr + bloom_size as usize * 8;
        let chain_addr = buckets_addr + nbuckets as usize * 4;
        Ok(GnuHashTable {
            nbuckets,
            symoffset,
            bloom_size,
            bloom_shift,
            bloom_addr,
            buckets_addr,
            chain_addr,
        })
    }
}
