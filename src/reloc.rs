//! Relocator: applies `.rela.dyn` and `.rela.plt` entries for the x86_64
//! relocation types this loader supports.

use crate::error::{LinkError, LinkResult};
use crate::image::Image;
use crate::prelude::*;
use crate::resolve::{lookup_global, lookup_host};
use crate::types::{Rela, Sym};

pub mod r_x86_64 {
    pub use crate::consts::r_x86_64::*;
}

/// Resolves the symbol a relocation entry references (by index into the
/// image's own symbol table). A defined entry resolves to its own value;
/// an undefined one is resolved against the rest of the loaded world, then
/// the host.
fn resolve_symbol(image: &Image, others: &[Image], sym_index: u32) -> LinkResult<Option<u64>> {
    if sym_index == 0 {
        return Ok(None);
    }
    let region = image.region();
    let syment = if image.info.syment == 0 {
        std::mem::size_of::<Sym>()
    } else {
        image.info.syment
    };
    let sym: Sym = unsafe { region.read_at(image.info.symtab + sym_index as usize * syment)? };
    let name = region.read_cstr_at(image.info.strtab + sym.st_name as usize)?;

    if sym.is_defined() {
        return Ok(Some(image.load_bias + sym.st_value));
    }
    if let Some(addr) = lookup_global(others, &name)? {
        return Ok(Some(addr));
    }
    Ok(lookup_host(&name))
}

/// Applies one `Rela` entry against `image`'s live mapping.
fn apply_one(image: &Image, others: &[Image], rela: &Rela, strict_undefined: bool) -> LinkResult<()> {
    let target = image.load_bias + rela.r_offset;
    let region = image.region();

    match rela.r_type() {
        r_x86_64::NONE => {}
        r_x86_64::RELATIVE => {
            let value = (image.load_bias as i64 + rela.r_addend) as u64;
            unsafe { region.write_at(target as usize, value)? };
        }
        r_x86_64::R64 | r_x86_64::GLOB_DAT | r_x86_64::JUMP_SLOT => {
            let resolved = resolve_symbol(image, others, rela.r_sym())?;
            let value = match resolved {
                Some(addr) => (addr as i64 + rela.r_addend) as u64,
                None => {
                    if strict_undefined {
                        return Err(LinkError::not_found(format!(
                            "unresolved symbol for relocation at {target:#x}"
                        )));
                    }
                    warn!("unresolved weak/undefined symbol for relocation at {target:#x}; writing 0");
                    0
                }
            };
            unsafe { region.write_at(target as usize, value)? };
        }
        r_x86_64::COPY => {
            let resolved = resolve_symbol(image, others, rela.r_sym())?;
            match resolved {
                Some(src) => {
                    // COPY relocations duplicate the referenced symbol's data
                    // into this image's BSS-backed slot; size comes from the
                    // symbol we just resolved.
                    let syment = if image.info.syment == 0 {
                        std::mem::size_of::<Sym>()
                    } else {
                        image.info.syment
                    };
                    let sym: Sym = unsafe {
                        region.read_at(
                            image.info.symtab + rela.r_sym() as usize * syment,
                        )?
                    };
                    let len = sym.st_size as usize;
                    if len > 0 {
                        // `src` may live in a different image's mapping (or
                        // the host's address space via the dlsym fallback),
                        // so it can't be bounds-checked against this
                        // image's own `Region`; the resolver already
                        // guarantees it names a live, readable symbol.
                        unsafe {
                            let src_slice = std::slice::from_raw_parts(src as *const u8, len);
                            let dst_slice = std::slice::from_raw_parts_mut(target as *mut u8, len);
                            dst_slice.copy_from_slice(src_slice);
                        }
                    }
                }
                None if strict_undefined => {
                    return Err(LinkError::not_found(format!(
                        "unresolved COPY relocation source at {target:#x}"
                    )));
                }
                None => warn!("unresolved COPY relocation source at {target:#x}; leaving zeroed"),
            }
        }
        other => {
            warn!("unsupported relocation type {other} at {target:#x}; skipping");
        }
    }
    Ok(())
}

fn apply_table(
    image: &Image,
    others: &[Image],
    base: usize,
    count: usize,
    strict_undefined: bool,
) -> LinkResult<()> {
    if base == 0 || count == 0 {
        return Ok(());
    }
    let region = image.region();
    for i in 0..count {
        let rela: Rela = unsafe { region.read_at(base + i * std::mem::size_of::<Rela>())? };
        apply_one(image, others, &rela, strict_undefined)?;
    }
    Ok(())
}

/// Applies all of an image's `.rela.dyn` entries followed by its
/// `.rela.plt` entries, in table order, against the currently-published
/// image list (used to resolve symbols this image itself leaves undefined).
pub fn apply_all(image: &Image, others: &[Image], strict_undefined: bool) -> LinkResult<()> {
    apply_table(
        image,
        others,
        image.info.rela,
        image.info.rela_count,
        strict_undefined,
    )?;
    apply_table(
        image,
        others,
        image.info.plt_rela,
        image.info.plt_rela_count,
        strict_undefined,
    )
}
