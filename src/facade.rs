//! Public Facade: the four-call surface (`open`/`lookup`/`close`/
//! `last_error`) that composes the rest of the engine — ELF reading,
//! segment mapping, dynamic interpretation, relocation, and lifecycle
//! management — into a single open/resident/teardown state machine per
//! image.

use std::path::Path;

use crate::context::{HANDLE_DEFAULT, HANDLE_NEXT, with_context};
use crate::dynamic::DynamicInfo;
use crate::elf::ImageFile;
use crate::error::{LinkError, LinkResult};
use crate::image::Image;
use crate::lifecycle;
use crate::map::Mapping;
use crate::prelude::*;
use crate::region::Region;
use crate::reloc;
use crate::resolve;

fn record<T>(result: LinkResult<T>) -> LinkResult<T> {
    with_context(|ctx| match &result {
        Ok(_) => ctx.clear_last_error(),
        Err(e) => ctx.set_last_error(e),
    });
    result
}

fn image_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn open_inner(path: &Path) -> LinkResult<usize> {
    let file = ImageFile::open(path)?;
    let phdrs = file.program_headers()?;
    let dynamic_phdr = file
        .dynamic_phdr()?
        .ok_or_else(|| LinkError::bad_format("no PT_DYNAMIC segment"))?;

    let (mapping, load_bias) = Mapping::build(file.raw_fd(), &phdrs)?;
    let dynamic_addr = (load_bias + dynamic_phdr.p_vaddr) as usize;
    let region = Region::new(mapping.base(), mapping.size());
    let info = DynamicInfo::parse(&region, dynamic_addr, load_bias)?;

    let (phdr_addr, phnum) = match file.phdr_self_phdr()? {
        Some(p) => ((load_bias + p.p_vaddr) as usize, file.header().e_phnum as usize),
        None => (
            (load_bias + file.header().e_phoff) as usize,
            file.header().e_phnum as usize,
        ),
    };

    let image = Image::new(
        image_name(path),
        mapping,
        load_bias,
        phdr_addr,
        phnum,
        dynamic_addr,
        info,
    );

    let strict_undefined = with_context(|ctx| ctx.strict_undefined());
    with_context(|ctx| ctx.with_images(|others| reloc::apply_all(&image, others, strict_undefined)))?;

    let handle = with_context(|ctx| ctx.publish(image));
    info!("published as handle {handle:#x}");
    with_context(|ctx| {
        let image = ctx.find(handle).expect("just published");
        lifecycle::run_init(&image);
    });
    Ok(handle)
}

/// Opens and maps `path`, applies its relocations against the currently
/// published world, runs its constructors, and publishes it. Returns an
/// opaque handle for use with [`lookup`] and [`close`].
pub fn open(path: &Path) -> LinkResult<usize> {
    record(open_inner(path))
}

fn lookup_inner(handle: usize, name: &str) -> LinkResult<u64> {
    if handle == HANDLE_NEXT {
        return Err(LinkError::not_supported(
            "the \"next\" search-order sentinel is not implemented",
        ));
    }
    if handle == HANDLE_DEFAULT {
        let found = with_context(|ctx| ctx.with_images(|images| resolve::lookup_global(images, name)))?;
        return found.ok_or_else(|| LinkError::not_found(format!("symbol {name:?} not found")));
    }

    with_context(|ctx| {
        let image = ctx
            .find(handle)
            .ok_or_else(|| LinkError::not_found(format!("unknown handle {handle:#x}")))?;
        resolve::lookup_in_image(&image, name)?
            .map(|(_, sym)| image.load_bias + sym.st_value)
            .ok_or_else(|| LinkError::not_found(format!("symbol {name:?} not found in {}", image.name)))
    })
}

/// Resolves `name` against `handle` (or, with [`HANDLE_DEFAULT`], against
/// every published image followed by the host's own namespace).
pub fn lookup(handle: usize, name: &str) -> LinkResult<u64> {
    record(lookup_inner(handle, name))
}

fn close_inner(handle: usize) -> LinkResult<()> {
    with_context(|ctx| {
        ctx.release(handle)
            .ok_or_else(|| LinkError::not_found(format!("unknown handle {handle:#x}")))
    })
}

/// Drops one reference on `handle`; tears the image down (destructors, then
/// unmap) once its reference count reaches zero.
pub fn close(handle: usize) -> LinkResult<()> {
    record(close_inner(handle))
}

/// Returns the message from the most recent failing call on this thread, or
/// `None` if the last call (or no call yet) succeeded.
pub fn last_error() -> Option<String> {
    with_context(|ctx| ctx.last_error())
}
