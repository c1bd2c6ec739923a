//! Segment Mapper: reserves a single contiguous, inaccessible anonymous
//! region sized to the image's total load span, then overlays each
//! loadable segment into it at its declared offset with the segment's own
//! permissions, zero-extending the tail into BSS.

use std::ptr;

use crate::consts::{PAGE_SIZE, PF_R, PF_W, PF_X, PT_LOAD, page_ceil, page_floor};
use crate::error::{LinkError, LinkResult};
use crate::prelude::*;
use crate::types::Phdr;

/// An anonymous region reserved for one image's segments. Owns the
/// region's lifetime: dropping it unmaps `[base, base + size)` in full.
pub struct Mapping {
    base: usize,
    size: usize,
}

impl Mapping {
    pub fn base(&self) -> usize {
        self.base
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Computes the total load span of `phdrs`' `PT_LOAD` entries, reserves
    /// an inaccessible anonymous mapping of that span, overlays each
    /// loadable segment from `fd` with its own permissions, and returns the
    /// mapping together with the resulting load bias.
    pub fn build(fd: i32, phdrs: &[Phdr]) -> LinkResult<(Self, u64)> {
        let loads: Vec<&Phdr> = phdrs.iter().filter(|p| p.p_type == PT_LOAD).collect();
        if loads.is_empty() {
            return Err(LinkError::bad_format("no PT_LOAD segments"));
        }

        let min_vaddr = page_floor(loads.iter().map(|p| p.p_vaddr).min().unwrap());
        let max_vaddr = loads
            .iter()
            .map(|p| page_ceil(p.p_vaddr + p.p_memsz))
            .max()
            .unwrap();
        let load_size = max_vaddr - min_vaddr;
        if load_size == 0 {
            return Err(LinkError::bad_format("zero-size load span"));
        }

        let mapping = Self::reserve(load_size as usize)?;
        let load_bias = mapping.base as u64 - min_vaddr;
        debug!(
            "reserved {:#x}..{:#x} (load_bias={:#x})",
            mapping.base,
            mapping.base + mapping.size,
            load_bias
        );

        for phdr in &loads {
            mapping.overlay_segment(fd, phdr, load_bias)?;
        }

        Ok((mapping, load_bias))
    }

    fn reserve(size: usize) -> LinkResult<Self> {
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(LinkError::map_failure(format!(
                "mmap(PROT_NONE, {size}): {}",
                std::io::Error::last_os_error()
            )));
        }
        Ok(Self {
            base: ptr as usize,
            size,
        })
    }

    fn overlay_segment(&self, fd: i32, phdr: &Phdr, load_bias: u64) -> LinkResult<()> {
        let prot = segment_prot(phdr.p_flags);
        let seg_start = load_bias + phdr.p_vaddr;
        let seg_file_end = seg_start + phdr.p_filesz;
        let seg_end = seg_start + phdr.p_memsz;

        debug!(
            "segment flags={:#x} file=[{:#x},{:#x}) mem=[{:#x},{:#x})",
            phdr.p_flags, phdr.p_offset, phdr.p_offset + phdr.p_filesz, seg_start, seg_end
        );

        if phdr.p_filesz > 0 {
            let map_addr = page_floor(seg_start);
            let map_offset = page_floor(phdr.p_offset);
            // The in-file span covered: from the page-aligned start up to the
            // (non-page-aligned) end of the file-backed portion.
            let map_len = seg_file_end - map_addr;

            let res = unsafe {
                libc::mmap(
                    map_addr as *mut libc::c_void,
                    map_len as usize,
                    prot,
                    libc::MAP_PRIVATE | libc::MAP_FIXED,
                    fd,
                    map_offset as i64,
                )
            };
            if res == libc::MAP_FAILED {
                return Err(LinkError::map_failure(format!(
                    "mmap(MAP_FIXED) segment overlay at {map_addr:#x}: {}",
                    std::io::Error::last_os_error()
                )));
            }
        }

        if phdr.p_memsz > phdr.p_filesz {
            self.zero_bss(seg_file_end, seg_end, prot)?;
        }

        Ok(())
    }

    /// Zeroes the tail of the file-backed page beyond `file_end`, then maps
    /// fresh anonymous zero pages for the remainder of the segment up to
    /// `mem_end`.
    fn zero_bss(&self, file_end: u64, mem_end: u64, prot: libc::c_int) -> LinkResult<()> {
        let tail_page_end = page_ceil(file_end).min(mem_end);
        let tail_len = (tail_page_end - file_end) as usize;

        if tail_len > 0 {
            let needs_temp_write = prot & libc::PROT_WRITE == 0;
            if needs_temp_write {
                self.mprotect_page(file_end, libc::PROT_WRITE | prot)?;
            }
            unsafe {
                ptr::write_bytes(file_end as *mut u8, 0, tail_len);
            }
            if needs_temp_write {
                self.mprotect_page(file_end, prot)?;
            }
        }

        let anon_start = page_ceil(file_end);
        if anon_start < mem_end {
            let anon_len = mem_end - anon_start;
            let res = unsafe {
                libc::mmap(
                    anon_start as *mut libc::c_void,
                    anon_len as usize,
                    prot,
                    libc::MAP_PRIVATE | libc::MAP_FIXED | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };
            if res == libc::MAP_FAILED {
                return Err(LinkError::map_failure(format!(
                    "mmap(MAP_FIXED|MAP_ANONYMOUS) bss at {anon_start:#x}: {}",
                    std::io::Error::last_os_error()
                )));
            }
        }

        Ok(())
    }

    fn mprotect_page(&self, addr: u64, prot: libc::c_int) -> LinkResult<()> {
        let page = page_floor(addr);
        let ret = unsafe { libc::mprotect(page as *mut libc::c_void, PAGE_SIZE, prot) };
        if ret != 0 {
            return Err(LinkError::map_failure(format!(
                "mprotect({page:#x}): {}",
                std::io::Error::last_os_error()
            )));
        }
        Ok(())
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        let ret = unsafe { libc::munmap(self.base as *mut libc::c_void, self.size) };
        if ret != 0 {
            warn!(
                "munmap({:#x}, {:#x}) failed: {}",
                self.base,
                self.size,
                std::io::Error::last_os_error()
            );
        }
    }
}

fn segment_prot(flags: u32) -> libc::c_int {
    let mut prot = 0;
    if flags & PF_R != 0 {
        prot |= libc::PROT_READ;
    }
    if flags & PF_W != 0 {
        prot |= libc::PROT_WRITE;
    }
    if flags & PF_X != 0 {
        prot |= libc::PROT_EXEC;
    }
    prot
}
