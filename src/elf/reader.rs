use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::Path;

use memmap2::Mmap;

use crate::consts::{ELFCLASS64, ELFDATA2LSB, ELF_MAGIC, EM_X86_64, ET_DYN, ET_EXEC, PT_DYNAMIC, PT_PHDR};
use crate::error::{LinkError, LinkResult};
use crate::prelude::*;
use crate::region::Region;
use crate::types::{Ehdr, Phdr};

/// A read-only, memory-mapped view of an ELF64 file on disk, validated
/// against the subset of the format this loader supports.
pub struct ImageFile {
    file: File,
    mmap: Mmap,
    header: Ehdr,
}

impl ImageFile {
    /// Opens `path` read-only, maps the whole file, and validates the ELF
    /// header. Fails with [`ErrorKind::BadFormat`] on any mismatch.
    pub fn open(path: &Path) -> LinkResult<Self> {
        let file = File::open(path)
            .map_err(|e| LinkError::map_failure(format!("open {}: {e}", path.display())))?;
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| LinkError::map_failure(format!("mmap {}: {e}", path.display())))?;

        let header = Self::validate_header(&mmap)?;
        debug!(
            "{}: e_type={} e_machine={} e_phnum={} e_shnum={}",
            path.display(),
            header.e_type,
            header.e_machine,
            header.e_phnum,
            header.e_shnum
        );

        Ok(Self { file, mmap, header })
    }

    /// Raw fd of the backing file, used by the segment mapper to overlay
    /// file-backed pages into the reserved region.
    pub fn raw_fd(&self) -> i32 {
        self.file.as_raw_fd()
    }

    fn validate_header(data: &[u8]) -> LinkResult<Ehdr> {
        if data.len() < std::mem::size_of::<Ehdr>() {
            return Err(LinkError::bad_format("file too small for an ELF header"));
        }
        if data[0..4] != ELF_MAGIC {
            return Err(LinkError::bad_format("missing ELF magic"));
        }
        if data[4] != ELFCLASS64 {
            return Err(LinkError::bad_format("not a 64-bit object"));
        }
        if data[5] != ELFDATA2LSB {
            return Err(LinkError::bad_format("not little-endian"));
        }

        let header = unsafe { std::ptr::read_unaligned(data.as_ptr() as *const Ehdr) };

        if header.e_type != ET_DYN && header.e_type != ET_EXEC {
            return Err(LinkError::bad_format(format!(
                "unsupported e_type {}",
                header.e_type
            )));
        }
        if header.e_machine != EM_X86_64 {
            return Err(LinkError::bad_format(format!(
                "unsupported e_machine {}",
                header.e_machine
            )));
        }

        Ok(header)
    }

    pub fn header(&self) -> &Ehdr {
        &self.header
    }

    fn file_region(&self) -> Region {
        Region::new(self.mmap.as_ptr() as usize, self.mmap.len())
    }

    /// Returns the program-header table, parsed from the file view.
    pub fn program_headers(&self) -> LinkResult<Vec<Phdr>> {
        let region = self.file_region();
        let base = self.mmap.as_ptr() as usize + self.header.e_phoff as usize;
        let mut phdrs = Vec::with_capacity(self.header.e_phnum as usize);
        for i in 0..self.header.e_phnum as usize {
            let addr = base + i * std::mem::size_of::<Phdr>();
            let phdr: Phdr = unsafe { region.read_at(addr)? };
            phdrs.push(phdr);
        }
        Ok(phdrs)
    }

    /// Finds the `PT_DYNAMIC` program header, if present.
    pub fn dynamic_phdr(&self) -> LinkResult<Option<Phdr>> {
        Ok(self
            .program_headers()?
            .into_iter()
            .find(|p| p.p_type == PT_DYNAMIC))
    }

    /// Finds the `PT_PHDR` program header, if present.
    pub fn phdr_self_phdr(&self) -> LinkResult<Option<Phdr>> {
        Ok(self
            .program_headers()?
            .into_iter()
            .find(|p| p.p_type == PT_PHDR))
    }

    /// Raw bytes of the backing file, for [`object`]-based section-header
    /// introspection (diagnostic use only; see [`super::sections`]).
    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }
}
