//! ELF Image Reader: opens and validates an ELF64/x86_64 shared object or
//! executable, and exposes typed, read-only views of its program headers,
//! section headers, and section-name string table. Pure parse — nothing
//! here touches the process address space beyond the read-only file
//! mapping itself.

mod reader;
mod sections;

pub use reader::ImageFile;
pub use sections::SectionSummary;
