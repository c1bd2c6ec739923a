//! Diagnostic-only section-header introspection, built on the `object`
//! crate for read-only ELF/Mach-O parsing over a mapped file. Nothing here
//! feeds segment mapping, dynamic-section interpretation, or relocation —
//! those read the raw structures directly (see [`crate::types`]) since
//! they need load-bias-adjusted, bounds-checked offsets into a live
//! mapping rather than `object`'s file-relative view.

use object::{Object, ObjectSection};

use super::ImageFile;
use crate::error::LinkResult;

/// One section header's name, runtime address, and size, for printing.
#[derive(Debug, Clone)]
pub struct SectionSummary {
    pub name: String,
    pub address: u64,
    pub size: u64,
}

impl ImageFile {
    /// Returns a name/address/size summary of every section header, for the
    /// CLI's `inspect` subcommand and for debug logging. Never used by the
    /// loader itself.
    pub fn section_summaries(&self) -> LinkResult<Vec<SectionSummary>> {
        let file = object::File::parse(self.bytes())
            .map_err(|e| crate::error::LinkError::bad_format(format!("object::File::parse: {e}")))?;

        Ok(file
            .sections()
            .map(|section| SectionSummary {
                name: section.name().unwrap_or("<invalid>").to_string(),
                address: section.address(),
                size: section.size(),
            })
            .collect())
    }
}
