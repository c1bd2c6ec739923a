//! The Image Record: everything the loader tracks about one mapped shared
//! object for the lifetime of its handle.

use std::cell::Cell;

use crate::dynamic::DynamicInfo;
use crate::map::Mapping;
use crate::region::Region;

/// A single mapped shared object, published once its relocations have been
/// applied and constructors have run.
///
/// The set of live images forms a namespace rather than a literal linked
/// list: this loader keeps them in a `Vec` owned by the thread-local
/// [`crate::context::Context`], ordered newest-first so lookups naturally
/// walk images in load order.
pub struct Image {
    pub name: String,
    pub mapping: Mapping,
    pub load_bias: u64,
    pub phdr: usize,
    pub phnum: usize,
    pub dynamic: usize,
    pub info: DynamicInfo,
    ref_count: Cell<u32>,
}

impl Image {
    pub fn new(
        name: String,
        mapping: Mapping,
        load_bias: u64,
        phdr: usize,
        phnum: usize,
        dynamic: usize,
        info: DynamicInfo,
    ) -> Self {
        Self {
            name,
            mapping,
            load_bias,
            phdr,
            phnum,
            dynamic,
            info,
            ref_count: Cell::new(1),
        }
    }

    /// A bounds-checked view over the image's entire reserved span, used for
    /// all load-bias-adjusted reads (symbol tables, relocations, hash
    /// tables).
    pub fn region(&self) -> Region {
        Region::new(self.mapping.base(), self.mapping.size())
    }

    pub fn base(&self) -> usize {
        self.mapping.base()
    }

    pub fn size(&self) -> usize {
        self.mapping.size()
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count.get()
    }

    /// Returns the new count after decrementing.
    pub fn release(&self) -> u32 {
        let next = self.ref_count.get().saturating_sub(1);
        self.ref_count.set(next);
        next
    }
}
