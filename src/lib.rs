//! A minimal userspace dynamic linker for ELF64/x86_64 shared objects.
//!
//! The public surface is deliberately small: [`open`], [`lookup`],
//! [`close`], and [`last_error`]. Everything else — ELF validation, segment
//! mapping, dynamic-section interpretation, symbol resolution, relocation,
//! and init/fini lifecycle management — is internal plumbing those four
//! calls compose.

pub mod consts;
pub mod context;
pub mod dynamic;
pub mod elf;
pub mod error;
pub mod facade;
pub mod hash;
pub mod image;
pub mod lifecycle;
pub mod map;
pub mod prelude;
pub mod region;
pub mod reloc;
pub mod resolve;
pub mod types;

pub use context::{HANDLE_DEFAULT, HANDLE_NEXT};
pub use error::{ErrorKind, LinkError, LinkResult};
pub use facade::{close, last_error, lookup, open};
