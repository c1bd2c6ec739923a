//! Global, thread-local loader state: the published image list, the
//! last-error slot, and the few knobs the facade exposes for configuration.
//!
//! Cross-thread use of this core is undefined behavior-wise. Rather than
//! reach for a `Mutex` and leave the single-thread-per-actual-process case
//! paying lock overhead for no reason, this loader keeps one `Context` per
//! OS thread via `thread_local!`. Two threads each calling `open`/`lookup`/
//! `close` see entirely independent loader worlds; there is no shared state
//! to race on.

use std::cell::RefCell;

use crate::error::LinkError;
use crate::image::Image;
use crate::prelude::*;

/// Handle value meaning "search every published image, then the host",
/// analogous to `dlsym(RTLD_DEFAULT, ...)`.
pub const HANDLE_DEFAULT: usize = 0;

/// The "next" sentinel (all-ones handle). Recognized but not implemented:
/// a real "search starting after the caller's image" lookup needs a way to
/// identify the calling image, which this core has no mechanism for.
pub const HANDLE_NEXT: usize = usize::MAX;

pub struct Context {
    images: RefCell<Vec<Image>>,
    last_error: RefCell<Option<String>>,
    strict_undefined: std::cell::Cell<bool>,
}

impl Context {
    fn new() -> Self {
        let strict_undefined = std::env::var("MINILD_STRICT_UNDEFINED").as_deref() == Ok("1");
        Self {
            images: RefCell::new(Vec::new()),
            last_error: RefCell::new(None),
            strict_undefined: std::cell::Cell::new(strict_undefined),
        }
    }

    pub fn strict_undefined(&self) -> bool {
        self.strict_undefined.get()
    }

    pub fn set_strict_undefined(&self, value: bool) {
        self.strict_undefined.set(value);
    }

    /// Publishes a newly relocated, initialized image at the front of the
    /// list (newest first) and returns its handle.
    pub fn publish(&self, image: Image) -> usize {
        let handle = image.base();
        self.images.borrow_mut().insert(0, image);
        handle
    }

    pub fn with_images<R>(&self, f: impl FnOnce(&[Image]) -> R) -> R {
        f(&self.images.borrow())
    }

    pub fn find(&self, handle: usize) -> Option<std::cell::Ref<'_, Image>> {
        let images = self.images.borrow();
        if images.iter().any(|img| img.base() == handle) {
            Some(std::cell::Ref::map(images, |images| {
                images.iter().find(|img| img.base() == handle).unwrap()
            }))
        } else {
            None
        }
    }

    /// Drops `handle`'s reference count; if it reaches zero, runs its
    /// destructors and removes it from the list, unmapping it.
    pub fn release(&self, handle: usize) -> Option<()> {
        let remaining = {
            let images = self.images.borrow();
            let image = images.iter().find(|img| img.base() == handle)?;
            image.release()
        };
        if remaining == 0 {
            {
                let images = self.images.borrow();
                let image = images.iter().find(|img| img.base() == handle)?;
                info!("{}: reference count reached 0, tearing down", image.name);
                crate::lifecycle::run_fini(image);
            }
            let mut images = self.images.borrow_mut();
            let pos = images.iter().position(|img| img.base() == handle)?;
            images.remove(pos);
            // dropped here, unmapping the image.
        }
        Some(())
    }

    pub fn set_last_error(&self, err: &LinkError) {
        *self.last_error.borrow_mut() = Some(err.to_string());
    }

    pub fn clear_last_error(&self) {
        *self.last_error.borrow_mut() = None;
    }

    /// Returns the stored error message, if any, and clears the slot: two
    /// sequential reads with no intervening facade call see the message
    /// once, then `None`.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.borrow_mut().take()
    }
}

thread_local! {
    static CONTEXT: Context = Context::new();
}

pub fn with_context<R>(f: impl FnOnce(&Context) -> R) -> R {
    CONTEXT.with(f)
}
