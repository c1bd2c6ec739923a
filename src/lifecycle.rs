//! Lifecycle Orchestrator: runs an image's constructors on publish and its
//! destructors on teardown, in the order the dynamic linker contract
//! specifies.

use crate::consts::INIT_FINI_IGNORE;
use crate::image::Image;
use crate::prelude::*;

type VoidFn = unsafe extern "C" fn();

/// Runs `DT_INIT` (if present) followed by every entry of `DT_INIT_ARRAY`,
/// in array order. Called once, right after an image's relocations have
/// been applied and it has been published.
pub fn run_init(image: &Image) {
    if let Some(addr) = image.info.init_func {
        if addr != 0 && addr != INIT_FINI_IGNORE {
            info!("{}: calling DT_INIT at {:#x}", image.name, addr);
            unsafe { call(addr) };
        }
    }

    if image.info.init_array == 0 {
        return;
    }
    let region = image.region();
    for i in 0..image.info.init_array_count {
        let entry: u64 = match unsafe { region.read_at(image.info.init_array + i * 8) } {
            Ok(v) => v,
            Err(e) => {
                warn!("{}: failed to read init_array[{i}]: {e}", image.name);
                continue;
            }
        };
        if entry == 0 || entry == INIT_FINI_IGNORE {
            continue;
        }
        info!("{}: calling init_array[{i}] at {:#x}", image.name, entry);
        unsafe { call(entry) };
    }
}

/// Runs every entry of `DT_FINI_ARRAY` in reverse array order, followed by
/// `DT_FINI` (if present). Called once, when an image's reference count
/// drops to zero.
pub fn run_fini(image: &Image) {
    if image.info.fini_array != 0 {
        let region = image.region();
        for i in (0..image.info.fini_array_count).rev() {
            let entry: u64 = match unsafe { region.read_at(image.info.fini_array + i * 8) } {
                Ok(v) => v,
                Err(e) => {
                    warn!("{}: failed to read fini_array[{i}]: {e}", image.name);
                    continue;
                }
            };
            if entry == 0 || entry == INIT_FINI_IGNORE {
                continue;
            }
            info!("{}: calling fini_array[{i}] at {:#x}", image.name, entry);
            unsafe { call(entry) };
        }
    }

    if let Some(addr) = image.info.fini_func {
        if addr != 0 && addr != INIT_FINI_IGNORE {
            info!("{}: calling DT_FINI at {:#x}", image.name, addr);
            unsafe { call(addr) };
        }
    }
}

unsafe fn call(addr: u64) {
    let f: VoidFn = unsafe { std::mem::transmute(addr as usize) };
    unsafe { f() };
}
