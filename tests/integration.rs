//! End-to-end scenarios against `libtest_fixture.so`, compiled by
//! `build.rs` from `fixtures/test_lib.c`.

use std::path::PathBuf;

use minild::error::ErrorKind;

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("MINILD_TEST_FIXTURE"))
}

#[test_log::test]
fn open_maps_and_runs_constructors() {
    let handle = minild::open(&fixture_path()).expect("open should succeed");
    assert_ne!(handle, 0, "a real image never publishes at the null handle");
    minild::close(handle).expect("close should succeed");
}

#[test_log::test]
fn lookup_resolves_exported_function() {
    let handle = minild::open(&fixture_path()).unwrap();
    let addr = minild::lookup(handle, "add").expect("add should be exported");
    assert_ne!(addr, 0);

    let add: unsafe extern "C" fn(i32, i32) -> i32 = unsafe { std::mem::transmute(addr as usize) };
    assert_eq!(unsafe { add(2, 3) }, 5);

    minild::close(handle).unwrap();
}

#[test_log::test]
fn lookup_resolves_string_returning_function() {
    let handle = minild::open(&fixture_path()).unwrap();
    let addr = minild::lookup(handle, "get_message").unwrap();
    let get_message: unsafe extern "C" fn() -> *const std::os::raw::c_char =
        unsafe { std::mem::transmute(addr as usize) };
    let msg = unsafe { std::ffi::CStr::from_ptr(get_message()) };
    assert_eq!(msg.to_str().unwrap(), "Hello from mini linker!");

    minild::close(handle).unwrap();
}

#[test_log::test]
fn lookup_resolves_mutable_exported_global() {
    let handle = minild::open(&fixture_path()).unwrap();
    let addr = minild::lookup(handle, "global_counter").unwrap();
    let ptr = addr as usize as *mut i32;

    assert_eq!(unsafe { *ptr }, 42);
    unsafe { *ptr = 100 };
    assert_eq!(unsafe { *ptr }, 100);

    minild::close(handle).unwrap();
}

#[test_log::test]
fn lookup_missing_symbol_reports_not_found() {
    let handle = minild::open(&fixture_path()).unwrap();
    let err = minild::lookup(handle, "undefined_symbol").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("undefined_symbol"));
    assert_eq!(minild::last_error().as_deref(), Some(err.to_string()).as_deref());
    assert_eq!(minild::last_error(), None, "last-error is cleared once read");

    minild::close(handle).unwrap();
}

#[test_log::test]
fn open_rejects_non_elf_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not_elf.bin");
    std::fs::write(&path, b"not an elf file at all").unwrap();

    let err = minild::open(&path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadFormat);
}

#[test_log::test]
fn default_handle_searches_published_images() {
    let handle = minild::open(&fixture_path()).unwrap();
    let addr = minild::lookup(minild::HANDLE_DEFAULT, "add")
        .expect("default lookup should find a symbol in any published image");
    let direct = minild::lookup(handle, "add").unwrap();
    assert_eq!(addr, direct);

    minild::close(handle).unwrap();
}

#[test_log::test]
fn closing_unknown_handle_fails_without_panicking() {
    let err = minild::close(0xdead_beef).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test_log::test]
fn next_sentinel_reports_not_supported() {
    let handle = minild::open(&fixture_path()).unwrap();
    let err = minild::lookup(minild::HANDLE_NEXT, "add").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotSupported);

    minild::close(handle).unwrap();
}

#[test_log::test]
fn constructor_relocation_falls_back_to_host_printf() {
    // The fixture's constructor already calls libc's printf as part of
    // on_load(); if that relocation hadn't resolved via the host fallback,
    // loading would have crashed before `open` ever returned.
    let handle = minild::open(&fixture_path()).expect("constructor's printf call must relocate cleanly");
    minild::close(handle).unwrap();
}
