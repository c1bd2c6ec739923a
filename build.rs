//! Compiles `fixtures/test_lib.c` into a small ELF64 shared object used by
//! the integration tests to exercise a real load/relocate/call/unload
//! cycle end to end.

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=fixtures/test_lib.c");

    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let source = manifest_dir.join("fixtures/test_lib.c");
    let out_file = out_dir.join("libtest_fixture.so");

    let mut build = cc::Build::new();
    build
        .file(&source)
        .pic(true)
        .opt_level(0)
        // We're producing a standalone .so for tests to dlopen-equivalent
        // load, not linking anything into this crate.
        .cargo_metadata(false);

    let objects = build.compile_intermediates();

    let compiler = build.get_compiler();
    let mut link_cmd = compiler.to_command();
    link_cmd
        .arg("-shared")
        .arg("-o")
        .arg(&out_file)
        .args(&objects);

    let status = link_cmd.status().expect("failed to run linker");
    if !status.success() {
        panic!("failed to link libtest_fixture.so");
    }

    println!(
        "cargo:rustc-env=MINILD_TEST_FIXTURE={}",
        out_file.display()
    );
}
