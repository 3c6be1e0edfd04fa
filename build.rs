//! Build script for the tagcall test fixture
//!
//! Compiles `fixtures/tagcall_fixture.c` into a shared library with the host
//! C compiler and exposes its path to tests as `TAGCALL_FIXTURE_LIB`. A
//! missing compiler only disables the fixture-backed tests.

use std::env;
use std::path::{Path, PathBuf};

const FIXTURE_SOURCE: &str = "fixtures/tagcall_fixture.c";

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed={}", FIXTURE_SOURCE);

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    let family = env::var("CARGO_CFG_TARGET_FAMILY").unwrap_or_default();
    let os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();

    if family != "unix" {
        println!(
            "cargo:warning=Skipping test fixture: shared-library build not supported for {}",
            os
        );
        return;
    }

    let lib_name = if os == "macos" || os == "ios" {
        "libtagcall_fixture.dylib"
    } else {
        "libtagcall_fixture.so"
    };
    let output = out_dir.join(lib_name);

    match build_fixture(Path::new(FIXTURE_SOURCE), &output, &os) {
        Ok(()) => println!("cargo:rustc-env=TAGCALL_FIXTURE_LIB={}", output.display()),
        Err(e) => println!("cargo:warning=Skipping test fixture: {}", e),
    }
}

/// Compile and link the fixture in one compiler invocation
fn build_fixture(source: &Path, output: &Path, os: &str) -> Result<(), String> {
    let compiler = cc::Build::new()
        .cargo_metadata(false)
        .try_get_compiler()
        .map_err(|e| format!("no C compiler: {}", e))?;

    let mut cmd = compiler.to_command();
    if os == "macos" || os == "ios" {
        cmd.arg("-dynamiclib");
    } else {
        cmd.arg("-shared");
    }
    cmd.args(["-fPIC", "-O1", "-o"]).arg(output).arg(source);

    let status = cmd
        .status()
        .map_err(|e| format!("failed to run {:?}: {}", compiler.path(), e))?;
    if status.success() {
        Ok(())
    } else {
        Err(format!("compiler exited with {}", status))
    }
}
