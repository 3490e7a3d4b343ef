//! Build script for perlinject-core
//!
//! This script checks system requirements before compilation:
//! - Minimum Rust version (the workspace uses Edition 2024 in places, so 1.85.0+)
//! - A Unix target (named pipes, signals and gdb attach are Unix-only)
//!
//! ## Requirements
//!
//! - **Rust**: 1.85.0 or newer
//! - **Linux**: any kernel that lets gdb `ptrace` the target
//! - **macOS**: works only with a gdb that is allowed to attach

fn main()
{
    println!("cargo:rerun-if-changed=build.rs");

    if let Ok(rustc_version) = rustc_version::version() {
        if let Ok(min_rust_version) = rustc_version::Version::parse("1.85.0") {
            if rustc_version < min_rust_version {
                panic!(
                    "perlinject-core requires Rust {} or newer, found {}",
                    min_rust_version, rustc_version
                );
            }
        }
    } else {
        // If we can't get version (e.g., in some build environments), just warn
        println!("cargo:warning=could not verify Rust version");
    }

    // Cargo sets this for the target, not the host running the build script
    if std::env::var("CARGO_CFG_TARGET_FAMILY").map_or(true, |family| !family.split(',').any(|f| f == "unix")) {
        panic!("perlinject-core only supports Unix targets");
    }
}
