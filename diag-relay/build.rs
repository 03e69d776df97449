//! Build script for diag-relay
//!
//! With the `squirrel` feature, this script compiles Squirrel 3 using CMake
//! and builds the C relay shim against it. Without the feature nothing
//! native is built.

use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=csrc/relay.c");
    println!("cargo:rerun-if-env-changed=SQUIRREL_SRC");
    println!("cargo:rerun-if-env-changed=DIAG_RELAY_BUFFER_LEN");

    if env::var_os("CARGO_FEATURE_SQUIRREL").is_none() {
        return;
    }

    // SQUIRREL_SRC wins, otherwise look for vendor/squirrel in the workspace
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let squirrel_src = match env::var_os("SQUIRREL_SRC") {
        Some(path) => PathBuf::from(path),
        None => manifest_dir.parent().unwrap().join("vendor").join("squirrel"),
    };

    println!("cargo:rerun-if-changed={}", squirrel_src.display());

    if !squirrel_src.join("CMakeLists.txt").exists() {
        println!("cargo:warning=Squirrel source not found at {}", squirrel_src.display());
        println!("cargo:warning=Set SQUIRREL_SRC to a Squirrel 3 checkout to link the VM");
        return;
    }

    let mut defines: Vec<&str> = Vec::new();
    if env::var_os("CARGO_FEATURE_UTF_16").is_some() {
        defines.push("SQUNICODE");
    }
    if env::var_os("CARGO_FEATURE_USE_DOUBLE").is_some() {
        defines.push("SQUSEDOUBLE");
    }

    // Static libraries only
    let mut cmake_config = cmake::Config::new(&squirrel_src);
    cmake_config
        .define("DISABLE_DYNAMIC", "ON")
        .define("BUILD_SHARED_LIBS", "OFF")
        .profile("Release");
    for define in &defines {
        let flag = format!("-D{}", define);
        cmake_config.cflag(&flag).cxxflag(&flag);
    }

    let dst = cmake_config.build();

    // The shim references the VM, so it goes ahead of the Squirrel archives
    let mut shim = cc::Build::new();
    shim.file("csrc/relay.c").include(squirrel_src.join("include"));
    for define in &defines {
        shim.define(define, None);
    }
    if let Ok(len) = env::var("DIAG_RELAY_BUFFER_LEN") {
        shim.define("DIAG_RELAY_BUFFER_LEN", Some(len.as_str()));
    }
    shim.compile("diag_relay_shim");

    println!("cargo:rustc-link-search=native={}/lib", dst.display());
    println!("cargo:rustc-link-search=native={}/lib64", dst.display());
    println!("cargo:rustc-link-lib=static=sqstdlib_static");
    println!("cargo:rustc-link-lib=static=squirrel_static");

    #[cfg(target_os = "linux")]
    {
        println!("cargo:rustc-link-lib=dylib=stdc++");
    }

    #[cfg(target_os = "macos")]
    {
        println!("cargo:rustc-link-lib=dylib=c++");
    }
}
