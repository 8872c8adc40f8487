//! Linker setup.
//!
//! `memory.x` adds the memory-mapped PSRAM region on top of the internal
//! RAM layout. The board support package (camera middleware, sensor driver,
//! LCD/XSPI BSP and the vendor HAL) is linked as one static C library whose
//! directory is given by `CAMVIEW_BSP_LIB_DIR`.

use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;

fn main() -> io::Result<()> {
    let out = PathBuf::from(env::var_os("OUT_DIR").ok_or(io::ErrorKind::NotFound)?);
    fs::write(out.join("memory.x"), include_bytes!("memory.x"))?;
    println!("cargo:rustc-link-search={}", out.display());
    println!("cargo:rerun-if-changed=memory.x");

    println!("cargo:rerun-if-env-changed=CAMVIEW_BSP_LIB_DIR");
    if let Some(dir) = env::var_os("CAMVIEW_BSP_LIB_DIR") {
        println!("cargo:rustc-link-search=native={}", PathBuf::from(dir).display());
    }
    println!("cargo:rustc-link-lib=static=camview_bsp");

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");
    Ok(())
}
