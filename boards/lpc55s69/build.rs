//! Place `memory.x` for the linker, and embed the application image.
//!
//! The image is the raw binary of an application linked to run from the
//! slot, given by the `APP_IMAGE` environment variable, or `app.bin` next to
//! this file.  Its size becomes `IMAGE_SIZE`.

use std::{env, fs, path::PathBuf};

fn main() {
    let out = PathBuf::from(env::var_os("OUT_DIR").expect("OUT_DIR is set by cargo"));

    fs::copy("memory.x", out.join("memory.x")).expect("memory.x is readable");
    println!("cargo:rustc-link-search={}", out.display());
    println!("cargo:rerun-if-changed=memory.x");

    println!("cargo:rerun-if-env-changed=APP_IMAGE");
    let image = env::var_os("APP_IMAGE")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("app.bin"));
    println!("cargo:rerun-if-changed={}", image.display());

    let data = fs::read(&image).unwrap_or_else(|e| {
        panic!("Unable to read application image {}: {}", image.display(), e)
    });
    if data.len() < 8 {
        panic!("Application image {} has no vector table", image.display());
    }

    fs::write(out.join("app.bin"), &data).expect("OUT_DIR is writable");
    fs::write(
        out.join("app_image.rs"),
        format!("pub const IMAGE_SIZE: usize = {};\n", data.len()),
    )
    .expect("OUT_DIR is writable");
}
