use std::env;

fn main() {
    let target = env::var("TARGET").unwrap_or_default();

    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rustc-env=TARGET_TRIPLE={target}");
}
