use std::env;
use std::path::PathBuf;

fn main() {
    let crate_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let config_path = crate_dir.join("cbindgen.toml");

    println!("cargo:rerun-if-changed={}", config_path.display());
    println!("cargo:rerun-if-changed=src/lib.rs");

    let config = cbindgen::Config::from_file(&config_path)
        .unwrap_or_else(|e| panic!("invalid {}: {e}", config_path.display()));

    let output_file = crate_dir.join("include").join("genwatch.h");
    std::fs::create_dir_all(output_file.parent().unwrap()).unwrap();

    cbindgen::Builder::new()
        .with_crate(&crate_dir)
        .with_config(config)
        .generate()
        .expect("Unable to generate genwatch bindings")
        .write_to_file(output_file);
}
