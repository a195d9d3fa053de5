/// Build script for speech-relay
///
/// Only the Vosk engine needs link configuration:
/// - Linux: Sets RPATH to $ORIGIN so the binary finds libvosk.so in the same directory
/// - Library search paths come from VOSK_LIB_PATH or a `vosk-lib` directory
/// - macOS and Windows engines use system frameworks, nothing to do

fn main() {
    // Re-run if these change
    println!("cargo:rerun-if-env-changed=VOSK_LIB_PATH");
    println!("cargo:rerun-if-env-changed=VOSK_STRATEGY");

    if std::env::var_os("CARGO_FEATURE_VOSK").is_none() {
        return;
    }

    #[cfg(target_os = "linux")]
    linux_config();
}

#[cfg(target_os = "linux")]
fn linux_config() {
    // Set RPATH to $ORIGIN so the binary looks for libvosk.so in the same directory
    println!("cargo:rustc-link-arg=-Wl,-rpath,$ORIGIN");

    if let Ok(vosk_path) = std::env::var("VOSK_LIB_PATH") {
        println!("cargo:rustc-link-search=native={}", vosk_path);
    }

    // Default fetch location in the project root
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap();
    let vosk_lib_dir = std::path::Path::new(&manifest_dir).join("vosk-lib");
    if vosk_lib_dir.exists() {
        println!(
            "cargo:rustc-link-search=native={}",
            vosk_lib_dir.display()
        );
    }
}
