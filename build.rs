//! Build script for captcha-ocr-bridge.
//!
//! Only does work on macOS with the `apple-vision` feature:
//! 1. swift-bridge: generate FFI glue for src/ocr/apple_vision.rs
//! 2. swiftc: compile the Vision bridge + glue into a static library
//! 3. link the library and the Apple frameworks Vision needs
//!
//! Generated files go to OUT_DIR.

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let vision_enabled = std::env::var_os("CARGO_FEATURE_APPLE_VISION").is_some();
    if target_os == "macos" && vision_enabled {
        #[cfg(feature = "apple-vision")]
        apple_vision::build();
    }
}

#[cfg(feature = "apple-vision")]
mod apple_vision {
    use std::path::PathBuf;

    pub fn build() {
        let manifest_dir = PathBuf::from(std::env::var("CARGO_MANIFEST_DIR").unwrap());
        let out_dir = PathBuf::from(std::env::var("OUT_DIR").unwrap());
        let swift_src_dir = manifest_dir.join("swift-src");
        let generated_dir = out_dir.join("swift-bridge-generated");
        let package = env!("CARGO_PKG_NAME");

        println!("cargo:rerun-if-changed=src/ocr/apple_vision.rs");
        println!("cargo:rerun-if-changed=swift-src/vision_bridge.swift");

        // Step 1: FFI glue
        swift_bridge_build::parse_bridges(vec!["src/ocr/apple_vision.rs"])
            .write_all_concatenated(&generated_dir, package);

        // Step 2: bridging header with absolute paths
        let bridging_header = out_dir.join("bridging-header.h");
        std::fs::write(
            &bridging_header,
            format!(
                "#ifndef BridgingHeader_h\n\
                 #define BridgingHeader_h\n\
                 #include \"{generated}/SwiftBridgeCore.h\"\n\
                 #include \"{generated}/{package}/{package}.h\"\n\
                 #endif\n",
                generated = generated_dir.display(),
                package = package,
            ),
        )
        .expect("Failed to write bridging header");

        // Step 3: Swift → static library
        let lib_output = out_dir.join("libvision_swift.a");
        let status = std::process::Command::new("swiftc")
            .args(["-emit-library", "-static"])
            .args(["-module-name", "vision_swift"])
            .arg("-import-objc-header")
            .arg(&bridging_header)
            .arg(swift_src_dir.join("vision_bridge.swift"))
            .arg(generated_dir.join("SwiftBridgeCore.swift"))
            .arg(generated_dir.join(format!("{package}/{package}.swift")))
            .arg("-o")
            .arg(&lib_output)
            .arg("-O")
            .status()
            .expect("Failed to run swiftc; is Xcode Command Line Tools installed?");

        if !status.success() {
            panic!("swiftc compilation failed");
        }

        // Step 4: link
        println!("cargo:rustc-link-search={}", out_dir.display());
        println!("cargo:rustc-link-lib=static=vision_swift");
        println!("cargo:rustc-link-lib=framework=Vision");
        println!("cargo:rustc-link-lib=framework=CoreGraphics");
        println!("cargo:rustc-link-lib=framework=Foundation");
        println!("cargo:rustc-link-lib=framework=ImageIO");

        let xcode_path = std::process::Command::new("xcode-select")
            .arg("--print-path")
            .output()
            .ok()
            .and_then(|o| String::from_utf8(o.stdout).ok())
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| "/Applications/Xcode.app/Contents/Developer".to_string());

        println!(
            "cargo:rustc-link-search={}/Toolchains/XcodeDefault.xctoolchain/usr/lib/swift/macosx/",
            xcode_path
        );
        println!("cargo:rustc-link-search=/usr/lib/swift");
    }
}
