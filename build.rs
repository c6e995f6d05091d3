use std::env;
use std::path::{Path, PathBuf};

/// Libraries the frame-extraction engine links against.
const REQUIRED_LIBRARIES: &[&str] = &["avformat", "avcodec", "avfilter", "swscale", "avutil"];

fn main() {
    println!("cargo:rerun-if-env-changed=FFMPEG_DIR");
    println!("cargo:rerun-if-env-changed=VCPKG_ROOT");
    println!("cargo:rerun-if-env-changed=VCPKGRS_TRIPLET");

    if let Some(dir) = env::var_os("FFMPEG_DIR") {
        check_ffmpeg_dir(&PathBuf::from(dir));
        return;
    }

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    if target_os != "windows" {
        return;
    }

    let Ok(vcpkg_root) = env::var("VCPKG_ROOT") else {
        println!(
            "cargo:warning=FFMPEG_DIR is not set. On Windows, install FFmpeg (with libavfilter) via vcpkg and set VCPKG_ROOT + FFMPEG_DIR."
        );
        return;
    };

    let triplet = env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
    let ffmpeg_dir = PathBuf::from(&vcpkg_root).join("installed").join(&triplet);
    if ffmpeg_dir.exists() {
        println!(
            "cargo:warning=Detected vcpkg FFmpeg at {}. Set FFMPEG_DIR={} to make discovery explicit.",
            ffmpeg_dir.display(),
            ffmpeg_dir.display(),
        );
        check_ffmpeg_dir(&ffmpeg_dir);
    } else {
        println!(
            "cargo:warning=VCPKG_ROOT is set but no FFmpeg install was found at {}.",
            ffmpeg_dir.display(),
        );
    }
}

/// Warn about libraries missing from an explicit FFmpeg install.
fn check_ffmpeg_dir(dir: &Path) {
    let include = dir.join("include");
    if !include.exists() {
        println!(
            "cargo:warning=FFmpeg directory {} has no include/ subdirectory.",
            dir.display()
        );
        return;
    }

    for library in REQUIRED_LIBRARIES {
        if !include.join(format!("lib{library}")).exists() {
            println!(
                "cargo:warning=lib{library} headers not found under {}; frame extraction needs it.",
                include.display()
            );
        }
    }
}
