//! Build script: git hash for the version string, plus toolkit checks for
//! the GPU-accelerated whisper features.
//!
//! whisper-rs-sys fails deep inside cmake when a toolkit is missing; a short
//! warning up front makes the real cause visible.

use std::process::Command;

fn main() {
    if let Ok(output) = Command::new("git")
        .args(["rev-parse", "--short=7", "HEAD"])
        .output()
        && output.status.success()
    {
        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        println!("cargo:rustc-env=GIT_HASH={}", hash);
    }
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");

    if cfg!(feature = "cuda") {
        require_tool("cuda", "nvcc", &["--version"], "install the CUDA toolkit");
    }
    if cfg!(feature = "hipblas") {
        require_tool("hipblas", "hipconfig", &["--version"], "install ROCm (hipBLAS)");
    }
    if cfg!(feature = "vulkan") {
        require_tool(
            "vulkan",
            "glslc",
            &["--version"],
            "install the Vulkan SDK (glslc shader compiler)",
        );
    }
    if cfg!(feature = "openblas") {
        require_tool(
            "openblas",
            "pkg-config",
            &["--exists", "openblas"],
            "install OpenBLAS development headers",
        );
    }
}

fn require_tool(feature: &str, program: &str, args: &[&str], hint: &str) {
    let found = Command::new(program)
        .args(args)
        .output()
        .is_ok_and(|out| out.status.success());
    if found {
        return;
    }
    println!("cargo::warning=feature `{feature}` is enabled but `{program}` was not found");
    println!("cargo::warning=  -> {hint}, or build without `--features {feature}`");
}
