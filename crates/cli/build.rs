use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Short commit id of the checkout, read straight from `.git` so the build
/// does not depend on a `git` binary. Packed refs resolve to `None`.
fn commit_id(git_dir: &Path) -> Option<String> {
    let head = fs::read_to_string(git_dir.join("HEAD")).ok()?;
    let head = head.trim();
    let full = match head.strip_prefix("ref: ") {
        Some(reference) => fs::read_to_string(git_dir.join(reference)).ok()?,
        None => head.to_string(),
    };
    let id: String = full.trim().chars().take(7).collect();
    (id.len() == 7 && id.chars().all(|c| c.is_ascii_hexdigit())).then_some(id)
}

fn main() {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_default());
    let git_dir = manifest_dir.join("../../.git");
    println!("cargo:rerun-if-changed={}", git_dir.join("HEAD").display());
    println!("cargo:rerun-if-changed={}", git_dir.join("refs/heads").display());

    let commit = commit_id(&git_dir).unwrap_or_else(|| "unknown".into());
    let target = env::var("TARGET").unwrap_or_else(|_| "unknown".into());
    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".into());

    println!("cargo:rustc-env=KPICTL_COMMIT={commit}");
    println!("cargo:rustc-env=KPICTL_TARGET={target}");
    println!("cargo:rustc-env=KPICTL_PROFILE={profile}");
}
