use std::process::Command;

/// Stdout of a successful `git` invocation, trimmed. `None` outside a checkout
/// or when git is missing.
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}

fn main() {
    for path in ["../../.git/HEAD", "../../.git/refs", "../../.git/index"] {
        println!("cargo:rerun-if-changed={path}");
    }
    println!("cargo:rerun-if-env-changed=SIM_BENCH_GIT_SHA");

    // Source tarballs have no .git; let the packager stamp the revision.
    let sha = std::env::var("SIM_BENCH_GIT_SHA")
        .ok()
        .filter(|sha| !sha.is_empty())
        .or_else(|| git(&["rev-parse", "--short=12", "HEAD"]))
        .unwrap_or_else(|| "unknown".to_owned());

    // Tracked changes only; scratch run directories are not a dirty tree.
    let dirty = git(&["status", "--porcelain", "--untracked-files=no"])
        .is_some_and(|status| !status.is_empty());

    println!("cargo:rustc-env=GIT_SHA={sha}");
    println!("cargo:rustc-env=GIT_DIRTY={dirty}");
}
