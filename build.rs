// Short git hash for run reports. Builds outside a checkout simply omit it.
fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    let Ok(output) = std::process::Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
    else {
        return;
    };
    if output.status.success() {
        if let Ok(hash) = String::from_utf8(output.stdout) {
            println!("cargo:rustc-env=GALLERY_GIT_HASH={}", hash.trim());
        }
    }
}
