//! Stamps the commit and commit date into the binary for `--version`.

use std::process::Command;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let commit =
        git_output(&["rev-parse", "--short=9", "HEAD"]).unwrap_or_else(|| "unknown".to_string());
    let date =
        git_output(&["show", "-s", "--format=%cs", "HEAD"]).unwrap_or_else(|| "unknown".to_string());

    println!("cargo:rustc-env=FLOWSCOPE_BUILD_COMMIT={commit}");
    println!("cargo:rustc-env=FLOWSCOPE_BUILD_DATE={date}");
}

fn git_output(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
