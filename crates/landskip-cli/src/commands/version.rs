//! Version command - print the build banner

use console::style;

/// Plugged in during build
const SEMVER: &str = env!("CARGO_PKG_VERSION");

pub fn run() {
    let git_commit = option_env!("LANDSKIP_GIT_COMMIT").unwrap_or("-");
    let git_tag = option_env!("LANDSKIP_GIT_TAG").unwrap_or("-");

    println!("{} {}", style("landskip").bold(), SEMVER);
    println!("  git commit: {}", git_commit);
    println!("  git tag:    {}", git_tag);
}
