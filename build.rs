//! Stamps the crate with a persistent build counter, a UTC timestamp and the
//! cargo profile, exposed to `src/build_info.rs` as `PORTION_GEOMETRY_*` vars.

use std::fs;
use std::path::Path;

const COUNTER_FILE: &str = "build_number.txt";

fn next_build_number(counter: &Path) -> u64 {
    fs::read_to_string(counter)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map_or(1, |n| n.saturating_add(1))
}

fn main() {
    println!("cargo:rerun-if-changed=src");

    let counter = Path::new(COUNTER_FILE);
    let build_number = next_build_number(counter);
    if let Err(e) = fs::write(counter, build_number.to_string()) {
        println!("cargo:warning=build counter not persisted: {}", e);
    }

    let stamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    for (key, value) in [
        ("BUILD_NUMBER", build_number.to_string()),
        ("BUILD_TIMESTAMP", stamp),
        ("BUILD_PROFILE", profile),
    ] {
        println!("cargo:rustc-env=PORTION_GEOMETRY_{}={}", key, value);
    }
}
