//! Compile-time build stamp from `build.rs`

use std::fmt;

use serde::Serialize;

const RAW_BUILD_NUMBER: Option<&str> = option_env!("PORTION_GEOMETRY_BUILD_NUMBER");

/// UTC build time, RFC 3339
pub const BUILD_TIMESTAMP: &str = match option_env!("PORTION_GEOMETRY_BUILD_TIMESTAMP") {
    Some(s) => s,
    None => "unknown",
};

/// Cargo profile the binary was built with
pub const BUILD_PROFILE: &str = match option_env!("PORTION_GEOMETRY_BUILD_PROFILE") {
    Some(s) => s,
    None => "unknown",
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub const NAME: &str = env!("CARGO_PKG_NAME");

fn parse_build_number(raw: Option<&str>) -> u64 {
    raw.and_then(|s| s.trim().parse().ok()).unwrap_or(0)
}

/// Build counter; 0 when the crate was built without the build script
pub fn build_number() -> u64 {
    parse_build_number(RAW_BUILD_NUMBER)
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub build_number: u64,
    pub build_timestamp: &'static str,
    pub profile: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            name: NAME,
            version: VERSION,
            build_number: build_number(),
            build_timestamp: BUILD_TIMESTAMP,
            profile: BUILD_PROFILE,
        }
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (build {}, {}, {})",
            self.name, self.version, self.build_number, self.profile, self.build_timestamp
        )
    }
}

/// One-line banner on stderr; stdout carries the MCP stream
pub fn print_startup_banner() {
    eprintln!("Portion Geometry estimator: {}", BuildInfo::current());
}
