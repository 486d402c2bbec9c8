//! Version information.

/// Get the version string.
#[must_use]
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Version string with the target platform, as shown by `info`.
#[must_use]
pub fn full_version() -> String {
    format!(
        "pagebump {} ({}-{})",
        version(),
        std::env::consts::ARCH,
        std::env::consts::OS
    )
}
