//! Build-time metadata embedded by the build script.
//!
//! Used for the HTTP `User-Agent` sent to the daemons and for the CLI's
//! version output.

/// The git commit hash at build time (short form, `-dirty` if modified).
pub const GIT_HASH: &str = env!("KASTATUS_GIT_HASH");

/// The build timestamp as a Unix epoch string.
pub const BUILD_TIMESTAMP: &str = env!("KASTATUS_BUILD_TIMESTAMP");

/// The build profile (`debug` or `release`).
pub const BUILD_PROFILE: &str = env!("KASTATUS_BUILD_PROFILE");

/// The crate version from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Return a formatted version string including git hash and profile.
///
/// Example: `"0.1.0 (abc1234, debug)"`
pub fn version_string() -> String {
    format!("{VERSION} ({GIT_HASH}, {BUILD_PROFILE})")
}

/// The `User-Agent` header value sent with every RPC request.
pub fn user_agent() -> String {
    format!("kastatus/{VERSION} ({GIT_HASH})")
}
