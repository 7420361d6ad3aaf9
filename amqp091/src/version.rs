//! Broker version discovery from the server properties

use amqp091_types::{FieldTable, FieldValue};

/// Key of the server property carrying the broker version
pub const VERSION_KEY: &str = "version";

/// The broker advertised a three part version that is not numeric
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Broker version {version:?} is corrupt")]
pub struct VersionError {
    /// The advertised version, lossily decoded
    pub version: String,
}

/// Packs a version as `0x00MMmmpp`, each part truncated to 8 bits
pub fn pack_version(major: u32, minor: u32, patch: u32) -> u32 {
    ((major & 0xFF) << 16) | ((minor & 0xFF) << 8) | (patch & 0xFF)
}

/// Computes the packed broker version from the server properties
///
/// Returns `Ok(0)` when the version is absent, is not a string, or does not have exactly
/// three dot separated parts. A three part version with a non numeric part is an error.
pub fn compute_broker_version(server_properties: &FieldTable) -> Result<u32, VersionError> {
    let bytes = match server_properties.get(VERSION_KEY).and_then(FieldValue::as_bytes) {
        Some(bytes) => bytes,
        None => return Ok(0),
    };

    let parts: Vec<&[u8]> = bytes.split(|b| *b == b'.').collect();
    let [major, minor, patch] = parts.as_slice() else {
        return Ok(0);
    };

    let corrupt = || VersionError {
        version: String::from_utf8_lossy(bytes).into_owned(),
    };
    let parse = |part: &[u8]| -> Result<u32, VersionError> {
        std::str::from_utf8(part)
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(corrupt)
    };

    Ok(pack_version(parse(*major)?, parse(*minor)?, parse(*patch)?))
}
