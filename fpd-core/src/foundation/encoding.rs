use crate::foundation::error::{ProviderError, Result};

fn strip_prefix(value: &str) -> &str {
    value.trim().trim_start_matches("0x")
}

/// Parse a hex string (with or without `0x` prefix) into 32 bytes.
pub fn parse_hex_32bytes(value: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(strip_prefix(value))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| ProviderError::EncodingError(format!("expected 32-byte hex value, got {} bytes", bytes.len())))
}

/// Parse a hex string into a 33-byte compressed public key.
pub fn parse_hex_33bytes(value: &str) -> Result<[u8; 33]> {
    let bytes = hex::decode(strip_prefix(value))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| ProviderError::EncodingError(format!("expected 33-byte hex value, got {} bytes", bytes.len())))
}
