//! Identifier and key helpers

use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique id then encode using bech32, the hrp names the record family
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Prefix shared by every history key of one document.
pub fn history_prefix(entity_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(entity_id.len() + 1);
    key.extend_from_slice(entity_id.as_bytes());
    key.push(b'/');
    key
}

/// `<entity id>/<version>` with the version big-endian so keys sort by version.
pub fn history_key(entity_id: &str, version: u32) -> Vec<u8> {
    let mut key = history_prefix(entity_id);
    key.extend_from_slice(&version.to_be_bytes());
    key
}
