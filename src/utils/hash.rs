use sha2::{Digest, Sha256};

pub fn calculate_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    finalize_hex(hasher)
}

/// Consume an incremental hasher and return the lowercase hex digest.
pub fn finalize_hex(hasher: Sha256) -> String {
    hex::encode(hasher.finalize())
}
