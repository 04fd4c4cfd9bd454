//! Random identifiers and secrets.

use rand::rngs::OsRng;
use rand::RngCore;

/// `n_bytes` of OS randomness, lowercase hex encoded (`2 * n_bytes` chars).
pub fn random_hex(n_bytes: usize) -> String {
    let mut buf = vec![0u8; n_bytes];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}
