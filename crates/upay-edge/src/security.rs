//! Timing-safe comparison shared by digest verification and token checks.

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Compare two byte strings without leaking where they differ or how long they are.
///
/// Both sides are first reduced to SHA-256 digests, so the comparison always
/// walks 32 bytes regardless of input. `subtle` performs the final equality.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    let ha = Sha256::digest(a);
    let hb = Sha256::digest(b);
    ha.ct_eq(&hb).into()
}
