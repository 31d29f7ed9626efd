//! Keyed integrity tags over announcements
//!
//! Tags are HMAC-SHA256 under the shared epoch secret. They are cheap to
//! verify and epoch-scoped, which is what bounds announcement replay: a
//! pulse tagged under a retired generation stops verifying everywhere.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::SECRET_SIZE;

type HmacSha256 = Hmac<Sha256>;

/// Size of the keyed integrity tag
pub const TAG_SIZE: usize = 32;

/// Compute the tag for a canonical message under an epoch secret.
pub fn compute_tag(key: &[u8; SECRET_SIZE], message: &[u8]) -> [u8; TAG_SIZE] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(message);
    let digest = mac.finalize().into_bytes();
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(&digest);
    tag
}

/// Verify a received tag in constant time.
pub fn verify_tag(key: &[u8; SECRET_SIZE], message: &[u8], tag: &[u8; TAG_SIZE]) -> bool {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(message);
    mac.verify_slice(tag).is_ok()
}
