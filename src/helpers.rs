//! Small deterministic numeric helpers shared by the frame loop.

use sha2::{Digest, Sha256};

/// Linear interpolation: `a * (1 - t) + b * t`.
#[inline]
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

#[inline]
pub fn lerp_vec2(a: [f32; 2], b: [f32; 2], t: f32) -> [f32; 2] {
    [lerp(a[0], b[0], t), lerp(a[1], b[1], t)]
}

/// Stable 64-bit seed for a string.
///
/// Derived from the first eight bytes of the SHA-256 digest (little endian), so
/// the same key yields the same seed on every platform and every run.
pub fn seed_from_str(value: &str) -> u64 {
    let digest = Sha256::digest(value.as_bytes());
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Hex SHA-256 of a pixel buffer, used to compare rendered surfaces.
pub fn frame_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
