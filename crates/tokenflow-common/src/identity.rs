//! Deterministic token identity.
//!
//! Ids are FNV-1a 64-bit hashes of `"{project_id}:{qualified_name}"` over the UTF-8 bytes,
//! computed with wrapping `u64` arithmetic and rendered as 16 lower-case hex digits. Any other
//! implementation that must agree on ids has to reproduce exactly this function.

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a, 64-bit variant.
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Stable id for a token path within a project.
pub fn token_id(project_id: &str, qualified_name: &str) -> String {
    let key = format!("{}:{}", project_id, qualified_name);
    format!("{:016x}", fnv1a_64(key.as_bytes()))
}
