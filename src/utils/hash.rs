use crc32fast::Hasher;

/// CRC32 over a page region, with the page number mixed in so a page written
/// to the wrong offset fails verification.
pub fn calculate_page_checksum(page_id: u32, data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&page_id.to_le_bytes());
    hasher.update(data);
    hasher.finalize()
}

pub fn verify_page_checksum(page_id: u32, data: &[u8], expected_checksum: u32) -> bool {
    calculate_page_checksum(page_id, data) == expected_checksum
}

/// Stable hash of an encoded key; the hash index persists bucket placement,
/// so this must not change between runs or builds.
pub fn hash_key_bytes(key_bytes: &[u8]) -> u32 {
    crc32fast::hash(key_bytes)
}
