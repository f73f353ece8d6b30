/// BLAKE3 digest of `data`, hex encoded.
pub fn digest_hex(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}
