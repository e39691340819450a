//! Body checksum for the `070702` flavor.
//!
//! The newc checksum is not a CRC despite the name: it is the 32-bit
//! wrapping sum of all body bytes.

/// Fold a chunk of body bytes into a running checksum.
pub fn fold(state: u32, chunk: &[u8]) -> u32 {
    chunk
        .iter()
        .fold(state, |sum, &byte| sum.wrapping_add(u32::from(byte)))
}

/// Checksum of a complete body.
pub fn of(body: &[u8]) -> u32 {
    fold(0, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body() {
        assert_eq!(of(b""), 0);
    }

    #[test]
    fn test_known_sum() {
        // 'a' + 'b' + 'c'
        assert_eq!(of(b"abc"), 0x61 + 0x62 + 0x63);
    }

    #[test]
    fn test_fold_matches_whole() {
        let body: &[u8] = b"Hello World";
        let split: u32 = fold(fold(0, &body[..5]), &body[5..]);
        assert_eq!(split, of(body));
    }

    #[test]
    fn test_sum_wraps() {
        let chunk: [u8; 64] = [0xFF; 64];
        let mut state: u32 = u32::MAX - 128;
        state = fold(state, &chunk);
        assert_eq!(state, (u32::MAX - 128).wrapping_add(64 * 255));
    }
}
