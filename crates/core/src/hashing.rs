//! Shared hex and HMAC-SHA256 digest utilities.
//!
//! Used by `job` (identifier generation) and `webhook` (payload signing).

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Encode bytes as a lowercase hex string.
pub fn to_hex(bytes: impl AsRef<[u8]>) -> String {
    bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
}

/// Compute the lowercase hex HMAC-SHA256 of `data` keyed with `secret`.
pub fn hmac_sha256_hex(secret: &[u8], data: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(data);
    to_hex(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_hex_pads_each_byte() {
        assert_eq!(to_hex([0x00, 0x0f, 0xab, 0xff]), "000fabff");
        assert_eq!(to_hex([]), "");
    }

    #[test]
    fn hmac_matches_rfc_4231_case_2() {
        let sig = hmac_sha256_hex(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            sig,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn hmac_differs_with_different_secret() {
        let a = hmac_sha256_hex(b"secret_a", b"payload");
        let b = hmac_sha256_hex(b"secret_b", b"payload");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }
}
