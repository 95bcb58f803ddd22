//! Keyed signature binding `(user_id, customer_id)` across the internal hop
//! between gateway and tenant backend. A backend reachable from the public
//! internet cannot otherwise tell a genuine `X-Gateway-Verified` header from
//! a forged one.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrustMode {
    /// Shared secret configured; signatures are required and verified.
    Enforced,
    /// No shared secret. Local-development convenience only: every
    /// signature check passes. Production startup refuses this mode at
    /// config validation.
    Permissive,
}

#[derive(Clone)]
pub struct TrustSigner {
    secret: SecretString,
}

impl TrustSigner {
    pub fn from_secret(secret: SecretString) -> Self {
        Self { secret }
    }

    pub fn mode(&self) -> TrustMode {
        if self.secret.expose_secret().is_empty() {
            TrustMode::Permissive
        } else {
            TrustMode::Enforced
        }
    }

    /// Hex HMAC-SHA256 over `"{user_id}:{customer_id}"`. Empty string in
    /// permissive mode, matching the header the gateway sends when no secret
    /// is configured.
    pub fn sign(&self, user_id: &str, customer_id: &str) -> String {
        if self.mode() == TrustMode::Permissive {
            return String::new();
        }
        hex::encode(self.mac(user_id, customer_id))
    }

    /// Constant-time verification. The hex signature is decoded first so a
    /// mismatch is never observable through comparison timing.
    pub fn check(&self, user_id: &str, customer_id: &str, signature: &str) -> bool {
        if self.mode() == TrustMode::Permissive {
            return true;
        }
        let Ok(provided) = hex::decode(signature) else {
            return false;
        };
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(user_id.as_bytes());
        mac.update(b":");
        mac.update(customer_id.as_bytes());
        mac.verify_slice(&provided).is_ok()
    }

    fn mac(&self, user_id: &str, customer_id: &str) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(user_id.as_bytes());
        mac.update(b":");
        mac.update(customer_id.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::{TrustMode, TrustSigner};

    fn signer(secret: &str) -> TrustSigner {
        TrustSigner::from_secret(secret.to_string().into())
    }

    #[test]
    fn round_trip_verifies() {
        let signer = signer("shared-secret");
        let signature = signer.sign("user-1", "acme");
        assert!(signer.check("user-1", "acme", &signature));
    }

    #[test]
    fn tampering_with_any_input_fails_verification() {
        let signer = signer("shared-secret");
        let signature = signer.sign("user-1", "acme");

        assert!(!signer.check("user-2", "acme", &signature));
        assert!(!signer.check("user-1", "globex", &signature));

        let mut flipped = signature.clone().into_bytes();
        flipped[0] = if flipped[0] == b'0' { b'1' } else { b'0' };
        let flipped = String::from_utf8(flipped).unwrap();
        assert!(!signer.check("user-1", "acme", &flipped));
    }

    #[test]
    fn signatures_from_a_different_secret_fail() {
        let a = signer("secret-a");
        let b = signer("secret-b");
        let signature = a.sign("user-1", "acme");
        assert!(!b.check("user-1", "acme", &signature));
    }

    #[test]
    fn non_hex_signature_is_rejected() {
        let signer = signer("shared-secret");
        assert!(!signer.check("user-1", "acme", "not hex at all"));
        assert!(!signer.check("user-1", "acme", ""));
    }

    #[test]
    fn field_boundary_is_unambiguous() {
        // "ab:c" vs "a:bc" must not collide.
        let signer = signer("shared-secret");
        let signature = signer.sign("ab", "c");
        assert!(!signer.check("a", "bc", &signature));
    }

    #[test]
    fn empty_secret_is_permissive() {
        let signer = signer("");
        assert_eq!(signer.mode(), TrustMode::Permissive);
        assert_eq!(signer.sign("user-1", "acme"), "");
        assert!(signer.check("user-1", "acme", "anything"));
    }
}
