//! Random values, PKCE pairs and DPoP key generation.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use elliptic_curve::SecretKey;
use jose_jwk::{Key, crypto};
use rand::{CryptoRng, RngCore, rngs::ThreadRng};
use sha2::{Digest, Sha256};
use smol_str::SmolStr;

use crate::FALLBACK_ALG;
use crate::types::OAuthAuthorizationServerMetadata;

/// A fresh private key for the first algorithm in `allowed_algos` we can
/// produce. Only ES256 is implemented.
pub fn generate_key(allowed_algos: &[SmolStr]) -> Option<Key> {
    allowed_algos
        .iter()
        .find(|alg| alg.as_str() == "ES256")
        .map(|_| {
            Key::from(&crypto::Key::from(SecretKey::<p256::NistP256>::random(
                &mut ThreadRng::default(),
            )))
        })
}

/// 16 random bytes, base64url. Used for `state` and handoff nonces.
pub fn generate_nonce() -> SmolStr {
    URL_SAFE_NO_PAD
        .encode(get_random_values::<_, 16>(&mut ThreadRng::default()))
        .into()
}

/// 43 random bytes, base64url; well inside the 43..=128 PKCE length window.
pub fn generate_verifier() -> SmolStr {
    URL_SAFE_NO_PAD
        .encode(get_random_values::<_, 43>(&mut ThreadRng::default()))
        .into()
}

pub fn get_random_values<R, const LEN: usize>(rng: &mut R) -> [u8; LEN]
where
    R: RngCore + CryptoRng,
{
    let mut bytes = [0u8; LEN];
    rng.fill_bytes(&mut bytes);
    bytes
}

/// `(challenge, verifier)` with `challenge = BASE64URL(SHA256(verifier))`
/// (RFC 7636 §4.2, method `S256`).
pub fn generate_pkce() -> (SmolStr, SmolStr) {
    let verifier = generate_verifier();
    (pkce_challenge(&verifier), verifier)
}

pub fn pkce_challenge(verifier: &str) -> SmolStr {
    URL_SAFE_NO_PAD
        .encode(Sha256::digest(verifier.as_bytes()))
        .into()
}

/// ES256 DPoP key, if the server accepts ES256 (assumed when it does not
/// list any algorithms).
pub fn generate_dpop_key(metadata: &OAuthAuthorizationServerMetadata) -> Option<Key> {
    let algs = metadata
        .dpop_signing_alg_values_supported
        .clone()
        .unwrap_or_else(|| vec![FALLBACK_ALG.into()]);
    generate_key(&algs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkce_known_vector() {
        // RFC 7636 appendix B
        assert_eq!(
            pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
        let (challenge, verifier) = generate_pkce();
        assert_eq!(verifier.len(), 58);
        assert_eq!(challenge, pkce_challenge(&verifier));
    }

    #[test]
    fn nonces_are_fresh() {
        let a = generate_nonce();
        let b = generate_nonce();
        assert_eq!(a.len(), 22);
        assert_ne!(a, b);
    }

    #[test]
    fn dpop_key_falls_back_to_es256() {
        let metadata = OAuthAuthorizationServerMetadata::default();
        assert!(generate_dpop_key(&metadata).is_some());

        let metadata = OAuthAuthorizationServerMetadata {
            dpop_signing_alg_values_supported: Some(vec!["RS256".into()]),
            ..Default::default()
        };
        assert!(generate_dpop_key(&metadata).is_none());
    }
}
