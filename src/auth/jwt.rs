//! GitHub App JWT creation.
//!
//! App-level endpoints (the installation token exchange) authenticate with a
//! short-lived JWT signed by the App's RSA private key, issuer = the App's
//! client id.

use jsonwebtoken::{Algorithm, EncodingKey, Header, get_current_timestamp};
use serde::Serialize;

use super::AuthError;

/// Issued-at is backdated to absorb clock skew between us and GitHub.
const CLOCK_SKEW_BACKDATE_SECS: u64 = 30;
/// Tokens are never reused across exchanges, so a short lifetime is fine
/// (GitHub caps it at 10 minutes).
const JWT_LIFETIME_SECS: u64 = 5 * 60;

#[derive(Debug, Serialize)]
struct Claims {
    iat: u64,
    exp: u64,
    iss: String,
}

/// Signs App JWTs with a fixed key and issuer.
pub struct JwtSigner {
    client_id: String,
    key: EncodingKey,
    algorithm: Algorithm,
}

impl JwtSigner {
    /// Builds a signer from a PEM-encoded RSA private key.
    pub fn from_rsa_pem(client_id: impl Into<String>, pem: &[u8]) -> Result<Self, AuthError> {
        let key = EncodingKey::from_rsa_pem(pem).map_err(AuthError::Key)?;
        Ok(JwtSigner {
            client_id: client_id.into(),
            key,
            algorithm: Algorithm::RS256,
        })
    }

    /// HMAC-signed variant so tests don't need an RSA keypair.
    #[cfg(test)]
    pub fn from_hmac_secret(client_id: impl Into<String>, secret: &[u8]) -> Self {
        JwtSigner {
            client_id: client_id.into(),
            key: EncodingKey::from_secret(secret),
            algorithm: Algorithm::HS256,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Signs a fresh JWT: `iat` 30s in the past, `exp` 5 minutes out.
    pub fn sign(&self) -> Result<String, AuthError> {
        let now = get_current_timestamp();
        let claims = Claims {
            iat: now.saturating_sub(CLOCK_SKEW_BACKDATE_SECS),
            exp: now + JWT_LIFETIME_SECS,
            iss: self.client_id.clone(),
        };
        jsonwebtoken::encode(&Header::new(self.algorithm), &claims, &self.key)
            .map_err(AuthError::Sign)
    }
}

impl std::fmt::Debug for JwtSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSigner")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct DecodedClaims {
        iat: u64,
        exp: u64,
        iss: String,
    }

    fn decode(token: &str, secret: &[u8]) -> DecodedClaims {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp"]);
        jsonwebtoken::decode::<DecodedClaims>(token, &DecodingKey::from_secret(secret), &validation)
            .unwrap()
            .claims
    }

    #[test]
    fn claims_carry_issuer_and_lifetime() {
        let signer = JwtSigner::from_hmac_secret("Iv1.client", b"secret");
        let before = get_current_timestamp();
        let claims = decode(&signer.sign().unwrap(), b"secret");
        let after = get_current_timestamp();

        assert_eq!(claims.iss, "Iv1.client");
        // iat backdated by 30s around the time of signing.
        assert!(claims.iat >= before - CLOCK_SKEW_BACKDATE_SECS);
        assert!(claims.iat <= after - CLOCK_SKEW_BACKDATE_SECS);
        assert_eq!(claims.exp - claims.iat, JWT_LIFETIME_SECS + CLOCK_SKEW_BACKDATE_SECS);
    }

    #[test]
    fn invalid_pem_is_a_key_error() {
        let err = JwtSigner::from_rsa_pem("Iv1.client", b"not a pem").unwrap_err();
        assert!(matches!(err, AuthError::Key(_)));
    }

    #[test]
    fn debug_does_not_leak_key_material() {
        let signer = JwtSigner::from_hmac_secret("Iv1.client", b"super-secret");
        let rendered = format!("{:?}", signer);
        assert!(rendered.contains("Iv1.client"));
        assert!(!rendered.contains("super-secret"));
    }
}
