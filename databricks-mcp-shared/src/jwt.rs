//! Unverified JWT inspection
//!
//! Databricks OAuth access tokens are JWTs. When the token endpoint omits
//! `expires_in`, the `exp` claim is the next best source for the lifetime.
//! The signature is not checked: the token is only ever presented back to the
//! workspace that issued it, which performs the real verification.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    exp: Option<i64>,
}

/// Expiry time carried by a JWT's `exp` claim, if the token is a JWT and has one
pub fn unverified_expiry(token: &str) -> Option<DateTime<Utc>> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<ExpiryClaims>(token, &DecodingKey::from_secret(&[]), &validation).ok()?;
    let exp = data.claims.exp?;

    Utc.timestamp_opt(exp, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;

    #[derive(Serialize)]
    struct Claims {
        sub: String,
        exp: i64,
    }

    #[test]
    fn test_reads_exp_claim() {
        let exp = Utc::now().timestamp() + 900;
        let token = encode(
            &Header::default(),
            &Claims {
                sub: "service-principal".to_string(),
                exp,
            },
            &EncodingKey::from_secret(b"issuer-secret"),
        )
        .unwrap();

        let expiry = unverified_expiry(&token).unwrap();
        assert_eq!(expiry.timestamp(), exp);
    }

    #[test]
    fn test_opaque_token_has_no_expiry() {
        assert!(unverified_expiry("dapi0123456789abcdef").is_none());
        assert!(unverified_expiry("abc").is_none());
    }
}
