use crate::credentials::types::{Result, TokenError};
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use serde::Deserialize;

/// The only claim needed to schedule renewal
#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    #[serde(default)]
    exp: Option<i64>,
}

/// Read the `exp` claim of a JWT without verifying its signature
///
/// Intended for tokens received from a trusted issuer that does not report
/// the expiry separately. The signature is not checked: never use the result
/// to make an authorization decision.
pub fn expiry_from_jwt(token: &str) -> Result<i64> {
    let header = decode_header(token)?;

    let mut validation = Validation::new(header.alg);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<ExpiryClaims>(token, &DecodingKey::from_secret(&[]), &validation)?;

    match data.claims.exp {
        Some(exp) if exp > 0 => Ok(exp),
        Some(exp) => Err(TokenError::InvalidToken(format!(
            "JWT exp claim {} is not a valid timestamp",
            exp
        ))),
        None => Err(TokenError::InvalidToken("JWT has no exp claim".to_string())),
    }
}
