use anyhow::Error;
use chrono::Duration;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::ops::Add;

pub const AUDIENCE: &str = "authenticated";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub aud: String,
    pub email: String,
    pub session_id: String,
    pub exp: usize,
}

#[derive(Default, Debug, Serialize, Clone, Deserialize, PartialEq, Eq)]
pub struct Token {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

fn gen_jwt(claims: &Claims, secret: &[u8]) -> Result<String, Error> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )
    .map_err(|e| anyhow::anyhow!("failed to sign token: {}", e))
}

/// Mints an access/refresh token pair for one session.
pub fn create_token(
    user_id: &str,
    email: &str,
    session_id: &str,
    secret: &[u8],
) -> Result<Token, Error> {
    let access_ttl = Duration::hours(1);
    let claims = |ttl: Duration| Claims {
        sub: user_id.to_string(),
        aud: AUDIENCE.to_string(),
        email: email.to_string(),
        session_id: session_id.to_string(),
        exp: chrono::Utc::now().add(ttl).timestamp() as usize,
    };

    let access_token = gen_jwt(&claims(access_ttl), secret)?;
    let refresh_token = gen_jwt(&claims(Duration::days(30)), secret)?;
    Ok(Token {
        access_token,
        refresh_token,
        expires_in: access_ttl.num_seconds(),
    })
}

/// Verifies signature, expiry and audience, returning the claims.
pub fn decode_token(token: &str, secret: &[u8]) -> Result<Claims, Error> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[AUDIENCE]);
    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|e| match *e.kind() {
            ErrorKind::InvalidToken => anyhow::anyhow!("Token is invalid"),
            ErrorKind::ExpiredSignature => anyhow::anyhow!("Token has expired"),
            ErrorKind::InvalidSignature => anyhow::anyhow!("Token signature is invalid"),
            ErrorKind::InvalidAudience => anyhow::anyhow!("Audience is invalid"),
            _ => anyhow::anyhow!("Some other errors"),
        })?;

    if token_data.claims.sub.is_empty() {
        return Err(Error::msg("User id is empty"));
    }
    Ok(token_data.claims)
}
