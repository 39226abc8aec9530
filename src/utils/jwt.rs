use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey,
                   Header, Validation};
use serde::{Deserialize, Serialize};

/// Tokens live for one hour.
pub const TTL_SECS: i64 = 3_600;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims { pub sub:String, pub email:String, pub exp:i64 }

pub fn sign(uid:&str, email:&str, secret:&str) -> jsonwebtoken::errors::Result<String> {
    let c = Claims { sub: uid.into(), email: email.into(), exp: Utc::now().timestamp()+TTL_SECS };
    encode(&Header::default(), &c, &EncodingKey::from_secret(secret.as_bytes()))
}

pub fn verify(token:&str, secret:&str) -> Option<Claims> {
    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()),
                     &Validation::new(Algorithm::HS256))
        .map(|d| d.claims).ok()
}
