//! Stateless HMAC-signed session tokens.
//!
//! A token is `base64url(claims-json) . base64url(hmac-sha256)`. Nothing is
//! persisted server-side; expiry lives inside the claims. A leaked token stays
//! valid until its embedded expiry (no revocation list).

use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "af_session";
pub const SESSION_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub username: String,
    /// Unix seconds.
    pub expires_at: i64,
}

impl Claims {
    pub fn new(username: &str, ttl_secs: i64) -> Self {
        Self {
            username: username.to_string(),
            expires_at: chrono::Utc::now().timestamp() + ttl_secs,
        }
    }
}

/// Serialize and sign claims into a compact token. Pure: the caller stores it
/// into a cookie.
pub fn sign(claims: &Claims, secret: &[u8]) -> String {
    let payload = serde_json::to_vec(claims).expect("claims serialize");
    let encoded = URL_SAFE_NO_PAD.encode(payload);
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(encoded.as_bytes());
    let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    format!("{encoded}.{sig}")
}

/// Verify a token and return its claims, or `None` for anything malformed,
/// tampered or expired. Callers treat `None` as "no session"; no error type.
pub fn verify(token: &str, secret: &[u8]) -> Option<Claims> {
    let (encoded, sig) = token.split_once('.')?;
    let sig_bytes = URL_SAFE_NO_PAD.decode(sig).ok()?;
    let mut mac = HmacSha256::new_from_slice(secret).expect("hmac accepts any key length");
    mac.update(encoded.as_bytes());
    // verify_slice is constant-time; never compare MACs with ==.
    mac.verify_slice(&sig_bytes).ok()?;
    let payload = URL_SAFE_NO_PAD.decode(encoded).ok()?;
    let claims: Claims = serde_json::from_slice(&payload).ok()?;
    if claims.expires_at <= chrono::Utc::now().timestamp() {
        return None;
    }
    Some(claims)
}

/// Signing secret from the environment. Startup validation guarantees presence
/// and length; there is deliberately no hardcoded fallback.
pub fn secret_from_env() -> Vec<u8> {
    std::env::var("SESSION_SECRET")
        .expect("SESSION_SECRET not set")
        .into_bytes()
}

fn secure_cookies() -> bool {
    std::env::var("APP_ENV")
        .map(|v| v.eq_ignore_ascii_case("production"))
        .unwrap_or(false)
}

pub fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, token)
        .path("/")
        .http_only(true)
        .secure(secure_cookies())
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::seconds(SESSION_TTL_SECS))
        .finish()
}

pub fn clearing_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE, "")
        .path("/")
        .http_only(true)
        .secure(secure_cookies())
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::ZERO)
        .finish()
}
