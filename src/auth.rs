use actix_web::{dev::Payload, Error, FromRequest, HttpRequest};
use std::future::{ready, Ready};

use crate::session::{self, Claims, SESSION_COOKIE};

/// Extractor yielding verified session `Claims`.
///
/// Every protected route goes through this: the cookie value is fully
/// verified (signature + expiry), never merely checked for presence.
pub struct AdminSession(pub Claims);

impl FromRequest for AdminSession {
    type Error = Error;
    type Future = Ready<Result<Self, Error>>;

    fn from_request(req: &HttpRequest, _pl: &mut Payload) -> Self::Future {
        let secret = session::secret_from_env();
        if let Some(cookie) = req.cookie(SESSION_COOKIE) {
            if let Some(claims) = session::verify(cookie.value(), &secret) {
                return ready(Ok(AdminSession(claims)));
            }
        }
        ready(Err(crate::error::ApiError::Unauthorized.into()))
    }
}
