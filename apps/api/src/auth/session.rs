use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, HeaderValue},
};
use uuid::Uuid;

use crate::errors::AppError;

pub const SESSION_COOKIE: &str = "session";
/// One week, in seconds.
pub const SESSION_MAX_AGE_SECS: u64 = 60 * 60 * 24 * 7;

/// The authenticated caller, resolved from the `session` cookie.
///
/// The cookie holds the user id and is trusted as a bearer credential.
/// Handlers take `Session` as an extractor and hand it to service calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub user_id: Uuid,
}

/// Raw value of the `session` cookie, if the request carries one.
pub fn session_cookie_value(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

impl Session {
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AppError> {
        let raw = session_cookie_value(headers).ok_or_else(AppError::unauthorized)?;
        let user_id = Uuid::parse_str(raw)
            .map_err(|_| AppError::Unauthorized("Invalid session".to_string()))?;
        Ok(Session { user_id })
    }

    /// `Set-Cookie` value that binds the client to `user_id`.
    pub fn issue_cookie(user_id: Uuid, secure: bool) -> HeaderValue {
        let mut cookie = format!(
            "{SESSION_COOKIE}={user_id}; HttpOnly; Path=/; Max-Age={SESSION_MAX_AGE_SECS}; SameSite=Lax"
        );
        if secure {
            cookie.push_str("; Secure");
        }
        // A UUID and fixed attributes are always valid header bytes.
        HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
    }

    /// `Set-Cookie` value that makes the client drop its session.
    pub fn clear_cookie() -> HeaderValue {
        HeaderValue::from_static("session=; HttpOnly; Path=/; Max-Age=0; SameSite=Lax")
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Session::from_headers(&parts.headers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with_cookie(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn test_reads_session_among_other_cookies() {
        let id = Uuid::new_v4();
        let headers = headers_with_cookie(&format!("theme=dark; session={id}; lang=en"));
        assert_eq!(Session::from_headers(&headers).unwrap().user_id, id);
    }

    #[test]
    fn test_missing_cookie_is_unauthorized() {
        let headers = headers_with_cookie("theme=dark");
        assert!(matches!(
            Session::from_headers(&headers),
            Err(AppError::Unauthorized(msg)) if msg == "Unauthorized"
        ));
        assert!(session_cookie_value(&HeaderMap::new()).is_none());
    }

    #[test]
    fn test_malformed_session_is_invalid() {
        let headers = headers_with_cookie("session=507f1f77bcf86cd799439011");
        assert!(matches!(
            Session::from_headers(&headers),
            Err(AppError::Unauthorized(msg)) if msg == "Invalid session"
        ));
    }

    #[test]
    fn test_empty_session_counts_as_missing() {
        let headers = headers_with_cookie("session=");
        assert!(session_cookie_value(&headers).is_none());
    }

    #[test]
    fn test_issued_cookie_attributes() {
        let id = Uuid::new_v4();
        let cookie = Session::issue_cookie(id, true);
        let cookie = cookie.to_str().unwrap();
        assert!(cookie.starts_with(&format!("session={id};")));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=604800"));
        assert!(cookie.ends_with("; Secure"));

        let insecure = Session::issue_cookie(id, false);
        assert!(!insecure.to_str().unwrap().contains("Secure"));
    }
}
