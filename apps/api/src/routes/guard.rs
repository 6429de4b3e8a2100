use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

use crate::auth::session::session_cookie_value;

/// Pages that need a signed-in user.
const PROTECTED_PAGES: [&str; 3] = ["/dashboard", "/payment", "/result"];
/// Pages a signed-in user is bounced away from.
const GUEST_PAGES: [&str; 2] = ["/login", "/register"];

/// True when `path` is `prefix` itself or one of its sub-paths.
fn under(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Where a page request should be sent instead, if anywhere.
pub fn redirect_target(path: &str, signed_in: bool) -> Option<&'static str> {
    if !signed_in && PROTECTED_PAGES.iter().any(|page| under(path, page)) {
        return Some("/login");
    }
    if signed_in && GUEST_PAGES.iter().any(|page| under(path, page)) {
        return Some("/dashboard");
    }
    None
}

/// Redirects page requests based on whether a session cookie is present.
/// Only presence is checked; API routes do their own authentication.
pub async fn page_guard(request: Request, next: Next) -> Response {
    let signed_in = session_cookie_value(request.headers()).is_some();
    match redirect_target(request.uri().path(), signed_in) {
        Some(target) => Redirect::temporary(target).into_response(),
        None => next.run(request).await,
    }
}
