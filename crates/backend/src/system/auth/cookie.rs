use axum::http::HeaderMap;
use contracts::system::auth::ADMIN_COOKIE_NAME;

/// `Set-Cookie` value installing the admin session token
pub fn admin_cookie(token: &str, max_age_seconds: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        ADMIN_COOKIE_NAME, token, max_age_seconds
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value removing the admin session token
pub fn clear_admin_cookie(secure: bool) -> String {
    admin_cookie("", 0, secure)
}

/// Value of the admin session cookie, if the request carries one
pub fn read_admin_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == ADMIN_COOKIE_NAME)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}
