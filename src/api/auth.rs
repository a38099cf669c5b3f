use axum::http::{header::AUTHORIZATION, header::COOKIE, HeaderMap, StatusCode};
use sha2::{Digest, Sha256};

use crate::config::AdminConfig;
use crate::domain::{AdminGrant, Caller};

pub const ADMIN_SESSION_COOKIE: &str = "squares_admin_auth";
pub const ADMIN_TOKEN_HEADER: &str = "x-squares-admin-token";

const MIN_COOKIE_MAX_AGE_SECS: i64 = 60;

pub fn admin_token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn extract_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let raw = headers.get(COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next()?.trim();
        let value = parts.next()?.trim();
        if key == cookie_name {
            Some(value.to_string())
        } else {
            None
        }
    })
}

fn secure_suffix(config: &AdminConfig) -> &'static str {
    if config.cookie_secure {
        "; Secure"
    } else {
        ""
    }
}

pub fn build_admin_session_cookie(config: &AdminConfig, token: &str) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}{}",
        ADMIN_SESSION_COOKIE,
        admin_token_fingerprint(token),
        config.cookie_max_age_secs.max(MIN_COOKIE_MAX_AGE_SECS),
        secure_suffix(config)
    )
}

pub fn build_admin_logout_cookie(config: &AdminConfig) -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0{}",
        ADMIN_SESSION_COOKIE,
        secure_suffix(config)
    )
}

fn extract_bearer_token(raw: &str) -> Option<&str> {
    raw.strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))
        .map(str::trim)
}

pub fn is_valid_admin_token(config: &AdminConfig, provided: &str) -> bool {
    config
        .expected_token()
        .is_some_and(|expected| provided.trim() == expected)
}

/// True when the request carries the configured token, either directly or
/// as a session cookie holding its fingerprint.
fn presents_admin_token(headers: &HeaderMap, expected: &str) -> bool {
    let token = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(extract_bearer_token)
        });
    if token.is_some_and(|v| v == expected) {
        return true;
    }

    let expected_fp = admin_token_fingerprint(expected);
    extract_cookie(headers, ADMIN_SESSION_COOKIE)
        .as_deref()
        .is_some_and(|v| v == expected_fp)
}

pub fn ensure_admin_authorized(
    headers: &HeaderMap,
    config: &AdminConfig,
) -> std::result::Result<AdminGrant, (StatusCode, String)> {
    let Some(expected) = config.expected_token() else {
        if !config.auth_required {
            return Ok(AdminGrant::issue());
        }
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "admin auth is required but SQUARES__ADMIN__TOKEN is not configured".to_string(),
        ));
    };

    if presents_admin_token(headers, expected) {
        return Ok(AdminGrant::issue());
    }

    Err((
        StatusCode::UNAUTHORIZED,
        "admin auth failed (missing/invalid token)".to_string(),
    ))
}

/// Capability for routes open to everyone. Only a presented, valid token
/// makes the caller an administrator; open dev mode does not.
pub fn resolve_caller(headers: &HeaderMap, config: &AdminConfig) -> Caller {
    match config.expected_token() {
        Some(expected) if presents_admin_token(headers, expected) => Caller::admin(),
        _ => Caller::Public,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config(token: Option<&str>) -> AdminConfig {
        AdminConfig {
            token: token.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_header_and_bearer_tokens() {
        let cfg = config(Some("s3cret"));
        let mut headers = HeaderMap::new();
        headers.insert(ADMIN_TOKEN_HEADER, HeaderValue::from_static("s3cret"));
        assert!(ensure_admin_authorized(&headers, &cfg).is_ok());

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert!(resolve_caller(&headers, &cfg).is_admin());
    }

    #[test]
    fn test_cookie_holds_fingerprint_not_token() {
        let cfg = config(Some("s3cret"));
        let cookie = format!(
            "other=1; {}={}",
            ADMIN_SESSION_COOKIE,
            admin_token_fingerprint("s3cret")
        );
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&cookie).unwrap());
        assert!(ensure_admin_authorized(&headers, &cfg).is_ok());

        let raw = format!("{}=s3cret", ADMIN_SESSION_COOKIE);
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&raw).unwrap());
        assert!(ensure_admin_authorized(&headers, &cfg).is_err());
    }

    #[test]
    fn test_wrong_token_is_unauthorized() {
        let cfg = config(Some("s3cret"));
        let mut headers = HeaderMap::new();
        headers.insert(ADMIN_TOKEN_HEADER, HeaderValue::from_static("nope"));
        let (status, _) = ensure_admin_authorized(&headers, &cfg).unwrap_err();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(resolve_caller(&headers, &cfg), Caller::Public);
    }

    #[test]
    fn test_missing_token_config() {
        let (status, _) = ensure_admin_authorized(&HeaderMap::new(), &config(None)).unwrap_err();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let open = AdminConfig {
            auth_required: false,
            ..Default::default()
        };
        assert!(ensure_admin_authorized(&HeaderMap::new(), &open).is_ok());
        assert_eq!(resolve_caller(&HeaderMap::new(), &open), Caller::Public);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cfg = AdminConfig {
            token: Some("t".into()),
            cookie_secure: true,
            cookie_max_age_secs: 10,
            ..Default::default()
        };
        let cookie = build_admin_session_cookie(&cfg, "t");
        assert!(cookie.contains("HttpOnly; SameSite=Strict; Max-Age=60; Secure"));
        assert!(build_admin_logout_cookie(&cfg).contains("Max-Age=0"));
    }
}
