//! Identity token classification and masking.
//!
//! The `identity_token`/`token_info` field on a UAIT (see `SPEC_FULL.md`
//! §9) is a tagged union over four recognizable shapes plus an unknown
//! fallback. Classification is heuristic and best-effort: it never fails,
//! it only ever narrows to [`TokenKind::Unknown`].

use serde::{Deserialize, Serialize};

/// Discriminant for the shape of an opaque identity token string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Jwt,
    Did,
    Url,
    ApiKey,
    Unknown,
}

/// Extracted, non-secret metadata about a classified token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenInfo {
    pub token_type: TokenKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub did_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_preview: Option<String>,
}

/// Classify a token string by shape. Order matters: DID is checked before
/// the generic JWT/API-key patterns since a `did:` string can otherwise
/// look like a high-entropy opaque key.
pub fn classify_token(token: &str) -> TokenKind {
    let token = token.trim();

    if is_did(token) {
        return TokenKind::Did;
    }
    if is_jwt(token) {
        return TokenKind::Jwt;
    }
    if is_url(token) {
        return TokenKind::Url;
    }
    if is_api_key(token) {
        return TokenKind::ApiKey;
    }
    TokenKind::Unknown
}

fn is_did(token: &str) -> bool {
    let Some(rest) = token.strip_prefix("did:") else {
        return false;
    };
    let mut parts = rest.splitn(2, ':');
    let method = parts.next().unwrap_or("");
    let specific = parts.next().unwrap_or("");
    !method.is_empty()
        && !specific.is_empty()
        && method.chars().all(|c| c.is_ascii_alphanumeric())
}

fn is_jwt(token: &str) -> bool {
    let parts: Vec<&str> = token.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(is_base64url_char))
}

fn is_base64url_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn is_url(token: &str) -> bool {
    token.starts_with("http://") || token.starts_with("https://")
}

fn is_api_key(token: &str) -> bool {
    if token.len() < 32 {
        return false;
    }
    let all_hex = token.chars().all(|c| c.is_ascii_hexdigit());
    let mixed_alnum = token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        && token.chars().any(|c| c.is_ascii_uppercase())
        && token.chars().any(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    all_hex || mixed_alnum
}

/// Extract non-secret metadata appropriate to `kind` from `token`. Never
/// includes the raw token or JWT claims beyond subject/issuer; secret-shaped
/// tokens are always masked down to a short prefix/suffix.
pub fn extract_token_info(token: &str) -> TokenInfo {
    let kind = classify_token(token);
    let mut info = TokenInfo {
        token_type: kind,
        subject: None,
        issuer: None,
        did_method: None,
        url: None,
        key_preview: None,
    };

    match kind {
        TokenKind::Jwt => {
            if let Some((sub, iss)) = parse_jwt_claims_unverified(token) {
                info.subject = sub;
                info.issuer = iss;
            }
        }
        TokenKind::Did => {
            let rest = token.strip_prefix("did:").unwrap_or(token);
            info.did_method = rest.split(':').next().map(|s| s.to_string());
        }
        TokenKind::Url => {
            info.url = Some(token.to_string());
        }
        TokenKind::ApiKey => {
            info.key_preview = Some(mask(token));
        }
        TokenKind::Unknown => {}
    }

    info
}

/// Mask a secret-shaped string down to a short prefix/suffix, e.g.
/// `"sk_live_abc...wxyz"`. Strings too short to usefully truncate are
/// masked to a fixed placeholder.
pub fn mask(secret: &str) -> String {
    if secret.len() > 12 {
        format!("{}...{}", &secret[..6], &secret[secret.len() - 4..])
    } else {
        "***".to_string()
    }
}

/// Best-effort, unverified parse of a JWT's `sub`/`iss` claims. Returns
/// `None` if the payload segment isn't valid base64url JSON — this is for
/// identity-bridging display only and must never be used for verification.
fn parse_jwt_claims_unverified(token: &str) -> Option<(Option<String>, Option<String>)> {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    let payload_b64 = token.split('.').nth(1)?;
    let payload_bytes = URL_SAFE_NO_PAD.decode(payload_b64).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&payload_bytes).ok()?;
    let sub = claims.get("sub").and_then(|v| v.as_str()).map(String::from);
    let iss = claims.get("iss").and_then(|v| v.as_str()).map(String::from);
    Some((sub, iss))
}
