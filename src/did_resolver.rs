//! DID resolution and ephemeral DID creation.
//!
//! `did:key` resolves locally from the multicodec-encoded public key;
//! `did:web` fetches a document over HTTPS (SSRF-validated, no redirects);
//! every other method falls back to a configured Universal Resolver
//! instance.

use crate::crypto;
use crate::error::{KernelError, Result};
use crate::ssrf::validate_url_host;
use serde_json::{json, Value};
use std::time::Duration;

/// Resolve `did` to its DID Document.
pub async fn resolve_did(did: &str, universal_resolver_url: &str, http_timeout: Duration) -> Result<Value> {
    if let Some(rest) = did.strip_prefix("did:key:") {
        return resolve_did_key(&format!("did:key:{rest}"));
    }
    if did.starts_with("did:web:") {
        return resolve_did_web(did, http_timeout).await;
    }
    resolve_universal(did, universal_resolver_url, http_timeout).await
}

fn resolve_did_key(did: &str) -> Result<Value> {
    let public_key = crypto::did_key_to_public_key(did)?;
    let pub_multibase = format!("z{}", bs58::encode(public_key.as_ref()).into_string());
    Ok(build_did_key_document(did, &pub_multibase))
}

fn build_did_key_document(did: &str, pub_multibase: &str) -> Value {
    let vm_id = format!("{did}#key-1");
    json!({
        "@context": [
            "https://www.w3.org/ns/did/v1",
            "https://w3id.org/security/suites/ed25519-2020/v1",
        ],
        "id": did,
        "controller": did,
        "verificationMethod": [{
            "id": vm_id,
            "type": "Ed25519VerificationKey2020",
            "controller": did,
            "publicKeyMultibase": pub_multibase,
        }],
        "authentication": [vm_id.clone()],
        "assertionMethod": [vm_id],
    })
}

async fn resolve_did_web(did: &str, http_timeout: Duration) -> Result<Value> {
    let raw = did
        .strip_prefix("did:web:")
        .ok_or_else(|| KernelError::Validation(format!("not a did:web: {did}")))?;

    if !raw
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':'))
    {
        return Err(KernelError::Validation(format!(
            "invalid did:web format: {did}"
        )));
    }

    let parts: Vec<&str> = raw.split(':').collect();
    let domain = parts[0];
    validate_url_host(domain)?;

    for p in &parts[1..] {
        if p.contains("..") || p.starts_with('.') {
            return Err(KernelError::Validation(format!(
                "invalid path segment in did:web: {did}"
            )));
        }
    }

    let path = if parts.len() > 1 {
        parts[1..].join("/")
    } else {
        ".well-known".to_string()
    };
    let url = format!("https://{domain}/{path}/did.json");

    fetch_json(&url, http_timeout).await
}

async fn resolve_universal(did: &str, universal_resolver_url: &str, http_timeout: Duration) -> Result<Value> {
    let valid = did.starts_with("did:")
        && did
            .splitn(3, ':')
            .nth(1)
            .map(|m| !m.is_empty() && m.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()))
            .unwrap_or(false);
    if !valid {
        return Err(KernelError::Validation(format!("invalid DID format: {did}")));
    }

    let url = format!("{}{}", universal_resolver_url.trim_end_matches('/'), format!("/{did}"));
    let result = fetch_json(&url, http_timeout).await?;
    Ok(result.get("didDocument").cloned().unwrap_or(result))
}

async fn fetch_json(url: &str, timeout: Duration) -> Result<Value> {
    crate::ssrf::validate_and_pin_url(url)?;

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| KernelError::Network(e.to_string()))?;

    let resp = client
        .get(url)
        .send()
        .await
        .map_err(KernelError::from)?
        .error_for_status()
        .map_err(KernelError::from)?;

    resp.json::<Value>().await.map_err(KernelError::from)
}

/// Fetch and parse a third party's Agent Card from `base_url`'s
/// `/.well-known/agent.json`, SSRF-validated like every other outbound
/// fetch in this module.
pub async fn discover_agent_card(base_url: &str, http_timeout: Duration) -> Result<Value> {
    let trimmed = base_url.trim_end_matches('/');
    let url = format!("{trimmed}/.well-known/agent.json");
    fetch_json(&url, http_timeout).await
}

/// A freshly generated DID plus the DID Document it resolves to. The
/// private key is never included — callers persist it separately (see
/// `SPEC_FULL.md` §10.5) and refer to it by `keypair_id`.
pub struct EphemeralDid {
    pub did: String,
    pub did_document: Value,
    pub public_key_multibase: String,
    pub secret_key: ed25519_compact::SecretKey,
}

/// Generate a fresh ephemeral `did:key`.
pub fn create_did_key() -> EphemeralDid {
    let kp = crypto::generate_keypair();
    let did = crypto::public_key_to_did_key(&kp.pk);
    let pub_multibase = format!("z{}", bs58::encode(kp.pk.as_ref()).into_string());
    let did_document = build_did_key_document(&did, &pub_multibase);
    EphemeralDid {
        did,
        did_document,
        public_key_multibase: pub_multibase,
        secret_key: kp.sk,
    }
}

/// Generate a `did:web` identity for self-hosting at `domain`/`path`.
/// Returns the DID Document the caller must publish, plus the URL it must
/// be served from.
pub fn create_did_web(domain: &str, path: Option<&str>) -> (EphemeralDid, String) {
    let did_path = path
        .filter(|p| !p.is_empty())
        .map(|p| format!(":{}", p.replace('/', ":")))
        .unwrap_or_default();
    let did = format!("did:web:{domain}{did_path}");

    let kp = crypto::generate_keypair();
    let pub_multibase = format!("z{}", bs58::encode(kp.pk.as_ref()).into_string());
    let vm_id = format!("{did}#key-1");
    let did_document = json!({
        "@context": [
            "https://www.w3.org/ns/did/v1",
            "https://w3id.org/security/suites/ed25519-2020/v1",
        ],
        "id": did,
        "controller": did,
        "verificationMethod": [{
            "id": vm_id,
            "type": "Ed25519VerificationKey2020",
            "controller": did,
            "publicKeyMultibase": pub_multibase,
        }],
        "authentication": [vm_id.clone()],
        "assertionMethod": [vm_id],
    });

    let hosting_url = match path.filter(|p| !p.is_empty()) {
        Some(p) => format!("https://{domain}/{p}/did.json"),
        None => format!("https://{domain}/.well-known/did.json"),
    };

    (
        EphemeralDid {
            did,
            did_document,
            public_key_multibase: pub_multibase,
            secret_key: kp.sk,
        },
        hosting_url,
    )
}
