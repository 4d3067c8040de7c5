//! Signed embed URLs.
//!
//! A signed URL is the target resource URL on the embed host followed by the
//! resource's own query parameters, the fixed set of [`SIGNED_PARAMS`], and a
//! final `signature` parameter. The signature is HMAC-SHA256, keyed by the
//! shared secret, over the canonical string built in [`crate::canon`], encoded
//! as URL-safe base64 without padding.

use std::{borrow::Cow, fmt};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use hmac::{digest::InvalidLength, Hmac, Mac};
use percent_encoding::percent_decode_str;
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use url::{form_urlencoded, Url};

use crate::{
    canon::{canonical_json_string, canonical_string},
    error::{SignError, VerifyError},
    user::User,
};

type HmacSha256 = Hmac<Sha256>;

/// Random bytes per nonce.
pub const NONCE_LEN: usize = 16;

pub const SIGNATURE_PARAM: &str = "signature";

/// Signed query parameters, in canonical order. Every one of them is present
/// on every signed URL, empty when the user has no value for it.
pub const SIGNED_PARAMS: [&str; 14] = [
    "nonce",
    "time",
    "session_length",
    "external_user_id",
    "first_name",
    "last_name",
    "permissions",
    "models",
    "group_ids",
    "external_group_id",
    "user_attributes",
    "access_filters",
    "user_timezone",
    "force_logout_login",
];

const PLACEHOLDER_SECRETS: [&str; 4] = ["changeme", "change-me", "placeholder", "secret"];

/// The embed secret shared with the verifier.
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Rejects secrets that are empty or left at a well-known placeholder.
pub fn check_secret(secret: &Secret) -> Result<(), SignError> {
    let s = secret.0.trim();
    if s.is_empty() {
        return Err(SignError::Configuration("secret is empty".into()));
    }
    if PLACEHOLDER_SECRETS.iter().any(|p| p.eq_ignore_ascii_case(s)) {
        return Err(SignError::Configuration("secret is a placeholder value".into()));
    }
    Ok(())
}

/// Parses the embed host into a bare origin URL. `https://` is assumed when
/// the host carries no scheme.
pub fn parse_host(host: &str) -> Result<Url, SignError> {
    let host = host.trim();
    if host.is_empty() {
        return Err(SignError::Configuration("host is empty".into()));
    }
    let with_scheme = if host.contains("://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };
    let url = Url::parse(&with_scheme)
        .map_err(|e| SignError::Configuration(format!("host is not a valid URL: {e}")))?;
    if !matches!(url.scheme(), "https" | "http") {
        return Err(SignError::Configuration(format!(
            "host scheme must be http or https, got {}",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(SignError::Configuration("host has no hostname".into()));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(SignError::Configuration("host must not carry credentials".into()));
    }
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err(SignError::Configuration(
            "host must not include a path, query or fragment".into(),
        ));
    }
    Ok(url)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nonce(String);

impl Nonce {
    /// Draws [`NONCE_LEN`] bytes from the operating system CSPRNG.
    pub fn generate() -> Result<Self, SignError> {
        let mut b = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut b)
            .map_err(|e| SignError::Randomness(e.to_string()))?;
        Ok(Self(URL_SAFE_NO_PAD.encode(b)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Nonce {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Everything needed to sign one embed URL. Signing consumes the request, so
/// a nonce is never used twice.
#[derive(Debug)]
pub struct SigningRequest {
    resource: Url,
    resource_query: Vec<(String, String)>,
    secret: Secret,
    nonce: Nonce,
    timestamp: i64,
}

impl SigningRequest {
    /// Validates the inputs, then draws a fresh nonce and reads the clock.
    pub fn new(target_path: &str, host: &str, secret: &Secret) -> Result<Self, SignError> {
        let (resource, resource_query) = validate(target_path, host, secret)?;
        let nonce = Nonce::generate()?;
        Ok(Self {
            resource,
            resource_query,
            secret: secret.clone(),
            nonce,
            timestamp: Utc::now().timestamp(),
        })
    }

    /// Same as [`SigningRequest::new`] with a caller-chosen nonce and time
    /// (seconds since the epoch).
    pub fn with_nonce(
        target_path: &str,
        host: &str,
        secret: &Secret,
        nonce: Nonce,
        timestamp: i64,
    ) -> Result<Self, SignError> {
        let (resource, resource_query) = validate(target_path, host, secret)?;
        Ok(Self {
            resource,
            resource_query,
            secret: secret.clone(),
            nonce,
            timestamp,
        })
    }

    pub fn nonce(&self) -> &Nonce {
        &self.nonce
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn sign(self, user: &User) -> Result<SignedUrl, SignError> {
        let Self {
            resource,
            resource_query,
            secret,
            nonce,
            timestamp,
        } = self;

        if user.external_user_id.trim().is_empty() {
            return Err(SignError::Validation("external_user_id is empty".into()));
        }
        let values = signed_values(&nonce, timestamp, user)?;

        let origin = resource.origin().ascii_serialization();
        let path = embed_path(resource.path(), &resource_query);
        let canonical = canonical_string(&origin, &path, values.iter().map(String::as_str));
        let mac = mac_for(&secret, &canonical)
            .map_err(|_| SignError::Configuration("secret cannot key HMAC-SHA256".into()))?;
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        let mut url = resource;
        {
            let mut q = url.query_pairs_mut();
            q.extend_pairs(&resource_query);
            for (name, value) in SIGNED_PARAMS.iter().zip(values.iter()) {
                q.append_pair(name, value);
            }
            q.append_pair(SIGNATURE_PARAM, &signature);
        }
        Ok(SignedUrl { url, signature })
    }
}

/// A fully-formed signed URL.
#[derive(Clone, Debug)]
pub struct SignedUrl {
    url: Url,
    signature: String,
}

impl SignedUrl {
    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Decoded query parameters in URL order; `signature` comes last.
    pub fn params(&self) -> impl Iterator<Item = (Cow<'_, str>, Cow<'_, str>)> {
        self.url.query_pairs()
    }
}

impl fmt::Display for SignedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

impl From<SignedUrl> for String {
    fn from(s: SignedUrl) -> String {
        s.url.into()
    }
}

/// Signs `target_path` for `user` on `host` with a fresh nonce and the
/// current time.
pub fn create_signed_url(
    target_path: &str,
    user: &User,
    host: &str,
    secret: &Secret,
) -> Result<String, SignError> {
    SigningRequest::new(target_path, host, secret)?
        .sign(user)
        .map(String::from)
}

/// What a verifier learns from a valid signed URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedEmbed {
    pub embed_path: String,
    pub external_user_id: String,
    pub nonce: String,
    pub time: i64,
}

/// Rebuilds the canonical string from `signed` and checks its signature in
/// constant time. Nonce freshness and time windows are left to the caller.
pub fn verify_signed_url(signed: &str, secret: &Secret) -> Result<VerifiedEmbed, VerifyError> {
    let url = Url::parse(signed).map_err(|e| VerifyError::Malformed(e.to_string()))?;
    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

    let Some(((last, signature), rest)) = pairs.split_last() else {
        return Err(VerifyError::MissingParameter(SIGNATURE_PARAM));
    };
    if last != SIGNATURE_PARAM {
        return Err(if rest.iter().any(|(k, _)| k == SIGNATURE_PARAM) {
            VerifyError::Malformed("signature must be the last parameter".into())
        } else {
            VerifyError::MissingParameter(SIGNATURE_PARAM)
        });
    }

    let mut resource = Vec::new();
    let mut found: [Option<&str>; SIGNED_PARAMS.len()] = [None; SIGNED_PARAMS.len()];
    for (k, v) in rest {
        match SIGNED_PARAMS.iter().position(|p| p == k) {
            Some(i) => {
                if found[i].replace(v.as_str()).is_some() {
                    return Err(VerifyError::Malformed(format!("duplicate parameter {k}")));
                }
            }
            None if k == SIGNATURE_PARAM => {
                return Err(VerifyError::Malformed("duplicate signature parameter".into()));
            }
            None => resource.push((k.clone(), v.clone())),
        }
    }
    let mut values = Vec::with_capacity(SIGNED_PARAMS.len());
    for (name, v) in SIGNED_PARAMS.iter().zip(found) {
        values.push(v.ok_or(VerifyError::MissingParameter(*name))?);
    }

    let origin = url.origin().ascii_serialization();
    let path = embed_path(url.path(), &resource);
    let canonical = canonical_string(&origin, &path, values.iter().copied());

    let expected = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|e| VerifyError::Malformed(format!("signature is not base64: {e}")))?;
    mac_for(secret, &canonical)
        .map_err(|_| VerifyError::SignatureMismatch)?
        .verify_slice(&expected)
        .map_err(|_| VerifyError::SignatureMismatch)?;

    let time = values[1]
        .parse::<i64>()
        .map_err(|_| VerifyError::Malformed("time is not an integer".into()))?;
    Ok(VerifiedEmbed {
        embed_path: path,
        external_user_id: values[3].to_string(),
        nonce: values[0].to_string(),
        time,
    })
}

fn validate(
    target_path: &str,
    host: &str,
    secret: &Secret,
) -> Result<(Url, Vec<(String, String)>), SignError> {
    check_secret(secret)?;
    let base = parse_host(host)?;
    resource_url(&base, target_path)
}

fn resource_url(base: &Url, target: &str) -> Result<(Url, Vec<(String, String)>), SignError> {
    if target.is_empty() {
        return Err(SignError::Validation("target path is empty".into()));
    }
    if target.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(SignError::Validation(
            "target path contains whitespace or control characters".into(),
        ));
    }
    if target.contains('#') || target.contains('\\') {
        return Err(SignError::Validation(
            "target path must not contain '#' or '\\'".into(),
        ));
    }
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    };
    if !path.starts_with('/') {
        return Err(SignError::Validation("target path must start with '/'".into()));
    }
    if path.starts_with("//") {
        return Err(SignError::Validation("target path must not start with '//'".into()));
    }
    if path.split('/').any(is_dot_segment) {
        return Err(SignError::Validation(
            "target path must not contain '.' or '..' segments".into(),
        ));
    }

    let pairs = resource_query(query)?;
    if let Some((k, _)) = pairs
        .iter()
        .find(|(k, _)| k == SIGNATURE_PARAM || SIGNED_PARAMS.contains(&k.as_str()))
    {
        return Err(SignError::Validation(format!(
            "target query parameter {k:?} is reserved for signing"
        )));
    }

    let mut url = base.clone();
    url.set_path(path);
    Ok((url, pairs))
}

/// Decodes the target query into pairs. Anything the form re-encoding would
/// not reproduce (empty pieces, bare keys, bytes that are not UTF-8) is
/// rejected so the signed query is the one the caller asked for.
fn resource_query(query: Option<&str>) -> Result<Vec<(String, String)>, SignError> {
    let Some(query) = query else {
        return Ok(Vec::new());
    };
    query
        .split('&')
        .map(|piece| {
            let (key, value) = piece.split_once('=').ok_or_else(|| {
                SignError::Validation(format!("target query parameter {piece:?} has no value"))
            })?;
            if key.is_empty() {
                return Err(SignError::Validation(
                    "target query has an empty parameter name".into(),
                ));
            }
            Ok((form_decode(key)?, form_decode(value)?))
        })
        .collect()
}

fn form_decode(raw: &str) -> Result<String, SignError> {
    let raw = raw.replace('+', " ");
    percent_decode_str(&raw)
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|_| SignError::Validation(format!("target query {raw:?} is not valid UTF-8")))
}

fn is_dot_segment(segment: &str) -> bool {
    let s = segment.to_ascii_lowercase().replace("%2e", ".");
    s == "." || s == ".."
}

fn embed_path(path: &str, resource_query: &[(String, String)]) -> String {
    if resource_query.is_empty() {
        return path.to_string();
    }
    let query = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(resource_query)
        .finish();
    format!("{path}?{query}")
}

fn signed_values(nonce: &Nonce, time: i64, user: &User) -> Result<Vec<String>, SignError> {
    fn opt(v: &Option<String>) -> String {
        v.clone().unwrap_or_default()
    }
    fn json_list<T: Serialize>(field: &str, items: &[T]) -> Result<String, SignError> {
        serde_json::to_string(items)
            .map_err(|e| SignError::Validation(format!("{field} cannot be encoded: {e}")))
    }

    Ok(vec![
        nonce.as_str().to_string(),
        time.to_string(),
        user.session_length.map(|s| s.to_string()).unwrap_or_default(),
        user.external_user_id.clone(),
        opt(&user.first_name),
        opt(&user.last_name),
        json_list("permissions", &user.permissions)?,
        json_list("models", &user.models)?,
        json_list("group_ids", &user.group_ids)?,
        opt(&user.external_group_id),
        canonical_json_string(&Value::Object(user.user_attributes.clone())),
        canonical_json_string(&Value::Object(user.access_filters.clone())),
        opt(&user.user_timezone),
        user.force_logout_login.to_string(),
    ])
}

fn mac_for(secret: &Secret, canonical: &str) -> Result<HmacSha256, InvalidLength> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(canonical.as_bytes());
    Ok(mac)
}
