// Copyright 2025-Present cwl-forwarder contributors
// SPDX-License-Identifier: Apache-2.0

//! Signature Version 4 request signing.
//!
//! The signing key is derived in four HMAC-SHA256 stages (date, region, service,
//! `aws4_request`) from the secret access key and signs a canonical form of the
//! request: method, path, the sorted lower-cased headers and the SHA-256 of the body.

use crate::credentials::{Credentials, CredentialsFactory};
use crate::error::SigningError;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use sha2::{Digest, Sha256};
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const TERMINATOR: &str = "aws4_request";

lazy_static! {
    static ref HOST_REGEX: Regex =
        Regex::new(r"^([^\.]+)\.?([^\.]*)\.?([^\.]*)\.amazonaws\.com$")
            .expect("failed creating regex");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningScope {
    pub region: String,
    pub service: String,
}

impl SigningScope {
    pub fn new(region: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            service: service.into(),
        }
    }

    /// Reads region and service from a `<name>.<region>.<service>.amazonaws.com` host.
    ///
    /// # Examples
    ///
    /// ```
    /// use cwl_forwarder::signer::SigningScope;
    ///
    /// let scope = SigningScope::from_host("search-logs-abc.us-east-1.es.amazonaws.com").unwrap();
    /// assert_eq!(scope.region, "us-east-1");
    /// assert_eq!(scope.service, "es");
    /// ```
    pub fn from_host(host: &str) -> Result<Self, SigningError> {
        let captures = HOST_REGEX
            .captures(host)
            .ok_or_else(|| SigningError::InvalidHost(host.to_string()))?;
        let region = captures.get(2).map_or("", |m| m.as_str());
        let service = captures.get(3).map_or("", |m| m.as_str());
        if region.is_empty() || service.is_empty() {
            return Err(SigningError::InvalidHost(host.to_string()));
        }
        Ok(Self::new(region, service))
    }

    fn credential_scope(&self, date: &str) -> String {
        format!("{date}/{}/{}/{TERMINATOR}", self.region, self.service)
    }
}

/// A request before signing. `Host`, `Content-Length`, `X-Amz-Date` and the session
/// token header are added by the signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedRequest {
    pub host: String,
    pub method: String,
    pub path: String,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

impl UnsignedRequest {
    pub fn post(host: impl Into<String>, path: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            method: "POST".to_string(),
            path: path.into(),
            body: body.into(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub host: String,
    pub method: String,
    pub path: String,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

impl SignedRequest {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Headers for the HTTP client. `Content-Length` is left out; the client derives
    /// the same value from the body.
    pub fn header_map(&self) -> Result<HeaderMap, SigningError> {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| SigningError::InvalidHeader(name.clone()))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| SigningError::InvalidHeader(name.clone()))?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }
}

/// Signs requests with credentials resolved once from the factory.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credentials_factory: Arc<CredentialsFactory>,
}

impl RequestSigner {
    pub fn new(credentials_factory: Arc<CredentialsFactory>) -> Self {
        Self {
            credentials_factory,
        }
    }

    pub async fn sign(
        &self,
        request: UnsignedRequest,
        scope: &SigningScope,
    ) -> Result<SignedRequest, SigningError> {
        self.sign_at(request, scope, Utc::now()).await
    }

    pub async fn sign_at(
        &self,
        request: UnsignedRequest,
        scope: &SigningScope,
        now: DateTime<Utc>,
    ) -> Result<SignedRequest, SigningError> {
        let credentials = self
            .credentials_factory
            .get_credentials()
            .await
            .ok_or(SigningError::MissingCredentials)?;
        Ok(sign_request(request, credentials, scope, now))
    }
}

pub fn sign_request(
    request: UnsignedRequest,
    credentials: &Credentials,
    scope: &SigningScope,
    now: DateTime<Utc>,
) -> SignedRequest {
    let datetime = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = &datetime[..8];

    let UnsignedRequest {
        host,
        method,
        path,
        body,
        mut headers,
    } = request;
    headers.push(("Host".to_string(), host.clone()));
    headers.push(("Content-Length".to_string(), body.len().to_string()));
    if let Some(token) = &credentials.session_token {
        headers.push(("X-Amz-Security-Token".to_string(), token.clone()));
    }
    headers.push(("X-Amz-Date".to_string(), datetime.clone()));

    let (canonical, signed_headers) = canonical_request(&method, &path, &headers, &body);
    let credential_scope = scope.credential_scope(date);
    let to_sign = string_to_sign(&datetime, &credential_scope, &canonical);
    let key = signing_key(&credentials.secret_access_key, date, scope);
    let signature = hex::encode(hmac(&key, &to_sign));

    headers.push((
        "Authorization".to_string(),
        format!(
            "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={signed_headers}, Signature={signature}",
            credentials.access_key_id
        ),
    ));

    SignedRequest {
        host,
        method,
        path,
        body,
        headers,
    }
}

/// Returns the canonical request and the `;` joined signed header names.
#[must_use]
pub fn canonical_request(
    method: &str,
    path: &str,
    headers: &[(String, String)],
    body: &str,
) -> (String, String) {
    let mut sorted: Vec<(String, &str)> = headers
        .iter()
        .map(|(name, value)| (name.to_lowercase(), value.trim()))
        .collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let canonical_headers = sorted
        .iter()
        .map(|(name, value)| format!("{name}:{value}"))
        .collect::<Vec<_>>()
        .join("\n");
    let signed_headers = sorted
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let body_hash = sha256_hex(body.as_bytes());
    let canonical = [
        method,
        path,
        "",
        canonical_headers.as_str(),
        "",
        signed_headers.as_str(),
        body_hash.as_str(),
    ]
    .join("\n");
    (canonical, signed_headers)
}

#[must_use]
pub fn string_to_sign(datetime: &str, credential_scope: &str, canonical_request: &str) -> String {
    let request_hash = sha256_hex(canonical_request.as_bytes());
    [ALGORITHM, datetime, credential_scope, request_hash.as_str()].join("\n")
}

/// `kSigning = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")`
#[must_use]
pub fn signing_key(secret_access_key: &str, date: &str, scope: &SigningScope) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{secret_access_key}").as_bytes(), date);
    let k_region = hmac(&k_date, &scope.region);
    let k_service = hmac(&k_region, &scope.service);
    hmac(&k_service, TERMINATOR)
}

fn hmac(key: &[u8], data: &str) -> Vec<u8> {
    // HMAC takes keys of any length.
    #[allow(clippy::expect_used)]
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SECRET: &str = "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY";

    fn credentials(token: Option<&str>) -> Credentials {
        Credentials::new("AKIDEXAMPLE", SECRET, token.map(str::to_string))
    }

    #[test]
    fn test_scope_from_host() {
        let scope = SigningScope::from_host("search-logs.eu-west-1.es.amazonaws.com").unwrap();
        assert_eq!(scope, SigningScope::new("eu-west-1", "es"));
    }

    #[test]
    fn test_scope_from_invalid_host() {
        for host in [
            "localhost",
            "search-logs.es.example.com",
            "search-logs.amazonaws.com",
            "search-logs.us-east-1.amazonaws.com",
        ] {
            assert_eq!(
                SigningScope::from_host(host),
                Err(SigningError::InvalidHost(host.to_string())),
                "{host}"
            );
        }
    }

    #[test]
    fn test_empty_body_hash() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_signing_key_derivation() {
        let key = signing_key(SECRET, "20120215", &SigningScope::new("us-east-1", "iam"));
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_get_vanilla_signature() {
        let headers = vec![
            ("Host".to_string(), "example.amazonaws.com".to_string()),
            ("X-Amz-Date".to_string(), "20150830T123600Z".to_string()),
        ];
        let (canonical, signed_headers) = canonical_request("GET", "/", &headers, "");
        assert_eq!(
            canonical,
            "GET\n/\n\nhost:example.amazonaws.com\nx-amz-date:20150830T123600Z\n\nhost;x-amz-date\ne3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(signed_headers, "host;x-amz-date");

        let scope = SigningScope::new("us-east-1", "service");
        let to_sign = string_to_sign(
            "20150830T123600Z",
            &scope.credential_scope("20150830"),
            &canonical,
        );
        let signature = hex::encode(hmac(&signing_key(SECRET, "20150830", &scope), &to_sign));
        assert_eq!(
            signature,
            "5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
        );
    }

    #[test]
    fn test_sign_request_headers() {
        let now = Utc.with_ymd_and_hms(2016, 8, 17, 12, 30, 45).unwrap();
        let request = UnsignedRequest::post(
            "search-logs.us-east-1.es.amazonaws.com",
            "/_bulk",
            "{}\n",
        )
        .with_header("Content-Type", "application/json");
        let scope = SigningScope::new("us-east-1", "es");
        let signed = sign_request(request, &credentials(Some("token-1")), &scope, now);

        assert_eq!(signed.header("x-amz-date"), Some("20160817T123045Z"));
        assert_eq!(signed.header("Content-Length"), Some("3"));
        assert_eq!(signed.header("X-Amz-Security-Token"), Some("token-1"));
        assert_eq!(
            signed.header("Host"),
            Some("search-logs.us-east-1.es.amazonaws.com")
        );

        let authorization = signed.header("Authorization").unwrap();
        assert!(authorization.starts_with(
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20160817/us-east-1/es/aws4_request, "
        ));
        assert!(authorization.contains(
            "SignedHeaders=content-length;content-type;host;x-amz-date;x-amz-security-token, "
        ));
        let signature = authorization.rsplit("Signature=").next().unwrap();
        assert_eq!(signature.len(), 64);
    }

    #[test]
    fn test_sign_request_without_session_token() {
        let now = Utc.with_ymd_and_hms(2016, 8, 17, 0, 0, 0).unwrap();
        let request = UnsignedRequest::post("h.us-east-1.es.amazonaws.com", "/_bulk", "");
        let signed = sign_request(
            request,
            &credentials(None),
            &SigningScope::new("us-east-1", "es"),
            now,
        );
        assert!(signed.header("X-Amz-Security-Token").is_none());
        assert!(signed
            .header("Authorization")
            .unwrap()
            .contains("SignedHeaders=content-length;host;x-amz-date, "));
    }

    #[test]
    fn test_signature_is_deterministic() {
        let now = Utc.with_ymd_and_hms(2016, 8, 17, 0, 0, 0).unwrap();
        let scope = SigningScope::new("us-east-1", "es");
        let request = UnsignedRequest::post("h.us-east-1.es.amazonaws.com", "/_bulk", "body");
        let first = sign_request(request.clone(), &credentials(None), &scope, now);
        let second = sign_request(request, &credentials(None), &scope, now);
        assert_eq!(first, second);

        let other_body = UnsignedRequest::post("h.us-east-1.es.amazonaws.com", "/_bulk", "other");
        let third = sign_request(other_body, &credentials(None), &scope, now);
        assert_ne!(first.header("Authorization"), third.header("Authorization"));
    }

    #[test]
    fn test_header_map_skips_content_length() {
        let now = Utc.with_ymd_and_hms(2016, 8, 17, 0, 0, 0).unwrap();
        let request = UnsignedRequest::post("h.us-east-1.es.amazonaws.com", "/_bulk", "body")
            .with_header("Content-Type", "application/json");
        let signed = sign_request(
            request,
            &credentials(None),
            &SigningScope::new("us-east-1", "es"),
            now,
        );
        let map = signed.header_map().unwrap();
        assert!(map.get("content-length").is_none());
        assert_eq!(map.get("content-type").unwrap(), "application/json");
        assert!(map.get("authorization").is_some());
    }

    #[test]
    fn test_header_map_rejects_invalid_value() {
        let signed = SignedRequest {
            host: "h".to_string(),
            method: "POST".to_string(),
            path: "/".to_string(),
            body: String::new(),
            headers: vec![("X-Bad".to_string(), "line\nbreak".to_string())],
        };
        assert_eq!(
            signed.header_map(),
            Err(SigningError::InvalidHeader("X-Bad".to_string()))
        );
    }

    #[tokio::test]
    async fn test_signer_without_credentials() {
        let factory = CredentialsFactory::new_from_resolver(Arc::new(
            || -> crate::credentials::CredentialsFuture { Box::pin(async { None }) },
        ));
        let signer = RequestSigner::new(Arc::new(factory));
        let result = signer
            .sign(
                UnsignedRequest::post("h.us-east-1.es.amazonaws.com", "/_bulk", ""),
                &SigningScope::new("us-east-1", "es"),
            )
            .await;
        assert_eq!(result, Err(SigningError::MissingCredentials));
    }
}
