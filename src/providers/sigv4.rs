//! AWS Signature Version 4 request signing for Bedrock runtime calls

use super::InvocationError;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Static AWS credentials
#[derive(Debug, Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SigV4Signer {
    credentials: AwsCredentials,
    region: String,
    service: String,
}

impl SigV4Signer {
    pub fn new(credentials: AwsCredentials, region: impl Into<String>) -> Self {
        Self {
            credentials,
            region: region.into(),
            service: "bedrock".to_string(),
        }
    }

    /// Sign a request and return the headers to attach, keyed by lowercase name.
    ///
    /// `host` is part of the signature but is left out of the returned map, the
    /// HTTP client derives it from the URL.
    pub fn sign(
        &self,
        method: &str,
        url: &url::Url,
        headers: &BTreeMap<String, String>,
        body: &[u8],
        timestamp: DateTime<Utc>,
    ) -> Result<BTreeMap<String, String>, InvocationError> {
        let host = url
            .host_str()
            .ok_or_else(|| InvocationError::Signing(format!("missing host in {url}")))?;
        let host = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };

        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();
        let date_stamp = timestamp.format("%Y%m%d").to_string();

        let mut canonical_headers: BTreeMap<String, String> = headers
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v.trim().to_string()))
            .collect();
        canonical_headers.insert("host".to_string(), host);
        canonical_headers.insert("x-amz-date".to_string(), amz_date.clone());
        if let Some(token) = &self.credentials.session_token {
            canonical_headers.insert("x-amz-security-token".to_string(), token.clone());
        }

        let canonical_headers_str: String = canonical_headers
            .iter()
            .map(|(k, v)| format!("{k}:{v}\n"))
            .collect();
        let signed_headers = canonical_headers
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(";");

        let payload_hash = hex::encode(Sha256::digest(body));
        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method.to_uppercase(),
            canonical_uri(url.path()),
            canonical_query(url),
            canonical_headers_str,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!(
            "{}/{}/{}/aws4_request",
            date_stamp, self.region, self.service
        );
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}",
            ALGORITHM,
            amz_date,
            credential_scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let signature = hex::encode(self.signing_hmac(&date_stamp, &string_to_sign)?);

        let authorization = format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, self.credentials.access_key_id, credential_scope, signed_headers, signature
        );

        let mut signed = canonical_headers;
        signed.remove("host");
        signed.insert("authorization".to_string(), authorization);
        Ok(signed)
    }

    fn signing_hmac(&self, date_stamp: &str, string_to_sign: &str) -> Result<Vec<u8>, InvocationError> {
        let k_date = hmac_sha256(
            format!("AWS4{}", self.credentials.secret_access_key).as_bytes(),
            date_stamp.as_bytes(),
        )?;
        let k_region = hmac_sha256(&k_date, self.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, self.service.as_bytes())?;
        let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
        hmac_sha256(&k_signing, string_to_sign.as_bytes())
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, InvocationError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| InvocationError::Signing(format!("HMAC key error: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// RFC 3986 encoding as AWS expects it: unreserved characters pass through,
/// everything else becomes uppercase `%XX`.
pub fn uri_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Non-S3 services sign the path with every segment encoded a second time,
/// so `%3A` in a model id is signed as `%253A`.
fn canonical_uri(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    path.split('/')
        .map(uri_encode)
        .collect::<Vec<_>>()
        .join("/")
}

fn canonical_query(url: &url::Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (uri_encode(&k), uri_encode(&v)))
        .collect();
    pairs.sort();
    pairs
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}
