use base64::{decode_config, encode_config, STANDARD};
use hmac::{Hmac, Mac, NewMac};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use sha2::{Digest, Sha256, Sha512};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use url::form_urlencoded;

use crate::config::Credentials;
use crate::error::Error;

const KRAKEN_API_BASE: &str = "https://api.kraken.com";

/// Sign a private API request the way Kraken expects it:
/// HMAC-SHA512(base64-decoded secret, path + SHA256(nonce + body)),
/// base64-encoded. `payload` is the final form-encoded POST body,
/// nonce field included.
pub fn sign_message(path: &str, payload: &str, secret: &str, nonce: u64) -> Result<String, Error> {
    let mut hasher = Sha256::new();
    hasher.update(nonce.to_string().as_bytes());
    hasher.update(payload.as_bytes());
    let digest = hasher.finalize();

    let secret = decode_config(secret, STANDARD)
        .map_err(|_| Error::Config("KRAKEN_SECRET is not valid base64".to_string()))?;
    let mut mac = Hmac::<Sha512>::new_varkey(&secret)
        .map_err(|_| Error::Config("KRAKEN_SECRET has an invalid key length".to_string()))?;
    mac.update(path.as_bytes());
    mac.update(&digest);

    Ok(encode_config(&mac.finalize().into_bytes(), STANDARD))
}

/// Nonce source for private calls: wall clock in milliseconds times 1000,
/// clamped so that every call observes a strictly greater value than the
/// previous one even when two calls land in the same millisecond.
pub struct NonceGenerator {
    last: AtomicU64,
}

impl NonceGenerator {
    pub fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    pub fn next(&self) -> u64 {
        let clock = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
            * 1000;
        let mut prev = self.last.load(Ordering::SeqCst);
        loop {
            let next = clock.max(prev + 1);
            match self
                .last
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }
}

/// The `{result, error}` wrapper every Kraken response carries. Returned
/// uninterpreted by the transport; callers decide severity.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Vec<String>,
}

impl Envelope {
    /// Treat any exchange-level error as fatal and unwrap the result.
    pub fn into_result(self) -> Result<serde_json::Value, Error> {
        if !self.error.is_empty() {
            return Err(Error::Exchange(self.error.join(", ")));
        }
        self.result.ok_or_else(|| {
            Error::ResponseShape("response carried neither result nor error".to_string())
        })
    }
}

pub struct KrakenClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    nonce: NonceGenerator,
}

impl KrakenClient {
    pub fn new(credentials: Credentials) -> Self {
        Self::with_base_url(credentials, KRAKEN_API_BASE)
    }

    /// Point the client at another host. Tests use this.
    pub fn with_base_url(credentials: Credentials, base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.to_string(),
            credentials,
            nonce: NonceGenerator::new(),
        }
    }

    /// Unauthenticated GET. `path` carries its own query string.
    pub async fn fetch_public(&self, path: &str) -> Result<Envelope, Error> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await?;
        read_envelope(path, response).await
    }

    /// Authenticated POST: form-encodes `payload` plus a fresh nonce,
    /// signs the body, and sends it with the API-Key/API-Sign headers.
    pub async fn fetch_private(
        &self,
        path: &str,
        payload: &[(&str, String)],
    ) -> Result<Envelope, Error> {
        let nonce = self.nonce.next();

        let body = {
            let mut form = form_urlencoded::Serializer::new(String::new());
            for (key, value) in payload {
                form.append_pair(key, value);
            }
            form.append_pair("nonce", &nonce.to_string());
            form.finish()
        };

        let signature = sign_message(path, &body, &self.credentials.api_secret, nonce)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "API-Key",
            HeaderValue::from_str(&self.credentials.api_key)
                .map_err(|_| Error::Config("KRAKEN_KEY is not a valid header value".to_string()))?,
        );
        headers.insert(
            "API-Sign",
            HeaderValue::from_str(&signature)
                .map_err(|_| Error::Config("signature is not a valid header value".to_string()))?,
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("kraken-dca"));
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );

        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .headers(headers)
            .body(body)
            .send()
            .await?;
        read_envelope(path, response).await
    }
}

async fn read_envelope(path: &str, response: reqwest::Response) -> Result<Envelope, Error> {
    let status = response.status();
    if !status.is_success() {
        return Err(Error::Transport {
            path: path.to_string(),
            status: status.as_u16(),
        });
    }
    let text = response.text().await?;
    serde_json::from_str(&text)
        .map_err(|e| Error::ResponseShape(format!("invalid envelope from {}: {}", path, e)))
}
