use crate::payments::error::{PaymentError, PaymentResult};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::warn;

#[derive(Clone)]
pub struct PaymentHttpClient {
    client: Client,
    timeout: Duration,
    max_retries: u32,
}

impl PaymentHttpClient {
    pub fn new(timeout: Duration, max_retries: u32) -> PaymentResult<Self> {
        let client =
            Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| PaymentError::NetworkError {
                    message: format!("failed to initialize HTTP client: {}", e),
                })?;

        Ok(Self {
            client,
            timeout,
            max_retries,
        })
    }

    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        bearer_token: Option<&str>,
        body: Option<&JsonValue>,
        additional_headers: &[(&str, &str)],
    ) -> PaymentResult<T> {
        self.request(method, url, bearer_token, RequestBody::Json(body), additional_headers)
            .await
    }

    /// Form-encoded variant (Stripe's API is form-based)
    pub async fn request_form<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        bearer_token: Option<&str>,
        form: &[(String, String)],
        additional_headers: &[(&str, &str)],
    ) -> PaymentResult<T> {
        self.request(method, url, bearer_token, RequestBody::Form(form), additional_headers)
            .await
    }

    /// Basic-auth variant without a body (OAuth token exchanges)
    pub async fn request_basic_form<T: DeserializeOwned>(
        &self,
        url: &str,
        username: &str,
        password: &str,
        form: &[(String, String)],
    ) -> PaymentResult<T> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            let request = self
                .client
                .post(url)
                .timeout(self.timeout)
                .basic_auth(username, Some(password))
                .form(form);

            match Self::dispatch::<T>(request).await {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }
                    return Err(PaymentError::NetworkError {
                        message: "provider request failed".to_string(),
                    });
                }
                Err(e) => {
                    if e.is_retryable() && attempt < self.max_retries {
                        last_error = Some(e);
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or(PaymentError::NetworkError {
            message: "provider request failed".to_string(),
        }))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        bearer_token: Option<&str>,
        body: RequestBody<'_>,
        additional_headers: &[(&str, &str)],
    ) -> PaymentResult<T> {
        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            let mut request = self.client.request(method.clone(), url);
            request = request.timeout(self.timeout);

            if let Some(token) = bearer_token {
                request = request.bearer_auth(token);
            }
            for (k, v) in additional_headers {
                request = request.header(*k, *v);
            }
            match body {
                RequestBody::Json(Some(payload)) => request = request.json(payload),
                RequestBody::Json(None) => {}
                RequestBody::Form(form) => request = request.form(form),
            }

            match Self::dispatch::<T>(request).await {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {
                    // transient transport failure, retry below
                    if attempt < self.max_retries {
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }
                    return Err(PaymentError::NetworkError {
                        message: "provider request failed".to_string(),
                    });
                }
                Err(e) => {
                    if e.is_retryable() && attempt < self.max_retries {
                        warn!(
                            error = %e,
                            attempt = attempt + 1,
                            "provider request failed, retrying"
                        );
                        last_error = Some(e);
                        tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or(PaymentError::NetworkError {
            message: "provider request failed".to_string(),
        }))
    }

    /// Send one request. `Ok(None)` signals a retryable transport error.
    async fn dispatch<T: DeserializeOwned>(
        request: reqwest::RequestBuilder,
    ) -> PaymentResult<Option<T>> {
        let response = match request.send().await {
            Ok(resp) => resp,
            Err(_) => return Ok(None),
        };

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if status.is_success() {
            return serde_json::from_str::<T>(&text)
                .map(Some)
                .map_err(|e| PaymentError::ProviderError {
                    provider: "http".to_string(),
                    message: format!("invalid provider JSON response: {}", e),
                    provider_code: None,
                    retryable: false,
                });
        }

        if status.as_u16() == 429 {
            return Err(PaymentError::RateLimitError {
                message: "provider rate limit exceeded".to_string(),
                retry_after_seconds: None,
            });
        }

        Err(PaymentError::ProviderError {
            provider: "http".to_string(),
            message: format!("HTTP {}: {}", status, text),
            provider_code: Some(status.as_u16().to_string()),
            retryable: status.is_server_error(),
        })
    }
}

enum RequestBody<'a> {
    Json(Option<&'a JsonValue>),
    Form(&'a [(String, String)]),
}

pub fn hmac_sha256_hex(payload: &[u8], secret: &str) -> Option<String> {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(v) => v,
        Err(_) => return None,
    };
    mac.update(payload);
    Some(hex::encode(mac.finalize().into_bytes()))
}

pub fn verify_hmac_sha256_hex(payload: &[u8], secret: &str, signature: &str) -> bool {
    match hmac_sha256_hex(payload, secret) {
        Some(computed) => secure_eq(computed.as_bytes(), signature.trim().as_bytes()),
        None => false,
    }
}

pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secure_eq_behaves_correctly() {
        assert!(secure_eq(b"abc", b"abc"));
        assert!(!secure_eq(b"abc", b"abd"));
        assert!(!secure_eq(b"abc", b"ab"));
    }

    #[test]
    fn webhook_hmac_verification_detects_invalid_signature() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let valid = verify_hmac_sha256_hex(payload, "secret", "not-a-valid-signature");
        assert!(!valid);
    }

    #[test]
    fn webhook_hmac_verification_accepts_own_signature() {
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let signature = hmac_sha256_hex(payload, "secret").expect("hmac should compute");
        assert!(verify_hmac_sha256_hex(payload, "secret", &signature));
    }
}
