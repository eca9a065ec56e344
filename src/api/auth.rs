//! Bearer token exchange against `POST /Token`
//!
//! The backend has accepted both `userName` and `username` as the form key
//! over time, so both are tried in that order.

use super::transport::{ApiRequest, Transport, TransportError};
use crate::config::ApiConfig;

const USERNAME_KEYS: [&str; 2] = ["userName", "username"];

/// Exchange credentials for an access token. `None` means every variant failed;
/// the reasons are logged, not returned.
pub async fn authenticate<T: Transport>(
    transport: &T,
    config: &ApiConfig,
    username: &str,
    password: &str,
) -> Option<String> {
    let mut last_error: Option<String> = None;

    for (attempt, key) in USERNAME_KEYS.iter().enumerate() {
        let form = vec![
            (key.to_string(), username.to_string()),
            ("password".to_string(), password.to_string()),
            ("grant_type".to_string(), "password".to_string()),
        ];
        let request = ApiRequest::post_form(config.token_url(), form, config.listing_timeout);

        match transport.send(&request).await {
            Ok(body) => match body.get("access_token").and_then(|t| t.as_str()) {
                Some(token) if !token.is_empty() => return Some(token.to_string()),
                _ => {
                    tracing::warn!(
                        "No access_token in response: {}",
                        crate::util::clip(&body.to_string(), 600)
                    );
                    last_error = Some("response carried no access_token".to_string());
                }
            },
            Err(err) => {
                if let TransportError::Status { status, body, .. } = &err {
                    tracing::warn!("Auth attempt {} failed ({}): {}", attempt + 1, status, body);
                }
                last_error = Some(err.to_string());
            }
        }
    }

    tracing::error!(
        "Authentication failed: {}",
        last_error.as_deref().unwrap_or("unknown error")
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::{Method, TransportError};
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Answers token requests by looking at which username key was sent.
    struct TokenEndpoint {
        accepts_key: &'static str,
        token_body: Value,
        seen_keys: Mutex<Vec<String>>,
    }

    impl Transport for TokenEndpoint {
        async fn send(&self, request: &ApiRequest) -> Result<Value, TransportError> {
            let Method::PostForm(form) = &request.method else {
                panic!("token exchange must be form-encoded");
            };
            let key = form[0].0.clone();
            self.seen_keys.lock().unwrap().push(key.clone());
            assert!(form.contains(&("grant_type".to_string(), "password".to_string())));
            if key == self.accepts_key {
                Ok(self.token_body.clone())
            } else {
                Err(TransportError::Status {
                    url: request.url.clone(),
                    status: 400,
                    body: "invalid_grant".into(),
                })
            }
        }
    }

    fn endpoint(accepts_key: &'static str, token_body: Value) -> TokenEndpoint {
        TokenEndpoint {
            accepts_key,
            token_body,
            seen_keys: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn test_first_variant_wins() {
        let transport = endpoint("userName", json!({"access_token": "tok"}));
        let token = authenticate(&transport, &ApiConfig::default(), "u", "p").await;
        assert_eq!(token.as_deref(), Some("tok"));
        assert_eq!(*transport.seen_keys.lock().unwrap(), vec!["userName"]);
    }

    #[tokio::test]
    async fn test_falls_back_to_lowercase_key() {
        let transport = endpoint("username", json!({"access_token": "tok2"}));
        let token = authenticate(&transport, &ApiConfig::default(), "u", "p").await;
        assert_eq!(token.as_deref(), Some("tok2"));
        assert_eq!(
            *transport.seen_keys.lock().unwrap(),
            vec!["userName", "username"]
        );
    }

    #[tokio::test]
    async fn test_missing_token_field_tries_next_then_gives_up() {
        let transport = endpoint("userName", json!({"token_type": "bearer"}));
        let token = authenticate(&transport, &ApiConfig::default(), "u", "p").await;
        assert_eq!(token, None);
        assert_eq!(transport.seen_keys.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_token_url_comes_from_config() {
        struct UrlCheck;
        impl Transport for UrlCheck {
            async fn send(&self, request: &ApiRequest) -> Result<Value, TransportError> {
                assert_eq!(request.url, "https://cm.test/Token");
                Ok(json!({"access_token": "t"}))
            }
        }
        let config = ApiConfig::new("https://cm.test").unwrap();
        assert!(authenticate(&UrlCheck, &config, "u", "p").await.is_some());
    }
}
