//! Connection-time authentication parameters
//!
//! The transport cannot carry custom headers, so credentials travel in the
//! query string of the connection URL.

use rand::distributions::Alphanumeric;
use rand::Rng;
use url::form_urlencoded;

use crate::config::CredentialSet;

/// Length of the cache-busting nonce
pub const NONCE_LENGTH: usize = 9;

/// Which credential shape is used for a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    KeyPair,
    Token,
    Anonymous,
}

impl AuthMode {
    /// Select the mode: key pair first, then token, then anonymous
    pub fn select(credentials: &CredentialSet) -> Self {
        if credentials.has_key_pair() {
            AuthMode::KeyPair
        } else if credentials.has_token() {
            AuthMode::Token
        } else {
            AuthMode::Anonymous
        }
    }
}

/// Build the authentication query string for the current time
pub fn build(credentials: &CredentialSet) -> String {
    build_with(
        credentials,
        chrono::Utc::now().timestamp_millis(),
        &generate_nonce(),
    )
}

/// Build the authentication query string with an explicit timestamp and nonce
pub fn build_with(credentials: &CredentialSet, timestamp_ms: i64, nonce: &str) -> String {
    let mut query = form_urlencoded::Serializer::new(String::new());

    match AuthMode::select(credentials) {
        AuthMode::KeyPair => {
            if let Some(id) = credentials.access_key_id() {
                query.append_pair("access_key_id", id);
            }
            if let Some(secret) = credentials.access_key_secret() {
                query.append_pair("access_key_secret", secret);
            }
        }
        AuthMode::Token => {
            if let Some(app_id) = credentials.app_id() {
                query.append_pair("app_id", app_id);
            }
            if let Some(token) = credentials.access_token() {
                query.append_pair("access_token", token);
            }
        }
        AuthMode::Anonymous => {}
    }

    query.append_pair("timestamp", &timestamp_ms.to_string());
    query.append_pair("nonce", nonce);
    query.finish()
}

/// Append the authentication query string to an endpoint URL
pub fn authenticated_url(url: &str, credentials: &CredentialSet) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}", url, separator, build(credentials))
}

/// Random alphanumeric nonce
pub fn generate_nonce() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LENGTH)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(query: &str) -> Vec<String> {
        form_urlencoded::parse(query.as_bytes())
            .map(|(k, _)| k.into_owned())
            .collect()
    }

    #[test]
    fn test_key_pair_mode() {
        let creds = CredentialSet::key_pair("AKID", "SECRET");
        let query = build_with(&creds, 1700000000000, "abc123xyz");
        assert_eq!(
            query,
            "access_key_id=AKID&access_key_secret=SECRET&timestamp=1700000000000&nonce=abc123xyz"
        );
    }

    #[test]
    fn test_token_mode() {
        let creds = CredentialSet::token("7547060066", "tok");
        let query = build(&creds);
        assert_eq!(
            keys(&query),
            vec!["app_id", "access_token", "timestamp", "nonce"]
        );
        assert!(!query.contains("access_key"));
    }

    #[test]
    fn test_key_pair_takes_precedence() {
        let creds = CredentialSet {
            access_key_id: Some("AKID".to_string()),
            app_id: Some("app".to_string()),
            access_token: Some("tok".to_string()),
            ..Default::default()
        };
        assert_eq!(AuthMode::select(&creds), AuthMode::KeyPair);

        let query = build(&creds);
        assert_eq!(keys(&query), vec!["access_key_id", "timestamp", "nonce"]);
        assert!(!query.contains("app_id"));
        assert!(!query.contains("access_token"));
    }

    #[test]
    fn test_partial_pairs() {
        let creds = CredentialSet {
            access_key_secret: Some("only-secret".to_string()),
            ..Default::default()
        };
        assert_eq!(keys(&build(&creds)), vec!["access_key_secret", "timestamp", "nonce"]);

        let creds = CredentialSet {
            access_token: Some("only-token".to_string()),
            ..Default::default()
        };
        assert_eq!(keys(&build(&creds)), vec!["access_token", "timestamp", "nonce"]);
    }

    #[test]
    fn test_anonymous_mode() {
        let creds = CredentialSet::default();
        assert_eq!(AuthMode::select(&creds), AuthMode::Anonymous);
        assert_eq!(keys(&build(&creds)), vec!["timestamp", "nonce"]);
    }

    #[test]
    fn test_empty_fields_are_ignored() {
        let creds = CredentialSet {
            access_key_id: Some(String::new()),
            app_id: Some("app".to_string()),
            ..Default::default()
        };
        assert_eq!(AuthMode::select(&creds), AuthMode::Token);
    }

    #[test]
    fn test_values_are_encoded() {
        let creds = CredentialSet::token("a&b", "t=1");
        let query = build_with(&creds, 1, "n");
        assert_eq!(query, "app_id=a%26b&access_token=t%3D1&timestamp=1&nonce=n");
    }

    #[test]
    fn test_nonce_format() {
        let nonce = generate_nonce();
        assert_eq!(nonce.len(), NONCE_LENGTH);
        assert!(nonce.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_timestamp_is_current() {
        let before = chrono::Utc::now().timestamp_millis();
        let query = build(&CredentialSet::default());
        let timestamp: i64 = form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == "timestamp")
            .map(|(_, v)| v.parse().unwrap())
            .unwrap();
        assert!(timestamp >= before);
    }

    #[test]
    fn test_authenticated_url() {
        let creds = CredentialSet::token("app", "tok");
        let url = authenticated_url("wss://asr.example.com/stream", &creds);
        assert!(url.starts_with("wss://asr.example.com/stream?app_id=app&access_token=tok&"));

        let url = authenticated_url("wss://asr.example.com/stream?region=cn", &creds);
        assert!(url.starts_with("wss://asr.example.com/stream?region=cn&app_id=app"));
    }
}
