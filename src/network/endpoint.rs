//! Endpoint candidate selection

use crate::config::{CredentialSet, ModelType};

/// Known service endpoints, in the order they are tried
pub const DEFAULT_ENDPOINTS: &[&str] = &[
    "wss://openspeech.bytedance.com/api/v3/sauc/bigmodel",
    "wss://openspeech.bytedance.com/ws/v1/stream",
    "wss://openspeech.bytedance.com/api/v2/sauc/bigmodel",
];

/// Prefix `wss://` unless the URL already carries a WebSocket scheme
pub fn normalize(url: &str) -> String {
    let url = url.trim();
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("ws://") || lower.starts_with("wss://") {
        url.to_string()
    } else {
        format!("wss://{}", url)
    }
}

/// Ordered list of endpoints to attempt.
///
/// In custom mode the list is exactly the custom URL (empty when none is
/// configured). Otherwise a configured custom URL goes first, followed by
/// [`DEFAULT_ENDPOINTS`] with that URL skipped if it repeats.
pub fn candidates(credentials: &CredentialSet) -> Vec<String> {
    let custom = credentials.custom_endpoint_url().map(normalize);

    if credentials.model_type == ModelType::Custom {
        return custom.into_iter().collect();
    }

    let mut list: Vec<String> = custom.into_iter().collect();
    for endpoint in DEFAULT_ENDPOINTS {
        if !list.iter().any(|url| url == endpoint) {
            list.push(endpoint.to_string());
        }
    }
    list
}
