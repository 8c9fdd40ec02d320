// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared HTTP plumbing for the data sources.

use flagkit_config::{HttpConfig, PeerVerifyMode};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

/// Whether a data-source request may be retried after this status.
/// Authorization and not-found failures are permanent; everything else is
/// treated as transient.
pub fn is_recoverable_status(status: u16) -> bool {
    matches!(status, 408 | 429) || status >= 500
}

/// Build the header map shared by every SDK request.
pub fn base_headers(sdk_key: &str, extra: &[(String, String)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(sdk_key) {
        headers.insert(reqwest::header::AUTHORIZATION, value);
    }
    let user_agent = format!("flagkit-server/{}", env!("CARGO_PKG_VERSION"));
    if let Ok(value) = HeaderValue::from_str(&user_agent) {
        headers.insert(reqwest::header::USER_AGENT, value);
    }
    for (name, value) in extra {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!(header = name.as_str(), "dropping invalid header"),
        }
    }
    headers
}

/// Build a reqwest client from the shared HTTP properties.
pub fn build_client(
    http: &HttpConfig,
    headers: HeaderMap,
    read_timeout: Option<std::time::Duration>,
) -> Result<reqwest::Client, reqwest::Error> {
    let mut builder = reqwest::Client::builder()
        .connect_timeout(http.connect_timeout)
        .default_headers(headers);

    if let Some(timeout) = read_timeout {
        builder = builder.read_timeout(timeout);
    }

    if http.tls.peer_verify_mode == PeerVerifyMode::VerifyNone {
        debug!("TLS peer verification disabled");
        builder = builder.danger_accept_invalid_certs(true);
    }
    if let Some(ca_file) = &http.tls.custom_ca_file {
        match std::fs::read(ca_file) {
            Ok(pem) => match reqwest::Certificate::from_pem(&pem) {
                Ok(cert) => builder = builder.add_root_certificate(cert),
                Err(err) => warn!("could not parse custom CA file {ca_file}: {err}"),
            },
            Err(err) => warn!("could not read custom CA file {ca_file}: {err}"),
        }
    }

    builder.build()
}

/// Join a base URL and a path without doubling slashes.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_statuses() {
        for status in [408, 429, 500, 503] {
            assert!(is_recoverable_status(status), "{status}");
        }
        for status in [400, 401, 403, 404] {
            assert!(!is_recoverable_status(status), "{status}");
        }
    }

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("http://x/", "/all"), "http://x/all");
        assert_eq!(join_url("http://x", "all"), "http://x/all");
    }

    #[test]
    fn base_headers_include_auth_and_agent() {
        let headers = base_headers("sdk-key", &[("X-Custom".into(), "v".into())]);
        assert_eq!(headers.get("authorization").unwrap(), "sdk-key");
        assert!(headers.get("user-agent").is_some());
        assert_eq!(headers.get("x-custom").unwrap(), "v");
    }
}
