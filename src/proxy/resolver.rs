//! HTTP proxy resolver
//!
//! Resolves a raw proxy identifier through the external proxy service. The
//! service answers with a status code: 100 = ready with parameters, 101 =
//! not ready yet, 102 = permanently unavailable; anything else is treated as
//! an unknown resolver error.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use super::{ProxyParams, ProxyResolution, ProxyResolver};

const STATUS_READY: i64 = 100;
const STATUS_NOT_READY: i64 = 101;
const STATUS_UNAVAILABLE: i64 = 102;

/// Resolver backed by the external proxy HTTP service.
#[derive(Debug, Clone)]
pub struct HttpProxyResolver {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpProxyResolver {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    fn parse_response(&self, body: serde_json::Value) -> ProxyResolution {
        // Status may arrive as a string or a number depending on service
        // version.
        let status = match body.get("status") {
            Some(v) => v
                .as_i64()
                .or_else(|| v.as_str().and_then(|s| s.parse().ok())),
            None => {
                return ProxyResolution::Unknown("response missing 'status' field".into());
            }
        };

        match status {
            Some(STATUS_READY) => match body.get("data") {
                Some(data) => match serde_json::from_value::<ProxyParams>(data.clone()) {
                    Ok(params) => {
                        if let Err(e) = Url::parse(&params.server) {
                            return ProxyResolution::Unknown(format!(
                                "invalid proxy server URL '{}': {}",
                                params.server, e
                            ));
                        }
                        ProxyResolution::Ready(params)
                    }
                    Err(e) => ProxyResolution::Unknown(format!("malformed proxy data: {}", e)),
                },
                None => ProxyResolution::Unknown("ready response missing 'data' field".into()),
            },
            Some(STATUS_NOT_READY) => ProxyResolution::NotReady,
            Some(STATUS_UNAVAILABLE) => ProxyResolution::Unavailable,
            Some(other) => ProxyResolution::Unknown(format!("unexpected status code: {}", other)),
            None => ProxyResolution::Unknown("invalid proxy status code format".into()),
        }
    }
}

#[async_trait]
impl ProxyResolver for HttpProxyResolver {
    async fn resolve(&self, raw_proxy: &str) -> ProxyResolution {
        debug!("Resolving proxy via {}", self.endpoint);

        let response = match self
            .client
            .get(&self.endpoint)
            .query(&[("proxy", raw_proxy)])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!("Proxy resolver request failed: {}", e);
                return ProxyResolution::Unknown(format!("resolver request failed: {}", e));
            }
        };

        let body: serde_json::Value = match response.json().await {
            Ok(b) => b,
            Err(e) => {
                warn!("Proxy resolver returned non-JSON response: {}", e);
                return ProxyResolution::Unknown(format!("invalid resolver response: {}", e));
            }
        };

        self.parse_response(body)
    }
}
