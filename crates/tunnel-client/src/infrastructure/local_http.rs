//! Local HTTP executor backed by `reqwest`.
//!
//! One shared `reqwest::Client` serves every proxied call.  Concurrency
//! towards the local service is capped by a semaphore: a call holds one
//! permit from the moment it is sent until its body stream is dropped, and
//! calls beyond the cap wait for a permit instead of failing.
//!
//! Redirects are never followed.  The relay's client sees the local
//! service's 3xx responses verbatim.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::redirect::Policy;
use tokio::sync::Semaphore;
use tracing::{debug, error};
use tunnel_core::HttpMethod;

use crate::application::ports::{
    BodyStream, LocalCall, LocalCallError, LocalHttpClient, LocalResponse,
};

/// [`LocalHttpClient`] implementation on `reqwest`.
///
/// The client starts stopped; the session starts it on connect and stops it
/// on disconnect.
#[derive(Debug)]
pub struct ReqwestLocalClient {
    client: RwLock<Option<reqwest::Client>>,
    permits: Arc<Semaphore>,
    max_connections: usize,
}

impl ReqwestLocalClient {
    pub fn new(max_connections: usize) -> Self {
        Self {
            client: RwLock::new(None),
            permits: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        }
    }

    pub fn is_running(&self) -> bool {
        self.client.read().unwrap_or_else(|e| e.into_inner()).is_some()
    }

    fn build_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .redirect(Policy::none())
            .pool_max_idle_per_host(self.max_connections)
            .build()
    }

    fn current(&self) -> Option<reqwest::Client> {
        self.client.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
    }
}

/// Converts the call's headers, rejecting names or values HTTP cannot carry.
fn to_header_map(headers: &[(String, String)]) -> Result<HeaderMap, LocalCallError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let header_name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| LocalCallError::Construction(format!("header name {name:?}: {e}")))?;
        let header_value = HeaderValue::from_str(value)
            .map_err(|e| LocalCallError::Construction(format!("header {name} value: {e}")))?;
        map.append(header_name, header_value);
    }
    Ok(map)
}

#[async_trait]
impl LocalHttpClient for ReqwestLocalClient {
    fn start(&self) {
        let mut slot = self.client.write().unwrap_or_else(|e| e.into_inner());
        if slot.is_some() {
            return;
        }
        match self.build_client() {
            Ok(client) => {
                debug!(max_connections = self.max_connections, "local HTTP pool started");
                *slot = Some(client);
            }
            Err(e) => error!("cannot start local HTTP pool: {e}"),
        }
    }

    fn stop(&self) {
        if self
            .client
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some()
        {
            debug!("local HTTP pool stopped");
        }
    }

    async fn send(&self, call: LocalCall) -> Result<LocalResponse, LocalCallError> {
        let client = self.current().ok_or(LocalCallError::PoolStopped)?;

        let url = reqwest::Url::parse(&call.url)
            .map_err(|e| LocalCallError::Construction(format!("url {}: {e}", call.url)))?;
        let headers = to_header_map(&call.headers)?;

        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| LocalCallError::PoolStopped)?;

        let mut request = client
            .request(to_reqwest_method(call.method), url)
            .headers(headers);
        if let Some(body) = call.body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_builder() {
                LocalCallError::Construction(e.to_string())
            } else {
                LocalCallError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        // The permit moves into the stream and is released when the body is
        // dropped: fully read, failed or aborted.
        let body: BodyStream = response
            .bytes_stream()
            .map(move |chunk| {
                let _permit = &permit;
                chunk.map_err(|e| LocalCallError::Network(e.to_string()))
            })
            .boxed();

        Ok(LocalResponse {
            status,
            headers,
            body,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
