//! Asset access abstraction.
//!
//! All network access goes through the [`AssetAccessor`] trait so the engine
//! never talks to a socket directly. The production implementation wraps
//! `reqwest`; tests swap in [`tests::MockAssetAccessor`] with canned
//! responses and never touch the network.

use bytes::Bytes;
use futures::future::BoxFuture;
use thiserror::Error;

/// Errors produced while fetching an asset.
///
/// A response with a non-2xx status is *not* an error at this layer; it is
/// returned as an [`AssetResponse`] and judged by the caller.
#[derive(Debug, Error)]
pub enum AccessorError {
    /// The URL could not be parsed or is not fetchable.
    #[error("invalid asset url '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// No response was received: DNS failure, refused connection, timeout.
    #[error("transport failure for '{url}': {message}")]
    Transport { url: String, message: String },
}

/// A completed asset request.
#[derive(Debug, Clone)]
pub struct AssetResponse {
    /// Final URL of the response, after any redirects.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response body.
    pub data: Bytes,
}

impl AssetResponse {
    /// True for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Fetches asset bytes by URL.
///
/// Implementations must be callable from any thread and may resolve their
/// futures on any thread; the load pipeline awaits them from worker tasks.
pub trait AssetAccessor: Send + Sync {
    /// Issues a GET request for `url`.
    fn request_asset(&self, url: &str) -> BoxFuture<'static, Result<AssetResponse, AccessorError>>;
}

/// [`AssetAccessor`] backed by a shared [`reqwest::Client`].
pub struct ReqwestAccessor {
    client: reqwest::Client,
}

impl ReqwestAccessor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Wraps an existing client, so the host can configure proxies, TLS, or
    /// connection pooling once and share it.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestAccessor {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetAccessor for ReqwestAccessor {
    fn request_asset(&self, url: &str) -> BoxFuture<'static, Result<AssetResponse, AccessorError>> {
        let client = self.client.clone();
        let url = url.to_string();
        Box::pin(async move {
            let response =
                client
                    .get(&url)
                    .send()
                    .await
                    .map_err(|err| AccessorError::Transport {
                        url: url.clone(),
                        message: err.to_string(),
                    })?;

            let status = response.status().as_u16();
            let final_url = response.url().to_string();
            let data = response
                .bytes()
                .await
                .map_err(|err| AccessorError::Transport {
                    url: final_url.clone(),
                    message: err.to_string(),
                })?;

            Ok(AssetResponse {
                url: final_url,
                status,
                data,
            })
        })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Canned-response accessor for tests. Records every requested URL.
    #[derive(Default)]
    pub struct MockAssetAccessor {
        responses: Mutex<HashMap<String, (u16, Bytes)>>,
        requests: Mutex<Vec<String>>,
    }

    impl MockAssetAccessor {
        pub fn new() -> Self {
            Self::default()
        }

        /// Registers a 200 response for `url`.
        pub fn with_response(self, url: &str, data: impl Into<Bytes>) -> Self {
            self.with_status(url, 200, data)
        }

        /// Registers a response with an explicit status for `url`.
        pub fn with_status(self, url: &str, status: u16, data: impl Into<Bytes>) -> Self {
            self.responses
                .lock()
                .insert(url.to_string(), (status, data.into()));
            self
        }

        /// URLs requested so far, in order.
        pub fn requested_urls(&self) -> Vec<String> {
            self.requests.lock().clone()
        }

        /// Number of requests issued for `url`.
        pub fn request_count(&self, url: &str) -> usize {
            self.requests.lock().iter().filter(|u| *u == url).count()
        }
    }

    impl AssetAccessor for MockAssetAccessor {
        fn request_asset(
            &self,
            url: &str,
        ) -> BoxFuture<'static, Result<AssetResponse, AccessorError>> {
            self.requests.lock().push(url.to_string());
            let canned = self.responses.lock().get(url).cloned();
            let url = url.to_string();
            Box::pin(async move {
                match canned {
                    Some((status, data)) => Ok(AssetResponse { url, status, data }),
                    None => Err(AccessorError::Transport {
                        url,
                        message: "no canned response".to_string(),
                    }),
                }
            })
        }
    }

    #[test]
    fn test_mock_returns_canned_response() {
        let accessor = MockAssetAccessor::new().with_response("http://host/a.bin", &b"abc"[..]);

        let response = futures::executor::block_on(accessor.request_asset("http://host/a.bin"))
            .expect("canned response");
        assert_eq!(response.status, 200);
        assert!(response.is_success());
        assert_eq!(&response.data[..], b"abc");
        assert_eq!(accessor.request_count("http://host/a.bin"), 1);
    }

    #[test]
    fn test_mock_unknown_url_is_transport_failure() {
        let accessor = MockAssetAccessor::new();
        let result = futures::executor::block_on(accessor.request_asset("http://host/missing"));
        assert!(matches!(result, Err(AccessorError::Transport { .. })));
    }

    #[test]
    fn test_non_success_status_is_not_an_error() {
        let accessor = MockAssetAccessor::new().with_status("http://host/gone", 404, &b""[..]);
        let response = futures::executor::block_on(accessor.request_asset("http://host/gone"))
            .expect("status responses are not transport errors");
        assert_eq!(response.status, 404);
        assert!(!response.is_success());
    }
}
