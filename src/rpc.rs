//! JSON-over-HTTP calls between nodes.
//!
//! Every capability is a `POST` of a JSON body. Non-2xx replies carry an
//! [`ErrorBody`] and are turned back into the `SdfsError` the remote handler
//! returned, so a `Timeout` on the far side stays a `Timeout` here.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{ErrorBody, Result, SdfsError};

#[derive(Clone, Default)]
pub struct RpcClient {
    http_client: reqwest::Client,
}

impl RpcClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Posts `payload` to `http://{addr}{endpoint}` and decodes the reply.
    ///
    /// A failure to connect is retried once with a fresh dial; any other
    /// failure is returned as is.
    pub async fn post_json<T, R>(
        &self,
        addr: SocketAddr,
        endpoint: &str,
        payload: &T,
        timeout: Duration,
    ) -> Result<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("http://{addr}{endpoint}");
        let mut redialed = false;

        let response = loop {
            let sent = self
                .http_client
                .post(url.clone())
                .json(payload)
                .timeout(timeout)
                .send()
                .await;

            match sent {
                Ok(resp) => break resp,
                Err(e) if e.is_connect() && !redialed => {
                    redialed = true;
                    let jitter = rand::random::<u64>() % 50;
                    tracing::debug!("Connect to {} failed, re-dialing: {}", url, e);
                    tokio::time::sleep(Duration::from_millis(100 + jitter)).await;
                }
                Err(e) => return Err(map_transport_error(&url, e)),
            }
        };

        let status = response.status();
        if status.is_success() {
            return response
                .json::<R>()
                .await
                .map_err(|e| SdfsError::Remote(format!("{url}: malformed reply: {e}")));
        }

        match response.json::<ErrorBody>().await {
            Ok(body) => Err(SdfsError::from_body(body)),
            Err(_) => Err(SdfsError::Remote(format!("{url}: HTTP {status}"))),
        }
    }
}

fn map_transport_error(url: &str, e: reqwest::Error) -> SdfsError {
    if e.is_timeout() {
        SdfsError::Timeout(format!("{url}: no reply"))
    } else if e.is_connect() {
        SdfsError::ConnectionFailure(format!("{url}: {e}"))
    } else {
        SdfsError::Remote(format!("{url}: {e}"))
    }
}

/// Positive reply for calls that carry no data.
#[derive(Debug, Clone, Copy, Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Ack {
    pub ok: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}
