use crate::error::FetchError;
use anyhow::anyhow;
use reqwest::{Client, StatusCode, header};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Thin HTTP client shared by all adapters.
#[derive(Clone, Debug, Default)]
pub struct RpcClient {
    client: Client,
}

impl RpcClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// JSON-RPC 2.0 POST call. A `null` result is reported as not found.
    pub async fn call<T: DeserializeOwned>(
        &self,
        url: &str,
        method: &str,
        params: Value,
    ) -> Result<T, FetchError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        let resp = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FetchError::Upstream(anyhow!(
                "{method}: unexpected response: {status} - {body}"
            )));
        }
        let response: JsonRpcResponse = serde_json::from_slice(&resp.bytes().await?)?;
        if let Some(err) = response.error {
            return Err(FetchError::Upstream(anyhow!(
                "{method}: rpc error {}: {}",
                err.code,
                err.message
            )));
        }
        match response.result {
            None | Some(Value::Null) => Err(FetchError::not_found(format!("{method}: empty result"))),
            Some(result) => Ok(serde_json::from_value(result)?),
        }
    }

    /// Plain REST GET. 404 is reported as not found.
    pub async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        self.get_with_query(url, &[]).await
    }

    /// REST GET with query parameters; a key may repeat, e.g. several `events` filters.
    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        match resp.status() {
            status if status.is_success() => Ok(serde_json::from_slice(&resp.bytes().await?)?),
            StatusCode::NOT_FOUND => Err(FetchError::not_found(format!("{url}: 404"))),
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(FetchError::Upstream(anyhow!(
                    "{url}: unexpected response: {status} - {body}"
                )))
            }
        }
    }

    /// Tendermint RPC over GET, e.g. `/tx?hash=0x..`, unwrapping the `result` field.
    pub async fn tendermint_get<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let resp = self
            .client
            .get(url)
            .query(query)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = resp.status();
        let bytes = resp.bytes().await?;
        let response: JsonRpcResponse = serde_json::from_slice(&bytes).map_err(|e| {
            FetchError::Upstream(anyhow!("{url}: malformed response ({status}): {e}"))
        })?;
        if let Some(err) = response.error {
            // tendermint answers an unknown hash with an rpc error, not an empty result
            return Err(FetchError::not_found(format!(
                "{url}: rpc error {}: {}",
                err.code, err.message
            )));
        }
        match response.result {
            None | Some(Value::Null) => Err(FetchError::not_found(format!("{url}: empty result"))),
            Some(result) => Ok(serde_json::from_value(result)?),
        }
    }
}

/// Joins a base url and a path without doubling slashes.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
