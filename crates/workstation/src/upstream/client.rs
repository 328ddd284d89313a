//! HTTP implementation of [`ClusterSource`].

use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::{header, Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{Cluster, ClusterSource, Result, UpstreamError};
use crate::config::UpstreamConfig;

#[derive(Debug, Deserialize)]
struct ClusterList {
    #[serde(default)]
    data: Vec<Cluster>,
}

#[derive(Debug, Deserialize)]
struct GeneratedKubeconfig {
    #[serde(default)]
    config: String,
}

/// Cluster manager API client.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: String,
    default_token: Option<String>,
    credential_timeout: Duration,
}

impl UpstreamClient {
    /// Create a client from the upstream configuration.
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .timeout(config.timeout())
            .build()
            .map_err(UpstreamError::Client)?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            default_token: config.token.clone().filter(|t| !t.is_empty()),
            credential_timeout: config.credential_timeout(),
        })
    }

    /// Base URL requests are made against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn token<'a>(&'a self, token: Option<&'a str>) -> Result<&'a str> {
        token
            .filter(|t| !t.is_empty())
            .or(self.default_token.as_deref())
            .ok_or(UpstreamError::MissingToken)
    }

    fn request(&self, method: Method, path: &str, token: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .header(header::ACCEPT, "application/json")
    }

    async fn send<T: DeserializeOwned>(&self, path: &str, request: RequestBuilder) -> Result<T> {
        let response = request.send().await.map_err(|source| {
            if source.is_timeout() {
                UpstreamError::Timeout { path: path.to_string() }
            } else {
                UpstreamError::Request { path: path.to_string(), source }
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| UpstreamError::Request {
            path: path.to_string(),
            source,
        })?;

        if status.as_u16() >= 400 {
            tracing::warn!(path, status = status.as_u16(), "Cluster manager returned error");
            return Err(UpstreamError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|source| UpstreamError::Decode {
            path: path.to_string(),
            source,
        })
    }

    async fn clusters(&self, token: Option<&str>) -> Result<Vec<Cluster>> {
        let token = self.token(token)?;
        let path = "/v3/clusters";
        let list: ClusterList = self.send(path, self.request(Method::GET, path, token)).await?;

        tracing::debug!(count = list.data.len(), "Listed clusters");
        Ok(list.data)
    }

    async fn kubeconfig(&self, cluster_id: &str, token: Option<&str>) -> Result<String> {
        let token = self.token(token)?;
        let path = format!("/v3/clusters/{}?action=generateKubeconfig", cluster_id);
        let request = self
            .request(Method::POST, &path, token)
            .timeout(self.credential_timeout);

        let generated: GeneratedKubeconfig = self.send(&path, request).await?;
        Ok(generated.config)
    }
}

impl ClusterSource for UpstreamClient {
    fn list_clusters<'a>(&'a self, token: Option<&'a str>) -> BoxFuture<'a, Result<Vec<Cluster>>> {
        self.clusters(token).boxed()
    }

    fn fetch_kubeconfig<'a>(
        &'a self,
        cluster_id: &'a str,
        token: Option<&'a str>,
    ) -> BoxFuture<'a, Result<String>> {
        self.kubeconfig(cluster_id, token).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(token: Option<&str>) -> UpstreamConfig {
        UpstreamConfig {
            url: "https://manager.example/".to_string(),
            token: token.map(str::to_string),
            ..UpstreamConfig::default()
        }
    }

    #[test]
    fn test_base_url_trimmed() {
        let client = UpstreamClient::new(&config(None)).unwrap();
        assert_eq!(client.base_url(), "https://manager.example");
    }

    #[test]
    fn test_token_precedence() {
        let client = UpstreamClient::new(&config(Some("configured"))).unwrap();
        assert_eq!(client.token(Some("caller")).unwrap(), "caller");
        assert_eq!(client.token(Some("")).unwrap(), "configured");
        assert_eq!(client.token(None).unwrap(), "configured");
    }

    #[tokio::test]
    async fn test_missing_token() {
        let client = UpstreamClient::new(&config(None)).unwrap();
        assert!(matches!(
            client.list_clusters(None).await,
            Err(UpstreamError::MissingToken)
        ));
        assert!(matches!(
            client.fetch_kubeconfig("c-1", Some("")).await,
            Err(UpstreamError::MissingToken)
        ));
    }

    #[test]
    fn test_cluster_list_decoding() {
        let list: ClusterList = serde_json::from_str(
            r#"{"data":[{"id":"c-1","name":"prod","state":"active","extra":1},{"id":"local","name":"local"}]}"#,
        )
        .unwrap();
        assert_eq!(list.data.len(), 2);
        assert_eq!(list.data[0].state, "active");
        assert_eq!(list.data[1].state, "");
    }
}
