//! Merging per-cluster kubeconfig documents into one.
//!
//! Documents are folded in input order. For clusters, contexts and users the
//! first entry seen under a given name wins and keeps its position; later
//! duplicates are dropped. The first non-empty `current-context` wins.
//!
//! Generated documents often point at a loopback address that is only
//! reachable from inside the manager. Such servers are rewritten to the
//! upstream endpoint, keeping any path, and TLS verification is disabled
//! on every cluster since the upstream certificate will not match.

use std::collections::HashSet;
use std::net::{Ipv4Addr, Ipv6Addr};

use thiserror::Error;
use url::{Host, Url};

use super::document::Kubeconfig;

/// Errors from merging kubeconfig documents.
#[derive(Error, Debug)]
pub enum MergeError {
    /// An input document is not valid kubeconfig YAML.
    #[error("parse config {index}: {source}")]
    Parse {
        index: usize,
        #[source]
        source: serde_yaml::Error,
    },

    /// The merged document could not be serialized.
    #[error("serialize merged config: {0}")]
    Serialize(#[source] serde_yaml::Error),

    /// The upstream URL has no host.
    #[error("upstream URL has no host: {0}")]
    InvalidUpstream(String),
}

/// Scheme and authority that loopback servers are rewritten to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamEndpoint {
    scheme: String,
    authority: String,
}

impl UpstreamEndpoint {
    /// Derives the endpoint from the upstream base URL. A missing port
    /// becomes the scheme default: 443 for https, 80 otherwise.
    pub fn from_url(url: &Url) -> Result<Self, MergeError> {
        let host = url
            .host_str()
            .ok_or_else(|| MergeError::InvalidUpstream(url.to_string()))?;
        let port = url
            .port()
            .unwrap_or(if url.scheme() == "https" { 443 } else { 80 });

        Ok(Self {
            scheme: url.scheme().to_string(),
            authority: format!("{}:{}", host, port),
        })
    }

    /// Rewrites `server` if its host is a loopback address.
    ///
    /// The scheme and authority are replaced and everything after the
    /// authority is kept byte for byte. Returns `None` for servers that
    /// are not loopback or not parseable.
    pub fn rewrite(&self, server: &str) -> Option<String> {
        let parsed = Url::parse(server).ok()?;
        if !is_loopback(&parsed) {
            return None;
        }

        let rest = &server[server.find("://")? + 3..];
        let suffix = rest
            .find(['/', '?', '#'])
            .map(|end| &rest[end..])
            .unwrap_or("");

        Some(format!("{}://{}{}", self.scheme, self.authority, suffix))
    }
}

/// Returns whether the URL points at the local host.
pub fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => {
            domain.eq_ignore_ascii_case("localhost") || domain == "127.0.0.1"
        }
        Some(Host::Ipv4(ip)) => ip == Ipv4Addr::LOCALHOST,
        Some(Host::Ipv6(ip)) => ip == Ipv6Addr::LOCALHOST,
        None => false,
    }
}

/// Merges kubeconfig documents.
#[derive(Debug, Clone)]
pub struct KubeconfigMerger {
    endpoint: UpstreamEndpoint,
}

impl KubeconfigMerger {
    /// Creates a merger that rewrites loopback servers to `upstream`.
    pub fn new(upstream: &Url) -> Result<Self, MergeError> {
        Ok(Self {
            endpoint: UpstreamEndpoint::from_url(upstream)?,
        })
    }

    /// Merges documents and serializes the result.
    pub fn merge<S: AsRef<str>>(&self, documents: &[S]) -> Result<String, MergeError> {
        self.merge_documents(documents)?
            .to_yaml()
            .map_err(MergeError::Serialize)
    }

    /// Merges documents into one model. Blank inputs are skipped; the first
    /// unparseable input aborts the merge.
    pub fn merge_documents<S: AsRef<str>>(&self, documents: &[S]) -> Result<Kubeconfig, MergeError> {
        let mut merged = Kubeconfig::default();
        let mut cluster_names = HashSet::new();
        let mut context_names = HashSet::new();
        let mut user_names = HashSet::new();

        for (index, text) in documents.iter().enumerate() {
            let text = text.as_ref();
            if text.trim().is_empty() {
                continue;
            }

            let doc = Kubeconfig::from_yaml(text)
                .map_err(|source| MergeError::Parse { index, source })?;

            for cluster in doc.clusters {
                if cluster_names.insert(cluster.name.clone()) {
                    merged.clusters.push(cluster);
                }
            }
            for context in doc.contexts {
                if context_names.insert(context.name.clone()) {
                    merged.contexts.push(context);
                }
            }
            for user in doc.users {
                if user_names.insert(user.name.clone()) {
                    merged.users.push(user);
                }
            }
            if merged.current_context.is_empty() && !doc.current_context.is_empty() {
                merged.current_context = doc.current_context;
            }
        }

        self.rewrite_endpoints(&mut merged);

        tracing::debug!(
            clusters = merged.clusters.len(),
            contexts = merged.contexts.len(),
            users = merged.users.len(),
            "Merged kubeconfig documents"
        );

        Ok(merged)
    }

    /// Points loopback servers at the upstream and disables TLS
    /// verification on every cluster.
    pub fn rewrite_endpoints(&self, config: &mut Kubeconfig) {
        for cluster in &mut config.clusters {
            if let Some(rewritten) = cluster.server().and_then(|s| self.endpoint.rewrite(s)) {
                tracing::debug!(cluster = %cluster.name, server = %rewritten, "Rewrote loopback server");
                cluster.set_server(rewritten);
            }
            cluster.set_insecure_skip_tls_verify(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kubeconfig::document::INSECURE_SKIP_TLS_VERIFY_KEY;
    use serde_yaml::Value;

    fn merger(upstream: &str) -> KubeconfigMerger {
        KubeconfigMerger::new(&Url::parse(upstream).unwrap()).unwrap()
    }

    fn doc(cluster: &str, server: &str, context: &str, user: &str, current: &str) -> String {
        format!(
            r#"apiVersion: v1
kind: Config
clusters:
- name: {cluster}
  cluster:
    server: {server}
contexts:
- name: {context}
  context:
    cluster: {cluster}
    user: {user}
current-context: "{current}"
users:
- name: {user}
  user:
    token: token-{user}
"#
        )
    }

    #[test]
    fn test_endpoint_default_ports() {
        let https = UpstreamEndpoint::from_url(&Url::parse("https://manager.example").unwrap()).unwrap();
        assert_eq!(https.authority, "manager.example:443");

        let http = UpstreamEndpoint::from_url(&Url::parse("http://manager.example").unwrap()).unwrap();
        assert_eq!(http.authority, "manager.example:80");

        // An explicit default port is normalized away by the URL parser and
        // restored here.
        let explicit = UpstreamEndpoint::from_url(&Url::parse("https://manager.example:443").unwrap()).unwrap();
        assert_eq!(explicit.authority, "manager.example:443");

        let custom = UpstreamEndpoint::from_url(&Url::parse("https://manager.example:8443").unwrap()).unwrap();
        assert_eq!(custom.authority, "manager.example:8443");
    }

    #[test]
    fn test_rewrite_loopback() {
        let endpoint = UpstreamEndpoint::from_url(&Url::parse("https://manager.example:443").unwrap()).unwrap();

        assert_eq!(
            endpoint.rewrite("https://127.0.0.1:6443").as_deref(),
            Some("https://manager.example:443")
        );
        assert_eq!(
            endpoint.rewrite("https://localhost/k8s/clusters/c-abc").as_deref(),
            Some("https://manager.example:443/k8s/clusters/c-abc")
        );
        assert_eq!(
            endpoint.rewrite("https://[::1]:6443/api?x=1").as_deref(),
            Some("https://manager.example:443/api?x=1")
        );
        assert_eq!(
            endpoint.rewrite("http://LOCALHOST:8080").as_deref(),
            Some("https://manager.example:443")
        );
    }

    #[test]
    fn test_rewrite_leaves_remote_alone() {
        let endpoint = UpstreamEndpoint::from_url(&Url::parse("https://manager.example").unwrap()).unwrap();
        assert_eq!(endpoint.rewrite("https://10.0.0.5:6443"), None);
        assert_eq!(endpoint.rewrite("https://api.prod.example"), None);
        assert_eq!(endpoint.rewrite("not a url"), None);
    }

    #[test]
    fn test_merge_single_document_rewrites() {
        let merged = merger("https://manager.example:443")
            .merge_documents(&[doc("a", "https://127.0.0.1:6443", "a", "a", "a")])
            .unwrap();

        assert_eq!(merged.clusters.len(), 1);
        assert_eq!(merged.clusters[0].server(), Some("https://manager.example:443"));
        assert_eq!(
            merged.clusters[0].cluster.get(INSECURE_SKIP_TLS_VERIFY_KEY),
            Some(&Value::Bool(true))
        );
        assert_eq!(merged.current(), Some("a"));
    }

    fn field<'a>(body: &'a serde_yaml::Mapping, key: &str) -> Option<&'a str> {
        body.get(key).and_then(serde_yaml::Value::as_str)
    }

    #[test]
    fn test_merge_first_seen_wins() {
        let first = doc("shared", "https://10.0.0.1", "ctx", "admin", "")
            .replace("token: token-admin", "token: token-a");
        let second = doc("shared", "https://10.0.0.2", "ctx", "admin", "ctx")
            .replace("token: token-admin", "token: token-b")
            .replace("cluster: shared\n    user: admin", "cluster: elsewhere\n    user: admin");
        let third = doc("other", "https://10.0.0.3", "ctx-2", "admin", "ctx-2");

        let merged = merger("https://manager.example")
            .merge_documents(&[first, second, third])
            .unwrap();

        let names: Vec<&str> = merged.clusters.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["shared", "other"]);
        assert_eq!(merged.clusters[0].server(), Some("https://10.0.0.1"));

        let contexts: Vec<&str> = merged.contexts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(contexts, vec!["ctx", "ctx-2"]);
        assert_eq!(field(&merged.contexts[0].context, "cluster"), Some("shared"));
        assert_eq!(field(&merged.contexts[1].context, "cluster"), Some("other"));

        assert_eq!(merged.users.len(), 1);
        assert_eq!(merged.users[0].name, "admin");
        assert_eq!(field(&merged.users[0].user, "token"), Some("token-a"));

        assert_eq!(merged.current(), Some("ctx"));
    }

    #[test]
    fn test_current_context_first_non_empty() {
        let merged = merger("https://manager.example")
            .merge_documents(&[
                doc("a", "https://10.0.0.1", "a", "a", ""),
                doc("b", "https://10.0.0.2", "ctxA", "b", "ctxA"),
                doc("c", "https://10.0.0.3", "ctxB", "c", "ctxB"),
            ])
            .unwrap();
        assert_eq!(merged.current(), Some("ctxA"));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let merger = merger("https://manager.example:443");
        let once = merger
            .merge(&[
                doc("a", "https://127.0.0.1:6443", "a", "a", "a"),
                doc("a", "https://10.0.0.9", "a", "a", ""),
                doc("b", "https://10.1.1.1", "b", "b", "b"),
            ])
            .unwrap();
        let twice = merger.merge(&[once.as_str()]).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_skips_blank_documents() {
        let merged = merger("https://manager.example")
            .merge_documents(&["", "  \n", doc("a", "https://10.0.0.1", "a", "a", "a").as_str()])
            .unwrap();
        assert_eq!(merged.clusters.len(), 1);
    }

    #[test]
    fn test_merge_empty_input() {
        let yaml = merger("https://manager.example").merge::<&str>(&[]).unwrap();
        let parsed = Kubeconfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed, Kubeconfig::default());
    }

    #[test]
    fn test_merge_parse_error_names_index() {
        let err = merger("https://manager.example")
            .merge(&[doc("a", "https://10.0.0.1", "a", "a", "a"), "clusters: [".to_string()])
            .unwrap_err();
        assert!(matches!(err, MergeError::Parse { index: 1, .. }));
        assert!(err.to_string().starts_with("parse config 1"));
    }

    #[test]
    fn test_cluster_without_server_gets_flag() {
        let text = "clusters:\n- name: bare\n  cluster: {}\n";
        let merged = merger("https://manager.example").merge_documents(&[text]).unwrap();
        assert_eq!(merged.clusters[0].server(), None);
        assert_eq!(
            merged.clusters[0].cluster.get(INSECURE_SKIP_TLS_VERIFY_KEY),
            Some(&Value::Bool(true))
        );
    }

    #[test]
    fn test_merged_output_is_parseable() {
        let yaml = merger("https://manager.example")
            .merge(&[
                doc("a", "https://127.0.0.1:6443", "a", "a", "a"),
                doc("b", "https://10.1.1.1", "b", "b", "b"),
            ])
            .unwrap();

        let parsed = Kubeconfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.clusters.len(), 2);
        assert_eq!(parsed.current(), Some("a"));
        assert!(yaml.contains("token: token-b"));
    }
}
