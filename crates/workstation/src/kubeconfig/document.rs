//! Kubeconfig document model.
//!
//! Only the parts the merger reasons about are typed. Cluster, context and
//! user bodies stay as ordered YAML mappings so every field the source
//! document carried survives a round trip in its original order.

use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::{Mapping, Value};

/// Key holding the API server URL inside a cluster body.
pub const SERVER_KEY: &str = "server";

/// Key of the TLS verification flag inside a cluster body.
pub const INSECURE_SKIP_TLS_VERIFY_KEY: &str = "insecure-skip-tls-verify";

/// A kubeconfig file.
///
/// Fields serialize in the conventional order: `apiVersion`, `kind`,
/// `clusters`, `contexts`, `current-context`, `users`, `preferences`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kubeconfig {
    #[serde(rename = "apiVersion", default, deserialize_with = "nullable")]
    pub api_version: String,

    #[serde(default, deserialize_with = "nullable")]
    pub kind: String,

    #[serde(default, deserialize_with = "nullable")]
    pub clusters: Vec<NamedCluster>,

    #[serde(default, deserialize_with = "nullable")]
    pub contexts: Vec<NamedContext>,

    #[serde(rename = "current-context", default, deserialize_with = "nullable")]
    pub current_context: String,

    #[serde(default, deserialize_with = "nullable")]
    pub users: Vec<NamedUser>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Mapping>,
}

impl Default for Kubeconfig {
    fn default() -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "Config".to_string(),
            clusters: Vec::new(),
            contexts: Vec::new(),
            current_context: String::new(),
            users: Vec::new(),
            preferences: None,
        }
    }
}

impl Kubeconfig {
    /// Parses a kubeconfig document.
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Serializes the document.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Returns the current context, if one is set.
    pub fn current(&self) -> Option<&str> {
        Some(self.current_context.as_str()).filter(|c| !c.is_empty())
    }
}

/// A named cluster entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedCluster {
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub cluster: Mapping,
}

impl NamedCluster {
    /// The API server URL, if the body has one.
    pub fn server(&self) -> Option<&str> {
        self.cluster.get(SERVER_KEY).and_then(Value::as_str)
    }

    /// Replaces the API server URL.
    pub fn set_server(&mut self, server: String) {
        self.cluster
            .insert(Value::from(SERVER_KEY), Value::String(server));
    }

    /// Sets the TLS verification flag, keeping the key's position if present.
    pub fn set_insecure_skip_tls_verify(&mut self, skip: bool) {
        self.cluster
            .insert(Value::from(INSECURE_SKIP_TLS_VERIFY_KEY), Value::Bool(skip));
    }
}

/// A named context entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedContext {
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub context: Mapping,
}

/// A named user entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedUser {
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub user: Mapping,
}

/// Treats an explicit `null` like a missing field.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: prod
  cluster:
    server: https://127.0.0.1:6443
    certificate-authority-data: Zm9v
contexts:
- name: prod
  context:
    cluster: prod
    user: prod
current-context: prod
users:
- name: prod
  user:
    token: abc
"#;

    #[test]
    fn test_parse() {
        let doc = Kubeconfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(doc.api_version, "v1");
        assert_eq!(doc.clusters.len(), 1);
        assert_eq!(doc.clusters[0].server(), Some("https://127.0.0.1:6443"));
        assert_eq!(doc.current(), Some("prod"));
        assert_eq!(doc.users[0].name, "prod");
    }

    #[test]
    fn test_null_sections() {
        let doc = Kubeconfig::from_yaml(
            "apiVersion: v1\nkind: Config\nclusters: null\nusers:\ncurrent-context: null\n",
        )
        .unwrap();
        assert!(doc.clusters.is_empty());
        assert!(doc.users.is_empty());
        assert_eq!(doc.current(), None);
    }

    #[test]
    fn test_field_order() {
        let doc = Kubeconfig::from_yaml(SAMPLE).unwrap();
        let yaml = doc.to_yaml().unwrap();

        let positions: Vec<usize> = [
            "apiVersion:",
            "kind:",
            "clusters:",
            "contexts:",
            "current-context:",
            "users:",
        ]
        .iter()
        .map(|key| yaml.find(key).unwrap())
        .collect();

        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(!yaml.contains("preferences"));
    }

    #[test]
    fn test_body_key_order_preserved() {
        let doc = Kubeconfig::from_yaml(SAMPLE).unwrap();
        let yaml = doc.to_yaml().unwrap();
        let server = yaml.find("server:").unwrap();
        let ca = yaml.find("certificate-authority-data:").unwrap();
        assert!(server < ca);
    }

    #[test]
    fn test_set_insecure_flag() {
        let mut doc = Kubeconfig::from_yaml(SAMPLE).unwrap();
        doc.clusters[0].set_insecure_skip_tls_verify(true);
        doc.clusters[0].set_insecure_skip_tls_verify(true);

        let cluster = &doc.clusters[0].cluster;
        assert_eq!(cluster.len(), 3);
        assert_eq!(
            cluster.get(INSECURE_SKIP_TLS_VERIFY_KEY),
            Some(&Value::Bool(true))
        );
    }

    #[test]
    fn test_default_document() {
        let doc = Kubeconfig::default();
        assert_eq!(doc.api_version, "v1");
        assert_eq!(doc.kind, "Config");
        assert_eq!(doc.current(), None);
    }
}
