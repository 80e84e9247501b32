//! Immutable process configuration
//!
//! Built once at startup from CLI flags and environment variables, validated,
//! then shared read-only with every admission request.

use crate::{Error, Result, DEFAULT_IGNORED_NAMESPACES};

/// Settings the injector needs to build patches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectorConfig {
    /// Address of the Connect server, injected verbatim as `OP_CONNECT_HOST`
    pub connect_host: String,
    /// Name of the Secret holding the Connect token
    pub token_secret_name: String,
    /// Key inside the Secret holding the Connect token
    pub token_secret_key: String,
    /// Namespaces whose pods are never mutated
    pub ignored_namespaces: Vec<String>,
}

impl InjectorConfig {
    /// Create a validated configuration using the default ignored namespaces
    pub fn new(
        connect_host: impl Into<String>,
        token_secret_name: impl Into<String>,
        token_secret_key: impl Into<String>,
    ) -> Result<Self> {
        let config = Self {
            connect_host: connect_host.into(),
            token_secret_name: token_secret_name.into(),
            token_secret_key: token_secret_key.into(),
            ignored_namespaces: DEFAULT_IGNORED_NAMESPACES
                .iter()
                .map(|ns| ns.to_string())
                .collect(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Replace the ignored namespace list
    ///
    /// An empty iterator keeps the defaults; blank entries are dropped.
    pub fn with_ignored_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let namespaces: Vec<String> = namespaces
            .into_iter()
            .map(Into::into)
            .map(|ns| ns.trim().to_string())
            .filter(|ns| !ns.is_empty())
            .collect();
        if !namespaces.is_empty() {
            self.ignored_namespaces = namespaces;
        }
        self
    }

    /// Check that every Connect coordinate is present
    pub fn validate(&self) -> Result<()> {
        if self.connect_host.trim().is_empty() {
            return Err(Error::config("connect host must not be empty"));
        }
        if self.token_secret_name.trim().is_empty() {
            return Err(Error::config("connect token secret name must not be empty"));
        }
        if self.token_secret_key.trim().is_empty() {
            return Err(Error::config("connect token secret key must not be empty"));
        }
        Ok(())
    }

    /// Whether pods in `namespace` are exempt from injection
    pub fn is_ignored(&self, namespace: &str) -> bool {
        self.ignored_namespaces.iter().any(|ns| ns == namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> InjectorConfig {
        InjectorConfig::new("http://onepassword-connect:8080", "onepassword-token", "token")
            .expect("valid config")
    }

    #[test]
    fn defaults_ignore_system_namespaces() {
        let config = valid();
        assert!(config.is_ignored("kube-system"));
        assert!(config.is_ignored("kube-public"));
        assert!(!config.is_ignored("default"));
    }

    #[test]
    fn empty_host_is_rejected() {
        let err = InjectorConfig::new("  ", "onepassword-token", "token").unwrap_err();
        assert!(err.to_string().contains("connect host"));
    }

    #[test]
    fn empty_secret_coordinates_are_rejected() {
        let err = InjectorConfig::new("http://connect:8080", "", "token").unwrap_err();
        assert!(err.to_string().contains("secret name"));

        let err = InjectorConfig::new("http://connect:8080", "onepassword-token", "").unwrap_err();
        assert!(err.to_string().contains("secret key"));
    }

    #[test]
    fn custom_ignored_namespaces_replace_defaults() {
        let config = valid().with_ignored_namespaces(["secrets", " ", "infra "]);
        assert_eq!(config.ignored_namespaces, vec!["secrets", "infra"]);
        assert!(!config.is_ignored("kube-system"));
        assert!(config.is_ignored("infra"));
    }

    #[test]
    fn empty_override_keeps_defaults() {
        let config = valid().with_ignored_namespaces(Vec::<String>::new());
        assert!(config.is_ignored("kube-system"));
    }
}
