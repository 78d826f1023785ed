use anyhow::{Context, Result};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://jsonplaceholder.typicode.com/posts";
pub const DEFAULT_USER_AGENT: &str = "postfeed/0.1";

/// Where and how the post collection is fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub endpoint: String,
    pub user_agent: String,
    /// `None` leaves requests without a deadline
    pub timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: None,
        }
    }
}

impl Config {
    /// Builds the configuration from defaults overlaid with
    /// POSTFEED_URL and POSTFEED_TIMEOUT_SECS when they are set
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup("POSTFEED_URL").filter(|u| !u.trim().is_empty()) {
            config.endpoint = url.trim().to_string();
        }

        if let Some(secs) = lookup("POSTFEED_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .with_context(|| format!("Invalid POSTFEED_TIMEOUT_SECS value: {}", secs))?;
            config.timeout = Some(Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Applies command-line overrides on top of whatever was loaded
    pub fn with_overrides(mut self, endpoint: Option<String>, timeout_secs: Option<u64>) -> Self {
        if let Some(endpoint) = endpoint {
            self.endpoint = endpoint;
        }
        if let Some(secs) = timeout_secs {
            self.timeout = Some(Duration::from_secs(secs));
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert!(config.timeout.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("POSTFEED_URL", " http://localhost:9000/posts "),
            ("POSTFEED_TIMEOUT_SECS", "15"),
        ]))
        .unwrap();
        assert_eq!(config.endpoint, "http://localhost:9000/posts");
        assert_eq!(config.timeout, Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_invalid_timeout_is_an_error() {
        let result = Config::from_lookup(lookup_from(&[("POSTFEED_TIMEOUT_SECS", "soon")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_overrides_win() {
        let config = Config::from_lookup(lookup_from(&[("POSTFEED_URL", "http://env/posts")]))
            .unwrap()
            .with_overrides(Some("http://cli/posts".to_string()), Some(3));
        assert_eq!(config.endpoint, "http://cli/posts");
        assert_eq!(config.timeout, Some(Duration::from_secs(3)));
    }
}
