use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::kube::KubeConfig;

const SERVICE_ACCOUNT_TOKEN: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
const SERVICE_ACCOUNT_CA: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

#[derive(Debug, Clone)]
pub struct Config {
    pub kube: KubeConfig,
    /// Enabled allocation algorithms. Empty enables the default set.
    pub algorithms: Vec<String>,
    pub resync_interval: Duration,
    pub max_concurrent: usize,
    pub health_addr: SocketAddr,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        let api_url = match var("ZONECOST_API_URL") {
            Some(url) => url,
            None => match (
                var("KUBERNETES_SERVICE_HOST"),
                var("KUBERNETES_SERVICE_PORT"),
            ) {
                (Some(host), port) => {
                    let port = port.unwrap_or_else(|| "443".to_string());
                    if host.contains(':') {
                        format!("https://[{host}]:{port}")
                    } else {
                        format!("https://{host}:{port}")
                    }
                }
                (None, _) => bail!(
                    "ZONECOST_API_URL is not set and KUBERNETES_SERVICE_HOST is not available"
                ),
            },
        };

        let token = read_optional(var("ZONECOST_TOKEN_FILE"), SERVICE_ACCOUNT_TOKEN)?
            .map(|bytes| String::from_utf8(bytes).context("token file is not UTF-8"))
            .transpose()?
            .map(|token| token.trim().to_string());
        let ca_pem = read_optional(var("ZONECOST_CA_FILE"), SERVICE_ACCOUNT_CA)?;

        let algorithms = var("ZONECOST_ALGORITHMS")
            .map(|list| {
                list.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let resync_secs: u64 = var("ZONECOST_RESYNC_INTERVAL_SECS")
            .unwrap_or_else(|| "30".to_string())
            .parse()
            .context("ZONECOST_RESYNC_INTERVAL_SECS must be a whole number of seconds")?;
        if resync_secs == 0 {
            bail!("ZONECOST_RESYNC_INTERVAL_SECS must be greater than zero");
        }

        let max_concurrent: usize = var("ZONECOST_MAX_CONCURRENT")
            .unwrap_or_else(|| "4".to_string())
            .parse()
            .context("ZONECOST_MAX_CONCURRENT must be a positive integer")?;
        if max_concurrent == 0 {
            bail!("ZONECOST_MAX_CONCURRENT must be greater than zero");
        }

        let health_addr = var("ZONECOST_HEALTH_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8081".to_string())
            .parse()
            .context("ZONECOST_HEALTH_ADDR must be a socket address")?;

        let log_level = var("ZONECOST_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let mut kube = KubeConfig::new(api_url);
        kube.token = token;
        kube.ca_pem = ca_pem;
        kube.namespace = var("ZONECOST_NAMESPACE");

        Ok(Self {
            kube,
            algorithms,
            resync_interval: Duration::from_secs(resync_secs),
            max_concurrent,
            health_addr,
            log_level,
        })
    }
}

/// Read an explicitly configured file, or the in-cluster default if present.
fn read_optional(configured: Option<String>, default: &str) -> Result<Option<Vec<u8>>> {
    match configured {
        Some(path) => std::fs::read(&path)
            .map(Some)
            .with_context(|| format!("failed to read {path}")),
        None if Path::new(default).exists() => std::fs::read(default)
            .map(Some)
            .with_context(|| format!("failed to read {default}")),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config =
            Config::from_lookup(lookup(&[("ZONECOST_API_URL", "http://127.0.0.1:8001")])).unwrap();
        assert_eq!(config.kube.api_url, "http://127.0.0.1:8001");
        assert!(config.kube.namespace.is_none());
        assert!(config.algorithms.is_empty());
        assert_eq!(config.resync_interval, Duration::from_secs(30));
        assert_eq!(config.max_concurrent, 4);
        assert_eq!(config.health_addr, "0.0.0.0:8081".parse().unwrap());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_in_cluster_url() {
        let config = Config::from_lookup(lookup(&[
            ("KUBERNETES_SERVICE_HOST", "10.96.0.1"),
            ("KUBERNETES_SERVICE_PORT", "6443"),
        ]))
        .unwrap();
        assert_eq!(config.kube.api_url, "https://10.96.0.1:6443");

        let v6 = Config::from_lookup(lookup(&[("KUBERNETES_SERVICE_HOST", "fd00::1")])).unwrap();
        assert_eq!(v6.kube.api_url, "https://[fd00::1]:443");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("ZONECOST_API_URL", "http://127.0.0.1:8001"),
            ("ZONECOST_NAMESPACE", "prod"),
            ("ZONECOST_ALGORITHMS", "zone, ,spread"),
            ("ZONECOST_RESYNC_INTERVAL_SECS", "5"),
            ("ZONECOST_MAX_CONCURRENT", "16"),
            ("ZONECOST_HEALTH_ADDR", "127.0.0.1:9000"),
            ("ZONECOST_LOG_LEVEL", "debug"),
        ]))
        .unwrap();
        assert_eq!(config.kube.namespace.as_deref(), Some("prod"));
        assert_eq!(config.algorithms, vec!["zone", "spread"]);
        assert_eq!(config.resync_interval, Duration::from_secs(5));
        assert_eq!(config.max_concurrent, 16);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_invalid_values() {
        let base = ("ZONECOST_API_URL", "http://127.0.0.1:8001");
        assert!(Config::from_lookup(lookup(&[base, ("ZONECOST_MAX_CONCURRENT", "0")])).is_err());
        assert!(
            Config::from_lookup(lookup(&[base, ("ZONECOST_RESYNC_INTERVAL_SECS", "soon")])).is_err()
        );
        assert!(Config::from_lookup(lookup(&[base, ("ZONECOST_HEALTH_ADDR", "nowhere")])).is_err());
        assert!(
            Config::from_lookup(lookup(&[base, ("ZONECOST_TOKEN_FILE", "/nonexistent/token")]))
                .is_err()
        );
    }

    #[test]
    fn test_missing_api_url() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
    }
}
