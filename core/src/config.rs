//! Credentials and endpoint resolution.
//!
//! # Design
//! Both values are immutable once a client is built. `ClientConfig::from_env`
//! is the conventional way to resolve them; callers with their own credential
//! store construct `Credentials` and `Endpoint` directly.

use std::env;
use std::fmt;

use url::Url;

use crate::error::ConfigError;

/// Region used when neither `ELB_ENDPOINT` nor `AWS_REGION` is set.
pub const DEFAULT_REGION: &str = "us-east-1";

/// An access-key/secret pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(access_key: &str, secret_key: &str) -> Self {
        Self {
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
        }
    }

    /// Read `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`, falling back to
    /// `AWS_ACCESS_KEY` / `AWS_SECRET_KEY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let access_key = first_var(&["AWS_ACCESS_KEY_ID", "AWS_ACCESS_KEY"])
            .ok_or(ConfigError::MissingVar("AWS_ACCESS_KEY_ID"))?;
        let secret_key = first_var(&["AWS_SECRET_ACCESS_KEY", "AWS_SECRET_KEY"])
            .ok_or(ConfigError::MissingVar("AWS_SECRET_ACCESS_KEY"))?;
        Ok(Self {
            access_key,
            secret_key,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Where requests are sent: scheme, host (with port, if any) and path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    scheme: String,
    host: String,
    path: String,
}

impl Endpoint {
    /// Parse an endpoint URL. An empty path becomes `/`.
    pub fn parse(url: &str) -> Result<Self, ConfigError> {
        let parsed = Url::parse(url).map_err(|source| ConfigError::InvalidEndpoint {
            url: url.to_string(),
            source,
        })?;
        let host = parsed
            .host_str()
            .ok_or_else(|| ConfigError::MissingHost(url.to_string()))?;
        let host = match parsed.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let path = match parsed.path() {
            "" => "/".to_string(),
            p => p.to_string(),
        };
        Ok(Self {
            scheme: parsed.scheme().to_string(),
            host,
            path,
        })
    }

    /// The public endpoint for `region`.
    pub fn for_region(region: &str) -> Result<Self, ConfigError> {
        Self::parse(&format!("https://elasticloadbalancing.{region}.amazonaws.com/"))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Host as signed, including an explicit port.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// `scheme://host/path?query`
    pub fn url_with_query(&self, query: &str) -> String {
        format!("{}://{}{}?{query}", self.scheme, self.host, self.path)
    }
}

/// Everything a client needs besides its transport.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub credentials: Credentials,
    pub endpoint: Endpoint,
}

impl ClientConfig {
    pub fn new(credentials: Credentials, endpoint: Endpoint) -> Self {
        Self {
            credentials,
            endpoint,
        }
    }

    /// Resolve credentials from the environment, and the endpoint from
    /// `ELB_ENDPOINT`, else `AWS_REGION`, else `us-east-1`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let credentials = Credentials::from_env()?;
        let endpoint = match env::var("ELB_ENDPOINT") {
            Ok(url) if !url.is_empty() => Endpoint::parse(&url)?,
            _ => {
                let region = env::var("AWS_REGION").unwrap_or_else(|_| DEFAULT_REGION.to_string());
                Endpoint::for_region(&region)?
            }
        };
        Ok(Self::new(credentials, endpoint))
    }
}

fn first_var(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| env::var(name).ok().filter(|v| !v.is_empty()))
}
