use std::time::Duration;

use url::Url;
use uuid::Uuid;

use crate::utils::error::ConfigurationError;

/// Start-time configuration of the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Listener host, used to derive URLs when no public URL is given.
    pub host: String,
    pub port: u16,
    /// Whether the listener is served over TLS.
    pub secure: bool,
    pub base_path: String,
    pub subscribe_path: String,
    pub publish_path: String,
    pub public_url: Option<String>,
    pub topic_registration_required: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9191,
            secure: false,
            base_path: "/websub".to_string(),
            subscribe_path: "/hub".to_string(),
            publish_path: "/publish".to_string(),
            public_url: None,
            topic_registration_required: true,
        }
    }
}

impl HubConfig {
    /// Public publish and subscribe URLs.
    ///
    /// Built from `public_url` when present, otherwise from the listener's
    /// scheme, host and port; `base_path` and the endpoint path are appended.
    pub fn urls(&self) -> Result<HubUrls, ConfigurationError> {
        let origin = match &self.public_url {
            Some(public_url) => {
                Url::parse(public_url).map_err(|e| ConfigurationError::InvalidUrl {
                    url: public_url.clone(),
                    reason: e.to_string(),
                })?;
                public_url.trim_end_matches('/').to_string()
            }
            None => {
                let scheme = if self.secure { "https" } else { "http" };
                format!("{scheme}://{}:{}", self.host, self.port)
            }
        };
        let base = join_path(&origin, &self.base_path);
        Ok(HubUrls {
            publish_url: join_path(&base, &self.publish_path),
            subscribe_url: join_path(&base, &self.subscribe_path),
        })
    }
}

fn join_path(prefix: &str, path: &str) -> String {
    let path = path.trim_matches('/');
    if path.is_empty() {
        prefix.to_string()
    } else {
        format!("{}/{path}", prefix.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubUrls {
    pub publish_url: String,
    pub subscribe_url: String,
}

/// Proof of a successful `Hub::start`; required to stop the same run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubHandle {
    id: Uuid,
    urls: HubUrls,
}

impl HubHandle {
    pub(crate) fn new(urls: HubUrls) -> Self {
        Self {
            id: Uuid::new_v4(),
            urls,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn urls(&self) -> &HubUrls {
        &self.urls
    }
}

/// Construction-time options that do not change between runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubOptions {
    pub bootstrap_timeout: Duration,
    pub default_lease_seconds: u64,
}

impl Default for HubOptions {
    fn default() -> Self {
        Self {
            bootstrap_timeout: Duration::from_secs(5),
            default_lease_seconds: 86_400,
        }
    }
}
