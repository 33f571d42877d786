use serde::Deserialize;
use tracing::warn;

const ENV_PREFIX: &str = "STAGEHAND";

#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    /// Origin the host stamps on commands it posts into the surface.
    #[serde(default = "default_host_origin")]
    pub host_origin: String,
    /// Origin inbound events must carry. Unset means same-origin with the host.
    #[serde(default)]
    pub expected_origin: Option<String>,
    #[serde(default = "default_ping_interval")]
    pub ping_interval_ms: u64,
    #[serde(default = "default_ping_warn_after")]
    pub ping_warn_after: u64,
    #[serde(default = "default_true")]
    pub inspector_on_ready: bool,
    #[serde(default = "default_error_history")]
    pub error_history: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            host_origin: default_host_origin(),
            expected_origin: None,
            ping_interval_ms: default_ping_interval(),
            ping_warn_after: default_ping_warn_after(),
            inspector_on_ready: true,
            error_history: default_error_history(),
        }
    }
}

impl HostConfig {
    /// Reads `STAGEHAND__*` variables, falling back to defaults for anything
    /// missing or unparsable.
    pub fn from_env() -> Self {
        Self::from_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
    }

    pub fn from_source<S>(source: S) -> Self
    where
        S: config::Source + Send + Sync + 'static,
    {
        config::Config::builder()
            .add_source(source)
            .build()
            .and_then(|c| c.try_deserialize())
            .map(HostConfig::normalize)
            .unwrap_or_else(|err| {
                warn!(target = "host.config", error = %err, "invalid host config; using defaults");
                HostConfig::default()
            })
    }

    pub fn expected_origin(&self) -> &str {
        self.expected_origin.as_deref().unwrap_or(&self.host_origin)
    }

    fn normalize(mut self) -> Self {
        self.host_origin = Self::normalize_opt(Some(self.host_origin)).unwrap_or_else(default_host_origin);
        self.expected_origin = Self::normalize_opt(self.expected_origin.take());
        if self.ping_interval_ms == 0 {
            self.ping_interval_ms = default_ping_interval();
        }
        if self.ping_warn_after == 0 {
            self.ping_warn_after = default_ping_warn_after();
        }
        if self.error_history == 0 {
            self.error_history = default_error_history();
        }
        self
    }

    fn normalize_opt(value: Option<String>) -> Option<String> {
        value.and_then(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        })
    }
}

fn default_host_origin() -> String {
    "http://localhost:5173".to_string()
}

fn default_ping_interval() -> u64 {
    100
}

fn default_ping_warn_after() -> u64 {
    50
}

fn default_true() -> bool {
    true
}

fn default_error_history() -> usize {
    32
}
