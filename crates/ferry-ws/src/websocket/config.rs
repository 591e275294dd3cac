//! Client configuration.

use std::time::Duration;

use url::Url;

use crate::reconnect::{BackoffPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY};

/// Configuration for a [`FerryClient`](super::FerryClient).
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// WebSocket endpoint URL.
    pub url: String,

    // Reconnection settings
    /// Delay before the first reconnection attempt.
    pub reconnect_base_delay: Duration,
    /// Maximum delay between reconnection attempts.
    pub reconnect_max_delay: Duration,
    /// How often the reconnect countdown is decremented.
    pub countdown_tick: Duration,

    // Heartbeat settings
    /// Interval between keep-alive frames while open.
    pub heartbeat_interval: Duration,

    // Connection
    /// Timeout for the socket handshake.
    pub connect_timeout: Duration,
    /// Maximum inbound message size in bytes.
    pub max_message_size: usize,

    // Envelope context
    /// Project sent in `_meta` of correlated requests.
    pub project: Option<String>,
    /// Spider sent in `_meta` of correlated requests.
    pub spider: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            reconnect_base_delay: DEFAULT_BASE_DELAY,
            reconnect_max_delay: DEFAULT_MAX_DELAY,
            countdown_tick: Duration::from_secs(1),
            heartbeat_interval: Duration::from_secs(20),
            connect_timeout: Duration::from_secs(10),
            max_message_size: 16 * 1024 * 1024, // 16 MB
            project: None,
            spider: None,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for `url`, normalized with [`normalize_url`].
    ///
    /// A URL that cannot be parsed is kept verbatim; opening it fails later
    /// as an establishment error.
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            url: normalize_url(&url).unwrap_or(url),
            ..Default::default()
        }
    }

    /// Set the base reconnection delay.
    #[must_use]
    pub fn reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect_base_delay = delay;
        self
    }

    /// Set the maximum reconnection delay.
    #[must_use]
    pub fn reconnect_max_delay(mut self, delay: Duration) -> Self {
        self.reconnect_max_delay = delay;
        self
    }

    /// Set the heartbeat interval.
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Set the countdown tick.
    #[must_use]
    pub fn countdown_tick(mut self, tick: Duration) -> Self {
        self.countdown_tick = tick;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the maximum inbound message size.
    #[must_use]
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the project sent with correlated requests.
    #[must_use]
    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Set the spider sent with correlated requests.
    #[must_use]
    pub fn spider(mut self, spider: impl Into<String>) -> Self {
        self.spider = Some(spider.into());
        self
    }

    pub(crate) fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(self.reconnect_base_delay, self.reconnect_max_delay)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("URL cannot be empty".to_string());
        }
        self.backoff().validate()?;
        if self.heartbeat_interval.is_zero() {
            return Err("Heartbeat interval must be > 0".to_string());
        }
        if self.countdown_tick.is_zero() {
            return Err("Countdown tick must be > 0".to_string());
        }
        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be > 0".to_string());
        }
        Ok(())
    }
}

/// Turn a page or service address into the socket endpoint.
///
/// `ws`/`wss` URLs keep their scheme. Anything else gets `wss` when it was
/// `https` and `ws` otherwise. The path is always replaced by `/ws`.
pub fn normalize_url(raw: &str) -> Result<String, url::ParseError> {
    let mut url = Url::parse(raw)?;
    if matches!(url.scheme(), "ws" | "wss") {
        url.set_path("/ws");
        return Ok(url.into());
    }

    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    let mut socket_url = Url::parse(&format!("{scheme}://{}", url.authority()))?;
    socket_url.set_path("/ws");
    Ok(socket_url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert!(config.url.is_empty());
        assert_eq!(config.reconnect_base_delay, Duration::from_secs(5));
        assert_eq!(config.reconnect_max_delay, Duration::from_secs(60));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(20));
        assert_eq!(config.countdown_tick, Duration::from_secs(1));
        assert_eq!(config.max_message_size, 16 * 1024 * 1024);
        assert!(config.project.is_none());
    }

    #[test]
    fn test_builder_pattern() {
        let config = ClientConfig::new("wss://example.com/ws")
            .heartbeat_interval(Duration::from_secs(15))
            .reconnect_base_delay(Duration::from_secs(1))
            .project("books")
            .spider("toscrape");

        assert_eq!(config.url, "wss://example.com/ws");
        assert_eq!(config.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(config.reconnect_base_delay, Duration::from_secs(1));
        assert_eq!(config.project.as_deref(), Some("books"));
        assert_eq!(config.spider.as_deref(), Some("toscrape"));
    }

    #[test]
    fn test_validation_empty_url() {
        let result = ClientConfig::default().validate();
        assert_eq!(result.unwrap_err(), "URL cannot be empty");
    }

    #[test]
    fn test_validation_zero_heartbeat() {
        let config = ClientConfig::new("ws://localhost/ws").heartbeat_interval(Duration::ZERO);
        assert_eq!(
            config.validate().unwrap_err(),
            "Heartbeat interval must be > 0"
        );
    }

    #[test]
    fn test_validation_inverted_backoff() {
        let config = ClientConfig::new("ws://localhost/ws")
            .reconnect_base_delay(Duration::from_secs(10))
            .reconnect_max_delay(Duration::from_secs(1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_normalize_socket_urls_get_ws_path() {
        assert_eq!(
            normalize_url("wss://slyd.example.com/custom").unwrap(),
            "wss://slyd.example.com/ws"
        );
        assert_eq!(
            normalize_url("ws://127.0.0.1:9001").unwrap(),
            "ws://127.0.0.1:9001/ws"
        );
        assert_eq!(
            normalize_url("ws://127.0.0.1:9001/ws").unwrap(),
            "ws://127.0.0.1:9001/ws"
        );
    }

    #[test]
    fn test_normalize_http_schemes() {
        assert_eq!(
            normalize_url("https://portia.example.com/projects").unwrap(),
            "wss://portia.example.com/ws"
        );
        assert_eq!(
            normalize_url("http://localhost:9001").unwrap(),
            "ws://localhost:9001/ws"
        );
    }

    #[test]
    fn test_new_keeps_unparseable_url() {
        let config = ClientConfig::new("not a url");
        assert_eq!(config.url, "not a url");
    }
}
