use std::time::Duration;

/// Tunable limits and timers for a single connection (§6).
///
/// Unlike the `Option<usize>` fields this crate historically used (which silently
/// defaulted to zero via `unwrap_or_default()` when unset), every limit here is a
/// plain value with a real default, set via `WebSocketConfig::default()` or the
/// builder setters below.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSocketConfig {
    pub max_frame_size: usize,
    pub max_control_frame_size: usize,
    pub ping_interval: Duration,
    pub idle_timeout: Duration,
}

const DEFAULT_MAX_FRAME_SIZE: usize = 100 << 20; // 100 MiB
const DEFAULT_MAX_CONTROL_FRAME_SIZE: usize = 125;

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_control_frame_size: DEFAULT_MAX_CONTROL_FRAME_SIZE,
            ping_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
        }
    }
}

impl WebSocketConfig {
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Clamped to 125, since RFC 6455 forbids larger control frame payloads.
    pub fn with_max_control_frame_size(mut self, max_control_frame_size: usize) -> Self {
        self.max_control_frame_size = max_control_frame_size.min(125);
        self
    }

    pub fn with_ping_interval(mut self, ping_interval: Duration) -> Self {
        self.ping_interval = ping_interval;
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_have_real_values() {
        let config = WebSocketConfig::default();
        assert_eq!(config.max_frame_size, 100 << 20);
        assert_eq!(config.max_control_frame_size, 125);
        assert_eq!(config.ping_interval, Duration::from_secs(30));
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
    }

    #[test]
    fn control_frame_size_is_clamped_to_125() {
        let config = WebSocketConfig::default().with_max_control_frame_size(1000);
        assert_eq!(config.max_control_frame_size, 125);
    }

    #[test]
    fn builder_setters_compose() {
        let config = WebSocketConfig::default()
            .with_max_frame_size(1024)
            .with_idle_timeout(Duration::from_secs(5));
        assert_eq!(config.max_frame_size, 1024);
        assert_eq!(config.idle_timeout, Duration::from_secs(5));
        assert_eq!(config.max_control_frame_size, 125);
    }
}
