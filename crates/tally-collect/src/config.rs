//! Collector configuration.

use std::time::Duration;

/// Settings for one [`Collector`](crate::Collector) instance.
#[derive(Debug, Clone)]
pub struct CollectConfig {
    /// Sink host, `host` or `host:port`. Port 4242 is assumed if absent.
    pub host: String,
    /// Prepended with a `.` to every metric name.
    pub prefix: String,
    /// Replaces the OS host name as the default `host` tag.
    pub host_tag: Option<String>,
    /// Time between snapshots.
    pub interval: Duration,
    /// Buffered data points above which new points are dropped.
    pub max_queue_len: usize,
    /// Maximum data points per POST.
    pub batch_size: usize,
    /// Capacity of the ingestion channel feeding the buffer.
    pub channel_capacity: usize,
    /// Sender sleep when the buffer is empty.
    pub idle_wait: Duration,
    /// Sender sleep after a failed batch.
    pub retry_wait: Duration,
    /// Points older than this are discarded instead of requeued.
    pub max_retry_age: Duration,
    /// Bound on a single delivery request.
    pub request_timeout: Duration,
    /// Verbose per-batch logging.
    pub debug: bool,
    /// Log batches in telnet form instead of POSTing them.
    pub print: bool,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            prefix: String::new(),
            host_tag: None,
            interval: Duration::from_secs(15),
            max_queue_len: 200_000,
            batch_size: 50,
            channel_capacity: 1024,
            idle_wait: Duration::from_secs(1),
            retry_wait: Duration::from_secs(5),
            max_retry_age: Duration::from_secs(30 * 60),
            request_timeout: Duration::from_secs(60),
            debug: false,
            print: false,
        }
    }
}

impl CollectConfig {
    pub fn new(host: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    pub fn with_host_tag(mut self, host_tag: impl Into<String>) -> Self {
        self.host_tag = Some(host_tag.into());
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_queue_len(mut self, max_queue_len: usize) -> Self {
        self.max_queue_len = max_queue_len;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn with_idle_wait(mut self, wait: Duration) -> Self {
        self.idle_wait = wait;
        self
    }

    pub fn with_retry_wait(mut self, wait: Duration) -> Self {
        self.retry_wait = wait;
        self
    }

    pub fn with_max_retry_age(mut self, age: Duration) -> Self {
        self.max_retry_age = age;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_print(mut self, print: bool) -> Self {
        self.print = print;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CollectConfig::new("tsdb", "app");
        assert_eq!(config.interval, Duration::from_secs(15));
        assert_eq!(config.max_queue_len, 200_000);
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.retry_wait, Duration::from_secs(5));
        assert_eq!(config.max_retry_age, Duration::from_secs(1800));
        assert!(!config.debug);
        assert!(!config.print);
    }

    #[test]
    fn batch_size_never_zero() {
        let config = CollectConfig::default().with_batch_size(0);
        assert_eq!(config.batch_size, 1);
    }
}
