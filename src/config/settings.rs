use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Includes settings for both the broker and logging.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub logging: LoggingSettings,
}

/// Configuration settings for the broker.
///
/// Controls the size of the asynchronous worker pool, the bound of the
/// home-thread queue and whether a purge is scheduled after each publish.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BrokerSettings {
    pub worker_threads: usize,
    pub home_queue_capacity: usize,
    pub purge_after_publish: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub worker_threads: Option<usize>,
    pub home_queue_capacity: Option<usize>,
    pub purge_after_publish: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            home_queue_capacity: 256,
            purge_after_publish: true,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl PartialSettings {
    /// Fills every missing value from `default`.
    pub fn merge(self, default: Settings) -> Settings {
        let broker = self.broker;
        let logging = self.logging;

        Settings {
            broker: BrokerSettings {
                worker_threads: broker
                    .as_ref()
                    .and_then(|b| b.worker_threads)
                    .filter(|n| *n > 0)
                    .unwrap_or(default.broker.worker_threads),
                home_queue_capacity: broker
                    .as_ref()
                    .and_then(|b| b.home_queue_capacity)
                    .filter(|n| *n > 0)
                    .unwrap_or(default.broker.home_queue_capacity),
                purge_after_publish: broker
                    .as_ref()
                    .and_then(|b| b.purge_after_publish)
                    .unwrap_or(default.broker.purge_after_publish),
            },
            logging: LoggingSettings {
                level: logging
                    .and_then(|l| l.level)
                    .unwrap_or(default.logging.level),
            },
        }
    }
}
