//! Built-in configuration defaults and internal tuning constants.

/// Default HTTP server bind address
pub const SERVER_ADDR: &str = "0.0.0.0:8080";

/// Default MQTT broker host
pub const BROKER_HOST: &str = "localhost";

/// Default MQTT broker port
pub const BROKER_PORT: u16 = 1883;

/// MQTT client identifier for this console
pub const MQTT_CLIENT_ID: &str = "sentry-console";

/// MQTT keep-alive interval
pub const MQTT_KEEP_ALIVE_SECS: u64 = 30;

/// Default record store path
pub const DB_PATH: &str = "./data/records.db";

/// Checkpoint names in patrol order
pub const CHECKPOINTS: [&str; 4] = ["A", "B", "C", "D"];

/// Nominal seconds between consecutive checkpoint visits for one sentry
pub const LEG_INTERVAL_SECS: u64 = 900;

/// Maximum random jitter applied to each expected visit time.
/// Randomized visit times keep the patrol pattern unpredictable to observers.
pub const LEG_JITTER_SECS: u64 = 60;

/// Capacity of the bounded outbound signal queue (bus publishes).
/// A full queue drops the notification; state is already committed.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;

/// Capacity of the viewer push broadcast channel. Slow viewers lag and lose
/// messages rather than stalling the coordinator.
pub const PUSH_CHANNEL_CAPACITY: usize = 256;

/// rumqttc in-flight request queue capacity
pub const MQTT_REQUEST_CAPACITY: usize = 32;

/// Delay before re-polling the MQTT event loop after a connection error
pub const MQTT_RECONNECT_DELAY_SECS: u64 = 5;
