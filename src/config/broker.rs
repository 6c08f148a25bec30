//! Broker Connection Configuration
//!
//! Where the forwarder connects and what it subscribes to.

use std::time::Duration;

use serde::Deserialize;

use crate::protocol::QoS;
use crate::topic::ALL_TOPICS;

/// Default plain MQTT port
pub const DEFAULT_PORT: u16 = 1883;

/// Default MQTT over TLS port
pub const DEFAULT_TLS_PORT: u16 = 8883;

/// Configuration for the broker connection
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker host name or address
    pub host: String,

    /// Broker port (defaults to 1883, or 8883 when TLS is configured)
    pub port: Option<u16>,

    /// Client ID presented in CONNECT
    pub client_id: String,

    /// Username for authentication
    pub username: Option<String>,

    /// Password for authentication
    pub password: Option<String>,

    /// Keep-alive interval in seconds (0 disables PINGREQ)
    pub keep_alive: u16,

    /// Ask the broker to discard any previous session
    pub clean_session: bool,

    /// Topic filter to subscribe to
    pub topic_filter: String,

    /// Requested subscription QoS (0 or 1)
    pub qos: u8,

    /// TCP connect and CONNACK/SUBACK timeout (e.g. "30s")
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Reconnect after an established connection is lost
    pub reconnect: bool,

    /// Initial reconnect delay (e.g. "5s")
    #[serde(with = "humantime_serde")]
    pub reconnect_interval: Duration,

    /// Upper bound for the exponential reconnect delay (e.g. "60s")
    #[serde(with = "humantime_serde")]
    pub max_reconnect_interval: Duration,

    /// Maximum inbound packet size in bytes
    pub max_packet_size: usize,

    /// TLS configuration; presence enables MQTT over TLS
    pub tls: Option<BrokerTlsConfig>,
}

fn default_client_id() -> String {
    format!("docbridge-{}", std::process::id())
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: None,
            client_id: default_client_id(),
            username: None,
            password: None,
            keep_alive: 60,
            clean_session: true,
            topic_filter: ALL_TOPICS.to_string(),
            qos: 0,
            connect_timeout: Duration::from_secs(30),
            reconnect: true,
            reconnect_interval: Duration::from_secs(5),
            max_reconnect_interval: Duration::from_secs(60),
            max_packet_size: crate::codec::DEFAULT_MAX_PACKET_SIZE,
            tls: None,
        }
    }
}

impl BrokerConfig {
    /// Check if the connection uses TLS
    pub fn uses_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Configured port, or the protocol default
    pub fn effective_port(&self) -> u16 {
        match self.port {
            Some(port) => port,
            None if self.uses_tls() => DEFAULT_TLS_PORT,
            None => DEFAULT_PORT,
        }
    }

    /// `host:port` for dialing
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.effective_port())
    }

    /// Requested subscription QoS
    pub fn subscription_qos(&self) -> QoS {
        QoS::from_u8(self.qos).unwrap_or_default()
    }

    /// Keep-alive as Duration, None when disabled
    pub fn keep_alive_duration(&self) -> Option<Duration> {
        match self.keep_alive {
            0 => None,
            secs => Some(Duration::from_secs(secs as u64)),
        }
    }
}

/// TLS configuration for the broker connection
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BrokerTlsConfig {
    /// Path to CA certificate file (PEM format)
    pub ca_cert: String,

    /// Path to client certificate file (PEM format)
    pub client_cert: Option<String>,

    /// Path to client private key file (PEM format)
    pub client_key: Option<String>,

    /// Server name for SNI and verification (defaults to host)
    pub server_name: Option<String>,
}
