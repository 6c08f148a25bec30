//! Broker Connection
//!
//! MQTT v3.1.1 client side of the forwarder: dial the broker (plain TCP or
//! TLS), CONNECT, SUBSCRIBE to the configured filter, then run the session
//! loop that hands every PUBLISH to the dispatcher.

mod session;
mod tls;

pub use session::Session;
pub use tls::{load_tls_connector, server_name, TlsError};

use std::fmt;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::config::BrokerConfig;
use crate::protocol::{ConnectReturnCode, DecodeError, EncodeError};

/// Error type for the broker connection
#[derive(Debug)]
pub enum ClientError {
    /// Socket error
    Io(std::io::Error),
    /// TLS setup or handshake error
    Tls(TlsError),
    /// No response in time; names the step that timed out
    Timeout(&'static str),
    /// Broker refused the CONNECT
    Rejected(ConnectReturnCode),
    /// Broker refused the subscription
    SubscribeFailed(String),
    /// Malformed packet from the broker
    Decode(DecodeError),
    /// Packet could not be encoded
    Encode(EncodeError),
    /// Broker sent something out of sequence
    Protocol(String),
    /// Connection closed by the broker
    ConnectionLost(String),
    /// Nothing received within 1.5x keep-alive
    KeepAliveTimeout,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Io(e) => write!(f, "IO error: {}", e),
            ClientError::Tls(e) => write!(f, "TLS error: {}", e),
            ClientError::Timeout(step) => write!(f, "Timed out waiting for {}", step),
            ClientError::Rejected(code) => write!(f, "Connection refused: {}", code),
            ClientError::SubscribeFailed(filter) => {
                write!(f, "Subscription to '{}' refused", filter)
            }
            ClientError::Decode(e) => write!(f, "Decode error: {}", e),
            ClientError::Encode(e) => write!(f, "Encode error: {}", e),
            ClientError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            ClientError::ConnectionLost(msg) => write!(f, "Connection lost: {}", msg),
            ClientError::KeepAliveTimeout => write!(f, "Keep-alive timeout"),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ClientError::Io(e) => Some(e),
            ClientError::Tls(e) => Some(e),
            ClientError::Decode(e) => Some(e),
            ClientError::Encode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(e: std::io::Error) -> Self {
        ClientError::Io(e)
    }
}

impl From<TlsError> for ClientError {
    fn from(e: TlsError) -> Self {
        ClientError::Tls(e)
    }
}

impl From<DecodeError> for ClientError {
    fn from(e: DecodeError) -> Self {
        ClientError::Decode(e)
    }
}

impl From<EncodeError> for ClientError {
    fn from(e: EncodeError) -> Self {
        ClientError::Encode(e)
    }
}

/// Byte stream to the broker, plain or TLS
pub trait BrokerStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> BrokerStream for T {}

/// Dials the broker and opens subscribed sessions
pub struct BrokerClient {
    config: BrokerConfig,
    tls: Option<TlsConnector>,
}

impl BrokerClient {
    /// Create a client; loads TLS material up front when configured
    pub fn new(config: BrokerConfig) -> Result<Self, ClientError> {
        let tls = match &config.tls {
            Some(tls_config) => Some(load_tls_connector(tls_config)?),
            None => None,
        };

        Ok(Self { config, tls })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Dial the broker, CONNECT and SUBSCRIBE.
    ///
    /// Returns once the SUBACK grants the subscription.
    pub async fn connect(&self) -> Result<Session<Box<dyn BrokerStream>>, ClientError> {
        let address = self.config.address();
        debug!("Connecting to broker at {}", address);

        let tcp = timeout(self.config.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| ClientError::Timeout("TCP connect"))??;
        tcp.set_nodelay(true)?;

        let stream: Box<dyn BrokerStream> = match (&self.tls, &self.config.tls) {
            (Some(connector), Some(tls_config)) => {
                let domain = server_name(tls_config, &self.config.host)?;
                let tls_stream = timeout(self.config.connect_timeout, connector.connect(domain, tcp))
                    .await
                    .map_err(|_| ClientError::Timeout("TLS handshake"))??;
                debug!("TLS established with {}", address);
                Box::new(tls_stream)
            }
            _ => Box::new(tcp),
        };

        let mut session = Session::new(stream, &self.config);
        session.handshake(&self.config).await?;
        Ok(session)
    }
}
