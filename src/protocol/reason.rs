//! MQTT v3.1.1 return codes carried by CONNACK and SUBACK

use std::fmt;

use super::QoS;

/// CONNACK return code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ConnectReturnCode {
    /// Connection accepted
    #[default]
    Accepted = 0x00,
    /// The server does not support the requested protocol level
    UnacceptableProtocolVersion = 0x01,
    /// Client identifier rejected
    IdentifierRejected = 0x02,
    /// MQTT service unavailable
    ServerUnavailable = 0x03,
    /// Malformed user name or password
    BadUserNameOrPassword = 0x04,
    /// Client is not authorized to connect
    NotAuthorized = 0x05,
}

impl ConnectReturnCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(ConnectReturnCode::Accepted),
            0x01 => Some(ConnectReturnCode::UnacceptableProtocolVersion),
            0x02 => Some(ConnectReturnCode::IdentifierRejected),
            0x03 => Some(ConnectReturnCode::ServerUnavailable),
            0x04 => Some(ConnectReturnCode::BadUserNameOrPassword),
            0x05 => Some(ConnectReturnCode::NotAuthorized),
            _ => None,
        }
    }

    pub fn is_accepted(self) -> bool {
        self == ConnectReturnCode::Accepted
    }
}

impl fmt::Display for ConnectReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ConnectReturnCode::Accepted => "Connection accepted",
            ConnectReturnCode::UnacceptableProtocolVersion => "Unacceptable protocol version",
            ConnectReturnCode::IdentifierRejected => "Identifier rejected",
            ConnectReturnCode::ServerUnavailable => "Server unavailable",
            ConnectReturnCode::BadUserNameOrPassword => "Bad user name or password",
            ConnectReturnCode::NotAuthorized => "Not authorized",
        };
        write!(f, "{} ({})", text, *self as u8)
    }
}

/// SUBACK return code for a single filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscribeReturnCode {
    /// Subscription accepted with the granted maximum QoS
    Granted(QoS),
    /// Subscription refused (0x80)
    Failure,
}

impl SubscribeReturnCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0x80 => Some(SubscribeReturnCode::Failure),
            code => QoS::from_u8(code).map(SubscribeReturnCode::Granted),
        }
    }

    pub fn to_u8(self) -> u8 {
        match self {
            SubscribeReturnCode::Granted(qos) => qos as u8,
            SubscribeReturnCode::Failure => 0x80,
        }
    }
}

impl fmt::Display for SubscribeReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscribeReturnCode::Granted(qos) => write!(f, "Granted QoS {}", qos),
            SubscribeReturnCode::Failure => write!(f, "Failure"),
        }
    }
}
