//! Mosquitto bridge configuration
//!
//! Renders the `conf.d` block that makes the local Mosquitto broker mirror
//! every topic to a remote MQTT server and refuse anonymous local clients.

use std::fmt;
use std::path::Path;

use tracing::info;

/// Default remote MQTT server
pub const DEFAULT_REMOTE_HOST: &str = "eu1.cloud.thethings.network";

/// Default remote MQTT over TLS port
pub const DEFAULT_REMOTE_PORT: u16 = 8883;

/// Default bridge connection name
pub const DEFAULT_CONNECTION_NAME: &str = "bridge-to-cloud";

/// Default output file
pub const DEFAULT_OUTPUT: &str = "/etc/mosquitto/conf.d/secure.conf";

/// Error type for bridge configuration
#[derive(Debug)]
pub enum BridgeConfigError {
    /// IO error writing the file
    Io(std::io::Error),
    /// A value would produce an unusable or ambiguous file
    Invalid(String),
}

impl fmt::Display for BridgeConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeConfigError::Io(e) => write!(f, "IO error: {}", e),
            BridgeConfigError::Invalid(msg) => write!(f, "Invalid bridge configuration: {}", msg),
        }
    }
}

impl std::error::Error for BridgeConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeConfigError::Io(e) => Some(e),
            BridgeConfigError::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for BridgeConfigError {
    fn from(e: std::io::Error) -> Self {
        BridgeConfigError::Io(e)
    }
}

/// One Mosquitto bridge connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MosquittoBridge {
    /// Bridge connection name
    pub connection: String,
    /// Remote host
    pub address: String,
    /// Remote port
    pub port: u16,
    /// Remote username
    pub username: String,
    /// Remote password
    pub password: String,
}

impl Default for MosquittoBridge {
    fn default() -> Self {
        Self {
            connection: DEFAULT_CONNECTION_NAME.to_string(),
            address: DEFAULT_REMOTE_HOST.to_string(),
            port: DEFAULT_REMOTE_PORT,
            username: String::new(),
            password: String::new(),
        }
    }
}

impl MosquittoBridge {
    /// Check every value fits on one config line
    pub fn validate(&self) -> Result<(), BridgeConfigError> {
        let fields = [
            ("connection", &self.connection),
            ("address", &self.address),
            ("username", &self.username),
            ("password", &self.password),
        ];

        for (name, value) in fields {
            if value.is_empty() {
                return Err(BridgeConfigError::Invalid(format!("{} cannot be empty", name)));
            }
            if value.contains(['\n', '\r']) {
                return Err(BridgeConfigError::Invalid(format!(
                    "{} cannot contain line breaks",
                    name
                )));
            }
        }

        if self.connection.contains(char::is_whitespace)
            || self.address.contains(char::is_whitespace)
        {
            return Err(BridgeConfigError::Invalid(
                "connection and address cannot contain whitespace".to_string(),
            ));
        }

        if self.port == 0 {
            return Err(BridgeConfigError::Invalid("port cannot be 0".to_string()));
        }

        Ok(())
    }

    /// Render the configuration block
    pub fn render(&self) -> String {
        format!(
            "# Bridge to a remote MQTT server\n\
             connection {}\n\
             address {}:{}\n\
             topic # both 0\n\
             remote_username {}\n\
             remote_password {}\n\
             start_type automatic\n\
             try_private false\n\
             notifications false\n\
             cleansession true\n\
             \n\
             # Disable anonymous local connections\n\
             allow_anonymous false\n",
            self.connection, self.address, self.port, self.username, self.password
        )
    }

    /// Validate, then write the block to `path`, creating its directory
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<(), BridgeConfigError> {
        self.validate()?;

        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.render())?;

        info!(
            "Wrote bridge '{}' to {}:{} into {}",
            self.connection,
            self.address,
            self.port,
            path.display()
        );
        Ok(())
    }
}
