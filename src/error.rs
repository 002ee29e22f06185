//! Error handling for the Kraken test proxy
//!
//! One error type for the whole crate. Protocol errors raised by the intercept
//! hooks are fatal to the connection that produced them; nothing here is
//! retried automatically.

use std::fmt;
use std::io;

use tokio_tungstenite::tungstenite;

/// Main error type for the proxy
#[derive(Debug)]
pub enum ProxyError {
    // Configuration errors
    ConfigNotFound(String),
    ConfigParse(String),
    ConfigValidation(String),

    // Wire protocol errors
    MalformedMessage(String),
    MissingField(String, String), // (method, field)

    // Transport errors
    Tls(String),
    Handshake(String),
    UpstreamConnection(String),
    Transport(String),
    Timeout(String),
    ConnectionClosed(String),

    // IO errors
    FileRead(String),
    FileWrite(String),

    // General errors
    StatePoisoned(String),
    Internal(String),
}

impl ProxyError {
    /// Get a user-friendly error message with helpful context
    pub fn user_message(&self) -> String {
        match self {
            ProxyError::ConfigNotFound(path) => {
                format!(
                    "Configuration file not found: {}\n\n\
                    Quick fix:\n\
                    1. Run: kraken-proxy init\n\
                    2. Point cert_file/key_file at your TLS certificate\n\
                    3. Try again",
                    path
                )
            }
            ProxyError::Tls(msg) => {
                format!(
                    "TLS setup failed: {}\n\n\
                    Check:\n\
                    - cert_file is a PEM certificate chain\n\
                    - key_file is a PEM PKCS#8 private key\n\
                    - environment variables in the paths are set",
                    msg
                )
            }
            ProxyError::UpstreamConnection(msg) => {
                format!(
                    "Could not reach the exchange: {}\n\n\
                    Check url_private/url_public in the [kraken] section",
                    msg
                )
            }
            _ => self.to_string(),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            ProxyError::ConfigNotFound(_)
            | ProxyError::ConfigParse(_)
            | ProxyError::ConfigValidation(_) => "config",

            ProxyError::MalformedMessage(_) | ProxyError::MissingField(_, _) => "protocol",

            ProxyError::Tls(_)
            | ProxyError::Handshake(_)
            | ProxyError::UpstreamConnection(_)
            | ProxyError::Transport(_)
            | ProxyError::Timeout(_)
            | ProxyError::ConnectionClosed(_) => "transport",

            ProxyError::FileRead(_) | ProxyError::FileWrite(_) => "io",

            ProxyError::StatePoisoned(_) | ProxyError::Internal(_) => "internal",
        }
    }
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::ConfigNotFound(path) => {
                write!(f, "Configuration file not found: {}", path)
            }
            ProxyError::ConfigParse(msg) => {
                write!(f, "Configuration parse error: {}", msg)
            }
            ProxyError::ConfigValidation(msg) => {
                write!(f, "Configuration validation error: {}", msg)
            }

            ProxyError::MalformedMessage(msg) => {
                write!(f, "Malformed message: {}", msg)
            }
            ProxyError::MissingField(method, field) => {
                write!(f, "Malformed {} message: missing or invalid '{}'", method, field)
            }

            ProxyError::Tls(msg) => {
                write!(f, "TLS error: {}", msg)
            }
            ProxyError::Handshake(msg) => {
                write!(f, "WebSocket handshake failed: {}", msg)
            }
            ProxyError::UpstreamConnection(msg) => {
                write!(f, "Upstream connection error: {}", msg)
            }
            ProxyError::Transport(msg) => {
                write!(f, "Transport error: {}", msg)
            }
            ProxyError::Timeout(msg) => {
                write!(f, "Timed out: {}", msg)
            }
            ProxyError::ConnectionClosed(msg) => {
                write!(f, "Connection closed: {}", msg)
            }

            ProxyError::FileRead(msg) => {
                write!(f, "File read error: {}", msg)
            }
            ProxyError::FileWrite(msg) => {
                write!(f, "File write error: {}", msg)
            }

            ProxyError::StatePoisoned(what) => {
                write!(f, "Lock poisoned: {}", what)
            }
            ProxyError::Internal(msg) => {
                write!(f, "Internal error: {}", msg)
            }
        }
    }
}

impl std::error::Error for ProxyError {}

// Conversion implementations for common error types

impl From<io::Error> for ProxyError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ProxyError::FileRead(err.to_string()),
            io::ErrorKind::TimedOut => ProxyError::Timeout(err.to_string()),
            io::ErrorKind::ConnectionRefused => ProxyError::UpstreamConnection(err.to_string()),
            io::ErrorKind::ConnectionReset | io::ErrorKind::BrokenPipe => {
                ProxyError::ConnectionClosed(err.to_string())
            }
            _ => ProxyError::Transport(format!("IO error: {}", err)),
        }
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        ProxyError::MalformedMessage(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for ProxyError {
    fn from(err: toml::de::Error) -> Self {
        ProxyError::ConfigParse(format!("TOML parse error: {}", err))
    }
}

impl From<tungstenite::Error> for ProxyError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                ProxyError::ConnectionClosed(err.to_string())
            }
            tungstenite::Error::Io(io_err) => io_err.into(),
            tungstenite::Error::Url(_) | tungstenite::Error::Http(_) => {
                ProxyError::Handshake(err.to_string())
            }
            _ => ProxyError::Transport(err.to_string()),
        }
    }
}

impl From<native_tls::Error> for ProxyError {
    fn from(err: native_tls::Error) -> Self {
        ProxyError::Tls(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ProxyError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        ProxyError::Timeout(err.to_string())
    }
}

impl From<crate::config::ConfigError> for ProxyError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::FileNotFound(path) => ProxyError::ConfigNotFound(path),
            ConfigError::FileRead(msg) => ProxyError::FileRead(msg),
            ConfigError::FileWrite(msg) => ProxyError::FileWrite(msg),
            ConfigError::Parse(msg) => ProxyError::ConfigParse(msg),
            ConfigError::Serialize(msg) => ProxyError::Internal(msg),
            ConfigError::Validation(msg) => ProxyError::ConfigValidation(msg),
        }
    }
}

/// Result type alias using ProxyError
pub type ProxyResult<T> = Result<T, ProxyError>;
