use std::fmt;

/// Main error type for payflow
#[derive(Debug)]
pub enum Error {
    /// Configuration errors
    Config(String),

    /// Database errors (SQLx wrapped)
    Database(sqlx::Error),

    /// HTTP/Network errors
    Network(String),

    /// Authentication/Authorization errors (bad signature, bad token)
    Unauthorized(String),

    /// Validation errors
    Validation(String),

    /// Not found errors
    NotFound(String),

    /// Payment processing errors
    Payment(String),

    /// Queue substrate errors
    Queue(String),

    /// Cache/Redis errors
    Cache(String),

    /// Model invariant violation (e.g. reverting a terminal transaction)
    Invariant(String),

    /// Serialization/deserialization errors
    Serialization(serde_json::Error),

    /// IO errors
    Io(std::io::Error),

    /// Generic errors with description
    Other(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Database(e) => write!(f, "Database error: {}", e),
            Error::Network(msg) => write!(f, "Network error: {}", msg),
            Error::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            Error::Validation(msg) => write!(f, "Validation error: {}", msg),
            Error::NotFound(msg) => write!(f, "Not found: {}", msg),
            Error::Payment(msg) => write!(f, "Payment error: {}", msg),
            Error::Queue(msg) => write!(f, "Queue error: {}", msg),
            Error::Cache(msg) => write!(f, "Cache error: {}", msg),
            Error::Invariant(msg) => write!(f, "Invariant violation: {}", msg),
            Error::Serialization(e) => write!(f, "Serialization error: {}", e),
            Error::Io(e) => write!(f, "IO error: {}", e),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Database(e) => Some(e),
            Error::Serialization(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

// Conversions from external error types
impl From<sqlx::Error> for Error {
    fn from(error: sqlx::Error) -> Self {
        Error::Database(error)
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Serialization(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::Io(error)
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::Config(error.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(error: reqwest::Error) -> Self {
        Error::Network(error.to_string())
    }
}

impl From<uuid::Error> for Error {
    fn from(error: uuid::Error) -> Self {
        Error::Validation(format!("Invalid UUID: {}", error))
    }
}

impl From<redis::RedisError> for Error {
    fn from(error: redis::RedisError) -> Self {
        Error::Cache(error.to_string())
    }
}

// Common error constructors
impl Error {
    /// Create a new configuration error
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new validation error
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a new not found error
    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        Error::NotFound(msg.into())
    }

    /// Create a new unauthorized error
    pub fn unauthorized<T: Into<String>>(msg: T) -> Self {
        Error::Unauthorized(msg.into())
    }

    /// Create a new payment error
    pub fn payment<T: Into<String>>(msg: T) -> Self {
        Error::Payment(msg.into())
    }

    /// Create a new queue error
    pub fn queue<T: Into<String>>(msg: T) -> Self {
        Error::Queue(msg.into())
    }

    /// Create a new cache error
    pub fn cache<T: Into<String>>(msg: T) -> Self {
        Error::Cache(msg.into())
    }

    /// Create a new invariant violation error
    pub fn invariant<T: Into<String>>(msg: T) -> Self {
        Error::Invariant(msg.into())
    }

    /// Create a new network error
    pub fn network<T: Into<String>>(msg: T) -> Self {
        Error::Network(msg.into())
    }
}

impl Error {
    /// Get HTTP status code for error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Unauthorized(_) => 401,
            Error::Validation(_) => 400,
            Error::NotFound(_) => 404,
            Error::Payment(_) => 402,
            Error::Network(_) => 503,
            Error::Config(_)
            | Error::Database(_)
            | Error::Queue(_)
            | Error::Cache(_)
            | Error::Invariant(_)
            | Error::Serialization(_)
            | Error::Io(_)
            | Error::Other(_) => 500,
        }
    }

    /// Get error category for monitoring
    pub fn category(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Database(_) => "database",
            Error::Network(_) => "network",
            Error::Unauthorized(_) => "auth",
            Error::Validation(_) => "validation",
            Error::NotFound(_) => "not_found",
            Error::Payment(_) => "payment",
            Error::Queue(_) => "queue",
            Error::Cache(_) => "cache",
            Error::Invariant(_) => "invariant",
            Error::Serialization(_) => "serialization",
            Error::Io(_) => "io",
            Error::Other(_) => "other",
        }
    }

    /// Whether a worker should route this error through the backoff path.
    ///
    /// Validation and invariant violations go straight to the dead letter
    /// list; transport, substrate and gateway-shaped failures retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Queue(_) | Error::Cache(_) | Error::Database(_)
        )
    }
}
