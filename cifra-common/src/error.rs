//! Common error types for Cifra

use thiserror::Error;

/// Common result type for Cifra operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the Cifra crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_variant_has_a_prefixed_message() {
        let errors = [
            Error::Database(sqlx::Error::RowNotFound),
            Error::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "cifra.toml")),
            Error::Config("bad port".to_string()),
            Error::Internal("pool closed".to_string()),
        ];
        for err in &errors {
            let prefix = match err {
                Error::Database(_) => "Database error: ",
                Error::Io(_) => "IO error: ",
                Error::Config(_) => "Configuration error: ",
                Error::Internal(_) => "Internal error: ",
            };
            assert!(err.to_string().starts_with(prefix), "{}", err);
        }
    }
}
