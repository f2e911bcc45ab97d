//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Endpoint URLs parse and their scheme matches the configured substrate
//! - Value ranges (timeouts > 0, at least one attempt)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>

use crate::config::schema::{ClientConfig, RetryConfig, TransportConfig};
use crate::account::Address;

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field (e.g., "writer.endpoint_url").
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a full client configuration.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_transport("writer", &config.writer, &mut errors);
    validate_transport("reader", &config.reader, &mut errors);
    validate_retries(&config.retries, &mut errors);

    if !config.contracts.evm_address.is_empty() {
        if let Err(e) = Address::from_hex(&config.contracts.evm_address) {
            errors.push(ValidationError::new("contracts.evm_address", e.to_string()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate one transport section.
pub fn validate_transport(
    section: &str,
    transport: &TransportConfig,
    errors: &mut Vec<ValidationError>,
) {
    match url::Url::parse(&transport.endpoint_url) {
        Ok(url) => {
            if !transport.substrate.schemes().contains(&url.scheme()) {
                errors.push(ValidationError::new(
                    format!("{}.endpoint_url", section),
                    format!(
                        "scheme '{}' does not match substrate '{}'",
                        url.scheme(),
                        transport.substrate
                    ),
                ));
            }
        }
        Err(e) => errors.push(ValidationError::new(
            format!("{}.endpoint_url", section),
            format!("invalid URL '{}': {}", transport.endpoint_url, e),
        )),
    }

    if transport.timeout_secs == 0 {
        errors.push(ValidationError::new(
            format!("{}.timeout_secs", section),
            "must be greater than 0",
        ));
    }
}

fn validate_retries(retries: &RetryConfig, errors: &mut Vec<ValidationError>) {
    if retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    }
    if retries.base_delay_ms > retries.max_delay_ms {
        errors.push(ValidationError::new(
            "retries.base_delay_ms",
            "must not exceed retries.max_delay_ms",
        ));
    }
}
