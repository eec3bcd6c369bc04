//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Detect listeners that would collide
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::{ProxyConfig, StoreKind};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: '{value}' is not a socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    ZeroTimeout { field: &'static str },

    #[error("store.path must be set for the {kind:?} store")]
    MissingStorePath { kind: StoreKind },

    #[error("{first} and {second} share the address {address}")]
    AddressConflict {
        first: &'static str,
        second: &'static str,
        address: SocketAddr,
    },
}

/// Check `config` for semantic errors.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let listener = parse_addr("listener.bind_address", &config.listener.bind_address, &mut errors);
    let admin = config
        .admin
        .enabled
        .then(|| parse_addr("admin.bind_address", &config.admin.bind_address, &mut errors))
        .flatten();
    let metrics = config
        .observability
        .metrics_enabled
        .then(|| {
            parse_addr(
                "observability.metrics_address",
                &config.observability.metrics_address,
                &mut errors,
            )
        })
        .flatten();

    let bound = [
        ("listener.bind_address", listener),
        ("admin.bind_address", admin),
        ("observability.metrics_address", metrics),
    ];
    for (i, (first, a)) in bound.iter().enumerate() {
        for (second, b) in &bound[i + 1..] {
            if let (Some(a), Some(b)) = (a, b) {
                if a == b && a.port() != 0 {
                    errors.push(ValidationError::AddressConflict {
                        first: *first,
                        second: *second,
                        address: *a,
                    });
                }
            }
        }
    }

    let timeouts = [
        ("timeouts.startup_secs", config.timeouts.startup_secs),
        ("timeouts.upstream_secs", config.timeouts.upstream_secs),
        ("timeouts.persist_secs", config.timeouts.persist_secs),
    ];
    for (field, secs) in timeouts {
        if secs == 0 {
            errors.push(ValidationError::ZeroTimeout { field });
        }
    }

    if config.store.kind != StoreKind::Memory && config.store.path.trim().is_empty() {
        errors.push(ValidationError::MissingStorePath {
            kind: config.store.kind,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn parse_addr(
    field: &'static str,
    value: &str,
    errors: &mut Vec<ValidationError>,
) -> Option<SocketAddr> {
    match value.parse() {
        Ok(addr) => Some(addr),
        Err(_) => {
            errors.push(ValidationError::InvalidAddress {
                field,
                value: value.to_string(),
            });
            None
        }
    }
}
