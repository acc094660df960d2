//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (status codes, limits, timeouts)
//! - Check route methods and patterns are usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use axum::http::Method;

use crate::config::schema::{ListenerConfig, ServeConfig, StaticRouteConfig};

/// A single semantic problem, located by its field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
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

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &ServeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (i, listener) in config.listeners.iter().enumerate() {
        validate_listener(&format!("listeners[{i}]"), listener, &mut errors);
    }

    for (i, route) in config.routes.iter().enumerate() {
        validate_route(&format!("routes[{i}]"), route, &mut errors);
    }

    if config.dispatch.max_body_bytes == 0 {
        errors.push(ValidationError::new("dispatch.max_body_bytes", "must be greater than 0"));
    }
    if config.dispatch.fallback_timeout_ms == Some(0) {
        errors.push(ValidationError::new(
            "dispatch.fallback_timeout_ms",
            "must be greater than 0 when set",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_listener(field: &str, listener: &ListenerConfig, errors: &mut Vec<ValidationError>) {
    if listener.host.trim().is_empty() {
        errors.push(ValidationError::new(format!("{field}.host"), "must not be empty"));
    }
    if listener.max_connections == 0 {
        errors.push(ValidationError::new(
            format!("{field}.max_connections"),
            "must be greater than 0",
        ));
    }
}

fn validate_route(field: &str, route: &StaticRouteConfig, errors: &mut Vec<ValidationError>) {
    if Method::from_bytes(route.method.as_bytes()).is_err() {
        errors.push(ValidationError::new(
            format!("{field}.method"),
            format!("'{}' is not an HTTP method", route.method),
        ));
    }
    if !route.path.starts_with('/') {
        errors.push(ValidationError::new(format!("{field}.path"), "must start with '/'"));
    }
    if !(100..=599).contains(&route.status) {
        errors.push(ValidationError::new(
            format!("{field}.status"),
            format!("{} is outside 100-599", route.status),
        ));
    }
}
