//! # Evently Core
//!
//! Configuration and input validation shared by the Evently gateway and CLI.
//!
//! This crate provides:
//! - Configuration loading and validation (JSON5 format)
//! - Boundary validation for emails, passwords and display names

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod validation;

pub use config::{AuthConfig, Config, ConfigError, LogFormat, OAuthProviderConfig};
pub use validation::{ValidationError, validate_email, validate_name, validate_password};
