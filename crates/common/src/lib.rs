// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Habridge Contributors

// habridge - Common Library
// Shared configuration, secrets, and error types

pub mod config;
pub mod error;
pub mod secrets;

pub use config::{config_dir, Config, ServerConfig, ServerEntry, FALLBACK_SERVER};
pub use error::{Error, Result};
pub use secrets::{
    Credentials, DatabaseSecrets, SecretString, SecretsFile, ServerSecrets, TunnelEndpoint,
    TunnelSecrets,
};
