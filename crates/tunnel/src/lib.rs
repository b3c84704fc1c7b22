// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Habridge Contributors

// habridge - SSH tunnel management
// Spawns and supervises ssh local forwards to remote database ports

pub mod probe;
pub mod registry;
pub mod tunnel;

pub use probe::{database_greeting, port_open};
pub use registry::TunnelRegistry;
pub use tunnel::{Tunnel, TunnelReport, DEFAULT_WAIT_SECS};
