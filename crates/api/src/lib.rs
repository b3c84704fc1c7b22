// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Habridge Contributors

// habridge - Home Assistant API client
// Blocking REST client: states, history, services, energy filters

pub mod client;
pub mod entity;
pub mod history;

pub use client::HassClient;
pub use entity::{domains, energy_entities, entities_in_domain, EntityState, ENERGY_KEYWORDS};
pub use history::{HistoryQuery, DEFAULT_HISTORY_WINDOW_HOURS, DEFAULT_STATISTICS_WINDOW_DAYS};
