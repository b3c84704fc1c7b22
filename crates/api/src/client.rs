// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Habridge Contributors

// Home Assistant REST API client.
//
// Thin blocking wrapper over /api/: bearer-token auth, JSON in and out.
// Credentials resolve from explicit arguments first, then the config file
// (URL), then the secrets file (token).

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde_json::{Map, Value};
use tracing::{debug, error, info};

use habridge_common::{Config, Error, Result, SecretString, SecretsFile};

use crate::entity::{self, EntityState};
use crate::history::{HistoryQuery, DEFAULT_STATISTICS_WINDOW_DAYS};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for one Home Assistant instance.
#[derive(Debug)]
pub struct HassClient {
    base_url: String,
    http: Client,
}

impl HassClient {
    /// Build a client from an explicit URL and token.
    ///
    /// The URL is normalized by stripping a trailing slash; the token goes
    /// into a fixed Authorization header for every request.
    pub fn new(url: impl Into<String>, token: &str) -> Result<Self> {
        let mut base_url = url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| Error::Misconfigured("API token contains invalid characters".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { base_url, http })
    }

    /// Build a client for a named server (default server when `None`),
    /// resolving the URL from the config and the token from the secrets.
    pub fn from_settings(
        config: &Config,
        secrets: &SecretsFile,
        server: Option<&str>,
    ) -> Result<Self> {
        Self::with_overrides(config, secrets, server, None, None)
    }

    /// Like `from_settings`, but explicit `url`/`token` arguments win over
    /// the resolved values. Settings files are only consulted for the
    /// pieces not supplied.
    pub fn with_overrides(
        config: &Config,
        secrets: &SecretsFile,
        server: Option<&str>,
        url: Option<&str>,
        token: Option<&str>,
    ) -> Result<Self> {
        match (url, token) {
            (Some(url), Some(token)) => Self::new(url, token),
            (url, token) => {
                let creds = secrets.credentials(config, server)?;
                let url = url.map(str::to_string).unwrap_or(creds.url);
                let token = token
                    .map(SecretString::new)
                    .unwrap_or(creds.token);
                Self::new(url, token.expose())
            }
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Perform one API call. Non-2xx responses become `Error::Http` with
    /// the status and body attached; an empty 2xx body yields `None`.
    pub fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Option<Value>> {
        let url = format!("{}/api/{}", self.base_url, path);
        debug!(%method, %url, "home assistant request");

        let mut request = self.http.request(method, &url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send()?;
        let status = response.status();
        let text = response.text()?;

        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body: text,
            });
        }
        if text.is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }

    fn get(&self, path: &str) -> Result<Option<Value>> {
        self.request(Method::GET, path, &[], None)
    }

    /// Instance configuration from `/api/config`.
    pub fn get_config(&self) -> Result<Value> {
        Ok(self.get("config")?.unwrap_or(Value::Null))
    }

    /// Fetch `/api/config` as a connectivity check, logging the outcome.
    /// Failures are logged and then propagated.
    pub fn test_connection(&self) -> Result<Value> {
        match self.get_config() {
            Ok(config) => {
                info!(
                    location = config
                        .get("location_name")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or("unknown"),
                    version = config.get("version").and_then(serde_json::Value::as_str).unwrap_or("unknown"),
                    "connected to Home Assistant"
                );
                Ok(config)
            }
            Err(err) => {
                error!(%err, url = %self.base_url, "Home Assistant connection failed");
                Err(err)
            }
        }
    }

    /// All entity states.
    pub fn get_states(&self) -> Result<Vec<EntityState>> {
        match self.get("states")? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    /// State of a single entity.
    pub fn get_state(&self, entity_id: &str) -> Result<EntityState> {
        let value = self.get(&format!("states/{entity_id}"))?.ok_or_else(|| {
            Error::NotFound(format!("no state returned for entity '{entity_id}'"))
        })?;
        Ok(serde_json::from_value(value)?)
    }

    /// All registered services.
    pub fn get_services(&self) -> Result<Value> {
        Ok(self.get("services")?.unwrap_or(Value::Null))
    }

    /// State history. `start` defaults to 24 hours before the call; each
    /// inner vector holds the state changes of one entity.
    pub fn get_history(
        &self,
        entity_id: Option<&str>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        minimal_response: bool,
    ) -> Result<Vec<Vec<Value>>> {
        let query = HistoryQuery::new(start)
            .entity_id(entity_id)
            .end(end)
            .minimal_response(minimal_response);
        match self.request(Method::GET, &query.path(), &query.params(), None)? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    /// Best-effort statistics lookup.
    ///
    /// The real statistics facility is only reachable over the WebSocket
    /// API, so this degrades to a history query with a comma-joined entity
    /// filter. Results are plain state changes; statistic aggregation
    /// fields (mean/min/max/sum) are never present. `period` is accepted
    /// for signature compatibility and ignored by the fallback.
    pub fn get_statistics(
        &self,
        entity_ids: &[&str],
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        _period: &str,
    ) -> Result<Vec<Vec<Value>>> {
        let start = start.unwrap_or_else(|| {
            Utc::now() - chrono::Duration::days(DEFAULT_STATISTICS_WINDOW_DAYS)
        });
        self.get_history(Some(&entity_ids.join(",")), Some(start), end, true)
    }

    /// All entities whose id belongs to `domain` (e.g. "light", "sensor").
    pub fn get_entities_by_domain(&self, domain: &str) -> Result<Vec<EntityState>> {
        Ok(entity::entities_in_domain(self.get_states()?, domain))
    }

    /// All energy-related entities (id or friendly name contains one of
    /// the energy keywords).
    pub fn get_energy_entities(&self) -> Result<Vec<EntityState>> {
        Ok(entity::energy_entities(self.get_states()?))
    }

    /// Call a service, e.g. `light.turn_on` on `light.kitchen`.
    /// `data` is merged with the target entity id into the request body.
    pub fn call_service(
        &self,
        domain: &str,
        service: &str,
        entity_id: Option<&str>,
        data: Map<String, Value>,
    ) -> Result<()> {
        let mut body = data;
        if let Some(entity_id) = entity_id {
            body.insert("entity_id".to_string(), Value::String(entity_id.to_string()));
        }
        self.request(
            Method::POST,
            &format!("services/{domain}/{service}"),
            &[],
            Some(&Value::Object(body)),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slashes_are_stripped() {
        let client = HassClient::new("http://hass.local:8123/", "token").unwrap();
        assert_eq!(client.base_url(), "http://hass.local:8123");

        let client = HassClient::new("http://hass.local:8123", "token").unwrap();
        assert_eq!(client.base_url(), "http://hass.local:8123");
    }

    #[test]
    fn token_with_control_characters_is_rejected() {
        let err = HassClient::new("http://hass.local:8123", "bad\ntoken").unwrap_err();
        assert!(matches!(err, Error::Misconfigured(_)));
    }

    #[test]
    fn resolves_url_and_token_from_settings() {
        let config: Config = serde_yaml::from_str(
            "default_server: home\nservers:\n  home: { host: hass.local }\n",
        )
        .unwrap();
        let secrets: SecretsFile =
            serde_yaml::from_str("servers:\n  home: { token: abc123 }\n").unwrap();

        let client = HassClient::from_settings(&config, &secrets, None).unwrap();
        assert_eq!(client.base_url(), "http://hass.local:8123");
    }

    #[test]
    fn explicit_url_wins_over_settings() {
        let config: Config = serde_yaml::from_str(
            "default_server: home\nservers:\n  home: { host: hass.local }\n",
        )
        .unwrap();
        let secrets: SecretsFile =
            serde_yaml::from_str("servers:\n  home: { token: abc123 }\n").unwrap();

        let client = HassClient::with_overrides(
            &config,
            &secrets,
            None,
            Some("http://override:9999/"),
            None,
        )
        .unwrap();
        assert_eq!(client.base_url(), "http://override:9999");
    }

    #[test]
    fn explicit_url_and_token_skip_settings_lookup() {
        // Empty settings would fail resolution; explicit args must not
        // consult them at all.
        let config = Config::default();
        let secrets = SecretsFile::default();
        let client = HassClient::with_overrides(
            &config,
            &secrets,
            None,
            Some("http://explicit:8123"),
            Some("tok"),
        )
        .unwrap();
        assert_eq!(client.base_url(), "http://explicit:8123");
    }
}
