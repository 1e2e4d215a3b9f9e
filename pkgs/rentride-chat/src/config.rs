use rentride_transport::TransportConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ChatError;

/// When a send reaches the push channel relative to persistence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SendOrdering {
    /// Emit only after the store accepted the message
    #[default]
    PersistenceFirst,
    /// Emit right away, persist afterwards
    TransportFirst,
}

impl FromStr for SendOrdering {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "persistence-first" | "persistence" => Ok(SendOrdering::PersistenceFirst),
            "transport-first" | "transport" => Ok(SendOrdering::TransportFirst),
            other => Err(ChatError::Config(format!("unknown send ordering '{other}'"))),
        }
    }
}

/// Chat session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Base URL of the conversation REST API
    pub api_base_url: String,

    /// WebSocket URL of the push channel
    pub socket_url: String,

    /// Timeout of a single REST call
    pub request_timeout_ms: u64,

    /// Timeout of a single socket connect
    pub connect_timeout_ms: u64,

    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,

    /// Uptime after which a connection refills the reconnect attempts
    pub connection_stable_ms: u64,

    /// Quiet period after the last keystroke before `stop-typing` is sent
    pub typing_debounce_ms: u64,

    /// A peer's typing indicator clears after this long without a stop event
    pub typing_expiry_ms: u64,

    pub send_ordering: SendOrdering,

    /// Id and name of the synthesized support contact
    pub support_contact_id: String,
    pub support_contact_name: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000/api".to_string(),
            socket_url: "ws://localhost:5000/socket".to_string(),
            request_timeout_ms: 10_000,
            connect_timeout_ms: 5_000,
            reconnect_attempts: 5,
            reconnect_delay_ms: 1_000,
            connection_stable_ms: 10_000,
            typing_debounce_ms: 2_000,
            typing_expiry_ms: 5_000,
            send_ordering: SendOrdering::PersistenceFirst,
            support_contact_id: "support".to_string(),
            support_contact_name: "RentRide Support".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatConfigUpdates {
    pub api_base_url: Option<String>,
    pub socket_url: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub connect_timeout_ms: Option<u64>,
    pub reconnect_attempts: Option<u32>,
    pub reconnect_delay_ms: Option<u64>,
    pub connection_stable_ms: Option<u64>,
    pub typing_debounce_ms: Option<u64>,
    pub typing_expiry_ms: Option<u64>,
    pub send_ordering: Option<SendOrdering>,
    pub support_contact_id: Option<String>,
    pub support_contact_name: Option<String>,
}

impl ChatConfig {
    /// Defaults overridden by `RENTRIDE_*` environment variables
    pub fn from_env() -> Result<Self, ChatError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the `RENTRIDE_*` keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ChatError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let updates = ChatConfigUpdates {
            api_base_url: lookup("RENTRIDE_API_URL"),
            socket_url: lookup("RENTRIDE_SOCKET_URL"),
            request_timeout_ms: parse_var(&lookup, "RENTRIDE_REQUEST_TIMEOUT_MS")?,
            connect_timeout_ms: parse_var(&lookup, "RENTRIDE_CONNECT_TIMEOUT_MS")?,
            reconnect_attempts: parse_var(&lookup, "RENTRIDE_RECONNECT_ATTEMPTS")?,
            reconnect_delay_ms: parse_var(&lookup, "RENTRIDE_RECONNECT_DELAY_MS")?,
            connection_stable_ms: parse_var(&lookup, "RENTRIDE_CONNECTION_STABLE_MS")?,
            typing_debounce_ms: parse_var(&lookup, "RENTRIDE_TYPING_DEBOUNCE_MS")?,
            typing_expiry_ms: parse_var(&lookup, "RENTRIDE_TYPING_EXPIRY_MS")?,
            send_ordering: lookup("RENTRIDE_SEND_ORDERING")
                .map(|value| value.parse::<SendOrdering>())
                .transpose()?,
            support_contact_id: lookup("RENTRIDE_SUPPORT_ID"),
            support_contact_name: lookup("RENTRIDE_SUPPORT_NAME"),
        };

        let mut config = Self::default();
        config.apply(updates);
        Ok(config)
    }

    pub fn apply(&mut self, updates: ChatConfigUpdates) {
        if let Some(value) = updates.api_base_url {
            self.api_base_url = value;
        }
        if let Some(value) = updates.socket_url {
            self.socket_url = value;
        }
        if let Some(value) = updates.request_timeout_ms {
            self.request_timeout_ms = value;
        }
        if let Some(value) = updates.connect_timeout_ms {
            self.connect_timeout_ms = value;
        }
        if let Some(value) = updates.reconnect_attempts {
            self.reconnect_attempts = value;
        }
        if let Some(value) = updates.reconnect_delay_ms {
            self.reconnect_delay_ms = value;
        }
        if let Some(value) = updates.connection_stable_ms {
            self.connection_stable_ms = value;
        }
        if let Some(value) = updates.typing_debounce_ms {
            self.typing_debounce_ms = value;
        }
        if let Some(value) = updates.typing_expiry_ms {
            self.typing_expiry_ms = value;
        }
        if let Some(value) = updates.send_ordering {
            self.send_ordering = value;
        }
        if let Some(value) = updates.support_contact_id {
            self.support_contact_id = value;
        }
        if let Some(value) = updates.support_contact_name {
            self.support_contact_name = value;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn typing_debounce(&self) -> Duration {
        Duration::from_millis(self.typing_debounce_ms)
    }

    pub fn typing_expiry(&self) -> Duration {
        Duration::from_millis(self.typing_expiry_ms)
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            reconnect_attempts: self.reconnect_attempts,
            reconnect_delay: Duration::from_millis(self.reconnect_delay_ms),
            stable_after: Duration::from_millis(self.connection_stable_ms),
        }
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, ChatError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|err| ChatError::Config(format!("{key}: {err}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ChatConfig::default();
        assert_eq!(config.typing_debounce(), Duration::from_millis(2000));
        assert_eq!(config.typing_expiry(), Duration::from_millis(5000));
        assert_eq!(config.send_ordering, SendOrdering::PersistenceFirst);

        let transport = config.transport_config();
        assert_eq!(transport.reconnect_attempts, 5);
        assert_eq!(transport.reconnect_delay, Duration::from_secs(1));
        assert_eq!(transport.stable_after, Duration::from_secs(10));
    }

    #[test]
    fn test_lookup_overrides() {
        let config = ChatConfig::from_lookup(lookup_from(&[
            ("RENTRIDE_API_URL", "https://api.rentride.test/api"),
            ("RENTRIDE_RECONNECT_ATTEMPTS", "2"),
            ("RENTRIDE_SEND_ORDERING", "transport-first"),
        ]))
        .unwrap();

        assert_eq!(config.api_base_url, "https://api.rentride.test/api");
        assert_eq!(config.reconnect_attempts, 2);
        assert_eq!(config.send_ordering, SendOrdering::TransportFirst);
        assert_eq!(config.typing_debounce_ms, 2000);
    }

    #[test]
    fn test_lookup_rejects_garbage() {
        let err = ChatConfig::from_lookup(lookup_from(&[("RENTRIDE_TYPING_DEBOUNCE_MS", "soon")]))
            .unwrap_err();
        assert!(matches!(err, ChatError::Config(msg) if msg.contains("RENTRIDE_TYPING_DEBOUNCE_MS")));

        assert!(ChatConfig::from_lookup(lookup_from(&[("RENTRIDE_SEND_ORDERING", "sideways")])).is_err());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ChatConfig =
            serde_json::from_str(r#"{"typing_debounce_ms": 500, "send_ordering": "transport-first"}"#)
                .unwrap();
        assert_eq!(config.typing_debounce_ms, 500);
        assert_eq!(config.send_ordering, SendOrdering::TransportFirst);
        assert_eq!(config.reconnect_attempts, 5);
    }
}
