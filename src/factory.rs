//! Connection factory configuration
//!
//! Mirrors the teacher's builder-pattern configuration style (see
//! [`crate::connection::ConnectionBuilder`]) but for the broader set of
//! client-level options a JMS-style AMQP factory exposes: client id,
//! credentials, destination prefixes, send/ack behavior flags, timeouts,
//! prefetch policy, redelivery policy, and a `remoteURI` whose query string
//! may carry `jms.`-prefixed overrides of any of the above.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AmqpError, AmqpResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefetchPolicyConfig {
    pub queue_prefetch: u32,
    pub topic_prefetch: u32,
    pub durable_topic_prefetch: u32,
    pub queue_browser_prefetch: u32,
}

impl Default for PrefetchPolicyConfig {
    fn default() -> Self {
        PrefetchPolicyConfig {
            queue_prefetch: 1000,
            topic_prefetch: 1000,
            durable_topic_prefetch: 1000,
            queue_browser_prefetch: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedeliveryPolicyConfig {
    pub max_redeliveries: u32,
}

impl Default for RedeliveryPolicyConfig {
    fn default() -> Self {
        RedeliveryPolicyConfig { max_redeliveries: 5 }
    }
}

/// All recognized connection-factory options, per §6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionFactoryConfig {
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
    pub queue_prefix: String,
    pub force_sync_send: bool,
    pub force_async_send: bool,
    pub local_message_priority: bool,
    pub force_async_acks: bool,
    pub connect_timeout_ms: u64,
    pub close_timeout_ms: u64,
    pub prefetch_policy: PrefetchPolicyConfig,
    pub redelivery_policy: RedeliveryPolicyConfig,
    /// The remote URI with any `jms.`-prefixed query parameters filtered
    /// out, once they've been applied to the rest of this config.
    pub remote_uri: String,
}

impl Default for ConnectionFactoryConfig {
    fn default() -> Self {
        ConnectionFactoryConfig {
            client_id: None,
            username: None,
            password: None,
            topic_prefix: "topic://".to_string(),
            queue_prefix: "queue://".to_string(),
            force_sync_send: false,
            force_async_send: false,
            local_message_priority: false,
            force_async_acks: false,
            connect_timeout_ms: 15_000,
            close_timeout_ms: 15_000,
            prefetch_policy: PrefetchPolicyConfig::default(),
            redelivery_policy: RedeliveryPolicyConfig::default(),
            remote_uri: String::new(),
        }
    }
}

/// Builds and holds a [`ConnectionFactoryConfig`], parsing `jms.`-prefixed
/// query parameters out of a `remoteURI` and applying `set_properties`
/// overrides in the order they arrive — the same precedence order as
/// scenario 6: URI-embedded options first, then any later explicit setter
/// calls win.
#[derive(Debug, Clone)]
pub struct ConnectionFactory {
    config: ConnectionFactoryConfig,
}

impl ConnectionFactory {
    /// Parse `remote_uri`, applying any `jms.`-prefixed query parameters to
    /// the returned factory's configuration and stripping them from the
    /// stored `remote_uri`. An unrecognized `jms.`-prefixed key is a fatal
    /// configuration error.
    pub fn new(remote_uri: impl AsRef<str>) -> AmqpResult<Self> {
        let remote_uri = remote_uri.as_ref();
        let url = Url::parse(remote_uri)
            .map_err(|e| AmqpError::configuration(format!("malformed remoteURI '{}': {}", remote_uri, e)))?;

        let mut config = ConnectionFactoryConfig::default();
        for (key, value) in url.query_pairs() {
            if let Some(option) = key.strip_prefix("jms.") {
                apply_known_option(&mut config, option, &value)?;
            }
        }

        let mut filtered = url.clone();
        filtered.set_query(None);
        config.remote_uri = filtered.to_string().trim_end_matches('/').to_string();

        Ok(ConnectionFactory { config })
    }

    /// Apply a batch of properties by name (the non-URI equivalent of the
    /// `jms.`-prefixed query options, using the same bare option names).
    /// Keys this factory doesn't recognize are not an error — they're
    /// returned to the caller as "unused".
    pub fn set_properties(&mut self, properties: BTreeMap<String, String>) -> AmqpResult<BTreeMap<String, String>> {
        let mut unused = BTreeMap::new();
        for (key, value) in properties {
            if !try_apply_known_option(&mut self.config, &key, &value) {
                unused.insert(key, value);
            }
        }
        Ok(unused)
    }

    pub fn config(&self) -> &ConnectionFactoryConfig {
        &self.config
    }

    pub fn client_id(&self) -> Option<&str> {
        self.config.client_id.as_deref()
    }

    pub fn queue_prefix(&self) -> &str {
        &self.config.queue_prefix
    }

    pub fn topic_prefix(&self) -> &str {
        &self.config.topic_prefix
    }

    pub fn remote_uri(&self) -> &str {
        &self.config.remote_uri
    }

    /// Serialize the configuration. Two factories with identical
    /// configuration serialize to byte-identical output since every field
    /// is a plain scalar/struct (no hash-map ordering to worry about).
    pub fn to_bytes(&self) -> AmqpResult<Vec<u8>> {
        serde_json::to_vec(&self.config).map_err(AmqpError::from)
    }

    pub fn from_bytes(bytes: &[u8]) -> AmqpResult<Self> {
        let config: ConnectionFactoryConfig = serde_json::from_slice(bytes).map_err(AmqpError::from)?;
        Ok(ConnectionFactory { config })
    }
}

fn apply_known_option(config: &mut ConnectionFactoryConfig, option: &str, value: &str) -> AmqpResult<()> {
    if try_apply_known_option(config, option, value) {
        Ok(())
    } else {
        Err(AmqpError::configuration(format!("unrecognized option 'jms.{}'", option)))
    }
}

/// Returns `true` if `option` was recognized and applied.
fn try_apply_known_option(config: &mut ConnectionFactoryConfig, option: &str, value: &str) -> bool {
    match option {
        "clientID" => config.client_id = Some(value.to_string()),
        "username" => config.username = Some(value.to_string()),
        "password" => config.password = Some(value.to_string()),
        "topicPrefix" => config.topic_prefix = value.to_string(),
        "queuePrefix" => config.queue_prefix = value.to_string(),
        "forceSyncSend" => config.force_sync_send = parse_bool(value),
        "forceAsyncSend" => config.force_async_send = parse_bool(value),
        "localMessagePriority" => config.local_message_priority = parse_bool(value),
        "forceAsyncAcks" => config.force_async_acks = parse_bool(value),
        "connectTimeout" => config.connect_timeout_ms = parse_u64(value),
        "closeTimeout" => config.close_timeout_ms = parse_u64(value),
        "prefetchPolicy.queuePrefetch" => config.prefetch_policy.queue_prefetch = parse_u32(value),
        "prefetchPolicy.topicPrefetch" => config.prefetch_policy.topic_prefetch = parse_u32(value),
        "prefetchPolicy.durableTopicPrefetch" => config.prefetch_policy.durable_topic_prefetch = parse_u32(value),
        "prefetchPolicy.queueBrowserPrefetch" => config.prefetch_policy.queue_browser_prefetch = parse_u32(value),
        "redeliveryPolicy.maxRedeliveries" => config.redelivery_policy.max_redeliveries = parse_u32(value),
        _ => return false,
    }
    true
}

fn parse_bool(value: &str) -> bool {
    value.eq_ignore_ascii_case("true") || value == "1"
}

fn parse_u64(value: &str) -> u64 {
    value.parse().unwrap_or_default()
}

fn parse_u32(value: &str) -> u32 {
    value.parse().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_precedence_scenario() {
        let mut factory = ConnectionFactory::new("amqp://host:1234?jms.clientID=C1").unwrap();
        let unused = factory
            .set_properties(BTreeMap::from([("queuePrefix".to_string(), "q:".to_string())]))
            .unwrap();

        assert_eq!(factory.client_id(), Some("C1"));
        assert_eq!(factory.queue_prefix(), "q:");
        assert_eq!(factory.remote_uri(), "amqp://host:1234");
        assert!(unused.is_empty());
    }

    #[test]
    fn unknown_non_prefixed_property_is_returned_as_unused() {
        let mut factory = ConnectionFactory::new("amqp://host:1234").unwrap();
        let unused = factory
            .set_properties(BTreeMap::from([("mysteryOption".to_string(), "x".to_string())]))
            .unwrap();
        assert_eq!(unused.get("mysteryOption"), Some(&"x".to_string()));
    }

    #[test]
    fn unrecognized_jms_prefixed_query_option_is_fatal() {
        let result = ConnectionFactory::new("amqp://host:1234?jms.bogusOption=1");
        assert!(result.is_err());
    }

    #[test]
    fn serialization_round_trips_and_is_byte_identical() {
        let factory_a = ConnectionFactory::new("amqp://host:1234?jms.clientID=C1").unwrap();
        let factory_b = ConnectionFactory::new("amqp://host:1234?jms.clientID=C1").unwrap();

        let bytes_a = factory_a.to_bytes().unwrap();
        let bytes_b = factory_b.to_bytes().unwrap();
        assert_eq!(bytes_a, bytes_b);

        let restored = ConnectionFactory::from_bytes(&bytes_a).unwrap();
        assert_eq!(restored.config(), factory_a.config());
    }
}
