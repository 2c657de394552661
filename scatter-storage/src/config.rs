//! Configuration types for storage selection and the per-backend sections.
//!
//! These structs mirror the storage half of the broker's JSON configuration
//! file. They live in this crate so backend crates can consume them without
//! depending on the broker itself.

use std::fmt;
use std::time::Duration as StdDuration;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Duration with a lenient JSON codec.
///
/// Deserializes from either an integer nanosecond count or a human-readable
/// string such as `"200ms"` or `"30s"`; always serializes to the string
/// form. Round-trip stable: formatting a parsed value yields a string that
/// parses back to the same duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(pub StdDuration);

impl Duration {
    /// Duration of zero, the "unset" value for optional timeouts.
    pub const ZERO: Self = Self(StdDuration::ZERO);

    /// Returns the wrapped std duration.
    pub fn as_std(self) -> StdDuration {
        self.0
    }

    /// True when the duration is zero.
    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }
}

impl From<StdDuration> for Duration {
    fn from(d: StdDuration) -> Self {
        Self(d)
    }
}

impl From<Duration> for StdDuration {
    fn from(d: Duration) -> Self {
        d.0
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", humantime::format_duration(self.0))
    }
}

impl Serialize for Duration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(self.0).to_string())
    }
}

struct DurationVisitor;

impl Visitor<'_> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a nanosecond count or a duration string like \"30s\"")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Duration(StdDuration::from_nanos(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u64::try_from(v)
            .map(|n| Duration(StdDuration::from_nanos(n)))
            .map_err(|_| E::custom("negative duration"))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        if !v.is_finite() || v < 0.0 {
            return Err(E::custom("invalid duration"));
        }
        Ok(Duration(StdDuration::from_nanos(v as u64)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        humantime::parse_duration(v).map(Duration).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(DurationVisitor)
    }
}

/// Storage selection plus the per-backend sections, exactly as they appear
/// in the broker configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend tag: `""`, `"discard"`, `"redis"`, `"memcache"`,
    /// `"binmemcache"` or `"gocache"`.
    #[serde(default)]
    pub store_type: String,

    /// Redis backend settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisConfig>,

    /// Text-protocol memcache settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memcache: Option<MemcacheConfig>,

    /// Binary-protocol memcache settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binmemcache: Option<BinMemcacheConfig>,

    /// In-process cache settings.
    ///
    /// The section keeps its legacy `gocache` name so existing config files
    /// stay valid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gocache: Option<GoCacheConfig>,
}

/// Settings for the Redis hash backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisConfig {
    /// Server address, `host:port`.
    pub addr: String,

    /// Optional password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Database number.
    #[serde(default)]
    pub dbnum: i64,

    /// TTL applied to the request record and all its endpoint entries.
    pub expire_in: Duration,

    /// Accepted for config compatibility; the multiplexed connection
    /// manager does not pool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_size: Option<u32>,
}

/// Settings for the text-protocol memcache backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemcacheConfig {
    /// Server addresses, `host:port`.
    pub addrs: Vec<String>,

    /// Per-item TTL; must be at least one second.
    pub expire_in: Duration,

    /// Idle connections kept per server.
    #[serde(default)]
    pub max_idle_conns: u32,
}

/// Settings for the binary-protocol memcache backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BinMemcacheConfig {
    /// Server addresses, `host:port`.
    pub addrs: Vec<String>,

    /// Per-item TTL.
    pub expire_in: Duration,

    /// Connections opened per node.
    #[serde(default)]
    pub conns_per_node: u32,
}

/// Settings for the in-process cache backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GoCacheConfig {
    /// Per-item TTL.
    pub expire_in: Duration,
}
