//! Self-expiring liveness markers in a key-value store.
//!
//! Each record sets `hostname:pid:cgroup` with an empty value and a TTL a
//! little longer than the poll interval. A key that is not refreshed by the
//! next cycle expires on its own; nothing is ever deleted explicitly.

use dashmap::DashMap;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::{SetupError, SinkError};
use crate::process::ProcessRecord;
use crate::sink::Sink;

pub const DEFAULT_TTL_MARGIN: Duration = Duration::from_secs(5);
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// Key-value backend that supports per-key expiration.
pub trait ExpiringStore: Send {
    fn set_with_ttl(&mut self, key: &str, value: &str, ttl: Duration) -> Result<(), SinkError>;

    fn close(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Builds the liveness key for a record.
pub fn liveness_key(hostname: &str, record: &ProcessRecord) -> String {
    format!("{}:{}:{}", hostname, record.pid, record.cgroup)
}

/// TTL for liveness keys: one poll interval plus a fixed margin.
pub fn liveness_ttl(poll_interval: Duration, margin: Duration) -> Duration {
    poll_interval + margin
}

/// Redis TTLs are whole seconds; round up and never go below one.
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

// -----------------------------------------------------------------------------
// Redis
// -----------------------------------------------------------------------------

pub struct RedisStore {
    conn: Option<redis::Connection>,
}

impl RedisStore {
    /// Builds connection settings from `host:port`, an optional password and
    /// a database index. The password is passed through verbatim, so it may
    /// contain URL-reserved characters.
    pub fn connection_info(
        addr: &str,
        password: Option<&str>,
        db: i64,
    ) -> Result<ConnectionInfo, SetupError> {
        let (host, port) = split_host_port(addr)?;
        Ok(ConnectionInfo {
            addr: ConnectionAddr::Tcp(host, port),
            redis: RedisConnectionInfo {
                db,
                password: password.filter(|p| !p.is_empty()).map(str::to_string),
                ..Default::default()
            },
        })
    }

    pub fn connect(info: ConnectionInfo) -> Result<Self, SetupError> {
        let client = redis::Client::open(info).map_err(SetupError::Store)?;
        let conn = client.get_connection().map_err(SetupError::Store)?;
        Ok(Self { conn: Some(conn) })
    }
}

/// Splits `host:port`, `[v6]:port` or a bare host (default port).
fn split_host_port(addr: &str) -> Result<(String, u16), SetupError> {
    let invalid = || SetupError::Config(format!("invalid Redis address '{}'", addr));

    let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
        match tail {
            "" => (host, None),
            t => (host, Some(t.strip_prefix(':').ok_or_else(invalid)?)),
        }
    } else {
        match addr.rsplit_once(':') {
            Some((_, _)) if addr.matches(':').count() > 1 => (addr, None),
            Some((host, port)) => (host, Some(port)),
            None => (addr, None),
        }
    };

    if host.is_empty() {
        return Err(invalid());
    }
    let port = match port {
        Some(p) => p.parse::<u16>().map_err(|_| invalid())?,
        None => DEFAULT_REDIS_PORT,
    };
    Ok((host.to_string(), port))
}

impl ExpiringStore for RedisStore {
    fn set_with_ttl(&mut self, key: &str, value: &str, ttl: Duration) -> Result<(), SinkError> {
        let conn = self.conn.as_mut().ok_or(SinkError::Closed)?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_seconds(ttl))
            .query::<()>(conn)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if self.conn.take().is_some() {
            debug!("Redis connection released");
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// In-process store
// -----------------------------------------------------------------------------

/// In-process expiring store. Clones share the same entries, so a handle
/// kept outside the sink observes what the sink writes.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, (String, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the key was set and has not yet expired.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        let (value, expires_at) = entry.value();
        if *expires_at > Instant::now() {
            Some(value.clone())
        } else {
            None
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.value().1 > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops expired entries and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, (_, expires_at)| {
            let live = *expires_at > now;
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }
}

impl ExpiringStore for MemoryStore {
    /// Expired entries are purged on every write, so the map stays bounded
    /// by the keys written within one TTL.
    fn set_with_ttl(&mut self, key: &str, value: &str, ttl: Duration) -> Result<(), SinkError> {
        self.purge_expired();
        self.entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// Sink
// -----------------------------------------------------------------------------

/// Liveness sink over any [`ExpiringStore`].
pub struct KeyValueLivenessSink<S: ExpiringStore> {
    store: S,
    ttl: Duration,
    closed: bool,
}

impl<S: ExpiringStore> KeyValueLivenessSink<S> {
    pub fn new(store: S, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            closed: false,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl<S: ExpiringStore> Sink for KeyValueLivenessSink<S> {
    fn write(&mut self, hostname: &str, record: &ProcessRecord) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        self.store
            .set_with_ttl(&liveness_key(hostname, record), "", self.ttl)
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.store.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::SequenceId;

    #[test]
    fn test_liveness_key_format() {
        let r = ProcessRecord::new(SequenceId(1), 4242, "/system.slice/nginx.service".into());
        assert_eq!(
            liveness_key("web-1", &r),
            "web-1:4242:/system.slice/nginx.service"
        );
    }

    #[test]
    fn test_liveness_ttl_adds_margin() {
        assert_eq!(
            liveness_ttl(Duration::from_secs(60), DEFAULT_TTL_MARGIN),
            Duration::from_secs(65)
        );
    }

    #[test]
    fn test_ttl_seconds_rounds_up() {
        assert_eq!(ttl_seconds(Duration::from_secs(65)), 65);
        assert_eq!(ttl_seconds(Duration::from_millis(65_001)), 66);
        assert_eq!(ttl_seconds(Duration::from_millis(10)), 1);
        assert_eq!(ttl_seconds(Duration::ZERO), 1);
    }

    #[test]
    fn test_redis_connection_info() {
        let info = RedisStore::connection_info("localhost:6379", None, 0).unwrap();
        assert_eq!(info.addr, ConnectionAddr::Tcp("localhost".into(), 6379));
        assert_eq!(info.redis.db, 0);
        assert_eq!(info.redis.password, None);

        let info = RedisStore::connection_info("localhost:6379", Some(""), 2).unwrap();
        assert_eq!(info.redis.password, None);
        assert_eq!(info.redis.db, 2);
    }

    #[test]
    fn test_redis_password_with_reserved_characters() {
        let info = RedisStore::connection_info("10.0.0.5:6380", Some("p@ss/w#rd:x"), 1).unwrap();
        assert_eq!(info.addr, ConnectionAddr::Tcp("10.0.0.5".into(), 6380));
        assert_eq!(info.redis.password.as_deref(), Some("p@ss/w#rd:x"));
        assert_eq!(info.redis.db, 1);
    }

    #[test]
    fn test_redis_address_forms() {
        assert_eq!(
            split_host_port("cache").unwrap(),
            ("cache".to_string(), DEFAULT_REDIS_PORT)
        );
        assert_eq!(split_host_port("[::1]:6390").unwrap(), ("::1".to_string(), 6390));
        assert_eq!(split_host_port("[::1]").unwrap(), ("::1".to_string(), DEFAULT_REDIS_PORT));
        assert!(split_host_port("cache:notaport").is_err());
        assert!(split_host_port(":6379").is_err());
        assert!(split_host_port("[::1]6379").is_err());
    }

    #[test]
    fn test_memory_store_purge() {
        let mut store = MemoryStore::new();
        store.set_with_ttl("kept", "", Duration::from_secs(60)).unwrap();
        store
            .entries
            .insert("gone".to_string(), (String::new(), Instant::now()));
        assert_eq!(store.purge_expired(), 1);
        assert!(store.contains("kept"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_memory_store_writes_drop_expired_entries() {
        let mut store = MemoryStore::new();
        store.set_with_ttl("old:1", "", Duration::ZERO).unwrap();
        store.set_with_ttl("old:2", "", Duration::ZERO).unwrap();
        store.set_with_ttl("new", "", Duration::from_secs(60)).unwrap();
        assert_eq!(store.entries.len(), 1);
        assert!(store.contains("new"));
    }

    #[test]
    fn test_purge_counts_with_concurrent_writer() {
        let store = MemoryStore::new();
        let mut writer = store.clone();
        let handle = std::thread::spawn(move || {
            for i in 0..500 {
                writer
                    .set_with_ttl(&format!("k{}", i), "", Duration::from_secs(60))
                    .unwrap();
            }
        });
        for _ in 0..50 {
            assert_eq!(store.purge_expired(), 0);
        }
        handle.join().unwrap();
        assert_eq!(store.len(), 500);
    }

    #[test]
    fn test_closed_sink_rejects_writes() {
        let mut sink = KeyValueLivenessSink::new(MemoryStore::new(), Duration::from_secs(5));
        sink.close().unwrap();
        sink.close().unwrap();
        let r = ProcessRecord::new(SequenceId(1), 1, "/".into());
        assert!(matches!(sink.write("h", &r), Err(SinkError::Closed)));
    }
}
