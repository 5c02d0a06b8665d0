//! Hostname resolution with TTL caching and single-flight deduplication.
//!
//! Probes resolve the same few hostnames over and over; caching keeps the
//! DNS load flat and, more importantly, pins a whole evaluation run to one
//! consistent address per host. Concurrent lookups for the same name are
//! deduplicated: one caller performs the query while the rest await the
//! shared outcome.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Default time-to-live for cached resolutions, 5 minutes
pub const DEFAULT_DNS_TTL: Duration = Duration::from_secs(300);

/// Hit/miss counters exposed for the final report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// The actual name lookup, kept behind a trait so that tests can substitute
/// a deterministic resolver.
#[async_trait]
pub trait Lookup: Send + Sync {
    /// Resolve a hostname to one address, or `None` if it does not resolve
    async fn lookup(&self, host: &str) -> Option<IpAddr>;
}

/// System resolver via `tokio::net::lookup_host`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLookup;

#[async_trait]
impl Lookup for SystemLookup {
    async fn lookup(&self, host: &str) -> Option<IpAddr> {
        match tokio::net::lookup_host((host, 0)).await {
            Ok(mut addrs) => addrs.next().map(|addr| addr.ip()),
            Err(e) => {
                log::debug!("lookup for {host} failed: {e}");
                None
            }
        }
    }
}

#[derive(Debug, Clone)]
struct ResolutionEntry {
    addr: IpAddr,
    expires_at: Instant,
}

enum Slot {
    Ready(ResolutionEntry),
    Pending(broadcast::Sender<Option<IpAddr>>),
}

/// Thread-safe hostname cache with TTL expiry and single-flight lookups.
///
/// Entries are owned exclusively by the cache and are never handed out past
/// their expiry. Failed lookups are returned but not cached.
pub struct ResolutionCache {
    ttl: Duration,
    slots: Mutex<HashMap<String, Slot>>,
    lookup: Arc<dyn Lookup>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for ResolutionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionCache")
            .field("ttl", &self.ttl)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// What a caller has to do after consulting the slot table
enum Claim {
    Hit(IpAddr),
    Join(broadcast::Receiver<Option<IpAddr>>),
    Lead(broadcast::Sender<Option<IpAddr>>),
}

impl ResolutionCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self::with_lookup(ttl, Arc::new(SystemLookup))
    }

    /// Create a cache backed by a custom [`Lookup`] implementation
    #[must_use]
    pub fn with_lookup(ttl: Duration, lookup: Arc<dyn Lookup>) -> Self {
        Self {
            ttl,
            slots: Mutex::new(HashMap::new()),
            lookup,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Resolve `host`, consulting the cache first.
    ///
    /// On a hit with an unexpired entry the cached address is returned. On a
    /// miss exactly one caller performs the lookup; concurrent callers for
    /// the same host await the same outcome. Failures are not cached.
    pub async fn resolve(&self, host: &str) -> Option<IpAddr> {
        let claim = self.claim(host);
        match claim {
            Claim::Hit(addr) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(addr)
            }
            Claim::Join(mut rx) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                rx.recv().await.ok().flatten()
            }
            Claim::Lead(tx) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                let guard = FlightGuard {
                    cache: self,
                    host,
                    tx,
                    done: false,
                };
                let resolved = self.lookup.lookup(host).await;
                guard.finish(resolved);
                resolved
            }
        }
    }

    /// Snapshot of the hit/miss counters
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn claim(&self, host: &str) -> Claim {
        let mut slots = self.slots.lock().expect("resolver lock poisoned");
        match slots.get(host) {
            Some(Slot::Ready(entry)) if entry.expires_at > Instant::now() => {
                Claim::Hit(entry.addr)
            }
            Some(Slot::Pending(tx)) => Claim::Join(tx.subscribe()),
            _ => {
                let (tx, _) = broadcast::channel(1);
                slots.insert(host.to_string(), Slot::Pending(tx.clone()));
                Claim::Lead(tx)
            }
        }
    }

    fn settle(&self, host: &str, resolved: Option<IpAddr>) {
        let mut slots = self.slots.lock().expect("resolver lock poisoned");
        match resolved {
            Some(addr) => {
                slots.insert(
                    host.to_string(),
                    Slot::Ready(ResolutionEntry {
                        addr,
                        expires_at: Instant::now() + self.ttl,
                    }),
                );
            }
            None => {
                slots.remove(host);
            }
        }
    }
}

impl Default for ResolutionCache {
    fn default() -> Self {
        Self::new(DEFAULT_DNS_TTL)
    }
}

/// Keeps the pending slot from wedging joiners if the leading lookup future
/// is dropped mid-flight (fail-fast evaluation drops probe futures). On a
/// normal finish the slot is settled with the outcome; on drop it is removed
/// and joiners observe a failed resolution.
struct FlightGuard<'a> {
    cache: &'a ResolutionCache,
    host: &'a str,
    tx: broadcast::Sender<Option<IpAddr>>,
    done: bool,
}

impl FlightGuard<'_> {
    fn finish(mut self, resolved: Option<IpAddr>) {
        self.cache.settle(self.host, resolved);
        let _ = self.tx.send(resolved);
        self.done = true;
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.cache.settle(self.host, None);
            let _ = self.tx.send(None);
        }
    }
}
