//! Bookkeeping for open connections.
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    fmt,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tracing::trace;

/// Identifies one accepted connection. Ids increase monotonically per registry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(u64);

impl ChannelId {
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel-{}", self.0)
    }
}

/// The set of open connections.
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    next: AtomicU64,
    active: Mutex<BTreeMap<ChannelId, SocketAddr>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection from `remote`. It stays registered until the returned guard
    /// is dropped.
    pub fn register(self: &Arc<Self>, remote: SocketAddr) -> ChannelGuard {
        let id = ChannelId(self.next.fetch_add(1, Ordering::Relaxed));
        self.active.lock().insert(id, remote);
        trace!(channel = %id, remote = %remote, "channel opened");

        ChannelGuard {
            registry: self.clone(),
            id,
        }
    }

    /// Returns the number of open connections.
    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.lock().is_empty()
    }

    /// Returns a snapshot of open connections, oldest first.
    pub fn active(&self) -> Vec<(ChannelId, SocketAddr)> {
        let active = self.active.lock();
        active.iter().map(|(id, addr)| (*id, *addr)).collect()
    }
}

/// Keeps a connection registered while alive.
#[derive(Debug)]
pub struct ChannelGuard {
    registry: Arc<ChannelRegistry>,
    id: ChannelId,
}

impl ChannelGuard {
    #[inline]
    pub fn id(&self) -> ChannelId {
        self.id
    }
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        self.registry.active.lock().remove(&self.id);
        trace!(channel = %self.id, "channel closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_deregister_on_drop() {
        let registry = Arc::new(ChannelRegistry::new());
        let addr: SocketAddr = ([127, 0, 0, 1], 9000).into();

        let a = registry.register(addr);
        let b = registry.register(addr);
        assert!(a.id() < b.id());
        assert_eq!(registry.len(), 2);

        drop(a);
        assert_eq!(registry.active(), vec![(b.id(), addr)]);

        drop(b);
        assert!(registry.is_empty());

        let c = registry.register(addr);
        assert_eq!(c.id().as_u64(), 2);
    }
}
