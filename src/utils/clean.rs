use tokio::time::{self, Duration};
use tracing::debug;

use crate::{cache::RoomCache, protocol::RoomId, registry::RoomRegistry};

const MIN_PERIOD: Duration = Duration::from_millis(100);

/// Background reclamation: expired fast-tier entries, then rooms that have
/// been empty past the grace period.
pub async fn task(registry: RoomRegistry, cache: RoomCache, every: Duration, grace: Duration) {
    let mut tick = time::interval(every.max(MIN_PERIOD));
    loop {
        tick.tick().await;
        sweep_once(&registry, &cache, grace).await;
    }
}

pub async fn sweep_once(registry: &RoomRegistry, cache: &RoomCache, grace: Duration) -> (usize, Vec<RoomId>) {
    let expired = cache.sweep().await;
    let reaped = registry.reap_empty(grace).await;
    for room in &reaped {
        cache.evict_room(room).await;
    }
    if expired > 0 || !reaped.is_empty() {
        debug!(expired, rooms = reaped.len(), "sweep");
    }
    (expired, reaped)
}
