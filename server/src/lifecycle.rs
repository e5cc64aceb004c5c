//! Idle-timeout eviction for games and lobbies
//!
//! Every game and lobby gets its own watcher task. The watcher only holds a weak
//! handle to its entity, so it never keeps a deleted entity alive:
//! - it stops as soon as the entity is dropped or replaced under its key
//! - on expiry it compare-and-deletes the entity, leaving a newer entity with the
//!   same key untouched
//! - whoever deletes the entity first cancels the watcher through its slot

use crate::registry::Registry;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};

/// An entity that can be evicted after sitting idle.
pub trait Expirable: Send + Sync + 'static {
    /// Time of the last accepted mutation.
    fn last_update(&self) -> Instant;

    fn watcher(&self) -> &WatcherSlot;

    fn is_expired(&self, timeout: Duration) -> bool {
        self.last_update().elapsed() > timeout
    }
}

/// Holds the abort handle of an entity's watcher task.
#[derive(Debug, Default)]
pub struct WatcherSlot(Mutex<Option<AbortHandle>>);

impl WatcherSlot {
    fn set(&self, handle: AbortHandle) {
        if let Some(previous) = self.0.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Stops the watcher, if one is running. Safe to call repeatedly.
    pub fn cancel(&self) {
        if let Some(handle) = self.0.lock().take() {
            handle.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.0.lock().as_ref().is_some_and(|handle| !handle.is_finished())
    }
}

/// Timing of a watcher.
#[derive(Debug, Clone, Copy)]
pub struct WatchPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

/// Spawns the idle watcher for `entity`, stored in `registry` under `key`.
///
/// `on_evict` runs once, after the entity has been removed by this watcher.
pub fn watch<K, V, F>(
    registry: Arc<Registry<K, V>>,
    key: K,
    entity: &Arc<V>,
    policy: WatchPolicy,
    on_evict: F,
) where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: Expirable,
    F: FnOnce(Arc<V>) + Send + 'static,
{
    let Ok(runtime) = Handle::try_current() else {
        warn!("No runtime to watch {} {}; it will not expire", registry.kind(), key);
        return;
    };
    let weak: Weak<V> = Arc::downgrade(entity);

    let handle = runtime.spawn(async move {
        let mut ticker = interval(policy.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(entity) = weak.upgrade() else {
                debug!("{} {} dropped, watcher exiting", registry.kind(), key);
                break;
            };
            match registry.get(&key) {
                Some(current) if Arc::ptr_eq(&current, &entity) => {}
                _ => {
                    debug!("{} {} no longer registered, watcher exiting", registry.kind(), key);
                    break;
                }
            }

            if entity.is_expired(policy.timeout) {
                if registry.remove_if_same(&key, &entity) {
                    info!(
                        "Evicted {} {} after {}s without updates",
                        registry.kind(),
                        key,
                        policy.timeout.as_secs()
                    );
                    on_evict(entity);
                }
                break;
            }
        }
    });

    entity.watcher().set(handle.abort_handle());
}
