//! Single-slot frame store
//!
//! One producer-facing `publish` and many reader-facing waits. The slot is
//! guarded by a lock so readers always get a whole frame, and the wake signal is
//! `Notify::notify_waiters`, which releases the tasks waiting at that instant
//! and stores no permit for anyone who arrives later.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Notify;

/// The frame currently held by the store
///
/// Cheap to clone: `data` is reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSnapshot {
    /// Number of publishes that produced this frame (0 = placeholder)
    pub version: u64,
    /// Encoded image bytes
    pub data: Bytes,
}

/// Holder of the most recently published frame
pub struct FrameStore {
    slot: RwLock<FrameSnapshot>,
    pulse: Notify,
}

impl FrameStore {
    /// Create a store holding an empty placeholder frame
    pub fn new() -> Self {
        Self::with_placeholder(Bytes::new())
    }

    /// Create a store holding `placeholder` until the first publish
    pub fn with_placeholder(placeholder: Bytes) -> Self {
        Self {
            slot: RwLock::new(FrameSnapshot {
                version: 0,
                data: placeholder,
            }),
            pulse: Notify::new(),
        }
    }

    /// Replace the stored frame and wake every waiting reader
    ///
    /// Returns the version assigned to the new frame. Concurrent publishes are
    /// serialized by the slot lock; the last one to take it wins.
    pub fn publish(&self, data: impl Into<Bytes>) -> u64 {
        let data = data.into();
        let version = {
            let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
            slot.version += 1;
            slot.data = data;
            slot.version
        };

        self.pulse.notify_waiters();

        tracing::trace!(version = version, "Frame published");
        version
    }

    /// Swap the placeholder, as long as nothing has been published yet
    pub(crate) fn reset_placeholder(&self, placeholder: Bytes) {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        if slot.version == 0 {
            slot.data = placeholder;
        }
    }

    /// Wait for the next publish, up to `timeout`
    ///
    /// Returns `true` if a publish happened while waiting. A publish that
    /// completed before this call does not count.
    pub async fn wait_for_update(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.pulse.notified())
            .await
            .is_ok()
    }

    /// Wait until the stored version is newer than `seen`, up to `timeout`
    ///
    /// Returns immediately if a newer frame is already stored. The pulse is
    /// registered before the version check, so a publish landing in between
    /// is not missed.
    pub async fn wait_for_newer(&self, seen: u64, timeout: Duration) -> bool {
        let notified = self.pulse.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if self.version() > seen {
            return true;
        }

        tokio::time::timeout(timeout, notified).await.is_ok()
    }

    /// Get the latest frame without blocking
    pub fn current(&self) -> FrameSnapshot {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get the latest frame's bytes without blocking
    pub fn current_bytes(&self) -> Bytes {
        self.current().data
    }

    /// Number of frames published so far
    pub fn version(&self) -> u64 {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .version
    }
}

impl Default for FrameStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrameStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.current();
        f.debug_struct("FrameStore")
            .field("version", &slot.version)
            .field("len", &slot.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_placeholder() {
        let store = FrameStore::with_placeholder(Bytes::from_static(b"placeholder"));

        let snapshot = store.current();
        assert_eq!(snapshot.version, 0);
        assert_eq!(snapshot.data, Bytes::from_static(b"placeholder"));
    }

    #[test]
    fn test_publish_replaces_frame() {
        let store = FrameStore::new();

        assert_eq!(store.publish(Bytes::from_static(b"one")), 1);
        assert_eq!(store.publish(Bytes::from_static(b"two")), 2);

        // Only the latest value is kept
        assert_eq!(store.current_bytes(), Bytes::from_static(b"two"));
        assert_eq!(store.version(), 2);
    }

    #[tokio::test]
    async fn test_wait_times_out_without_publish() {
        let store = FrameStore::new();

        let woke = store.wait_for_update(Duration::from_millis(20)).await;
        assert!(!woke);
    }

    #[tokio::test]
    async fn test_publish_wakes_all_waiters() {
        let store = Arc::new(FrameStore::new());

        let mut waiters = Vec::new();
        for _ in 0..4 {
            let store = Arc::clone(&store);
            waiters.push(tokio::spawn(async move {
                store.wait_for_update(Duration::from_secs(5)).await
            }));
        }

        // Give the waiters time to park on the notifier
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.publish(Bytes::from_static(b"frame"));

        for waiter in waiters {
            assert!(waiter.await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_pulse_is_edge_triggered() {
        let store = FrameStore::new();
        store.publish(Bytes::from_static(b"before"));

        // The publish above happened before anyone waited
        let woke = store.wait_for_update(Duration::from_millis(30)).await;
        assert!(!woke);
        assert_eq!(store.current_bytes(), Bytes::from_static(b"before"));
    }

    #[tokio::test]
    async fn test_wait_for_newer_sees_earlier_publish() {
        let store = FrameStore::new();
        let seen = store.current().version;
        store.publish(Bytes::from_static(b"missed pulse"));

        // The pulse fired before anyone waited, but the version moved on
        let start = tokio::time::Instant::now();
        assert!(store.wait_for_newer(seen, Duration::from_secs(5)).await);
        assert!(start.elapsed() < Duration::from_secs(1));

        // Nothing newer than what is stored now
        let seen = store.version();
        assert!(!store.wait_for_newer(seen, Duration::from_millis(20)).await);
    }

    #[tokio::test]
    async fn test_wait_for_newer_wakes_on_publish() {
        let store = Arc::new(FrameStore::new());

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.wait_for_newer(0, Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        store.publish(Bytes::from_static(b"frame"));

        assert!(waiter.await.unwrap());
    }

    #[test]
    fn test_concurrent_publish_never_mixes_frames() {
        let store = Arc::new(FrameStore::new());
        let frames: Vec<Bytes> = (0u8..8).map(|i| Bytes::from(vec![i; 4096])).collect();

        let handles: Vec<_> = frames
            .iter()
            .cloned()
            .map(|frame| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store.publish(frame.clone());
                        let current = store.current_bytes();
                        let first = current[0];
                        assert!(current.iter().all(|b| *b == first));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.version(), 800);
        assert!(frames.contains(&store.current_bytes()));
    }

    #[tokio::test]
    async fn test_versions_are_monotonic_for_reader() {
        let store = Arc::new(FrameStore::new());

        let reader = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let mut last = 0;
                for _ in 0..50 {
                    store.wait_for_update(Duration::from_millis(10)).await;
                    let version = store.current().version;
                    assert!(version >= last);
                    last = version;
                }
            })
        };

        for i in 0..200u32 {
            store.publish(Bytes::from(i.to_be_bytes().to_vec()));
            tokio::task::yield_now().await;
        }

        reader.await.unwrap();
    }
}
