//! Latest-frame store and encoding types
//!
//! The store holds exactly one frame. Publishing replaces it and wakes every
//! streaming worker that is currently waiting; nothing is queued per reader.
//!
//! # Architecture
//!
//! ```text
//!                    Arc<FrameStore>
//!               ┌──────────────────────┐
//!               │ slot: RwLock<        │
//!               │   FrameSnapshot {    │
//!               │     version, data,   │
//!               │   }>                 │
//!               │ pulse: Notify        │
//!               └──────────┬───────────┘
//!                          │
//!      ┌───────────────────┼───────────────────┐
//!      │                   │                   │
//!      ▼                   ▼                   ▼
//!  [Producer]          [Worker]            [Worker]
//!  publish()       wait_for_update()   wait_for_update()
//!      │                   │                   │
//!      └──► slot = new ──► pulse ──► current() ──► TCP
//! ```
//!
//! # Zero-Copy Design
//!
//! `bytes::Bytes` is reference counted, so every worker writes from the same
//! allocation. A slow worker simply reads whatever is current the next time it
//! wakes, which drops intermediate frames without any buffering.

pub mod encoder;
pub mod store;

pub use encoder::{EncodeSettings, FrameEncoder, ImageFormat, PixelFormat, RawFrame};
#[cfg(feature = "encoder")]
pub use encoder::ImageEncoder;
pub use store::{FrameSnapshot, FrameStore};
