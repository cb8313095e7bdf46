//! Key-Value Service
//!
//! The service is the only way in to a store. It is made of three pieces:
//!
//! ```text
//!  connection tasks            Reaper (Tokio task)
//!        │                            │
//!        │ get/set/delete/            │ evict_expired()
//!        │ dump/restore               │ every interval
//!        ▼                            ▼
//! ┌──────────────────────────────────────────────┐
//! │                  KvService                   │
//! │   default TTL · expiry filtering · Clock     │
//! │  ┌────────────────────────────────────────┐  │
//! │  │    Guarded (one reader/writer lock)    │  │
//! │  │  ┌──────────────────────────────────┐  │  │
//! │  │  │   Box<dyn Storage>               │  │  │
//! │  │  │   MemoryStorage | SqliteStorage  │  │  │
//! │  │  └──────────────────────────────────┘  │  │
//! │  └────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! There is exactly one lock per store and no per-key locking: reads run in
//! parallel with each other, writes run alone.

pub mod kv;
pub mod reaper;
pub mod sync;

pub use kv::{KvError, KvResult, KvService, ServiceConfig, ServiceStats, DEFAULT_TTL_SECS};
pub use reaper::{Reaper, ReaperConfig, DEFAULT_REAP_INTERVAL};
pub use sync::Guarded;
