//! Bounded cache with LIRS replacement
//!
//! Keeps the working set of open region files resident. Entries move
//! between three states:
//!
//! ```text
//!            miss (hot budget left)
//!   absent ──────────────────────────→ Hot
//!     │                                 ↑  │ demoted from stack bottom
//!     │ miss                 stack hit  │  ↓
//!     └──────────────────────────────→ Cold ──evict──→ NonResident ──pruned──→ absent
//!                                       ↑                  │
//!                                       └──── miss ────────┘ (promoted to Hot)
//! ```
//!
//! The stack records recency of hot entries plus cold and non-resident
//! entries newer than the oldest hot one. The queue orders cold residents
//! for eviction.

pub mod lirs;
pub mod stats;

pub use lirs::{EntryStatus, LirsCache, DEFAULT_HOT_RATIO};
pub use stats::CacheStats;
