//! # ZoneKV
//!
//! A zoned, append-only key-value storage engine:
//! - Sequential appends into fixed-capacity zones (ZNS-SSD / SMR friendly)
//! - Sharded write buffers with a bounded flush queue (backpressure)
//! - Two-tier index: values in memory until their record is on disk
//! - Per-zone metadata and footer for recovery without scanning zones
//! - Background GC returning FULL zones to the empty pool
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                           Db                                 │
//! │                 (key hash → one Store per device)            │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                         Store                                │
//! │                 (Index + ZoneManager)                        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌──────────────┐
//!   │    Index    │◄─promote─│ ZoneManager  │
//!   │ (RwLock x N)│          │ flush + GC   │
//!   └─────────────┘          └──────┬───────┘
//!                                   │ page-aligned appends
//!                                   ▼
//!                           ┌──────────────┐
//!                           │  ZoneDevice  │
//!                           │ (file / mem) │
//!                           └──────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod hash;
pub mod iobuf;
pub mod index;
pub mod write_buffer;
pub mod zone;
pub mod codec;
pub mod device;
pub mod gc;
pub mod metrics;
pub mod manager;
pub mod store;
pub mod db;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, ZoneKvError};
pub use config::{DbConfig, StoreConfig, PAGE_SIZE, MAX_KEY_SIZE, MAX_VALUE_SIZE};
pub use device::{FileDevice, MemDevice, ZoneDevice};
pub use iobuf::IoBuf;
pub use index::{DiskPointer, Index, IndexValue};
pub use manager::ZoneManager;
pub use metrics::{Metrics, MetricsSnapshot};
pub use store::Store;
pub use db::Db;
pub use zone::{Zone, ZoneState};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of ZoneKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
