//! # roistat
//!
//! Usage-ROI analytics over automation run data: fetch time-windowed usage
//! records, resolve per-item time/cost configuration, aggregate into grouped
//! savings rows and totals, and optionally enrich items with AI-generated
//! time estimates and categories over a streaming chat protocol.
//!
//! ## Example
//!
//! ```
//! use roistat::aggregation::{AggregationRequest, GroupBy, NameMaps, aggregate};
//! use roistat::config::{ConfigDefaults, ConfigStore};
//! use roistat::types::{ItemKind, UsageRecord};
//! use std::collections::HashSet;
//!
//! let records = vec![UsageRecord {
//!     playbook_id: Some("pb-1".to_string()),
//!     count: 12,
//!     ..Default::default()
//! }];
//! let store = ConfigStore::new();
//! let excluded = HashSet::new();
//! let request = AggregationRequest::new(
//!     ItemKind::Playbook,
//!     GroupBy::ItemId,
//!     ConfigDefaults::playbook(),
//!     &excluded,
//! );
//!
//! let result = aggregate(&records, &store, &NameMaps::default(), &request);
//! assert_eq!(result.grand_total.primary_metric, 12);
//! ```

pub mod aggregation;
pub mod chat_protocol;
pub mod chat_session;
pub mod cli;
pub mod config;
pub mod data_loader;
pub mod date_range;
pub mod error;
pub mod estimator;
pub mod json_repair;
pub mod output;
pub mod runner;
pub mod settings;
pub mod types;

pub use error::{Result, RoistatError};
pub use types::{GrandTotal, ItemId, ItemKind, TenantId, UsageRecord};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
