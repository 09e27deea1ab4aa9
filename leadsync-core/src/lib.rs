//! Core engine for bidirectional lead/CRM calendar synchronization.
//!
//! This crate provides everything below the HTTP surface:
//! - `lead` and `tenant` for the local data model
//! - `envelope` and `webhook` for the inbound pipeline
//! - `reconcile` for the outbound pipeline
//! - `crm` for the external API client
//! - `store` for the persistence seam

pub mod change;
pub mod credentials;
pub mod crm;
pub mod envelope;
pub mod error;
pub mod lead;
pub mod locks;
pub mod reconcile;
pub mod store;
pub mod template;
pub mod tenant;
pub mod timezone;
pub mod webhook;

pub use error::{SyncError, SyncResult};
pub use lead::{Lead, LeadStatus, Slot, SlotKind, SyncStatus};
pub use tenant::{CalendarConfig, Tenant};
