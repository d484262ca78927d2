//! Alert records, persistence and the raise/notify pipeline
//!
//! [`AlertStore`] owns the persisted records, [`AlertManager`] decides when
//! an observation becomes an alert and whether it is sent on.

pub mod manager;
pub mod model;
pub mod store;

pub use manager::AlertManager;
pub use model::{
    Alert, AlertCounts, AlertFilter, AlertStatus, AlertTrend, Severity, ValidationError,
};
pub use store::{AlertStore, StoreError};
