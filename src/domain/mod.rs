pub mod error;
pub mod fleet_aggregator;
pub mod fleet_service;
pub mod node_aggregator;
pub mod scheduler;
pub mod snapshot_store;
pub mod types;
