pub mod aggregator;
pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod orchestrator;
pub mod sink;
pub mod store;
pub mod tools;
