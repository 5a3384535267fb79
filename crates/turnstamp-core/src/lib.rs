pub mod config;
pub mod error;
pub mod extract;
pub mod ledger;
pub mod merge;
pub mod model;
pub mod store;
