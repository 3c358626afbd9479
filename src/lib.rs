pub mod config;
pub mod error;
pub mod federation;
pub mod infra;
pub mod keys;
pub mod reconcile;
pub mod resource;
pub mod token;
