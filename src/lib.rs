pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod importer;
pub mod initializer;
pub mod link;
pub mod logging;
pub mod metrics;
pub mod query;
pub mod schema;
pub mod validate;
