pub mod app;
pub mod audit;
pub mod authz;
pub mod blacklist;
pub mod config;
pub mod db;
pub mod docs;
pub mod errors;
pub mod insights;
pub mod jwt;
pub mod models;
pub mod routes;
pub mod utils;
pub mod validation;

// Re-export commonly used items for tests
pub use app::create_app;
