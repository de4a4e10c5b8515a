// Library exports for Academy
// This allows integration tests and external code to use Academy modules

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod learning;
pub mod routes;
pub mod state;
