// Library exports for GrowPath
// Integration tests build the router and state from here

pub mod areas;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod program;
pub mod routes;
pub mod state;
