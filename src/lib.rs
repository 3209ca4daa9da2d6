// Library exports for Atelier
// This allows integration tests and external code to use Atelier modules

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod gallery;
pub mod routes;
pub mod state;
pub mod storage;
