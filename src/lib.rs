pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod hash;
pub mod payment;
pub mod pdf;
pub mod receipt;
pub mod routes;
pub mod state;
pub mod storage;
pub mod submissions;
pub mod templates;
pub mod verification;
