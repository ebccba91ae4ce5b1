pub mod api;
pub mod config;
pub mod core;
pub mod domain;
pub mod error;
pub mod models;
pub mod service;
pub mod store;
pub mod stream;
