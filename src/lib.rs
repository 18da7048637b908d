pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod middleware;
pub mod proxy;
pub mod routes;
pub mod server;
pub mod spotify;
