pub mod ai;
pub mod auth;
pub mod codec;
pub mod config;
pub mod controller;
pub mod events;
pub mod store;
pub mod types;
pub mod views;
