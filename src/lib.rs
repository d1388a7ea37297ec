// src/lib.rs

pub mod agent;
pub mod api;
pub mod auth;
pub mod chat;
pub mod config;
pub mod error;
pub mod provider;
pub mod session;
pub mod state;
