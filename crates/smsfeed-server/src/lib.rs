//! # smsfeed-server
//!
//! Axum HTTP + WebSocket server for the SMS feed.
//!
//! - `POST /api/sms`: authenticated ingest, persisted then fanned out live
//! - `GET /ws`: live viewer feed, one JSON frame per new message
//! - `GET /`: recent-history page
//! - `GET /health`: liveness
//!
//! A background retention sweeper deletes expired messages. Everything shuts
//! down from a single `CancellationToken`.

pub mod api;
pub mod config;
pub mod feed;
pub mod health;
pub mod history;
pub mod ingest;
pub mod server;
pub mod shutdown;
pub mod sweeper;

pub use config::ServerConfig;
pub use server::{build_router, start, AppState, ServerHandle};
