//! KeyQuest game server library.
//!
//! An authoritative server for a small cooperative 2D platformer: clients
//! form rooms over WebSocket, pick heroes, and send held-key intent; the
//! server owns physics, collisions, the key/door objective, and win/loss,
//! broadcasting lobby and simulation state to every participant.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod util;
pub mod ws;
