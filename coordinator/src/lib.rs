//! Lab coordinator — session/round coordination server for
//! multi-participant experiments.
//!
//! A fixed set of clients connects over WebSocket, receives roles, and
//! advances through configured main/sub rounds gated by a submission
//! barrier. A pluggable scoring algorithm computes per-participant
//! feedback between rounds.

pub mod actors;
pub mod algorithm;
pub mod api;
pub mod config;
pub mod registry;
pub mod session;
