//! LinphoneUI Daemon - bridges `linphonecsh` to the LinphoneUI front-end
//!
//! This crate provides the daemon's building blocks:
//! - `state` - State actor owning the call state machine
//! - `orchestrator` - Sampling, reconciliation, tool lifecycle and control surface
//! - `monitor` - Periodic reconciliation loop
//! - `effects` - Front-end launch and audio hints on call transitions
//! - `server` - Unix socket bus server
//! - `config` - TOML configuration
//! - `cli` - The `lpuid` command line
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        lpuid daemon                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  Monitor loop   │────▶│        Orchestrator         │   │
//! │  └─────────────────┘     │  (linphonecsh + effects)    │   │
//! │  ┌─────────────────┐     └──────────────┬──────────────┘   │
//! │  │  DaemonServer   │────────────▶       │ facts            │
//! │  │ (Unix Socket)   │                    ▼                   │
//! │  └────────┬────────┘     ┌─────────────────────────────┐   │
//! │           │              │   StateActor ──▶ EventBus   │   │
//! │           │ signals      └──────────────┬──────────────┘   │
//! │           ◀─────────────────────────────┘                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod cli;
pub mod config;
pub mod effects;
pub mod monitor;
pub mod orchestrator;
pub mod server;
pub mod state;
