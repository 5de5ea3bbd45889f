//! vcsync-commander – Bedienschnittstelle des Relais
//!
//! Zeilenbasiertes TCP-Protokoll im ServerQuery-Stil:
//! - [`tcp`] – Parser, Verbindungen, Server mit Verbindungslimit
//! - [`commands`] – Befehle und der [`commands::CommandExecutor`]
//! - [`auth`] – Operator-Token

pub mod auth;
pub mod commands;
pub mod error;
pub mod tcp;

pub use auth::{Bediener, BedienerAuth};
pub use commands::{Command, CommandExecutor, Response};
pub use error::{CommanderError, CommanderResult};
pub use tcp::{CommanderState, TcpServer, TcpServerKonfig};
