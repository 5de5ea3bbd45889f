//! TCP-Interface fuer den vcsync Commander

pub mod commands;
pub mod parser;
pub mod server;
pub mod session;

pub use server::{CommanderState, TcpServer, TcpServerKonfig};
