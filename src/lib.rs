pub mod auth;
pub mod client;
pub mod codec;
pub mod config;
pub mod conn;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod server;

pub use auth::{AcceptAll, Authenticator};
pub use client::ChatClient;
pub use config::ServerConfig;
pub use protocol::{ChatMessage, LoginCredential};
pub use registry::Registry;
pub use server::Server;
