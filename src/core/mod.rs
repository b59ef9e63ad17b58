pub mod config;
pub mod ctx;
pub mod error;
pub mod matrix;
pub mod server;
pub mod utils;

pub use ::http;
pub use ::ruma;
pub use ::smallstr;
pub use ::smallvec;
pub use ::toml;
pub use ::tracing;
pub use config::Config;
pub use error::Error;
pub use maelstrom_macros::implement;
pub use matrix::{Pdu, PduBuilder, StateKey, pdu};
pub use server::Server;
pub use utils::result::Result;
