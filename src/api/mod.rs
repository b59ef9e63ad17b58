pub mod client;
mod router;
pub mod server;

use std::sync::Arc;

use maelstrom_service::Services;

pub use crate::router::{ApiError, build as router};

/// Shared handler state.
pub(crate) type State = axum::extract::State<Arc<Services>>;

pub(crate) type Result<T> = std::result::Result<T, ApiError>;
