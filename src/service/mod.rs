mod service;
pub mod services;

pub mod federation;
pub mod globals;
pub mod rooms;

pub(crate) use service::{Args, OnceServices, Service};

pub use crate::services::Services;
