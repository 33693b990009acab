//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod health;
pub mod http;
pub mod pidfile;
pub mod prefetch;
pub mod shutdown;
pub mod telemetry;
