//! Core SMTP value types shared across the command model and session layer.

mod address;
mod extension;

pub use address::Address;
pub use extension::{AuthMechanism, Extension};
