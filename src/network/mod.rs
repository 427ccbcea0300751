//! Network layer.
//!
//! - [`IngressListener`]: raw TCP entry point for messages to broadcast

mod ingress;

pub use ingress::IngressListener;
