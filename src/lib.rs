//! containerd-events: async server-streaming gRPC client for the containerd
//! event service.
//!
//! Each subscription runs on its own background thread and is consumed
//! through a thread-safe output buffer.

pub mod error;
pub mod config;

pub mod client;
pub mod publisher;

// Re-exports
pub use error::{Error, Result};

// Generated protobuf modules
pub mod containerd {
    pub mod services {
        pub mod events {
            pub mod v1 {
                tonic::include_proto!("containerd.services.events.v1");
            }
        }
    }

    pub mod events {
        tonic::include_proto!("containerd.events");
    }
}

/// containerd-events library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
