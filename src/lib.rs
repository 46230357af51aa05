pub mod config;
pub mod dashboard;
pub mod dispatch;
pub mod error;
pub mod grpc;
pub mod shutdown;
pub mod view;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("foreman");
}
