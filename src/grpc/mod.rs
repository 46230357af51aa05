pub mod dispatch_service;
pub mod server;
pub mod view_service;
pub mod worker_client;

pub use server::{DispatchGrpcServer, ViewGrpcServer};
