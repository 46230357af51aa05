use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForemanError {
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ForemanError>;
