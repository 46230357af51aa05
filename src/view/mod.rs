pub mod idle;
pub mod server;
pub mod state;

pub use idle::IdleQueue;
pub use server::{ViewServer, ViewStatus};
pub use state::{View, ViewState};
