pub mod audit;
pub mod key;
pub mod logging;
pub mod message;

pub use key::IdempotencyKey;
pub use message::Message;
pub use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
