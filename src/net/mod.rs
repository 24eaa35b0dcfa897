pub mod delta;
pub mod framing;
pub mod protocol;
pub mod repository;
pub mod scheduler;
pub mod session;
pub mod snapshot;
pub mod transport;
