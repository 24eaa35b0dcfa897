//! Client-side sync: delta application, the interpolated clock and the tick driver

pub mod applier;
pub mod clock;
pub mod driver;
pub mod transport;

pub use applier::{DeltaApplier, PatchRecorder, UiPatch};
pub use clock::{InterpolatedClock, ResyncOutcome};
pub use driver::{DriverCommand, DriverError, DriverEvent, DriverHandle, SyncTransport, TickDriver};
pub use transport::TcpSyncTransport;
