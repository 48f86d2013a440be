//! Follower synchronization primitives.

pub mod authority;
pub mod clock;
pub mod drift;
pub mod echo;
pub mod phase;

pub use authority::{AuthoritativeState, AuthoritativeStateTracker, PlayState};
pub use clock::{ClockSynchronizer, LocalClock, ProbeSample};
pub use drift::{DriftController, SeekReason, SyncStatus, TickOutcome};
pub use echo::EchoSuppressor;
pub use phase::SyncPhase;
