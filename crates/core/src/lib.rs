//! `keyward-core` — domain building blocks shared by the auth and entitlement crates.
//!
//! Pure types only: identifiers, the domain error model, aggregate traits and a
//! clock abstraction. No IO lives here.

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, DomainEvent, ExpectedVersion};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::UserId;
