//! Error types for Keel
//!
//! Every fallible operation in the core returns [`KeelResult`]. The variants map onto
//! the failure taxonomy the resilience layer reacts to:
//! - `Timeout`: a deadline elapsed before the operation settled
//! - `Aborted`: the caller cancelled the work
//! - `CircuitOpen`: a breaker rejected the call without attempting it
//! - `Operation`: whatever the wrapped fetch function reported (opaque)

mod constructors;
mod conversions;
mod types;

pub use types::{KeelError, KeelResult, ResultExt};
