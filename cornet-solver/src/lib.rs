//! Constraint propagation over interval domains and tubes.
//!
//! This crate is the public face of the cornet engine. Users declare
//! domains (scalar intervals, interval vectors, time-indexed tubes) and
//! contractors, operators that narrow one or more domains without
//! excluding any value consistent with a constraint. A
//! [`ContractorNetwork`] assembles both into a dependency graph and
//! re-invokes contractors whose inputs changed until a fixed point is
//! reached (or a time budget expires).
//!
//! The heavy lifting lives in `cornet-core`; everything needed to build
//! and solve networks is re-exported here.

pub use cornet_core::ContractorId;
pub use cornet_core::ContractorNetwork;
pub use cornet_core::DomainId;
pub use cornet_core::DomainKind;
pub use cornet_core::NetworkError;
pub use cornet_core::TriggerPolicy;
pub use cornet_core::containers;
pub use cornet_core::contractors;
pub use cornet_core::interval;
pub use cornet_core::tube;
