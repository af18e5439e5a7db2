//! The core of the cornet contractor-network propagation engine.
//!
//! Users declare *domains* (intervals, boxes, tubes) and *contractors*
//! (operators that narrow domains without excluding any value consistent
//! with their constraint). A [`ContractorNetwork`] assembles both into a
//! bipartite dependency graph and re-invokes contractors whose inputs
//! changed until no domain can be narrowed further, or a time budget
//! expires.
//!
//! ```
//! use std::rc::Rc;
//!
//! use cornet_core::ContractorNetwork;
//! use cornet_core::contractors::Ctc;
//! use cornet_core::contractors::CtcSum;
//! use cornet_core::interval::Interval;
//!
//! let mut cn = ContractorNetwork::new();
//! let a = cn.create_interval(Interval::new(0.0, 1.0));
//! let b = cn.create_interval(Interval::new(-1.0, 1.0));
//! let c = cn.create_interval(Interval::new(1.5, 2.0));
//!
//! let sum: Rc<dyn Ctc> = Rc::new(CtcSum);
//! cn.add_static(&sum, &[a, b, c]).unwrap();
//! let _ = cn.contract(false).unwrap();
//!
//! assert_eq!(cn.interval(a), Interval::new(0.5, 1.0));
//! ```

pub(crate) mod asserts;
pub mod containers;
pub mod contractors;
pub(crate) mod engine;
pub mod interval;
pub mod tube;

pub use crate::engine::contractor::ContractorId;
pub use crate::engine::domain::DomainId;
pub use crate::engine::domain::DomainKind;
pub use crate::engine::error::NetworkError;
pub use crate::engine::network::ContractorNetwork;
pub use crate::engine::network::TriggerPolicy;
