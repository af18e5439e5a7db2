use std::rc::Rc;

use crate::containers::StorageKey;
use crate::contractors::Ctc;
use crate::contractors::DynCtc;
use crate::engine::domain::DomainId;
use crate::engine::network::ContractorNetwork;
use crate::engine::span::Span;

/// An identifier of a contractor node within a network.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ContractorId(pub(crate) u32);

impl std::fmt::Display for ContractorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ContractorId({})", self.0)
    }
}

impl StorageKey for ContractorId {
    fn index(&self) -> usize {
        self.0 as usize
    }

    fn create_from_index(index: usize) -> Self {
        ContractorId(index as u32)
    }
}

/// The contracting operation a node performs.
#[derive(Clone)]
pub(crate) enum ContractorKind {
    /// A wrapped static operator over a box of scalar values.
    Static(Rc<dyn Ctc>),
    /// A wrapped operator over time domains (slices or whole tubes).
    Dynamic(Rc<dyn DynCtc>),
    /// Auto-created parent/sub-domain link. Contraction is a no-op (the
    /// parts alias the same storage); the node relays change measurement
    /// across the composite.
    Structural,
    /// Intersects two same-shaped domains and writes the result to both.
    Equality,
    /// A whole sub-network acting as a single contracting unit, connected
    /// through explicit boundary bindings.
    Network(Box<NestedNetwork>),
}

impl std::fmt::Debug for ContractorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContractorKind::Static(op) => write!(f, "Static({})", op.name()),
            ContractorKind::Dynamic(op) => write!(f, "Dynamic({})", op.name()),
            ContractorKind::Structural => write!(f, "Structural"),
            ContractorKind::Equality => write!(f, "Equality"),
            ContractorKind::Network(nested) => {
                write!(f, "Network({} bindings)", nested.bindings.len())
            }
        }
    }
}

/// A sub-network wrapped as a contractor, plus the (outer, inner) domain
/// pairs spliced across its boundary.
#[derive(Clone, Debug)]
pub(crate) struct NestedNetwork {
    pub(crate) network: ContractorNetwork,
    pub(crate) bindings: Vec<(DomainId, DomainId)>,
}

/// A contractor node: one contracting operation over an ordered tuple of
/// domains.
#[derive(Clone, Debug)]
pub(crate) struct Contractor {
    pub(crate) kind: ContractorKind,
    pub(crate) domains: Vec<DomainId>,
    pub(crate) name: Option<String>,
    /// Spans accumulated while queued (fine-grained policy); cleared when
    /// the node is popped.
    pub(crate) pending: Vec<(DomainId, Span)>,
}

impl Contractor {
    pub(crate) fn new(kind: ContractorKind, domains: Vec<DomainId>) -> Contractor {
        Contractor {
            kind,
            domains,
            name: None,
            pending: Vec::new(),
        }
    }

    /// Structural nodes relay changes but do not contract.
    pub(crate) fn is_contracting(&self) -> bool {
        !matches!(self.kind, ContractorKind::Structural)
    }

    /// Merges a span into the pending set, unioning with an existing span
    /// against the same domain instead of duplicating it.
    pub(crate) fn merge_pending(&mut self, domain: DomainId, span: &Span) {
        if let Some((_, existing)) = self.pending.iter_mut().find(|(d, _)| *d == domain) {
            existing.merge(span);
        } else {
            self.pending.push((domain, span.clone()));
        }
    }

    pub(crate) fn op_name(&self) -> &str {
        if let Some(name) = &self.name {
            return name;
        }
        match &self.kind {
            ContractorKind::Static(op) => op.name(),
            ContractorKind::Dynamic(op) => op.name(),
            ContractorKind::Structural => "component",
            ContractorKind::Equality => "=",
            ContractorKind::Network(_) => "network",
        }
    }
}

/// Dedup key: operation identity plus the exact domain list, so re-adding
/// an equivalent contractor is a no-op. Nested-network nodes are never
/// deduplicated.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub(crate) struct ContractorKey {
    tag: u8,
    op: usize,
    domains: Vec<DomainId>,
}

impl ContractorKey {
    pub(crate) fn of(kind: &ContractorKind, domains: &[DomainId]) -> Option<ContractorKey> {
        let (tag, op) = match kind {
            ContractorKind::Static(op) => (0, Rc::as_ptr(op) as *const () as usize),
            ContractorKind::Dynamic(op) => (1, Rc::as_ptr(op) as *const () as usize),
            ContractorKind::Structural => (2, 0),
            ContractorKind::Equality => (3, 0),
            ContractorKind::Network(_) => return None,
        };

        let mut domains = domains.to_vec();
        if matches!(kind, ContractorKind::Equality) {
            // Equality is symmetric.
            domains.sort_unstable();
        }

        Some(ContractorKey { tag, op, domains })
    }
}
