use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;
use std::rc::Rc;
use std::time::Duration;
use std::time::Instant;

use fnv::FnvHashMap;
use log::debug;
use log::info;
use log::warn;

use crate::asserts::cornet_assert_advanced;
use crate::asserts::cornet_assert_eq_simple;
use crate::asserts::cornet_assert_moderate;
use crate::asserts::cornet_assert_simple;
use crate::containers::KeyedVec;
use crate::contractors::Ctc;
use crate::contractors::DynCtc;
use crate::engine::contractor::Contractor;
use crate::engine::contractor::ContractorId;
use crate::engine::contractor::ContractorKey;
use crate::engine::contractor::ContractorKind;
use crate::engine::contractor::NestedNetwork;
use crate::engine::domain::Domain;
use crate::engine::domain::DomainId;
use crate::engine::domain::DomainKind;
use crate::engine::domain::Location;
use crate::engine::error::NetworkError;
use crate::engine::queue::PropagationQueue;
use crate::engine::span::Span;
use crate::engine::store::DomainValue;
use crate::engine::store::SlotValue;
use crate::engine::store::ValueStore;
use crate::engine::store::intersect_tubes;
use crate::interval::Interval;
use crate::interval::IntervalVector;
use crate::tube::SliceView;
use crate::tube::Tube;
use crate::tube::TubeVector;

/// How re-triggering decides that a domain "changed".
///
/// The two policies correspond to the two generations of the algorithm and
/// are never mixed within a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TriggerPolicy {
    /// Whole-domain relative-shrink threshold on the volume measure.
    #[default]
    VolumeRatio,
    /// Per-domain change spans diffed against pre-contraction snapshots;
    /// re-triggering is scoped to structurally overlapping contractors and
    /// spans of queued contractors are merged instead of duplicated.
    ChangeSpan,
}

#[derive(Clone, Debug, Default)]
struct DataFeed {
    samples: Vec<(f64, Interval)>,
    next_slice: usize,
}

/// A graph of domains and contractors modelling a problem in the
/// constraint-programming framework, with heterogeneous domains (intervals,
/// boxes, tubes) handled in one network.
///
/// Contractors are re-invoked while their domains keep changing, until a
/// fixed point is reached on the whole graph or the time budget expires.
#[derive(Clone, Debug)]
pub struct ContractorNetwork {
    domains: KeyedVec<DomainId, Domain>,
    contractors: KeyedVec<ContractorId, Contractor>,
    store: ValueStore,
    by_location: FnvHashMap<Location, DomainId>,
    dedup: FnvHashMap<ContractorKey, ContractorId>,
    queue: PropagationQueue,
    fixedpoint_ratio: f64,
    max_duration: Option<Duration>,
    policy: TriggerPolicy,
    iterations: usize,
    feeds: FnvHashMap<DomainId, DataFeed>,
}

impl Default for ContractorNetwork {
    fn default() -> Self {
        ContractorNetwork::new()
    }
}

impl ContractorNetwork {
    pub fn new() -> ContractorNetwork {
        ContractorNetwork {
            domains: KeyedVec::default(),
            contractors: KeyedVec::default(),
            store: ValueStore::default(),
            by_location: FnvHashMap::default(),
            dedup: FnvHashMap::default(),
            queue: PropagationQueue::default(),
            fixedpoint_ratio: 1e-4,
            max_duration: None,
            policy: TriggerPolicy::default(),
            iterations: 0,
            feeds: FnvHashMap::default(),
        }
    }

    pub fn with_policy(policy: TriggerPolicy) -> ContractorNetwork {
        ContractorNetwork {
            policy,
            ..ContractorNetwork::new()
        }
    }

    // Building the network: domains.

    /// Creates an interval domain owned by the network. The initial value is
    /// remembered for [`ContractorNetwork::reset_intermediate_variables`].
    pub fn create_interval(&mut self, value: Interval) -> DomainId {
        let slot = self.store.alloc(SlotValue::Interval(value));
        let id = self.insert_domain(Location::Interval(slot));
        self.domains[id].initial = Some(SlotValue::Interval(value));
        id
    }

    /// Creates an interval domain that never propagates changes.
    pub fn create_constant(&mut self, value: Interval) -> DomainId {
        let id = self.create_interval(value);
        self.domains[id].initial = None;
        self.domains[id].constant = true;
        id
    }

    pub fn create_vector(&mut self, value: IntervalVector) -> DomainId {
        let slot = self.store.alloc(SlotValue::Vector(value.clone()));
        let id = self.insert_domain(Location::Vector(slot));
        self.domains[id].initial = Some(SlotValue::Vector(value));
        id
    }

    pub fn create_tube(&mut self, value: Tube) -> DomainId {
        let slot = self.store.alloc(SlotValue::Tube(value.clone()));
        let id = self.insert_domain(Location::Tube(slot));
        self.domains[id].initial = Some(SlotValue::Tube(value));
        id
    }

    pub fn create_tube_vector(&mut self, value: TubeVector) -> DomainId {
        let slot = self.store.alloc(SlotValue::TubeVector(value.clone()));
        let id = self.insert_domain(Location::TubeVector(slot));
        self.domains[id].initial = Some(SlotValue::TubeVector(value));
        id
    }

    /// Declares a free scalar variable. It can be used symbolically in
    /// contractors and must be bound to a concrete domain (see
    /// [`ContractorNetwork::contract_with`]) before contraction.
    pub fn create_interval_var(&mut self) -> DomainId {
        let slot = self.store.alloc(SlotValue::Interval(Interval::ALL_REALS));
        let location = Location::Interval(slot);
        let id = self.insert_domain(location);
        self.domains[id].home = Some(location);
        id
    }

    /// Declares a free vector variable of dimension `dim`.
    pub fn create_vector_var(&mut self, dim: usize) -> DomainId {
        let slot = self.store.alloc(SlotValue::Vector(IntervalVector::new(dim)));
        let location = Location::Vector(slot);
        let id = self.insert_domain(location);
        self.domains[id].home = Some(location);
        for i in 0..dim as u32 {
            let component_location = Location::VectorComponent(slot, i);
            let component = self.by_location[&component_location];
            self.domains[component].home = Some(component_location);
        }
        id
    }

    /// The `i`-th component domain of a vector or tube-vector domain.
    pub fn component(&self, parent: DomainId, i: usize) -> DomainId {
        match self.domains[parent].location {
            Location::Vector(slot) => self.by_location[&Location::VectorComponent(slot, i as u32)],
            Location::TubeVector(slot) => {
                self.by_location[&Location::TubeVectorTube(slot, i as u32)]
            }
            _ => panic!("{parent} has no components"),
        }
    }

    /// The `k`-th time-slice domain of a tube domain.
    pub fn slice_domain(&self, tube: DomainId, k: usize) -> DomainId {
        let location = self.domains[tube].location;
        cornet_assert_simple!(
            matches!(location, Location::Tube(_) | Location::TubeVectorTube(..)),
            "{tube} has no slices"
        );
        self.slice_of(location, k as u32)
    }

    /// Creates a vector domain spliced onto components `range` of `vector`
    /// through per-index equality contractors.
    pub fn subvector(
        &mut self,
        vector: DomainId,
        range: Range<usize>,
    ) -> Result<DomainId, NetworkError> {
        let kind = self.domains[vector].kind();
        if kind != DomainKind::Vector {
            return Err(NetworkError::KindMismatch {
                expected: DomainKind::Vector,
                actual: kind,
            });
        }

        let location = self.domains[vector].location;
        let dim = self.store.vector_dim(location);
        if range.is_empty() || range.end > dim {
            return Err(NetworkError::DimensionMismatch {
                expected: dim,
                actual: range.end,
            });
        }

        let value = match self.store.read(location) {
            DomainValue::Vector(v) => v.subvector(range.clone()),
            _ => unreachable!(),
        };
        let slot = self.store.alloc(SlotValue::Vector(value));
        let sub = self.insert_domain(Location::Vector(slot));

        for (offset, index) in range.enumerate() {
            let sub_component = self.component_of(Location::Vector(slot), offset as u32);
            let parent_component = self.component_of(location, index as u32);
            let _ = self.add_node(ContractorKind::Equality, vec![sub_component, parent_component]);
        }

        Ok(sub)
    }

    // Building the network: contractors.

    /// Adds a static contractor over the given domains.
    ///
    /// Tube and tube-vector domains are broken down to their slices (all of
    /// them must share one slicing) and the operator is applied slice-wise;
    /// vector domains contribute their components; a single vector domain
    /// is contracted as one box.
    pub fn add_static(
        &mut self,
        op: &Rc<dyn Ctc>,
        domains: &[DomainId],
    ) -> Result<(), NetworkError> {
        cornet_assert_simple!(!domains.is_empty(), "a contractor needs at least one domain");

        if domains.len() == 1 && self.domains[domains[0]].kind() == DomainKind::Vector {
            let dim = self.store.vector_dim(self.domains[domains[0]].location);
            if dim != op.dim() {
                return Err(NetworkError::DimensionMismatch {
                    expected: op.dim(),
                    actual: dim,
                });
            }
            let _ = self.add_node(ContractorKind::Static(Rc::clone(op)), domains.to_vec());
            return Ok(());
        }

        let has_dyn = domains.iter().any(|&d| {
            matches!(
                self.domains[d].kind(),
                DomainKind::Tube | DomainKind::TubeVector
            )
        });

        if !has_dyn {
            let mut flat = Vec::new();
            for &d in domains {
                match self.domains[d].kind() {
                    DomainKind::Scalar | DomainKind::TimeSlice => flat.push(d),
                    DomainKind::Vector => {
                        let location = self.domains[d].location;
                        for i in 0..self.store.vector_dim(location) as u32 {
                            flat.push(self.component_of(location, i));
                        }
                    }
                    DomainKind::Tube | DomainKind::TubeVector => unreachable!(),
                }
            }
            if flat.len() != op.dim() {
                return Err(NetworkError::DimensionMismatch {
                    expected: op.dim(),
                    actual: flat.len(),
                });
            }
            let _ = self.add_node(ContractorKind::Static(Rc::clone(op)), flat);
            return Ok(());
        }

        // A static constraint over tubes relates values at one instant
        // only; each row of slices is contracted independently.
        let nslices = self.check_same_slicing(domains)?;
        for k in 0..nslices as u32 {
            let mut row = Vec::new();
            for &d in domains {
                let location = self.domains[d].location;
                match self.domains[d].kind() {
                    DomainKind::Scalar => row.push(d),
                    DomainKind::Vector => {
                        for i in 0..self.store.vector_dim(location) as u32 {
                            row.push(self.component_of(location, i));
                        }
                    }
                    DomainKind::Tube => row.push(self.slice_of(location, k)),
                    DomainKind::TubeVector => {
                        let size = self.store.tube_vector_ref(location).size() as u32;
                        for i in 0..size {
                            let component = match location {
                                Location::TubeVector(slot) => Location::TubeVectorTube(slot, i),
                                _ => unreachable!(),
                            };
                            row.push(self.slice_of(component, k));
                        }
                    }
                    // A lone slice cannot share the slicing of the tubes.
                    DomainKind::TimeSlice => return Err(NetworkError::SlicingMismatch),
                }
            }
            if row.len() != op.dim() {
                return Err(NetworkError::DimensionMismatch {
                    expected: op.dim(),
                    actual: row.len(),
                });
            }
            let _ = self.add_node(ContractorKind::Static(Rc::clone(op)), row);
        }
        Ok(())
    }

    /// Adds a contractor over time domains.
    ///
    /// Non-intertemporal operators are decomposed to one node per row of
    /// slices; intertemporal ones act on the whole tubes at once.
    pub fn add_dyn(
        &mut self,
        op: &Rc<dyn DynCtc>,
        domains: &[DomainId],
    ) -> Result<(), NetworkError> {
        cornet_assert_simple!(!domains.is_empty(), "a contractor needs at least one domain");

        if op.is_intertemporal() {
            let _ = self.check_same_slicing(domains)?;
            let mut flat = Vec::new();
            for &d in domains {
                let location = self.domains[d].location;
                match self.domains[d].kind() {
                    DomainKind::Tube => flat.push(d),
                    DomainKind::TubeVector => {
                        let size = self.store.tube_vector_ref(location).size() as u32;
                        for i in 0..size {
                            match location {
                                Location::TubeVector(slot) => {
                                    flat.push(self.by_location[&Location::TubeVectorTube(slot, i)]);
                                }
                                _ => unreachable!(),
                            }
                        }
                    }
                    kind => {
                        return Err(NetworkError::KindMismatch {
                            expected: DomainKind::Tube,
                            actual: kind,
                        });
                    }
                }
            }
            let _ = self.add_node(ContractorKind::Dynamic(Rc::clone(op)), flat);
            return Ok(());
        }

        if domains
            .iter()
            .all(|&d| self.domains[d].kind() == DomainKind::TimeSlice)
        {
            let _ = self.add_node(ContractorKind::Dynamic(Rc::clone(op)), domains.to_vec());
            return Ok(());
        }

        let nslices = self.check_same_slicing(domains)?;
        for k in 0..nslices as u32 {
            let mut row = Vec::new();
            for &d in domains {
                let location = self.domains[d].location;
                match self.domains[d].kind() {
                    DomainKind::Tube => row.push(self.slice_of(location, k)),
                    DomainKind::TubeVector => {
                        let size = self.store.tube_vector_ref(location).size() as u32;
                        for i in 0..size {
                            let component = match location {
                                Location::TubeVector(slot) => Location::TubeVectorTube(slot, i),
                                _ => unreachable!(),
                            };
                            row.push(self.slice_of(component, k));
                        }
                    }
                    kind => {
                        return Err(NetworkError::KindMismatch {
                            expected: DomainKind::Tube,
                            actual: kind,
                        });
                    }
                }
            }
            let _ = self.add_node(ContractorKind::Dynamic(Rc::clone(op)), row);
        }
        Ok(())
    }

    /// Adds an equality constraint between two same-shaped domains.
    pub fn add_equality(
        &mut self,
        a: DomainId,
        b: DomainId,
    ) -> Result<ContractorId, NetworkError> {
        self.check_same_shape(a, b)?;
        Ok(self.add_node(ContractorKind::Equality, vec![a, b]))
    }

    /// Wraps `sub` as a single contracting unit of this network. Each
    /// binding splices an outer domain onto a domain of the sub-network;
    /// values are intersected across the boundary in both directions.
    pub fn add_network(
        &mut self,
        sub: ContractorNetwork,
        bindings: Vec<(DomainId, DomainId)>,
    ) -> Result<ContractorId, NetworkError> {
        for &(outer, inner) in &bindings {
            let outer_kind = self.domains[outer].kind();
            let inner_kind = sub.domains[inner].kind();
            if outer_kind != inner_kind {
                return Err(NetworkError::KindMismatch {
                    expected: outer_kind,
                    actual: inner_kind,
                });
            }
            match outer_kind {
                DomainKind::Scalar | DomainKind::TimeSlice => {}
                DomainKind::Vector => {
                    let expected = self.store.vector_dim(self.domains[outer].location);
                    let actual = sub.store.vector_dim(sub.domains[inner].location);
                    if expected != actual {
                        return Err(NetworkError::DimensionMismatch { expected, actual });
                    }
                }
                DomainKind::Tube => {
                    let a = self.store.tube_ref(self.domains[outer].location);
                    let b = sub.store.tube_ref(sub.domains[inner].location);
                    if !a.same_slicing(b) {
                        return Err(NetworkError::SlicingMismatch);
                    }
                }
                DomainKind::TubeVector => {
                    let a = self.store.tube_vector_ref(self.domains[outer].location);
                    let b = sub.store.tube_vector_ref(sub.domains[inner].location);
                    if a.size() != b.size() {
                        return Err(NetworkError::DimensionMismatch {
                            expected: a.size(),
                            actual: b.size(),
                        });
                    }
                    if !a[0].same_slicing(&b[0]) {
                        return Err(NetworkError::SlicingMismatch);
                    }
                }
            }
        }

        let outer_domains: Vec<DomainId> = bindings.iter().map(|&(outer, _)| outer).collect();
        Ok(self.add_node(
            ContractorKind::Network(Box::new(NestedNetwork {
                network: sub,
                bindings,
            })),
            outer_domains,
        ))
    }

    // Contraction process.

    /// Propagates until a fixed point is reached on the whole graph (or the
    /// time budget expires). Returns the computation time.
    pub fn contract(&mut self, verbose: bool) -> Result<Duration, NetworkError> {
        self.check_unbound()?;

        let start = Instant::now();

        for d in self.domains.keys().collect::<Vec<_>>() {
            let volume = self.store.measure(self.domains[d].location);
            self.domains[d].saved_volume = volume;
        }

        if verbose {
            info!(
                "contractor network has {} contractors and {} domains",
                self.contractors.len(),
                self.domains.len()
            );
            info!("computing, {} contractors currently in queue", self.queue.len());
        } else {
            debug!(
                "contracting: {} contractors, {} domains, {} queued",
                self.contractors.len(),
                self.domains.len(),
                self.queue.len()
            );
        }

        self.propagation_loop(start)?;

        if verbose {
            info!("constraint propagation time: {:?}", start.elapsed());
            self.report_emptiness();
        }

        Ok(start.elapsed())
    }

    /// Like [`ContractorNetwork::contract`], but stops once `dt` has
    /// elapsed, leaving the queue in place for a later resumed call.
    pub fn contract_during(
        &mut self,
        dt: Duration,
        verbose: bool,
    ) -> Result<Duration, NetworkError> {
        let previous = self.max_duration;
        self.max_duration = Some(dt);
        let result = self.contract(verbose);
        self.max_duration = previous;
        result
    }

    /// Binds each free variable to a concrete domain, contracts, then
    /// rebinds the variables to themselves, so one network topology can be
    /// solved repeatedly for different inputs.
    pub fn contract_with(
        &mut self,
        bindings: &[(DomainId, DomainId)],
        verbose: bool,
    ) -> Result<Duration, NetworkError> {
        for &(var, target) in bindings {
            if !self.domains[var].is_var() {
                return Err(NetworkError::NotAVariable(var));
            }
            self.check_same_shape(var, target)?;
        }

        for &(var, target) in bindings {
            self.bind_variable(var, target);
        }

        let result = self.contract(verbose);

        for &(var, _) in bindings {
            self.unbind_variable(var);
        }

        result
    }

    /// Deterministic, reproducible alternative to change-driven
    /// propagation: every contractor runs once forward then once backward,
    /// sweeping until no involved domain shrinks beyond the threshold.
    pub fn contract_ordered(&mut self, verbose: bool) -> Result<Duration, NetworkError> {
        self.check_unbound()?;

        let start = Instant::now();

        let order: Vec<ContractorId> = self
            .contractors
            .keys()
            .filter(|&c| self.queue.is_enqueued(c))
            .collect();
        let mut involved = BTreeSet::new();
        for &c in &order {
            involved.extend(self.contractors[c].domains.iter().copied());
        }

        if verbose {
            info!(
                "computing in ordered mode, {} contractors currently in queue",
                order.len()
            );
        } else {
            debug!("contracting in ordered mode: {} contractors", order.len());
        }

        self.iterations = 0;
        if order.is_empty() {
            return Ok(start.elapsed());
        }

        loop {
            self.iterations += 1;

            for &c in &order {
                self.run_contractor(c)?;
            }

            for &d in &involved {
                let volume = self.store.measure(self.domains[d].location);
                self.domains[d].saved_volume = volume;
            }

            // The last forward contractor (now first backward) has just run.
            for &c in order.iter().rev().skip(1) {
                self.run_contractor(c)?;
            }

            let mut fixed_point = true;
            for &d in &involved {
                let current = self.store.measure(self.domains[d].location);
                if current / self.domains[d].saved_volume < 1.0 - self.fixedpoint_ratio {
                    fixed_point = false;
                }
                self.domains[d].saved_volume = current;
            }

            if fixed_point {
                break;
            }
        }

        if verbose {
            self.report_emptiness();
        }
        Ok(start.elapsed())
    }

    /// Restores created domains to their declared initial value and
    /// retriggers every contracting contractor.
    pub fn reset_intermediate_variables(&mut self) {
        for d in self.domains.keys().collect::<Vec<_>>() {
            if let Some(initial) = self.domains[d].initial.clone() {
                self.store.write_root(self.domains[d].location, initial);
            }
        }
        self.trigger_all_contractors();
    }

    /// Clears the queue and re-enqueues every contracting contractor. Used
    /// after external updates of domain values.
    pub fn trigger_all_contractors(&mut self) {
        self.queue.clear();
        for c in self.contractors.keys().collect::<Vec<_>>() {
            if self.contractors[c].is_contracting() {
                self.enqueue(c);
            }
        }
    }

    /// Feeds a timestamped measurement `[x](t) = y` into a tube domain.
    /// Slices whose tdomain is fully covered by the samples are contracted
    /// with the linear-interpolation hull of the measurements, and the
    /// change is propagated through the graph on the next contraction.
    pub fn add_data(&mut self, tube: DomainId, t: f64, y: Interval) -> Result<(), NetworkError> {
        let kind = self.domains[tube].kind();
        if kind != DomainKind::Tube {
            return Err(NetworkError::KindMismatch {
                expected: DomainKind::Tube,
                actual: kind,
            });
        }

        let feed = self.feeds.entry(tube).or_default();
        if let Some(&(last, _)) = feed.samples.last() {
            if t <= last {
                return Err(NetworkError::DataOutOfOrder(t));
            }
        }
        feed.samples.push((t, y));
        let samples = feed.samples.clone();
        let mut next_slice = feed.next_slice;

        let location = self.domains[tube].location;
        let nslices = self.store.tube_ref(location).nslices();
        let first_t = samples[0].0;

        let mut contracted = Vec::new();
        while next_slice < nslices {
            let tdomain = self.store.tube_ref(location).slice_tdomain(next_slice);
            if tdomain.ub() > t {
                break;
            }
            if tdomain.lb() >= first_t {
                self.contract_slice_with_data(location, next_slice, &samples);
                contracted.push(next_slice);
            }
            next_slice += 1;
        }

        self.feeds
            .get_mut(&tube)
            .expect("the feed was just inserted")
            .next_slice = next_slice;

        for k in contracted {
            let slice = self.slice_of(location, k as u32);
            self.note_external_change(slice);
        }
        Ok(())
    }

    // Configuration & introspection.

    /// Sets the relative-shrink ratio under which a domain is considered
    /// unchanged. 0 propagates down to floating-point precision; 0.1 only
    /// propagates contractions of more than 10%. Recurses into nested
    /// networks.
    pub fn set_fixedpoint_ratio(&mut self, ratio: f64) -> Result<(), NetworkError> {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(NetworkError::InvalidRatio(ratio));
        }
        self.fixedpoint_ratio = ratio;
        for contractor in self.contractors.iter_mut() {
            if let ContractorKind::Network(nested) = &mut contractor.kind {
                nested.network.set_fixedpoint_ratio(ratio)?;
            }
        }
        Ok(())
    }

    pub fn fixedpoint_ratio(&self) -> f64 {
        self.fixedpoint_ratio
    }

    pub fn set_trigger_policy(&mut self, policy: TriggerPolicy) {
        self.policy = policy;
    }

    pub fn trigger_policy(&self) -> TriggerPolicy {
        self.policy
    }

    pub fn num_domains(&self) -> usize {
        self.domains.len()
    }

    pub fn num_contractors(&self) -> usize {
        self.contractors.len()
    }

    /// The number of contractors waiting for process; zero once a fixed
    /// point has been reached.
    pub fn num_queued(&self) -> usize {
        self.queue.len()
    }

    /// The number of forward/backward sweeps of the last
    /// [`ContractorNetwork::contract_ordered`] call.
    pub fn iteration_count(&self) -> usize {
        self.iterations
    }

    /// Whether any domain of the graph is currently empty. Emptiness is a
    /// valid outcome (the constraint system is infeasible), not an error.
    pub fn has_empty_domain(&self) -> bool {
        self.domains
            .keys()
            .any(|d| self.store.is_empty(self.domains[d].location))
    }

    pub fn set_domain_name(&mut self, domain: DomainId, name: &str) {
        self.domains[domain].name = Some(name.to_owned());
    }

    pub fn set_contractor_name(&mut self, contractor: ContractorId, name: &str) {
        self.contractors[contractor].name = Some(name.to_owned());
    }

    // Value access.

    pub fn kind(&self, domain: DomainId) -> DomainKind {
        self.domains[domain].kind()
    }

    pub fn interval(&self, domain: DomainId) -> Interval {
        match self.store.read(self.domains[domain].location) {
            DomainValue::Interval(i) => i,
            value => panic!("{domain} holds a {:?}, not a scalar", value.kind()),
        }
    }

    pub fn vector(&self, domain: DomainId) -> IntervalVector {
        match self.store.read(self.domains[domain].location) {
            DomainValue::Vector(v) => v,
            value => panic!("{domain} holds a {:?}, not a box", value.kind()),
        }
    }

    pub fn slice_view(&self, domain: DomainId) -> SliceView {
        match self.store.read(self.domains[domain].location) {
            DomainValue::Slice(view) => view,
            value => panic!("{domain} holds a {:?}, not a time slice", value.kind()),
        }
    }

    pub fn tube(&self, domain: DomainId) -> Tube {
        match self.store.read(self.domains[domain].location) {
            DomainValue::Tube(t) => t,
            value => panic!("{domain} holds a {:?}, not a tube", value.kind()),
        }
    }

    pub fn tube_vector(&self, domain: DomainId) -> TubeVector {
        match self.store.read(self.domains[domain].location) {
            DomainValue::TubeVector(tv) => tv,
            value => panic!("{domain} holds a {:?}, not a tube vector", value.kind()),
        }
    }

    /// Overwrites a scalar domain value. Only meaningful between
    /// contractions; widening a domain requires retriggering (see
    /// [`ContractorNetwork::trigger_all_contractors`]).
    pub fn set_interval(&mut self, domain: DomainId, value: Interval) {
        let location = self.domains[domain].location;
        cornet_assert_eq_simple!(location.kind(), DomainKind::Scalar);
        self.store.write(location, DomainValue::Interval(value));
    }

    pub fn set_vector(&mut self, domain: DomainId, value: IntervalVector) {
        let location = self.domains[domain].location;
        cornet_assert_eq_simple!(location.kind(), DomainKind::Vector);
        cornet_assert_eq_simple!(self.store.vector_dim(location), value.dim());
        self.store.write(location, DomainValue::Vector(value));
    }

    // Internals: graph construction.

    fn insert_domain(&mut self, location: Location) -> DomainId {
        if let Some(&existing) = self.by_location.get(&location) {
            return existing;
        }

        let id = self.domains.push(Domain::new(location));
        let _ = self.by_location.insert(location, id);

        match location {
            Location::Interval(_)
            | Location::VectorComponent(..)
            | Location::TubeSlice(..)
            | Location::TubeVectorSlice(..) => {}

            Location::Vector(slot) => {
                let dim = self.store.vector_dim(location) as u32;
                let mut linked = vec![id];
                for i in 0..dim {
                    linked.push(self.insert_domain(Location::VectorComponent(slot, i)));
                }
                self.add_structural(linked);
            }

            Location::Tube(_) | Location::TubeVectorTube(..) => {
                let nslices = self.store.tube_ref(location).nslices() as u32;
                let mut slices = Vec::new();
                for k in 0..nslices {
                    let slice_location = match location {
                        Location::Tube(slot) => Location::TubeSlice(slot, k),
                        Location::TubeVectorTube(slot, i) => Location::TubeVectorSlice(slot, i, k),
                        _ => unreachable!(),
                    };
                    slices.push(self.insert_domain(slice_location));
                }
                let mut linked = vec![id];
                linked.extend_from_slice(&slices);
                self.add_structural(linked);
                // Adjacent slices share a gate.
                for pair in slices.windows(2) {
                    self.add_structural(vec![pair[0], pair[1]]);
                }
            }

            Location::TubeVector(slot) => {
                let size = self.store.tube_vector_ref(location).size() as u32;
                let mut linked = vec![id];
                for i in 0..size {
                    linked.push(self.insert_domain(Location::TubeVectorTube(slot, i)));
                }
                self.add_structural(linked);
            }
        }

        id
    }

    fn add_structural(&mut self, domains: Vec<DomainId>) {
        let _ = self.add_node(ContractorKind::Structural, domains);
    }

    fn add_node(&mut self, kind: ContractorKind, domains: Vec<DomainId>) -> ContractorId {
        let key = ContractorKey::of(&kind, &domains);
        if let Some(key) = &key {
            if let Some(&existing) = self.dedup.get(key) {
                return existing;
            }
        }

        let id = self.contractors.push(Contractor::new(kind, domains));
        if let Some(key) = key {
            let _ = self.dedup.insert(key, id);
        }

        for d in self.contractors[id].domains.clone() {
            self.domains[d].add_contractor(id);
        }

        self.enqueue(id);
        id
    }

    fn enqueue(&mut self, contractor: ContractorId) {
        if self.queue.is_enqueued(contractor) {
            return;
        }
        if let ContractorKind::Network(nested) = &mut self.contractors[contractor].kind {
            // A change at the boundary can invalidate any internal fixed
            // point.
            nested.network.trigger_all_contractors();
        }
        if self.contractors[contractor].is_contracting() {
            self.queue.push_front(contractor);
        } else {
            self.queue.push_back(contractor);
        }
    }

    fn component_of(&self, location: Location, i: u32) -> DomainId {
        match location {
            Location::Vector(slot) => self.by_location[&Location::VectorComponent(slot, i)],
            _ => unreachable!("not a vector location: {location:?}"),
        }
    }

    fn slice_of(&self, location: Location, k: u32) -> DomainId {
        match location {
            Location::Tube(slot) => self.by_location[&Location::TubeSlice(slot, k)],
            Location::TubeVectorTube(slot, i) => {
                self.by_location[&Location::TubeVectorSlice(slot, i, k)]
            }
            _ => unreachable!("not a tube location: {location:?}"),
        }
    }

    fn check_same_slicing(&self, domains: &[DomainId]) -> Result<usize, NetworkError> {
        let mut reference: Option<&Tube> = None;
        for &d in domains {
            let location = self.domains[d].location;
            let tubes: Vec<&Tube> = match self.domains[d].kind() {
                DomainKind::Tube => vec![self.store.tube_ref(location)],
                DomainKind::TubeVector => self.store.tube_vector_ref(location).iter().collect(),
                _ => continue,
            };
            for tube in tubes {
                match reference {
                    None => reference = Some(tube),
                    Some(r) => {
                        if !r.same_slicing(tube) {
                            return Err(NetworkError::SlicingMismatch);
                        }
                    }
                }
            }
        }
        Ok(reference.map_or(0, Tube::nslices))
    }

    fn check_same_shape(&self, a: DomainId, b: DomainId) -> Result<(), NetworkError> {
        let (kind_a, kind_b) = (self.domains[a].kind(), self.domains[b].kind());
        if kind_a != kind_b {
            return Err(NetworkError::KindMismatch {
                expected: kind_a,
                actual: kind_b,
            });
        }

        let (loc_a, loc_b) = (self.domains[a].location, self.domains[b].location);
        match kind_a {
            DomainKind::Scalar | DomainKind::TimeSlice => {}
            DomainKind::Vector => {
                let expected = self.store.vector_dim(loc_a);
                let actual = self.store.vector_dim(loc_b);
                if expected != actual {
                    return Err(NetworkError::DimensionMismatch { expected, actual });
                }
            }
            DomainKind::Tube => {
                if !self
                    .store
                    .tube_ref(loc_a)
                    .same_slicing(self.store.tube_ref(loc_b))
                {
                    return Err(NetworkError::SlicingMismatch);
                }
            }
            DomainKind::TubeVector => {
                let (va, vb) = (
                    self.store.tube_vector_ref(loc_a),
                    self.store.tube_vector_ref(loc_b),
                );
                if va.size() != vb.size() {
                    return Err(NetworkError::DimensionMismatch {
                        expected: va.size(),
                        actual: vb.size(),
                    });
                }
                if !va[0].same_slicing(&vb[0]) {
                    return Err(NetworkError::SlicingMismatch);
                }
            }
        }
        Ok(())
    }

    // Internals: propagation.

    fn check_unbound(&self) -> Result<(), NetworkError> {
        for d in self.domains.keys() {
            if self.domains[d].is_unbound_var() {
                return Err(NetworkError::UnboundVariable(d));
            }
        }
        Ok(())
    }

    fn propagation_loop(&mut self, start: Instant) -> Result<(), NetworkError> {
        while !self.queue.is_empty() {
            if self
                .max_duration
                .is_some_and(|budget| start.elapsed() >= budget)
            {
                debug!(
                    "time budget exhausted, {} contractors left in queue",
                    self.queue.len()
                );
                break;
            }

            let Some(contractor) = self.queue.pop() else {
                break;
            };
            cornet_assert_advanced!(!self.queue.is_enqueued(contractor));
            self.contractors[contractor].pending.clear();
            let touched = self.contractors[contractor].domains.clone();

            match self.policy {
                TriggerPolicy::VolumeRatio => {
                    self.run_contractor(contractor)?;
                    for &d in &touched {
                        self.trigger_by_ratio(d, Some(contractor));
                    }
                }
                TriggerPolicy::ChangeSpan => {
                    let before: Vec<DomainValue> = touched
                        .iter()
                        .map(|&d| self.store.read(self.domains[d].location))
                        .collect();
                    self.run_contractor(contractor)?;
                    let mut spans = Vec::new();
                    for (&d, before) in touched.iter().zip(before.iter()) {
                        self.collect_spans(d, before, &mut spans);
                    }
                    for (d, span) in spans {
                        self.activate_with_span(d, &span, Some(contractor));
                    }
                }
            }
        }
        Ok(())
    }

    fn run_contractor(&mut self, contractor: ContractorId) -> Result<(), NetworkError> {
        enum Action {
            Nothing,
            Equality,
            Static(Rc<dyn Ctc>),
            Dynamic(Rc<dyn DynCtc>),
            Nested,
        }

        let action = match &self.contractors[contractor].kind {
            ContractorKind::Structural => Action::Nothing,
            ContractorKind::Equality => Action::Equality,
            ContractorKind::Static(op) => Action::Static(Rc::clone(op)),
            ContractorKind::Dynamic(op) => Action::Dynamic(Rc::clone(op)),
            ContractorKind::Network(_) => Action::Nested,
        };
        let domains = self.contractors[contractor].domains.clone();

        match action {
            Action::Nothing => {}
            Action::Equality => self.run_equality(domains[0], domains[1]),
            Action::Static(op) => self.run_static(&op, &domains),
            Action::Dynamic(op) => self.run_dynamic(&op, &domains),
            Action::Nested => self.run_nested(contractor)?,
        }
        Ok(())
    }

    fn run_equality(&mut self, a: DomainId, b: DomainId) {
        cornet_assert_moderate!(self.domains[a].kind() == self.domains[b].kind());
        let (loc_a, loc_b) = (self.domains[a].location, self.domains[b].location);
        let intersection = self.store.read(loc_a).intersect(&self.store.read(loc_b));
        self.store.write(loc_a, intersection.clone());
        self.store.write(loc_b, intersection);
    }

    fn run_static(&mut self, op: &Rc<dyn Ctc>, domains: &[DomainId]) {
        // Case: all components in one vector box.
        if domains.len() == 1 && self.domains[domains[0]].kind() == DomainKind::Vector {
            let location = self.domains[domains[0]].location;
            let DomainValue::Vector(current) = self.store.read(location) else {
                unreachable!()
            };
            let mut narrowed = current.clone();
            op.contract(&mut narrowed);
            self.store
                .write(location, DomainValue::Vector(&current & &narrowed));
            return;
        }

        // Case: list of heterogeneous components. A slice contributes its
        // envelope and both gates as up to three separate passes.
        cornet_assert_eq_simple!(domains.len(), op.dim());
        for pass in 0..3 {
            let mut involves_slice = false;
            let mut x = IntervalVector::new(op.dim());

            for (i, &d) in domains.iter().enumerate() {
                x[i] = match self.store.read(self.domains[d].location) {
                    DomainValue::Interval(interval) => interval,
                    DomainValue::Slice(view) => {
                        involves_slice = true;
                        match pass {
                            0 => view.envelope,
                            1 => view.input_gate,
                            _ => view.output_gate,
                        }
                    }
                    value => unreachable!("static contractor over a {:?} domain", value.kind()),
                };
            }

            op.contract(&mut x);

            for (i, &d) in domains.iter().enumerate() {
                let location = self.domains[d].location;
                match self.store.read(location) {
                    DomainValue::Interval(interval) => {
                        self.store
                            .write(location, DomainValue::Interval(interval & x[i]));
                    }
                    DomainValue::Slice(mut view) => {
                        match pass {
                            0 => view.envelope = view.envelope & x[i],
                            1 => view.input_gate = view.input_gate & x[i],
                            _ => view.output_gate = view.output_gate & x[i],
                        }
                        self.store.write(location, DomainValue::Slice(view));
                    }
                    _ => unreachable!(),
                }
            }

            if !involves_slice {
                break;
            }
        }
    }

    fn run_dynamic(&mut self, op: &Rc<dyn DynCtc>, domains: &[DomainId]) {
        let locations: Vec<Location> = domains.iter().map(|&d| self.domains[d].location).collect();

        let all_slices = domains
            .iter()
            .all(|&d| self.domains[d].kind() == DomainKind::TimeSlice);

        if all_slices {
            let current: Vec<SliceView> = locations
                .iter()
                .map(|&l| match self.store.read(l) {
                    DomainValue::Slice(view) => view,
                    _ => unreachable!(),
                })
                .collect();
            let mut narrowed = current.clone();
            op.contract_slices(&mut narrowed);
            for ((&location, narrowed), current) in
                locations.iter().zip(narrowed).zip(current)
            {
                let value =
                    DomainValue::Slice(current).intersect(&DomainValue::Slice(narrowed));
                self.store.write(location, value);
            }
        } else {
            // Intertemporal: the operator sees whole tubes.
            let current: Vec<Tube> = locations
                .iter()
                .map(|&l| self.store.tube_ref(l).clone())
                .collect();
            let mut narrowed = current.clone();
            op.contract_tubes(&mut narrowed);
            for ((&location, narrowed), current) in
                locations.iter().zip(narrowed.iter()).zip(current.iter())
            {
                self.store
                    .write(location, DomainValue::Tube(intersect_tubes(current, narrowed)));
            }
        }
    }

    fn run_nested(&mut self, contractor: ContractorId) -> Result<(), NetworkError> {
        let ContractorKind::Network(mut nested) = std::mem::replace(
            &mut self.contractors[contractor].kind,
            ContractorKind::Structural,
        ) else {
            unreachable!("not a nested-network contractor")
        };

        let result = self.run_nested_inner(&mut nested);
        self.contractors[contractor].kind = ContractorKind::Network(nested);
        result
    }

    fn run_nested_inner(&mut self, nested: &mut NestedNetwork) -> Result<(), NetworkError> {
        for &(outer, inner) in &nested.bindings {
            let outer_value = self.store.read(self.domains[outer].location);
            let inner_location = nested.network.domains[inner].location;
            let inner_value = nested.network.store.read(inner_location);
            nested
                .network
                .store
                .write(inner_location, inner_value.intersect(&outer_value));
        }

        nested.network.trigger_all_contractors();
        let _ = nested.network.contract(false)?;

        for &(outer, inner) in &nested.bindings {
            let inner_value = nested
                .network
                .store
                .read(nested.network.domains[inner].location);
            let outer_location = self.domains[outer].location;
            let outer_value = self.store.read(outer_location);
            self.store
                .write(outer_location, outer_value.intersect(&inner_value));
        }
        Ok(())
    }

    /// Ratio-based change detection: if the domain shrank beyond the
    /// threshold, every other contractor referencing it is activated. The
    /// measurement recurses into the components of composite domains.
    fn trigger_by_ratio(&mut self, domain: DomainId, popped: Option<ContractorId>) {
        let current = self.store.measure(self.domains[domain].location);
        let saved = self.domains[domain].saved_volume;

        if !self.domains[domain].constant && current / saved < 1.0 - self.fixedpoint_ratio {
            self.activate_contractors_of(domain, popped);
        }
        self.domains[domain].saved_volume = current;

        match self.domains[domain].location {
            Location::Vector(slot) => {
                let dim = self.store.vector_dim(Location::Vector(slot)) as u32;
                for i in 0..dim {
                    let component = self.by_location[&Location::VectorComponent(slot, i)];
                    self.trigger_by_ratio(component, popped);
                }
            }
            Location::TubeVector(slot) => {
                let size = self
                    .store
                    .tube_vector_ref(Location::TubeVector(slot))
                    .size() as u32;
                for i in 0..size {
                    let component = self.by_location[&Location::TubeVectorTube(slot, i)];
                    self.trigger_by_ratio(component, popped);
                }
            }
            _ => {}
        }
    }

    fn activate_contractors_of(&mut self, domain: DomainId, popped: Option<ContractorId>) {
        for contractor in self.domains[domain].contractors.clone() {
            if Some(contractor) == popped {
                continue;
            }
            self.enqueue(contractor);
        }
    }

    fn activate_with_span(
        &mut self,
        domain: DomainId,
        span: &Span,
        popped: Option<ContractorId>,
    ) {
        if span.is_empty() {
            return;
        }
        for contractor in self.domains[domain].contractors.clone() {
            if Some(contractor) == popped {
                continue;
            }
            self.enqueue(contractor);
            self.contractors[contractor].merge_pending(domain, span);
        }
    }

    /// Computes the span of `domain` against its snapshot and derives the
    /// spans of the structurally related domains (parents, components,
    /// gate-sharing neighbour slices).
    fn collect_spans(
        &self,
        domain: DomainId,
        before: &DomainValue,
        out: &mut Vec<(DomainId, Span)>,
    ) {
        if self.domains[domain].constant || self.domains[domain].is_unbound_var() {
            return;
        }

        let location = self.domains[domain].location;
        let after = self.store.read(location);
        let span = Span::diff(before, &after);
        if span.is_empty() {
            return;
        }
        out.push((domain, span.clone()));

        match location {
            Location::Interval(_) => {}

            Location::VectorComponent(slot, i) => {
                if let Some(&parent) = self.by_location.get(&Location::Vector(slot)) {
                    out.push((parent, Span::Indices(vec![i])));
                }
            }

            Location::Vector(slot) => {
                let Span::Indices(indices) = &span else {
                    unreachable!()
                };
                for &i in indices {
                    if let Some(&component) =
                        self.by_location.get(&Location::VectorComponent(slot, i))
                    {
                        out.push((component, Span::Whole));
                    }
                }
            }

            Location::TubeSlice(..) | Location::TubeVectorSlice(..) => {
                let (DomainValue::Slice(b), DomainValue::Slice(a)) = (before, &after) else {
                    unreachable!()
                };
                let (parent_location, k) = match location {
                    Location::TubeSlice(slot, k) => (Location::Tube(slot), k),
                    Location::TubeVectorSlice(slot, i, k) => {
                        (Location::TubeVectorTube(slot, i), k)
                    }
                    _ => unreachable!(),
                };

                let mut marked = vec![k];
                if b.input_gate != a.input_gate && k > 0 {
                    marked.push(k - 1);
                    self.push_slice_span(parent_location, k - 1, out);
                }
                let nslices = self.store.tube_ref(parent_location).nslices() as u32;
                if b.output_gate != a.output_gate && k + 1 < nslices {
                    marked.push(k + 1);
                    self.push_slice_span(parent_location, k + 1, out);
                }

                if let Some(&parent) = self.by_location.get(&parent_location) {
                    out.push((parent, Span::indices(marked)));
                }
                if let Location::TubeVectorSlice(slot, i, _) = location {
                    if let Some(&grandparent) = self.by_location.get(&Location::TubeVector(slot)) {
                        out.push((grandparent, Span::Indices(vec![i])));
                    }
                }
            }

            Location::Tube(_) | Location::TubeVectorTube(..) => {
                let Span::Indices(slices) = &span else {
                    unreachable!()
                };
                for &k in slices {
                    self.push_slice_span(location, k, out);
                }
                if let Location::TubeVectorTube(slot, i) = location {
                    if let Some(&parent) = self.by_location.get(&Location::TubeVector(slot)) {
                        out.push((parent, Span::Indices(vec![i])));
                    }
                }
            }

            Location::TubeVector(slot) => {
                let (DomainValue::TubeVector(b), DomainValue::TubeVector(a)) = (before, &after)
                else {
                    unreachable!()
                };
                let Span::Indices(components) = &span else {
                    unreachable!()
                };
                for &i in components {
                    let tube_span = Span::diff(
                        &DomainValue::Tube(b[i as usize].clone()),
                        &DomainValue::Tube(a[i as usize].clone()),
                    );
                    if let Span::Indices(slices) = &tube_span {
                        for &k in slices {
                            if let Some(&slice) = self
                                .by_location
                                .get(&Location::TubeVectorSlice(slot, i, k))
                            {
                                out.push((slice, Span::Whole));
                            }
                        }
                    }
                    if let Some(&tube) = self.by_location.get(&Location::TubeVectorTube(slot, i)) {
                        out.push((tube, tube_span));
                    }
                }
            }
        }
    }

    fn push_slice_span(
        &self,
        parent_location: Location,
        k: u32,
        out: &mut Vec<(DomainId, Span)>,
    ) {
        let slice_location = match parent_location {
            Location::Tube(slot) => Location::TubeSlice(slot, k),
            Location::TubeVectorTube(slot, i) => Location::TubeVectorSlice(slot, i, k),
            _ => unreachable!(),
        };
        if let Some(&slice) = self.by_location.get(&slice_location) {
            out.push((slice, Span::Whole));
        }
    }

    /// Direct sub-domains of a composite domain.
    fn sub_domains(&self, domain: DomainId) -> Vec<DomainId> {
        let location = self.domains[domain].location;
        let mut subs = Vec::new();
        match location {
            Location::Vector(slot) => {
                for i in 0..self.store.vector_dim(location) as u32 {
                    subs.push(self.by_location[&Location::VectorComponent(slot, i)]);
                }
            }
            Location::Tube(_) | Location::TubeVectorTube(..) => {
                for k in 0..self.store.tube_ref(location).nslices() as u32 {
                    subs.push(self.slice_of(location, k));
                }
            }
            Location::TubeVector(slot) => {
                for i in 0..self.store.tube_vector_ref(location).size() as u32 {
                    subs.push(self.by_location[&Location::TubeVectorTube(slot, i)]);
                }
            }
            _ => {}
        }
        subs
    }

    /// Registers an out-of-loop value change (a data feed, a rebinding).
    fn note_external_change(&mut self, domain: DomainId) {
        match self.policy {
            TriggerPolicy::VolumeRatio => self.trigger_by_ratio(domain, None),
            TriggerPolicy::ChangeSpan => self.mark_changed_recursive(domain),
        }
    }

    fn mark_changed_recursive(&mut self, domain: DomainId) {
        self.activate_with_span(domain, &Span::Whole, None);
        for sub in self.sub_domains(domain) {
            self.mark_changed_recursive(sub);
        }
    }

    fn bind_variable(&mut self, var: DomainId, target: DomainId) {
        let home = self.domains[var].home.expect("checked: a free variable");
        let target_location = self.domains[target].location;
        self.domains[var].location = target_location;

        // The variable's own component nodes carry the contractor
        // back-references, so the change is registered on them, not on the
        // target's components.
        let mut rebound = vec![var];
        if let (Location::Vector(home_slot), Location::Vector(target_slot)) =
            (home, target_location)
        {
            for i in 0..self.store.vector_dim(home) as u32 {
                let component = self.by_location[&Location::VectorComponent(home_slot, i)];
                self.domains[component].location = Location::VectorComponent(target_slot, i);
                rebound.push(component);
            }
        }

        for domain in rebound {
            self.note_external_change(domain);
        }
    }

    fn unbind_variable(&mut self, var: DomainId) {
        let home = self.domains[var].home.expect("a free variable");
        self.domains[var].location = home;
        // The unbound measure is saved so that the next binding registers
        // as a change.
        self.domains[var].saved_volume = self.store.measure(home);

        if let Location::Vector(home_slot) = home {
            for i in 0..self.store.vector_dim(home) as u32 {
                let component_location = Location::VectorComponent(home_slot, i);
                let component = self.by_location[&component_location];
                self.domains[component].location = component_location;
                self.domains[component].saved_volume = self.store.measure(component_location);
            }
        }
    }

    fn contract_slice_with_data(
        &mut self,
        location: Location,
        k: usize,
        samples: &[(f64, Interval)],
    ) {
        let tdomain = self.store.tube_ref(location).slice_tdomain(k);

        let entry = sample_value_at(samples, tdomain.lb());
        let exit = sample_value_at(samples, tdomain.ub());
        let mut hull = entry | exit;
        for &(ts, y) in samples {
            if tdomain.lb() <= ts && ts <= tdomain.ub() {
                hull = hull | y;
            }
        }

        let slice_location = match location {
            Location::Tube(slot) => Location::TubeSlice(slot, k as u32),
            Location::TubeVectorTube(slot, i) => Location::TubeVectorSlice(slot, i, k as u32),
            _ => unreachable!(),
        };
        let DomainValue::Slice(mut view) = self.store.read(slice_location) else {
            unreachable!()
        };
        view.envelope = view.envelope & hull;
        view.input_gate = view.input_gate & entry;
        view.output_gate = view.output_gate & exit;
        self.store.write(slice_location, DomainValue::Slice(view));
    }

    fn report_emptiness(&self) {
        if self.has_empty_domain() {
            warn!("empty set: the constraint system has no solution in the explored region");
        }
    }
}

/// Envelope of the measured signal at `t`, assuming linear interpolation
/// between consecutive samples (as the original trajectory envelopes do).
fn sample_value_at(samples: &[(f64, Interval)], t: f64) -> Interval {
    match samples.iter().position(|&(ts, _)| ts >= t) {
        None => Interval::ALL_REALS,
        Some(0) => {
            if samples[0].0 == t {
                samples[0].1
            } else {
                Interval::ALL_REALS
            }
        }
        Some(j) => {
            let (t0, y0) = samples[j - 1];
            let (t1, y1) = samples[j];
            let alpha = (t - t0) / (t1 - t0);
            y0 + (y1 - y0) * Interval::point(alpha)
        }
    }
}

impl fmt::Display for ContractorNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ContractorNetwork: {} contractors, {} domains ({} queued)",
            self.contractors.len(),
            self.domains.len(),
            self.queue.len()
        )?;
        for d in self.domains.keys() {
            if let Some(name) = &self.domains[d].name {
                writeln!(f, "  {d}: {name} ({:?})", self.domains[d].kind())?;
            }
        }
        for c in self.contractors.keys() {
            let contractor = &self.contractors[c];
            if contractor.name.is_some() {
                writeln!(
                    f,
                    "  {c}: {} ({} domains)",
                    contractor.op_name(),
                    contractor.domains.len()
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::contractors::CtcFn;
    use crate::contractors::CtcSum;

    fn sum() -> Rc<dyn Ctc> {
        Rc::new(CtcSum)
    }

    /// A dim-1 no-op contractor counting its invocations.
    fn counter(count: &Rc<Cell<usize>>) -> Rc<dyn Ctc> {
        let count = Rc::clone(count);
        Rc::new(CtcFn::named("count", 1, move |_| {
            count.set(count.get() + 1);
        }))
    }

    /// A dim-1 contractor cutting `fraction` of the diameter per call.
    fn shrinker(fraction: f64) -> Rc<dyn Ctc> {
        Rc::new(CtcFn::named("shrink", 1, move |x: &mut IntervalVector| {
            let i = x[0];
            x[0] = Interval::new(i.lb(), i.ub() - fraction * i.diam());
        }))
    }

    #[test]
    fn most_simple_case() {
        let mut cn = ContractorNetwork::new();
        let a = cn.create_interval(Interval::new(0.0, 1.0));
        let b = cn.create_interval(Interval::new(-1.0, 1.0));
        let c = cn.create_interval(Interval::new(1.5, 2.0));

        cn.add_static(&sum(), &[a, b, c]).unwrap();
        let _ = cn.contract(false).unwrap();

        assert_eq!(cn.interval(a), Interval::new(0.5, 1.0));
        assert_eq!(cn.interval(b), Interval::new(0.5, 1.0));
        assert_eq!(cn.interval(c), Interval::new(1.5, 2.0));

        assert_eq!(cn.num_domains(), 3);
        assert_eq!(cn.num_contractors(), 1);
        assert_eq!(cn.num_queued(), 0);
    }

    #[test]
    fn equality_intersects_both_sides() {
        let mut cn = ContractorNetwork::new();
        let a = cn.create_interval(Interval::new(2.0, 4.0));
        let b = cn.create_interval(Interval::new(3.0, 5.0));

        let _ = cn.add_equality(a, b).unwrap();
        let _ = cn.contract(false).unwrap();

        assert_eq!(cn.interval(a), Interval::new(3.0, 4.0));
        assert_eq!(cn.interval(b), Interval::new(3.0, 4.0));
    }

    #[test]
    fn redundant_contractors_are_not_added() {
        let mut cn = ContractorNetwork::new();
        let a = cn.create_interval(Interval::new(0.0, 1.0));
        let b = cn.create_interval(Interval::new(0.0, 1.0));
        let c = cn.create_interval(Interval::new(0.0, 2.0));

        let op = sum();
        cn.add_static(&op, &[a, b, c]).unwrap();
        cn.add_static(&op, &[a, b, c]).unwrap();
        cn.add_static(&op, &[a, b, c]).unwrap();
        assert_eq!(cn.num_contractors(), 1);

        // A different operator instance is a different contractor.
        cn.add_static(&sum(), &[a, b, c]).unwrap();
        assert_eq!(cn.num_contractors(), 2);

        let _ = cn.add_equality(a, b).unwrap();
        let _ = cn.add_equality(b, a).unwrap();
        assert_eq!(cn.num_contractors(), 3);
    }

    #[test]
    fn fixed_point_is_idempotent() {
        let count = Rc::new(Cell::new(0));

        let mut cn = ContractorNetwork::new();
        let a = cn.create_interval(Interval::new(0.0, 1.0));
        let b = cn.create_interval(Interval::new(-1.0, 1.0));
        let c = cn.create_interval(Interval::new(1.5, 2.0));
        cn.add_static(&sum(), &[a, b, c]).unwrap();
        cn.add_static(&counter(&count), &[a]).unwrap();

        let _ = cn.contract(false).unwrap();
        let after_first = (cn.interval(a), count.get());

        let _ = cn.contract(false).unwrap();
        assert_eq!(cn.interval(a), after_first.0);
        assert_eq!(count.get(), after_first.1);
        assert_eq!(cn.num_queued(), 0);
    }

    #[test]
    fn small_shrinks_do_not_retrigger_dependents() {
        let count = Rc::new(Cell::new(0));

        let mut cn = ContractorNetwork::new();
        let a = cn.create_interval(Interval::new(0.0, 10.0));
        cn.add_static(&counter(&count), &[a]).unwrap();
        let _ = cn.contract(false).unwrap();
        assert_eq!(count.get(), 1);

        cn.set_fixedpoint_ratio(0.5).unwrap();
        cn.add_static(&shrinker(0.1), &[a]).unwrap();
        let _ = cn.contract(false).unwrap();

        // 10% of shrink is under the 50% threshold.
        assert_eq!(count.get(), 1);
        assert_eq!(cn.interval(a), Interval::new(0.0, 9.0));
    }

    #[test]
    fn large_shrinks_retrigger_dependents() {
        let count = Rc::new(Cell::new(0));

        let mut cn = ContractorNetwork::new();
        let a = cn.create_interval(Interval::new(0.0, 10.0));
        cn.add_static(&counter(&count), &[a]).unwrap();
        let _ = cn.contract(false).unwrap();
        assert_eq!(count.get(), 1);

        cn.set_fixedpoint_ratio(0.5).unwrap();
        cn.add_static(&shrinker(0.6), &[a]).unwrap();
        let _ = cn.contract(false).unwrap();

        assert_eq!(count.get(), 2);
        assert_eq!(cn.interval(a), Interval::new(0.0, 4.0));
    }

    #[test]
    fn span_mode_skips_untouched_components() {
        let count_0 = Rc::new(Cell::new(0));
        let count_1 = Rc::new(Cell::new(0));

        let mut cn = ContractorNetwork::with_policy(TriggerPolicy::ChangeSpan);
        let v = cn.create_vector(IntervalVector::from([
            Interval::new(2.0, 4.0),
            Interval::new(12.0, 14.0),
        ]));
        let w = cn.create_vector(IntervalVector::from([
            Interval::new(2.0, 4.0),
            Interval::new(13.0, 15.0),
        ]));
        let v0 = cn.component(v, 0);
        let v1 = cn.component(v, 1);
        cn.add_static(&counter(&count_0), &[v0]).unwrap();
        cn.add_static(&counter(&count_1), &[v1]).unwrap();
        let _ = cn.contract(false).unwrap();
        assert_eq!((count_0.get(), count_1.get()), (1, 1));

        let _ = cn.add_equality(v, w).unwrap();
        let _ = cn.contract(false).unwrap();

        // Only component 1 changed; the contractor on component 0 stays
        // asleep.
        assert_eq!(cn.vector(v)[1], Interval::new(13.0, 14.0));
        assert_eq!((count_0.get(), count_1.get()), (1, 2));
    }

    #[test]
    fn ratio_mode_component_recursion_scopes_triggering() {
        let count_0 = Rc::new(Cell::new(0));
        let count_1 = Rc::new(Cell::new(0));

        let mut cn = ContractorNetwork::new();
        let v = cn.create_vector(IntervalVector::from([
            Interval::new(2.0, 4.0),
            Interval::new(12.0, 14.0),
        ]));
        let w = cn.create_vector(IntervalVector::from([
            Interval::new(2.0, 4.0),
            Interval::new(13.0, 15.0),
        ]));
        let v0 = cn.component(v, 0);
        let v1 = cn.component(v, 1);
        cn.add_static(&counter(&count_0), &[v0]).unwrap();
        cn.add_static(&counter(&count_1), &[v1]).unwrap();
        let _ = cn.contract(false).unwrap();

        let _ = cn.add_equality(v, w).unwrap();
        let _ = cn.contract(false).unwrap();

        assert_eq!((count_0.get(), count_1.get()), (1, 2));
    }

    #[test]
    fn unbound_variables_are_rejected() {
        let mut cn = ContractorNetwork::new();
        let x = cn.create_interval_var();
        let b = cn.create_interval(Interval::new(-1.0, 1.0));
        let c = cn.create_interval(Interval::new(1.5, 2.0));
        cn.add_static(&sum(), &[x, b, c]).unwrap();

        assert_eq!(cn.contract(false), Err(NetworkError::UnboundVariable(x)));
    }

    #[test]
    fn only_variables_can_be_rebound() {
        let mut cn = ContractorNetwork::new();
        let a = cn.create_interval(Interval::new(0.0, 1.0));
        let b = cn.create_interval(Interval::new(0.0, 1.0));

        assert_eq!(
            cn.contract_with(&[(a, b)], false),
            Err(NetworkError::NotAVariable(a))
        );
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let mut cn = ContractorNetwork::new();
        let i = cn.create_interval(Interval::new(0.0, 1.0));
        let v2 = cn.create_vector(IntervalVector::new(2));
        let v3 = cn.create_vector(IntervalVector::new(3));

        assert_eq!(
            cn.add_equality(i, v2),
            Err(NetworkError::KindMismatch {
                expected: DomainKind::Scalar,
                actual: DomainKind::Vector,
            })
        );
        assert_eq!(
            cn.add_equality(v2, v3),
            Err(NetworkError::DimensionMismatch {
                expected: 2,
                actual: 3,
            })
        );
        assert_eq!(
            cn.set_fixedpoint_ratio(1.5),
            Err(NetworkError::InvalidRatio(1.5))
        );
    }

    #[test]
    fn reset_restores_created_domains() {
        let mut cn = ContractorNetwork::new();
        let a = cn.create_interval(Interval::new(0.0, 10.0));
        let pin: Rc<dyn Ctc> = Rc::new(CtcFn::new(1, |x: &mut IntervalVector| {
            x[0] = x[0] & Interval::new(0.0, 1.0);
        }));
        cn.add_static(&pin, &[a]).unwrap();

        let _ = cn.contract(false).unwrap();
        assert_eq!(cn.interval(a), Interval::new(0.0, 1.0));
        assert_eq!(cn.num_queued(), 0);

        cn.reset_intermediate_variables();
        assert_eq!(cn.interval(a), Interval::new(0.0, 10.0));
        assert!(cn.num_queued() > 0);

        let _ = cn.contract(false).unwrap();
        assert_eq!(cn.interval(a), Interval::new(0.0, 1.0));
    }

    #[test]
    fn subvector_is_spliced_onto_its_parent() {
        let mut cn = ContractorNetwork::new();
        let v = cn.create_vector(IntervalVector::constant(4, Interval::new(0.0, 10.0)));
        let sub = cn.subvector(v, 1..3).unwrap();

        let pin: Rc<dyn Ctc> = Rc::new(CtcFn::new(1, |x: &mut IntervalVector| {
            x[0] = x[0] & Interval::new(2.0, 3.0);
        }));
        let sub_0 = cn.component(sub, 0);
        cn.add_static(&pin, &[sub_0]).unwrap();
        let _ = cn.contract(false).unwrap();

        let parent = cn.vector(v);
        assert_eq!(parent[1], Interval::new(2.0, 3.0));
        assert_eq!(parent[0], Interval::new(0.0, 10.0));
        assert_eq!(parent[2], Interval::new(0.0, 10.0));
    }

    #[test]
    fn time_budget_suspends_propagation() {
        let mut cn = ContractorNetwork::new();
        let a = cn.create_interval(Interval::new(0.0, 1.0));
        cn.add_static(&shrinker(0.5), &[a]).unwrap();
        cn.add_static(&shrinker(0.5), &[a]).unwrap();

        let _ = cn.contract_during(Duration::ZERO, false).unwrap();
        assert!(cn.num_queued() > 0);

        // The queue is left in place; a later call resumes and finishes.
        let _ = cn.contract(false).unwrap();
        assert_eq!(cn.num_queued(), 0);
    }

    #[test]
    fn emptiness_is_an_outcome_not_an_error() {
        let mut cn = ContractorNetwork::new();
        let a = cn.create_interval(Interval::new(0.0, 1.0));
        let b = cn.create_interval(Interval::new(5.0, 6.0));
        let _ = cn.add_equality(a, b).unwrap();

        assert!(cn.contract(false).is_ok());
        assert!(cn.interval(a).is_empty());
        assert!(cn.has_empty_domain());
        assert_eq!(cn.num_queued(), 0);
    }

    #[test]
    fn ordered_mode_reaches_the_fixed_point_in_one_sweep() {
        let mut cn = ContractorNetwork::new();
        let a = cn.create_interval(Interval::point(1.0));
        let b = cn.create_interval(Interval::point(2.0));
        let c = cn.create_interval(Interval::ALL_REALS);
        cn.add_static(&sum(), &[a, b, c]).unwrap();

        let _ = cn.contract_ordered(false).unwrap();

        assert_eq!(cn.interval(c), Interval::point(3.0));
        assert_eq!(cn.iteration_count(), 1);
    }

    #[test]
    fn ordered_mode_backward_sweep_finishes_reversed_chains() {
        let mut cn = ContractorNetwork::new();
        let a = cn.create_interval(Interval::point(1.0));
        let b = cn.create_interval(Interval::ALL_REALS);
        let c = cn.create_interval(Interval::ALL_REALS);
        let k = cn.create_constant(Interval::point(1.0));

        // Deliberately added against the dependency order.
        cn.add_static(&sum(), &[b, k, c]).unwrap(); // b + 1 = c
        cn.add_static(&sum(), &[a, k, b]).unwrap(); // a + 1 = b

        let _ = cn.contract_ordered(false).unwrap();

        assert_eq!(cn.interval(b), Interval::point(2.0));
        assert_eq!(cn.interval(c), Interval::point(3.0));
        assert_eq!(cn.iteration_count(), 2);
    }

    #[test]
    fn ordered_mode_with_ratio_one_stops_after_one_iteration() {
        let mut cn = ContractorNetwork::new();
        let a = cn.create_interval(Interval::point(1.0));
        let b = cn.create_interval(Interval::ALL_REALS);
        let c = cn.create_interval(Interval::ALL_REALS);
        let k = cn.create_constant(Interval::point(1.0));

        cn.add_static(&sum(), &[b, k, c]).unwrap();
        cn.add_static(&sum(), &[a, k, b]).unwrap();
        cn.set_fixedpoint_ratio(1.0).unwrap();

        let _ = cn.contract_ordered(false).unwrap();

        assert_eq!(cn.interval(c), Interval::point(3.0));
        assert_eq!(cn.iteration_count(), 1);
    }

    #[test]
    fn vector_domains_decompose_eagerly() {
        let mut cn = ContractorNetwork::new();
        let v = cn.create_vector(IntervalVector::new(2));

        // The parent, two components, and one structural link.
        assert_eq!(cn.num_domains(), 3);
        assert_eq!(cn.num_contractors(), 1);

        assert_eq!(cn.kind(v), DomainKind::Vector);
        assert_eq!(cn.kind(cn.component(v, 0)), DomainKind::Scalar);
    }

    #[test]
    fn constants_do_not_propagate() {
        let count = Rc::new(Cell::new(0));

        let mut cn = ContractorNetwork::new();
        let k = cn.create_constant(Interval::new(0.0, 10.0));
        cn.add_static(&counter(&count), &[k]).unwrap();
        let _ = cn.contract(false).unwrap();
        assert_eq!(count.get(), 1);

        // A contractor narrowing the constant runs, but the change is not
        // propagated onward.
        cn.add_static(&shrinker(0.9), &[k]).unwrap();
        let _ = cn.contract(false).unwrap();
        assert_eq!(count.get(), 1);
    }
}
