//! Network coordinator
//!
//! Sequences chain detection, forking, referendum creation and the
//! force/relocate/verify cycle across every fork of a run. Forks are driven one
//! at a time; a failing fork fails the referenda on it and nothing else.

pub mod outcome;
pub mod report;
pub mod state;

pub use outcome::{SimulationOutcome, SimulationRun};
pub use state::CoordinatorState;

use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::chain::{Bytes, ChainClient, ChainConnector, ChainEvent};
use crate::config::{ReferendumSource, RunnerConfig, SimulationPlan};
use crate::error::{Result, SimulationError};
use crate::fork::{Fork, ForkEngine, ForkSession};
use crate::format::Proposal;
use crate::referendum::{
    create_referendum, track_name, Domain, ForceOutcome, ReferendumRecord, ReferendumStateForcer,
};
use crate::scheduler::{dispatch_as, ScheduledCallType, SchedulerRelocator};
use crate::topology::{
    ChainDescriptor, ChainRole, ChainTopologyBuilder, Network, NetworkTopology, ALICE,
};
use crate::verification::{ExecutionReport, ExecutionVerifier};

type Forks = BTreeMap<String, Arc<dyn Fork>>;
type Sessions = BTreeMap<String, ForkSession>;

/// Progress of one governance domain through a run.
struct DomainRun {
    domain: Domain,
    key: String,
    network: Network,
    source: ReferendumSource,
    id: Option<u32>,
    record: Option<ReferendumRecord>,
    errors: Option<Vec<String>>,
}

impl DomainRun {
    fn fail(&mut self, message: String) {
        self.errors.get_or_insert_with(Vec::new).push(message);
    }

    fn failed(&self) -> bool {
        self.errors.is_some()
    }

    fn outcome(&self) -> SimulationOutcome {
        let mut outcome = SimulationOutcome::new(self.domain, self.network, &self.key);
        outcome.referendum_id = self.id;
        outcome.track = self
            .record
            .as_ref()
            .and_then(ReferendumRecord::track)
            .map(|track| track_name(self.domain, self.network, track));
        outcome
    }
}

enum Cycle {
    Executed {
        report: ExecutionReport,
        executed_block: u32,
    },
    AlreadyApproved,
}

pub struct NetworkCoordinator {
    plan: SimulationPlan,
    runner: RunnerConfig,
    state: CoordinatorState,
    history: Vec<CoordinatorState>,
    /// Detected chains by endpoint URL.
    descriptors: BTreeMap<String, ChainDescriptor>,
}

impl NetworkCoordinator {
    pub fn new(plan: SimulationPlan, runner: RunnerConfig) -> Self {
        Self {
            plan,
            runner,
            state: CoordinatorState::Idle,
            history: vec![CoordinatorState::Idle],
            descriptors: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Every state entered during the last run, in order.
    pub fn history(&self) -> &[CoordinatorState] {
        &self.history
    }

    pub fn descriptors(&self) -> &BTreeMap<String, ChainDescriptor> {
        &self.descriptors
    }

    /// Run the whole simulation. Only chain detection can fail the run as a
    /// whole; a fork that cannot be started, reached or driven fails the
    /// referenda on it. Forks are torn down (or paused) and chain clients
    /// released on every path.
    pub async fn run(
        &mut self,
        engine: &dyn ForkEngine,
        connector: &dyn ChainConnector,
    ) -> Result<SimulationRun> {
        let run_id = Uuid::new_v4();
        let span = info_span!("simulation", run_id = %run_id);
        self.execute(run_id, engine, connector).instrument(span).await
    }

    async fn execute(
        &mut self,
        run_id: Uuid,
        engine: &dyn ForkEngine,
        connector: &dyn ChainConnector,
    ) -> Result<SimulationRun> {
        let started_at = Utc::now();
        self.state = CoordinatorState::Idle;
        self.history = vec![CoordinatorState::Idle];

        self.transition(CoordinatorState::DetectingChainTypes);
        let topology = self.detect(connector).await?;

        self.transition(CoordinatorState::Forking);
        let (forks, unhealthy) = self.fork(engine, &topology).await;

        let mut clients = Vec::new();
        let (outcomes, additional_events) = self
            .drive(&topology, &forks, unhealthy, connector, &mut clients)
            .await;
        self.cleanup(&forks, &clients).await;

        Ok(SimulationRun {
            run_id,
            started_at,
            finished_at: Utc::now(),
            outcomes,
            additional_events,
            final_state: self.state,
        })
    }

    fn transition(&mut self, next: CoordinatorState) {
        info!("{} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    /// Probe every chain's spec name once and build the topology.
    pub async fn detect(&mut self, connector: &dyn ChainConnector) -> Result<NetworkTopology> {
        let mut descriptors = Vec::new();
        for (role, endpoint) in ChainTopologyBuilder::plan_roles(&self.plan) {
            let descriptor = match self.descriptors.get(&endpoint.url) {
                Some(cached) => ChainDescriptor {
                    block: endpoint.block,
                    ..cached.clone()
                },
                None => {
                    let spec_name = connector.spec_name(&endpoint.url).await?;
                    let descriptor = ChainDescriptor::from_spec_name(&endpoint, &spec_name);
                    info!(
                        "{} chain {} runs {} ({:?})",
                        role, endpoint.url, spec_name, descriptor.kind
                    );
                    self.descriptors
                        .insert(endpoint.url.clone(), descriptor.clone());
                    descriptor
                }
            };
            descriptors.push((role, descriptor));
        }
        Ok(ChainTopologyBuilder::from_plan(
            &self.plan,
            descriptors,
            &self.runner,
        ))
    }

    /// Start every fork. Keys whose fork could not be started come back in
    /// the second set; the referenda on them fail without touching the rest.
    async fn fork(
        &self,
        engine: &dyn ForkEngine,
        topology: &NetworkTopology,
    ) -> (Forks, BTreeSet<String>) {
        if topology.wired {
            info!(
                "forking {} chains as one network",
                topology.entries.len()
            );
            return match engine.setup_network(&topology.fork_configs()).await {
                Ok(forks) => {
                    let missing = topology
                        .entries
                        .keys()
                        .filter(|key| !forks.contains_key(*key))
                        .cloned()
                        .collect();
                    (forks, missing)
                }
                Err(e) => {
                    error!("failed to fork the network: {}", e);
                    (Forks::new(), topology.entries.keys().cloned().collect())
                }
            };
        }

        let mut forks = Forks::new();
        let mut failed = BTreeSet::new();
        for (key, entry) in &topology.entries {
            match engine.setup(&entry.fork_config).await {
                Ok(fork) => {
                    info!("[{}] forked {} at {}", key, entry.descriptor.label, fork.endpoint());
                    forks.insert(key.clone(), fork);
                }
                Err(e) => {
                    error!("[{}] failed to fork {}: {}", key, entry.descriptor.endpoint, e);
                    failed.insert(key.clone());
                }
            }
        }
        (forks, failed)
    }

    async fn drive(
        &mut self,
        topology: &NetworkTopology,
        forks: &Forks,
        mut unhealthy: BTreeSet<String>,
        connector: &dyn ChainConnector,
        clients: &mut Vec<Arc<dyn ChainClient>>,
    ) -> (Vec<SimulationOutcome>, BTreeMap<String, Vec<ChainEvent>>) {
        let plan = self.plan.clone();
        let polling = self.runner.polling();

        let mut sessions = Sessions::new();
        for (key, fork) in forks {
            let Some(entry) = topology.entries.get(key) else {
                warn!("[{}] fork engine returned a fork nobody asked for", key);
                continue;
            };
            let client = match connector.connect(fork.endpoint()).await {
                Ok(client) => client,
                Err(e) => {
                    error!("[{}] failed to connect to {}: {}", key, fork.endpoint(), e);
                    unhealthy.insert(key.clone());
                    continue;
                }
            };
            clients.push(client.clone());
            sessions.insert(
                key.clone(),
                ForkSession::new(
                    key.clone(),
                    entry.descriptor.clone(),
                    fork.clone(),
                    client,
                    polling,
                ),
            );
        }

        self.transition(CoordinatorState::WaitingReady);
        for (key, session) in &sessions {
            if let Err(e) = session.wait_ready().await {
                error!("[{}] {}", key, e);
                unhealthy.insert(key.clone());
            }
        }

        let mut runs = domain_runs(&plan, topology);

        if let Some(pre_call) = &plan.pre_call {
            if let Some(run) = runs.iter_mut().find(|r| r.domain == Domain::Main) {
                if let Some(session) = session_for(&sessions, &unhealthy, run) {
                    info!(
                        "[{}] dispatching pre-call as {}",
                        session.key(),
                        pre_call.origin.to_storage()
                    );
                    match dispatch_as(session, Domain::Main, &pre_call.call, &pre_call.origin).await
                    {
                        Ok(report) if report.execution_succeeded => {
                            info!("[{}] pre-call executed", session.key())
                        }
                        Ok(report) => {
                            let message = format!("pre-call failed: {}", report.errors.join("; "));
                            error!("[{}] {}", session.key(), message);
                            run.fail(message);
                        }
                        Err(e) => fail_domain(run, &mut unhealthy, "dispatching the pre-call", e),
                    }
                }
            }
        }

        if runs
            .iter()
            .any(|r| !r.failed() && matches!(r.source, ReferendumSource::Create { .. }))
        {
            self.transition(CoordinatorState::CreatingReferenda);
            for run in runs.iter_mut() {
                let ReferendumSource::Create {
                    submit_call,
                    preimage_call,
                } = run.source.clone()
                else {
                    continue;
                };
                let Some(session) = session_for(&sessions, &unhealthy, run) else {
                    continue;
                };
                match create_referendum(
                    session,
                    run.domain,
                    &submit_call,
                    preimage_call.as_ref(),
                    ALICE,
                )
                .await
                {
                    Ok(id) => run.id = Some(id),
                    Err(e) => fail_domain(run, &mut unhealthy, "creating the referendum", e),
                }
            }
        }

        self.transition(CoordinatorState::FetchingReferenda);
        for run in runs.iter_mut() {
            let Some(id) = run.id else {
                continue;
            };
            let Some(session) = session_for(&sessions, &unhealthy, run) else {
                continue;
            };
            match ReferendumStateForcer::read_referendum(session, id, run.domain).await {
                Ok(record) => {
                    info!(
                        "[{}] {} referendum #{} is {}",
                        session.key(),
                        run.domain,
                        id,
                        record.status
                    );
                    run.record = Some(record);
                }
                Err(e) => fail_domain(run, &mut unhealthy, "fetching the referendum", e),
            }
        }

        let fellowship_key = key_of(&runs, Domain::Fellowship);
        let governance_key = key_of(&runs, Domain::Main);
        let distinct = match (&fellowship_key, &governance_key) {
            (Some(fellowship), Some(governance)) if fellowship != governance => {
                Some(vec![fellowship.clone(), governance.clone()])
            }
            (Some(_), Some(_)) => {
                info!("both referenda share one fork, no cross-chain propagation needed");
                None
            }
            _ => None,
        };

        let mut outcomes = Vec::new();
        for run in runs.iter_mut() {
            if run.domain == Domain::Main {
                if let Some(keys) = &distinct {
                    self.propagate(keys, &sessions, &mut unhealthy).await;
                }
            }
            self.transition(CoordinatorState::ForcingAndExecuting(run.domain));
            outcomes.push(run_domain(run, &sessions, &mut unhealthy).await);
        }
        if let Some(keys) = &distinct {
            self.propagate(keys, &sessions, &mut unhealthy).await;
        }

        let mut additional_events = BTreeMap::new();
        let additional = topology.additional_keys();
        if !additional.is_empty() {
            self.transition(CoordinatorState::CollectingAdditionalChainEvents);
            for key in additional {
                if let Some(events) = collect_events(&key, &sessions, &mut unhealthy).await {
                    additional_events.insert(key, events);
                }
            }
        }

        (outcomes, additional_events)
    }

    /// Build one block on each fork so pending XCM messages are delivered.
    async fn propagate(
        &mut self,
        keys: &[String],
        sessions: &Sessions,
        unhealthy: &mut BTreeSet<String>,
    ) {
        self.transition(CoordinatorState::PropagatingXcm);
        for key in keys {
            if unhealthy.contains(key) {
                warn!("[{}] skipping unavailable fork", key);
                continue;
            }
            let Some(session) = sessions.get(key) else {
                continue;
            };
            match session.produce_block().await {
                Ok(head) => info!("[{}] built block #{} for XCM delivery", key, head),
                Err(e) => {
                    warn!("[{}] failed to build XCM delivery block: {}", key, e);
                    if e.is_fork_failure() {
                        unhealthy.insert(key.clone());
                    }
                }
            }
        }
    }

    async fn cleanup(&mut self, forks: &Forks, clients: &[Arc<dyn ChainClient>]) {
        for client in clients {
            if let Err(e) = client.disconnect().await {
                warn!("failed to disconnect chain client: {}", e);
            }
        }

        if self.plan.cleanup {
            self.transition(CoordinatorState::Cleanup);
            for (key, fork) in forks {
                if let Err(e) = fork.teardown().await {
                    warn!("[{}] failed to tear down fork: {}", key, e);
                }
            }
        } else {
            self.transition(CoordinatorState::Paused);
            for (key, fork) in forks {
                match fork.pause().await {
                    Ok(()) => info!("[{}] fork left running at {}", key, fork.endpoint()),
                    Err(e) => warn!(
                        "[{}] could not pause fork at {}: {}",
                        key,
                        fork.endpoint(),
                        e
                    ),
                }
            }
        }
    }
}

/// Fellowship first, then governance.
fn domain_runs(plan: &SimulationPlan, topology: &NetworkTopology) -> Vec<DomainRun> {
    let domains = [
        (Domain::Fellowship, ChainRole::Fellowship, plan.fellowship.as_ref()),
        (Domain::Main, ChainRole::Governance, plan.governance.as_ref()),
    ];

    domains
        .into_iter()
        .filter_map(|(domain, role, domain_plan)| {
            let domain_plan = domain_plan?;
            let entry = topology.entry_for(role);
            let mut run = DomainRun {
                domain,
                key: entry.map(|e| e.key.clone()).unwrap_or_else(|| role.label()),
                network: entry.map(|e| e.descriptor.network).unwrap_or(Network::Unknown),
                source: domain_plan.source.clone(),
                id: match domain_plan.source {
                    ReferendumSource::Existing(id) => Some(id),
                    ReferendumSource::Create { .. } => None,
                },
                record: None,
                errors: None,
            };
            if entry.is_none() {
                run.fail(format!(
                    "no fork serves the {} chain {}",
                    role, domain_plan.endpoint.url
                ));
            }
            Some(run)
        })
        .collect()
}

fn key_of(runs: &[DomainRun], domain: Domain) -> Option<String> {
    runs.iter()
        .find(|r| r.domain == domain)
        .map(|r| r.key.clone())
}

/// The session a domain runs on, or `None` (failing the domain) when the
/// domain already failed or its fork is unavailable.
fn session_for<'a>(
    sessions: &'a Sessions,
    unhealthy: &BTreeSet<String>,
    run: &mut DomainRun,
) -> Option<&'a ForkSession> {
    if run.failed() {
        return None;
    }
    if unhealthy.contains(&run.key) {
        run.fail(format!("fork '{}' is unavailable", run.key));
        return None;
    }
    let session = sessions.get(&run.key);
    if session.is_none() {
        run.fail(format!("no fork was started for '{}'", run.key));
    }
    session
}

fn fail_domain(
    run: &mut DomainRun,
    unhealthy: &mut BTreeSet<String>,
    step: &str,
    e: SimulationError,
) {
    error!("[{}] {} referendum failed while {}: {}", run.key, run.domain, step, e);
    if e.is_fork_failure() {
        unhealthy.insert(run.key.clone());
    }
    run.fail(e.to_string());
}

async fn run_domain(
    run: &mut DomainRun,
    sessions: &Sessions,
    unhealthy: &mut BTreeSet<String>,
) -> SimulationOutcome {
    let (Some(id), Some(record)) = (run.id, run.record.clone()) else {
        if !run.failed() {
            run.fail("referendum was not loaded".to_string());
        }
        return run.outcome().failed(run.errors.clone().unwrap_or_default());
    };
    let Some(session) = session_for(sessions, unhealthy, run) else {
        return run.outcome().failed(run.errors.clone().unwrap_or_default());
    };

    match force_and_execute(session, id, run.domain, &record).await {
        Ok(Cycle::Executed {
            report,
            executed_block,
        }) => {
            let mut outcome = run.outcome();
            outcome.success = report.execution_succeeded;
            outcome.execution_succeeded = report.execution_succeeded;
            outcome.executed_block = Some(executed_block);
            outcome.events = report.events;
            if !report.errors.is_empty() {
                outcome.errors = Some(report.errors);
            }
            outcome
        }
        Ok(Cycle::AlreadyApproved) => {
            let mut outcome = run.outcome();
            outcome.success = true;
            outcome.note = Some("already enacted".to_string());
            outcome
        }
        Err(e) => {
            fail_domain(run, unhealthy, "forcing and executing", e);
            run.outcome().failed(run.errors.clone().unwrap_or_default())
        }
    }
}

/// Force the referendum, let its nudge approve it, then run its enactment.
async fn force_and_execute(
    session: &ForkSession,
    id: u32,
    domain: Domain,
    record: &ReferendumRecord,
) -> Result<Cycle> {
    if let ForceOutcome::AlreadyApproved =
        ReferendumStateForcer::apply_passing_state(session, id, domain).await?
    {
        return Ok(Cycle::AlreadyApproved);
    }

    SchedulerRelocator::move_scheduled_call(session, id, domain, ScheduledCallType::Nudge, None)
        .await?;
    let nudged_at = session.produce_block().await?;
    info!("[{}] referendum #{} nudged in block #{}", session.key(), id, nudged_at);

    let proposal = execution_match(record);
    let target = SchedulerRelocator::move_scheduled_call(
        session,
        id,
        domain,
        ScheduledCallType::Execute,
        proposal.as_ref(),
    )
    .await?;
    let executed_block = session.produce_block().await?;

    let report = ExecutionVerifier::verify(session, id, Some(target)).await?;
    Ok(Cycle::Executed {
        report,
        executed_block,
    })
}

/// What the enactment agenda item is matched against: the preimage hash, or
/// the call itself for inline proposals.
fn execution_match(record: &ReferendumRecord) -> Option<Bytes> {
    match record.proposal()? {
        Proposal::Lookup { hash, .. } | Proposal::Legacy { hash } => Some(hash.clone()),
        Proposal::Inline(call) => Some(call.clone()),
        Proposal::Unknown(_) => None,
    }
}

async fn collect_events(
    key: &str,
    sessions: &Sessions,
    unhealthy: &mut BTreeSet<String>,
) -> Option<Vec<ChainEvent>> {
    if unhealthy.contains(key) {
        warn!("[{}] skipping unavailable fork", key);
        return None;
    }
    let session = sessions.get(key)?;
    let result = async {
        let head = session.produce_block().await?;
        let events = session.client().events().await?;
        info!("[{}] {} events in block #{}", key, events.len(), head);
        Ok::<_, SimulationError>(events)
    }
    .await;

    match result {
        Ok(events) => Some(events),
        Err(e) => {
            warn!("[{}] failed to collect events: {}", key, e);
            if e.is_fork_failure() {
                unhealthy.insert(key.to_string());
            }
            None
        }
    }
}
