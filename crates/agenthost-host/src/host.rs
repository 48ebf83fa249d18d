use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use agenthost_agents::{
    Agent, AgentContext, AgentFactory, AgentRuntime, Lifecycle, Observer, PaperBroker,
    TracingObserver,
};
use agenthost_models::{AgenthostConfig, Tick};
use agenthost_registry::{normalize_name, InstrumentRegistry, RegistryError, SqlitePairStore};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::HostError;
use crate::source::{JsonLinesSource, TickSource};
use crate::state_store::SqliteStateStore;

/// Shared collaborators the host hands to every agent it starts.
pub struct HostDeps {
    pub registry: Arc<InstrumentRegistry>,
    pub broker: Arc<PaperBroker>,
    pub observer: Arc<dyn Observer>,
    pub state_store: SqliteStateStore,
    pub factory: AgentFactory,
}

impl HostDeps {
    /// Open the configured databases and wire up the paper broker, the
    /// tracing observer and the built-in agent types.
    pub fn from_config(config: &AgenthostConfig) -> Result<Self, HostError> {
        let pair_store = SqlitePairStore::open(&config.registry.sqlite_path)
            .map_err(RegistryError::from)?;
        let registry = InstrumentRegistry::load(pair_store)?;
        let state_store = SqliteStateStore::open(&config.state.sqlite_path)?;

        Ok(Self {
            registry: Arc::new(registry),
            broker: Arc::new(PaperBroker::new(config.broker.slippage_bps)),
            observer: Arc::new(TracingObserver),
            state_store,
            factory: AgentFactory::default(),
        })
    }
}

enum AgentCommand {
    Tick(Arc<Tick>),
    Suspend(oneshot::Sender<Result<(), HostError>>),
    Resume(oneshot::Sender<Result<(), HostError>>),
    Stop,
}

struct AgentHandle {
    pair: String,
    tx: mpsc::Sender<AgentCommand>,
}

type SharedStateStore = Arc<Mutex<SqliteStateStore>>;

/// Routes ticks to agents.
///
/// Every agent runs on its own task and drains a bounded FIFO queue, so it
/// sees ticks in the order they were dispatched and never handles two at
/// once. Suspend, resume and stop are queued behind whatever ticks are
/// already waiting.
pub struct Host {
    agents: BTreeMap<String, AgentHandle>,
    subscriptions: HashMap<String, Vec<String>>,
    registry: Arc<InstrumentRegistry>,
    broker: Arc<PaperBroker>,
    observer: Arc<dyn Observer>,
    state: SharedStateStore,
    factory: AgentFactory,
    channel_capacity: usize,
    workers: JoinSet<()>,
}

impl Host {
    /// A host with no agents yet.
    pub fn new(deps: HostDeps, channel_capacity: usize) -> Self {
        Self {
            agents: BTreeMap::new(),
            subscriptions: HashMap::new(),
            registry: deps.registry,
            broker: deps.broker,
            observer: deps.observer,
            state: Arc::new(Mutex::new(deps.state_store)),
            factory: deps.factory,
            channel_capacity: channel_capacity.max(1),
            workers: JoinSet::new(),
        }
    }

    /// Build and start every enabled agent in `config`.
    pub fn start(config: &AgenthostConfig, deps: HostDeps) -> Result<Self, HostError> {
        let mut host = Self::new(deps, config.host.channel_capacity);
        for agent_config in config.agents.iter().filter(|a| a.enabled) {
            let agent = host.factory.build(agent_config)?;
            host.spawn_agent(&agent_config.id, &agent_config.pair, agent)?;
        }
        tracing::info!(agents = host.agents.len(), "Agent host started");
        Ok(host)
    }

    /// Create `agent`, restore its persisted state if any, and start its worker.
    pub fn spawn_agent(
        &mut self,
        agent_id: &str,
        pair: &str,
        agent: Box<dyn Agent>,
    ) -> Result<(), HostError> {
        if self.agents.contains_key(agent_id) {
            return Err(HostError::Config(format!("duplicate agent id '{agent_id}'")));
        }
        let pair = normalize_name(pair)?;

        let ctx = AgentContext {
            agent_id: agent_id.to_string(),
            broker: Arc::new(self.broker.scoped(agent_id)),
            observer: Arc::clone(&self.observer),
            registry: Arc::clone(&self.registry),
        };
        let mut runtime = AgentRuntime::new(agent, ctx);
        runtime.post_create()?;

        if let Some(state) = load_state(&self.state, agent_id)? {
            runtime.restore_state(&state)?;
            tracing::info!(agent = agent_id, "Restored persisted agent state");
        }

        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let state = Arc::clone(&self.state);
        self.workers.spawn(run_worker(runtime, rx, state));

        self.subscriptions
            .entry(pair.clone())
            .or_default()
            .push(agent_id.to_string());
        self.agents
            .insert(agent_id.to_string(), AgentHandle { pair, tx });
        tracing::info!(agent = agent_id, "Agent worker started");
        Ok(())
    }

    pub fn agent_ids(&self) -> impl Iterator<Item = &str> {
        self.agents.keys().map(String::as_str)
    }

    pub fn subscribed_pair(&self, agent_id: &str) -> Option<&str> {
        self.agents.get(agent_id).map(|h| h.pair.as_str())
    }

    /// Update the broker quote and queue `tick` for every agent on its pair.
    /// Returns how many agents it was queued for.
    ///
    /// The pair name is normalized the way the registry normalizes it before
    /// anything else sees the tick.
    pub async fn dispatch(&self, mut tick: Tick) -> usize {
        match normalize_name(&tick.pair) {
            Ok(pair) => tick.pair = pair,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping tick with invalid pair");
                return 0;
            }
        }
        self.broker.update_quote(&tick);

        let Some(subscribers) = self.subscriptions.get(&tick.pair) else {
            tracing::trace!(pair = %tick.pair, "No subscribers for tick");
            return 0;
        };
        let tick = Arc::new(tick);
        let mut delivered = 0;
        for agent_id in subscribers {
            let Some(handle) = self.agents.get(agent_id) else {
                continue;
            };
            match handle.tx.send(AgentCommand::Tick(Arc::clone(&tick))).await {
                Ok(()) => delivered += 1,
                Err(_) => {
                    tracing::warn!(agent = %agent_id, "Dropping tick for stopped agent");
                }
            }
        }
        delivered
    }

    /// Persist the agent's state and stop delivering ticks to it.
    pub async fn suspend(&self, agent_id: &str) -> Result<(), HostError> {
        self.request(agent_id, AgentCommand::Suspend).await
    }

    /// Reload the agent's persisted state and resume tick delivery.
    pub async fn resume(&self, agent_id: &str) -> Result<(), HostError> {
        self.request(agent_id, AgentCommand::Resume).await
    }

    async fn request(
        &self,
        agent_id: &str,
        command: fn(oneshot::Sender<Result<(), HostError>>) -> AgentCommand,
    ) -> Result<(), HostError> {
        let handle = self
            .agents
            .get(agent_id)
            .ok_or_else(|| HostError::UnknownAgent(agent_id.to_string()))?;
        let (reply_tx, reply_rx) = oneshot::channel();
        handle
            .tx
            .send(command(reply_tx))
            .await
            .map_err(|_| HostError::WorkerGone(agent_id.to_string()))?;
        reply_rx
            .await
            .map_err(|_| HostError::WorkerGone(agent_id.to_string()))?
    }

    /// Feed ticks from `source` until it runs dry or `cancel` fires, then shut down.
    pub async fn run<S: TickSource>(
        self,
        mut source: S,
        cancel: CancellationToken,
    ) -> Result<(), HostError> {
        let mut dispatched: u64 = 0;
        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Shutdown requested");
                    break Ok(());
                }
                next = source.next_tick() => match next {
                    Ok(Some(tick)) => {
                        self.dispatch(tick).await;
                        dispatched += 1;
                    }
                    Ok(None) => {
                        tracing::info!("Tick source exhausted");
                        break Ok(());
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Tick source failed");
                        break Err(e);
                    }
                }
            }
        };

        tracing::info!(dispatched, "Dispatch loop stopped");
        self.shutdown().await?;
        result
    }

    /// Run over the JSON-lines tick file at `ticks`, or stdin when `None`,
    /// until the input ends or Ctrl-C arrives.
    pub async fn run_until_interrupted(self, ticks: Option<&str>) -> Result<(), HostError> {
        let cancel = CancellationToken::new();
        {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Received shutdown signal");
                    cancel.cancel();
                }
            });
        }

        match ticks {
            Some(path) => {
                let source = JsonLinesSource::open(path).await?;
                self.run(source, cancel).await
            }
            None => self.run(JsonLinesSource::stdin(), cancel).await,
        }
    }

    /// Let every worker drain its queue, persist final state and stop.
    pub async fn shutdown(mut self) -> Result<(), HostError> {
        for (agent_id, handle) in &self.agents {
            if handle.tx.send(AgentCommand::Stop).await.is_err() {
                tracing::warn!(agent = %agent_id, "Worker already gone at shutdown");
            }
        }
        self.agents.clear();

        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Agent worker panicked");
            }
        }
        tracing::info!("Agent host stopped");
        Ok(())
    }
}

async fn run_worker(
    mut runtime: AgentRuntime,
    mut rx: mpsc::Receiver<AgentCommand>,
    state: SharedStateStore,
) {
    while let Some(command) = rx.recv().await {
        match command {
            AgentCommand::Tick(tick) => {
                if runtime.lifecycle() == Lifecycle::Suspended {
                    tracing::trace!(agent = runtime.agent_id(), "Skipping tick while suspended");
                    continue;
                }
                if let Err(e) = runtime.handle_tick(&tick) {
                    tracing::error!(agent = runtime.agent_id(), error = %e, "Tick handling failed");
                }
            }
            AgentCommand::Suspend(reply) => {
                let _ = reply.send(suspend(&mut runtime, &state));
            }
            AgentCommand::Resume(reply) => {
                let _ = reply.send(resume(&mut runtime, &state));
            }
            AgentCommand::Stop => break,
        }
    }

    match runtime.terminate() {
        Ok(snapshot) => {
            if let Err(e) = save_state(&state, runtime.agent_id(), &snapshot) {
                tracing::error!(
                    agent = runtime.agent_id(),
                    error = %e,
                    "Failed to persist final state"
                );
            }
        }
        Err(e) => {
            tracing::warn!(agent = runtime.agent_id(), error = %e, "Agent could not be terminated");
        }
    }
}

fn suspend(runtime: &mut AgentRuntime, state: &SharedStateStore) -> Result<(), HostError> {
    let snapshot = runtime.suspend()?;
    save_state(state, runtime.agent_id(), &snapshot)
}

fn resume(runtime: &mut AgentRuntime, state: &SharedStateStore) -> Result<(), HostError> {
    let snapshot = load_state(state, runtime.agent_id())?;
    runtime.resume(snapshot.as_ref())?;
    Ok(())
}

fn save_state(state: &SharedStateStore, agent_id: &str, snapshot: &Value) -> Result<(), HostError> {
    let store = state
        .lock()
        .map_err(|e| HostError::Unavailable(format!("state store lock poisoned: {e}")))?;
    store.save(agent_id, snapshot)?;
    tracing::debug!(agent = agent_id, "Agent state persisted");
    Ok(())
}

fn load_state(state: &SharedStateStore, agent_id: &str) -> Result<Option<Value>, HostError> {
    let store = state
        .lock()
        .map_err(|e| HostError::Unavailable(format!("state store lock poisoned: {e}")))?;
    store.load(agent_id)
}
