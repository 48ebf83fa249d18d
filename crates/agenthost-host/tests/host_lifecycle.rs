//! Host behavior end to end: ordered delivery, suspend/resume, persisted
//! state across restarts and shutdown through a tick source.
//!
//! Agents run against a real `PaperBroker` and a file-backed state database;
//! the decision policy is fixed so trades are predictable.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use agenthost_agents::test_support::{memory_registry, tick_at, FixedPolicy, RecordingObserver};
use agenthost_agents::{Agent, AgentFactory, LifecycleError, NeuralNetAgent, PaperBroker};
use agenthost_host::{ChannelSource, Host, HostDeps, HostError, SqliteStateStore};
use agenthost_models::{AgentConfig, AgenthostConfig, PropertyValue};
use tokio_util::sync::CancellationToken;

struct Fixture {
    observer: Arc<RecordingObserver>,
    broker: Arc<PaperBroker>,
}

fn deps(state_path: &Path) -> (HostDeps, Fixture) {
    let observer = Arc::new(RecordingObserver::default());
    let broker = Arc::new(PaperBroker::new(0.0));
    let deps = HostDeps {
        registry: memory_registry(),
        broker: broker.clone(),
        observer: observer.clone(),
        state_store: SqliteStateStore::open(state_path.to_str().unwrap()).unwrap(),
        factory: AgentFactory::default(),
    };
    (deps, Fixture { observer, broker })
}

fn nn_agent(pair: &str, short: i64, long: i64, buy: f64) -> Box<dyn Agent> {
    let config = AgentConfig {
        id: format!("nn-{pair}"),
        agent_type: "neural_net".to_string(),
        pair: pair.to_string(),
        enabled: true,
        properties: [
            ("short".to_string(), PropertyValue::Integer(short)),
            ("long".to_string(), PropertyValue::Integer(long)),
        ]
        .into_iter()
        .collect(),
    };
    let props = AgentFactory::default().resolve(&config).unwrap();
    Box::new(
        NeuralNetAgent::from_properties(&props)
            .unwrap()
            .with_policy(Arc::new(FixedPolicy::new(buy, 0.0))),
    )
}

fn points_for(observer: &RecordingObserver, agent_id: &str) -> Vec<i64> {
    observer
        .points()
        .into_iter()
        .filter(|p| p.agent_id == agent_id)
        .map(|p| p.timestamp.timestamp())
        .collect()
}

#[tokio::test]
async fn ticks_reach_subscribers_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let (deps, fx) = deps(&dir.path().join("state.db"));
    let mut host = Host::new(deps, 4);
    host.spawn_agent("usd", "usdjpy", nn_agent("USDJPY", 1, 1, 0.0))
        .unwrap();
    host.spawn_agent("eur", "EURUSD", nn_agent("EURUSD", 1, 1, 0.0))
        .unwrap();
    assert_eq!(host.subscribed_pair("usd"), Some("USDJPY"));

    for i in 0..50 {
        let delivered = host.dispatch(tick_at("USDJPY", 110.0 + i as f64 * 0.01, i)).await;
        assert_eq!(delivered, 1);
    }
    assert_eq!(host.dispatch(tick_at("GBPUSD", 1.3, 50)).await, 0);
    host.shutdown().await.unwrap();

    let seen = points_for(&fx.observer, "usd");
    assert_eq!(seen, (0..50).collect::<Vec<i64>>());
    assert!(points_for(&fx.observer, "eur").is_empty());
}

#[tokio::test]
async fn tick_pairs_are_normalized_before_routing() {
    let dir = tempfile::tempdir().unwrap();
    let (deps, fx) = deps(&dir.path().join("state.db"));
    let mut host = Host::new(deps, 4);
    host.spawn_agent("usd", "usdjpy", nn_agent("usdjpy", 1, 1, 0.9))
        .unwrap();

    assert_eq!(host.dispatch(tick_at(" usdjpy", 110.0, 0)).await, 1);
    assert_eq!(host.dispatch(tick_at("usdjpy", 110.0, 60)).await, 1);
    assert_eq!(host.dispatch(tick_at("   ", 110.0, 61)).await, 0);
    host.shutdown().await.unwrap();

    assert_eq!(points_for(&fx.observer, "usd"), vec![0, 60]);
    // The buy at t=60 found the quote under the canonical name.
    let positions = fx.broker.open_positions().unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].pair, "USDJPY");
}

#[tokio::test]
async fn state_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let state_path = dir.path().join("state.db");

    let (deps1, _fx1) = deps(&state_path);
    let mut first = Host::new(deps1, 16);
    first
        .spawn_agent("usd", "USDJPY", nn_agent("USDJPY", 2, 3, 0.0))
        .unwrap();
    for i in 0..3 {
        first.dispatch(tick_at("USDJPY", 110.0, i)).await;
    }
    first.shutdown().await.unwrap();

    let saved = SqliteStateStore::open(state_path.to_str().unwrap())
        .unwrap()
        .load("usd")
        .unwrap()
        .unwrap();
    assert_eq!(saved["mvs"][1]["values"].as_array().unwrap().len(), 3);

    // A fresh long average would need three ticks before reporting.
    let (deps2, fx2) = deps(&state_path);
    let mut second = Host::new(deps2, 16);
    second
        .spawn_agent("usd", "USDJPY", nn_agent("USDJPY", 2, 3, 0.0))
        .unwrap();
    second.dispatch(tick_at("USDJPY", 110.0, 3)).await;
    second.shutdown().await.unwrap();

    assert_eq!(points_for(&fx2.observer, "usd"), vec![3]);
}

#[tokio::test]
async fn suspended_agents_skip_ticks() {
    let dir = tempfile::tempdir().unwrap();
    let (deps, fx) = deps(&dir.path().join("state.db"));
    let mut host = Host::new(deps, 16);
    host.spawn_agent("usd", "USDJPY", nn_agent("USDJPY", 1, 1, 0.0))
        .unwrap();

    host.dispatch(tick_at("USDJPY", 110.0, 0)).await;
    host.dispatch(tick_at("USDJPY", 110.0, 1)).await;
    host.suspend("usd").await.unwrap();

    for i in 2..5 {
        host.dispatch(tick_at("USDJPY", 110.0, i)).await;
    }
    host.resume("usd").await.unwrap();
    host.dispatch(tick_at("USDJPY", 110.0, 5)).await;

    // Already active.
    assert!(matches!(
        host.resume("usd").await,
        Err(HostError::Lifecycle(LifecycleError::NotSuspended { .. }))
    ));
    assert!(matches!(
        host.suspend("gbp").await,
        Err(HostError::UnknownAgent(id)) if id == "gbp"
    ));

    host.shutdown().await.unwrap();
    assert_eq!(points_for(&fx.observer, "usd"), vec![0, 1, 5]);
}

#[tokio::test]
async fn run_drains_a_channel_source() {
    let dir = tempfile::tempdir().unwrap();
    let (deps, fx) = deps(&dir.path().join("state.db"));
    let mut host = Host::new(deps, 2);
    host.spawn_agent("usd", "USDJPY", nn_agent("USDJPY", 1, 1, 0.9))
        .unwrap();

    let (tx, source) = ChannelSource::channel(8);
    let producer = tokio::spawn(async move {
        for i in [0, 30, 60, 90] {
            tx.send(tick_at("USDJPY", 110.0, i)).await.unwrap();
        }
    });

    host.run(source, CancellationToken::new()).await.unwrap();
    producer.await.unwrap();

    assert_eq!(points_for(&fx.observer, "usd").len(), 4);
    // One evaluation at t=60 opened a buy through the paper broker.
    let positions = fx.broker.open_positions().unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].owner, "usd");
    assert_eq!(positions[0].pair, "USDJPY");
}

#[tokio::test]
async fn run_until_interrupted_reads_a_tick_file() {
    let dir = tempfile::tempdir().unwrap();
    let ticks = dir.path().join("ticks.jsonl");
    let lines: Vec<String> = (0..3)
        .map(|i| serde_json::to_string(&tick_at("USDJPY", 110.0, i)).unwrap())
        .collect();
    std::fs::write(&ticks, lines.join("\n")).unwrap();

    let (deps, fx) = deps(&dir.path().join("state.db"));
    let mut host = Host::new(deps, 4);
    host.spawn_agent("usd", "USDJPY", nn_agent("USDJPY", 1, 1, 0.0))
        .unwrap();

    host.run_until_interrupted(ticks.to_str()).await.unwrap();
    assert_eq!(points_for(&fx.observer, "usd"), vec![0, 1, 2]);
}

#[tokio::test]
async fn cancellation_stops_run_promptly() {
    let dir = tempfile::tempdir().unwrap();
    let (deps, _fx) = deps(&dir.path().join("state.db"));
    let mut host = Host::new(deps, 2);
    host.spawn_agent("usd", "USDJPY", nn_agent("USDJPY", 1, 1, 0.0))
        .unwrap();

    // Keep the sender alive so the source never runs dry.
    let (_tx, source) = ChannelSource::channel(8);
    let cancel = CancellationToken::new();
    let run = tokio::spawn(host.run(source, cancel.clone()));

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run should stop after cancellation")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn start_builds_agents_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let model = dir.path().join("nn.json");
    std::fs::write(
        &model,
        r#"{ "layers": [ { "weights": [[0,0,0,0],[0,0,0,0]], "biases": [3.0, -3.0] } ] }"#,
    )
    .unwrap();
    let state_db = dir.path().join("state.db");

    let toml_str = format!(
        r#"
[registry]
sqlite_path = "{registry}"

[state]
sqlite_path = "{state}"

[host]
channel_capacity = 8

[[agents]]
id = "nn-usdjpy"
type = "neural_net"
pair = "USDJPY"

[agents.properties]
short = 1
long = 1
neural = "{model}"

[[agents]]
id = "disabled"
type = "neural_net"
pair = "EURUSD"
enabled = false
"#,
        registry = dir.path().join("pairs.db").display(),
        state = state_db.display(),
        model = model.display(),
    );
    let config: AgenthostConfig = toml::from_str(&toml_str).unwrap();

    let deps = HostDeps::from_config(&config).unwrap();
    let registry = deps.registry.clone();
    let broker = deps.broker.clone();
    let host = Host::start(&config, deps).unwrap();
    assert_eq!(host.agent_ids().collect::<Vec<_>>(), vec!["nn-usdjpy"]);

    host.dispatch(tick_at("USDJPY", 110.0, 0)).await;
    host.dispatch(tick_at("USDJPY", 110.0, 60)).await;
    host.shutdown().await.unwrap();

    assert_eq!(registry.get_by_name("USDJPY").unwrap().id, 0);
    assert_eq!(broker.open_positions().unwrap().len(), 1);
    assert_eq!(
        SqliteStateStore::open(state_db.to_str().unwrap())
            .unwrap()
            .count()
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn unknown_agent_type_fails_start() {
    let dir = tempfile::tempdir().unwrap();
    let (deps, _fx) = deps(&dir.path().join("state.db"));
    let config: AgenthostConfig = toml::from_str(
        r#"
[registry]
sqlite_path = "unused.db"

[state]
sqlite_path = "unused.db"

[[agents]]
id = "x"
type = "martingale"
pair = "USDJPY"
"#,
    )
    .unwrap();

    assert!(matches!(
        Host::start(&config, deps),
        Err(HostError::Agent(agenthost_agents::AgentError::UnknownType(t))) if t == "martingale"
    ));
}
