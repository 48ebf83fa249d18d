use std::sync::Arc;

use agenthost_models::{Instrument, PropertyInfo, Side, Tick};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::factory::{AgentDescriptor, ResolvedProperties};
use crate::indicator::{Indicator, MovingAverage, MovingAverageState};
use crate::observer::SeriesPoint;
use crate::policy::{Confidence, DecisionPolicy, Features, NeuralNet};
use crate::runtime::{Agent, AgentContext};

pub const TYPE_NAME: &str = "neural_net";

/// Units per order.
pub const ORDER_UNITS: u64 = 1000;

/// Confidence a side must strictly exceed to trade.
pub const CONFIDENCE_THRESHOLD: f64 = 0.8;

/// Fixed input used to log one inference right after the network loads.
const STARTUP_FEATURES: Features = [0.01516, 0.045395, -0.001, 0.030235];

/// Trades one pair on a fixed interval using a neural network fed with
/// short/long moving-average deltas.
///
/// On every evaluation it first closes everything it holds, then opens at
/// most one position: buy wins over sell when both are confident.
pub struct NeuralNetAgent {
    short_period: usize,
    long_period: usize,
    model_path: String,
    trade_interval: Duration,
    pair: String,
    policy: Option<Arc<dyn DecisionPolicy>>,
    averages: Vec<MovingAverage>,
    instrument: Option<Instrument>,
    reference_price: Option<f64>,
    next_decision_at: Option<DateTime<Utc>>,
    last_features: Option<Features>,
}

#[derive(Debug, Serialize, Deserialize)]
struct NeuralNetAgentState {
    mvs: Vec<MovingAverageState>,
}

impl NeuralNetAgent {
    pub fn properties() -> Vec<PropertyInfo> {
        vec![
            PropertyInfo::new("short", "Short moving average period", 25_i64),
            PropertyInfo::new("long", "Long moving average period", 75_i64),
            PropertyInfo::new("neural", "Path to the trained network file", "models/nn.json"),
            PropertyInfo::new("trade_time", "Seconds between trades", 60_i64),
        ]
    }

    pub fn descriptor() -> AgentDescriptor {
        AgentDescriptor {
            type_name: TYPE_NAME,
            description: "Asks a neural network whether the rate goes up or down next \
                          and trades on a fixed interval.",
            properties: Self::properties(),
            build: build_agent,
        }
    }

    pub fn from_properties(props: &ResolvedProperties) -> Result<Self, AgentError> {
        let short_period = positive(props.get_i64("short")?, "short")?;
        let long_period = positive(props.get_i64("long")?, "long")?;
        let trade_time = props.get_i64("trade_time")?;
        if trade_time <= 0 {
            return Err(AgentError::Config(format!(
                "trade_time must be positive, got {trade_time}"
            )));
        }
        let trade_interval = Duration::try_seconds(trade_time).ok_or_else(|| {
            AgentError::Config(format!("trade_time {trade_time} is out of range"))
        })?;

        Ok(Self {
            short_period,
            long_period,
            model_path: props.get_str("neural")?.to_string(),
            trade_interval,
            pair: props.pair().to_string(),
            policy: None,
            averages: Vec::new(),
            instrument: None,
            reference_price: None,
            next_decision_at: None,
            last_features: None,
        })
    }

    /// Use `policy` instead of loading the network file in `post_create`.
    pub fn with_policy(mut self, policy: Arc<dyn DecisionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn next_decision_at(&self) -> Option<DateTime<Utc>> {
        self.next_decision_at
    }

    pub fn reference_price(&self) -> Option<f64> {
        self.reference_price
    }

    pub fn last_features(&self) -> Option<Features> {
        self.last_features
    }

    fn features(&self, short: f64, long: f64, bid: f64) -> Features {
        let reference = self.reference_price.unwrap_or(0.0);
        [
            round_to(short - bid, 3),
            round_to(long - bid, 3),
            round_to(bid - reference, 5),
            round_to(long - short, 5),
        ]
    }

    fn close_positions(&self, side: Side, ctx: &AgentContext) {
        let Some(positions) = ctx.contain(ctx.broker.positions()) else {
            return;
        };
        for position in positions.iter().filter(|p| p.side == side) {
            ctx.contain(ctx.broker.close(position));
        }
    }

    fn schedule_after(&self, tick: &Tick) -> Result<DateTime<Utc>, AgentError> {
        tick.timestamp
            .checked_add_signed(self.trade_interval)
            .ok_or_else(|| {
                AgentError::Config(format!(
                    "next decision time overflows after {}",
                    tick.timestamp
                ))
            })
    }

    fn trade(
        &mut self,
        tick: &Tick,
        features: &Features,
        ctx: &AgentContext,
    ) -> Result<(), AgentError> {
        let Some(next) = self.next_decision_at else {
            self.next_decision_at = Some(self.schedule_after(tick)?);
            return Ok(());
        };
        if tick.timestamp < next {
            return Ok(());
        }
        let following = self.schedule_after(tick)?;

        self.close_positions(Side::Sell, ctx);
        self.close_positions(Side::Buy, ctx);

        self.next_decision_at = Some(following);

        if let (Some(policy), Some(instrument)) = (&self.policy, &self.instrument) {
            let confidence = policy.evaluate(features);
            debug!(agent = %ctx.agent_id, buy = confidence.buy, sell = confidence.sell, "Decision");
            match decide(confidence) {
                Some(Side::Buy) => {
                    ctx.contain(ctx.broker.buy(instrument, ORDER_UNITS));
                }
                Some(Side::Sell) => {
                    ctx.contain(ctx.broker.sell(instrument, ORDER_UNITS));
                }
                None => {}
            }
        }

        self.reference_price = Some(tick.bid);
        Ok(())
    }
}

fn build_agent(props: &ResolvedProperties) -> Result<Box<dyn Agent>, AgentError> {
    Ok(Box::new(NeuralNetAgent::from_properties(props)?))
}

/// At most one side to trade. Buy is checked first.
pub fn decide(confidence: Confidence) -> Option<Side> {
    if confidence.buy > CONFIDENCE_THRESHOLD {
        Some(Side::Buy)
    } else if confidence.sell > CONFIDENCE_THRESHOLD {
        Some(Side::Sell)
    } else {
        None
    }
}

fn round_to(value: f64, digits: i32) -> f64 {
    let scale = 10_f64.powi(digits);
    (value * scale).round() / scale
}

fn positive(value: i64, name: &str) -> Result<usize, AgentError> {
    usize::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| AgentError::Config(format!("{name} must be positive, got {value}")))
}

impl Agent for NeuralNetAgent {
    fn post_create(&mut self, ctx: &AgentContext) -> Result<(), AgentError> {
        self.averages = vec![
            MovingAverage::new(self.short_period)?,
            MovingAverage::new(self.long_period)?,
        ];
        let instrument = ctx.registry.create_or_get(&self.pair)?;
        self.pair = instrument.name.clone();
        self.instrument = Some(instrument);

        let policy: Arc<dyn DecisionPolicy> = match self.policy.take() {
            Some(policy) => policy,
            None => Arc::new(NeuralNet::load(&self.model_path)?),
        };
        let startup = policy.evaluate(&STARTUP_FEATURES);
        debug!(agent = %ctx.agent_id, buy = startup.buy, sell = startup.sell, "Startup inference");
        self.policy = Some(policy);

        self.reference_price = None;
        self.next_decision_at = None;
        info!(
            agent = %ctx.agent_id,
            pair = %self.pair,
            short = self.short_period,
            long = self.long_period,
            "Neural net agent ready"
        );
        Ok(())
    }

    fn on_tick(&mut self, tick: &Tick, ctx: &AgentContext) -> Result<(), AgentError> {
        if tick.pair != self.pair {
            return Ok(());
        }

        let outputs: Vec<Option<f64>> = self
            .averages
            .iter_mut()
            .map(|ma| ma.next_value(tick.bid))
            .collect();
        let (short, long) = match outputs.as_slice() {
            [Some(short), Some(long)] => (*short, *long),
            _ => return Ok(()),
        };

        ctx.observer.record(&SeriesPoint {
            agent_id: ctx.agent_id.clone(),
            label: "moving averages".to_string(),
            timestamp: tick.timestamp,
            series: vec![
                ("rate".to_string(), tick.bid),
                ("short".to_string(), short),
                ("long".to_string(), long),
            ],
        });

        let features = self.features(short, long, tick.bid);
        self.last_features = Some(features);
        self.trade(tick, &features, ctx)
    }

    fn export_state(&self) -> Value {
        let state = NeuralNetAgentState {
            mvs: self.averages.iter().map(MovingAverage::state).collect(),
        };
        serde_json::to_value(state).unwrap_or(Value::Null)
    }

    fn restore_state(&mut self, state: &Value) {
        let parsed = match serde_json::from_value::<NeuralNetAgentState>(state.clone()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "Ignoring agent state snapshot");
                return;
            }
        };
        if parsed.mvs.len() != self.averages.len() {
            warn!(
                expected = self.averages.len(),
                found = parsed.mvs.len(),
                "Ignoring agent state snapshot with wrong indicator count"
            );
            return;
        }

        // Apply all or nothing.
        let mut restored = self.averages.clone();
        for (ma, snapshot) in restored.iter_mut().zip(&parsed.mvs) {
            if let Err(e) = ma.restore_state(snapshot) {
                warn!(error = %e, "Ignoring agent state snapshot");
                return;
            }
        }
        self.averages = restored;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buy_wins_ties() {
        assert_eq!(decide(Confidence { buy: 0.81, sell: 0.95 }), Some(Side::Buy));
        assert_eq!(decide(Confidence { buy: 0.2, sell: 0.95 }), Some(Side::Sell));
    }

    #[test]
    fn threshold_is_strict() {
        assert_eq!(decide(Confidence { buy: 0.79, sell: 0.79 }), None);
        assert_eq!(decide(Confidence { buy: 0.8, sell: 0.8 }), None);
    }

    #[test]
    fn rounding_matches_feature_precision() {
        assert_eq!(round_to(0.123_456, 3), 0.123);
        assert_eq!(round_to(-0.000_015, 5), -0.00002);
        assert_eq!(round_to(1.2345, 3), 1.235);
    }

    #[test]
    fn properties_are_declared_in_order() {
        let names: Vec<String> = NeuralNetAgent::properties()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["short", "long", "neural", "trade_time"]);
    }
}
