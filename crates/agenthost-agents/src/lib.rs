pub mod broker;
pub mod error;
pub mod factory;
pub mod indicator;
pub mod neural_net_agent;
pub mod observer;
pub mod paper;
pub mod policy;
pub mod runtime;

pub mod test_support;

pub use broker::Broker;
pub use error::{AgentError, BrokerError, LifecycleError};
pub use factory::{AgentDescriptor, AgentFactory, ResolvedProperties};
pub use indicator::{Indicator, MovingAverage, MovingAverageState};
pub use neural_net_agent::NeuralNetAgent;
pub use observer::{Observer, SeriesPoint, TracingObserver};
pub use paper::{PaperBroker, ScopedBroker};
pub use policy::{Confidence, DecisionPolicy, Features, NeuralNet};
pub use runtime::{Agent, AgentContext, AgentRuntime, Lifecycle};
