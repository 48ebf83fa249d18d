use std::fmt;
use std::sync::Arc;

use agenthost_models::Tick;
use agenthost_registry::InstrumentRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::broker::Broker;
use crate::error::{AgentError, BrokerError, LifecycleError};
use crate::observer::Observer;

/// A strategy the host can drive.
///
/// `post_create` runs once before any tick. `on_tick` is never called
/// concurrently for one agent. The state hooks default to a stateless agent.
pub trait Agent: Send {
    fn post_create(&mut self, ctx: &AgentContext) -> Result<(), AgentError>;

    fn on_tick(&mut self, tick: &Tick, ctx: &AgentContext) -> Result<(), AgentError>;

    /// Snapshot of everything needed to resume identical future computation.
    fn export_state(&self) -> Value {
        Value::Null
    }

    /// Apply a snapshot from `export_state`. Absent or malformed snapshots
    /// must leave the agent in its freshly created condition.
    fn restore_state(&mut self, _state: &Value) {}
}

/// Collaborators handed to an agent.
#[derive(Clone)]
pub struct AgentContext {
    pub agent_id: String,
    pub broker: Arc<dyn Broker>,
    pub observer: Arc<dyn Observer>,
    pub registry: Arc<InstrumentRegistry>,
}

impl AgentContext {
    /// Report a failed broker call and carry on.
    pub fn contain<T>(&self, result: Result<T, BrokerError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.observer.report_error(&self.agent_id, &e);
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Uninitialized,
    PostCreated,
    Active,
    Suspended,
    Terminated,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Lifecycle::Uninitialized => "uninitialized",
            Lifecycle::PostCreated => "post_created",
            Lifecycle::Active => "active",
            Lifecycle::Suspended => "suspended",
            Lifecycle::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Owns one agent and enforces its lifecycle:
/// `Uninitialized → PostCreated → Active → Suspended → Terminated`.
pub struct AgentRuntime {
    agent: Box<dyn Agent>,
    ctx: AgentContext,
    lifecycle: Lifecycle,
}

impl AgentRuntime {
    pub fn new(agent: Box<dyn Agent>, ctx: AgentContext) -> Self {
        Self {
            agent,
            ctx,
            lifecycle: Lifecycle::Uninitialized,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.ctx.agent_id
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn ensure_created(&self, operation: &'static str) -> Result<(), LifecycleError> {
        match self.lifecycle {
            Lifecycle::Uninitialized => Err(LifecycleError::NotCreated { operation }),
            Lifecycle::Terminated => Err(LifecycleError::Terminated { operation }),
            _ => Ok(()),
        }
    }

    pub fn post_create(&mut self) -> Result<(), AgentError> {
        match self.lifecycle {
            Lifecycle::Uninitialized => {}
            Lifecycle::Terminated => {
                return Err(LifecycleError::Terminated {
                    operation: "post_create",
                }
                .into())
            }
            state => return Err(LifecycleError::AlreadyCreated { state }.into()),
        }

        self.agent.post_create(&self.ctx)?;
        self.lifecycle = Lifecycle::PostCreated;
        debug!(agent = %self.ctx.agent_id, "Agent created");
        Ok(())
    }

    /// Deliver one tick. Broker failures that escape the agent are reported
    /// and do not fail the call.
    pub fn handle_tick(&mut self, tick: &Tick) -> Result<(), AgentError> {
        self.ensure_created("handle_tick")?;
        if self.lifecycle == Lifecycle::Suspended {
            return Err(LifecycleError::Suspended {
                operation: "handle_tick",
            }
            .into());
        }
        self.lifecycle = Lifecycle::Active;

        match self.agent.on_tick(tick, &self.ctx) {
            Err(AgentError::Broker(e)) => {
                self.ctx.observer.report_error(&self.ctx.agent_id, &e);
                Ok(())
            }
            other => other,
        }
    }

    pub fn export_state(&self) -> Result<Value, LifecycleError> {
        self.ensure_created("export_state")?;
        Ok(self.agent.export_state())
    }

    pub fn restore_state(&mut self, state: &Value) -> Result<(), LifecycleError> {
        self.ensure_created("restore_state")?;
        if self.lifecycle == Lifecycle::Active {
            return Err(LifecycleError::NotSuspended {
                operation: "restore_state",
                state: self.lifecycle,
            });
        }
        self.agent.restore_state(state);
        Ok(())
    }

    /// Export state and stop accepting ticks.
    pub fn suspend(&mut self) -> Result<Value, LifecycleError> {
        self.ensure_created("suspend")?;
        if self.lifecycle == Lifecycle::Suspended {
            return Err(LifecycleError::Suspended {
                operation: "suspend",
            });
        }
        let state = self.agent.export_state();
        self.lifecycle = Lifecycle::Suspended;
        info!(agent = %self.ctx.agent_id, "Agent suspended");
        Ok(state)
    }

    /// Restore `state` (when given) and accept ticks again.
    pub fn resume(&mut self, state: Option<&Value>) -> Result<(), LifecycleError> {
        self.ensure_created("resume")?;
        if self.lifecycle != Lifecycle::Suspended {
            return Err(LifecycleError::NotSuspended {
                operation: "resume",
                state: self.lifecycle,
            });
        }
        if let Some(state) = state {
            self.agent.restore_state(state);
        }
        self.lifecycle = Lifecycle::Active;
        info!(agent = %self.ctx.agent_id, "Agent resumed");
        Ok(())
    }

    /// Export final state and shut the agent down for good.
    pub fn terminate(&mut self) -> Result<Value, LifecycleError> {
        self.ensure_created("terminate")?;
        let state = self.agent.export_state();
        self.lifecycle = Lifecycle::Terminated;
        info!(agent = %self.ctx.agent_id, "Agent terminated");
        Ok(state)
    }
}
