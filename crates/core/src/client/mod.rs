use std::{
    collections::{HashMap, HashSet},
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, PoisonError,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::{self, Instant};

use crate::state::LightState;

/// Failure reported by a device client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    #[error("{target} rejected the request: {reason}")]
    Rejected { target: Target, reason: String },
    #[error("unknown group `{0}`")]
    UnknownGroup(String),
    #[error("bridge unreachable: {0}")]
    Unreachable(String),
}

/// Single addressable device endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Target {
    Light(String),
    Group(String),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Light(id) => write!(f, "light {id}"),
            Target::Group(id) => write!(f, "group {id}"),
        }
    }
}

/// Group details returned by the bridge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub lights: Vec<String>,
}

/// Remote control surface of a single bridge. Calls may be slow or fail; the
/// engine treats every error the same way.
#[async_trait]
pub trait DeviceClient: Send + Sync {
    async fn set_light_state(&self, light_id: &str, state: &LightState) -> Result<(), ClientError>;

    async fn set_group_light_state(
        &self,
        group_id: &str,
        state: &LightState,
    ) -> Result<(), ClientError>;

    async fn get_group(&self, group_id: &str) -> Result<GroupInfo, ClientError>;

    /// Routes to the light or group call depending on `target`.
    async fn set_state(&self, target: &Target, state: &LightState) -> Result<(), ClientError> {
        match target {
            Target::Light(id) => self.set_light_state(id, state).await,
            Target::Group(id) => self.set_group_light_state(id, state).await,
        }
    }
}

/// One call received by the [`SimulatedBridge`].
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub target: Target,
    pub state: LightState,
    pub at: Instant,
    pub delivered: bool,
}

/// In-memory bridge that records every state it is sent.
#[derive(Debug, Default)]
pub struct SimulatedBridge {
    groups: HashMap<String, GroupInfo>,
    latency: Duration,
    failing: AtomicBool,
    failing_targets: Mutex<HashSet<Target>>,
    commands: Mutex<Vec<Command>>,
}

impl SimulatedBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a group and its member lights.
    pub fn with_group<I, S>(mut self, id: impl Into<String>, lights: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let id = id.into();
        self.groups.insert(
            id.clone(),
            GroupInfo {
                id,
                name: None,
                lights: lights.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    /// Delay applied to every call before it is answered.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes every subsequent call fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Makes calls to one specific target fail.
    pub fn fail_target(&self, target: Target) {
        self.failing_targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(target);
    }

    pub fn commands(&self) -> Vec<Command> {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn command_count(&self) -> usize {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn clear(&self) {
        self.commands
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    async fn receive(&self, target: Target, state: &LightState) -> Result<(), ClientError> {
        if !self.latency.is_zero() {
            time::sleep(self.latency).await;
        }

        let rejected = self.failing.load(Ordering::SeqCst)
            || self
                .failing_targets
                .lock()
                .map_err(|_| ClientError::Unreachable("bridge state has been poisoned".into()))?
                .contains(&target);

        tracing::debug!(
            %target,
            delivered = !rejected,
            state = %serde_json::to_string(&state.to_wire()).unwrap_or_default(),
            "simulated bridge received state"
        );

        self.commands
            .lock()
            .map_err(|_| ClientError::Unreachable("bridge state has been poisoned".into()))?
            .push(Command {
                target: target.clone(),
                state: state.clone(),
                at: Instant::now(),
                delivered: !rejected,
            });

        if rejected {
            Err(ClientError::Rejected {
                target,
                reason: "simulated failure".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DeviceClient for SimulatedBridge {
    async fn set_light_state(&self, light_id: &str, state: &LightState) -> Result<(), ClientError> {
        self.receive(Target::Light(light_id.to_string()), state).await
    }

    async fn set_group_light_state(
        &self,
        group_id: &str,
        state: &LightState,
    ) -> Result<(), ClientError> {
        self.receive(Target::Group(group_id.to_string()), state).await
    }

    async fn get_group(&self, group_id: &str) -> Result<GroupInfo, ClientError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ClientError::Unreachable("simulated failure".to_string()));
        }
        self.groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| ClientError::UnknownGroup(group_id.to_string()))
    }
}
