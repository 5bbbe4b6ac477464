//! Supervision root.
//!
//! Builds the components in dependency order and wires them together. A
//! failing build step does not stop the bootstrap: the component is recorded
//! as unavailable with its reason, and whatever can still run is started.
//! A bridge with an unreachable broker still reconciles the device model.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use aloxi_core::error::{AloxiError, Result};
use aloxi_core::protocol::ops;

use crate::config::BridgeConfig;
use crate::controller::{ControllerAdapter, ControllerClient};
use crate::events::{ConnectivityState, EventBus, StateEvent};
use crate::runtime::WorkerHandle;
use crate::services::{EchoOutcome, EchoProcessor, SkillAdapter};
use crate::status::{Availability, BridgeStatus, StatusConsolidator};
use crate::transport::{Connector, TransportManager};

/// Outcome of one build step.
#[derive(Debug, Clone)]
pub enum Component<T> {
    Ready(T),
    Unavailable { reason: String },
}

impl<T> Component<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Component::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            Component::Ready(c) => Some(c),
            Component::Unavailable { .. } => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Component::Ready(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Component::Ready(_) => None,
            Component::Unavailable { reason } => Some(reason),
        }
    }

    fn availability(&self) -> Availability {
        match self {
            Component::Ready(_) => Availability::Ready,
            Component::Unavailable { reason } => Availability::Unavailable(reason.clone()),
        }
    }
}

pub struct Bridge {
    events: EventBus,
    transport: Component<TransportManager>,
    echo: Component<EchoProcessor>,
    controller: Component<ControllerAdapter>,
    skill: Component<SkillAdapter>,
    status: StatusConsolidator,
    echo_deadline: Duration,
    workers: Vec<WorkerHandle>,
    tasks: Vec<JoinHandle<()>>,
}

impl Bridge {
    /// Build and wire every component. Never fails as a whole; check the
    /// individual components or `status()` for what came up.
    pub async fn start(cfg: BridgeConfig, connector: Arc<dyn Connector>) -> Self {
        let events = EventBus::new();
        let capacity = cfg.supervision.mailbox_capacity;
        let policy = cfg.supervision.policy();
        let mut workers = Vec::new();
        let mut tasks = Vec::new();

        // 1) transport
        let (manager, handle) = TransportManager::spawn(
            cfg.transport.clone(),
            connector,
            events.clone(),
            capacity,
            policy,
        );
        let connected = manager.connect().await;
        // emitted before the consolidator subscribed; replayed during wiring
        let initial_state = manager.state();
        let transport = match connected {
            Ok(()) => {
                workers.push(handle);
                Component::Ready(manager)
            }
            Err(e) => {
                tracing::error!(component = "transport", error = %e, "component unavailable");
                handle.abort();
                Component::unavailable(e.to_string())
            }
        };

        // 2) echo
        let echo = match transport.ready() {
            Some(t) => {
                let (echo, handle) = EchoProcessor::spawn(t.clone(), capacity, policy);
                workers.push(handle);
                Component::Ready(echo)
            }
            None => {
                tracing::warn!(component = "echo", "component unavailable: no transport");
                Component::unavailable("transport unavailable")
            }
        };

        // 3) controller
        let controller = match ControllerClient::new(&cfg.controller) {
            Ok(client) => {
                let (adapter, handle) = ControllerAdapter::spawn(
                    client,
                    cfg.controller.ignore_rules(),
                    events.clone(),
                    capacity,
                    policy,
                );
                workers.push(handle);
                Component::Ready(adapter)
            }
            Err(e) => {
                tracing::error!(component = "controller", error = %e, "component unavailable");
                Component::unavailable(e.to_string())
            }
        };

        // 4) skill
        let skill = match controller.ready() {
            Some(c) => {
                let (skill, handle) =
                    SkillAdapter::spawn(c.clone(), transport.ready().cloned(), capacity, policy);
                workers.push(handle);
                Component::Ready(skill)
            }
            None => {
                tracing::warn!(component = "skill", "component unavailable: no controller");
                Component::unavailable("controller unavailable")
            }
        };

        // 5) status
        let (status, handle, pump) = StatusConsolidator::spawn(&events, capacity, policy);
        workers.push(handle);
        tasks.push(pump);

        let bridge = Self {
            events,
            transport,
            echo,
            controller,
            skill,
            status,
            echo_deadline: cfg.echo.deadline(),
            workers,
            tasks,
        };
        bridge.wire(&cfg, initial_state).await
    }

    async fn wire(mut self, cfg: &BridgeConfig, initial: ConnectivityState) -> Self {
        let transport_state = self.transport.ready().map_or(initial, |t| t.state());
        let _ = self
            .status
            .observe(StateEvent::Transport(transport_state))
            .await;

        if let Some(t) = self.transport.ready() {
            if let Some(echo) = self.echo.ready() {
                t.register_handler(ops::ECHO_RESPONSE, echo.handler());
                t.register_handler(ops::ECHO_REQUEST, echo.handler());
            }
            if let Some(skill) = self.skill.ready() {
                t.register_handler(ops::SKILL_REQUEST, skill.handler());
            }
        }

        for (name, availability) in [
            ("transport", self.transport.availability()),
            ("echo", self.echo.availability()),
            ("controller", self.controller.availability()),
            ("skill", self.skill.availability()),
            ("status", Availability::Ready),
        ] {
            let _ = self.status.set_component(name, availability).await;
        }

        if let Some(c) = self.controller.ready() {
            if let Err(e) = c.load_model().await {
                tracing::warn!(error = %e, "initial model load failed, periodic refresh will retry");
            }
            if let Some(period) = cfg.controller.refresh_interval() {
                self.tasks.push(c.spawn_refresh(period));
            }
        }

        tracing::info!(
            transport = self.transport.is_ready(),
            echo = self.echo.is_ready(),
            controller = self.controller.is_ready(),
            skill = self.skill.is_ready(),
            "bridge started"
        );
        self
    }

    pub fn transport(&self) -> &Component<TransportManager> {
        &self.transport
    }

    pub fn echo(&self) -> &Component<EchoProcessor> {
        &self.echo
    }

    pub fn controller(&self) -> &Component<ControllerAdapter> {
        &self.controller
    }

    pub fn skill(&self) -> &Component<SkillAdapter> {
        &self.skill
    }

    pub fn status_consolidator(&self) -> &StatusConsolidator {
        &self.status
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn status(&self) -> BridgeStatus {
        self.status.status()
    }

    /// Echo over the channel with the configured deadline.
    pub async fn send_echo(&self) -> Result<EchoOutcome> {
        match &self.echo {
            Component::Ready(echo) => echo.send_echo(self.echo_deadline).await,
            Component::Unavailable { reason } => Err(AloxiError::Unavailable(reason.clone())),
        }
    }

    /// Restarts so far, per running worker.
    pub fn restart_counts(&self) -> BTreeMap<&'static str, usize> {
        self.workers
            .iter()
            .map(|w| (w.name(), w.restarts()))
            .collect()
    }

    pub async fn shutdown(self) {
        if let Some(t) = self.transport.ready() {
            if let Err(e) = t.disconnect().await {
                tracing::warn!(error = %e, "transport disconnect failed");
            }
        }
        for task in &self.tasks {
            task.abort();
        }
        for worker in &self.workers {
            worker.abort();
        }
        tracing::info!("bridge stopped");
    }
}
