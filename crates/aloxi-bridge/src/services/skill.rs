//! Skill Adapter.
//!
//! Turns decoded skill requests into controller commands. Devices are looked
//! up in the controller's current snapshot, which may trail a reconciliation
//! in progress; a not-found answer is expected to be retried by the caller.
//! Request names the bridge does not implement get `{}` instead of an error,
//! since the skill host always expects a reply.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use aloxi_core::error::{AloxiError, Result};
use aloxi_core::model::ControlKind;
use aloxi_core::protocol::{ops, Envelope};
use aloxi_core::skill::{RequestKind, SkillRequest, SkillResponse};

use crate::controller::{ControllerAdapter, ControllerCommand};
use crate::dispatch::OperationHandler;
use crate::runtime::{spawn_supervised, Mailbox, SupervisionPolicy, Worker, WorkerHandle};
use crate::transport::TransportManager;

pub const COMPONENT: &str = "skill";

pub enum SkillMsg {
    Request {
        req: SkillRequest,
        reply: oneshot::Sender<Result<SkillResponse>>,
    },
    Inbound(Envelope),
}

impl From<Envelope> for SkillMsg {
    fn from(env: Envelope) -> Self {
        SkillMsg::Inbound(env)
    }
}

/// Cloneable handle to the skill worker.
#[derive(Clone)]
pub struct SkillAdapter {
    mailbox: Mailbox<SkillMsg>,
}

impl SkillAdapter {
    /// `transport` is only needed to answer requests that arrive over the bus.
    pub fn spawn(
        controller: ControllerAdapter,
        transport: Option<TransportManager>,
        capacity: usize,
        policy: SupervisionPolicy,
    ) -> (Self, WorkerHandle) {
        let (mailbox, handle) = spawn_supervised(COMPONENT, capacity, policy, move || {
            SkillWorker {
                controller: controller.clone(),
                transport: transport.clone(),
            }
        });
        (Self { mailbox }, handle)
    }

    pub async fn handle_request(&self, req: SkillRequest) -> Result<SkillResponse> {
        self.mailbox
            .ask(|reply| SkillMsg::Request { req, reply })
            .await?
    }

    /// Registry handler for `skillRequest`.
    pub fn handler(&self) -> Arc<dyn OperationHandler> {
        Arc::new(self.mailbox.clone())
    }
}

fn translate(kind: ControlKind, req: &SkillRequest) -> Result<(ControllerCommand, &'static str)> {
    match (kind, req.kind()) {
        (ControlKind::Light, RequestKind::TurnOn) => Ok((ControllerCommand::On, "TurnOnConfirmation")),
        (ControlKind::Light, RequestKind::TurnOff) => {
            Ok((ControllerCommand::Off, "TurnOffConfirmation"))
        }
        (ControlKind::Light, RequestKind::SetPercentage) => {
            let pct = req
                .percentage
                .ok_or_else(|| AloxiError::BadRequest("SetPercentageRequest without percentage".into()))?;
            if !(0.0..=100.0).contains(&pct) {
                return Err(AloxiError::BadRequest(format!("percentage {pct} out of range")));
            }
            // a switch has no dimming level
            let command = if pct > 0.0 {
                ControllerCommand::On
            } else {
                ControllerCommand::Off
            };
            Ok((command, "SetPercentageConfirmation"))
        }
        (_, other) => Err(AloxiError::Internal(format!("{other:?} is not a command"))),
    }
}

struct SkillWorker {
    controller: ControllerAdapter,
    transport: Option<TransportManager>,
}

impl SkillWorker {
    async fn process(&self, req: &SkillRequest) -> Result<SkillResponse> {
        match req.kind() {
            RequestKind::Unsupported => {
                tracing::info!(name = %req.name, "unsupported skill request acknowledged");
                return Ok(SkillResponse::empty());
            }
            RequestKind::Unknown => {
                tracing::warn!(name = %req.name, "unknown skill request");
                return Ok(SkillResponse::empty());
            }
            RequestKind::TurnOn | RequestKind::TurnOff | RequestKind::SetPercentage => {}
        }

        let id = req
            .appliance_id
            .as_deref()
            .ok_or_else(|| AloxiError::NotFound(format!("{} names no appliance", req.name)))?;

        let model = self.controller.model();
        let device = model
            .find(id)
            .ok_or_else(|| AloxiError::NotFound(format!("appliance {id}")))?;

        let (command, confirmation) = translate(device.kind, req)?;
        self.controller.execute(device.id.clone(), command).await?;

        tracing::info!(name = %req.name, appliance = %device.display_name, %command, "skill request executed");
        Ok(SkillResponse::named(confirmation))
    }

    async fn process_envelope(&self, env: Envelope) -> Result<()> {
        if env.operation != ops::SKILL_REQUEST {
            return Err(AloxiError::BadRequest(format!(
                "skill cannot handle operation {}",
                env.operation
            )));
        }
        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| AloxiError::Unavailable("no transport to reply on".into()))?;

        let message_id = env.data.get("messageId").cloned().unwrap_or(Value::Null);
        let result = match serde_json::from_value::<SkillRequest>(env.data) {
            Ok(req) => self.process(&req).await,
            Err(e) => Err(AloxiError::BadRequest(format!("invalid skill request: {e}"))),
        };

        let data = match result {
            Ok(resp) => json!({ "messageId": message_id, "response": resp.into_value() }),
            Err(e) => {
                tracing::warn!(error = %e, "skill request failed");
                json!({
                    "messageId": message_id,
                    "error": { "code": e.code().as_str(), "message": e.to_string() }
                })
            }
        };

        transport
            .publish(Envelope::new(ops::SKILL_RESPONSE, data))
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl Worker for SkillWorker {
    type Message = SkillMsg;

    async fn handle(&mut self, msg: SkillMsg) -> Result<()> {
        match msg {
            SkillMsg::Request { req, reply } => {
                let _ = reply.send(self.process(&req).await);
                Ok(())
            }
            SkillMsg::Inbound(env) => self.process_envelope(env).await,
        }
    }
}
