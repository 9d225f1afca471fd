//! TracingEventSink - ドメインイベントをログに流す

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::DomainEvent;
use crate::ports::EventSink;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: &DomainEvent) {
        match event {
            DomainEvent::Launched { instance, identity } => {
                info!(instance = %instance, identity = %identity, "application launched");
            }
            DomainEvent::LaunchFailed { identity, reason } => {
                warn!(identity = %identity, reason = %reason, "application launch failed");
            }
            DomainEvent::Suspended { instance, identity } => {
                info!(instance = %instance, identity = %identity, "application suspended");
            }
            DomainEvent::Resumed { instance, identity } => {
                info!(instance = %instance, identity = %identity, "application resumed");
            }
            DomainEvent::Terminated { instance, identity } => {
                info!(instance = %instance, identity = %identity, "application terminated");
            }
        }
    }
}
