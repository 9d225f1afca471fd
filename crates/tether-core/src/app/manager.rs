//! LaunchManager - ランタイム側の `/running` オブジェクト
//!
//! ランチャーからの `Launch` を受けて Reset を行い、呼び出し元を owner とする
//! 制御オブジェクトを公開してそのパスを返します。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::coordinator::Coordinator;
use super::registry::ControlRegistry;
use crate::codec::EncodedBundle;
use crate::domain::{ApplicationIdentity, ErrorKind, LaunchRequest};
use crate::ports::{BusName, MethodHandler, Reply, Request};

pub struct LaunchManager {
    coordinator: Arc<Coordinator>,
    registry: Arc<ControlRegistry>,
}

impl LaunchManager {
    pub fn new(coordinator: Arc<Coordinator>, registry: Arc<ControlRegistry>) -> Self {
        Self {
            coordinator,
            registry,
        }
    }

    async fn launch(
        &self,
        owner: &BusName,
        app_id: String,
        encoded_bundle: Option<EncodedBundle>,
    ) -> Reply {
        let bundle = match encoded_bundle.as_ref().map(EncodedBundle::decode).transpose() {
            Ok(bundle) => bundle,
            Err(err) => return Reply::failed(err.kind(), err.to_string()),
        };
        let request = LaunchRequest::for_app(app_id, bundle);

        let outcome = match self.coordinator.reset(&request).await {
            Ok(outcome) => outcome,
            Err(err) => return Reply::failed(err.kind(), err.to_string()),
        };
        let info = outcome.instance();

        match self
            .registry
            .attach(&self.coordinator, info, owner.clone(), encoded_bundle)
            .await
        {
            Ok(path) => {
                info!(instance = %info.id, path = %path, owner = %owner, "launch request served");
                Reply::Launched(path)
            }
            Err(err) => {
                warn!(instance = %info.id, error = %err, "control object export failed");
                if outcome.is_new_launch() {
                    self.coordinator.terminate_instance(info.id).await;
                }
                err.into_reply()
            }
        }
    }

    fn is_running(&self, app_id: &str) -> Reply {
        match ApplicationIdentity::resolve(app_id) {
            Ok(identity) => Reply::Bool(self.coordinator.is_running(&identity)),
            Err(err) => Reply::failed(ErrorKind::Identity, err.to_string()),
        }
    }
}

#[async_trait]
impl MethodHandler for LaunchManager {
    async fn handle(&self, sender: &BusName, request: Request) -> Reply {
        debug!(sender = %sender, method = request.method_name(), "manager call");
        match request {
            Request::Launch {
                app_id,
                encoded_bundle,
            } => self.launch(sender, app_id, encoded_bundle).await,
            Request::IsApplicationRunning { app_id } => self.is_running(&app_id),
            other => Reply::unknown_method(&other),
        }
    }
}
