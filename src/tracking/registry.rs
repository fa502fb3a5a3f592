use std::collections::HashMap;

use anyhow::Result;
use log::info;
use tokio::sync::{broadcast, Mutex};

use crate::walks::WalkClient;

use super::{ControllerDeps, TrackingController, TrackingNotice};

/// One controller per pet. Controllers are created lazily and resume any
/// walk the session store still holds for that pet.
pub struct WalkTracker<W: WalkClient> {
    controllers: Mutex<HashMap<String, TrackingController<W>>>,
    deps: ControllerDeps<W>,
}

impl<W: WalkClient> WalkTracker<W> {
    pub fn new(deps: ControllerDeps<W>) -> Self {
        Self {
            controllers: Mutex::new(HashMap::new()),
            deps,
        }
    }

    pub fn walks(&self) -> &W {
        &self.deps.walks
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TrackingNotice> {
        self.deps.notices.subscribe()
    }

    pub async fn controller(&self, pet_id: &str) -> Result<TrackingController<W>> {
        let mut controllers = self.controllers.lock().await;
        if let Some(controller) = controllers.get(pet_id) {
            return Ok(controller.clone());
        }

        let controller = TrackingController::new(pet_id, self.deps.clone());
        controller.resume().await?;
        controllers.insert(pet_id.to_string(), controller.clone());
        Ok(controller)
    }

    /// Brings back every walk left in the session store. Returns the pets
    /// whose walks were restored.
    pub async fn resume_all(&self) -> Result<Vec<String>> {
        let mut restored = Vec::new();
        for pet_id in self.deps.store.stored_pets().await? {
            let controller = self.controller(&pet_id).await?;
            if controller.snapshot().await.session.is_active() {
                restored.push(pet_id);
            }
        }
        if !restored.is_empty() {
            info!("Restored {} in-progress walk(s)", restored.len());
        }
        Ok(restored)
    }

    pub async fn shutdown(&self) {
        let controllers: Vec<_> = self.controllers.lock().await.values().cloned().collect();
        for controller in controllers {
            controller.shutdown().await;
        }
    }

    pub async fn active_pets(&self) -> Vec<String> {
        let controllers: Vec<_> = self.controllers.lock().await.values().cloned().collect();
        let mut active = Vec::new();
        for controller in controllers {
            if controller.snapshot().await.session.is_active() {
                active.push(controller.pet_id().to_string());
            }
        }
        active.sort();
        active
    }
}
