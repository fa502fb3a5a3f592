//! Command surface for the UI host. Each command resolves the pet's controller
//! and maps failures to strings.

use chrono::Utc;

use crate::{
    db::WalkRecord,
    geo::GeoSample,
    sampler::{SamplerMessage, SamplingFault, SamplingFaultKind},
    tracking::{StopPrompt, TrackingController, TrackingSnapshot, WalkEvent, WalkEventKind},
    walks::WalkClient,
    AppState,
};

async fn controller_for(
    state: &AppState,
    pet_id: &str,
) -> Result<TrackingController<crate::db::Database>, String> {
    if pet_id.trim().is_empty() {
        return Err("pet id is required".into());
    }
    state.tracker.controller(pet_id).await.map_err(|e| e.to_string())
}

pub async fn get_tracking_state(state: &AppState, pet_id: &str) -> Result<TrackingSnapshot, String> {
    let controller = controller_for(state, pet_id).await?;
    Ok(controller.snapshot().await)
}

pub async fn start_tracking(state: &AppState, pet_id: &str) -> Result<TrackingSnapshot, String> {
    let controller = controller_for(state, pet_id).await?;
    controller.start_tracking().await.map_err(|e| e.to_string())?;
    Ok(controller.snapshot().await)
}

pub fn push_sample(state: &AppState, sample: GeoSample) -> Result<usize, String> {
    let sampler = state
        .manual_sampler
        .as_ref()
        .ok_or_else(|| "location fixes are generated by the simulated sampler".to_string())?;
    Ok(sampler.push(SamplerMessage::Sample(sample)))
}

pub fn push_fault(
    state: &AppState,
    kind: SamplingFaultKind,
    message: Option<String>,
) -> Result<usize, String> {
    let sampler = state
        .manual_sampler
        .as_ref()
        .ok_or_else(|| "location faults are generated by the simulated sampler".to_string())?;
    let message = message.unwrap_or_else(|| format!("{kind:?}"));
    Ok(sampler.push(SamplerMessage::Fault(SamplingFault {
        kind,
        message,
        at: Utc::now(),
    })))
}

pub async fn log_walk_event(
    state: &AppState,
    pet_id: &str,
    kind: WalkEventKind,
) -> Result<Option<WalkEvent>, String> {
    let controller = controller_for(state, pet_id).await?;
    Ok(controller.log_event(kind).await)
}

pub async fn stop_tracking(state: &AppState, pet_id: &str) -> Result<Option<StopPrompt>, String> {
    let controller = controller_for(state, pet_id).await?;
    Ok(controller.stop_tracking().await)
}

pub async fn confirm_walk_event(
    state: &AppState,
    pet_id: &str,
    kind: WalkEventKind,
) -> Result<Option<WalkEvent>, String> {
    let controller = controller_for(state, pet_id).await?;
    Ok(controller.confirm_event(kind).await)
}

pub async fn cancel_stop(state: &AppState, pet_id: &str) -> Result<TrackingSnapshot, String> {
    let controller = controller_for(state, pet_id).await?;
    controller.cancel_confirm().await;
    Ok(controller.snapshot().await)
}

pub async fn save_walk(state: &AppState, pet_id: &str) -> Result<Option<WalkRecord>, String> {
    let controller = controller_for(state, pet_id).await?;
    controller.confirm_save().await.map_err(|e| format!("{e:#}"))
}

pub async fn discard_walk(state: &AppState, pet_id: &str) -> Result<TrackingSnapshot, String> {
    let controller = controller_for(state, pet_id).await?;
    controller.discard_walk().await;
    Ok(controller.snapshot().await)
}

pub async fn list_walks(state: &AppState, pet_id: &str) -> Result<Vec<WalkRecord>, String> {
    state
        .tracker
        .walks()
        .list_by_pet(pet_id.to_string())
        .await
        .map_err(|e| e.to_string())
}

pub async fn get_walk(state: &AppState, walk_id: &str) -> Result<Option<WalkRecord>, String> {
    state.db.get_walk(walk_id).await.map_err(|e| e.to_string())
}

pub async fn delete_walk(state: &AppState, walk_id: &str) -> Result<(), String> {
    state
        .tracker
        .walks()
        .delete(walk_id.to_string())
        .await
        .map_err(|e| e.to_string())
}
