//! Line-oriented JSON host: one command per input line, one response per
//! output line. Notices from the tracker are interleaved as `{"notice":...}`.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::{broadcast::error::RecvError, mpsc},
    task::{JoinHandle, JoinSet},
};

use crate::{
    commands,
    geo::GeoSample,
    sampler::SamplingFaultKind,
    tracking::WalkEventKind,
    AppState,
};

#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum HostCommand {
    State {
        pet_id: Option<String>,
    },
    Start {
        pet_id: Option<String>,
    },
    Sample {
        lat: f64,
        lon: f64,
        accuracy: Option<f64>,
        timestamp: Option<DateTime<Utc>>,
    },
    Fault {
        kind: SamplingFaultKind,
        message: Option<String>,
    },
    LogEvent {
        pet_id: Option<String>,
        kind: WalkEventKind,
    },
    Stop {
        pet_id: Option<String>,
    },
    ConfirmEvent {
        pet_id: Option<String>,
        kind: WalkEventKind,
    },
    CancelStop {
        pet_id: Option<String>,
    },
    Save {
        pet_id: Option<String>,
    },
    Discard {
        pet_id: Option<String>,
    },
    ListWalks {
        pet_id: Option<String>,
    },
    GetWalk {
        walk_id: String,
    },
    DeleteWalk {
        walk_id: String,
    },
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}

pub async fn dispatch(state: &AppState, command: HostCommand) -> Result<Value, String> {
    let default_pet = state.settings.tracking().active_pet_id;
    let pet = |pet_id: Option<String>| pet_id.unwrap_or_else(|| default_pet.clone());

    match command {
        HostCommand::State { pet_id } => to_value(commands::get_tracking_state(state, &pet(pet_id)).await?),
        HostCommand::Start { pet_id } => to_value(commands::start_tracking(state, &pet(pet_id)).await?),
        HostCommand::Sample {
            lat,
            lon,
            accuracy,
            timestamp,
        } => {
            let sample = GeoSample {
                lat,
                lon,
                accuracy,
                timestamp: timestamp.unwrap_or_else(Utc::now),
            };
            to_value(json!({ "delivered": commands::push_sample(state, sample)? }))
        }
        HostCommand::Fault { kind, message } => {
            to_value(json!({ "delivered": commands::push_fault(state, kind, message)? }))
        }
        HostCommand::LogEvent { pet_id, kind } => {
            to_value(commands::log_walk_event(state, &pet(pet_id), kind).await?)
        }
        HostCommand::Stop { pet_id } => to_value(commands::stop_tracking(state, &pet(pet_id)).await?),
        HostCommand::ConfirmEvent { pet_id, kind } => {
            to_value(commands::confirm_walk_event(state, &pet(pet_id), kind).await?)
        }
        HostCommand::CancelStop { pet_id } => to_value(commands::cancel_stop(state, &pet(pet_id)).await?),
        HostCommand::Save { pet_id } => to_value(commands::save_walk(state, &pet(pet_id)).await?),
        HostCommand::Discard { pet_id } => to_value(commands::discard_walk(state, &pet(pet_id)).await?),
        HostCommand::ListWalks { pet_id } => to_value(commands::list_walks(state, &pet(pet_id)).await?),
        HostCommand::GetWalk { walk_id } => to_value(commands::get_walk(state, &walk_id).await?),
        HostCommand::DeleteWalk { walk_id } => {
            commands::delete_walk(state, &walk_id).await?;
            Ok(Value::Null)
        }
    }
}

/// A parsed input line. An optional `id` on the line is echoed back on its
/// response, since background commands may answer out of order.
pub struct Request {
    id: Option<Value>,
    command: Result<HostCommand, String>,
}

impl Request {
    pub fn parse(line: &str) -> Self {
        let raw: Value = match serde_json::from_str(line) {
            Ok(raw) => raw,
            Err(err) => {
                return Self {
                    id: None,
                    command: Err(format!("invalid command: {err}")),
                }
            }
        };
        let id = raw.get("id").cloned();
        let command =
            serde_json::from_value(raw).map_err(|err| format!("invalid command: {err}"));
        Self { id, command }
    }

    /// Saves wait on the walk client; everything else answers immediately.
    fn runs_in_background(&self) -> bool {
        matches!(self.command, Ok(HostCommand::Save { .. }))
    }

    pub async fn answer(self, state: &AppState) -> String {
        let outcome = match self.command {
            Ok(command) => dispatch(state, command).await,
            Err(message) => Err(message),
        };
        let mut response = match outcome {
            Ok(value) => json!({ "ok": value }),
            Err(message) => json!({ "error": message }),
        };
        if let Some(id) = self.id {
            response["id"] = id;
        }
        response.to_string()
    }
}

/// Forwards tracker notices to the output channel until it closes.
pub fn forward_notices(state: &AppState, output: mpsc::UnboundedSender<String>) -> JoinHandle<()> {
    let mut notices = state.tracker.subscribe();
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) => {
                    let line = json!({ "notice": notice }).to_string();
                    if output.send(line).is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!("Dropped {skipped} notices"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Answers input lines in order, except saves, which run on their own task
/// so a slow walk client does not hold up other commands. Returns once input
/// closes and every background save has answered.
pub async fn serve<R>(state: Arc<AppState>, input: R, output: mpsc::UnboundedSender<String>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut background = JoinSet::new();
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        while background.try_join_next().is_some() {}

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let request = Request::parse(line);
        if request.runs_in_background() {
            let state = state.clone();
            let output = output.clone();
            background.spawn(async move {
                let _ = output.send(request.answer(&state).await);
            });
            continue;
        }

        if output.send(request.answer(&state).await).is_err() {
            break;
        }
    }

    if !background.is_empty() {
        info!("Input closed, waiting for {} pending save(s)", background.len());
    }
    while background.join_next().await.is_some() {}
    info!("Input closed, host shutting down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_support::test_state;
    use serde_json::Value;

    async fn handle_line(state: &AppState, line: &str) -> String {
        Request::parse(line).answer(state).await
    }

    async fn call(state: &AppState, line: &str) -> Value {
        serde_json::from_str(&handle_line(state, line).await).unwrap()
    }

    #[tokio::test]
    async fn full_walk_over_the_wire() {
        let state = test_state();

        let started = call(&state, r#"{"cmd":"start","petId":"rex"}"#).await;
        assert_eq!(started["ok"]["session"]["status"], "tracking");

        // fixes go through the manual sampler and the forwarder task
        call(&state, r#"{"cmd":"sample","lat":0.0,"lon":0.0}"#).await;
        call(&state, r#"{"cmd":"sample","lat":0.0,"lon":0.001}"#).await;
        let mut points = 0;
        for _ in 0..400 {
            let snapshot = call(&state, r#"{"cmd":"state","petId":"rex"}"#).await;
            points = snapshot["ok"]["session"]["path"].as_array().unwrap().len();
            if points == 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(points, 2);

        let event = call(&state, r#"{"cmd":"logEvent","petId":"rex","kind":"elimination-a"}"#).await;
        assert_eq!(event["ok"]["type"], "elimination-a");

        let prompt = call(&state, r#"{"cmd":"stop","petId":"rex"}"#).await;
        assert_eq!(prompt["ok"]["missingEvents"], json!(["elimination-b"]));

        let saved = call(&state, r#"{"cmd":"save","petId":"rex"}"#).await;
        assert_eq!(saved["ok"]["distanceMeters"], 111);

        let walks = call(&state, r#"{"cmd":"listWalks","petId":"rex"}"#).await;
        assert_eq!(walks["ok"].as_array().unwrap().len(), 1);

        let walk_id = saved["ok"]["id"].as_str().unwrap();
        let fetched = call(&state, &format!(r#"{{"cmd":"getWalk","walkId":"{walk_id}"}}"#)).await;
        assert_eq!(fetched["ok"]["events"][0]["type"], "elimination-a");

        let deleted = call(&state, &format!(r#"{{"cmd":"deleteWalk","walkId":"{walk_id}"}}"#)).await;
        assert!(deleted.get("ok").is_some());
        let gone = call(&state, &format!(r#"{{"cmd":"getWalk","walkId":"{walk_id}"}}"#)).await;
        assert_eq!(gone["ok"], Value::Null);
        state.tracker.shutdown().await;
    }

    #[tokio::test]
    async fn defaults_to_active_pet() {
        let state = test_state();
        call(&state, r#"{"cmd":"start"}"#).await;
        let snapshot = call(&state, r#"{"cmd":"state"}"#).await;
        assert_eq!(snapshot["ok"]["session"]["petId"], "default");
        state.tracker.shutdown().await;
    }

    #[tokio::test]
    async fn bad_input_is_reported_not_fatal() {
        let state = test_state();
        let garbage = call(&state, "{nope").await;
        assert!(garbage["error"].as_str().unwrap().starts_with("invalid command"));

        let missing = call(&state, r#"{"cmd":"deleteWalk","walkId":"missing"}"#).await;
        assert!(missing.get("error").is_some());

        let blank_pet = call(&state, r#"{"cmd":"start","petId":" "}"#).await;
        assert_eq!(blank_pet["error"], "pet id is required");
    }

    #[tokio::test]
    async fn serve_answers_each_line() {
        let state = Arc::new(test_state());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let input = "{\"cmd\":\"state\",\"petId\":\"rex\"}\n\n{\"cmd\":\"stop\",\"petId\":\"rex\"}\n";

        serve(state.clone(), input.as_bytes(), tx).await.unwrap();

        let first: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["ok"]["controls"]["start"], true);
        let second: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(second["ok"], Value::Null);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn slow_save_does_not_block_other_commands() {
        use tokio::io::{duplex, AsyncWriteExt, BufReader};
        use tokio::sync::oneshot;

        let state = Arc::new(test_state());
        call(&state, r#"{"cmd":"start","petId":"rex"}"#).await;
        call(&state, r#"{"cmd":"stop","petId":"rex"}"#).await;
        let rex = state.tracker.controller("rex").await.unwrap();

        // Park the database worker so the walk insert queues behind it.
        let (release, parked) = std::sync::mpsc::channel::<()>();
        let (started_tx, started_rx) = oneshot::channel();
        let db = state.db.clone();
        let blocker = tokio::spawn(async move {
            db.execute(move |_| {
                let _ = started_tx.send(());
                let _ = parked.recv();
                Ok(())
            })
            .await
        });
        started_rx.await.unwrap();

        let (mut input, reader) = duplex(1024);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let server = tokio::spawn(serve(state.clone(), BufReader::new(reader), tx));

        input
            .write_all(b"{\"id\":1,\"cmd\":\"save\",\"petId\":\"rex\"}\n")
            .await
            .unwrap();
        let mut submitting = false;
        for _ in 0..400 {
            if rex.snapshot().await.submitting {
                submitting = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(submitting);

        input
            .write_all(b"{\"id\":2,\"cmd\":\"state\",\"petId\":\"rex\"}\n")
            .await
            .unwrap();
        let first: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["id"], 2);
        assert_eq!(first["ok"]["submitting"], true);
        assert_eq!(first["ok"]["controls"]["save"], false);

        release.send(()).unwrap();
        let second: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(second["id"], 1);
        assert_eq!(second["ok"]["petId"], "rex");

        drop(input);
        server.await.unwrap().unwrap();
        blocker.await.unwrap().unwrap();
        assert!(rx.recv().await.is_none());
        state.tracker.shutdown().await;
    }

    #[tokio::test]
    async fn notices_are_forwarded() {
        let state = test_state();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let forwarder = forward_notices(&state, tx);

        call(&state, r#"{"cmd":"start","petId":"rex"}"#).await;
        let line = rx.recv().await.unwrap();
        let notice: Value = serde_json::from_str(&line).unwrap();
        assert!(notice["notice"]["type"].is_string());

        state.tracker.shutdown().await;
        forwarder.abort();
    }
}
