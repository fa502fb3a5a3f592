//! Durable mirror of in-progress walks, one slot per pet.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::tracking::{TrackingSession, TrackingStatus};

const PAYLOAD_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedSession {
    version: u32,
    session: TrackingSession,
}

#[derive(Clone)]
pub struct SessionStore {
    db: Database,
}

impl SessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Replaces the pet's slot with `session`. An idle session has nothing to
    /// restore, so saving one clears the slot instead.
    pub async fn save(&self, pet_id: &str, session: &TrackingSession) -> Result<()> {
        if session.pet_id != pet_id {
            bail!(
                "session for pet {} cannot be stored under pet {}",
                session.pet_id,
                pet_id
            );
        }
        if session.status == TrackingStatus::Idle {
            return self.clear(pet_id).await;
        }

        let payload = serde_json::to_string(&PersistedSession {
            version: PAYLOAD_VERSION,
            session: session.clone(),
        })
        .context("failed to serialize tracking session")?;

        self.db
            .upsert_active_session(pet_id, payload, Utc::now())
            .await
            .with_context(|| format!("failed to persist tracking session for pet {pet_id}"))
    }

    /// Returns the stored session, if any. Unreadable entries are cleared and
    /// reported as absent so they cannot fail every restore.
    pub async fn load(&self, pet_id: &str) -> Result<Option<TrackingSession>> {
        let Some(payload) = self.db.get_active_session_payload(pet_id).await? else {
            return Ok(None);
        };

        match decode(pet_id, &payload) {
            Ok(session) => Ok(Some(session)),
            Err(err) => {
                warn!("Discarding unreadable tracking session for pet {pet_id}: {err:#}");
                self.clear(pet_id).await?;
                Ok(None)
            }
        }
    }

    pub async fn clear(&self, pet_id: &str) -> Result<()> {
        self.db
            .delete_active_session(pet_id)
            .await
            .with_context(|| format!("failed to clear tracking session for pet {pet_id}"))
    }

    pub async fn stored_pets(&self) -> Result<Vec<String>> {
        self.db.list_active_session_pets().await
    }
}

fn decode(pet_id: &str, payload: &str) -> Result<TrackingSession> {
    let persisted: PersistedSession =
        serde_json::from_str(payload).context("payload is not a tracking session")?;

    if persisted.version != PAYLOAD_VERSION {
        bail!("unsupported payload version {}", persisted.version);
    }
    let session = persisted.session;
    if session.pet_id != pet_id {
        bail!("payload belongs to pet {}", session.pet_id);
    }
    if session.status == TrackingStatus::Idle || session.started_at.is_none() {
        bail!("payload does not describe an active walk");
    }
    Ok(session)
}
