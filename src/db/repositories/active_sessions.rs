use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::db::connection::Database;

/// Raw per-pet slot for the in-progress walk. The payload is opaque here;
/// `SessionStore` owns its encoding.
impl Database {
    pub async fn upsert_active_session(
        &self,
        pet_id: &str,
        payload: String,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let pet_id = pet_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO active_sessions (pet_id, payload, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(pet_id) DO UPDATE SET
                     payload = excluded.payload,
                     updated_at = excluded.updated_at",
                params![pet_id, payload, updated_at.to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_active_session_payload(&self, pet_id: &str) -> Result<Option<String>> {
        let pet_id = pet_id.to_string();
        self.execute(move |conn| {
            let payload = conn
                .query_row(
                    "SELECT payload FROM active_sessions WHERE pet_id = ?1",
                    params![pet_id],
                    |row| row.get::<_, String>(0),
                )
                .optional()?;
            Ok(payload)
        })
        .await
    }

    pub async fn delete_active_session(&self, pet_id: &str) -> Result<()> {
        let pet_id = pet_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "DELETE FROM active_sessions WHERE pet_id = ?1",
                params![pet_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn list_active_session_pets(&self) -> Result<Vec<String>> {
        self.execute(|conn| {
            let mut stmt =
                conn.prepare("SELECT pet_id FROM active_sessions ORDER BY updated_at DESC")?;
            let mut rows = stmt.query([])?;
            let mut pets = Vec::new();
            while let Some(row) = rows.next()? {
                pets.push(row.get(0)?);
            }
            Ok(pets)
        })
        .await
    }
}
