use anyhow::{bail, Result};
use chrono::Utc;
use rusqlite::{params, Row};
use uuid::Uuid;

use crate::db::{
    connection::Database,
    helpers::{from_json_column, parse_datetime, to_i64, to_json_column, to_u64},
    models::{NewWalk, WalkRecord},
};

const WALK_COLUMNS: &str =
    "id, pet_id, start_time, end_time, distance_meters, path, events, created_at, updated_at";

fn row_to_walk(row: &Row) -> Result<WalkRecord> {
    let start_time: String = row.get("start_time")?;
    let end_time: String = row.get("end_time")?;
    let distance_meters: i64 = row.get("distance_meters")?;
    let path: String = row.get("path")?;
    let events: String = row.get("events")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(WalkRecord {
        id: row.get("id")?,
        pet_id: row.get("pet_id")?,
        start_time: parse_datetime(&start_time, "start_time")?,
        end_time: parse_datetime(&end_time, "end_time")?,
        distance_meters: to_u64(distance_meters, "distance_meters")?,
        path: from_json_column(&path, "path")?,
        events: from_json_column(&events, "events")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

fn select_walk(conn: &rusqlite::Connection, walk_id: &str) -> Result<Option<WalkRecord>> {
    let mut stmt = conn.prepare(&format!("SELECT {WALK_COLUMNS} FROM walks WHERE id = ?1"))?;
    let mut rows = stmt.query(params![walk_id])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_walk(row)?)),
        None => Ok(None),
    }
}

impl Database {
    pub async fn insert_walk(&self, walk: &NewWalk) -> Result<WalkRecord> {
        walk.validate()?;
        let now = Utc::now();
        let record = WalkRecord {
            id: Uuid::new_v4().to_string(),
            pet_id: walk.pet_id.clone(),
            start_time: walk.start_time,
            end_time: walk.end_time,
            distance_meters: walk.distance_meters,
            path: walk.path.clone(),
            events: walk.events.clone(),
            created_at: now,
            updated_at: now,
        };

        let row = record.clone();
        self.execute(move |conn| {
            conn.execute(
                &format!("INSERT INTO walks ({WALK_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
                params![
                    row.id,
                    row.pet_id,
                    row.start_time.to_rfc3339(),
                    row.end_time.to_rfc3339(),
                    to_i64(row.distance_meters)?,
                    to_json_column(&row.path, "path")?,
                    to_json_column(&row.events, "events")?,
                    row.created_at.to_rfc3339(),
                    row.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await?;

        Ok(record)
    }

    pub async fn update_walk(&self, walk_id: &str, walk: &NewWalk) -> Result<WalkRecord> {
        walk.validate()?;
        let walk_id = walk_id.to_string();
        let walk = walk.clone();
        self.execute(move |conn| {
            let rows_affected = conn.execute(
                "UPDATE walks
                 SET pet_id = ?1,
                     start_time = ?2,
                     end_time = ?3,
                     distance_meters = ?4,
                     path = ?5,
                     events = ?6,
                     updated_at = ?7
                 WHERE id = ?8",
                params![
                    walk.pet_id,
                    walk.start_time.to_rfc3339(),
                    walk.end_time.to_rfc3339(),
                    to_i64(walk.distance_meters)?,
                    to_json_column(&walk.path, "path")?,
                    to_json_column(&walk.events, "events")?,
                    Utc::now().to_rfc3339(),
                    walk_id,
                ],
            )?;

            if rows_affected == 0 {
                bail!("walk {walk_id} not found");
            }

            match select_walk(conn, &walk_id)? {
                Some(record) => Ok(record),
                None => bail!("walk {walk_id} not found"),
            }
        })
        .await
    }

    pub async fn delete_walk(&self, walk_id: &str) -> Result<()> {
        let walk_id = walk_id.to_string();
        self.execute(move |conn| {
            let rows_affected = conn.execute("DELETE FROM walks WHERE id = ?1", params![walk_id])?;
            if rows_affected == 0 {
                bail!("walk {walk_id} not found");
            }
            Ok(())
        })
        .await
    }

    pub async fn get_walk(&self, walk_id: &str) -> Result<Option<WalkRecord>> {
        let walk_id = walk_id.to_string();
        self.execute(move |conn| select_walk(conn, &walk_id)).await
    }

    pub async fn list_walks_for_pet(&self, pet_id: &str) -> Result<Vec<WalkRecord>> {
        let pet_id = pet_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {WALK_COLUMNS}
                 FROM walks
                 WHERE pet_id = ?1
                 ORDER BY start_time DESC"
            ))?;

            let mut rows = stmt.query(params![pet_id])?;
            let mut walks = Vec::new();
            while let Some(row) = rows.next()? {
                walks.push(row_to_walk(row)?);
            }
            Ok(walks)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;
    use crate::tracking::{WalkEvent, WalkEventKind};
    use chrono::{Duration, TimeZone};

    fn new_walk(pet_id: &str, start_hour: u32) -> NewWalk {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, start_hour, 0, 0).unwrap();
        NewWalk {
            pet_id: pet_id.into(),
            start_time: start,
            end_time: start + Duration::minutes(30),
            distance_meters: 111,
            path: vec![GeoPoint::new(0.0, 0.0), GeoPoint::new(0.0, 0.001)],
            events: vec![WalkEvent {
                kind: WalkEventKind::Urination,
                elapsed_seconds: 125,
                position: Some(GeoPoint::new(0.0, 0.001)),
                occurred_at: start + Duration::seconds(125),
            }],
        }
    }

    #[tokio::test]
    async fn insert_then_read_back() {
        let db = Database::in_memory().unwrap();
        let created = db.insert_walk(&new_walk("rex", 8)).await.unwrap();

        let loaded = db.get_walk(&created.id).await.unwrap().unwrap();
        assert_eq!(loaded.pet_id, "rex");
        assert_eq!(loaded.distance_meters, 111);
        assert_eq!(loaded.path, created.path);
        assert_eq!(loaded.events, created.events);
    }

    #[tokio::test]
    async fn lists_only_the_pets_walks_newest_first() {
        let db = Database::in_memory().unwrap();
        db.insert_walk(&new_walk("rex", 8)).await.unwrap();
        db.insert_walk(&new_walk("rex", 17)).await.unwrap();
        db.insert_walk(&new_walk("luna", 9)).await.unwrap();

        let walks = db.list_walks_for_pet("rex").await.unwrap();
        assert_eq!(walks.len(), 2);
        assert!(walks[0].start_time > walks[1].start_time);
        assert_eq!(db.list_walks_for_pet("luna").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_and_delete_require_existing_walk() {
        let db = Database::in_memory().unwrap();
        let created = db.insert_walk(&new_walk("rex", 8)).await.unwrap();

        let mut edited = new_walk("rex", 8);
        edited.distance_meters = 900;
        let updated = db.update_walk(&created.id, &edited).await.unwrap();
        assert_eq!(updated.distance_meters, 900);
        assert_eq!(updated.created_at, created.created_at);

        assert!(db.update_walk("missing", &edited).await.is_err());
        db.delete_walk(&created.id).await.unwrap();
        assert!(db.delete_walk(&created.id).await.is_err());
        assert!(db.get_walk(&created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_walk_is_not_stored() {
        let db = Database::in_memory().unwrap();
        let mut bad = new_walk("rex", 8);
        bad.end_time = bad.start_time - Duration::seconds(1);
        assert!(db.insert_walk(&bad).await.is_err());
        assert!(db.list_walks_for_pet("rex").await.unwrap().is_empty());
    }
}
