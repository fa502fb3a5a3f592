use anyhow::{bail, Context, Result};
use log::info;
use rusqlite::Connection;

/// Ordered schema steps; entry `i` upgrades `user_version` from `i` to `i + 1`.
const MIGRATIONS: &[(&str, &str)] = &[
    ("walks", include_str!("schemas/schema_v1.sql")),
    ("active_sessions", include_str!("schemas/schema_v2.sql")),
];

pub(crate) const CURRENT_SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

fn schema_version(conn: &Connection) -> Result<i32> {
    conn.pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read schema version")
}

/// Brings the schema up to date. Each step commits on its own, so an
/// interrupted upgrade resumes from the last completed step.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let found = schema_version(conn)?;
    if found > CURRENT_SCHEMA_VERSION {
        bail!(
            "walk database is at schema {found}, this build only knows up to {CURRENT_SCHEMA_VERSION}"
        );
    }

    for (index, (name, sql)) in MIGRATIONS.iter().enumerate().skip(found.max(0) as usize) {
        let target = index as i32 + 1;
        let tx = conn
            .transaction()
            .with_context(|| format!("failed to begin migration {target} ({name})"))?;
        tx.execute_batch(sql)
            .with_context(|| format!("migration {target} ({name}) failed"))?;
        tx.pragma_update(None, "user_version", target)
            .with_context(|| format!("failed to record schema {target}"))?;
        tx.commit()
            .with_context(|| format!("failed to commit migration {target} ({name})"))?;
        info!("Applied schema migration {target} ({name})");
    }

    Ok(())
}
