use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread,
};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

const PRAGMAS: &[(&str, &str)] = &[("journal_mode", "WAL"), ("foreign_keys", "ON")];

/// Owns the worker thread. Dropping the last handle closes the job queue,
/// which lets the worker drain and exit, then joins it.
struct Worker {
    jobs: Mutex<Option<mpsc::Sender<Job>>>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Worker {
    fn submit(&self, job: Job) -> Result<()> {
        let jobs = self
            .jobs
            .lock()
            .map_err(|_| anyhow!("database job queue poisoned"))?;
        let sender = jobs
            .as_ref()
            .ok_or_else(|| anyhow!("database worker already stopped"))?;
        sender
            .send(job)
            .map_err(|_| anyhow!("database worker is gone"))
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let jobs = self.jobs.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        drop(jobs.take());

        let handle = self
            .thread
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Database worker panicked");
            }
        }
    }
}

fn prepare(conn: &mut Connection) -> Result<()> {
    for &(pragma, value) in PRAGMAS {
        // Not fatal: in-memory databases keep their own journal mode.
        if let Err(err) = conn.pragma_update(None, pragma, value) {
            warn!("Could not set {pragma}={value}: {err}");
        }
    }
    run_migrations(conn).context("failed to migrate walk database")
}

/// Handle to the SQLite worker thread. All statements run on that thread;
/// callers await the result over a oneshot channel.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
    location: Arc<PathBuf>,
}

impl Database {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let target = path.clone();
        Self::start(move || Connection::open(&target), path)
    }

    pub fn in_memory() -> Result<Self> {
        Self::start(Connection::open_in_memory, PathBuf::from(":memory:"))
    }

    fn start<F>(open: F, location: PathBuf) -> Result<Self>
    where
        F: FnOnce() -> rusqlite::Result<Connection> + Send + 'static,
    {
        let (jobs_tx, jobs_rx) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = mpsc::sync_channel::<Result<()>>(1);
        let label = location.display().to_string();

        let handle = thread::Builder::new()
            .name("pawtrail-db".into())
            .spawn(move || {
                let opened = open()
                    .with_context(|| format!("failed to open SQLite database at {label}"))
                    .and_then(|mut conn| prepare(&mut conn).map(|()| conn));

                let mut conn = match opened {
                    Ok(conn) => {
                        let _ = ready_tx.send(Ok(()));
                        conn
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };

                for job in jobs_rx {
                    job(&mut conn);
                }
                info!("Database worker for {label} stopped");
            })
            .context("failed to spawn database worker")?;

        let worker = Worker {
            jobs: Mutex::new(Some(jobs_tx)),
            thread: Mutex::new(Some(handle)),
        };
        ready_rx
            .recv()
            .map_err(|_| anyhow!("database worker exited during start-up"))??;

        info!("Opened walk database at {}", location.display());
        Ok(Self {
            worker: Arc::new(worker),
            location: Arc::new(location),
        })
    }

    pub fn path(&self) -> &Path {
        &self.location
    }

    /// Runs `task` on the worker thread and waits for its result.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.worker.submit(Box::new(move |conn| {
            // The caller may have been cancelled; nothing to report then.
            let _ = reply_tx.send(task(conn));
        }))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database worker dropped the request"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_reach_current_version() {
        let db = Database::in_memory().unwrap();
        let version: i32 = db
            .execute(|conn| {
                Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(version, crate::db::migrations::CURRENT_SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let path = std::env::temp_dir()
            .join(format!("pawtrail-{}", uuid::Uuid::new_v4()))
            .join("walks.sqlite3");

        {
            let db = Database::new(path.clone()).unwrap();
            db.execute(|conn| {
                conn.execute(
                    "INSERT INTO active_sessions (pet_id, payload, updated_at) VALUES ('rex', '{}', 'now')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();
        }

        let reopened = Database::new(path.clone()).unwrap();
        let count: i64 = reopened
            .execute(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM active_sessions", [], |row| row.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(count, 1);

        drop(reopened);
        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
