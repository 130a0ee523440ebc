use std::{
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex, MutexGuard},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::{sync::oneshot, time};

use super::migrations::run_migrations;

type DbTask = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

enum DbCommand {
    Execute(DbTask),
    Shutdown,
}

/// Fate of one `execute` call, shared by the caller and the worker. Whoever
/// moves it out of `Pending` first decides whether the call's writes land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallState {
    Pending,
    Committed,
    Abandoned,
}

type SharedCallState = Arc<Mutex<CallState>>;

fn lock_call(state: &SharedCallState) -> MutexGuard<'_, CallState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DatabaseInner {
    fn stop_worker(&self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            if let Err(err) = self.sender.send(DbCommand::Shutdown) {
                error!("Failed to send shutdown to DB thread: {err}");
            }
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

/// Handle to the record store. Cloning is cheap; every clone talks to the
/// same worker thread, which owns the only SQLite connection.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
    db_path: Arc<PathBuf>,
    call_timeout: Duration,
}

impl Database {
    pub fn new(db_path: PathBuf, call_timeout: Duration) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("engagement-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }
                if let Err(err) = conn.pragma_update(None, "foreign_keys", "ON") {
                    error!("Failed to enable foreign keys: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    match command {
                        DbCommand::Execute(task) => {
                            task(&mut conn);
                        }
                        DbCommand::Shutdown => break,
                    }
                }

                info!("Database thread shutting down");
            })
            .with_context(|| "failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Database initialized at {}", db_path.as_path().display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
            db_path: Arc::new(db_path),
            call_timeout,
        })
    }

    pub fn path(&self) -> &Path {
        self.db_path.as_path()
    }

    /// Stops the worker thread after it drains queued tasks. Calls issued
    /// afterwards fail instead of hanging.
    pub fn shutdown(&self) {
        self.inner.stop_worker();
    }

    /// Runs `task` on the worker thread, bounded by the configured call
    /// timeout.
    ///
    /// A call that times out is abandoned: if it has not started it is
    /// skipped, and any commit it attempts afterwards is turned into a
    /// rollback, so a timed-out call never writes. If the worker committed
    /// just before the timeout fired, the caller waits for that result
    /// instead of reporting a failure.
    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let sender = self.inner.sender.clone();
        let (reply_tx, mut reply_rx) = oneshot::channel();
        let call_state: SharedCallState = Arc::new(Mutex::new(CallState::Pending));
        let worker_state = Arc::clone(&call_state);

        let command = DbCommand::Execute(Box::new(move |conn| {
            if reply_tx.is_closed() || *lock_call(&worker_state) == CallState::Abandoned {
                warn!("Skipping database call abandoned by its caller");
                return;
            }

            let hook_state = Arc::clone(&worker_state);
            conn.commit_hook(Some(move || {
                let mut state = lock_call(&hook_state);
                if *state == CallState::Abandoned {
                    // Non-zero turns the COMMIT into a ROLLBACK.
                    return true;
                }
                *state = CallState::Committed;
                false
            }));
            let result = task(conn);
            conn.commit_hook(None::<fn() -> bool>);

            if reply_tx.send(result).is_err() {
                warn!("DB caller dropped before receiving result");
            }
        }));

        sender
            .send(command)
            .map_err(|err| anyhow!("failed to send command to DB thread: {err}"))?;

        match time::timeout(self.call_timeout, &mut reply_rx).await {
            Ok(reply) => reply.map_err(|_| anyhow!("database thread terminated unexpectedly"))?,
            Err(_) => {
                let committed = {
                    let mut state = lock_call(&call_state);
                    if *state == CallState::Committed {
                        true
                    } else {
                        *state = CallState::Abandoned;
                        false
                    }
                };
                if committed {
                    return reply_rx
                        .await
                        .map_err(|_| anyhow!("database thread terminated unexpectedly"))?;
                }
                Err(anyhow!(
                    "database call timed out after {} ms; nothing was written",
                    self.call_timeout.as_millis()
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rusqlite::params;
    use tempfile::TempDir;

    use super::*;

    fn count_users(path: &Path) -> i64 {
        let conn = Connection::open(path).unwrap();
        conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap()
    }

    fn slow_insert(conn: &mut Connection, email: &str) -> Result<()> {
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO users (name, email) VALUES (?1, ?2)",
            params!["slow", email],
        )?;
        thread::sleep(Duration::from_millis(80));
        tx.commit()?;
        Ok(())
    }

    #[tokio::test]
    async fn timed_out_calls_write_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("timeouts.sqlite3");
        let db = Database::new(path.clone(), Duration::from_millis(2)).unwrap();

        // The first call is mid-transaction when it times out; the second is
        // still queued behind it.
        let running = db.execute(|conn| slow_insert(conn, "a@example.com"));
        let queued = db.execute(|conn| slow_insert(conn, "b@example.com"));
        let (running, queued) = tokio::join!(running, queued);

        let running = running.unwrap_err().to_string();
        assert!(running.contains("timed out"), "{running}");
        assert!(queued.is_err());

        db.shutdown();
        assert_eq!(count_users(&path), 0);
    }

    #[tokio::test]
    async fn calls_within_the_timeout_commit() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("commits.sqlite3");
        let db = Database::new(path.clone(), Duration::from_secs(5)).unwrap();

        db.execute(|conn| slow_insert(conn, "c@example.com"))
            .await
            .unwrap();

        db.shutdown();
        assert_eq!(count_users(&path), 1);
    }
}
