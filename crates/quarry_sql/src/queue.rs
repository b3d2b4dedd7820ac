//! Serialized SQL execution queue.

use crate::config::SqlConfig;
use crate::error::{SqlError, SqlResult};
use crate::migration::{MigrationManager, MigrationRunResult};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

/// A queue that runs units of work against one SQLite connection, one at a
/// time, on a dedicated worker thread.
///
/// Every unit of work submitted from any thread is executed in submission
/// order and never concurrently with another unit. Callers block on the
/// returned [`SqlFuture`] when they need the result.
///
/// # Deadlocks
///
/// A unit of work must not submit to, and wait on, its own queue.
///
/// # Example
///
/// ```rust
/// use quarry_sql::{SqlConfig, SqlError, SqlQueue};
///
/// let queue = SqlQueue::open_in_memory(SqlConfig::default()).unwrap();
/// queue
///     .submit_transaction(|conn| {
///         conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1);")?;
///         Ok::<_, SqlError>(())
///     })
///     .wait()
///     .unwrap();
/// ```
pub struct SqlQueue {
    sender: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SqlQueue {
    /// Opens (creating if needed) a database file and starts its queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or configured.
    pub fn open(path: &Path, config: SqlConfig) -> SqlResult<Self> {
        if config.create_dirs {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let conn = Connection::open(path)?;
        if config.wal_journal {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            debug!(journal_mode = %mode, "configured journal mode");
        }
        info!(path = %path.display(), "opened SQL queue");
        Self::start(conn, &config)
    }

    /// Opens a private in-memory database and starts its queue.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory(config: SqlConfig) -> SqlResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::start(conn, &config)
    }

    fn start(conn: Connection, config: &SqlConfig) -> SqlResult<Self> {
        conn.busy_timeout(config.busy_timeout)?;

        let (sender, receiver): (Sender<Job>, Receiver<Job>) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("quarry-sql".to_string())
            .spawn(move || {
                let mut conn = conn;
                while let Ok(job) = receiver.recv() {
                    job(&mut conn);
                }
                debug!("SQL queue worker exiting");
            })?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Submits a unit of work.
    ///
    /// The work runs outside any explicit transaction; each statement it
    /// issues commits on its own.
    pub fn submit<T, E, F>(&self, work: F) -> SqlFuture<T, E>
    where
        T: Send + 'static,
        E: From<SqlError> + Send + 'static,
        F: FnOnce(&Connection) -> Result<T, E> + Send + 'static,
    {
        self.dispatch(move |conn: &mut Connection| work(conn))
    }

    /// Submits a unit of work wrapped in a transaction.
    ///
    /// The transaction commits if `work` returns `Ok` and rolls back
    /// otherwise, so an aborted unit leaves no trace.
    pub fn submit_transaction<T, E, F>(&self, work: F) -> SqlFuture<T, E>
    where
        T: Send + 'static,
        E: From<SqlError> + Send + 'static,
        F: FnOnce(&Connection) -> Result<T, E> + Send + 'static,
    {
        self.dispatch(move |conn: &mut Connection| {
            let tx = conn
                .transaction()
                .map_err(|e| E::from(SqlError::from(e)))?;
            let value = work(&tx)?;
            tx.commit().map_err(|e| E::from(SqlError::from(e)))?;
            Ok(value)
        })
    }

    /// Submits a unit of work and blocks until it completes.
    ///
    /// # Errors
    ///
    /// Returns whatever the unit of work returns, or `QueueClosed`.
    pub fn execute<T, E, F>(&self, work: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<SqlError> + Send + 'static,
        F: FnOnce(&Connection) -> Result<T, E> + Send + 'static,
    {
        self.submit(work).wait()
    }

    /// Submits a transactional unit of work and blocks until it completes.
    ///
    /// # Errors
    ///
    /// Returns whatever the unit of work returns, or `QueueClosed`.
    pub fn execute_transaction<T, E, F>(&self, work: F) -> Result<T, E>
    where
        T: Send + 'static,
        E: From<SqlError> + Send + 'static,
        F: FnOnce(&Connection) -> Result<T, E> + Send + 'static,
    {
        self.submit_transaction(work).wait()
    }

    /// Applies every pending migration, each in its own transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails; earlier migrations stay applied.
    pub fn update_schema(&self, migrations: Arc<MigrationManager>) -> SqlResult<MigrationRunResult> {
        self.dispatch(move |conn: &mut Connection| migrations.run_pending(conn))
            .wait()
    }

    /// Returns whether the SQLite build supports FTS4 virtual tables.
    ///
    /// # Errors
    ///
    /// Returns `QueueClosed` if the queue is shut down.
    pub fn supports_fts(&self) -> SqlResult<bool> {
        self.execute(|conn| {
            let probe = conn.execute_batch(
                "CREATE VIRTUAL TABLE temp.\"_quarry_fts_probe\" USING fts4(probe); \
                 DROP TABLE temp.\"_quarry_fts_probe\";",
            );
            Ok::<_, SqlError>(probe.is_ok())
        })
    }

    /// Stops accepting work, drains queued units and joins the worker.
    ///
    /// Idempotent. Must not be called from inside a unit of work.
    pub fn shutdown(&self) {
        drop(self.sender.lock().take());
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::error!("SQL queue worker panicked");
            }
        }
    }

    /// Returns true once [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.sender.lock().is_none()
    }

    fn dispatch<T, E, F>(&self, work: F) -> SqlFuture<T, E>
    where
        T: Send + 'static,
        E: From<SqlError> + Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, E> + Send + 'static,
    {
        let (reply, receiver) = mpsc::sync_channel(1);
        let job: Job = Box::new(move |conn| {
            // The caller may have dropped its future.
            let _ = reply.send(work(conn));
        });

        // A rejected job is dropped together with its reply sender, which
        // the future reports as `QueueClosed`.
        if let Some(sender) = self.sender.lock().as_ref() {
            let _ = sender.send(job);
        }
        SqlFuture { receiver }
    }
}

impl Drop for SqlQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The pending result of a unit of work submitted to a [`SqlQueue`].
#[must_use = "a submitted unit of work runs regardless, but its result is only observed via wait()"]
pub struct SqlFuture<T, E = SqlError> {
    receiver: mpsc::Receiver<Result<T, E>>,
}

impl<T, E: From<SqlError>> SqlFuture<T, E> {
    /// Blocks until the unit of work has run and returns its result.
    ///
    /// # Errors
    ///
    /// Returns the unit's own error, or `QueueClosed` if the queue shut down
    /// before running it.
    pub fn wait(self) -> Result<T, E> {
        self.receiver
            .recv()
            .unwrap_or_else(|_| Err(E::from(SqlError::QueueClosed)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn memory_queue() -> SqlQueue {
        SqlQueue::open_in_memory(SqlConfig::default()).unwrap()
    }

    #[test]
    fn submit_returns_value() {
        let queue = memory_queue();
        let value: i64 = queue
            .execute(|conn| Ok::<_, SqlError>(conn.query_row("SELECT 7", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let queue = memory_queue();
        queue
            .execute(|conn| Ok::<_, SqlError>(conn.execute_batch("CREATE TABLE t (x INTEGER)")?))
            .unwrap();

        let result: SqlResult<()> = queue.execute_transaction(|conn| {
            conn.execute("INSERT INTO t VALUES (1)", [])?;
            conn.execute("INSERT INTO missing VALUES (1)", [])?;
            Ok(())
        });
        assert!(result.is_err());

        let count: i64 = queue
            .execute(|conn| Ok::<_, SqlError>(conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn units_are_serialized() {
        let queue = Arc::new(memory_queue());
        queue
            .execute(|conn| {
                conn.execute_batch("CREATE TABLE c (n INTEGER); INSERT INTO c VALUES (0);")?;
                Ok::<_, SqlError>(())
            })
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        queue
                            .execute(|conn| {
                                // Read-modify-write is safe only because units never interleave.
                                let n: i64 = conn.query_row("SELECT n FROM c", [], |r| r.get(0))?;
                                conn.execute("UPDATE c SET n = ?", [n + 1])?;
                                Ok::<_, SqlError>(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let n: i64 = queue
            .execute(|conn| Ok::<_, SqlError>(conn.query_row("SELECT n FROM c", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(n, 200);
    }

    #[test]
    fn submit_after_shutdown_is_closed() {
        let queue = memory_queue();
        queue.shutdown();
        assert!(queue.is_shutdown());

        let result: SqlResult<()> = queue.execute(|_| Ok(()));
        assert!(matches!(result, Err(SqlError::QueueClosed)));
    }

    #[test]
    fn open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("indexes.sqlite");
        {
            let queue = SqlQueue::open(&path, SqlConfig::default()).unwrap();
            queue
                .execute(|conn| Ok::<_, SqlError>(conn.execute_batch("CREATE TABLE t (x)")?))
                .unwrap();
        }
        assert!(path.exists());

        let queue = SqlQueue::open(&path, SqlConfig::default()).unwrap();
        let tables: i64 = queue
            .execute(|conn| {
                Ok::<_, SqlError>(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE name = 't'",
                    [],
                    |r| r.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn bundled_sqlite_supports_fts() {
        let queue = memory_queue();
        assert!(queue.supports_fts().unwrap());
    }
}
