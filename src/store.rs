//! Rolling transaction index backed by SQLite.
//!
//! One worker thread owns the connection; callers talk to it over a channel
//! and get answers back on oneshots. Documents are partitioned by network
//! name. A small lease table lets concurrent refreshes of the same network
//! find out that one is already running.

use crate::error::{FetchError, FetchResult};
use crate::types::TxDocument;
use rusqlite::{params, Connection, Row};
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::spawn_blocking;

enum IndexMsg {
    Insert {
        network: String,
        docs: Vec<TxDocument>,
        resp: oneshot::Sender<FetchResult<usize>>,
    },
    LatestSlot {
        network: String,
        resp: oneshot::Sender<FetchResult<Option<u64>>>,
    },
    Page {
        network: String,
        skip: usize,
        limit: usize,
        resp: oneshot::Sender<FetchResult<Vec<TxDocument>>>,
    },
    Prune {
        network: String,
        min_slot: u64,
        resp: oneshot::Sender<FetchResult<usize>>,
    },
    Count {
        network: String,
        resp: oneshot::Sender<FetchResult<usize>>,
    },
    Acquire {
        name: String,
        holder: String,
        expires_ms: i64,
        now_ms: i64,
        resp: oneshot::Sender<FetchResult<bool>>,
    },
    Release {
        name: String,
        holder: String,
        resp: oneshot::Sender<FetchResult<bool>>,
    },
}

#[derive(Clone)]
pub struct TxIndex {
    tx: UnboundedSender<IndexMsg>,
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS transactions(
        network   TEXT NOT NULL,
        signature TEXT NOT NULL,
        slot      INTEGER NOT NULL,
        block_time INTEGER,
        fee       INTEGER,
        success   INTEGER NOT NULL,
        error     TEXT,
        confirmation_status TEXT,
        signer    TEXT,
        programs_json TEXT NOT NULL DEFAULT '[]',
        PRIMARY KEY(network, signature)
    );
    CREATE INDEX IF NOT EXISTS idx_tx_network_slot ON transactions(network, slot);
    CREATE TABLE IF NOT EXISTS leases(
        name       TEXT PRIMARY KEY,
        holder     TEXT NOT NULL,
        expires_ms INTEGER NOT NULL
    );
"#;

fn doc_from_row(row: &Row<'_>) -> rusqlite::Result<TxDocument> {
    let programs_json: String = row.get(8)?;
    Ok(TxDocument {
        signature: row.get(0)?,
        slot: row.get::<_, i64>(1)? as u64,
        block_time: row.get(2)?,
        fee: row.get::<_, Option<i64>>(3)?.map(|f| f as u64),
        success: row.get(4)?,
        error: row.get(5)?,
        confirmation_status: row.get(6)?,
        signer: row.get(7)?,
        programs: serde_json::from_str(&programs_json).unwrap_or_default(),
    })
}

fn insert_db(conn: &Connection, network: &str, docs: &[TxDocument]) -> FetchResult<usize> {
    let txc = conn.unchecked_transaction()?;
    let mut n = 0;
    {
        let mut stmt = txc.prepare_cached(
            "INSERT OR REPLACE INTO transactions(network,signature,slot,block_time,fee,success,error,confirmation_status,signer,programs_json)
             VALUES (?,?,?,?,?,?,?,?,?,?)",
        )?;
        for d in docs {
            n += stmt.execute(params![
                network,
                d.signature,
                d.slot as i64,
                d.block_time,
                d.fee.map(|f| f as i64),
                d.success,
                d.error,
                d.confirmation_status,
                d.signer,
                serde_json::to_string(&d.programs)?,
            ])?;
        }
    }
    txc.commit()?;
    Ok(n)
}

fn page_db(conn: &Connection, network: &str, skip: usize, limit: usize) -> FetchResult<Vec<TxDocument>> {
    let mut stmt = conn.prepare_cached(
        "SELECT signature,slot,block_time,fee,success,error,confirmation_status,signer,programs_json
         FROM transactions WHERE network = ?
         ORDER BY slot DESC, signature ASC
         LIMIT ? OFFSET ?",
    )?;
    let rows = stmt.query_map(params![network, limit as i64, skip as i64], doc_from_row)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

fn handle(conn: &Connection, msg: IndexMsg) {
    match msg {
        IndexMsg::Insert { network, docs, resp } => {
            let _ = resp.send(insert_db(conn, &network, &docs));
        }
        IndexMsg::LatestSlot { network, resp } => {
            let r = conn
                .query_row(
                    "SELECT MAX(slot) FROM transactions WHERE network = ?",
                    params![network],
                    |row| row.get::<_, Option<i64>>(0),
                )
                .map(|s| s.map(|s| s as u64))
                .map_err(FetchError::from);
            let _ = resp.send(r);
        }
        IndexMsg::Page {
            network,
            skip,
            limit,
            resp,
        } => {
            let _ = resp.send(page_db(conn, &network, skip, limit));
        }
        IndexMsg::Prune {
            network,
            min_slot,
            resp,
        } => {
            let r = conn
                .execute(
                    "DELETE FROM transactions WHERE network = ? AND slot < ?",
                    params![network, min_slot as i64],
                )
                .map_err(FetchError::from);
            let _ = resp.send(r);
        }
        IndexMsg::Count { network, resp } => {
            let r = conn
                .query_row(
                    "SELECT COUNT(*) FROM transactions WHERE network = ?",
                    params![network],
                    |row| row.get::<_, i64>(0),
                )
                .map(|c| c as usize)
                .map_err(FetchError::from);
            let _ = resp.send(r);
        }
        IndexMsg::Acquire {
            name,
            holder,
            expires_ms,
            now_ms,
            resp,
        } => {
            // takes the row when absent, expired, or already ours
            let r = conn
                .execute(
                    "INSERT INTO leases(name,holder,expires_ms) VALUES (?1,?2,?3)
                     ON CONFLICT(name) DO UPDATE SET holder = excluded.holder, expires_ms = excluded.expires_ms
                     WHERE leases.expires_ms <= ?4 OR leases.holder = ?2",
                    params![name, holder, expires_ms, now_ms],
                )
                .map(|changed| changed == 1)
                .map_err(FetchError::from);
            let _ = resp.send(r);
        }
        IndexMsg::Release { name, holder, resp } => {
            let r = conn
                .execute(
                    "DELETE FROM leases WHERE name = ? AND holder = ?",
                    params![name, holder],
                )
                .map(|changed| changed == 1)
                .map_err(FetchError::from);
            let _ = resp.send(r);
        }
    }
}

fn worker_gone<T>(_: T) -> FetchError {
    FetchError::Store("index worker stopped".into())
}

impl TxIndex {
    pub fn open(db_path: &str) -> FetchResult<Self> {
        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "busy_timeout", 250)?;
        Self::start(conn)
    }

    pub fn open_in_memory() -> FetchResult<Self> {
        Self::start(Connection::open_in_memory()?)
    }

    fn start(conn: Connection) -> FetchResult<Self> {
        conn.execute_batch(SCHEMA)?;
        let (tx, mut rx) = unbounded_channel::<IndexMsg>();
        // single worker connection off the async threads
        spawn_blocking(move || {
            while let Some(msg) = rx.blocking_recv() {
                handle(&conn, msg);
            }
            log::debug!("[index] worker exiting");
        });
        Ok(Self { tx })
    }

    async fn ask<R>(&self, make: impl FnOnce(oneshot::Sender<FetchResult<R>>) -> IndexMsg) -> FetchResult<R> {
        let (resp, rx) = oneshot::channel();
        self.tx.send(make(resp)).map_err(worker_gone)?;
        rx.await.map_err(worker_gone)?
    }

    /// Upsert by signature within `network`.
    pub async fn insert_many(&self, network: &str, docs: Vec<TxDocument>) -> FetchResult<usize> {
        if docs.is_empty() {
            return Ok(0);
        }
        self.ask(|resp| IndexMsg::Insert {
            network: network.to_string(),
            docs,
            resp,
        })
        .await
    }

    pub async fn latest_slot(&self, network: &str) -> FetchResult<Option<u64>> {
        self.ask(|resp| IndexMsg::LatestSlot {
            network: network.to_string(),
            resp,
        })
        .await
    }

    /// Newest first.
    pub async fn page(&self, network: &str, skip: usize, limit: usize) -> FetchResult<Vec<TxDocument>> {
        self.ask(|resp| IndexMsg::Page {
            network: network.to_string(),
            skip,
            limit,
            resp,
        })
        .await
    }

    /// Delete every document with `slot < min_slot`; returns how many went.
    pub async fn prune_below(&self, network: &str, min_slot: u64) -> FetchResult<usize> {
        self.ask(|resp| IndexMsg::Prune {
            network: network.to_string(),
            min_slot,
            resp,
        })
        .await
    }

    pub async fn count(&self, network: &str) -> FetchResult<usize> {
        self.ask(|resp| IndexMsg::Count {
            network: network.to_string(),
            resp,
        })
        .await
    }

    pub async fn try_acquire_lease(&self, name: &str, holder: &str, ttl: Duration) -> FetchResult<bool> {
        self.try_acquire_lease_at(name, holder, ttl, chrono::Utc::now().timestamp_millis())
            .await
    }

    pub async fn try_acquire_lease_at(
        &self,
        name: &str,
        holder: &str,
        ttl: Duration,
        now_ms: i64,
    ) -> FetchResult<bool> {
        let expires_ms = now_ms.saturating_add(ttl.as_millis() as i64);
        self.ask(|resp| IndexMsg::Acquire {
            name: name.to_string(),
            holder: holder.to_string(),
            expires_ms,
            now_ms,
            resp,
        })
        .await
    }

    /// Only the current holder can release.
    /// Queue a release without waiting for it. Usable from `Drop`; the worker
    /// handles messages in order, so a later acquire sees the lease gone.
    pub fn release_lease_detached(&self, name: &str, holder: &str) {
        let (resp, _) = oneshot::channel();
        let msg = IndexMsg::Release {
            name: name.to_string(),
            holder: holder.to_string(),
            resp,
        };
        if self.tx.send(msg).is_err() {
            log::warn!("[index] worker gone, lease {name} left to expire");
        }
    }

    pub async fn release_lease(&self, name: &str, holder: &str) -> FetchResult<bool> {
        self.ask(|resp| IndexMsg::Release {
            name: name.to_string(),
            holder: holder.to_string(),
            resp,
        })
        .await
    }
}
