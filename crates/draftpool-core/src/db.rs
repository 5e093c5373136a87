// SQLite persistence layer for pool entries, rosters, teams and party links.

use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;

use crate::error::{AllocationError, Result};
use crate::model::{
    Assignment, EntryState, EntryStatus, Payment, PaymentStatus, PaymentUpdate, PoolEntry,
    RosterEntry, Targeting, TeamSummary,
};
use crate::store::{
    AssignmentCommit, AssignmentOutbox, CasOutcome, PartyLink, PartyLinkRecord, PartyProfiles,
    PoolFilter, PoolStore, RosterStore, TeamDirectory,
};

/// SQLite-backed implementation of every store seam the engine uses.
///
/// A single connection sits behind a mutex. Status guards do not rely on that
/// mutex: assignment and decline are conditional updates inside immediate
/// transactions, so they stay correct with several connections on one file.
pub struct Database {
    conn: Mutex<Connection>,
}

const POOL_COLUMNS: &str = "id, owner_id, sport, age_group_id, age_group_name, team_id,
    candidate, contact, details,
    total_amount, amount_paid, remaining_balance, payment_status, payment_method, payment_notes,
    status, eligible_for_auto_assign,
    assigned_team_id, assigned_team_name, assigned_by, assigned_at, draft_round, draft_pick,
    roster_entry_id, decline_reason, created_at";

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database.
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS teams (
                id         TEXT PRIMARY KEY,
                owner_id   TEXT NOT NULL,
                name       TEXT NOT NULL,
                sport      TEXT NOT NULL,
                age_group  TEXT NOT NULL,
                capacity   INTEGER
            );

            CREATE TABLE IF NOT EXISTS pool_entries (
                seq                      INTEGER PRIMARY KEY AUTOINCREMENT,
                id                       TEXT NOT NULL UNIQUE,
                owner_id                 TEXT NOT NULL,
                sport                    TEXT NOT NULL,
                age_group_id             TEXT NOT NULL,
                age_group_name           TEXT NOT NULL,
                team_id                  TEXT NOT NULL,
                candidate                TEXT NOT NULL,
                contact                  TEXT NOT NULL,
                details                  TEXT NOT NULL,
                total_amount             INTEGER NOT NULL,
                amount_paid              INTEGER NOT NULL,
                remaining_balance        INTEGER NOT NULL,
                payment_status           TEXT NOT NULL,
                payment_method           TEXT,
                payment_notes            TEXT,
                status                   TEXT NOT NULL
                    CHECK (status IN ('waiting', 'drafted', 'declined')),
                eligible_for_auto_assign INTEGER NOT NULL,
                assigned_team_id         TEXT,
                assigned_team_name       TEXT,
                assigned_by              TEXT,
                assigned_at              TEXT,
                draft_round              INTEGER,
                draft_pick               INTEGER,
                roster_entry_id          TEXT,
                decline_reason           TEXT,
                created_at               TEXT NOT NULL,
                CHECK (remaining_balance = total_amount - amount_paid)
            );

            CREATE TABLE IF NOT EXISTS roster_entries (
                id            TEXT PRIMARY KEY,
                team_id       TEXT NOT NULL,
                pool_entry_id TEXT NOT NULL UNIQUE REFERENCES pool_entries(id),
                from_pool     INTEGER NOT NULL,
                snapshot      TEXT NOT NULL,
                created_at    TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS party_link_outbox (
                seq          INTEGER PRIMARY KEY AUTOINCREMENT,
                entry_id     TEXT NOT NULL REFERENCES pool_entries(id),
                party_id     TEXT NOT NULL,
                team_id      TEXT NOT NULL,
                created_at   TEXT NOT NULL,
                delivered_at TEXT
            );

            CREATE TABLE IF NOT EXISTS party_profiles (
                party_id        TEXT PRIMARY KEY,
                current_team_id TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_teams_owner
                ON teams(owner_id, sport, age_group);
            CREATE INDEX IF NOT EXISTS idx_pool_entries_team_status
                ON pool_entries(team_id, status);
            CREATE INDEX IF NOT EXISTS idx_roster_entries_team
                ON roster_entries(team_id);
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// Insert or replace a team in the local team table. Teams belong to the
    /// team-management subsystem; this is how that subsystem (or a test)
    /// seeds the directory.
    pub fn upsert_team(&self, team: &TeamSummary) -> anyhow::Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO teams (id, owner_id, name, sport, age_group, capacity)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                owner_id  = excluded.owner_id,
                name      = excluded.name,
                sport     = excluded.sport,
                age_group = excluded.age_group,
                capacity  = excluded.capacity",
            params![
                team.id,
                team.owner_id,
                team.name,
                team.sport,
                team.age_group,
                team.capacity,
            ],
        )
        .context("failed to upsert team")?;
        Ok(())
    }

    /// Current team recorded for a party profile, if any.
    pub fn current_team_for_party(&self, party_id: &str) -> anyhow::Result<Option<String>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT current_team_id FROM party_profiles WHERE party_id = ?1",
            params![party_id],
            |row| row.get(0),
        )
        .optional()
        .context("failed to load party profile")
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(s: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .with_context(|| format!("invalid timestamp {s:?}"))?
        .with_timezone(&Utc))
}

/// Raw column values of a `pool_entries` row, in `POOL_COLUMNS` order.
/// Decoding JSON and enums happens outside the rusqlite row closure so
/// failures carry context.
struct PoolRow {
    id: String,
    owner_id: String,
    sport: String,
    age_group_id: String,
    age_group_name: String,
    team_id: String,
    candidate: String,
    contact: String,
    details: String,
    total_amount: i64,
    amount_paid: i64,
    remaining_balance: i64,
    payment_status: String,
    payment_method: Option<String>,
    payment_notes: Option<String>,
    status: String,
    eligible: bool,
    assigned_team_id: Option<String>,
    assigned_team_name: Option<String>,
    assigned_by: Option<String>,
    assigned_at: Option<String>,
    draft_round: Option<u32>,
    draft_pick: Option<u32>,
    roster_entry_id: Option<String>,
    decline_reason: Option<String>,
    created_at: String,
}

impl PoolRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(PoolRow {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            sport: row.get(2)?,
            age_group_id: row.get(3)?,
            age_group_name: row.get(4)?,
            team_id: row.get(5)?,
            candidate: row.get(6)?,
            contact: row.get(7)?,
            details: row.get(8)?,
            total_amount: row.get(9)?,
            amount_paid: row.get(10)?,
            remaining_balance: row.get(11)?,
            payment_status: row.get(12)?,
            payment_method: row.get(13)?,
            payment_notes: row.get(14)?,
            status: row.get(15)?,
            eligible: row.get(16)?,
            assigned_team_id: row.get(17)?,
            assigned_team_name: row.get(18)?,
            assigned_by: row.get(19)?,
            assigned_at: row.get(20)?,
            draft_round: row.get(21)?,
            draft_pick: row.get(22)?,
            roster_entry_id: row.get(23)?,
            decline_reason: row.get(24)?,
            created_at: row.get(25)?,
        })
    }

    fn into_entry(self) -> anyhow::Result<PoolEntry> {
        let status = EntryStatus::parse(&self.status)
            .ok_or_else(|| anyhow!("entry {} has unknown status {:?}", self.id, self.status))?;
        let payment_status = PaymentStatus::parse(&self.payment_status).ok_or_else(|| {
            anyhow!(
                "entry {} has unknown payment status {:?}",
                self.id,
                self.payment_status
            )
        })?;

        let state = match status {
            EntryStatus::Waiting => EntryState::Waiting,
            EntryStatus::Declined => EntryState::Declined {
                reason: self.decline_reason,
            },
            EntryStatus::Drafted => {
                let (Some(team_id), Some(team_name), Some(operator_id), Some(assigned_at), Some(roster_entry_id)) = (
                    self.assigned_team_id,
                    self.assigned_team_name,
                    self.assigned_by,
                    self.assigned_at,
                    self.roster_entry_id,
                ) else {
                    return Err(anyhow!(
                        "drafted entry {} is missing assignment columns",
                        self.id
                    ));
                };
                EntryState::Drafted(Assignment {
                    team_id,
                    team_name,
                    operator_id,
                    assigned_at: parse_ts(&assigned_at)?,
                    round: self.draft_round,
                    pick: self.draft_pick,
                    roster_entry_id,
                })
            }
        };

        Ok(PoolEntry {
            candidate: serde_json::from_str(&self.candidate)
                .with_context(|| format!("failed to decode candidate for {}", self.id))?,
            contact: serde_json::from_str(&self.contact)
                .with_context(|| format!("failed to decode contact for {}", self.id))?,
            details: serde_json::from_str(&self.details)
                .with_context(|| format!("failed to decode details for {}", self.id))?,
            targeting: Targeting {
                owner_id: self.owner_id,
                sport: self.sport,
                age_group_id: self.age_group_id,
                age_group_name: self.age_group_name,
                team_id: self.team_id,
            },
            payment: Payment {
                total_amount: self.total_amount,
                amount_paid: self.amount_paid,
                remaining_balance: self.remaining_balance,
                status: payment_status,
                method: self.payment_method,
                notes: self.payment_notes,
            },
            state,
            eligible_for_auto_assign: self.eligible,
            created_at: parse_ts(&self.created_at)?,
            id: self.id,
        })
    }
}

fn load_entry(conn: &Connection, entry_id: &str) -> anyhow::Result<Option<PoolEntry>> {
    let row = conn
        .query_row(
            &format!("SELECT {POOL_COLUMNS} FROM pool_entries WHERE id = ?1"),
            params![entry_id],
            PoolRow::from_row,
        )
        .optional()
        .context("failed to load pool entry")?;
    row.map(PoolRow::into_entry).transpose()
}

fn read_status(conn: &Connection, entry_id: &str) -> anyhow::Result<Option<EntryStatus>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT status FROM pool_entries WHERE id = ?1",
            params![entry_id],
            |row| row.get(0),
        )
        .optional()
        .context("failed to read pool entry status")?;
    raw.map(|s| EntryStatus::parse(&s).ok_or_else(|| anyhow!("unknown status {s:?}")))
        .transpose()
}

fn cas_miss(conn: &Connection, entry_id: &str) -> anyhow::Result<CasOutcome> {
    Ok(match read_status(conn, entry_id)? {
        Some(status) => CasOutcome::Current(status),
        None => CasOutcome::Missing,
    })
}

fn insert_entry_row(conn: &Connection, entry: &PoolEntry) -> anyhow::Result<()> {
    if entry.status() != EntryStatus::Waiting {
        return Err(anyhow!("new pool entries must start waiting"));
    }
    let candidate = serde_json::to_string(&entry.candidate).context("failed to serialize candidate")?;
    let contact = serde_json::to_string(&entry.contact).context("failed to serialize contact")?;
    let details = serde_json::to_string(&entry.details).context("failed to serialize details")?;
    conn.execute(
        "INSERT INTO pool_entries
            (id, owner_id, sport, age_group_id, age_group_name, team_id,
             candidate, contact, details,
             total_amount, amount_paid, remaining_balance, payment_status,
             payment_method, payment_notes, status, eligible_for_auto_assign, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, 'waiting', ?16, ?17)",
        params![
            entry.id,
            entry.targeting.owner_id,
            entry.targeting.sport,
            entry.targeting.age_group_id,
            entry.targeting.age_group_name,
            entry.targeting.team_id,
            candidate,
            contact,
            details,
            entry.payment.total_amount,
            entry.payment.amount_paid,
            entry.payment.remaining_balance,
            entry.payment.status.as_str(),
            entry.payment.method,
            entry.payment.notes,
            entry.eligible_for_auto_assign,
            ts(&entry.created_at),
        ],
    )
    .context("failed to insert pool entry")?;
    Ok(())
}

fn query_entry_rows(conn: &Connection, filter: &PoolFilter) -> anyhow::Result<Vec<PoolEntry>> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<String> = Vec::new();
    let columns: [(&str, Option<&str>); 5] = [
        ("team_id = ?", filter.team_id.as_deref()),
        ("owner_id = ?", filter.owner_id.as_deref()),
        ("sport = ?", filter.sport.as_deref()),
        ("age_group_id = ?", filter.age_group_id.as_deref()),
        ("status = ?", filter.status.as_ref().map(EntryStatus::as_str)),
    ];
    for (clause, value) in columns {
        if let Some(v) = value {
            clauses.push(clause);
            values.push(v.to_string());
        }
    }
    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };

    let mut stmt = conn
        .prepare(&format!(
            "SELECT {POOL_COLUMNS} FROM pool_entries {where_sql} ORDER BY created_at, seq"
        ))
        .context("failed to prepare pool query")?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), PoolRow::from_row)
        .context("failed to query pool entries")?
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("failed to map pool entry rows")?;

    rows.into_iter().map(PoolRow::into_entry).collect()
}

fn commit_assignment_tx(conn: &mut Connection, commit: &AssignmentCommit) -> anyhow::Result<CasOutcome> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("failed to begin assignment transaction")?;

    let a = &commit.assignment;
    let changed = tx
        .execute(
            "UPDATE pool_entries SET
                status             = 'drafted',
                assigned_team_id   = ?2,
                assigned_team_name = ?3,
                assigned_by        = ?4,
                assigned_at        = ?5,
                draft_round        = ?6,
                draft_pick         = ?7,
                roster_entry_id    = ?8
             WHERE id = ?1 AND status = 'waiting'",
            params![
                commit.entry_id,
                a.team_id,
                a.team_name,
                a.operator_id,
                ts(&a.assigned_at),
                a.round,
                a.pick,
                a.roster_entry_id,
            ],
        )
        .context("failed to mark pool entry drafted")?;

    if changed == 0 {
        // Dropping `tx` rolls back; nothing was written.
        return cas_miss(&tx, &commit.entry_id);
    }

    let roster = &commit.roster_entry;
    let snapshot = serde_json::to_string(roster).context("failed to serialize roster entry")?;
    tx.execute(
        "INSERT INTO roster_entries (id, team_id, pool_entry_id, from_pool, snapshot, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            roster.id,
            roster.team_id,
            roster.pool_entry_id,
            roster.from_pool,
            snapshot,
            ts(&roster.created_at),
        ],
    )
    .context("failed to insert roster entry")?;

    if let Some(link) = &commit.party_link {
        tx.execute(
            "INSERT INTO party_link_outbox (entry_id, party_id, team_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![commit.entry_id, link.party_id, link.team_id, ts(&a.assigned_at)],
        )
        .context("failed to record party link")?;
    }

    tx.commit().context("failed to commit assignment")?;
    Ok(CasOutcome::Applied)
}

fn decline_tx(conn: &mut Connection, entry_id: &str, reason: Option<&str>) -> anyhow::Result<CasOutcome> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("failed to begin decline transaction")?;
    let changed = tx
        .execute(
            "UPDATE pool_entries SET status = 'declined', decline_reason = ?2
             WHERE id = ?1 AND status = 'waiting'",
            params![entry_id, reason],
        )
        .context("failed to decline pool entry")?;
    if changed == 0 {
        return cas_miss(&tx, entry_id);
    }
    tx.commit().context("failed to commit decline")?;
    Ok(CasOutcome::Applied)
}

fn update_payment_tx(
    conn: &mut Connection,
    entry_id: &str,
    update: &PaymentUpdate,
) -> anyhow::Result<Option<PoolEntry>> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("failed to begin payment transaction")?;

    let Some(mut entry) = load_entry(&tx, entry_id)? else {
        return Ok(None);
    };
    entry.payment.apply(update);

    let p = &entry.payment;
    tx.execute(
        "UPDATE pool_entries SET
            amount_paid       = ?2,
            remaining_balance = ?3,
            payment_status    = ?4,
            payment_method    = ?5,
            payment_notes     = ?6
         WHERE id = ?1",
        params![
            entry_id,
            p.amount_paid,
            p.remaining_balance,
            p.status.as_str(),
            p.method,
            p.notes,
        ],
    )
    .context("failed to update payment")?;

    tx.commit().context("failed to commit payment update")?;
    Ok(Some(entry))
}

fn decode_roster(snapshot: String) -> anyhow::Result<RosterEntry> {
    serde_json::from_str(&snapshot).context("failed to decode roster snapshot")
}

fn map_team(row: &Row<'_>) -> rusqlite::Result<TeamSummary> {
    let size: i64 = row.get(6)?;
    Ok(TeamSummary {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        sport: row.get(3)?,
        age_group: row.get(4)?,
        capacity: row.get(5)?,
        current_size: size as usize,
    })
}

const TEAM_SELECT: &str = "SELECT t.id, t.owner_id, t.name, t.sport, t.age_group, t.capacity,
        (SELECT COUNT(*) FROM roster_entries r WHERE r.team_id = t.id)
     FROM teams t";

// ---------------------------------------------------------------------------
// Store trait implementations
// ---------------------------------------------------------------------------

impl PoolStore for Database {
    fn insert_entry(&self, entry: &PoolEntry) -> Result<()> {
        insert_entry_row(&self.conn(), entry).map_err(AllocationError::store)
    }

    fn get_entry(&self, entry_id: &str) -> Result<Option<PoolEntry>> {
        load_entry(&self.conn(), entry_id).map_err(AllocationError::store)
    }

    fn query_entries(&self, filter: &PoolFilter) -> Result<Vec<PoolEntry>> {
        let entries = query_entry_rows(&self.conn(), filter).map_err(AllocationError::store)?;
        debug!(?filter, count = entries.len(), "pool query");
        Ok(entries)
    }

    fn commit_assignment(&self, commit: &AssignmentCommit) -> Result<CasOutcome> {
        commit_assignment_tx(&mut self.conn(), commit).map_err(AllocationError::store)
    }

    fn decline_entry(&self, entry_id: &str, reason: Option<&str>) -> Result<CasOutcome> {
        decline_tx(&mut self.conn(), entry_id, reason).map_err(AllocationError::store)
    }

    fn update_payment(&self, entry_id: &str, update: &PaymentUpdate) -> Result<Option<PoolEntry>> {
        update_payment_tx(&mut self.conn(), entry_id, update).map_err(AllocationError::store)
    }
}

impl RosterStore for Database {
    fn roster_for_team(&self, team_id: &str) -> Result<Vec<RosterEntry>> {
        let conn = self.conn();
        let load = || -> anyhow::Result<Vec<RosterEntry>> {
            let mut stmt = conn
                .prepare(
                    "SELECT snapshot FROM roster_entries WHERE team_id = ?1
                     ORDER BY created_at, id",
                )
                .context("failed to prepare roster query")?;
            let snapshots = stmt
                .query_map(params![team_id], |row| row.get::<_, String>(0))
                .context("failed to query roster")?
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("failed to map roster rows")?;
            snapshots.into_iter().map(decode_roster).collect()
        };
        load().map_err(AllocationError::store)
    }

    fn roster_entry_for_pool_entry(&self, pool_entry_id: &str) -> Result<Option<RosterEntry>> {
        let conn = self.conn();
        let snapshot: Option<String> = conn
            .query_row(
                "SELECT snapshot FROM roster_entries WHERE pool_entry_id = ?1",
                params![pool_entry_id],
                |row| row.get(0),
            )
            .optional()
            .context("failed to load roster entry")
            .map_err(AllocationError::store)?;
        snapshot
            .map(decode_roster)
            .transpose()
            .map_err(AllocationError::store)
    }

    fn roster_size(&self, team_id: &str) -> Result<usize> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM roster_entries WHERE team_id = ?1",
                params![team_id],
                |row| row.get(0),
            )
            .context("failed to count roster entries")
            .map_err(AllocationError::store)?;
        Ok(count as usize)
    }
}

impl TeamDirectory for Database {
    fn find_teams(
        &self,
        owner_id: &str,
        sport: Option<&str>,
        age_group: Option<&str>,
    ) -> Result<Vec<TeamSummary>> {
        let conn = self.conn();
        let load = || -> anyhow::Result<Vec<TeamSummary>> {
            let mut stmt = conn
                .prepare(&format!(
                    "{TEAM_SELECT}
                     WHERE t.owner_id = ?1
                       AND (?2 IS NULL OR t.sport = ?2)
                       AND (?3 IS NULL OR t.age_group = ?3)
                     ORDER BY t.name, t.id"
                ))
                .context("failed to prepare team query")?;
            let teams = stmt
                .query_map(params![owner_id, sport, age_group], map_team)
                .context("failed to query teams")?
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("failed to map team rows")?;
            Ok(teams)
        };
        load().map_err(AllocationError::store)
    }

    fn get_team(&self, team_id: &str) -> Result<Option<TeamSummary>> {
        let conn = self.conn();
        conn.query_row(
            &format!("{TEAM_SELECT} WHERE t.id = ?1"),
            params![team_id],
            map_team,
        )
        .optional()
        .context("failed to load team")
        .map_err(AllocationError::store)
    }
}

impl PartyProfiles for Database {
    fn set_current_team(&self, party_id: &str, team_id: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO party_profiles (party_id, current_team_id, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(party_id) DO UPDATE SET
                current_team_id = excluded.current_team_id,
                updated_at      = excluded.updated_at",
            params![party_id, team_id, ts(&Utc::now())],
        )
        .context("failed to set party current team")
        .map_err(AllocationError::store)?;
        Ok(())
    }
}

impl AssignmentOutbox for Database {
    fn pending_party_links(&self, limit: usize) -> Result<Vec<PartyLinkRecord>> {
        let conn = self.conn();
        let load = || -> anyhow::Result<Vec<PartyLinkRecord>> {
            let mut stmt = conn
                .prepare(
                    "SELECT seq, entry_id, party_id, team_id, created_at
                     FROM party_link_outbox WHERE delivered_at IS NULL
                     ORDER BY seq LIMIT ?1",
                )
                .context("failed to prepare outbox query")?;
            let rows = stmt
                .query_map(params![limit as i64], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })
                .context("failed to query outbox")?
                .collect::<std::result::Result<Vec<_>, _>>()
                .context("failed to map outbox rows")?;
            rows.into_iter()
                .map(|(seq, entry_id, party_id, team_id, created_at)| {
                    Ok(PartyLinkRecord {
                        seq,
                        entry_id,
                        link: PartyLink { party_id, team_id },
                        created_at: parse_ts(&created_at)?,
                    })
                })
                .collect()
        };
        load().map_err(AllocationError::store)
    }

    fn mark_party_link_delivered(&self, seq: i64) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE party_link_outbox SET delivered_at = ?2 WHERE seq = ?1",
            params![seq, ts(&Utc::now())],
        )
        .context("failed to mark party link delivered")
        .map_err(AllocationError::store)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{intake, team, OWNER};

    /// Helper: create a fresh in-memory database for each test.
    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    fn waiting_entry(id: &str, team_id: &str) -> PoolEntry {
        PoolEntry::from_intake(
            id.to_string(),
            intake(&format!("Kid {id}"), team_id, PaymentStatus::Pending),
            false,
            Utc::now(),
        )
    }

    fn commit_for(entry: &PoolEntry, roster_id: &str, team_id: &str) -> AssignmentCommit {
        let now = Utc::now();
        AssignmentCommit {
            entry_id: entry.id.clone(),
            assignment: Assignment {
                team_id: team_id.to_string(),
                team_name: format!("Team {team_id}"),
                operator_id: "coach-1".into(),
                assigned_at: now,
                round: Some(2),
                pick: Some(7),
                roster_entry_id: roster_id.to_string(),
            },
            roster_entry: RosterEntry::snapshot(roster_id.to_string(), entry, team_id, Some(2), Some(7), now),
            party_link: None,
        }
    }

    // ------------------------------------------------------------------
    // Schema / open
    // ------------------------------------------------------------------

    #[test]
    fn open_creates_tables() {
        let db = test_db();
        let conn = db.conn();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for expected in [
            "teams",
            "pool_entries",
            "roster_entries",
            "party_link_outbox",
            "party_profiles",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table {expected}");
        }
    }

    #[test]
    fn balance_drift_is_rejected_by_schema() {
        let db = test_db();
        let mut entry = waiting_entry("e1", "t1");
        entry.payment.remaining_balance = 1;
        let err = db.insert_entry(&entry).unwrap_err();
        assert!(err.is_retryable(), "schema violations surface as store errors");
        assert!(db.get_entry("e1").unwrap().is_none());
    }

    // ------------------------------------------------------------------
    // Pool entries
    // ------------------------------------------------------------------

    #[test]
    fn insert_and_get_round_trip() {
        let db = test_db();
        let entry = waiting_entry("e1", "t1");
        db.insert_entry(&entry).unwrap();

        let loaded = db.get_entry("e1").unwrap().expect("entry should exist");
        assert_eq!(loaded.candidate, entry.candidate);
        assert_eq!(loaded.contact, entry.contact);
        assert_eq!(loaded.details, entry.details);
        assert_eq!(loaded.targeting, entry.targeting);
        assert_eq!(loaded.payment, entry.payment);
        assert_eq!(loaded.state, EntryState::Waiting);
        assert_eq!(loaded.created_at, entry.created_at);
    }

    #[test]
    fn get_missing_entry_returns_none() {
        let db = test_db();
        assert!(db.get_entry("nope").unwrap().is_none());
    }

    #[test]
    fn duplicate_entry_id_is_rejected() {
        let db = test_db();
        db.insert_entry(&waiting_entry("e1", "t1")).unwrap();
        assert!(db.insert_entry(&waiting_entry("e1", "t1")).is_err());
    }

    #[test]
    fn query_filters_by_team_and_status() {
        let db = test_db();
        db.insert_entry(&waiting_entry("e1", "t1")).unwrap();
        db.insert_entry(&waiting_entry("e2", "t1")).unwrap();
        db.insert_entry(&waiting_entry("e3", "t2")).unwrap();
        db.decline_entry("e2", None).unwrap();

        let waiting = db.query_entries(&PoolFilter::waiting_for_team("t1")).unwrap();
        let ids: Vec<&str> = waiting.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e1"]);

        let all_for_owner = db
            .query_entries(&PoolFilter {
                owner_id: Some(OWNER.into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(all_for_owner.len(), 3);
    }

    #[test]
    fn query_orders_by_creation() {
        let db = test_db();
        let base = Utc::now();
        for (i, id) in ["late", "early", "middle"].iter().enumerate() {
            let mut entry = waiting_entry(id, "t1");
            entry.created_at = base + chrono::Duration::seconds([30, 10, 20][i]);
            db.insert_entry(&entry).unwrap();
        }
        let ids: Vec<String> = db
            .query_entries(&PoolFilter::waiting_for_team("t1"))
            .unwrap()
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec!["early", "middle", "late"]);
    }

    // ------------------------------------------------------------------
    // Assignment commit
    // ------------------------------------------------------------------

    #[test]
    fn commit_assignment_writes_roster_and_status_together() {
        let db = test_db();
        let entry = waiting_entry("e1", "t1");
        db.insert_entry(&entry).unwrap();

        let outcome = db.commit_assignment(&commit_for(&entry, "r1", "t1")).unwrap();
        assert_eq!(outcome, CasOutcome::Applied);

        let loaded = db.get_entry("e1").unwrap().unwrap();
        let assignment = loaded.state.assignment().expect("drafted entry has assignment");
        assert_eq!(assignment.team_id, "t1");
        assert_eq!(assignment.operator_id, "coach-1");
        assert_eq!((assignment.round, assignment.pick), (Some(2), Some(7)));
        assert_eq!(assignment.roster_entry_id, "r1");

        let roster = db.roster_entry_for_pool_entry("e1").unwrap().unwrap();
        assert_eq!(roster.id, "r1");
        assert_eq!(roster.team_id, "t1");
        assert_eq!(db.roster_size("t1").unwrap(), 1);
    }

    #[test]
    fn commit_assignment_rejects_stale_status() {
        let db = test_db();
        let entry = waiting_entry("e1", "t1");
        db.insert_entry(&entry).unwrap();
        db.commit_assignment(&commit_for(&entry, "r1", "t1")).unwrap();

        // A second commit built from the same stale read must not land.
        let outcome = db.commit_assignment(&commit_for(&entry, "r2", "t2")).unwrap();
        assert_eq!(outcome, CasOutcome::Current(EntryStatus::Drafted));
        assert_eq!(db.roster_size("t2").unwrap(), 0);
        assert_eq!(db.roster_entry_for_pool_entry("e1").unwrap().unwrap().id, "r1");
    }

    #[test]
    fn commit_assignment_for_missing_entry() {
        let db = test_db();
        let ghost = waiting_entry("ghost", "t1");
        let outcome = db.commit_assignment(&commit_for(&ghost, "r1", "t1")).unwrap();
        assert_eq!(outcome, CasOutcome::Missing);
        assert_eq!(db.roster_size("t1").unwrap(), 0);
    }

    #[test]
    fn failed_roster_insert_rolls_back_status() {
        let db = test_db();
        let first = waiting_entry("e1", "t1");
        let second = waiting_entry("e2", "t1");
        db.insert_entry(&first).unwrap();
        db.insert_entry(&second).unwrap();
        db.commit_assignment(&commit_for(&first, "r1", "t1")).unwrap();

        // Reusing roster id r1 violates the primary key after the status
        // update already ran inside the transaction.
        let err = db.commit_assignment(&commit_for(&second, "r1", "t1")).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(db.get_entry("e2").unwrap().unwrap().status(), EntryStatus::Waiting);
        assert!(db.roster_entry_for_pool_entry("e2").unwrap().is_none());
    }

    #[test]
    fn party_link_is_recorded_in_outbox() {
        let db = test_db();
        let entry = waiting_entry("e1", "t1");
        db.insert_entry(&entry).unwrap();
        let mut commit = commit_for(&entry, "r1", "t1");
        commit.party_link = Some(PartyLink {
            party_id: "p1".into(),
            team_id: "t1".into(),
        });
        db.commit_assignment(&commit).unwrap();

        let pending = db.pending_party_links(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entry_id, "e1");
        assert_eq!(pending[0].link.party_id, "p1");

        db.mark_party_link_delivered(pending[0].seq).unwrap();
        assert!(db.pending_party_links(10).unwrap().is_empty());
    }

    // ------------------------------------------------------------------
    // Decline / payment
    // ------------------------------------------------------------------

    #[test]
    fn decline_is_conditional_on_waiting() {
        let db = test_db();
        db.insert_entry(&waiting_entry("e1", "t1")).unwrap();

        assert_eq!(db.decline_entry("e1", Some("aged out")).unwrap(), CasOutcome::Applied);
        assert_eq!(
            db.decline_entry("e1", Some("again")).unwrap(),
            CasOutcome::Current(EntryStatus::Declined)
        );
        assert_eq!(db.decline_entry("nope", None).unwrap(), CasOutcome::Missing);

        let loaded = db.get_entry("e1").unwrap().unwrap();
        assert_eq!(
            loaded.state,
            EntryState::Declined {
                reason: Some("aged out".into())
            }
        );
    }

    #[test]
    fn update_payment_touches_only_payment_columns() {
        let db = test_db();
        let entry = waiting_entry("e1", "t1");
        db.insert_entry(&entry).unwrap();
        db.commit_assignment(&commit_for(&entry, "r1", "t1")).unwrap();

        let updated = db
            .update_payment(
                "e1",
                &PaymentUpdate {
                    amount_paid: Some(15000),
                    method: Some("check".into()),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.payment.status, PaymentStatus::PaidFull);
        assert_eq!(updated.payment.remaining_balance, 0);
        assert_eq!(updated.status(), EntryStatus::Drafted);

        let reloaded = db.get_entry("e1").unwrap().unwrap();
        assert_eq!(reloaded.payment, updated.payment);
        assert_eq!(reloaded.status(), EntryStatus::Drafted);
    }

    #[test]
    fn update_payment_for_missing_entry() {
        let db = test_db();
        assert!(db
            .update_payment("nope", &PaymentUpdate::default())
            .unwrap()
            .is_none());
    }

    // ------------------------------------------------------------------
    // Teams / profiles
    // ------------------------------------------------------------------

    #[test]
    fn find_teams_filters_and_counts_roster() {
        let db = test_db();
        db.upsert_team(&team("t1", "football", "9U")).unwrap();
        db.upsert_team(&team("t2", "football", "9U")).unwrap();
        db.upsert_team(&team("t3", "soccer", "9U")).unwrap();

        let entry = waiting_entry("e1", "t1");
        db.insert_entry(&entry).unwrap();
        db.commit_assignment(&commit_for(&entry, "r1", "t1")).unwrap();

        let football = db.find_teams(OWNER, Some("football"), Some("9U")).unwrap();
        assert_eq!(football.len(), 2);
        let t1 = football.iter().find(|t| t.id == "t1").unwrap();
        assert_eq!(t1.current_size, 1);

        assert_eq!(db.find_teams(OWNER, None, None).unwrap().len(), 3);
        assert!(db.find_teams("someone-else", None, None).unwrap().is_empty());
    }

    #[test]
    fn upsert_team_updates_in_place() {
        let db = test_db();
        db.upsert_team(&team("t1", "football", "9U")).unwrap();
        let mut renamed = team("t1", "football", "10U");
        renamed.name = "Renamed".into();
        db.upsert_team(&renamed).unwrap();

        let loaded = db.get_team("t1").unwrap().unwrap();
        assert_eq!(loaded.name, "Renamed");
        assert_eq!(loaded.age_group, "10U");
        assert!(db.get_team("t404").unwrap().is_none());
    }

    #[test]
    fn set_current_team_upserts_profile() {
        let db = test_db();
        db.set_current_team("p1", "t1").unwrap();
        db.set_current_team("p1", "t2").unwrap();
        assert_eq!(db.current_team_for_party("p1").unwrap().as_deref(), Some("t2"));
        assert!(db.current_team_for_party("p2").unwrap().is_none());
    }
}
