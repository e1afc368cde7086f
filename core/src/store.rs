//! SQLite adapter for the telemetry tables.
//!
//! RULE: Only store.rs talks to the database.
//! The engine never executes SQL; it receives an `EventSnapshot` loaded
//! here (or built elsewhere) and works on that immutable copy.

use crate::{
    error::{RiskError, RiskResult},
    event::{
        Account, ComputeAction, ComputeActivityEvent, IpReputation, LoginEvent, LoginOutcome,
        PaymentEvent, PaymentStatus, SecurityFinding,
    },
    snapshot::EventSnapshot,
    types::Timestamp,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection};

pub struct EventStore {
    conn: Connection,
}

impl EventStore {
    /// Open (or create) the telemetry database at `path`.
    pub fn open(path: &str) -> RiskResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode only for real files (:memory: ignores it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> RiskResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> RiskResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_telemetry.sql"))?;
        Ok(())
    }

    // ── Writes ─────────────────────────────────────────────────

    /// Write every record of a snapshot in one transaction.
    pub fn write_snapshot(&mut self, snapshot: &EventSnapshot) -> RiskResult<()> {
        let tx = self.conn.transaction()?;
        for account in snapshot.accounts() {
            insert_account(&tx, account)?;
        }
        for rep in snapshot.ip_reputations() {
            insert_ip_reputation(&tx, rep)?;
        }
        for login in snapshot.all_logins() {
            insert_login(&tx, login)?;
        }
        for event in snapshot.all_compute() {
            insert_compute(&tx, event)?;
        }
        for payment in snapshot.all_payments() {
            insert_payment(&tx, payment)?;
        }
        for finding in snapshot.all_findings() {
            insert_finding(&tx, finding)?;
        }
        tx.commit()?;
        log::info!(
            "wrote snapshot: {} accounts, {} logins, {} compute, {} payments",
            snapshot.account_count(),
            snapshot.login_count(),
            snapshot.compute_count(),
            snapshot.payment_count()
        );
        Ok(())
    }

    pub fn insert_login(&self, login: &LoginEvent) -> RiskResult<()> {
        insert_login(&self.conn, login)
    }

    pub fn insert_ip_reputation(&self, rep: &IpReputation) -> RiskResult<()> {
        insert_ip_reputation(&self.conn, rep)
    }

    // ── Reads ──────────────────────────────────────────────────

    /// Load every table into an immutable snapshot.
    pub fn load_snapshot(&self) -> RiskResult<EventSnapshot> {
        let mut builder = EventSnapshot::builder();

        let mut stmt = self
            .conn
            .prepare("SELECT account_id, created_ts, home_countries FROM users")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (account_id, created, countries) in rows {
            builder = builder.account(Account {
                account_id,
                created_at: parse_ts("users", &created)?,
                home_countries: countries
                    .split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_string)
                    .collect(),
            });
        }

        let mut stmt = self
            .conn
            .prepare("SELECT ip, risk_score, asn, is_tor FROM ip_reputation")?;
        let reps = stmt
            .query_map([], |row| {
                Ok(IpReputation {
                    ip: row.get(0)?,
                    risk_score: row.get(1)?,
                    asn: row.get(2)?,
                    is_anonymizer: row.get::<_, i64>(3)? != 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for rep in reps {
            if !(0.0..=1.0).contains(&rep.risk_score) {
                return Err(RiskError::InvalidRecord {
                    table: "ip_reputation",
                    detail: format!("risk_score {} for {} outside [0, 1]", rep.risk_score, rep.ip),
                });
            }
            builder = builder.ip_reputation(rep);
        }

        let mut stmt = self.conn.prepare(
            "SELECT login_id, account_id, event_ts, result, ip, country_iso, device_id, mfa_used
             FROM logins",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<i64>>(7)?.unwrap_or(0) != 0,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (login_id, account_id, ts, result, ip, country, device_id, mfa_used) in rows {
            let outcome =
                LoginOutcome::from_db_str(&result).ok_or_else(|| RiskError::InvalidRecord {
                    table: "logins",
                    detail: format!("login {login_id} has unknown result '{result}'"),
                })?;
            builder = builder.login(LoginEvent {
                timestamp: parse_ts("logins", &ts)?,
                login_id,
                account_id,
                outcome,
                ip,
                country,
                device_id,
                mfa_used,
            });
        }

        let mut stmt = self
            .conn
            .prepare("SELECT event_id, account_id, event_ts, action, region FROM ec2_activity")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (event_id, account_id, ts, action, region) in rows {
            builder = builder.compute(ComputeActivityEvent {
                timestamp: parse_ts("ec2_activity", &ts)?,
                event_id,
                account_id,
                action: ComputeAction::from_db_str(&action),
                region,
            });
        }

        let mut stmt = self
            .conn
            .prepare("SELECT payment_id, account_id, payment_ts, amount, status FROM payments")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (payment_id, account_id, ts, amount, status) in rows {
            let status =
                PaymentStatus::from_db_str(&status).ok_or_else(|| RiskError::InvalidRecord {
                    table: "payments",
                    detail: format!("payment {payment_id} has unknown status '{status}'"),
                })?;
            builder = builder.payment(PaymentEvent {
                timestamp: parse_ts("payments", &ts)?,
                payment_id,
                account_id,
                amount,
                status,
            });
        }

        let mut stmt = self.conn.prepare(
            "SELECT finding_id, account_id, finding_ts, confirmed_compromise FROM security_findings",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)? != 0,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (finding_id, account_id, ts, confirmed_compromise) in rows {
            builder = builder.finding(SecurityFinding {
                timestamp: parse_ts("security_findings", &ts)?,
                finding_id,
                account_id,
                confirmed_compromise,
            });
        }

        let snapshot = builder.build();
        log::info!(
            "loaded snapshot: {} accounts, {} logins, {} compute, {} payments",
            snapshot.account_count(),
            snapshot.login_count(),
            snapshot.compute_count(),
            snapshot.payment_count()
        );
        Ok(snapshot)
    }
}

// ── Row writers (shared by direct inserts and transactions) ─────

fn insert_account(conn: &Connection, account: &Account) -> RiskResult<()> {
    let countries: Vec<&str> = account.home_countries.iter().map(String::as_str).collect();
    conn.execute(
        "INSERT INTO users (account_id, created_ts, home_countries) VALUES (?1, ?2, ?3)",
        params![
            account.account_id,
            account.created_at.to_rfc3339(),
            countries.join(",")
        ],
    )?;
    Ok(())
}

fn insert_ip_reputation(conn: &Connection, rep: &IpReputation) -> RiskResult<()> {
    conn.execute(
        "INSERT INTO ip_reputation (ip, risk_score, asn, is_tor) VALUES (?1, ?2, ?3, ?4)",
        params![rep.ip, rep.risk_score, rep.asn, rep.is_anonymizer as i64],
    )?;
    Ok(())
}

fn insert_login(conn: &Connection, login: &LoginEvent) -> RiskResult<()> {
    conn.execute(
        "INSERT INTO logins (login_id, account_id, event_ts, result, ip, country_iso, device_id, mfa_used)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            login.login_id,
            login.account_id,
            login.timestamp.to_rfc3339(),
            login.outcome.as_db_str(),
            login.ip,
            login.country,
            login.device_id,
            login.mfa_used as i64,
        ],
    )?;
    Ok(())
}

fn insert_compute(conn: &Connection, event: &ComputeActivityEvent) -> RiskResult<()> {
    conn.execute(
        "INSERT INTO ec2_activity (event_id, account_id, event_ts, action, region)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            event.event_id,
            event.account_id,
            event.timestamp.to_rfc3339(),
            event.action.as_db_str(),
            event.region,
        ],
    )?;
    Ok(())
}

fn insert_payment(conn: &Connection, payment: &PaymentEvent) -> RiskResult<()> {
    conn.execute(
        "INSERT INTO payments (payment_id, account_id, payment_ts, amount, status)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            payment.payment_id,
            payment.account_id,
            payment.timestamp.to_rfc3339(),
            payment.amount,
            payment.status.as_db_str(),
        ],
    )?;
    Ok(())
}

fn insert_finding(conn: &Connection, finding: &SecurityFinding) -> RiskResult<()> {
    conn.execute(
        "INSERT INTO security_findings (finding_id, account_id, finding_ts, confirmed_compromise)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            finding.finding_id,
            finding.account_id,
            finding.timestamp.to_rfc3339(),
            finding.confirmed_compromise as i64,
        ],
    )?;
    Ok(())
}

/// RFC 3339, or the bare `YYYY-MM-DD HH:MM:SS[.f]` form taken as UTC.
fn parse_ts(table: &'static str, raw: &str) -> RiskResult<Timestamp> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| RiskError::InvalidRecord {
            table,
            detail: format!("bad timestamp '{raw}': {e}"),
        })
}
