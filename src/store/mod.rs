//! Corpus Store — SQLite persistence for cases, evidence, and health-check
//! findings.
//!
//! Local-first: everything lives in a single SQLite file (WAL mode so long
//! analysis writes never block the read API). All reads return owned
//! snapshots; callers never share mutable references into the store.

pub mod insights;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS cases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    case_number TEXT UNIQUE NOT NULL,
    defendant_name TEXT NOT NULL,
    charges TEXT NOT NULL DEFAULT '[]',
    severity TEXT NOT NULL DEFAULT 'misdemeanor',
    status TEXT NOT NULL DEFAULT 'active',
    court TEXT NOT NULL DEFAULT '',
    judge TEXT NOT NULL DEFAULT '',
    prosecutor TEXT NOT NULL DEFAULT '',
    next_hearing_date TEXT,
    hearing_type TEXT,
    filing_date TEXT NOT NULL DEFAULT '',
    arrest_date TEXT NOT NULL DEFAULT '',
    evidence_summary TEXT NOT NULL DEFAULT '',
    notes TEXT NOT NULL DEFAULT '',
    attorney_notes TEXT NOT NULL DEFAULT '',
    plea_offer TEXT,
    plea_offer_details TEXT,
    arresting_officer TEXT NOT NULL DEFAULT '',
    precinct TEXT NOT NULL DEFAULT '',
    witnesses TEXT NOT NULL DEFAULT '[]',
    prior_record TEXT NOT NULL DEFAULT '',
    bond_status TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS evidence (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    case_number TEXT NOT NULL,
    evidence_type TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    file_path TEXT NOT NULL DEFAULT '',
    poster_path TEXT NOT NULL DEFAULT '',
    source TEXT NOT NULL DEFAULT '',
    date_collected TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    case_number TEXT,
    alert_type TEXT NOT NULL,
    severity TEXT NOT NULL DEFAULT 'info',
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    details TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS connections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    case_numbers TEXT NOT NULL DEFAULT '[]',
    connection_type TEXT NOT NULL,
    title TEXT NOT NULL,
    description TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 0.0,
    actionable TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS priority_actions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    rank INTEGER NOT NULL DEFAULT 0,
    case_number TEXT NOT NULL DEFAULT '',
    action TEXT NOT NULL,
    urgency TEXT NOT NULL DEFAULT 'routine',
    reason TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS analysis_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    analysis_type TEXT NOT NULL,
    scope TEXT NOT NULL DEFAULT '',
    thinking_text TEXT NOT NULL DEFAULT '',
    result_json TEXT NOT NULL DEFAULT '{}',
    token_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chat_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    client_id TEXT NOT NULL,
    role TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_evidence_case ON evidence(case_number);
CREATE INDEX IF NOT EXISTS idx_cases_status ON cases(status);
CREATE INDEX IF NOT EXISTS idx_alerts_severity ON alerts(severity);
CREATE INDEX IF NOT EXISTS idx_analysis_scope ON analysis_log(scope, analysis_type);
CREATE INDEX IF NOT EXISTS idx_chat_client ON chat_history(client_id);
"#;

// ── Domain types ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Felony,
    Misdemeanor,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Felony => "felony",
            Severity::Misdemeanor => "misdemeanor",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "felony" => Severity::Felony,
            _ => Severity::Misdemeanor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Critical,
    Warning,
    Info,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Critical => "critical",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Info => "info",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "critical" => AlertSeverity::Critical,
            "warning" => AlertSeverity::Warning,
            _ => AlertSeverity::Info,
        }
    }

    fn sort_rank(&self) -> i32 {
        match self {
            AlertSeverity::Critical => 0,
            AlertSeverity::Warning => 1,
            AlertSeverity::Info => 2,
        }
    }
}

/// One case in the defender's caseload. Immutable snapshot from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    pub case_number: String,
    pub defendant_name: String,
    pub charges: Vec<String>,
    pub severity: Severity,
    pub status: String,
    pub court: String,
    pub judge: String,
    pub prosecutor: String,
    pub next_hearing_date: Option<String>,
    pub hearing_type: Option<String>,
    pub filing_date: String,
    pub arrest_date: String,
    pub evidence_summary: String,
    pub notes: String,
    pub attorney_notes: String,
    pub plea_offer: Option<String>,
    pub plea_offer_details: Option<String>,
    pub arresting_officer: String,
    pub precinct: String,
    pub witnesses: Vec<String>,
    pub prior_record: String,
    pub bond_status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: i64,
    pub case_number: String,
    pub evidence_type: String,
    pub title: String,
    pub description: String,
    pub file_path: String,
    pub poster_path: String,
    pub source: String,
    pub date_collected: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: i64,
    /// Target case, or `None` for a caseload-wide alert.
    pub case_number: Option<String>,
    pub alert_type: String,
    pub severity: AlertSeverity,
    pub title: String,
    pub message: String,
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseConnection {
    pub id: i64,
    pub case_numbers: Vec<String>,
    pub connection_type: String,
    pub title: String,
    pub description: String,
    pub confidence: f64,
    pub actionable: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorityAction {
    pub rank: i64,
    pub case_number: String,
    pub action: String,
    pub urgency: String,
    pub reason: String,
}

/// Search filter for `search_cases`. All present fields must match.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CaseFilter {
    pub officer: Option<String>,
    pub charge: Option<String>,
    pub status: Option<String>,
    /// Inclusive (start, end) bounds on arrest_date, ISO format.
    pub date_range: Option<(String, String)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseCounts {
    pub total: i64,
    pub felonies: i64,
    pub misdemeanors: i64,
    pub active: i64,
}

// ── Store ─────────────────────────────────────────────────────────────────

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        Self::init(conn)
    }

    /// In-memory store, used by tests and the demo seeder.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().context("failed to open in-memory database")?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "foreign_keys", "ON").ok();
        conn.execute_batch(SCHEMA_SQL).context("failed to apply schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── Cases ─────────────────────────────────────────────────────────────

    pub fn insert_cases(&self, cases: &[CaseRecord]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO cases (
                    case_number, defendant_name, charges, severity, status,
                    court, judge, prosecutor, next_hearing_date, hearing_type,
                    filing_date, arrest_date, evidence_summary, notes,
                    attorney_notes, plea_offer, plea_offer_details,
                    arresting_officer, precinct, witnesses, prior_record,
                    bond_status, created_at, updated_at
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24)",
            )?;
            let now = Utc::now().to_rfc3339();
            for c in cases {
                stmt.execute(params![
                    c.case_number,
                    c.defendant_name,
                    serde_json::to_string(&c.charges)?,
                    c.severity.as_str(),
                    c.status,
                    c.court,
                    c.judge,
                    c.prosecutor,
                    c.next_hearing_date,
                    c.hearing_type,
                    c.filing_date,
                    c.arrest_date,
                    c.evidence_summary,
                    c.notes,
                    c.attorney_notes,
                    c.plea_offer,
                    c.plea_offer_details,
                    c.arresting_officer,
                    c.precinct,
                    serde_json::to_string(&c.witnesses)?,
                    c.prior_record,
                    c.bond_status,
                    now,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_case(&self, case_number: &str) -> Result<Option<CaseRecord>> {
        let conn = self.lock();
        conn.query_row(
            "SELECT * FROM cases WHERE case_number = ?1",
            params![case_number],
            row_to_case,
        )
        .optional()
        .context("failed to load case")
    }

    /// Every case, ordered by upcoming hearing date (cases with no hearing
    /// sort last). Used by the read API.
    pub fn all_cases(&self) -> Result<Vec<CaseRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT * FROM cases ORDER BY
             CASE WHEN next_hearing_date IS NOT NULL AND next_hearing_date != ''
             THEN next_hearing_date ELSE '9999-12-31' END ASC, case_number ASC",
        )?;
        let rows = stmt.query_map([], row_to_case)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("failed to list cases")
    }

    /// Every case in deterministic `case_number` ascending order. This is the
    /// ordering the context builder depends on.
    pub fn cases_ordered(&self) -> Result<Vec<CaseRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT * FROM cases ORDER BY case_number ASC")?;
        let rows = stmt.query_map([], row_to_case)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("failed to list cases")
    }

    /// Filtered search returning matching case numbers, ascending.
    pub fn search_cases(&self, filter: &CaseFilter) -> Result<Vec<String>> {
        let cases = self.cases_ordered()?;
        Ok(cases
            .into_iter()
            .filter(|c| {
                if let Some(officer) = &filter.officer {
                    if !c.arresting_officer.eq_ignore_ascii_case(officer) {
                        return false;
                    }
                }
                if let Some(charge) = &filter.charge {
                    let needle = charge.to_lowercase();
                    if !c.charges.iter().any(|ch| ch.to_lowercase().contains(&needle)) {
                        return false;
                    }
                }
                if let Some(status) = &filter.status {
                    if !c.status.eq_ignore_ascii_case(status) {
                        return false;
                    }
                }
                if let Some((start, end)) = &filter.date_range {
                    if c.arrest_date.as_str() < start.as_str()
                        || c.arrest_date.as_str() > end.as_str()
                    {
                        return false;
                    }
                }
                true
            })
            .map(|c| c.case_number)
            .collect())
    }

    pub fn case_counts(&self) -> Result<CaseCounts> {
        let conn = self.lock();
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM cases", [], |r| r.get(0))?;
        let felonies: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cases WHERE severity = 'felony'",
            [],
            |r| r.get(0),
        )?;
        let misdemeanors: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cases WHERE severity = 'misdemeanor'",
            [],
            |r| r.get(0),
        )?;
        let active: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cases WHERE status = 'active'",
            [],
            |r| r.get(0),
        )?;
        Ok(CaseCounts {
            total,
            felonies,
            misdemeanors,
            active,
        })
    }

    pub fn clear_caseload(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            "DELETE FROM cases; DELETE FROM evidence; DELETE FROM alerts;
             DELETE FROM connections; DELETE FROM priority_actions;
             DELETE FROM analysis_log;",
        )?;
        Ok(())
    }

    // ── Evidence ──────────────────────────────────────────────────────────

    pub fn insert_evidence(&self, items: &[EvidenceItem]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO evidence (case_number, evidence_type, title, description,
                 file_path, poster_path, source, date_collected, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
            )?;
            let now = Utc::now().to_rfc3339();
            for e in items {
                stmt.execute(params![
                    e.case_number,
                    e.evidence_type,
                    e.title,
                    e.description,
                    e.file_path,
                    e.poster_path,
                    e.source,
                    e.date_collected,
                    now,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn evidence(&self, case_number: &str) -> Result<Vec<EvidenceItem>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, case_number, evidence_type, title, description, file_path,
             poster_path, source, date_collected
             FROM evidence WHERE case_number = ?1 ORDER BY date_collected, id",
        )?;
        let rows = stmt.query_map(params![case_number], |row| {
            Ok(EvidenceItem {
                id: row.get(0)?,
                case_number: row.get(1)?,
                evidence_type: row.get(2)?,
                title: row.get(3)?,
                description: row.get(4)?,
                file_path: row.get(5)?,
                poster_path: row.get(6)?,
                source: row.get(7)?,
                date_collected: row.get(8)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("failed to list evidence")
    }

    pub fn get_evidence_item(&self, case_number: &str, id: i64) -> Result<Option<EvidenceItem>> {
        Ok(self.evidence(case_number)?.into_iter().find(|e| e.id == id))
    }

    // ── Health-check findings ─────────────────────────────────────────────

    /// Replace the current alerts, connections, and priority actions in a
    /// single transaction. Each health-check run supersedes the previous one
    /// wholesale; the enclosing insight stays in the analysis log.
    pub fn replace_findings(
        &self,
        alerts: &[Alert],
        connections: &[CaseConnection],
        actions: &[PriorityAction],
    ) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        tx.execute("DELETE FROM alerts", [])?;
        tx.execute("DELETE FROM connections", [])?;
        tx.execute("DELETE FROM priority_actions", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO alerts (case_number, alert_type, severity, title, message, details, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7)",
            )?;
            for a in alerts {
                stmt.execute(params![
                    a.case_number,
                    a.alert_type,
                    a.severity.as_str(),
                    a.title,
                    a.message,
                    a.details,
                    now,
                ])?;
            }
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO connections (case_numbers, connection_type, title, description, confidence, actionable, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7)",
            )?;
            for c in connections {
                stmt.execute(params![
                    serde_json::to_string(&c.case_numbers)?,
                    c.connection_type,
                    c.title,
                    c.description,
                    c.confidence,
                    c.actionable,
                    now,
                ])?;
            }
        }
        {
            let mut stmt = tx.prepare(
                "INSERT INTO priority_actions (rank, case_number, action, urgency, reason, created_at)
                 VALUES (?1,?2,?3,?4,?5,?6)",
            )?;
            for p in actions {
                stmt.execute(params![p.rank, p.case_number, p.action, p.urgency, p.reason, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Active alerts, critical first. Alerts referencing a case number that
    /// no longer resolves are dropped at read time; caseload-wide alerts
    /// (no case number) are always kept.
    pub fn alerts(&self) -> Result<Vec<Alert>> {
        let known = self.known_case_numbers()?;
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, case_number, alert_type, severity, title, message, details FROM alerts",
        )?;
        let rows = stmt.query_map([], |row| {
            let severity: String = row.get(3)?;
            Ok(Alert {
                id: row.get(0)?,
                case_number: row.get::<_, Option<String>>(1)?.filter(|s| !s.is_empty()),
                alert_type: row.get(2)?,
                severity: AlertSeverity::parse(&severity),
                title: row.get(4)?,
                message: row.get(5)?,
                details: row.get(6)?,
            })
        })?;
        let mut alerts: Vec<Alert> = rows
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .filter(|a| match &a.case_number {
                Some(cn) => known.contains(cn),
                None => true,
            })
            .collect();
        alerts.sort_by_key(|a| (a.severity.sort_rank(), a.id));
        Ok(alerts)
    }

    /// Cross-case connections, highest confidence first. A connection naming
    /// any unknown case number is dropped at read time.
    pub fn connections(&self) -> Result<Vec<CaseConnection>> {
        let known = self.known_case_numbers()?;
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, case_numbers, connection_type, title, description, confidence, actionable
             FROM connections",
        )?;
        let rows = stmt.query_map([], |row| {
            let case_numbers: String = row.get(1)?;
            Ok(CaseConnection {
                id: row.get(0)?,
                case_numbers: serde_json::from_str(&case_numbers).unwrap_or_default(),
                connection_type: row.get(2)?,
                title: row.get(3)?,
                description: row.get(4)?,
                confidence: row.get(5)?,
                actionable: row.get(6)?,
            })
        })?;
        let mut conns: Vec<CaseConnection> = rows
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .filter(|c| !c.case_numbers.is_empty() && c.case_numbers.iter().all(|cn| known.contains(cn)))
            .collect();
        conns.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        Ok(conns)
    }

    pub fn priority_actions(&self) -> Result<Vec<PriorityAction>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT rank, case_number, action, urgency, reason FROM priority_actions ORDER BY rank, id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PriorityAction {
                rank: row.get(0)?,
                case_number: row.get(1)?,
                action: row.get(2)?,
                urgency: row.get(3)?,
                reason: row.get(4)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("failed to list priority actions")
    }

    fn known_case_numbers(&self) -> Result<std::collections::HashSet<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT case_number FROM cases")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    // ── Chat history ──────────────────────────────────────────────────────

    pub fn append_chat(&self, client_id: &str, role: &str, content: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO chat_history (client_id, role, content, created_at) VALUES (?1,?2,?3,?4)",
            params![client_id, role, content, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn chat_history(&self, client_id: &str) -> Result<Vec<(String, String)>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT role, content FROM chat_history WHERE client_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![client_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<rusqlite::Result<Vec<_>>>().context("failed to load chat history")
    }

    pub fn clear_chat(&self, client_id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM chat_history WHERE client_id = ?1", params![client_id])?;
        Ok(())
    }
}

fn row_to_case(row: &rusqlite::Row<'_>) -> rusqlite::Result<CaseRecord> {
    let charges: String = row.get("charges")?;
    let witnesses: String = row.get("witnesses")?;
    let severity: String = row.get("severity")?;
    Ok(CaseRecord {
        case_number: row.get("case_number")?,
        defendant_name: row.get("defendant_name")?,
        charges: serde_json::from_str(&charges).unwrap_or_default(),
        severity: Severity::parse(&severity),
        status: row.get("status")?,
        court: row.get("court")?,
        judge: row.get("judge")?,
        prosecutor: row.get("prosecutor")?,
        next_hearing_date: row.get("next_hearing_date")?,
        hearing_type: row.get("hearing_type")?,
        filing_date: row.get("filing_date")?,
        arrest_date: row.get("arrest_date")?,
        evidence_summary: row.get("evidence_summary")?,
        notes: row.get("notes")?,
        attorney_notes: row.get("attorney_notes")?,
        plea_offer: row.get("plea_offer")?,
        plea_offer_details: row.get("plea_offer_details")?,
        arresting_officer: row.get("arresting_officer")?,
        precinct: row.get("precinct")?,
        witnesses: serde_json::from_str(&witnesses).unwrap_or_default(),
        prior_record: row.get("prior_record")?,
        bond_status: row.get("bond_status")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_case(cn: &str, officer: &str) -> CaseRecord {
        CaseRecord {
            case_number: cn.to_string(),
            defendant_name: "Jordan Blake".to_string(),
            charges: vec!["DUI".to_string()],
            severity: Severity::Misdemeanor,
            status: "active".to_string(),
            court: "Fulton County State Court".to_string(),
            judge: "Hon. R. Whitfield".to_string(),
            prosecutor: "ADA Chen".to_string(),
            next_hearing_date: Some("2026-09-01".to_string()),
            hearing_type: Some("Arraignment".to_string()),
            filing_date: "2026-06-01".to_string(),
            arrest_date: "2026-05-20".to_string(),
            evidence_summary: String::new(),
            notes: String::new(),
            attorney_notes: String::new(),
            plea_offer: None,
            plea_offer_details: None,
            arresting_officer: officer.to_string(),
            precinct: "Zone 5".to_string(),
            witnesses: vec!["M. Ortiz".to_string()],
            prior_record: String::new(),
            bond_status: "Released on bond".to_string(),
        }
    }

    #[test]
    fn search_cases_filters_and_orders() {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_cases(&[
                sample_case("CR-2026-0002", "Rodriguez"),
                sample_case("CR-2026-0001", "Rodriguez"),
                sample_case("CR-2026-0003", "Freeman"),
            ])
            .unwrap();

        let hits = store
            .search_cases(&CaseFilter {
                officer: Some("rodriguez".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(hits, vec!["CR-2026-0001", "CR-2026-0002"]);
    }

    #[test]
    fn dangling_alerts_and_connections_dropped() {
        let store = Store::open_in_memory().unwrap();
        store.insert_cases(&[sample_case("CR-2026-0001", "Freeman")]).unwrap();

        let alerts = vec![
            Alert {
                id: 0,
                case_number: Some("CR-2026-0001".to_string()),
                alert_type: "deadline".to_string(),
                severity: AlertSeverity::Critical,
                title: "Speedy trial".to_string(),
                message: "deadline in 12 days".to_string(),
                details: String::new(),
            },
            Alert {
                id: 0,
                case_number: Some("CR-9999-0000".to_string()),
                alert_type: "deadline".to_string(),
                severity: AlertSeverity::Warning,
                title: "ghost".to_string(),
                message: "references a case that does not exist".to_string(),
                details: String::new(),
            },
            Alert {
                id: 0,
                case_number: None,
                alert_type: "strategy".to_string(),
                severity: AlertSeverity::Info,
                title: "caseload-wide".to_string(),
                message: "kept without a target case".to_string(),
                details: String::new(),
            },
        ];
        let connections = vec![CaseConnection {
            id: 0,
            case_numbers: vec!["CR-2026-0001".to_string(), "CR-9999-0000".to_string()],
            connection_type: "officer".to_string(),
            title: "partially dangling".to_string(),
            description: String::new(),
            confidence: 0.9,
            actionable: String::new(),
        }];
        store.replace_findings(&alerts, &connections, &[]).unwrap();

        let read = store.alerts().unwrap();
        assert_eq!(read.len(), 2);
        assert!(read.iter().all(|a| a.title != "ghost"));
        // critical sorts before info
        assert_eq!(read[0].severity, AlertSeverity::Critical);

        assert!(store.connections().unwrap().is_empty());
    }

    #[test]
    fn replace_findings_supersedes_previous_run() {
        let store = Store::open_in_memory().unwrap();
        store.insert_cases(&[sample_case("CR-2026-0001", "Freeman")]).unwrap();

        let alert = Alert {
            id: 0,
            case_number: Some("CR-2026-0001".to_string()),
            alert_type: "deadline".to_string(),
            severity: AlertSeverity::Critical,
            title: "first run".to_string(),
            message: String::new(),
            details: String::new(),
        };
        store.replace_findings(&[alert.clone()], &[], &[]).unwrap();
        store
            .replace_findings(
                &[Alert {
                    title: "second run".to_string(),
                    ..alert
                }],
                &[],
                &[],
            )
            .unwrap();

        let read = store.alerts().unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].title, "second run");
    }
}
