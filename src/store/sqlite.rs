//! SQLite-backed store. The schema mirrors the production data layout:
//! `locals` and `verbiage` for text, `role_factors`, `pattern_weights`,
//! and `pattern` for scoring reference data, and `sessions`, `responses`,
//! `match_roles`, `match_patterns` for session output.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use crate::quiz::domain::{AnswerSet, ItemType, PatternId, Role, RoleTotals, TOP_PATTERNS};

use super::{
    NewSession, PatternBrief, PatternScoreRow, PatternWeight, ReferenceStore, RoleFactor,
    SessionId, SessionStore, SessionSummary, StoreError,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS locals (
    local_id INTEGER PRIMARY KEY AUTOINCREMENT,
    language TEXT,
    itemtype INTEGER NOT NULL,
    object_id INTEGER NOT NULL,
    localstring TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS verbiage (
    role INTEGER NOT NULL,
    pattern INTEGER,
    language TEXT NOT NULL,
    vstring TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS role_factors (
    id_q INTEGER NOT NULL,
    position INTEGER NOT NULL,
    id_role INTEGER NOT NULL,
    factor INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS pattern_weights (
    id_q INTEGER NOT NULL,
    id_ans INTEGER NOT NULL,
    id_p INTEGER NOT NULL,
    weight INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS pattern (
    id INTEGER PRIMARY KEY,
    title TEXT,
    tweak_value REAL,
    rpat INTEGER
);
CREATE TABLE IF NOT EXISTS sessions (
    session_id INTEGER PRIMARY KEY AUTOINCREMENT,
    uid INTEGER NOT NULL,
    language TEXT,
    \"group\" TEXT,
    project TEXT,
    prompt TEXT,
    suggestion TEXT,
    dev INTEGER,
    version TEXT
);
CREATE TABLE IF NOT EXISTS responses (
    response_id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL,
    id_q INTEGER NOT NULL,
    id_ans INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS match_roles (
    match_role_id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL,
    role_id INTEGER NOT NULL,
    total INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS match_patterns (
    match_pattern_id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL,
    pattern_id INTEGER NOT NULL,
    total INTEGER NOT NULL,
    tweaked_total REAL NOT NULL
);
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn unavailable(err: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(unavailable)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(unavailable)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA).map_err(unavailable)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection mutex poisoned".to_string()))
    }

    fn session_exists(conn: &Connection, session: SessionId) -> Result<bool, StoreError> {
        conn.query_row(
            "SELECT 1 FROM sessions WHERE session_id = ?1",
            params![session],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .map_err(unavailable)
    }
}

impl ReferenceStore for SqliteStore {
    fn role_factors(&self, question: u8, position: u8) -> Result<Vec<RoleFactor>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id_role, factor FROM role_factors WHERE id_q = ?1 AND position = ?2")
            .map_err(unavailable)?;
        let rows = stmt
            .query_map(params![question, position], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(unavailable)?;

        let mut factors = Vec::new();
        for row in rows {
            let (role_id, factor) = row.map_err(unavailable)?;
            if let Some(role) = Role::from_id(role_id) {
                factors.push(RoleFactor { role, factor });
            }
        }
        Ok(factors)
    }

    fn pattern_weights(&self, question: u8, slot: i64) -> Result<Vec<PatternWeight>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id_p, weight FROM pattern_weights WHERE id_q = ?1 AND id_ans = ?2")
            .map_err(unavailable)?;
        let rows = stmt
            .query_map(params![question, slot], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(unavailable)?;

        let mut weights = Vec::new();
        for row in rows {
            let (pattern_id, weight) = row.map_err(unavailable)?;
            if let Some(pattern) = u8::try_from(pattern_id).ok().and_then(PatternId::new) {
                weights.push(PatternWeight { pattern, weight });
            }
        }
        Ok(weights)
    }

    fn tweak_values(&self) -> Result<BTreeMap<PatternId, f64>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, tweak_value FROM pattern WHERE tweak_value IS NOT NULL")
            .map_err(unavailable)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
            })
            .map_err(unavailable)?;

        let mut tweaks = BTreeMap::new();
        for row in rows {
            let (pattern_id, value) = row.map_err(unavailable)?;
            if let Some(pattern) = u8::try_from(pattern_id).ok().and_then(PatternId::new) {
                tweaks.insert(pattern, value);
            }
        }
        Ok(tweaks)
    }

    fn verbiage(
        &self,
        role: Role,
        pattern: Option<PatternId>,
        language: &str,
    ) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        let result = match pattern {
            Some(pattern) => conn
                .query_row(
                    "SELECT vstring FROM verbiage
                     WHERE role = ?1 AND language = ?2 AND pattern = ?3",
                    params![role.id(), language, pattern.0],
                    |row| row.get::<_, String>(0),
                )
                .optional(),
            None => conn
                .query_row(
                    "SELECT vstring FROM verbiage
                     WHERE role = ?1 AND language = ?2 AND pattern IS NULL",
                    params![role.id(), language],
                    |row| row.get::<_, String>(0),
                )
                .optional(),
        };
        result.map_err(unavailable)
    }

    fn local_string(
        &self,
        language: Option<&str>,
        item: ItemType,
        object_id: i64,
    ) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        // No language filter at all when the caller passes None; those
        // lookups target language-independent rows such as image names.
        let result = match language {
            Some(language) => conn
                .query_row(
                    "SELECT localstring FROM locals
                     WHERE itemtype = ?1 AND object_id = ?2 AND language = ?3",
                    params![item.code(), object_id, language],
                    |row| row.get::<_, String>(0),
                )
                .optional(),
            None => conn
                .query_row(
                    "SELECT localstring FROM locals
                     WHERE itemtype = ?1 AND object_id = ?2",
                    params![item.code(), object_id],
                    |row| row.get::<_, String>(0),
                )
                .optional(),
        };
        result.map_err(unavailable)
    }

    fn local_strings(
        &self,
        language: Option<&str>,
        item: ItemType,
        low: i64,
        high: i64,
    ) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut collect = |stmt: &mut rusqlite::Statement<'_>,
                           params: &[&dyn rusqlite::ToSql]|
         -> Result<Vec<String>, StoreError> {
            let rows = stmt
                .query_map(params, |row| row.get::<_, String>(0))
                .map_err(unavailable)?;
            let mut strings = Vec::new();
            for row in rows {
                strings.push(row.map_err(unavailable)?);
            }
            Ok(strings)
        };

        match language {
            Some(language) => {
                let mut stmt = conn
                    .prepare(
                        "SELECT localstring FROM locals
                         WHERE itemtype = ?1 AND object_id BETWEEN ?2 AND ?3
                           AND language = ?4
                         ORDER BY object_id",
                    )
                    .map_err(unavailable)?;
                collect(&mut stmt, &[&item.code(), &low, &high, &language])
            }
            None => {
                let mut stmt = conn
                    .prepare(
                        "SELECT localstring FROM locals
                         WHERE itemtype = ?1 AND object_id BETWEEN ?2 AND ?3
                         ORDER BY object_id",
                    )
                    .map_err(unavailable)?;
                collect(&mut stmt, &[&item.code(), &low, &high])
            }
        }
    }

    fn pattern_card_slug(&self, pattern: PatternId) -> Result<Option<String>, StoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT rpat FROM pattern WHERE id = ?1 AND rpat IS NOT NULL",
            params![pattern.0],
            |row| row.get::<_, i64>(0),
        )
        .optional()
        .map(|slug| slug.map(|value| value.to_string()))
        .map_err(unavailable)
    }
}

impl SessionStore for SqliteStore {
    fn record_session(&self, session: NewSession) -> Result<SessionId, StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sessions (uid, language, \"group\", project, prompt, dev, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.started_at,
                session.language,
                session.group,
                session.project,
                session.prompt,
                if session.developer { Some(1i64) } else { None },
                session.version,
            ],
        )
        .map_err(unavailable)?;
        Ok(conn.last_insert_rowid())
    }

    fn save_responses(
        &self,
        session: SessionId,
        answers: &AnswerSet,
    ) -> Result<usize, StoreError> {
        let mut conn = self.lock()?;
        if !Self::session_exists(&conn, session)? {
            return Err(StoreError::SessionNotFound);
        }

        let tx = conn.transaction().map_err(unavailable)?;
        tx.execute(
            "DELETE FROM responses WHERE session_id = ?1",
            params![session],
        )
        .map_err(unavailable)?;
        for (question, answer) in answers.answered() {
            tx.execute(
                "INSERT INTO responses (session_id, id_q, id_ans) VALUES (?1, ?2, ?3)",
                params![session, question, answer.position()],
            )
            .map_err(unavailable)?;
        }
        tx.commit().map_err(unavailable)?;

        Ok(answers.unanswered_count())
    }

    fn save_score(
        &self,
        session: SessionId,
        roles: &RoleTotals,
        patterns: &[PatternScoreRow],
    ) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        if !Self::session_exists(&conn, session)? {
            return Err(StoreError::SessionNotFound);
        }

        // One transaction per scoring pass; re-invocation replaces the
        // previous projection instead of appending duplicate rows.
        let tx = conn.transaction().map_err(unavailable)?;
        tx.execute(
            "DELETE FROM match_roles WHERE session_id = ?1",
            params![session],
        )
        .map_err(unavailable)?;
        tx.execute(
            "DELETE FROM match_patterns WHERE session_id = ?1",
            params![session],
        )
        .map_err(unavailable)?;

        for (role, total) in roles.iter() {
            tx.execute(
                "INSERT INTO match_roles (session_id, role_id, total) VALUES (?1, ?2, ?3)",
                params![session, role.id(), total],
            )
            .map_err(unavailable)?;
        }
        for row in patterns {
            tx.execute(
                "INSERT INTO match_patterns (session_id, pattern_id, total, tweaked_total)
                 VALUES (?1, ?2, ?3, ?4)",
                params![session, row.pattern.0, row.total, row.tweaked_total],
            )
            .map_err(unavailable)?;
        }
        tx.commit().map_err(unavailable)
    }

    fn save_suggestion(&self, session: SessionId, text: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let updated = conn
            .execute(
                "UPDATE sessions SET suggestion = ?1 WHERE session_id = ?2",
                params![text, session],
            )
            .map_err(unavailable)?;
        if updated == 0 {
            return Err(StoreError::SessionNotFound);
        }
        Ok(())
    }

    fn sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT session_id, uid, language, version, \"group\", project, prompt,
                        suggestion, dev
                 FROM sessions
                 WHERE dev IS NULL OR dev = 0
                 ORDER BY uid",
            )
            .map_err(unavailable)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SessionSummary {
                    session_id: row.get(0)?,
                    started_at: row.get(1)?,
                    language: row.get(2)?,
                    version: row.get(3)?,
                    group: row.get(4)?,
                    project: row.get(5)?,
                    prompt: row.get(6)?,
                    suggestion: row.get(7)?,
                    developer: row.get::<_, Option<i64>>(8)?.unwrap_or(0) != 0,
                    role: None,
                    patterns: Vec::new(),
                })
            })
            .map_err(unavailable)?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row.map_err(unavailable)?);
        }

        let mut role_stmt = conn
            .prepare(
                "SELECT role_id FROM match_roles
                 WHERE session_id = ?1 ORDER BY total DESC LIMIT 1",
            )
            .map_err(unavailable)?;
        let mut pattern_stmt = conn
            .prepare(
                "SELECT mp.pattern_id, COALESCE(p.title, '')
                 FROM match_patterns mp
                 LEFT JOIN pattern p ON p.id = mp.pattern_id
                 WHERE mp.session_id = ?1
                 ORDER BY mp.tweaked_total DESC
                 LIMIT ?2",
            )
            .map_err(unavailable)?;

        for summary in &mut summaries {
            let role_id = role_stmt
                .query_row(params![summary.session_id], |row| row.get::<_, i64>(0))
                .optional()
                .map_err(unavailable)?;
            summary.role = role_id
                .and_then(Role::from_id)
                .map(|role| role.label().to_string());

            let pattern_rows = pattern_stmt
                .query_map(params![summary.session_id, TOP_PATTERNS as i64], |row| {
                    Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(unavailable)?;
            for row in pattern_rows {
                let (pattern_id, title) = row.map_err(unavailable)?;
                if let Some(pattern) = u8::try_from(pattern_id).ok().and_then(PatternId::new) {
                    summary.patterns.push(PatternBrief {
                        pattern_id: pattern,
                        title,
                    });
                }
            }
        }

        Ok(summaries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quiz::domain::Answer;

    fn seeded_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().expect("in-memory store opens");
        {
            let conn = store.conn.lock().expect("connection mutex");
            conn.execute_batch(
                "INSERT INTO role_factors (id_q, position, id_role, factor) VALUES
                   (1, 3, 1, 2), (1, 3, 2, 1), (1, 3, 3, 0), (1, 3, 4, 1);
                 INSERT INTO pattern_weights (id_q, id_ans, id_p, weight) VALUES
                   (1, 3, 1, 4), (1, 3, 5, 2);
                 INSERT INTO pattern (id, title, tweak_value, rpat) VALUES
                   (1, 'Public Agenda', 0.005, 31),
                   (5, 'Shared Vision', 0.0053, 44);
                 INSERT INTO locals (language, itemtype, object_id, localstring) VALUES
                   ('en', 5, 0, 'The Activist Mirror'),
                   ('fr', 5, 0, 'Le Miroir Militant'),
                   (NULL, 14, 1, 'rebel.png'),
                   ('en', 2, 1, 'Never'), ('en', 2, 2, 'Rarely'), ('en', 2, 3, 'Sometimes'),
                   ('en', 2, 4, 'Often'), ('en', 2, 5, 'Always');
                 INSERT INTO verbiage (role, pattern, language, vstring) VALUES
                   (1, 5, 'en', 'Pattern-specific text'),
                   (1, NULL, 'en', 'Role default text');",
            )
            .expect("seed rows");
        }
        store
    }

    fn answers() -> AnswerSet {
        let mut slots = [None; 8];
        slots[0] = Answer::new(3);
        AnswerSet::new(slots)
    }

    #[test]
    fn reference_reads_match_seeded_rows() {
        let store = seeded_store();

        let factors = store.role_factors(1, 3).expect("factors");
        assert_eq!(factors.len(), 4);
        assert!(factors.contains(&RoleFactor {
            role: Role::Rebel,
            factor: 2
        }));

        let weights = store.pattern_weights(1, 3).expect("weights");
        assert_eq!(weights.len(), 2);

        let tweaks = store.tweak_values().expect("tweaks");
        assert_eq!(tweaks.get(&PatternId(5)), Some(&0.0053));

        assert_eq!(
            store.pattern_card_slug(PatternId(1)).expect("slug"),
            Some("31".to_string())
        );
        assert_eq!(store.pattern_card_slug(PatternId(9)).expect("slug"), None);
    }

    #[test]
    fn local_string_filters_by_language_only_when_given() {
        let store = seeded_store();

        let fr = store
            .local_string(Some("fr"), ItemType::Messages, 0)
            .expect("lookup");
        assert_eq!(fr.as_deref(), Some("Le Miroir Militant"));

        let missing = store
            .local_string(Some("es"), ItemType::Messages, 0)
            .expect("lookup");
        assert_eq!(missing, None);

        // Language-independent rows are reachable without a filter.
        let image = store
            .local_string(None, ItemType::RoleImages, 1)
            .expect("lookup");
        assert_eq!(image.as_deref(), Some("rebel.png"));

        let labels = store
            .local_strings(Some("en"), ItemType::AnswerLabels, 1, 5)
            .expect("range");
        assert_eq!(labels, vec!["Never", "Rarely", "Sometimes", "Often", "Always"]);
    }

    #[test]
    fn verbiage_distinguishes_null_pattern_rows() {
        let store = seeded_store();

        let specific = store
            .verbiage(Role::Rebel, Some(PatternId(5)), "en")
            .expect("lookup");
        assert_eq!(specific.as_deref(), Some("Pattern-specific text"));

        let fallback = store.verbiage(Role::Rebel, None, "en").expect("lookup");
        assert_eq!(fallback.as_deref(), Some("Role default text"));

        let absent = store
            .verbiage(Role::Citizen, Some(PatternId(5)), "en")
            .expect("lookup");
        assert_eq!(absent, None);
    }

    #[test]
    fn save_score_replaces_rows_on_rerun() {
        let store = seeded_store();
        let session = store
            .record_session(NewSession {
                started_at: 1_700_000_000,
                ..NewSession::default()
            })
            .expect("session recorded");

        let mut totals = RoleTotals::default();
        totals.add(Role::Rebel, 7);
        let rows: Vec<PatternScoreRow> = PatternId::all()
            .map(|pattern| PatternScoreRow {
                pattern,
                total: 1,
                tweaked_total: 0.004,
            })
            .collect();

        store
            .save_score(session, &totals, &rows)
            .expect("first save");
        store
            .save_score(session, &totals, &rows)
            .expect("second save");

        let conn = store.conn.lock().expect("connection mutex");
        let pattern_rows: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM match_patterns WHERE session_id = ?1",
                params![session],
                |row| row.get(0),
            )
            .expect("count");
        assert_eq!(pattern_rows, 22);
        let role_rows: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM match_roles WHERE session_id = ?1",
                params![session],
                |row| row.get(0),
            )
            .expect("count");
        assert_eq!(role_rows, 4);
    }

    #[test]
    fn session_writes_require_existing_session() {
        let store = seeded_store();
        let missing = 99;

        assert!(matches!(
            store.save_responses(missing, &answers()),
            Err(StoreError::SessionNotFound)
        ));
        assert!(matches!(
            store.save_suggestion(missing, "note"),
            Err(StoreError::SessionNotFound)
        ));
    }

    #[test]
    fn sessions_exclude_developer_rows() {
        let store = seeded_store();
        store
            .record_session(NewSession {
                started_at: 10,
                developer: true,
                ..NewSession::default()
            })
            .expect("dev session");
        let visible = store
            .record_session(NewSession {
                started_at: 20,
                language: Some("en".to_string()),
                ..NewSession::default()
            })
            .expect("session");

        let summaries = store.sessions().expect("summaries");
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].session_id, visible);
        assert_eq!(summaries[0].language.as_deref(), Some("en"));
    }
}
