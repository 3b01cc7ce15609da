use chrono::{DateTime, Utc};
use rusqlite::params;
use tracing::instrument;

use smsfeed_core::{Message, MessageId};

use crate::database::Database;
use crate::error::StoreError;

const TABLE: &str = "sms_messages";

/// Synchronous repository over the `sms_messages` table.
#[derive(Clone)]
pub struct MessageRepo {
    db: Database,
}

impl MessageRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist a message stamped with the current time.
    ///
    /// The timestamp never goes below the newest stored `received_at`, so
    /// insert order and timestamp order agree even if the wall clock steps back.
    #[instrument(skip(self, text))]
    pub fn insert(&self, sender: &str, text: &str) -> Result<Message, StoreError> {
        self.db.with_conn(|conn| {
            let latest: i64 = conn.query_row(
                "SELECT COALESCE(MAX(received_at), 0) FROM sms_messages",
                [],
                |row| row.get(0),
            )?;
            let micros = Utc::now().timestamp_micros().max(latest);

            conn.execute(
                "INSERT INTO sms_messages (sender, text, received_at) VALUES (?1, ?2, ?3)",
                params![sender, text, micros],
            )?;

            Ok(Message {
                id: MessageId::from_raw(conn.last_insert_rowid()),
                sender: sender.to_string(),
                text: text.to_string(),
                received_at: from_micros(micros)?,
            })
        })
    }

    /// Newest-first, at most `limit` rows. Equal timestamps sort by later insert first.
    #[instrument(skip(self))]
    pub fn recent(&self, limit: usize) -> Result<Vec<Message>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender, text, received_at FROM sms_messages
                 ORDER BY received_at DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(id, sender, text, micros)| {
                    Ok(Message {
                        id: MessageId::from_raw(id),
                        sender,
                        text,
                        received_at: from_micros(micros)?,
                    })
                })
                .collect()
        })
    }

    /// Delete every message with `received_at < cutoff`. Returns the number removed.
    #[instrument(skip(self))]
    pub fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM sms_messages WHERE received_at < ?1",
                [cutoff.timestamp_micros()],
            )?;
            Ok(deleted)
        })
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM sms_messages", [], |row| row.get(0))?;
            Ok(usize::try_from(n).unwrap_or_default())
        })
    }

    #[cfg(test)]
    fn insert_at(&self, sender: &str, text: &str, at: DateTime<Utc>) -> MessageId {
        self.db
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO sms_messages (sender, text, received_at) VALUES (?1, ?2, ?3)",
                    params![sender, text, at.timestamp_micros()],
                )?;
                Ok(MessageId::from_raw(conn.last_insert_rowid()))
            })
            .unwrap()
    }
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| StoreError::CorruptRow {
        table: TABLE,
        column: "received_at",
        detail: format!("timestamp out of range: {micros}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn repo() -> MessageRepo {
        MessageRepo::new(Database::in_memory().unwrap())
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_770_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn insert_assigns_id_and_timestamp() {
        let repo = repo();
        let before = Utc::now();
        let msg = repo.insert("+15550100", "hello").unwrap();
        assert!(msg.id.get() > 0);
        assert_eq!(msg.sender, "+15550100");
        assert_eq!(msg.text, "hello");
        assert!(msg.received_at >= before - Duration::milliseconds(1));
    }

    #[test]
    fn insert_then_recent_one_returns_that_record() {
        let repo = repo();
        repo.insert("a", "first").unwrap();
        let second = repo.insert("b", "second").unwrap();
        let recent = repo.recent(1).unwrap();
        assert_eq!(recent, vec![second]);
    }

    #[test]
    fn recent_is_newest_first_and_bounded() {
        let repo = repo();
        for i in 0..5 {
            repo.insert_at("s", &format!("m{i}"), at(i));
        }
        let recent = repo.recent(3).unwrap();
        let texts: Vec<_> = recent.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, ["m4", "m3", "m2"]);
    }

    #[test]
    fn recent_breaks_timestamp_ties_by_later_insert() {
        let repo = repo();
        let first = repo.insert_at("s", "first", at(0));
        let second = repo.insert_at("s", "second", at(0));
        let recent = repo.recent(10).unwrap();
        assert_eq!(recent[0].id, second);
        assert_eq!(recent[1].id, first);
    }

    #[test]
    fn recent_on_empty_table() {
        assert!(repo().recent(100).unwrap().is_empty());
    }

    #[test]
    fn insert_timestamps_never_decrease() {
        let repo = repo();
        // A row stamped in the future forces later inserts to clamp to it.
        let future = Utc::now() + Duration::hours(1);
        repo.insert_at("s", "future", future);
        let msg = repo.insert("s", "now").unwrap();
        assert_eq!(msg.received_at.timestamp_micros(), future.timestamp_micros());

        let stamps: Vec<_> = (0..20)
            .map(|i| repo.insert("s", &i.to_string()).unwrap().received_at)
            .collect();
        assert!(stamps.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn delete_older_than_removes_all_and_only_older() {
        let repo = repo();
        repo.insert_at("s", "old1", at(0));
        repo.insert_at("s", "old2", at(9));
        let boundary = repo.insert_at("s", "boundary", at(10));
        let newer = repo.insert_at("s", "newer", at(11));

        let deleted = repo.delete_older_than(at(10)).unwrap();
        assert_eq!(deleted, 2);

        let ids: Vec<_> = repo.recent(10).unwrap().into_iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![newer, boundary]);
    }

    #[test]
    fn delete_older_than_is_idempotent() {
        let repo = repo();
        repo.insert_at("s", "old", at(0));
        repo.insert_at("s", "new", at(100));
        assert_eq!(repo.delete_older_than(at(50)).unwrap(), 1);
        assert_eq!(repo.delete_older_than(at(50)).unwrap(), 0);
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn count_tracks_inserts_and_deletes() {
        let repo = repo();
        assert_eq!(repo.count().unwrap(), 0);
        repo.insert("a", "1").unwrap();
        repo.insert("b", "2").unwrap();
        assert_eq!(repo.count().unwrap(), 2);
        repo.delete_older_than(Utc::now() + Duration::seconds(1)).unwrap();
        assert_eq!(repo.count().unwrap(), 0);
    }

    #[test]
    fn concurrent_inserts_and_sweeps_do_not_tear() {
        let repo = repo();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let repo = repo.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        repo.insert("s", &format!("{t}-{i}")).unwrap();
                        if i % 10 == 0 {
                            repo.delete_older_than(Utc.timestamp_opt(0, 0).unwrap()).unwrap();
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(repo.count().unwrap(), 200);
    }
}
