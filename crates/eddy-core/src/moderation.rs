use std::sync::Arc;

use uuid::Uuid;

use eddy_db::Database;
use eddy_types::models::ReportOutcome;

use crate::access::AccessControl;
use crate::error::{CoreError, Result};

/// Applies the abuse-report policy: a message is quarantined when its
/// conversation's owner reports it, or when the number of distinct
/// reporters strictly exceeds the configured threshold.
#[derive(Clone)]
pub struct Moderation {
    db: Arc<Database>,
    access: Arc<dyn AccessControl>,
    abuse_threshold: u32,
}

impl Moderation {
    pub fn new(db: Arc<Database>, access: Arc<dyn AccessControl>, abuse_threshold: u32) -> Self {
        Self { db, access, abuse_threshold }
    }

    /// Files an abuse report for `reporter_id` against a message.
    ///
    /// Reporting is idempotent per user: resubmitting reuses the existing
    /// report and does not inflate the count. Reporting an already
    /// quarantined message is a successful no-op. The returned outcome
    /// carries the message's moderation state as of this call returning.
    pub fn report(&self, message_id: i64, reporter_id: Uuid) -> Result<ReportOutcome> {
        let message = self
            .db
            .get_message(message_id)?
            .ok_or(CoreError::NotFound("message"))?
            .into_message()?;
        if self.db.get_user_by_id(&reporter_id.to_string())?.is_none() {
            return Err(CoreError::NotFound("user"));
        }

        if !message.is_published() {
            return Ok(ReportOutcome { quarantined: true });
        }

        let conversation = self
            .db
            .get_conversation(&message.conversation_id.to_string())?
            .ok_or(CoreError::NotFound("conversation"))?
            .into_conversation()?;

        // Insert-or-reuse plus a count that is transactional with the
        // insert: concurrent reporters never decide on a stale total.
        let (report_id, reporter_count) =
            self.db.record_abuse_report(message_id, &reporter_id.to_string())?;

        let owner_report = reporter_id == conversation.owner_id;
        if !owner_report && reporter_count <= self.abuse_threshold {
            return Ok(ReportOutcome { quarantined: false });
        }

        // One-way transition; only the caller that wins the compare-and-set
        // fires the revocation side effect.
        let won = self.db.quarantine_message(message_id, report_id)?;
        if won {
            tracing::info!(
                message_id,
                report_id,
                reporter_count,
                owner_report,
                "message quarantined"
            );
            if let Err(e) = self.access.revoke_access(message_id) {
                // quarantine stands; revocation is retryable out of band
                tracing::warn!(message_id, error = %e, "attachment access revocation failed");
            }
        }

        Ok(ReportOutcome { quarantined: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAccess {
        calls: AtomicUsize,
    }

    impl CountingAccess {
        fn new() -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0) })
        }
    }

    impl AccessControl for CountingAccess {
        fn revoke_access(&self, _message_id: i64) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingAccess;

    impl AccessControl for FailingAccess {
        fn revoke_access(&self, _message_id: i64) -> anyhow::Result<()> {
            anyhow::bail!("permission service unreachable")
        }
    }

    struct Fixture {
        db: Arc<Database>,
        owner_id: Uuid,
        message_id: i64,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let owner_id = Uuid::new_v4();
        let convo_id = Uuid::new_v4();
        db.create_user(&owner_id.to_string(), "owner", "hash").unwrap();
        db.create_conversation(&convo_id.to_string(), &owner_id.to_string(), "general", None, None)
            .unwrap();
        let message_id = db
            .insert_message(&convo_id.to_string(), &owner_id.to_string(), "spam", None)
            .unwrap()
            .id;
        Fixture { db, owner_id, message_id }
    }

    fn seed_reporter(db: &Database, login: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(&id.to_string(), login, "hash").unwrap();
        id
    }

    fn report_count(db: &Database, message_id: i64) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM abuse_reports WHERE message_id = ?1",
                [message_id],
                |row| row.get(0),
            )?)
        })
        .unwrap()
    }

    #[test]
    fn threshold_is_strictly_greater_than() {
        let f = fixture();
        let access = CountingAccess::new();
        let moderation = Moderation::new(f.db.clone(), access.clone(), 2);

        for i in 0..2 {
            let reporter = seed_reporter(&f.db, &format!("r{i}"));
            let outcome = moderation.report(f.message_id, reporter).unwrap();
            assert!(!outcome.quarantined, "count == threshold must stay published");
        }

        let third = seed_reporter(&f.db, "r2");
        let outcome = moderation.report(f.message_id, third).unwrap();
        assert!(outcome.quarantined);
        assert_eq!(access.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn owner_report_quarantines_regardless_of_count() {
        let f = fixture();
        let access = CountingAccess::new();
        let moderation = Moderation::new(f.db.clone(), access.clone(), 5);

        let outcome = moderation.report(f.message_id, f.owner_id).unwrap();

        assert!(outcome.quarantined);
        assert_eq!(report_count(&f.db, f.message_id), 1);
        assert_eq!(access.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn repeat_reports_do_not_inflate_the_count() {
        let f = fixture();
        let moderation = Moderation::new(f.db.clone(), CountingAccess::new(), 1);
        let reporter = seed_reporter(&f.db, "bob");

        let first = moderation.report(f.message_id, reporter).unwrap();
        let second = moderation.report(f.message_id, reporter).unwrap();

        assert!(!first.quarantined);
        assert!(!second.quarantined);
        assert_eq!(report_count(&f.db, f.message_id), 1);
    }

    #[test]
    fn reporting_a_quarantined_message_is_a_noop() {
        let f = fixture();
        let access = CountingAccess::new();
        let moderation = Moderation::new(f.db.clone(), access.clone(), 5);

        moderation.report(f.message_id, f.owner_id).unwrap();
        let count_after_takedown = report_count(&f.db, f.message_id);

        let late = seed_reporter(&f.db, "late");
        let outcome = moderation.report(f.message_id, late).unwrap();

        assert!(outcome.quarantined);
        assert_eq!(report_count(&f.db, f.message_id), count_after_takedown);
        assert_eq!(access.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_triggering_reports_revoke_exactly_once() {
        let f = fixture();
        let access = CountingAccess::new();
        // threshold 0: every report is a triggering report
        let moderation = Moderation::new(f.db.clone(), access.clone(), 0);

        let reporters: Vec<Uuid> =
            (0..6).map(|i| seed_reporter(&f.db, &format!("r{i}"))).collect();

        std::thread::scope(|scope| {
            for reporter in reporters {
                let moderation = moderation.clone();
                scope.spawn(move || {
                    let outcome = moderation.report(f.message_id, reporter).unwrap();
                    assert!(outcome.quarantined);
                });
            }
        });

        assert_eq!(access.calls.load(Ordering::SeqCst), 1);
        let stored = f.db.get_message(f.message_id).unwrap().unwrap();
        assert!(stored.quarantine_report_id.is_some());
    }

    #[test]
    fn revocation_failure_does_not_roll_back_the_quarantine() {
        let f = fixture();
        let moderation = Moderation::new(f.db.clone(), Arc::new(FailingAccess), 5);

        let outcome = moderation.report(f.message_id, f.owner_id).unwrap();

        assert!(outcome.quarantined);
        let stored = f.db.get_message(f.message_id).unwrap().unwrap();
        assert!(stored.quarantine_report_id.is_some());
    }

    #[test]
    fn missing_message_or_reporter_is_not_found() {
        let f = fixture();
        let moderation = Moderation::new(f.db.clone(), CountingAccess::new(), 5);

        let err = moderation.report(9999, f.owner_id).unwrap_err();
        assert!(matches!(err, CoreError::NotFound("message")));

        let err = moderation.report(f.message_id, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, CoreError::NotFound("user")));
    }
}
