//! In-process implementation of the store traits.
//!
//! All state sits behind one mutex, and every trait method runs under a
//! single lock acquisition without awaiting, so each call is as indivisible
//! as the Postgres transaction it stands in for.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use fieldops_core::types::DbId;

use crate::models::assignment::{Assignment, ROLE_PRIMARY};
use crate::models::job::{ClaimOutcome, CreateJob, Job, TransitionOutcome};
use crate::models::notification_intent::{
    CreateNotificationIntent, NotificationIntent, NotificationStats,
};
use crate::models::status::{JobStatus, NotificationStatus};
use crate::models::technician::{CreateTechnician, Technician};
use crate::store::{DispatchStore, NotificationStore};

#[derive(Default)]
struct State {
    technicians: Vec<Technician>,
    jobs: Vec<Job>,
    assignments: Vec<Assignment>,
    intents: Vec<NotificationIntent>,
    next_id: DbId,
}

impl State {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }

    fn job_mut(&mut self, id: DbId) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|j| j.id == id)
    }

    fn intent_mut(&mut self, id: DbId) -> Option<&mut NotificationIntent> {
        self.intents.iter_mut().find(|i| i.id == id)
    }

    fn latest_assignment_index(&self, job_id: DbId) -> Option<usize> {
        self.assignments
            .iter()
            .enumerate()
            .filter(|(_, a)| a.job_id == job_id)
            .max_by_key(|(_, a)| (a.assigned_at, a.id))
            .map(|(idx, _)| idx)
    }

    /// Shared precondition check for start/complete; mirrors
    /// `JobRepo::check_transition`.
    fn check_transition(
        &self,
        job_id: DbId,
        technician_id: DbId,
        required: JobStatus,
    ) -> Result<usize, TransitionOutcome> {
        let job = self
            .jobs
            .iter()
            .find(|j| j.id == job_id)
            .ok_or(TransitionOutcome::JobNotFound)?;

        let idx = match self.latest_assignment_index(job_id) {
            Some(idx) if self.assignments[idx].technician_id == technician_id => idx,
            _ => return Err(TransitionOutcome::NotAssignee),
        };

        if job.status() != Some(required) {
            return Err(TransitionOutcome::InvalidTransition {
                current: job.status_id,
            });
        }
        Ok(idx)
    }
}

/// Store holding everything in memory. Cheap to construct per test.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a technician.
    pub fn insert_technician(&self, input: &CreateTechnician) -> Technician {
        let mut state = self.state();
        let now = Utc::now();
        let technician = Technician {
            id: state.next_id(),
            handle: input.handle.clone(),
            name: input.name.clone(),
            is_active: input.is_active.unwrap_or(true),
            is_admin: input.is_admin.unwrap_or(false),
            created_at: now,
            updated_at: now,
        };
        state.technicians.push(technician.clone());
        technician
    }

    /// Insert a new `OPEN` job.
    pub fn insert_job(&self, input: &CreateJob) -> Job {
        let mut state = self.state();
        let now = Utc::now();
        let job = Job {
            id: state.next_id(),
            job_number: input.job_number.clone(),
            title: input.title.clone(),
            status_id: JobStatus::Open.id(),
            priority: input.priority.unwrap_or(0),
            customer_id: input.customer_id,
            customer_handle: input.customer_handle.clone(),
            completion_notes: None,
            assigned_at: None,
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        state.jobs.push(job.clone());
        job
    }

    /// Force a job's status, bypassing the dispatch rules. Intake and
    /// out-of-band edits (cancellation, recovery) use this.
    pub fn set_job_status(&self, job_id: DbId, status: JobStatus) -> bool {
        let mut state = self.state();
        match state.job_mut(job_id) {
            Some(job) => {
                job.status_id = status.id();
                job.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl DispatchStore for MemoryStore {
    async fn find_technician(&self, id: DbId) -> Result<Option<Technician>, sqlx::Error> {
        Ok(self.state().technicians.iter().find(|t| t.id == id).cloned())
    }

    async fn find_technician_by_handle(
        &self,
        handle: &str,
    ) -> Result<Option<Technician>, sqlx::Error> {
        Ok(self
            .state()
            .technicians
            .iter()
            .find(|t| t.handle == handle)
            .cloned())
    }

    async fn find_job(&self, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        Ok(self.state().jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn find_job_by_number(&self, job_number: &str) -> Result<Option<Job>, sqlx::Error> {
        Ok(self
            .state()
            .jobs
            .iter()
            .find(|j| j.job_number == job_number)
            .cloned())
    }

    async fn list_open_jobs(&self, limit: i64) -> Result<Vec<Job>, sqlx::Error> {
        let mut open: Vec<Job> = self
            .state()
            .jobs
            .iter()
            .filter(|j| j.status() == Some(JobStatus::Open))
            .cloned()
            .collect();
        open.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        open.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(open)
    }

    async fn assignments_for_job(&self, job_id: DbId) -> Result<Vec<Assignment>, sqlx::Error> {
        Ok(self
            .state()
            .assignments
            .iter()
            .filter(|a| a.job_id == job_id)
            .cloned()
            .collect())
    }

    async fn claim_job(
        &self,
        job_id: DbId,
        technician_id: DbId,
    ) -> Result<ClaimOutcome, sqlx::Error> {
        let mut state = self.state();

        let Some(job) = state.jobs.iter().find(|j| j.id == job_id) else {
            return Ok(ClaimOutcome::JobNotFound);
        };
        let status = job.status();
        let current = job.status_id;

        let live = state
            .assignments
            .iter()
            .filter(|a| a.job_id == job_id && a.is_live())
            .count();
        if live > 0 {
            return Ok(ClaimOutcome::AlreadyClaimed);
        }
        if !matches!(status, Some(JobStatus::Open | JobStatus::Assigned)) {
            return Ok(ClaimOutcome::NotClaimable { current });
        }

        let now = Utc::now();
        let assignment = Assignment {
            id: state.next_id(),
            job_id,
            technician_id,
            role: ROLE_PRIMARY.to_string(),
            assigned_at: now,
            accepted_at: None,
            completed_at: None,
        };
        state.assignments.push(assignment.clone());

        let Some(job) = state.job_mut(job_id) else {
            return Ok(ClaimOutcome::JobNotFound);
        };
        job.status_id = JobStatus::Assigned.id();
        job.assigned_at = Some(now);
        job.updated_at = now;

        Ok(ClaimOutcome::Claimed {
            job: job.clone(),
            assignment,
        })
    }

    async fn start_job(
        &self,
        job_id: DbId,
        technician_id: DbId,
    ) -> Result<TransitionOutcome, sqlx::Error> {
        let mut state = self.state();
        let idx = match state.check_transition(job_id, technician_id, JobStatus::Assigned) {
            Ok(idx) => idx,
            Err(outcome) => return Ok(outcome),
        };

        let now = Utc::now();
        state.assignments[idx].accepted_at = Some(now);
        let assignment = state.assignments[idx].clone();

        let Some(job) = state.job_mut(job_id) else {
            return Ok(TransitionOutcome::JobNotFound);
        };
        job.status_id = JobStatus::InProgress.id();
        job.started_at = Some(now);
        job.updated_at = now;

        Ok(TransitionOutcome::Applied {
            job: job.clone(),
            assignment,
        })
    }

    async fn complete_job(
        &self,
        job_id: DbId,
        technician_id: DbId,
        notes: Option<&str>,
    ) -> Result<TransitionOutcome, sqlx::Error> {
        let mut state = self.state();
        let idx = match state.check_transition(job_id, technician_id, JobStatus::InProgress) {
            Ok(idx) => idx,
            Err(outcome) => return Ok(outcome),
        };

        let now = Utc::now();
        state.assignments[idx].completed_at = Some(now);
        let assignment = state.assignments[idx].clone();

        let Some(job) = state.job_mut(job_id) else {
            return Ok(TransitionOutcome::JobNotFound);
        };
        job.status_id = JobStatus::Completed.id();
        job.completion_notes = notes.map(str::to_string);
        job.completed_at = Some(now);
        job.updated_at = now;

        Ok(TransitionOutcome::Applied {
            job: job.clone(),
            assignment,
        })
    }

    async fn health_check(&self) -> Result<(), sqlx::Error> {
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert_intent(
        &self,
        input: &CreateNotificationIntent,
    ) -> Result<NotificationIntent, sqlx::Error> {
        let mut state = self.state();
        let now = Utc::now();
        let intent = NotificationIntent {
            id: state.next_id(),
            recipient: input.recipient.clone(),
            payload: input.payload.clone(),
            channel: input.channel.clone(),
            status_id: NotificationStatus::Pending.id(),
            retry_count: 0,
            last_error: None,
            job_id: input.job_id,
            created_at: now,
            sent_at: None,
            updated_at: now,
        };
        state.intents.push(intent.clone());
        Ok(intent)
    }

    async fn find_intent(&self, id: DbId) -> Result<Option<NotificationIntent>, sqlx::Error> {
        Ok(self.state().intents.iter().find(|i| i.id == id).cloned())
    }

    async fn pending_batch(
        &self,
        limit: i64,
        max_retries: i32,
    ) -> Result<Vec<NotificationIntent>, sqlx::Error> {
        let mut pending: Vec<NotificationIntent> = self
            .state()
            .intents
            .iter()
            .filter(|i| {
                i.status() == Some(NotificationStatus::Pending) && i.retry_count < max_retries
            })
            .cloned()
            .collect();
        pending.sort_by_key(|i| (i.created_at, i.id));
        pending.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(pending)
    }

    async fn list_intents(
        &self,
        status: Option<NotificationStatus>,
        limit: i64,
    ) -> Result<Vec<NotificationIntent>, sqlx::Error> {
        let mut intents: Vec<NotificationIntent> = self
            .state()
            .intents
            .iter()
            .filter(|i| status.is_none_or(|s| i.status() == Some(s)))
            .cloned()
            .collect();
        intents.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        intents.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(intents)
    }

    async fn mark_sent(&self, id: DbId) -> Result<bool, sqlx::Error> {
        let mut state = self.state();
        match state.intent_mut(id) {
            Some(intent) if intent.status() == Some(NotificationStatus::Pending) => {
                let now = Utc::now();
                intent.status_id = NotificationStatus::Sent.id();
                intent.sent_at = Some(now);
                intent.last_error = None;
                intent.updated_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_failure(
        &self,
        id: DbId,
        error: &str,
        max_retries: i32,
    ) -> Result<Option<NotificationIntent>, sqlx::Error> {
        let mut state = self.state();
        match state.intent_mut(id) {
            Some(intent) if intent.status() == Some(NotificationStatus::Pending) => {
                intent.retry_count += 1;
                intent.last_error = Some(error.to_string());
                if intent.retry_count >= max_retries {
                    intent.status_id = NotificationStatus::Failed.id();
                }
                intent.updated_at = Utc::now();
                Ok(Some(intent.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn requeue(&self, id: DbId) -> Result<bool, sqlx::Error> {
        let mut state = self.state();
        match state.intent_mut(id) {
            Some(intent) if intent.status() == Some(NotificationStatus::Failed) => {
                intent.status_id = NotificationStatus::Pending.id();
                intent.retry_count = 0;
                intent.last_error = None;
                intent.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn stats(&self) -> Result<NotificationStats, sqlx::Error> {
        let mut stats = NotificationStats::default();
        for intent in &self.state().intents {
            stats.add(intent.status_id, 1);
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;

    use super::*;

    fn technician(store: &MemoryStore, handle: &str) -> Technician {
        store.insert_technician(&CreateTechnician {
            handle: handle.to_string(),
            name: format!("Tech {handle}"),
            is_active: None,
            is_admin: None,
        })
    }

    fn job(store: &MemoryStore, number: &str) -> Job {
        store.insert_job(&CreateJob {
            job_number: number.to_string(),
            title: "Replace compressor".to_string(),
            priority: None,
            customer_id: Some(77),
            customer_handle: Some("+15550000077".to_string()),
        })
    }

    fn intent(recipient: &str) -> CreateNotificationIntent {
        CreateNotificationIntent {
            recipient: recipient.to_string(),
            payload: "hello".to_string(),
            channel: "whatsapp".to_string(),
            job_id: None,
        }
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn concurrent_claims_admit_exactly_one() {
        let store = Arc::new(MemoryStore::new());
        let job = job(&store, "JOB-0001");
        let techs: Vec<Technician> = (0..8)
            .map(|i| technician(&store, &format!("+1555000{i:04}")))
            .collect();

        let handles: Vec<_> = techs
            .iter()
            .map(|t| {
                let store = Arc::clone(&store);
                let (job_id, tech_id) = (job.id, t.id);
                tokio::spawn(async move { store.claim_job(job_id, tech_id).await })
            })
            .collect();

        let mut claimed = 0;
        let mut already = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                ClaimOutcome::Claimed { .. } => claimed += 1,
                ClaimOutcome::AlreadyClaimed => already += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(claimed, 1);
        assert_eq!(already, 7);
        assert_eq!(store.assignments_for_job(job.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn full_lifecycle_releases_live_assignment() {
        let store = MemoryStore::new();
        let tech = technician(&store, "+15550000001");
        let job = job(&store, "JOB-0002");

        assert_matches!(
            store.claim_job(job.id, tech.id).await.unwrap(),
            ClaimOutcome::Claimed { job, .. } if job.status() == Some(JobStatus::Assigned)
        );
        assert_matches!(
            store.start_job(job.id, tech.id).await.unwrap(),
            TransitionOutcome::Applied { job, assignment }
                if job.status() == Some(JobStatus::InProgress) && assignment.accepted_at.is_some()
        );
        assert_matches!(
            store.complete_job(job.id, tech.id, Some("done")).await.unwrap(),
            TransitionOutcome::Applied { job, assignment }
                if job.completion_notes.as_deref() == Some("done") && !assignment.is_live()
        );

        // Completed jobs are not claimable even with no live assignment.
        let other = technician(&store, "+15550000002");
        assert_matches!(
            store.claim_job(job.id, other.id).await.unwrap(),
            ClaimOutcome::NotClaimable { current } if current == JobStatus::Completed.id()
        );
    }

    #[tokio::test]
    async fn second_complete_is_invalid_transition() {
        let store = MemoryStore::new();
        let tech = technician(&store, "+15550000001");
        let job = job(&store, "JOB-0003");
        store.claim_job(job.id, tech.id).await.unwrap();
        store.start_job(job.id, tech.id).await.unwrap();
        store.complete_job(job.id, tech.id, None).await.unwrap();

        assert_matches!(
            store.complete_job(job.id, tech.id, None).await.unwrap(),
            TransitionOutcome::InvalidTransition { current } if current == JobStatus::Completed.id()
        );
    }

    #[tokio::test]
    async fn non_assignee_cannot_start() {
        let store = MemoryStore::new();
        let owner = technician(&store, "+15550000001");
        let other = technician(&store, "+15550000002");
        let job = job(&store, "JOB-0004");
        store.claim_job(job.id, owner.id).await.unwrap();

        assert_matches!(
            store.start_job(job.id, other.id).await.unwrap(),
            TransitionOutcome::NotAssignee
        );
        assert_matches!(
            store.start_job(9_999, owner.id).await.unwrap(),
            TransitionOutcome::JobNotFound
        );
    }

    #[tokio::test]
    async fn assigned_job_without_assignment_is_reclaimable() {
        let store = MemoryStore::new();
        let tech = technician(&store, "+15550000001");
        let job = job(&store, "JOB-0005");
        assert!(store.set_job_status(job.id, JobStatus::Assigned));

        assert_matches!(
            store.claim_job(job.id, tech.id).await.unwrap(),
            ClaimOutcome::Claimed { .. }
        );
    }

    #[tokio::test]
    async fn cancelled_job_is_not_claimable() {
        let store = MemoryStore::new();
        let tech = technician(&store, "+15550000001");
        let job = job(&store, "JOB-0006");
        store.set_job_status(job.id, JobStatus::Cancelled);

        assert_matches!(
            store.claim_job(job.id, tech.id).await.unwrap(),
            ClaimOutcome::NotClaimable { .. }
        );
        assert_matches!(
            store.claim_job(12_345, tech.id).await.unwrap(),
            ClaimOutcome::JobNotFound
        );
    }

    #[tokio::test]
    async fn open_jobs_ordered_by_priority() {
        let store = MemoryStore::new();
        let low = job(&store, "JOB-0010");
        let high = store.insert_job(&CreateJob {
            job_number: "JOB-0011".to_string(),
            title: "Urgent leak".to_string(),
            priority: Some(5),
            customer_id: None,
            customer_handle: None,
        });
        let taken = job(&store, "JOB-0012");
        let tech = technician(&store, "+15550000001");
        store.claim_job(taken.id, tech.id).await.unwrap();

        let open = store.list_open_jobs(10).await.unwrap();
        let ids: Vec<DbId> = open.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![high.id, low.id]);
    }

    // -----------------------------------------------------------------------
    // Notifications
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn failure_marks_failed_at_retry_limit() {
        let store = MemoryStore::new();
        let created = store.insert_intent(&intent("+15550000001")).await.unwrap();

        for attempt in 1..=3 {
            let updated = store
                .record_failure(created.id, "bridge down", 3)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(updated.retry_count, attempt);
            let expected = if attempt < 3 {
                NotificationStatus::Pending
            } else {
                NotificationStatus::Failed
            };
            assert_eq!(updated.status(), Some(expected));
        }

        // Terminal: no further failures are recorded.
        assert!(store
            .record_failure(created.id, "again", 3)
            .await
            .unwrap()
            .is_none());
        assert!(store.pending_batch(10, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sent_is_terminal_and_requeue_only_from_failed() {
        let store = MemoryStore::new();
        let sent = store.insert_intent(&intent("+15550000001")).await.unwrap();
        assert!(store.mark_sent(sent.id).await.unwrap());
        assert!(!store.mark_sent(sent.id).await.unwrap());
        assert!(!store.requeue(sent.id).await.unwrap());

        let failed = store.insert_intent(&intent("+15550000002")).await.unwrap();
        store.record_failure(failed.id, "x", 1).await.unwrap();
        assert!(store.requeue(failed.id).await.unwrap());

        let requeued = store.find_intent(failed.id).await.unwrap().unwrap();
        assert_eq!(requeued.status(), Some(NotificationStatus::Pending));
        assert_eq!(requeued.retry_count, 0);
        assert!(requeued.last_error.is_none());
    }

    #[tokio::test]
    async fn pending_batch_respects_limit_and_order() {
        let store = MemoryStore::new();
        let first = store.insert_intent(&intent("a")).await.unwrap();
        let second = store.insert_intent(&intent("b")).await.unwrap();
        store.insert_intent(&intent("c")).await.unwrap();

        let batch = store.pending_batch(2, 3).await.unwrap();
        let ids: Vec<DbId> = batch.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![first.id, second.id]);

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.pending, 3);
        assert_eq!(stats.total(), 3);
    }
}
