//! Event participation lifecycle: enrollment, proof-of-attendance upload,
//! and review. A rejected participation re-enters the review queue when a new
//! proof is uploaded; an approved one is settled for good.

use chrono::Utc;
use diesel::{prelude::*, result::DatabaseErrorKind};
use diesel_async::{scoped_futures::ScopedFutureExt, AsyncConnection, AsyncPgConnection, RunQueryDsl};

use crate::{
    auth::AuthContext,
    error::WorkflowError,
    membership::ReviewDecision,
    models::{Event, EventParticipation, EventStatus, ReviewStatus},
    schema::{event_participations, events},
    storage::{FileStore, PROOF_EXTENSIONS, PROOF_MAX_SIZE},
};

#[derive(Insertable)]
#[diesel(table_name = event_participations)]
struct NewParticipation {
    user_id: i32,
    event_id: i32,
    status: String,
    created_at: chrono::NaiveDateTime,
    updated_at: chrono::NaiveDateTime,
}

// ---- pure guards ----

/// Enrollment preconditions, checked in a fixed order so callers always get
/// the most specific failure.
fn check_enrollment(
    event: &Event,
    already_enrolled: bool,
    active_count: i64,
) -> Result<(), WorkflowError> {
    if !event.enrollment_open {
        return Err(WorkflowError::EnrollmentClosed);
    }
    if event.status() == Some(EventStatus::Past) {
        return Err(WorkflowError::EventInPast);
    }
    if already_enrolled {
        return Err(WorkflowError::AlreadyEnrolled);
    }
    if let Some(cap) = event.max_participants {
        if active_count >= cap as i64 {
            return Err(WorkflowError::CapacityReached);
        }
    }
    Ok(())
}

/// Proofs are owner-only. Anyone else gets the same error as for a missing
/// record, so participation ids leak nothing.
fn check_proof_owner(
    participation: &EventParticipation,
    caller_user_id: i32,
) -> Result<(), WorkflowError> {
    if participation.user_id != caller_user_id {
        return Err(WorkflowError::NotFoundOrForbidden);
    }
    Ok(())
}

/// A new proof re-opens a pending or rejected participation; an approved one
/// is terminal.
fn proof_transition(current: ReviewStatus) -> Result<ReviewStatus, WorkflowError> {
    match current {
        ReviewStatus::Pending | ReviewStatus::Rejected => Ok(ReviewStatus::Pending),
        ReviewStatus::Approved => Err(WorkflowError::NotPending),
    }
}

fn check_review(
    current: ReviewStatus,
    decision: ReviewDecision,
    remarks: Option<&str>,
) -> Result<ReviewStatus, WorkflowError> {
    if current != ReviewStatus::Pending {
        return Err(WorkflowError::NotPending);
    }
    match decision {
        ReviewDecision::Approve => Ok(ReviewStatus::Approved),
        ReviewDecision::Reject => {
            // the student needs actionable feedback
            if remarks.map_or(true, |r| r.trim().is_empty()) {
                return Err(WorkflowError::MissingReason);
            }
            Ok(ReviewStatus::Rejected)
        }
    }
}

// ---- operations ----

pub async fn enroll(
    conn: &mut AsyncPgConnection,
    auth: &AuthContext,
    event_id: i32,
) -> Result<EventParticipation, WorkflowError> {
    let auth = *auth;
    conn.transaction::<EventParticipation, WorkflowError, _>(|conn| {
        async move {
            // Lock the event row so concurrent enrollments cannot both pass
            // the capacity check.
            let event = events::table
                .find(event_id)
                .for_update()
                .first::<Event>(conn)
                .await
                .optional()?
                .ok_or(WorkflowError::NotFoundOrForbidden)?;

            let already: i64 = event_participations::table
                .filter(event_participations::event_id.eq(event_id))
                .filter(event_participations::user_id.eq(auth.user_id))
                .count()
                .get_result(conn)
                .await?;

            // rejected participations do not occupy a seat
            let active: i64 = event_participations::table
                .filter(event_participations::event_id.eq(event_id))
                .filter(event_participations::status.eq_any(vec![
                    ReviewStatus::Pending.as_str(),
                    ReviewStatus::Approved.as_str(),
                ]))
                .count()
                .get_result(conn)
                .await?;

            check_enrollment(&event, already > 0, active)?;

            let now = Utc::now().naive_utc();
            diesel::insert_into(event_participations::table)
                .values(NewParticipation {
                    user_id: auth.user_id,
                    event_id,
                    status: ReviewStatus::Pending.as_str().to_string(),
                    created_at: now,
                    updated_at: now,
                })
                .get_result::<EventParticipation>(conn)
                .await
                .map_err(|e| match e {
                    diesel::result::Error::DatabaseError(
                        DatabaseErrorKind::UniqueViolation,
                        _,
                    ) => WorkflowError::AlreadyEnrolled,
                    e => WorkflowError::Storage(e),
                })
        }
        .scope_boxed()
    })
    .await
}

/// Stores the proof artifact, then re-opens the participation for review.
/// Owner-only; anyone else sees the same error as for a missing record.
pub async fn submit_proof(
    conn: &mut AsyncPgConnection,
    auth: &AuthContext,
    store: &FileStore,
    participation_id: i32,
    bytes: &[u8],
    original_name: &str,
) -> Result<EventParticipation, WorkflowError> {
    let participation = event_participations::table
        .find(participation_id)
        .first::<EventParticipation>(conn)
        .await
        .optional()?
        .ok_or(WorkflowError::NotFoundOrForbidden)?;

    check_proof_owner(&participation, auth.user_id)?;

    let next = proof_transition(participation.status().ok_or(WorkflowError::InvalidState)?)?;

    let stored = store
        .store(bytes, original_name, PROOF_EXTENSIONS, PROOF_MAX_SIZE)
        .await?;

    Ok(
        diesel::update(event_participations::table.find(participation.id))
            .set((
                event_participations::proof_ref.eq(Some(stored.0)),
                event_participations::status.eq(next.as_str()),
                event_participations::updated_at.eq(Utc::now().naive_utc()),
            ))
            .get_result::<EventParticipation>(conn)
            .await?,
    )
}

pub async fn review_participation(
    conn: &mut AsyncPgConnection,
    auth: &AuthContext,
    participation_id: i32,
    decision: ReviewDecision,
    remarks: Option<String>,
) -> Result<(), WorkflowError> {
    let auth = *auth;
    conn.transaction::<(), WorkflowError, _>(|conn| {
        async move {
            let participation = event_participations::table
                .find(participation_id)
                .first::<EventParticipation>(conn)
                .await
                .optional()?
                .ok_or(WorkflowError::NotFoundOrForbidden)?;

            let event = events::table
                .find(participation.event_id)
                .first::<Event>(conn)
                .await?;

            if !auth.can_review(event.club_id) {
                return Err(WorkflowError::NotFoundOrForbidden);
            }

            let next = check_review(
                participation.status().ok_or(WorkflowError::InvalidState)?,
                decision,
                remarks.as_deref(),
            )?;

            diesel::update(event_participations::table.find(participation.id))
                .set((
                    event_participations::status.eq(next.as_str()),
                    event_participations::reviewed_by.eq(auth.user_id),
                    event_participations::remarks.eq(remarks),
                    event_participations::updated_at.eq(Utc::now().naive_utc()),
                ))
                .execute(conn)
                .await?;

            tracing::info!(
                participation_id,
                reviewer = auth.user_id,
                decision = ?decision,
                "participation reviewed"
            );
            Ok(())
        }
        .scope_boxed()
    })
    .await
}

/// Review queue for an event.
pub async fn pending_participations(
    conn: &mut AsyncPgConnection,
    auth: &AuthContext,
    event_id: i32,
) -> Result<Vec<EventParticipation>, WorkflowError> {
    let event = events::table
        .find(event_id)
        .first::<Event>(conn)
        .await
        .optional()?
        .ok_or(WorkflowError::NotFoundOrForbidden)?;

    if !auth.can_review(event.club_id) {
        return Err(WorkflowError::NotFoundOrForbidden);
    }

    Ok(event_participations::table
        .filter(event_participations::event_id.eq(event_id))
        .filter(event_participations::status.eq(ReviewStatus::Pending.as_str()))
        .order(event_participations::created_at.asc())
        .load::<EventParticipation>(conn)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn ts() -> NaiveDateTime {
        NaiveDateTime::from_timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn event(open: bool, status: EventStatus, cap: Option<i32>) -> Event {
        Event {
            id: 1,
            club_id: 7,
            name: "Hack Night".to_string(),
            description: None,
            status: status.as_str().to_string(),
            enrollment_open: open,
            max_participants: cap,
            starts_at: ts(),
        }
    }

    #[test]
    fn enrollment_requires_an_open_upcoming_event() {
        let closed = event(false, EventStatus::Upcoming, None);
        assert!(matches!(
            check_enrollment(&closed, false, 0),
            Err(WorkflowError::EnrollmentClosed)
        ));

        let past = event(true, EventStatus::Past, None);
        assert!(matches!(
            check_enrollment(&past, false, 0),
            Err(WorkflowError::EventInPast)
        ));

        let open = event(true, EventStatus::Upcoming, None);
        assert!(check_enrollment(&open, false, 0).is_ok());
    }

    #[test]
    fn double_enrollment_is_rejected() {
        let open = event(true, EventStatus::Upcoming, None);
        assert!(matches!(
            check_enrollment(&open, true, 1),
            Err(WorkflowError::AlreadyEnrolled)
        ));
    }

    #[test]
    fn capacity_counts_pending_and_approved_seats() {
        // Scenario: cap of two, S1 and S2 hold seats, S3 bounces.
        let capped = event(true, EventStatus::Upcoming, Some(2));
        assert!(check_enrollment(&capped, false, 0).is_ok());
        assert!(check_enrollment(&capped, false, 1).is_ok());
        assert!(matches!(
            check_enrollment(&capped, false, 2),
            Err(WorkflowError::CapacityReached)
        ));
    }

    fn participation(user_id: i32, status: ReviewStatus) -> EventParticipation {
        EventParticipation {
            id: 1,
            user_id,
            event_id: 1,
            status: status.as_str().to_string(),
            proof_ref: None,
            remarks: None,
            reviewed_by: None,
            created_at: ts(),
            updated_at: ts(),
        }
    }

    #[test]
    fn only_the_owner_may_attach_a_proof() {
        let mine = participation(5, ReviewStatus::Pending);
        assert!(check_proof_owner(&mine, 5).is_ok());

        // another student hits the owner gate before any upload or
        // status change can happen
        assert!(matches!(
            check_proof_owner(&mine, 6),
            Err(WorkflowError::NotFoundOrForbidden)
        ));
        assert_eq!(mine.status(), Some(ReviewStatus::Pending));
        assert!(mine.proof_ref.is_none());
    }

    #[test]
    fn a_new_proof_reopens_rejected_participations() {
        assert_eq!(
            proof_transition(ReviewStatus::Rejected).unwrap(),
            ReviewStatus::Pending
        );
        // re-upload before first review is allowed too
        assert_eq!(
            proof_transition(ReviewStatus::Pending).unwrap(),
            ReviewStatus::Pending
        );
        assert!(matches!(
            proof_transition(ReviewStatus::Approved),
            Err(WorkflowError::NotPending)
        ));
    }

    #[test]
    fn rejection_requires_remarks() {
        assert!(matches!(
            check_review(ReviewStatus::Pending, ReviewDecision::Reject, None),
            Err(WorkflowError::MissingReason)
        ));
        assert!(matches!(
            check_review(ReviewStatus::Pending, ReviewDecision::Reject, Some("  ")),
            Err(WorkflowError::MissingReason)
        ));
        assert_eq!(
            check_review(
                ReviewStatus::Pending,
                ReviewDecision::Reject,
                Some("no proof attached")
            )
            .unwrap(),
            ReviewStatus::Rejected
        );
        // approval remarks stay optional
        assert_eq!(
            check_review(ReviewStatus::Pending, ReviewDecision::Approve, None).unwrap(),
            ReviewStatus::Approved
        );
    }

    #[test]
    fn settled_participations_cannot_be_reviewed_again() {
        for status in [ReviewStatus::Approved, ReviewStatus::Rejected] {
            assert!(matches!(
                check_review(status, ReviewDecision::Approve, None),
                Err(WorkflowError::NotPending)
            ));
        }
    }
}
