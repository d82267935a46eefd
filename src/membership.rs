//! Membership lifecycle: application submission, review (the one
//! multi-statement approve path in the system), removal, and the self-service
//! update path.
//!
//! Every mutating operation runs in its own transaction. The approve path
//! locks the role row `FOR UPDATE` so two concurrent approvals targeting the
//! same executive role serialize; the loser re-reads a filled role and fails
//! with `RoleAlreadyFilled` while its application stays pending.

use chrono::Utc;
use diesel::{prelude::*, result::DatabaseErrorKind};
use diesel_async::{scoped_futures::ScopedFutureExt, AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::Deserialize;

use crate::{
    auth::AuthContext,
    error::WorkflowError,
    models::{Capability, Membership, MembershipApplication, ReviewStatus, Role, RoleType, User},
    registry,
    schema::{membership_applications, memberships, roles, users},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

#[derive(Insertable)]
#[diesel(table_name = membership_applications)]
struct NewApplication {
    user_id: i32,
    club_id: i32,
    role_id: i32,
    status: String,
    applied_at: chrono::NaiveDateTime,
}

#[derive(Insertable)]
#[diesel(table_name = memberships)]
struct NewMembership {
    user_id: i32,
    club_id: i32,
    role_id: i32,
    joined_on: chrono::NaiveDateTime,
    is_active: bool,
}

#[derive(AsChangeset)]
#[diesel(table_name = memberships)]
struct MembershipUpdate {
    role_id: Option<i32>,
    is_active: Option<bool>,
}

// ---- pure guards, exercised directly by the tests ----

fn check_application(
    role: &Role,
    club_id: i32,
    pending_exists: bool,
) -> Result<(), WorkflowError> {
    if role.club_id != club_id {
        return Err(WorkflowError::InvalidRole);
    }
    if registry::is_protected(&role.name) {
        return Err(WorkflowError::RestrictedRole);
    }
    if pending_exists {
        return Err(WorkflowError::DuplicateApplication);
    }
    Ok(())
}

#[derive(Debug, PartialEq, Eq)]
enum MembershipChange {
    /// The user already has a membership row in this club; re-point its role
    /// (and reactivate it) instead of inserting a duplicate.
    AssignRole { membership_id: i32 },
    Join,
}

#[derive(Debug, PartialEq, Eq)]
struct ApprovalPlan {
    change: MembershipChange,
    elevate: bool,
}

fn plan_approval(
    application: &MembershipApplication,
    role: &Role,
    existing: Option<&Membership>,
    filled_by_other: bool,
) -> Result<ApprovalPlan, WorkflowError> {
    if application.status() != Some(ReviewStatus::Pending) {
        return Err(WorkflowError::NotPending);
    }
    let executive = role.role_type().ok_or(WorkflowError::InvalidState)? == RoleType::ExecutiveBody;
    if executive && filled_by_other {
        return Err(WorkflowError::RoleAlreadyFilled);
    }

    let change = match existing {
        Some(membership) => MembershipChange::AssignRole {
            membership_id: membership.id,
        },
        None => MembershipChange::Join,
    };
    Ok(ApprovalPlan {
        change,
        elevate: executive,
    })
}

/// Elevation (approval of an executive role, or installing a designated club
/// admin) applies to students and plain leaders, but never downgrades a club
/// admin or global admin.
pub(crate) fn should_elevate(current: Capability) -> bool {
    !matches!(current, Capability::Admin | Capability::ClubAdmin(_))
}

fn check_role_change(role: &Role, reviewer: bool) -> Result<(), WorkflowError> {
    if !reviewer && registry::is_protected(&role.name) {
        return Err(WorkflowError::RestrictedRole);
    }
    Ok(())
}

/// Gate for any update that leaves a membership active: an executive seat
/// must not end up with a second active holder, whether the row gets there
/// by role change or by reactivation.
fn check_executive_seat(
    role: &Role,
    becoming_active: bool,
    filled_by_other: bool,
) -> Result<(), WorkflowError> {
    if !becoming_active {
        return Ok(());
    }
    if role.role_type().ok_or(WorkflowError::InvalidState)? == RoleType::ExecutiveBody
        && filled_by_other
    {
        return Err(WorkflowError::RoleAlreadyFilled);
    }
    Ok(())
}

fn check_rejection(application: &MembershipApplication) -> Result<(), WorkflowError> {
    if application.status() != Some(ReviewStatus::Pending) {
        return Err(WorkflowError::NotPending);
    }
    Ok(())
}

// ---- operations ----

pub async fn submit_application(
    conn: &mut AsyncPgConnection,
    auth: &AuthContext,
    club_id: i32,
    role_id: i32,
) -> Result<MembershipApplication, WorkflowError> {
    let auth = *auth;
    conn.transaction::<MembershipApplication, WorkflowError, _>(|conn| {
        async move {
            let role = roles::table
                .find(role_id)
                .first::<Role>(conn)
                .await
                .optional()?
                .ok_or(WorkflowError::InvalidRole)?;

            let pending: i64 = membership_applications::table
                .filter(membership_applications::user_id.eq(auth.user_id))
                .filter(membership_applications::club_id.eq(club_id))
                .filter(membership_applications::role_id.eq(role_id))
                .filter(membership_applications::status.eq(ReviewStatus::Pending.as_str()))
                .count()
                .get_result(conn)
                .await?;

            check_application(&role, club_id, pending > 0)?;

            diesel::insert_into(membership_applications::table)
                .values(NewApplication {
                    user_id: auth.user_id,
                    club_id,
                    role_id,
                    status: ReviewStatus::Pending.as_str().to_string(),
                    applied_at: Utc::now().naive_utc(),
                })
                .get_result::<MembershipApplication>(conn)
                .await
                .map_err(|e| match e {
                    // partial unique index on pending (user, club, role)
                    diesel::result::Error::DatabaseError(
                        DatabaseErrorKind::UniqueViolation,
                        _,
                    ) => WorkflowError::DuplicateApplication,
                    e => WorkflowError::Storage(e),
                })
        }
        .scope_boxed()
    })
    .await
}

pub async fn review_application(
    conn: &mut AsyncPgConnection,
    auth: &AuthContext,
    application_id: i32,
    decision: ReviewDecision,
    remarks: Option<String>,
) -> Result<(), WorkflowError> {
    let auth = *auth;
    conn.transaction::<(), WorkflowError, _>(|conn| {
        async move {
            // Lock the application row for the whole review; a concurrent
            // review of the same application blocks here and then re-reads a
            // terminal status.
            let application = membership_applications::table
                .find(application_id)
                .for_update()
                .first::<MembershipApplication>(conn)
                .await
                .optional()?
                .ok_or(WorkflowError::NotFoundOrForbidden)?;

            if !auth.can_review(application.club_id) {
                return Err(WorkflowError::NotFoundOrForbidden);
            }

            let now = Utc::now().naive_utc();

            if decision == ReviewDecision::Reject {
                check_rejection(&application)?;
                diesel::update(membership_applications::table.find(application.id))
                    .set((
                        membership_applications::status.eq(ReviewStatus::Rejected.as_str()),
                        membership_applications::reviewed_by.eq(auth.user_id),
                        membership_applications::remarks.eq(remarks),
                        membership_applications::processed_at.eq(now),
                    ))
                    .execute(conn)
                    .await?;
                tracing::info!(application_id, reviewer = auth.user_id, "application rejected");
                return Ok(());
            }

            // Lock the role row for the rest of the transaction; this is the
            // serialization point for the single-holder invariant.
            let role = roles::table
                .find(application.role_id)
                .for_update()
                .first::<Role>(conn)
                .await?;

            let existing = memberships::table
                .filter(memberships::user_id.eq(application.user_id))
                .filter(memberships::club_id.eq(application.club_id))
                .first::<Membership>(conn)
                .await
                .optional()?;

            let filled = registry::is_executive_role_filled(
                conn,
                application.club_id,
                application.role_id,
                Some(application.user_id),
            )
            .await?;

            let plan = plan_approval(&application, &role, existing.as_ref(), filled)?;

            match plan.change {
                MembershipChange::AssignRole { membership_id } => {
                    diesel::update(memberships::table.find(membership_id))
                        .set((
                            memberships::role_id.eq(application.role_id),
                            memberships::is_active.eq(true),
                        ))
                        .execute(conn)
                        .await?;
                }
                MembershipChange::Join => {
                    diesel::insert_into(memberships::table)
                        .values(NewMembership {
                            user_id: application.user_id,
                            club_id: application.club_id,
                            role_id: application.role_id,
                            joined_on: now,
                            is_active: true,
                        })
                        .execute(conn)
                        .await?;
                }
            }

            if plan.elevate {
                let user = users::table
                    .find(application.user_id)
                    .first::<User>(conn)
                    .await?;
                if should_elevate(user.capability()) {
                    diesel::update(users::table.find(user.id))
                        .set((
                            users::capability.eq("club_leader"),
                            users::club_id.eq(Some(application.club_id)),
                        ))
                        .execute(conn)
                        .await?;
                }
            }

            diesel::update(membership_applications::table.find(application.id))
                .set((
                    membership_applications::status.eq(ReviewStatus::Approved.as_str()),
                    membership_applications::reviewed_by.eq(auth.user_id),
                    membership_applications::remarks.eq(remarks),
                    membership_applications::processed_at.eq(now),
                ))
                .execute(conn)
                .await?;

            tracing::info!(application_id, reviewer = auth.user_id, "application approved");
            Ok(())
        }
        .scope_boxed()
    })
    .await
}

/// Hard removal. Capability elevation gained through the membership is left
/// untouched; whether removal should also demote is unresolved product-side
/// (see DESIGN.md).
pub async fn remove_membership(
    conn: &mut AsyncPgConnection,
    auth: &AuthContext,
    membership_id: i32,
) -> Result<(), WorkflowError> {
    let membership = memberships::table
        .find(membership_id)
        .first::<Membership>(conn)
        .await
        .optional()?
        .ok_or(WorkflowError::NotFoundOrForbidden)?;

    if !auth.can_review(membership.club_id) {
        return Err(WorkflowError::NotFoundOrForbidden);
    }

    diesel::delete(memberships::table.find(membership_id))
        .execute(conn)
        .await?;
    tracing::info!(membership_id, reviewer = auth.user_id, "membership removed");
    Ok(())
}

/// Self-service edit of a member's own role/active flag (reviewers may edit
/// any membership in their club). Role changes go through the same locked
/// executive gate as the approve path, so this side door cannot break the
/// single-holder invariant.
pub async fn update_membership(
    conn: &mut AsyncPgConnection,
    auth: &AuthContext,
    membership_id: i32,
    new_role_id: Option<i32>,
    is_active: Option<bool>,
) -> Result<(), WorkflowError> {
    if new_role_id.is_none() && is_active.is_none() {
        return Ok(());
    }

    let auth = *auth;
    conn.transaction::<(), WorkflowError, _>(|conn| {
        async move {
            let membership = memberships::table
                .find(membership_id)
                .first::<Membership>(conn)
                .await
                .optional()?
                .ok_or(WorkflowError::NotFoundOrForbidden)?;

            let reviewer = auth.can_review(membership.club_id);
            if membership.user_id != auth.user_id && !reviewer {
                return Err(WorkflowError::NotFoundOrForbidden);
            }

            // The update may leave the row active holding either its current
            // role or the requested one; whichever it is, the seat gate runs
            // against that role under the same row lock the approve path
            // takes. Reactivation alone is not exempt.
            let target_role_id = new_role_id.unwrap_or(membership.role_id);
            let becoming_active = is_active.unwrap_or(membership.is_active);

            let role = roles::table
                .find(target_role_id)
                .for_update()
                .first::<Role>(conn)
                .await
                .optional()?
                .ok_or(WorkflowError::InvalidRole)?;
            if role.club_id != membership.club_id {
                return Err(WorkflowError::InvalidRole);
            }
            if new_role_id.is_some() {
                check_role_change(&role, reviewer)?;
            }

            let filled = registry::is_executive_role_filled(
                conn,
                membership.club_id,
                target_role_id,
                Some(membership.user_id),
            )
            .await?;
            check_executive_seat(&role, becoming_active, filled)?;

            diesel::update(memberships::table.find(membership_id))
                .set(MembershipUpdate {
                    role_id: new_role_id,
                    is_active,
                })
                .execute(conn)
                .await?;
            Ok(())
        }
        .scope_boxed()
    })
    .await
}

/// Review queue for a club.
pub async fn pending_applications(
    conn: &mut AsyncPgConnection,
    auth: &AuthContext,
    club_id: i32,
) -> Result<Vec<MembershipApplication>, WorkflowError> {
    if !auth.can_review(club_id) {
        return Err(WorkflowError::NotFoundOrForbidden);
    }

    Ok(membership_applications::table
        .filter(membership_applications::club_id.eq(club_id))
        .filter(membership_applications::status.eq(ReviewStatus::Pending.as_str()))
        .order(membership_applications::applied_at.asc())
        .load::<MembershipApplication>(conn)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn ts() -> NaiveDateTime {
        NaiveDateTime::from_timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn role(id: i32, club_id: i32, name: &str, role_type: RoleType) -> Role {
        Role {
            id,
            club_id,
            name: name.to_string(),
            role_type: role_type.as_str().to_string(),
        }
    }

    fn application(user_id: i32, club_id: i32, role_id: i32, status: ReviewStatus) -> MembershipApplication {
        MembershipApplication {
            id: 1,
            user_id,
            club_id,
            role_id,
            status: status.as_str().to_string(),
            remarks: None,
            reviewed_by: None,
            applied_at: ts(),
            processed_at: None,
        }
    }

    fn membership(id: i32, user_id: i32, club_id: i32, role_id: i32) -> Membership {
        Membership {
            id,
            user_id,
            club_id,
            role_id,
            joined_on: ts(),
            is_active: true,
        }
    }

    #[test]
    fn applying_for_a_foreign_role_is_invalid() {
        let secretary = role(3, 9, "Secretary", RoleType::ExecutiveBody);
        assert!(matches!(
            check_application(&secretary, 7, false),
            Err(WorkflowError::InvalidRole)
        ));
    }

    #[test]
    fn president_and_vice_president_are_not_self_applied() {
        let president = role(1, 7, "President", RoleType::ExecutiveBody);
        assert!(matches!(
            check_application(&president, 7, false),
            Err(WorkflowError::RestrictedRole)
        ));
    }

    #[test]
    fn a_second_pending_application_is_a_duplicate() {
        let member = role(8, 7, "Member", RoleType::ClubMember);
        assert!(check_application(&member, 7, false).is_ok());
        assert!(matches!(
            check_application(&member, 7, true),
            Err(WorkflowError::DuplicateApplication)
        ));
    }

    #[test]
    fn approving_a_fresh_member_joins_and_does_not_elevate() {
        let member = role(8, 7, "Member", RoleType::ClubMember);
        let app = application(5, 7, 8, ReviewStatus::Pending);

        let plan = plan_approval(&app, &member, None, false).unwrap();
        assert_eq!(plan.change, MembershipChange::Join);
        assert!(!plan.elevate);
    }

    #[test]
    fn approving_an_executive_role_elevates_and_respects_the_single_holder() {
        // Scenario: "Robotics" has an unfilled Secretary seat. U1 is approved
        // and elevated; U2's approval against the now-filled seat fails and
        // the application stays actionable.
        let secretary = role(3, 7, "Secretary", RoleType::ExecutiveBody);

        let u1 = application(5, 7, 3, ReviewStatus::Pending);
        let plan = plan_approval(&u1, &secretary, None, false).unwrap();
        assert_eq!(plan.change, MembershipChange::Join);
        assert!(plan.elevate);

        let u2 = application(6, 7, 3, ReviewStatus::Pending);
        assert!(matches!(
            plan_approval(&u2, &secretary, None, true),
            Err(WorkflowError::RoleAlreadyFilled)
        ));
        // the guard fails before any state change, so u2 is still pending
        assert_eq!(u2.status(), Some(ReviewStatus::Pending));
    }

    #[test]
    fn approving_an_existing_member_changes_the_role_in_place() {
        let lead = role(6, 7, "Lead", RoleType::ClubMember);
        let app = application(5, 7, 6, ReviewStatus::Pending);
        let current = membership(11, 5, 7, 8);

        let plan = plan_approval(&app, &lead, Some(&current), false).unwrap();
        assert_eq!(
            plan.change,
            MembershipChange::AssignRole { membership_id: 11 }
        );
    }

    #[test]
    fn terminal_applications_cannot_be_reviewed_again() {
        let member = role(8, 7, "Member", RoleType::ClubMember);
        for status in [ReviewStatus::Approved, ReviewStatus::Rejected] {
            let app = application(5, 7, 8, status);
            assert!(matches!(
                plan_approval(&app, &member, None, false),
                Err(WorkflowError::NotPending)
            ));
        }
    }

    #[test]
    fn elevation_never_downgrades_admins() {
        assert!(should_elevate(Capability::Student));
        assert!(should_elevate(Capability::ClubLeader(3)));
        assert!(!should_elevate(Capability::ClubAdmin(3)));
        assert!(!should_elevate(Capability::Admin));
    }

    #[test]
    fn reactivating_a_membership_rechecks_the_executive_seat() {
        let secretary = role(3, 7, "Secretary", RoleType::ExecutiveBody);

        // the seat was re-filled while this member sat inactive
        assert!(matches!(
            check_executive_seat(&secretary, true, true),
            Err(WorkflowError::RoleAlreadyFilled)
        ));
        assert!(check_executive_seat(&secretary, true, false).is_ok());
        // deactivating can never create a second holder
        assert!(check_executive_seat(&secretary, false, true).is_ok());

        // non-executive roles have no holder limit
        let member = role(8, 7, "Member", RoleType::ClubMember);
        assert!(check_executive_seat(&member, true, true).is_ok());
    }

    #[test]
    fn rejecting_a_terminal_application_is_refused() {
        // mirrors the approve-side guard: once a decision landed, the other
        // decision arriving second must not overwrite it
        for status in [ReviewStatus::Approved, ReviewStatus::Rejected] {
            let app = application(5, 7, 8, status);
            assert!(matches!(
                check_rejection(&app),
                Err(WorkflowError::NotPending)
            ));
        }
        let pending = application(5, 7, 8, ReviewStatus::Pending);
        assert!(check_rejection(&pending).is_ok());
    }

    #[test]
    fn self_service_cannot_grab_protected_roles() {
        let president = role(1, 7, "President", RoleType::ExecutiveBody);
        assert!(matches!(
            check_role_change(&president, false),
            Err(WorkflowError::RestrictedRole)
        ));
        // a reviewer may assign it explicitly
        assert!(check_role_change(&president, true).is_ok());

        let member = role(8, 7, "Member", RoleType::ClubMember);
        assert!(check_role_change(&member, false).is_ok());
    }
}
