//! Per-club role registry: role creation/deletion and the executive
//! single-holder gate consumed by the membership workflow.

use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::{
    auth::AuthContext,
    error::WorkflowError,
    models::{Role, RoleType},
    schema::{memberships, roles},
};

pub const PRESIDENT: &str = "President";
pub const VICE_PRESIDENT: &str = "Vice President";

/// Seed set inserted when a club is created.
pub fn default_roles() -> [(&'static str, RoleType); 8] {
    [
        (PRESIDENT, RoleType::ExecutiveBody),
        (VICE_PRESIDENT, RoleType::ExecutiveBody),
        ("Secretary", RoleType::ExecutiveBody),
        ("Joint Secretary", RoleType::ExecutiveBody),
        ("Treasurer", RoleType::ExecutiveBody),
        ("Lead", RoleType::ClubMember),
        ("Co-Lead", RoleType::ClubMember),
        ("Member", RoleType::ClubMember),
    ]
}

/// President and Vice President can never be deleted, and are never
/// self-applied for.
pub fn is_protected(name: &str) -> bool {
    name == PRESIDENT || name == VICE_PRESIDENT
}

#[derive(Insertable)]
#[diesel(table_name = roles)]
struct NewRole {
    club_id: i32,
    name: String,
    role_type: String,
}

pub async fn create_role(
    conn: &mut AsyncPgConnection,
    auth: &AuthContext,
    club_id: i32,
    name: String,
    role_type: RoleType,
) -> Result<Role, WorkflowError> {
    if !auth.can_review(club_id) {
        return Err(WorkflowError::Unauthorized);
    }

    diesel::insert_into(roles::table)
        .values(NewRole {
            club_id,
            name,
            role_type: role_type.as_str().to_string(),
        })
        .on_conflict((roles::club_id, roles::name))
        .do_nothing()
        .get_result::<Role>(conn)
        .await
        .optional()?
        .ok_or(WorkflowError::DuplicateRole)
}

pub async fn delete_role(
    conn: &mut AsyncPgConnection,
    auth: &AuthContext,
    role_id: i32,
) -> Result<(), WorkflowError> {
    let role = roles::table
        .find(role_id)
        .first::<Role>(conn)
        .await
        .optional()?
        .ok_or(WorkflowError::NotFoundOrForbidden)?;

    if !auth.can_review(role.club_id) {
        return Err(WorkflowError::NotFoundOrForbidden);
    }
    if is_protected(&role.name) {
        return Err(WorkflowError::ProtectedRole);
    }

    let holders: i64 = memberships::table
        .filter(memberships::role_id.eq(role_id))
        .filter(memberships::is_active.eq(true))
        .count()
        .get_result(conn)
        .await?;
    if holders > 0 {
        return Err(WorkflowError::RoleInUse);
    }

    diesel::delete(roles::table.find(role_id)).execute(conn).await?;
    Ok(())
}

/// True iff an active membership other than `excluding_user_id` currently
/// holds the role. Callers that need the answer to stay true for the rest of
/// their transaction must hold the role row lock (see the membership
/// workflow's approve path).
pub async fn is_executive_role_filled(
    conn: &mut AsyncPgConnection,
    club_id: i32,
    role_id: i32,
    excluding_user_id: Option<i32>,
) -> Result<bool, WorkflowError> {
    let base = memberships::table
        .filter(memberships::club_id.eq(club_id))
        .filter(memberships::role_id.eq(role_id))
        .filter(memberships::is_active.eq(true));

    let holders: i64 = match excluding_user_id {
        Some(user_id) => {
            base.filter(memberships::user_id.ne(user_id))
                .count()
                .get_result(conn)
                .await?
        }
        None => base.count().get_result(conn).await?,
    };
    Ok(holders > 0)
}

/// Called once per club, right after the club row is inserted in the same
/// transaction.
pub async fn seed_default_roles(
    conn: &mut AsyncPgConnection,
    club_id: i32,
) -> Result<(), WorkflowError> {
    let rows: Vec<NewRole> = default_roles()
        .into_iter()
        .map(|(name, role_type)| NewRole {
            club_id,
            name: name.to_string(),
            role_type: role_type.as_str().to_string(),
        })
        .collect();

    diesel::insert_into(roles::table)
        .values(rows)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn list_roles(
    conn: &mut AsyncPgConnection,
    club_id: i32,
) -> Result<Vec<Role>, WorkflowError> {
    Ok(roles::table
        .filter(roles::club_id.eq(club_id))
        .order(roles::id.asc())
        .load::<Role>(conn)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_set_contains_the_fixed_roles() {
        let seeded = default_roles();
        assert_eq!(seeded.len(), 8);

        let executives: Vec<_> = seeded
            .iter()
            .filter(|(_, t)| *t == RoleType::ExecutiveBody)
            .map(|(n, _)| *n)
            .collect();
        assert_eq!(
            executives,
            [
                "President",
                "Vice President",
                "Secretary",
                "Joint Secretary",
                "Treasurer"
            ]
        );

        let members: Vec<_> = seeded
            .iter()
            .filter(|(_, t)| *t == RoleType::ClubMember)
            .map(|(n, _)| *n)
            .collect();
        assert_eq!(members, ["Lead", "Co-Lead", "Member"]);
    }

    #[test]
    fn only_president_and_vice_president_are_protected() {
        assert!(is_protected("President"));
        assert!(is_protected("Vice President"));
        assert!(!is_protected("Secretary"));
        assert!(!is_protected("Member"));
    }
}
