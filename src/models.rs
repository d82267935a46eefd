use crate::schema::*;
use chrono::NaiveDateTime;
use diesel::prelude::*;

/// Authorization tier of a user. Leader/admin tiers are always scoped to the
/// user's home club.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Student,
    ClubLeader(i32),
    ClubAdmin(i32),
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleType {
    ExecutiveBody,
    ClubMember,
}

impl RoleType {
    pub fn as_str(self) -> &'static str {
        match self {
            RoleType::ExecutiveBody => "executive_body",
            RoleType::ClubMember => "club_member",
        }
    }

    pub fn parse(s: &str) -> Option<RoleType> {
        match s {
            "executive_body" => Some(RoleType::ExecutiveBody),
            "club_member" => Some(RoleType::ClubMember),
            _ => None,
        }
    }
}

/// Review status shared by membership applications and event participations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<ReviewStatus> {
        match s {
            "pending" => Some(ReviewStatus::Pending),
            "approved" => Some(ReviewStatus::Approved),
            "rejected" => Some(ReviewStatus::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Upcoming,
    Ongoing,
    Past,
}

impl EventStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Upcoming => "upcoming",
            EventStatus::Ongoing => "ongoing",
            EventStatus::Past => "past",
        }
    }

    pub fn parse(s: &str) -> Option<EventStatus> {
        match s {
            "upcoming" => Some(EventStatus::Upcoming),
            "ongoing" => Some(EventStatus::Ongoing),
            "past" => Some(EventStatus::Past),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub capability: String,
    pub student_no: Option<String>,
    pub club_id: Option<i32>,
}

impl User {
    /// The capability column only means leader/admin together with a home
    /// club; a dangling elevated row degrades to plain student.
    pub fn capability(&self) -> Capability {
        match (self.capability.as_str(), self.club_id) {
            ("admin", _) => Capability::Admin,
            ("club_admin", Some(club_id)) => Capability::ClubAdmin(club_id),
            ("club_leader", Some(club_id)) => Capability::ClubLeader(club_id),
            _ => Capability::Student,
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable)]
pub struct Club {
    pub id: i32,
    pub name: String,
    pub category: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub admin_user_id: Option<i32>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(belongs_to(Club))]
pub struct Role {
    pub id: i32,
    pub club_id: i32,
    pub name: String,
    pub role_type: String,
}

impl Role {
    pub fn role_type(&self) -> Option<RoleType> {
        RoleType::parse(&self.role_type)
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(belongs_to(Club))]
#[diesel(belongs_to(Role))]
pub struct MembershipApplication {
    pub id: i32,
    pub user_id: i32,
    pub club_id: i32,
    pub role_id: i32,
    pub status: String,
    pub remarks: Option<String>,
    pub reviewed_by: Option<i32>,
    pub applied_at: NaiveDateTime,
    pub processed_at: Option<NaiveDateTime>,
}

impl MembershipApplication {
    pub fn status(&self) -> Option<ReviewStatus> {
        ReviewStatus::parse(&self.status)
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(belongs_to(Club))]
#[diesel(belongs_to(Role))]
#[diesel(belongs_to(User))]
pub struct Membership {
    pub id: i32,
    pub user_id: i32,
    pub club_id: i32,
    pub role_id: i32,
    pub joined_on: NaiveDateTime,
    pub is_active: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(belongs_to(Club))]
pub struct Event {
    pub id: i32,
    pub club_id: i32,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub enrollment_open: bool,
    pub max_participants: Option<i32>,
    pub starts_at: NaiveDateTime,
}

impl Event {
    pub fn status(&self) -> Option<EventStatus> {
        EventStatus::parse(&self.status)
    }
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(belongs_to(Event))]
pub struct EventParticipation {
    pub id: i32,
    pub user_id: i32,
    pub event_id: i32,
    pub status: String,
    pub proof_ref: Option<String>,
    pub remarks: Option<String>,
    pub reviewed_by: Option<i32>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl EventParticipation {
    pub fn status(&self) -> Option<ReviewStatus> {
        ReviewStatus::parse(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn review_status_round_trips() {
        for status in [
            ReviewStatus::Pending,
            ReviewStatus::Approved,
            ReviewStatus::Rejected,
        ] {
            assert_eq!(ReviewStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ReviewStatus::parse("cancelled"), None);
    }

    #[test]
    fn elevated_capability_requires_home_club() {
        let mut user = User {
            id: 1,
            name: "A".into(),
            email: "a@example.edu".into(),
            password_hash: String::new(),
            capability: "club_leader".into(),
            student_no: None,
            club_id: Some(7),
        };
        assert_eq!(user.capability(), Capability::ClubLeader(7));

        user.club_id = None;
        assert_eq!(user.capability(), Capability::Student);

        user.capability = "admin".into();
        assert_eq!(user.capability(), Capability::Admin);
    }
}
