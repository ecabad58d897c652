//! Team resolution over the flat "leader tags members" relation.
//!
//! The relation is not an org chart: a leader is simply any user whose
//! `team_member_ids` list names another user. Resolution is a pure function
//! over the full user collection and is recomputed on every call - the
//! relation can change between calls and must never be cached durably.

use crate::models::User;

/// A resolved team: the leader plus every member (leader included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    /// The team leader's user ID
    pub leader: String,
    /// All member IDs, leader included, in deterministic order
    pub members: Vec<String>,
}

impl Team {
    /// Whether `user_id` belongs to this team.
    pub fn contains(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m == user_id)
    }
}

/// Resolve the leader of `user_id`.
///
/// Returns the ID of the user whose `team_member_ids` contains `user_id`,
/// or `user_id` itself if nobody tags them (a one-person team). If more
/// than one leader tags the same member (a data anomaly), the leader with
/// the smallest ID wins, so resolution stays deterministic.
pub fn leader_of(users: &[User], user_id: &str) -> String {
    let mut leaders: Vec<&str> = users
        .iter()
        .filter(|u| u.team_member_ids.iter().any(|m| m == user_id))
        .map(|u| u.id.as_str())
        .collect();
    leaders.sort_unstable();

    match leaders.first() {
        Some(leader) => leader.to_string(),
        None => user_id.to_string(),
    }
}

/// Resolve the full team containing `user_id`.
///
/// The member set is `{leader} ∪ leader.team_member_ids`, in leader-first
/// order with the leader's tag order preserved.
pub fn team_of(users: &[User], user_id: &str) -> Team {
    let leader = leader_of(users, user_id);

    let mut members = vec![leader.clone()];
    if let Some(leader_user) = users.iter().find(|u| u.id == leader) {
        for member in &leader_user.team_member_ids {
            if !members.contains(member) {
                members.push(member.clone());
            }
        }
    }

    Team { leader, members }
}
