//! User, site, and assignment administration commands.

use super::{json, require_admin, Output};
use crate::models::team;
use crate::models::{Site, User};
use crate::storage::{generate_id, Storage};
use crate::{Error, Result};
use serde::Serialize;
use std::path::Path;

/// Result of `user add`.
#[derive(Debug, Serialize)]
pub struct UserAddResult {
    pub user: User,
}

impl Output for UserAddResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Created user {} ({}{})",
            self.user.id,
            self.user.name,
            if self.user.is_admin { ", coordinator" } else { "" }
        )
    }
}

/// Create a new user.
pub fn user_add(data_dir: &Path, name: &str, email: &str, is_admin: bool) -> Result<UserAddResult> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput("User name must not be empty".to_string()));
    }

    let mut storage = Storage::open(data_dir)?;
    let mut user = User::new(
        generate_id("ru", email),
        name.to_string(),
        email.to_string(),
    );
    user.is_admin = is_admin;
    storage.add_user(&user)?;
    Ok(UserAddResult { user })
}

/// Result of `user list`.
#[derive(Debug, Serialize)]
pub struct UserListResult {
    pub count: usize,
    pub users: Vec<User>,
}

impl Output for UserListResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.users.is_empty() {
            return "No users".to_string();
        }
        self.users
            .iter()
            .map(|u| {
                format!(
                    "{}  {}  {}{}",
                    u.id,
                    u.name,
                    u.email,
                    if u.is_admin { "  [coordinator]" } else { "" }
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// List all users.
pub fn user_list(data_dir: &Path) -> Result<UserListResult> {
    let storage = Storage::open(data_dir)?;
    let users = storage.list_users()?;
    Ok(UserListResult {
        count: users.len(),
        users,
    })
}

/// Result of `user show`: the user plus their resolved team.
#[derive(Debug, Serialize)]
pub struct UserShowResult {
    pub user: User,
    pub team_leader: String,
    pub team_members: Vec<String>,
}

impl Output for UserShowResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "{}  {}  {}\nTeam leader: {}\nTeam: {}",
            self.user.id,
            self.user.name,
            self.user.email,
            self.team_leader,
            self.team_members.join(", ")
        )
    }
}

/// Show a user and their team, resolved from the current relation.
pub fn user_show(data_dir: &Path, user_id: &str) -> Result<UserShowResult> {
    let storage = Storage::open(data_dir)?;
    let user = storage.get_user(user_id)?;
    let users = storage.list_users()?;
    let resolved = team::team_of(&users, user_id);
    Ok(UserShowResult {
        user,
        team_leader: resolved.leader,
        team_members: resolved.members,
    })
}

/// Result of `user team`.
#[derive(Debug, Serialize)]
pub struct SetTeamResult {
    pub leader: String,
    pub members: Vec<String>,
}

impl Output for SetTeamResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.members.is_empty() {
            format!("{} now leads a one-person team", self.leader)
        } else {
            format!("{} now tags: {}", self.leader, self.members.join(", "))
        }
    }
}

/// Replace a leader's tagged member set.
///
/// The relation is a lookup, not an ownership edge: tagging takes effect on
/// the next resolution, and an empty member list reverts the leader to a
/// one-person team.
pub fn user_set_team(data_dir: &Path, leader_id: &str, member_ids: &[String]) -> Result<SetTeamResult> {
    let mut storage = Storage::open(data_dir)?;
    let mut leader = storage.get_user(leader_id)?;

    for member_id in member_ids {
        if member_id == leader_id {
            return Err(Error::InvalidInput(
                "A leader is implicitly a team member and cannot tag themselves".to_string(),
            ));
        }
        storage.get_user(member_id)?;
    }

    leader.team_member_ids = member_ids.to_vec();
    leader.updated_at = chrono::Utc::now();
    storage.update_user(&leader)?;

    Ok(SetTeamResult {
        leader: leader_id.to_string(),
        members: member_ids.to_vec(),
    })
}

/// Result of `site add`.
#[derive(Debug, Serialize)]
pub struct SiteAddResult {
    pub site: Site,
}

impl Output for SiteAddResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Created site {} ({} / {})",
            self.site.id, self.site.client, self.site.name
        )
    }
}

/// Create a new site.
pub fn site_add(data_dir: &Path, name: &str, client: &str) -> Result<SiteAddResult> {
    if name.trim().is_empty() {
        return Err(Error::InvalidInput("Site name must not be empty".to_string()));
    }

    let mut storage = Storage::open(data_dir)?;
    let site = Site::new(
        generate_id("rs", &format!("{}:{}", client, name)),
        name.to_string(),
        client.to_string(),
    );
    storage.add_site(&site)?;
    Ok(SiteAddResult { site })
}

/// Result of `site list`.
#[derive(Debug, Serialize)]
pub struct SiteListResult {
    pub count: usize,
    pub sites: Vec<Site>,
}

impl Output for SiteListResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.sites.is_empty() {
            return "No sites".to_string();
        }
        self.sites
            .iter()
            .map(|s| format!("{}  {}  ({})", s.id, s.name, s.client))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// List all sites.
pub fn site_list(data_dir: &Path) -> Result<SiteListResult> {
    let storage = Storage::open(data_dir)?;
    let sites = storage.list_sites()?;
    Ok(SiteListResult {
        count: sites.len(),
        sites,
    })
}

/// Result of `site rm`.
#[derive(Debug, Serialize)]
pub struct SiteRemoveResult {
    pub site_id: String,
    pub removed: bool,
}

impl Output for SiteRemoveResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Removed site {}", self.site_id)
    }
}

/// Remove a site, cascading assignment-edge removal.
pub fn site_remove(data_dir: &Path, site_id: &str, acting_user_id: &str) -> Result<SiteRemoveResult> {
    let mut storage = Storage::open(data_dir)?;
    let actor = storage.get_user(acting_user_id)?;
    require_admin(&actor)?;

    storage.remove_site(site_id)?;
    Ok(SiteRemoveResult {
        site_id: site_id.to_string(),
        removed: true,
    })
}

/// Result of `assign`.
#[derive(Debug, Serialize)]
pub struct AssignResult {
    pub user_id: String,
    pub site_id: String,
}

impl Output for AssignResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Assigned {} to {}", self.user_id, self.site_id)
    }
}

/// Assign an engineer to a site.
pub fn assign(
    data_dir: &Path,
    user_id: &str,
    site_id: &str,
    acting_user_id: &str,
) -> Result<AssignResult> {
    let mut storage = Storage::open(data_dir)?;
    let actor = storage.get_user(acting_user_id)?;
    require_admin(&actor)?;

    storage.assign_site(user_id, site_id)?;
    Ok(AssignResult {
        user_id: user_id.to_string(),
        site_id: site_id.to_string(),
    })
}

/// Result of `unassign`.
#[derive(Debug, Serialize)]
pub struct UnassignResult {
    pub user_id: String,
    pub site_id: String,
}

impl Output for UnassignResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Unassigned {} from {}", self.user_id, self.site_id)
    }
}

/// Unassign an engineer from a site (no-op if absent).
pub fn unassign(
    data_dir: &Path,
    user_id: &str,
    site_id: &str,
    acting_user_id: &str,
) -> Result<UnassignResult> {
    let mut storage = Storage::open(data_dir)?;
    let actor = storage.get_user(acting_user_id)?;
    require_admin(&actor)?;

    storage.unassign_site(user_id, site_id)?;
    Ok(UnassignResult {
        user_id: user_id.to_string(),
        site_id: site_id.to_string(),
    })
}

/// Result of `assignments`.
#[derive(Debug, Serialize)]
pub struct AssignmentsResult {
    pub user_id: String,
    pub count: usize,
    pub sites: Vec<Site>,
}

impl Output for AssignmentsResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.sites.is_empty() {
            return format!("{} has no site assignments", self.user_id);
        }
        self.sites
            .iter()
            .map(|s| format!("{}  {}  ({})", s.id, s.name, s.client))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// List the sites assigned to an engineer.
pub fn assignments(data_dir: &Path, user_id: &str) -> Result<AssignmentsResult> {
    let storage = Storage::open(data_dir)?;
    let sites = storage.assignments_for(user_id)?;
    Ok(AssignmentsResult {
        user_id: user_id.to_string(),
        count: sites.len(),
        sites,
    })
}
