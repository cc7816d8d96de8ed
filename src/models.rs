//! Data models for sessions, teams and members

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Role a participant requests when joining
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Field,
    Keeper,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Field => "field",
            Role::Keeper => "keeper",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "field" => Ok(Role::Field),
            "keeper" => Ok(Role::Keeper),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Where the engine placed a member. Set only by the engine, never by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// The team's singleton goalkeeper slot
    Keeper { team: usize },
    /// An active field slot on a team
    Field { team: usize },
    /// Overflow attached to a team once field capacity is exhausted
    Substitute { team: usize },
}

impl Placement {
    /// Index of the team this placement is attached to
    pub fn team(&self) -> usize {
        match self {
            Placement::Keeper { team } => *team,
            Placement::Field { team } => *team,
            Placement::Substitute { team } => *team,
        }
    }

    /// Whether this placement occupies an active slot (keeper or field)
    pub fn is_active(&self) -> bool {
        !matches!(self, Placement::Substitute { .. })
    }
}

/// A registered participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub display_name: String,
    pub role: Role,
    pub placement: Option<Placement>,
}

impl Member {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            role,
            placement: None,
        }
    }
}

/// One team within a session. Holds member IDs; member data lives in the roster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Team {
    pub keeper: Option<String>,
    pub field: Vec<String>,
    pub substitutes: Vec<String>,
}

impl Team {
    pub fn has_keeper(&self) -> bool {
        self.keeper.is_some()
    }

    pub fn field_count(&self) -> usize {
        self.field.len()
    }

    pub fn substitute_count(&self) -> usize {
        self.substitutes.len()
    }
}

/// One active team-assignment round scoped to a conversation context.
///
/// Owned exclusively by the engine slot managing its scope; callers only
/// ever see rendered views and placements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub scope_id: String,
    pub team_count: usize,
    pub capacity_per_team: usize,
    pub roster: HashMap<String, Member>,
    pub teams: Vec<Team>,
    /// Bumped on every mutation, for display-staleness detection
    pub revision: u64,
    /// Opaque reference to the current external display surface
    pub display_handle: Option<String>,
}

impl Session {
    pub fn new(
        scope_id: impl Into<String>,
        team_count: usize,
        capacity_per_team: usize,
    ) -> Self {
        Self {
            scope_id: scope_id.into(),
            team_count,
            capacity_per_team,
            roster: HashMap::new(),
            teams: vec![Team::default(); team_count],
            revision: 0,
            display_handle: None,
        }
    }

    pub fn contains(&self, member_id: &str) -> bool {
        self.roster.contains_key(member_id)
    }

    /// Record a member in the roster and slot them into the placed team.
    ///
    /// Re-inserting an existing member ID overwrites the roster entry; the
    /// caller is responsible for having cleared any previous team slot.
    pub fn place(&mut self, mut member: Member, placement: Placement) {
        let team = &mut self.teams[placement.team()];
        match placement {
            Placement::Keeper { .. } => team.keeper = Some(member.id.clone()),
            Placement::Field { .. } => team.field.push(member.id.clone()),
            Placement::Substitute { .. } => team.substitutes.push(member.id.clone()),
        }
        member.placement = Some(placement);
        self.roster.insert(member.id.clone(), member);
    }

    /// Empty every team slot and forget placements, keeping the roster set.
    pub fn clear_placements(&mut self) {
        self.teams = vec![Team::default(); self.team_count];
        for member in self.roster.values_mut() {
            member.placement = None;
        }
    }

    pub fn bump_revision(&mut self) {
        self.revision += 1;
    }
}

/// Snapshot of a session rendered for the display surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedState {
    pub scope_id: String,
    pub revision: u64,
    pub text: String,
}
