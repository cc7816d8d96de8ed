//! Random placement rules shared by live joins and full reshuffles
//!
//! Field players go to the least-loaded team with a uniform random
//! tie-break, which keeps team sizes within one of each other under any
//! arrival order while staying unpredictable to participants. Once every
//! team is at field capacity, overflow attaches to the shortest substitute
//! list under the same tie-break.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::models::{Member, Placement, Role, Session, Team};

/// Pick uniformly at random among teams with an empty keeper slot.
///
/// Returns `None` when every team already has a keeper; callers reject the
/// join in that case rather than silently demoting the request.
pub fn pick_keeper_team<R: Rng>(teams: &[Team], rng: &mut R) -> Option<usize> {
    let open: Vec<usize> = teams
        .iter()
        .enumerate()
        .filter(|(_, team)| !team.has_keeper())
        .map(|(index, _)| index)
        .collect();

    open.choose(rng).copied()
}

/// Least-loaded field placement with random tie-break, falling back to the
/// shortest substitute list once all teams are at field capacity.
pub fn pick_field_placement<R: Rng>(teams: &[Team], capacity: usize, rng: &mut R) -> Placement {
    let open: Vec<(usize, usize)> = teams
        .iter()
        .enumerate()
        .filter(|(_, team)| team.field_count() < capacity)
        .map(|(index, team)| (index, team.field_count()))
        .collect();

    if let Some(min_load) = open.iter().map(|(_, count)| *count).min() {
        let candidates: Vec<usize> = open
            .iter()
            .filter(|(_, count)| *count == min_load)
            .map(|(index, _)| *index)
            .collect();
        // Non-empty by construction: min_load came from this list
        let team = *candidates.choose(rng).unwrap();
        return Placement::Field { team };
    }

    let min_subs = teams
        .iter()
        .map(Team::substitute_count)
        .min()
        .unwrap_or(0);
    let candidates: Vec<usize> = teams
        .iter()
        .enumerate()
        .filter(|(_, team)| team.substitute_count() == min_subs)
        .map(|(index, _)| index)
        .collect();
    let team = *candidates.choose(rng).unwrap();
    Placement::Substitute { team }
}

/// Rebuild every placement in a session from scratch.
///
/// Phase 1 shuffles the keeper-desiring members and fills each team's keeper
/// slot with one of them; keepers beyond `team_count` are demoted into the
/// field pool. Phase 2 shuffles the field pool and places it member by
/// member under the identical least-loaded rule used for live joins.
///
/// The roster set is never altered, only placements. The result is
/// fairness-bounded random, not a uniform permutation of all layouts.
pub fn reshuffle_layout<R: Rng>(session: &mut Session, rng: &mut R) {
    let mut members: Vec<Member> = session.roster.values().cloned().collect();
    // Map iteration order is arbitrary; fix a base order so seeded runs reproduce
    members.sort_by(|a, b| a.id.cmp(&b.id));

    session.clear_placements();

    let (mut keepers, mut field_pool): (Vec<Member>, Vec<Member>) =
        members.into_iter().partition(|m| m.role == Role::Keeper);

    keepers.shuffle(rng);
    let overflow = keepers.split_off(keepers.len().min(session.team_count));
    for (team, keeper) in keepers.into_iter().enumerate() {
        session.place(keeper, Placement::Keeper { team });
    }

    field_pool.extend(overflow);
    field_pool.shuffle(rng);
    for member in field_pool {
        let placement = pick_field_placement(&session.teams, session.capacity_per_team, rng);
        session.place(member, placement);
    }
}
