//! The assignment engine
//!
//! Owns chat-scoped roster sessions, places joining members onto balanced
//! teams under capacity and uniqueness constraints, and runs privileged
//! full reshuffles. Mutations within one scope are serialized on the
//! scope's session lock and held across the store save and display upsert
//! attempts; independent scopes run in parallel. The in-memory session is
//! authoritative: persistence and display sync are best-effort mirrors
//! whose failures are logged, never surfaced or rolled back.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, OwnedMutexGuard, RwLock};

use super::authorization::Authorization;
use super::placement;
use crate::display::{render_state, DisplaySynchronizer, DisplayTransport};
use crate::error::{EngineError, Result};
use crate::models::{Member, Placement, RenderedState, Role, Session};
use crate::store::SessionStore;

/// Events emitted by the engine for the product layer's live UI
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A fresh session replaced whatever the scope had before
    SessionCreated { scope_id: String, team_count: usize },
    /// A member joined and was placed
    MemberRegistered {
        scope_id: String,
        member_id: String,
        placement: Placement,
    },
    /// All placements in the scope were rebuilt
    Reshuffled { scope_id: String, revision: u64 },
    /// The scope's session was torn down
    SessionClosed { scope_id: String },
}

/// One scope's session plus its exclusive-access lock and view cache.
///
/// `state` serializes mutations; `view` holds the last committed render so
/// status queries never contend with in-flight mutations. `retired` is set
/// under the state lock when the slot is replaced or torn down, so a caller
/// that was queued on the lock re-resolves the scope instead of mutating
/// (and persisting) a discarded session.
struct SessionSlot {
    state: Arc<Mutex<Session>>,
    view: RwLock<RenderedState>,
    retired: AtomicBool,
}

impl SessionSlot {
    fn new(session: Session) -> Self {
        let view = render_state(&session);
        Self {
            state: Arc::new(Mutex::new(session)),
            view: RwLock::new(view),
            retired: AtomicBool::new(false),
        }
    }
}

/// Stateful engine managing one session per conversation scope.
pub struct AssignmentEngine {
    slots: RwLock<HashMap<String, Arc<SessionSlot>>>,
    store: Arc<dyn SessionStore>,
    auth: Arc<dyn Authorization>,
    sync: DisplaySynchronizer,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl AssignmentEngine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        auth: Arc<dyn Authorization>,
        transport: Arc<dyn DisplayTransport>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            slots: RwLock::new(HashMap::new()),
            store,
            auth,
            sync: DisplaySynchronizer::new(transport),
            event_tx,
        }
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Replace any prior session for the scope with a fresh empty one.
    ///
    /// Requires organizer privilege; an authorization backend error fails
    /// closed as `Unauthorized`.
    pub async fn create_session(
        &self,
        scope_id: &str,
        team_count: usize,
        capacity_per_team: usize,
        requester_id: &str,
    ) -> Result<RenderedState> {
        if !(2..=4).contains(&team_count) {
            return Err(EngineError::InvalidConfig(format!(
                "team_count must be 2-4, got {}",
                team_count
            )));
        }
        if capacity_per_team == 0 {
            return Err(EngineError::InvalidConfig(
                "capacity_per_team must be at least 1".to_string(),
            ));
        }
        self.require_organizer(scope_id, requester_id).await?;

        let session = Session::new(scope_id, team_count, capacity_per_team);
        let slot = Arc::new(SessionSlot::new(session));

        {
            let mut slots = self.slots.write().await;
            // Drain and retire any prior slot before the replacement becomes
            // visible, so an in-flight mutation cannot persist the discarded
            // session after the fresh one is saved.
            let drained = match slots.get(scope_id) {
                Some(prior) => {
                    let guard = Arc::clone(&prior.state).lock_owned().await;
                    prior.retired.store(true, Ordering::Release);
                    Some(guard)
                }
                None => None,
            };
            slots.insert(scope_id.to_string(), Arc::clone(&slot));
            drop(drained);
        }

        let guard = slot.state.lock().await;
        self.persist(&guard).await;
        let view = render_state(&guard);
        drop(guard);

        tracing::info!(scope_id, team_count, capacity_per_team, "session created");
        let _ = self.event_tx.send(EngineEvent::SessionCreated {
            scope_id: scope_id.to_string(),
            team_count,
        });

        Ok(view)
    }

    /// Register a member and place them on a team.
    ///
    /// Keepers go to a uniformly random keeper-less team, or the join is
    /// rejected with `RoleUnavailable` when no slot is open (no silent
    /// demotion to field or substitute). Field players go to the least
    /// loaded team with a random tie-break, overflowing to substitutes once
    /// every team is at capacity. The resolved placement is returned
    /// regardless of persistence or display-sync outcome.
    pub async fn register_member(
        &self,
        scope_id: &str,
        member_id: &str,
        display_name: &str,
        role: Role,
    ) -> Result<Placement> {
        if display_name.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "display_name must be non-empty".to_string(),
            ));
        }

        let (slot, mut session) = self.lock_current(scope_id).await?;

        if session.contains(member_id) {
            return Err(EngineError::DuplicateRegistration(member_id.to_string()));
        }

        let mut rng = StdRng::from_entropy();
        let placement = match role {
            Role::Keeper => match placement::pick_keeper_team(&session.teams, &mut rng) {
                Some(team) => Placement::Keeper { team },
                None => return Err(EngineError::RoleUnavailable),
            },
            Role::Field => placement::pick_field_placement(
                &session.teams,
                session.capacity_per_team,
                &mut rng,
            ),
        };

        session.place(Member::new(member_id, display_name, role), placement);
        session.bump_revision();

        self.commit(&slot, &mut session).await;
        drop(session);

        let _ = self.event_tx.send(EngineEvent::MemberRegistered {
            scope_id: scope_id.to_string(),
            member_id: member_id.to_string(),
            placement,
        });

        Ok(placement)
    }

    /// Rebuild every placement in the scope from scratch.
    ///
    /// Requires organizer privilege (fail closed). The roster set is
    /// untouched; only placements change.
    pub async fn reshuffle(&self, scope_id: &str, requester_id: &str) -> Result<RenderedState> {
        self.require_organizer(scope_id, requester_id).await?;

        let (slot, mut session) = self.lock_current(scope_id).await?;

        let mut rng = StdRng::from_entropy();
        placement::reshuffle_layout(&mut session, &mut rng);
        session.bump_revision();

        let view = self.commit(&slot, &mut session).await;
        let revision = view.revision;
        drop(session);

        let _ = self.event_tx.send(EngineEvent::Reshuffled {
            scope_id: scope_id.to_string(),
            revision,
        });

        Ok(view)
    }

    /// Last committed render of the scope's session.
    ///
    /// Reads the view cache without touching the session lock, so it may
    /// trail a mutation that is mid-commit (accepted weak consistency for a
    /// live-updating scoreboard).
    pub async fn rendered_state(&self, scope_id: &str) -> Result<RenderedState> {
        let slot = self.slot(scope_id).await?;
        let view = slot.view.read().await;
        Ok(view.clone())
    }

    /// Clone of the scope's full session state, read under the session lock.
    pub async fn session(&self, scope_id: &str) -> Result<Session> {
        let (_slot, session) = self.lock_current(scope_id).await?;
        Ok(session.clone())
    }

    /// Tear down the scope's session. Requires organizer privilege.
    pub async fn close_session(&self, scope_id: &str, requester_id: &str) -> Result<()> {
        self.require_organizer(scope_id, requester_id).await?;

        let mut slots = self.slots.write().await;
        let Some(slot) = slots.remove(scope_id) else {
            return Err(EngineError::SessionNotFound(scope_id.to_string()));
        };

        // Drain in-flight mutations before deleting the store row, so a
        // trailing commit cannot re-save the torn-down session. The slot map
        // stays locked until the delete lands, so a retrying caller cannot
        // restore the row mid-teardown.
        let drained = Arc::clone(&slot.state).lock_owned().await;
        slot.retired.store(true, Ordering::Release);

        if let Err(e) = self.store.delete(scope_id).await {
            tracing::warn!(scope_id, error = %e, "failed to delete persisted session");
        }
        drop(drained);
        drop(slots);

        tracing::info!(scope_id, "session closed");
        let _ = self.event_tx.send(EngineEvent::SessionClosed {
            scope_id: scope_id.to_string(),
        });

        Ok(())
    }

    /// Periodically snapshot every live session to the given store, purely
    /// for disaster recovery. Failures are logged and never propagate.
    pub fn spawn_backup(
        self: &Arc<Self>,
        store: Arc<dyn SessionStore>,
        period: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;

                let slots: Vec<Arc<SessionSlot>> = {
                    let slots = engine.slots.read().await;
                    slots.values().cloned().collect()
                };

                for slot in slots {
                    let session = {
                        let guard = slot.state.lock().await;
                        if slot.retired.load(Ordering::Acquire) {
                            continue;
                        }
                        guard.clone()
                    };
                    if let Err(e) = store.save(&session).await {
                        tracing::warn!(
                            scope_id = %session.scope_id,
                            error = %e,
                            "backup snapshot failed"
                        );
                    }
                }
            }
        })
    }

    /// Resolve the slot for a scope, falling back to the store so durable
    /// deployments recover sessions across restarts.
    async fn slot(&self, scope_id: &str) -> Result<Arc<SessionSlot>> {
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(scope_id) {
                return Ok(Arc::clone(slot));
            }
        }

        let restored = match self.store.load(scope_id).await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(scope_id, error = %e, "session store load failed");
                None
            }
        };
        let Some(session) = restored else {
            return Err(EngineError::SessionNotFound(scope_id.to_string()));
        };

        let mut slots = self.slots.write().await;
        // Double-check after acquiring the write lock
        if let Some(slot) = slots.get(scope_id) {
            return Ok(Arc::clone(slot));
        }

        tracing::info!(scope_id, revision = session.revision, "session restored from store");
        let slot = Arc::new(SessionSlot::new(session));
        slots.insert(scope_id.to_string(), Arc::clone(&slot));
        Ok(slot)
    }

    /// Resolve the scope's slot and acquire its session lock, re-resolving
    /// when the slot was retired by a replacement or teardown while waiting.
    async fn lock_current(
        &self,
        scope_id: &str,
    ) -> Result<(Arc<SessionSlot>, OwnedMutexGuard<Session>)> {
        loop {
            let slot = self.slot(scope_id).await?;
            let session = Arc::clone(&slot.state).lock_owned().await;
            if !slot.retired.load(Ordering::Acquire) {
                return Ok((slot, session));
            }
        }
    }

    async fn require_organizer(&self, scope_id: &str, principal_id: &str) -> Result<()> {
        match self.auth.is_organizer(scope_id, principal_id).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(EngineError::Unauthorized(format!(
                "{} does not hold organizer rights in scope {}",
                principal_id, scope_id
            ))),
            // Fail closed on a capability error
            Err(e) => {
                tracing::warn!(scope_id, principal_id, error = %e, "authorization check failed");
                Err(EngineError::Unauthorized(
                    "authorization capability unavailable".to_string(),
                ))
            }
        }
    }

    /// Mirror a mutated session to the store and display surface, then
    /// publish the new render to the view cache and return it. Runs while
    /// the session lock is held so the rendered view is consistent with
    /// persisted state as of lock release; both mirrors are best-effort.
    async fn commit(&self, slot: &SessionSlot, session: &mut Session) -> RenderedState {
        self.persist(session).await;

        if let Err(e) = self.sync.upsert(session).await {
            tracing::warn!(
                scope_id = %session.scope_id,
                error = %e,
                "display sync failed, state advances regardless"
            );
        }

        let rendered = render_state(session);
        let mut view = slot.view.write().await;
        *view = rendered.clone();
        rendered
    }

    async fn persist(&self, session: &Session) {
        if let Err(e) = self.store.save(session).await {
            tracing::warn!(
                scope_id = %session.scope_id,
                error = %e,
                "session persistence failed, in-memory state stands"
            );
        }
    }
}
