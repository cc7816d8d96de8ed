//! Display synchronization for session state
//!
//! Rendering is a pure function of session state; the synchronizer mirrors
//! the rendered text to an external surface and falls back to creating a
//! replacement surface when the old one is reported missing or uneditable.
//! The session itself stays authoritative: callers treat sync as best-effort.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{RenderedState, Session};

#[derive(Error, Debug)]
pub enum DisplayError {
    /// The referenced surface is gone or can no longer be edited
    #[error("Display surface missing or uneditable")]
    SurfaceMissing,

    #[error("Display transport error: {0}")]
    Transport(String),
}

/// External display surface transport.
///
/// `update` failing signals that the surface referenced by the handle is
/// missing or uneditable, which triggers the `create` fallback.
#[async_trait]
pub trait DisplayTransport: Send + Sync {
    async fn create(&self, scope_id: &str, content: &str) -> Result<String, DisplayError>;
    async fn update(&self, handle: &str, content: &str) -> Result<(), DisplayError>;
}

/// Render a session as display text. Same state yields the same text,
/// independent of which operation triggered the render.
pub fn render(session: &Session) -> String {
    let name_of = |id: &String| -> String {
        session
            .roster
            .get(id)
            .map(|m| m.display_name.clone())
            .unwrap_or_else(|| id.clone())
    };

    let mut text = String::new();
    let _ = writeln!(
        text,
        "Roster: {} registered, {} teams of {} field slots",
        session.roster.len(),
        session.team_count,
        session.capacity_per_team
    );

    for (index, team) in session.teams.iter().enumerate() {
        let _ = writeln!(text);
        let _ = writeln!(
            text,
            "Team {} ({}/{} field)",
            index + 1,
            team.field_count(),
            session.capacity_per_team
        );

        match &team.keeper {
            Some(id) => {
                let _ = writeln!(text, "  GK: {}", name_of(id));
            }
            None => {
                let _ = writeln!(text, "  GK: -");
            }
        }

        for (slot, id) in team.field.iter().enumerate() {
            let _ = writeln!(text, "  {}. {}", slot + 1, name_of(id));
        }

        if !team.substitutes.is_empty() {
            let subs: Vec<String> = team.substitutes.iter().map(&name_of).collect();
            let _ = writeln!(text, "  Subs: {}", subs.join(", "));
        }
    }

    text
}

/// Render a session into a tagged view for callers and the view cache.
pub fn render_state(session: &Session) -> RenderedState {
    RenderedState {
        scope_id: session.scope_id.clone(),
        revision: session.revision,
        text: render(session),
    }
}

/// Mirrors rendered session state onto an external display surface.
#[derive(Clone)]
pub struct DisplaySynchronizer {
    transport: Arc<dyn DisplayTransport>,
}

impl DisplaySynchronizer {
    pub fn new(transport: Arc<dyn DisplayTransport>) -> Self {
        Self { transport }
    }

    /// Render the session and push it to the display surface.
    ///
    /// If the session already references a surface, that surface is updated
    /// in place. When the transport reports it missing or uneditable, a new
    /// surface is created and its handle is stored back on the session; the
    /// old handle is discarded and never reused.
    pub async fn upsert(&self, session: &mut Session) -> Result<(), DisplayError> {
        let content = render(session);

        if let Some(handle) = session.display_handle.clone() {
            match self.transport.update(&handle, &content).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        scope_id = %session.scope_id,
                        handle = %handle,
                        error = %e,
                        "display surface lost, creating replacement"
                    );
                }
            }
        }

        let handle = self.transport.create(&session.scope_id, &content).await?;
        session.display_handle = Some(handle);
        Ok(())
    }
}

/// In-process display transport keeping surfaces in a map.
///
/// Useful for tests and embedded deployments; surfaces can be dropped to
/// exercise the missing-surface fallback.
#[derive(Default)]
pub struct MemoryTransport {
    surfaces: RwLock<HashMap<String, String>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current content of a surface, if it exists
    pub async fn content(&self, handle: &str) -> Option<String> {
        let surfaces = self.surfaces.read().await;
        surfaces.get(handle).cloned()
    }

    /// Drop a surface, simulating external deletion
    pub async fn drop_surface(&self, handle: &str) {
        let mut surfaces = self.surfaces.write().await;
        surfaces.remove(handle);
    }

    pub async fn surface_count(&self) -> usize {
        let surfaces = self.surfaces.read().await;
        surfaces.len()
    }
}

#[async_trait]
impl DisplayTransport for MemoryTransport {
    async fn create(&self, _scope_id: &str, content: &str) -> Result<String, DisplayError> {
        let handle = Uuid::new_v4().to_string();
        let mut surfaces = self.surfaces.write().await;
        surfaces.insert(handle.clone(), content.to_string());
        Ok(handle)
    }

    async fn update(&self, handle: &str, content: &str) -> Result<(), DisplayError> {
        let mut surfaces = self.surfaces.write().await;
        match surfaces.get_mut(handle) {
            Some(existing) => {
                *existing = content.to_string();
                Ok(())
            }
            None => Err(DisplayError::SurfaceMissing),
        }
    }
}
