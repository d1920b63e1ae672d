//! Session Manager
//!
//! Owns all per-candidate interview state. Sessions progress in
//! parallel; within one session turns are strictly serialized, and a
//! new turn supersedes (cancels) one still in flight. Idle sessions are
//! evicted by a background sweeper.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::scenario::Scenario;
use crate::models::session::{SessionEvent, SessionState};
use crate::utils::error::{AppError, AppResult};

/// Capacity of the per-session event bus. Slow SSE consumers lag and
/// drop rather than block the turn pipeline.
const EVENT_BUS_CAPACITY: usize = 64;

/// One live interview session and its concurrency primitives.
pub struct SessionHandle {
    pub id: String,
    /// All interview state; mutated only under this lock
    pub state: Mutex<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    /// Serializes turn execution within the session
    pub turn_lock: Mutex<()>,
    /// Token of the turn currently in flight
    current_turn: StdMutex<CancellationToken>,
    /// Fired when the session closes; child turns inherit it
    closed: CancellationToken,
    last_activity: StdMutex<Instant>,
    /// Round-robin cursor for backchannel selection
    pub backchannel_counter: AtomicU64,
    last_backchannel: StdMutex<Option<Instant>>,
}

impl SessionHandle {
    fn new(state: SessionState) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            id: state.session_id.clone(),
            state: Mutex::new(state),
            events,
            turn_lock: Mutex::new(()),
            current_turn: StdMutex::new(CancellationToken::new()),
            closed: CancellationToken::new(),
            last_activity: StdMutex::new(Instant::now()),
            backchannel_counter: AtomicU64::new(0),
            last_backchannel: StdMutex::new(None),
        }
    }

    /// Cancel any turn in flight and install a fresh token for the next
    /// one (newest-wins: the candidate spoke again).
    pub fn supersede(&self) -> CancellationToken {
        let token = self.closed.child_token();
        let previous = {
            let mut current = self.current_turn.lock().expect("turn token lock poisoned");
            std::mem::replace(&mut *current, token.clone())
        };
        previous.cancel();
        token
    }

    /// Publish an event to subscribers. Send errors only mean nobody is
    /// listening right now.
    pub fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    /// Subscribe to this session's events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Note activity for idle accounting.
    pub fn touch(&self) {
        *self.last_activity.lock().expect("activity lock poisoned") = Instant::now();
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.duration_since(*self.last_activity.lock().expect("activity lock poisoned"))
    }

    /// Whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    fn close(&self) {
        self.closed.cancel();
        self.emit(SessionEvent::SessionEnded {
            session_id: self.id.clone(),
        });
    }

    /// Timestamp of the last emitted backchannel, for rate limiting.
    pub fn last_backchannel(&self) -> Option<Instant> {
        *self
            .last_backchannel
            .lock()
            .expect("backchannel lock poisoned")
    }

    /// Record a backchannel emission and advance the round-robin cursor.
    pub fn note_backchannel(&self, at: Instant) {
        *self
            .last_backchannel
            .lock()
            .expect("backchannel lock poisoned") = Some(at);
        self.backchannel_counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// In-memory registry of live sessions.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
    idle_timeout: Duration,
}

impl SessionManager {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Start a session for a candidate. A candidate can hold only one
    /// live session per role at a time.
    pub fn begin(
        &self,
        candidate_id: &str,
        role_profile_id: &str,
        scenario: &Scenario,
    ) -> AppResult<Arc<SessionHandle>> {
        let mut sessions = self.sessions.write().expect("session map lock poisoned");

        let duplicate = sessions.values().any(|handle| {
            if handle.is_closed() {
                return false;
            }
            // Identity fields never change after creation, so peeking
            // without the async state lock is safe here.
            match handle.state.try_lock() {
                Ok(state) => {
                    state.candidate_id == candidate_id
                        && state.role_profile_id == role_profile_id
                        && !state.is_ended()
                }
                Err(_) => false,
            }
        });
        if duplicate {
            return Err(AppError::conflict(format!(
                "candidate {candidate_id} already has a live {role_profile_id} session"
            )));
        }

        let session_id = Uuid::new_v4().to_string();
        let state = SessionState::new(
            session_id.clone(),
            candidate_id,
            &scenario.id,
            role_profile_id,
            &scenario.start_id,
        );
        let handle = Arc::new(SessionHandle::new(state));
        sessions.insert(session_id.clone(), handle.clone());

        info!(session_id = %session_id, candidate_id, role_profile_id, scenario_id = %scenario.id, "session started");
        Ok(handle)
    }

    /// Fetch a live session.
    pub fn get(&self, session_id: &str) -> AppResult<Arc<SessionHandle>> {
        self.sessions
            .read()
            .expect("session map lock poisoned")
            .get(session_id)
            .filter(|h| !h.is_closed())
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("session {session_id}")))
    }

    /// Close and remove a session.
    pub fn end(&self, session_id: &str) -> AppResult<()> {
        let handle = self
            .sessions
            .write()
            .expect("session map lock poisoned")
            .remove(session_id)
            .ok_or_else(|| AppError::not_found(format!("session {session_id}")))?;

        handle.supersede().cancel();
        handle.close();
        info!(session_id, "session ended");
        Ok(())
    }

    /// Number of live sessions.
    pub fn active_count(&self) -> usize {
        self.sessions
            .read()
            .expect("session map lock poisoned")
            .values()
            .filter(|h| !h.is_closed())
            .count()
    }

    /// Evict sessions idle past the timeout. Returns evicted ids.
    pub fn sweep_idle(&self) -> Vec<String> {
        let now = Instant::now();
        let expired: Vec<String> = {
            let sessions = self.sessions.read().expect("session map lock poisoned");
            sessions
                .iter()
                .filter(|(_, h)| h.idle_for(now) >= self.idle_timeout)
                .map(|(id, _)| id.clone())
                .collect()
        };

        for id in &expired {
            if let Some(handle) = self
                .sessions
                .write()
                .expect("session map lock poisoned")
                .remove(id)
            {
                handle.supersede().cancel();
                handle.close();
                debug!(session_id = %id, "session evicted after idle timeout");
            }
        }
        expired
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }
}

/// Run the idle sweeper until the process stops.
pub fn spawn_idle_sweeper(manager: Arc<SessionManager>) {
    let period = manager.idle_timeout().min(Duration::from_secs(60)).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tick.tick().await;
            let evicted = manager.sweep_idle();
            if !evicted.is_empty() {
                info!(count = evicted.len(), "evicted idle sessions");
            }
        }
    });
}
