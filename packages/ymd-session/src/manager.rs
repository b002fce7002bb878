use std::{
	collections::HashMap,
	sync::{
		Arc, Mutex, PoisonError,
		atomic::{AtomicUsize, Ordering},
	},
};

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
	Error, InvocationHandler, Result, SessionConfig, SessionEvent, SessionHandle,
	session::SessionActor,
};

type Sessions = Arc<Mutex<HashMap<String, SessionHandle>>>;

/// Owns every live session. A session is removed once its actor exits.
pub struct SessionManager {
	config: SessionConfig,
	handler: Arc<dyn InvocationHandler>,
	sessions: Sessions,
	outstanding: Arc<AtomicUsize>,
}
impl SessionManager {
	pub fn new(config: SessionConfig, handler: Arc<dyn InvocationHandler>) -> Self {
		Self {
			config,
			handler,
			sessions: Arc::new(Mutex::new(HashMap::new())),
			outstanding: Arc::new(AtomicUsize::new(0)),
		}
	}

	/// Starts a session actor and returns its handle and event stream.
	pub fn open(&self) -> (SessionHandle, mpsc::Receiver<SessionEvent>) {
		let id = Uuid::new_v4().simple().to_string();
		let (actor, handle, events) = SessionActor::new(
			id.clone(),
			self.config.clone(),
			self.handler.clone(),
			self.outstanding.clone(),
		);
		let sessions = self.sessions.clone();

		lock(&self.sessions).insert(id.clone(), handle.clone());

		tokio::spawn(async move {
			actor.run().await;

			lock(&sessions).remove(&id);
		});

		(handle, events)
	}

	pub fn get(&self, session_id: &str) -> Result<SessionHandle> {
		lock(&self.sessions)
			.get(session_id)
			.cloned()
			.ok_or_else(|| Error::SessionNotFound { session_id: session_id.to_string() })
	}

	pub fn len(&self) -> usize {
		lock(&self.sessions).len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Invocation tasks spawned and not yet finished or dropped, across all sessions.
	pub fn outstanding_invocations(&self) -> usize {
		self.outstanding.load(Ordering::SeqCst)
	}

	pub fn disconnect_all(&self) {
		for handle in lock(&self.sessions).values() {
			handle.disconnect();
		}
	}
}

fn lock(sessions: &Sessions) -> std::sync::MutexGuard<'_, HashMap<String, SessionHandle>> {
	sessions.lock().unwrap_or_else(PoisonError::into_inner)
}
