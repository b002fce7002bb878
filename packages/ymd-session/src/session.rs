use std::{
	collections::HashMap,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
};

use serde_json::Value;
use tokio::{
	sync::{mpsc, oneshot, watch},
	task::{self, JoinError, JoinSet},
	time::{Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
	CorrelationId, Error, InvocationHandler, InvocationOutcome, Result, SessionConfig,
	SessionEvent,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
	Connecting,
	Open,
	/// No new invocations; those already dispatched still deliver.
	Draining,
	Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CloseReason {
	Drained,
	Disconnected,
	AckTimeout,
}
impl CloseReason {
	fn as_str(self) -> &'static str {
		match self {
			Self::Drained => "drained",
			Self::Disconnected => "disconnected",
			Self::AckTimeout => "ack_timeout",
		}
	}
}

pub(crate) enum Command {
	Invoke { correlation_id: CorrelationId, payload: Value, reply: oneshot::Sender<Result<()>> },
	Cancel { correlation_id: CorrelationId },
	Ack { seq: u64 },
	Close,
}

/// Cheap, cloneable access to a running session.
#[derive(Clone, Debug)]
pub struct SessionHandle {
	id: Arc<str>,
	commands: mpsc::Sender<Command>,
	state: watch::Receiver<SessionState>,
	transport: CancellationToken,
}
impl SessionHandle {
	pub fn id(&self) -> &str {
		&self.id
	}

	pub fn state(&self) -> SessionState {
		*self.state.borrow()
	}

	/// Queues an invocation. Returns once the session has accepted or refused it; the result
	/// arrives later on the event stream.
	pub async fn invoke(&self, correlation_id: CorrelationId, payload: Value) -> Result<()> {
		let (reply, accepted) = oneshot::channel();

		self.send(Command::Invoke { correlation_id, payload, reply }).await?;

		accepted.await.map_err(|_| self.closed_error())?
	}

	/// Cancels one in-flight invocation. Its result, if any, is discarded.
	pub async fn cancel(&self, correlation_id: CorrelationId) -> Result<()> {
		self.send(Command::Cancel { correlation_id }).await
	}

	pub async fn ack(&self, seq: u64) -> Result<()> {
		self.send(Command::Ack { seq }).await
	}

	/// Graceful close: the session drains and then closes.
	pub async fn close(&self) -> Result<()> {
		self.send(Command::Close).await
	}

	/// Abrupt close: pending invocations are cancelled and nothing more is delivered.
	pub fn disconnect(&self) {
		self.transport.cancel();
	}

	/// Fires when the transport goes away. The stream side holds a drop guard on it.
	pub fn transport_token(&self) -> CancellationToken {
		self.transport.clone()
	}

	pub async fn closed(&self) {
		let mut state = self.state.clone();

		let _ = state.wait_for(|state| *state == SessionState::Closed).await;
	}

	async fn send(&self, command: Command) -> Result<()> {
		self.commands.send(command).await.map_err(|_| self.closed_error())
	}

	fn closed_error(&self) -> Error {
		Error::SessionClosed { session_id: self.id.to_string() }
	}
}

struct InFlight {
	seq: u64,
	task_id: task::Id,
	cancel: CancellationToken,
}

/// Counts a spawned invocation until its future completes or is dropped.
struct OutstandingGuard(Arc<AtomicUsize>);
impl OutstandingGuard {
	fn new(counter: Arc<AtomicUsize>) -> Self {
		counter.fetch_add(1, Ordering::SeqCst);

		Self(counter)
	}
}
impl Drop for OutstandingGuard {
	fn drop(&mut self) {
		self.0.fetch_sub(1, Ordering::SeqCst);
	}
}

type Finished = (CorrelationId, u64, InvocationOutcome);

pub(crate) struct SessionActor {
	id: Arc<str>,
	config: SessionConfig,
	handler: Arc<dyn InvocationHandler>,
	commands: mpsc::Receiver<Command>,
	outbound: mpsc::Sender<SessionEvent>,
	state: watch::Sender<SessionState>,
	transport: CancellationToken,
	invocations: CancellationToken,
	tasks: JoinSet<Finished>,
	in_flight: HashMap<CorrelationId, InFlight>,
	outstanding: Arc<AtomicUsize>,
	next_seq: u64,
	keepalive_seq: u64,
	pending_ack: Option<(u64, Instant)>,
	last_outbound: Instant,
}
impl SessionActor {
	pub(crate) fn new(
		id: String,
		config: SessionConfig,
		handler: Arc<dyn InvocationHandler>,
		outstanding: Arc<AtomicUsize>,
	) -> (Self, SessionHandle, mpsc::Receiver<SessionEvent>) {
		let id: Arc<str> = Arc::from(id);
		let (command_tx, commands) = mpsc::channel(config.mailbox_capacity);
		let (outbound, events) = mpsc::channel(config.outbound_capacity);
		let (state, state_rx) = watch::channel(SessionState::Connecting);
		let transport = CancellationToken::new();
		let handle = SessionHandle {
			id: id.clone(),
			commands: command_tx,
			state: state_rx,
			transport: transport.clone(),
		};
		let actor = Self {
			id,
			config,
			handler,
			commands,
			outbound,
			state,
			transport,
			invocations: CancellationToken::new(),
			tasks: JoinSet::new(),
			in_flight: HashMap::new(),
			outstanding,
			next_seq: 0,
			keepalive_seq: 0,
			pending_ack: None,
			last_outbound: Instant::now(),
		};

		(actor, handle, events)
	}

	pub(crate) async fn run(mut self) {
		let interval = self.config.keepalive_interval;
		let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);

		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

		self.set_state(SessionState::Open);

		tracing::info!(session_id = %self.id, "Session opened.");

		let reason = loop {
			if self.current_state() == SessionState::Draining && self.tasks.is_empty() {
				break CloseReason::Drained;
			}

			let ack_deadline = self.pending_ack.map(|(_, deadline)| deadline);

			tokio::select! {
				biased;
				_ = self.transport.cancelled() => break CloseReason::Disconnected,
				_ = tokio::time::sleep_until(ack_deadline.unwrap_or_else(Instant::now)),
					if ack_deadline.is_some() => break CloseReason::AckTimeout,
				Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() =>
					if !self.finish(joined).await {
						break CloseReason::Disconnected;
					},
				command = self.commands.recv() => match command {
					Some(command) => self.on_command(command),
					None => break CloseReason::Disconnected,
				},
				_ = ticker.tick() =>
					if !self.keepalive().await {
						break CloseReason::Disconnected;
					},
			}
		};

		self.shutdown(reason).await;
	}

	fn on_command(&mut self, command: Command) {
		match command {
			Command::Invoke { correlation_id, payload, reply } => {
				self.pending_ack = None;

				let _ = reply.send(self.accept(correlation_id, payload));
			},
			Command::Cancel { correlation_id } =>
				if let Some(entry) = self.in_flight.remove(&correlation_id) {
					entry.cancel.cancel();

					tracing::debug!(
						session_id = %self.id,
						%correlation_id,
						"Invocation cancelled by client."
					);
				},
			Command::Ack { seq } =>
				if let Some((pending, _)) = self.pending_ack
					&& seq >= pending
				{
					self.pending_ack = None;
				},
			Command::Close =>
				if self.current_state() == SessionState::Open {
					self.set_state(SessionState::Draining);

					tracing::info!(
						session_id = %self.id,
						in_flight = self.in_flight.len(),
						"Session draining."
					);
				},
		}
	}

	fn accept(&mut self, correlation_id: CorrelationId, payload: Value) -> Result<()> {
		if self.current_state() != SessionState::Open {
			return Err(Error::SessionClosed { session_id: self.id.to_string() });
		}
		if self.in_flight.contains_key(&correlation_id) {
			return Err(Error::DuplicateCorrelationId { correlation_id });
		}
		if self.tasks.len() >= self.config.max_in_flight {
			return Err(Error::Overloaded {
				session_id: self.id.to_string(),
				limit: self.config.max_in_flight,
			});
		}

		let seq = self.next_seq;
		let cancel = self.invocations.child_token();
		let handler = self.handler.clone();
		let guard = OutstandingGuard::new(self.outstanding.clone());
		let id = correlation_id.clone();
		let token = cancel.clone();
		let abort = self.tasks.spawn(async move {
			let _guard = guard;
			let outcome = handler.handle(&id, payload, token).await;

			(id, seq, outcome)
		});

		self.next_seq += 1;
		self.in_flight.insert(correlation_id.clone(), InFlight { seq, task_id: abort.id(), cancel });

		tracing::debug!(session_id = %self.id, %correlation_id, "Invocation dispatched.");

		Ok(())
	}

	/// Delivers a finished invocation. Returns `false` when the transport is gone.
	async fn finish(&mut self, joined: std::result::Result<Finished, JoinError>) -> bool {
		let (correlation_id, seq, outcome) = match joined {
			Ok(finished) => finished,
			Err(err) => {
				let task_id = err.id();

				self.in_flight.retain(|_, entry| entry.task_id != task_id);

				if err.is_panic() {
					tracing::error!(session_id = %self.id, "Invocation task panicked.");
				}

				return true;
			},
		};

		match self.in_flight.get(&correlation_id) {
			Some(entry) if entry.seq == seq => {
				self.in_flight.remove(&correlation_id);
			},
			_ => return true,
		}

		let status = match &outcome {
			InvocationOutcome::Completed(_) => "completed",
			InvocationOutcome::Failed(_) => "failed",
		};

		tracing::debug!(session_id = %self.id, %correlation_id, status, "Invocation finished.");

		self.emit(SessionEvent::Message(outcome.into_message())).await
	}

	/// Probes an idle channel. Returns `false` when the transport is gone.
	async fn keepalive(&mut self) -> bool {
		if self.pending_ack.is_some() || self.last_outbound.elapsed() < self.config.keepalive_interval
		{
			return true;
		}

		self.keepalive_seq += 1;

		let seq = self.keepalive_seq;

		self.pending_ack = Some((seq, Instant::now() + self.config.ack_timeout));

		tracing::trace!(session_id = %self.id, seq, "Keepalive sent.");

		self.emit(SessionEvent::Keepalive { seq }).await
	}

	async fn emit(&mut self, event: SessionEvent) -> bool {
		let sent = tokio::select! {
			_ = self.transport.cancelled() => false,
			sent = self.outbound.send(event) => sent.is_ok(),
		};

		if sent {
			self.last_outbound = Instant::now();
		}

		sent
	}

	async fn shutdown(mut self, reason: CloseReason) {
		let cancelled = self.in_flight.len();

		self.transport.cancel();
		self.invocations.cancel();
		self.in_flight.clear();
		self.tasks.shutdown().await;
		self.set_state(SessionState::Closed);

		tracing::info!(session_id = %self.id, reason = reason.as_str(), cancelled, "Session closed.");
	}

	fn current_state(&self) -> SessionState {
		*self.state.borrow()
	}

	fn set_state(&self, state: SessionState) {
		self.state.send_replace(state);
	}
}
