//! Debounced recompression scheduling.
//!
//! Every (session, format) pair has its own slot that moves Idle → Armed →
//! (fires) → Idle. A parameter change arms the slot, or pushes its deadline
//! back if it is already armed, so a burst of changes produces one request
//! carrying the last parameters. Firing allocates the pair's next generation
//! and hands the request to the dispatcher without waiting for it.
//!
//! [`DebounceTable`] holds the slots and takes the current time as an
//! argument, so it can be driven by any clock. [`RecompressionScheduler`]
//! runs it on a tokio task against `tokio::time`.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

use crate::core::{CompressionRequest, EncoderParameters, Generation, SessionId};
use crate::utils::{EngineError, EngineResult, FormatId};

pub type PairKey = (SessionId, FormatId);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Quiet period after the last change before the request fires
    pub quiescence: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            quiescence: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SlotState {
    Idle,
    Armed {
        deadline: Instant,
        parameters: EncoderParameters,
    },
}

/// What the scheduler knows about one format of a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairStatus {
    pub format: FormatId,
    /// A change is waiting for its quiet period to end
    pub armed: bool,
    /// Last generation handed to the dispatcher
    pub generation: Generation,
}

#[derive(Debug)]
struct Slot {
    state: SlotState,
    /// Last generation handed out for the pair
    generation: Generation,
}

impl Slot {
    fn new() -> Self {
        Self {
            state: SlotState::Idle,
            generation: Generation::default(),
        }
    }

    fn issue(&mut self, session: SessionId, parameters: EncoderParameters) -> CompressionRequest {
        self.state = SlotState::Idle;
        self.generation = self.generation.next();
        CompressionRequest {
            session,
            generation: self.generation,
            parameters,
        }
    }
}

/// Debounce slots for every (session, format) pair.
#[derive(Debug)]
pub struct DebounceTable {
    window: Duration,
    slots: HashMap<PairKey, Slot>,
}

impl DebounceTable {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            slots: HashMap::new(),
        }
    }

    /// Arms the pair's slot, or resets its deadline, and returns the deadline.
    pub fn change(&mut self, session: SessionId, parameters: EncoderParameters, now: Instant) -> Instant {
        let deadline = now + self.window;
        let slot = self
            .slots
            .entry((session, parameters.format()))
            .or_insert_with(Slot::new);
        slot.state = SlotState::Armed { deadline, parameters };
        deadline
    }

    /// Issues a request right away, dropping any armed change for the pair.
    pub fn fire_now(&mut self, session: SessionId, parameters: EncoderParameters) -> CompressionRequest {
        self.slots
            .entry((session, parameters.format()))
            .or_insert_with(Slot::new)
            .issue(session, parameters)
    }

    /// Earliest deadline among armed slots.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.slots
            .values()
            .filter_map(|slot| match slot.state {
                SlotState::Armed { deadline, .. } => Some(deadline),
                SlotState::Idle => None,
            })
            .min()
    }

    /// Fires every slot whose deadline has passed, earliest first.
    pub fn fire_due(&mut self, now: Instant) -> Vec<(Instant, CompressionRequest)> {
        let mut due: Vec<(Instant, CompressionRequest)> = self
            .slots
            .iter_mut()
            .filter_map(|(&(session, _), slot)| {
                let SlotState::Armed { deadline, parameters } = slot.state else {
                    return None;
                };
                (deadline <= now).then(|| (deadline, slot.issue(session, parameters)))
            })
            .collect();
        due.sort_by_key(|(deadline, request)| (*deadline, request.session, request.format()));
        due
    }

    pub fn state(&self, session: SessionId, format: FormatId) -> SlotState {
        self.slots
            .get(&(session, format))
            .map(|slot| slot.state.clone())
            .unwrap_or(SlotState::Idle)
    }

    pub fn generation(&self, session: SessionId, format: FormatId) -> Generation {
        self.slots
            .get(&(session, format))
            .map(|slot| slot.generation)
            .unwrap_or_default()
    }

    /// Status of every slot the session has, in format order.
    pub fn status(&self, session: SessionId) -> Vec<PairStatus> {
        let mut status: Vec<PairStatus> = self
            .slots
            .iter()
            .filter(|((s, _), _)| *s == session)
            .map(|(&(_, format), slot)| PairStatus {
                format,
                armed: matches!(slot.state, SlotState::Armed { .. }),
                generation: slot.generation,
            })
            .collect();
        status.sort_by_key(|p| p.format);
        status
    }

    /// Drops every slot of a closed session. Returns how many were armed.
    pub fn forget(&mut self, session: SessionId) -> usize {
        let before = self.slots.len();
        let mut armed = 0;
        self.slots.retain(|(s, _), slot| {
            if *s != session {
                return true;
            }
            if matches!(slot.state, SlotState::Armed { .. }) {
                armed += 1;
            }
            false
        });
        trace!("Forgot {} slots of session {}", before - self.slots.len(), session);
        armed
    }
}

#[derive(Debug)]
enum Command {
    Changed(SessionId, EncoderParameters),
    Trigger(SessionId, EncoderParameters),
    Forget(SessionId),
    Status(SessionId, oneshot::Sender<Vec<PairStatus>>),
    Shutdown,
}

/// Handle to the scheduler task.
///
/// Dropping the handle stops the task; requests already dispatched keep running.
pub struct RecompressionScheduler {
    sender: mpsc::UnboundedSender<Command>,
}

impl RecompressionScheduler {
    /// Spawns the scheduler task. Must be called from within a tokio runtime.
    ///
    /// `dispatch` is called from the scheduler task for each fired request
    /// and must not block.
    pub fn start<F>(config: SchedulerConfig, dispatch: F) -> Self
    where
        F: Fn(CompressionRequest) + Send + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let table = DebounceTable::new(config.quiescence);
        debug!("Recompression scheduler started (quiescence {:?})", config.quiescence);
        tokio::spawn(run(table, receiver, dispatch));
        Self { sender }
    }

    /// Debounced: the request fires once changes for the pair stop.
    pub fn parameters_changed(&self, session: SessionId, parameters: EncoderParameters) -> EngineResult<()> {
        self.send(Command::Changed(session, parameters))
    }

    /// Immediate: the request fires without waiting for the quiet period.
    pub fn trigger(&self, session: SessionId, parameters: EncoderParameters) -> EngineResult<()> {
        self.send(Command::Trigger(session, parameters))
    }

    /// Disarms all pending timers of a session.
    pub fn forget(&self, session: SessionId) -> EngineResult<()> {
        self.send(Command::Forget(session))
    }

    /// Armed timers and issued generations of a session.
    ///
    /// Answered after every command sent before it, so a change made just
    /// before shows up as armed.
    pub async fn status(&self, session: SessionId) -> EngineResult<Vec<PairStatus>> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Status(session, reply))?;
        response.await.map_err(|_| EngineError::Shutdown)
    }

    pub fn shutdown(&self) {
        let _ = self.sender.send(Command::Shutdown);
    }

    fn send(&self, command: Command) -> EngineResult<()> {
        self.sender.send(command).map_err(|_| EngineError::Shutdown)
    }
}

impl Drop for RecompressionScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run<F>(mut table: DebounceTable, mut receiver: mpsc::UnboundedReceiver<Command>, dispatch: F)
where
    F: Fn(CompressionRequest) + Send + 'static,
{
    loop {
        let deadline = table.next_deadline();
        tokio::select! {
            command = receiver.recv() => match command {
                Some(Command::Changed(session, parameters)) => {
                    let format = parameters.format();
                    table.change(session, parameters, Instant::now());
                    trace!("Session {} {} timer armed", session, format);
                }
                Some(Command::Trigger(session, parameters)) => {
                    let request = table.fire_now(session, parameters);
                    debug!("Session {} {} issued {}", session, request.format(), request.generation);
                    dispatch(request);
                }
                Some(Command::Forget(session)) => {
                    let armed = table.forget(session);
                    if armed > 0 {
                        debug!("Session {} closed with {} armed timers", session, armed);
                    }
                }
                Some(Command::Status(session, reply)) => {
                    let _ = reply.send(table.status(session));
                }
                Some(Command::Shutdown) | None => break,
            },
            _ = wait_until(deadline) => {
                for (_, request) in table.fire_due(Instant::now()) {
                    debug!("Session {} {} fired {}", request.session, request.format(), request.generation);
                    dispatch(request);
                }
            }
        }
    }
    debug!("Recompression scheduler stopped");
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
