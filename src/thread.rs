//! The dedicated input thread and its event loop.
//!
//! All device I/O and seat mutation happens on one thread named
//! "otto-input" running a calloop loop with three kinds of sources: the
//! backend's fd, a channel of tasks posted by the compositor-side handle,
//! and timers the seat arms itself. Startup is synchronous so backend or
//! keymap failures surface from [`Seat::start`](crate::seat::Seat::start)
//! instead of being lost on a detached thread.

use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::JoinHandle;

use calloop::generic::Generic;
use calloop::ping::Ping;
use calloop::{channel, EventLoop, Interest, Mode, PostAction};
use tracing::{error, info, warn};

use crate::backend::{EventSource, HeadlessSource};
use crate::config::InputConfig;
use crate::error::InputError;
use crate::event::Event;
use crate::seat::SharedState;
use crate::seat_impl::SeatImpl;
use crate::tablet::ToolCache;

/// Which backend the input thread should open. Sources are constructed on
/// the input thread itself; the libinput context is not `Send`.
#[derive(Debug, Clone)]
pub enum Backend {
    /// Devices from udev via libinput, for the given seat name.
    #[cfg(feature = "libinput")]
    Udev { seat_name: String },
    /// No physical devices; events come from virtual devices only.
    Headless,
}

/// A closure to run on the input thread with exclusive seat access.
pub(crate) struct Task {
    pub(crate) op: Box<dyn FnOnce(&mut SeatImpl) + Send>,
}

pub(crate) struct ThreadParts {
    pub(crate) tasks: channel::Sender<Task>,
    pub(crate) shared: Arc<RwLock<SharedState>>,
    pub(crate) tools: ToolCache,
    pub(crate) join: JoinHandle<()>,
}

type StartupGate = Arc<(Mutex<Option<Result<(), InputError>>>, Condvar)>;

pub(crate) fn spawn(
    config: InputConfig,
    backend: Backend,
    events: mpsc::Sender<Event>,
    ping: Ping,
) -> Result<ThreadParts, InputError> {
    let (tasks, task_rx) = channel::channel::<Task>();
    let shared = Arc::new(RwLock::new(SharedState::default()));
    let tools = ToolCache::default();
    let gate: StartupGate = Arc::new((Mutex::new(None), Condvar::new()));

    let thread_shared = shared.clone();
    let thread_tools = tools.clone();
    let thread_gate = gate.clone();
    let join = std::thread::Builder::new()
        .name("otto-input".into())
        .spawn(move || {
            run(
                config,
                backend,
                task_rx,
                thread_shared,
                thread_tools,
                events,
                ping,
                thread_gate,
            )
        })
        .map_err(|e| InputError::Init(format!("cannot spawn input thread: {e}")))?;

    let (lock, cvar) = &*gate;
    let mut outcome = lock.lock().unwrap();
    while outcome.is_none() {
        outcome = cvar.wait(outcome).unwrap();
    }
    match outcome.take() {
        Some(Ok(())) => Ok(ThreadParts {
            tasks,
            shared,
            tools,
            join,
        }),
        Some(Err(err)) => {
            drop(outcome);
            let _ = join.join();
            Err(err)
        }
        None => unreachable!(),
    }
}

fn open_backend(backend: &Backend) -> Result<Box<dyn EventSource>, InputError> {
    match backend {
        #[cfg(feature = "libinput")]
        Backend::Udev { seat_name } => {
            Ok(Box::new(crate::backend::LibinputSource::new(seat_name)?))
        }
        Backend::Headless => Ok(Box::new(HeadlessSource)),
    }
}

#[allow(clippy::too_many_arguments)]
fn run(
    config: InputConfig,
    backend: Backend,
    task_rx: channel::Channel<Task>,
    shared: Arc<RwLock<SharedState>>,
    tools: ToolCache,
    events: mpsc::Sender<Event>,
    ping: Ping,
    gate: StartupGate,
) {
    let report = |result: Result<(), InputError>| {
        let (lock, cvar) = &*gate;
        *lock.lock().unwrap() = Some(result);
        cvar.notify_one();
    };

    let mut event_loop: EventLoop<SeatImpl> = match EventLoop::try_new() {
        Ok(l) => l,
        Err(e) => {
            report(Err(InputError::Init(format!("event loop: {e}"))));
            return;
        }
    };
    let handle = event_loop.handle();

    let source = match open_backend(&backend) {
        Ok(s) => s,
        Err(e) => {
            report(Err(e));
            return;
        }
    };

    // the backend fd, when there is one, drives raw event dispatch
    let source_fd = source.poll_fd().map(|fd| fd.try_clone_to_owned());
    let mut seat = match SeatImpl::new(
        &config,
        source,
        tools,
        shared,
        events,
        ping,
        handle.clone(),
        event_loop.get_signal(),
    ) {
        Ok(seat) => seat,
        Err(e) => {
            report(Err(e));
            return;
        }
    };

    if let Some(fd) = source_fd {
        let fd = match fd {
            Ok(fd) => fd,
            Err(e) => {
                report(Err(InputError::Init(format!("backend fd: {e}"))));
                return;
            }
        };
        let generic = Generic::new(fd, Interest::READ, Mode::Level);
        let inserted = handle.insert_source(generic, |_, _, seat: &mut SeatImpl| {
            seat.dispatch_source()?;
            Ok(PostAction::Continue)
        });
        if let Err(e) = inserted {
            report(Err(InputError::Init(format!("backend source: {e}"))));
            return;
        }
    }

    let inserted = handle.insert_source(task_rx, |event, _, seat: &mut SeatImpl| {
        if let channel::Event::Msg(task) = event {
            (task.op)(seat);
        }
    });
    if let Err(e) = inserted {
        report(Err(InputError::Init(format!("task channel: {e}"))));
        return;
    }

    report(Ok(()));
    info!("input thread running");

    // prime the source once; devices present at startup are announced
    // before the first fd wakeup
    if let Err(e) = seat.dispatch_source() {
        warn!(error = %e, "initial device scan failed");
    }

    if let Err(e) = event_loop.run(None, &mut seat, |_| {}) {
        error!(error = %e, "input loop failed");
    }
    seat.teardown();
    info!("input thread stopped");
}
