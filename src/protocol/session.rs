use std::{
    fmt,
    net::Shutdown,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
};

use log::{debug, info, trace, warn};

use super::{
    CalculationRequest, CalculationResponse, Connection, Message, ProtocolTransport, Request,
    Response, ResponseCode, WorkQueue, transport::TransportError,
};

/// Application-layer phase of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    NoUsername,
    Username,
    /// Terminated by a clean terminate handshake.
    Finalized,
    /// Abandoned after a failed write.
    Killed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Finalized | SessionState::Killed)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::NoUsername,
            1 => SessionState::Username,
            2 => SessionState::Finalized,
            _ => SessionState::Killed,
        }
    }
}

/// Outbound half of a session, shared with the completions of its queued jobs.
///
/// Only the session thread changes `state`; completions read it under the
/// writer lock so nothing is written after the session finalizes.
struct SessionLink<C: Connection> {
    id: usize,
    writer: Mutex<ProtocolTransport<C>>,
    state: AtomicU8,
    open: AtomicBool,
}

impl<C: Connection> SessionLink<C> {
    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn mark_closed(&self) {
        self.open.store(false, Ordering::Release);
    }

    fn writer(&self) -> MutexGuard<'_, ProtocolTransport<C>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes a calculation result from the worker thread, or drops it if the
    /// session can no longer receive it.
    fn deliver(&self, response: CalculationResponse) {
        let mut writer = self.writer();
        if !self.is_open() || self.state().is_terminal() {
            debug!("connection {}: dropping result for closed session", self.id);
            return;
        }

        if let Err(e) = writer.write_response(Response::Calculation(response)) {
            warn!("connection {}: failed to deliver result: {e}", self.id);
            self.mark_closed();
        }
    }
}

/// Server side of one client connection.
pub struct Session<C: Connection> {
    id: usize,
    username: Option<String>,
    reader: ProtocolTransport<C>,
    link: Arc<SessionLink<C>>,
    queue: Arc<WorkQueue>,
}

impl<C: Connection> Session<C> {
    pub fn new(id: usize, connection: C, queue: Arc<WorkQueue>) -> std::io::Result<Self> {
        let writer = connection.try_clone()?;
        Ok(Self {
            id,
            username: None,
            reader: ProtocolTransport::new(connection),
            link: Arc::new(SessionLink {
                id,
                writer: Mutex::new(ProtocolTransport::new(writer)),
                state: AtomicU8::new(SessionState::NoUsername as u8),
                open: AtomicBool::new(true),
            }),
            queue,
        })
    }

    pub fn state(&self) -> SessionState {
        self.link.state()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// Runs the handshake and message loop until the client terminates,
    /// disconnects or can no longer be written to.
    pub fn run(mut self) -> SessionState {
        self.handshake();

        while !self.state().is_terminal() && self.link.is_open() {
            let message = self.reader.read_message();
            // A failed delivery may have closed the link while we were blocked.
            if !self.link.is_open() {
                break;
            }
            self.dispatch(message);
        }

        match self.state() {
            SessionState::Finalized => self.finalize(),
            SessionState::Killed => {
                warn!("{self}: connection killed");
                self.close(Shutdown::Both);
            }
            _ => {
                info!("{self}: disconnected");
                self.close(Shutdown::Both);
            }
        }
        self.state()
    }

    fn handshake(&mut self) {
        let code = match self.reader.read_message() {
            Ok(Message::Request(Request::ConnectionEstablish { username })) => {
                self.username = Some(username);
                ResponseCode::Ok
            }
            Ok(other) => {
                debug!("{self}: expected handshake, got {other:?}");
                ResponseCode::BadRequest
            }
            Err(e) if e.is_malformed() => {
                debug!("{self}: malformed handshake: {e}");
                ResponseCode::BadRequest
            }
            Err(e) => {
                debug!("{self}: closed during handshake: {e}");
                self.link.mark_closed();
                return;
            }
        };

        // A rejected handshake still moves on; the session just has no username.
        self.link.set_state(SessionState::Username);
        if self.reply(Response::ConnectionEstablish { code }) && code == ResponseCode::Ok {
            info!("{self}: established");
        }
    }

    fn dispatch(&mut self, message: Result<Message, TransportError>) {
        match message {
            Ok(Message::Request(Request::Calculation(request))) => self.submit(request),
            Ok(Message::Request(Request::ConnectionTerminate)) => self.terminate(),
            Ok(other) => {
                debug!("{self}: unexpected message {other:?}");
                self.reply(Response::Generic {
                    code: ResponseCode::BadRequest,
                });
            }
            Err(e) if e.is_malformed() => {
                debug!("{self}: malformed message: {e}");
                self.reply(Response::Generic {
                    code: ResponseCode::BadRequest,
                });
            }
            Err(e) => {
                trace!("{self}: read failed: {e}");
                self.link.mark_closed();
            }
        }
    }

    fn submit(&self, request: CalculationRequest) {
        info!("{self}: calculating {:?}", request.expression);
        let link = Arc::clone(&self.link);
        self.queue.enqueue(request, move |response| link.deliver(response));
    }

    fn terminate(&self) {
        let mut writer = self.link.writer();
        let sent = writer.write_response(Response::ConnectionTerminate {
            code: ResponseCode::Ok,
        });

        match sent {
            // Set under the writer lock so no result can follow the reply.
            Ok(()) => self.link.set_state(SessionState::Finalized),
            Err(e) => {
                warn!("{self}: failed to reply: {e}");
                self.link.set_state(SessionState::Killed);
            }
        }
    }

    /// Sends a reply from the session thread; a failed write kills the session.
    fn reply(&self, response: Response) -> bool {
        match self.link.writer().write_response(response) {
            Ok(()) => true,
            Err(e) => {
                warn!("{self}: failed to reply: {e}");
                self.link.set_state(SessionState::Killed);
                false
            }
        }
    }

    /// Closes our side, then waits for the client to close before releasing
    /// the connection.
    fn finalize(&mut self) {
        info!("{self}: terminated");
        self.close(Shutdown::Write);

        match self.reader.drain_until_closed() {
            Ok(0) => {}
            Ok(ignored) => debug!("{self}: ignored {ignored} bytes after terminate"),
            Err(e) => trace!("{self}: peer close: {e}"),
        }
        let _ = self.reader.stream().shutdown(Shutdown::Read);
    }

    fn close(&self, how: Shutdown) {
        self.link.mark_closed();
        if let Err(e) = self.reader.stream().shutdown(how) {
            trace!("{self}: shutdown: {e}");
        }
    }
}

impl<C: Connection> fmt::Display for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "connection {} <{}>",
            self.id,
            self.username.as_deref().unwrap_or("?")
        )
    }
}
