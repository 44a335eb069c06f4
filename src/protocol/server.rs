use std::{
    io,
    net::{SocketAddr, TcpListener, TcpStream},
    sync::Arc,
    thread,
};

use log::{info, warn};

use crate::eval::{self, Evaluation};

use super::{Session, WorkQueue, Worker, transport::TransportError};

pub struct CalculationServer {
    listener: TcpListener,
    worker: Worker,
}

impl CalculationServer {
    pub fn bind(address: SocketAddr) -> io::Result<Self> {
        Self::with_evaluator(address, eval::evaluate)
    }

    pub fn with_evaluator<E>(address: SocketAddr, evaluate: E) -> io::Result<Self>
    where
        E: Fn(&str) -> Evaluation + Send + 'static,
    {
        let listener = TcpListener::bind(address)?;
        let worker = Worker::spawn(Arc::new(WorkQueue::new()), evaluate)?;
        Ok(Self { listener, worker })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn listen(self) -> Result<(), TransportError> {
        info!("listening at {}", self.local_addr()?);

        for (id, stream) in self.listener.incoming().enumerate() {
            match stream {
                Ok(stream) => self.spawn_session(id, stream),
                Err(e) => warn!("broken connection: {e:?}"),
            }
        }
        Ok(())
    }

    fn spawn_session(&self, id: usize, stream: TcpStream) {
        match stream.peer_addr() {
            Ok(peer) => info!("accepted connection {id} from {peer}"),
            Err(_) => info!("accepted connection {id}"),
        }

        let queue = Arc::clone(self.worker.queue());
        let spawned = thread::Builder::new()
            .name(format!("session-{id}"))
            .spawn(move || match Session::new(id, stream, queue) {
                Ok(session) => {
                    session.run();
                }
                Err(e) => warn!("connection {id}: failed to set up session: {e}"),
            });

        if let Err(e) = spawned {
            warn!("connection {id}: failed to spawn session thread: {e}");
        }
    }
}
