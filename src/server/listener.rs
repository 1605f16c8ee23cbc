// src/server/listener.rs

//! A TCP listener together with its registry of live connections.
//!
//! The accept loop is the only task that inserts into or removes from the
//! registry. Connections report their own closure by posting
//! `ConnectionEvent::Closed` back to the loop, which removes the entry and
//! fires the disconnect callback, so the callback runs exactly once per
//! connection no matter how many times `close()` was called.

use crate::connection::{Connection, ConnectionEvent, ConnectionHandle, ConnectionId};
use crate::core::metrics::{CONNECTIONS_ACCEPTED_TOTAL, CONNECTIONS_LIVE};
use dashmap::DashMap;
use futures::future::BoxFuture;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// How long queued writes may take to drain when the listener stops.
const CLOSE_GRACE: Duration = Duration::from_secs(2);
/// Pause after a failed accept, so a persistent error does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

type ConnectCallback = Arc<dyn Fn(Connection) -> BoxFuture<'static, ()> + Send + Sync>;
type DisconnectCallback = Arc<dyn Fn(ConnectionId) + Send + Sync>;
type Registry = Arc<DashMap<ConnectionId, ConnectionHandle>>;

pub struct Listener {
    name: &'static str,
    local_addr: SocketAddr,
    tcp: Option<TcpListener>,
    max_frame_length: usize,
    connections: Registry,
    on_connect: Option<ConnectCallback>,
    on_disconnect: Option<DisconnectCallback>,
    stop: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Listener {
    /// Binds the listening socket. Accepting starts with `start()`.
    pub async fn bind(
        name: &'static str,
        addr: impl ToSocketAddrs,
        max_frame_length: usize,
    ) -> std::io::Result<Self> {
        let tcp = TcpListener::bind(addr).await?;
        let local_addr = tcp.local_addr()?;
        info!("{} listener bound to {}", name, local_addr);
        Ok(Self {
            name,
            local_addr,
            tcp: Some(tcp),
            max_frame_length,
            connections: Arc::new(DashMap::new()),
            on_connect: None,
            on_disconnect: None,
            stop: CancellationToken::new(),
            task: None,
        })
    }

    /// Registers the task run for every accepted connection. It owns the
    /// reading side of the connection for its whole life.
    pub fn on_client_connect<F, Fut>(&mut self, callback: F)
    where
        F: Fn(Connection) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.on_connect = Some(Arc::new(move |conn| Box::pin(callback(conn))));
    }

    /// Registers the callback fired once when a connection leaves the registry.
    pub fn on_client_disconnect<F>(&mut self, callback: F)
    where
        F: Fn(ConnectionId) + Send + Sync + 'static,
    {
        self.on_disconnect = Some(Arc::new(callback));
    }

    /// Spawns the accept loop onto `runtime`. Calling it twice is a no-op.
    pub fn start(&mut self, runtime: &Handle) {
        let Some(tcp) = self.tcp.take() else {
            warn!("{} listener already started", self.name);
            return;
        };
        let accept_loop = AcceptLoop {
            name: self.name,
            max_frame_length: self.max_frame_length,
            connections: self.connections.clone(),
            on_connect: self.on_connect.clone(),
            on_disconnect: self.on_disconnect.clone(),
            stop: self.stop.clone(),
            runtime: runtime.clone(),
            next_id: 0,
        };
        self.task = Some(runtime.spawn(accept_loop.run(tcp)));
    }

    /// Stops accepting, closes every live connection and waits until the
    /// accept loop has removed them all.
    pub async fn stop(&mut self) {
        self.stop.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("{} accept loop ended abnormally: {:?}", self.name, e);
            }
        }
        // Never started: nothing was accepted.
        self.tcp.take();
        info!("{} listener stopped", self.name);
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// A handle to a live connection, if it is still registered.
    pub fn connection(&self, id: ConnectionId) -> Option<ConnectionHandle> {
        self.connections.get(&id).map(|entry| entry.value().clone())
    }
}

struct AcceptLoop {
    name: &'static str,
    max_frame_length: usize,
    connections: Registry,
    on_connect: Option<ConnectCallback>,
    on_disconnect: Option<DisconnectCallback>,
    stop: CancellationToken,
    runtime: Handle,
    next_id: ConnectionId,
}

impl AcceptLoop {
    async fn run(mut self, tcp: TcpListener) {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut client_tasks = JoinSet::new();
        let mut io_tasks = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                _ = self.stop.cancelled() => break,

                Some(ConnectionEvent::Closed(id)) = events_rx.recv() => {
                    self.remove_connection(id);
                }

                res = tcp.accept() => match res {
                    Ok((stream, peer)) => {
                        self.admit(stream, peer, &events_tx, &mut client_tasks, &mut io_tasks);
                    }
                    Err(e) => {
                        error!("{} listener failed to accept connection: {}", self.name, e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },

                Some(res) = client_tasks.join_next() => {
                    if let Err(e) = res {
                        if e.is_panic() {
                            error!("A {} connection handler panicked: {e:?}", self.name);
                        }
                    }
                }

                Some(res) = io_tasks.join_next() => {
                    if let Err(e) = res {
                        if e.is_panic() {
                            error!("A {} connection writer panicked: {e:?}", self.name);
                        }
                    }
                }
            }
        }

        drop(tcp);
        info!(
            "{} listener shutting down, closing {} connections.",
            self.name,
            self.connections.len()
        );

        for entry in self.connections.iter() {
            entry.value().close();
        }
        client_tasks.shutdown().await;

        let drained = tokio::time::timeout(CLOSE_GRACE, async {
            while io_tasks.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                "{} connection writers did not drain within {:?}, aborting them.",
                self.name, CLOSE_GRACE
            );
            io_tasks.shutdown().await;
        }

        while let Ok(ConnectionEvent::Closed(id)) = events_rx.try_recv() {
            self.remove_connection(id);
        }
        let leftover: Vec<ConnectionId> = self.connections.iter().map(|e| *e.key()).collect();
        for id in leftover {
            self.remove_connection(id);
        }
    }

    fn admit(
        &mut self,
        stream: TcpStream,
        peer: SocketAddr,
        events_tx: &mpsc::UnboundedSender<ConnectionEvent>,
        client_tasks: &mut JoinSet<()>,
        io_tasks: &mut JoinSet<()>,
    ) {
        self.next_id = self.next_id.wrapping_add(1);
        let id = self.next_id;
        info!("{} listener accepted connection {} from {}", self.name, id, peer);

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY for {}: {}", peer, e);
        }

        let (connection, writer) =
            Connection::new(id, stream, peer, self.max_frame_length, events_tx.clone());
        self.connections.insert(id, connection.handle().clone());
        CONNECTIONS_ACCEPTED_TOTAL.with_label_values(&[self.name]).inc();
        CONNECTIONS_LIVE.with_label_values(&[self.name]).inc();

        io_tasks.spawn_on(writer.run(), &self.runtime);

        match &self.on_connect {
            Some(callback) => {
                let span = info_span!("connection", listener = self.name, conn.id = id, %peer);
                client_tasks.spawn_on(callback(connection).instrument(span), &self.runtime);
            }
            None => connection.close(),
        }
    }

    /// Removes `id` from the registry and fires the disconnect callback. Runs
    /// only inside the accept loop; a second removal of the same id is a no-op.
    fn remove_connection(&self, id: ConnectionId) {
        let Some((_, handle)) = self.connections.remove(&id) else {
            return;
        };
        handle.close();
        CONNECTIONS_LIVE.with_label_values(&[self.name]).dec();
        debug!("{} connection {} removed from registry", self.name, id);
        if let Some(callback) = &self.on_disconnect {
            callback(id);
        }
    }
}
