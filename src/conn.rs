//! The session actor and its caller-facing handle.
//!
//! Each connection is owned by a single tokio task that alternates
//! between two event sources: the caller request queue and the socket.
//! Exactly one request is in flight at a time; the actor does not read
//! the next request until the current reply has been delivered, so
//! callers are served strictly in call order and never observe another
//! request's residual messages.

use std::future::Future;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};

use crate::engine::{Engine, Reply};
use crate::error::{Error, Result};
use crate::framing::FrameBuffer;
use crate::opts::Opts;
use crate::protocol::backend::BackendMessage;
use crate::result::QueryResult;
use crate::transaction::{TransactionTracker, TxnAction, TxnOp};
use crate::value::Value;

const REQUEST_QUEUE_DEPTH: usize = 32;
const READ_CHUNK_SIZE: usize = 8192;

/// A caller request, answered through its oneshot sender.
enum Request {
    Query {
        sql: String,
        params: Vec<Value>,
        reply: oneshot::Sender<Reply>,
    },
    Parameters {
        reply: oneshot::Sender<Vec<(String, String)>>,
    },
    Transaction {
        op: TxnOp,
        reply: oneshot::Sender<Result<()>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
}

/// The caller whose request is in flight.
enum Pending {
    Query(oneshot::Sender<Reply>),
    Transaction {
        op: TxnOp,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Handle to a session actor.
///
/// Cheap to clone; all clones talk to the same connection. When the
/// last clone is dropped the actor sends `Terminate` and shuts down.
#[derive(Clone, Debug)]
pub struct Client {
    requests: mpsc::Sender<Request>,
}

impl Client {
    /// Connect, authenticate and bootstrap the type registry.
    ///
    /// Accepts [`Opts`] or anything convertible into them, such as a
    /// `postgres://` URL string.
    pub async fn connect<O: TryInto<Opts>>(opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts = opts.try_into()?;
        if opts.hostname.is_empty() {
            return Err(Error::InvalidUsage("hostname is empty".into()));
        }
        if opts.username.is_empty() {
            return Err(Error::InvalidUsage("username is empty".into()));
        }

        let stream = TcpStream::connect((opts.hostname.as_str(), opts.port)).await?;
        stream.set_nodelay(true)?;

        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let mut session = Session {
            stream,
            reassembly: FrameBuffer::new(),
            engine: Engine::new(&opts),
            tracker: TransactionTracker::new(),
            requests: rx,
            pending: None,
        };

        session.engine.start();
        session.flush().await?;

        // Drive auth and the type bootstrap to the connect reply, then
        // consume the trailing ReadyForQuery.
        loop {
            let reply = session.pump().await?;
            session.flush().await?;
            if let Some(reply) = reply {
                reply?;
                break;
            }
        }
        while !session.engine.is_ready() {
            session.pump().await?;
            session.flush().await?;
        }

        log::debug!("session established to {}:{}", opts.hostname, opts.port);
        tokio::spawn(session.run());
        Ok(Client { requests: tx })
    }

    /// Run a parameterized query and wait for its result.
    pub async fn query(&self, sql: &str, params: Vec<Value>) -> Result<QueryResult> {
        let (tx, rx) = oneshot::channel();
        self.send(Request::Query {
            sql: sql.to_string(),
            params,
            reply: tx,
        })
        .await?;
        rx.await.map_err(|_| Error::Disconnected)?
    }

    /// Latest server-reported parameters.
    pub async fn parameters(&self) -> Result<Vec<(String, String)>> {
        let (tx, rx) = oneshot::channel();
        self.send(Request::Parameters { reply: tx }).await?;
        rx.await.map_err(|_| Error::Disconnected)
    }

    /// Open a transaction, or a savepoint when one is already open.
    pub async fn begin(&self) -> Result<()> {
        self.transaction_op(TxnOp::Begin).await
    }

    /// Commit the innermost transaction level. Only the outermost level
    /// actually issues `COMMIT`; inner levels are deferred.
    pub async fn commit(&self) -> Result<()> {
        self.transaction_op(TxnOp::Commit).await
    }

    /// Roll back the innermost transaction level.
    pub async fn rollback(&self) -> Result<()> {
        self.transaction_op(TxnOp::Rollback).await
    }

    /// Run `f` inside a transaction: commit on `Ok`, roll back on `Err`.
    ///
    /// Mixing this with explicit `begin`/`commit` calls at mismatched
    /// depths is caller error.
    pub async fn in_transaction<T, Fut>(&self, f: impl FnOnce(Client) -> Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        self.begin().await?;
        match f(self.clone()).await {
            Ok(value) => {
                self.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback().await {
                    log::warn!("rollback after failed transaction body: {rollback_err}");
                }
                Err(err)
            }
        }
    }

    /// Gracefully terminate the session.
    pub async fn stop(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Request::Stop { reply: tx }).await?;
        rx.await.map_err(|_| Error::Disconnected)
    }

    async fn transaction_op(&self, op: TxnOp) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Request::Transaction { op, reply: tx }).await?;
        rx.await.map_err(|_| Error::Disconnected)?
    }

    async fn send(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| Error::Disconnected)
    }
}

/// One event from the actor's two sources.
enum Event {
    Request(Option<Request>),
    Chunk(usize),
}

/// The session actor: exclusive owner of the socket and the engine.
struct Session {
    stream: TcpStream,
    reassembly: FrameBuffer,
    engine: Engine,
    tracker: TransactionTracker,
    requests: mpsc::Receiver<Request>,
    pending: Option<Pending>,
}

impl Session {
    async fn run(mut self) {
        match self.serve().await {
            Ok(()) => log::debug!("session closed"),
            Err(err) => {
                log::error!("session terminated: {err}");
                self.fail_pending(err);
            }
        }
    }

    async fn serve(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            if self.pending.is_none() && self.engine.is_ready() {
                let event = tokio::select! {
                    request = self.requests.recv() => Event::Request(request),
                    read = self.stream.read(&mut chunk) => Event::Chunk(read?),
                };

                match event {
                    Event::Request(None) => {
                        // Every handle is gone; shut down gracefully.
                        self.engine.terminate();
                        let _ = self.flush().await;
                        return Ok(());
                    }
                    Event::Request(Some(request)) => {
                        if self.handle_request(request).await? {
                            return Ok(());
                        }
                    }
                    Event::Chunk(0) => {
                        log::debug!("server closed the connection while idle");
                        return Ok(());
                    }
                    Event::Chunk(n) => self.process_chunk_prefix(&chunk, n).await?,
                }
            } else {
                // A request is in flight (or its tail is still being
                // drained): only the socket can make progress.
                let n = self.stream.read(&mut chunk).await?;
                if n == 0 {
                    return Err(Error::Disconnected);
                }
                self.process_chunk_prefix(&chunk, n).await?;
            }
        }
    }

    async fn process_chunk_prefix(&mut self, chunk: &[u8], n: usize) -> Result<()> {
        let reply = self.dispatch(&chunk[..n])?;
        self.flush().await?;
        if let Some(reply) = reply {
            self.deliver(reply);
        }
        Ok(())
    }

    /// Reassemble and decode a socket chunk, feeding each message to the
    /// engine. At most one frame in a chunk produces a reply.
    fn dispatch(&mut self, bytes: &[u8]) -> Result<Option<Reply>> {
        let mut reply = None;
        for frame in self.reassembly.feed(bytes)? {
            let msg = BackendMessage::decode(frame.tag, &frame.payload)?;
            log::trace!("<- {}", msg.name());
            if let Some(produced) = self.engine.handle_message(msg)? {
                debug_assert!(reply.is_none(), "second reply within one request");
                reply = Some(produced);
            }
        }
        Ok(reply)
    }

    async fn flush(&mut self) -> Result<()> {
        if let Some(outgoing) = self.engine.take_outgoing() {
            log::trace!("-> {} bytes", outgoing.len());
            self.stream.write_all(&outgoing).await?;
        }
        Ok(())
    }

    /// Admit one caller request. Returns true when the actor must stop.
    async fn handle_request(&mut self, request: Request) -> Result<bool> {
        match request {
            Request::Query { sql, params, reply } => {
                match self.engine.begin_query(&sql, params) {
                    Ok(()) => {
                        self.flush().await?;
                        self.pending = Some(Pending::Query(reply));
                    }
                    Err(err) => {
                        let _ = reply.send(Err(err));
                    }
                }
                Ok(false)
            }
            Request::Parameters { reply } => {
                let _ = reply.send(self.engine.parameters());
                Ok(false)
            }
            Request::Transaction { op, reply } => {
                match self.tracker.plan(op) {
                    TxnAction::Run(sql) => match self.engine.begin_query(&sql, Vec::new()) {
                        Ok(()) => {
                            self.flush().await?;
                            self.pending = Some(Pending::Transaction { op, reply });
                        }
                        Err(err) => {
                            let _ = reply.send(Err(err));
                        }
                    },
                    // Counter-only level: nothing to run on the server.
                    TxnAction::Skip => {
                        self.tracker.apply(op);
                        let _ = reply.send(Ok(()));
                    }
                }
                Ok(false)
            }
            Request::Stop { reply } => {
                self.engine.terminate();
                let _ = self.flush().await;
                let _ = reply.send(());
                Ok(true)
            }
        }
    }

    /// Hand the engine's reply to the waiting caller.
    fn deliver(&mut self, reply: Reply) {
        match self.pending.take() {
            Some(Pending::Query(tx)) => {
                let _ = tx.send(reply);
            }
            Some(Pending::Transaction { op, reply: tx }) => {
                let result = reply.map(|_| ());
                if result.is_ok() {
                    self.tracker.apply(op);
                }
                let _ = tx.send(result);
            }
            None => log::warn!("server reply with no pending caller dropped"),
        }
    }

    /// Drive the socket until the engine produces a reply or an error.
    async fn pump(&mut self) -> Result<Option<Reply>> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let n = self.stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::Disconnected);
        }
        self.dispatch(&chunk[..n])
    }

    fn fail_pending(&mut self, err: Error) {
        match self.pending.take() {
            Some(Pending::Query(tx)) => {
                let _ = tx.send(Err(err));
            }
            Some(Pending::Transaction { reply, .. }) => {
                let _ = reply.send(Err(err));
            }
            None => {}
        }
    }
}
