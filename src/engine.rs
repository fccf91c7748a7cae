//! Sans-I/O protocol engine.
//!
//! The engine is the session's state machine. It consumes decoded
//! [`BackendMessage`]s, appends any frontend bytes it wants sent to an
//! internal write buffer, and occasionally produces a reply for the
//! caller whose request is in flight. It performs no I/O itself: the
//! session actor owns the socket and drives the engine with whatever
//! the server sent.
//!
//! A request moves through the phases
//! `ready → parsing → describing → binding → executing → ready`,
//! bracketed by the server's `ReadyForQuery`. Connection startup runs
//! `auth → init` first and then reuses the same query phases for the
//! type-registry bootstrap, with rows diverted to the registry builder
//! instead of the caller.

use std::collections::HashMap;
use std::sync::Arc;

use crate::coder::{Coder, ValueHooks};
use crate::error::{Error, Result, ServerError};
use crate::opts::Opts;
use crate::protocol::backend::{
    AuthenticationMessage, BackendKeyData, BackendMessage, CommandComplete, DataRow,
    ReadyForQuery, RowDescription,
};
use crate::protocol::frontend::{
    md5_password, write_bind, write_describe_statement, write_execute, write_parse,
    write_password, write_startup, write_sync, write_terminate,
};
use crate::protocol::types::{FormatCode, Oid, TransactionStatus};
use crate::result::{decode_tag, QueryResult};
use crate::types::{TypeRegistry, TypeSource};
use crate::value::Value;

/// Protocol phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Auth,
    Init,
    Parsing,
    Describing,
    Binding,
    Executing,
    Ready,
}

/// The reply produced for the request in flight.
pub(crate) type Reply = Result<QueryResult>;

/// Per-query statement description captured at Describe time.
#[derive(Debug)]
struct Statement {
    columns: Vec<String>,
    row_info: Vec<crate::types::TypeInfo>,
}

/// Per-query portal description.
#[derive(Debug)]
struct Portal {
    param_oids: Vec<Oid>,
}

/// The protocol state machine for one session.
pub(crate) struct Engine {
    phase: Phase,
    username: String,
    password: Option<String>,
    database: Option<String>,
    startup_parameters: Vec<(String, String)>,
    hooks: Arc<dyn ValueHooks>,
    source: Arc<dyn TypeSource>,

    parameters: HashMap<String, String>,
    backend_key: Option<BackendKeyData>,
    transaction_status: TransactionStatus,
    types: Option<TypeRegistry>,
    bootstrap: bool,

    // Per-request state, cleared when the phase returns to ready.
    replied: bool,
    rows: Vec<Vec<Option<Vec<u8>>>>,
    statement: Option<Statement>,
    portal: Option<Portal>,
    qparams: Option<Vec<Value>>,

    write_buffer: Vec<u8>,
}

impl Engine {
    pub fn new(opts: &Opts) -> Self {
        Self {
            phase: Phase::Ready,
            username: opts.username.clone(),
            password: opts.password.clone(),
            database: opts.database.clone(),
            startup_parameters: opts.parameters.clone(),
            hooks: opts.hooks.clone(),
            source: opts.types.clone(),
            parameters: HashMap::new(),
            backend_key: None,
            transaction_status: TransactionStatus::Idle,
            types: None,
            bootstrap: false,
            replied: false,
            rows: Vec::new(),
            statement: None,
            portal: None,
            qparams: None,
            write_buffer: Vec::new(),
        }
    }

    /// Whether a new caller request may start.
    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }

    /// Latest server-reported parameters, sorted by name.
    pub fn parameters(&self) -> Vec<(String, String)> {
        let mut params: Vec<_> = self
            .parameters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        params.sort();
        params
    }

    /// Backend (pid, secret) pair, once the server has sent it.
    #[allow(dead_code)]
    pub fn backend_key(&self) -> Option<(u32, u32)> {
        self.backend_key.map(|k| (k.pid, k.secret))
    }

    /// Transaction status carried by the last ReadyForQuery.
    #[allow(dead_code)]
    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    /// Queue the startup message and enter the auth phase.
    pub fn start(&mut self) {
        let mut params: Vec<(&str, &str)> =
            vec![("user", &self.username), ("client_encoding", "UTF8")];
        if let Some(ref database) = self.database {
            params.push(("database", database));
        }
        for (name, value) in &self.startup_parameters {
            params.push((name, value));
        }

        write_startup(&mut self.write_buffer, &params);
        self.phase = Phase::Auth;
    }

    /// Queue Parse/Describe/Sync for a caller query and stash its
    /// parameters for the Bind step.
    pub fn begin_query(&mut self, sql: &str, params: Vec<Value>) -> Result<()> {
        if self.phase != Phase::Ready {
            return Err(Error::InvalidUsage(format!(
                "query submitted in {:?} phase",
                self.phase
            )));
        }

        write_parse(&mut self.write_buffer, "", sql, &[]);
        write_describe_statement(&mut self.write_buffer, "");
        write_sync(&mut self.write_buffer);

        self.qparams = Some(params);
        self.phase = Phase::Parsing;
        Ok(())
    }

    /// Queue the Terminate message for a graceful shutdown.
    pub fn terminate(&mut self) {
        write_terminate(&mut self.write_buffer);
    }

    /// Drain the bytes queued for the server, if any.
    pub fn take_outgoing(&mut self) -> Option<Vec<u8>> {
        if self.write_buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.write_buffer))
        }
    }

    /// Feed one server message through the state machine.
    ///
    /// `Ok(Some(reply))` carries the reply for the in-flight request;
    /// at most one is produced per request. `Err` means the session is
    /// broken (protocol violation) and must be torn down.
    pub fn handle_message(&mut self, msg: BackendMessage) -> Result<Option<Reply>> {
        match msg {
            // Asynchronous messages, legal in any phase.
            BackendMessage::ParameterStatus(status) => {
                self.parameters.insert(status.name, status.value);
                Ok(None)
            }
            BackendMessage::NoticeResponse(notice) => {
                log::warn!("server notice dropped: {notice}");
                Ok(None)
            }
            BackendMessage::ErrorResponse(err) => self.on_error_response(err),
            BackendMessage::ReadyForQuery(ready) => self.on_ready(ready),

            other => match self.phase {
                Phase::Auth => self.on_auth(other),
                Phase::Init => self.on_init(other),
                Phase::Parsing => self.on_parsing(other),
                Phase::Describing => self.on_describing(other),
                Phase::Binding => self.on_binding(other),
                Phase::Executing => self.on_executing(other),
                Phase::Ready => Err(self.unexpected(&other)),
            },
        }
    }

    fn on_error_response(&mut self, err: ServerError) -> Result<Option<Reply>> {
        if self.replied {
            // The caller already has its reply; drain toward ReadyForQuery.
            log::debug!("server error after reply dropped: {err}");
            return Ok(None);
        }
        self.replied = true;
        Ok(Some(Err(Error::Server(err))))
    }

    fn on_ready(&mut self, ready: ReadyForQuery) -> Result<Option<Reply>> {
        self.transaction_status = ready.transaction_status().unwrap_or_default();

        match self.phase {
            Phase::Init => {
                // Auth is done; run the type bootstrap before the pending
                // connect request is answered.
                self.bootstrap = true;
                self.qparams = Some(Vec::new());
                let query = self.source.bootstrap_query().to_string();
                write_parse(&mut self.write_buffer, "", &query, &[]);
                write_describe_statement(&mut self.write_buffer, "");
                write_sync(&mut self.write_buffer);
                self.phase = Phase::Parsing;
            }
            // Boundary between the Parse/Describe/Sync batch and the
            // Bind/Execute/Sync batch of a live request.
            Phase::Describing if !self.replied => self.phase = Phase::Binding,
            _ => {
                self.phase = Phase::Ready;
                self.clear_request_state();
            }
        }
        Ok(None)
    }

    fn on_auth(&mut self, msg: BackendMessage) -> Result<Option<Reply>> {
        let auth = match msg {
            BackendMessage::Authentication(auth) => auth,
            other => return Err(self.unexpected(&other)),
        };

        match auth {
            AuthenticationMessage::Ok => {
                self.phase = Phase::Init;
                Ok(None)
            }
            AuthenticationMessage::CleartextPassword => {
                let Some(password) = self.password.clone() else {
                    return self.auth_failure("password required but not provided");
                };
                write_password(&mut self.write_buffer, &password);
                Ok(None)
            }
            AuthenticationMessage::Md5Password { salt } => {
                let Some(password) = self.password.clone() else {
                    return self.auth_failure("password required but not provided");
                };
                let hashed = md5_password(&self.username, &password, &salt);
                write_password(&mut self.write_buffer, &hashed);
                Ok(None)
            }
            AuthenticationMessage::Other(scheme) => {
                self.auth_failure(&format!("unsupported authentication scheme: {scheme}"))
            }
        }
    }

    fn auth_failure(&mut self, reason: &str) -> Result<Option<Reply>> {
        self.replied = true;
        Ok(Some(Err(Error::Auth(reason.to_string()))))
    }

    fn on_init(&mut self, msg: BackendMessage) -> Result<Option<Reply>> {
        match msg {
            BackendMessage::BackendKeyData(key) => {
                self.backend_key = Some(key);
                Ok(None)
            }
            other => Err(self.unexpected(&other)),
        }
    }

    fn on_parsing(&mut self, msg: BackendMessage) -> Result<Option<Reply>> {
        match msg {
            BackendMessage::ParseComplete => {
                self.phase = Phase::Describing;
                Ok(None)
            }
            other => Err(self.unexpected(&other)),
        }
    }

    fn on_describing(&mut self, msg: BackendMessage) -> Result<Option<Reply>> {
        match msg {
            BackendMessage::ParameterDescription(desc) => {
                self.portal = Some(Portal {
                    param_oids: desc.oids,
                });
                Ok(None)
            }
            BackendMessage::RowDescription(desc) => self.on_row_description(desc),
            // The statement produces no rows; bind with no result columns.
            BackendMessage::NoData => self.send_bind(&[]),
            BackendMessage::ParseComplete => self.send_bind(&[]),
            other => Err(self.unexpected(&other)),
        }
    }

    fn on_row_description(&mut self, desc: RowDescription) -> Result<Option<Reply>> {
        let columns: Vec<String> = desc.fields.iter().map(|f| f.name.clone()).collect();

        let mut row_info = Vec::with_capacity(desc.fields.len());
        let mut formats = Vec::with_capacity(desc.fields.len());
        {
            let coder = self.coder();
            for field in &desc.fields {
                let info = coder.type_info(field.type_oid);
                let format = if self.bootstrap {
                    FormatCode::Text
                } else {
                    coder.result_format(&info)
                };
                row_info.push(info);
                formats.push(format);
            }
        }

        self.statement = Some(Statement { columns, row_info });
        self.send_bind(&formats)
    }

    /// Encode the stashed parameters and queue Bind/Execute/Sync.
    ///
    /// The stash is consumed at most once per request, so a duplicate
    /// trigger is a no-op. An encode failure answers the caller here;
    /// the server never receives a Bind and its ReadyForQuery for the
    /// first Sync closes the request out.
    fn send_bind(&mut self, result_formats: &[FormatCode]) -> Result<Option<Reply>> {
        let Some(params) = self.qparams.take() else {
            return Ok(None);
        };
        let oids: Vec<Oid> = self
            .portal
            .as_ref()
            .map(|p| p.param_oids.clone())
            .unwrap_or_default();

        let encoded = self.coder().encode_params(&oids, &params);
        match encoded {
            Ok(encoded) => {
                write_bind(&mut self.write_buffer, "", "", &encoded, result_formats);
                write_execute(&mut self.write_buffer, "", 0);
                write_sync(&mut self.write_buffer);
                Ok(None)
            }
            Err(err) => {
                self.replied = true;
                Ok(Some(Err(err)))
            }
        }
    }

    fn on_binding(&mut self, msg: BackendMessage) -> Result<Option<Reply>> {
        match msg {
            BackendMessage::BindComplete => {
                self.phase = Phase::Executing;
                Ok(None)
            }
            other => Err(self.unexpected(&other)),
        }
    }

    fn on_executing(&mut self, msg: BackendMessage) -> Result<Option<Reply>> {
        match msg {
            BackendMessage::DataRow(row) => {
                self.on_data_row(row);
                Ok(None)
            }
            BackendMessage::CommandComplete(complete) => self.on_command_complete(complete),
            BackendMessage::EmptyQueryResponse => {
                if self.replied {
                    return Ok(None);
                }
                self.replied = true;
                Ok(Some(Ok(QueryResult::default())))
            }
            // Dead while max_rows is pinned to 0; tolerated for forward
            // compatibility.
            BackendMessage::PortalSuspended => Ok(None),
            other => Err(self.unexpected(&other)),
        }
    }

    fn on_data_row(&mut self, row: DataRow) {
        if !self.replied {
            self.rows.push(row.values);
        }
    }

    fn on_command_complete(&mut self, complete: CommandComplete) -> Result<Option<Reply>> {
        if self.replied {
            return Ok(None);
        }
        self.replied = true;

        if self.bootstrap {
            let rows = std::mem::take(&mut self.rows);
            self.bootstrap = false;
            return match self.source.build_types(&rows) {
                Ok(registry) => {
                    log::debug!("type registry installed: {} types", registry.len());
                    self.types = Some(registry);
                    Ok(Some(Ok(QueryResult::default())))
                }
                Err(err) => Ok(Some(Err(err))),
            };
        }

        let (command, count) = decode_tag(&complete.tag);

        let Some(statement) = self.statement.as_ref() else {
            return Ok(Some(Ok(QueryResult {
                command,
                num_rows: count.unwrap_or(0),
                rows: None,
                columns: None,
            })));
        };

        let decoded: Result<Vec<Vec<Value>>> = {
            let coder = self.coder();
            self.rows
                .iter()
                .map(|raw| coder.decode_row(&statement.row_info, raw))
                .collect()
        };

        match decoded {
            Ok(rows) => {
                let num_rows = count.unwrap_or(rows.len() as u32);
                let columns = statement.columns.clone();
                self.rows.clear();
                Ok(Some(Ok(QueryResult {
                    command,
                    num_rows,
                    rows: Some(rows),
                    columns: Some(columns),
                })))
            }
            // A failed decode answers the caller now; the buffered rows
            // are released when ReadyForQuery restores the ready phase.
            Err(err) => Ok(Some(Err(err))),
        }
    }

    fn clear_request_state(&mut self) {
        self.rows.clear();
        self.statement = None;
        self.portal = None;
        self.qparams = None;
        self.replied = false;
    }

    fn coder(&self) -> Coder<'_> {
        Coder::new(self.types.as_ref(), &*self.source, &*self.hooks)
    }

    fn unexpected(&self, msg: &BackendMessage) -> Error {
        Error::Protocol(format!(
            "unexpected {} message in {:?} phase",
            msg.name(),
            self.phase
        ))
    }
}
