//! An actor-based PostgreSQL client driver.
//!
//! # Features
//!
//! - **Sans-I/O protocol engine**: the wire protocol v3 state machine is
//!   separated from all socket handling and fully unit-testable
//! - **Single-owner session actor**: one tokio task owns the socket and
//!   serializes caller requests, so callers never observe torn state
//! - **Per-session type registry**: the server's `pg_type` catalog is
//!   discovered at connect time; codecs dispatch on sender names
//! - **Pluggable value mapping**: encoder/decoder/format hooks and the
//!   whole type source can be replaced per connection
//! - **Savepoint-nested transactions**: `begin`/`commit`/`rollback`
//!   nest through savepoints with deferred inner commits
//!
//! # Example
//!
//! ```no_run
//! use actor_postgres::{Client, Opts, Value};
//!
//! # async fn app() -> actor_postgres::Result<()> {
//! let client = Client::connect(Opts {
//!     hostname: "localhost".into(),
//!     username: "postgres".into(),
//!     password: Some("secret".into()),
//!     database: Some("mydb".into()),
//!     ..Opts::default()
//! })
//! .await?;
//!
//! let result = client
//!     .query("SELECT id, name FROM users WHERE id = $1", vec![Value::Int4(1)])
//!     .await?;
//! println!("{:?}", result.rows);
//!
//! client.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod coder;
mod conn;
mod engine;
pub mod error;
pub mod framing;
pub mod opts;
pub mod protocol;
mod result;
mod transaction;
pub mod types;
pub mod value;

pub use coder::{DefaultHooks, ValueHooks};
pub use conn::Client;
pub use error::{Error, Result, ServerError};
pub use opts::Opts;
pub use protocol::types::{FormatCode, Oid, TransactionStatus};
pub use result::QueryResult;
pub use types::{PgTypes, TypeInfo, TypeRegistry, TypeSource};
pub use value::Value;
