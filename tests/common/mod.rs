//! A scripted in-process PostgreSQL server.
//!
//! Each test binds a listener on an ephemeral port and runs a script
//! task that speaks just enough of protocol v3 to drive the client
//! through the scenario under test. Assertions about what the client
//! sent live inside the script; the test joins the script task at the
//! end so script panics fail the test.

#![allow(dead_code)]

use std::collections::HashMap;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use actor_postgres::Opts;

/// Catalog rows served for the type bootstrap: (oid, typname, typsend).
pub const TYPE_ROWS: &[(&str, &str, &str)] = &[
    ("16", "bool", "boolsend"),
    ("17", "bytea", "byteasend"),
    ("20", "int8", "int8send"),
    ("21", "int2", "int2send"),
    ("23", "int4", "int4send"),
    ("25", "text", "textsend"),
    ("701", "float8", "float8send"),
];

/// Bind a listener on an ephemeral loopback port.
pub async fn listen() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Client options pointing at a mock server port.
pub fn opts(port: u16) -> Opts {
    Opts {
        hostname: "127.0.0.1".into(),
        port,
        username: "alice".into(),
        password: Some("secret".into()),
        database: Some("db".into()),
        ..Opts::default()
    }
}

pub struct MockServer {
    stream: TcpStream,
}

impl MockServer {
    pub async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = listener.accept().await.unwrap();
        Self { stream }
    }

    /// Read the unframed startup message and return its parameters.
    pub async fn read_startup(&mut self) -> HashMap<String, String> {
        let mut len_bytes = [0u8; 4];
        self.stream.read_exact(&mut len_bytes).await.unwrap();
        let len = i32::from_be_bytes(len_bytes) as usize;
        let mut body = vec![0u8; len - 4];
        self.stream.read_exact(&mut body).await.unwrap();

        let version = i32::from_be_bytes([body[0], body[1], body[2], body[3]]);
        assert_eq!(version, 196608, "protocol version 3.0");

        let mut params = HashMap::new();
        let mut rest = &body[4..];
        loop {
            let (name, after) = read_cstr(rest);
            if name.is_empty() {
                break;
            }
            let (value, after) = read_cstr(after);
            params.insert(name, value);
            rest = after;
        }
        params
    }

    /// Read one framed frontend message.
    pub async fn read_message(&mut self) -> (u8, Vec<u8>) {
        let mut header = [0u8; 5];
        self.stream.read_exact(&mut header).await.unwrap();
        let len = i32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
        let mut payload = vec![0u8; len - 4];
        self.stream.read_exact(&mut payload).await.unwrap();
        (header[0], payload)
    }

    /// Read frontend messages up to and including Sync.
    pub async fn read_until_sync(&mut self) -> Vec<(u8, Vec<u8>)> {
        let mut messages = Vec::new();
        loop {
            let (tag, payload) = self.read_message().await;
            let done = tag == b'S';
            messages.push((tag, payload));
            if done {
                return messages;
            }
        }
    }

    pub async fn send(&mut self, tag: u8, payload: &[u8]) {
        let mut bytes = vec![tag];
        bytes.extend_from_slice(&((payload.len() + 4) as i32).to_be_bytes());
        bytes.extend_from_slice(payload);
        self.stream.write_all(&bytes).await.unwrap();
    }

    /// Write raw bytes, for split-frame delivery.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    pub async fn send_auth_request(&mut self, scheme: i32, extra: &[u8]) {
        let mut payload = scheme.to_be_bytes().to_vec();
        payload.extend_from_slice(extra);
        self.send(b'R', &payload).await;
    }

    pub async fn send_parameter_status(&mut self, name: &str, value: &str) {
        let mut payload = Vec::new();
        push_cstr(&mut payload, name);
        push_cstr(&mut payload, value);
        self.send(b'S', &payload).await;
    }

    pub async fn send_ready(&mut self, status: u8) {
        self.send(b'Z', &[status]).await;
    }

    pub async fn send_error(&mut self, severity: &str, code: &str, message: &str) {
        let mut payload = Vec::new();
        payload.push(b'S');
        push_cstr(&mut payload, severity);
        payload.push(b'C');
        push_cstr(&mut payload, code);
        payload.push(b'M');
        push_cstr(&mut payload, message);
        payload.push(0);
        self.send(b'E', &payload).await;
    }

    pub async fn send_row_description(&mut self, columns: &[(&str, u32)]) {
        let mut payload = (columns.len() as u16).to_be_bytes().to_vec();
        for (name, type_oid) in columns {
            push_cstr(&mut payload, name);
            payload.extend_from_slice(&0_u32.to_be_bytes()); // table oid
            payload.extend_from_slice(&0_i16.to_be_bytes()); // column attr
            payload.extend_from_slice(&type_oid.to_be_bytes());
            payload.extend_from_slice(&(-1_i16).to_be_bytes()); // type size
            payload.extend_from_slice(&(-1_i32).to_be_bytes()); // type mod
            payload.extend_from_slice(&0_u16.to_be_bytes()); // format
        }
        self.send(b'T', &payload).await;
    }

    pub async fn send_data_row(&mut self, fields: &[Option<&[u8]>]) {
        let mut payload = (fields.len() as u16).to_be_bytes().to_vec();
        for field in fields {
            match field {
                Some(bytes) => {
                    payload.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
                    payload.extend_from_slice(bytes);
                }
                None => payload.extend_from_slice(&(-1_i32).to_be_bytes()),
            }
        }
        self.send(b'D', &payload).await;
    }

    pub async fn send_command_complete(&mut self, tag: &str) {
        let mut payload = Vec::new();
        push_cstr(&mut payload, tag);
        self.send(b'C', &payload).await;
    }

    pub async fn send_parameter_description(&mut self, oids: &[u32]) {
        let mut payload = (oids.len() as i16).to_be_bytes().to_vec();
        for oid in oids {
            payload.extend_from_slice(&oid.to_be_bytes());
        }
        self.send(b't', &payload).await;
    }

    /// Complete the auth exchange with AuthenticationOk and session setup.
    pub async fn finish_auth(&mut self) {
        self.send_auth_request(0, &[]).await;
        let mut key = 123_u32.to_be_bytes().to_vec();
        key.extend_from_slice(&777_u32.to_be_bytes());
        self.send(b'K', &key).await;
        self.send_parameter_status("server_version", "16.0").await;
        self.send_ready(b'I').await;
    }

    /// Serve the type bootstrap query after auth.
    pub async fn serve_bootstrap(&mut self) {
        let messages = self.read_until_sync().await;
        assert_eq!(messages[0].0, b'P', "bootstrap Parse");
        assert_eq!(messages[1].0, b'D', "bootstrap Describe");

        self.send(b'1', &[]).await; // ParseComplete
        self.send_parameter_description(&[]).await;
        self.send_row_description(&[("oid", 26), ("typname", 19), ("typsend", 24)])
            .await;
        self.send_ready(b'I').await;

        let messages = self.read_until_sync().await;
        assert_eq!(messages[0].0, b'B', "bootstrap Bind");
        self.send(b'2', &[]).await; // BindComplete
        for (oid, name, sender) in TYPE_ROWS {
            self.send_data_row(&[
                Some(oid.as_bytes()),
                Some(name.as_bytes()),
                Some(sender.as_bytes()),
            ])
            .await;
        }
        self.send_command_complete(&format!("SELECT {}", TYPE_ROWS.len()))
            .await;
        self.send_ready(b'I').await;
    }

    /// Accept a connection end-to-end: startup, password auth (md5),
    /// session setup, bootstrap.
    pub async fn establish(listener: &TcpListener) -> Self {
        let mut server = Self::accept(listener).await;
        let params = server.read_startup().await;
        assert_eq!(params.get("user").map(String::as_str), Some("alice"));
        assert_eq!(
            params.get("client_encoding").map(String::as_str),
            Some("UTF8")
        );

        server.finish_auth().await;
        server.serve_bootstrap().await;
        server
    }

    /// Serve one row-less statement, asserting its SQL, and complete it
    /// with `tag`.
    pub async fn serve_command(&mut self, expect_sql: &str, tag: &str) {
        let messages = self.read_until_sync().await;
        assert_eq!(messages[0].0, b'P');
        assert_eq!(parse_sql(&messages[0].1), expect_sql);

        self.send(b'1', &[]).await;
        self.send_parameter_description(&[]).await;
        self.send(b'n', &[]).await; // NoData
        self.send_ready(b'I').await;

        let messages = self.read_until_sync().await;
        assert_eq!(messages[0].0, b'B');
        self.send(b'2', &[]).await;
        self.send_command_complete(tag).await;
        self.send_ready(b'I').await;
    }

    /// Serve a single-column int4 select, asserting its SQL.
    pub async fn serve_int4_select(&mut self, expect_sql: &str, values: &[i32]) {
        let messages = self.read_until_sync().await;
        assert_eq!(messages[0].0, b'P');
        assert_eq!(parse_sql(&messages[0].1), expect_sql);

        self.send(b'1', &[]).await;
        self.send_parameter_description(&[]).await;
        self.send_row_description(&[("int4", 23)]).await;
        self.send_ready(b'I').await;

        let messages = self.read_until_sync().await;
        assert_eq!(messages[0].0, b'B');
        self.send(b'2', &[]).await;
        for value in values {
            self.send_data_row(&[Some(&value.to_be_bytes())]).await;
        }
        self.send_command_complete(&format!("SELECT {}", values.len()))
            .await;
        self.send_ready(b'I').await;
    }

    /// Expect the Terminate message and connection close.
    pub async fn expect_terminate(&mut self) {
        let (tag, _) = self.read_message().await;
        assert_eq!(tag, b'X');
    }
}

/// Extract the SQL text from a Parse message payload.
pub fn parse_sql(payload: &[u8]) -> String {
    let (_name, rest) = read_cstr_bytes(payload);
    let (sql, _) = read_cstr_bytes(rest);
    String::from_utf8(sql.to_vec()).unwrap()
}

/// Extract the parameter values from a Bind message payload.
pub fn parse_bind_params(payload: &[u8]) -> Vec<Option<Vec<u8>>> {
    let (_portal, rest) = read_cstr_bytes(payload);
    let (_statement, mut rest) = read_cstr_bytes(rest);

    let format_count = i16::from_be_bytes([rest[0], rest[1]]) as usize;
    rest = &rest[2 + format_count * 2..];

    let value_count = i16::from_be_bytes([rest[0], rest[1]]) as usize;
    rest = &rest[2..];

    let mut values = Vec::with_capacity(value_count);
    for _ in 0..value_count {
        let len = i32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]);
        rest = &rest[4..];
        if len == -1 {
            values.push(None);
        } else {
            values.push(Some(rest[..len as usize].to_vec()));
            rest = &rest[len as usize..];
        }
    }
    values
}

fn push_cstr(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
}

fn read_cstr(data: &[u8]) -> (String, &[u8]) {
    let (bytes, rest) = read_cstr_bytes(data);
    (String::from_utf8(bytes.to_vec()).unwrap(), rest)
}

fn read_cstr_bytes(data: &[u8]) -> (&[u8], &[u8]) {
    let pos = data.iter().position(|&b| b == 0).expect("null terminator");
    (&data[..pos], &data[pos + 1..])
}
