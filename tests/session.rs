//! End-to-end session tests against a scripted mock server.

mod common;

use actor_postgres::{Client, Error, Value};
use common::{listen, opts, parse_bind_params, parse_sql, MockServer};

#[tokio::test]
async fn test_connect_md5_and_select() {
    let (listener, port) = listen().await;

    let script = tokio::spawn(async move {
        let mut server = MockServer::accept(&listener).await;
        let params = server.read_startup().await;
        assert_eq!(params.get("user").map(String::as_str), Some("alice"));
        assert_eq!(params.get("database").map(String::as_str), Some("db"));

        // MD5 challenge with a fixed salt; the response is fully
        // determined by (user, password, salt).
        server
            .send_auth_request(5, &[0x12, 0x34, 0x56, 0x78])
            .await;
        let (tag, payload) = server.read_message().await;
        assert_eq!(tag, b'p');
        assert_eq!(payload, b"md51b28a7c92eb5e95d85e9b9093da502a9\0");

        server.finish_auth().await;
        server.serve_bootstrap().await;

        server.serve_int4_select("SELECT 1::int4", &[1]).await;
        server.expect_terminate().await;
    });

    let client = Client::connect(opts(port)).await.unwrap();
    let result = client.query("SELECT 1::int4", Vec::new()).await.unwrap();

    assert_eq!(result.command.as_deref(), Some("select"));
    assert_eq!(result.num_rows, 1);
    assert_eq!(result.rows, Some(vec![vec![Value::Int4(1)]]));
    assert_eq!(result.columns, Some(vec!["int4".to_string()]));

    client.stop().await.unwrap();
    script.await.unwrap();
}

#[tokio::test]
async fn test_cleartext_auth() {
    let (listener, port) = listen().await;

    let script = tokio::spawn(async move {
        let mut server = MockServer::accept(&listener).await;
        server.read_startup().await;

        server.send_auth_request(3, &[]).await;
        let (tag, payload) = server.read_message().await;
        assert_eq!(tag, b'p');
        assert_eq!(payload, b"secret\0");

        server.finish_auth().await;
        server.serve_bootstrap().await;
        server.expect_terminate().await;
    });

    let client = Client::connect(opts(port)).await.unwrap();
    client.stop().await.unwrap();
    script.await.unwrap();
}

#[tokio::test]
async fn test_connect_rejected_by_server() {
    let (listener, port) = listen().await;

    let script = tokio::spawn(async move {
        let mut server = MockServer::accept(&listener).await;
        server.read_startup().await;
        server
            .send_error("FATAL", "28P01", "password authentication failed")
            .await;
    });

    let err = Client::connect(opts(port)).await.unwrap_err();
    let fields = err.postgres().expect("server error");
    assert_eq!(fields.code(), Some("28P01"));
    script.await.unwrap();
}

#[tokio::test]
async fn test_bound_parameters_reach_the_wire() {
    let (listener, port) = listen().await;

    let script = tokio::spawn(async move {
        let mut server = MockServer::establish(&listener).await;

        let messages = server.read_until_sync().await;
        assert_eq!(parse_sql(&messages[0].1), "SELECT $1::int4, $2::text");
        server.send(b'1', &[]).await;
        server.send_parameter_description(&[23, 25]).await;
        server
            .send_row_description(&[("int4", 23), ("text", 25)])
            .await;
        server.send_ready(b'I').await;

        let messages = server.read_until_sync().await;
        assert_eq!(messages[0].0, b'B');
        let params = parse_bind_params(&messages[0].1);
        assert_eq!(
            params,
            vec![Some(vec![0, 0, 0, 42]), Some(b"hello".to_vec())]
        );

        server.send(b'2', &[]).await;
        server
            .send_data_row(&[Some(&42_i32.to_be_bytes()), Some(b"hello")])
            .await;
        server.send_command_complete("SELECT 1").await;
        server.send_ready(b'I').await;

        server.expect_terminate().await;
    });

    let client = Client::connect(opts(port)).await.unwrap();
    let result = client
        .query(
            "SELECT $1::int4, $2::text",
            vec![Value::Int4(42), Value::Text("hello".into())],
        )
        .await
        .unwrap();

    assert_eq!(
        result.rows,
        Some(vec![vec![Value::Int4(42), Value::Text("hello".into())]])
    );

    client.stop().await.unwrap();
    script.await.unwrap();
}

#[tokio::test]
async fn test_null_round_trip() {
    let (listener, port) = listen().await;

    let script = tokio::spawn(async move {
        let mut server = MockServer::establish(&listener).await;

        let messages = server.read_until_sync().await;
        assert_eq!(parse_sql(&messages[0].1), "SELECT $1::int4");
        server.send(b'1', &[]).await;
        server.send_parameter_description(&[23]).await;
        server.send_row_description(&[("int4", 23)]).await;
        server.send_ready(b'I').await;

        let messages = server.read_until_sync().await;
        let params = parse_bind_params(&messages[0].1);
        assert_eq!(params, vec![None]);

        server.send(b'2', &[]).await;
        server.send_data_row(&[None]).await;
        server.send_command_complete("SELECT 1").await;
        server.send_ready(b'I').await;

        server.expect_terminate().await;
    });

    let client = Client::connect(opts(port)).await.unwrap();
    let result = client
        .query("SELECT $1::int4", vec![Value::Null])
        .await
        .unwrap();
    assert_eq!(result.rows, Some(vec![vec![Value::Null]]));

    client.stop().await.unwrap();
    script.await.unwrap();
}

#[tokio::test]
async fn test_server_error_then_next_query_succeeds() {
    let (listener, port) = listen().await;

    let script = tokio::spawn(async move {
        let mut server = MockServer::establish(&listener).await;

        // The statement never parses; the first Sync still gets its
        // ReadyForQuery.
        let messages = server.read_until_sync().await;
        assert_eq!(parse_sql(&messages[0].1), "SELECT nope");
        server.send_error("ERROR", "42703", "column \"nope\" does not exist")
            .await;
        server.send_ready(b'I').await;

        server.serve_int4_select("SELECT 2::int4", &[2]).await;
        server.expect_terminate().await;
    });

    let client = Client::connect(opts(port)).await.unwrap();

    let err = client.query("SELECT nope", Vec::new()).await.unwrap_err();
    let fields = err.postgres().expect("server error");
    assert_eq!(fields.code(), Some("42703"));
    assert_eq!(fields.message(), Some("column \"nope\" does not exist"));

    let result = client.query("SELECT 2::int4", Vec::new()).await.unwrap();
    assert_eq!(result.rows, Some(vec![vec![Value::Int4(2)]]));

    client.stop().await.unwrap();
    script.await.unwrap();
}

#[tokio::test]
async fn test_encode_failure_then_next_query_succeeds() {
    let (listener, port) = listen().await;

    let script = tokio::spawn(async move {
        let mut server = MockServer::establish(&listener).await;

        // The describe flow completes, but the client cannot encode a
        // bool as int4, so no Bind arrives before the next request.
        let messages = server.read_until_sync().await;
        assert_eq!(parse_sql(&messages[0].1), "SELECT $1::int4");
        server.send(b'1', &[]).await;
        server.send_parameter_description(&[23]).await;
        server.send_row_description(&[("int4", 23)]).await;
        server.send_ready(b'I').await;

        server.serve_int4_select("SELECT 3::int4", &[3]).await;
        server.expect_terminate().await;
    });

    let client = Client::connect(opts(port)).await.unwrap();

    let err = client
        .query("SELECT $1::int4", vec![Value::Bool(true)])
        .await
        .unwrap_err();
    match err {
        Error::Encode(msg) => {
            assert_eq!(msg, "unable to encode value true as type int4");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let result = client.query("SELECT 3::int4", Vec::new()).await.unwrap();
    assert_eq!(result.rows, Some(vec![vec![Value::Int4(3)]]));

    client.stop().await.unwrap();
    script.await.unwrap();
}

#[tokio::test]
async fn test_parameter_status_updates_between_requests() {
    let (listener, port) = listen().await;

    let script = tokio::spawn(async move {
        let mut server = MockServer::establish(&listener).await;

        // Deliver a ParameterStatus in three raw fragments ahead of the
        // query response: reassembly must stitch it back together.
        let payload = b"application_name\0refinery\0";
        let mut frame = vec![b'S'];
        frame.extend_from_slice(&((payload.len() + 4) as i32).to_be_bytes());
        frame.extend_from_slice(payload);

        let messages = server.read_until_sync().await;
        assert_eq!(parse_sql(&messages[0].1), "SELECT 1::int4");
        server.send_raw(&frame[..1]).await;
        server.send_raw(&frame[1..4]).await;
        server.send_raw(&frame[4..]).await;

        server.send(b'1', &[]).await;
        server.send_parameter_description(&[]).await;
        server.send_row_description(&[("int4", 23)]).await;
        server.send_ready(b'I').await;

        let messages = server.read_until_sync().await;
        assert_eq!(messages[0].0, b'B');
        server.send(b'2', &[]).await;
        server.send_data_row(&[Some(&1_i32.to_be_bytes())]).await;
        server.send_command_complete("SELECT 1").await;
        server.send_ready(b'I').await;

        server.expect_terminate().await;
    });

    let client = Client::connect(opts(port)).await.unwrap();

    let before = client.parameters().await.unwrap();
    assert_eq!(
        before,
        vec![("server_version".to_string(), "16.0".to_string())]
    );

    client.query("SELECT 1::int4", Vec::new()).await.unwrap();

    let after = client.parameters().await.unwrap();
    assert_eq!(
        after,
        vec![
            ("application_name".to_string(), "refinery".to_string()),
            ("server_version".to_string(), "16.0".to_string()),
        ]
    );

    client.stop().await.unwrap();
    script.await.unwrap();
}

#[tokio::test]
async fn test_empty_query() {
    let (listener, port) = listen().await;

    let script = tokio::spawn(async move {
        let mut server = MockServer::establish(&listener).await;

        let messages = server.read_until_sync().await;
        assert_eq!(parse_sql(&messages[0].1), "");
        server.send(b'1', &[]).await;
        server.send_parameter_description(&[]).await;
        server.send(b'n', &[]).await;
        server.send_ready(b'I').await;

        let messages = server.read_until_sync().await;
        assert_eq!(messages[0].0, b'B');
        server.send(b'2', &[]).await;
        server.send(b'I', &[]).await; // EmptyQueryResponse
        server.send_ready(b'I').await;

        server.expect_terminate().await;
    });

    let client = Client::connect(opts(port)).await.unwrap();
    let result = client.query("", Vec::new()).await.unwrap();

    assert_eq!(result.command, None);
    assert_eq!(result.num_rows, 0);
    assert_eq!(result.rows, None);
    assert_eq!(result.columns, None);

    client.stop().await.unwrap();
    script.await.unwrap();
}

#[tokio::test]
async fn test_queries_answered_in_call_order() {
    let (listener, port) = listen().await;

    let script = tokio::spawn(async move {
        let mut server = MockServer::establish(&listener).await;
        for i in 0..5 {
            server
                .serve_int4_select(&format!("SELECT {i}::int4"), &[i])
                .await;
        }
        server.expect_terminate().await;
    });

    let client = Client::connect(opts(port)).await.unwrap();
    for i in 0..5 {
        let result = client
            .query(&format!("SELECT {i}::int4"), Vec::new())
            .await
            .unwrap();
        assert_eq!(result.rows, Some(vec![vec![Value::Int4(i)]]));
    }

    client.stop().await.unwrap();
    script.await.unwrap();
}
