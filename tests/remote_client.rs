use rust_decimal_macros::dec;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};

use stack::StoreError;
use stack::remote::{NewRecord, RemoteClient};
use stack::store::TransactionRepository;

/// Serves one canned response and hands back the raw request it received.
fn serve_once(status: &str, body: &str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let base = format!("http://{}", listener.local_addr().expect("addr"));
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream);
        let mut request = String::new();
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).expect("read line");
            if let Some((name, value)) = line.split_once(':') {
                if name.eq_ignore_ascii_case("content-length") {
                    content_length = value.trim().parse().expect("content length");
                }
            }
            let end = line == "\r\n" || line.is_empty();
            request.push_str(&line);
            if end {
                break;
            }
        }
        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).expect("read body");
        request.push_str(&String::from_utf8(body).expect("utf8 body"));

        let mut stream = reader.into_inner();
        stream.write_all(response.as_bytes()).expect("write");
        stream.flush().expect("flush");
        request
    });
    (base, handle)
}

const LIST_BODY: &str = r#"{"transactions":[
    {"userId":"u-1","sortKey":"txn#2025-10-28#1b0e6a4e-3c51-4d8e-9a43-7f2a1d5c9b10","txnId":"1b0e6a4e-3c51-4d8e-9a43-7f2a1d5c9b10","name":"Trader Joe's","amount":43.8,"date":"2025-10-28","category":"Groceries"},
    {"userId":"u-1","sortKey":"txn#2025-11-02#6f1d3c1e-8f0a-4f4e-9a55-1c2b3d4e5f60","txnId":"6f1d3c1e-8f0a-4f4e-9a55-1c2b3d4e5f60","name":"Uber","amount":22.4,"date":"2025-11-02"}
]}"#;

#[test]
fn list_sends_identity_and_default_page_size() {
    let (base, server) = serve_once("200 OK", LIST_BODY);
    let client = RemoteClient::new(&base, "u-1").unwrap();

    let records = client.list(None).unwrap();
    let request = server.join().unwrap();

    assert!(
        request.starts_with("GET /transactions?limit=25 "),
        "request: {request}"
    );
    assert!(
        request.to_ascii_lowercase().contains("x-user-id: u-1"),
        "request: {request}"
    );
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].category, "Groceries");
    assert_eq!(records[1].category, "Other");
}

#[test]
fn repository_view_is_newest_first_without_rewards() {
    let (base, server) = serve_once("200 OK", LIST_BODY);
    let client = RemoteClient::new(&base, "u-1").unwrap().with_page_size(10);

    let txns = client.fetch_transactions().unwrap();
    let request = server.join().unwrap();

    assert!(request.contains("limit=10"), "request: {request}");
    let names: Vec<&str> = txns.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["Uber", "Trader Joe's"]);
    assert_eq!(txns[0].amount, dec!(22.4));
    assert!(txns.iter().all(|t| t.card_id.is_none() && t.cashback.is_zero()));
}

#[test]
fn put_posts_json_record() {
    let body = r#"{"transaction":{"userId":"u-1","sortKey":"txn#2025-11-02#6f1d3c1e-8f0a-4f4e-9a55-1c2b3d4e5f60","txnId":"6f1d3c1e-8f0a-4f4e-9a55-1c2b3d4e5f60","name":"Uber","amount":22.4,"date":"2025-11-02","category":"Travel","createdAt":"2025-11-02T12:00:00Z"}}"#;
    let (base, server) = serve_once("201 Created", body);
    let client = RemoteClient::new(&format!("{base}/"), "u-1").unwrap();

    let stored = client
        .put(&NewRecord {
            name: "Uber".into(),
            amount: dec!(22.40),
            date: "2025-11-02".into(),
            category: Some("Travel".into()),
        })
        .unwrap();
    let request = server.join().unwrap();

    assert!(
        request.starts_with("POST /transactions "),
        "request: {request}"
    );
    assert!(request.contains(r#""name":"Uber""#), "request: {request}");
    assert!(request.contains(r#""category":"Travel""#), "request: {request}");
    assert_eq!(
        stored.sort_key,
        "txn#2025-11-02#6f1d3c1e-8f0a-4f4e-9a55-1c2b3d4e5f60"
    );
    assert_eq!(stored.created_at.as_deref(), Some("2025-11-02T12:00:00Z"));
}

#[test]
fn error_status_maps_to_remote_error() {
    let (base, server) = serve_once("400 Bad Request", r#"{"error":"amount is required"}"#);
    let client = RemoteClient::new(&base, "u-1").unwrap();

    let err = client
        .put(&NewRecord {
            name: "Uber".into(),
            amount: dec!(1),
            date: "2025-11-02".into(),
            category: None,
        })
        .unwrap_err();
    server.join().unwrap();

    match err {
        StoreError::Remote(msg) => {
            assert!(msg.contains("400"), "message: {msg}");
            assert!(msg.contains("amount is required"), "message: {msg}");
        }
        other => panic!("expected remote error, got {other:?}"),
    }
}
