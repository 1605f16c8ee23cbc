// tests/integration/client_flow_test.rs

//! Integration tests for the reader port: decisions, malformed requests,
//! audit records and frame limits.

use super::test_helpers::TestServer;

async fn seeded() -> TestServer {
    let server = TestServer::start().await;
    let access = &server.state().access;
    access.add_door("frontdoor", 3).await.unwrap();
    access.add_door("mainHall", 1).await.unwrap();
    access.add_user("alice", 5, "uid-1").await.unwrap();
    access.add_user("bob", 2, "uid-2").await.unwrap();
    server
}

#[tokio::test]
async fn test_reader_decisions() {
    let server = seeded().await;
    let mut reader = server.reader().await;

    assert_eq!(reader.request("frontdoor:uid-1").await, "approved");
    assert_eq!(reader.request("frontdoor:uid-2").await, "denied");
    assert_eq!(reader.request("frontdoor:uid-404").await, "denied");
    assert_eq!(reader.request("backdoor:uid-1").await, "Unknown Door");
    // Door names are normalized, credentials are not.
    assert_eq!(reader.request("MainHall:uid-2").await, "approved");
    assert_eq!(reader.request("main_hall:UID-2").await, "denied");

    server.stop().await;
}

#[tokio::test]
async fn test_malformed_request_closes_connection() {
    let server = seeded().await;

    for frame in ["noseparator", ":uid-1", "frontdoor:"] {
        let mut reader = server.reader().await;
        assert_eq!(
            reader.request(frame).await,
            "Invalid Client Package Syntax - Connection Closed"
        );
        reader.assert_closed().await;
    }

    // Other readers are unaffected.
    let mut reader = server.reader().await;
    assert_eq!(reader.request("frontdoor:uid-1").await, "approved");
    server.stop().await;
}

#[tokio::test]
async fn test_decisions_are_audited() {
    let server = seeded().await;
    let mut reader = server.reader().await;
    assert_eq!(reader.request("frontdoor:uid-1").await, "approved");
    assert_eq!(reader.request("frontdoor:uid-2").await, "denied");

    let today = chrono::Local::now().format("%Y_%m_%d").to_string();
    let system_log = server
        .log_dir()
        .join("systemLogs")
        .join(format!("Log_{today}.csv"));
    let contents = std::fs::read_to_string(system_log).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines[0], "Date;Time;Door;Name;UserID;Access");
    assert!(lines[1].ends_with(";frontdoor;alice;uid-1;approved"));
    assert!(lines[2].ends_with(";frontdoor;bob;uid-2;denied"));

    let user_log = server.log_dir().join("userLogs").join("Log_alice.csv");
    assert_eq!(std::fs::read_to_string(user_log).unwrap().lines().count(), 2);
    server.stop().await;
}

#[tokio::test]
async fn test_unknown_doors_do_not_create_door_logs() {
    let server = seeded().await;
    let mut reader = server.reader().await;
    for i in 0..20 {
        assert_eq!(reader.request(&format!("bogus{i}:uid-1")).await, "Unknown Door");
    }

    let door_logs = server.log_dir().join("doorLogs");
    let files = match std::fs::read_dir(&door_logs) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    };
    assert_eq!(files, 0);

    // Registered doors still get their own file.
    assert_eq!(reader.request("frontdoor:uid-1").await, "approved");
    assert!(door_logs.join("Log_frontdoor.csv").exists());
    server.stop().await;
}

#[tokio::test]
async fn test_overlong_frame_closes_connection() {
    let server = TestServer::with_config(|config| config.max_frame_length = 128).await;
    let mut reader = server.reader().await;
    reader.send_raw(&[b'x'; 4096]).await;
    reader.assert_closed().await;
    server.stop().await;
}

#[tokio::test]
async fn test_connection_counters() {
    let server = seeded().await;
    for _ in 0..3 {
        let mut reader = server.reader().await;
        assert_eq!(reader.request("frontdoor:uid-1").await, "approved");
    }
    let stats = &server.state().stats;
    assert!(stats.get_total_connections() >= 3);
    assert!(stats.get_total_frames() >= 3);
    server.stop().await;
}
