// tests/integration/admin_flow_test.rs

//! Integration tests for the admin console: identification, the single-admin
//! binding, multi-step commands, log downloads and shutdown.

use super::test_helpers::{ADMIN_NAME, TestClient, TestServer};
use doorwarden::core::access::ConfigDocument;
use doorwarden::connection::FILE_CHUNK_SIZE;
use doorwarden::core::protocol::Reply;

fn stored(server: &TestServer) -> ConfigDocument {
    let contents = std::fs::read_to_string(server.store_path()).unwrap();
    serde_json::from_str(&contents).unwrap()
}

#[tokio::test]
async fn test_identification() {
    let server = TestServer::start().await;
    let mut admin = server.admin().await;
    assert_eq!(admin.request("help").await, "Awaiting identification");
    assert_eq!(admin.request("wrongName").await, "Awaiting identification");
    assert_eq!(admin.request(ADMIN_NAME).await, "Admin identified");
    assert_eq!(admin.request("help").await, "Commands:");
    server.stop().await;
}

#[tokio::test]
async fn test_single_admin_binding() {
    let server = TestServer::start().await;
    let mut first = server.identified_admin().await;

    let mut second = TestClient::connect(server.admin_addr()).await;
    assert_eq!(second.read_text().await, "Another Admin is connected");
    second.assert_closed().await;

    assert_eq!(first.request("exit").await, "Goodbye");
    first.assert_closed().await;

    let mut third = server.identified_admin().await;
    assert_eq!(third.request("newDoor gate 1").await, "Door Added Successfully");
    server.stop().await;
}

#[tokio::test]
async fn test_binding_released_when_admin_drops() {
    let server = TestServer::start().await;
    let first = server.identified_admin().await;
    drop(first);

    server.wait_for_admin_release().await;
    let mut next = server.identified_admin().await;
    assert_eq!(next.request("newDoor gate 1").await, "Door Added Successfully");
    server.stop().await;
}

#[tokio::test]
async fn test_reconnect_right_after_hang_up_is_accepted() {
    let server = TestServer::start().await;
    let mut admin = server.identified_admin().await;

    for _ in 0..30 {
        admin.hang_up().await;
        admin.assert_closed().await;

        // No waiting: the binding is free once the server has closed.
        admin = TestClient::connect(server.admin_addr()).await;
        assert_eq!(admin.read_text().await, "Awaiting identification");
        assert_eq!(admin.request(ADMIN_NAME).await, "Admin identified");
    }
    server.stop().await;
}

#[tokio::test]
async fn test_pending_admin_loses_bind_race() {
    let server = TestServer::start().await;
    let mut early = server.admin().await;
    let _bound = server.identified_admin().await;

    assert_eq!(early.request(ADMIN_NAME).await, "Another Admin is connected");
    early.assert_closed().await;
    server.stop().await;
}

#[tokio::test]
async fn test_add_user_end_to_end() {
    let server = TestServer::start().await;
    let mut admin = server.identified_admin().await;

    assert_eq!(admin.request("newDoor frontDoor 3").await, "Door Added Successfully");
    assert_eq!(admin.request("newUser alice 5").await, "Scan credential");
    assert_eq!(admin.request("uid-1").await, "Confirm: approved|denied");
    assert_eq!(admin.request("approved").await, "User Added Successfully");

    let doc = stored(&server);
    assert_eq!(doc.doors[0].name, "front_door");
    assert_eq!(doc.doors[0].lvl, 3);
    assert_eq!(doc.users[0].uid, "uid-1");

    let mut reader = server.reader().await;
    assert_eq!(reader.request("FrontDoor:uid-1").await, "approved");
    server.stop().await;
}

#[tokio::test]
async fn test_remove_missing_door_does_not_touch_store() {
    let server = TestServer::start().await;
    let mut admin = server.identified_admin().await;
    assert_eq!(admin.request("newDoor gate 1").await, "Door Added Successfully");

    let before = std::fs::read(server.store_path()).unwrap();
    let mtime = std::fs::metadata(server.store_path()).unwrap().modified().unwrap();

    assert_eq!(admin.request("rmDoor nonexistent").await, "Door could not be found");

    assert_eq!(std::fs::read(server.store_path()).unwrap(), before);
    assert_eq!(
        std::fs::metadata(server.store_path()).unwrap().modified().unwrap(),
        mtime
    );
    server.stop().await;
}

#[tokio::test]
async fn test_duplicate_credential_rejected_at_commit() {
    let server = TestServer::start().await;
    let mut admin = server.identified_admin().await;
    server.state().access.add_user("alice", 5, "uid-1").await.unwrap();
    let before = std::fs::read(server.store_path()).unwrap();

    assert_eq!(admin.request("newUser mallory 9").await, "Scan credential");
    assert_eq!(admin.request("uid-1").await, "Confirm: approved|denied");
    assert_eq!(admin.request("approved").await, "Credential already assigned");
    assert_eq!(std::fs::read(server.store_path()).unwrap(), before);
    server.stop().await;
}

#[tokio::test]
async fn test_rename_and_remove_with_confirmation() {
    let server = TestServer::start().await;
    let mut admin = server.identified_admin().await;
    server.state().access.add_door("gate", 2).await.unwrap();
    server.state().access.add_user("alice", 5, "uid-1").await.unwrap();

    assert_eq!(admin.request("mvUser alice alicia 1").await, "Confirm: approved|denied");
    assert_eq!(admin.request("yes").await, "Operation failed - Incorrect CLI syntax");
    assert_eq!(admin.request("approved").await, "User Updated Successfully");

    let mut reader = server.reader().await;
    assert_eq!(reader.request("gate:uid-1").await, "denied");

    assert_eq!(admin.request("rmDoor gate").await, "Confirm: approved|denied");
    assert_eq!(admin.request("approved").await, "Door Removed Successfully");
    assert_eq!(reader.request("gate:uid-1").await, "Unknown Door");

    let doc = stored(&server);
    assert!(doc.doors.is_empty());
    assert_eq!(doc.users[0].name, "alicia");
    assert_eq!(doc.users[0].lvl, 1);
    server.stop().await;
}

#[tokio::test]
async fn test_syntax_errors_do_not_end_session() {
    let server = TestServer::start().await;
    let mut admin = server.identified_admin().await;
    assert_eq!(
        admin.request("newDoor door 256").await,
        "Operation failed - Incorrect CLI syntax"
    );
    assert_eq!(admin.request("openSesame").await, "Unknown Command");
    assert_eq!(admin.request("newDoor door 255").await, "Door Added Successfully");
    server.stop().await;
}

#[tokio::test]
async fn test_download_user_log() {
    let server = TestServer::start().await;
    let mut admin = server.identified_admin().await;
    server.state().access.add_door("frontdoor", 1).await.unwrap();
    server.state().access.add_user("alice", 5, "uid-1").await.unwrap();

    let mut reader = server.reader().await;
    assert_eq!(reader.request("frontdoor:uid-1").await, "approved");

    admin.send("getUserLog alice").await;
    let size = match admin.read_reply().await {
        Some(Reply::File { name, size }) => {
            assert_eq!(name, "Log_alice.csv");
            size
        }
        other => panic!("expected a file header, got {other:?}"),
    };
    let on_disk = std::fs::read(server.log_dir().join("userLogs/Log_alice.csv")).unwrap();
    assert_eq!(size as usize, on_disk.len());
    let body = admin.read_bytes(size as usize).await;
    assert_eq!(body, on_disk);
    assert!(body.starts_with(b"Date;Time;Door;Name;UserID;Access\n"));

    // The session carries on after the raw bytes.
    assert_eq!(admin.request("getSystemLog 1999-01-01").await, "Log could not be found");
    server.stop().await;
}

#[tokio::test]
async fn test_download_spanning_many_chunks() {
    let server = TestServer::start().await;
    let mut admin = server.identified_admin().await;

    let door_logs = server.log_dir().join("doorLogs");
    std::fs::create_dir_all(&door_logs).unwrap();
    let contents: Vec<u8> = (0..100_000u32).map(|i| b'a' + (i % 26) as u8).collect();
    assert!(contents.len() > 2 * FILE_CHUNK_SIZE);
    assert_ne!(contents.len() % FILE_CHUNK_SIZE, 0);
    std::fs::write(door_logs.join("Log_big.csv"), &contents).unwrap();

    admin.send("getDoorLog big").await;
    match admin.read_reply().await {
        Some(Reply::File { name, size }) => {
            assert_eq!(name, "Log_big.csv");
            assert_eq!(size, 100_000);
        }
        other => panic!("expected a file header, got {other:?}"),
    }
    assert_eq!(admin.read_bytes(contents.len()).await, contents);

    // No stray bytes after the body; the next frame is a normal reply.
    assert_eq!(admin.request("help").await, "Commands:");
    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_command_stops_server() {
    let mut server = TestServer::start().await;
    let mut admin = server.identified_admin().await;
    let mut reader = server.reader().await;

    assert_eq!(admin.request("shutdown").await, "Shutting Down...");
    admin.assert_closed().await;
    server.shutdown_requested().await;

    let client_addr = server.client_addr();
    server.stop().await;
    reader.assert_closed().await;
    assert!(tokio::net::TcpStream::connect(client_addr).await.is_err());
}
