// tests/integration/concurrency_test.rs

//! Concurrency tests: many readers authorizing while the admin edits the
//! registry, and many connections opening and closing at once.

use super::test_helpers::{TestClient, TestServer, wait_for};
use tokio::task::JoinSet;

const READERS: usize = 16;
const REQUESTS_PER_READER: usize = 50;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_edits_never_expose_missing_door() {
    let server = TestServer::start().await;
    server.state().access.add_door("gate", 1).await.unwrap();
    for i in 0..READERS {
        server
            .state()
            .access
            .add_user(&format!("user{i}"), (i % 10) as u8, &format!("uid-{i}"))
            .await
            .unwrap();
    }

    let mut readers = JoinSet::new();
    for i in 0..READERS {
        let mut reader = server.reader().await;
        readers.spawn(async move {
            let mut replies = Vec::with_capacity(REQUESTS_PER_READER);
            for _ in 0..REQUESTS_PER_READER {
                replies.push(reader.request(&format!("gate:uid-{i}")).await);
            }
            replies
        });
    }

    let mut admin = server.identified_admin().await;
    for level in [9u8, 1, 5, 1] {
        assert_eq!(
            admin.request(&format!("mvDoor gate gate {level}")).await,
            "Confirm: approved|denied"
        );
        assert_eq!(admin.request("approved").await, "Door Updated Successfully");
    }

    while let Some(result) = readers.join_next().await {
        for reply in result.unwrap() {
            assert!(
                reply == "approved" || reply == "denied",
                "unexpected reply {reply:?} during an edit"
            );
        }
    }

    let door = server.state().access.door("gate").await.unwrap();
    assert_eq!(door.level, 1);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mutations_are_serialized() {
    let server = TestServer::start().await;
    let access = server.state().access.clone();

    let mut tasks = JoinSet::new();
    for i in 0..32 {
        let access = access.clone();
        tasks.spawn(async move { access.add_door(&format!("door{i}"), 1).await });
    }
    while let Some(result) = tasks.join_next().await {
        result.unwrap().unwrap();
    }

    // Every commit landed in the file, none overwrote another.
    let contents = std::fs::read_to_string(server.store_path()).unwrap();
    let doc: doorwarden::core::access::ConfigDocument = serde_json::from_str(&contents).unwrap();
    assert_eq!(doc.doors.len(), 32);
    assert_eq!(access.snapshot().await.door_count(), 32);
    server.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_connection_churn() {
    let server = TestServer::start().await;
    server.state().access.add_door("gate", 1).await.unwrap();
    server.state().access.add_user("alice", 1, "uid-1").await.unwrap();

    let addr = server.client_addr();
    let mut clients = JoinSet::new();
    for _ in 0..64 {
        clients.spawn(async move {
            let mut reader = TestClient::connect(addr).await;
            reader.request("gate:uid-1").await
        });
    }
    while let Some(reply) = clients.join_next().await {
        assert_eq!(reply.unwrap(), "approved");
    }

    // Each client hung up after its reply; the registry drains.
    let listener = server.client_listener();
    wait_for(|| listener.connection_count() == 0).await;
    server.stop().await;
}
