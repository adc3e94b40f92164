//! Roster management tests.

use stentor_client_api_proto::{ClientMsg, ErrorCode, ServerMsg, UserId};

use crate::{start_server, test_conf, TestClient};

#[actix_rt::test]
async fn join_ack_carries_the_roster() {
    let addr = start_server(test_conf());
    let mut a = TestClient::auth(addr, "a", "Alice").await;
    let mut b = TestClient::auth(addr, "b", "Bob").await;

    let (members, floor) = a.join("r1").await;
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].user_id, UserId::from("a"));
    assert_eq!(members[0].display_name, "Alice");
    assert!(floor.is_none());

    let (members, _) = b.join("r1").await;
    assert_eq!(members.len(), 2);
    assert!(members.iter().any(|m| m.user_id == UserId::from("b")));
}

#[actix_rt::test]
async fn earlier_members_observe_join_delta_and_snapshot() {
    let addr = start_server(test_conf());
    let mut a = TestClient::auth(addr, "a", "Alice").await;
    let mut b = TestClient::auth(addr, "b", "Bob").await;
    a.join("r1").await;

    b.join("r1").await;

    match a.recv().await {
        ServerMsg::MemberJoined { member, .. } => {
            assert_eq!(member.user_id, UserId::from("b"));
            assert_eq!(member.display_name, "Bob");
        }
        other => panic!("unexpected frame: {:?}", other),
    }
    match a.recv().await {
        ServerMsg::RoomMembers { members, .. } => {
            assert_eq!(members.len(), 2);
        }
        other => panic!("unexpected frame: {:?}", other),
    }
}

#[actix_rt::test]
async fn leave_notifies_the_remaining_roster() {
    let addr = start_server(test_conf());
    let mut a = TestClient::auth(addr, "a", "Alice").await;
    let mut b = TestClient::auth(addr, "b", "Bob").await;
    a.join("r1").await;
    b.join("r1").await;
    a.recv().await;
    a.recv().await;

    b.send(ClientMsg::LeaveRoom {
        room_id: "r1".into(),
    })
    .await;

    match a.recv().await {
        ServerMsg::MemberLeft { user_id, .. } => {
            assert_eq!(user_id, UserId::from("b"));
        }
        other => panic!("unexpected frame: {:?}", other),
    }
    match a.recv().await {
        ServerMsg::RoomMembers { members, .. } => {
            assert_eq!(members.len(), 1);
            assert_eq!(members[0].user_id, UserId::from("a"));
        }
        other => panic!("unexpected frame: {:?}", other),
    }
}

#[actix_rt::test]
async fn full_room_rejects_the_next_join() {
    let mut conf = test_conf();
    conf.rooms.max_connections = 2;
    let addr = start_server(conf);
    let mut a = TestClient::auth(addr, "a", "Alice").await;
    let mut b = TestClient::auth(addr, "b", "Bob").await;
    let mut c = TestClient::auth(addr, "c", "Carol").await;
    a.join("r1").await;
    b.join("r1").await;
    a.recv().await;
    a.recv().await;

    c.send(ClientMsg::JoinRoom {
        room_id: "r1".into(),
    })
    .await;

    match c.recv().await {
        ServerMsg::Error { code, message } => {
            assert_eq!(code, ErrorCode::RoomFull);
            assert!(message.to_lowercase().contains("at capacity"));
        }
        other => panic!("unexpected frame: {:?}", other),
    }
    // The roster is untouched: nobody observes a delta.
    a.expect_silence().await;
    b.expect_silence().await;
}

#[actix_rt::test]
async fn rejected_join_leaves_the_room_usable_for_others() {
    let mut conf = test_conf();
    conf.rooms.max_connections = 1;
    let addr = start_server(conf);
    let mut a = TestClient::auth(addr, "a", "Alice").await;
    let mut b = TestClient::auth(addr, "b", "Bob").await;
    a.join("r1").await;

    b.send(ClientMsg::JoinRoom {
        room_id: "r1".into(),
    })
    .await;
    assert!(matches!(
        b.recv().await,
        ServerMsg::Error {
            code: ErrorCode::RoomFull,
            ..
        },
    ));

    // The rejected client is free to join another room.
    let (members, _) = b.join("r2").await;
    assert_eq!(members.len(), 1);
}
