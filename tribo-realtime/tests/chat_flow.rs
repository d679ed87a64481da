//! End-to-end scenarios over the service layer, wired against the in-memory
//! store and recording doubles. No database or live transport involved.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use tribo_realtime::live::{RecordedTarget, RecordingBroadcaster};
use tribo_realtime::models::{ChatRole, User};
use tribo_realtime::push::{PushDispatcher, RecordingPushGateway};
use tribo_realtime::services::chat_service::CreateChatInput;
use tribo_realtime::services::notification_service::NotificationInput;
use tribo_realtime::services::{ChatService, NotificationService};
use tribo_realtime::store::memory::MemoryStore;
use tribo_realtime::store::{ChatStore, NotificationStore};
use tribo_shared::types::auth::UserRole;
use tribo_shared::types::pagination::PageParams;

struct World {
    store: Arc<MemoryStore>,
    live: Arc<RecordingBroadcaster>,
    push: Arc<RecordingPushGateway>,
    chats: ChatService,
    notifications: NotificationService,
}

fn world() -> World {
    let store = Arc::new(MemoryStore::new());
    let live = Arc::new(RecordingBroadcaster::new());
    let push = Arc::new(RecordingPushGateway::new());
    let chats = ChatService::new(store.clone(), store.clone(), live.clone());
    let notifications = NotificationService::new(
        store.clone(),
        store.clone(),
        live.clone(),
        PushDispatcher::new(push.clone(), 100),
        50,
    );
    World {
        store,
        live,
        push,
        chats,
        notifications,
    }
}

fn user(world: &World, name: &str, token: Option<&str>) -> Uuid {
    let id = Uuid::new_v4();
    world.store.add_user(User {
        id,
        display_name: name.to_owned(),
        role: UserRole::User,
        push_token: token.map(str::to_owned),
        created_at: Utc::now(),
    });
    id
}

#[test]
fn group_chat_lifecycle() {
    let w = world();
    let alice = user(&w, "alice", None);
    let bob = user(&w, "bob", None);
    let carol = user(&w, "carol", None);

    let detail = w
        .chats
        .create_group_chat(
            alice,
            CreateChatInput {
                name: "weekend plans".into(),
                description: Some("where to?".into()),
                image_url: None,
                member_ids: vec![bob, carol],
            },
        )
        .unwrap();
    let chat_id = detail.chat.id;

    // conversation happens
    w.chats
        .send_message(chat_id, bob, "beach?".into(), None)
        .unwrap();
    w.chats
        .send_message(chat_id, carol, "mountains".into(), None)
        .unwrap();

    let page = w.chats.list_chats(alice, &PageParams::default()).unwrap();
    assert_eq!(page.data[0].unread_count, 2);
    assert_eq!(
        page.data[0].last_message.as_ref().unwrap().content,
        "mountains"
    );

    w.chats.mark_messages_read(chat_id, alice).unwrap();
    let page = w.chats.list_chats(alice, &PageParams::default()).unwrap();
    assert_eq!(page.data[0].unread_count, 0);

    // the only admin walks away; exactly one survivor inherits the role
    w.chats.leave_chat(chat_id, alice).unwrap();
    let members = w.store.list_members(chat_id).unwrap();
    assert_eq!(members.len(), 2);
    assert_eq!(
        members.iter().filter(|m| m.role == ChatRole::Admin).count(),
        1
    );

    // history survived the departure
    let history = w
        .chats
        .get_messages(chat_id, bob, &PageParams::default())
        .unwrap();
    assert_eq!(history.total, 2);
    assert_eq!(history.data[0].content, "beach?");

    // remaining members drain out; the last departure deletes the chat
    w.chats.leave_chat(chat_id, bob).unwrap();
    w.chats.leave_chat(chat_id, carol).unwrap();
    assert!(w.store.find_chat(chat_id).unwrap().is_none());
    let (messages, _) = w.store.list_messages(chat_id, 0, 10).unwrap();
    assert!(messages.is_empty());
}

#[test]
fn private_chat_then_group_listing_order() {
    let w = world();
    let alice = user(&w, "alice", None);
    let bob = user(&w, "bob", None);
    let carol = user(&w, "carol", None);

    let private = w.chats.create_private_chat(alice, bob).unwrap();
    let group = w
        .chats
        .create_group_chat(
            alice,
            CreateChatInput {
                name: "everyone".into(),
                description: None,
                image_url: None,
                member_ids: vec![bob, carol],
            },
        )
        .unwrap();

    // activity in the private chat bumps it to the top of alice's list
    w.chats
        .send_message(private.chat.id, bob, "ping".into(), None)
        .unwrap();

    let page = w.chats.list_chats(alice, &PageParams::default()).unwrap();
    assert_eq!(page.total, 2);
    assert_eq!(page.data[0].chat.id, private.chat.id);
    assert_eq!(page.data[1].chat.id, group.chat.id);
    // carol only sees the group
    let carol_page = w.chats.list_chats(carol, &PageParams::default()).unwrap();
    assert_eq!(carol_page.total, 1);
}

#[tokio::test]
async fn message_and_broadcast_reach_live_and_push() {
    let w = world();
    let alice = user(&w, "alice", Some("ExponentPushToken[alice]"));
    let bob = user(&w, "bob", Some("ExponentPushToken[bob]"));

    let detail = w.chats.create_private_chat(alice, bob).unwrap();
    w.chats
        .send_message(detail.chat.id, alice, "hi bob".into(), None)
        .unwrap();

    let events = w.live.events();
    assert!(events
        .iter()
        .any(|e| e.name == "message:new" && e.target == RecordedTarget::Chat(detail.chat.id)));
    assert!(events
        .iter()
        .any(|e| e.name == "chat:list-update" && e.target == RecordedTarget::User(bob)));

    w.notifications
        .broadcast(NotificationInput {
            title: "maintenance tonight".into(),
            body: "expect a short downtime".into(),
            icon: None,
            data: None,
        })
        .await
        .unwrap();

    assert_eq!(w.store.count_for_user(alice).unwrap(), 1);
    assert_eq!(w.store.count_for_user(bob).unwrap(), 1);
    assert!(w
        .live
        .events()
        .iter()
        .any(|e| e.name == "notification:new" && e.target == RecordedTarget::Global));

    let chunks = w.push.chunks();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].len(), 2);
}
