/// The same contract checks run against both store adapters.

use std::sync::Arc;

use argon2::Params;
use chrono::{Duration, Utc};
use serde_json::json;

use parley_db::{Database, MemoryStore, Passwords};
use parley_types::store::{LoginVerdict, Registration, Store};
use parley_types::{Envelope, Kind, Profile};

fn passwords() -> Passwords {
    Passwords::with_params(Params::new(Params::MIN_M_COST, Params::MIN_T_COST, 1, None).unwrap())
}

fn stores() -> Vec<(&'static str, Arc<dyn Store>)> {
    vec![
        ("sqlite", Arc::new(Database::open_in_memory(passwords()).unwrap())),
        ("memory", Arc::new(MemoryStore::new(passwords()))),
    ]
}

fn text(from: &str, to: &str, body: &str, offset_secs: i64) -> Envelope {
    let mut env = Envelope::new(Kind::Text, from, json!(body));
    env.to = Some(to.to_string());
    env.timestamp = Utc::now() + Duration::seconds(offset_secs);
    env
}

#[test]
fn username_uniqueness_is_a_conflict_not_an_error() {
    for (name, store) in stores() {
        assert_eq!(store.register_user("alice", "secret1").unwrap(), Registration::Created, "{name}");
        assert_eq!(store.register_user("alice", "secret2").unwrap(), Registration::Conflict, "{name}");
    }
}

#[test]
fn login_verifies_against_the_hash() {
    for (name, store) in stores() {
        store.register_user("bob", "hunter22").unwrap();
        assert_eq!(store.login_user("bob", "hunter22").unwrap(), LoginVerdict::Verified, "{name}");
        assert_eq!(store.login_user("bob", "hunter23").unwrap(), LoginVerdict::Rejected, "{name}");
        assert_eq!(store.login_user("ghost", "hunter22").unwrap(), LoginVerdict::Rejected, "{name}");
    }
}

#[test]
fn history_is_ascending_limited_and_pair_scoped() {
    for (name, store) in stores() {
        // Saved out of order on purpose
        store.save_message(&text("a", "b", "third", 30)).unwrap();
        store.save_message(&text("a", "b", "first", 10)).unwrap();
        store.save_message(&text("b", "a", "second", 20)).unwrap();
        store.save_message(&text("a", "c", "elsewhere", 15)).unwrap();
        store.save_message(&text("c", "b", "elsewhere too", 25)).unwrap();

        let all = store.get_message_history("a", "b", 100).unwrap();
        let bodies: Vec<&str> = all.iter().map(|m| m.content_str()).collect();
        assert_eq!(bodies, ["first", "second", "third"], "{name}");

        // Same conversation from the other side
        assert_eq!(store.get_message_history("b", "a", 100).unwrap().len(), 3, "{name}");

        let newest_two = store.get_message_history("a", "b", 2).unwrap();
        let bodies: Vec<&str> = newest_two.iter().map(|m| m.content_str()).collect();
        assert_eq!(bodies, ["second", "third"], "{name}");

        for m in &all {
            let pair = (m.from.as_str(), m.to.as_deref().unwrap());
            assert!(pair == ("a", "b") || pair == ("b", "a"), "{name}: {:?}", pair);
        }
    }
}

#[test]
fn stored_messages_keep_their_metadata() {
    for (name, store) in stores() {
        let mut env = text("a", "b", "with extras", 0);
        env.reply_to = Some("m-0".into());
        env.attachments = vec!["file://x.png".into()];
        env.reactions.insert("b".into(), "+1".into());
        store.save_message(&env).unwrap();

        let back = store.get_message_history("a", "b", 10).unwrap().remove(0);
        assert_eq!(back.id, env.id, "{name}");
        assert_eq!(back.kind, Kind::Text, "{name}");
        assert_eq!(back.reply_to.as_deref(), Some("m-0"), "{name}");
        assert_eq!(back.attachments, env.attachments, "{name}");
        assert_eq!(back.reactions.get("b").map(String::as_str), Some("+1"), "{name}");
        assert_eq!(back.timestamp.timestamp_micros(), env.timestamp.timestamp_micros(), "{name}");
    }
}

#[test]
fn mark_read_only_touches_one_direction() {
    for (name, store) in stores() {
        store.save_message(&text("a", "b", "1", 1)).unwrap();
        store.save_message(&text("a", "b", "2", 2)).unwrap();
        store.save_message(&text("b", "a", "3", 3)).unwrap();

        assert_eq!(store.mark_messages_as_read("a", "b").unwrap(), 2, "{name}");
        assert_eq!(store.mark_messages_as_read("a", "b").unwrap(), 0, "{name}");

        let history = store.get_message_history("a", "b", 10).unwrap();
        for m in history {
            assert_eq!(m.read, m.from == "a", "{name}");
        }
    }
}

#[test]
fn profile_updates_leave_premium_alone() {
    for (name, store) in stores() {
        store.register_user("carol", "secret1").unwrap();

        let mut update = Profile::new("carol");
        update.bio = Some("hello".into());
        update.avatar_kind = "image".into();
        update.premium = true;
        store.update_user_profile(&update).unwrap();

        let stored = store.get_user_profile("carol").unwrap().unwrap();
        assert_eq!(stored.bio.as_deref(), Some("hello"), "{name}");
        assert_eq!(stored.avatar_kind, "image", "{name}");
        assert!(!stored.premium, "{name}");

        assert!(store.get_user_profile("nobody").unwrap().is_none(), "{name}");
    }
}

#[test]
fn sessions_are_created_and_removed() {
    let db = Database::open_in_memory(passwords()).unwrap();
    db.create_session("s-1", "dave", "127.0.0.1:5000").unwrap();
    db.create_session("s-2", "dave", "127.0.0.1:5001").unwrap();
    assert_eq!(db.get_sessions_for("dave").unwrap().len(), 2);

    db.remove_session("s-1").unwrap();
    let left = db.get_sessions_for("dave").unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, "s-2");

    let mem = MemoryStore::new(passwords());
    mem.create_session("s-1", "dave", "127.0.0.1:5000").unwrap();
    mem.remove_session("s-1").unwrap();
    assert!(mem.sessions_for("dave").unwrap().is_empty());
}

#[test]
fn message_ids_only_need_to_be_unique_per_conversation() {
    for (name, store) in stores() {
        let mut first = text("alice", "bob", "for bob", 0);
        first.id = "1".into();
        let mut second = text("carol", "dave", "for dave", 1);
        second.id = "1".into();

        store.save_message(&first).unwrap();
        store.save_message(&second).unwrap();

        let history = store.get_message_history("dave", "carol", 10).unwrap();
        assert_eq!(history.len(), 1, "{name}");
        assert_eq!(history[0].id, "1", "{name}");
        assert_eq!(history[0].content, json!("for dave"), "{name}");
        assert_eq!(store.get_message_history("alice", "bob", 10).unwrap().len(), 1, "{name}");
    }
}

#[test]
fn touching_a_session_moves_last_activity() {
    let db = Database::open_in_memory(passwords()).unwrap();
    db.create_session("s-1", "erin", "127.0.0.1:5000").unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    db.touch_session("s-1").unwrap();
    db.touch_session("missing").unwrap();

    let rows = db.get_sessions_for("erin").unwrap();
    assert!(rows[0].last_activity > rows[0].connected_at);

    let mem = MemoryStore::new(passwords());
    mem.create_session("s-1", "erin", "127.0.0.1:5000").unwrap();
    std::thread::sleep(std::time::Duration::from_millis(5));
    mem.touch_session("s-1").unwrap();

    let sessions = mem.sessions_for("erin").unwrap();
    assert!(sessions[0].last_activity > sessions[0].connected_at);
}
