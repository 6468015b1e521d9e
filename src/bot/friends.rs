//! Symmetric friendships created by redeeming another user's friend code.
use chrono::{DateTime, Utc};
use log::debug;

use crate::bot::errors::CommandError;
use crate::storage::{BotStore, StoreError, UserRecord};
use crate::validation::normalize_friend_code;

#[derive(Debug, Clone, PartialEq)]
pub enum RedeemOutcome {
    Added(UserRecord),
    AlreadyFriends(UserRecord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendEntry {
    pub display_name: String,
    pub friend_code: String,
}

/// Befriend the owner of `code`. Redeeming a code twice is harmless.
pub fn redeem(
    store: &BotStore,
    user: &UserRecord,
    code: &str,
    now: DateTime<Utc>,
) -> Result<RedeemOutcome, CommandError> {
    let Some(code) = normalize_friend_code(code) else {
        return Err(CommandError::validation("Friend codes are 8 letters or digits."));
    };
    let Some(owner) = store.user_by_friend_code(&code)? else {
        return Err(CommandError::not_found(format!("No one has the friend code {}.", code)));
    };
    if owner.chat_id == user.chat_id {
        return Err(CommandError::validation("That's your own friend code."));
    }
    let created = match store.add_friendship(&user.chat_id, &owner.chat_id, now) {
        Ok(created) => created,
        // The owner deleted their account after the code lookup.
        Err(StoreError::NotFound(_)) => {
            return Err(CommandError::not_found(format!("No one has the friend code {}.", code)))
        }
        Err(e) => return Err(e.into()),
    };
    debug!("friendship {} <-> {} created={}", user.chat_id, owner.chat_id, created);
    Ok(if created {
        RedeemOutcome::Added(owner)
    } else {
        RedeemOutcome::AlreadyFriends(owner)
    })
}

/// Friends of `user`, sorted by display name. Edges whose other end no longer
/// exists are skipped.
pub fn list(store: &BotStore, user: &UserRecord) -> Result<Vec<FriendEntry>, StoreError> {
    let mut entries = Vec::new();
    for friend_id in store.list_friend_ids(&user.chat_id)? {
        if let Some(friend) = store.get_user(&friend_id)? {
            entries.push(FriendEntry {
                display_name: friend.display_name,
                friend_code: friend.friend_code,
            });
        }
    }
    entries.sort_by_key(|e| e.display_name.to_lowercase());
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::BotStoreBuilder;
    use tempfile::TempDir;

    fn setup() -> (TempDir, BotStore, UserRecord, UserRecord) {
        let dir = TempDir::new().expect("tempdir");
        let store = BotStoreBuilder::new(dir.path()).without_quest_seed().open().expect("store");
        let a = UserRecord::new("a", "Alice", "AAAA1111", Utc::now());
        let b = UserRecord::new("b", "Bob", "BBBB2222", Utc::now());
        store.put_user(a.clone()).expect("a");
        store.put_user(b.clone()).expect("b");
        (dir, store, a, b)
    }

    #[test]
    fn redeem_is_symmetric_and_idempotent() {
        let (_dir, store, a, b) = setup();
        let first = redeem(&store, &a, "bbbb2222", Utc::now()).expect("redeem");
        assert!(matches!(first, RedeemOutcome::Added(ref u) if u.chat_id == "b"));
        let again = redeem(&store, &a, "BBBB2222", Utc::now()).expect("retry");
        assert!(matches!(again, RedeemOutcome::AlreadyFriends(_)));
        let reverse = redeem(&store, &b, "AAAA1111", Utc::now()).expect("reverse");
        assert!(matches!(reverse, RedeemOutcome::AlreadyFriends(_)));

        let names: Vec<String> = list(&store, &b).expect("list").into_iter().map(|f| f.display_name).collect();
        assert_eq!(names, vec!["Alice".to_string()]);
    }

    #[test]
    fn own_and_unknown_codes_are_rejected() {
        let (_dir, store, a, _b) = setup();
        assert!(matches!(redeem(&store, &a, "AAAA1111", Utc::now()), Err(CommandError::Validation(_))));
        assert!(matches!(redeem(&store, &a, "ZZZZ9999", Utc::now()), Err(CommandError::NotFound(_))));
        assert!(matches!(redeem(&store, &a, "short", Utc::now()), Err(CommandError::Validation(_))));
        assert_eq!(store.count_friends("a").expect("count"), 0);
    }
}
