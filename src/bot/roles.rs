//! Role derivation and self-healing of stored role fields.
//!
//! A user's access role comes from the configured privileged-identity set and
//! their rank title from their level. Both are stored on the user row for
//! display; [`recompute`] brings the stored copies back in line whenever they
//! drift, and writes nothing when they already match.
use log::info;
use std::collections::HashSet;

use crate::bot::economy::{level_to_role, xp_to_level};
use crate::storage::{BotStore, StoreError, UserRecord, UserRole};

/// Sender identities with owner privileges.
#[derive(Debug, Clone, Default)]
pub struct Privileges {
    identities: HashSet<String>,
}

impl Privileges {
    pub fn new<I, S>(identities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identities: identities.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, sender_id: &str) -> bool {
        self.identities.contains(sender_id)
    }

    pub fn role_for(&self, sender_id: &str) -> UserRole {
        if self.contains(sender_id) {
            UserRole::Owner
        } else {
            UserRole::User
        }
    }
}

fn in_sync(user: &UserRecord, role: UserRole) -> bool {
    let level = xp_to_level(user.xp);
    user.user_role == role && user.level == level && user.level_role == level_to_role(level)
}

/// Heal `user_role`, `level` and `level_role` on the stored row for
/// `user.chat_id`. Returns the up-to-date record.
pub fn recompute(store: &BotStore, user: &UserRecord, privileged: bool) -> Result<UserRecord, StoreError> {
    let role = if privileged { UserRole::Owner } else { UserRole::User };
    if in_sync(user, role) {
        return Ok(user.clone());
    }
    let healed = store.update_user(&user.chat_id, |u| -> Result<UserRecord, StoreError> {
        u.user_role = role;
        u.level = xp_to_level(u.xp);
        u.level_role = level_to_role(u.level);
        Ok(u.clone())
    })?;
    info!(
        "Role sync for {}: role={} level={} rank={}",
        crate::logutil::redact_chat_id(&user.chat_id),
        healed.user_role,
        healed.level,
        healed.level_role
    );
    Ok(healed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{BotStoreBuilder, LevelRole};
    use chrono::Utc;
    use tempfile::TempDir;

    #[test]
    fn privileges_map_to_owner_role() {
        let p = Privileges::new(["boss"]);
        assert_eq!(p.role_for("boss"), UserRole::Owner);
        assert_eq!(p.role_for("someone"), UserRole::User);
    }

    #[test]
    fn recompute_heals_drift_and_is_idempotent() {
        let dir = TempDir::new().expect("tempdir");
        let store = BotStoreBuilder::new(dir.path()).without_quest_seed().open().expect("store");
        let mut user = UserRecord::new("c1", "Alice", "CODE0001", Utc::now());
        user.xp = 12_500;
        user.level = 1;
        user.level_role = LevelRole::Rookie;
        store.put_user(user.clone()).expect("put");

        let healed = recompute(&store, &user, true).expect("heal");
        assert_eq!(healed.level, 13);
        assert_eq!(healed.level_role, LevelRole::Pro);
        assert_eq!(healed.user_role, UserRole::Owner);
        assert_eq!(store.get_user("c1").expect("get").expect("user"), healed);

        let again = recompute(&store, &healed, true).expect("noop");
        assert_eq!(again, healed);

        let demoted = recompute(&store, &healed, false).expect("demote");
        assert_eq!(demoted.user_role, UserRole::User);
    }
}
