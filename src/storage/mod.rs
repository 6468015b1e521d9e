//! # Storage Module - Data Persistence Layer
//!
//! Sled-backed persistence for everything the bot remembers between messages:
//! users, pending consents, the quest catalog, per-user quest progress,
//! friendships and per-chat command prefixes.
//!
//! ## Layout
//!
//! ```text
//! users          chat_id                 -> UserRecord
//! consents       chat_id                 -> PendingConsent
//! friend_codes   code                    -> chat_id
//! quests         quest_id (u64 BE)       -> QuestRecord
//! quest_keys     key                     -> quest_id (u64 BE)
//! user_quests    chat_id \0 quest_id     -> UserQuestRecord
//! friends        chat_id \0 friend_id    -> FriendshipRecord
//! prefixes       chat_id                 -> prefix
//! ```
//!
//! Operations that touch several rows (registration, account deletion, quest
//! claims, friendship creation, catalog re-seeding) run as sled transactions.
//! Nothing is cached: every call reads the trees, so rows edited by other
//! tooling between two commands are always observed.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use questbot::storage::BotStoreBuilder;
//!
//! let store = BotStoreBuilder::new("./data/questbot").open()?;
//! let quests = store.list_quests()?;
//! # Ok::<(), questbot::storage::StoreError>(())
//! ```

pub mod errors;
pub mod seed_loader;
pub mod types;

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::{debug, info};
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult};
use sled::Transactional;

pub use errors::StoreError;
pub use seed_loader::{default_quest_seeds, load_quest_seeds_from_json, QuestSeed};
pub use types::*;

const TREE_USERS: &str = "users";
const TREE_CONSENTS: &str = "consents";
const TREE_FRIEND_CODES: &str = "friend_codes";
const TREE_QUESTS: &str = "quests";
const TREE_QUEST_KEYS: &str = "quest_keys";
const TREE_USER_QUESTS: &str = "user_quests";
const TREE_FRIENDS: &str = "friends";
const TREE_PREFIXES: &str = "prefixes";

/// Attempts at drawing an unused friend code before giving up.
const FRIEND_CODE_ATTEMPTS: usize = 16;

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct BotStoreBuilder {
    path: PathBuf,
    seeds: Option<Vec<QuestSeed>>,
}

impl BotStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            seeds: Some(default_quest_seeds()),
        }
    }

    /// Opt out of catalog seeding during initialization (useful for targeted tests).
    pub fn without_quest_seed(mut self) -> Self {
        self.seeds = None;
        self
    }

    pub fn open(self) -> Result<BotStore, StoreError> {
        let store = BotStore::open(&self.path)?;
        if let Some(seeds) = self.seeds {
            let summary = store.reseed_quests(&seeds)?;
            info!(
                "Quest catalog seeded: {} inserted, {} updated, {} deactivated",
                summary.inserted, summary.updated, summary.deactivated
            );
        }
        Ok(store)
    }
}

/// Counts reported by [`BotStore::reseed_quests`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReseedSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deactivated: usize,
}

/// Result of [`BotStore::complete_registration`].
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationOutcome {
    Registered(UserRecord),
    MissingConsent,
    AlreadyRegistered,
}

/// Result of [`BotStore::claim_quest`].
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Claimed(UserRecord),
    NotCompleted,
    AlreadyClaimed,
}

/// Aggregate numbers for the `status` command.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStatistics {
    pub users: usize,
    pub pending_consents: usize,
    pub quests_total: usize,
    pub quests_active: usize,
    pub friendships: usize,
}

/// Sled-backed store collaborator.
pub struct BotStore {
    db: sled::Db,
    users: sled::Tree,
    consents: sled::Tree,
    friend_codes: sled::Tree,
    quests: sled::Tree,
    quest_keys: sled::Tree,
    user_quests: sled::Tree,
    friends: sled::Tree,
    prefixes: sled::Tree,
}

type TxResult<T> = Result<T, ConflictableTransactionError<StoreError>>;

fn abort<T>(err: impl Into<StoreError>) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err.into()))
}

impl BotStore {
    /// Open (or create) the store rooted at `path` without touching the catalog.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path_ref = path.as_ref();
        std::fs::create_dir_all(path_ref)?;
        let db = sled::open(path_ref)?;
        debug!("Opened store at {}", path_ref.display());
        Ok(Self {
            users: db.open_tree(TREE_USERS)?,
            consents: db.open_tree(TREE_CONSENTS)?,
            friend_codes: db.open_tree(TREE_FRIEND_CODES)?,
            quests: db.open_tree(TREE_QUESTS)?,
            quest_keys: db.open_tree(TREE_QUEST_KEYS)?,
            user_quests: db.open_tree(TREE_USER_QUESTS)?,
            friends: db.open_tree(TREE_FRIENDS)?,
            prefixes: db.open_tree(TREE_PREFIXES)?,
            db,
        })
    }

    fn pair_key(owner: &str, suffix: &[u8]) -> Vec<u8> {
        let mut key = Vec::with_capacity(owner.len() + 1 + suffix.len());
        key.extend_from_slice(owner.as_bytes());
        key.push(0);
        key.extend_from_slice(suffix);
        key
    }

    fn owner_prefix(owner: &str) -> Vec<u8> {
        Self::pair_key(owner, &[])
    }

    fn user_quest_key(chat_id: &str, quest_id: u64) -> Vec<u8> {
        Self::pair_key(chat_id, &quest_id.to_be_bytes())
    }

    fn friend_key(chat_id: &str, friend_id: &str) -> Vec<u8> {
        Self::pair_key(chat_id, friend_id.as_bytes())
    }

    fn quest_key(quest_id: u64) -> Vec<u8> {
        quest_id.to_be_bytes().to_vec()
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(bincode::serialize(value)?)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(bincode::deserialize::<T>(bytes)?)
    }

    fn decode_user(bytes: &[u8]) -> Result<UserRecord, StoreError> {
        let record: UserRecord = Self::deserialize(bytes)?;
        if record.schema_version != USER_SCHEMA_VERSION {
            return Err(StoreError::SchemaMismatch {
                entity: "user",
                expected: USER_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(record)
    }

    fn decode_quest(bytes: &[u8]) -> Result<QuestRecord, StoreError> {
        let record: QuestRecord = Self::deserialize(bytes)?;
        if record.schema_version != QUEST_SCHEMA_VERSION {
            return Err(StoreError::SchemaMismatch {
                entity: "quest",
                expected: QUEST_SCHEMA_VERSION,
                found: record.schema_version,
            });
        }
        Ok(record)
    }

    fn decode_id(bytes: &[u8]) -> Result<u64, StoreError> {
        let raw: [u8; 8] = bytes
            .try_into()
            .map_err(|_| StoreError::Conflict("malformed quest id".to_string()))?;
        Ok(u64::from_be_bytes(raw))
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Fetch a user by chat identity.
    pub fn get_user(&self, chat_id: &str) -> Result<Option<UserRecord>, StoreError> {
        match self.users.get(chat_id.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode_user(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Insert or overwrite a user row. Keeps the friend-code index in step.
    pub fn put_user(&self, mut user: UserRecord) -> Result<(), StoreError> {
        user.schema_version = USER_SCHEMA_VERSION;
        let bytes = Self::serialize(&user)?;
        let key = user.chat_id.clone();
        let code = user.friend_code.clone();
        let result: TransactionResult<(), StoreError> =
            (&self.users, &self.friend_codes).transaction(|(users, codes)| {
                users.insert(key.as_bytes(), bytes.as_slice())?;
                codes.insert(code.as_bytes(), key.as_bytes())?;
                Ok(())
            });
        result?;
        self.flush()
    }

    /// Transactional read-modify-write of one user row.
    ///
    /// `f` may run more than once if sled detects a conflicting writer, so it
    /// must derive everything from the record it is handed. An `Err` from `f`
    /// aborts without writing.
    pub fn update_user<T, E, F>(&self, chat_id: &str, f: F) -> Result<T, E>
    where
        F: Fn(&mut UserRecord) -> Result<T, E>,
        E: From<StoreError>,
    {
        let key = chat_id.as_bytes();
        let result = self.users.transaction(|tx| {
            let Some(bytes) = tx.get(key)? else {
                return Err(ConflictableTransactionError::Abort(E::from(StoreError::NotFound(
                    format!("user: {}", chat_id),
                ))));
            };
            let mut user = Self::decode_user(&bytes)
                .map_err(|e| ConflictableTransactionError::Abort(E::from(e)))?;
            let out = f(&mut user).map_err(ConflictableTransactionError::Abort)?;
            let encoded = Self::serialize(&user)
                .map_err(|e| ConflictableTransactionError::Abort(E::from(e)))?;
            tx.insert(key, encoded)?;
            Ok(out)
        });
        let out = result.map_err(|err| match err {
            TransactionError::Abort(inner) => inner,
            TransactionError::Storage(inner) => E::from(StoreError::Sled(inner)),
        })?;
        self.flush().map_err(E::from)?;
        Ok(out)
    }

    /// All users, in key order.
    pub fn list_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        let mut users = Vec::new();
        for entry in self.users.iter() {
            let (_, value) = entry?;
            users.push(Self::decode_user(&value)?);
        }
        Ok(users)
    }

    /// Resolve a friend code to its owner.
    pub fn user_by_friend_code(&self, code: &str) -> Result<Option<UserRecord>, StoreError> {
        let Some(owner) = self.friend_codes.get(code.as_bytes())? else {
            return Ok(None);
        };
        let chat_id = String::from_utf8_lossy(&owner).to_string();
        self.get_user(&chat_id)
    }

    // ------------------------------------------------------------------
    // Onboarding
    // ------------------------------------------------------------------

    pub fn get_pending_consent(&self, chat_id: &str) -> Result<Option<PendingConsent>, StoreError> {
        match self.consents.get(chat_id.as_bytes())? {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_pending_consent(&self, consent: &PendingConsent) -> Result<(), StoreError> {
        let bytes = Self::serialize(consent)?;
        self.consents.insert(consent.chat_id.as_bytes(), bytes)?;
        self.consents.flush()?;
        Ok(())
    }

    /// Turn a pending consent into a user row in one transaction.
    ///
    /// The pending record's timestamp and version are copied onto the new
    /// user and the pending record is removed. `next_code` supplies friend
    /// code candidates until one is unused.
    pub fn complete_registration<G>(
        &self,
        chat_id: &str,
        display_name: &str,
        now: DateTime<Utc>,
        next_code: G,
    ) -> Result<RegistrationOutcome, StoreError>
    where
        G: Fn() -> String,
    {
        let key = chat_id.as_bytes();
        let result: TransactionResult<RegistrationOutcome, StoreError> =
            (&self.users, &self.consents, &self.friend_codes).transaction(|(users, consents, codes)| {
                if users.get(key)?.is_some() {
                    return Ok(RegistrationOutcome::AlreadyRegistered);
                }
                let Some(raw) = consents.get(key)? else {
                    return Ok(RegistrationOutcome::MissingConsent);
                };
                let consent: PendingConsent = match Self::deserialize(&raw) {
                    Ok(c) => c,
                    Err(e) => return abort(e),
                };

                let mut code = None;
                for _ in 0..FRIEND_CODE_ATTEMPTS {
                    let candidate = next_code();
                    if codes.get(candidate.as_bytes())?.is_none() {
                        code = Some(candidate);
                        break;
                    }
                }
                let Some(code) = code else {
                    return abort(StoreError::Conflict("no free friend code".to_string()));
                };

                let user = UserRecord::new(chat_id, display_name, &code, now)
                    .with_consent(consent.accepted_at, &consent.version);
                let bytes = match Self::serialize(&user) {
                    Ok(b) => b,
                    Err(e) => return abort(e),
                };
                users.insert(key, bytes)?;
                codes.insert(code.as_bytes(), key)?;
                consents.remove(key)?;
                Ok(RegistrationOutcome::Registered(user))
            });
        let outcome = result?;
        self.flush()?;
        Ok(outcome)
    }

    /// Remove every row owned by `chat_id` in one transaction: the user, any
    /// pending consent, the friend-code index entry, quest progress, both
    /// directions of each friendship and the chat prefix.
    ///
    /// Returns false when no user row existed.
    pub fn delete_account(&self, chat_id: &str) -> Result<bool, StoreError> {
        let friend_ids = self.list_friend_ids(chat_id)?;
        let mut quest_keys = Vec::new();
        for entry in self.user_quests.scan_prefix(Self::owner_prefix(chat_id)) {
            let (key, _) = entry?;
            quest_keys.push(key.to_vec());
        }
        let key = chat_id.as_bytes();

        let result: TransactionResult<bool, StoreError> = (
            &self.users,
            &self.consents,
            &self.friend_codes,
            &self.user_quests,
            &self.friends,
            &self.prefixes,
        )
            .transaction(|(users, consents, codes, user_quests, friends, prefixes)| {
                let removed = users.remove(key)?;
                if let Some(bytes) = &removed {
                    match Self::decode_user(bytes) {
                        Ok(user) => {
                            codes.remove(user.friend_code.as_bytes())?;
                        }
                        Err(e) => return abort(e),
                    }
                }
                consents.remove(key)?;
                for qk in &quest_keys {
                    user_quests.remove(qk.as_slice())?;
                }
                for friend_id in &friend_ids {
                    friends.remove(Self::friend_key(chat_id, friend_id))?;
                    friends.remove(Self::friend_key(friend_id, chat_id))?;
                }
                prefixes.remove(key)?;
                Ok(removed.is_some())
            });
        let existed = result?;
        self.sweep_friend_edges(chat_id)?;
        self.flush()?;
        Ok(existed)
    }

    /// Remove edges touching `chat_id` that were written after the friend list
    /// was read. Once the user row is gone `add_friendship` refuses new edges,
    /// so one pass is enough.
    fn sweep_friend_edges(&self, chat_id: &str) -> Result<usize, StoreError> {
        let mut swept = 0;
        for friend_id in self.list_friend_ids(chat_id)? {
            self.friends.remove(Self::friend_key(chat_id, &friend_id))?;
            self.friends.remove(Self::friend_key(&friend_id, chat_id))?;
            swept += 1;
        }
        if swept > 0 {
            debug!("Swept {} late friend edges for a deleted account", swept);
        }
        Ok(swept)
    }

    // ------------------------------------------------------------------
    // Quest catalog
    // ------------------------------------------------------------------

    /// Idempotently bring the catalog in line with `seeds`.
    ///
    /// Known keys are overwritten and reactivated, new keys are inserted and
    /// keys missing from `seeds` are deactivated. Nothing is deleted.
    pub fn reseed_quests(&self, seeds: &[QuestSeed]) -> Result<ReseedSummary, StoreError> {
        seed_loader::validate_seeds(seeds)?;

        let mut known: HashMap<String, u64> = HashMap::new();
        for entry in self.quest_keys.iter() {
            let (key, value) = entry?;
            known.insert(String::from_utf8_lossy(&key).to_string(), Self::decode_id(&value)?);
        }
        let mut fresh_ids: HashMap<&str, u64> = HashMap::new();
        for seed in seeds {
            if !known.contains_key(&seed.key) {
                fresh_ids.insert(seed.key.as_str(), self.db.generate_id()? + 1);
            }
        }
        let seeded_keys: HashSet<&str> = seeds.iter().map(|s| s.key.as_str()).collect();
        let retired: Vec<u64> = known
            .iter()
            .filter(|(k, _)| !seeded_keys.contains(k.as_str()))
            .map(|(_, id)| *id)
            .collect();

        let result: TransactionResult<ReseedSummary, StoreError> =
            (&self.quests, &self.quest_keys).transaction(|(quests, quest_keys)| {
                let mut summary = ReseedSummary::default();
                for seed in seeds {
                    let (id, existed) = match quest_keys.get(seed.key.as_bytes())? {
                        Some(raw) => match Self::decode_id(&raw) {
                            Ok(id) => (id, true),
                            Err(e) => return abort(e),
                        },
                        None => match fresh_ids.get(seed.key.as_str()) {
                            Some(id) => (*id, false),
                            None => {
                                return abort(StoreError::Conflict(format!(
                                    "quest key '{}' vanished during reseed",
                                    seed.key
                                )))
                            }
                        },
                    };
                    let record = QuestRecord {
                        id,
                        key: seed.key.clone(),
                        title: seed.title.clone(),
                        period: seed.period,
                        metric: seed.metric,
                        target: seed.target,
                        reward_coins: seed.reward_coins,
                        reward_xp: seed.reward_xp,
                        active: true,
                        schema_version: QUEST_SCHEMA_VERSION,
                    };
                    let bytes = match Self::serialize(&record) {
                        Ok(b) => b,
                        Err(e) => return abort(e),
                    };
                    quests.insert(Self::quest_key(id), bytes)?;
                    if existed {
                        summary.updated += 1;
                    } else {
                        quest_keys.insert(seed.key.as_bytes(), Self::quest_key(id))?;
                        summary.inserted += 1;
                    }
                }
                for id in &retired {
                    let Some(raw) = quests.get(Self::quest_key(*id))? else {
                        continue;
                    };
                    let mut record = match Self::decode_quest(&raw) {
                        Ok(r) => r,
                        Err(e) => return abort(e),
                    };
                    if record.active {
                        record.active = false;
                        let bytes = match Self::serialize(&record) {
                            Ok(b) => b,
                            Err(e) => return abort(e),
                        };
                        quests.insert(Self::quest_key(*id), bytes)?;
                        summary.deactivated += 1;
                    }
                }
                Ok(summary)
            });
        let summary = result?;
        self.flush()?;
        Ok(summary)
    }

    /// Write raw bytes as a catalog row, bypassing encoding.
    #[cfg(test)]
    pub(crate) fn put_raw_quest(&self, quest_id: u64, bytes: &[u8]) -> Result<(), StoreError> {
        self.quests.insert(Self::quest_key(quest_id), bytes)?;
        Ok(())
    }

    pub fn get_quest(&self, quest_id: u64) -> Result<Option<QuestRecord>, StoreError> {
        match self.quests.get(Self::quest_key(quest_id))? {
            Some(bytes) => Ok(Some(Self::decode_quest(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn get_quest_by_key(&self, key: &str) -> Result<Option<QuestRecord>, StoreError> {
        match self.quest_keys.get(key.as_bytes())? {
            Some(raw) => self.get_quest(Self::decode_id(&raw)?),
            None => Ok(None),
        }
    }

    /// Every catalog entry, active or not, ordered by id.
    pub fn list_quests(&self) -> Result<Vec<QuestRecord>, StoreError> {
        let mut quests = Vec::new();
        for entry in self.quests.iter() {
            let (_, value) = entry?;
            quests.push(Self::decode_quest(&value)?);
        }
        Ok(quests)
    }

    // ------------------------------------------------------------------
    // User quests
    // ------------------------------------------------------------------

    pub fn get_user_quest(
        &self,
        chat_id: &str,
        quest_id: u64,
    ) -> Result<Option<UserQuestRecord>, StoreError> {
        match self.user_quests.get(Self::user_quest_key(chat_id, quest_id))? {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Fetch the progress row, creating it at zero progress if absent.
    pub fn ensure_user_quest(&self, chat_id: &str, quest_id: u64) -> Result<UserQuestRecord, StoreError> {
        let key = Self::user_quest_key(chat_id, quest_id);
        let fresh = UserQuestRecord::new(chat_id, quest_id);
        let encoded = Self::serialize(&fresh)?;
        // Only writes when the key is absent; a concurrent creator wins.
        match self.user_quests.compare_and_swap(&key, None as Option<&[u8]>, Some(encoded))? {
            Ok(()) => {
                self.user_quests.flush()?;
                Ok(fresh)
            }
            Err(cas) => match cas.current {
                Some(bytes) => Self::deserialize(&bytes),
                None => Ok(fresh),
            },
        }
    }

    pub fn put_user_quest(&self, record: &UserQuestRecord) -> Result<(), StoreError> {
        let bytes = Self::serialize(record)?;
        self.user_quests
            .insert(Self::user_quest_key(&record.chat_id, record.quest_id), bytes)?;
        self.user_quests.flush()?;
        Ok(())
    }

    /// Claim a completed quest and apply its reward in one transaction.
    ///
    /// `grant` mutates the user row (balance, xp and derived fields). It runs
    /// only when the progress row is completed and not yet claimed, so a
    /// reward can never be applied twice for the same pair.
    pub fn claim_quest<F>(
        &self,
        chat_id: &str,
        quest_id: u64,
        now: DateTime<Utc>,
        grant: F,
    ) -> Result<ClaimOutcome, StoreError>
    where
        F: Fn(&mut UserRecord),
    {
        let uq_key = Self::user_quest_key(chat_id, quest_id);
        let user_key = chat_id.as_bytes();
        let result: TransactionResult<ClaimOutcome, StoreError> =
            (&self.user_quests, &self.users).transaction(|(user_quests, users)| {
                let Some(raw) = user_quests.get(&uq_key)? else {
                    return Ok(ClaimOutcome::NotCompleted);
                };
                let mut progress: UserQuestRecord = match Self::deserialize(&raw) {
                    Ok(p) => p,
                    Err(e) => return abort(e),
                };
                if progress.claimed_at.is_some() {
                    return Ok(ClaimOutcome::AlreadyClaimed);
                }
                if progress.completed_at.is_none() {
                    return Ok(ClaimOutcome::NotCompleted);
                }
                let Some(raw_user) = users.get(user_key)? else {
                    return abort(StoreError::NotFound(format!("user: {}", chat_id)));
                };
                let mut user = match Self::decode_user(&raw_user) {
                    Ok(u) => u,
                    Err(e) => return abort(e),
                };
                grant(&mut user);
                progress.claimed_at = Some(now);

                let (uq_bytes, user_bytes) = match (Self::serialize(&progress), Self::serialize(&user)) {
                    (Ok(a), Ok(b)) => (a, b),
                    (Err(e), _) | (_, Err(e)) => return abort(e),
                };
                user_quests.insert(uq_key.as_slice(), uq_bytes)?;
                users.insert(user_key, user_bytes)?;
                Ok(ClaimOutcome::Claimed(user))
            });
        let outcome = result?;
        self.flush()?;
        Ok(outcome)
    }

    // ------------------------------------------------------------------
    // Friendships
    // ------------------------------------------------------------------

    /// Write both directed edges between `a` and `b`. Existing edges are left
    /// untouched, so retries are harmless. Returns true if anything was written.
    ///
    /// Aborts with [`StoreError::NotFound`] when either user row is missing,
    /// checked inside the transaction so a concurrent account deletion cannot
    /// leave an edge behind.
    pub fn add_friendship(&self, a: &str, b: &str, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let forward = FriendshipRecord {
            chat_id: a.to_string(),
            friend_id: b.to_string(),
            created_at: now,
        };
        let backward = FriendshipRecord {
            chat_id: b.to_string(),
            friend_id: a.to_string(),
            created_at: now,
        };
        let edges = [
            (Self::friend_key(a, b), Self::serialize(&forward)?),
            (Self::friend_key(b, a), Self::serialize(&backward)?),
        ];
        let result: TransactionResult<bool, StoreError> =
            (&self.users, &self.friends).transaction(|(users, friends)| {
                for id in [a, b] {
                    if users.get(id.as_bytes())?.is_none() {
                        return abort(StoreError::NotFound(format!("user: {}", id)));
                    }
                }
                let mut created = false;
                for (key, bytes) in &edges {
                    if friends.get(key.as_slice())?.is_none() {
                        friends.insert(key.as_slice(), bytes.as_slice())?;
                        created = true;
                    }
                }
                Ok(created)
            });
        let created = result?;
        self.friends.flush()?;
        Ok(created)
    }

    pub fn list_friend_ids(&self, chat_id: &str) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        for entry in self.friends.scan_prefix(Self::owner_prefix(chat_id)) {
            let (_, value) = entry?;
            let edge: FriendshipRecord = Self::deserialize(&value)?;
            ids.push(edge.friend_id);
        }
        Ok(ids)
    }

    /// Friends of `chat_id` that still have a user row.
    pub fn count_friends(&self, chat_id: &str) -> Result<usize, StoreError> {
        let mut count = 0;
        for friend_id in self.list_friend_ids(chat_id)? {
            if self.users.contains_key(friend_id.as_bytes())? {
                count += 1;
            }
        }
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Prefixes
    // ------------------------------------------------------------------

    pub fn get_prefix(&self, chat_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .prefixes
            .get(chat_id.as_bytes())?
            .map(|raw| String::from_utf8_lossy(&raw).to_string()))
    }

    pub fn set_prefix(&self, chat_id: &str, prefix: &str) -> Result<(), StoreError> {
        self.prefixes.insert(chat_id.as_bytes(), prefix.as_bytes())?;
        self.prefixes.flush()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    pub fn statistics(&self) -> Result<StoreStatistics, StoreError> {
        let quests = self.list_quests()?;
        Ok(StoreStatistics {
            users: self.users.len(),
            pending_consents: self.consents.len(),
            quests_total: quests.len(),
            quests_active: quests.iter().filter(|q| q.active).count(),
            friendships: self.friends.len() / 2,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn consented(store: &BotStore, chat_id: &str) -> PendingConsent {
        let consent = PendingConsent {
            chat_id: chat_id.to_string(),
            accepted_at: Utc::now(),
            version: "v1".to_string(),
        };
        store.put_pending_consent(&consent).expect("consent");
        consent
    }

    fn register(store: &BotStore, chat_id: &str, code: &str) -> UserRecord {
        consented(store, chat_id);
        let code = code.to_string();
        match store
            .complete_registration(chat_id, chat_id, Utc::now(), move || code.clone())
            .expect("register")
        {
            RegistrationOutcome::Registered(user) => user,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn store_round_trip_user() {
        let dir = TempDir::new().expect("tempdir");
        let store = BotStoreBuilder::new(dir.path()).without_quest_seed().open().expect("store");
        let mut user = UserRecord::new("c1", "Alice", "ABCD1234", Utc::now());
        user.balance = 42;
        store.put_user(user.clone()).expect("put");
        let fetched = store.get_user("c1").expect("get").expect("present");
        assert_eq!(fetched, user);
        let by_code = store.user_by_friend_code("ABCD1234").expect("lookup").expect("present");
        assert_eq!(by_code.chat_id, "c1");
    }

    #[test]
    fn registration_consumes_pending_consent() {
        let dir = TempDir::new().expect("tempdir");
        let store = BotStoreBuilder::new(dir.path()).without_quest_seed().open().expect("store");
        let consent = consented(&store, "c1");
        let user = register(&store, "c1", "CODE0001");
        assert_eq!(user.consent_at, Some(consent.accepted_at));
        assert_eq!(user.consent_version.as_deref(), Some("v1"));
        assert!(store.get_pending_consent("c1").expect("get").is_none());

        let again = store
            .complete_registration("c1", "x", Utc::now(), || "CODE0002".to_string())
            .expect("second");
        assert_eq!(again, RegistrationOutcome::AlreadyRegistered);
        let missing = store
            .complete_registration("c2", "x", Utc::now(), || "CODE0003".to_string())
            .expect("missing");
        assert_eq!(missing, RegistrationOutcome::MissingConsent);
    }

    #[test]
    fn registration_skips_taken_friend_codes() {
        let dir = TempDir::new().expect("tempdir");
        let store = BotStoreBuilder::new(dir.path()).without_quest_seed().open().expect("store");
        register(&store, "c1", "TAKEN001");
        consented(&store, "c2");
        let calls = std::sync::atomic::AtomicUsize::new(0);
        let outcome = store
            .complete_registration("c2", "Bob", Utc::now(), || {
                if calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                    "TAKEN001".to_string()
                } else {
                    "FREE0001".to_string()
                }
            })
            .expect("register");
        match outcome {
            RegistrationOutcome::Registered(user) => assert_eq!(user.friend_code, "FREE0001"),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn reseed_is_idempotent_and_deactivates_unknown_keys() {
        let dir = TempDir::new().expect("tempdir");
        let store = BotStoreBuilder::new(dir.path()).without_quest_seed().open().expect("store");
        let first = store.reseed_quests(&default_quest_seeds()).expect("seed");
        assert_eq!(first.inserted, default_quest_seeds().len());
        let ids: Vec<u64> = store.list_quests().expect("list").iter().map(|q| q.id).collect();

        let second = store.reseed_quests(&default_quest_seeds()).expect("reseed");
        assert_eq!(second.inserted, 0);
        assert_eq!(second.updated, default_quest_seeds().len());
        let again: Vec<u64> = store.list_quests().expect("list").iter().map(|q| q.id).collect();
        assert_eq!(ids, again, "ids must be stable across reseeds");

        let trimmed: Vec<QuestSeed> = default_quest_seeds().into_iter().skip(1).collect();
        let third = store.reseed_quests(&trimmed).expect("trim");
        assert_eq!(third.deactivated, 1);
        let dropped = store.get_quest_by_key("daily_checkin").expect("get").expect("kept");
        assert!(!dropped.active);

        store.reseed_quests(&default_quest_seeds()).expect("restore");
        let restored = store.get_quest_by_key("daily_checkin").expect("get").expect("kept");
        assert!(restored.active);
        assert_eq!(restored.id, dropped.id);
    }

    #[test]
    fn claim_applies_grant_once() {
        let dir = TempDir::new().expect("tempdir");
        let store = BotStoreBuilder::new(dir.path()).open().expect("store");
        register(&store, "c1", "CODE0001");
        let quest = store.get_quest_by_key("first_friend").expect("get").expect("seeded");

        let pending = store.claim_quest("c1", quest.id, Utc::now(), |u| u.balance += 10).expect("claim");
        assert_eq!(pending, ClaimOutcome::NotCompleted);

        let mut progress = store.ensure_user_quest("c1", quest.id).expect("ensure");
        progress.progress = 1;
        progress.mark_completed_if_reached(quest.target, Utc::now());
        store.put_user_quest(&progress).expect("put");

        match store.claim_quest("c1", quest.id, Utc::now(), |u| u.balance += 10).expect("claim") {
            ClaimOutcome::Claimed(user) => assert_eq!(user.balance, 10),
            other => panic!("unexpected outcome {:?}", other),
        }
        let second = store.claim_quest("c1", quest.id, Utc::now(), |u| u.balance += 10).expect("claim");
        assert_eq!(second, ClaimOutcome::AlreadyClaimed);
        assert_eq!(store.get_user("c1").expect("get").expect("user").balance, 10);
    }

    #[test]
    fn delete_account_removes_every_owned_row() {
        let dir = TempDir::new().expect("tempdir");
        let store = BotStoreBuilder::new(dir.path()).open().expect("store");
        register(&store, "c1", "CODE0001");
        register(&store, "c2", "CODE0002");
        store.add_friendship("c1", "c2", Utc::now()).expect("friends");
        store.set_prefix("c1", "?").expect("prefix");
        let quest = store.list_quests().expect("list")[0].clone();
        store.ensure_user_quest("c1", quest.id).expect("ensure");

        assert!(store.delete_account("c1").expect("delete"));
        assert!(store.get_user("c1").expect("get").is_none());
        assert!(store.user_by_friend_code("CODE0001").expect("code").is_none());
        assert!(store.get_user_quest("c1", quest.id).expect("uq").is_none());
        assert!(store.get_prefix("c1").expect("prefix").is_none());
        assert!(store.list_friend_ids("c2").expect("friends").is_empty());
        assert!(!store.delete_account("c1").expect("second delete"));
    }

    #[test]
    fn friendship_edges_are_symmetric_and_idempotent() {
        let dir = TempDir::new().expect("tempdir");
        let store = BotStoreBuilder::new(dir.path()).without_quest_seed().open().expect("store");
        register(&store, "a", "CODE000A");
        register(&store, "b", "CODE000B");
        assert!(store.add_friendship("a", "b", Utc::now()).expect("add"));
        assert!(!store.add_friendship("a", "b", Utc::now()).expect("retry"));
        assert!(!store.add_friendship("b", "a", Utc::now()).expect("reverse"));
        assert_eq!(store.list_friend_ids("a").expect("a"), vec!["b".to_string()]);
        assert_eq!(store.list_friend_ids("b").expect("b"), vec!["a".to_string()]);
        assert_eq!(store.statistics().expect("stats").friendships, 1);
    }

    #[test]
    fn friendship_with_deleted_user_is_refused() {
        let dir = TempDir::new().expect("tempdir");
        let store = BotStoreBuilder::new(dir.path()).open().expect("store");
        register(&store, "c1", "CODE0001");
        register(&store, "c2", "CODE0002");

        // c2 resolves c1's code, then c1's deletion commits before the edge write.
        let target = store.user_by_friend_code("CODE0001").expect("lookup").expect("c1");
        assert!(store.delete_account("c1").expect("delete"));
        let err = store.add_friendship("c2", &target.chat_id, Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)), "{:?}", err);

        assert!(store.list_friend_ids("c2").expect("ids").is_empty());
        assert_eq!(store.count_friends("c2").expect("count"), 0);

        register(&store, "c1", "CODE0003");
        assert_eq!(store.count_friends("c1").expect("count"), 0);
    }

    #[test]
    fn late_edges_are_swept_and_never_counted() {
        let dir = TempDir::new().expect("tempdir");
        let store = BotStoreBuilder::new(dir.path()).without_quest_seed().open().expect("store");
        register(&store, "c2", "CODE0002");

        // Edges written between the friend-list read and the delete transaction.
        let now = Utc::now();
        for (owner, friend) in [("c1", "c2"), ("c2", "c1")] {
            let edge = FriendshipRecord {
                chat_id: owner.to_string(),
                friend_id: friend.to_string(),
                created_at: now,
            };
            store
                .friends
                .insert(BotStore::friend_key(owner, friend), BotStore::serialize(&edge).expect("encode"))
                .expect("insert");
        }
        assert_eq!(store.count_friends("c2").expect("count"), 0, "dangling edge must not count");

        assert_eq!(store.sweep_friend_edges("c1").expect("sweep"), 1);
        assert!(store.list_friend_ids("c1").expect("c1").is_empty());
        assert!(store.list_friend_ids("c2").expect("c2").is_empty());
    }
}
