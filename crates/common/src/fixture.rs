//! Fixture factory
//!
//! Creates actors, photos and comments straight in the backing store so that
//! scenario setup never depends on the UI being graded. Actor identities are
//! a fixed stem plus a drawn suffix; a suffix that was already issued in this
//! run, or that the store rejects as a duplicate, is redrawn a bounded number
//! of times before the factory gives up with [`Error::FixtureSetup`].

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use rand::Rng;
use rusqlite::types::Value;
use std::collections::HashSet;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::db::{is_unique_violation, Store};
use crate::types::{Actor, Comment, Photo};
use crate::{Error, Result};

pub const USERS: &str = "users";
pub const PHOTOS: &str = "photos";
pub const COMMENTS: &str = "comments";

/// Source of numeric discriminators for actor identities.
pub trait SuffixSource: Send + Sync {
    fn next_suffix(&self) -> u64;
}

/// Uniformly random suffixes from a wide range.
#[derive(Debug, Clone)]
pub struct RandomSuffix {
    range: Range<u64>,
}

impl RandomSuffix {
    pub fn new(range: Range<u64>) -> Self {
        Self { range }
    }
}

impl Default for RandomSuffix {
    fn default() -> Self {
        Self::new(1_000..10_000_000)
    }
}

impl SuffixSource for RandomSuffix {
    fn next_suffix(&self) -> u64 {
        rand::thread_rng().gen_range(self.range.clone())
    }
}

/// Replays a fixed list of suffixes, cycling when exhausted. Deterministic
/// runs and collision tests use this.
#[derive(Debug)]
pub struct SequenceSuffix {
    values: Vec<u64>,
    cursor: AtomicUsize,
}

impl SequenceSuffix {
    pub fn new(values: Vec<u64>) -> Result<Self> {
        if values.is_empty() {
            return Err(Error::InvalidConfig(
                "a suffix sequence needs at least one value".to_string(),
            ));
        }
        Ok(Self {
            values,
            cursor: AtomicUsize::new(0),
        })
    }
}

impl SuffixSource for SequenceSuffix {
    fn next_suffix(&self) -> u64 {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed);
        self.values[i % self.values.len()]
    }
}

/// Factory configuration
#[derive(Debug, Clone)]
pub struct FactoryConfig {
    /// Human-readable username stem, e.g. `alice` -> `alice_482913`
    pub stem: String,
    pub email_domain: String,
    /// Credential every actor signs in with
    pub password: String,
    /// Draws per actor before giving up
    pub max_attempts: u32,
    /// bcrypt cost for `encrypted_password`; 4 is the minimum bcrypt allows
    pub bcrypt_cost: u32,
    pub photo_image: String,
    pub photo_caption: String,
    pub comment_body: String,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            stem: "alice".to_string(),
            email_domain: "example.com".to_string(),
            password: "password".to_string(),
            max_attempts: 5,
            bcrypt_cost: 4,
            photo_image: "https://robohash.org/rubric.png".to_string(),
            photo_caption: "caption".to_string(),
            comment_body: "Nice photo!".to_string(),
        }
    }
}

/// Creates fixture records. Clones share the store, the suffix source and
/// the set of usernames issued so far, so uniqueness holds across workers.
#[derive(Clone)]
pub struct FixtureFactory {
    store: Store,
    config: Arc<FactoryConfig>,
    suffixes: Arc<dyn SuffixSource>,
    issued: Arc<Mutex<HashSet<String>>>,
    digest: Arc<OnceCell<String>>,
    sequence: Arc<AtomicUsize>,
}

impl FixtureFactory {
    pub fn new(store: Store, config: FactoryConfig) -> Self {
        Self::with_suffix_source(store, config, Arc::new(RandomSuffix::default()))
    }

    pub fn with_suffix_source(
        store: Store,
        config: FactoryConfig,
        suffixes: Arc<dyn SuffixSource>,
    ) -> Self {
        Self {
            store,
            config: Arc::new(config),
            suffixes,
            issued: Arc::new(Mutex::new(HashSet::new())),
            digest: Arc::new(OnceCell::new()),
            sequence: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    /// Create an actor with a username and email nobody else in the run holds.
    pub fn create_actor(&self) -> Result<Actor> {
        let digest = self
            .digest
            .get_or_try_init(|| bcrypt::hash(&self.config.password, self.config.bcrypt_cost))?
            .clone();

        let mut last_reason = String::from("no attempts made");
        let mut last_attributes = Vec::new();

        for attempt in 1..=self.config.max_attempts {
            let username = format!("{}_{}", self.config.stem, self.suffixes.next_suffix());
            let email = format!("{}@{}", username, self.config.email_domain);
            let attributes = vec![
                ("username".to_string(), Value::Text(username.clone())),
                ("email".to_string(), Value::Text(email.clone())),
                ("encrypted_password".to_string(), Value::Text(digest.clone())),
            ];

            if !self.issued.lock().insert(username.clone()) {
                debug!("Suffix for {} already issued this run (attempt {})", username, attempt);
                last_reason = format!("username {} was already issued in this run", username);
                last_attributes = attributes;
                continue;
            }

            match self.store.insert(USERS, &attributes) {
                Ok(id) => {
                    debug!("Created actor {} (id {})", username, id);
                    return Ok(Actor {
                        id,
                        username,
                        email,
                        password: self.config.password.clone(),
                    });
                }
                Err(e) if is_unique_violation(&e) => {
                    warn!("Store rejected {} as a duplicate (attempt {}): {}", username, attempt, e);
                    last_reason = e.to_string();
                    last_attributes = attributes;
                }
                Err(e) => {
                    return Err(Error::FixtureSetup {
                        table: USERS.to_string(),
                        attributes,
                        reason: e.to_string(),
                    });
                }
            }
        }

        Err(Error::FixtureSetup {
            table: USERS.to_string(),
            attributes: last_attributes,
            reason: format!(
                "no unused identity after {} attempts: {}",
                self.config.max_attempts, last_reason
            ),
        })
    }

    /// Create a photo owned by `owner`.
    pub fn create_photo(&self, owner: &Actor) -> Result<Photo> {
        let n = self.next_sequence();
        let caption = format!("{} #{}", self.config.photo_caption, n);
        let attributes = vec![
            ("image".to_string(), Value::Text(self.config.photo_image.clone())),
            ("caption".to_string(), Value::Text(caption.clone())),
            ("owner_id".to_string(), Value::Integer(owner.id)),
        ];
        let id = self.insert_or_reject(PHOTOS, attributes)?;
        Ok(Photo {
            id,
            image: self.config.photo_image.clone(),
            caption,
            owner_id: owner.id,
        })
    }

    /// Create a comment by `author` on `photo`.
    pub fn create_comment(&self, author: &Actor, photo: &Photo) -> Result<Comment> {
        let attributes = vec![
            ("body".to_string(), Value::Text(self.config.comment_body.clone())),
            ("author_id".to_string(), Value::Integer(author.id)),
            ("photo_id".to_string(), Value::Integer(photo.id)),
        ];
        let id = self.insert_or_reject(COMMENTS, attributes)?;
        Ok(Comment {
            id,
            body: self.config.comment_body.clone(),
            author_id: author.id,
            photo_id: photo.id,
        })
    }

    /// Current value of an integer column on the actor's row, e.g. a
    /// counter cache such as `likes_count`.
    pub fn actor_counter(&self, actor: &Actor, column: &str) -> Result<i64> {
        self.store
            .integer_column(USERS, actor.id, column)?
            .ok_or_else(|| Error::NotFound {
                kind: format!("{}.{}", USERS, column),
                id: actor.id,
            })
    }

    /// Number of comments attached to `photo`.
    pub fn comment_count(&self, photo: &Photo) -> Result<i64> {
        self.store.count_where(COMMENTS, "photo_id", photo.id)
    }

    fn insert_or_reject(&self, table: &str, attributes: Vec<(String, Value)>) -> Result<i64> {
        match self.store.insert(table, &attributes) {
            Ok(id) => {
                debug!("Created {} row {}", table, id);
                Ok(id)
            }
            Err(e) => Err(Error::FixtureSetup {
                table: table.to_string(),
                attributes,
                reason: e.to_string(),
            }),
        }
    }

    fn next_sequence(&self) -> usize {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }
}
