use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::data::filter::SearchTerms;
use crate::data::model::Id;

pub const SELECTION_TERMS_KEY: &str = "explorer.pixelset_selection_search_terms";
pub const DETAIL_TERMS_KEY: &str = "explorer.pixelset_detail_search_terms";
pub const MESSAGES_KEY: &str = "explorer.messages";

// ---------------------------------------------------------------------------
// Selection contexts
// ---------------------------------------------------------------------------

/// Where a set of search terms applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionContext {
    /// The Pixel Set list and its export.
    Selection,
    /// One Pixel Set's detail page.
    Detail(Id),
}

impl fmt::Display for SelectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionContext::Selection => f.write_str("selection"),
            SelectionContext::Detail(id) => write!(f, "detail:{id}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Flash messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Success => "success",
            Level::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub level: Level,
    pub text: String,
}

// ---------------------------------------------------------------------------
// Session document
// ---------------------------------------------------------------------------

/// Key/value document attached to one browser session.
///
/// Values are kept as JSON so that the document can be persisted by any
/// [`SessionStore`] without knowing the types stored in it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    values: BTreeMap<String, Value>,
}

impl SessionData {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Stored terms of `ctx`; unreadable entries read as absent.
    pub fn get(&self, ctx: SelectionContext) -> Option<SearchTerms> {
        let value = match ctx {
            SelectionContext::Selection => self.values.get(SELECTION_TERMS_KEY)?,
            SelectionContext::Detail(id) => self
                .values
                .get(DETAIL_TERMS_KEY)?
                .as_object()?
                .get(&id.to_string())?,
        };
        serde_json::from_value(value.clone()).ok()
    }

    pub fn set(&mut self, ctx: SelectionContext, terms: &SearchTerms) -> serde_json::Result<()> {
        let value = serde_json::to_value(terms)?;
        match ctx {
            SelectionContext::Selection => {
                self.values.insert(SELECTION_TERMS_KEY.to_string(), value);
            }
            SelectionContext::Detail(id) => {
                let mut map = self.detail_map();
                map.insert(id.to_string(), value);
                self.values
                    .insert(DETAIL_TERMS_KEY.to_string(), Value::Object(map));
            }
        }
        Ok(())
    }

    /// Remove the terms of `ctx` only. Returns whether anything was stored.
    pub fn clear(&mut self, ctx: SelectionContext) -> bool {
        match ctx {
            SelectionContext::Selection => self.values.remove(SELECTION_TERMS_KEY).is_some(),
            SelectionContext::Detail(id) => {
                let mut map = self.detail_map();
                let removed = map.remove(&id.to_string()).is_some();
                if map.is_empty() {
                    self.values.remove(DETAIL_TERMS_KEY);
                } else {
                    self.values
                        .insert(DETAIL_TERMS_KEY.to_string(), Value::Object(map));
                }
                removed
            }
        }
    }

    pub fn push_message(&mut self, level: Level, text: impl Into<String>) {
        let mut messages = self.peek_messages();
        messages.push(Message {
            level,
            text: text.into(),
        });
        if let Ok(value) = serde_json::to_value(&messages) {
            self.values.insert(MESSAGES_KEY.to_string(), value);
        }
    }

    /// Drain pending flash messages, oldest first.
    pub fn take_messages(&mut self) -> Vec<Message> {
        self.values
            .remove(MESSAGES_KEY)
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    fn peek_messages(&self) -> Vec<Message> {
        self.values
            .get(MESSAGES_KEY)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    fn detail_map(&self) -> Map<String, Value> {
        self.values
            .get(DETAIL_TERMS_KEY)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Session stores
// ---------------------------------------------------------------------------

/// Opaque session identifier carried by the session cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persistence for session documents.
pub trait SessionStore: Send + Sync {
    /// The live document of `id`, or `None` when unknown or expired.
    fn load(&self, id: &SessionId) -> Option<SessionData>;

    /// Replace the document of `id` and refresh its expiry.
    fn save(&self, id: &SessionId, data: SessionData);

    fn remove(&self, id: &SessionId);
}

struct Entry {
    data: SessionData,
    touched: Instant,
}

/// In-process session store with an idle TTL.
///
/// Expired sessions are dropped lazily, on access and on save.
pub struct MemorySessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<SessionId, Entry>>,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of sessions held, expired ones included.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Entry>> {
        // a panicking request leaves the map itself intact
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_expired(&self, entry: &Entry, now: Instant) -> bool {
        now.saturating_duration_since(entry.touched) > self.ttl
    }

    fn load_at(&self, id: &SessionId, now: Instant) -> Option<SessionData> {
        let mut sessions = self.lock();
        let expired = self.is_expired(sessions.get(id)?, now);
        if expired {
            sessions.remove(id);
            log::debug!("session {id} expired");
            return None;
        }
        sessions.get(id).map(|e| e.data.clone())
    }

    fn save_at(&self, id: &SessionId, data: SessionData, now: Instant) {
        let mut sessions = self.lock();
        sessions.retain(|_, e| now.saturating_duration_since(e.touched) <= self.ttl);
        sessions.insert(*id, Entry { data, touched: now });
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, id: &SessionId) -> Option<SessionData> {
        self.load_at(id, Instant::now())
    }

    fn save(&self, id: &SessionId, data: SessionData) {
        self.save_at(id, data, Instant::now());
    }

    fn remove(&self, id: &SessionId) {
        self.lock().remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filter::FilterSpec;

    fn species_terms() -> SearchTerms {
        let mut filter = FilterSpec::default();
        filter.species.insert(Uuid::new_v4());
        SearchTerms {
            filter,
            omics_units: Vec::new(),
        }
    }

    #[test]
    fn contexts_are_stored_independently() {
        let mut session = SessionData::default();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let selection = species_terms();
        let detail = SearchTerms::omics_units(vec!["YAL001C".into()]);

        session.set(SelectionContext::Selection, &selection).unwrap();
        session.set(SelectionContext::Detail(a), &detail).unwrap();

        assert_eq!(session.get(SelectionContext::Selection), Some(selection));
        assert_eq!(session.get(SelectionContext::Detail(a)), Some(detail));
        assert_eq!(session.get(SelectionContext::Detail(b)), None);
    }

    #[test]
    fn clearing_detail_keeps_selection_and_other_details() {
        let mut session = SessionData::default();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let selection = species_terms();
        let other = SearchTerms::omics_units(vec!["YKL001C".into()]);
        session.set(SelectionContext::Selection, &selection).unwrap();
        session
            .set(SelectionContext::Detail(a), &SearchTerms::omics_units(vec!["X".into()]))
            .unwrap();
        session.set(SelectionContext::Detail(b), &other).unwrap();

        assert!(session.clear(SelectionContext::Detail(a)));
        assert_eq!(session.get(SelectionContext::Detail(a)), None);
        assert_eq!(session.get(SelectionContext::Selection), Some(selection));
        assert_eq!(session.get(SelectionContext::Detail(b)), Some(other));
    }

    #[test]
    fn clearing_selection_keeps_details() {
        let mut session = SessionData::default();
        let a = Uuid::new_v4();
        let detail = SearchTerms::omics_units(vec!["YAL001C".into()]);
        session.set(SelectionContext::Selection, &species_terms()).unwrap();
        session.set(SelectionContext::Detail(a), &detail).unwrap();

        assert!(session.clear(SelectionContext::Selection));
        assert!(!session.clear(SelectionContext::Selection));
        assert_eq!(session.get(SelectionContext::Detail(a)), Some(detail));
    }

    #[test]
    fn setting_the_same_terms_twice_is_idempotent() {
        let terms = species_terms();
        let mut once = SessionData::default();
        once.set(SelectionContext::Selection, &terms).unwrap();
        let mut twice = once.clone();
        twice.set(SelectionContext::Selection, &terms).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn messages_drain_in_order() {
        let mut session = SessionData::default();
        session.push_message(Level::Success, "first");
        session.push_message(Level::Error, "second");
        let texts: Vec<String> = session.take_messages().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert!(session.take_messages().is_empty());
        assert!(session.is_empty());
    }

    #[test]
    fn store_keeps_sessions_apart() {
        let store = MemorySessionStore::new(Duration::from_secs(60));
        let alice = SessionId::generate();
        let bob = SessionId::generate();
        let mut data = SessionData::default();
        data.set(SelectionContext::Selection, &species_terms()).unwrap();
        store.save(&alice, data.clone());

        assert_eq!(store.load(&alice), Some(data));
        assert_eq!(store.load(&bob), None);
    }

    #[test]
    fn idle_sessions_expire() {
        let store = MemorySessionStore::new(Duration::from_secs(60));
        let id = SessionId::generate();
        let start = Instant::now();
        store.save_at(&id, SessionData::default(), start);

        assert!(store.load_at(&id, start + Duration::from_secs(30)).is_some());
        assert!(store.load_at(&id, start + Duration::from_secs(61)).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn session_id_parses_its_own_display() {
        let id = SessionId::generate();
        assert_eq!(SessionId::parse(&id.to_string()), Some(id));
        assert_eq!(SessionId::parse("not-a-session"), None);
    }
}
