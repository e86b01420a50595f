//! The shared in-memory keyspace.
//!
//! Maps keys to typed values (strings or streams) with optional wall-clock
//! expiry. All mutation goes through `&mut self` so the store can live behind
//! a single reader-writer lock: reads take the shared side, writes and lazy
//! expiry eviction take the exclusive side.

use std::collections::HashMap;

use jiff::Timestamp;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug, PartialEq)]
pub enum StoreError {
    #[error("value is not an integer or out of range")]
    NotInteger,
    #[error("The ID specified in XADD is equal or smaller than the target stream top item")]
    StreamIdTooSmall,
    #[error("The ID specified in XADD must be greater than 0-0")]
    StreamIdZero,
    #[error("wrong data type for key")]
    WrongType,
}

/// One stream entry: the `(milliseconds, sequence)` pair is the entry ID,
/// rendered on the wire as `"<ms>-<seq>"`. Fields keep insertion order.
#[derive(Debug, PartialEq, Clone)]
pub struct StreamEntry {
    pub milliseconds: i64,
    pub sequence: i64,
    pub fields: Vec<(String, String)>,
}

impl StreamEntry {
    pub fn id(&self) -> (i64, i64) {
        (self.milliseconds, self.sequence)
    }

    pub fn id_string(&self) -> String {
        format!("{}-{}", self.milliseconds, self.sequence)
    }
}

/// An append-only stream plus the waiters parked on it by blocking XREAD.
///
/// Entries are strictly increasing by `(ms, seq)` in insertion order. Each
/// append drains the waiter list and signals every sender; blocked readers
/// re-register on their next poll iteration.
#[derive(Debug, Default)]
pub struct Stream {
    pub entries: Vec<StreamEntry>,
    waiters: Vec<mpsc::Sender<()>>,
}

impl Stream {
    pub fn last_id(&self) -> Option<(i64, i64)> {
        self.entries.last().map(StreamEntry::id)
    }

    fn notify_waiters(&mut self) {
        for waiter in self.waiters.drain(..) {
            let _ = waiter.try_send(());
        }
    }

    fn register_waiter(&mut self, sender: &mpsc::Sender<()>) {
        if !self.waiters.iter().any(|w| w.same_channel(sender)) {
            self.waiters.push(sender.clone());
        }
    }
}

#[derive(Debug)]
pub enum DataType {
    String(String),
    Stream(Stream),
}

#[derive(Debug)]
pub struct Value {
    pub data: DataType,
    pub expiration: Option<Timestamp>,
}

/// The keyspace itself. Created once at startup (optionally seeded from an
/// RDB snapshot) and shared for the process lifetime.
#[derive(Debug, Default)]
pub struct KeyValueStore {
    entries: HashMap<String, Value>,
}

impl KeyValueStore {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn from_snapshot(entries: HashMap<String, Value>) -> Self {
        Self { entries }
    }

    fn is_expired(&self, key: &str) -> bool {
        match self.entries.get(key).and_then(|value| value.expiration) {
            Some(expiration) => Timestamp::now() > expiration,
            None => false,
        }
    }

    /// Stores a string value, overwriting any previous value and clearing any
    /// prior expiry unless a new one is supplied.
    pub fn set(&mut self, key: String, value: String, expiration: Option<Timestamp>) {
        self.entries.insert(
            key,
            Value {
                data: DataType::String(value),
                expiration,
            },
        );
    }

    /// Looks up a key, lazily evicting it when its expiry has passed.
    pub fn get(&mut self, key: &str) -> Option<&Value> {
        if self.is_expired(key) {
            self.entries.remove(key);
            return None;
        }

        self.entries.get(key)
    }

    /// Read-only lookup that treats expired entries as absent without
    /// evicting them, so it can run under the shared side of the lock.
    pub fn peek(&self, key: &str) -> Option<&Value> {
        if self.is_expired(key) {
            return None;
        }

        self.entries.get(key)
    }

    /// Removes a key. Returns whether a live (non-expired) value was present.
    pub fn remove(&mut self, key: &str) -> bool {
        if self.is_expired(key) {
            self.entries.remove(key);
            return false;
        }

        self.entries.remove(key).is_some()
    }

    /// All non-expired keys, in unspecified order. Expired entries are
    /// skipped but left for the lazy eviction path in `get`.
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .keys()
            .filter(|key| !self.is_expired(key.as_str()))
            .cloned()
            .collect()
    }

    pub fn value_type(&self, key: &str) -> &'static str {
        match self.peek(key) {
            Some(value) => match value.data {
                DataType::String(_) => "string",
                DataType::Stream(_) => "stream",
            },
            None => "none",
        }
    }

    /// Parses the stored string as a signed 64-bit decimal, increments it and
    /// stores it back as decimal text. A missing key counts from 0.
    pub fn incr(&mut self, key: &str) -> Result<i64, StoreError> {
        if self.get(key).is_none() {
            self.set(key.to_string(), "1".to_string(), None);
            return Ok(1);
        }

        let value = self.entries.get_mut(key).ok_or(StoreError::NotInteger)?;

        let DataType::String(ref mut stored) = value.data else {
            return Err(StoreError::NotInteger);
        };

        let incremented = stored
            .parse::<i64>()
            .ok()
            .and_then(|n| n.checked_add(1))
            .ok_or(StoreError::NotInteger)?;

        *stored = incremented.to_string();

        Ok(incremented)
    }

    /// Fetches the stream at `key`, creating an empty one when the key is
    /// absent. Fails when the key holds a string.
    fn stream_entry_mut(&mut self, key: &str) -> Result<&mut Stream, StoreError> {
        if self.is_expired(key) {
            self.entries.remove(key);
        }

        let value = self.entries.entry(key.to_string()).or_insert_with(|| Value {
            data: DataType::Stream(Stream::default()),
            expiration: None,
        });

        match value.data {
            DataType::Stream(ref mut stream) => Ok(stream),
            DataType::String(_) => Err(StoreError::WrongType),
        }
    }

    /// Appends an entry to the stream at `key` and wakes any blocked readers.
    ///
    /// `requested_ms == -1` means "use the current time in milliseconds";
    /// `requested_seq == -1` auto-generates the sequence: `last.seq + 1` when
    /// the milliseconds match the top entry, `0` for a later timestamp (`1`
    /// for an empty stream at `ms == 0`, so `0-0` is never produced).
    /// Explicit IDs must be strictly greater than the current top entry and
    /// `0-0` is always rejected.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The ID of the appended entry, formatted `"<ms>-<seq>"`
    /// * `Err(StoreError::StreamIdZero)` - The explicit ID was `0-0`
    /// * `Err(StoreError::StreamIdTooSmall)` - The ID does not advance the stream
    /// * `Err(StoreError::WrongType)` - The key holds a string
    pub fn xadd(
        &mut self,
        key: &str,
        requested_ms: i64,
        requested_seq: i64,
        fields: Vec<(String, String)>,
    ) -> Result<String, StoreError> {
        if requested_ms == 0 && requested_seq == 0 {
            return Err(StoreError::StreamIdZero);
        }

        let stream = self.stream_entry_mut(key)?;

        let milliseconds = if requested_ms == -1 {
            Timestamp::now().as_millisecond()
        } else {
            requested_ms
        };

        let sequence = if requested_seq == -1 {
            match stream.last_id() {
                Some((last_ms, last_seq)) => {
                    if milliseconds == last_ms {
                        last_seq + 1
                    } else if milliseconds > last_ms {
                        0
                    } else {
                        return Err(StoreError::StreamIdTooSmall);
                    }
                }
                None => {
                    if milliseconds == 0 {
                        1
                    } else {
                        0
                    }
                }
            }
        } else {
            if let Some(last) = stream.last_id() {
                if (milliseconds, requested_seq) <= last {
                    return Err(StoreError::StreamIdTooSmall);
                }
            }

            requested_seq
        };

        let entry = StreamEntry {
            milliseconds,
            sequence,
            fields,
        };
        let id = entry.id_string();

        stream.entries.push(entry);
        stream.notify_waiters();

        Ok(id)
    }

    /// Entries whose ID falls in the closed interval `[start, end]`, compared
    /// lexicographically on the `(ms, seq)` pair.
    pub fn xrange(
        &self,
        key: &str,
        start: (i64, i64),
        end: (i64, i64),
    ) -> Result<Vec<StreamEntry>, StoreError> {
        let Some(value) = self.peek(key) else {
            return Ok(Vec::new());
        };

        let DataType::Stream(ref stream) = value.data else {
            return Err(StoreError::WrongType);
        };

        Ok(stream
            .entries
            .iter()
            .filter(|entry| start <= entry.id() && entry.id() <= end)
            .cloned()
            .collect())
    }

    /// Entries with an ID strictly greater than `after`, for XREAD.
    pub fn entries_after(
        &self,
        key: &str,
        after: (i64, i64),
    ) -> Result<Vec<StreamEntry>, StoreError> {
        let Some(value) = self.peek(key) else {
            return Ok(Vec::new());
        };

        let DataType::Stream(ref stream) = value.data else {
            return Err(StoreError::WrongType);
        };

        Ok(stream
            .entries
            .iter()
            .filter(|entry| entry.id() > after)
            .cloned()
            .collect())
    }

    /// Parks a blocking XREAD waiter on the stream at `key`, creating an
    /// empty stream when the key does not exist yet. The sender is signalled
    /// on the next XADD to that stream.
    pub fn register_stream_waiter(
        &mut self,
        key: &str,
        sender: &mpsc::Sender<()>,
    ) -> Result<(), StoreError> {
        let stream = self.stream_entry_mut(key)?;
        stream.register_waiter(sender);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;

    use super::{KeyValueStore, StoreError};

    fn fields(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_set_overwrites_and_clears_expiry() {
        let mut store = KeyValueStore::new();
        let future = Timestamp::now() + jiff::SignedDuration::from_secs(60);

        store.set("fruit".to_string(), "mango".to_string(), Some(future));
        store.set("fruit".to_string(), "pear".to_string(), None);

        let value = store.get("fruit").unwrap();
        assert_eq!(value.expiration, None);
    }

    #[test]
    fn test_get_evicts_expired_keys() {
        let mut store = KeyValueStore::new();
        let past = Timestamp::now() - jiff::SignedDuration::from_secs(1);

        store.set("stale".to_string(), "value".to_string(), Some(past));

        assert!(store.get("stale").is_none());
        assert_eq!(store.keys(), Vec::<String>::new());
    }

    #[test]
    fn test_keys_skips_expired_entries() {
        let mut store = KeyValueStore::new();
        let past = Timestamp::now() - jiff::SignedDuration::from_secs(1);

        store.set("alive".to_string(), "1".to_string(), None);
        store.set("dead".to_string(), "2".to_string(), Some(past));

        assert_eq!(store.keys(), vec!["alive".to_string()]);
    }

    #[test]
    fn test_remove() {
        let mut store = KeyValueStore::new();
        store.set("a".to_string(), "1".to_string(), None);

        assert_eq!(store.remove("a"), true);
        assert_eq!(store.remove("a"), false);
        assert_eq!(store.remove("never-there"), false);
    }

    #[test]
    fn test_incr() {
        let mut store = KeyValueStore::new();
        let max = i64::MAX.to_string();

        let test_cases = vec![
            ("missing", None, Ok(1)),
            ("ten", Some("10"), Ok(11)),
            ("negative", Some("-3"), Ok(-2)),
            ("word", Some("banana"), Err(StoreError::NotInteger)),
            ("float", Some("2.5"), Err(StoreError::NotInteger)),
            ("max", Some(max.as_str()), Err(StoreError::NotInteger)),
        ];

        for (key, initial, expected) in test_cases {
            if let Some(initial) = initial {
                store.set(key.to_string(), initial.to_string(), None);
            }

            assert_eq!(store.incr(key), expected, "INCR on key {}", key);
        }
    }

    #[test]
    fn test_incr_stores_back_decimal_text() {
        let mut store = KeyValueStore::new();
        store.set("n".to_string(), "41".to_string(), None);

        store.incr("n").unwrap();

        match &store.get("n").unwrap().data {
            super::DataType::String(s) => assert_eq!(s, "42"),
            other => panic!("expected string value, got {:?}", other),
        }
    }

    #[test]
    fn test_xadd_explicit_id_ordering() {
        let mut store = KeyValueStore::new();

        assert_eq!(
            store.xadd("s", 1, 1, fields(&[("a", "1")])),
            Ok("1-1".to_string())
        );
        assert_eq!(
            store.xadd("s", 1, 2, fields(&[("a", "2")])),
            Ok("1-2".to_string())
        );
        assert_eq!(
            store.xadd("s", 1, 1, fields(&[("a", "3")])),
            Err(StoreError::StreamIdTooSmall)
        );
        assert_eq!(
            store.xadd("s", 0, 5, fields(&[("a", "4")])),
            Err(StoreError::StreamIdTooSmall)
        );
        assert_eq!(
            store.xadd("s", 2, 0, fields(&[("a", "5")])),
            Ok("2-0".to_string())
        );
    }

    #[test]
    fn test_xadd_rejects_zero_id() {
        let mut store = KeyValueStore::new();

        assert_eq!(
            store.xadd("s", 0, 0, fields(&[("a", "1")])),
            Err(StoreError::StreamIdZero)
        );
    }

    #[test]
    fn test_xadd_auto_sequence() {
        let mut store = KeyValueStore::new();

        // Empty stream at ms 0 starts at sequence 1 to dodge 0-0.
        assert_eq!(store.xadd("s", 0, -1, fields(&[])), Ok("0-1".to_string()));
        assert_eq!(store.xadd("s", 0, -1, fields(&[])), Ok("0-2".to_string()));
        assert_eq!(store.xadd("s", 5, -1, fields(&[])), Ok("5-0".to_string()));
        assert_eq!(store.xadd("s", 5, -1, fields(&[])), Ok("5-1".to_string()));
        assert_eq!(
            store.xadd("s", 4, -1, fields(&[])),
            Err(StoreError::StreamIdTooSmall)
        );

        assert_eq!(
            store.xadd("fresh", 7, -1, fields(&[])),
            Ok("7-0".to_string())
        );
    }

    #[test]
    fn test_xadd_auto_milliseconds_uses_current_time() {
        let mut store = KeyValueStore::new();
        let before = Timestamp::now().as_millisecond();

        let id = store.xadd("s", -1, -1, fields(&[("k", "v")])).unwrap();
        let ms = id.split('-').next().unwrap().parse::<i64>().unwrap();

        assert!(ms >= before, "generated ms {} should be >= {}", ms, before);
    }

    #[test]
    fn test_xadd_on_string_key_is_wrong_type() {
        let mut store = KeyValueStore::new();
        store.set("plain".to_string(), "text".to_string(), None);

        assert_eq!(
            store.xadd("plain", 1, 1, fields(&[])),
            Err(StoreError::WrongType)
        );
    }

    #[test]
    fn test_xrange_is_lexicographic_on_id_pairs() {
        let mut store = KeyValueStore::new();
        store.xadd("s", 1, 5, fields(&[("n", "a")])).unwrap();
        store.xadd("s", 2, 1, fields(&[("n", "b")])).unwrap();
        store.xadd("s", 3, 0, fields(&[("n", "c")])).unwrap();

        // (2, 1) sits inside [(1, 5), (3, 0)] even though its sequence is
        // lower than both bounds' sequences; per-field comparison would
        // wrongly drop it.
        let entries = store.xrange("s", (1, 5), (3, 0)).unwrap();
        let ids: Vec<String> = entries.iter().map(|e| e.id_string()).collect();

        assert_eq!(ids, vec!["1-5", "2-1", "3-0"]);
    }

    #[test]
    fn test_xrange_bounds_are_inclusive() {
        let mut store = KeyValueStore::new();
        store.xadd("s", 1, 1, fields(&[])).unwrap();
        store.xadd("s", 1, 2, fields(&[])).unwrap();
        store.xadd("s", 1, 3, fields(&[])).unwrap();

        let entries = store.xrange("s", (1, 2), (1, 3)).unwrap();
        let ids: Vec<String> = entries.iter().map(|e| e.id_string()).collect();

        assert_eq!(ids, vec!["1-2", "1-3"]);
    }

    #[test]
    fn test_xrange_missing_key_is_empty() {
        let mut store = KeyValueStore::new();
        assert_eq!(store.xrange("nope", (0, 0), (i64::MAX, i64::MAX)), Ok(vec![]));
    }

    #[test]
    fn test_entries_after_is_strictly_greater() {
        let mut store = KeyValueStore::new();
        store.xadd("s", 1, 1, fields(&[])).unwrap();
        store.xadd("s", 1, 2, fields(&[])).unwrap();
        store.xadd("s", 2, 0, fields(&[])).unwrap();

        let entries = store.entries_after("s", (1, 1)).unwrap();
        let ids: Vec<String> = entries.iter().map(|e| e.id_string()).collect();

        assert_eq!(ids, vec!["1-2", "2-0"]);
    }

    #[tokio::test]
    async fn test_xadd_signals_registered_waiters() {
        let mut store = KeyValueStore::new();
        let (sender, mut receiver) = tokio::sync::mpsc::channel(1);

        store.register_stream_waiter("s", &sender).unwrap();
        store.xadd("s", 1, 1, fields(&[("k", "v")])).unwrap();

        assert_eq!(receiver.try_recv(), Ok(()));
    }

    #[tokio::test]
    async fn test_waiter_registration_deduplicates_by_channel() {
        let mut store = KeyValueStore::new();
        let (sender, mut receiver) = tokio::sync::mpsc::channel(4);

        store.register_stream_waiter("s", &sender).unwrap();
        store.register_stream_waiter("s", &sender).unwrap();
        store.xadd("s", 1, 1, fields(&[])).unwrap();

        assert_eq!(receiver.try_recv(), Ok(()));
        assert!(receiver.try_recv().is_err(), "only one signal expected");
    }
}
