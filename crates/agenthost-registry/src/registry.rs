use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use agenthost_models::{Instrument, PairKey, PairRecord};
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::store::PairStore;

/// Cache and allocator of instrument identities.
///
/// Both lookup views and the store handle sit behind one mutex, so the views
/// are never observable out of step with each other and id allocation is
/// serialized. New pairs are written to the store before they are published
/// to the views.
///
/// Construct one at startup and share it behind an `Arc`.
pub struct InstrumentRegistry {
    inner: Mutex<Inner>,
}

struct Inner {
    views: PairViews,
    store: Box<dyn PairStore>,
}

#[derive(Default)]
struct PairViews {
    by_id: BTreeMap<i64, Instrument>,
    by_name: HashMap<String, Instrument>,
}

impl PairViews {
    fn from_records(records: Vec<PairRecord>) -> Self {
        let mut views = Self::default();
        for record in records {
            views.insert(Instrument::from(record));
        }
        views
    }

    fn insert(&mut self, instrument: Instrument) {
        self.by_name
            .insert(instrument.name.clone(), instrument.clone());
        self.by_id.insert(instrument.id, instrument);
    }

    fn next_id(&self) -> Result<i64, RegistryError> {
        match self.by_id.keys().next_back() {
            None => Ok(0),
            Some(&max) => max.checked_add(1).ok_or(RegistryError::IdSpaceExhausted { max }),
        }
    }
}

/// Canonical form of a pair name: surrounding whitespace removed, ASCII uppercase.
pub fn normalize_name(name: &str) -> Result<String, RegistryError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    Ok(trimmed.to_ascii_uppercase())
}

impl InstrumentRegistry {
    /// Build the registry from the full current contents of `store`.
    pub fn load(store: impl PairStore + 'static) -> Result<Self, RegistryError> {
        let records = store.read_all()?;
        let views = PairViews::from_records(records);
        info!(count = views.by_id.len(), "Instrument registry loaded");
        Ok(Self {
            inner: Mutex::new(Inner {
                views,
                store: Box::new(store),
            }),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, RegistryError> {
        self.inner
            .lock()
            .map_err(|e| RegistryError::Unavailable(format!("registry mutex poisoned: {e}")))
    }

    /// Return the instrument named `name`, allocating and persisting a new one
    /// on first reference.
    pub fn create_or_get(&self, name: &str) -> Result<Instrument, RegistryError> {
        let name = normalize_name(name)?;
        let mut inner = self.lock()?;

        if let Some(existing) = inner.views.by_name.get(&name) {
            return Ok(existing.clone());
        }

        let instrument = Instrument::new(inner.views.next_id()?, name);
        inner.store.insert_unique(&PairRecord::from(&instrument))?;
        inner.views.insert(instrument.clone());

        info!(pair = %instrument.name, id = instrument.id, "Registered new pair");
        Ok(instrument)
    }

    pub fn get_by_id(&self, id: i64) -> Result<Instrument, RegistryError> {
        let inner = self.lock()?;
        inner
            .views
            .by_id
            .get(&id)
            .cloned()
            .ok_or(RegistryError::NotFound {
                key: PairKey::Id(id),
            })
    }

    /// Look up an instrument by name.
    ///
    /// `name` is normalized first: a blank name fails with `InvalidName` and
    /// a miss reports the normalized name in `NotFound`.
    pub fn get_by_name(&self, name: &str) -> Result<Instrument, RegistryError> {
        let key = normalize_name(name)?;
        let inner = self.lock()?;
        inner
            .views
            .by_name
            .get(&key)
            .cloned()
            .ok_or(RegistryError::NotFound {
                key: PairKey::Name(key),
            })
    }

    /// Snapshot of every instrument, ordered by id.
    pub fn all(&self) -> Result<Vec<Instrument>, RegistryError> {
        let inner = self.lock()?;
        Ok(inner.views.by_id.values().cloned().collect())
    }

    pub fn len(&self) -> Result<usize, RegistryError> {
        Ok(self.lock()?.views.by_id.len())
    }

    pub fn is_empty(&self) -> Result<bool, RegistryError> {
        Ok(self.len()? == 0)
    }

    /// Replace both views with a fresh full read of the store.
    ///
    /// On a failed read the current views are kept.
    pub fn reload(&self) -> Result<(), RegistryError> {
        let mut inner = self.lock()?;
        let records = inner.store.read_all()?;
        let before = inner.views.by_id.len();
        inner.views = PairViews::from_records(records);
        debug!(before, after = inner.views.by_id.len(), "Instrument registry reloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::error::StoreError;
    use crate::sqlite::SqlitePairStore;

    /// Wraps a store and counts successful inserts.
    struct CountingStore {
        inner: SqlitePairStore,
        inserts: Arc<AtomicUsize>,
    }

    impl PairStore for CountingStore {
        fn read_all(&self) -> Result<Vec<PairRecord>, StoreError> {
            self.inner.read_all()
        }

        fn insert_unique(&mut self, record: &PairRecord) -> Result<(), StoreError> {
            self.inner.insert_unique(record)?;
            self.inserts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// A store whose writes always fail.
    struct ReadOnlyStore {
        records: Vec<PairRecord>,
    }

    impl PairStore for ReadOnlyStore {
        fn read_all(&self) -> Result<Vec<PairRecord>, StoreError> {
            Ok(self.records.clone())
        }

        fn insert_unique(&mut self, _record: &PairRecord) -> Result<(), StoreError> {
            Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery))
        }
    }

    fn empty_registry() -> InstrumentRegistry {
        InstrumentRegistry::load(SqlitePairStore::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn allocates_ids_from_zero() {
        let registry = empty_registry();

        let usdjpy = registry.create_or_get("USDJPY").unwrap();
        let eurusd = registry.create_or_get("EURUSD").unwrap();

        assert_eq!(usdjpy, Instrument::new(0, "USDJPY"));
        assert_eq!(eurusd, Instrument::new(1, "EURUSD"));
        assert_eq!(registry.get_by_name("USDJPY").unwrap().id, 0);
        assert_eq!(registry.get_by_id(1).unwrap().name, "EURUSD");
    }

    #[test]
    fn create_or_get_is_idempotent() {
        let inserts = Arc::new(AtomicUsize::new(0));
        let registry = InstrumentRegistry::load(CountingStore {
            inner: SqlitePairStore::open_in_memory().unwrap(),
            inserts: inserts.clone(),
        })
        .unwrap();

        let first = registry.create_or_get("USDJPY").unwrap();
        let second = registry.create_or_get("USDJPY").unwrap();

        assert_eq!(first, second);
        assert_eq!(inserts.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len().unwrap(), 1);
    }

    #[test]
    fn names_are_normalized() {
        let registry = empty_registry();
        let a = registry.create_or_get(" usdjpy ").unwrap();
        let b = registry.create_or_get("USDJPY").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.name, "USDJPY");
        assert_eq!(registry.get_by_name("usdjpy").unwrap(), a);
    }

    #[test]
    fn blank_name_is_rejected() {
        let registry = empty_registry();
        let err = registry.create_or_get("   ").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidName(_)));
        assert!(registry.is_empty().unwrap());
    }

    #[test]
    fn lookup_miss_carries_the_key() {
        let registry = empty_registry();

        match registry.get_by_id(42).unwrap_err() {
            RegistryError::NotFound { key } => assert_eq!(key, PairKey::Id(42)),
            other => panic!("unexpected error: {other}"),
        }
        match registry.get_by_name(" gbpusd").unwrap_err() {
            RegistryError::NotFound { key } => assert_eq!(key, PairKey::Name("GBPUSD".into())),
            other => panic!("unexpected error: {other}"),
        }
        assert!(matches!(
            registry.get_by_name("  "),
            Err(RegistryError::InvalidName(_))
        ));
    }

    #[test]
    fn next_id_follows_the_maximum_loaded_id() {
        let mut store = SqlitePairStore::open_in_memory().unwrap();
        store
            .insert_unique(&PairRecord {
                pair_id: 7,
                name: "AUDUSD".into(),
            })
            .unwrap();
        let registry = InstrumentRegistry::load(store).unwrap();

        assert_eq!(registry.create_or_get("NZDUSD").unwrap().id, 8);
    }

    #[test]
    fn exhausted_id_space_is_an_error() {
        let mut store = SqlitePairStore::open_in_memory().unwrap();
        store
            .insert_unique(&PairRecord {
                pair_id: i64::MAX,
                name: "XAUUSD".into(),
            })
            .unwrap();
        let registry = InstrumentRegistry::load(store).unwrap();

        assert!(matches!(
            registry.create_or_get("XAGUSD"),
            Err(RegistryError::IdSpaceExhausted { max: i64::MAX })
        ));
        // The registry keeps working for known pairs.
        assert_eq!(registry.create_or_get("XAUUSD").unwrap().id, i64::MAX);
        assert_eq!(registry.len().unwrap(), 1);
    }

    #[test]
    fn failed_persist_leaves_views_unchanged() {
        let registry = InstrumentRegistry::load(ReadOnlyStore {
            records: vec![PairRecord {
                pair_id: 0,
                name: "USDJPY".into(),
            }],
        })
        .unwrap();

        let err = registry.create_or_get("EURUSD").unwrap_err();
        assert!(matches!(err, RegistryError::Persistence(_)));

        assert_eq!(registry.all().unwrap(), vec![Instrument::new(0, "USDJPY")]);
        assert!(registry.get_by_name("EURUSD").is_err());
        assert!(registry.get_by_id(1).is_err());
        // Cached pairs are still served without touching the store.
        assert_eq!(registry.create_or_get("USDJPY").unwrap().id, 0);
    }

    #[test]
    fn all_is_ordered_by_id() {
        let registry = empty_registry();
        for name in ["USDJPY", "EURUSD", "GBPUSD", "AUDUSD"] {
            registry.create_or_get(name).unwrap();
        }

        let ids: Vec<i64> = registry.all().unwrap().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }
}
