//! String dictionaries used to encode string constants as 32-bit ids
//!
//! The code generator only needs two things from a dictionary: the id of a
//! string (inserting it when it is new) and the null id. Dictionaries are
//! looked up by dictionary id in a [`StringDictionaryRegistry`].

use crate::types::NULL_DICT_ID;
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// String dictionary capability consumed by the code generator
pub trait StringDictionary: Send + Sync {
    /// Id of `value`, inserting it if absent
    fn id_of(&self, value: &str) -> i32;

    /// String stored under `id`
    fn get_string(&self, id: i32) -> Option<String>;

    /// Number of distinct strings
    fn len(&self) -> usize;

    /// Whether the dictionary holds no strings
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Id representing SQL NULL
    fn null_id(&self) -> i32 {
        NULL_DICT_ID
    }
}

#[derive(Debug, Default)]
struct DictionaryInner {
    /// Index = id
    values: Vec<String>,
    /// Reverse lookup: string -> id
    index_map: HashMap<String, i32>,
}

/// Append-only dictionary held in memory
#[derive(Debug, Default)]
pub struct InMemoryStringDictionary {
    inner: RwLock<DictionaryInner>,
}

impl InMemoryStringDictionary {
    /// Create an empty dictionary
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dictionary pre-populated with `values`, ids assigned in order
    pub fn from_values<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let dict = Self::new();
        for value in values {
            dict.id_of(value.as_ref());
        }
        dict
    }
}

impl StringDictionary for InMemoryStringDictionary {
    fn id_of(&self, value: &str) -> i32 {
        if let Some(id) = self.inner.read().index_map.get(value) {
            return *id;
        }

        let mut inner = self.inner.write();
        // another writer may have inserted it between the two locks
        if let Some(id) = inner.index_map.get(value) {
            return *id;
        }
        let id = inner.values.len() as i32;
        inner.values.push(value.to_string());
        inner.index_map.insert(value.to_string(), id);
        id
    }

    fn get_string(&self, id: i32) -> Option<String> {
        if id < 0 {
            return None;
        }
        self.inner.read().values.get(id as usize).cloned()
    }

    fn len(&self) -> usize {
        self.inner.read().values.len()
    }
}

/// Dictionaries keyed by dictionary id
#[derive(Default)]
pub struct StringDictionaryRegistry {
    dictionaries: RwLock<HashMap<i32, Arc<dyn StringDictionary>>>,
}

impl StringDictionaryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a dictionary under `dict_id`, replacing any previous one
    pub fn register(&self, dict_id: i32, dictionary: Arc<dyn StringDictionary>) {
        self.dictionaries.write().insert(dict_id, dictionary);
    }

    /// Dictionary registered under `dict_id`
    pub fn get(&self, dict_id: i32) -> Result<Arc<dyn StringDictionary>> {
        self.dictionaries
            .read()
            .get(&dict_id)
            .cloned()
            .ok_or_else(|| Error::dictionary(format!("no string dictionary with id {dict_id}")))
    }

    /// Dictionary registered under `dict_id`, creating an empty in-memory one
    /// if none exists
    pub fn get_or_create(&self, dict_id: i32) -> Arc<dyn StringDictionary> {
        if let Some(dict) = self.dictionaries.read().get(&dict_id) {
            return dict.clone();
        }
        self.dictionaries
            .write()
            .entry(dict_id)
            .or_insert_with(|| Arc::new(InMemoryStringDictionary::new()))
            .clone()
    }

    /// Registered dictionary ids, sorted
    pub fn ids(&self) -> Vec<i32> {
        let mut ids: Vec<i32> = self.dictionaries.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl std::fmt::Debug for StringDictionaryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StringDictionaryRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}
