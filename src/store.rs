use std::{collections::BTreeMap, fs::File, path::Path};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::*;

use crate::{
    plan::{Method, Phase, Update},
    MutationPlan,
};

/// The local key-value cache. Writes for one key apply in call order.
pub trait Store {
    fn get(&self, key: &str) -> Option<&Value>;

    /// Full replace, null removes.
    fn set(&mut self, key: &str, value: Value);

    /// Deep merge into the existing value, null members remove.
    fn merge(&mut self, key: &str, partial: Value);

    /// Every key starting with `prefix`.
    fn collection(&self, prefix: &str) -> BTreeMap<String, Value>;

    fn apply(&mut self, updates: &[Update]) {
        for update in updates {
            match update.method {
                Method::Set => self.set(&update.key, update.value.clone()),
                Method::Merge => self.merge(&update.key, update.value.clone()),
            }
        }
    }

    fn apply_phase(&mut self, plan: &MutationPlan, phase: Phase) {
        debug!("applying {:?} ({} updates)", phase, plan.updates(phase).len());
        self.apply(plan.updates(phase));
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryStore {
    values: BTreeMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        info!("loading {:?}", path);
        let file = File::open(path)?;
        Ok(serde_json::from_reader(file)?)
    }

    /// Loads every file matching `pattern`, later files winning per key.
    pub fn load_glob(pattern: &str) -> anyhow::Result<Self> {
        let mut store = Self::new();
        for entry in glob::glob(pattern)? {
            let loaded = Self::load(&entry?)?;
            store.values.extend(loaded.values);
        }
        Ok(store)
    }

    pub fn insert<T: Serialize>(&mut self, key: &str, value: &T) -> crate::Result<()> {
        self.set(key, serde_json::to_value(value)?);
        Ok(())
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        if value.is_null() {
            self.values.remove(key);
        } else {
            self.values.insert(key.to_owned(), without_nulls(value));
        }
    }

    fn merge(&mut self, key: &str, partial: Value) {
        if partial.is_null() {
            self.values.remove(key);
            return;
        }
        match self.values.get_mut(key) {
            Some(existing) => deep_merge(existing, partial),
            None => {
                self.values.insert(key.to_owned(), without_nulls(partial));
            }
        }
    }

    fn collection(&self, prefix: &str) -> BTreeMap<String, Value> {
        self.values
            .range(prefix.to_owned()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// Objects merge member by member, anything else is replaced.
pub fn deep_merge(target: &mut Value, patch: Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                if value.is_null() {
                    target.remove(&key);
                    continue;
                }
                match target.get_mut(&key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value)
                    }
                    _ => {
                        target.insert(key, without_nulls(value));
                    }
                }
            }
        }
        (target, patch) => *target = without_nulls(patch),
    }
}

fn without_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, without_nulls(v)))
                .collect(),
        ),
        other => other,
    }
}
