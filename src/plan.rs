use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Full replace; a null value removes the key.
    Set,
    /// Deep merge; null members remove those members.
    Merge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub method: Method,
    pub key: String,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Optimistic,
    Success,
    Failure,
}

/// The three patch lists of one mutation. All three are computed together,
/// from the snapshot as it was before the mutation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationPlan {
    pub optimistic: Vec<Update>,
    pub success: Vec<Update>,
    pub failure: Vec<Update>,
}

impl MutationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self, phase: Phase) -> &[Update] {
        match phase {
            Phase::Optimistic => &self.optimistic,
            Phase::Success => &self.success,
            Phase::Failure => &self.failure,
        }
    }

    fn updates_mut(&mut self, phase: Phase) -> &mut Vec<Update> {
        match phase {
            Phase::Optimistic => &mut self.optimistic,
            Phase::Success => &mut self.success,
            Phase::Failure => &mut self.failure,
        }
    }

    pub fn push(&mut self, phase: Phase, update: Update) -> &mut Self {
        self.updates_mut(phase).push(update);
        self
    }

    pub fn set<T: Serialize + ?Sized>(
        &mut self,
        phase: Phase,
        key: impl Into<String>,
        value: &T,
    ) -> Result<&mut Self> {
        let value = serde_json::to_value(value)?;
        Ok(self.push(
            phase,
            Update {
                method: Method::Set,
                key: key.into(),
                value,
            },
        ))
    }

    pub fn merge<T: Serialize + ?Sized>(
        &mut self,
        phase: Phase,
        key: impl Into<String>,
        value: &T,
    ) -> Result<&mut Self> {
        let value = serde_json::to_value(value)?;
        Ok(self.push(
            phase,
            Update {
                method: Method::Merge,
                key: key.into(),
                value,
            },
        ))
    }

    pub fn remove(&mut self, phase: Phase, key: impl Into<String>) -> &mut Self {
        self.push(
            phase,
            Update {
                method: Method::Set,
                key: key.into(),
                value: Value::Null,
            },
        )
    }

    /// Writes `after` optimistically and schedules its rollback. A brand new
    /// entity is replaced wholesale; an existing one only receives the members
    /// that changed, and the failure phase receives the inverse.
    pub fn write<T: Serialize>(
        &mut self,
        key: &str,
        before: Option<&T>,
        after: &T,
    ) -> Result<&mut Self> {
        let after = serde_json::to_value(after)?;
        match before {
            None => {
                self.set(Phase::Optimistic, key, &after)?;
            }
            Some(before) => {
                let before = serde_json::to_value(before)?;
                self.merge(Phase::Optimistic, key, &diff(&before, &after))?;
                self.merge(Phase::Failure, key, &diff(&after, &before))?;
            }
        }
        Ok(self)
    }

    /// `write` for one member of a keyed container, such as an action in a
    /// report's actions. `None` on either side means the member is absent.
    pub fn write_member<T: Serialize>(
        &mut self,
        key: &str,
        member: &str,
        before: Option<&T>,
        after: Option<&T>,
    ) -> Result<&mut Self> {
        let before = before.map(|b| serde_json::to_value(b)).transpose()?;
        let after = after.map(|a| serde_json::to_value(a)).transpose()?;
        let (forward, backward) = match (before, after) {
            (Some(before), Some(after)) => (diff(&before, &after), diff(&after, &before)),
            (None, Some(after)) => (after, Value::Null),
            (Some(before), None) => (Value::Null, before),
            (None, None) => return Ok(self),
        };

        let wrap = |value: Value| Value::Object([(member.to_owned(), value)].into_iter().collect());
        self.merge(Phase::Optimistic, key, &wrap(forward))?;
        self.merge(Phase::Failure, key, &wrap(backward))?;
        Ok(self)
    }

    pub fn extend(&mut self, other: MutationPlan) -> &mut Self {
        self.optimistic.extend(other.optimistic);
        self.success.extend(other.success);
        self.failure.extend(other.failure);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.optimistic.is_empty() && self.success.is_empty() && self.failure.is_empty()
    }

    pub fn keys(&self, phase: Phase) -> impl Iterator<Item = &str> {
        self.updates(phase).iter().map(|u| u.key.as_str())
    }
}

/// The merge patch that turns `from` into `to`. Members only in `from` become
/// nulls, members that differ carry their `to` value.
pub fn diff(from: &Value, to: &Value) -> Value {
    match (from, to) {
        (Value::Object(from), Value::Object(to)) => {
            let mut patch = Map::new();
            for (key, target) in to {
                match from.get(key) {
                    None if target.is_null() => {}
                    None => {
                        patch.insert(key.clone(), target.clone());
                    }
                    Some(previous) if previous == target => {}
                    Some(previous @ Value::Object(_)) if target.is_object() => {
                        patch.insert(key.clone(), diff(previous, target));
                    }
                    Some(_) => {
                        patch.insert(key.clone(), target.clone());
                    }
                }
            }
            for key in from.keys() {
                if !to.contains_key(key) {
                    patch.insert(key.clone(), Value::Null);
                }
            }
            Value::Object(patch)
        }
        (_, to) => to.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;

    #[test]
    fn test_diff_changes_and_removals() {
        let from = json!({"total": 1500, "cachedTotal": "$15.00", "iouReportID": "7", "pendingFields": {"preview": "update"}});
        let to = json!({"total": 2000, "cachedTotal": "$20.00", "pendingFields": {"preview": "update", "amount": "update"}});

        assert_eq!(
            diff(&from, &to),
            json!({"total": 2000, "cachedTotal": "$20.00", "iouReportID": null, "pendingFields": {"amount": "update"}})
        );
    }

    #[test]
    fn test_diff_of_equal_values_is_empty() {
        let value = json!({"a": {"b": [1, 2]}});
        assert_eq!(diff(&value, &value), json!({}));
    }

    #[test]
    fn test_write_new_entity_is_a_set() -> Result<()> {
        let mut plan = MutationPlan::new();
        plan.write("report_1", None, &json!({"reportID": "1"}))?;

        assert_eq!(plan.optimistic.len(), 1);
        assert_eq!(plan.optimistic[0].method, Method::Set);
        assert!(plan.failure.is_empty());

        Ok(())
    }

    #[test]
    fn test_write_existing_entity_schedules_inverse() -> Result<()> {
        let mut plan = MutationPlan::new();
        let before = json!({"reportID": "1", "total": 100});
        let after = json!({"reportID": "1", "total": 250});
        plan.write("report_1", Some(&before), &after)?;

        assert_eq!(plan.optimistic[0].value, json!({"total": 250}));
        assert_eq!(plan.failure[0].value, json!({"total": 100}));

        Ok(())
    }

    #[test]
    fn test_write_member_removal_restores_whole_member() -> Result<()> {
        let mut plan = MutationPlan::new();
        let action = json!({"reportActionID": "5", "childMoneyRequestCount": 1});
        plan.write_member("reportActions_9", "5", Some(&action), None)?;

        assert_eq!(plan.optimistic[0].value, json!({"5": null}));
        assert_eq!(plan.failure[0].value, json!({"5": action}));

        Ok(())
    }
}
