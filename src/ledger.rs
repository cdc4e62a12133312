use std::collections::BTreeMap;

use itertools::Itertools;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::*;

use crate::{
    keys::{self, Collection},
    model::*,
    store::{MemoryStore, Store},
};

/// Read-only view of the resident snapshot that mutations are built from.
pub trait Ledger {
    fn report(&self, report_id: &str) -> Option<Report>;

    fn reports(&self) -> Vec<Report>;

    fn report_actions(&self, report_id: &str) -> BTreeMap<String, ReportAction>;

    fn transaction(&self, transaction_id: &str) -> Option<Transaction>;

    fn transactions(&self) -> Vec<Transaction>;

    fn transaction_draft(&self, transaction_id: &str) -> Option<Transaction>;

    fn split_transaction_draft(&self, transaction_id: &str) -> Option<Transaction>;

    fn transaction_violations(&self, transaction_id: &str) -> Option<Value>;

    fn personal_details(&self) -> BTreeMap<AccountId, PersonalDetails>;

    fn policy(&self, policy_id: &str) -> Option<Policy>;

    fn recently_used_categories(&self, policy_id: &str) -> Vec<String>;

    fn recently_used_tags(&self, policy_id: &str) -> BTreeMap<String, Vec<String>>;

    fn next_step(&self, report_id: &str) -> Option<Value>;

    fn last_payment_methods(&self) -> BTreeMap<String, PaymentType>;

    /// The value under `key` exactly as stored, for restoring whole entities.
    fn stored(&self, key: &str) -> Option<Value>;

    fn person(&self, account_id: AccountId) -> Option<PersonalDetails> {
        self.personal_details().remove(&account_id)
    }

    fn person_by_login(&self, login: &str) -> Option<PersonalDetails> {
        self.personal_details()
            .into_values()
            .find(|p| p.login.as_deref() == Some(login))
    }

    fn report_action(&self, report_id: &str, action_id: &str) -> Option<ReportAction> {
        self.report_actions(report_id).remove(action_id)
    }

    /// The one-on-one chat whose participants are exactly `account_ids`.
    fn chat_by_participants(&self, account_ids: &[AccountId]) -> Option<Report> {
        let wanted = account_ids.iter().copied().sorted().dedup().collect_vec();
        self.reports().into_iter().find(|report| {
            report.report_type == ReportType::Chat
                && report.chat_type.is_none()
                && report
                    .participant_account_ids
                    .iter()
                    .copied()
                    .sorted()
                    .dedup()
                    .collect_vec()
                    == wanted
        })
    }

    fn transactions_for_report(&self, report_id: &str) -> Vec<Transaction> {
        self.transactions()
            .into_iter()
            .filter(|tx| tx.report_id.as_deref() == Some(report_id))
            .collect()
    }

    fn has_non_reimbursable_transactions(&self, report_id: &str) -> bool {
        self.transactions_for_report(report_id)
            .iter()
            .any(|tx| !tx.is_reimbursable())
    }

    /// The chat action summarizing `iou_report_id`.
    fn report_preview_action(
        &self,
        chat_report_id: &str,
        iou_report_id: &str,
    ) -> Option<ReportAction> {
        self.report_actions(chat_report_id)
            .into_values()
            .find(|action| {
                action.action_name == ActionName::ReportPreview
                    && action.original_message.linked_report_id.as_deref() == Some(iou_report_id)
            })
    }

    /// The money request action that spawned the thread `report`, if any.
    fn parent_report_action(&self, report: &Report) -> Option<ReportAction> {
        let parent_id = report.parent_report_id.as_deref()?;
        let action_id = report.parent_report_action_id.as_deref()?;
        self.report_action(parent_id, action_id)
    }
}

/// Latest action that can be shown as a container's last message, with
/// `overrides` applied on top of the stored actions. A `None` override hides
/// the action.
pub fn last_visible_action<'a>(
    actions: &'a BTreeMap<String, ReportAction>,
    overrides: &'a BTreeMap<String, Option<ReportAction>>,
) -> Option<&'a ReportAction> {
    actions
        .iter()
        .filter(|(id, _)| !overrides.contains_key(*id))
        .map(|(_, action)| action)
        .chain(overrides.values().flatten())
        .filter(|action| action.is_visible_as_last_message())
        .max_by(|a, b| (&a.created, a.sequence).cmp(&(&b.created, b.sequence)))
}

pub fn last_visible_message(
    actions: &BTreeMap<String, ReportAction>,
    overrides: &BTreeMap<String, Option<ReportAction>>,
) -> String {
    last_visible_action(actions, overrides)
        .map(|action| action.text().to_owned())
        .unwrap_or_default()
}

impl MemoryStore {
    fn entity<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value.clone()) {
            Ok(entity) => Some(entity),
            Err(e) => {
                warn!("unreadable {}: {}", key, e);
                None
            }
        }
    }

    fn entities<T: DeserializeOwned>(&self, collection: Collection) -> Vec<T> {
        self.collection(collection.prefix())
            .into_iter()
            .filter_map(|(key, value)| match serde_json::from_value(value) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    warn!("unreadable {}: {}", key, e);
                    None
                }
            })
            .collect()
    }
}

impl Ledger for MemoryStore {
    fn report(&self, report_id: &str) -> Option<Report> {
        self.entity(&keys::report(report_id))
    }

    fn reports(&self) -> Vec<Report> {
        self.entities(Collection::Report)
    }

    fn report_actions(&self, report_id: &str) -> BTreeMap<String, ReportAction> {
        self.entity(&keys::report_actions(report_id))
            .unwrap_or_default()
    }

    fn transaction(&self, transaction_id: &str) -> Option<Transaction> {
        self.entity(&keys::transaction(transaction_id))
    }

    fn transactions(&self) -> Vec<Transaction> {
        self.entities(Collection::Transaction)
    }

    fn transaction_draft(&self, transaction_id: &str) -> Option<Transaction> {
        self.entity(&keys::transaction_draft(transaction_id))
    }

    fn split_transaction_draft(&self, transaction_id: &str) -> Option<Transaction> {
        self.entity(&keys::split_transaction_draft(transaction_id))
    }

    fn transaction_violations(&self, transaction_id: &str) -> Option<Value> {
        self.stored(&keys::transaction_violations(transaction_id))
    }

    fn stored(&self, key: &str) -> Option<Value> {
        self.get(key).cloned()
    }

    fn personal_details(&self) -> BTreeMap<AccountId, PersonalDetails> {
        self.entity::<BTreeMap<String, PersonalDetails>>(keys::PERSONAL_DETAILS_LIST)
            .unwrap_or_default()
            .into_values()
            .map(|p| (p.account_id, p))
            .collect()
    }

    fn policy(&self, policy_id: &str) -> Option<Policy> {
        self.entity(&keys::policy(policy_id))
    }

    fn recently_used_categories(&self, policy_id: &str) -> Vec<String> {
        self.entity(&keys::recently_used_categories(policy_id))
            .unwrap_or_default()
    }

    fn recently_used_tags(&self, policy_id: &str) -> BTreeMap<String, Vec<String>> {
        self.entity(&keys::recently_used_tags(policy_id))
            .unwrap_or_default()
    }

    fn next_step(&self, report_id: &str) -> Option<Value> {
        self.get(&keys::next_step(report_id)).cloned()
    }

    fn last_payment_methods(&self) -> BTreeMap<String, PaymentType> {
        self.entity(keys::LAST_PAYMENT_METHOD).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;

    fn action(id: &str, name: ActionName, created: &str, text: &str) -> ReportAction {
        ReportAction {
            report_action_id: id.into(),
            action_name: name,
            created: created.into(),
            message: vec![Message::comment(text)],
            ..Default::default()
        }
    }

    #[test]
    fn test_chat_by_participants_ignores_order() -> Result<()> {
        let mut store = MemoryStore::new();
        store.set(
            "report_5",
            json!({"reportID": "5", "type": "chat", "participantAccountIDs": [2, 1]}),
        );
        store.set(
            "report_6",
            json!({"reportID": "6", "type": "chat", "participantAccountIDs": [1, 2, 3]}),
        );

        let chat = store.chat_by_participants(&[1, 2]);
        assert_eq!(chat.map(|c| c.report_id), Some("5".to_owned()));
        assert!(store.chat_by_participants(&[1, 4]).is_none());

        Ok(())
    }

    #[test]
    fn test_last_visible_skips_created_and_deleted() {
        let actions: BTreeMap<String, ReportAction> = [
            action("1", ActionName::Created, "2024-01-01 00:00:00.000", "created"),
            action("2", ActionName::Iou, "2024-01-01 00:00:01.000", "requested $15.00"),
            action("3", ActionName::Iou, "2024-01-01 00:00:02.000", ""),
        ]
        .into_iter()
        .map(|a| (a.report_action_id.clone(), a))
        .collect();

        assert_eq!(
            last_visible_message(&actions, &BTreeMap::new()),
            "requested $15.00"
        );

        let hidden = [("2".to_owned(), None)].into_iter().collect();
        assert_eq!(last_visible_message(&actions, &hidden), "");
    }

    #[test]
    fn test_personal_details_by_account() -> Result<()> {
        let mut store = MemoryStore::new();
        store.set(
            keys::PERSONAL_DETAILS_LIST,
            json!({"7": {"accountID": 7, "login": "seven@example.com", "displayName": "Seven"}}),
        );

        assert_eq!(store.person(7).map(|p| p.name().to_owned()), Some("Seven".to_owned()));
        assert!(store.person_by_login("seven@example.com").is_some());

        Ok(())
    }
}
