use std::collections::BTreeMap;

use serde_json::json;
use tracing::*;

use super::Engine;
use crate::{
    collaborators::{Command, Parameters, Route},
    keys,
    ledger::{last_visible_action, last_visible_message},
    model::*,
    plan::Phase,
    recalc::{recompute, TotalDelta},
    Error, MutationPlan, Result,
};

/// What a deletion decided to remove along with the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deletion {
    pub thread_deleted: bool,
    pub report_deleted: bool,
}

impl<'a> Engine<'a> {
    /// Deletes the request behind `report_action`. The transaction's thread
    /// goes too unless someone commented in it; the report goes when nothing
    /// visible is left in it.
    pub fn delete_money_request(
        &self,
        transaction_id: &str,
        report_action: &ReportAction,
        is_single_transaction_view: bool,
    ) -> Result<Deletion> {
        let _span = span!(Level::INFO, "delete-request").entered();
        let ledger = self.ledger();
        let factory = self.factory();

        let iou_report_id = report_action
            .original_message
            .iou_report_id
            .as_deref()
            .ok_or_else(|| Error::ReportNotFound(String::new()))?;
        let iou_report = self.report(iou_report_id)?;
        let chat = self.report(iou_report.chat_report_id.as_deref().unwrap_or_default())?;
        let transaction = self.transaction(transaction_id)?;
        let preview = ledger.report_preview_action(&chat.report_id, &iou_report.report_id);
        let thread_id = report_action.child_report_id.as_deref();

        let no_overrides = BTreeMap::new();
        let thread_deleted = thread_id.map_or(false, |id| {
            last_visible_message(&ledger.report_actions(id), &no_overrides).is_empty()
        });
        let shows_deleted_message = thread_id.is_some() && !thread_deleted;

        let mut deleted_action = report_action.clone();
        deleted_action.pending_action = Some(if shows_deleted_message {
            PendingAction::Update
        } else {
            PendingAction::Delete
        });
        deleted_action.message = vec![Message {
            is_edited: true,
            is_deleted_parent_action: shows_deleted_message,
            ..Message::comment("")
        }];
        deleted_action.original_message.iou_transaction_id = None;
        deleted_action.errors.clear();

        let report_actions = ledger.report_actions(&iou_report.report_id);
        let overrides: BTreeMap<String, Option<ReportAction>> =
            [(deleted_action.report_action_id.clone(), Some(deleted_action.clone()))].into();
        let last_visible = last_visible_action(&report_actions, &overrides);
        let last_message = last_visible_message(&report_actions, &overrides);
        let report_deleted = last_message.is_empty()
            && !last_visible.map_or(false, |a| a.is_deleted_parent_action())
            && (thread_id.is_none() || thread_deleted);
        info!(thread_deleted, report_deleted, "deleting {}", transaction_id);

        let mut plan = MutationPlan::new();
        let transaction_key = keys::transaction(transaction_id);
        plan.remove(Phase::Optimistic, &transaction_key);
        plan.set(Phase::Failure, &transaction_key, &ledger.stored(&transaction_key))?;

        if self.config().violations_enabled {
            let key = keys::transaction_violations(transaction_id);
            plan.remove(Phase::Optimistic, &key);
            match ledger.transaction_violations(transaction_id) {
                Some(violations) => plan.set(Phase::Failure, &key, &violations)?,
                None => plan.remove(Phase::Failure, &key),
            };
        }

        if let (true, Some(thread_id)) = (thread_deleted, thread_id) {
            for key in [keys::report(thread_id), keys::report_actions(thread_id)] {
                plan.remove(Phase::Optimistic, key.as_str());
                if let Some(stored) = ledger.stored(&key) {
                    plan.set(Phase::Failure, &key, &stored)?;
                }
            }
        }

        let report_key = keys::report(&iou_report.report_id);
        let actions_key = keys::report_actions(&iou_report.report_id);
        let action_id = report_action.report_action_id.as_str();
        let delete_error = factory.error("iou.error.genericDeleteFailureMessage")?;

        if report_deleted {
            plan.remove(Phase::Optimistic, &actions_key);
            plan.remove(Phase::Optimistic, &report_key);
            // stored values, so markers the typed entities drop come back too
            plan.set(Phase::Failure, &actions_key, &ledger.stored(&actions_key))?;
            plan.set(Phase::Failure, &report_key, &ledger.stored(&report_key))?;
            plan.merge(Phase::Failure, &actions_key, &json!({ action_id: {"errors": delete_error} }))?;

            if let Some(preview) = &preview {
                plan.write_member(
                    &keys::report_actions(&chat.report_id),
                    &preview.report_action_id,
                    Some(preview),
                    None,
                )?;
            }

            let chat_actions = ledger.report_actions(&chat.report_id);
            let without_preview: BTreeMap<String, Option<ReportAction>> = preview
                .iter()
                .map(|p| (p.report_action_id.clone(), None))
                .collect();
            let updated_chat = Report {
                has_outstanding_child_request: false,
                iou_report_id: None,
                last_message_text: Some(last_visible_message(&chat_actions, &without_preview)),
                last_visible_action_created: last_visible_action(&chat_actions, &without_preview)
                    .map(|a| a.created.clone()),
                ..chat.clone()
            };
            plan.write(&keys::report(&chat.report_id), Some(&chat), &updated_chat)?;
        } else {
            plan.write_member(&actions_key, action_id, Some(report_action), Some(&deleted_action))?;
            plan.merge(Phase::Success, &actions_key, &json!({ action_id: {"pendingAction": null} }))?;
            plan.merge(Phase::Failure, &actions_key, &json!({ action_id: {"errors": delete_error} }))?;

            let mut updated_report = if iou_report.is_expense_report() {
                recompute(
                    &iou_report,
                    &TotalDelta {
                        actor_account_id: self.session().account_id,
                        amount: transaction.amount(true),
                        currency: transaction.currency(),
                    },
                    true,
                )
            } else {
                recompute(
                    &iou_report,
                    &TotalDelta {
                        actor_account_id: report_action
                            .actor_account_id
                            .unwrap_or(self.session().account_id),
                        amount: -transaction.amount(false),
                        currency: transaction.currency(),
                    },
                    false,
                )
            };
            updated_report.last_message_text = Some(last_message);
            updated_report.last_visible_action_created = last_visible.map(|a| a.created.clone());
            plan.write(&report_key, Some(&iou_report), &updated_report)?;

            if let Some(preview) = &preview {
                let text = self.preview_text(&updated_report, "", None)?;
                let mut updated_preview = preview.clone();
                updated_preview.message = vec![Message::comment(&text)];
                let remaining = preview.child_money_request_count.unwrap_or_default().saturating_sub(1);
                updated_preview.child_money_request_count = Some(remaining);
                plan.write_member(
                    &keys::report_actions(&chat.report_id),
                    &preview.report_action_id,
                    Some(preview),
                    Some(&updated_preview),
                )?;

                if remaining == 0 {
                    let updated_chat = Report {
                        has_outstanding_child_request: false,
                        ..chat.clone()
                    };
                    plan.write(&keys::report(&chat.report_id), Some(&chat), &updated_chat)?;
                }
            }
        }

        let parameters = Parameters::new()
            .with("transactionID", transaction_id)
            .with("reportActionID", action_id);
        self.dispatch(Command::DeleteMoneyRequest, parameters, plan);

        if is_single_transaction_view && thread_deleted && !report_deleted {
            self.collaborators.navigator.go_back(Route::Report {
                report_id: iou_report.report_id.clone(),
            });
        } else if report_deleted {
            self.collaborators.navigator.go_back(Route::Report {
                report_id: chat.report_id.clone(),
            });
        }

        Ok(Deletion {
            thread_deleted,
            report_deleted,
        })
    }
}
