use serde_json::{json, Map, Value};
use tracing::*;

use super::Engine;
use crate::{
    builders::IouActionParams,
    changes::{updated_transaction, Change, TransactionChanges},
    collaborators::{Command, Parameters},
    keys,
    model::*,
    money::check_currency,
    plan::Phase,
    recalc::{recompute, TotalDelta},
    Error, MutationPlan, Result,
};

/// The entities every edit starts from.
struct EditTarget {
    thread: Report,
    transaction: Transaction,
    iou_report: Report,
}

impl<'a> Engine<'a> {
    fn edit_target(&self, transaction_id: &str, thread_id: &str, changes: &TransactionChanges) -> Result<EditTarget> {
        if changes.is_empty() {
            return Err(Error::NoChanges);
        }
        if let Change::Set(amount) = changes.amount {
            if amount < 0 {
                return Err(Error::InvalidAmount(amount));
            }
        }
        if let Change::Set(currency) = &changes.currency {
            check_currency(currency)?;
        }

        let thread = self.report(thread_id)?;
        let transaction = self.transaction(transaction_id)?;
        let iou_report = self.report(thread.parent_report_id.as_deref().unwrap_or_default())?;
        Ok(EditTarget {
            thread,
            transaction,
            iou_report,
        })
    }

    /// The report after `old` became `updated`, or `None` when the report has
    /// to wait for the authority: other currencies are converted remotely.
    fn edited_report(&self, report: &Report, old: &Transaction, updated: &Transaction) -> Option<Report> {
        if updated.currency() != report.currency() || updated.modified_amount.is_none() {
            return None;
        }
        let delta = old.amount(true) - updated.amount(true);
        if delta == 0 {
            return None;
        }
        Some(recompute(
            report,
            &TotalDelta {
                actor_account_id: self.session().account_id,
                amount: delta,
                currency: updated.currency(),
            },
            report.is_expense_report(),
        ))
    }

    /// Builds the plan shared by the field-specific edit commands. Waypoint
    /// changes are priced remotely, so they skip the modified action and the
    /// total and leave the transaction loading.
    pub fn update_money_request_plan(
        &self,
        transaction_id: &str,
        thread_id: &str,
        changes: &TransactionChanges,
        only_changed_fields: bool,
    ) -> Result<(Parameters, MutationPlan)> {
        let EditTarget {
            thread,
            transaction,
            iou_report,
        } = self.edit_target(transaction_id, thread_id, changes)?;
        let factory = self.factory();
        let is_expense_report = iou_report.is_expense_report();
        let has_waypoints = changes.waypoints.is_present();

        let mut updated = updated_transaction(&transaction, changes, is_expense_report, true);
        updated.is_loading = has_waypoints;
        updated.error_fields.clear();

        let mut parameters = if only_changed_fields {
            let mut parameters = Parameters::new();
            changes.write_parameters(&mut parameters)?;
            parameters
        } else {
            transaction_details(&updated, is_expense_report)?
        };
        parameters.insert("reportID", iou_report.report_id.as_str());
        parameters.insert("transactionID", transaction_id);

        let mut plan = MutationPlan::new();
        if !has_waypoints {
            let action = factory.modified_expense_action(&thread.report_id, &transaction, changes, is_expense_report)?;
            let action_id = action.report_action_id.as_str();
            let key = keys::report_actions(&thread.report_id);
            plan.merge(Phase::Optimistic, &key, &json!({ action_id: &action }))?;
            plan.merge(Phase::Success, &key, &json!({ action_id: {"pendingAction": null} }))?;
            plan.merge(
                Phase::Failure,
                &key,
                &json!({ action_id: {"errors": factory.error("iou.error.genericEditFailureMessage")?} }),
            )?;
            parameters.insert("reportActionID", action_id);

            if let Some(report) = self.edited_report(&iou_report, &transaction, &updated) {
                plan.write(&keys::report(&iou_report.report_id), Some(&iou_report), &report)?;
            }
        }

        let transaction_key = keys::transaction(transaction_id);
        plan.write(&transaction_key, Some(&transaction), &updated)?;
        self.write_recently_used(
            &mut plan,
            iou_report.policy_id.as_deref(),
            changes.category.value().map(String::as_str),
            changes.tag.value().map(String::as_str),
        )?;

        let mut cleared = Map::new();
        let mut errors = Map::new();
        for field in changes.fields() {
            cleared.insert(field.to_owned(), Value::Null);
            errors.insert(
                field.to_owned(),
                serde_json::to_value(factory.error("iou.error.genericEditFailureMessage")?)?,
            );
        }
        plan.merge(
            Phase::Success,
            &transaction_key,
            &json!({"pendingFields": cleared, "isLoading": null, "errorFields": null}),
        )?;
        if has_waypoints {
            plan.remove(Phase::Success, keys::transaction_draft(transaction_id));
        }
        plan.merge(
            Phase::Failure,
            &transaction_key,
            &json!({"pendingFields": cleared, "isLoading": null, "errorFields": errors}),
        )?;

        Ok((parameters, plan))
    }

    pub fn update_money_request_date(&self, transaction_id: &str, thread_id: &str, created: &str) -> Result<()> {
        let _span = span!(Level::INFO, "update-date").entered();
        let changes = TransactionChanges {
            created: Change::Set(created.to_owned()),
            ..Default::default()
        };
        let (parameters, plan) = self.update_money_request_plan(transaction_id, thread_id, &changes, true)?;
        self.dispatch(Command::UpdateMoneyRequestDate, parameters, plan);
        Ok(())
    }

    pub fn update_money_request_amount_and_currency(
        &self,
        transaction_id: &str,
        thread_id: &str,
        amount: i64,
        currency: &str,
    ) -> Result<()> {
        let _span = span!(Level::INFO, "update-amount").entered();
        let changes = TransactionChanges {
            amount: Change::Set(amount),
            currency: Change::Set(currency.to_owned()),
            ..Default::default()
        };
        let (parameters, plan) = self.update_money_request_plan(transaction_id, thread_id, &changes, true)?;
        self.dispatch(Command::UpdateMoneyRequestAmountAndCurrency, parameters, plan);
        Ok(())
    }

    /// Distance edits send every detail of the transaction, not just the
    /// changed ones.
    pub fn update_distance_request(&self, transaction_id: &str, thread_id: &str, changes: &TransactionChanges) -> Result<()> {
        let _span = span!(Level::INFO, "update-distance").entered();
        let (parameters, plan) = self.update_money_request_plan(transaction_id, thread_id, changes, false)?;
        self.dispatch(Command::UpdateDistanceRequest, parameters, plan);
        Ok(())
    }

    /// Edits a manual or scanned request, recomputing totals and previews
    /// locally.
    pub fn edit_regular_money_request(
        &self,
        transaction_id: &str,
        thread_id: &str,
        changes: &TransactionChanges,
    ) -> Result<()> {
        let _span = span!(Level::INFO, "edit-request").entered();
        let EditTarget {
            thread,
            transaction,
            iou_report,
        } = self.edit_target(transaction_id, thread_id, changes)?;
        let chat = self.report(iou_report.chat_report_id.as_deref().unwrap_or_default())?;
        let factory = self.factory();
        let is_expense_report = iou_report.is_expense_report();

        let action = factory.modified_expense_action(&thread.report_id, &transaction, changes, is_expense_report)?;
        let updated = updated_transaction(&transaction, changes, is_expense_report, true);

        let mut updated_chat = chat.clone();
        let updated_report = match self.edited_report(&iou_report, &transaction, &updated) {
            Some(mut report) => {
                let text = factory.iou_action_text(&IouActionParams::new(
                    IouActionType::Create,
                    report.total.abs(),
                    updated.currency(),
                    &report.report_id,
                ))?;
                report.last_message_text = Some(text.clone());
                report.last_message_html = Some(text);

                let preview = self.preview_text(&report, "", None)?;
                updated_chat.last_message_text = Some(preview.clone());
                updated_chat.last_message_html = Some(preview);
                report
            }
            None => iou_report.clone(),
        };

        let now = factory.now();
        let updated_thread = Report {
            last_read_time: Some(now.clone()),
            last_visible_action_created: Some(now),
            ..thread.clone()
        };

        let mut plan = MutationPlan::new();
        let thread_actions = keys::report_actions(&thread.report_id);
        let action_id = action.report_action_id.as_str();
        plan.merge(Phase::Optimistic, &thread_actions, &json!({ action_id: &action }))?;
        plan.write(&keys::transaction(transaction_id), Some(&transaction), &updated)?;
        plan.write(&keys::report(&iou_report.report_id), Some(&iou_report), &updated_report)?;
        plan.write(&keys::report(&chat.report_id), Some(&chat), &updated_chat)?;
        plan.write(&keys::report(&thread.report_id), Some(&thread), &updated_thread)?;

        if !updated.is_receipt_being_scanned() {
            self.stop_whispering(&mut plan, &iou_report.report_id, thread.parent_report_action_id.as_deref())?;
            self.stop_whispering(&mut plan, &chat.report_id, iou_report.parent_report_action_id.as_deref())?;
        }
        self.write_recently_used(
            &mut plan,
            iou_report.policy_id.as_deref(),
            changes.category.value().map(String::as_str),
            changes.tag.value().map(String::as_str),
        )?;

        let cleared: Map<String, Value> = changes
            .fields()
            .into_iter()
            .map(|f| (f.to_owned(), Value::Null))
            .collect();
        plan.merge(Phase::Success, &thread_actions, &json!({ action_id: {"pendingAction": null} }))?;
        plan.merge(
            Phase::Success,
            keys::transaction(transaction_id),
            &json!({"pendingFields": cleared}),
        )?;
        plan.merge(
            Phase::Failure,
            &thread_actions,
            &json!({ action_id: {"errors": factory.error("iou.error.genericEditFailureMessage")?} }),
        )?;

        let mut parameters = transaction_details(&updated, is_expense_report)?;
        parameters.insert("transactionID", transaction_id);
        parameters.insert("reportActionID", action_id);
        self.dispatch(Command::EditMoneyRequest, parameters, plan);
        Ok(())
    }

    /// Distance requests go through the remote pricing path, everything else
    /// is edited in place.
    pub fn edit_money_request(&self, transaction: &Transaction, thread_id: &str, changes: &TransactionChanges) -> Result<()> {
        if transaction.is_distance_request() {
            self.update_distance_request(&transaction.transaction_id, thread_id, changes)
        } else {
            self.edit_regular_money_request(&transaction.transaction_id, thread_id, changes)
        }
    }

    /// Makes a whispered action visible to everyone, restoring the whisper
    /// on failure.
    fn stop_whispering(&self, plan: &mut MutationPlan, report_id: &str, action_id: Option<&str>) -> Result<()> {
        let Some(action) = action_id.and_then(|id| self.ledger().report_action(report_id, id)) else {
            return Ok(());
        };
        if action.whispered_to_account_ids.is_empty() {
            return Ok(());
        }
        let key = keys::report_actions(report_id);
        let action_id = action.report_action_id.as_str();
        plan.merge(
            Phase::Optimistic,
            &key,
            &json!({ action_id: {"whisperedToAccountIDs": []} }),
        )?;
        plan.merge(
            Phase::Failure,
            &key,
            &json!({ action_id: {"whisperedToAccountIDs": &action.whispered_to_account_ids} }),
        )?;
        Ok(())
    }
}

/// Every user-visible detail of `transaction`, as the edit commands send them.
fn transaction_details(transaction: &Transaction, is_from_expense_report: bool) -> Result<Parameters> {
    let mut parameters = Parameters::new()
        .with("created", transaction.created())
        .with("amount", transaction.amount(is_from_expense_report).abs())
        .with("currency", transaction.currency())
        .with("comment", transaction.description())
        .with("merchant", transaction.merchant())
        .with_opt("category", transaction.category.as_ref())
        .with_opt("tag", transaction.tag.as_ref())
        .with_opt("billable", transaction.billable);
    if let Some(waypoints) = transaction.waypoints() {
        parameters.insert_json("waypoints", waypoints)?;
    }
    Ok(parameters)
}
