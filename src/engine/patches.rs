//! The three-phase builder shared by every flow that lands a new request in
//! a chat: plain requests, distance requests and each leg of a split.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use crate::{
    builders::Factory,
    keys,
    model::*,
    plan::{diff, Phase},
    MutationPlan, Result,
};

/// An entity as a mutation leaves it, and as it was before. `before` is
/// `None` for entities the mutation fabricates.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub before: Option<T>,
    pub after: T,
}

impl<T> Resolved<T> {
    pub fn new(after: T) -> Self {
        Self {
            before: None,
            after,
        }
    }

    pub fn existing(before: T, after: T) -> Self {
        Self {
            before: Some(before),
            after,
        }
    }

    pub fn is_new(&self) -> bool {
        self.before.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct RequestEntities {
    pub chat: Resolved<Report>,
    pub iou_report: Resolved<Report>,
    pub transaction: Transaction,
    pub chat_created_action: Option<ReportAction>,
    pub iou_created_action: Option<ReportAction>,
    pub iou_action: ReportAction,
    pub preview: Resolved<ReportAction>,
    pub personal_details: Option<PersonalDetails>,
    pub is_scan_request: bool,
}

fn actions<'r>(actions: impl IntoIterator<Item = &'r ReportAction>) -> BTreeMap<&'r str, &'r ReportAction> {
    actions
        .into_iter()
        .map(|a| (a.report_action_id.as_str(), a))
        .collect()
}

pub fn money_request_plan(factory: &Factory, entities: &RequestEntities) -> Result<MutationPlan> {
    let RequestEntities {
        chat,
        iou_report,
        transaction,
        chat_created_action,
        iou_created_action,
        iou_action,
        preview,
        personal_details,
        is_scan_request,
    } = entities;

    let mut plan = MutationPlan::new();
    let chat_id = chat.after.report_id.as_str();
    let report_id = iou_report.after.report_id.as_str();
    let transaction_id = transaction.transaction_id.as_str();
    let receipt_error = || {
        factory.receipt_error(
            transaction.receipt.as_ref(),
            transaction.receipt_filename(),
            *is_scan_request,
        )
    };

    // Optimistic
    let mut chat_after = chat.after.clone();
    chat_after.last_read_time = Some(factory.now());
    chat_after.iou_report_id = Some(report_id.to_owned());
    if chat.is_new() {
        chat_after
            .pending_fields
            .insert("createChat".into(), PendingAction::Add);
    }
    plan.write(&keys::report(chat_id), chat.before.as_ref(), &chat_after)?;

    let report_field = if iou_report.is_new() { "createChat" } else { "preview" };
    let mut report_after = iou_report.after.clone();
    report_after.last_message_text = Some(iou_action.text().to_owned());
    report_after.last_message_html = Some(iou_action.html().to_owned());
    report_after.pending_fields.insert(
        report_field.into(),
        if iou_report.is_new() {
            PendingAction::Add
        } else {
            PendingAction::Update
        },
    );
    plan.write(&keys::report(report_id), iou_report.before.as_ref(), &report_after)?;

    plan.set(Phase::Optimistic, keys::transaction(transaction_id), transaction)?;

    let chat_actions = actions(chat_created_action.iter().chain([&preview.after]));
    if chat.is_new() {
        plan.set(Phase::Optimistic, keys::report_actions(chat_id), &chat_actions)?;
    } else {
        plan.merge(Phase::Optimistic, keys::report_actions(chat_id), &chat_actions)?;
    }

    let report_actions = actions(iou_created_action.iter().chain([iou_action]));
    if iou_report.is_new() {
        plan.set(Phase::Optimistic, keys::report_actions(report_id), &report_actions)?;
    } else {
        plan.merge(Phase::Optimistic, keys::report_actions(report_id), &report_actions)?;
    }

    for phase in [Phase::Optimistic, Phase::Success, Phase::Failure] {
        plan.remove(phase, keys::transaction_draft(keys::OPTIMISTIC_TRANSACTION_ID));
    }

    if let Some(details) = personal_details {
        let account_id = details.account_id.to_string();
        plan.merge(
            Phase::Optimistic,
            keys::PERSONAL_DETAILS_LIST,
            &json!({ account_id.as_str(): details }),
        )?;
        plan.merge(
            Phase::Failure,
            keys::PERSONAL_DETAILS_LIST,
            &json!({ account_id.as_str(): null }),
        )?;
    }

    // Success
    if chat.is_new() {
        plan.merge(
            Phase::Success,
            keys::report(chat_id),
            &json!({"pendingFields": {"createChat": null}, "errorFields": {"createChat": null}}),
        )?;
    }
    plan.merge(
        Phase::Success,
        keys::report(report_id),
        &json!({"pendingFields": { report_field: null }, "errorFields": { report_field: null }}),
    )?;
    plan.merge(
        Phase::Success,
        keys::transaction(transaction_id),
        &json!({"pendingAction": null, "pendingFields": null}),
    )?;

    let cleared = json!({"pendingAction": null, "errors": null});
    let mut chat_success = Map::new();
    if let Some(created) = chat_created_action {
        chat_success.insert(created.report_action_id.clone(), cleared.clone());
    }
    chat_success.insert(preview.after.report_action_id.clone(), cleared.clone());
    plan.merge(Phase::Success, keys::report_actions(chat_id), &chat_success)?;

    let mut report_success = Map::new();
    if let Some(created) = iou_created_action {
        report_success.insert(created.report_action_id.clone(), cleared.clone());
    }
    report_success.insert(iou_action.report_action_id.clone(), cleared);
    plan.merge(Phase::Success, keys::report_actions(report_id), &report_success)?;

    // Failure. Existing reports were restored by `write`; fabricated ones
    // stay behind to carry the error.
    if chat.is_new() {
        plan.merge(
            Phase::Failure,
            keys::report(chat_id),
            &json!({
                "pendingFields": {"createChat": null},
                "errorFields": {"createChat": factory.error("report.genericCreateReportFailureMessage")?},
            }),
        )?;
    }
    if iou_report.is_new() {
        plan.merge(
            Phase::Failure,
            keys::report(report_id),
            &json!({
                "pendingFields": {"createChat": null},
                "errorFields": {"createChat": factory.error("report.genericCreateReportFailureMessage")?},
            }),
        )?;
    }
    plan.merge(
        Phase::Failure,
        keys::transaction(transaction_id),
        &json!({"errors": receipt_error()?, "pendingAction": null, "pendingFields": null}),
    )?;

    let mut chat_failure = Map::new();
    if let Some(created) = chat_created_action {
        chat_failure.insert(
            created.report_action_id.clone(),
            json!({"errors": factory.error_map(None)}),
        );
    }
    match &preview.before {
        Some(before) => {
            let restore = diff(&serde_json::to_value(&preview.after)?, &serde_json::to_value(before)?);
            chat_failure.insert(preview.after.report_action_id.clone(), restore);
        }
        None => {
            chat_failure.insert(
                preview.after.report_action_id.clone(),
                json!({"errors": receipt_error()?}),
            );
        }
    }
    plan.merge(Phase::Failure, keys::report_actions(chat_id), &Value::Object(chat_failure))?;

    let mut report_failure = Map::new();
    if let Some(created) = iou_created_action {
        report_failure.insert(
            created.report_action_id.clone(),
            json!({"errors": factory.error_map(None)}),
        );
    }
    report_failure.insert(
        iou_action.report_action_id.clone(),
        json!({"errors": receipt_error()?}),
    );
    plan.merge(Phase::Failure, keys::report_actions(report_id), &Value::Object(report_failure))?;

    Ok(plan)
}
