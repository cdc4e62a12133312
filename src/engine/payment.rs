use serde::Serialize;
use serde_json::json;
use tracing::*;

use super::Engine;
use crate::{
    builders::{IouActionParams, NewTransaction, PreviewParams},
    collaborators::{Command, Parameters},
    keys,
    model::*,
    money::check_currency,
    plan::Phase,
    recalc::owed,
    Error, MutationPlan, Result,
};

/// Who receives money sent outside of a request.
#[derive(Debug, Clone, Default)]
pub struct Recipient {
    pub account_id: AccountId,
    pub login: String,
    pub display_name: Option<String>,
}

/// Lets the authority create the report itself if ours never arrives.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewIouReportDetails<'d> {
    amount: i64,
    currency: &'d str,
    requestor_email: &'d str,
    #[serde(rename = "requestorAccountID")]
    requestor_account_id: AccountId,
    comment: &'d str,
    idempotency_key: String,
}

impl<'a> Engine<'a> {
    /// Sends `amount` to `recipient` through a settled IOU report in the
    /// chat between the two of us, which is created when missing.
    pub fn send_money(
        &self,
        report: Option<&Report>,
        amount: i64,
        currency: &str,
        comment: &str,
        payment_type: PaymentType,
        recipient: &Recipient,
    ) -> Result<()> {
        let _span = span!(Level::INFO, "send-money").entered();
        if amount <= 0 {
            return Err(Error::InvalidAmount(amount));
        }
        check_currency(currency)?;

        let ledger = self.ledger();
        let factory = self.factory();
        let me = self.session().account_id;
        let recipient_email = self.config().login_with_sms_domain(&recipient.login);

        let existing_chat = match report {
            Some(report) => Some(report.clone()),
            None => ledger.chat_by_participants(&[me, recipient.account_id]),
        };
        let is_new_chat = existing_chat.is_none();
        let chat = existing_chat
            .clone()
            .unwrap_or_else(|| factory.chat_report(&[me, recipient.account_id]));

        let mut iou_report = factory.iou_report(
            recipient.account_id,
            me,
            &self.session().email,
            amount,
            &chat.report_id,
            currency,
            true,
        )?;
        let transaction = factory.transaction(&NewTransaction {
            amount,
            currency: currency.to_owned(),
            report_id: iou_report.report_id.clone(),
            comment: comment.to_owned(),
            ..Default::default()
        })?;

        let participants = [Participant {
            display_name: recipient.display_name.clone(),
            ..Participant::account(recipient.account_id, &recipient_email)
        }];
        let pay_action = factory.iou_action(&IouActionParams {
            comment,
            participants: &participants,
            transaction_id: Some(&transaction.transaction_id),
            payment_type: Some(payment_type),
            is_send_money_flow: true,
            ..IouActionParams::new(IouActionType::Pay, amount, currency, &iou_report.report_id)
        })?;

        let preview_text = self.preview_text(&iou_report, &recipient_email, None)?;
        let preview = factory.report_preview(&PreviewParams {
            chat_report_id: &chat.report_id,
            iou_report: &iou_report,
            comment,
            transaction: None,
            text: &preview_text,
        });
        let created_action = if is_new_chat {
            Some(factory.created_action_before(&preview)?)
        } else {
            None
        };

        iou_report.last_message_text = Some(pay_action.text().to_owned());
        iou_report.last_message_html = Some(pay_action.html().to_owned());
        iou_report.parent_report_action_id = Some(preview.report_action_id.clone());

        let mut updated_chat = Report {
            last_read_time: Some(preview.created.clone()),
            last_visible_action_created: Some(preview.created.clone()),
            ..chat.clone()
        };
        if is_new_chat {
            updated_chat
                .pending_fields
                .insert("createChat".into(), PendingAction::Add);
        }

        let chat_key = keys::report(&chat.report_id);
        let chat_actions_key = keys::report_actions(&chat.report_id);
        let iou_actions_key = keys::report_actions(&iou_report.report_id);
        let transaction_key = keys::transaction(&transaction.transaction_id);
        let pay_id = pay_action.report_action_id.as_str();
        let preview_id = preview.report_action_id.as_str();

        let mut plan = MutationPlan::new();
        plan.write(&chat_key, existing_chat.as_ref(), &updated_chat)?;
        plan.set(Phase::Optimistic, keys::report(&iou_report.report_id), &iou_report)?;
        match &created_action {
            Some(created) => {
                let created_id = created.report_action_id.as_str();
                plan.set(
                    Phase::Optimistic,
                    &chat_actions_key,
                    &json!({ preview_id: &preview, created_id: created }),
                )?
            }
            None => plan.merge(Phase::Optimistic, &chat_actions_key, &json!({ preview_id: &preview }))?,
        };
        plan.set(Phase::Optimistic, &iou_actions_key, &json!({ pay_id: &pay_action }))?;
        plan.set(Phase::Optimistic, &transaction_key, &transaction)?;

        if is_new_chat && ledger.person(recipient.account_id).is_none() {
            let details = factory.personal_details(recipient.account_id, &participants[0], &recipient_email);
            let account_id = recipient.account_id.to_string();
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

        plan.merge(Phase::Success, &iou_actions_key, &json!({ pay_id: {"pendingAction": null} }))?;
        plan.merge(Phase::Success, &transaction_key, &json!({"pendingAction": null}))?;
        plan.merge(Phase::Success, &chat_actions_key, &json!({ preview_id: {"pendingAction": null} }))?;
        if is_new_chat {
            plan.merge(Phase::Success, &chat_key, &json!({"pendingFields": {"createChat": null}}))?;
        }

        let failure = factory.error("iou.error.other")?;
        plan.merge(Phase::Failure, &transaction_key, &json!({"errors": &failure}))?;
        if is_new_chat {
            plan.merge(
                Phase::Failure,
                &chat_key,
                &json!({
                    "pendingFields": {"createChat": null},
                    "errorFields": {"createChat": factory.error("report.genericCreateReportFailureMessage")?},
                }),
            )?;
            plan.merge(
                Phase::Failure,
                &iou_actions_key,
                &json!({ pay_id: {"errors": factory.error_map(None)} }),
            )?;
        } else {
            plan.merge(Phase::Failure, &iou_actions_key, &json!({ pay_id: {"errors": &failure} }))?;
        }

        let details = NewIouReportDetails {
            amount,
            currency,
            requestor_email: &recipient_email,
            requestor_account_id: recipient.account_id,
            comment,
            idempotency_key: self.context.ids.next_id(),
        };
        let mut parameters = Parameters::new()
            .with("iouReportID", &iou_report.report_id)
            .with("chatReportID", &chat.report_id)
            .with("reportActionID", pay_id)
            .with("paymentMethodType", payment_type.as_str())
            .with("transactionID", &transaction.transaction_id)
            .with_opt(
                "createdReportActionID",
                created_action.as_ref().map(|a| &a.report_action_id),
            )
            .with("reportPreviewReportActionID", preview_id);
        parameters.insert_json("newIOUReportDetails", &details)?;

        info!("sending {} {} to {}", amount, currency, recipient.account_id);
        let command = match payment_type {
            PaymentType::Expensify => Command::SendMoneyWithWallet,
            _ => Command::SendMoneyElsewhere,
        };
        self.dispatch(command, parameters, plan);

        self.collaborators
            .navigator
            .dismiss_modal(Some(&chat.report_id));
        self.collaborators
            .notifier
            .notify_new_action(&chat.report_id, self.session().account_id);
        Ok(())
    }

    pub fn send_money_elsewhere(
        &self,
        report: Option<&Report>,
        amount: i64,
        currency: &str,
        comment: &str,
        recipient: &Recipient,
    ) -> Result<()> {
        self.send_money(report, amount, currency, comment, PaymentType::Elsewhere, recipient)
    }

    pub fn send_money_with_wallet(
        &self,
        report: Option<&Report>,
        amount: i64,
        currency: &str,
        comment: &str,
        recipient: &Recipient,
    ) -> Result<()> {
        self.send_money(report, amount, currency, comment, PaymentType::Expensify, recipient)
    }

    /// Settles `iou_report` in full. Everything the payment touches is
    /// restored on failure and the error lands on the payment itself.
    pub fn pay_money_request(&self, payment_type: PaymentType, chat: &Report, iou_report: &Report) -> Result<()> {
        let _span = span!(Level::INFO, "pay").entered();
        if !iou_report.is_money_request_report() {
            return Err(Error::NotMoneyRequestReport(iou_report.report_id.clone()));
        }
        let ledger = self.ledger();
        let factory = self.factory();

        let payee = iou_report.owner_account_id.unwrap_or_default();
        let payee_login = ledger
            .person(payee)
            .and_then(|p| p.login)
            .unwrap_or_default();
        let participants = [Participant::account(payee, &payee_login)];
        let pay_action = factory.iou_action(&IouActionParams {
            participants: &participants,
            payment_type: Some(payment_type),
            is_settling_up: true,
            ..IouActionParams::new(
                IouActionType::Pay,
                owed(iou_report),
                iou_report.currency(),
                &iou_report.report_id,
            )
        })?;

        let updated_report = Report {
            last_message_text: Some(pay_action.text().to_owned()),
            last_message_html: Some(pay_action.html().to_owned()),
            has_outstanding_child_request: false,
            status_num: StatusNum::Reimbursed,
            ..iou_report.clone()
        };
        let updated_chat = Report {
            last_read_time: Some(pay_action.created.clone()),
            last_visible_action_created: Some(pay_action.created.clone()),
            has_outstanding_child_request: false,
            iou_report_id: None,
            last_message_text: Some(pay_action.text().to_owned()),
            last_message_html: Some(pay_action.html().to_owned()),
            ..chat.clone()
        };

        let iou_actions_key = keys::report_actions(&iou_report.report_id);
        let pay_id = pay_action.report_action_id.as_str();

        let mut plan = MutationPlan::new();
        plan.write(&keys::report(&chat.report_id), Some(chat), &updated_chat)?;
        self.write_state_change(&mut plan, iou_report, updated_report.clone())?;
        plan.merge(Phase::Optimistic, &iou_actions_key, &json!({ pay_id: &pay_action }))?;

        if let Some(preview) = ledger.report_preview_action(&chat.report_id, &iou_report.report_id) {
            let text = self.preview_text(&updated_report, "", None)?;
            let updated_preview = factory.updated_report_preview(
                &preview,
                &PreviewParams {
                    chat_report_id: &chat.report_id,
                    iou_report: &updated_report,
                    comment: "",
                    transaction: None,
                    text: &text,
                },
                true,
            );
            plan.write_member(
                &keys::report_actions(&chat.report_id),
                &preview.report_action_id,
                Some(&preview),
                Some(&updated_preview),
            )?;
        }

        if let Some(policy_id) = iou_report.policy_id.as_deref() {
            let previous = ledger.last_payment_methods().remove(policy_id);
            plan.merge(
                Phase::Optimistic,
                keys::LAST_PAYMENT_METHOD,
                &json!({ policy_id: payment_type }),
            )?;
            plan.merge(
                Phase::Failure,
                keys::LAST_PAYMENT_METHOD,
                &json!({ policy_id: previous }),
            )?;
        }
        self.clear_next_step(&mut plan, &iou_report.report_id)?;

        plan.merge(Phase::Success, &iou_actions_key, &json!({ pay_id: {"pendingAction": null} }))?;
        plan.merge(
            Phase::Failure,
            &iou_actions_key,
            &json!({ pay_id: {"errors": factory.error("iou.error.other")?} }),
        )?;

        let parameters = Parameters::new()
            .with("iouReportID", &iou_report.report_id)
            .with("chatReportID", &chat.report_id)
            .with("reportActionID", pay_id)
            .with("paymentMethodType", payment_type.as_str());
        info!("paying {} in {}", iou_report.report_id, chat.report_id);
        let command = match payment_type {
            PaymentType::Expensify => Command::PayMoneyRequestWithWallet,
            _ => Command::PayMoneyRequest,
        };
        self.dispatch(command, parameters, plan);

        self.collaborators
            .navigator
            .dismiss_modal(Some(&chat.report_id));
        Ok(())
    }
}
