use tracing::*;

use super::{money_request_plan, Engine, RequestEntities, Resolved};
use crate::{
    builders::{IouActionParams, NewTransaction, PreviewParams},
    collaborators::{Command, Parameters},
    keys,
    model::*,
    money::check_currency,
    recalc::{recompute, TotalDelta},
    Error, MutationPlan, Result,
};

/// What the user entered for one request. `amount` is positive, in the
/// currency's smallest unit; scans start out at zero.
#[derive(Debug, Clone, Default)]
pub struct MoneyRequest {
    pub amount: i64,
    pub currency: String,
    pub comment: String,
    pub created: String,
    pub merchant: String,
    pub receipt: Option<Receipt>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub billable: Option<bool>,
    pub tax_code: Option<String>,
    pub tax_amount: Option<i64>,
    pub waypoints: Option<Waypoints>,
    /// Set for the per-person legs of a split.
    pub split_from: Option<String>,
}

impl MoneyRequest {
    pub fn validate(&self) -> Result<()> {
        if self.amount < 0 {
            return Err(Error::InvalidAmount(self.amount));
        }
        check_currency(&self.currency)
    }
}

/// The resolved entities of one request and the plan that lands them.
#[derive(Debug, Clone)]
pub struct MoneyRequestInformation {
    pub payer_account_id: AccountId,
    pub payer_email: String,
    pub chat_report: Report,
    pub iou_report: Report,
    pub transaction: Transaction,
    pub iou_action: ReportAction,
    pub created_chat_report_action_id: Option<String>,
    pub created_iou_report_action_id: Option<String>,
    pub report_preview_action: ReportAction,
    pub is_new_chat_report: bool,
    pub is_new_iou_report: bool,
    pub plan: MutationPlan,
}

impl<'a> Engine<'a> {
    /// Finds or fabricates the chat and report a request from the current
    /// user to `participant` belongs in, and builds its plan.
    pub fn money_request_information(
        &self,
        report: Option<&Report>,
        participant: &Participant,
        request: &MoneyRequest,
    ) -> Result<MoneyRequestInformation> {
        request.validate()?;

        let factory = self.factory();
        let ledger = self.ledger();
        let me = self.session().account_id;
        let payer_email = self
            .config()
            .login_with_sms_domain(participant.login.as_deref().unwrap_or_default());
        let is_policy_expense_chat = participant.is_policy_expense_chat
            || report.map_or(false, |r| r.is_policy_expense_chat());
        let payer_account_id = if is_policy_expense_chat {
            participant.account_id.unwrap_or_default()
        } else {
            self.resolve_account_id(participant, &payer_email)?
        };

        let mut existing_chat = match report {
            Some(report) if report.is_money_request_report() => report
                .chat_report_id
                .as_deref()
                .and_then(|id| ledger.report(id)),
            Some(report) => Some(report.clone()),
            None => None,
        };
        if existing_chat.is_none() && is_policy_expense_chat {
            let report_id = participant.report_id.as_deref().unwrap_or_default();
            existing_chat = Some(self.report(report_id)?);
        }
        if existing_chat.is_none() {
            existing_chat = ledger.chat_by_participants(&[me, payer_account_id]);
        }
        let is_new_chat_report = existing_chat.is_none();
        let mut chat = existing_chat
            .clone()
            .unwrap_or_else(|| factory.chat_report(&[me, payer_account_id]));
        debug!(chat = %chat.report_id, new = is_new_chat_report, "chat");

        let policy = match chat.policy_id.as_deref() {
            Some(policy_id) if is_policy_expense_chat => Some(self.policy(policy_id)?),
            _ => None,
        };

        let mut existing_report = chat
            .iou_report_id
            .as_deref()
            .filter(|_| !chat.is_waiting_on_bank_account)
            .and_then(|id| ledger.report(id));
        if let (Some(existing), Some(policy)) = (&existing_report, &policy) {
            // a paid workspace only takes new requests on its draft report
            if policy.is_paid_group_policy() && !existing.is_draft() {
                info!("forking a new draft from {}", existing.report_id);
                existing_report = None;
            }
        }
        let is_new_iou_report = existing_report.is_none();

        let mut iou_report = match (&existing_report, &policy) {
            (Some(existing), _) if existing.is_expense_report() => recompute(
                existing,
                &TotalDelta {
                    actor_account_id: me,
                    amount: -request.amount,
                    currency: &request.currency,
                },
                true,
            ),
            (Some(existing), _) => recompute(
                existing,
                &TotalDelta {
                    actor_account_id: me,
                    amount: request.amount,
                    currency: &request.currency,
                },
                false,
            ),
            (None, Some(policy)) => factory.expense_report(
                &chat.report_id,
                policy,
                me,
                request.amount,
                &request.currency,
            )?,
            (None, None) => factory.iou_report(
                me,
                payer_account_id,
                &payer_email,
                request.amount,
                &chat.report_id,
                &request.currency,
                false,
            )?,
        };
        let is_expense_report = iou_report.is_expense_report();

        let receipt = request.receipt.clone().filter(|r| r.source.is_some());
        let mut transaction = factory.transaction(&NewTransaction {
            amount: if is_expense_report {
                -request.amount
            } else {
                request.amount
            },
            currency: request.currency.clone(),
            report_id: iou_report.report_id.clone(),
            comment: request.comment.clone(),
            created: request.created.clone(),
            merchant: request.merchant.clone(),
            filename: receipt.as_ref().and_then(|r| r.filename.clone()),
            receipt,
            category: request.category.clone(),
            tag: request.tag.clone(),
            billable: request.billable,
            tax_code: request.tax_code.clone(),
            tax_amount: request.tax_amount,
            waypoints: request.waypoints.clone(),
            source: request.split_from.as_ref().map(|_| "split".to_owned()),
            original_transaction_id: request.split_from.clone(),
            ..Default::default()
        })?;

        // distance drafts carry the route the request was priced from
        if let Some(draft) = ledger
            .transaction_draft(keys::OPTIMISTIC_TRANSACTION_ID)
            .filter(|d| d.iou_request_type == Some(RequestType::Distance))
        {
            transaction.iou_request_type = Some(RequestType::Distance);
            if transaction.comment.waypoints.is_none() {
                transaction.comment.waypoints = draft.comment.waypoints;
            }
        }
        if request.waypoints.is_some() {
            transaction.iou_request_type = Some(RequestType::Distance);
        }

        let iou_action = factory.iou_action(&IouActionParams {
            comment: &request.comment,
            participants: std::slice::from_ref(participant),
            transaction_id: Some(&transaction.transaction_id),
            receipt: transaction.receipt.as_ref(),
            ..IouActionParams::new(
                IouActionType::Create,
                request.amount,
                &request.currency,
                &iou_report.report_id,
            )
        })?;
        let iou_created_action = if is_new_iou_report {
            Some(factory.created_action_before(&iou_action)?)
        } else {
            None
        };

        let text = self.preview_text(&iou_report, &payer_email, Some(&transaction))?;
        let preview_params = PreviewParams {
            chat_report_id: &chat.report_id,
            iou_report: &iou_report,
            comment: &request.comment,
            transaction: Some(&transaction),
            text: &text,
        };
        let existing_preview = if is_new_iou_report {
            None
        } else {
            ledger.report_preview_action(&chat.report_id, &iou_report.report_id)
        };
        let preview = match existing_preview {
            Some(existing) => {
                let updated = factory.updated_report_preview(&existing, &preview_params, false);
                Resolved::existing(existing, updated)
            }
            None => Resolved::new(factory.report_preview(&preview_params)),
        };
        if preview.is_new() {
            iou_report.parent_report_action_id = Some(preview.after.report_action_id.clone());
        }
        let chat_created_action = if is_new_chat_report {
            Some(factory.created_action_before(&preview.after)?)
        } else {
            None
        };

        chat.has_outstanding_child_request =
            is_policy_expense_chat && policy.as_ref().map_or(false, |p| p.needs_manual_submit());

        let personal_details = if is_new_chat_report && ledger.person(payer_account_id).is_none() {
            Some(factory.personal_details(payer_account_id, participant, &payer_email))
        } else {
            None
        };

        let is_scan_request = transaction.has_receipt()
            && transaction.iou_request_type != Some(RequestType::Distance)
            && transaction
                .receipt_filename()
                .map_or(true, |filename| self.config().is_scannable(filename));

        let entities = RequestEntities {
            chat: Resolved {
                before: existing_chat,
                after: chat,
            },
            iou_report: Resolved {
                before: existing_report,
                after: iou_report,
            },
            transaction,
            chat_created_action,
            iou_created_action,
            iou_action,
            preview,
            personal_details,
            is_scan_request,
        };
        let mut plan = money_request_plan(&factory, &entities)?;
        self.write_recently_used(
            &mut plan,
            entities.iou_report.after.policy_id.as_deref(),
            request.category.as_deref(),
            request.tag.as_deref(),
        )?;

        let RequestEntities {
            chat,
            iou_report,
            transaction,
            chat_created_action,
            iou_created_action,
            iou_action,
            preview,
            ..
        } = entities;

        Ok(MoneyRequestInformation {
            payer_account_id,
            payer_email,
            chat_report: chat.after,
            iou_report: iou_report.after,
            transaction,
            iou_action,
            created_chat_report_action_id: chat_created_action.map(|a| a.report_action_id),
            created_iou_report_action_id: iou_created_action.map(|a| a.report_action_id),
            report_preview_action: preview.after,
            is_new_chat_report,
            is_new_iou_report,
            plan,
        })
    }

    /// Requests `request.amount` from `participant`, starting from `report`
    /// when the user is already looking at one.
    pub fn request_money(
        &self,
        report: Option<&Report>,
        participant: &Participant,
        request: &MoneyRequest,
    ) -> Result<MoneyRequestInformation> {
        let _span = span!(Level::INFO, "request-money").entered();

        let info = self.money_request_information(report, participant, request)?;
        let parameters = Parameters::new()
            .with("debtorEmail", &info.payer_email)
            .with("debtorAccountID", info.payer_account_id)
            .with("amount", request.amount)
            .with("currency", &request.currency)
            .with("comment", &request.comment)
            .with("created", &info.transaction.created)
            .with("merchant", info.transaction.merchant())
            .with_opt("receiptState", info.transaction.receipt.as_ref().and_then(|r| r.state).map(|s| s.as_str()))
            .with_opt("category", request.category.as_ref())
            .with_opt("tag", request.tag.as_ref())
            .with_opt("taxCode", request.tax_code.as_ref())
            .with_opt("taxAmount", request.tax_amount)
            .with_opt("billable", request.billable);
        let parameters = with_request_ids(parameters, &info);

        self.dispatch(Command::RequestMoney, parameters, info.plan.clone());
        self.after_request(report, &info);
        Ok(info)
    }

    /// A request priced from a route. The receipt is a generated map that
    /// never needs scanning.
    pub fn create_distance_request(
        &self,
        report: Option<&Report>,
        participant: &Participant,
        request: &MoneyRequest,
    ) -> Result<MoneyRequestInformation> {
        let _span = span!(Level::INFO, "distance-request").entered();

        let merchant = if request.merchant.is_empty() {
            self.context.messages.text("iou.pendingMerchant")?
        } else {
            request.merchant.clone()
        };
        let waypoints = request.waypoints.clone().unwrap_or_else(empty_waypoints);
        let request = MoneyRequest {
            merchant,
            receipt: Some(Receipt {
                source: Some(DISTANCE_RECEIPT_SOURCE.to_owned()),
                filename: None,
                state: Some(ReceiptState::Open),
            }),
            waypoints: Some(waypoints.clone()),
            ..request.clone()
        };

        let info = self.money_request_information(report, participant, &request)?;
        let mut parameters = Parameters::new()
            .with("comment", &request.comment)
            .with("created", &info.transaction.created)
            .with_opt("category", request.category.as_ref())
            .with_opt("tag", request.tag.as_ref())
            .with_opt("billable", request.billable);
        parameters.insert_json("waypoints", &waypoints)?;
        let parameters = with_request_ids(parameters, &info);

        self.dispatch(Command::CreateDistanceRequest, parameters, info.plan.clone());
        self.after_request(report, &info);
        Ok(info)
    }

    fn after_request(&self, report: Option<&Report>, info: &MoneyRequestInformation) {
        let active_report_id = match report {
            Some(report) if report.is_money_request_report() => report.report_id.as_str(),
            _ => info.chat_report.report_id.as_str(),
        };
        self.collaborators
            .navigator
            .dismiss_modal(Some(active_report_id));
        self.collaborators
            .notifier
            .notify_new_action(active_report_id, self.session().account_id);
    }
}

/// Placeholder source for the map image attached to distance requests.
pub const DISTANCE_RECEIPT_SOURCE: &str = "receipt-generic.png";

fn with_request_ids(parameters: Parameters, info: &MoneyRequestInformation) -> Parameters {
    parameters
        .with("iouReportID", &info.iou_report.report_id)
        .with("chatReportID", &info.chat_report.report_id)
        .with("transactionID", &info.transaction.transaction_id)
        .with("reportActionID", &info.iou_action.report_action_id)
        .with_opt("createdChatReportActionID", info.created_chat_report_action_id.as_ref())
        .with_opt("createdIOUReportActionID", info.created_iou_report_action_id.as_ref())
        .with("reportPreviewReportActionID", &info.report_preview_action.report_action_id)
}
