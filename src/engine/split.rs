//! Splits fan one amount out into a summary in the shared chat and one
//! ordinary request per person.

use std::collections::BTreeMap;

use serde_json::json;
use tracing::*;

use super::{Engine, MoneyRequest, MoneyRequestInformation};
use crate::{
    builders::{IouActionParams, NewTransaction},
    collaborators::{Command, Parameters},
    keys,
    model::*,
    money::calculate_amount,
    plan::Phase,
    Error, MutationPlan, Result,
};

/// Everything a split produced.
#[derive(Debug, Clone)]
pub struct SplitInformation {
    pub chat_report: Report,
    pub is_new_chat_report: bool,
    pub transaction: Transaction,
    pub split_action: ReportAction,
    pub created_report_action_id: Option<String>,
    pub splits: Vec<SplitShare>,
    pub plan: MutationPlan,
}

impl SplitInformation {
    fn parameters(&self) -> Result<Parameters> {
        let mut parameters = Parameters::new()
            .with("transactionID", &self.transaction.transaction_id)
            .with("reportActionID", &self.split_action.report_action_id)
            .with_opt("createdReportActionID", self.created_report_action_id.as_ref());
        parameters.insert_json("splits", &self.splits)?;
        Ok(parameters)
    }
}

/// The summary half of a split: the shared chat and the group transaction.
struct SplitGroup {
    chat: Report,
    is_new_chat: bool,
    transaction: Transaction,
    created_action: Option<ReportAction>,
    action: ReportAction,
    plan: MutationPlan,
}

impl<'a> Engine<'a> {
    fn split_chat(&self, participants: &[Participant], existing_chat_id: Option<&str>) -> Result<(Option<Report>, Report)> {
        let ledger = self.ledger();
        let me = self.session().account_id;
        let account_ids: Vec<AccountId> = std::iter::once(me)
            .chain(participants.iter().filter_map(|p| p.account_id))
            .collect();

        let existing = match existing_chat_id.or(participants.first().and_then(|p| p.report_id.as_deref())) {
            Some(report_id) => Some(self.report(report_id)?),
            None => ledger.chat_by_participants(&account_ids),
        };
        let chat = match &existing {
            Some(chat) => chat.clone(),
            None if participants.len() > 1 => self.factory().group_chat_report(&account_ids),
            None => self.factory().chat_report(&account_ids),
        };
        Ok((existing, chat))
    }

    /// Builds the group transaction and its split action. `action_error` is
    /// what the split action shows if the authority rejects the split.
    fn split_group(
        &self,
        participants: &[Participant],
        existing_chat_id: Option<&str>,
        transaction: &NewTransaction,
        action_error: Option<ErrorMap>,
    ) -> Result<SplitGroup> {
        let factory = self.factory();
        let (existing_chat, mut chat) = self.split_chat(participants, existing_chat_id)?;
        let is_new_chat = existing_chat.is_none();

        let transaction = factory.transaction(&NewTransaction {
            report_id: keys::SPLIT_REPORT_ID.to_owned(),
            ..transaction.clone()
        })?;
        let action = factory.iou_action(&IouActionParams {
            comment: transaction.description(),
            participants,
            transaction_id: Some(&transaction.transaction_id),
            receipt: transaction.receipt.as_ref(),
            is_own_policy_expense_chat: chat.is_own_policy_expense_chat,
            ..IouActionParams::new(IouActionType::Split, transaction.amount, &transaction.currency, "")
        })?;
        let created_action = if is_new_chat {
            Some(factory.created_action_before(&action)?)
        } else {
            None
        };

        chat.last_read_time = Some(factory.now());
        chat.last_message_text = Some(action.text().to_owned());
        chat.last_message_html = Some(action.html().to_owned());
        if is_new_chat {
            chat.pending_fields.insert("createChat".into(), PendingAction::Add);
        }

        let mut plan = MutationPlan::new();
        let chat_key = keys::report(&chat.report_id);
        let actions_key = keys::report_actions(&chat.report_id);
        let transaction_key = keys::transaction(&transaction.transaction_id);
        let action_id = action.report_action_id.as_str();

        plan.write(&chat_key, existing_chat.as_ref(), &chat)?;
        let actions: BTreeMap<&str, &ReportAction> = created_action
            .iter()
            .chain([&action])
            .map(|a| (a.report_action_id.as_str(), a))
            .collect();
        if is_new_chat {
            plan.set(Phase::Optimistic, &actions_key, &actions)?;
        } else {
            plan.merge(Phase::Optimistic, &actions_key, &actions)?;
        }
        plan.set(Phase::Optimistic, &transaction_key, &transaction)?;
        plan.remove(Phase::Optimistic, keys::transaction_draft(keys::OPTIMISTIC_TRANSACTION_ID));

        let cleared: BTreeMap<&str, serde_json::Value> = actions
            .keys()
            .map(|id| (*id, json!({"pendingAction": null})))
            .collect();
        plan.merge(Phase::Success, &actions_key, &cleared)?;
        plan.merge(Phase::Success, &transaction_key, &json!({"pendingAction": null}))?;
        if is_new_chat {
            plan.merge(Phase::Success, &chat_key, &json!({"pendingFields": {"createChat": null}}))?;
        }

        plan.merge(
            Phase::Failure,
            &transaction_key,
            &json!({"errors": factory.error("iou.error.genericCreateFailureMessage")?}),
        )?;
        match (is_new_chat, &created_action) {
            (true, Some(created)) => {
                let created_id = created.report_action_id.as_str();
                plan.merge(
                    Phase::Failure,
                    &chat_key,
                    &json!({"errorFields": {"createChat": factory.error("report.genericCreateReportFailureMessage")?}}),
                )?;
                let action_error = match action_error {
                    Some(errors) => errors,
                    None => factory.error_map(None),
                };
                plan.merge(
                    Phase::Failure,
                    &actions_key,
                    &json!({
                        created_id: {"errors": factory.error("report.genericCreateReportFailureMessage")?},
                        action_id: {"errors": action_error},
                    }),
                )?;
            }
            _ => {
                let action_error = match action_error {
                    Some(errors) => errors,
                    None => factory.error("iou.error.genericCreateFailureMessage")?,
                };
                plan.merge(Phase::Failure, &actions_key, &json!({ action_id: {"errors": action_error} }))?;
            }
        }

        Ok(SplitGroup {
            chat,
            is_new_chat,
            transaction,
            created_action,
            action,
            plan,
        })
    }

    fn current_user_split_email(&self) -> String {
        self.config()
            .login_with_sms_domain(&self.session().email)
            .to_lowercase()
    }

    /// Builds the summary and every per-person request of a split with
    /// known amounts.
    pub fn create_splits_and_plan(
        &self,
        participants: &[Participant],
        request: &MoneyRequest,
        existing_chat_id: Option<&str>,
    ) -> Result<SplitInformation> {
        request.validate()?;
        if participants.is_empty() {
            return Err(Error::NoSplitParticipants);
        }

        let me = self.session().account_id;
        let my_email = self.current_user_split_email();
        let merchant = if request.merchant.is_empty() {
            self.context.messages.text("iou.defaultMerchant")?
        } else {
            request.merchant.clone()
        };
        let group = self.split_group(
            participants,
            existing_chat_id,
            &NewTransaction {
                amount: request.amount,
                currency: request.currency.clone(),
                comment: request.comment.clone(),
                created: request.created.clone(),
                merchant: merchant.clone(),
                category: request.category.clone(),
                tag: request.tag.clone(),
                ..Default::default()
            },
            None,
        )?;
        let SplitGroup {
            chat,
            is_new_chat,
            transaction,
            created_action,
            action,
            mut plan,
        } = group;

        let mut splits = vec![SplitShare {
            email: Some(my_email.clone()),
            account_id: Some(me),
            amount: Some(calculate_amount(participants.len(), request.amount, &request.currency, true)),
            ..Default::default()
        }];
        let share = calculate_amount(participants.len(), request.amount, &request.currency, false);

        // with one person from global create, or in our own workspace chat,
        // the shared chat is also the one-on-one chat
        let shares_chat = (participants.len() == 1 && existing_chat_id.is_none()) || chat.is_own_policy_expense_chat;

        for participant in participants {
            let is_workspace = chat.is_own_policy_expense_chat || participant.is_policy_expense_chat;
            let email = if is_workspace {
                String::new()
            } else {
                self.config()
                    .login_with_sms_domain(participant.login.as_deref().unwrap_or_default())
                    .to_lowercase()
            };
            if email == my_email || (!is_workspace && participant.account_id == Some(me)) {
                continue;
            }

            let leg = MoneyRequest {
                amount: share,
                merchant: merchant.clone(),
                receipt: None,
                waypoints: None,
                split_from: Some(transaction.transaction_id.clone()),
                ..request.clone()
            };
            let info = self.money_request_information(shares_chat.then_some(&chat), participant, &leg)?;
            debug!(chat = %info.chat_report.report_id, share, "split leg");

            if shares_chat && is_new_chat && !is_workspace && self.ledger().person(info.payer_account_id).is_none() {
                let details = self
                    .factory()
                    .personal_details(info.payer_account_id, participant, &email);
                let account_id = info.payer_account_id.to_string();
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

            splits.push(leg_share(&email, is_workspace.then_some(participant), share, &info));
            plan.extend(info.plan);
        }

        Ok(SplitInformation {
            chat_report: chat,
            is_new_chat_report: is_new_chat,
            transaction,
            created_report_action_id: created_action.map(|a| a.report_action_id),
            split_action: action,
            splits,
            plan,
        })
    }

    fn split_parameters(&self, info: &SplitInformation, request: &MoneyRequest) -> Result<Parameters> {
        Ok(info
            .parameters()?
            .with("reportID", &info.chat_report.report_id)
            .with("amount", request.amount)
            .with("currency", &request.currency)
            .with("comment", &request.comment)
            .with("merchant", info.transaction.merchant())
            .with_opt("category", request.category.as_ref())
            .with_opt("tag", request.tag.as_ref())
            .with_opt("policyID", info.chat_report.policy_id.as_ref()))
    }

    /// Splits `request.amount` evenly between the current user and
    /// `participants`, in an existing group or workspace chat when given.
    pub fn split_bill(
        &self,
        participants: &[Participant],
        request: &MoneyRequest,
        existing_chat_id: Option<&str>,
    ) -> Result<SplitInformation> {
        let _span = span!(Level::INFO, "split-bill").entered();
        let info = self.create_splits_and_plan(participants, request, existing_chat_id)?;
        let parameters = self.split_parameters(&info, request)?;
        self.dispatch(Command::SplitBill, parameters, info.plan.clone());

        self.collaborators.navigator.dismiss_modal(None);
        self.collaborators
            .notifier
            .notify_new_action(&info.chat_report.report_id, self.session().account_id);
        Ok(info)
    }

    /// A split started from global create, which opens the resulting chat.
    pub fn split_bill_and_open_report(&self, participants: &[Participant], request: &MoneyRequest) -> Result<SplitInformation> {
        let _span = span!(Level::INFO, "split-bill-and-open").entered();
        let info = self.create_splits_and_plan(participants, request, None)?;
        let parameters = self.split_parameters(&info, request)?;
        self.dispatch(Command::SplitBillAndOpenReport, parameters, info.plan.clone());

        self.collaborators
            .navigator
            .dismiss_modal(Some(&info.chat_report.report_id));
        self.collaborators
            .notifier
            .notify_new_action(&info.chat_report.report_id, self.session().account_id);
        Ok(info)
    }

    /// Starts a split whose amount is still on a receipt. Only the summary
    /// exists until `complete_split_bill`; the people are kept in the group
    /// transaction's comment so the split can be completed offline.
    pub fn start_split_bill(
        &self,
        participants: &[Participant],
        request: &MoneyRequest,
        existing_chat_id: Option<&str>,
    ) -> Result<SplitInformation> {
        let _span = span!(Level::INFO, "start-split-bill").entered();
        if participants.is_empty() {
            return Err(Error::NoSplitParticipants);
        }

        let factory = self.factory();
        let me = self.session().account_id;
        let my_email = self.current_user_split_email();
        let receipt = request.receipt.clone().unwrap_or_default();
        let filename = receipt.filename.clone();
        let receipt = Receipt {
            filename: None,
            state: receipt.state.or(Some(ReceiptState::ScanReady)),
            ..receipt
        };
        let is_scan_request = filename
            .as_deref()
            .map_or(true, |f| self.config().is_scannable(f));
        let receipt_error = factory.receipt_error(Some(&receipt), filename.as_deref(), is_scan_request)?;

        let group = self.split_group(
            participants,
            existing_chat_id,
            &NewTransaction {
                amount: 0,
                currency: self.config().default_currency.clone(),
                comment: request.comment.clone(),
                merchant: self.context.messages.text("iou.noMerchant")?,
                receipt: Some(receipt.clone()),
                filename: filename.clone(),
                category: request.category.clone(),
                tag: request.tag.clone(),
                ..Default::default()
            },
            Some(receipt_error),
        )?;
        let SplitGroup {
            chat,
            is_new_chat,
            mut transaction,
            created_action,
            action,
            mut plan,
        } = group;

        let mut splits = vec![SplitShare {
            email: Some(my_email.clone()),
            account_id: Some(me),
            ..Default::default()
        }];
        for participant in participants {
            if participant.is_own_policy_expense_chat {
                splits.push(SplitShare {
                    policy_id: participant.policy_id.clone(),
                    chat_report_id: Some(chat.report_id.clone()),
                    ..Default::default()
                });
                continue;
            }

            let login = participant
                .login
                .as_deref()
                .or(participant.display_name.as_deref())
                .unwrap_or_default();
            let email = self.config().login_with_sms_domain(login).to_lowercase();
            if email == my_email {
                continue;
            }
            let account_id = self.resolve_account_id(participant, &email)?;
            if self.ledger().person(account_id).is_none() {
                let details = factory.personal_details(account_id, participant, &email);
                let key = account_id.to_string();
                plan.merge(
                    Phase::Optimistic,
                    keys::PERSONAL_DETAILS_LIST,
                    &json!({ key.as_str(): details }),
                )?;
                plan.merge(Phase::Failure, keys::PERSONAL_DETAILS_LIST, &json!({ key.as_str(): null }))?;
            }
            splits.push(SplitShare {
                email: Some(email),
                account_id: Some(account_id),
                ..Default::default()
            });
        }

        transaction.comment.splits = splits.clone();
        plan.merge(
            Phase::Optimistic,
            keys::transaction(&transaction.transaction_id),
            &json!({"comment": {"splits": &splits}}),
        )?;

        let info = SplitInformation {
            chat_report: chat,
            is_new_chat_report: is_new_chat,
            transaction,
            split_action: action,
            created_report_action_id: created_action.map(|a| a.report_action_id),
            splits,
            plan,
        };
        let mut parameters = info
            .parameters()?
            .with("chatReportID", &info.chat_report.report_id)
            .with("comment", &request.comment)
            .with_opt("category", request.category.as_ref())
            .with_opt("tag", request.tag.as_ref())
            .with("isFromGroupDM", is_new_chat);
        parameters.insert_json("receipt", &request.receipt)?;
        self.dispatch(Command::StartSplitBill, parameters, info.plan.clone());

        self.collaborators
            .navigator
            .dismiss_modal(Some(&info.chat_report.report_id));
        self.collaborators
            .notifier
            .notify_new_action(&info.chat_report.report_id, me);
        Ok(info)
    }

    /// Completes a split started with a receipt, from the edited draft of
    /// its group transaction. People whose accounts only exist locally stay
    /// email-only; the authority creates their chats.
    pub fn complete_split_bill(
        &self,
        chat_report_id: &str,
        split_action: &ReportAction,
        updated: &Transaction,
    ) -> Result<SplitInformation> {
        let _span = span!(Level::INFO, "complete-split-bill").entered();
        let factory = self.factory();
        let ledger = self.ledger();
        let me = self.session().account_id;
        let my_email = self.current_user_split_email();
        let transaction_id = updated.transaction_id.as_str();
        let unmodified = self.transaction(transaction_id)?;

        let mut completed = updated.clone();
        completed.receipt = Some(Receipt {
            state: Some(ReceiptState::Open),
            ..updated.receipt.clone().unwrap_or_default()
        });
        let visible_action = ReportAction {
            whispered_to_account_ids: Vec::new(),
            ..split_action.clone()
        };

        let mut plan = MutationPlan::new();
        let transaction_key = keys::transaction(transaction_id);
        let actions_key = keys::report_actions(chat_report_id);
        let action_id = split_action.report_action_id.as_str();
        plan.write(&transaction_key, Some(&unmodified), &completed)?;
        plan.write_member(&actions_key, action_id, Some(split_action), Some(&visible_action))?;
        plan.merge(Phase::Success, &transaction_key, &json!({"pendingAction": null}))?;
        plan.remove(Phase::Success, keys::split_transaction_draft(transaction_id));
        plan.merge(
            Phase::Failure,
            &transaction_key,
            &json!({"errors": factory.error("iou.error.genericCreateFailureMessage")?}),
        )?;
        plan.merge(
            Phase::Failure,
            &actions_key,
            &json!({ action_id: {"errors": factory.error("iou.error.genericCreateFailureMessage")?} }),
        )?;

        let amount = updated.amount(false);
        let currency = updated.currency().to_owned();
        let people = &updated.comment.splits;
        let share = calculate_amount(people.len().saturating_sub(1), amount, &currency, false);

        let mut splits = vec![SplitShare {
            email: Some(my_email.clone()),
            ..Default::default()
        }];
        for person in people {
            let email = person.email.clone().unwrap_or_default();
            if email == my_email || (person.policy_id.is_none() && person.account_id == Some(me)) {
                continue;
            }

            let participant = match &person.policy_id {
                Some(policy_id) => {
                    Participant::policy_expense_chat(policy_id, person.chat_report_id.as_deref().unwrap_or_default(), true)
                }
                None => {
                    let known = person
                        .account_id
                        .and_then(|id| ledger.person(id))
                        .filter(|p| !p.is_optimistic_personal_detail);
                    let Some(known) = known else {
                        debug!("{} has no account yet", email);
                        splits.push(SplitShare {
                            email: Some(email),
                            ..Default::default()
                        });
                        continue;
                    };
                    Participant::account(known.account_id, &email)
                }
            };

            let leg = MoneyRequest {
                amount: share,
                currency: currency.clone(),
                comment: updated.description().to_owned(),
                created: updated.created().to_owned(),
                merchant: updated.merchant().to_owned(),
                receipt: completed.receipt.clone(),
                category: updated.category.clone(),
                tag: updated.tag.clone(),
                split_from: Some(transaction_id.to_owned()),
                ..Default::default()
            };
            let info = self.money_request_information(None, &participant, &leg)?;
            let mut entry = leg_share(&email, None, share, &info);
            entry.policy_id = person.policy_id.clone();
            splits.push(entry);
            plan.extend(info.plan);
        }

        let mut parameters = Parameters::new()
            .with("transactionID", transaction_id)
            .with("amount", amount)
            .with("currency", &currency)
            .with("created", updated.created())
            .with("merchant", updated.merchant())
            .with("comment", updated.description())
            .with_opt("category", updated.category.as_ref())
            .with_opt("tag", updated.tag.as_ref());
        parameters.insert_json("splits", &splits)?;

        let chat_report = self.report(chat_report_id)?;
        self.dispatch(Command::CompleteSplitBill, parameters, plan.clone());
        self.collaborators.navigator.dismiss_modal(Some(chat_report_id));
        self.collaborators.notifier.notify_new_action(chat_report_id, me);

        Ok(SplitInformation {
            chat_report,
            is_new_chat_report: false,
            transaction: completed,
            split_action: visible_action,
            created_report_action_id: None,
            splits,
            plan,
        })
    }
}

fn leg_share(email: &str, workspace: Option<&Participant>, share: i64, info: &MoneyRequestInformation) -> SplitShare {
    SplitShare {
        email: (!email.is_empty()).then(|| email.to_owned()),
        account_id: (workspace.is_none()).then_some(info.payer_account_id),
        amount: Some(share),
        policy_id: workspace.and_then(|p| p.policy_id.clone()),
        iou_report_id: Some(info.iou_report.report_id.clone()),
        chat_report_id: Some(info.chat_report.report_id.clone()),
        transaction_id: Some(info.transaction.transaction_id.clone()),
        report_action_id: Some(info.iou_action.report_action_id.clone()),
        created_chat_report_action_id: info.created_chat_report_action_id.clone(),
        created_iou_report_action_id: info.created_iou_report_action_id.clone(),
        report_preview_report_action_id: Some(info.report_preview_action.report_action_id.clone()),
        is_new_chat: info.is_new_chat_report,
        is_new_iou_report: info.is_new_iou_report,
    }
}
