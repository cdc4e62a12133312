//! The in-progress request the user is filling in, one screen at a time.
//! Drafts live under their own keys and are written directly: nothing here
//! goes to the authority, so nothing needs rolling back.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::*;

use crate::{
    changes::{updated_transaction, TransactionChanges},
    clock::Clock,
    collaborators::Route,
    config::Configuration,
    keys,
    ledger::Ledger,
    messages::Messages,
    model::*,
    store::Store,
    Result,
};

pub struct Drafts<'a, S: Store + Ledger> {
    store: &'a mut S,
    config: &'a Configuration,
    messages: &'a Messages,
    clock: &'a dyn Clock,
}

impl<'a, S: Store + Ledger> Drafts<'a, S> {
    pub fn new(store: &'a mut S, config: &'a Configuration, messages: &'a Messages, clock: &'a dyn Clock) -> Self {
        Self {
            store,
            config,
            messages,
            clock,
        }
    }

    fn today(&self) -> Result<String> {
        Ok(self
            .config
            .local_date(self.clock.now())?
            .format("%Y-%m-%d")
            .to_string())
    }

    fn merge_draft<T: Serialize>(&mut self, transaction_id: &str, partial: &T) -> Result<()> {
        let value = serde_json::to_value(partial)?;
        debug!("draft {} <- {}", transaction_id, value);
        self.store.merge(&keys::transaction_draft(transaction_id), value);
        Ok(())
    }

    /// Replaces any previous draft, so nothing leaks between requests.
    pub fn start_money_request(
        &mut self,
        report_id: &str,
        is_from_global_create: bool,
        request_type: RequestType,
    ) -> Result<Transaction> {
        let draft = Transaction {
            transaction_id: keys::OPTIMISTIC_TRANSACTION_ID.to_owned(),
            amount: 0,
            currency: self.config.default_currency.clone(),
            report_id: Some(report_id.to_owned()),
            comment: TransactionComment {
                waypoints: (request_type == RequestType::Distance).then(empty_waypoints),
                ..Default::default()
            },
            created: self.today()?,
            merchant: Some(self.messages.text("iou.noMerchant")?),
            iou_request_type: Some(request_type),
            is_from_global_create,
            ..Default::default()
        };
        info!("starting {:?} request in {:?}", request_type, report_id);
        self.store.set(
            &keys::transaction_draft(&draft.transaction_id),
            serde_json::to_value(&draft)?,
        );
        Ok(draft)
    }

    pub fn clear(&mut self, transaction_id: &str) {
        self.store
            .set(&keys::transaction_draft(transaction_id), Value::Null);
    }

    pub fn set_amount(&mut self, transaction_id: &str, amount: i64, currency: &str) -> Result<()> {
        self.merge_draft(transaction_id, &json!({"amount": amount, "currency": currency}))
    }

    pub fn set_currency(&mut self, transaction_id: &str, currency: &str) -> Result<()> {
        self.merge_draft(transaction_id, &json!({ "currency": currency }))
    }

    pub fn set_created(&mut self, transaction_id: &str, created: &str) -> Result<()> {
        self.merge_draft(transaction_id, &json!({ "created": created }))
    }

    pub fn set_description(&mut self, transaction_id: &str, comment: &str) -> Result<()> {
        self.merge_draft(transaction_id, &json!({"comment": {"comment": comment.trim()}}))
    }

    pub fn set_merchant(&mut self, transaction_id: &str, merchant: &str) -> Result<()> {
        self.merge_draft(transaction_id, &json!({"merchant": merchant.trim()}))
    }

    pub fn set_category(&mut self, transaction_id: &str, category: &str) -> Result<()> {
        self.merge_draft(transaction_id, &json!({ "category": category }))
    }

    pub fn reset_category(&mut self, transaction_id: &str) -> Result<()> {
        self.merge_draft(transaction_id, &json!({"category": null}))
    }

    pub fn set_tag(&mut self, transaction_id: &str, tag: &str) -> Result<()> {
        self.merge_draft(transaction_id, &json!({ "tag": tag }))
    }

    pub fn reset_tag(&mut self, transaction_id: &str) -> Result<()> {
        self.merge_draft(transaction_id, &json!({"tag": null}))
    }

    pub fn set_billable(&mut self, transaction_id: &str, billable: bool) -> Result<()> {
        self.merge_draft(transaction_id, &json!({ "billable": billable }))
    }

    pub fn set_participants(&mut self, transaction_id: &str, participants: &[Participant]) -> Result<()> {
        self.merge_draft(transaction_id, &json!({ "participants": participants }))
    }

    pub fn set_receipt(&mut self, transaction_id: &str, source: &str, filename: &str) -> Result<()> {
        self.merge_draft(
            transaction_id,
            &json!({"receipt": {"source": source}, "filename": filename}),
        )
    }

    /// Who a request started from `report` is addressed to: the workspace
    /// for workspace chats, everyone else in the chat otherwise.
    pub fn participants_from_report(&self, report: &Report) -> Vec<Participant> {
        let chat = if report.is_money_request_report() {
            report
                .chat_report_id
                .as_deref()
                .and_then(|id| self.store.report(id))
        } else {
            Some(report.clone())
        };
        let Some(chat) = chat else {
            return Vec::new();
        };

        if chat.is_policy_expense_chat() {
            vec![Participant {
                report_id: Some(chat.report_id.clone()),
                is_policy_expense_chat: true,
                ..Default::default()
            }]
        } else {
            chat.others(self.config.session.account_id)
                .into_iter()
                .map(|account_id| Participant {
                    account_id: Some(account_id),
                    ..Default::default()
                })
                .collect()
        }
    }

    pub fn set_participants_from_report(&mut self, transaction_id: &str, report: &Report) -> Result<()> {
        let participants = self.participants_from_report(report);
        self.merge_draft(
            transaction_id,
            &json!({"participants": participants, "participantsAutoAssigned": true}),
        )
    }

    /// Resets the single-key request state older screens still read.
    pub fn reset_iou(&mut self, id: &str) -> Result<()> {
        let value = json!({
            "id": id,
            "amount": 0,
            "currency": &self.config.default_currency,
            "comment": "",
            "participants": [],
            "merchant": self.messages.text("iou.noMerchant")?,
            "category": "",
            "tag": "",
            "created": self.today()?,
            "receiptPath": "",
            "receiptFilename": "",
            "transactionID": "",
            "billable": null,
            "isSplitRequest": false,
        });
        self.store.merge(keys::IOU, value);
        Ok(())
    }

    /// Where to go once the amount is entered. Requests started on a report
    /// already know their participants and skip straight to confirmation.
    pub fn navigate_to_next_page(&mut self, iou_type: IouType, report: Option<&Report>, path: &str) -> Result<Route> {
        let report_id = report.map(|r| r.report_id.as_str()).unwrap_or_default();
        let request_id = format!("{}{}", iou_type_name(iou_type), report_id);
        let iou = self.store.get(keys::IOU).cloned().unwrap_or(Value::Null);
        let should_reset = iou["id"].as_str() != Some(request_id.as_str()) && !report_id.is_empty();
        if should_reset {
            self.reset_iou(&request_id)?;
        }

        let confirmation = Route::MoneyRequestConfirmation {
            iou_type,
            report_id: report_id.to_owned(),
        };
        if path.trim_start_matches('/') == receipt_path(iou_type, report_id) {
            return Ok(confirmation);
        }

        let Some(report) = report.filter(|_| !report_id.is_empty()) else {
            return Ok(Route::MoneyRequestParticipants {
                iou_type,
                report_id: String::new(),
            });
        };

        let has_participants = iou["participants"]
            .as_array()
            .map_or(false, |p| !p.is_empty());
        if !has_participants || should_reset {
            let participants = self.participants_from_report(report);
            self.store.merge(
                keys::IOU,
                json!({"participants": participants, "category": "", "tag": ""}),
            );
        }
        Ok(confirmation)
    }

    /// Seeds the split draft from the group transaction the first time, then
    /// layers `changes` over it.
    pub fn set_draft_split_transaction(&mut self, transaction_id: &str, changes: &TransactionChanges) -> Result<()> {
        let Some(base) = self
            .store
            .split_transaction_draft(transaction_id)
            .or_else(|| self.store.transaction(transaction_id))
        else {
            return Err(crate::Error::TransactionNotFound(transaction_id.to_owned()));
        };
        let updated = updated_transaction(&base, changes, false, false);
        self.store.merge(
            &keys::split_transaction_draft(transaction_id),
            serde_json::to_value(&updated)?,
        );
        Ok(())
    }
}

fn iou_type_name(iou_type: IouType) -> &'static str {
    match iou_type {
        IouType::Request => "request",
        IouType::Send => "send",
        IouType::Split => "split",
    }
}

fn receipt_path(iou_type: IouType, report_id: &str) -> String {
    format!("{}/new/receipt/{}", iou_type_name(iou_type), report_id)
}
