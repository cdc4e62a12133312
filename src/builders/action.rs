use std::collections::BTreeMap;

use super::Factory;
use crate::{
    clock::db_time_before,
    model::*,
    money::to_display_string,
    Result,
};

#[derive(Debug, Clone)]
pub struct IouActionParams<'p> {
    pub kind: IouActionType,
    pub amount: i64,
    pub currency: &'p str,
    pub comment: &'p str,
    pub participants: &'p [Participant],
    pub transaction_id: Option<&'p str>,
    pub payment_type: Option<PaymentType>,
    pub iou_report_id: &'p str,
    pub is_settling_up: bool,
    pub is_send_money_flow: bool,
    pub receipt: Option<&'p Receipt>,
    pub is_own_policy_expense_chat: bool,
}

impl<'p> IouActionParams<'p> {
    pub fn new(kind: IouActionType, amount: i64, currency: &'p str, iou_report_id: &'p str) -> Self {
        Self {
            kind,
            amount,
            currency,
            comment: "",
            participants: &[],
            transaction_id: None,
            payment_type: None,
            iou_report_id,
            is_settling_up: false,
            is_send_money_flow: false,
            receipt: None,
            is_own_policy_expense_chat: false,
        }
    }
}

/// What a chat preview summarizes: the report it links to and the request
/// that triggered the update.
#[derive(Debug, Clone)]
pub struct PreviewParams<'p> {
    pub chat_report_id: &'p str,
    pub iou_report: &'p Report,
    pub comment: &'p str,
    pub transaction: Option<&'p Transaction>,
    pub text: &'p str,
}

impl<'a> Factory<'a> {
    fn action(&self, name: ActionName, text: &str) -> ReportAction {
        ReportAction {
            report_action_id: self.ids.next_id(),
            action_name: name,
            actor_account_id: Some(self.session.account_id),
            actor_email: Some(self.session.email.clone()),
            created: self.now(),
            sequence: self.ids.next_sequence(),
            message: vec![Message::comment(text)],
            pending_action: Some(PendingAction::Add),
            ..Default::default()
        }
    }

    pub fn created_action(&self) -> Result<ReportAction> {
        let text = self
            .messages
            .translate("report.createdReport", &[("email", self.session.email.as_str())])?;
        Ok(self.action(ActionName::Created, &text))
    }

    /// A Created action ordered immediately before `introduced`.
    pub fn created_action_before(&self, introduced: &ReportAction) -> Result<ReportAction> {
        let mut created = self.created_action()?;
        created.created = match chrono::NaiveDateTime::parse_from_str(
            &introduced.created,
            "%Y-%m-%d %H:%M:%S%.3f",
        ) {
            Ok(at) => db_time_before(at.and_utc()),
            Err(_) => db_time_before(self.clock.now()),
        };
        created.sequence = introduced.sequence.saturating_sub(1);
        Ok(created)
    }

    pub fn iou_action_text(&self, params: &IouActionParams) -> Result<String> {
        let amount = to_display_string(params.amount, params.currency);
        let method = match params.payment_type {
            Some(PaymentType::Expensify) => self.messages.text("iou.paymentMethod.expensify")?,
            Some(PaymentType::Vbba) => self.messages.text("iou.paymentMethod.wallet")?,
            _ => self.messages.text("iou.paymentMethod.elsewhere")?,
        };
        let key = match params.kind {
            IouActionType::Create => "iou.requestedAmount",
            IouActionType::Split => "iou.splitAmount",
            IouActionType::Delete => "iou.deletedAmount",
            IouActionType::Pay if params.is_settling_up => "iou.paidAmount",
            IouActionType::Pay => "iou.sentAmount",
        };
        self.messages.translate(
            key,
            &[
                ("amount", amount.as_str()),
                ("comment", params.comment),
                ("method", method.as_str()),
            ],
        )
    }

    pub fn iou_action(&self, params: &IouActionParams) -> Result<ReportAction> {
        let text = self.iou_action_text(params)?;
        let mut action = self.action(ActionName::Iou, &text);

        let mut original = OriginalMessage {
            amount: Some(params.amount),
            currency: Some(params.currency.to_owned()),
            comment: Some(params.comment.to_owned()),
            iou_type: Some(params.kind),
            iou_transaction_id: params.transaction_id.map(str::to_owned),
            iou_report_id: Some(params.iou_report_id.to_owned()),
            ..Default::default()
        };

        match params.kind {
            IouActionType::Pay => {
                original.iou_transaction_id = None;
                original.payment_type = params.payment_type;
                if params.is_send_money_flow {
                    original.iou_details = Some(IouDetails {
                        amount: params.amount,
                        currency: params.currency.to_owned(),
                        comment: params.comment.to_owned(),
                    });
                    original.iou_type = Some(IouActionType::Pay);
                }
            }
            IouActionType::Split => {
                original.iou_report_id = None;
                original.participant_account_ids = std::iter::once(self.session.account_id)
                    .chain(params.participants.iter().filter_map(|p| p.account_id))
                    .collect();
            }
            _ => {}
        }

        action.original_message = original;
        action.receipt = params.receipt.cloned();
        action.whispered_to_account_ids = match params.receipt.and_then(|r| r.state) {
            Some(ReceiptState::ScanReady) | Some(ReceiptState::Scanning) => {
                vec![self.session.account_id]
            }
            _ => Vec::new(),
        };
        Ok(action)
    }

    pub fn report_preview(&self, preview: &PreviewParams) -> ReportAction {
        let mut action = self.action(ActionName::ReportPreview, preview.text);
        let has_receipt = preview.transaction.map_or(false, |t| t.has_receipt());
        let is_scanning = preview
            .transaction
            .map_or(false, |t| t.is_receipt_being_scanned());

        action.report_id = Some(preview.chat_report_id.to_owned());
        action.original_message.linked_report_id = Some(preview.iou_report.report_id.clone());
        if !has_receipt {
            action.actor_account_id = preview.iou_report.manager_id;
        }
        action.child_report_id = Some(preview.iou_report.report_id.clone());
        action.child_money_request_count = Some(1);
        action.child_last_money_request_comment = Some(preview.comment.to_owned());
        if let Some(tx) = preview.transaction.filter(|t| t.has_receipt()) {
            action
                .child_recent_receipt_transaction_ids
                .insert(tx.transaction_id.clone(), action.created.clone());
        }
        action.whispered_to_account_ids = if is_scanning {
            vec![self.session.account_id]
        } else {
            Vec::new()
        };
        action
    }

    /// `existing` refreshed for another request (or a payment, which doesn't
    /// count as a request).
    pub fn updated_report_preview(
        &self,
        existing: &ReportAction,
        preview: &PreviewParams,
        is_payment: bool,
    ) -> ReportAction {
        let mut action = existing.clone();
        action.created = self.now();
        action.sequence = self.ids.next_sequence();
        action.message = vec![Message::comment(preview.text)];
        if !preview.comment.is_empty() {
            action.child_last_money_request_comment = Some(preview.comment.to_owned());
        }
        let count = existing.child_money_request_count.unwrap_or_default();
        action.child_money_request_count = Some(if is_payment { count } else { count + 1 });

        if let Some(tx) = preview.transaction.filter(|t| t.has_receipt()) {
            let mut recent: BTreeMap<String, String> = BTreeMap::new();
            recent.insert(tx.transaction_id.clone(), tx.created.clone());
            recent.extend(existing.child_recent_receipt_transaction_ids.clone());
            action.child_recent_receipt_transaction_ids = recent;
        }

        let is_scanning = preview
            .transaction
            .map_or(false, |t| t.is_receipt_being_scanned());
        if !is_scanning {
            action.whispered_to_account_ids = Vec::new();
        }
        action
    }

    pub fn approved_action(&self, amount: i64, currency: &str, report_id: &str) -> Result<ReportAction> {
        self.status_action(ActionName::Approved, "iou.approvedAmount", amount, currency, report_id)
    }

    pub fn submitted_action(&self, amount: i64, currency: &str, report_id: &str) -> Result<ReportAction> {
        self.status_action(ActionName::Submitted, "iou.submittedAmount", amount, currency, report_id)
    }

    fn status_action(
        &self,
        name: ActionName,
        key: &str,
        amount: i64,
        currency: &str,
        report_id: &str,
    ) -> Result<ReportAction> {
        let display = to_display_string(amount.abs(), currency);
        let text = self.messages.translate(key, &[("amount", display.as_str())])?;
        let mut action = self.action(name, &text);
        action.original_message = OriginalMessage {
            amount: Some(amount.abs()),
            currency: Some(currency.to_owned()),
            expense_report_id: Some(report_id.to_owned()),
            ..Default::default()
        };
        Ok(action)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Fixture;
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_created_precedes_introduced_action() -> Result<()> {
        let fixture = Fixture::new()?;
        let factory = fixture.factory();
        let iou = factory.iou_action(&IouActionParams::new(IouActionType::Create, 1500, "USD", "20"))?;
        let created = factory.created_action_before(&iou)?;

        assert!(created.created < iou.created);
        assert!(created.sequence < iou.sequence);
        assert_eq!(created.created, "2024-05-01 11:59:59.999");
        assert_eq!(created.text(), "me@example.com created this report");

        Ok(())
    }

    #[test]
    fn test_iou_action_messages() -> Result<()> {
        let fixture = Fixture::new()?;
        let factory = fixture.factory();

        let request = factory.iou_action(&IouActionParams {
            comment: "lunch",
            transaction_id: Some("77"),
            ..IouActionParams::new(IouActionType::Create, 1500, "USD", "20")
        })?;
        assert_eq!(request.text(), "requested $15.00 for lunch");
        assert_eq!(request.original_message.iou_transaction_id.as_deref(), Some("77"));

        let paid = factory.iou_action(&IouActionParams {
            transaction_id: Some("77"),
            payment_type: Some(PaymentType::Elsewhere),
            is_settling_up: true,
            ..IouActionParams::new(IouActionType::Pay, 1500, "USD", "20")
        })?;
        assert_eq!(paid.text(), "paid $15.00 elsewhere");
        assert_eq!(paid.original_message.iou_transaction_id, None);

        let split_with = [Participant::account(2, "a@example.com"), Participant::account(3, "b@example.com")];
        let split = factory.iou_action(&IouActionParams {
            participants: &split_with,
            ..IouActionParams::new(IouActionType::Split, 3000, "USD", "")
        })?;
        assert_eq!(split.original_message.participant_account_ids, vec![1, 2, 3]);
        assert_eq!(split.original_message.iou_report_id, None);

        Ok(())
    }

    #[test]
    fn test_scan_requests_are_whispered() -> Result<()> {
        let fixture = Fixture::new()?;
        let receipt = Receipt {
            source: Some("blob:1".into()),
            state: Some(ReceiptState::ScanReady),
            ..Default::default()
        };
        let action = fixture.factory().iou_action(&IouActionParams {
            receipt: Some(&receipt),
            ..IouActionParams::new(IouActionType::Create, 0, "USD", "20")
        })?;
        assert_eq!(action.whispered_to_account_ids, vec![1]);

        Ok(())
    }

    #[test]
    fn test_updated_preview_counts_requests() -> Result<()> {
        let fixture = Fixture::new()?;
        let factory = fixture.factory();
        let report = Report {
            report_id: "20".into(),
            manager_id: Some(2),
            ..Default::default()
        };
        let preview = PreviewParams {
            chat_report_id: "10",
            iou_report: &report,
            comment: "first",
            transaction: None,
            text: "Bob owes $15.00",
        };
        let built = factory.report_preview(&preview);
        assert_eq!(built.child_money_request_count, Some(1));
        assert_eq!(built.actor_account_id, Some(2));

        let again = factory.updated_report_preview(
            &built,
            &PreviewParams {
                comment: "",
                text: "Bob owes $30.00",
                ..preview.clone()
            },
            false,
        );
        assert_eq!(again.child_money_request_count, Some(2));
        assert_eq!(again.child_last_money_request_comment.as_deref(), Some("first"));
        assert_eq!(again.text(), "Bob owes $30.00");
        assert_eq!(again.report_action_id, built.report_action_id);

        let paid = factory.updated_report_preview(&again, &preview, true);
        assert_eq!(paid.child_money_request_count, Some(2));

        Ok(())
    }
}
