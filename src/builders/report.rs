use itertools::Itertools;

use super::Factory;
use crate::{
    model::*,
    money::to_display_string,
    Result,
};

impl<'a> Factory<'a> {
    /// A chat between `participants`, who should include the current user.
    pub fn chat_report(&self, participants: &[AccountId]) -> Report {
        let now = self.now();
        Report {
            report_id: self.ids.next_id(),
            report_type: ReportType::Chat,
            participant_account_ids: participants.iter().copied().sorted().dedup().collect(),
            owner_account_id: Some(self.session.account_id),
            last_read_time: Some(now.clone()),
            last_visible_action_created: Some(now),
            ..Default::default()
        }
    }

    pub fn group_chat_report(&self, participants: &[AccountId]) -> Report {
        Report {
            chat_type: Some(ChatType::Group),
            ..self.chat_report(participants)
        }
    }

    /// A peer-to-peer report in which `payer` owes `payee` the positive `total`.
    pub fn iou_report(
        &self,
        payee: AccountId,
        payer: AccountId,
        payer_login: &str,
        total: i64,
        chat_report_id: &str,
        currency: &str,
        is_sending_money: bool,
    ) -> Result<Report> {
        let formatted = to_display_string(total, currency);
        let (state_num, status_num) = if is_sending_money {
            (StateNum::Approved, StatusNum::Reimbursed)
        } else {
            (StateNum::Submitted, StatusNum::Submitted)
        };
        Ok(Report {
            report_id: self.ids.next_id(),
            report_type: ReportType::Iou,
            report_name: Some(self.messages.translate(
                "iou.payerOwesAmount",
                &[("payer", payer_login), ("amount", formatted.as_str())],
            )?),
            owner_account_id: Some(payee),
            manager_id: Some(payer),
            participant_account_ids: vec![payee, payer],
            currency: Some(currency.to_owned()),
            total,
            cached_total: Some(formatted),
            state_num,
            status_num,
            chat_report_id: Some(chat_report_id.to_owned()),
            parent_report_id: Some(chat_report_id.to_owned()),
            ..Default::default()
        })
    }

    /// A workspace expense report. `total` is what the workspace owes and is
    /// stored negated.
    pub fn expense_report(
        &self,
        chat_report_id: &str,
        policy: &Policy,
        payee: AccountId,
        total: i64,
        currency: &str,
    ) -> Result<Report> {
        let stored = -total;
        let formatted = to_display_string(total, currency);
        let (state_num, status_num) = if policy.is_paid_group_policy() {
            (StateNum::Open, StatusNum::Open)
        } else {
            (StateNum::Submitted, StatusNum::Submitted)
        };
        Ok(Report {
            report_id: self.ids.next_id(),
            report_type: ReportType::Expense,
            policy_id: Some(policy.id.clone()),
            report_name: Some(self.messages.translate(
                "iou.payerOwesAmount",
                &[("payer", policy.name.as_str()), ("amount", formatted.as_str())],
            )?),
            owner_account_id: Some(payee),
            manager_id: policy.owner_account_id,
            currency: Some(currency.to_owned()),
            total: stored,
            cached_total: Some(to_display_string(stored, currency)),
            state_num,
            status_num,
            chat_report_id: Some(chat_report_id.to_owned()),
            parent_report_id: Some(chat_report_id.to_owned()),
            ..Default::default()
        })
    }

    /// Placeholder details for someone the snapshot doesn't know yet.
    pub fn personal_details(&self, account_id: AccountId, participant: &Participant, login: &str) -> PersonalDetails {
        PersonalDetails {
            account_id,
            login: Some(login.to_owned()),
            display_name: participant
                .display_name
                .clone()
                .or_else(|| Some(login.to_owned())),
            is_optimistic_personal_detail: true,
        }
    }
}
