use serde_json::json;
use tracing::*;

use super::Engine;
use crate::{
    collaborators::{Command, Parameters},
    keys,
    model::*,
    plan::Phase,
    recalc::owed,
    Error, MutationPlan, Result,
};

impl<'a> Engine<'a> {
    /// Approves an expense report as its manager.
    pub fn approve_money_request(&self, report: &Report) -> Result<()> {
        let _span = span!(Level::INFO, "approve").entered();
        if !report.is_money_request_report() {
            return Err(Error::NotMoneyRequestReport(report.report_id.clone()));
        }
        let factory = self.factory();
        let action = factory.approved_action(owed(report), report.currency(), &report.report_id)?;

        let updated = Report {
            last_message_text: Some(action.text().to_owned()),
            last_message_html: Some(action.html().to_owned()),
            state_num: StateNum::Approved,
            status_num: StatusNum::Approved,
            ..report.clone()
        };

        let actions_key = keys::report_actions(&report.report_id);
        let action_id = action.report_action_id.as_str();
        let mut plan = MutationPlan::new();
        plan.merge(Phase::Optimistic, &actions_key, &json!({ action_id: &action }))?;
        self.write_state_change(&mut plan, report, updated)?;
        self.clear_next_step(&mut plan, &report.report_id)?;

        plan.merge(Phase::Success, &actions_key, &json!({ action_id: {"pendingAction": null} }))?;
        plan.merge(
            Phase::Failure,
            &actions_key,
            &json!({ action_id: {"errors": factory.error("iou.error.other")?} }),
        )?;

        let parameters = Parameters::new()
            .with("reportID", &report.report_id)
            .with("approvedReportActionID", action_id);
        info!("approving {}", report.report_id);
        self.dispatch(Command::ApproveMoneyRequest, parameters, plan);
        Ok(())
    }

    /// Submits an open expense report to its manager.
    pub fn submit_report(&self, report: &Report) -> Result<()> {
        let _span = span!(Level::INFO, "submit").entered();
        if !report.is_money_request_report() {
            return Err(Error::NotMoneyRequestReport(report.report_id.clone()));
        }
        let factory = self.factory();
        let me = self.session().account_id;
        let action = factory.submitted_action(owed(report), report.currency(), &report.report_id)?;

        let updated = Report {
            last_message_text: Some(action.text().to_owned()),
            last_message_html: Some(action.html().to_owned()),
            state_num: StateNum::Submitted,
            status_num: StatusNum::Submitted,
            ..report.clone()
        };

        let actions_key = keys::report_actions(&report.report_id);
        let action_id = action.report_action_id.as_str();
        let mut plan = MutationPlan::new();
        plan.merge(Phase::Optimistic, &actions_key, &json!({ action_id: &action }))?;
        self.write_state_change(&mut plan, report, updated)?;

        // the manager now has something waiting in the workspace chat
        if let Some(chat) = report
            .parent_report_id
            .as_deref()
            .and_then(|id| self.ledger().report(id))
        {
            let updated_chat = Report {
                has_outstanding_child_request: report.manager_id == Some(me),
                iou_report_id: if report.is_expense_report() {
                    None
                } else {
                    chat.iou_report_id.clone()
                },
                ..chat.clone()
            };
            plan.write(&keys::report(&chat.report_id), Some(&chat), &updated_chat)?;
        }
        self.clear_next_step(&mut plan, &report.report_id)?;

        plan.merge(Phase::Success, &actions_key, &json!({ action_id: {"pendingAction": null} }))?;
        plan.merge(
            Phase::Failure,
            &actions_key,
            &json!({ action_id: {"errors": factory.error("iou.error.other")?} }),
        )?;

        let parameters = Parameters::new()
            .with("reportID", &report.report_id)
            .with_opt("managerAccountID", report.manager_id)
            .with("reportActionID", action_id);
        info!("submitting {}", report.report_id);
        self.dispatch(Command::SubmitReport, parameters, plan);
        Ok(())
    }
}
