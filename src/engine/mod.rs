//! Orchestrators, one per user-facing mutation. Each resolves what already
//! exists in the snapshot, fabricates the rest, builds one `MutationPlan` and
//! hands it to the dispatcher before touching navigation.

use std::collections::BTreeMap;

use itertools::Itertools;
use tracing::*;

use crate::{
    builders::Factory,
    clock::{Clock, IdSource},
    collaborators::{Command, Dispatcher, Navigator, Notifier, Parameters},
    config::{Configuration, Session},
    keys,
    ledger::Ledger,
    messages::Messages,
    model::*,
    plan::Phase,
    Error, MutationPlan, Result,
};

mod delete;
mod edit;
mod patches;
mod payment;
mod receipt;
mod request;
mod split;
mod workflow;

#[cfg(test)]
mod tests;

const STATE_FIELDS: [&str; 2] = ["stateNum", "statusNum"];

pub use patches::{money_request_plan, RequestEntities, Resolved};
pub use payment::Recipient;
pub use request::{MoneyRequest, MoneyRequestInformation};
pub use split::SplitInformation;

/// Everything a mutation reads while it is being built.
pub struct Context<'a> {
    pub ledger: &'a dyn Ledger,
    pub config: &'a Configuration,
    pub messages: &'a Messages,
    pub clock: &'a dyn Clock,
    pub ids: &'a dyn IdSource,
}

/// Everything a mutation talks to once it is built.
pub struct Collaborators<'a> {
    pub dispatcher: &'a dyn Dispatcher,
    pub navigator: &'a dyn Navigator,
    pub notifier: &'a dyn Notifier,
}

pub struct Engine<'a> {
    context: Context<'a>,
    collaborators: Collaborators<'a>,
}

impl<'a> Engine<'a> {
    pub fn new(context: Context<'a>, collaborators: Collaborators<'a>) -> Self {
        Self {
            context,
            collaborators,
        }
    }

    pub fn factory(&self) -> Factory<'_> {
        Factory {
            session: &self.context.config.session,
            messages: self.context.messages,
            clock: self.context.clock,
            ids: self.context.ids,
        }
    }

    pub fn config(&self) -> &Configuration {
        self.context.config
    }

    fn ledger(&self) -> &dyn Ledger {
        self.context.ledger
    }

    fn session(&self) -> &Session {
        &self.context.config.session
    }

    fn dispatch(&self, command: Command, parameters: Parameters, plan: MutationPlan) {
        info!(
            "{} ({}/{}/{} updates)",
            command,
            plan.optimistic.len(),
            plan.success.len(),
            plan.failure.len()
        );
        self.collaborators
            .dispatcher
            .write(command, parameters, plan);
    }

    fn report(&self, report_id: &str) -> Result<Report> {
        self.ledger()
            .report(report_id)
            .ok_or_else(|| Error::ReportNotFound(report_id.to_owned()))
    }

    fn transaction(&self, transaction_id: &str) -> Result<Transaction> {
        self.ledger()
            .transaction(transaction_id)
            .ok_or_else(|| Error::TransactionNotFound(transaction_id.to_owned()))
    }

    fn policy(&self, policy_id: &str) -> Result<Policy> {
        self.ledger()
            .policy(policy_id)
            .ok_or_else(|| Error::PolicyNotFound(policy_id.to_owned()))
    }

    /// Who a report's preview names: the workspace for expense reports,
    /// otherwise whoever currently owes.
    fn payer_name(&self, report: &Report, fallback: &str) -> String {
        if report.is_expense_report() {
            if let Some(policy) = report
                .policy_id
                .as_deref()
                .and_then(|id| self.ledger().policy(id))
            {
                return policy.name;
            }
        }
        report
            .manager_id
            .and_then(|id| self.ledger().person(id))
            .map(|p| p.name().to_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| fallback.to_owned())
    }

    fn preview_text(&self, report: &Report, fallback: &str, transaction: Option<&Transaction>) -> Result<String> {
        let has_non_reimbursable = self
            .ledger()
            .has_non_reimbursable_transactions(&report.report_id)
            || transaction.map_or(false, |tx| !tx.is_reimbursable());
        let is_scanning = transaction.map_or(false, |tx| tx.is_receipt_being_scanned());
        crate::recalc::preview_text(
            self.context.messages,
            report,
            &self.payer_name(report, fallback),
            has_non_reimbursable,
            is_scanning,
        )
    }

    /// Moves `category` and `tag` to the front of the workspace's recently
    /// used lists, restoring the old lists on failure.
    fn write_recently_used(
        &self,
        plan: &mut MutationPlan,
        policy_id: Option<&str>,
        category: Option<&str>,
        tag: Option<&str>,
    ) -> Result<()> {
        let Some(policy_id) = policy_id.filter(|id| !id.is_empty()) else {
            return Ok(());
        };

        if let Some(category) = category.filter(|c| !c.is_empty()) {
            let key = keys::recently_used_categories(policy_id);
            let before = self.ledger().recently_used_categories(policy_id);
            let after = std::iter::once(category.to_owned())
                .chain(before.iter().filter(|c| *c != category).cloned())
                .collect_vec();
            plan.set(Phase::Optimistic, &key, &after)?;
            if before.is_empty() {
                plan.remove(Phase::Failure, &key);
            } else {
                plan.set(Phase::Failure, &key, &before)?;
            }
        }

        if let Some(tag) = tag.filter(|t| !t.is_empty()) {
            let key = keys::recently_used_tags(policy_id);
            let list_name = self
                .ledger()
                .policy(policy_id)
                .and_then(|p| p.tag_list_name)
                .unwrap_or_else(|| "Tag".to_owned());
            let previous = self
                .ledger()
                .recently_used_tags(policy_id)
                .remove(&list_name);
            let after = std::iter::once(tag.to_owned())
                .chain(previous.iter().flatten().filter(|t| *t != tag).cloned())
                .collect_vec();

            let optimistic: BTreeMap<&str, Vec<String>> = [(list_name.as_str(), after)].into();
            let failure: BTreeMap<&str, Option<Vec<String>>> = [(list_name.as_str(), previous)].into();
            plan.merge(Phase::Optimistic, &key, &optimistic)?;
            plan.merge(Phase::Failure, &key, &failure)?;
        }

        Ok(())
    }

    /// Writes a report's state transition with `stateNum` and `statusNum`
    /// pending until the authority answers.
    fn write_state_change(&self, plan: &mut MutationPlan, before: &Report, mut after: Report) -> Result<()> {
        let key = keys::report(&before.report_id);
        for field in STATE_FIELDS {
            after.pending_fields.insert(field.into(), PendingAction::Update);
        }
        plan.write(&key, Some(before), &after)?;

        let cleared: BTreeMap<&str, Option<PendingAction>> = STATE_FIELDS.iter().map(|f| (*f, None)).collect();
        let mut patch = BTreeMap::new();
        patch.insert("pendingFields", cleared);
        plan.merge(Phase::Success, &key, &patch)?;
        Ok(())
    }

    /// Drops the report's next step, restoring it on failure.
    fn clear_next_step(&self, plan: &mut MutationPlan, report_id: &str) -> Result<()> {
        if let Some(next_step) = self.ledger().next_step(report_id) {
            let key = keys::next_step(report_id);
            plan.remove(Phase::Optimistic, &key);
            plan.set(Phase::Failure, &key, &next_step)?;
        }
        Ok(())
    }

    /// The account behind `participant`, fabricating one for logins the
    /// snapshot has never seen.
    fn resolve_account_id(&self, participant: &Participant, login: &str) -> Result<AccountId> {
        if let Some(account_id) = participant.account_id {
            return Ok(account_id);
        }
        if login.is_empty() {
            return Err(Error::UnresolvableParticipant);
        }
        match self.ledger().person_by_login(login) {
            Some(person) => Ok(person.account_id),
            None => self
                .context
                .ids
                .next_id()
                .parse()
                .map_err(|_| Error::UnresolvableParticipant),
        }
    }
}
