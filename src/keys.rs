//! Store keys: a fixed collection prefix followed by an entity identifier.

pub const PERSONAL_DETAILS_LIST: &str = "personalDetailsList";
pub const LAST_PAYMENT_METHOD: &str = "nvp_lastPaymentMethod";
pub const IOU: &str = "iou";

/// Identifier of the single in-progress request draft.
pub const OPTIMISTIC_TRANSACTION_ID: &str = "1";
/// Report identifier carried by group-level split transactions.
pub const SPLIT_REPORT_ID: &str = "-2";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Report,
    ReportActions,
    Transaction,
    TransactionDraft,
    SplitTransactionDraft,
    TransactionViolations,
    Policy,
    PolicyRecentlyUsedCategories,
    PolicyRecentlyUsedTags,
    NextStep,
}

impl Collection {
    pub fn prefix(&self) -> &'static str {
        match self {
            Collection::Report => "report_",
            Collection::ReportActions => "reportActions_",
            Collection::Transaction => "transactions_",
            Collection::TransactionDraft => "transactionsDraft_",
            Collection::SplitTransactionDraft => "splitTransactionDraft_",
            Collection::TransactionViolations => "transactionViolations_",
            Collection::Policy => "policy_",
            Collection::PolicyRecentlyUsedCategories => "policyRecentlyUsedCategories_",
            Collection::PolicyRecentlyUsedTags => "policyRecentlyUsedTags_",
            Collection::NextStep => "nextStep_",
        }
    }

    pub fn key(&self, id: &str) -> String {
        format!("{}{}", self.prefix(), id)
    }

    /// The identifier part of `key`, if it belongs to this collection.
    pub fn id_of<'k>(&self, key: &'k str) -> Option<&'k str> {
        key.strip_prefix(self.prefix())
    }
}

pub fn report(id: &str) -> String {
    Collection::Report.key(id)
}

pub fn report_actions(report_id: &str) -> String {
    Collection::ReportActions.key(report_id)
}

pub fn transaction(id: &str) -> String {
    Collection::Transaction.key(id)
}

pub fn transaction_draft(id: &str) -> String {
    Collection::TransactionDraft.key(id)
}

pub fn split_transaction_draft(id: &str) -> String {
    Collection::SplitTransactionDraft.key(id)
}

pub fn transaction_violations(id: &str) -> String {
    Collection::TransactionViolations.key(id)
}

pub fn policy(id: &str) -> String {
    Collection::Policy.key(id)
}

pub fn recently_used_categories(policy_id: &str) -> String {
    Collection::PolicyRecentlyUsedCategories.key(policy_id)
}

pub fn recently_used_tags(policy_id: &str) -> String {
    Collection::PolicyRecentlyUsedTags.key(policy_id)
}

pub fn next_step(report_id: &str) -> String {
    Collection::NextStep.key(report_id)
}
