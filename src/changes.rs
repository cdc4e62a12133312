//! Field-level edits to an existing transaction.

use std::collections::BTreeMap;

use crate::{
    builders::Factory,
    collaborators::Parameters,
    model::*,
    money::to_display_string,
    Result,
};

/// One field of an edit. `Cleared` is an explicit empty value, distinct from
/// leaving the field alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Change<T> {
    #[default]
    Unchanged,
    Cleared,
    Set(T),
}

impl<T> Change<T> {
    pub fn is_present(&self) -> bool {
        !matches!(self, Change::Unchanged)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Change::Set(value) => Some(value),
            _ => None,
        }
    }
}

impl<T: Clone + Default> Change<T> {
    /// The value the field ends up with, if it changes at all.
    pub fn resolved(&self) -> Option<T> {
        match self {
            Change::Unchanged => None,
            Change::Cleared => Some(T::default()),
            Change::Set(value) => Some(value.clone()),
        }
    }
}

impl<T> From<Option<T>> for Change<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => Change::Set(value),
            None => Change::Unchanged,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionChanges {
    pub comment: Change<String>,
    pub created: Change<String>,
    /// Positive, as typed by the user.
    pub amount: Change<i64>,
    pub currency: Change<String>,
    pub merchant: Change<String>,
    pub category: Change<String>,
    pub tag: Change<String>,
    pub billable: Change<bool>,
    pub waypoints: Change<Waypoints>,
}

impl TransactionChanges {
    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Names of the fields this edit touches, as they appear on the wire.
    pub fn fields(&self) -> Vec<&'static str> {
        [
            ("comment", self.comment.is_present()),
            ("created", self.created.is_present()),
            ("amount", self.amount.is_present()),
            ("currency", self.currency.is_present()),
            ("merchant", self.merchant.is_present()),
            ("category", self.category.is_present()),
            ("tag", self.tag.is_present()),
            ("billable", self.billable.is_present()),
            ("waypoints", self.waypoints.is_present()),
        ]
        .into_iter()
        .filter_map(|(name, present)| present.then_some(name))
        .collect()
    }

    pub fn pending_fields(&self) -> PendingFields {
        self.fields()
            .into_iter()
            .map(|f| (f.to_owned(), PendingAction::Update))
            .collect()
    }

    /// Absent fields are left out; cleared fields go out as empty strings.
    pub fn write_parameters(&self, params: &mut Parameters) -> Result<()> {
        fn put<T: ToString>(params: &mut Parameters, name: &str, change: &Change<T>) {
            match change {
                Change::Unchanged => {}
                Change::Cleared => params.insert(name, ""),
                Change::Set(value) => params.insert(name, value.to_string()),
            }
        }

        put(params, "comment", &self.comment);
        put(params, "created", &self.created);
        put(params, "amount", &self.amount);
        put(params, "currency", &self.currency);
        put(params, "merchant", &self.merchant);
        put(params, "category", &self.category);
        put(params, "tag", &self.tag);
        put(params, "billable", &self.billable);
        match &self.waypoints {
            Change::Unchanged => {}
            Change::Cleared => params.insert("waypoints", ""),
            Change::Set(waypoints) => params.insert_json("waypoints", waypoints)?,
        }
        Ok(())
    }
}

/// `transaction` with `changes` applied to its modified-* shadow fields, so
/// the originals survive for rollback.
pub fn updated_transaction(
    transaction: &Transaction,
    changes: &TransactionChanges,
    is_from_expense_report: bool,
    update_receipt_state: bool,
) -> Transaction {
    let mut updated = transaction.clone();
    let mut stops_smartscan = false;

    if let Some(comment) = changes.comment.resolved() {
        updated.comment.comment = Some(comment);
    }
    if let Some(created) = changes.created.resolved() {
        updated.modified_created = Some(created);
        stops_smartscan = true;
    }
    if let Some(amount) = changes.amount.resolved() {
        updated.modified_amount = Some(if is_from_expense_report { -amount } else { amount });
        stops_smartscan = true;
    }
    if let Some(currency) = changes.currency.resolved() {
        updated.modified_currency = Some(currency);
        stops_smartscan = true;
    }
    if let Some(merchant) = changes.merchant.resolved() {
        updated.modified_merchant = Some(merchant);
        stops_smartscan = true;
    }
    if let Some(waypoints) = changes.waypoints.resolved() {
        updated.modified_waypoints = Some(waypoints);
        stops_smartscan = true;
    }
    if let Some(billable) = changes.billable.resolved() {
        updated.billable = Some(billable);
    }
    if let Some(category) = changes.category.resolved() {
        updated.category = Some(category);
    }
    if let Some(tag) = changes.tag.resolved() {
        updated.tag = Some(tag);
    }

    if update_receipt_state && stops_smartscan {
        if let Some(receipt) = updated.receipt.as_mut() {
            if !receipt.is_empty() && receipt.state != Some(ReceiptState::Open) {
                receipt.state = Some(ReceiptState::Open);
            }
        }
    }

    updated.pending_fields.extend(changes.pending_fields());
    updated
}

fn billable_text(billable: Option<bool>) -> String {
    match billable {
        Some(true) => "billable".into(),
        Some(false) => "non-billable".into(),
        None => String::new(),
    }
}

/// Old and new display values of each field `changes` touches.
pub fn modified_fields(
    old: &Transaction,
    changes: &TransactionChanges,
    is_from_expense_report: bool,
) -> BTreeMap<String, ModifiedField> {
    let mut fields = BTreeMap::new();
    let mut record = |name: &str, old: String, new: String| {
        fields.insert(name.to_owned(), ModifiedField { old, new });
    };

    if let Some(comment) = changes.comment.resolved() {
        record("description", old.description().to_owned(), comment);
    }
    if let Some(created) = changes.created.resolved() {
        record("date", old.created().to_owned(), created);
    }
    if changes.amount.is_present() || changes.currency.is_present() {
        let currency = changes
            .currency
            .resolved()
            .unwrap_or_else(|| old.currency().to_owned());
        let amount = changes
            .amount
            .resolved()
            .unwrap_or_else(|| old.amount(is_from_expense_report));
        record(
            "amount",
            to_display_string(old.amount(is_from_expense_report), old.currency()),
            to_display_string(amount, &currency),
        );
    }
    if let Some(merchant) = changes.merchant.resolved() {
        record("merchant", old.merchant().to_owned(), merchant);
    }
    if let Some(category) = changes.category.resolved() {
        record("category", old.category.clone().unwrap_or_default(), category);
    }
    if let Some(tag) = changes.tag.resolved() {
        record("tag", old.tag.clone().unwrap_or_default(), tag);
    }
    if let Some(billable) = changes.billable.resolved() {
        record("billable", billable_text(old.billable), billable_text(Some(billable)));
    }
    fields
}

impl<'a> Factory<'a> {
    /// Summary text for an edit, one clause per changed field.
    pub fn modified_text(&self, fields: &BTreeMap<String, ModifiedField>) -> Result<String> {
        let mut clauses = Vec::new();
        for (name, field) in fields.iter().filter(|(_, f)| f.old != f.new) {
            let values = [
                ("field", name.as_str()),
                ("value", field.new.as_str()),
                ("previous", field.old.as_str()),
            ];
            let key = if field.old.is_empty() {
                "iou.modified.set"
            } else if field.new.is_empty() {
                "iou.modified.removed"
            } else {
                "iou.modified.changed"
            };
            clauses.push(self.messages.translate(key, &values)?);
        }
        Ok(clauses.join(", "))
    }

    /// The Modified action recorded in a transaction's thread.
    pub fn modified_expense_action(
        &self,
        thread_report_id: &str,
        old: &Transaction,
        changes: &TransactionChanges,
        is_from_expense_report: bool,
    ) -> Result<ReportAction> {
        let fields = modified_fields(old, changes, is_from_expense_report);
        let text = self.modified_text(&fields)?;
        let mut action = ReportAction {
            report_action_id: self.ids.next_id(),
            report_id: Some(thread_report_id.to_owned()),
            action_name: ActionName::ModifiedExpense,
            actor_account_id: Some(self.session.account_id),
            actor_email: Some(self.session.email.clone()),
            created: self.now(),
            sequence: self.ids.next_sequence(),
            message: vec![Message::comment(&text)],
            pending_action: Some(PendingAction::Add),
            ..Default::default()
        };
        action.original_message.modified = fields;
        Ok(action)
    }
}
