use std::collections::BTreeMap;

use tera::{Context, Tera};
use tracing::*;

use crate::Result;

const DEFAULTS: &[(&str, &str)] = &[
    ("iou.payerOwesAmount", "{{ payer }} owes {{ amount }}"),
    ("iou.payerSpentAmount", "{{ payer }} spent {{ amount }}"),
    ("iou.payerPaidAmount", "{{ payer }} paid {{ amount }}"),
    ("iou.receiptScanning", "Receipt scanning..."),
    (
        "iou.requestedAmount",
        "requested {{ amount }}{% if comment %} for {{ comment }}{% endif %}",
    ),
    (
        "iou.splitAmount",
        "split {{ amount }}{% if comment %} for {{ comment }}{% endif %}",
    ),
    (
        "iou.deletedAmount",
        "deleted the {{ amount }} request{% if comment %} for {{ comment }}{% endif %}",
    ),
    ("iou.paidAmount", "paid {{ amount }}{{ method }}"),
    (
        "iou.sentAmount",
        "sent {{ amount }}{% if comment %} for {{ comment }}{% endif %}{{ method }}",
    ),
    ("iou.approvedAmount", "approved {{ amount }}"),
    ("iou.submittedAmount", "submitted {{ amount }}"),
    ("iou.paymentMethod.expensify", " with Expensify"),
    ("iou.paymentMethod.wallet", " using wallet"),
    ("iou.paymentMethod.elsewhere", " elsewhere"),
    ("report.createdReport", "{{ email }} created this report"),
    ("iou.modified.set", "set the {{ field }} to {{ value }}"),
    (
        "iou.modified.changed",
        "changed the {{ field }} to {{ value }} (previously {{ previous }})",
    ),
    ("iou.modified.removed", "removed the {{ field }} (previously {{ previous }})"),
    ("iou.defaultMerchant", "Request"),
    ("iou.pendingMerchant", "Pending..."),
    ("iou.noMerchant", "(none)"),
    (
        "iou.error.genericCreateFailureMessage",
        "Unexpected error requesting money, please try again later",
    ),
    (
        "iou.error.genericEditFailureMessage",
        "Unexpected error editing the money request, please try again later",
    ),
    (
        "iou.error.genericDeleteFailureMessage",
        "Unexpected error deleting the money request, please try again later",
    ),
    (
        "iou.error.receiptFailureMessage",
        "There was an error uploading your receipt. Please try again or save the receipt and upload it later",
    ),
    ("iou.error.other", "An unexpected error occurred, please try again later"),
    (
        "report.genericCreateReportFailureMessage",
        "Unexpected error creating this chat, please try again later",
    ),
];

/// Localized user-facing text, one template per message key.
pub struct Messages {
    tera: Tera,
}

impl Messages {
    pub fn new(overrides: &BTreeMap<String, String>) -> Result<Self> {
        let mut tera = Tera::default();
        for (key, template) in DEFAULTS {
            tera.add_raw_template(key, template)?;
        }
        for (key, template) in overrides {
            debug!("overriding {}", key);
            tera.add_raw_template(key, template)?;
        }
        Ok(Self { tera })
    }

    pub fn translate(&self, key: &str, values: &[(&str, &str)]) -> Result<String> {
        let mut context = Context::new();
        for (name, value) in values {
            context.insert(*name, value);
        }
        Ok(self.tera.render(key, &context)?)
    }

    pub fn text(&self, key: &str) -> Result<String> {
        self.translate(key, &[])
    }
}
