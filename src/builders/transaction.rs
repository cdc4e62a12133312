use super::Factory;
use crate::{
    model::*,
    Result,
};

/// Caller-supplied facts for a new transaction.
#[derive(Debug, Clone, Default)]
pub struct NewTransaction {
    /// Already in the parent report's sign convention.
    pub amount: i64,
    pub currency: String,
    pub report_id: String,
    pub comment: String,
    pub created: String,
    pub source: Option<String>,
    pub original_transaction_id: Option<String>,
    pub merchant: String,
    pub receipt: Option<Receipt>,
    pub filename: Option<String>,
    pub existing_transaction_id: Option<String>,
    pub category: Option<String>,
    pub tag: Option<String>,
    pub billable: Option<bool>,
    pub tax_code: Option<String>,
    pub tax_amount: Option<i64>,
    pub waypoints: Option<Waypoints>,
}

impl<'a> Factory<'a> {
    pub fn transaction(&self, new: &NewTransaction) -> Result<Transaction> {
        let merchant = if new.merchant.is_empty() {
            self.messages.text("iou.defaultMerchant")?
        } else {
            new.merchant.clone()
        };

        // A receipt without a final amount waits on the scanner.
        let receipt = new.receipt.clone().map(|mut receipt| {
            if receipt.state.is_none() {
                receipt.state = Some(ReceiptState::ScanReady);
            }
            receipt
        });

        Ok(Transaction {
            transaction_id: new
                .existing_transaction_id
                .clone()
                .unwrap_or_else(|| self.ids.next_id()),
            amount: new.amount,
            currency: new.currency.clone(),
            report_id: Some(new.report_id.clone()),
            comment: TransactionComment {
                comment: Some(new.comment.clone()),
                waypoints: new.waypoints.clone(),
                source: new.source.clone(),
                original_transaction_id: new.original_transaction_id.clone(),
                splits: Vec::new(),
            },
            created: if new.created.is_empty() {
                self.now()
            } else {
                new.created.clone()
            },
            merchant: Some(merchant),
            category: new.category.clone(),
            tag: new.tag.clone(),
            billable: new.billable,
            receipt,
            filename: new.filename.clone(),
            tax_code: new.tax_code.clone(),
            tax_amount: new.tax_amount,
            pending_action: Some(PendingAction::Add),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::Fixture;
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_defaults() -> Result<()> {
        let fixture = Fixture::new()?;
        let tx = fixture.factory().transaction(&NewTransaction {
            amount: 1500,
            currency: "USD".into(),
            report_id: "20".into(),
            ..Default::default()
        })?;

        assert_eq!(tx.merchant.as_deref(), Some("Request"));
        assert_eq!(tx.created, "2024-05-01 12:00:00.000");
        assert_eq!(tx.pending_action, Some(PendingAction::Add));
        assert_eq!(tx.report_id.as_deref(), Some("20"));

        Ok(())
    }

    #[test]
    fn test_receipt_without_amount_is_scanning() -> Result<()> {
        let fixture = Fixture::new()?;
        let tx = fixture.factory().transaction(&NewTransaction {
            amount: 0,
            currency: "USD".into(),
            report_id: "20".into(),
            receipt: Some(Receipt {
                source: Some("blob:receipt".into()),
                ..Default::default()
            }),
            ..Default::default()
        })?;

        assert!(tx.is_receipt_being_scanned());

        Ok(())
    }

    #[test]
    fn test_existing_identifier_is_kept() -> Result<()> {
        let fixture = Fixture::new()?;
        let tx = fixture.factory().transaction(&NewTransaction {
            amount: 5,
            currency: "USD".into(),
            existing_transaction_id: Some("abc".into()),
            ..Default::default()
        })?;
        assert_eq!(tx.transaction_id, "abc");

        Ok(())
    }
}
