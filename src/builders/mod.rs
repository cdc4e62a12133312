//! Pure constructors for entities that don't exist server-side yet. Nothing
//! here reads the snapshot or writes anywhere; identifiers, timestamps and
//! text come from the factory's collaborators.

use crate::{
    clock::{db_time, Clock, IdSource},
    config::Session,
    messages::Messages,
    model::{ErrorMap, ErrorValue, Receipt, ReceiptError},
    Result,
};

mod action;
mod report;
mod transaction;

pub use action::{IouActionParams, PreviewParams};
pub use transaction::NewTransaction;

pub struct Factory<'a> {
    pub session: &'a Session,
    pub messages: &'a Messages,
    pub clock: &'a dyn Clock,
    pub ids: &'a dyn IdSource,
}

impl<'a> Factory<'a> {
    pub fn now(&self) -> String {
        db_time(self.clock.now())
    }

    /// An error map holding one value under a fresh microsecond key.
    pub fn error_map(&self, value: Option<ErrorValue>) -> ErrorMap {
        [(self.clock.micros().to_string(), value)]
            .into_iter()
            .collect()
    }

    /// A localized error under a fresh microsecond key.
    pub fn error(&self, key: &str) -> Result<ErrorMap> {
        Ok(self.error_map(Some(ErrorValue::Message(self.messages.text(key)?))))
    }

    /// The receipt-specific error, when a receipt was attached to a request
    /// that could have been scanned, otherwise the generic create error.
    pub fn receipt_error(
        &self,
        receipt: Option<&Receipt>,
        filename: Option<&str>,
        is_scan_request: bool,
    ) -> Result<ErrorMap> {
        match receipt {
            Some(receipt) if !receipt.is_empty() && is_scan_request => {
                Ok(self.error_map(Some(ErrorValue::Receipt(ReceiptError {
                    error: self.messages.text("iou.error.receiptFailureMessage")?,
                    source: receipt.source.clone().unwrap_or_default(),
                    filename: filename.unwrap_or_default().to_owned(),
                }))))
            }
            _ => self.error("iou.error.genericCreateFailureMessage"),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::Fixture;
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_errors_never_share_a_key() -> Result<()> {
        let fixture = Fixture::new()?;
        let factory = fixture.factory();
        let first = factory.error("iou.error.other")?;
        let second = factory.error("iou.error.other")?;
        assert_ne!(first.keys().next(), second.keys().next());

        Ok(())
    }

    #[test]
    fn test_receipt_error_only_for_scannable_requests() -> Result<()> {
        let fixture = Fixture::new()?;
        let factory = fixture.factory();
        let receipt = Receipt {
            source: Some("blob:1".into()),
            ..Default::default()
        };

        let scanned = factory.receipt_error(Some(&receipt), Some("a.jpg"), true)?;
        assert!(matches!(
            scanned.values().next(),
            Some(Some(ErrorValue::Receipt(_)))
        ));

        let manual = factory.receipt_error(Some(&receipt), Some("a.jpg"), false)?;
        assert!(matches!(
            manual.values().next(),
            Some(Some(ErrorValue::Message(_)))
        ));

        Ok(())
    }
}
