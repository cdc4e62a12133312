use tracing::*;

use super::Engine;
use crate::{
    collaborators::{Command, Parameters},
    keys,
    model::*,
    plan::Phase,
    MutationPlan, Result,
};

impl<'a> Engine<'a> {
    pub fn detach_receipt(&self, transaction_id: &str) -> Result<()> {
        let _span = span!(Level::INFO, "detach-receipt").entered();
        let transaction = self.transaction(transaction_id)?;
        let detached = Transaction {
            receipt: None,
            filename: None,
            ..transaction.clone()
        };

        let key = keys::transaction(transaction_id);
        let mut plan = MutationPlan::new();
        plan.set(Phase::Optimistic, &key, &detached)?;
        plan.set(Phase::Failure, &key, &transaction)?;

        info!("detaching receipt from {}", transaction_id);
        self.dispatch(
            Command::DetachReceipt,
            Parameters::new().with("transactionID", transaction_id),
            plan,
        );
        Ok(())
    }

    /// Attaches a new receipt, replacing whatever was there. The receipt is
    /// taken as final and isn't scanned.
    pub fn replace_receipt(&self, transaction_id: &str, source: &str, filename: &str) -> Result<()> {
        let _span = span!(Level::INFO, "replace-receipt").entered();
        let transaction = self.transaction(transaction_id)?;
        let receipt = Receipt {
            source: Some(source.to_owned()),
            filename: None,
            state: Some(ReceiptState::Open),
        };
        let replaced = Transaction {
            receipt: Some(receipt),
            filename: Some(filename.to_owned()),
            ..transaction.clone()
        };

        let mut plan = MutationPlan::new();
        plan.write(&keys::transaction(transaction_id), Some(&transaction), &replaced)?;

        let mut parameters = Parameters::new().with("transactionID", transaction_id);
        parameters.insert_json(
            "receipt",
            &Receipt {
                source: Some(source.to_owned()),
                filename: Some(filename.to_owned()),
                state: None,
            },
        )?;
        info!("replacing receipt of {}", transaction_id);
        self.dispatch(Command::ReplaceReceipt, parameters, plan);
        Ok(())
    }
}
