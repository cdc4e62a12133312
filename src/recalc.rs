use crate::{
    messages::Messages,
    model::{AccountId, Report},
    money::to_display_string,
    Result,
};

/// A change to a report's running total, in the report's own sign convention:
/// negative adds to what an expense report owes, positive adds to what an IOU
/// report's payer owes.
#[derive(Debug, Clone)]
pub struct TotalDelta<'a> {
    pub actor_account_id: AccountId,
    pub amount: i64,
    pub currency: &'a str,
}

/// Applies `delta` to `report`. Deltas in another currency leave the report
/// alone; the authority converts those and sends the new total later.
pub fn recompute(report: &Report, delta: &TotalDelta, is_expense_report: bool) -> Report {
    if delta.currency != report.currency() {
        return report.clone();
    }

    let mut updated = report.clone();
    if is_expense_report {
        updated.total += delta.amount;
    } else {
        if Some(delta.actor_account_id) == report.owner_account_id {
            updated.total += delta.amount;
        } else {
            updated.total -= delta.amount;
        }

        // whoever was owed now owes
        if updated.total < 0 {
            updated.owner_account_id = report.manager_id;
            updated.manager_id = report.owner_account_id;
            updated.total = -updated.total;
        }
    }
    updated.cached_total = Some(to_display_string(updated.total, updated.currency()));
    updated
}

/// What a payer owes on a report, always non-negative.
pub fn owed(report: &Report) -> i64 {
    report.total.abs()
}

/// "{payer} owes/spent/paid {amount}" as shown on the chat's preview.
pub fn preview_text(
    messages: &Messages,
    report: &Report,
    payer: &str,
    has_non_reimbursable: bool,
    is_scanning: bool,
) -> Result<String> {
    if is_scanning {
        return messages.text("iou.receiptScanning");
    }

    let amount = to_display_string(owed(report), report.currency());
    let key = if report.is_settled() {
        "iou.payerPaidAmount"
    } else if has_non_reimbursable {
        "iou.payerSpentAmount"
    } else {
        "iou.payerOwesAmount"
    };
    messages.translate(key, &[("payer", payer), ("amount", amount.as_str())])
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::{ReportType, StatusNum};
    use anyhow::Result;

    fn iou(total: i64) -> Report {
        Report {
            report_id: "20".into(),
            report_type: ReportType::Iou,
            owner_account_id: Some(1),
            manager_id: Some(2),
            currency: Some("USD".into()),
            total,
            ..Default::default()
        }
    }

    fn expense(total: i64) -> Report {
        Report {
            report_type: ReportType::Expense,
            ..iou(total)
        }
    }

    #[test]
    fn test_expense_total_adds_signed_delta() {
        let before = expense(-1500);
        let delta = TotalDelta {
            actor_account_id: 1,
            amount: -500,
            currency: "USD",
        };
        let after = recompute(&before, &delta, true);
        assert_eq!(after.total, before.total + delta.amount);
        assert_eq!(after.cached_total.as_deref(), Some("-$20.00"));
    }

    #[test]
    fn test_owner_request_grows_total() {
        let after = recompute(
            &iou(1500),
            &TotalDelta {
                actor_account_id: 1,
                amount: 1000,
                currency: "USD",
            },
            false,
        );
        assert_eq!(after.total, 2500);
        assert_eq!(after.owner_account_id, Some(1));
    }

    #[test]
    fn test_reversal_flips_owner_and_manager() {
        let after = recompute(
            &iou(1500),
            &TotalDelta {
                actor_account_id: 2,
                amount: 2000,
                currency: "USD",
            },
            false,
        );
        assert_eq!(after.total, 500);
        assert_eq!(after.owner_account_id, Some(2));
        assert_eq!(after.manager_id, Some(1));
        assert_eq!(after.cached_total.as_deref(), Some("$5.00"));
    }

    #[test]
    fn test_other_currency_leaves_report_untouched() {
        let before = iou(1500);
        let after = recompute(
            &before,
            &TotalDelta {
                actor_account_id: 1,
                amount: 1000,
                currency: "EUR",
            },
            false,
        );
        assert_eq!(after, before);
    }

    #[test]
    fn test_zero_delta_is_idempotent() {
        let before = Report {
            cached_total: Some("$15.00".into()),
            ..iou(1500)
        };
        let zero = TotalDelta {
            actor_account_id: 1,
            amount: 0,
            currency: "USD",
        };
        let once = recompute(&before, &zero, false);
        assert_eq!(once, before);
        assert_eq!(recompute(&once, &zero, false), once);
    }

    #[test]
    fn test_preview_verbs() -> Result<()> {
        let messages = Messages::new(&BTreeMap::new())?;
        let report = iou(1500);
        assert_eq!(
            preview_text(&messages, &report, "Bob", false, false)?,
            "Bob owes $15.00"
        );
        assert_eq!(
            preview_text(&messages, &report, "Bob", true, false)?,
            "Bob spent $15.00"
        );
        assert_eq!(
            preview_text(&messages, &expense(-1500), "Workspace", false, false)?,
            "Workspace owes $15.00"
        );

        let paid = Report {
            status_num: StatusNum::Reimbursed,
            ..report
        };
        assert_eq!(
            preview_text(&messages, &paid, "Bob", false, false)?,
            "Bob paid $15.00"
        );

        Ok(())
    }
}
