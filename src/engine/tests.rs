use std::collections::BTreeSet;

use anyhow::{anyhow, Result};
use chrono::{TimeZone, Utc};
use serde_json::{json, Map, Value};

use super::*;
use crate::{
    changes::{Change, TransactionChanges},
    clock::{FixedClock, SequentialIds},
    collaborators::{Event, Recorder, Route},
    queue::OfflineQueue,
    store::{MemoryStore, Store},
};

struct Harness {
    store: MemoryStore,
    config: Configuration,
    messages: Messages,
    clock: FixedClock,
    ids: SequentialIds,
    recorder: Recorder,
}

impl Harness {
    fn new() -> Result<Self> {
        let config = Configuration::for_session(1, "me@example.com");
        let messages = Messages::new(&config.messages)?;
        let mut store = MemoryStore::new();
        store.insert(
            keys::PERSONAL_DETAILS_LIST,
            &json!({
                "1": {"accountID": 1, "login": "me@example.com", "displayName": "Me"},
                "2": {"accountID": 2, "login": "friend@example.com", "displayName": "Friend"},
            }),
        )?;
        Ok(Self {
            store,
            config,
            messages,
            clock: FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            ids: SequentialIds::starting_at(1000),
            recorder: Recorder::new(),
        })
    }

    fn engine_with<'a>(&'a self, ledger: &'a dyn Ledger, dispatcher: &'a dyn Dispatcher) -> Engine<'a> {
        Engine::new(
            Context {
                ledger,
                config: &self.config,
                messages: &self.messages,
                clock: &self.clock,
                ids: &self.ids,
            },
            Collaborators {
                dispatcher,
                navigator: &self.recorder,
                notifier: &self.recorder,
            },
        )
    }

    fn engine(&self) -> Engine<'_> {
        self.engine_with(&self.store, &self.recorder)
    }

    fn last_write(&self) -> Result<(Command, Parameters, MutationPlan)> {
        self.recorder
            .writes()
            .pop()
            .ok_or_else(|| anyhow!("nothing was written"))
    }

    /// Applies `phases` of the most recent plan to the store.
    fn settle(&mut self, phases: &[Phase]) -> Result<MutationPlan> {
        let (_, _, plan) = self.last_write()?;
        for phase in phases {
            self.store.apply_phase(&plan, *phase);
        }
        Ok(plan)
    }

    fn workspace(&mut self) -> Result<Report> {
        let policy = Policy {
            id: "P1".into(),
            name: "Acme".into(),
            policy_type: PolicyType::Team,
            owner_account_id: Some(9),
            ..Default::default()
        };
        let chat = Report {
            report_id: "20".into(),
            chat_type: Some(ChatType::PolicyExpenseChat),
            policy_id: Some("P1".into()),
            owner_account_id: Some(1),
            participant_account_ids: vec![1, 9],
            is_own_policy_expense_chat: true,
            ..Default::default()
        };
        self.store.insert(&keys::policy("P1"), &policy)?;
        self.store.insert(&keys::report("20"), &chat)?;
        Ok(chat)
    }
}

fn friend() -> Participant {
    Participant::account(2, "friend@example.com")
}

fn request(amount: i64) -> MoneyRequest {
    MoneyRequest {
        amount,
        currency: "USD".into(),
        comment: "lunch".into(),
        ..Default::default()
    }
}

fn report(h: &Harness, report_id: &str) -> Result<Report> {
    h.store
        .report(report_id)
        .ok_or_else(|| anyhow!("no report {}", report_id))
}

/// Pending markers left anywhere in the store.
fn pending_markers(store: &MemoryStore) -> usize {
    fn count(value: &Value) -> usize {
        match value {
            Value::Object(map) => map
                .iter()
                .map(|(key, value)| match (key.as_str(), value) {
                    ("pendingAction", _) => 1,
                    ("pendingFields", Value::Object(fields)) => fields.len(),
                    _ => count(value),
                })
                .sum(),
            Value::Array(values) => values.iter().map(count).sum(),
            _ => 0,
        }
    }
    store
        .keys()
        .filter_map(|key| store.get(key))
        .map(count)
        .sum()
}

/// `value` without error markers or pending maps that have been emptied.
fn without_errors(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, value)| match (key.as_str(), value) {
                    ("errors" | "errorFields", _) => false,
                    ("pendingFields", Value::Object(fields)) => !fields.is_empty(),
                    _ => true,
                })
                .map(|(key, value)| (key.clone(), without_errors(value)))
                .collect(),
        ),
        Value::Array(values) => Value::Array(values.iter().map(without_errors).collect()),
        other => other.clone(),
    }
}

fn carries_errors(value: &Value) -> bool {
    value
        .get("errors")
        .and_then(Value::as_object)
        .map_or(false, |errors| !errors.is_empty())
}

/// Every key of `rolled_back` matches `pristine` apart from errors. Actions
/// that only exist afterwards must be carrying one.
fn assert_rolled_back(pristine: &MemoryStore, rolled_back: &MemoryStore) {
    let actions_prefix = keys::report_actions("");
    let empty = Map::new();
    let all_keys: BTreeSet<&String> = pristine.keys().chain(rolled_back.keys()).collect();
    for key in all_keys {
        let before = pristine.get(key);
        let after = rolled_back.get(key);
        if !key.starts_with(&actions_prefix) {
            assert_eq!(after.map(without_errors), before.map(without_errors), "{}", key);
            continue;
        }

        let before = before.and_then(Value::as_object).unwrap_or(&empty);
        let after = after.and_then(Value::as_object).unwrap_or(&empty);
        for (id, action) in after {
            match before.get(id) {
                Some(original) => assert_eq!(without_errors(action), without_errors(original), "{} {}", key, id),
                None => assert!(carries_errors(action), "{} {} left behind without an error", key, id),
            }
        }
        for id in before.keys() {
            assert!(after.contains_key(id), "{} {} was not restored", key, id);
        }
    }
}

#[test]
fn test_request_in_new_chat() -> Result<()> {
    let mut h = Harness::new()?;
    let info = h.engine().request_money(None, &friend(), &request(1500))?;
    assert!(info.is_new_chat_report && info.is_new_iou_report);

    let (command, parameters, _) = h.last_write()?;
    assert_eq!(command, Command::RequestMoney);
    assert_eq!(parameters.get("amount"), Some("1500"));
    assert_eq!(parameters.get("debtorAccountID"), Some("2"));
    assert!(parameters.get("createdChatReportActionID").is_some());

    h.settle(&[Phase::Optimistic])?;
    let chat_id = info.chat_report.report_id.as_str();
    let iou_id = info.iou_report.report_id.as_str();
    let actions = h.store.report_actions(chat_id).len() + h.store.report_actions(iou_id).len();
    assert_eq!(actions, 4);
    assert_eq!(report(&h, iou_id)?.total, 1500);
    assert_eq!(report(&h, chat_id)?.iou_report_id.as_deref(), Some(iou_id));
    assert_eq!(
        h.store
            .transaction(&info.transaction.transaction_id)
            .map(|t| t.amount),
        Some(1500)
    );

    assert!(h.recorder.events().contains(&Event::DismissModal {
        target_report_id: Some(chat_id.to_owned())
    }));

    Ok(())
}

#[test]
fn test_second_request_adds_to_existing_report() -> Result<()> {
    let mut h = Harness::new()?;
    let first = h.engine().request_money(None, &friend(), &request(1500))?;
    h.settle(&[Phase::Optimistic, Phase::Success])?;

    let second = h.engine().request_money(None, &friend(), &request(500))?;
    assert!(!second.is_new_chat_report && !second.is_new_iou_report);
    assert_eq!(second.iou_report.report_id, first.iou_report.report_id);

    h.settle(&[Phase::Optimistic])?;
    assert_eq!(report(&h, &first.iou_report.report_id)?.total, 2000);
    let preview = h
        .store
        .report_preview_action(&first.chat_report.report_id, &first.iou_report.report_id)
        .ok_or_else(|| anyhow!("no preview"))?;
    assert_eq!(preview.child_money_request_count, Some(2));

    Ok(())
}

#[test]
fn test_workspace_request_stores_negative_total() -> Result<()> {
    let mut h = Harness::new()?;
    let chat = h.workspace()?;
    let participant = Participant::policy_expense_chat("P1", "20", true);
    let info = h
        .engine()
        .request_money(Some(&chat), &participant, &request(1500))?;
    h.settle(&[Phase::Optimistic])?;

    let expense = report(&h, &info.iou_report.report_id)?;
    assert!(expense.is_expense_report());
    assert_eq!(expense.total, -1500);
    assert_eq!(expense.state_num, StateNum::Open);
    assert_eq!(
        h.store
            .transaction(&info.transaction.transaction_id)
            .map(|t| t.amount),
        Some(-1500)
    );
    assert!(report(&h, "20")?.has_outstanding_child_request);

    Ok(())
}

#[test]
fn test_success_leaves_nothing_pending() -> Result<()> {
    let mut h = Harness::new()?;
    h.engine().request_money(None, &friend(), &request(1500))?;
    h.settle(&[Phase::Optimistic])?;
    assert!(pending_markers(&h.store) > 0);

    let (_, _, plan) = h.last_write()?;
    h.store.apply_phase(&plan, Phase::Success);
    assert_eq!(pending_markers(&h.store), 0);

    // the authority may answer twice
    h.store.apply_phase(&plan, Phase::Success);
    assert_eq!(pending_markers(&h.store), 0);

    Ok(())
}

#[test]
fn test_rejected_request_restores_existing_report() -> Result<()> {
    let h = Harness::new()?;
    let queue = OfflineQueue::new(h.store.clone());

    let snapshot = queue.store().clone();
    let first = h
        .engine_with(&snapshot, &queue)
        .request_money(None, &friend(), &request(1500))?;
    queue.confirm(0)?;
    let iou_id = first.iou_report.report_id.as_str();
    let before = queue.store().report(iou_id);

    let snapshot = queue.store().clone();
    let second = h
        .engine_with(&snapshot, &queue)
        .request_money(None, &friend(), &request(500))?;
    assert_eq!(queue.store().report(iou_id).map(|r| r.total), Some(2000));

    queue.reject(1)?;
    let after = queue.store().report(iou_id);
    assert_eq!(after.as_ref().map(|r| r.total), before.as_ref().map(|r| r.total));
    assert_eq!(
        after.and_then(|r| r.cached_total),
        before.and_then(|r| r.cached_total)
    );

    // fabricated entities stay behind to carry the error
    let orphan = queue
        .store()
        .transaction(&second.transaction.transaction_id)
        .ok_or_else(|| anyhow!("transaction dropped"))?;
    assert!(!orphan.errors.is_empty());
    assert!(queue.pending().is_empty());

    Ok(())
}

#[test]
fn test_split_shares_sum_to_total() -> Result<()> {
    let h = Harness::new()?;
    let participants = [friend(), Participant::account(3, "pal@example.com")];

    let even = h.engine().split_bill(&participants, &request(3000), None)?;
    let amounts: Vec<_> = even.splits.iter().filter_map(|s| s.amount).collect();
    assert_eq!(amounts, vec![1000, 1000, 1000]);

    let odd = h.engine().split_bill(&participants, &request(3001), None)?;
    let amounts: Vec<_> = odd.splits.iter().filter_map(|s| s.amount).collect();
    assert_eq!(amounts, vec![1001, 1000, 1000]);
    assert_eq!(amounts.iter().sum::<i64>(), 3001);

    let (command, parameters, _) = h.last_write()?;
    assert_eq!(command, Command::SplitBill);
    assert!(parameters.get("splits").is_some());

    Ok(())
}

#[test]
fn test_split_without_participants_fails() -> Result<()> {
    let h = Harness::new()?;
    let result = h.engine().split_bill(&[], &request(3000), None);
    assert!(matches!(result, Err(Error::NoSplitParticipants)));
    assert!(h.recorder.writes().is_empty());

    Ok(())
}

#[test]
fn test_start_split_records_participants() -> Result<()> {
    let h = Harness::new()?;
    let participants = [friend(), Participant::account(3, "pal@example.com")];
    let scan = MoneyRequest {
        receipt: Some(Receipt {
            source: Some("receipt.jpg".into()),
            filename: Some("receipt.jpg".into()),
            state: None,
        }),
        ..request(0)
    };
    let info = h.engine().start_split_bill(&participants, &scan, None)?;

    assert_eq!(info.transaction.amount, 0);
    assert_eq!(info.transaction.comment.splits.len(), 3);
    let (command, parameters, _) = h.last_write()?;
    assert_eq!(command, Command::StartSplitBill);
    assert_eq!(parameters.get("isFromGroupDM"), Some("true"));

    Ok(())
}

#[test]
fn test_delete_only_request_removes_report() -> Result<()> {
    let mut h = Harness::new()?;
    let info = h.engine().request_money(None, &friend(), &request(1500))?;
    h.settle(&[Phase::Optimistic, Phase::Success])?;

    let chat_id = info.chat_report.report_id.clone();
    let iou_id = info.iou_report.report_id.clone();
    let action = h
        .store
        .report_action(&iou_id, &info.iou_action.report_action_id)
        .ok_or_else(|| anyhow!("no action"))?;
    let deletion = h
        .engine()
        .delete_money_request(&info.transaction.transaction_id, &action, false)?;
    assert!(deletion.report_deleted);

    let plan = h.settle(&[Phase::Optimistic])?;
    assert!(h.store.report(&iou_id).is_none());
    assert!(h.store.report_actions(&iou_id).is_empty());
    assert!(h.store.transaction(&info.transaction.transaction_id).is_none());
    let chat = report(&h, &chat_id)?;
    assert_eq!(chat.iou_report_id, None);
    assert!(!chat.has_outstanding_child_request);
    assert!(h.store.report_preview_action(&chat_id, &iou_id).is_none());
    assert!(h.recorder.events().contains(&Event::GoBack {
        fallback: Route::Report { report_id: chat_id.clone() }
    }));

    h.store.apply_phase(&plan, Phase::Failure);
    assert_eq!(report(&h, &iou_id)?.total, 1500);
    assert!(h.store.report_preview_action(&chat_id, &iou_id).is_some());

    Ok(())
}

#[test]
fn test_delete_one_of_two_requests_keeps_report() -> Result<()> {
    let mut h = Harness::new()?;
    let first = h.engine().request_money(None, &friend(), &request(1500))?;
    h.settle(&[Phase::Optimistic, Phase::Success])?;
    h.engine().request_money(None, &friend(), &request(500))?;
    h.settle(&[Phase::Optimistic, Phase::Success])?;

    let iou_id = first.iou_report.report_id.clone();
    let action = h
        .store
        .report_action(&iou_id, &first.iou_action.report_action_id)
        .ok_or_else(|| anyhow!("no action"))?;
    let deletion = h
        .engine()
        .delete_money_request(&first.transaction.transaction_id, &action, false)?;
    assert!(!deletion.report_deleted);

    h.settle(&[Phase::Optimistic])?;
    assert_eq!(report(&h, &iou_id)?.total, 500);
    let preview = h
        .store
        .report_preview_action(&first.chat_report.report_id, &iou_id)
        .ok_or_else(|| anyhow!("no preview"))?;
    assert_eq!(preview.child_money_request_count, Some(1));

    Ok(())
}

fn with_thread(h: &mut Harness, info: &MoneyRequestInformation) -> Result<String> {
    let thread = Report {
        report_id: "900".into(),
        parent_report_id: Some(info.iou_report.report_id.clone()),
        parent_report_action_id: Some(info.iou_action.report_action_id.clone()),
        ..Default::default()
    };
    h.store.insert(&keys::report("900"), &thread)?;
    Ok(thread.report_id)
}

#[test]
fn test_edit_in_other_currency_keeps_total() -> Result<()> {
    let mut h = Harness::new()?;
    let info = h.engine().request_money(None, &friend(), &request(1500))?;
    h.settle(&[Phase::Optimistic, Phase::Success])?;
    let thread_id = with_thread(&mut h, &info)?;

    h.engine().update_money_request_amount_and_currency(
        &info.transaction.transaction_id,
        &thread_id,
        2000,
        "EUR",
    )?;
    h.settle(&[Phase::Optimistic])?;

    assert_eq!(report(&h, &info.iou_report.report_id)?.total, 1500);
    let edited = h
        .store
        .transaction(&info.transaction.transaction_id)
        .ok_or_else(|| anyhow!("no transaction"))?;
    assert_eq!(edited.modified_amount, Some(2000));
    assert_eq!(edited.modified_currency.as_deref(), Some("EUR"));

    Ok(())
}

#[test]
fn test_edit_amount_moves_total_and_rolls_back() -> Result<()> {
    let mut h = Harness::new()?;
    let info = h.engine().request_money(None, &friend(), &request(1500))?;
    h.settle(&[Phase::Optimistic, Phase::Success])?;
    let thread_id = with_thread(&mut h, &info)?;

    let changes = TransactionChanges {
        amount: Change::Set(2000),
        ..Default::default()
    };
    h.engine()
        .edit_regular_money_request(&info.transaction.transaction_id, &thread_id, &changes)?;
    let plan = h.settle(&[Phase::Optimistic])?;
    assert_eq!(report(&h, &info.iou_report.report_id)?.total, 2000);
    assert_eq!(h.store.report_actions(&thread_id).len(), 1);

    h.store.apply_phase(&plan, Phase::Failure);
    assert_eq!(report(&h, &info.iou_report.report_id)?.total, 1500);
    let edited = h
        .store
        .transaction(&info.transaction.transaction_id)
        .ok_or_else(|| anyhow!("no transaction"))?;
    assert_eq!(edited.modified_amount, None);

    Ok(())
}

#[test]
fn test_edit_without_changes_fails() -> Result<()> {
    let h = Harness::new()?;
    let result = h
        .engine()
        .edit_regular_money_request("1", "900", &TransactionChanges::default());
    assert!(matches!(result, Err(Error::NoChanges)));

    Ok(())
}

#[test]
fn test_pay_settles_and_restores_on_failure() -> Result<()> {
    let mut h = Harness::new()?;
    let info = h.engine().request_money(None, &friend(), &request(1500))?;
    h.settle(&[Phase::Optimistic, Phase::Success])?;

    let chat = report(&h, &info.chat_report.report_id)?;
    let iou = report(&h, &info.iou_report.report_id)?;
    h.engine()
        .pay_money_request(PaymentType::Elsewhere, &chat, &iou)?;

    let (command, parameters, _) = h.last_write()?;
    assert_eq!(command, Command::PayMoneyRequest);
    assert_eq!(parameters.get("paymentMethodType"), Some("Elsewhere"));

    let plan = h.settle(&[Phase::Optimistic])?;
    assert!(report(&h, &iou.report_id)?.is_settled());
    assert_eq!(report(&h, &chat.report_id)?.iou_report_id, None);

    h.store.apply_phase(&plan, Phase::Failure);
    assert_eq!(report(&h, &iou.report_id)?.status_num, iou.status_num);
    assert_eq!(
        report(&h, &chat.report_id)?.iou_report_id,
        Some(iou.report_id.clone())
    );

    Ok(())
}

#[test]
fn test_send_money_creates_settled_report() -> Result<()> {
    let mut h = Harness::new()?;
    let recipient = Recipient {
        account_id: 5,
        login: "pal@example.com".into(),
        display_name: None,
    };
    h.engine()
        .send_money_elsewhere(None, 1000, "USD", "rent", &recipient)?;

    let (command, parameters, _) = h.last_write()?;
    assert_eq!(command, Command::SendMoneyElsewhere);
    assert!(parameters.get("createdReportActionID").is_some());
    let details: Value = serde_json::from_str(
        parameters
            .get("newIOUReportDetails")
            .ok_or_else(|| anyhow!("no details"))?,
    )?;
    assert_eq!(details["requestorAccountID"], 5);
    assert_eq!(details["amount"], 1000);

    h.settle(&[Phase::Optimistic])?;
    let iou_id = parameters.get("iouReportID").unwrap_or_default();
    let sent = report(&h, iou_id)?;
    assert!(sent.is_settled());
    assert_eq!(sent.total, 1000);
    assert!(h.store.person(5).is_some());

    Ok(())
}

#[test]
fn test_submit_then_approve_workspace_report() -> Result<()> {
    let mut h = Harness::new()?;
    let chat = h.workspace()?;
    let participant = Participant::policy_expense_chat("P1", "20", true);
    let info = h
        .engine()
        .request_money(Some(&chat), &participant, &request(1500))?;
    h.settle(&[Phase::Optimistic, Phase::Success])?;

    let expense = report(&h, &info.iou_report.report_id)?;
    h.engine().submit_report(&expense)?;
    let (command, parameters, _) = h.last_write()?;
    assert_eq!(command, Command::SubmitReport);
    assert_eq!(parameters.get("managerAccountID"), Some("9"));
    h.settle(&[Phase::Optimistic, Phase::Success])?;

    let submitted = report(&h, &expense.report_id)?;
    assert_eq!(submitted.state_num, StateNum::Submitted);
    assert!(!report(&h, "20")?.has_outstanding_child_request);

    h.engine().approve_money_request(&submitted)?;
    h.settle(&[Phase::Optimistic])?;
    assert!(report(&h, &expense.report_id)?.is_approved());

    Ok(())
}

#[test]
fn test_detach_receipt_restores_on_failure() -> Result<()> {
    let mut h = Harness::new()?;
    let transaction = Transaction {
        transaction_id: "70".into(),
        amount: 1200,
        currency: "USD".into(),
        receipt: Some(Receipt {
            source: Some("receipt.jpg".into()),
            filename: None,
            state: Some(ReceiptState::ScanComplete),
        }),
        filename: Some("receipt.jpg".into()),
        ..Default::default()
    };
    h.store.insert(&keys::transaction("70"), &transaction)?;

    h.engine().detach_receipt("70")?;
    let plan = h.settle(&[Phase::Optimistic])?;
    let detached = h.store.transaction("70").ok_or_else(|| anyhow!("gone"))?;
    assert!(!detached.has_receipt());
    assert_eq!(detached.filename, None);

    h.store.apply_phase(&plan, Phase::Failure);
    assert_eq!(h.store.transaction("70"), Some(transaction));

    Ok(())
}

#[test]
fn test_complete_split_keeps_unknown_people_email_only() -> Result<()> {
    let mut h = Harness::new()?;
    let stranger = Participant {
        login: Some("stranger@example.com".into()),
        ..Default::default()
    };
    let scan = MoneyRequest {
        receipt: Some(Receipt {
            source: Some("receipt.jpg".into()),
            filename: Some("receipt.jpg".into()),
            state: None,
        }),
        ..request(0)
    };
    let started = h.engine().start_split_bill(&[friend(), stranger], &scan, None)?;
    h.settle(&[Phase::Optimistic, Phase::Success])?;

    let chat_id = started.chat_report.report_id.clone();
    let split_action = h
        .store
        .report_action(&chat_id, &started.split_action.report_action_id)
        .ok_or_else(|| anyhow!("no split action"))?;
    let mut scanned = h
        .store
        .transaction(&started.transaction.transaction_id)
        .ok_or_else(|| anyhow!("no group transaction"))?;
    assert_eq!(scanned.comment.splits.len(), 3);
    scanned.modified_amount = Some(3001);

    let completed = h.engine().complete_split_bill(&chat_id, &split_action, &scanned)?;
    let people: Vec<_> = completed
        .splits
        .iter()
        .map(|s| (s.email.as_deref(), s.account_id, s.amount))
        .collect();
    assert_eq!(
        people,
        vec![
            (Some("me@example.com"), None, None),
            (Some("friend@example.com"), Some(2), Some(1000)),
            (Some("stranger@example.com"), None, None),
        ]
    );

    let (command, parameters, _) = h.last_write()?;
    assert_eq!(command, Command::CompleteSplitBill);
    assert_eq!(parameters.get("amount"), Some("3001"));

    h.settle(&[Phase::Optimistic, Phase::Success])?;
    assert_eq!(pending_markers(&h.store), 0);
    let receipt_state = h
        .store
        .transaction(&started.transaction.transaction_id)
        .and_then(|t| t.receipt)
        .and_then(|r| r.state);
    assert_eq!(receipt_state, Some(ReceiptState::Open));

    Ok(())
}

#[test]
fn test_split_from_global_create_opens_chat() -> Result<()> {
    let h = Harness::new()?;
    let info = h
        .engine()
        .split_bill_and_open_report(&[friend(), Participant::account(3, "pal@example.com")], &request(3000))?;
    assert!(info.is_new_chat_report);

    let (command, _, _) = h.last_write()?;
    assert_eq!(command, Command::SplitBillAndOpenReport);
    assert!(h.recorder.events().contains(&Event::DismissModal {
        target_report_id: Some(info.chat_report.report_id.clone())
    }));

    Ok(())
}

#[test]
fn test_distance_request_sends_waypoints() -> Result<()> {
    let mut h = Harness::new()?;
    let info = h.engine().create_distance_request(None, &friend(), &request(1200))?;

    let (command, parameters, _) = h.last_write()?;
    assert_eq!(command, Command::CreateDistanceRequest);
    let sent: Waypoints = serde_json::from_str(
        parameters
            .get("waypoints")
            .ok_or_else(|| anyhow!("no waypoints"))?,
    )?;
    assert_eq!(sent, empty_waypoints());

    h.settle(&[Phase::Optimistic])?;
    let transaction = h
        .store
        .transaction(&info.transaction.transaction_id)
        .ok_or_else(|| anyhow!("no transaction"))?;
    assert_eq!(transaction.merchant(), "Pending...");
    assert_eq!(transaction.waypoints(), Some(&empty_waypoints()));
    assert_eq!(
        transaction.receipt.and_then(|r| r.state),
        Some(ReceiptState::Open)
    );

    Ok(())
}

#[test]
fn test_distance_edit_waits_for_remote_total() -> Result<()> {
    let mut h = Harness::new()?;
    let info = h.engine().create_distance_request(None, &friend(), &request(1200))?;
    h.settle(&[Phase::Optimistic, Phase::Success])?;
    let thread_id = with_thread(&mut h, &info)?;
    let transaction_id = info.transaction.transaction_id.clone();

    let route: Waypoints = [
        ("waypoint0".to_owned(), Waypoint { address: Some("Home".into()), ..Default::default() }),
        ("waypoint1".to_owned(), Waypoint { address: Some("Office".into()), ..Default::default() }),
    ]
    .into_iter()
    .collect();
    let changes = TransactionChanges {
        waypoints: Change::Set(route.clone()),
        ..Default::default()
    };
    h.engine().update_distance_request(&transaction_id, &thread_id, &changes)?;
    let (command, _, _) = h.last_write()?;
    assert_eq!(command, Command::UpdateDistanceRequest);

    h.settle(&[Phase::Optimistic])?;
    assert_eq!(report(&h, &info.iou_report.report_id)?.total, 1200);
    assert!(h.store.report_actions(&thread_id).is_empty());
    let loading = h
        .store
        .transaction(&transaction_id)
        .ok_or_else(|| anyhow!("no transaction"))?;
    assert!(loading.is_loading);
    assert_eq!(loading.waypoints(), Some(&route));

    let (_, _, plan) = h.last_write()?;
    h.store.apply_phase(&plan, Phase::Success);
    let settled = h
        .store
        .transaction(&transaction_id)
        .ok_or_else(|| anyhow!("no transaction"))?;
    assert!(!settled.is_loading);

    Ok(())
}

#[test]
fn test_replace_receipt_restores_on_failure() -> Result<()> {
    let mut h = Harness::new()?;
    let transaction = Transaction {
        transaction_id: "71".into(),
        amount: 800,
        currency: "USD".into(),
        receipt: Some(Receipt {
            source: Some("old.jpg".into()),
            filename: None,
            state: Some(ReceiptState::ScanComplete),
        }),
        filename: Some("old.jpg".into()),
        ..Default::default()
    };
    h.store.insert(&keys::transaction("71"), &transaction)?;

    h.engine().replace_receipt("71", "blob:new", "new.png")?;
    let (command, parameters, _) = h.last_write()?;
    assert_eq!(command, Command::ReplaceReceipt);
    let sent: Value = serde_json::from_str(parameters.get("receipt").unwrap_or_default())?;
    assert_eq!(sent, json!({"source": "blob:new", "filename": "new.png"}));

    let plan = h.settle(&[Phase::Optimistic])?;
    let replaced = h.store.transaction("71").ok_or_else(|| anyhow!("gone"))?;
    assert_eq!(replaced.filename.as_deref(), Some("new.png"));
    assert_eq!(
        replaced.receipt,
        Some(Receipt {
            source: Some("blob:new".into()),
            filename: None,
            state: Some(ReceiptState::Open),
        })
    );

    h.store.apply_phase(&plan, Phase::Failure);
    assert_eq!(h.store.transaction("71"), Some(transaction));

    Ok(())
}

#[test]
fn test_workspace_category_moves_to_front() -> Result<()> {
    let mut h = Harness::new()?;
    let chat = h.workspace()?;
    let categories_key = keys::recently_used_categories("P1");
    h.store.insert(&categories_key, &["Meals", "Travel"])?;

    let participant = Participant::policy_expense_chat("P1", "20", true);
    let travel = MoneyRequest {
        category: Some("Travel".into()),
        ..request(1500)
    };
    h.engine().request_money(Some(&chat), &participant, &travel)?;

    let plan = h.settle(&[Phase::Optimistic])?;
    assert_eq!(h.store.recently_used_categories("P1"), vec!["Travel", "Meals"]);

    h.store.apply_phase(&plan, Phase::Failure);
    assert_eq!(h.store.recently_used_categories("P1"), vec!["Meals", "Travel"]);

    Ok(())
}

#[test]
fn test_workspace_tag_merges_into_its_list() -> Result<()> {
    let mut h = Harness::new()?;
    let chat = h.workspace()?;
    let policy = Policy {
        tag_list_name: Some("Department".into()),
        ..h.store.policy("P1").ok_or_else(|| anyhow!("no policy"))?
    };
    h.store.insert(&keys::policy("P1"), &policy)?;
    h.store.insert(
        &keys::recently_used_tags("P1"),
        &json!({"Department": ["Ops"], "Region": ["West"]}),
    )?;

    let participant = Participant::policy_expense_chat("P1", "20", true);
    let tagged = MoneyRequest {
        tag: Some("Engineering".into()),
        ..request(1500)
    };
    h.engine().request_money(Some(&chat), &participant, &tagged)?;

    let plan = h.settle(&[Phase::Optimistic])?;
    let tags = h.store.recently_used_tags("P1");
    assert_eq!(tags.get("Department"), Some(&vec!["Engineering".to_owned(), "Ops".to_owned()]));
    assert_eq!(tags.get("Region"), Some(&vec!["West".to_owned()]));

    h.store.apply_phase(&plan, Phase::Failure);
    let tags = h.store.recently_used_tags("P1");
    assert_eq!(tags.get("Department"), Some(&vec!["Ops".to_owned()]));

    Ok(())
}

#[test]
fn test_workspace_payment_method_is_remembered() -> Result<()> {
    let mut h = Harness::new()?;
    let chat = h.workspace()?;
    h.store
        .insert(keys::LAST_PAYMENT_METHOD, &json!({"P1": "Expensify", "P2": "ACH"}))?;
    let participant = Participant::policy_expense_chat("P1", "20", true);
    let info = h
        .engine()
        .request_money(Some(&chat), &participant, &request(1500))?;
    h.settle(&[Phase::Optimistic, Phase::Success])?;

    let chat = report(&h, "20")?;
    let expense = report(&h, &info.iou_report.report_id)?;
    h.engine()
        .pay_money_request(PaymentType::Elsewhere, &chat, &expense)?;

    let plan = h.settle(&[Phase::Optimistic])?;
    let methods = h.store.last_payment_methods();
    assert_eq!(methods.get("P1"), Some(&PaymentType::Elsewhere));
    assert_eq!(methods.get("P2"), Some(&PaymentType::Vbba));

    h.store.apply_phase(&plan, Phase::Failure);
    assert_eq!(
        h.store.last_payment_methods().get("P1"),
        Some(&PaymentType::Expensify)
    );

    Ok(())
}

#[test]
fn test_delete_clears_violations() -> Result<()> {
    let mut h = Harness::new()?;
    h.config.violations_enabled = true;
    let info = h.engine().request_money(None, &friend(), &request(1500))?;
    h.settle(&[Phase::Optimistic, Phase::Success])?;
    let transaction_id = info.transaction.transaction_id.clone();
    let violations = json!([{"name": "missingCategory", "type": "violation"}]);
    h.store
        .insert(&keys::transaction_violations(&transaction_id), &violations)?;

    let action = h
        .store
        .report_action(&info.iou_report.report_id, &info.iou_action.report_action_id)
        .ok_or_else(|| anyhow!("no action"))?;
    h.engine().delete_money_request(&transaction_id, &action, false)?;

    let plan = h.settle(&[Phase::Optimistic])?;
    assert_eq!(h.store.transaction_violations(&transaction_id), None);

    h.store.apply_phase(&plan, Phase::Failure);
    assert_eq!(h.store.transaction_violations(&transaction_id), Some(violations));

    Ok(())
}

#[test]
fn test_rejected_delete_restores_every_key() -> Result<()> {
    let mut h = Harness::new()?;
    let info = h.engine().request_money(None, &friend(), &request(1500))?;
    h.settle(&[Phase::Optimistic, Phase::Success])?;
    let pristine = h.store.clone();

    let action = h
        .store
        .report_action(&info.iou_report.report_id, &info.iou_action.report_action_id)
        .ok_or_else(|| anyhow!("no action"))?;
    let deletion = h
        .engine()
        .delete_money_request(&info.transaction.transaction_id, &action, false)?;
    assert!(deletion.report_deleted);

    h.settle(&[Phase::Optimistic, Phase::Failure])?;
    assert_rolled_back(&pristine, &h.store);
    // restored as stored, down to the emptied pending map
    let report_key = keys::report(&info.iou_report.report_id);
    assert_eq!(h.store.stored(&report_key).as_ref(), pristine.get(&report_key));

    Ok(())
}

#[test]
fn test_rejected_edit_restores_every_key() -> Result<()> {
    let mut h = Harness::new()?;
    let info = h.engine().request_money(None, &friend(), &request(1500))?;
    h.settle(&[Phase::Optimistic, Phase::Success])?;
    let thread_id = with_thread(&mut h, &info)?;
    let pristine = h.store.clone();

    let changes = TransactionChanges {
        amount: Change::Set(2500),
        merchant: Change::Set("Diner".into()),
        ..Default::default()
    };
    h.engine()
        .edit_regular_money_request(&info.transaction.transaction_id, &thread_id, &changes)?;

    h.settle(&[Phase::Optimistic, Phase::Failure])?;
    assert_rolled_back(&pristine, &h.store);

    Ok(())
}

#[test]
fn test_rejected_pay_restores_every_key() -> Result<()> {
    let mut h = Harness::new()?;
    let info = h.engine().request_money(None, &friend(), &request(1500))?;
    h.settle(&[Phase::Optimistic, Phase::Success])?;
    let pristine = h.store.clone();

    let chat = report(&h, &info.chat_report.report_id)?;
    let iou = report(&h, &info.iou_report.report_id)?;
    h.engine()
        .pay_money_request(PaymentType::Expensify, &chat, &iou)?;

    h.settle(&[Phase::Optimistic, Phase::Failure])?;
    assert_rolled_back(&pristine, &h.store);

    Ok(())
}

#[test]
fn test_state_changes_are_pending_until_confirmed() -> Result<()> {
    let mut h = Harness::new()?;
    let chat = h.workspace()?;
    let participant = Participant::policy_expense_chat("P1", "20", true);
    let info = h
        .engine()
        .request_money(Some(&chat), &participant, &request(1500))?;
    h.settle(&[Phase::Optimistic, Phase::Success])?;
    let report_id = info.iou_report.report_id.clone();

    h.engine().approve_money_request(&report(&h, &report_id)?)?;
    h.settle(&[Phase::Optimistic])?;
    let approving = report(&h, &report_id)?;
    assert_eq!(approving.pending_fields.get("stateNum"), Some(&PendingAction::Update));
    assert_eq!(approving.pending_fields.get("statusNum"), Some(&PendingAction::Update));

    let (_, _, plan) = h.last_write()?;
    h.store.apply_phase(&plan, Phase::Success);
    assert!(report(&h, &report_id)?.pending_fields.is_empty());
    assert_eq!(pending_markers(&h.store), 0);

    let chat = report(&h, "20")?;
    h.engine()
        .pay_money_request(PaymentType::Elsewhere, &chat, &report(&h, &report_id)?)?;
    h.settle(&[Phase::Optimistic])?;
    assert!(report(&h, &report_id)?.pending_fields.contains_key("statusNum"));
    let (_, _, plan) = h.last_write()?;
    h.store.apply_phase(&plan, Phase::Success);
    assert_eq!(pending_markers(&h.store), 0);

    Ok(())
}
