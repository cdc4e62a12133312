//! The narrow interfaces the engine drives once a plan is built.

use std::{cell::RefCell, collections::BTreeMap, fmt::Display};

use serde::Serialize;
use tracing::*;

use crate::{model::AccountId, model::IouType, MutationPlan, Result};

/// Remote commands, named as the authority knows them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Command {
    RequestMoney,
    CreateDistanceRequest,
    SplitBill,
    SplitBillAndOpenReport,
    StartSplitBill,
    CompleteSplitBill,
    EditMoneyRequest,
    UpdateMoneyRequestDate,
    UpdateDistanceRequest,
    UpdateMoneyRequestAmountAndCurrency,
    DeleteMoneyRequest,
    SendMoneyElsewhere,
    SendMoneyWithWallet,
    PayMoneyRequest,
    PayMoneyRequestWithWallet,
    ApproveMoneyRequest,
    SubmitReport,
    DetachReceipt,
    ReplaceReceipt,
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Flat string parameters; structured values are serialized to JSON text.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Parameters(BTreeMap<String, String>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_owned(), value.into());
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.insert(key, value.to_string());
        self
    }

    pub fn with_opt(mut self, key: &str, value: Option<impl ToString>) -> Self {
        if let Some(value) = value {
            self.insert(key, value.to_string());
        }
        self
    }

    pub fn insert_json<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        self.insert(key, serde_json::to_string(value)?);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

pub trait Dispatcher {
    /// Hands off a command with its plan. Retries and ordering are the
    /// dispatcher's business; this returns before the authority answers.
    fn write(&self, command: Command, parameters: Parameters, plan: MutationPlan);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Route {
    Report { report_id: String },
    MoneyRequestParticipants { iou_type: IouType, report_id: String },
    MoneyRequestConfirmation { iou_type: IouType, report_id: String },
}

pub trait Navigator {
    fn dismiss_modal(&self, target_report_id: Option<&str>);

    fn navigate(&self, route: Route);

    fn go_back(&self, fallback: Route);
}

pub trait Notifier {
    fn notify_new_action(&self, report_id: &str, account_id: AccountId);
}

/// Something the engine asked a collaborator to do.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Event {
    Write {
        command: Command,
        parameters: Parameters,
        plan: MutationPlan,
    },
    DismissModal {
        target_report_id: Option<String>,
    },
    Navigate {
        route: Route,
    },
    GoBack {
        fallback: Route,
    },
    NotifyNewAction {
        report_id: String,
        account_id: AccountId,
    },
}

/// Keeps every request in order, for tests and dry runs.
#[derive(Debug, Default)]
pub struct Recorder {
    events: RefCell<Vec<Event>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    pub fn writes(&self) -> Vec<(Command, Parameters, MutationPlan)> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                Event::Write {
                    command,
                    parameters,
                    plan,
                } => Some((*command, parameters.clone(), plan.clone())),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Event) {
        debug!("{:?}", event);
        self.events.borrow_mut().push(event);
    }
}

impl Dispatcher for Recorder {
    fn write(&self, command: Command, parameters: Parameters, plan: MutationPlan) {
        self.push(Event::Write {
            command,
            parameters,
            plan,
        });
    }
}

impl Navigator for Recorder {
    fn dismiss_modal(&self, target_report_id: Option<&str>) {
        self.push(Event::DismissModal {
            target_report_id: target_report_id.map(str::to_owned),
        });
    }

    fn navigate(&self, route: Route) {
        self.push(Event::Navigate { route });
    }

    fn go_back(&self, fallback: Route) {
        self.push(Event::GoBack { fallback });
    }
}

impl Notifier for Recorder {
    fn notify_new_action(&self, report_id: &str, account_id: AccountId) {
        self.push(Event::NotifyNewAction {
            report_id: report_id.to_owned(),
            account_id,
        });
    }
}
