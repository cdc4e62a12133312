use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type AccountId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingAction {
    Add,
    Update,
    Delete,
}

pub type PendingFields = BTreeMap<String, PendingAction>;

/// Errors keyed by a microsecond timestamp, newest last.
pub type ErrorMap = BTreeMap<String, Option<ErrorValue>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorValue {
    Message(String),
    Receipt(ReceiptError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptError {
    pub error: String,
    pub source: String,
    pub filename: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    #[default]
    Chat,
    Iou,
    Expense,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChatType {
    PolicyExpenseChat,
    Group,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateNum {
    #[default]
    Open,
    Submitted,
    Approved,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusNum {
    #[default]
    Open,
    Submitted,
    Closed,
    Approved,
    Reimbursed,
}

/// Chats and money reports share one collection and one shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    #[serde(rename = "reportID")]
    pub report_id: String,
    #[serde(rename = "type", default)]
    pub report_type: ReportType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_type: Option<ChatType>,
    #[serde(rename = "policyID", default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_name: Option<String>,
    #[serde(rename = "ownerAccountID", default, skip_serializing_if = "Option::is_none")]
    pub owner_account_id: Option<AccountId>,
    #[serde(rename = "managerID", default, skip_serializing_if = "Option::is_none")]
    pub manager_id: Option<AccountId>,
    #[serde(rename = "participantAccountIDs", default, skip_serializing_if = "Vec::is_empty")]
    pub participant_account_ids: Vec<AccountId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default)]
    pub total: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_total: Option<String>,
    #[serde(default)]
    pub state_num: StateNum,
    #[serde(default)]
    pub status_num: StatusNum,
    #[serde(rename = "chatReportID", default, skip_serializing_if = "Option::is_none")]
    pub chat_report_id: Option<String>,
    #[serde(rename = "parentReportID", default, skip_serializing_if = "Option::is_none")]
    pub parent_report_id: Option<String>,
    #[serde(rename = "parentReportActionID", default, skip_serializing_if = "Option::is_none")]
    pub parent_report_action_id: Option<String>,
    #[serde(rename = "iouReportID", default, skip_serializing_if = "Option::is_none")]
    pub iou_report_id: Option<String>,
    #[serde(default)]
    pub has_outstanding_child_request: bool,
    #[serde(default)]
    pub is_own_policy_expense_chat: bool,
    #[serde(default)]
    pub is_waiting_on_bank_account: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_read_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_visible_action_created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_html: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_action: Option<PendingAction>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pending_fields: PendingFields,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub error_fields: BTreeMap<String, ErrorMap>,
}

impl Report {
    pub fn is_expense_report(&self) -> bool {
        self.report_type == ReportType::Expense
    }

    pub fn is_iou_report(&self) -> bool {
        self.report_type == ReportType::Iou
    }

    pub fn is_money_request_report(&self) -> bool {
        self.is_expense_report() || self.is_iou_report()
    }

    pub fn is_policy_expense_chat(&self) -> bool {
        self.chat_type == Some(ChatType::PolicyExpenseChat)
    }

    pub fn is_group_chat(&self) -> bool {
        self.chat_type == Some(ChatType::Group)
    }

    pub fn is_draft(&self) -> bool {
        self.state_num == StateNum::Open && self.status_num == StatusNum::Open
    }

    pub fn is_approved(&self) -> bool {
        self.state_num == StateNum::Approved && self.status_num == StatusNum::Approved
    }

    pub fn is_settled(&self) -> bool {
        self.status_num == StatusNum::Reimbursed
    }

    pub fn currency(&self) -> &str {
        self.currency.as_deref().unwrap_or_default()
    }

    /// Participants other than `account_id`.
    pub fn others(&self, account_id: AccountId) -> Vec<AccountId> {
        self.participant_account_ids
            .iter()
            .copied()
            .filter(|id| *id != account_id)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReceiptState {
    ScanReady,
    Scanning,
    ScanComplete,
    ScanFailed,
    Open,
}

impl ReceiptState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptState::ScanReady => "SCANREADY",
            ReceiptState::Scanning => "SCANNING",
            ReceiptState::ScanComplete => "SCANCOMPLETE",
            ReceiptState::ScanFailed => "SCANFAILED",
            ReceiptState::Open => "OPEN",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ReceiptState>,
}

impl Receipt {
    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.filename.is_none() && self.state.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

/// Keyed `waypoint0`, `waypoint1`, ...
pub type Waypoints = BTreeMap<String, Waypoint>;

pub fn empty_waypoints() -> Waypoints {
    [
        ("waypoint0".to_owned(), Waypoint::default()),
        ("waypoint1".to_owned(), Waypoint::default()),
    ]
    .into_iter()
    .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Manual,
    Scan,
    Distance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IouType {
    Request,
    Send,
    Split,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionComment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub waypoints: Option<Waypoints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(rename = "originalTransactionID", default, skip_serializing_if = "Option::is_none")]
    pub original_transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub splits: Vec<SplitShare>,
}

/// One entry of a split: who owes which share, and where it landed. Pending
/// splits only know the email and account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitShare {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "accountID", default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(rename = "policyID", default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    #[serde(rename = "iouReportID", default, skip_serializing_if = "Option::is_none")]
    pub iou_report_id: Option<String>,
    #[serde(rename = "chatReportID", default, skip_serializing_if = "Option::is_none")]
    pub chat_report_id: Option<String>,
    #[serde(rename = "transactionID", default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(rename = "reportActionID", default, skip_serializing_if = "Option::is_none")]
    pub report_action_id: Option<String>,
    #[serde(rename = "createdChatReportActionID", default, skip_serializing_if = "Option::is_none")]
    pub created_chat_report_action_id: Option<String>,
    #[serde(rename = "createdIOUReportActionID", default, skip_serializing_if = "Option::is_none")]
    pub created_iou_report_action_id: Option<String>,
    #[serde(rename = "reportPreviewReportActionID", default, skip_serializing_if = "Option::is_none")]
    pub report_preview_report_action_id: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_new_chat: bool,
    #[serde(rename = "isNewIOUReport", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_new_iou_report: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(rename = "transactionID")]
    pub transaction_id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(rename = "reportID", default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    #[serde(default)]
    pub comment: TransactionComment,
    #[serde(default)]
    pub created: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub billable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reimbursable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<Receipt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_merchant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_waypoints: Option<Waypoints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tax_amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iou_request_type: Option<RequestType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participants: Vec<Participant>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_from_global_create: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_loading: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_action: Option<PendingAction>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pending_fields: PendingFields,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub error_fields: BTreeMap<String, ErrorMap>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: ErrorMap,
}

impl Transaction {
    /// Amount as shown to the user; expense reports store amounts negated.
    pub fn amount(&self, is_from_expense_report: bool) -> i64 {
        let amount = match self.modified_amount {
            Some(modified) if modified != 0 => modified,
            _ => self.amount,
        };
        if is_from_expense_report {
            -amount
        } else {
            amount.abs()
        }
    }

    pub fn currency(&self) -> &str {
        match &self.modified_currency {
            Some(currency) if !currency.is_empty() => currency,
            _ => &self.currency,
        }
    }

    pub fn created(&self) -> &str {
        match &self.modified_created {
            Some(created) if !created.is_empty() => created,
            _ => &self.created,
        }
    }

    pub fn merchant(&self) -> &str {
        match &self.modified_merchant {
            Some(merchant) if !merchant.is_empty() => merchant,
            _ => self.merchant.as_deref().unwrap_or_default(),
        }
    }

    pub fn description(&self) -> &str {
        self.comment.comment.as_deref().unwrap_or_default()
    }

    pub fn waypoints(&self) -> Option<&Waypoints> {
        self.modified_waypoints
            .as_ref()
            .or(self.comment.waypoints.as_ref())
    }

    pub fn has_receipt(&self) -> bool {
        self.receipt.as_ref().map_or(false, |r| r.source.is_some())
    }

    pub fn is_receipt_being_scanned(&self) -> bool {
        self.has_receipt()
            && matches!(
                self.receipt.as_ref().and_then(|r| r.state),
                Some(ReceiptState::ScanReady) | Some(ReceiptState::Scanning)
            )
    }

    pub fn is_distance_request(&self) -> bool {
        self.iou_request_type == Some(RequestType::Distance) || self.comment.waypoints.is_some()
    }

    pub fn is_reimbursable(&self) -> bool {
        self.reimbursable.unwrap_or(true)
    }

    pub fn receipt_filename(&self) -> Option<&str> {
        self.filename
            .as_deref()
            .or_else(|| self.receipt.as_ref().and_then(|r| r.filename.as_deref()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionName {
    #[default]
    Created,
    Iou,
    ReportPreview,
    Approved,
    Submitted,
    ModifiedExpense,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IouActionType {
    Create,
    Split,
    Pay,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentType {
    Expensify,
    #[serde(rename = "ACH")]
    Vbba,
    Elsewhere,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Expensify => "Expensify",
            PaymentType::Vbba => "ACH",
            PaymentType::Elsewhere => "Elsewhere",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub html: String,
    #[serde(default)]
    pub is_edited: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_deleted_parent_action: bool,
}

impl Message {
    pub fn comment(text: &str) -> Self {
        Self {
            kind: "COMMENT".into(),
            text: text.to_owned(),
            html: text.to_owned(),
            is_edited: false,
            is_deleted_parent_action: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IouDetails {
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub iou_type: Option<IouActionType>,
    #[serde(rename = "IOUTransactionID", default, skip_serializing_if = "Option::is_none")]
    pub iou_transaction_id: Option<String>,
    #[serde(rename = "IOUReportID", default, skip_serializing_if = "Option::is_none")]
    pub iou_report_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_type: Option<PaymentType>,
    #[serde(rename = "participantAccountIDs", default, skip_serializing_if = "Vec::is_empty")]
    pub participant_account_ids: Vec<AccountId>,
    #[serde(rename = "IOUDetails", default, skip_serializing_if = "Option::is_none")]
    pub iou_details: Option<IouDetails>,
    #[serde(rename = "linkedReportID", default, skip_serializing_if = "Option::is_none")]
    pub linked_report_id: Option<String>,
    #[serde(rename = "expenseReportID", default, skip_serializing_if = "Option::is_none")]
    pub expense_report_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub modified: BTreeMap<String, ModifiedField>,
}

/// Old and new value of one field changed by an edit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModifiedField {
    #[serde(default)]
    pub old: String,
    #[serde(default)]
    pub new: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportAction {
    #[serde(rename = "reportActionID")]
    pub report_action_id: String,
    #[serde(rename = "reportID", default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    pub action_name: ActionName,
    #[serde(rename = "actorAccountID", default, skip_serializing_if = "Option::is_none")]
    pub actor_account_id: Option<AccountId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_email: Option<String>,
    #[serde(default)]
    pub created: String,
    /// Causal order within a container; ties on `created` are broken by this.
    #[serde(default)]
    pub sequence: u64,
    #[serde(default)]
    pub message: Vec<Message>,
    #[serde(default)]
    pub original_message: OriginalMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt: Option<Receipt>,
    #[serde(rename = "childReportID", default, skip_serializing_if = "Option::is_none")]
    pub child_report_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_money_request_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_last_money_request_comment: Option<String>,
    #[serde(
        rename = "childRecentReceiptTransactionIDs",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub child_recent_receipt_transaction_ids: BTreeMap<String, String>,
    #[serde(rename = "whisperedToAccountIDs", default)]
    pub whispered_to_account_ids: Vec<AccountId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_action: Option<PendingAction>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: ErrorMap,
}

impl ReportAction {
    pub fn text(&self) -> &str {
        self.message.first().map_or("", |m| m.text.as_str())
    }

    pub fn html(&self) -> &str {
        self.message.first().map_or("", |m| m.html.as_str())
    }

    pub fn is_money_request(&self) -> bool {
        self.action_name == ActionName::Iou
            && matches!(
                self.original_message.iou_type,
                Some(IouActionType::Create) | Some(IouActionType::Split)
            )
    }

    pub fn is_deleted(&self) -> bool {
        self.pending_action == Some(PendingAction::Delete)
            || self
                .message
                .first()
                .map_or(true, |m| m.text.is_empty() && m.html.is_empty())
    }

    pub fn is_deleted_parent_action(&self) -> bool {
        self.message
            .first()
            .map_or(false, |m| m.is_deleted_parent_action)
            && self.child_visible_action_count() > 0
    }

    fn child_visible_action_count(&self) -> u32 {
        self.child_money_request_count.unwrap_or_default()
    }

    /// Whether this action can stand as a thread's last visible message.
    pub fn is_visible_as_last_message(&self) -> bool {
        self.action_name != ActionName::Created && !self.is_deleted()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(rename = "accountID", default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<AccountId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "policyID", default, skip_serializing_if = "Option::is_none")]
    pub policy_id: Option<String>,
    #[serde(rename = "reportID", default, skip_serializing_if = "Option::is_none")]
    pub report_id: Option<String>,
    #[serde(rename = "chatReportID", default, skip_serializing_if = "Option::is_none")]
    pub chat_report_id: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_policy_expense_chat: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_own_policy_expense_chat: bool,
}

impl Participant {
    pub fn account(account_id: AccountId, login: &str) -> Self {
        Self {
            account_id: Some(account_id),
            login: Some(login.to_owned()),
            ..Default::default()
        }
    }

    pub fn policy_expense_chat(policy_id: &str, report_id: &str, is_own: bool) -> Self {
        Self {
            policy_id: Some(policy_id.to_owned()),
            report_id: Some(report_id.to_owned()),
            is_policy_expense_chat: true,
            is_own_policy_expense_chat: is_own,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalDetails {
    #[serde(rename = "accountID")]
    pub account_id: AccountId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_optimistic_personal_detail: bool,
}

impl PersonalDetails {
    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.login.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyType {
    #[default]
    Personal,
    Team,
    Corporate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub policy_type: PolicyType,
    #[serde(rename = "ownerAccountID", default)]
    pub owner_account_id: Option<AccountId>,
    #[serde(default)]
    pub is_harvesting_enabled: bool,
    #[serde(default)]
    pub tag_list_name: Option<String>,
}

impl Policy {
    pub fn is_paid_group_policy(&self) -> bool {
        matches!(self.policy_type, PolicyType::Team | PolicyType::Corporate)
    }

    /// Reports on these policies wait for an explicit submit.
    pub fn needs_manual_submit(&self) -> bool {
        self.is_paid_group_policy() && !self.is_harvesting_enabled
    }
}
