use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures that stop a mutation before any patch is built.
#[derive(Debug, Error)]
pub enum Error {
    #[error("amount must be positive, got {0}")]
    InvalidAmount(i64),
    #[error("unparseable amount {0:?}")]
    MalformedAmount(String),
    #[error("unknown currency {0:?}")]
    UnknownCurrency(String),
    #[error("participant has neither an account id nor a login")]
    UnresolvableParticipant,
    #[error("split needs at least one participant besides the current user")]
    NoSplitParticipants,
    #[error("report {0} not found")]
    ReportNotFound(String),
    #[error("report {0} is not a money request report")]
    NotMoneyRequestReport(String),
    #[error("transaction {0} not found")]
    TransactionNotFound(String),
    #[error("report action {0} not found")]
    ReportActionNotFound(String),
    #[error("policy {0} not found")]
    PolicyNotFound(String),
    #[error("nothing to change")]
    NoChanges,
    #[error("invalid timezone {0:?}")]
    InvalidTimezone(String),
    #[error("json error")]
    Json(#[from] serde_json::Error),
    #[error("template error")]
    Template(#[from] tera::Error),
}
