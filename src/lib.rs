pub mod builders;
pub mod changes;
pub mod clock;
pub mod collaborators;
pub mod config;
pub mod drafts;
pub mod engine;
pub mod error;
pub mod keys;
pub mod ledger;
pub mod messages;
pub mod model;
pub mod money;
pub mod plan;
pub mod queue;
pub mod recalc;
pub mod store;

pub use error::{Error, Result};
pub use plan::MutationPlan;
