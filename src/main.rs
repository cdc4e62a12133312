use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use std::{path::PathBuf, time::Instant};
use tracing::*;
use tracing_subscriber::prelude::*;

use iou_ledger::{
    changes::{Change, TransactionChanges},
    clock::{RandomIds, SystemClock},
    collaborators::Recorder,
    config::Configuration,
    engine::{Collaborators, Context, Engine, MoneyRequest, Recipient},
    ledger::Ledger,
    messages::Messages,
    model::{AccountId, Participant, PaymentType, Receipt, Report},
    money::{calculate_amount, parse_amount, to_display_string},
    plan::Phase,
    store::{MemoryStore, Store},
};

mod summary;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Snapshot files to load; later files win per key.
    #[arg(short, long, value_name = "GLOB")]
    snapshot: Option<String>,
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print plans as JSON instead of a summary.
    #[arg(long)]
    json: bool,
    /// Apply the optimistic patches and print the resulting store.
    #[arg(long)]
    apply: bool,
    #[arg(long)]
    width: Option<u16>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Args)]
struct RequestArgs {
    amount: String,
    /// Account of the person paying; omit for a workspace chat.
    #[arg(long)]
    account: Option<AccountId>,
    #[arg(long)]
    login: Option<String>,
    /// Chat or report the request starts from.
    #[arg(short, long)]
    report: Option<String>,
    #[arg(long)]
    currency: Option<String>,
    #[arg(long, default_value = "")]
    comment: String,
    #[arg(long, default_value = "")]
    merchant: String,
    #[arg(long, default_value = "")]
    created: String,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    tag: Option<String>,
    #[arg(long)]
    billable: Option<bool>,
    #[arg(long)]
    receipt: Option<String>,
}

#[derive(Debug, Args)]
struct EditArgs {
    transaction: String,
    thread: String,
    #[arg(long)]
    amount: Option<String>,
    #[arg(long)]
    currency: Option<String>,
    #[arg(long)]
    comment: Option<String>,
    #[arg(long)]
    merchant: Option<String>,
    #[arg(long)]
    created: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    tag: Option<String>,
    #[arg(long)]
    billable: Option<bool>,
}

#[derive(Subcommand)]
enum Commands {
    Request(RequestArgs),
    Distance(RequestArgs),
    Split {
        amount: String,
        /// People to split with, as ACCOUNT:LOGIN.
        #[arg(long = "with", required = true)]
        with: Vec<String>,
        #[arg(long)]
        chat: Option<String>,
        #[arg(long)]
        currency: Option<String>,
        #[arg(long, default_value = "")]
        comment: String,
    },
    Edit(EditArgs),
    Delete {
        report: String,
        action: String,
        #[arg(long)]
        single: bool,
    },
    Pay {
        report: String,
        #[arg(long)]
        wallet: bool,
    },
    Send {
        amount: String,
        #[arg(long)]
        account: AccountId,
        #[arg(long)]
        login: String,
        #[arg(long)]
        currency: Option<String>,
        #[arg(long, default_value = "")]
        comment: String,
        #[arg(long)]
        wallet: bool,
    },
    Submit {
        report: String,
    },
    Approve {
        report: String,
    },
    DetachReceipt {
        transaction: String,
    },
    SplitAmount {
        amount: String,
        #[arg(long)]
        people: usize,
        #[arg(long)]
        currency: Option<String>,
    },
}

fn changed<T>(value: Option<T>, is_empty: impl Fn(&T) -> bool) -> Change<T> {
    match value {
        Some(value) if is_empty(&value) => Change::Cleared,
        Some(value) => Change::Set(value),
        None => Change::Unchanged,
    }
}

/// Without an account the request goes to the workspace behind `report`.
fn payer(account: Option<AccountId>, login: Option<&str>, report: Option<&Report>) -> Participant {
    match (account, report) {
        (None, Some(report)) if report.is_policy_expense_chat() => Participant::policy_expense_chat(
            report.policy_id.as_deref().unwrap_or_default(),
            &report.report_id,
            report.is_own_policy_expense_chat,
        ),
        _ => Participant {
            account_id: account,
            login: login.map(str::to_owned),
            ..Default::default()
        },
    }
}

fn main() -> Result<()> {
    fn get_rust_log() -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into())
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(get_rust_log()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Configuration::load(path)?,
        None => Configuration::default(),
    };
    let messages = Messages::new(&config.messages)?;
    let currency_or_default = |c: &Option<String>| c.clone().unwrap_or_else(|| config.default_currency.clone());

    if let Commands::SplitAmount {
        amount,
        people,
        currency,
    } = &cli.command
    {
        let currency = currency_or_default(currency);
        let total = parse_amount(amount, &currency)?;
        let mine = calculate_amount(*people, total, &currency, true);
        let theirs = calculate_amount(*people, total, &currency, false);
        println!("me       {}", to_display_string(mine, &currency));
        println!("each of {} {}", people, to_display_string(theirs, &currency));
        return Ok(());
    }

    let store = {
        let _span = span!(Level::INFO, "loading").entered();
        let started = Instant::now();
        let store = match &cli.snapshot {
            Some(pattern) => MemoryStore::load_glob(pattern)?,
            None => MemoryStore::new(),
        };
        info!("loaded {} keys in {:?}", store.len(), Instant::now() - started);
        store
    };

    let clock = SystemClock::default();
    let ids = RandomIds::new(&clock);
    let recorder = Recorder::new();
    let engine = Engine::new(
        Context {
            ledger: &store,
            config: &config,
            messages: &messages,
            clock: &clock,
            ids: &ids,
        },
        Collaborators {
            dispatcher: &recorder,
            navigator: &recorder,
            notifier: &recorder,
        },
    );
    let find_report = |id: &str| store.report(id).ok_or_else(|| anyhow!("no report {}", id));

    match &cli.command {
        Commands::Request(args) | Commands::Distance(args) => {
            let report = args.report.as_deref().map(find_report).transpose()?;
            let currency = currency_or_default(&args.currency);
            let request = MoneyRequest {
                amount: parse_amount(&args.amount, &currency)?,
                currency,
                comment: args.comment.clone(),
                created: args.created.clone(),
                merchant: args.merchant.clone(),
                receipt: args.receipt.as_ref().map(|source| Receipt {
                    source: Some(source.clone()),
                    filename: Some(source.clone()),
                    state: None,
                }),
                category: args.category.clone(),
                tag: args.tag.clone(),
                billable: args.billable,
                ..Default::default()
            };
            let participant = payer(args.account, args.login.as_deref(), report.as_ref());
            if matches!(cli.command, Commands::Distance(_)) {
                engine.create_distance_request(report.as_ref(), &participant, &request)?;
            } else {
                engine.request_money(report.as_ref(), &participant, &request)?;
            }
        }
        Commands::Split {
            amount,
            with,
            chat,
            currency,
            comment,
        } => {
            let currency = currency_or_default(currency);
            let participants = with
                .iter()
                .map(|pair| {
                    let (account, login) = pair
                        .split_once(':')
                        .ok_or_else(|| anyhow!("expected ACCOUNT:LOGIN, got {}", pair))?;
                    Ok(Participant::account(account.parse()?, login))
                })
                .collect::<Result<Vec<_>>>()?;
            let request = MoneyRequest {
                amount: parse_amount(amount, &currency)?,
                currency,
                comment: comment.clone(),
                ..Default::default()
            };
            engine.split_bill(&participants, &request, chat.as_deref())?;
        }
        Commands::Edit(args) => {
            let transaction = store
                .transaction(&args.transaction)
                .ok_or_else(|| anyhow!("no transaction {}", args.transaction))?;
            let currency = args
                .currency
                .clone()
                .unwrap_or_else(|| transaction.currency().to_owned());
            let changes = TransactionChanges {
                amount: args
                    .amount
                    .as_deref()
                    .map(|a| parse_amount(a, &currency))
                    .transpose()?
                    .into(),
                currency: args.currency.clone().into(),
                comment: changed(args.comment.clone(), String::is_empty),
                merchant: changed(args.merchant.clone(), String::is_empty),
                created: args.created.clone().into(),
                category: changed(args.category.clone(), String::is_empty),
                tag: changed(args.tag.clone(), String::is_empty),
                billable: args.billable.into(),
                ..Default::default()
            };
            engine.edit_money_request(&transaction, &args.thread, &changes)?;
        }
        Commands::Delete {
            report,
            action,
            single,
        } => {
            let action = store
                .report_action(report, action)
                .ok_or_else(|| anyhow!("no action {} in {}", action, report))?;
            let transaction_id = action
                .original_message
                .iou_transaction_id
                .clone()
                .ok_or_else(|| anyhow!("action {} has no transaction", action.report_action_id))?;
            let deletion = engine.delete_money_request(&transaction_id, &action, *single)?;
            info!(?deletion, "deleted");
        }
        Commands::Pay { report, wallet } => {
            let iou_report = find_report(report)?;
            let chat = find_report(iou_report.chat_report_id.as_deref().unwrap_or_default())?;
            let payment_type = if *wallet {
                PaymentType::Expensify
            } else {
                PaymentType::Elsewhere
            };
            engine.pay_money_request(payment_type, &chat, &iou_report)?;
        }
        Commands::Send {
            amount,
            account,
            login,
            currency,
            comment,
            wallet,
        } => {
            let currency = currency_or_default(currency);
            let recipient = Recipient {
                account_id: *account,
                login: login.clone(),
                display_name: None,
            };
            let amount = parse_amount(amount, &currency)?;
            if *wallet {
                engine.send_money_with_wallet(None, amount, &currency, comment, &recipient)?;
            } else {
                engine.send_money_elsewhere(None, amount, &currency, comment, &recipient)?;
            }
        }
        Commands::Submit { report } => engine.submit_report(&find_report(report)?)?,
        Commands::Approve { report } => engine.approve_money_request(&find_report(report)?)?,
        Commands::DetachReceipt { transaction } => engine.detach_receipt(transaction)?,
        Commands::SplitAmount { .. } => {}
    }

    let format = summary::Format::new(cli.width);
    let mut applied = store.clone();
    for (command, parameters, plan) in recorder.writes() {
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "command": command,
                    "parameters": parameters,
                    "plan": plan,
                }))?
            );
        } else {
            summary::print_write(command, &parameters, &plan, &format);
        }
        applied.apply_phase(&plan, Phase::Optimistic);
    }

    if cli.apply {
        println!("{}", serde_json::to_string_pretty(&applied)?);
    }

    Ok(())
}
