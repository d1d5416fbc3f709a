mod cli;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use clap::Parser;
use rust_decimal::Decimal;
use std::path::Path;
use tracing_subscriber::EnvFilter;

use stack::aggregate::{RewardsRange, summarize_from};
use stack::config::{AppConfig, app_paths, load_or_init_config, now_utc, write_config};
use stack::db::Db;
use stack::domain::{CARD_TEMPLATES, CardId, CreditCard, RewardRule, Wallet, find_template};
use stack::ledger::{self, NewTransaction, parse_amount, round_currency};
use stack::remote::{NewRecord, RemoteClient};
use stack::store::{Store, TransactionFilter};

use crate::cli::{BestArgs, CardAddArgs, CardCmd, Cli, Command, RemoteCmd, RewardsArgs, TxnCmd};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("STACK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let paths = app_paths(cli.home.clone())?;
    let (mut cfg, cfg_path) = load_or_init_config(&paths)?;
    let (mut db, db_path) = Db::open(&paths).context("Failed to open the local store")?;
    let mut wallet = db
        .load_wallet()
        .with_context(|| format!("Failed to load cards from {}", db_path.display()))?;

    match cli.command {
        Command::Card(args) => handle_card(args.cmd, &mut db, &mut wallet, &cfg),
        Command::Txn(args) => handle_txn(args.cmd, &mut db, &mut wallet, &cfg),
        Command::Best(args) => handle_best(args, &wallet, &cfg),
        Command::Rewards(args) => handle_rewards(args, &db, &cfg),
        Command::Remote(args) => handle_remote(args.cmd, &db, &mut cfg, &cfg_path),
    }
}

fn money(cfg: &AppConfig, amount: Decimal) -> String {
    let rounded = round_currency(amount);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-{}{:.2}", cfg.currency_symbol, rounded.abs())
    } else {
        format!("{}{:.2}", cfg.currency_symbol, rounded.abs())
    }
}

/// Cashback with an explicit sign; refunds earn negative cashback.
fn signed(cfg: &AppConfig, amount: Decimal) -> String {
    let text = money(cfg, amount);
    if text.starts_with('-') {
        text
    } else {
        format!("+{text}")
    }
}

fn percent(multiplier: Decimal) -> String {
    format!("{}%", (multiplier * Decimal::ONE_HUNDRED).normalize())
}

fn describe_rules(card: &CreditCard) -> String {
    if card.rewards().is_empty() {
        return "(none)".to_string();
    }
    card.rewards()
        .iter()
        .map(|r| format!("{} {}", r.category, percent(r.multiplier)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn short_id(id: impl ToString) -> String {
    id.to_string().chars().take(8).collect()
}

fn resolve_card(wallet: &Wallet, needle: &str) -> Result<CardId> {
    wallet
        .find(needle)
        .map(|c| c.id)
        .ok_or_else(|| anyhow!("No such card: '{needle}'. See: stack card list"))
}

fn card_name(wallet: &Wallet, id: Option<CardId>) -> String {
    match id.and_then(|id| wallet.get(id)) {
        Some(card) => card.name.clone(),
        None => "(removed)".to_string(),
    }
}

fn parse_rule(raw: &str) -> Result<RewardRule> {
    let (category, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid --rule '{raw}'. Expected Category=multiplier"))?;
    let value = value.trim();
    let multiplier = match value.strip_suffix('%') {
        Some(pct) => parse_amount(pct)? / Decimal::ONE_HUNDRED,
        None => parse_amount(value)?,
    };
    Ok(RewardRule::new(category.trim(), multiplier)?)
}

fn parse_day(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date: {raw}. Expected YYYY-MM-DD"))
}

fn parse_date_or_now(raw: Option<&str>) -> Result<DateTime<Utc>> {
    match raw {
        None => Ok(now_utc()),
        Some(s) => {
            if let Ok(day) = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d") {
                return Ok(day.and_time(NaiveTime::default()).and_utc());
            }
            Ok(DateTime::parse_from_rfc3339(s)
                .with_context(|| format!("Invalid date: {s}. Expected YYYY-MM-DD or RFC3339"))?
                .with_timezone(&Utc))
        }
    }
}

fn build_card(args: CardAddArgs) -> Result<CreditCard> {
    let balance = round_currency(parse_amount(&args.balance).context("Invalid --balance")?);
    let due = match args.due.as_deref() {
        Some(raw) => parse_day(raw)?,
        None => (now_utc() + Duration::days(30)).date_naive(),
    };

    let mut card = match args.template.as_deref() {
        Some(key) => {
            let tpl = find_template(key)
                .ok_or_else(|| anyhow!("No such template: '{key}'. See: stack card templates"))?;
            let mut card = tpl.build(balance, due);
            card.name = args.name;
            card
        }
        None => CreditCard::new(args.name, balance, due),
    };

    for raw in &args.rules {
        card.add_rule(parse_rule(raw)?)?;
    }
    if let Some(benefits) = args.benefits {
        card = card.with_benefits(benefits);
    }
    if let Some(last_four) = args.last_four {
        card = card.with_last_four(last_four);
    }
    if args.points {
        let point_value = args
            .point_value
            .as_deref()
            .map(parse_amount)
            .transpose()
            .context("Invalid --point-value")?;
        card = card.with_points(point_value);
    }
    Ok(card)
}

fn handle_card(cmd: CardCmd, db: &mut Db, wallet: &mut Wallet, cfg: &AppConfig) -> Result<()> {
    match cmd {
        CardCmd::Add(args) => {
            let card = build_card(args)?;
            let name = card.name.clone();
            let id = ledger::add_card(db, wallet, card)?;
            println!("Added card '{name}' ({}).", short_id(id));
            Ok(())
        }
        CardCmd::List => {
            if wallet.is_empty() {
                println!("(no cards)");
                return Ok(());
            }
            let rows: Vec<Vec<String>> = wallet
                .cards()
                .iter()
                .map(|c| {
                    vec![
                        short_id(c.id),
                        c.name.clone(),
                        money(cfg, c.balance()),
                        c.due_date.to_string(),
                        describe_rules(c),
                    ]
                })
                .collect();
            print_table(&["ID", "NAME", "BALANCE", "DUE", "REWARDS"], &rows);
            Ok(())
        }
        CardCmd::Show { card } => {
            let id = resolve_card(wallet, &card)?;
            let Some(card) = wallet.get(id) else {
                return Err(anyhow!("No such card: '{card}'"));
            };
            println!("{}\t{}", card.name, card.id);
            println!("balance\t{}", money(cfg, card.balance()));
            println!("due\t{}", card.due_date);
            if let Some(last_four) = &card.last_four {
                println!("last four\t{last_four}");
            }
            if card.is_points {
                match card.point_value {
                    Some(v) => println!("points\t1 pt = {}{v}", cfg.currency_symbol),
                    None => println!("points\tyes"),
                }
            }
            for rule in card.rewards() {
                println!("reward\t{}\t{}", rule.category, percent(rule.multiplier));
            }
            if !card.benefits.is_empty() {
                println!();
                println!("{}", card.benefits);
            }
            Ok(())
        }
        CardCmd::Remove { card } => {
            let id = resolve_card(wallet, &card)?;
            let removed = ledger::remove_card(db, wallet, id)?;
            println!("Removed card '{}'.", removed.name);
            Ok(())
        }
        CardCmd::Templates => {
            for tpl in CARD_TEMPLATES {
                let card = tpl.build(Decimal::ZERO, now_utc().date_naive());
                println!("{}\t{}\t{}", tpl.key, tpl.name, describe_rules(&card));
            }
            Ok(())
        }
    }
}

fn handle_txn(cmd: TxnCmd, db: &mut Db, wallet: &mut Wallet, cfg: &AppConfig) -> Result<()> {
    match cmd {
        TxnCmd::Add(args) => {
            let card = args
                .card
                .as_deref()
                .map(|needle| resolve_card(wallet, needle))
                .transpose()?;
            let draft = NewTransaction {
                name: args.name,
                date: parse_date_or_now(args.date.as_deref())?,
                amount: args.amount,
                category: args.category.as_str().to_string(),
                card,
            };

            let txn = ledger::create_transaction(db, wallet, draft)?;
            let used = card_name(wallet, txn.card_id);
            let balance = txn
                .card_id
                .and_then(|id| wallet.get(id))
                .map(|c| c.balance())
                .unwrap_or_default();
            println!(
                "Recorded '{}' {} on {}: {} cashback. Balance {}. ({})",
                txn.name,
                money(cfg, txn.amount),
                used,
                signed(cfg, txn.cashback),
                money(cfg, balance),
                short_id(txn.id),
            );
            if let (Some(best), Some(potential)) = (txn.best_card_id, txn.potential_cashback) {
                println!(
                    "Tip: {} would have earned {}.",
                    card_name(wallet, Some(best)),
                    signed(cfg, potential)
                );
            }
            Ok(())
        }
        TxnCmd::List { card, limit } => {
            let filter = TransactionFilter {
                card: card
                    .as_deref()
                    .map(|needle| resolve_card(wallet, needle))
                    .transpose()?,
                since: None,
                limit,
            };
            let txns = db.fetch(&filter)?;
            if txns.is_empty() {
                println!("(no transactions)");
                return Ok(());
            }

            let rows: Vec<Vec<String>> = txns
                .iter()
                .map(|t| {
                    let best = match (t.best_card_id, t.potential_cashback) {
                        (Some(id), Some(p)) => {
                            format!("{} {}", card_name(wallet, Some(id)), signed(cfg, p))
                        }
                        _ => String::new(),
                    };
                    vec![
                        short_id(t.id),
                        t.date.format("%Y-%m-%d").to_string(),
                        t.name.clone(),
                        t.category.clone(),
                        money(cfg, t.amount),
                        card_name(wallet, t.card_id),
                        signed(cfg, t.cashback),
                        best,
                    ]
                })
                .collect();
            print_table(
                &[
                    "ID", "DATE", "NAME", "CATEGORY", "AMOUNT", "CARD", "CASHBACK", "BEST CARD",
                ],
                &rows,
            );
            Ok(())
        }
        TxnCmd::Delete { id } => {
            let Some(txn) = db.find_transaction(&id)? else {
                return Err(anyhow!("No such transaction: '{id}'"));
            };
            ledger::delete_transaction(db, wallet, &txn)?;
            println!("Deleted '{}' ({}).", txn.name, short_id(txn.id));
            Ok(())
        }
    }
}

fn handle_best(args: BestArgs, wallet: &Wallet, cfg: &AppConfig) -> Result<()> {
    let amount = round_currency(parse_amount(&args.amount)?);
    let category = args.category.as_str();
    match wallet.best_card_for(category, amount) {
        (Some(card), value) => println!(
            "Best card for {} {}: {} ({})",
            category,
            money(cfg, amount),
            card.name,
            signed(cfg, value)
        ),
        (None, _) => println!("(no cards)"),
    }
    Ok(())
}

fn handle_rewards(args: RewardsArgs, db: &Db, cfg: &AppConfig) -> Result<()> {
    let raw = args.range.as_deref().unwrap_or(&cfg.default_range);
    let range: RewardsRange = raw.parse().map_err(|e: String| anyhow!(e))?;
    let summary = summarize_from(db, range, now_utc())?;

    println!("Rewards ({}, {} transactions)", range, summary.transactions);
    println!("actual\t{}", money(cfg, summary.actual));
    println!("potential\t{}", money(cfg, summary.potential));
    println!("missed\t{}", money(cfg, summary.missed()));

    if args.series {
        for (day, value) in &summary.actual_series {
            println!("actual\t{day}\t{}", money(cfg, *value));
        }
        for (day, value) in &summary.potential_series {
            println!("potential\t{day}\t{}", money(cfg, *value));
        }
    }
    Ok(())
}

fn remote_client(cfg: &AppConfig) -> Result<RemoteClient> {
    let url = cfg
        .remote_url
        .as_deref()
        .ok_or_else(|| anyhow!("No remote configured. Set one with: stack remote set-url <url>"))?;
    let user = cfg
        .user_id
        .clone()
        .unwrap_or_else(|| cfg.device_id.to_string());
    Ok(RemoteClient::new(url, &user)?.with_page_size(cfg.page_size))
}

fn handle_remote(cmd: RemoteCmd, db: &Db, cfg: &mut AppConfig, cfg_path: &Path) -> Result<()> {
    match cmd {
        RemoteCmd::SetUrl { url } => {
            cfg.remote_url = Some(url.trim().to_string());
            write_config(cfg_path, cfg)?;
            println!("Remote set to {}.", url.trim());
            Ok(())
        }
        RemoteCmd::List { limit } => {
            let client = remote_client(cfg)?;
            let records = client.list(limit).context("Failed to list remote records")?;
            if records.is_empty() {
                println!("(no records)");
                return Ok(());
            }
            for r in records {
                println!(
                    "{}\t{}\t{}\t{}",
                    r.date,
                    r.name,
                    money(cfg, r.amount),
                    r.category
                );
            }
            Ok(())
        }
        RemoteCmd::Push { id } => {
            let Some(txn) = db.find_transaction(&id)? else {
                return Err(anyhow!("No such transaction: '{id}'"));
            };
            let client = remote_client(cfg)?;
            let stored = client
                .put(&NewRecord::from(&txn))
                .context("Failed to push transaction")?;
            println!("Pushed '{}' as {}.", stored.name, stored.sort_key);
            Ok(())
        }
    }
}

fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    if headers.is_empty() {
        println!("(no columns)");
        return;
    }

    let cols = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();

    for row in rows {
        for (i, cell) in row.iter().take(cols).enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    fn print_row(cells: &[String], widths: &[usize]) {
        print!("|");
        for (i, w) in widths.iter().enumerate() {
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            print!(" {:width$} |", cell, width = *w);
        }
        println!();
    }

    fn print_sep(widths: &[usize]) {
        print!("|");
        for w in widths {
            print!("{}|", "-".repeat(w + 2));
        }
        println!();
    }

    let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    print_row(&header_cells, &widths);
    print_sep(&widths);
    for row in rows {
        print_row(row, &widths);
    }
}
