use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal_macros::dec;
use uuid::Uuid;

use tally::{
    cli::{execute, Command, EXIT_PROBLEMS},
    AppError, Engine,
};
use tally_config::Config;
use tally_core::{
    storage::AccountStore, CoreError, FixedClock, MemoryStorage, NewEntry, NewRule, Schedule,
};
use tally_domain::{AccountKind, Book, CategoryKind, EntryKind};

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn engine_on(today: NaiveDate, book: Option<Book>) -> (Engine, Arc<FixedClock>) {
    let clock = Arc::new(FixedClock::on(today));
    let storage = match book {
        Some(book) => MemoryStorage::with_book(book),
        None => MemoryStorage::new(),
    };
    let engine = Engine::with_parts(
        Config::default(),
        "memory".into(),
        Box::new(storage),
        clock.clone(),
    )
    .expect("engine");
    (engine, clock)
}

fn run(engine: &Engine, command: Command) -> (i32, String) {
    let mut out = Vec::new();
    let code = execute(engine, &command, &mut out).expect("command");
    (code, String::from_utf8(out).expect("utf8"))
}

#[test]
fn sweep_reports_fired_rules() {
    let (engine, clock) = engine_on(date(2024, 1, 10), None);
    let user = Uuid::new_v4();
    let account = engine
        .accounts()
        .open_account(
            user,
            "Checking",
            AccountKind::Checking,
            "USD",
            dec!(1000),
            true,
        )
        .unwrap();
    let rent = engine
        .accounts()
        .add_category(user, "Rent", CategoryKind::Expense)
        .unwrap();
    let rule = engine
        .rules()
        .create_rule(NewRule {
            user_id: user,
            description: "Rent".into(),
            amount: dec!(500),
            currency: "USD".into(),
            kind: EntryKind::Expense,
            schedule: Schedule::monthly(15),
            start_date: date(2024, 1, 10),
            end_date: None,
            account_id: account.id,
            category_id: rent.id,
            is_active: true,
            notes: None,
        })
        .unwrap();

    let (code, output) = run(&engine, Command::Due);
    assert_eq!(code, 0);
    assert!(output.contains("No rules due."));

    clock.set_date(date(2024, 1, 15));
    let (code, output) = run(&engine, Command::Sweep { catch_up: false });
    assert_eq!(code, 0);
    assert!(output.contains(&format!("Fired rule {} on 2024-01-15", rule.id)));
    assert!(output.contains("next run 2024-02-15"));
    let balance = engine.accounts().account(account.id).unwrap().balance;
    assert_eq!(balance, dec!(500));
}

#[test]
fn audit_flags_a_drifted_balance() {
    let mut book = Book::new();
    let account = tally_domain::Account::new(Uuid::nil(), "Cash", AccountKind::Cash, "USD");
    let id = account.id;
    book.insert_account(account);
    book.apply_delta(id, dec!(10)).unwrap();
    let (engine, _) = engine_on(date(2024, 1, 1), Some(book));

    let (code, output) = run(&engine, Command::Audit);
    assert_eq!(code, EXIT_PROBLEMS);
    assert!(output.contains("1 problem(s) found."));
}

#[test]
fn fire_of_unknown_rule_is_an_error() {
    let (engine, _) = engine_on(date(2024, 1, 1), None);
    let mut out = Vec::new();
    let err = execute(
        &engine,
        &Command::Fire {
            rule_id: Uuid::new_v4(),
            as_of: None,
        },
        &mut out,
    )
    .expect_err("missing rule");
    assert!(matches!(err, AppError::Core(CoreError::RuleNotFound(_))));
}

#[test]
fn services_share_one_repository() {
    let (engine, _) = engine_on(date(2024, 3, 1), None);
    let user = Uuid::new_v4();
    let a = engine
        .accounts()
        .open_account(user, "A", AccountKind::Checking, "ARS", dec!(1000), true)
        .unwrap();
    let b = engine
        .accounts()
        .open_account(user, "B", AccountKind::Savings, "ARS", dec!(200), false)
        .unwrap();
    let transfer = NewEntry::transfer(user, a.id, b.id, dec!(300), "ARS", date(2024, 3, 1));
    engine.ledger().create_entry(transfer).unwrap();

    let accounts = engine.accounts().list_accounts(user).unwrap();
    let balances: Vec<_> = accounts.iter().map(|account| account.balance).collect();
    assert_eq!(balances, vec![dec!(700), dec!(500)]);
    assert!(!accounts[1].include_in_summary);
}
