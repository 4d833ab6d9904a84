use std::{fs, sync::Arc};

use chrono::NaiveDate;
use rust_decimal_macros::dec;
use tempfile::tempdir;
use uuid::Uuid;

use tally_core::{
    AccountService, BookStorage, CoreError, FixedClock, LedgerService, NewEntry, Repository,
};
use tally_domain::{AccountKind, Book, CategoryKind};
use tally_storage_json::{JsonBookStorage, StoragePaths};

#[test]
fn missing_file_loads_as_empty() {
    let dir = tempdir().expect("tempdir");
    let storage = JsonBookStorage::new(StoragePaths::under(dir.path())).expect("storage");
    assert!(storage.load().expect("load").is_none());
}

#[test]
fn committed_work_survives_reopen() {
    let dir = tempdir().expect("tempdir");
    let paths = StoragePaths::under(dir.path());
    let clock = Arc::new(FixedClock::on(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()));
    let user = Uuid::new_v4();

    let account_id = {
        let storage = JsonBookStorage::new(paths.clone()).expect("storage");
        let repository = Arc::new(Repository::open(Box::new(storage)).expect("open"));
        let accounts = AccountService::new(repository.clone(), clock.clone());
        let ledger = LedgerService::new(repository, clock.clone());
        let account = accounts
            .open_account(
                user,
                "Checking",
                AccountKind::Checking,
                "USD",
                dec!(1000),
                true,
            )
            .expect("account");
        let food = accounts
            .add_category(user, "Food", CategoryKind::Expense)
            .expect("category");
        ledger
            .create_entry(NewEntry::expense(
                user,
                account.id,
                food.id,
                dec!(12.34),
                "USD",
                NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                "Lunch",
            ))
            .expect("entry");
        account.id
    };

    let storage = JsonBookStorage::new(paths.clone()).expect("storage");
    let repository = Arc::new(Repository::open(Box::new(storage)).expect("reopen"));
    let accounts = AccountService::new(repository.clone(), clock);
    assert_eq!(accounts.account(account_id).unwrap().balance, dec!(987.66));
    assert_eq!(repository.snapshot().unwrap().entries.len(), 1);
    assert!(accounts.reconcile().unwrap().is_empty());
    assert!(!paths.book_file.with_extension("json.tmp").exists());
}

#[test]
fn saves_keep_a_bounded_set_of_backups() {
    let dir = tempdir().expect("tempdir");
    let paths = StoragePaths::under(dir.path());
    let storage = JsonBookStorage::with_retention(paths.clone(), 2).expect("storage");
    let book = Book::new();

    storage.save(&book).expect("first save");
    assert!(storage.list_backups().unwrap().is_empty());

    // Seed older backups so pruning has something to drop.
    for stamp in ["20200101_000000", "20200102_000000", "20200103_000000"] {
        fs::write(
            paths.backup_root.join(format!("book_{stamp}.json")),
            serde_json::to_string(&book).unwrap(),
        )
        .unwrap();
    }
    storage.save(&book).expect("second save");

    let backups = storage.list_backups().expect("backups");
    assert_eq!(backups.len(), 2);
    assert!(backups[0].created_at > backups[1].created_at);
    assert_eq!(backups[1].id, "book_20200103_000000.json");
}

#[test]
fn restore_backup_replaces_live_book() {
    let dir = tempdir().expect("tempdir");
    let paths = StoragePaths::under(dir.path());
    let storage = JsonBookStorage::new(paths.clone()).expect("storage");
    let original = Book::new();
    fs::write(
        paths.backup_root.join("book_20240101_120000.json"),
        serde_json::to_string(&original).unwrap(),
    )
    .unwrap();
    storage.save(&Book::new()).expect("save");

    let restored = storage
        .restore_backup("book_20240101_120000.json")
        .expect("restore");
    assert_eq!(restored.id, original.id);
    let reloaded = storage.load().unwrap().expect("book");
    assert_eq!(reloaded.id, original.id);

    assert!(matches!(
        storage.restore_backup("missing.json"),
        Err(CoreError::Persistence(_))
    ));
}

#[test]
fn newer_schema_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let paths = StoragePaths::under(dir.path());
    let storage = JsonBookStorage::new(paths.clone()).expect("storage");
    let mut value = serde_json::to_value(Book::new()).unwrap();
    value["schema_version"] = serde_json::json!(99);
    fs::write(&paths.book_file, value.to_string()).unwrap();

    let err = storage.load().expect_err("newer schema");
    let CoreError::Persistence(message) = &err else {
        panic!("expected a persistence error, got {err:?}");
    };
    assert!(message.contains("99"));
}

#[test]
fn corrupt_file_is_a_serde_error() {
    let dir = tempdir().expect("tempdir");
    let paths = StoragePaths::under(dir.path());
    let storage = JsonBookStorage::new(paths.clone()).expect("storage");
    fs::write(&paths.book_file, "{ not json").unwrap();
    assert!(matches!(storage.load(), Err(CoreError::Serde(_))));
}
