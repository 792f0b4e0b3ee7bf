//! Storage presets injected into forks at startup

use serde_json::json;

use crate::fork::StorageBatch;

/// Public key of the well-known development account `//Alice`.
pub const ALICE: &str = "0xd43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d";

/// Free balance given to the test account.
pub const TEST_ACCOUNT_BALANCE: u128 = 100_000_000_000_000_000_000;

/// Highest fellowship rank.
pub const MAX_FELLOWSHIP_RANK: u16 = 9;

/// A funded account able to pay submission deposits.
pub fn funded_account(account: &str) -> StorageBatch {
    let mut batch = StorageBatch::new();
    batch.set_entry(
        "System",
        "Account",
        vec![json!(account)],
        json!({
            "providers": 1,
            "data": {"free": TEST_ACCOUNT_BALANCE.to_string()},
        }),
    );
    batch
}

/// Register `account` as a fellow of every rank, so it may submit on any
/// fellowship track.
pub fn fellowship_registration(account: &str) -> StorageBatch {
    let mut batch = StorageBatch::new();
    batch.set_entry(
        "FellowshipCollective",
        "Members",
        vec![json!(account)],
        json!({"rank": MAX_FELLOWSHIP_RANK}),
    );
    for rank in 0..=MAX_FELLOWSHIP_RANK {
        batch.set_entry("FellowshipCollective", "MemberCount", vec![json!(rank)], json!(1));
        batch.set_entry(
            "FellowshipCollective",
            "IdToIndex",
            vec![json!(rank), json!(account)],
            json!(0),
        );
        batch.set_entry(
            "FellowshipCollective",
            "IndexToId",
            vec![json!(rank), json!(0)],
            json!(account),
        );
    }
    batch
}

/// Marks the Asset Hub migration as finished so referendum submission is not
/// filtered.
pub fn asset_hub_migration_done() -> StorageBatch {
    let mut batch = StorageBatch::new();
    batch.set_value("AhMigrator", "AhMigrationStage", json!("MigrationDone"));
    batch
}
