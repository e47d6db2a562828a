/// json state - serialization for debugging and monitoring
use p2p_loan_rs::{
    AccountId, Amount, AssetId, InMemoryLedger, InMemoryRegistry, LoanConfig, Rate, SimpleLoan,
};
use p2p_loan_rs::{SafeTimeProvider, TimeSource};
use chrono::{Duration, TimeZone, Utc};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== json state serialization ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    ));
    let controller = time.test_control().unwrap();

    let borrower = AccountId::new("borrower");
    let lender = AccountId::new("lender");
    let mut ledger = InMemoryLedger::new();
    let mut registry = InMemoryRegistry::new();
    ledger.mint(&lender, Amount::from_units(50_000));
    let nft = AssetId::new("my-nft");
    let token_id = registry.mint(&nft, &borrower);

    let mut loan = SimpleLoan::builder()
        .borrower(borrower.clone())
        .lender(lender.clone())
        .principal(Amount::from_units(50_000))
        .rate(Rate::from_percentage(7))
        .duration(Duration::weeks(26))
        .build(&time)?;

    // configuration round trip
    let config_json = loan.loan().config.to_json()?;
    println!("config:\n{}\n", config_json);
    let restored = LoanConfig::from_json(&config_json)?;
    assert_eq!(restored, loan.loan().config);

    // stage 1: after creation
    println!("stage 1: created");
    println!("----------------");
    println!("{}\n", loan.json(&time));

    // stage 2: collateral in and terms approved
    loan.deposit_collateral(&mut registry, &borrower, nft, token_id, &time)?;
    loan.approve_loan_term(&lender, &time)?;
    println!("stage 2: activated");
    println!("------------------");
    println!("{}\n", loan.json(&time));

    // stage 3: funded and started
    loan.lend(&mut ledger, &lender, &time)?;
    loan.start_borrowing(&mut ledger, &borrower, &time)?;
    println!("stage 3: started");
    println!("----------------");
    println!("{}\n", loan.json(&time));

    // stage 4: 30 days later
    controller.advance(Duration::days(30));
    println!("stage 4: 30 days later (interest accrued)");
    println!("------------------------------------------");
    println!("{}\n", loan.json(&time));

    // audit trail
    println!("snapshots:");
    for snapshot in &loan.loan().snapshots {
        println!("  {} {}", snapshot.timestamp.format("%Y-%m-%d"), snapshot.trigger);
    }
    if let Some(last) = loan.loan().snapshots.last() {
        println!("\nlast snapshot:\n{}", serde_json::to_string_pretty(last)?);
    }

    Ok(())
}
