/// default and liquidation - a missed deadline hands the nft to the liquidator
use p2p_loan_rs::{
    AccountId, Amount, AssetId, AssetRegistry, ClaimOutcome, InMemoryLedger, InMemoryRegistry,
    Rate, SimpleLoan,
};
use p2p_loan_rs::{SafeTimeProvider, TimeSource};
use chrono::{Duration, TimeZone, Utc};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== default and liquidation ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    ));
    let controller = time.test_control().unwrap();

    let borrower = AccountId::new("borrower");
    let lender = AccountId::new("lender");
    let liquidator = AccountId::new("auction-house");
    let mut ledger = InMemoryLedger::new();
    let mut registry = InMemoryRegistry::new();
    ledger.mint(&lender, Amount::from_units(5_000));
    let nft = AssetId::new("my-nft");
    let token_id = registry.mint(&nft, &borrower);

    let mut loan = SimpleLoan::builder()
        .borrower(borrower.clone())
        .lender(lender.clone())
        .liquidator(liquidator.clone())
        .principal(Amount::from_units(5_000))
        .rate(Rate::from_percentage(12))
        .duration(Duration::weeks(4))
        .build(&time)?;

    loan.deposit_collateral(&mut registry, &borrower, nft.clone(), token_id, &time)?;
    loan.approve_loan_term(&lender, &time)?;
    loan.lend(&mut ledger, &lender, &time)?;
    loan.start_borrowing(&mut ledger, &borrower, &time)?;
    println!("deadline: {:?}", loan.loan().deadline());

    // one second past the deadline with nothing repaid
    controller.advance(Duration::weeks(4) + Duration::seconds(1));
    match loan.claim_interest(&mut ledger, &lender, &time)? {
        ClaimOutcome::Defaulted => println!("claim found the loan in default"),
        ClaimOutcome::Paid { interest, .. } => println!("claimed {}", interest),
    }
    println!("status: {}", loan.status());

    // anyone may trigger the liquidation
    let record = loan.liquidate_collateral(&mut registry, &AccountId::new("keeper"), &time)?;
    println!("liquidated {} #{}", record.asset, record.token_id);
    println!("new owner: {:?}", registry.owner_of(&nft, token_id));

    // a second liquidation has nothing left to move
    if let Err(e) = loan.liquidate_collateral(&mut registry, &liquidator, &time) {
        println!("second liquidation rejected: {}", e);
    }

    Ok(())
}
