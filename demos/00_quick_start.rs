/// quick start - minimal example to get started
use p2p_loan_rs::{AccountId, Amount, AssetId, InMemoryLedger, InMemoryRegistry, Rate, SimpleLoan};
use p2p_loan_rs::{SafeTimeProvider, TimeSource};
use chrono::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let time = SafeTimeProvider::new(TimeSource::System);
    let borrower = AccountId::new("alice");
    let lender = AccountId::new("bob");

    let mut ledger = InMemoryLedger::new();
    let mut registry = InMemoryRegistry::new();
    ledger.mint(&lender, Amount::from_units(10_000));
    let nft = AssetId::new("punks");
    let token_id = registry.mint(&nft, &borrower);

    // borrow 10,000 against one nft for 12 weeks at 8%
    let mut loan = SimpleLoan::builder()
        .borrower(borrower.clone())
        .lender(lender.clone())
        .principal(Amount::from_units(10_000))
        .rate(Rate::from_percentage(8))
        .duration(Duration::weeks(12))
        .build(&time)?;

    loan.deposit_collateral(&mut registry, &borrower, nft, token_id, &time)?;
    loan.approve_loan_term(&lender, &time)?;
    loan.lend(&mut ledger, &lender, &time)?;
    loan.start_borrowing(&mut ledger, &borrower, &time)?;

    // print current state
    println!("{}", loan.json(&time));

    Ok(())
}
