/// simple lifecycle - partial repayment, interest claims and completion
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

    println!("=== simple loan lifecycle ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    ));
    let controller = time.test_control().unwrap();

    let borrower = AccountId::new("borrower");
    let lender = AccountId::new("lender");
    let mut ledger = InMemoryLedger::new();
    let mut registry = InMemoryRegistry::new();
    ledger.mint(&lender, Amount::from_units(100_000));
    ledger.mint(&borrower, Amount::from_units(10_000));
    let nft = AssetId::new("my-nft");
    let token_id = registry.mint(&nft, &borrower);

    let mut loan = SimpleLoan::builder()
        .borrower(borrower.clone())
        .lender(lender.clone())
        .principal(Amount::from_units(100_000))
        .rate(Rate::from_percentage(10))
        .duration(Duration::weeks(20))
        .build(&time)?;

    loan.deposit_collateral(&mut registry, &borrower, nft.clone(), token_id, &time)?;
    loan.approve_loan_term(&lender, &time)?;
    loan.lend(&mut ledger, &lender, &time)?;
    loan.start_borrowing(&mut ledger, &borrower, &time)?;
    println!("started on {}", time.now().format("%Y-%m-%d"));

    controller.advance(Duration::days(10));
    println!("accrued after 10 days: {}", loan.accrued_interest(&time)?);

    controller.advance(Duration::days(35));
    loan.redeem_partial_principal(
        &mut ledger,
        &mut registry,
        &borrower,
        Amount::from_units(50_000),
        &time,
    )?;
    println!(
        "repaid 50,000 on {}, outstanding {}",
        time.now().format("%Y-%m-%d"),
        loan.state().current_principal
    );

    if let ClaimOutcome::Paid { principal, interest } =
        loan.claim_principal(&mut ledger, &lender, &time)?
    {
        println!("lender claimed principal {} and interest {}", principal, interest);
    }

    controller.advance(Duration::weeks(5));
    let paid = loan.redeem_full_principal(&mut ledger, &mut registry, &borrower, &time)?;
    println!("full redemption paid {}", paid);
    println!("collateral owner: {:?}", registry.owner_of(&nft, token_id));

    loan.claim_principal(&mut ledger, &lender, &time)?;
    println!("final status: {}", loan.status());
    println!("lender balance: {}", ledger.balance(&lender));

    for event in loan.take_events() {
        println!("  {:?}", event);
    }

    Ok(())
}

