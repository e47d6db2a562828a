/// bridge loan - value observed and committed across a ledger bridge
use p2p_loan_rs::{
    AccountId, Amount, AssetId, BridgeEndpoint, BridgeLoan, ClaimId, ExternalAccount,
    InMemoryLedger, InMemoryRegistry, OperationKind, Rate,
};
use p2p_loan_rs::{SafeTimeProvider, TimeSource};
use chrono::{Duration, TimeZone, Utc};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    println!("=== bridge loan ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    ));
    let controller = time.test_control().unwrap();

    let borrower = AccountId::new("borrower");
    let lender = AccountId::new("lender");
    let relayer = AccountId::new("relayer");
    // the in-memory ledger doubles as the bridge
    let mut bridge = InMemoryLedger::new();
    let mut registry = InMemoryRegistry::new();
    let nft = AssetId::new("my-nft");
    let token_id = registry.mint(&nft, &borrower);

    let mut loan = BridgeLoan::builder()
        .borrower(borrower.clone())
        .lender(lender.clone())
        .principal(Amount::from_units(1_000))
        .rate(Rate::from_percentage(10))
        .duration(Duration::weeks(20))
        .borrower_external(ExternalAccount::new("rBorrowerXRPL"))
        .lender_external(ExternalAccount::new("rLenderXRPL"))
        .endpoint(BridgeEndpoint::new("0xdoor"))
        .funding_buffer(Amount::from_units(1))
        .build(&time)?;

    loan.deposit_collateral(&mut registry, &borrower, nft, token_id, &time)?;
    loan.approve_loan_term(&lender, &time)?;
    println!("lend: {:?}", loan.lend(&bridge, &lender, &time)?);

    // funding arrives from the other side
    bridge.mint(&loan.escrow(), Amount::from_units(1_001));
    println!("observe: {:?}", loan.observe_funding(&bridge, &time)?);

    loan.start_borrowing(&mut bridge, &borrower, ClaimId::new(1), &time)?;
    loan.confirm_settlement(OperationKind::LendCommit, ClaimId::new(1), &time)?;

    controller.advance(Duration::weeks(5));
    println!("claimable after 5 weeks: {}", loan.claimable_interest(&time)?);

    // borrower sends interest, then the full principal
    bridge.mint(&loan.escrow(), Amount::from_units(20));
    loan.claim_interest(&mut bridge, &lender, ClaimId::new(2), &time)?;

    let target = loan.redeem_principal(&bridge, &borrower, &time)?;
    println!("waiting for escrow balance {}", target);
    bridge.mint(&loan.escrow(), Amount::from_units(1_000));
    println!("confirmed: {}", loan.confirm_redemption(&bridge, &relayer, &time)?);

    let outcome = loan.claim_principal(&mut bridge, &mut registry, &lender, ClaimId::new(3), &time)?;
    println!("final claim: {:?}", outcome);
    println!("status: {}", loan.status());

    for commit in bridge.commits() {
        println!("  commit #{} {} -> {}", commit.claim_id, commit.amount, commit.destination);
    }

    Ok(())
}
