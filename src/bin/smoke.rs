//! Connectivity and smoke check only. Exits non-zero on any failure.

use anyhow::Result;

use datamatch_lab::config::Config;
use datamatch_lab::experiment::smoke_test;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env()?;
    let ledger = cfg.ledger_kind.build(&cfg)?;
    let report = smoke_test(ledger.as_ref(), cfg.gas_policy()).await?;
    println!("block number:  {}", report.block_number);
    println!("reset gas:     {}", report.reset_gas);
    println!("product gas:   {}", report.product_gas);
    println!("seller gas:    {}", report.seller_gas);
    println!("buyer gas:     {}", report.buyer_gas);
    println!("matching gas:  {}", report.matching_gas);
    match report.matched_price {
        Some(p) => println!("matched price: {:.4}", p),
        None => println!("matched price: none (no Matched event)"),
    }
    Ok(())
}
