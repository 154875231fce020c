//! Print the deterministic inputs for one trial identity. No ledger needed.
//!
//! Usage: cargo run --bin inputs -- <scenario_id> <mode> <repeat>
//!        cargo run --bin inputs -- all

use anyhow::{anyhow, Result};

use datamatch_lab::record::TrialId;
use datamatch_lab::scenario::{ExperimentPlan, PricingMode};
use datamatch_lab::trial::inputs_for;

fn print_inputs(plan: &ExperimentPlan, id: &TrialId) -> Result<()> {
    let inputs = inputs_for(plan, id)?;
    let q = inputs.quality;
    println!(
        "{},{},{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6}",
        id.scenario_id,
        id.mode.as_str(),
        id.repeat,
        inputs.seed,
        q.reputation,
        q.transparency,
        q.completeness,
        q.processing,
        q.user_rating,
        inputs.pricing.market_factor,
        inputs.pricing.quality_index,
        inputs.pricing.reference_price,
        inputs.seller.reserve_price,
        inputs.seller.initial_offer,
        inputs.buyer.reserve_price,
        inputs.buyer.initial_offer,
    );
    Ok(())
}

fn main() -> Result<()> {
    let plan = ExperimentPlan::default();
    let args: Vec<String> = std::env::args().skip(1).collect();
    println!("scenario,mode,repeat,seed,s_rep,s_trans,s_comp,s_proc,s_user,M_d,Q_p,P_off,P_res_s,p0_s,P_res_b,p0_b");

    if args.first().map(|a| a == "all").unwrap_or(true) {
        for (scenario_id, mode, repeat) in plan.cells() {
            let scenario = *plan
                .scenario(&scenario_id)
                .ok_or_else(|| anyhow!("unknown scenario {}", scenario_id))?;
            print_inputs(&plan, &TrialId { scenario_id, scenario, mode, repeat })?;
        }
        return Ok(());
    }

    let scenario_id = args[0].clone();
    let scenario = *plan
        .scenario(&scenario_id)
        .ok_or_else(|| anyhow!("unknown scenario {}", scenario_id))?;
    let mode = args
        .get(1)
        .map(|m| PricingMode::parse(m).ok_or_else(|| anyhow!("unknown pricing mode {}", m)))
        .transpose()?
        .unwrap_or(PricingMode::Baseline);
    let repeat = args.get(2).map(|r| r.parse::<u32>()).transpose()?.unwrap_or(0);
    print_inputs(&plan, &TrialId { scenario_id, scenario, mode, repeat })
}
