//! Random search with refinement on a toy training loss, then a Pareto
//! query on a two-objective variant of the same problem.

use hs_optimizer::{HyperOptimizer, OptimizerConfig, RandomSearch};
use hs_types::{Configuration, FixedParams, HsResult, Objective, SearchSpace};

fn train(config: &Configuration) -> (f64, f64) {
    let lrate = config["lrate"].as_f64().unwrap_or(1.0);
    let layers = config["layers"].as_f64().unwrap_or(1.0);
    let penalty = if config["act"].to_string() == "relu" { 0.0 } else { 0.05 };
    let loss = (lrate.log10() + 2.5).powi(2) + 0.1 * (layers - 4.0).abs() + penalty;
    let cost = layers * 10.0;
    (loss, cost)
}

fn main() -> HsResult<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let space = SearchSpace::builder()
        .add_log_real("lrate", 1e-5, 1e-1)
        .add_integer("layers", 1, 8)
        .add_categorical("act", ["relu", "tanh", "gelu"])
        .build()?;
    let strategy = RandomSearch::new(space.clone()).with_refinement(vec![20, 40], 5)?;
    let fixed = FixedParams::new().with("epochs", 20_i64);
    let mut optimizer = HyperOptimizer::new(
        Box::new(strategy),
        OptimizerConfig::default().with_fixed_params(fixed),
    )?;

    for _ in 0..6 {
        let configs = optimizer.propose(10)?;
        let objectives: Vec<Objective> = configs.iter().map(|c| train(c).0.into()).collect();
        optimizer.record(&configs, &objectives)?;
    }
    for line in optimizer.ranking_report(3)? {
        println!("{line}");
    }
    println!("space after refinement: {:?}", optimizer.space());

    let mut pareto =
        HyperOptimizer::new(Box::new(RandomSearch::new(space)), OptimizerConfig::default())?;
    let configs = pareto.propose(30)?;
    let objectives: Vec<Objective> = configs
        .iter()
        .map(|c| {
            let (loss, cost) = train(c);
            vec![loss, cost].into()
        })
        .collect();
    pareto.record(&configs, &objectives)?;
    let (front, values) = pareto.top_k(5)?;
    for (config, value) in front.iter().zip(&values) {
        println!("{value} <- {config:?}");
    }
    Ok(())
}
