//! Trains vanilla CFR on Kuhn poker and prints the learned average strategy.

use cfr::exploitability::exploitability;
use cfr::vanilla::{CfrConfig, VanillaCfr};
use fosg::gamestates::kuhn_poker::KuhnPoker;
use fosg::Game;
use log::{info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

const ITERATIONS: usize = 10_000;
const REPORT_EVERY: usize = 1_000;

fn main() {
    TermLogger::init(
        LevelFilter::Info,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .expect("no other logger is installed");

    let game = KuhnPoker;
    let mut engine = VanillaCfr::new(game, game.initial_world(), CfrConfig::default());

    while engine.iteration() < ITERATIONS {
        engine.iterate(REPORT_EVERY).expect("iteration failed");
        let result = exploitability(&game, &game.initial_world(), engine.average_policy());
        info!(
            "iteration {:>6}: {} nodes touched, exploitability {:.5}",
            engine.iteration(),
            engine.nodes_touched(),
            result.exploitability
        );
    }

    let mut average = engine.average_policy().clone();
    average.normalize();

    println!("average strategy after {} iterations:", engine.iteration());
    for (istate, policy) in average.iter() {
        let actions: Vec<String> = policy
            .iter()
            .map(|(action, weight)| format!("{:?}: {:.3}", action, weight))
            .collect();
        let observations: Vec<String> = istate
            .iter()
            .map(|(public, private)| format!("({}|{})", public, private))
            .collect();
        println!(
            "  {} {:<40} {}",
            istate.player(),
            observations.join(" "),
            actions.join(", ")
        );
    }
}
