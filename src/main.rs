use std::io::{self, IsTerminal};

use anyhow::Context;
use colored::*;
use log::{error, info};

use dcsim::cli::{create_cli, CliArgs};
use dcsim::report::Report;
use dcsim::shell::{Query, Shell};
use dcsim::Deck;

fn main() {
    let matches = create_cli().get_matches();
    let args = match CliArgs::from_matches(&matches) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}", format!("Error: {}", e).red());
            std::process::exit(2);
        }
    };

    env_logger::Builder::new()
        .filter_level(args.log_level())
        .parse_default_env()
        .init();

    if let Err(e) = run_application(&args) {
        error!("{:#}", e);
        eprintln!("{}", format!("Error: {:#}", e).red());
        std::process::exit(1);
    }
}

fn run_application(args: &CliArgs) -> anyhow::Result<()> {
    info!("{}", "Starting dcSim".green().bold());
    info!("Input deck: {}", args.input_file.bright_blue());

    let deck = Deck::parse_file(&args.input_file)?;
    let mut circuit = deck.build()?;
    circuit
        .check_circuit()
        .context("Circuit topology is incomplete, please enter the missing elements")?;
    if log::log_enabled!(log::Level::Info) {
        circuit.print_summary();
    }

    circuit.solve().context("Failed to solve the circuit")?;

    let balance = circuit.check_power_balance();
    println!(
        "Power supplied = {} watts.\nPower dissipated = {} watts.",
        balance.supplied, balance.dissipated
    );
    if balance.balanced {
        println!("{}", "Power is balanced.".green());
    } else {
        println!("{}", "ERROR: Power is NOT balanced.".red());
    }

    if let Some(output_file) = &args.output_file {
        Report::from_circuit(&circuit).export(output_file, args.output_format)?;
        info!("Results exported to: {}", output_file.bright_green());
    }

    let mut shell = Shell::new(&mut circuit);
    if args.queries.is_empty() {
        let stdin = io::stdin();
        if stdin.is_terminal() {
            println!(
                "\nFor direct responses, enter the type (I current, V voltage, P power) and the \
                 element or node name.\nFor superposition, prefix the response with the source \
                 name (e.g. E1 V R2).\nFor maximum power transfer, enter MP/RM/PM followed by the \
                 resistor name.\nEnter BAL for the power balance, Q to exit."
            );
        }
        shell.run(stdin.lock(), io::stdout())?;
    } else {
        for text in &args.queries {
            match Query::parse(text).and_then(|query| shell.execute(&query)) {
                Ok(answer) => println!("{}", answer),
                Err(e) => println!("{}", format!("Error: {:#}", e).red()),
            }
        }
    }

    Ok(())
}
