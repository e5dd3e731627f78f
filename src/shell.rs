//! Query loop answering questions about a solved circuit.
//!
//! ```text
//! I R1          current through R1
//! V R1          voltage across R1
//! V 1 0         potential difference between two nodes
//! P E1          power in E1
//! E1 V R2       voltage across R2 due to E1 alone (superposition)
//! MP R3         maximum power transfer to R3 (also RM, PM)
//! BAL           power balance
//! Q             quit
//! ```

use std::io::{BufRead, Write};

use anyhow::{anyhow, bail, Result};
use colored::*;
use log::debug;

use crate::circuit::{Circuit, NOT_FOUND};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Current(String),
    /// Voltage across an element, or potential of a node against ground.
    Voltage(String),
    PotentialDifference(String, String),
    Power(String),
    /// Answer `query` with only `source` active.
    Due { source: String, query: Box<Query> },
    MaxPower(String),
    Balance,
    Quit,
}

impl Query {
    pub fn parse(line: &str) -> Result<Query> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let (&first, rest) = tokens
            .split_first()
            .ok_or_else(|| anyhow!("empty query"))?;
        let command = first.to_ascii_uppercase();

        match command.as_str() {
            "Q" | "QUIT" => return Ok(Query::Quit),
            "BAL" => return Ok(Query::Balance),
            "MP" | "RM" | "PM" => {
                let name = rest
                    .first()
                    .ok_or_else(|| anyhow!("{} needs a resistor name", command))?;
                return Ok(Query::MaxPower(name.to_string()));
            }
            _ => {}
        }

        if command.len() > 1 && (command.starts_with('E') || command.starts_with('J')) {
            let query = Self::parse_response(rest)?;
            return Ok(Query::Due {
                source: command,
                query: Box::new(query),
            });
        }

        Self::parse_response(&tokens)
    }

    /// `<I|V|P> <target> [<node>]`
    fn parse_response(tokens: &[&str]) -> Result<Query> {
        let [kind, target, more @ ..] = tokens else {
            bail!("expected a response type (I/V/P) followed by a name");
        };
        let target = target.to_string();

        match kind.to_ascii_uppercase().as_str() {
            "I" => Ok(Query::Current(target)),
            "P" => Ok(Query::Power(target)),
            "V" => match more.first() {
                Some(other) if !is_element_name(&target) => {
                    Ok(Query::PotentialDifference(target, other.to_string()))
                }
                _ => Ok(Query::Voltage(target)),
            },
            other => bail!(
                "unrecognized response type '{}', use I for current, V for voltage or P for power",
                other
            ),
        }
    }
}

fn is_element_name(name: &str) -> bool {
    matches!(name.chars().next(), Some('E' | 'J' | 'R' | 'e' | 'j' | 'r'))
}

pub struct Shell<'a> {
    circuit: &'a mut Circuit,
}

impl<'a> Shell<'a> {
    pub fn new(circuit: &'a mut Circuit) -> Self {
        Shell { circuit }
    }

    /// Answer one query. Direct responses are taken from a clean solve; a
    /// superposition response leaves the circuit in its superposition state.
    pub fn execute(&mut self, query: &Query) -> Result<String> {
        match query {
            Query::Quit => Ok(String::new()),
            Query::Balance => {
                let balance = self.circuit.check_power_balance();
                let verdict = if balance.balanced {
                    "Power is balanced."
                } else {
                    "ERROR: Power is NOT balanced."
                };
                Ok(format!(
                    "Power supplied = {} watts.\nPower dissipated = {} watts.\n{}",
                    balance.supplied, balance.dissipated, verdict
                ))
            }
            Query::MaxPower(name) => {
                let result = self.circuit.max_power(name).map_err(|e| {
                    anyhow!(
                        "{} either is not a resistor, causes an invalid circuit or the maximum power tends to infinity ({})",
                        name,
                        e
                    )
                })?;
                Ok(format!(
                    "Maximum power transfer to resistor {} = {} watts at Rmax = {} ohms.",
                    name, result.power, result.resistance
                ))
            }
            Query::Due { source, query } => {
                if matches!(**query, Query::Due { .. }) {
                    bail!("superposition queries cannot be nested");
                }
                self.circuit.solve_due(source)?;
                self.respond(query)
            }
            response => {
                if !self.circuit.excitation().is_clean() {
                    self.circuit.solve()?;
                }
                self.respond(response)
            }
        }
    }

    fn respond(&self, query: &Query) -> Result<String> {
        let circuit = &*self.circuit;
        match query {
            Query::Current(name) => {
                let current = circuit.get_current(name);
                if current == NOT_FOUND {
                    bail!("{} does not exist in the current circuit.", name);
                }
                let (pos, neg) = circuit.node_names(name).unwrap_or(("0", "0"));
                Ok(format!(
                    "Current through: {} {} amperes from Node[{}] to Node[{}].",
                    name, current, neg, pos
                ))
            }
            Query::Voltage(name) => {
                let voltage = circuit.get_voltage(name);
                if voltage == NOT_FOUND {
                    bail!("{} does not exist in the current circuit.", name);
                }
                match circuit.node_names(name) {
                    Some((pos, neg)) => Ok(format!(
                        "Voltage across {} = {} volts from Node[{}] to Node[{}].",
                        name, voltage, pos, neg
                    )),
                    None => Ok(format!("Potential of Node[{}] = {} volts.", name, voltage)),
                }
            }
            Query::PotentialDifference(a, b) => {
                let (va, vb) = (circuit.get_voltage(a), circuit.get_voltage(b));
                if va == NOT_FOUND || vb == NOT_FOUND {
                    bail!("Node does not exist.");
                }
                Ok(format!(
                    "Potential difference between Node [{}] and [{}] = {} volts.",
                    a,
                    b,
                    va - vb
                ))
            }
            Query::Power(name) => {
                if circuit.get_element(name).is_none() {
                    if circuit.get_node(name).is_some() {
                        bail!("Can not get power in a node.");
                    }
                    bail!("{} does not exist in the current circuit.", name);
                }
                Ok(format!("Power in {} = {} watts.", name, circuit.get_power(name)))
            }
            other => bail!("{:?} is not a direct response", other),
        }
    }

    /// Read queries line by line until `Q` or end of input. Failed queries are
    /// reported and the loop carries on.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, mut output: W) -> Result<()> {
        for line in input.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            debug!("Query: {}", line.trim());

            match Query::parse(&line).and_then(|query| {
                if query == Query::Quit {
                    return Ok(None);
                }
                self.execute(&query).map(Some)
            }) {
                Ok(None) => break,
                Ok(Some(answer)) => writeln!(output, "{}", answer)?,
                Err(e) => writeln!(output, "{}", format!("Error: {:#}", e).red())?,
            }
        }
        Ok(())
    }
}
