//! Deck parser for the node-by-node element entry format.
//!
//! Each non-comment line names a node followed by the elements attached to it:
//!
//! ```text
//! * node  elements...
//! 0       E1 -5   R1 10
//! 1       E1 5    R1 10
//! ```
//!
//! The first node listed is ground. Element tokens start with `R` (resistor),
//! `E` (voltage source) or `J` (current source). A source is entered at both of
//! its nodes with opposite signs; the node where it is entered first becomes
//! its positive terminal.

use std::fs;

use anyhow::{anyhow, bail, Context, Result};
use lazy_static::lazy_static;
use log::debug;
use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    combinator::{all_consuming, map, opt},
    number::complete::double,
    IResult,
};
use regex::Regex;

use crate::circuit::{Circuit, ElementKind};
use crate::solver::SolverConfig;

lazy_static! {
    static ref ELEMENT_PATTERN: Regex = Regex::new(r"^([RrEeJj])(\w*)$").unwrap();
    static ref NODE_PATTERN: Regex = Regex::new(r"^\w+$").unwrap();
}

/// One element entry on a node line.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub name: String,
    pub kind: ElementKind,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeLine {
    pub node: String,
    pub line: usize,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Deck {
    pub nodes: Vec<NodeLine>,
}

impl Deck {
    pub fn parse_file(filename: &str) -> Result<Deck> {
        let content = fs::read_to_string(filename)
            .with_context(|| format!("Failed to read deck '{}'", filename))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Deck> {
        let mut nodes = Vec::new();

        for (index, raw) in content.lines().enumerate() {
            let line_num = index + 1;
            let line = strip_comment(raw);
            if line.is_empty() {
                continue;
            }

            let mut tokens = line.split_whitespace();
            let node = tokens.next().unwrap_or_default();
            if !NODE_PATTERN.is_match(node) {
                bail!("line {}: invalid node name '{}'", line_num, node);
            }

            let mut entries = Vec::new();
            while let Some(token) = tokens.next() {
                let value_token = tokens
                    .next()
                    .ok_or_else(|| anyhow!("line {}: element '{}' has no value", line_num, token))?;
                let value = parse_value(value_token)
                    .with_context(|| format!("line {}: element '{}'", line_num, token))?;
                entries.push(parse_entry(token, value).with_context(|| format!("line {}", line_num))?);
            }

            nodes.push(NodeLine {
                node: node.to_string(),
                line: line_num,
                entries,
            });
        }

        debug!("Parsed deck with {} node lines", nodes.len());
        Ok(Deck { nodes })
    }

    /// Build a circuit, adding each node followed by the elements entered on it.
    ///
    /// Topology is not validated here; call [`Circuit::check_circuit`] afterwards.
    pub fn build(&self) -> Result<Circuit> {
        self.build_with(SolverConfig::default())
    }

    /// [`Deck::build`] with a custom solver configuration.
    pub fn build_with(&self, config: SolverConfig) -> Result<Circuit> {
        let mut circuit = Circuit::with_solver_config(config);

        for node_line in &self.nodes {
            circuit
                .add_node(&node_line.node)
                .with_context(|| format!("line {}", node_line.line))?;
            for entry in &node_line.entries {
                circuit
                    .add_element(&entry.name, entry.value, &node_line.node, entry.kind)
                    .with_context(|| format!("line {}: element addition failed", node_line.line))?;
            }
        }

        Ok(circuit)
    }
}

fn strip_comment(line: &str) -> &str {
    let line = line.trim();
    if line.starts_with('*') {
        return "";
    }
    match line.find(['#', ';']) {
        Some(pos) => line[..pos].trim_end(),
        None => line,
    }
}

/// Element kind for a token type letter.
///
/// A resistor of value 0 is an ideal short and is entered as a 0 V voltage
/// source so it gets a branch current unknown instead of an infinite conductance.
pub fn element_kind(type_char: char, value: f64) -> Option<ElementKind> {
    match type_char.to_ascii_uppercase() {
        'J' => Some(ElementKind::CurrentSource),
        'E' => Some(ElementKind::VoltageSource),
        'R' if value < 0.0 => None,
        'R' if value == 0.0 => Some(ElementKind::VoltageSource),
        'R' => Some(ElementKind::Resistor),
        _ => None,
    }
}

fn parse_entry(token: &str, value: f64) -> Result<Entry> {
    let captures = ELEMENT_PATTERN
        .captures(token)
        .ok_or_else(|| anyhow!("unrecognized element '{}', expected R/E/J", token))?;
    let type_char = captures[1]
        .chars()
        .next()
        .ok_or_else(|| anyhow!("empty element token"))?;
    let kind = element_kind(type_char, value)
        .ok_or_else(|| anyhow!("negative resistance {} for '{}'", value, token))?;

    Ok(Entry {
        name: format!("{}{}", type_char.to_ascii_uppercase(), &captures[2]),
        kind,
        value,
    })
}

fn suffix(input: &str) -> IResult<&str, f64> {
    alt((
        map(tag_no_case("meg"), |_| 1e6),
        map(tag_no_case("f"), |_| 1e-15),
        map(tag_no_case("p"), |_| 1e-12),
        map(tag_no_case("n"), |_| 1e-9),
        map(tag_no_case("u"), |_| 1e-6),
        map(tag_no_case("m"), |_| 1e-3),
        map(tag_no_case("k"), |_| 1e3),
        map(tag_no_case("g"), |_| 1e9),
    ))(input)
}

fn scaled_value(input: &str) -> IResult<&str, f64> {
    let (input, number) = double(input)?;
    let (input, scale) = opt(suffix)(input)?;
    Ok((input, number * scale.unwrap_or(1.0)))
}

/// Parse a numeric value with an optional SI suffix (e.g. "4.7k", "10m", "1meg").
pub fn parse_value(token: &str) -> Result<f64> {
    all_consuming(scaled_value)(token.trim())
        .map(|(_, value)| value)
        .map_err(|_| anyhow!("invalid value '{}'", token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::SolverMethod;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_value() {
        assert_relative_eq!(parse_value("10").unwrap(), 10.0);
        assert_relative_eq!(parse_value("4.7k").unwrap(), 4700.0);
        assert_relative_eq!(parse_value("-5").unwrap(), -5.0);
        assert_relative_eq!(parse_value("10m").unwrap(), 0.01);
        assert_relative_eq!(parse_value("2MEG").unwrap(), 2e6);
        assert_relative_eq!(parse_value("100n").unwrap(), 1e-7);
        assert!(parse_value("abc").is_err());
        assert!(parse_value("10x").is_err());
    }

    #[test]
    fn test_element_kind() {
        assert_eq!(element_kind('r', 10.0), Some(ElementKind::Resistor));
        assert_eq!(element_kind('R', 0.0), Some(ElementKind::VoltageSource));
        assert_eq!(element_kind('R', -1.0), None);
        assert_eq!(element_kind('e', -3.0), Some(ElementKind::VoltageSource));
        assert_eq!(element_kind('J', 1.0), Some(ElementKind::CurrentSource));
        assert_eq!(element_kind('X', 1.0), None);
    }

    #[test]
    fn test_parse_deck() {
        let deck = Deck::parse(
            "* single loop\n\
             0  e1 -5  R1 10   # ground\n\
             \n\
             1  E1 5   r1 10\n",
        )
        .unwrap();

        assert_eq!(deck.nodes.len(), 2);
        assert_eq!(deck.nodes[0].node, "0");
        assert_eq!(deck.nodes[0].line, 2);
        assert_eq!(
            deck.nodes[1].entries,
            vec![
                Entry { name: "E1".to_string(), kind: ElementKind::VoltageSource, value: 5.0 },
                Entry { name: "R1".to_string(), kind: ElementKind::Resistor, value: 10.0 },
            ]
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(Deck::parse("0 R1").is_err());
        assert!(Deck::parse("0 X1 10").is_err());
        assert!(Deck::parse("0 R1 -10").is_err());
        assert!(Deck::parse("n-1 R1 10").is_err());
    }

    #[test]
    fn test_build_circuit() {
        let deck = Deck::parse("0 E1 -5 R1 10\n1 E1 5 R1 10\n").unwrap();
        let circuit = deck.build().unwrap();

        assert_eq!(circuit.node_count(), 2);
        assert_eq!(circuit.element_count(), 2);
        assert!(circuit.check_circuit().is_ok());
        assert_eq!(circuit.node_names("E1"), Some(("0", "1")));
    }

    #[test]
    fn test_build_with_solver_config() {
        let deck = Deck::parse("0 E1 -5 R1 10\n1 E1 5 R1 10\n").unwrap();
        let config = SolverConfig {
            method: SolverMethod::Lu,
            residual_tolerance: 1e-3,
        };
        let mut circuit = deck.build_with(config.clone()).unwrap();

        assert_eq!(circuit.solver_config(), &config);
        assert_eq!(deck.build().unwrap().solver_config(), &SolverConfig::default());
        let stats = circuit.solve().unwrap();
        assert_eq!(stats.method_used, SolverMethod::Lu);
        assert_relative_eq!(circuit.voltage("1").unwrap(), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_build_rejects_mismatched_source() {
        let deck = Deck::parse("0 E1 -5 R1 10\n1 E1 4 R1 10\n").unwrap();
        let err = deck.build().unwrap_err();
        assert!(format!("{:#}", err).contains("E1"));
    }

    #[test]
    fn test_zero_resistor_is_a_short() {
        let deck = Deck::parse("0 E1 -5 R2 0 R1 10\n1 E1 5 R2 0 R3 1\n2 R3 1 R1 10\n").unwrap();
        let circuit = deck.build().unwrap();
        assert_eq!(
            circuit.get_element("R2").unwrap().kind(),
            ElementKind::VoltageSource
        );
        assert_eq!(circuit.num_voltage_sources(), 2);
    }
}
