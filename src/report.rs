use std::fs::File;

use anyhow::{Context, Result};
use log::info;
use serde::Serialize;

use crate::analysis::PowerBalance;
use crate::circuit::{Circuit, ElementKind};
use crate::cli::OutputFormat;

#[derive(Debug, Clone, Serialize)]
pub struct NodeRecord {
    pub name: String,
    pub voltage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ElementRecord {
    pub name: String,
    pub kind: ElementKind,
    pub pos: String,
    pub neg: String,
    pub voltage: f64,
    pub current: f64,
    pub power: f64,
}

/// Snapshot of the deployed solution of a circuit.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub nodes: Vec<NodeRecord>,
    pub elements: Vec<ElementRecord>,
    pub balance: PowerBalance,
}

impl Report {
    pub fn from_circuit(circuit: &Circuit) -> Self {
        let nodes = circuit
            .nodes()
            .map(|node| NodeRecord {
                name: node.name().to_string(),
                voltage: node.voltage(),
            })
            .collect();

        let elements = circuit
            .elements()
            .map(|(_, element)| {
                let name = element.name();
                let (pos, neg) = circuit.node_names(name).unwrap_or(("", ""));
                ElementRecord {
                    name: name.to_string(),
                    kind: element.kind(),
                    pos: pos.to_string(),
                    neg: neg.to_string(),
                    voltage: circuit.voltage(name).unwrap_or(f64::NAN),
                    current: circuit.current(name).unwrap_or(f64::NAN),
                    power: circuit.get_power(name),
                }
            })
            .collect();

        Report {
            nodes,
            elements,
            balance: circuit.check_power_balance(),
        }
    }

    /// Export the report to file
    pub fn export(&self, filename: &str, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Csv => self.export_csv(filename),
            OutputFormat::Json => self.export_json(filename),
        }
    }

    /// One row per element
    fn export_csv(&self, filename: &str) -> Result<()> {
        let file = File::create(filename)
            .with_context(|| format!("Failed to create '{}'", filename))?;
        let mut writer = csv::Writer::from_writer(file);

        writer.write_record(["name", "kind", "pos", "neg", "voltage", "current", "power"])?;
        for element in &self.elements {
            writer.write_record([
                element.name.clone(),
                element.kind.label().to_string(),
                element.pos.clone(),
                element.neg.clone(),
                element.voltage.to_string(),
                element.current.to_string(),
                element.power.to_string(),
            ])?;
        }

        writer.flush()?;
        info!("Results exported to CSV: {}", filename);
        Ok(())
    }

    fn export_json(&self, filename: &str) -> Result<()> {
        let file = File::create(filename)
            .with_context(|| format!("Failed to create '{}'", filename))?;
        serde_json::to_writer_pretty(file, self)?;

        info!("Results exported to JSON: {}", filename);
        Ok(())
    }
}
