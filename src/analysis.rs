//! Analyses driven on a [`Circuit`]: the plain operating point, superposition
//! due to a single source, maximum power transfer and the power balance check.

use log::{debug, info, warn};
use serde::Serialize;

use crate::circuit::{Circuit, ElementKind, NOT_FOUND};
use crate::error::{CircuitError, Result};
use crate::mna::{Excitation, MnaSystem, Probe};
use crate::solver::SolverStats;

/// Largest relative mismatch between dissipated and supplied power still
/// reported as balanced.
pub const POWER_BALANCE_TOLERANCE: f64 = 0.01;

/// Probe currents below this are taken as zero, i.e. Rth above 1 TΩ is infinite.
pub const MIN_PROBE_CURRENT: f64 = 1e-12;

/// Result of a maximum power transfer analysis on one resistor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MaxPower {
    /// Maximum power deliverable to the resistor, Vth² / (4·Rth).
    pub power: f64,
    /// Load resistance achieving it, equal to Rth.
    pub resistance: f64,
    /// Open-circuit voltage across the resistor terminals.
    pub thevenin_voltage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PowerBalance {
    pub dissipated: f64,
    pub supplied: f64,
    pub balanced: bool,
}

impl Circuit {
    /// Solve the circuit with every source active and deploy node voltages and
    /// voltage source currents onto the model.
    ///
    /// Leaves any superposition state first. On failure nothing is deployed.
    pub fn solve(&mut self) -> Result<SolverStats> {
        if !self.excitation.is_clean() {
            self.clean_up_sp();
        }
        let (system, stats) = self.run(Excitation::All, None)?;
        self.deploy(&system);
        info!("Operating point solved ({} unknowns)", stats.size);
        Ok(stats)
    }

    /// Superposition: solve with only `source_name` active, every other source
    /// zeroed. The circuit stays in that state until the next `solve`,
    /// `solve_due` or [`Circuit::clean_up_sp`].
    pub fn solve_due(&mut self, source_name: &str) -> Result<SolverStats> {
        let id = self
            .element_id(source_name)
            .ok_or_else(|| CircuitError::ElementNotFound(source_name.to_string()))?;
        if !self.element(id).kind().is_source() {
            warn!("{} does not exist or is not a source", source_name);
            return Err(CircuitError::NotASource(source_name.to_string()));
        }

        if !self.excitation.is_clean() {
            self.clean_up_sp();
        }
        self.excitation = Excitation::Only(id);

        let (system, stats) = self.run(self.excitation, None)?;
        self.deploy(&system);
        info!("Solved due to '{}' alone", source_name);
        Ok(stats)
    }

    /// Re-enable every source. Idempotent.
    pub fn clean_up_sp(&mut self) {
        if !self.excitation.is_clean() {
            debug!("Leaving superposition state {:?}", self.excitation);
        }
        self.excitation = Excitation::All;
    }

    /// Maximum power transfer to resistor `name` by Thevenin's theorem.
    ///
    /// Two probe solves are made: the resistor opened (Vth across its
    /// terminals), then the resistor replaced by a lone 1 V source with every
    /// other source zeroed (Rth = 1 / i). Neither solve is deployed and the
    /// circuit's collections and superposition state are not touched.
    pub fn max_power(&self, name: &str) -> Result<MaxPower> {
        let id = self
            .element_id(name)
            .ok_or_else(|| CircuitError::ElementNotFound(name.to_string()))?;
        let element = self.element(id);
        if element.kind() != ElementKind::Resistor {
            return Err(CircuitError::NotAResistor(name.to_string()));
        }
        let (pos, neg) = element
            .terminals()
            .ok_or_else(|| CircuitError::UnconnectedElement(name.to_string()))?;

        let (open, _) = self.run(Excitation::All, Some(Probe::Open(id)))?;
        let thevenin_voltage = open.get_voltage_across(self, pos, neg);

        let (driven, _) = self.run(Excitation::Only(id), Some(Probe::UnitSource(id)))?;
        let current = driven.get_probe_current().unwrap_or(0.0);
        if current.abs() < MIN_PROBE_CURRENT {
            return Err(CircuitError::InfiniteResistance(name.to_string()));
        }

        let resistance = 1.0 / current;
        let power = thevenin_voltage * thevenin_voltage / (4.0 * resistance);
        debug!(
            "Thevenin equivalent at '{}': Vth = {:.6} V, Rth = {:.6} ohm",
            name, thevenin_voltage, resistance
        );

        Ok(MaxPower {
            power,
            resistance,
            thevenin_voltage,
        })
    }

    /// [`Circuit::max_power`] as `(power, Rmax)`, with `(NOT_FOUND, -1)` when the
    /// analysis fails.
    pub fn get_max_power(&self, name: &str) -> (f64, f64) {
        self.max_power(name)
            .map(|result| (result.power, result.resistance))
            .unwrap_or((NOT_FOUND, -1.0))
    }

    /// Sum the power of every element: positive contributions count as
    /// dissipated, negative ones as supplied.
    pub fn check_power_balance(&self) -> PowerBalance {
        let mut dissipated = 0.0;
        let mut supplied = 0.0;

        for (id, _) in self.elements() {
            let p = self.element_power(id).unwrap_or(0.0);
            if p > 0.0 {
                dissipated += p;
            } else {
                supplied -= p;
            }
        }

        let balanced = if supplied > 0.0 {
            ((dissipated - supplied) / supplied).abs() < POWER_BALANCE_TOLERANCE
        } else {
            dissipated <= f64::EPSILON
        };
        if !balanced {
            warn!(
                "Power is not balanced: dissipated {:.6} W, supplied {:.6} W",
                dissipated, supplied
            );
        }

        PowerBalance {
            dissipated,
            supplied,
            balanced,
        }
    }

    fn run(&self, excitation: Excitation, probe: Option<Probe>) -> Result<(MnaSystem, SolverStats)> {
        let mut system = MnaSystem::assemble(self, excitation, probe)?;
        let (solution, stats) = self
            .solver
            .solve(&system.matrix, &system.rhs)
            .map_err(|e| {
                warn!("Solve failed: {}", e);
                e
            })?;
        system.update_solution(&solution)?;
        Ok((system, stats))
    }

    fn deploy(&mut self, system: &MnaSystem) {
        for node in &mut self.nodes {
            node.voltage = system.get_node_voltage(node.unknown());
        }
        for &id in &self.voltage_sources {
            self.elements[id.0].branch_current =
                system.get_voltage_source_current(id).unwrap_or(0.0);
        }
    }
}
