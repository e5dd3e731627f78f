use std::collections::HashMap;

use log::trace;
use nalgebra::{DMatrix, DVector};

use crate::circuit::{Circuit, ElementId, ElementKind, NodeId};
use crate::error::{CircuitError, Result};

/// Which independent sources drive the circuit during a solve.
///
/// `All` is the clean state. `Only(id)` is the superposition state left behind
/// by `solve_due`: every source but `id` is replaced by its zero-valued
/// equivalent (0 V or 0 A), not removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Excitation {
    #[default]
    All,
    Only(ElementId),
}

impl Excitation {
    /// Returns true if the source `id` keeps its value under this excitation
    pub fn admits(&self, id: ElementId) -> bool {
        match self {
            Excitation::All => true,
            Excitation::Only(active) => *active == id,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, Excitation::All)
    }
}

/// Temporary reinterpretation of one resistor while extracting its Thevenin
/// equivalent. The circuit itself is never modified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Stamp the resistor as a 0 A current source (open circuit).
    Open(ElementId),
    /// Stamp the resistor as a 1 V voltage source owning one extra trailing
    /// branch column.
    UnitSource(ElementId),
}

/// How one element enters the KCL row of one of its nodes.
enum Stamp {
    Conductance(f64),
    Injection(f64),
    Branch(usize),
}

/// MNA system representation: [A][x] = [b]
///
/// Unknowns are laid out as `[node voltages by node unknown; voltage source
/// branch currents by source position; probe branch current]`.
#[derive(Debug, Clone)]
pub struct MnaSystem {
    /// System matrix A (coefficient matrix)
    pub matrix: DMatrix<f64>,
    /// Right-hand side vector b
    pub rhs: DVector<f64>,
    /// Unknown vector x, filled by [`MnaSystem::update_solution`]
    pub unknowns: DVector<f64>,
    /// Mapping from voltage sources to their branch current column
    pub voltage_source_map: HashMap<ElementId, usize>,
    pub size: usize,
    /// Number of nodes (excluding ground)
    pub num_nodes: usize,
    pub num_voltage_sources: usize,
    /// Branch column of a [`Probe::UnitSource`], if any.
    pub probe_branch: Option<usize>,
}

impl MnaSystem {
    /// Build A and b for the circuit under the given excitation and probe.
    ///
    /// Fails without producing anything if an element is not fully wired.
    pub fn assemble(circuit: &Circuit, excitation: Excitation, probe: Option<Probe>) -> Result<Self> {
        if let Some((_, element)) = circuit.elements().find(|(_, e)| !e.is_connected()) {
            return Err(CircuitError::UnconnectedElement(element.name().to_string()));
        }

        let num_nodes = circuit.unknown_node_count();
        let num_voltage_sources = circuit.num_voltage_sources();
        let probe_branch = match probe {
            Some(Probe::UnitSource(_)) => Some(num_nodes + num_voltage_sources),
            _ => None,
        };
        let size = num_nodes + num_voltage_sources + usize::from(probe_branch.is_some());

        let voltage_source_map: HashMap<ElementId, usize> = circuit
            .voltage_source_ids()
            .iter()
            .enumerate()
            .map(|(k, &id)| (id, num_nodes + k))
            .collect();

        let mut system = MnaSystem {
            matrix: DMatrix::zeros(size, size),
            rhs: DVector::zeros(size),
            unknowns: DVector::zeros(size),
            voltage_source_map,
            size,
            num_nodes,
            num_voltage_sources,
            probe_branch,
        };

        for index in 0..circuit.node_count() {
            system.add_node_row(circuit, NodeId(index), excitation, probe)?;
        }

        for &id in circuit.voltage_source_ids() {
            let row = system.voltage_source_map[&id];
            let value = if excitation.admits(id) {
                circuit.element(id).value()
            } else {
                0.0
            };
            system.add_voltage_row(circuit, id, row, value)?;
        }

        if let (Some(Probe::UnitSource(id)), Some(row)) = (probe, probe_branch) {
            let value = if excitation.admits(id) { 1.0 } else { 0.0 };
            system.add_voltage_row(circuit, id, row, value)?;
        }

        trace!("Assembled MNA system:\nA = {}b = {}", system.matrix, system.rhs);
        Ok(system)
    }

    fn stamp_for(
        &self,
        circuit: &Circuit,
        id: ElementId,
        excitation: Excitation,
        probe: Option<Probe>,
    ) -> Stamp {
        match probe {
            Some(Probe::Open(p)) if p == id => return Stamp::Injection(0.0),
            Some(Probe::UnitSource(p)) if p == id => {
                if let Some(col) = self.probe_branch {
                    return Stamp::Branch(col);
                }
            }
            _ => {}
        }

        let element = circuit.element(id);
        match element.kind() {
            ElementKind::Resistor => Stamp::Conductance(1.0 / element.value()),
            ElementKind::CurrentSource => {
                if excitation.admits(id) {
                    Stamp::Injection(element.value())
                } else {
                    Stamp::Injection(0.0)
                }
            }
            ElementKind::VoltageSource => Stamp::Branch(self.voltage_source_map[&id]),
        }
    }

    /// KCL row of one non-ground node: sum of currents leaving the node = injected current.
    fn add_node_row(
        &mut self,
        circuit: &Circuit,
        node_id: NodeId,
        excitation: Excitation,
        probe: Option<Probe>,
    ) -> Result<()> {
        let node = circuit.node(node_id);
        let Some(row) = node.unknown() else {
            return Ok(());
        };

        for &id in node.elements() {
            let element = circuit.element(id);
            let is_pos = element.pos() == Some(node_id);

            match self.stamp_for(circuit, id, excitation, probe) {
                Stamp::Conductance(g) => {
                    self.matrix[(row, row)] += g;
                    let far = element
                        .other_terminal(node_id)
                        .ok_or_else(|| CircuitError::UnconnectedElement(element.name().to_string()))?;
                    if let Some(col) = circuit.node(far).unknown() {
                        self.matrix[(row, col)] -= g;
                    }
                }
                Stamp::Injection(current) => {
                    self.rhs[row] += if is_pos { current } else { -current };
                }
                Stamp::Branch(col) => {
                    self.matrix[(row, col)] += if is_pos { -1.0 } else { 1.0 };
                }
            }
        }

        Ok(())
    }

    /// Voltage constraint row: V(pos) - V(neg) = value
    fn add_voltage_row(&mut self, circuit: &Circuit, id: ElementId, row: usize, value: f64) -> Result<()> {
        let element = circuit.element(id);
        let (pos, neg) = element
            .terminals()
            .ok_or_else(|| CircuitError::UnconnectedElement(element.name().to_string()))?;

        if let Some(col) = circuit.node(pos).unknown() {
            self.matrix[(row, col)] = 1.0;
        }
        if let Some(col) = circuit.node(neg).unknown() {
            self.matrix[(row, col)] = -1.0;
        }
        self.rhs[row] = value;

        Ok(())
    }

    /// Update the solution vector
    pub fn update_solution(&mut self, solution: &DVector<f64>) -> Result<()> {
        if solution.len() != self.size {
            return Err(CircuitError::DecompositionFailed);
        }
        self.unknowns.copy_from(solution);
        Ok(())
    }

    /// Potential of the node with the given unknown index, 0 for ground.
    pub fn get_node_voltage(&self, unknown: Option<usize>) -> f64 {
        unknown.map_or(0.0, |i| self.unknowns[i])
    }

    pub fn get_voltage_source_current(&self, id: ElementId) -> Option<f64> {
        self.voltage_source_map.get(&id).map(|&i| self.unknowns[i])
    }

    pub fn get_probe_current(&self) -> Option<f64> {
        self.probe_branch.map(|i| self.unknowns[i])
    }

    /// Voltage between two nodes of the solved system.
    pub fn get_voltage_across(&self, circuit: &Circuit, pos: NodeId, neg: NodeId) -> f64 {
        self.get_node_voltage(circuit.node(pos).unknown())
            - self.get_node_voltage(circuit.node(neg).unknown())
    }
}
