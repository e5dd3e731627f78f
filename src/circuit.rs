use std::collections::HashMap;
use std::fmt;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{CircuitError, Result};
use crate::mna::Excitation;
use crate::solver::{LinearSolver, SolverConfig};

/// Sentinel returned by the `get_*` voltage/current queries for unknown names.
pub const NOT_FOUND: f64 = f64::MAX;

/// Stable handle of a node inside its circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

/// Stable handle of an element inside its circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementId(pub(crate) usize);

/// A circuit junction
#[derive(Debug, Clone)]
pub struct Node {
    name: String,
    /// Row/column of this node's potential in the MNA system, `None` for ground.
    unknown: Option<usize>,
    pub(crate) voltage: f64,
    elements: Vec<ElementId>,
}

impl Node {
    fn new(name: String, unknown: Option<usize>) -> Self {
        Node {
            name,
            unknown,
            voltage: 0.0,
            elements: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unknown(&self) -> Option<usize> {
        self.unknown
    }

    pub fn is_ground(&self) -> bool {
        self.unknown.is_none()
    }

    /// Last deployed potential. Always 0 for ground.
    pub fn voltage(&self) -> f64 {
        self.voltage
    }

    /// Elements incident on this node, in attachment order.
    pub fn elements(&self) -> &[ElementId] {
        &self.elements
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }
}

/// Types of circuit elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    /// `value` is the resistance in ohms, always > 0.
    Resistor,
    /// `value` is the current forced from the negative to the positive terminal.
    CurrentSource,
    /// `value` is V(pos) - V(neg).
    VoltageSource,
}

impl ElementKind {
    /// Returns true if this element is an independent source
    pub fn is_source(&self) -> bool {
        matches!(self, ElementKind::CurrentSource | ElementKind::VoltageSource)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ElementKind::Resistor => "resistor",
            ElementKind::CurrentSource => "current source",
            ElementKind::VoltageSource => "voltage source",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A two-terminal circuit element.
///
/// The first node an element is attached to becomes its positive terminal,
/// the second its negative terminal.
#[derive(Debug, Clone)]
pub struct Element {
    name: String,
    kind: ElementKind,
    value: f64,
    pos: Option<NodeId>,
    neg: Option<NodeId>,
    /// Deployed branch current, only meaningful for voltage sources.
    pub(crate) branch_current: f64,
}

impl Element {
    fn new(name: String, kind: ElementKind, value: f64) -> Self {
        Element {
            name,
            kind,
            value,
            pos: None,
            neg: None,
            branch_current: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn pos(&self) -> Option<NodeId> {
        self.pos
    }

    pub fn neg(&self) -> Option<NodeId> {
        self.neg
    }

    /// Both terminals as `(pos, neg)`, once the element is fully wired.
    pub fn terminals(&self) -> Option<(NodeId, NodeId)> {
        Some((self.pos?, self.neg?))
    }

    pub fn is_connected(&self) -> bool {
        self.terminals().is_some()
    }

    /// The terminal opposite to `node`, or `None` if `node` is not a terminal.
    pub fn other_terminal(&self, node: NodeId) -> Option<NodeId> {
        if self.pos == Some(node) {
            self.neg
        } else if self.neg == Some(node) {
            self.pos
        } else {
            None
        }
    }

    /// Resistance in ohms; sources report 0.
    pub fn resistance(&self) -> f64 {
        match self.kind {
            ElementKind::Resistor => self.value,
            ElementKind::CurrentSource | ElementKind::VoltageSource => 0.0,
        }
    }
}

/// Resistive DC network.
///
/// The circuit is the single owner of every node and element; everything
/// else refers to them through [`NodeId`] / [`ElementId`] handles.
#[derive(Debug, Clone)]
pub struct Circuit {
    pub(crate) nodes: Vec<Node>,
    pub(crate) elements: Vec<Element>,
    /// Voltage sources in insertion order; position `k` owns branch column `Nn + k`.
    pub(crate) voltage_sources: Vec<ElementId>,
    node_map: HashMap<String, NodeId>,
    element_map: HashMap<String, ElementId>,
    pub(crate) excitation: Excitation,
    pub(crate) solver: LinearSolver,
}

impl Default for Circuit {
    fn default() -> Self {
        Self::new()
    }
}

impl Circuit {
    pub fn new() -> Self {
        Self::with_solver_config(SolverConfig::default())
    }

    /// Create an empty circuit solved with a custom solver configuration
    pub fn with_solver_config(config: SolverConfig) -> Self {
        Circuit {
            nodes: Vec::new(),
            elements: Vec::new(),
            voltage_sources: Vec::new(),
            node_map: HashMap::new(),
            element_map: HashMap::new(),
            excitation: Excitation::All,
            solver: LinearSolver::with_config(config),
        }
    }

    /// Add a node. The first node ever added is ground.
    pub fn add_node(&mut self, name: &str) -> Result<NodeId> {
        if self.node_map.contains_key(name) {
            warn!("Rejected duplicate node '{}'", name);
            return Err(CircuitError::DuplicateNode(name.to_string()));
        }

        let id = NodeId(self.nodes.len());
        // Ground takes no equation; the rest are numbered from 0 in insertion order.
        let unknown = self.nodes.len().checked_sub(1);
        self.nodes.push(Node::new(name.to_string(), unknown));
        self.node_map.insert(name.to_string(), id);

        debug!("Added node '{}' (unknown {:?})", name, unknown);
        Ok(id)
    }

    /// Attach one terminal of element `name` to node `node_name`.
    ///
    /// The element is created on first use. Its first attachment fixes the
    /// positive terminal, the second the negative one. Sources must be entered
    /// with opposite values at their two ends. On error nothing is modified.
    pub fn add_element(
        &mut self,
        name: &str,
        value: f64,
        node_name: &str,
        kind: ElementKind,
    ) -> Result<ElementId> {
        let result = self.try_add_element(name, value, node_name, kind);
        if let Err(e) = &result {
            warn!("Element addition failed: {}", e);
        }
        result
    }

    fn try_add_element(
        &mut self,
        name: &str,
        value: f64,
        node_name: &str,
        kind: ElementKind,
    ) -> Result<ElementId> {
        let node_id = self
            .node_id(node_name)
            .ok_or_else(|| CircuitError::NodeNotFound(node_name.to_string()))?;

        if !value.is_finite() {
            return Err(CircuitError::InvalidValue {
                name: name.to_string(),
                value,
                reason: "value must be finite",
            });
        }
        if kind == ElementKind::Resistor && value <= 0.0 {
            return Err(CircuitError::InvalidValue {
                name: name.to_string(),
                value,
                reason: "resistance must be positive",
            });
        }

        let element_id = match self.element_id(name) {
            Some(existing_id) => {
                let existing = &self.elements[existing_id.0];
                if existing.kind != kind {
                    return Err(CircuitError::TypeMismatch {
                        name: name.to_string(),
                        existing: existing.kind.label(),
                        requested: kind.label(),
                    });
                }
                self.check_attachment(existing, node_id, value)?;
                existing_id
            }
            None => {
                let id = ElementId(self.elements.len());
                self.elements.push(Element::new(name.to_string(), kind, value));
                self.element_map.insert(name.to_string(), id);
                if kind == ElementKind::VoltageSource {
                    self.voltage_sources.push(id);
                }
                debug!("Created {} '{}' = {}", kind, name, value);
                id
            }
        };

        let element = &mut self.elements[element_id.0];
        if element.pos.is_none() {
            element.pos = Some(node_id);
        } else {
            element.neg = Some(node_id);
        }
        self.nodes[node_id.0].elements.push(element_id);

        Ok(element_id)
    }

    /// Validate attaching an already existing element to `node`.
    fn check_attachment(&self, element: &Element, node: NodeId, value: f64) -> Result<()> {
        let Some(pos) = element.pos else {
            return Ok(());
        };
        if pos == node {
            return Err(CircuitError::DuplicateTerminal {
                element: element.name.clone(),
                node: self.nodes[node.0].name.clone(),
            });
        }
        if element.neg.is_some() {
            return Err(CircuitError::TerminalsFull(element.name.clone()));
        }
        if element.kind.is_source() && element.value != -value {
            return Err(CircuitError::SourceValueMismatch {
                name: element.name.clone(),
                expected: -element.value,
                actual: value,
            });
        }
        Ok(())
    }

    /// Topology gate that must pass before solving: every node has at least two
    /// incident elements and every element has both terminals.
    pub fn check_circuit(&self) -> Result<()> {
        for node in &self.nodes {
            if node.element_count() < 2 {
                return Err(CircuitError::UnderConnectedNode {
                    node: node.name.clone(),
                    count: node.element_count(),
                });
            }
        }

        let sources = self.voltage_sources.iter().map(|id| &self.elements[id.0]);
        let others = self
            .elements
            .iter()
            .filter(|element| element.kind != ElementKind::VoltageSource);
        if let Some(element) = sources.chain(others).find(|element| !element.is_connected()) {
            return Err(CircuitError::UnconnectedElement(element.name.clone()));
        }

        Ok(())
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.node_map.get(name).copied()
    }

    pub fn element_id(&self, name: &str) -> Option<ElementId> {
        self.element_map.get(name).copied()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn element(&self, id: ElementId) -> &Element {
        &self.elements[id.0]
    }

    pub fn get_node(&self, name: &str) -> Option<&Node> {
        self.node_id(name).map(|id| self.node(id))
    }

    pub fn get_element(&self, name: &str) -> Option<&Element> {
        self.element_id(name).map(|id| self.element(id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// All elements in insertion order.
    pub fn elements(&self) -> impl Iterator<Item = (ElementId, &Element)> {
        self.elements
            .iter()
            .enumerate()
            .map(|(i, element)| (ElementId(i), element))
    }

    pub fn voltage_source_ids(&self) -> &[ElementId] {
        &self.voltage_sources
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of nodes that carry an equation (everything but ground).
    pub fn unknown_node_count(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn num_voltage_sources(&self) -> usize {
        self.voltage_sources.len()
    }

    /// Current superposition state; [`Excitation::All`] means clean.
    pub fn solver_config(&self) -> &SolverConfig {
        self.solver.config()
    }

    pub fn excitation(&self) -> Excitation {
        self.excitation
    }

    /// Row/column of a node potential or voltage-source branch current in the
    /// MNA system. Ground, resistors and current sources have none.
    pub fn unknown_index(&self, name: &str) -> Option<usize> {
        if let Some(node) = self.get_node(name) {
            return node.unknown();
        }
        let id = self.element_id(name)?;
        self.voltage_sources
            .iter()
            .position(|&vs| vs == id)
            .map(|k| self.unknown_node_count() + k)
    }

    /// Value a source currently drives, zero when the excitation switches it off.
    pub(crate) fn active_value(&self, id: ElementId) -> f64 {
        if self.excitation.admits(id) {
            self.elements[id.0].value
        } else {
            0.0
        }
    }

    pub(crate) fn element_voltage(&self, id: ElementId) -> Option<f64> {
        let element = &self.elements[id.0];
        match element.kind {
            ElementKind::VoltageSource => Some(self.active_value(id)),
            ElementKind::Resistor | ElementKind::CurrentSource => {
                let (pos, neg) = element.terminals()?;
                Some(self.nodes[pos.0].voltage - self.nodes[neg.0].voltage)
            }
        }
    }

    /// Current through the element, flowing from its negative to its positive terminal.
    pub(crate) fn element_current(&self, id: ElementId) -> Option<f64> {
        let element = &self.elements[id.0];
        match element.kind {
            ElementKind::Resistor => Some(-self.element_voltage(id)? / element.value),
            ElementKind::CurrentSource => Some(self.active_value(id)),
            ElementKind::VoltageSource => Some(element.branch_current),
        }
    }

    /// Power absorbed by the element; negative when it supplies power.
    pub(crate) fn element_power(&self, id: ElementId) -> Option<f64> {
        Some(-self.element_current(id)? * self.element_voltage(id)?)
    }

    /// Voltage across an element, or the potential of a node.
    pub fn voltage(&self, name: &str) -> Option<f64> {
        match self.element_id(name) {
            Some(id) => self.element_voltage(id),
            None => self.get_node(name).map(Node::voltage),
        }
    }

    pub fn current(&self, name: &str) -> Option<f64> {
        self.element_id(name).and_then(|id| self.element_current(id))
    }

    pub fn power(&self, name: &str) -> Option<f64> {
        self.element_id(name).and_then(|id| self.element_power(id))
    }

    pub fn resistance(&self, name: &str) -> Option<f64> {
        self.get_element(name).map(Element::resistance)
    }

    /// Names of the `(positive, negative)` terminal nodes of an element.
    pub fn node_names(&self, element_name: &str) -> Option<(&str, &str)> {
        let (pos, neg) = self.get_element(element_name)?.terminals()?;
        Some((self.nodes[pos.0].name(), self.nodes[neg.0].name()))
    }

    /// [`Circuit::voltage`] with [`NOT_FOUND`] for unknown names.
    pub fn get_voltage(&self, name: &str) -> f64 {
        self.voltage(name).unwrap_or(NOT_FOUND)
    }

    /// [`Circuit::current`] with [`NOT_FOUND`] for unknown names.
    pub fn get_current(&self, name: &str) -> f64 {
        self.current(name).unwrap_or(NOT_FOUND)
    }

    /// [`Circuit::power`] with 0 for unknown names.
    pub fn get_power(&self, name: &str) -> f64 {
        self.power(name).unwrap_or(0.0)
    }

    /// [`Circuit::resistance`] with -1 for unknown names.
    pub fn get_resistance(&self, name: &str) -> f64 {
        self.resistance(name).unwrap_or(-1.0)
    }

    /// Print circuit summary
    pub fn print_summary(&self) {
        println!("Nodes: {}", self.nodes.len());
        if let Some(ground) = self.nodes.first() {
            println!("Ground node: {}", ground.name);
        }
        println!("Elements: {}", self.elements.len());

        let mut type_counts: HashMap<ElementKind, usize> = HashMap::new();
        for element in &self.elements {
            *type_counts.entry(element.kind).or_insert(0) += 1;
        }
        for kind in [
            ElementKind::Resistor,
            ElementKind::CurrentSource,
            ElementKind::VoltageSource,
        ] {
            if let Some(count) = type_counts.get(&kind) {
                println!("  {}s: {}", kind.label(), count);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_node_circuit() -> Circuit {
        let mut circuit = Circuit::new();
        circuit.add_node("0").unwrap();
        circuit.add_node("1").unwrap();
        circuit
    }

    #[test]
    fn test_first_node_is_ground() {
        let mut circuit = Circuit::new();
        let ground = circuit.add_node("0").unwrap();
        let n1 = circuit.add_node("1").unwrap();
        let n2 = circuit.add_node("2").unwrap();

        assert!(circuit.node(ground).is_ground());
        assert_eq!(circuit.node(ground).unknown(), None);
        assert_eq!(circuit.node(n1).unknown(), Some(0));
        assert_eq!(circuit.node(n2).unknown(), Some(1));
        assert_eq!(circuit.unknown_node_count(), 2);
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut circuit = two_node_circuit();
        assert_eq!(
            circuit.add_node("1"),
            Err(CircuitError::DuplicateNode("1".to_string()))
        );
        assert_eq!(circuit.node_count(), 2);
    }

    #[test]
    fn test_terminal_order() {
        let mut circuit = two_node_circuit();
        let r1 = circuit.add_element("R1", 10.0, "1", ElementKind::Resistor).unwrap();
        circuit.add_element("R1", 10.0, "0", ElementKind::Resistor).unwrap();

        let element = circuit.element(r1);
        assert_eq!(element.pos(), circuit.node_id("1"));
        assert_eq!(element.neg(), circuit.node_id("0"));
        assert_eq!(circuit.node_names("R1"), Some(("1", "0")));
        assert_eq!(circuit.node(circuit.node_id("0").unwrap()).elements(), &[r1]);
    }

    #[test]
    fn test_duplicate_terminal_rejected() {
        let mut circuit = two_node_circuit();
        circuit.add_element("R1", 10.0, "1", ElementKind::Resistor).unwrap();
        let err = circuit
            .add_element("R1", 10.0, "1", ElementKind::Resistor)
            .unwrap_err();
        assert!(matches!(err, CircuitError::DuplicateTerminal { .. }));
        assert_eq!(circuit.get_node("1").unwrap().element_count(), 1);
    }

    #[test]
    fn test_third_terminal_rejected() {
        let mut circuit = two_node_circuit();
        circuit.add_node("2").unwrap();
        circuit.add_element("R1", 10.0, "1", ElementKind::Resistor).unwrap();
        circuit.add_element("R1", 10.0, "0", ElementKind::Resistor).unwrap();
        assert_eq!(
            circuit.add_element("R1", 10.0, "2", ElementKind::Resistor),
            Err(CircuitError::TerminalsFull("R1".to_string()))
        );
        assert_eq!(circuit.get_node("2").unwrap().element_count(), 0);
    }

    #[test]
    fn test_invalid_construction() {
        let mut circuit = two_node_circuit();
        assert!(matches!(
            circuit.add_element("R1", 10.0, "7", ElementKind::Resistor),
            Err(CircuitError::NodeNotFound(_))
        ));
        assert!(matches!(
            circuit.add_element("R1", 0.0, "1", ElementKind::Resistor),
            Err(CircuitError::InvalidValue { .. })
        ));
        assert!(matches!(
            circuit.add_element("R1", -4.0, "1", ElementKind::Resistor),
            Err(CircuitError::InvalidValue { .. })
        ));
        assert_eq!(circuit.element_count(), 0);
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let mut circuit = two_node_circuit();
        circuit.add_element("X1", 5.0, "1", ElementKind::VoltageSource).unwrap();
        let err = circuit
            .add_element("X1", -5.0, "0", ElementKind::CurrentSource)
            .unwrap_err();
        assert!(matches!(err, CircuitError::TypeMismatch { .. }));
        assert!(circuit.get_element("X1").unwrap().neg().is_none());
    }

    #[test]
    fn test_source_requires_opposite_value() {
        let mut circuit = two_node_circuit();
        circuit.add_element("J1", 2.0, "1", ElementKind::CurrentSource).unwrap();
        assert!(matches!(
            circuit.add_element("J1", 2.0, "0", ElementKind::CurrentSource),
            Err(CircuitError::SourceValueMismatch { .. })
        ));
        assert!(circuit.add_element("J1", -2.0, "0", ElementKind::CurrentSource).is_ok());
    }

    #[test]
    fn test_voltage_sources_get_branch_columns() {
        let mut circuit = two_node_circuit();
        circuit.add_node("2").unwrap();
        circuit.add_element("R1", 1.0, "1", ElementKind::Resistor).unwrap();
        circuit.add_element("E1", 1.0, "1", ElementKind::VoltageSource).unwrap();
        circuit.add_element("E2", 1.0, "2", ElementKind::VoltageSource).unwrap();

        assert_eq!(circuit.num_voltage_sources(), 2);
        assert_eq!(circuit.unknown_index("0"), None);
        assert_eq!(circuit.unknown_index("2"), Some(1));
        assert_eq!(circuit.unknown_index("E1"), Some(2));
        assert_eq!(circuit.unknown_index("E2"), Some(3));
        assert_eq!(circuit.unknown_index("R1"), None);
    }

    #[test]
    fn test_check_circuit() {
        let mut circuit = two_node_circuit();
        circuit.add_element("R1", 10.0, "1", ElementKind::Resistor).unwrap();
        circuit.add_element("R1", 10.0, "0", ElementKind::Resistor).unwrap();
        assert!(matches!(
            circuit.check_circuit(),
            Err(CircuitError::UnderConnectedNode { count: 1, .. })
        ));

        circuit.add_element("R2", 20.0, "1", ElementKind::Resistor).unwrap();
        circuit.add_element("R3", 30.0, "0", ElementKind::Resistor).unwrap();
        assert_eq!(
            circuit.check_circuit(),
            Err(CircuitError::UnconnectedElement("R2".to_string()))
        );

        circuit.add_element("R2", 20.0, "0", ElementKind::Resistor).unwrap();
        circuit.add_element("R3", 30.0, "1", ElementKind::Resistor).unwrap();
        assert!(circuit.check_circuit().is_ok());
    }

    #[test]
    fn test_query_sentinels() {
        let circuit = two_node_circuit();
        assert_eq!(circuit.get_voltage("nope"), NOT_FOUND);
        assert_eq!(circuit.get_current("nope"), NOT_FOUND);
        assert_eq!(circuit.get_power("nope"), 0.0);
        assert_eq!(circuit.get_resistance("nope"), -1.0);
        assert_eq!(circuit.get_voltage("1"), 0.0);
    }

    #[test]
    fn test_resistance_query() {
        let mut circuit = two_node_circuit();
        circuit.add_element("R1", 47.0, "1", ElementKind::Resistor).unwrap();
        circuit.add_element("E1", 3.0, "1", ElementKind::VoltageSource).unwrap();
        assert_eq!(circuit.resistance("R1"), Some(47.0));
        assert_eq!(circuit.resistance("E1"), Some(0.0));
    }
}
