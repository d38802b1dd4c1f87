use std::collections::HashMap;
use std::sync::Arc;

use crate::step::{Field, OTHER_MARKER, StepId, TECH_UNKNOWN, TextField};

/// Type alias for edge condition functions over the selected value
pub type ValueCondition = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Edge taken when an option for `field` is selected
#[derive(Clone)]
pub struct Edge {
    pub field: Field,
    pub to: StepId,
    pub condition: Option<ValueCondition>,
}

/// The wizard's branching graph: which step follows an answer.
#[derive(Clone, Default)]
pub struct TransitionTable {
    edges: Vec<Edge>,
    text_edges: HashMap<TextField, StepId>,
}

impl TransitionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unconditional edge for a field
    pub fn add_edge(&mut self, field: Field, to: StepId) -> &mut Self {
        self.edges.push(Edge {
            field,
            to,
            condition: None,
        });
        self
    }

    /// Add an edge taken only when the selected value satisfies `condition`
    pub fn add_conditional_edge<F>(&mut self, field: Field, condition: F, to: StepId) -> &mut Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.edges.push(Edge {
            field,
            to,
            condition: Some(Arc::new(condition)),
        });
        self
    }

    /// Step shown after free text for `field` has been received
    pub fn add_text_edge(&mut self, field: TextField, to: StepId) -> &mut Self {
        self.text_edges.insert(field, to);
        self
    }

    /// Find the next step for a selected option.
    ///
    /// Conditional edges win over default ones regardless of insertion order.
    pub fn next_for_option(&self, field: Field, value: &str) -> Option<StepId> {
        let candidates = || self.edges.iter().filter(|e| e.field == field);

        candidates()
            .find(|e| e.condition.as_ref().is_some_and(|cond| cond(value)))
            .or_else(|| candidates().find(|e| e.condition.is_none()))
            .map(|e| e.to)
    }

    pub fn next_for_text(&self, field: TextField) -> Option<StepId> {
        self.text_edges.get(&field).copied()
    }
}

/// Builder for creating transition tables
#[derive(Default)]
pub struct TransitionTableBuilder {
    table: TransitionTable,
}

impl TransitionTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(mut self, field: Field, to: StepId) -> Self {
        self.table.add_edge(field, to);
        self
    }

    pub fn add_conditional_edge<F>(mut self, field: Field, condition: F, to: StepId) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.table.add_conditional_edge(field, condition, to);
        self
    }

    pub fn add_text_edge(mut self, field: TextField, to: StepId) -> Self {
        self.table.add_text_edge(field, to);
        self
    }

    pub fn build(self) -> TransitionTable {
        self.table
    }
}

/// The order wizard graph.
///
/// Scans go straight to review and ideas straight to the attachment step;
/// only prints ask for a material.
pub fn order_wizard() -> TransitionTable {
    TransitionTableBuilder::new()
        .add_conditional_edge(Field::Technology, |v| v == TECH_UNKNOWN, StepId::AttachFile)
        .add_edge(Field::Technology, StepId::PrintMaterial)
        .add_conditional_edge(
            Field::Material,
            |v| v.contains(OTHER_MARKER),
            StepId::PrintMaterialCustom,
        )
        .add_edge(Field::Material, StepId::AttachFile)
        .add_edge(Field::ScanType, StepId::Review)
        .add_edge(Field::IdeaType, StepId::AttachFile)
        .add_edge(Field::File, StepId::Review)
        .add_text_edge(TextField::MaterialCustom, StepId::AttachFile)
        .add_text_edge(TextField::Description, StepId::Review)
        .build()
}
