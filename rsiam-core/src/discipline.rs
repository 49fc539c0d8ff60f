//! Declared inputs and outputs of an engine.
//!
//! Each engine describes the tables it consumes and produces.
//! The [`crate::coupling`] module wires engines together from these declarations.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;

#[derive(Debug, Eq, PartialEq, Clone, Copy, Hash, Serialize, Deserialize)]
pub enum RequirementType {
    /// Table read from another engine or from exogenous data
    Input,
    /// Table published by the engine
    Output,
}

/// A table an engine consumes or produces, with the columns it relies on
#[derive(Debug, Eq, PartialEq, Clone, Hash, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<String>,
    pub unit: String,
    pub requirement_type: RequirementType,
}

impl TableDefinition {
    pub fn new(
        name: &str,
        columns: &[&str],
        unit: &str,
        requirement_type: RequirementType,
    ) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unit: unit.to_string(),
            requirement_type,
        }
    }

    pub fn input(name: &str, columns: &[&str], unit: &str) -> Self {
        Self::new(name, columns, unit, RequirementType::Input)
    }

    pub fn output(name: &str, columns: &[&str], unit: &str) -> Self {
        Self::new(name, columns, unit, RequirementType::Output)
    }

    /// Same as [`TableDefinition::new`] for column names built at runtime
    pub fn with_columns(
        name: &str,
        columns: Vec<String>,
        unit: &str,
        requirement_type: RequirementType,
    ) -> Self {
        Self {
            name: name.to_string(),
            columns,
            unit: unit.to_string(),
            requirement_type,
        }
    }
}

/// An engine as seen by the coupling graph
#[typetag::serde(tag = "type")]
pub trait Discipline: Debug + Send + Sync {
    /// Unique name of this engine instance
    fn name(&self) -> String;

    fn definitions(&self) -> Vec<TableDefinition>;

    fn inputs(&self) -> Vec<TableDefinition> {
        self.definitions()
            .into_iter()
            .filter(|d| d.requirement_type == RequirementType::Input)
            .collect()
    }

    fn outputs(&self) -> Vec<TableDefinition> {
        self.definitions()
            .into_iter()
            .filter(|d| d.requirement_type == RequirementType::Output)
            .collect()
    }

    fn input_names(&self) -> Vec<String> {
        self.inputs().into_iter().map(|d| d.name).collect()
    }

    fn output_names(&self) -> Vec<String> {
        self.outputs().into_iter().map(|d| d.name).collect()
    }
}
