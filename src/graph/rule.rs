use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{GraphError, RuleError};

/// What a successful action reports back to the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionOutput {
    /// Dependencies that could not be resolved but did not fail the rule
    pub unresolved: usize,
}

/// The work behind a rule. It must write every declared output on success.
#[async_trait]
pub trait Action: Send + Sync {
    async fn run(&self) -> Result<ActionOutput, RuleError>;
}

#[derive(Clone)]
pub struct BuildRule {
    pub name: String,
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
    pub action: Arc<dyn Action>,
}

impl BuildRule {
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<PathBuf>,
        outputs: Vec<PathBuf>,
        action: Arc<dyn Action>,
    ) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
            action,
        }
    }
}

impl fmt::Debug for BuildRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildRule")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish_non_exhaustive()
    }
}

/// A validated rule DAG. Edges run from the producer of a path to every
/// rule that lists the path as an input.
#[derive(Debug)]
pub struct BuildGraph {
    rules: Vec<BuildRule>,
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    order: Vec<usize>,
}

impl BuildGraph {
    /// Rejects duplicate names, paths produced by two rules and cycles.
    pub fn new(rules: Vec<BuildRule>) -> Result<Self, GraphError> {
        let mut names: HashMap<&str, usize> = HashMap::new();
        let mut producers: HashMap<&PathBuf, usize> = HashMap::new();
        for (idx, rule) in rules.iter().enumerate() {
            if names.insert(rule.name.as_str(), idx).is_some() {
                return Err(GraphError::DuplicateRule(rule.name.clone()));
            }
            for output in &rule.outputs {
                if let Some(first) = producers.insert(output, idx) {
                    return Err(GraphError::DuplicateOutput {
                        path: output.clone(),
                        first: rules[first].name.clone(),
                        second: rule.name.clone(),
                    });
                }
            }
        }

        let mut dependencies = vec![Vec::new(); rules.len()];
        let mut dependents = vec![Vec::new(); rules.len()];
        for (idx, rule) in rules.iter().enumerate() {
            let producers_of_inputs: BTreeSet<usize> = rule
                .inputs
                .iter()
                .filter_map(|input| producers.get(input).copied())
                .collect();
            for producer in producers_of_inputs {
                dependencies[idx].push(producer);
                dependents[producer].push(idx);
            }
        }

        let order = topological_order(&rules, &dependencies, &dependents)?;
        Ok(Self {
            rules,
            dependencies,
            dependents,
            order,
        })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[BuildRule] {
        &self.rules
    }

    pub fn rule(&self, idx: usize) -> &BuildRule {
        &self.rules[idx]
    }

    pub fn find(&self, name: &str) -> Option<&BuildRule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Rules producing the inputs of rule `idx`.
    pub fn dependencies(&self, idx: usize) -> &[usize] {
        &self.dependencies[idx]
    }

    /// Rules consuming outputs of rule `idx`.
    pub fn dependents(&self, idx: usize) -> &[usize] {
        &self.dependents[idx]
    }

    /// Rule indices with every producer before its consumers.
    pub fn order(&self) -> &[usize] {
        &self.order
    }
}

fn topological_order(
    rules: &[BuildRule],
    dependencies: &[Vec<usize>],
    dependents: &[Vec<usize>],
) -> Result<Vec<usize>, GraphError> {
    let mut in_degree: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut queue: VecDeque<usize> = (0..rules.len()).filter(|&i| in_degree[i] == 0).collect();

    let mut order = Vec::with_capacity(rules.len());
    while let Some(idx) = queue.pop_front() {
        order.push(idx);
        for &dependent in &dependents[idx] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                queue.push_back(dependent);
            }
        }
    }

    if order.len() < rules.len() {
        let mut stuck: Vec<String> = (0..rules.len())
            .filter(|&i| in_degree[i] > 0)
            .map(|i| rules[i].name.clone())
            .collect();
        stuck.sort();
        return Err(GraphError::Cycle(stuck));
    }
    Ok(order)
}
