//! Static declaration of the classification DAG.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;
use thiserror::Error;

use crate::job::{Job, StepStatus};

use super::StepName;

/// Errors raised when a pipeline declaration is not a valid DAG.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("pipeline has no steps")]
    Empty,

    #[error("step {0} is declared more than once")]
    DuplicateStep(StepName),

    #[error("step {step} depends on undeclared step {dependency}")]
    UnknownDependency {
        step: StepName,
        dependency: StepName,
    },

    #[error("dependency cycle through step {0}")]
    Cycle(StepName),
}

/// One step of a pipeline and the steps whose outputs it reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStep {
    pub name: StepName,
    pub depends_on: Vec<StepName>,
}

impl PipelineStep {
    pub fn new(name: StepName, depends_on: &[StepName]) -> Self {
        Self {
            name,
            depends_on: depends_on.to_vec(),
        }
    }
}

/// A validated step DAG.
///
/// The definition is pure data: every query reads a [`Job`] snapshot and
/// never touches storage.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineDefinition {
    name: String,
    steps: Vec<PipelineStep>,
}

impl PipelineDefinition {
    /// Build and validate a pipeline.
    pub fn new(name: impl Into<String>, steps: Vec<PipelineStep>) -> Result<Self, PipelineError> {
        let definition = Self {
            name: name.into(),
            steps,
        };
        definition.validate()?;
        Ok(definition)
    }

    /// The "classify ticket" pipeline.
    ///
    /// Sentiment, keywords, summary and embedding read only the ticket.
    /// Urgency reads sentiment and summary, intent and product area read the
    /// summary, and indexing runs last over everything.
    pub fn classify_ticket() -> Self {
        use StepName::*;

        Self {
            name: "classify_ticket".to_string(),
            steps: vec![
                PipelineStep::new(SentimentAnalysis, &[]),
                PipelineStep::new(KeywordExtraction, &[]),
                PipelineStep::new(Summarization, &[]),
                PipelineStep::new(EmbeddingGeneration, &[]),
                PipelineStep::new(UrgencyClassification, &[SentimentAnalysis, Summarization]),
                PipelineStep::new(IntentClassification, &[Summarization]),
                PipelineStep::new(ProductAreaClassification, &[Summarization]),
                PipelineStep::new(
                    Indexing,
                    &[
                        SentimentAnalysis,
                        KeywordExtraction,
                        Summarization,
                        EmbeddingGeneration,
                        UrgencyClassification,
                        IntentClassification,
                        ProductAreaClassification,
                    ],
                ),
            ],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Step names in declaration order.
    pub fn steps(&self) -> Vec<StepName> {
        self.steps.iter().map(|s| s.name).collect()
    }

    pub fn contains(&self, step: StepName) -> bool {
        self.steps.iter().any(|s| s.name == step)
    }

    /// Declared prerequisites of a step (empty for unknown steps).
    pub fn dependencies(&self, step: StepName) -> &[StepName] {
        self.steps
            .iter()
            .find(|s| s.name == step)
            .map(|s| s.depends_on.as_slice())
            .unwrap_or(&[])
    }

    /// Check for duplicates, dangling dependencies and cycles.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.steps.is_empty() {
            return Err(PipelineError::Empty);
        }

        let mut declared = HashSet::new();
        for step in &self.steps {
            if !declared.insert(step.name) {
                return Err(PipelineError::DuplicateStep(step.name));
            }
        }

        for step in &self.steps {
            for dep in &step.depends_on {
                if !declared.contains(dep) {
                    return Err(PipelineError::UnknownDependency {
                        step: step.name,
                        dependency: *dep,
                    });
                }
            }
        }

        // Kahn's algorithm: anything left unvisited sits on a cycle.
        let mut indegree: HashMap<StepName, usize> = self
            .steps
            .iter()
            .map(|s| (s.name, s.depends_on.len()))
            .collect();
        let mut ready: Vec<StepName> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(s, _)| *s)
            .collect();
        let mut visited = 0;

        while let Some(done) = ready.pop() {
            visited += 1;
            for step in &self.steps {
                if step.depends_on.contains(&done) {
                    if let Some(d) = indegree.get_mut(&step.name) {
                        *d -= 1;
                        if *d == 0 {
                            ready.push(step.name);
                        }
                    }
                }
            }
        }

        if visited != self.steps.len() {
            let stuck = self
                .steps
                .iter()
                .find(|s| indegree.get(&s.name).copied().unwrap_or(0) > 0)
                .map(|s| s.name)
                .unwrap_or(self.steps[0].name);
            return Err(PipelineError::Cycle(stuck));
        }

        Ok(())
    }

    /// Steps that have not started and whose prerequisites have all succeeded.
    pub fn next_runnable_steps(&self, job: &Job) -> BTreeSet<StepName> {
        self.steps
            .iter()
            .filter(|s| Self::status_of(job, s.name) == StepStatus::NotStarted)
            .filter(|s| {
                s.depends_on
                    .iter()
                    .all(|dep| Self::status_of(job, *dep) == StepStatus::Succeeded)
            })
            .map(|s| s.name)
            .collect()
    }

    /// True when every step's latest record is succeeded.
    pub fn is_complete(&self, job: &Job) -> bool {
        self.steps
            .iter()
            .all(|s| Self::status_of(job, s.name) == StepStatus::Succeeded)
    }

    /// First step (in declaration order) that failed terminally, if any.
    pub fn terminal_failure(&self, job: &Job) -> Option<StepName> {
        self.steps
            .iter()
            .map(|s| s.name)
            .find(|name| Self::status_of(job, *name) == StepStatus::FailedTerminal)
    }

    fn status_of(job: &Job, step: StepName) -> StepStatus {
        job.step(step)
            .map(|record| record.status)
            .unwrap_or(StepStatus::NotStarted)
    }
}
