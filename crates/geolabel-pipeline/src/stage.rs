use geolabel_core::error::{GeolabelError, Result};
use geolabel_core::models::JobId;

/// Stages of one inference run, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineStage {
    Queued,
    GeneratingGrid,
    Fetching,
    Predicting,
    Blending,
    WritingOutputs,
    Completed,
    Failed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Queued => "queued",
            PipelineStage::GeneratingGrid => "generating_grid",
            PipelineStage::Fetching => "fetching",
            PipelineStage::Predicting => "predicting",
            PipelineStage::Blending => "blending",
            PipelineStage::WritingOutputs => "writing_outputs",
            PipelineStage::Completed => "completed",
            PipelineStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineStage::Completed | PipelineStage::Failed)
    }

    /// The stage that follows this one on success
    pub fn next(&self) -> Option<PipelineStage> {
        use PipelineStage::*;
        match self {
            Queued => Some(GeneratingGrid),
            GeneratingGrid => Some(Fetching),
            Fetching => Some(Predicting),
            Predicting => Some(Blending),
            Blending => Some(WritingOutputs),
            WritingOutputs => Some(Completed),
            Completed | Failed => None,
        }
    }

    /// Whether moving from `self` to `to` is allowed: one step forward, or
    /// to `Failed` from any non-terminal stage.
    pub fn can_transition_to(&self, to: PipelineStage) -> bool {
        if to == PipelineStage::Failed {
            return !self.is_terminal();
        }
        self.next() == Some(to)
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current stage of a run, enforcing forward-only transitions
#[derive(Debug, Clone)]
pub struct StageTracker {
    job_id: JobId,
    stage: PipelineStage,
}

impl StageTracker {
    pub fn new(job_id: JobId) -> Self {
        Self { job_id, stage: PipelineStage::Queued }
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn advance(&mut self, to: PipelineStage) -> Result<PipelineStage> {
        if !self.stage.can_transition_to(to) {
            return Err(GeolabelError::InvalidTransition {
                id: self.job_id,
                from: self.stage.to_string(),
                to: to.to_string(),
            });
        }
        tracing::debug!(job_id = %self.job_id, from = %self.stage, to = %to, "Pipeline stage");
        self.stage = to;
        Ok(to)
    }
}
