use std::fmt;

use crate::ep_error::EpError;
use crate::types::{parse_stage, Stage};

/// Percent above which a locally driven submission leaves `Ingesting`.
pub const VISUALIZING_AFTER: f64 = 25.0;
/// Percent above which it leaves `Visualizing`.
pub const CHUNKING_AFTER: f64 = 50.0;
/// Percent above which it leaves `Chunking`.
pub const EVALUATING_AFTER: f64 = 75.0;
/// Percent at which it completes.
pub const COMPLETED_AT: f64 = 100.0;

/// Something that may move a submission to another stage.
#[derive(Debug, Clone, PartialEq)]
pub enum StageEvent {
    /// Local progress scalar, 0..=100.
    ProgressTick(f64),
    /// Status label reported by the backend.
    ExternalStatus(String),
    /// Explicit failure of the current step.
    Fail,
    /// Re-evaluation: back to the start regardless of the current stage.
    ResetToPending,
}

impl fmt::Display for StageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageEvent::ProgressTick(p) => write!(f, "progress tick {:.1}%", p),
            StageEvent::ExternalStatus(label) => write!(f, "external status '{}'", label),
            StageEvent::Fail => f.write_str("failure"),
            StageEvent::ResetToPending => f.write_str("reset to pending"),
        }
    }
}

/// Stage implied by a local progress percentage.
pub fn stage_for_percent(percent: f64) -> Stage {
    if percent >= COMPLETED_AT {
        Stage::Completed
    } else if percent > EVALUATING_AFTER {
        Stage::Evaluating
    } else if percent > CHUNKING_AFTER {
        Stage::Chunking
    } else if percent > VISUALIZING_AFTER {
        Stage::Visualizing
    } else {
        Stage::Ingesting
    }
}

/// Apply `event` to `current`.
///
/// On `Err(InvalidTransition)` the caller keeps `current`; nothing else changes.
pub fn advance(current: Stage, event: &StageEvent) -> Result<Stage, EpError> {
    let reject = || EpError::InvalidTransition {
        from: current,
        event: event.to_string(),
    };

    match event {
        StageEvent::ResetToPending => Ok(Stage::Pending),
        StageEvent::Fail => {
            if current.is_terminal() {
                Err(reject())
            } else {
                Ok(Stage::Failed)
            }
        }
        StageEvent::ProgressTick(percent) => {
            if current.is_terminal() || percent.is_nan() {
                return Ok(current);
            }
            Ok(walk_forward(current, stage_for_percent(*percent)))
        }
        StageEvent::ExternalStatus(label) => {
            let to = parse_stage(label).map_err(|_| reject())?;
            apply_external(current, to).ok_or_else(reject)
        }
    }
}

/// Step along natural edges until `target` is reached. Never moves backward.
fn walk_forward(current: Stage, target: Stage) -> Stage {
    let Some(target_rank) = target.rank() else {
        return current;
    };
    let mut stage = current;
    while let Some(rank) = stage.rank() {
        if rank >= target_rank {
            break;
        }
        match stage.successor() {
            Some(next) if stage.is_valid_transition(&next) => stage = next,
            _ => break,
        }
    }
    stage
}

/// Authoritative status may skip forward; it may not leave a terminal stage
/// or move backward, except to `Pending`, which only a backend reset writes.
fn apply_external(current: Stage, to: Stage) -> Option<Stage> {
    if to == current || to == Stage::Pending {
        return Some(to);
    }
    if current.is_terminal() {
        return None;
    }
    if to == Stage::Failed {
        return Some(to);
    }
    match (current.rank(), to.rank()) {
        (Some(from), Some(next)) if next > from => Some(to),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_boundaries_are_exclusive_until_completion() {
        assert_eq!(stage_for_percent(0.0), Stage::Ingesting);
        assert_eq!(stage_for_percent(25.0), Stage::Ingesting);
        assert_eq!(stage_for_percent(25.1), Stage::Visualizing);
        assert_eq!(stage_for_percent(50.0), Stage::Visualizing);
        assert_eq!(stage_for_percent(75.5), Stage::Evaluating);
        assert_eq!(stage_for_percent(99.9), Stage::Evaluating);
        assert_eq!(stage_for_percent(100.0), Stage::Completed);
    }

    #[test]
    fn walk_forward_never_regresses() {
        assert_eq!(walk_forward(Stage::Chunking, Stage::Ingesting), Stage::Chunking);
        assert_eq!(walk_forward(Stage::Pending, Stage::Chunking), Stage::Chunking);
    }

    #[test]
    fn nan_tick_is_ignored() {
        assert_eq!(
            advance(Stage::Visualizing, &StageEvent::ProgressTick(f64::NAN)).unwrap(),
            Stage::Visualizing
        );
    }

    #[test]
    fn event_display_names_the_label() {
        let event = StageEvent::ExternalStatus("archived".to_string());
        assert_eq!(event.to_string(), "external status 'archived'");
    }
}
