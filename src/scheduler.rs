//! Ordering and execution of the downstream analysis stages.
//!
//! A requirement set arrives as one JSON object mapping the four
//! Chinese-language stage keys to booleans, e.g.
//! `{"地理定位": true, "可视化": true}`. [`compute_order`] turns it into an
//! execution plan, [`validate`] checks every planned stage has its
//! executable on disk (all misses reported together), and [`execute`] runs
//! the plan strictly sequentially, aborting at the first non-zero exit.
//!
//! Ordering rules:
//! - Active analysis stages run in requirement declaration order.
//! - Visualization always runs last.
//! - A set that asks only for visualization implies the three analysis
//!   stages first, in canonical order; visualization never runs on nothing.
//! - No true flags means an empty plan, which is a normal outcome.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::config::StagePaths;
use crate::error::ScheduleError;

/// One downstream analysis stage. Serde names are the requirement keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[serde(rename = "地理定位")]
    Geolocation,
    #[serde(rename = "情况分析")]
    Situation,
    #[serde(rename = "背景环境")]
    Background,
    #[serde(rename = "可视化")]
    Visualization,
}

impl Stage {
    /// Every stage in canonical execution order, visualization last.
    pub const CANONICAL_ORDER: [Stage; 4] = [
        Stage::Geolocation,
        Stage::Situation,
        Stage::Background,
        Stage::Visualization,
    ];

    /// The requirement key, which doubles as the human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Stage::Geolocation => "地理定位",
            Stage::Situation => "情况分析",
            Stage::Background => "背景环境",
            Stage::Visualization => "可视化",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The ordered stage list committed for one requirement set.
pub type ExecutionPlan = Vec<Stage>;

/// Stage flags in their declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequirementSet {
    entries: Vec<(Stage, bool)>,
}

impl RequirementSet {
    /// Parse a JSON requirement object, preserving declaration order.
    ///
    /// Input that is not an object of booleans collapses to the empty set;
    /// unknown keys are dropped. Both are warned about, never fatal, since
    /// the scheduler treats "nothing to do" as a normal run.
    pub fn from_json(raw: &str) -> Self {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Requirement set is not valid JSON; treating as empty");
                return Self::default();
            }
        };
        let Value::Object(map) = value else {
            warn!("Requirement set is not a JSON object; treating as empty");
            return Self::default();
        };

        let mut entries = Vec::new();
        for (key, value) in map {
            let Value::Bool(flag) = value else {
                warn!(key = %key, "Requirement value is not a boolean; treating the set as empty");
                return Self::default();
            };
            match serde_json::from_value::<Stage>(Value::String(key.clone())) {
                Ok(stage) => entries.push((stage, flag)),
                Err(_) => warn!(key = %key, "Ignoring unknown requirement key"),
            }
        }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flag for one stage; stages the set never mentions read as false.
    pub fn flag(&self, stage: Stage) -> bool {
        self.entries
            .iter()
            .find(|(s, _)| *s == stage)
            .is_some_and(|(_, flag)| *flag)
    }

    /// The (stage, flag) pairs in declaration order.
    pub fn entries(&self) -> &[(Stage, bool)] {
        &self.entries
    }
}

/// Turn a requirement set into its execution plan.
pub fn compute_order(requirements: &RequirementSet) -> ExecutionPlan {
    let active: Vec<Stage> = requirements
        .entries()
        .iter()
        .filter(|(stage, flag)| *flag && *stage != Stage::Visualization)
        .map(|(stage, _)| *stage)
        .collect();
    let wants_visualization = requirements.flag(Stage::Visualization);

    let mut plan = if !active.is_empty() {
        active
    } else if wants_visualization {
        // Visualization alone still needs its inputs produced.
        Stage::CANONICAL_ORDER
            .into_iter()
            .filter(|stage| *stage != Stage::Visualization)
            .collect()
    } else {
        return Vec::new();
    };

    if wants_visualization {
        plan.push(Stage::Visualization);
    }
    plan
}

/// Check that every planned stage has an executable on disk.
///
/// All missing paths are collected into one report so the operator fixes
/// the whole installation in one round.
pub fn validate(plan: &[Stage], paths: &StagePaths) -> Result<(), ScheduleError> {
    let missing: Vec<(Stage, PathBuf)> = plan
        .iter()
        .map(|stage| (*stage, paths.path_for(*stage).clone()))
        .filter(|(_, path)| !path.is_file())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ScheduleError::MissingExecutables { stages: missing })
    }
}

/// Run the plan in order, stopping at the first failing stage.
///
/// Stages are argument-less child processes run from the scheduler's
/// working directory; the exit code is the sole success signal. Stdout is
/// kept for diagnostics, stderr travels with the failure.
#[instrument(level = "info", skip_all, fields(stages = plan.len()))]
pub async fn execute(plan: &[Stage], paths: &StagePaths) -> Result<(), ScheduleError> {
    for (index, stage) in plan.iter().enumerate() {
        let path = paths.path_for(*stage);
        info!(
            stage = %stage,
            step = index + 1,
            total = plan.len(),
            path = %path.display(),
            "Running stage"
        );

        let output = Command::new(path)
            .output()
            .await
            .map_err(|e| ScheduleError::Launch {
                stage: *stage,
                path: path.clone(),
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ScheduleError::StageFailed {
                stage: *stage,
                status: output.status,
                stderr,
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stdout = stdout.trim();
        if !stdout.is_empty() {
            debug!(stage = %stage, stdout = %crate::utils::truncate_for_log(stdout, 400), "Stage output");
        }
        info!(stage = %stage, "Stage completed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parsing_keeps_declaration_order() {
        let set = RequirementSet::from_json(
            r#"{"背景环境": true, "地理定位": true, "可视化": false}"#,
        );
        let stages: Vec<Stage> = set.entries().iter().map(|(stage, _)| *stage).collect();
        assert_eq!(
            stages,
            vec![Stage::Background, Stage::Geolocation, Stage::Visualization]
        );
    }

    #[test]
    fn test_mixed_selection_runs_in_declaration_order_with_viz_last() {
        let set = RequirementSet::from_json(
            r#"{"地理定位": true, "情况分析": false, "背景环境": true, "可视化": true}"#,
        );
        assert_eq!(
            compute_order(&set),
            vec![Stage::Geolocation, Stage::Background, Stage::Visualization]
        );
    }

    #[test]
    fn test_lone_visualization_implies_the_analysis_stages() {
        let set = RequirementSet::from_json(
            r#"{"地理定位": false, "情况分析": false, "背景环境": false, "可视化": true}"#,
        );
        assert_eq!(compute_order(&set), Stage::CANONICAL_ORDER.to_vec());
    }

    #[test]
    fn test_all_false_means_an_empty_plan() {
        let set = RequirementSet::from_json(
            r#"{"地理定位": false, "情况分析": false, "背景环境": false, "可视化": false}"#,
        );
        assert!(compute_order(&set).is_empty());
        assert!(compute_order(&RequirementSet::default()).is_empty());
    }

    #[test]
    fn test_declaration_order_beats_canonical_order() {
        let set = RequirementSet::from_json(r#"{"背景环境": true, "情况分析": true}"#);
        assert_eq!(compute_order(&set), vec![Stage::Background, Stage::Situation]);
    }

    #[test]
    fn test_malformed_input_collapses_to_empty() {
        assert!(RequirementSet::from_json("not json").is_empty());
        assert!(RequirementSet::from_json("[true, false]").is_empty());
        assert!(RequirementSet::from_json(r#""地理定位""#).is_empty());
        assert!(RequirementSet::from_json(r#"{"地理定位": "yes"}"#).is_empty());
        assert!(RequirementSet::from_json(r#"{"地理定位": 1}"#).is_empty());
    }

    #[test]
    fn test_unknown_keys_are_dropped() {
        let set = RequirementSet::from_json(r#"{"未知阶段": true, "情况分析": true}"#);
        assert_eq!(compute_order(&set), vec![Stage::Situation]);
    }

    #[test]
    fn test_missing_keys_read_as_false() {
        let set = RequirementSet::from_json(r#"{"情况分析": true}"#);
        assert!(set.flag(Stage::Situation));
        assert!(!set.flag(Stage::Visualization));
        assert!(!set.flag(Stage::Geolocation));
    }

    #[test]
    fn test_validate_reports_every_missing_executable_at_once() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present");
        std::fs::write(&present, "#!/bin/sh\n").unwrap();

        let paths = StagePaths {
            geolocation: present.clone(),
            situation: dir.path().join("no-situation"),
            background: present.clone(),
            visualization: dir.path().join("no-visualization"),
        };

        let err = validate(&Stage::CANONICAL_ORDER, &paths).unwrap_err();
        match err {
            ScheduleError::MissingExecutables { stages } => {
                let missing: Vec<Stage> = stages.iter().map(|(stage, _)| *stage).collect();
                assert_eq!(missing, vec![Stage::Situation, Stage::Visualization]);
            }
            other => panic!("expected MissingExecutables, got {other:?}"),
        }

        let ok_plan = [Stage::Geolocation, Stage::Background];
        assert!(validate(&ok_plan, &paths).is_ok());
    }

    #[test]
    fn test_stage_labels_round_trip_through_serde() {
        for stage in Stage::CANONICAL_ORDER {
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{}\"", stage.label()));
            let back: Stage = serde_json::from_str(&json).unwrap();
            assert_eq!(back, stage);
        }
    }
}
