//! Required-attestation policies and their evaluation.
//!
//! A [`Policy`] names the attestation kinds an entity needs and the rule
//! ([`ValidationMode`]) by which they are judged. Evaluation only looks at
//! the distinct kinds present on the entity; attestations of kinds outside
//! the requirement list are ignored.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::PoliciesConfig;
use crate::error::{ProoflineError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    #[default]
    None,
    All,
    Any,
    Threshold,
}

impl ValidationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationMode::None => "none",
            ValidationMode::All => "all",
            ValidationMode::Any => "any",
            ValidationMode::Threshold => "threshold",
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidationMode {
    type Err = ProoflineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(ValidationMode::None),
            "all" => Ok(ValidationMode::All),
            "any" => Ok(ValidationMode::Any),
            "threshold" => Ok(ValidationMode::Threshold),
            other => Err(ProoflineError::validation(format!(
                "unknown validation mode {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub mode: ValidationMode,
    #[serde(default)]
    pub require: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u32>,
}

impl Policy {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all<I, S>(kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: ValidationMode::All,
            require: kinds.into_iter().map(Into::into).collect(),
            threshold: None,
        }
    }

    /// Reject shapes that could never be evaluated meaningfully.
    pub fn validate(&self) -> Result<()> {
        if self.require.iter().any(|k| k.trim().is_empty()) {
            return Err(ProoflineError::validation(
                "required attestation kinds must not be empty",
            ));
        }
        if self.mode == ValidationMode::Threshold {
            let Some(threshold) = self.threshold else {
                return Err(ProoflineError::validation(
                    "threshold required for validation-mode=threshold",
                ));
            };
            if threshold == 0 {
                return Err(ProoflineError::validation("threshold must be at least 1"));
            }
            if threshold as usize > self.distinct_required().len() {
                return Err(ProoflineError::validation(format!(
                    "threshold {threshold} exceeds the {} required kinds",
                    self.distinct_required().len()
                )));
            }
        }
        Ok(())
    }

    fn distinct_required(&self) -> BTreeSet<&str> {
        self.require.iter().map(String::as_str).collect()
    }

    /// Judge this policy against the attestation kinds recorded on an entity.
    pub fn evaluate<'a, I>(&self, present: I) -> PolicyReport
    where
        I: IntoIterator<Item = &'a str>,
    {
        let required = self.distinct_required();
        let found: BTreeSet<&str> = present
            .into_iter()
            .filter(|kind| required.contains(kind))
            .collect();
        let missing: Vec<String> = required
            .iter()
            .filter(|kind| !found.contains(*kind))
            .map(|kind| kind.to_string())
            .collect();

        let satisfied = if self.mode == ValidationMode::None || required.is_empty() {
            true
        } else {
            match self.mode {
                ValidationMode::None => true,
                ValidationMode::All => missing.is_empty(),
                ValidationMode::Any => !found.is_empty(),
                // An unset threshold never validates; `validate` keeps it out of storage.
                ValidationMode::Threshold => self
                    .threshold
                    .is_some_and(|min| found.len() >= min as usize),
            }
        };

        PolicyReport {
            mode: self.mode,
            required: required.iter().map(|k| k.to_string()).collect(),
            present: found.iter().map(|k| k.to_string()).collect(),
            missing,
            threshold: self.threshold,
            satisfied,
        }
    }
}

/// The outcome of evaluating a [`Policy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyReport {
    pub mode: ValidationMode,
    pub required: Vec<String>,
    pub present: Vec<String>,
    pub missing: Vec<String>,
    pub threshold: Option<u32>,
    pub satisfied: bool,
}

/// Caller-supplied policy choices for a task. Either a preset name or
/// inline fields, never both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyRequest {
    pub preset: Option<String>,
    pub mode: Option<ValidationMode>,
    pub require: Option<Vec<String>>,
    pub threshold: Option<u32>,
}

impl PolicyRequest {
    pub fn preset(name: impl Into<String>) -> Self {
        Self {
            preset: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn inline(mode: ValidationMode, require: Vec<String>, threshold: Option<u32>) -> Self {
        Self {
            preset: None,
            mode: Some(mode),
            require: Some(require),
            threshold,
        }
    }

    pub fn is_inline(&self) -> bool {
        self.mode.is_some() || self.require.is_some() || self.threshold.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.preset.is_none() && !self.is_inline()
    }
}

/// Where a resolved policy came from; drives which audit event is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicySource {
    Preset(String),
    TypeDefault(String),
    Override,
    Unset,
}

impl PolicySource {
    pub fn preset_name(&self) -> Option<&str> {
        match self {
            PolicySource::Preset(name) | PolicySource::TypeDefault(name) => Some(name),
            PolicySource::Override | PolicySource::Unset => None,
        }
    }
}

/// Resolve the policy for a new task of `task_type`.
///
/// Precedence: explicit preset, then inline override, then the configured
/// default preset for the task type. Inline fields without a mode imply
/// `all` when a requirement list is given.
pub fn resolve(
    policies: &PoliciesConfig,
    task_type: &str,
    request: &PolicyRequest,
) -> Result<(Policy, PolicySource)> {
    if request.preset.is_some() && request.is_inline() {
        return Err(ProoflineError::validation(
            "policy preset and inline policy fields are mutually exclusive",
        ));
    }
    if let Some(name) = &request.preset {
        let policy = policies.preset(name)?;
        return Ok((policy, PolicySource::Preset(name.clone())));
    }
    if request.is_inline() {
        let policy = apply_inline(&Policy::none(), request);
        policy.validate()?;
        return Ok((policy, PolicySource::Override));
    }
    match policies.defaults.task.get(task_type) {
        Some(name) => {
            let policy = policies.preset(name)?;
            Ok((policy, PolicySource::TypeDefault(name.clone())))
        }
        None => Ok((Policy::none(), PolicySource::Unset)),
    }
}

/// Layer inline policy fields over `base`. Fields that were not supplied
/// keep their current value.
pub fn apply_inline(base: &Policy, request: &PolicyRequest) -> Policy {
    let mut policy = base.clone();
    if let Some(require) = &request.require {
        policy.require = require.clone();
        if request.mode.is_none() && policy.mode == ValidationMode::None && !require.is_empty() {
            policy.mode = ValidationMode::All;
        }
    }
    if let Some(mode) = request.mode {
        policy.mode = mode;
    }
    if request.threshold.is_some() {
        policy.threshold = request.threshold;
    }
    if policy.mode != ValidationMode::Threshold {
        policy.threshold = None;
    }
    policy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProoflineConfig;

    fn kinds(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn none_and_empty_are_always_satisfied() {
        assert!(Policy::none().evaluate([]).satisfied);
        let empty_all = Policy {
            mode: ValidationMode::All,
            require: vec![],
            threshold: None,
        };
        assert!(empty_all.evaluate([]).satisfied);
    }

    #[test]
    fn all_needs_every_kind() {
        let policy = Policy::all(["K1", "K2"]);
        assert!(!policy.evaluate([]).satisfied);
        let report = policy.evaluate(["K1"]);
        assert!(!report.satisfied);
        assert_eq!(report.missing, kinds(&["K2"]));
        assert!(policy.evaluate(["K2", "K1", "K1"]).satisfied);
    }

    #[test]
    fn any_needs_one_kind() {
        let policy = Policy {
            mode: ValidationMode::Any,
            require: kinds(&["K1", "K2"]),
            threshold: None,
        };
        assert!(!policy.evaluate(["other"]).satisfied);
        assert!(policy.evaluate(["K1"]).satisfied);
        assert!(policy.evaluate(["K2"]).satisfied);
    }

    #[test]
    fn threshold_counts_distinct_required_kinds() {
        let policy = Policy {
            mode: ValidationMode::Threshold,
            require: kinds(&["K1", "K2", "K3"]),
            threshold: Some(2),
        };
        assert!(!policy.evaluate(["K1"]).satisfied);
        assert!(!policy.evaluate(["K1", "K1", "unrelated"]).satisfied);
        let report = policy.evaluate(["K1", "K3"]);
        assert!(report.satisfied);
        assert_eq!(report.present, kinds(&["K1", "K3"]));
        assert_eq!(report.missing, kinds(&["K2"]));
    }

    #[test]
    fn threshold_without_value_is_invalid() {
        let policy = Policy {
            mode: ValidationMode::Threshold,
            require: kinds(&["K1"]),
            threshold: None,
        };
        assert!(policy.validate().is_err());
        assert!(!policy.evaluate(["K1"]).satisfied);

        let too_high = Policy {
            threshold: Some(2),
            ..policy
        };
        assert!(too_high.validate().is_err());
    }

    #[test]
    fn resolve_prefers_explicit_preset() {
        let config = ProoflineConfig::default();
        let (policy, source) = resolve(
            &config.policies,
            "feature",
            &PolicyRequest::preset("low"),
        )
        .unwrap();
        assert_eq!(source, PolicySource::Preset("low".into()));
        assert_eq!(policy.require, kinds(&["ci.passed"]));
    }

    #[test]
    fn resolve_falls_back_to_type_default() {
        let config = ProoflineConfig::default();
        let (policy, source) =
            resolve(&config.policies, "feature", &PolicyRequest::default()).unwrap();
        assert_eq!(source, PolicySource::TypeDefault("high".into()));
        assert_eq!(policy.mode, ValidationMode::All);
        assert_eq!(
            policy.require,
            kinds(&["ci.passed", "review.approved", "acceptance.passed"])
        );
    }

    #[test]
    fn resolve_inline_is_an_override() {
        let config = ProoflineConfig::default();
        let request = PolicyRequest {
            require: Some(kinds(&["security.ok"])),
            ..PolicyRequest::default()
        };
        let (policy, source) = resolve(&config.policies, "feature", &request).unwrap();
        assert_eq!(source, PolicySource::Override);
        assert_eq!(policy.mode, ValidationMode::All);
        assert_eq!(policy.require, kinds(&["security.ok"]));
    }

    #[test]
    fn resolve_rejects_unknown_preset_and_mixed_requests() {
        let config = ProoflineConfig::default();
        let err = resolve(&config.policies, "bug", &PolicyRequest::preset("nope")).unwrap_err();
        assert_eq!(err.to_string(), "validation error: policy preset nope not found");

        let mixed = PolicyRequest {
            preset: Some("low".into()),
            mode: Some(ValidationMode::Any),
            ..PolicyRequest::default()
        };
        assert!(resolve(&config.policies, "bug", &mixed).is_err());
    }

    #[test]
    fn resolve_unknown_type_without_default_is_unset() {
        let config = ProoflineConfig::default();
        let (policy, source) =
            resolve(&config.policies, "workshop", &PolicyRequest::default()).unwrap();
        assert_eq!(source, PolicySource::Unset);
        assert_eq!(policy, Policy::none());
    }

    #[test]
    fn apply_inline_keeps_untouched_fields() {
        let base = Policy::all(["K1", "K2"]);
        let request = PolicyRequest {
            mode: Some(ValidationMode::Any),
            ..PolicyRequest::default()
        };
        let next = apply_inline(&base, &request);
        assert_eq!(next.mode, ValidationMode::Any);
        assert_eq!(next.require, kinds(&["K1", "K2"]));
    }
}
