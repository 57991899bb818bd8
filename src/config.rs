//! Configuração do Proofline carregada a partir de `proofline.toml`.
//!
//! A struct [`ProoflineConfig`] contém os presets de política, os defaults
//! por tipo de tarefa, o TTL de lease e o RBAC semeado em cada projeto.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `PROOFLINE_LEASE_TTL_SECS` tem precedência sobre o arquivo.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::auth::{self, ALL_PERMISSIONS};
use crate::error::{ProoflineError, Result};
use crate::policy::Policy;

/// Nome do arquivo de configuração dentro do workspace.
pub const CONFIG_FILE: &str = "proofline.toml";

/// Variável de ambiente que sobrescreve `lease.ttl_secs`.
pub const LEASE_TTL_ENV: &str = "PROOFLINE_LEASE_TTL_SECS";

/// Configuração de nível superior carregada de `proofline.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProoflineConfig {
    /// Tipos de tarefa aceitos em `create_task`.
    #[serde(default = "default_task_types")]
    pub task_types: Vec<String>,

    /// Tipo usado quando a criação não informa nenhum.
    #[serde(default = "default_task_type")]
    pub default_task_type: String,

    #[serde(default)]
    pub policies: PoliciesConfig,

    #[serde(default)]
    pub lease: LeaseConfig,

    #[serde(default)]
    pub rbac: RbacConfig,
}

/// Presets nomeados e os defaults que os referenciam.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoliciesConfig {
    pub presets: BTreeMap<String, Policy>,
    pub defaults: PolicyDefaults,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyDefaults {
    /// Tipo de tarefa → nome do preset aplicado quando nada é informado.
    pub task: BTreeMap<String, String>,
    pub iteration: IterationDefaults,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IterationDefaults {
    /// Tipo de atestado exigido antes de `validated`. Vazio desativa o gate.
    pub validation_require: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// Duração padrão de um lease, em segundos.
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RbacConfig {
    pub roles: BTreeMap<String, RoleConfig>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleConfig {
    pub description: String,
    pub permissions: Vec<String>,
    /// Tipos de atestado que esta role pode emitir.
    pub can_attest: Vec<String>,
}

// Tipos de tarefa padrão.
fn default_task_types() -> Vec<String> {
    ["technical", "feature", "bug", "docs", "chore", "workshop", "plan"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

// Tipo de tarefa padrão: "technical".
fn default_task_type() -> String {
    "technical".to_string()
}

// TTL padrão do lease: 15 minutos.
fn default_lease_ttl_secs() -> u64 {
    900
}

fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for PoliciesConfig {
    fn default() -> Self {
        let mut presets = BTreeMap::new();
        presets.insert(
            "high".to_string(),
            Policy::all(["ci.passed", "review.approved", "acceptance.passed"]),
        );
        presets.insert(
            "medium".to_string(),
            Policy::all(["ci.passed", "review.approved"]),
        );
        presets.insert("low".to_string(), Policy::all(["ci.passed"]));
        presets.insert("planning".to_string(), Policy::all(["planning.approved"]));
        Self {
            presets,
            defaults: PolicyDefaults::default(),
        }
    }
}

impl Default for PolicyDefaults {
    fn default() -> Self {
        let task = [
            ("feature", "high"),
            ("technical", "high"),
            ("bug", "medium"),
            ("docs", "medium"),
            ("chore", "low"),
            ("plan", "planning"),
        ]
        .iter()
        .map(|(t, p)| (t.to_string(), p.to_string()))
        .collect();
        Self {
            task,
            iteration: IterationDefaults::default(),
        }
    }
}

impl Default for IterationDefaults {
    fn default() -> Self {
        Self {
            validation_require: "iteration.approved".to_string(),
        }
    }
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_lease_ttl_secs(),
        }
    }
}

impl Default for RbacConfig {
    fn default() -> Self {
        use auth::permissions::*;

        let mut roles = BTreeMap::new();
        let mut role = |name: &str, description: &str, permissions: &[&str], can_attest: &[&str]| {
            roles.insert(
                name.to_string(),
                RoleConfig {
                    description: description.to_string(),
                    permissions: strings(permissions),
                    can_attest: strings(can_attest),
                },
            );
        };

        role(
            "owner",
            "Project owner",
            ALL_PERMISSIONS,
            &[
                "ci.passed",
                "review.approved",
                "acceptance.passed",
                "security.ok",
                "iteration.approved",
                "planning.approved",
            ],
        );
        role(
            "pm",
            "Project manager",
            &[
                TASK_CREATE,
                TASK_UPDATE,
                ITERATION_CREATE,
                ITERATION_SET_STATUS,
                DECISION_CREATE,
                ATTESTATION_ADD,
            ],
            &["ci.passed", "planning.approved"],
        );
        role(
            "dev",
            "Developer",
            &[TASK_CLAIM, TASK_UPDATE, TASK_DONE, TASK_RELEASE, ATTESTATION_ADD],
            &["ci.passed"],
        );
        role(
            "reviewer",
            "Reviewer",
            &[ATTESTATION_ADD],
            &["review.approved"],
        );
        role(
            "qa",
            "Quality assurance",
            &[ATTESTATION_ADD],
            &["acceptance.passed"],
        );
        role(
            "security",
            "Security",
            &[ATTESTATION_ADD],
            &["security.ok"],
        );
        role(
            "release",
            "Release manager",
            &[ITERATION_SET_STATUS, ATTESTATION_ADD, FORCE_USE],
            &["iteration.approved"],
        );
        role("observer", "Read-only observer", &[], &[]);

        Self { roles }
    }
}

impl Default for ProoflineConfig {
    fn default() -> Self {
        Self {
            task_types: default_task_types(),
            default_task_type: default_task_type(),
            policies: PoliciesConfig::default(),
            lease: LeaseConfig::default(),
            rbac: RbacConfig::default(),
        }
    }
}

impl PoliciesConfig {
    /// Busca um preset pelo nome.
    pub fn preset(&self, name: &str) -> Result<Policy> {
        self.presets
            .get(name)
            .cloned()
            .ok_or_else(|| ProoflineError::validation(format!("policy preset {name} not found")))
    }
}

impl ProoflineConfig {
    /// Carrega a configuração de `proofline.toml` no diretório informado.
    /// Usa valores padrão se o arquivo não existir.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let path = dir.as_ref().join(CONFIG_FILE);
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Self::from_toml(&contents)?
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo de configuração para o TTL.
        config.apply_lease_ttl_override(std::env::var(LEASE_TTL_ENV).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Interpreta o conteúdo TOML sem validar.
    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str::<ProoflineConfig>(contents)?)
    }

    fn apply_lease_ttl_override(&mut self, value: Option<String>) -> Result<()> {
        let Some(raw) = value.filter(|v| !v.trim().is_empty()) else {
            return Ok(());
        };
        self.lease.ttl_secs = raw.trim().parse().map_err(|_| {
            ProoflineError::Config(format!("{LEASE_TTL_ENV} must be a number of seconds, got {raw}"))
        })?;
        Ok(())
    }

    /// Verifica a consistência interna: presets avaliáveis, defaults que
    /// apontam para presets existentes, permissões conhecidas e role `owner`.
    pub fn validate(&self) -> Result<()> {
        if self.task_types.is_empty() {
            return Err(ProoflineError::Config("task_types must not be empty".into()));
        }
        if !self.task_types.contains(&self.default_task_type) {
            return Err(ProoflineError::Config(format!(
                "default_task_type {} is not a configured task type",
                self.default_task_type
            )));
        }
        for (name, preset) in &self.policies.presets {
            preset
                .validate()
                .map_err(|e| ProoflineError::Config(format!("preset {name}: {e}")))?;
        }
        for (task_type, preset) in &self.policies.defaults.task {
            if !self.task_types.contains(task_type) {
                return Err(ProoflineError::Config(format!(
                    "policy default for unknown task type {task_type}"
                )));
            }
            if !self.policies.presets.contains_key(preset) {
                return Err(ProoflineError::Config(format!(
                    "task type {task_type} defaults to unknown preset {preset}"
                )));
            }
        }
        if self.lease.ttl_secs == 0 {
            return Err(ProoflineError::Config("lease.ttl_secs must be positive".into()));
        }
        if self.lease.ttl_secs > crate::lease::MAX_TTL_SECS {
            return Err(ProoflineError::Config(format!(
                "lease.ttl_secs must not exceed {}",
                crate::lease::MAX_TTL_SECS
            )));
        }
        if !self.rbac.roles.contains_key("owner") {
            return Err(ProoflineError::Config("rbac.roles must include owner".into()));
        }
        for (role, spec) in &self.rbac.roles {
            if let Some(unknown) = spec
                .permissions
                .iter()
                .find(|p| !ALL_PERMISSIONS.contains(&p.as_str()))
            {
                return Err(ProoflineError::Config(format!(
                    "role {role} references unknown permission {unknown}"
                )));
            }
            if spec.can_attest.iter().any(|k| k.trim().is_empty()) {
                return Err(ProoflineError::Config(format!(
                    "role {role} has empty attestation kind"
                )));
            }
        }
        Ok(())
    }

    /// O tipo de atestado exigido para validar iterações, se houver.
    pub fn iteration_validation_kind(&self) -> Option<&str> {
        let kind = self.policies.defaults.iteration.validation_require.trim();
        (!kind.is_empty()).then_some(kind)
    }

    pub fn is_task_type(&self, task_type: &str) -> bool {
        self.task_types.iter().any(|t| t == task_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::ValidationMode;

    #[test]
    fn default_config_values() {
        let config = ProoflineConfig::default();
        assert_eq!(config.default_task_type, "technical");
        assert_eq!(config.lease.ttl_secs, 900);
        assert_eq!(config.iteration_validation_kind(), Some("iteration.approved"));
        assert_eq!(config.policies.defaults.task["feature"], "high");
        assert!(config.rbac.roles.contains_key("owner"));
        config.validate().unwrap();
    }

    #[test]
    fn owner_holds_every_permission() {
        let config = ProoflineConfig::default();
        let owner = &config.rbac.roles["owner"];
        for perm in ALL_PERMISSIONS {
            assert!(owner.permissions.iter().any(|p| p == perm), "{perm}");
        }
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            [lease]
            ttl_secs = 60

            [policies.presets.strict]
            mode = "threshold"
            require = ["ci.passed", "review.approved", "security.ok"]
            threshold = 2

            [policies.defaults.task]
            bug = "strict"
        "#;
        let config = ProoflineConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.lease.ttl_secs, 60);
        assert_eq!(config.default_task_type, "technical");
        let strict = config.policies.preset("strict").unwrap();
        assert_eq!(strict.mode, ValidationMode::Threshold);
        assert_eq!(strict.threshold, Some(2));
        assert_eq!(config.policies.defaults.task.len(), 1);
        assert_eq!(config.iteration_validation_kind(), Some("iteration.approved"));
        config.validate().unwrap();
    }

    #[test]
    fn validate_bounds_lease_ttl() {
        let mut config = ProoflineConfig::default();
        config.lease.ttl_secs = crate::lease::MAX_TTL_SECS;
        assert!(config.validate().is_ok());
        config.lease.ttl_secs = u64::MAX;
        assert!(config.validate().is_err());
        config.lease.ttl_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_dangling_default() {
        let toml_str = r#"
            [policies.presets.low]
            mode = "all"
            require = ["ci.passed"]

            [policies.defaults.task]
            feature = "high"
        "#;
        let config = ProoflineConfig::from_toml(toml_str).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Config error: task type feature defaults to unknown preset high"
        );
    }

    #[test]
    fn validate_rejects_unknown_permission() {
        let toml_str = r#"
            [rbac.roles.owner]
            permissions = ["task.create", "task.teleport"]
        "#;
        let config = ProoflineConfig::from_toml(toml_str).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_requires_owner_role() {
        let toml_str = r#"
            [rbac.roles.dev]
            permissions = ["task.claim"]
        "#;
        let config = ProoflineConfig::from_toml(toml_str).unwrap();
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "Config error: rbac.roles must include owner");
    }

    #[test]
    fn empty_iteration_kind_disables_gate() {
        let toml_str = r#"
            [policies.defaults.iteration]
            validation_require = ""
        "#;
        let config = ProoflineConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.iteration_validation_kind(), None);
    }

    #[test]
    fn lease_ttl_override() {
        let mut config = ProoflineConfig::default();
        config.apply_lease_ttl_override(Some("120".into())).unwrap();
        assert_eq!(config.lease.ttl_secs, 120);
        config.apply_lease_ttl_override(None).unwrap();
        assert_eq!(config.lease.ttl_secs, 120);
        assert!(config.apply_lease_ttl_override(Some("soon".into())).is_err());
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ProoflineConfig::load(dir.path()).unwrap();
        assert_eq!(config.policies, PoliciesConfig::default());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "default_task_type = \"bug\"\n",
        )
        .unwrap();
        let config = ProoflineConfig::load(dir.path()).unwrap();
        assert_eq!(config.default_task_type, "bug");
    }
}
