//! Interface de linha de comando do Proofline baseada em clap.
//!
//! Define a struct [`Cli`] com um subcomando por grupo de operações do
//! engine e as flags globais (--dir, --actor, --verbose).

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use proofline::{
    EntityKind, EventType, IterationStatus, ProjectStatus, TaskStatus, ValidationMode,
};

/// Proofline: workflow transacional com atestados, leases e RBAC.
#[derive(Debug, Parser)]
#[command(name = "proofline", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Diretório do workspace (contém `proofline.toml` e `.proofline/`).
    #[arg(long, global = true, env = "PROOFLINE_DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Ator em nome de quem a operação roda.
    #[arg(long, global = true, env = "PROOFLINE_ACTOR", default_value = "local")]
    pub actor: String,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Cria o projeto e concede `owner` ao ator.
    Init {
        project: String,
        #[arg(long)]
        description: Option<String>,
    },

    #[command(subcommand)]
    Project(ProjectCommand),

    #[command(subcommand)]
    Task(TaskCommand),

    #[command(subcommand)]
    Lease(LeaseCommand),

    #[command(subcommand)]
    Iteration(IterationCommand),

    /// Registra um atestado contra uma entidade.
    Attest {
        #[arg(long)]
        project: String,
        /// project, task, iteration ou decision.
        entity_kind: EntityKind,
        entity_id: String,
        kind: String,
        /// Payload JSON opcional.
        #[arg(long)]
        payload: Option<String>,
    },

    /// Lista atestados de um projeto.
    Attestations {
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        entity_kind: Option<EntityKind>,
        #[arg(long)]
        entity_id: Option<String>,
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },

    #[command(subcommand)]
    Decision(DecisionCommand),

    #[command(subcommand)]
    Rbac(RbacCommand),

    /// Lê o log de eventos.
    Events {
        #[arg(long)]
        project: Option<String>,
        /// Eventos com id maior que o cursor, do mais antigo ao mais novo.
        #[arg(long, conflicts_with_all = ["event_type", "before"])]
        after: Option<i64>,
        /// Eventos com id menor que este, do mais novo ao mais antigo.
        #[arg(long)]
        before: Option<i64>,
        #[arg(long = "type")]
        event_type: Option<EventType>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

#[derive(Debug, Subcommand)]
pub enum ProjectCommand {
    Show { project: String },
    List,
    Update {
        project: String,
        #[arg(long)]
        status: Option<ProjectStatus>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Remove o projeto e tudo abaixo dele. O log de eventos permanece.
    Delete { project: String },
}

/// Campos de política aceitos na criação e na atualização de tarefas.
#[derive(Debug, Default, Args)]
pub struct PolicyArgs {
    /// Preset nomeado em `proofline.toml`.
    #[arg(long, conflicts_with_all = ["mode", "require", "threshold"])]
    pub preset: Option<String>,
    #[arg(long)]
    pub mode: Option<ValidationMode>,
    /// Tipos de atestado exigidos (repetível).
    #[arg(long)]
    pub require: Vec<String>,
    #[arg(long)]
    pub threshold: Option<u32>,
}

#[derive(Debug, Subcommand)]
pub enum TaskCommand {
    Create {
        #[arg(long)]
        project: String,
        title: String,
        #[arg(long)]
        id: Option<String>,
        #[arg(long = "type")]
        task_type: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        iteration: Option<String>,
        #[arg(long)]
        parent: Option<String>,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long)]
        priority: Option<i64>,
        /// Dependência (repetível).
        #[arg(long = "dep")]
        depends_on: Vec<String>,
        /// Resultados do trabalho em JSON.
        #[arg(long)]
        outcomes: Option<String>,
        #[command(flatten)]
        policy: PolicyArgs,
    },
    Update {
        id: String,
        #[arg(long)]
        status: Option<TaskStatus>,
        #[arg(long, conflicts_with = "clear_assignee")]
        assignee: Option<String>,
        #[arg(long)]
        clear_assignee: bool,
        #[arg(long)]
        priority: Option<i64>,
        #[arg(long, conflicts_with = "clear_parent")]
        parent: Option<String>,
        #[arg(long)]
        clear_parent: bool,
        #[arg(long)]
        add_dep: Vec<String>,
        #[arg(long)]
        remove_dep: Vec<String>,
        #[arg(long)]
        outcomes: Option<String>,
        #[command(flatten)]
        policy: PolicyArgs,
        /// Ignora os gates; exige `force.use` e fica auditado.
        #[arg(long)]
        force: bool,
    },
    /// Grava os resultados e move a tarefa para `done`.
    Done {
        id: String,
        #[arg(long)]
        outcomes: String,
        #[arg(long)]
        force: bool,
    },
    Show { id: String },
    List {
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        status: Option<TaskStatus>,
        #[arg(long)]
        iteration: Option<String>,
        #[arg(long)]
        parent: Option<String>,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long = "type")]
        task_type: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Mostra o quanto falta para a política de atestados ser satisfeita.
    Validation { id: String },
}

#[derive(Debug, Subcommand)]
pub enum LeaseCommand {
    Claim {
        task: String,
        /// Duração em segundos; o padrão vem de `lease.ttl_secs`.
        #[arg(long)]
        ttl: Option<u64>,
    },
    Release {
        task: String,
        #[arg(long)]
        force: bool,
    },
    Show { task: String },
}

#[derive(Debug, Subcommand)]
pub enum IterationCommand {
    Create {
        #[arg(long)]
        project: String,
        goal: String,
        #[arg(long)]
        id: Option<String>,
    },
    Status {
        id: String,
        status: IterationStatus,
        #[arg(long)]
        force: bool,
    },
    Show { id: String },
    List {
        #[arg(long)]
        project: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum DecisionCommand {
    Create {
        #[arg(long)]
        project: String,
        title: String,
        decision: String,
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        context: Option<String>,
        #[arg(long)]
        rationale: Option<String>,
        #[arg(long)]
        alternatives: Option<String>,
    },
    Show { id: String },
    List {
        #[arg(long)]
        project: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum RbacCommand {
    Grant {
        #[arg(long)]
        project: String,
        target: String,
        role: String,
    },
    Revoke {
        #[arg(long)]
        project: String,
        target: String,
        role: String,
    },
    /// Permite que a role emita atestados do tipo informado.
    Allow {
        #[arg(long)]
        project: String,
        kind: String,
        role: String,
    },
    Deny {
        #[arg(long)]
        project: String,
        kind: String,
        role: String,
    },
    Whoami {
        #[arg(long)]
        project: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_task_update() {
        let cli = Cli::parse_from([
            "proofline",
            "--actor",
            "alice",
            "task",
            "update",
            "t-1",
            "--status",
            "in_progress",
            "--add-dep",
            "t-0",
            "--force",
        ]);
        assert_eq!(cli.actor, "alice");
        match cli.command {
            Command::Task(TaskCommand::Update {
                id,
                status,
                add_dep,
                force,
                ..
            }) => {
                assert_eq!(id, "t-1");
                assert_eq!(status, Some(TaskStatus::InProgress));
                assert_eq!(add_dep, vec!["t-0".to_string()]);
                assert!(force);
            }
            other => panic!("expected task update, got {other:?}"),
        }
    }

    #[test]
    fn cli_parses_inline_policy() {
        let cli = Cli::parse_from([
            "proofline",
            "task",
            "create",
            "--project",
            "p",
            "ship it",
            "--mode",
            "threshold",
            "--require",
            "ci.passed",
            "--require",
            "review.approved",
            "--threshold",
            "1",
        ]);
        match cli.command {
            Command::Task(TaskCommand::Create { title, policy, .. }) => {
                assert_eq!(title, "ship it");
                assert_eq!(policy.mode, Some(ValidationMode::Threshold));
                assert_eq!(policy.require.len(), 2);
                assert_eq!(policy.threshold, Some(1));
            }
            other => panic!("expected task create, got {other:?}"),
        }
    }

    #[test]
    fn cli_rejects_preset_with_inline_fields() {
        let parsed = Cli::try_parse_from([
            "proofline",
            "task",
            "create",
            "--project",
            "p",
            "x",
            "--preset",
            "high",
            "--mode",
            "any",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn cli_rejects_unknown_status() {
        let parsed = Cli::try_parse_from(["proofline", "iteration", "status", "it-1", "shipped"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
