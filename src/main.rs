mod cli;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{
    Cli, Command, DecisionCommand, IterationCommand, LeaseCommand, PolicyArgs, ProjectCommand,
    RbacCommand, TaskCommand,
};
use proofline::{
    AttestationFilter, CreateDecision, CreateTask, Engine, ErrorKind, EventFilter, PolicyRequest,
    ProoflineError, TaskFilter, UpdateTask,
};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("error:").red().bold());
            ExitCode::from(exit_code(&err))
        }
    }
}

/// Exit status per error kind so scripts can tell a gate apart from a bug.
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<ProoflineError>().map(ProoflineError::kind) {
        Some(ErrorKind::Validation) => 2,
        Some(ErrorKind::NotFound) => 3,
        Some(ErrorKind::InvalidTransition) => 4,
        Some(ErrorKind::GatingFailed) => 5,
        Some(ErrorKind::LeaseConflict) => 6,
        Some(ErrorKind::Forbidden | ErrorKind::ForbiddenAttestation) => 7,
        Some(ErrorKind::Internal) | None => 1,
    }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn done(message: &str) {
    println!("{} {message}", style("ok").green().bold());
}

fn policy_request(args: PolicyArgs) -> PolicyRequest {
    PolicyRequest {
        preset: args.preset,
        mode: args.mode,
        require: (!args.require.is_empty()).then_some(args.require),
        threshold: args.threshold,
    }
}

fn run(cli: Cli) -> Result<()> {
    let engine = Engine::open(&cli.dir)
        .with_context(|| format!("failed to open workspace {}", cli.dir.display()))?;
    let actor = cli.actor.as_str();

    match cli.command {
        Command::Init {
            project,
            description,
        } => print(&engine.init_project(&project, description.as_deref(), actor)?)?,

        Command::Project(cmd) => match cmd {
            ProjectCommand::Show { project } => print(&engine.get_project(&project)?)?,
            ProjectCommand::List => print(&engine.list_projects()?)?,
            ProjectCommand::Update {
                project,
                status,
                description,
            } => print(&engine.update_project(&project, actor, status, description.as_deref())?)?,
            ProjectCommand::Delete { project } => {
                engine.delete_project(&project, actor)?;
                done(&format!("project {project} deleted"));
            }
        },

        Command::Task(cmd) => run_task(&engine, actor, cmd)?,

        Command::Lease(cmd) => match cmd {
            LeaseCommand::Claim { task, ttl } => print(&engine.claim_lease(&task, actor, ttl)?)?,
            LeaseCommand::Release { task, force } => {
                engine.release_lease(&task, actor, force)?;
                done(&format!("lease on {task} released"));
            }
            LeaseCommand::Show { task } => match engine.get_lease(&task)? {
                Some((lease, live)) => {
                    print(&lease)?;
                    if !live {
                        println!("{}", style("expired").yellow());
                    }
                }
                None => println!("{}", style("no lease").dim()),
            },
        },

        Command::Iteration(cmd) => match cmd {
            IterationCommand::Create { project, goal, id } => {
                print(&engine.create_iteration(&project, id.as_deref(), &goal, actor)?)?
            }
            IterationCommand::Status { id, status, force } => {
                print(&engine.set_iteration_status(&id, status, actor, force)?)?
            }
            IterationCommand::Show { id } => print(&engine.get_iteration(&id)?)?,
            IterationCommand::List { project } => print(&engine.list_iterations(&project)?)?,
        },

        Command::Attest {
            project,
            entity_kind,
            entity_id,
            kind,
            payload,
        } => print(&engine.add_attestation(
            &project,
            entity_kind,
            &entity_id,
            &kind,
            payload.as_deref(),
            actor,
        )?)?,

        Command::Attestations {
            project,
            entity_kind,
            entity_id,
            kind,
            limit,
        } => print(&engine.list_attestations(&AttestationFilter {
            project_id: project,
            entity_kind,
            entity_id,
            kind,
            limit,
        })?)?,

        Command::Decision(cmd) => match cmd {
            DecisionCommand::Create {
                project,
                title,
                decision,
                id,
                context,
                rationale,
                alternatives,
            } => print(&engine.create_decision(
                CreateDecision {
                    id,
                    project_id: project,
                    title,
                    decision,
                    context,
                    rationale,
                    alternatives,
                },
                actor,
            )?)?,
            DecisionCommand::Show { id } => print(&engine.get_decision(&id)?)?,
            DecisionCommand::List { project } => print(&engine.list_decisions(&project)?)?,
        },

        Command::Rbac(cmd) => match cmd {
            RbacCommand::Grant {
                project,
                target,
                role,
            } => {
                engine.grant_role(&project, actor, &target, &role)?;
                done(&format!("{target} now holds {role}"));
            }
            RbacCommand::Revoke {
                project,
                target,
                role,
            } => {
                engine.revoke_role(&project, actor, &target, &role)?;
                done(&format!("{role} revoked from {target}"));
            }
            RbacCommand::Allow {
                project,
                kind,
                role,
            } => {
                engine.allow_attestation_authority(&project, actor, &kind, &role)?;
                done(&format!("{role} may attest {kind}"));
            }
            RbacCommand::Deny {
                project,
                kind,
                role,
            } => {
                engine.deny_attestation_authority(&project, actor, &kind, &role)?;
                done(&format!("{role} may no longer attest {kind}"));
            }
            RbacCommand::Whoami { project } => print(&engine.who_am_i(&project, actor)?)?,
        },

        Command::Events {
            project,
            after,
            before,
            event_type,
            limit,
        } => match after {
            Some(cursor) => print(&engine.events_after(project.as_deref(), cursor, limit)?)?,
            None => print(&engine.latest_events(&EventFilter {
                project_id: project,
                event_type,
                before,
                limit,
                ..EventFilter::default()
            })?)?,
        },
    }
    Ok(())
}

fn run_task(engine: &Engine, actor: &str, cmd: TaskCommand) -> Result<()> {
    match cmd {
        TaskCommand::Create {
            project,
            title,
            id,
            task_type,
            description,
            iteration,
            parent,
            assignee,
            priority,
            depends_on,
            outcomes,
            policy,
        } => {
            let request = CreateTask {
                id,
                project_id: project,
                title,
                task_type,
                description,
                iteration_id: iteration,
                parent_id: parent,
                assignee_id: assignee,
                priority,
                depends_on,
                work_outcomes: outcomes,
                policy: policy_request(policy),
            };
            print(&engine.create_task(request, actor)?)
        }
        TaskCommand::Update {
            id,
            status,
            assignee,
            clear_assignee,
            priority,
            parent,
            clear_parent,
            add_dep,
            remove_dep,
            outcomes,
            policy,
            force,
        } => {
            let update = UpdateTask {
                status,
                assignee: if clear_assignee { Some(None) } else { assignee.map(Some) },
                priority: priority.map(Some),
                parent: if clear_parent { Some(None) } else { parent.map(Some) },
                add_deps: add_dep,
                remove_deps: remove_dep,
                work_outcomes: outcomes.map(Some),
                policy: policy_request(policy),
                force,
            };
            print(&engine.update_task(&id, update, actor)?)
        }
        TaskCommand::Done {
            id,
            outcomes,
            force,
        } => print(&engine.complete_task(&id, &outcomes, actor, force)?),
        TaskCommand::Show { id } => print(&engine.get_task(&id)?),
        TaskCommand::List {
            project,
            status,
            iteration,
            parent,
            assignee,
            task_type,
            limit,
        } => print(&engine.list_tasks(&TaskFilter {
            project_id: project,
            status,
            iteration_id: iteration,
            parent_id: parent,
            assignee_id: assignee,
            task_type,
            limit,
        })?),
        TaskCommand::Validation { id } => print(&engine.task_validation(&id)?),
    }
}
