mod common;

use anyhow::Result;
use common::{OWNER, PROJECT, count, harness};
use proofline::{
    CreateTask, ErrorKind, GateError, LeaseError, ProoflineError, TaskFilter, TaskStatus,
    UpdateTask,
};

const STATUSES: [TaskStatus; 6] = [
    TaskStatus::Planned,
    TaskStatus::InProgress,
    TaskStatus::Review,
    TaskStatus::Done,
    TaskStatus::Rejected,
    TaskStatus::Canceled,
];

fn legal(from: TaskStatus, to: TaskStatus) -> bool {
    use TaskStatus::*;
    matches!(
        (from, to),
        (Planned, InProgress | Canceled | Review | Done)
            | (InProgress, Rejected | Canceled | Review | Done)
            | (Review, Done | Rejected)
            | (Rejected, Planned)
    )
}

#[test]
fn transition_table_is_enforced_without_force() -> Result<()> {
    let h = harness()?;
    for from in STATUSES {
        for to in STATUSES {
            if from == to {
                continue;
            }
            let id = format!("{from}-{to}");
            h.plain_task(&id)?;
            if from != TaskStatus::Planned {
                h.engine
                    .update_task(&id, UpdateTask::status(from).forced(), OWNER)?;
            }
            h.engine.claim_lease(&id, OWNER, None)?;

            let result = h.set_status(&id, to, OWNER);
            if legal(from, to) {
                let task = result?;
                assert_eq!(task.status, to, "{from} -> {to}");
            } else {
                let err = result.expect_err(&format!("{from} -> {to} should be rejected"));
                assert_eq!(err.kind(), ErrorKind::InvalidTransition, "{from} -> {to}");
                assert_eq!(h.engine.get_task(&id)?.status, from);
            }
        }
    }
    Ok(())
}

#[test]
fn status_change_requires_a_live_lease() -> Result<()> {
    let h = harness()?;
    h.plain_task("t")?;

    let err = h.set_status("t", TaskStatus::InProgress, OWNER).unwrap_err();
    assert!(matches!(err, ProoflineError::Lease(LeaseError::Required { .. })));

    h.grant("dana", "dev")?;
    h.engine.claim_lease("t", "dana", None)?;
    let err = h.set_status("t", TaskStatus::InProgress, OWNER).unwrap_err();
    assert!(matches!(
        err,
        ProoflineError::Lease(LeaseError::WrongOwner { ref owner, .. }) if owner == "dana"
    ));

    h.clock.advance(chrono::Duration::seconds(901));
    let err = h.set_status("t", TaskStatus::InProgress, "dana").unwrap_err();
    assert!(matches!(err, ProoflineError::Lease(LeaseError::Expired { .. })));
    assert_eq!(h.engine.get_task("t")?.status, TaskStatus::Planned);
    Ok(())
}

#[test]
fn dependency_blocks_done_until_finished() -> Result<()> {
    let h = harness()?;
    h.plain_task("a")?;
    let mut request = CreateTask::new(PROJECT, "b").of_type("workshop");
    request.id = Some("b".into());
    request.depends_on = vec!["a".into()];
    let b = h.engine.create_task(request, OWNER)?;
    assert_eq!(b.depends_on, vec!["a".to_string()]);

    let err = h.move_to("b", TaskStatus::Done).unwrap_err();
    let err = err.downcast::<ProoflineError>()?;
    assert!(matches!(
        err,
        ProoflineError::Gate(GateError::DependencyNotDone { ref task_id }) if task_id == "a"
    ));

    h.move_to("a", TaskStatus::Done)?;
    let b = h.set_status("b", TaskStatus::Done, OWNER)?;
    assert_eq!(b.status, TaskStatus::Done);
    Ok(())
}

#[test]
fn subtasks_gate_done_transitively() -> Result<()> {
    let h = harness()?;
    h.plain_task("parent")?;
    let mut child = CreateTask::new(PROJECT, "child").of_type("workshop");
    child.id = Some("child".into());
    child.parent_id = Some("parent".into());
    h.engine.create_task(child, OWNER)?;
    let mut grandchild = CreateTask::new(PROJECT, "grandchild").of_type("workshop");
    grandchild.id = Some("grandchild".into());
    grandchild.parent_id = Some("child".into());
    h.engine.create_task(grandchild, OWNER)?;

    let subtasks = h.engine.subtasks("parent")?;
    assert_eq!(subtasks.len(), 1);
    assert_eq!(subtasks[0].id, "child");

    // The child is pushed through by force, leaving the grandchild open.
    h.engine
        .update_task("child", UpdateTask::status(TaskStatus::Done).forced(), OWNER)?;
    let err = h.move_to("parent", TaskStatus::Done).unwrap_err();
    let err = err.downcast::<ProoflineError>()?;
    assert!(matches!(
        err,
        ProoflineError::Gate(GateError::SubtaskNotDone { ref task_id }) if task_id == "grandchild"
    ));

    h.move_to("grandchild", TaskStatus::Done)?;
    assert_eq!(
        h.set_status("parent", TaskStatus::Done, OWNER)?.status,
        TaskStatus::Done
    );
    Ok(())
}

#[test]
fn done_stamps_completion_and_forced_exit_clears_it() -> Result<()> {
    let h = harness()?;
    h.plain_task("t")?;
    let done = h.move_to("t", TaskStatus::Done)?;
    assert_eq!(done.completed_at, Some(common::start()));

    let err = h.set_status("t", TaskStatus::Review, OWNER).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    let reopened = h
        .engine
        .update_task("t", UpdateTask::status(TaskStatus::Review).forced(), OWNER)?;
    assert_eq!(reopened.status, TaskStatus::Review);
    assert_eq!(reopened.completed_at, None);
    assert_eq!(h.engine.get_task("t")?.completed_at, None);
    Ok(())
}

#[test]
fn forced_transition_skips_gates_and_is_audited() -> Result<()> {
    let h = harness()?;
    // A feature task needs three attestations; none exist and nobody holds a lease.
    h.typed_task("f", "feature")?;
    let before = h.last_event_id()?;

    let task = h
        .engine
        .update_task("f", UpdateTask::status(TaskStatus::Done).forced(), OWNER)?;
    assert_eq!(task.status, TaskStatus::Done);

    let events = h.engine.events_after(Some(PROJECT), before, 100)?;
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, ["force.used", "task.updated", "task.done"]);
    let updated = &events[1];
    assert_eq!(updated.payload["from_status"], "planned");
    assert_eq!(updated.payload["to_status"], "done");
    assert_eq!(updated.payload["forced"], true);
    assert_eq!(events[0].actor_id, OWNER);
    Ok(())
}

#[test]
fn force_needs_its_own_permission() -> Result<()> {
    let h = harness()?;
    h.plain_task("t")?;
    h.grant("dana", "dev")?;

    let err = h
        .engine
        .update_task("t", UpdateTask::status(TaskStatus::Done).forced(), "dana")
        .unwrap_err();
    assert!(matches!(err, ProoflineError::Forbidden { ref permission } if permission == "force.use"));
    assert_eq!(h.engine.get_task("t")?.status, TaskStatus::Planned);
    assert_eq!(count(&h.event_types()?, "force.used"), 0);
    Ok(())
}

#[test]
fn dependency_cycles_are_rejected() -> Result<()> {
    let h = harness()?;
    h.plain_task("a")?;
    h.plain_task("b")?;
    h.plain_task("c")?;
    h.engine.update_task(
        "a",
        UpdateTask {
            add_deps: vec!["b".into()],
            ..UpdateTask::default()
        },
        OWNER,
    )?;
    h.engine.update_task(
        "b",
        UpdateTask {
            add_deps: vec!["c".into()],
            ..UpdateTask::default()
        },
        OWNER,
    )?;

    let closing = UpdateTask {
        add_deps: vec!["a".into()],
        ..UpdateTask::default()
    };
    let err = h.engine.update_task("c", closing, OWNER).unwrap_err();
    assert!(matches!(err, ProoflineError::Gate(GateError::DependencyCycle { .. })));
    assert!(h.engine.get_task("c")?.depends_on.is_empty());

    let own = UpdateTask {
        add_deps: vec!["a".into()],
        ..UpdateTask::default()
    };
    let err = h.engine.update_task("a", own, OWNER).unwrap_err();
    assert!(matches!(err, ProoflineError::Gate(GateError::DependencyCycle { .. })));

    let removed = h.engine.update_task(
        "a",
        UpdateTask {
            remove_deps: vec!["b".into()],
            ..UpdateTask::default()
        },
        OWNER,
    )?;
    assert!(removed.depends_on.is_empty());
    Ok(())
}

#[test]
fn unknown_dependency_is_not_found() -> Result<()> {
    let h = harness()?;
    let mut request = CreateTask::new(PROJECT, "x").of_type("workshop");
    request.depends_on = vec!["ghost".into()];
    let err = h.engine.create_task(request, OWNER).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(h.engine.list_tasks(&TaskFilter::project(PROJECT))?.is_empty());
    Ok(())
}

#[test]
fn parent_cycles_are_rejected() -> Result<()> {
    let h = harness()?;
    h.plain_task("root")?;
    let mut mid = CreateTask::new(PROJECT, "mid").of_type("workshop");
    mid.id = Some("mid".into());
    mid.parent_id = Some("root".into());
    h.engine.create_task(mid, OWNER)?;

    let reparent = UpdateTask {
        parent: Some(Some("mid".into())),
        ..UpdateTask::default()
    };
    let err = h.engine.update_task("root", reparent, OWNER).unwrap_err();
    assert!(matches!(err, ProoflineError::Gate(GateError::HierarchyCycle { .. })));

    let detach = UpdateTask {
        parent: Some(None),
        ..UpdateTask::default()
    };
    assert_eq!(h.engine.update_task("mid", detach, OWNER)?.parent_id, None);
    Ok(())
}

#[test]
fn work_outcomes_need_lease_and_valid_json() -> Result<()> {
    let h = harness()?;
    h.plain_task("t")?;
    let set = |raw: &str| UpdateTask {
        work_outcomes: Some(Some(raw.to_string())),
        ..UpdateTask::default()
    };

    let err = h.engine.update_task("t", set("{\"pr\": 12}"), OWNER).unwrap_err();
    assert!(matches!(err, ProoflineError::Lease(LeaseError::Required { .. })));

    h.engine.claim_lease("t", OWNER, None)?;
    let err = h.engine.update_task("t", set("{not json"), OWNER).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let task = h.engine.update_task("t", set("{\"pr\": 12}"), OWNER)?;
    assert_eq!(task.work_outcomes, Some(serde_json::json!({ "pr": 12 })));
    Ok(())
}

#[test]
fn complete_task_records_outcomes_and_done_event() -> Result<()> {
    let h = harness()?;
    h.plain_task("t")?;
    h.engine.claim_lease("t", OWNER, None)?;

    let task = h
        .engine
        .complete_task("t", r#"{"summary": "shipped"}"#, OWNER, false)?;
    assert_eq!(task.status, TaskStatus::Done);
    assert_eq!(
        task.work_outcomes,
        Some(serde_json::json!({ "summary": "shipped" }))
    );
    assert_eq!(count(&h.event_types()?, "task.done"), 1);

    let err = h.engine.complete_task("t", "{}", OWNER, false).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    Ok(())
}

#[test]
fn create_rejects_bad_input_before_touching_state() -> Result<()> {
    let h = harness()?;
    let before = h.last_event_id()?;

    let err = h
        .engine
        .create_task(CreateTask::new(PROJECT, "   "), OWNER)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = h
        .engine
        .create_task(CreateTask::new(PROJECT, "x").of_type("spike"), OWNER)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = h
        .engine
        .create_task(CreateTask::new("nowhere", "x"), OWNER)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    h.plain_task("dup")?;
    let mut again = CreateTask::new(PROJECT, "again").of_type("workshop");
    again.id = Some("dup".into());
    let err = h.engine.create_task(again, OWNER).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let types: Vec<String> = h
        .engine
        .events_after(Some(PROJECT), before, 100)?
        .into_iter()
        .map(|e| e.event_type)
        .collect();
    assert_eq!(types, ["task.created"]);
    Ok(())
}

#[test]
fn list_tasks_filters_by_status_and_assignee() -> Result<()> {
    let h = harness()?;
    let mut assigned = CreateTask::new(PROJECT, "assigned").of_type("workshop");
    assigned.id = Some("assigned".into());
    assigned.assignee_id = Some("dana".into());
    h.engine.create_task(assigned, OWNER)?;
    h.plain_task("other")?;
    h.move_to("other", TaskStatus::InProgress)?;

    let mine = h.engine.list_tasks(&TaskFilter {
        assignee_id: Some("dana".into()),
        ..TaskFilter::project(PROJECT)
    })?;
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, "assigned");

    let running = h.engine.list_tasks(&TaskFilter {
        status: Some(TaskStatus::InProgress),
        ..TaskFilter::project(PROJECT)
    })?;
    assert_eq!(running.len(), 1);
    assert_eq!(running[0].id, "other");

    let limited = h.engine.list_tasks(&TaskFilter {
        limit: Some(1),
        ..TaskFilter::project(PROJECT)
    })?;
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].id, "assigned");
    Ok(())
}
