mod common;

use anyhow::Result;
use common::{OWNER, PROJECT, harness, harness_with};
use proofline::{
    CreateTask, EntityKind, ErrorKind, GateError, IterationStatus, ProoflineConfig,
    ProoflineError, TaskFilter,
};

fn running(h: &common::Harness, id: &str) -> Result<()> {
    h.engine
        .create_iteration(PROJECT, Some(id), "ship the beta", OWNER)?;
    h.engine
        .set_iteration_status(id, IterationStatus::Running, OWNER, false)?;
    h.engine
        .set_iteration_status(id, IterationStatus::Delivered, OWNER, false)?;
    Ok(())
}

#[test]
fn validated_needs_the_configured_attestation() -> Result<()> {
    let h = harness()?;
    running(&h, "it-1")?;

    let err = h
        .engine
        .set_iteration_status("it-1", IterationStatus::Validated, OWNER, false)
        .unwrap_err();
    assert!(matches!(
        err,
        ProoflineError::Gate(GateError::IterationAttestationMissing { ref kind })
            if kind == "iteration.approved"
    ));
    assert_eq!(
        h.engine.get_iteration("it-1")?.status,
        IterationStatus::Delivered
    );

    h.attest(EntityKind::Iteration, "it-1", "iteration.approved")?;
    let before = h.last_event_id()?;
    let validated =
        h.engine
            .set_iteration_status("it-1", IterationStatus::Validated, OWNER, false)?;
    assert_eq!(validated.status, IterationStatus::Validated);

    let events = h.engine.events_after(Some(PROJECT), before, 10)?;
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(types, ["iteration.validation.checked", "iteration.updated"]);
    assert_eq!(events[0].payload["result"], true);
    assert_eq!(events[0].payload["required_kind"], "iteration.approved");
    Ok(())
}

#[test]
fn forced_validation_still_records_the_check() -> Result<()> {
    let h = harness()?;
    running(&h, "it-1")?;
    let before = h.last_event_id()?;

    h.engine
        .set_iteration_status("it-1", IterationStatus::Validated, OWNER, true)?;
    let events = h.engine.events_after(Some(PROJECT), before, 10)?;
    let types: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
    assert_eq!(
        types,
        ["force.used", "iteration.validation.checked", "iteration.updated"]
    );
    assert_eq!(events[1].payload["result"], false);
    assert_eq!(events[1].payload["forced"], true);
    Ok(())
}

#[test]
fn iteration_edges_are_enforced() -> Result<()> {
    let h = harness()?;
    let it = h
        .engine
        .create_iteration(PROJECT, None, "explore", OWNER)?;
    assert_eq!(it.status, IterationStatus::Pending);

    let err = h
        .engine
        .set_iteration_status(&it.id, IterationStatus::Delivered, OWNER, false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    h.engine
        .set_iteration_status(&it.id, IterationStatus::Running, OWNER, false)?;
    h.engine
        .set_iteration_status(&it.id, IterationStatus::Rejected, OWNER, false)?;
    let err = h
        .engine
        .set_iteration_status(&it.id, IterationStatus::Running, OWNER, false)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    Ok(())
}

#[test]
fn empty_validation_kind_disables_the_gate() -> Result<()> {
    let mut config = ProoflineConfig::default();
    config.policies.defaults.iteration.validation_require = String::new();
    let h = harness_with(config)?;
    running(&h, "it-1")?;
    let it = h
        .engine
        .set_iteration_status("it-1", IterationStatus::Validated, OWNER, false)?;
    assert_eq!(it.status, IterationStatus::Validated);
    Ok(())
}

#[test]
fn tasks_join_iterations_of_their_own_project() -> Result<()> {
    let h = harness()?;
    h.engine
        .create_iteration(PROJECT, Some("it-1"), "beta", OWNER)?;
    let mut request = CreateTask::new(PROJECT, "in sprint").of_type("workshop");
    request.iteration_id = Some("it-1".into());
    h.engine.create_task(request, OWNER)?;

    let in_sprint = h.engine.list_tasks(&TaskFilter {
        iteration_id: Some("it-1".into()),
        ..TaskFilter::default()
    })?;
    assert_eq!(in_sprint.len(), 1);

    h.engine.init_project("other", None, OWNER)?;
    let mut stray = CreateTask::new("other", "stray").of_type("workshop");
    stray.iteration_id = Some("it-1".into());
    let err = h.engine.create_task(stray, OWNER).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    assert_eq!(h.engine.list_iterations(PROJECT)?.len(), 1);
    assert!(h.engine.list_iterations("other")?.is_empty());
    Ok(())
}
