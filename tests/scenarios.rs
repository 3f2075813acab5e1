use anyhow::Context;
use std::sync::Arc;
use steel_workflow::{
    ActorId, Amount, AuditAction, DocumentInput, DocumentPatch, DocumentWorkflowService,
    EntityKind, LineItemInput, TermInput, TimeStamp, ValidationError, WorkflowConfig,
    WorkflowError, diff::Change, transition::status,
};

use tempfile::{TempDir, tempdir}; // Use for test db cleanup.

// Sled locks its directory, so every test opens its own database under a
// temp dir. The TempDir is returned so it lives as long as the service.
fn open_service(name: &str) -> anyhow::Result<(TempDir, Arc<DocumentWorkflowService>)> {
    let temp_dir = tempdir()?;
    let service =
        DocumentWorkflowService::open(temp_dir.path().join(name), WorkflowConfig::default())?;
    Ok((temp_dir, Arc::new(service)))
}

fn units(n: i64) -> Amount {
    Amount::units(n)
}

fn quotation_input() -> DocumentInput {
    DocumentInput::new(EntityKind::Quotation, "cust_tata_projects")
        .add_item(
            LineItemInput::new(units(10), units(100))
                .with_product("prod_erw_2in", "ERW Pipe 2in")
                .with_spec("2in", "IS 1239", "MTR"),
        )
        .add_item(LineItemInput::new(units(5), units(200)).with_description("Seamless pipe 4in"))
        .add_term(TermInput::standard("term_payment_30d"))
        .add_term(TermInput::custom("Delivery within 4 weeks of PO"))
        .set_project("Refinery expansion")
}

fn actor(id: &str) -> ActorId {
    ActorId::new(id).unwrap()
}

#[test]
fn scenario_a_create_quotation() -> anyhow::Result<()> {
    let (_dir, service) = open_service("scenario_a.db")?;
    let sales = actor("user_sales");

    let document = service
        .create(&sales, quotation_input())
        .context("Quotation failed on create: ")?;

    assert_eq!(document.totals.subtotal, units(2000));
    assert_eq!(document.totals.tax, units(360));
    assert_eq!(document.totals.grand_total, units(2360));
    assert_eq!(document.status, status::DRAFT);
    assert_eq!(document.version_number, 1);
    assert!(document.is_latest_version);
    assert!(document.document_number.starts_with("QTN/STC/"));
    assert_eq!(document.created_by, "user_sales");

    // exactly one snapshot, current, labelled as the original revision
    let snapshots = service.snapshots().list_snapshots(&document.id)?;
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].version_number, 1);
    assert_eq!(snapshots[0].version_label, "Rev.00");
    assert_eq!(snapshots[0].change_reason, "Initial creation");
    assert!(snapshots[0].is_current);
    assert_eq!(snapshots[0].items.len(), 2);
    assert_eq!(snapshots[0].terms.len(), 2);

    let events = service.audit_trail(EntityKind::Quotation, &document.id)?;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].action, AuditAction::Create);
    assert!(events[0].before.is_none());
    assert!(events[0].after.is_some());

    Ok(())
}

#[test]
fn scenario_b_approval_requires_remarks() -> anyhow::Result<()> {
    let (_dir, service) = open_service("scenario_b.db")?;
    let sales = actor("user_sales");
    let manager = actor("user_manager");

    let document = service.create(&sales, quotation_input())?;
    let document = service
        .submit_for_approval(&sales, &document.id)
        .context("Quotation failed on submit: ")?;
    assert_eq!(document.status, status::PENDING_APPROVAL);

    for blank in ["", "   "] {
        let err = service.approve(&manager, &document.id, blank).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Validation(ValidationError::MissingRemarks("approve"))
        ));
    }
    // refused approvals leave no trace
    let stored = service.store().require_document(&document.id)?;
    assert_eq!(stored.status, status::PENDING_APPROVAL);

    let document = service
        .approve(&manager, &document.id, "ok")
        .context("Quotation failed on approval: ")?;
    assert_eq!(document.status, status::APPROVED);
    assert_eq!(document.approved_by.as_deref(), Some("user_manager"));
    assert!(document.approved_at.is_some());
    assert_eq!(document.remarks.as_deref(), Some("ok"));

    let changes = service
        .audit_trail(EntityKind::Quotation, &document.id)?
        .into_iter()
        .filter(|e| e.action == AuditAction::StatusChange)
        .count();
    assert_eq!(changes, 2);

    Ok(())
}

#[test]
fn scenario_c_no_self_transition() -> anyhow::Result<()> {
    let (_dir, service) = open_service("scenario_c.db")?;
    let sales = actor("user_sales");
    let manager = actor("user_manager");

    let document = service.create(&sales, quotation_input())?;
    service.submit_for_approval(&sales, &document.id)?;
    service.approve(&manager, &document.id, "within pricing policy")?;

    let err = service
        .approve(&manager, &document.id, "again")
        .unwrap_err();
    match err {
        WorkflowError::Transition { current, target, .. } => {
            assert_eq!(current, status::APPROVED);
            assert_eq!(target, status::APPROVED);
        }
        other => panic!("expected a transition error, got {other:?}"),
    }
    assert_eq!(stored_status(&service, &document.id)?, status::APPROVED);

    Ok(())
}

fn stored_status(service: &DocumentWorkflowService, id: &str) -> anyhow::Result<String> {
    Ok(service.store().require_document(id)?.status)
}

#[test]
fn scenario_d_revise_appends_snapshot() -> anyhow::Result<()> {
    let (_dir, service) = open_service("scenario_d.db")?;
    let sales = actor("user_sales");

    let document = service.create(&sales, quotation_input())?;
    let patch = DocumentPatch::new().set_items(vec![
        LineItemInput::new(units(10), units(90)).with_product("prod_erw_2in", "ERW Pipe 2in"),
        LineItemInput::new(units(5), units(200)).with_description("Seamless pipe 4in"),
    ]);

    let revised = service
        .revise(&sales, &document.id, "price update", patch)
        .context("Quotation failed on revise: ")?;

    assert_eq!(revised.id, document.id);
    assert_eq!(revised.version_number, 2);
    assert_eq!(revised.status, status::DRAFT);
    assert_eq!(revised.totals.subtotal, units(1900));

    let old = service.snapshots().get_snapshot(&document.id, Some(1))?;
    let new = service.snapshots().get_snapshot(&document.id, None)?;
    assert!(!old.is_current);
    assert!(new.is_current);
    assert_eq!(new.version_number, 2);
    assert_eq!(new.version_label, "Rev.01");
    assert_eq!(new.change_reason, "price update");
    // terms were not supplied and carry forward
    assert_eq!(new.terms, old.terms);

    let updates: Vec<_> = service
        .audit_trail(EntityKind::Quotation, &document.id)?
        .into_iter()
        .filter(|e| e.action == AuditAction::Update)
        .collect();
    assert_eq!(updates.len(), 1);

    Ok(())
}

#[test]
fn scenario_e_chain_supersedes_parent() -> anyhow::Result<()> {
    let (_dir, service) = open_service("scenario_e.db")?;
    let sales = actor("user_sales");

    let parent = service.create(&sales, quotation_input())?;
    let child = service
        .create_revision_as_new_document(
            &sales,
            &parent.id,
            "customer asked for revised quantities",
            DocumentPatch::new(),
        )
        .context("Quotation failed on chain: ")?;

    assert_ne!(child.id, parent.id);
    assert_eq!(child.document_number, parent.document_number);
    assert_eq!(child.version_number, 2);
    assert!(child.is_latest_version);
    assert_eq!(child.parent_document_id.as_deref(), Some(parent.id.as_str()));
    assert_eq!(child.status, status::DRAFT);

    let parent_now = service.store().require_document(&parent.id)?;
    assert!(!parent_now.is_latest_version);
    assert_eq!(parent_now.version_number, 1);

    let history = service.history(&parent.document_number)?;
    let ids: Vec<_> = history.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, [child.id.as_str(), parent.id.as_str()]);

    // the child starts its own snapshot history with the parent's items
    let view = service.fetch(&child.id, None)?;
    assert_eq!(view.items.len(), 2);
    assert_eq!(view.versions.len(), 1);
    assert_eq!(view.chain.len(), 2);

    let created = service.audit_trail(EntityKind::Quotation, &child.id)?;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].action, AuditAction::Create);
    assert!(created[0].before.is_some());

    Ok(())
}

#[test]
fn create_with_parent_routes_through_chain() -> anyhow::Result<()> {
    let (_dir, service) = open_service("create_with_parent.db")?;
    let sales = actor("user_sales");

    let parent = service.create(&sales, quotation_input())?;
    let child = service.create(&sales, quotation_input().revision_of(&parent.id))?;

    assert_eq!(child.version_number, 2);
    assert_eq!(child.document_number, parent.document_number);
    assert!(!service.store().require_document(&parent.id)?.is_latest_version);

    Ok(())
}

#[test]
fn lineages_stay_on_one_revision_path() -> anyhow::Result<()> {
    let (_dir, service) = open_service("lineage.db")?;
    let sales = actor("user_sales");

    // snapshot lineage refuses chaining
    let revised = service.create(&sales, quotation_input())?;
    service.revise(&sales, &revised.id, "fix project", DocumentPatch::new().set_project("Plant B"))?;
    let err = service
        .create_revision_as_new_document(&sales, &revised.id, "supersede", DocumentPatch::new())
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::SnapshotLineage(_))
    ));

    // chain lineage refuses in-place revision, on both parent and child
    let parent = service.create(&sales, quotation_input())?;
    let child = service.create_revision_as_new_document(
        &sales,
        &parent.id,
        "supersede",
        DocumentPatch::new(),
    )?;
    for id in [&parent.id, &child.id] {
        let err = service
            .revise(&sales, id, "tweak", DocumentPatch::new())
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Validation(ValidationError::ChainedLineage(_))
        ));
    }

    // and a superseded parent cannot fork the chain
    let err = service
        .create_revision_as_new_document(&sales, &parent.id, "fork", DocumentPatch::new())
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Conflict(_)));
    assert_eq!(err.status_code(), 409);

    Ok(())
}

#[test]
fn stale_expected_version_conflicts() -> anyhow::Result<()> {
    let (_dir, service) = open_service("stale_version.db")?;
    let sales = actor("user_sales");

    let document = service.create(&sales, quotation_input())?;
    service.revise_if_version(&sales, &document.id, 1, "first", DocumentPatch::new())?;

    let err = service
        .revise_if_version(&sales, &document.id, 1, "second", DocumentPatch::new())
        .unwrap_err();
    assert!(matches!(err, WorkflowError::Conflict(_)));
    assert_eq!(service.snapshots().list_snapshots(&document.id)?.len(), 2);

    Ok(())
}

#[test]
fn failed_revise_writes_nothing() -> anyhow::Result<()> {
    let (_dir, service) = open_service("failed_revise.db")?;
    let sales = actor("user_sales");
    let document = service.create(&sales, quotation_input())?;

    let err = service
        .revise(&sales, &document.id, "   ", DocumentPatch::new())
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::MissingChangeReason)
    ));

    // fails after the stored header was read and patched
    let bad_charges = DocumentPatch::new().set_charges(steel_workflow::Charges::new(
        units(-10),
        Amount::ZERO,
        Amount::ZERO,
    ));
    let err = service
        .revise(&sales, &document.id, "charges", bad_charges)
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::NegativeCharge(_))
    ));

    let stored = service.store().require_document(&document.id)?;
    assert_eq!(stored, document);
    assert_eq!(service.snapshots().list_snapshots(&document.id)?.len(), 1);
    assert_eq!(service.audit_trail(EntityKind::Quotation, &document.id)?.len(), 1);

    Ok(())
}

#[test]
fn oversized_amounts_fail_validation() -> anyhow::Result<()> {
    let (_dir, service) = open_service("oversized_amounts.db")?;
    let sales = actor("user_sales");
    let huge = units(1_000_000_000_000_000);
    let item = LineItemInput::new(huge, huge).with_description("HR coil");

    let err = service
        .create(
            &sales,
            DocumentInput::new(EntityKind::Quotation, "cust_sail").add_item(item.clone()),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::AmountOutOfRange { line: 1 })
    ));
    assert_eq!(err.status_code(), 400);

    let document = service.create(&sales, quotation_input())?;
    let err = service
        .revise(
            &sales,
            &document.id,
            "bulk order",
            DocumentPatch::new().set_items(vec![item.clone()]),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::AmountOutOfRange { .. })
    ));

    let err = service
        .create_revision_as_new_document(
            &sales,
            &document.id,
            "bulk order",
            DocumentPatch::new().set_items(vec![item.clone()]),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::AmountOutOfRange { .. })
    ));

    assert_eq!(service.store().require_document(&document.id)?, document);
    assert_eq!(service.history(&document.document_number)?.len(), 1);

    Ok(())
}

#[test]
fn validity_days_are_bounded() -> anyhow::Result<()> {
    let (_dir, service) = open_service("validity_days.db")?;
    let sales = actor("user_sales");

    let err = service
        .create(&sales, quotation_input().set_validity_days(u32::MAX))
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::ValidityOutOfRange { .. })
    ));

    let document = service.create(&sales, quotation_input().set_validity_days(30))?;
    assert_eq!(
        document.valid_until.date(),
        document.created_at.plus_days(30).context("date overflow")?.date()
    );

    let err = service
        .revise(
            &sales,
            &document.id,
            "longer validity",
            DocumentPatch::new().set_validity_days(u32::MAX),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::ValidityOutOfRange { .. })
    ));
    let err = service
        .create_revision_as_new_document(
            &sales,
            &document.id,
            "longer validity",
            DocumentPatch::new().set_validity_days(u32::MAX),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::Validation(ValidationError::ValidityOutOfRange { .. })
    ));

    Ok(())
}

#[test]
fn unknown_document_is_reported_before_missing_remarks() -> anyhow::Result<()> {
    let (_dir, service) = open_service("unknown_before_remarks.db")?;
    let manager = actor("user_manager");

    let err = service.approve(&manager, "qtn1missing", "").unwrap_err();
    assert!(matches!(err, WorkflowError::NotFound { .. }));
    let err = service.reject(&manager, "qtn1missing", " ").unwrap_err();
    assert_eq!(err.status_code(), 404);

    Ok(())
}

#[test]
fn racing_approve_and_reject_admit_one() -> anyhow::Result<()> {
    let (_dir, service) = open_service("race_approve_reject.db")?;
    let sales = actor("user_sales");
    let alice = actor("user_alice");
    let bob = actor("user_bob");

    let document = service.create(&sales, quotation_input())?;
    service.submit_for_approval(&sales, &document.id)?;

    let results = std::thread::scope(|s| {
        let approve = s.spawn(|| service.approve(&alice, &document.id, "ok to send"));
        let reject = s.spawn(|| service.reject(&bob, &document.id, "margin too thin"));
        [approve.join().unwrap(), reject.join().unwrap()]
    });

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(loser, WorkflowError::Transition { .. }));

    let changes = service
        .audit_trail(EntityKind::Quotation, &document.id)?
        .into_iter()
        .filter(|e| e.action == AuditAction::StatusChange)
        .count();
    assert_eq!(changes, 2);

    Ok(())
}

#[test]
fn concurrent_revisions_keep_one_current_snapshot() -> anyhow::Result<()> {
    let (_dir, service) = open_service("concurrent_revise.db")?;
    let sales = actor("user_sales");
    let document = service.create(&sales, quotation_input())?;

    std::thread::scope(|s| {
        for n in 0..6 {
            let service = &service;
            let sales = &sales;
            let id = &document.id;
            s.spawn(move || {
                service
                    .revise(sales, id, &format!("revision {n}"), DocumentPatch::new())
                    .unwrap()
            });
        }
    });

    let snapshots = service.snapshots().list_snapshots(&document.id)?;
    let versions: Vec<u32> = snapshots.iter().map(|s| s.version_number).collect();
    assert_eq!(versions, (1..=7).rev().collect::<Vec<_>>());
    assert_eq!(snapshots.iter().filter(|s| s.is_current).count(), 1);
    assert!(snapshots[0].is_current);
    assert_eq!(service.store().require_document(&document.id)?.version_number, 7);

    Ok(())
}

#[test]
fn concurrent_chain_and_revise_admit_one_path() -> anyhow::Result<()> {
    let (_dir, service) = open_service("chain_vs_revise.db")?;
    let sales = actor("user_sales");
    let document = service.create(&sales, quotation_input())?;

    let (revised, chained) = std::thread::scope(|s| {
        let revise = s.spawn(|| service.revise(&sales, &document.id, "in place", DocumentPatch::new()));
        let chain = s.spawn(|| {
            service.create_revision_as_new_document(&sales, &document.id, "new doc", DocumentPatch::new())
        });
        (revise.join().unwrap(), chain.join().unwrap())
    });

    assert!(revised.is_ok() != chained.is_ok());
    let history = service.history(&document.document_number)?;
    assert_eq!(history.iter().filter(|d| d.is_latest_version).count(), 1);

    Ok(())
}

#[test]
fn quotation_marks_enquiry_quoted() -> anyhow::Result<()> {
    let (_dir, service) = open_service("enquiry_quoted.db")?;
    let sales = actor("user_sales");

    let enquiry = service.create(
        &sales,
        DocumentInput::new(EntityKind::Enquiry, "cust_tata_projects")
            .add_item(LineItemInput::new(units(10), units(1)).with_description("ERW pipe, price on request")),
    )?;
    assert_eq!(enquiry.status, "open");
    assert!(enquiry.document_number.starts_with("ENQ/"));

    service.create(&sales, quotation_input().set_enquiry(&enquiry.id))?;

    let enquiry = service.store().require_document(&enquiry.id)?;
    assert_eq!(enquiry.status, status::QUOTED);
    let actions: Vec<_> = service
        .audit_trail(EntityKind::Enquiry, &enquiry.id)?
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(actions, [AuditAction::Create, AuditAction::StatusChange]);

    Ok(())
}

#[test]
fn expiry_moves_only_permitted_quotations() -> anyhow::Result<()> {
    let (_dir, service) = open_service("expiry.db")?;
    let sales = actor("user_sales");
    let manager = actor("user_manager");
    let system = actor("system_expiry_job");

    let sent = service.create(&sales, quotation_input())?;
    service.submit_for_approval(&sales, &sent.id)?;
    service.approve(&manager, &sent.id, "ok")?;
    service.send(&sales, &sent.id)?;

    let approved = service.create(&sales, quotation_input())?;
    service.submit_for_approval(&sales, &approved.id)?;
    service.approve(&manager, &approved.id, "ok")?;

    let still_valid = service.create(&sales, quotation_input().set_validity_days(90))?;
    service.submit_for_approval(&sales, &still_valid.id)?;
    service.approve(&manager, &still_valid.id, "ok")?;
    service.send(&sales, &still_valid.id)?;

    let later = TimeStamp::new().plus_days(30).context("date overflow")?;
    let expired = service.expire_overdue(&system, &later)?;

    let ids: Vec<_> = expired.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, [sent.id.as_str()]);
    assert_eq!(stored_status(&service, &sent.id)?, status::EXPIRED);
    assert_eq!(stored_status(&service, &approved.id)?, status::APPROVED);
    assert_eq!(stored_status(&service, &still_valid.id)?, status::SENT);

    assert!(service.expire_overdue(&system, &later)?.is_empty());

    Ok(())
}

#[test]
fn fetch_and_compare_versions() -> anyhow::Result<()> {
    let (_dir, service) = open_service("fetch_compare.db")?;
    let sales = actor("user_sales");

    let document = service.create(&sales, quotation_input())?;
    service.revise(
        &sales,
        &document.id,
        "discount on line 1",
        DocumentPatch::new().set_items(vec![
            LineItemInput::new(units(10), units(100))
                .with_product("prod_erw_2in", "ERW Pipe 2in")
                .with_discount(units(10)),
            LineItemInput::new(units(5), units(200)).with_description("Seamless pipe 4in"),
        ]),
    )?;

    let first = service.fetch(&document.id, Some(1))?;
    assert_eq!(first.version_number, 1);
    assert_eq!(first.version_label, "Rev.00");
    assert_eq!(first.items[0].line_total, units(1000));
    assert_eq!(first.document.version_number, 2);
    let versions: Vec<u32> = first.versions.iter().map(|v| v.version_number).collect();
    assert_eq!(versions, [2, 1]);

    let current = service.fetch(&document.id, None)?;
    assert_eq!(current.items[0].line_total, units(900));

    let comparison = service.compare(&document.id, 1, 2)?;
    let Some(Change::Nested(line)) = comparison.line_items.get("1") else {
        panic!("line 1 should have changed: {:?}", comparison.line_items);
    };
    assert!(line.contains_key("discount_percent"));
    assert!(line.contains_key("line_total"));
    assert!(!comparison.line_items.contains_key("2"));
    assert!(comparison.header.contains_key("total_amount"));
    assert!(comparison.terms.is_empty());

    let err = service.fetch(&document.id, Some(9)).unwrap_err();
    assert_eq!(err.status_code(), 404);

    Ok(())
}
