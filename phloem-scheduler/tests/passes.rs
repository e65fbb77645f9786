//! Pass lifecycle tests.

use facet_testhelpers::test;
use phloem::{DiffConfig, ErrorKind, ErrorPolicy, Node, PatchOp, diff};
use phloem_scheduler::{PassHandle, PassStatus, Priority, Reconciler, ReconcilerConfig, WorkOutcome};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn list(keys: &[&str]) -> Node {
    Node::element("ul").with_children(keys.iter().map(|k| {
        Node::element("li")
            .with_key(*k)
            .with_child(Node::text(k.to_uppercase()))
    }))
}

fn completed(reconciler: &Reconciler, handle: PassHandle) -> Vec<PatchOp> {
    match reconciler.poll(handle) {
        Some(PassStatus::Completed(patches)) => {
            assert!(!patches.has_errors(), "unexpected errors: {:?}", patches.errors);
            patches.ops
        }
        other => panic!("expected Completed, got {other:?}"),
    }
}

/// Work until `handle` finishes, counting yields.
fn finish(reconciler: &mut Reconciler, handle: PassHandle) -> usize {
    let mut yields = 0;
    for _ in 0..10_000 {
        match reconciler.work() {
            WorkOutcome::Yielded => yields += 1,
            WorkOutcome::Finished(done) if done == handle => return yields,
            WorkOutcome::Finished(_) => {}
            WorkOutcome::Idle => panic!("went idle before {handle} finished"),
        }
    }
    panic!("{handle} never finished");
}

#[test]
fn test_first_pass_mounts_and_commits() {
    let mut reconciler = Reconciler::new();
    let tree = list(&["a", "b"]);
    let pass = reconciler.submit_pass(tree.clone(), Priority::Normal);
    assert_eq!(reconciler.poll(pass), Some(PassStatus::Pending));
    assert!(reconciler.current().is_none());

    assert_eq!(reconciler.work(), WorkOutcome::Finished(pass));
    assert_eq!(reconciler.work(), WorkOutcome::Idle);

    let ops = completed(&reconciler, pass);
    assert!(matches!(&ops[..], [PatchOp::Insert { index: 0, node, .. }] if *node == tree));
    assert_eq!(reconciler.current_node(), Some(tree));
}

#[test]
fn test_later_passes_diff_against_committed_tree() {
    let old = list(&["a", "b", "c"]);
    let new = list(&["c", "a", "d"]);

    let mut reconciler = Reconciler::new();
    reconciler.submit_pass(old.clone(), Priority::Normal);
    reconciler.run_until_idle();

    let pass = reconciler.submit_pass(new.clone(), Priority::Normal);
    reconciler.run_until_idle();

    assert_eq!(completed(&reconciler, pass), diff(Some(&old), Some(&new)).ops);
    assert_eq!(reconciler.current_node(), Some(new));
}

#[test]
fn test_with_current_skips_mount() {
    let tree = list(&["a", "b"]);
    let mut reconciler = Reconciler::new().with_current(&tree);
    let pass = reconciler.submit_pass(tree.clone(), Priority::Normal);
    reconciler.run_until_idle();
    assert!(completed(&reconciler, pass).is_empty());
}

#[test]
fn test_yield_and_resume() {
    let old = list(&["a", "b", "c", "d"]);
    let new = list(&["d", "c", "x", "a"]);

    let mut reconciler = Reconciler::new().with_current(&old);
    let budget = Rc::new(Cell::new(0u32));
    {
        let budget = Rc::clone(&budget);
        reconciler.set_yield_predicate(move || {
            budget.set(budget.get() + 1);
            budget.get() % 3 == 0
        });
    }

    let pass = reconciler.submit_pass(new.clone(), Priority::Normal);
    assert_eq!(reconciler.work(), WorkOutcome::Yielded);
    assert_eq!(reconciler.poll(pass), Some(PassStatus::Interrupted));
    assert_eq!(reconciler.active_pass(), Some(pass));
    // Nothing is committed while the pass is suspended.
    assert_eq!(reconciler.current_node(), Some(old.clone()));

    let yields = 1 + finish(&mut reconciler, pass);
    assert_eq!(completed(&reconciler, pass), diff(Some(&old), Some(&new)).ops);
    assert_eq!(reconciler.current_node(), Some(new));

    let stats = reconciler.stats(pass).expect("stats for finished pass");
    assert_eq!(stats.yields, yields);
    assert!(stats.units > yields);
}

#[test]
fn test_higher_priority_preempts_active_pass() {
    let mut reconciler = Reconciler::new();
    reconciler.set_yield_predicate(|| true);

    // Mounting is a single unit, so this one finishes without yielding.
    let mount = reconciler.submit_pass(list(&["a", "b", "c"]), Priority::Low);
    assert_eq!(reconciler.work(), WorkOutcome::Finished(mount));

    let background = reconciler.submit_pass(list(&["c", "b", "a"]), Priority::Low);
    assert_eq!(reconciler.work(), WorkOutcome::Yielded);
    assert_eq!(reconciler.poll(background), Some(PassStatus::Interrupted));

    let urgent_tree = Node::element("dialog");
    let urgent = reconciler.submit_pass(urgent_tree.clone(), Priority::Immediate);
    finish(&mut reconciler, urgent);

    assert_eq!(reconciler.poll(background), Some(PassStatus::Superseded));
    assert_eq!(reconciler.current_node(), Some(urgent_tree));
    assert_eq!(reconciler.work(), WorkOutcome::Idle);
}

#[test]
fn test_equal_priority_does_not_preempt() {
    let mut reconciler = Reconciler::new().with_current(&list(&["a", "b"]));
    reconciler.set_yield_predicate(|| true);

    let first = reconciler.submit_pass(list(&["b", "a"]), Priority::Normal);
    assert_eq!(reconciler.work(), WorkOutcome::Yielded);

    let second = reconciler.submit_pass(list(&["b", "a", "c"]), Priority::Normal);
    finish(&mut reconciler, first);
    assert!(matches!(reconciler.poll(first), Some(PassStatus::Completed(_))));
    assert_eq!(reconciler.poll(second), Some(PassStatus::Pending));

    finish(&mut reconciler, second);
    assert_eq!(reconciler.current_node(), Some(list(&["b", "a", "c"])));
}

#[test]
fn test_newer_submission_supersedes_pending_pass() {
    let mut reconciler = Reconciler::new();
    let stale = reconciler.submit_pass(list(&["a"]), Priority::Normal);
    let fresh = reconciler.submit_pass(list(&["b"]), Priority::Normal);
    let background = reconciler.submit_pass(list(&["c"]), Priority::Idle);

    assert_eq!(reconciler.poll(stale), Some(PassStatus::Superseded));
    reconciler.run_until_idle();

    assert!(matches!(reconciler.poll(fresh), Some(PassStatus::Completed(_))));
    assert!(matches!(reconciler.poll(background), Some(PassStatus::Completed(_))));
    assert_eq!(reconciler.current_node(), Some(list(&["c"])));
}

#[test]
fn test_cancel_discards_work_in_progress() {
    let old = list(&["a", "b"]);
    let mut reconciler = Reconciler::new().with_current(&old);
    reconciler.set_yield_predicate(|| true);

    let pass = reconciler.submit_pass(list(&["b", "a"]), Priority::Normal);
    assert_eq!(reconciler.work(), WorkOutcome::Yielded);

    assert!(reconciler.cancel(pass));
    assert!(!reconciler.cancel(pass));
    assert_eq!(reconciler.poll(pass), Some(PassStatus::Cancelled));
    assert_eq!(reconciler.active_pass(), None);
    assert_eq!(reconciler.current_node(), Some(old));
    assert_eq!(reconciler.work(), WorkOutcome::Idle);
}

#[test]
fn test_cancel_from_submitter() {
    let mut reconciler = Reconciler::new().with_current(&list(&["a", "b"]));
    reconciler.set_yield_predicate(|| true);
    let submitter = reconciler.submitter();

    let pending = submitter.submit_pass(list(&["x"]), Priority::Low);
    assert!(submitter.cancel(pending));
    assert_eq!(submitter.poll(pending), Some(PassStatus::Cancelled));

    let running = submitter.submit_pass(list(&["b", "a"]), Priority::Normal);
    assert_eq!(reconciler.work(), WorkOutcome::Yielded);
    assert!(submitter.cancel(running));

    // The reconciler notices at the next unit boundary.
    assert_eq!(reconciler.work(), WorkOutcome::Idle);
    assert_eq!(reconciler.poll(running), Some(PassStatus::Cancelled));
    assert_eq!(reconciler.current_node(), Some(list(&["a", "b"])));
}

#[test]
fn test_cancel_from_yield_predicate_is_not_undone() {
    let old = list(&["a", "b", "c"]);
    let mut reconciler = Reconciler::new().with_current(&old);
    let submitter = reconciler.submitter();
    let target = Rc::new(Cell::new(None::<PassHandle>));
    {
        let submitter = submitter.clone();
        let target = Rc::clone(&target);
        reconciler.set_yield_predicate(move || {
            if let Some(handle) = target.take() {
                assert!(submitter.cancel(handle));
            }
            true
        });
    }

    let pass = reconciler.submit_pass(list(&["c", "b", "a"]), Priority::Normal);
    target.set(Some(pass));

    assert_eq!(reconciler.work(), WorkOutcome::Idle);
    assert_eq!(reconciler.poll(pass), Some(PassStatus::Cancelled));
    assert_eq!(reconciler.active_pass(), None);
    assert_eq!(reconciler.current_node(), Some(old.clone()));

    // Nothing left to resume.
    reconciler.run_until_idle();
    assert_eq!(reconciler.poll(pass), Some(PassStatus::Cancelled));
    assert_eq!(reconciler.current_node(), Some(old));
}

#[test]
fn test_cancel_during_final_unit_skips_commit() {
    let old = Node::element("main").with_attr("class", "a");
    let new = Node::element("main").with_attr("class", "b");
    let mut reconciler = Reconciler::new().with_current(&old);
    let submitter = reconciler.submitter();

    let pass = reconciler.submit_pass(new, Priority::Normal);
    let seen = Rc::new(Cell::new(0));
    {
        let seen = Rc::clone(&seen);
        reconciler.register_patch_sink(move |_| {
            seen.set(seen.get() + 1);
            assert!(submitter.cancel(pass));
        });
    }

    // The attribute update is emitted by the pass's last unit.
    assert_eq!(reconciler.work(), WorkOutcome::Idle);
    assert_eq!(seen.get(), 1);
    assert_eq!(reconciler.poll(pass), Some(PassStatus::Cancelled));
    assert_eq!(reconciler.current_node(), Some(old));
}

#[test]
fn test_cancelled_status_never_changes() {
    let old = list(&["a", "b", "c"]);
    let mut reconciler = Reconciler::new().with_current(&old);
    reconciler.set_yield_predicate(|| true);
    let submitter = reconciler.submitter();

    let pass = submitter.submit_pass(list(&["c", "b", "a"]), Priority::Normal);
    assert_eq!(reconciler.work(), WorkOutcome::Yielded);
    assert!(submitter.cancel(pass));
    assert!(!reconciler.cancel(pass));

    let next = submitter.submit_pass(list(&["b"]), Priority::Normal);
    for _ in 0..100 {
        assert_eq!(reconciler.poll(pass), Some(PassStatus::Cancelled));
        if reconciler.work() == WorkOutcome::Idle {
            break;
        }
    }
    assert_eq!(reconciler.poll(pass), Some(PassStatus::Cancelled));
    assert!(matches!(reconciler.poll(next), Some(PassStatus::Completed(_))));
    assert_eq!(reconciler.current_node(), Some(list(&["b"])));
}

#[test]
fn test_patch_sink_sees_ops_in_order() {
    let old = list(&["a", "b", "c"]);
    let new = list(&["c", "b", "d"]);
    let mut reconciler = Reconciler::new().with_current(&old);

    let seen = Rc::new(RefCell::new(Vec::new()));
    {
        let seen = Rc::clone(&seen);
        reconciler.register_patch_sink(move |op| seen.borrow_mut().push(op.clone()));
    }
    reconciler.set_yield_predicate(|| true);

    let pass = reconciler.submit_pass(new, Priority::Normal);
    finish(&mut reconciler, pass);
    assert_eq!(*seen.borrow(), completed(&reconciler, pass));
}

#[test]
fn test_abort_policy_fails_pass_without_commit() {
    let old = list(&["a"]);
    let config = ReconcilerConfig {
        diff: DiffConfig {
            error_policy: ErrorPolicy::Abort,
        },
        ..Default::default()
    };
    let mut reconciler = Reconciler::with_config(config).with_current(&old);

    let pass = reconciler.submit_pass(list(&["b", "b"]), Priority::Normal);
    assert_eq!(reconciler.work(), WorkOutcome::Finished(pass));

    match reconciler.poll(pass) {
        Some(PassStatus::Failed(errors)) => {
            assert_eq!(errors.len(), 1);
            assert_eq!(errors[0].kind(), ErrorKind::DuplicateKey);
        }
        other => panic!("expected Failed, got {other:?}"),
    }
    assert_eq!(reconciler.current_node(), Some(old));
}

#[test]
fn test_contained_error_commits_old_children() {
    let old = list(&["a"]);
    let mut reconciler = Reconciler::new().with_current(&old);

    let pass = reconciler.submit_pass(list(&["a", "a"]).with_attr("class", "x"), Priority::Normal);
    reconciler.run_until_idle();

    match reconciler.poll(pass) {
        Some(PassStatus::Completed(patches)) => {
            assert_eq!(patches.errors.len(), 1);
            assert_eq!(patches.ops.len(), 1);
        }
        other => panic!("expected Completed, got {other:?}"),
    }
    // Current mirrors the host: new attributes, old children.
    assert_eq!(reconciler.current_node(), Some(old.with_attr("class", "x")));
}

#[test]
fn test_submit_from_another_thread() {
    let mut reconciler = Reconciler::new();
    let submitter = reconciler.submitter();

    let handle = std::thread::spawn(move || submitter.submit_pass(list(&["a"]), Priority::UserBlocking))
        .join()
        .expect("submitting thread panicked");

    reconciler.run_until_idle();
    assert!(matches!(reconciler.poll(handle), Some(PassStatus::Completed(_))));
}

#[test]
fn test_statuses_dropped_after_poll_without_retention() {
    let mut reconciler = Reconciler::with_config(ReconcilerConfig {
        retain_completed: false,
        ..Default::default()
    });
    let pass = reconciler.submit_pass(list(&["a"]), Priority::Normal);
    reconciler.run_until_idle();

    assert!(matches!(reconciler.poll(pass), Some(PassStatus::Completed(_))));
    assert_eq!(reconciler.poll(pass), None);
}

#[test]
fn test_forget() {
    let mut reconciler = Reconciler::new();
    let pass = reconciler.submit_pass(list(&["a"]), Priority::Normal);
    assert!(!reconciler.forget(pass), "pending passes cannot be forgotten");

    reconciler.run_until_idle();
    assert!(reconciler.stats(pass).is_some());
    assert!(reconciler.forget(pass));
    assert_eq!(reconciler.poll(pass), None);
    assert_eq!(reconciler.stats(pass), None);
}

#[test]
fn test_status_serialization() {
    let mut reconciler = Reconciler::new().with_current(&list(&["a", "b"]));
    let pass = reconciler.submit_pass(list(&["b", "c"]), Priority::Normal);
    reconciler.run_until_idle();

    let status = reconciler.poll(pass).expect("status");
    let json = facet_json::to_string(&status).expect("serialization should work");
    let roundtrip: PassStatus = facet_json::from_str(&json).expect("deserialization should work");
    assert_eq!(status, roundtrip);
}
