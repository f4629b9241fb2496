// tests/task_store.rs

mod common;
use crate::common::builders::{CompletionReportBuilder, ProgressBuilder, TaskRecordBuilder};

use scrapedeck::engine::{Page, TaskFilter, TaskLedger, TaskStore, MAX_TASKS};
use scrapedeck::jobs::ImportedJobFile;
use scrapedeck::protocol::{StoppedNotice, TaskStatus};

#[test]
fn upsert_same_id_twice_keeps_one_entry_with_second_value() {
    let mut store = TaskStore::new();
    store.upsert_task(TaskRecordBuilder::new(1).running(10.0).build());
    store.upsert_task(TaskRecordBuilder::new(1).running(55.0).build());

    assert_eq!(store.tasks().len(), 1);
    let task = store.task("task-0001").expect("task present");
    assert_eq!(task.progress, 55.0);
    assert_eq!(task.status, TaskStatus::Running);
}

#[test]
fn replacing_a_task_keeps_its_position() {
    let mut store = TaskStore::new();
    for i in 1..=3 {
        store.upsert_task(TaskRecordBuilder::new(i).build());
    }
    store.upsert_task(TaskRecordBuilder::new(1).succeeded().build());

    let ids: Vec<&str> = store.tasks().iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["task-0001", "task-0002", "task-0003"]);
    assert_eq!(store.tasks()[0].status, TaskStatus::Success);
}

#[test]
fn batch_with_repeated_ids_yields_one_entry_per_id() {
    let mut store = TaskStore::new();
    store.upsert_tasks_batch(vec![
        TaskRecordBuilder::new(1).running(10.0).build(),
        TaskRecordBuilder::new(2).running(20.0).build(),
        TaskRecordBuilder::new(1).running(30.0).build(),
        TaskRecordBuilder::new(3).build(),
    ]);

    assert_eq!(store.tasks().len(), 3);
    assert_eq!(store.task("task-0001").map(|t| t.progress), Some(30.0));
}

#[test]
fn overflow_evicts_oldest_positions_first() {
    let mut store = TaskStore::new();
    for i in 1..=(MAX_TASKS as u64 + 5) {
        store.upsert_task(TaskRecordBuilder::new(i).build());
    }

    assert_eq!(store.tasks().len(), MAX_TASKS);
    assert!(store.task("task-0005").is_none());
    assert_eq!(store.tasks()[0].id, "task-0006");
    assert_eq!(store.tasks()[MAX_TASKS - 1].id, "task-0105");
}

#[test]
fn oversized_batch_is_trimmed_once_after_applying() {
    let mut ledger = TaskLedger::with_capacity_limit(3);
    ledger.upsert_batch((1..=5).map(|i| TaskRecordBuilder::new(i).build()));

    let ids: Vec<&str> = ledger.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["task-0003", "task-0004", "task-0005"]);

    // Index still points at the right slots after the trim.
    ledger.upsert(TaskRecordBuilder::new(4).succeeded().build());
    assert_eq!(ledger.len(), 3);
    assert_eq!(ledger.as_slice()[1].status, TaskStatus::Success);
}

#[test]
fn finalize_resolves_active_tasks_against_failed_list() {
    let mut store = TaskStore::new();
    store.set_running(true);
    store.upsert_task(TaskRecordBuilder::new(1).running(40.0).build());
    store.upsert_task(TaskRecordBuilder::new(2).build());
    store.upsert_task(TaskRecordBuilder::new(3).succeeded().elapsed(1.5).build());
    let untouched = store.task("task-0003").cloned();

    store.finalize(CompletionReportBuilder::new(3).failed(1, "timeout").build());

    let t1 = store.task("task-0001").expect("task-0001");
    assert_eq!(t1.status, TaskStatus::Failed);
    assert_eq!(t1.progress, 100.0);

    let t2 = store.task("task-0002").expect("task-0002");
    assert_eq!(t2.status, TaskStatus::Success);
    assert_eq!(t2.progress, 100.0);

    assert_eq!(store.task("task-0003").cloned(), untouched);

    assert!(!store.is_running());
    assert!(store.is_completed());
    assert_eq!(store.completion().map(|c| c.failed), Some(1));
}

#[test]
fn finalize_leaves_terminal_tasks_even_if_listed_as_failed() {
    let mut store = TaskStore::new();
    store.upsert_task(TaskRecordBuilder::new(7).succeeded().build());

    store.finalize(CompletionReportBuilder::new(1).failed(7, "late failure").build());

    assert_eq!(
        store.task("task-0007").map(|t| t.status),
        Some(TaskStatus::Success)
    );
}

#[test]
fn finalize_adds_failed_tasks_missing_from_the_ledger() {
    let mut store = TaskStore::new();
    store.upsert_task(TaskRecordBuilder::new(1).running(5.0).build());

    store.finalize(
        CompletionReportBuilder::new(2)
            .failed(2, "unreachable")
            .build(),
    );

    let added = store.task("task-0002").expect("synthetic failed task");
    assert_eq!(added.status, TaskStatus::Failed);
    assert_eq!(added.error.as_deref(), Some("unreachable"));
    assert_eq!(store.tasks().len(), 2);
}

#[test]
fn finalize_prefers_echoed_ids() {
    let mut store = TaskStore::new();
    store.upsert_task(TaskRecordBuilder::new(1).id("custom-a").running(1.0).build());

    store.finalize(
        CompletionReportBuilder::new(1)
            .failed_with_id(1, "custom-a", "boom")
            .build(),
    );

    assert_eq!(
        store.task("custom-a").map(|t| t.status),
        Some(TaskStatus::Failed)
    );
    assert!(store.task("task-0001").is_none());
}

#[test]
fn progress_is_replaced_wholesale() {
    let mut store = TaskStore::new();
    store.update_progress(ProgressBuilder::new(10).success(3).eta(12.0).build());
    store.update_progress(ProgressBuilder::new(10).success(4).build());

    let progress = store.progress().expect("progress");
    assert_eq!(progress.completed, 4);
    assert_eq!(progress.eta, None);
}

#[test]
fn last_error_is_sticky_until_cleared_or_overwritten() {
    let mut store = TaskStore::new();
    store.record_error("first");
    store.upsert_task(TaskRecordBuilder::new(1).build());
    assert_eq!(store.last_error(), Some("first"));

    store.record_error("second");
    assert_eq!(store.last_error(), Some("second"));

    store.clear_error();
    assert_eq!(store.last_error(), None);
}

#[test]
fn reset_clears_run_state_but_keeps_presentation() {
    let mut store = TaskStore::new();
    store.set_page(Page::Tasks);
    store.set_task_filter(TaskFilter::Failed);
    store.set_imported_file(Some(ImportedJobFile {
        path: "/jobs/articles.json".into(),
        article_count: 12,
    }));
    store.set_running(true);
    store.update_progress(ProgressBuilder::new(5).success(1).build());
    store.upsert_task(TaskRecordBuilder::new(1).build());
    store.record_error("oops");

    store.reset();

    assert!(!store.is_running());
    assert!(store.progress().is_none());
    assert!(store.tasks().is_empty());
    assert!(store.last_error().is_none());
    assert_eq!(store.presentation().page, Page::Tasks);
    assert_eq!(store.presentation().task_filter, TaskFilter::Failed);
    assert_eq!(
        store
            .presentation()
            .imported_file
            .as_ref()
            .map(|f| f.article_count),
        Some(12)
    );
}

#[test]
fn stopped_notice_clears_running_without_touching_tasks() {
    let mut store = TaskStore::new();
    store.set_running(true);
    store.upsert_task(TaskRecordBuilder::new(1).running(50.0).build());

    store.mark_stopped(StoppedNotice { run: 1, code: None });

    assert!(!store.is_running());
    assert!(!store.is_completed());
    assert_eq!(
        store.task("task-0001").map(|t| t.status),
        Some(TaskStatus::Running)
    );
}

#[test]
fn filter_and_counts_follow_statuses() {
    let mut store = TaskStore::new();
    store.upsert_task(TaskRecordBuilder::new(1).succeeded().build());
    store.upsert_task(TaskRecordBuilder::new(2).failed("x").build());
    store.upsert_task(TaskRecordBuilder::new(3).running(1.0).build());
    store.set_task_filter(TaskFilter::Failed);

    let view = store.view();
    let failed: Vec<&str> = view.filtered_tasks().map(|t| t.id.as_str()).collect();
    assert_eq!(failed, vec!["task-0002"]);
    assert_eq!(store.filtered_tasks(TaskFilter::Success).len(), 1);

    let counts = store.status_counts();
    assert_eq!((counts.success, counts.failed, counts.running, counts.pending), (1, 1, 1, 0));
}
