// tests/store_properties.rs

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use scrapedeck::engine::{TaskLedger, TaskStore};
use scrapedeck::protocol::TaskStatus;
use scrapedeck_test_utils::builders::{CompletionReportBuilder, TaskRecordBuilder};

fn status_strategy() -> impl Strategy<Value = TaskStatus> {
    prop_oneof![
        Just(TaskStatus::Pending),
        Just(TaskStatus::Running),
        Just(TaskStatus::Success),
        Just(TaskStatus::Failed),
    ]
}

// (index, status, progress) triples; small index range so ids repeat often.
fn updates_strategy(max_len: usize) -> impl Strategy<Value = Vec<(u64, TaskStatus, f64)>> {
    proptest::collection::vec((0u64..40, status_strategy(), 0.0f64..=100.0), 0..max_len)
}

proptest! {
    #[test]
    fn batch_leaves_one_entry_per_unique_id(updates in updates_strategy(200)) {
        let mut ledger = TaskLedger::with_capacity_limit(1_000);
        ledger.upsert_batch(
            updates
                .iter()
                .map(|(i, s, p)| TaskRecordBuilder::new(*i).status(*s).progress(*p).build()),
        );

        let unique: HashSet<u64> = updates.iter().map(|(i, _, _)| *i).collect();
        prop_assert_eq!(ledger.len(), unique.len());

        // Last write wins for each id.
        let mut last: HashMap<u64, (TaskStatus, f64)> = HashMap::new();
        for (i, s, p) in &updates {
            last.insert(*i, (*s, *p));
        }
        for (i, (s, p)) in last {
            let task = ledger.get(&format!("task-{i:04}"));
            prop_assert_eq!(task.map(|t| (t.status, t.progress)), Some((s, p)));
        }
    }

    #[test]
    fn ledger_never_exceeds_capacity(
        capacity in 1usize..20,
        batches in proptest::collection::vec(updates_strategy(30), 1..10),
    ) {
        let mut ledger = TaskLedger::with_capacity_limit(capacity);
        for batch in batches {
            ledger.upsert_batch(
                batch
                    .into_iter()
                    .map(|(i, s, p)| TaskRecordBuilder::new(i).status(s).progress(p).build()),
            );
            prop_assert!(ledger.len() <= capacity);

            // Every indexed id resolves to itself.
            for task in ledger.iter() {
                prop_assert_eq!(ledger.get(&task.id).map(|t| &t.id), Some(&task.id));
            }
        }
    }

    #[test]
    fn finalize_leaves_no_active_tasks(
        updates in updates_strategy(60),
        failed in proptest::collection::vec(0u64..40, 0..10),
    ) {
        let mut store = TaskStore::with_capacity_limit(1_000);
        store.upsert_tasks_batch(
            updates
                .iter()
                .map(|(i, s, p)| TaskRecordBuilder::new(*i).status(*s).progress(*p).build()),
        );
        let before = store.view().tasks;

        let mut report = CompletionReportBuilder::new(40);
        for index in &failed {
            report = report.failed(*index, "failed");
        }
        store.finalize(report.build());

        for task in store.tasks() {
            prop_assert!(!task.status.is_active());
        }
        // Tasks that were already terminal keep their exact record.
        for old in before.iter().filter(|t| !t.status.is_active()) {
            prop_assert_eq!(store.task(&old.id), Some(old));
        }
    }
}
