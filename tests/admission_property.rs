// tests/admission_property.rs

use proptest::prelude::*;

use sandboxer::task::{Task, TaskState};
use sandboxer_test_utils::HarnessBuilder;

#[derive(Debug, Clone)]
enum Op {
    Create(u8),
    Delete(u8),
    Finish(u8),
    Tick,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..8u8).prop_map(Op::Create),
        (0..8u8).prop_map(Op::Delete),
        (0..8u8).prop_map(Op::Finish),
        Just(Op::Tick),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn active_tasks_never_exceed_limit(
        limit in 1..4usize,
        ops in proptest::collection::vec(op_strategy(), 1..40),
    ) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let h = HarnessBuilder::new().admission_limit(limit).build();

            for op in ops {
                match op {
                    Op::Create(i) => {
                        let _ = h.engine.create(Task::process(format!("t{i}"), "true")).await;
                    }
                    Op::Delete(i) => {
                        h.engine.delete(&format!("t{i}")).await.unwrap();
                    }
                    Op::Finish(i) => h.executor.set_state(&format!("t{i}"), TaskState::Succeeded),
                    Op::Tick => {
                        h.engine.reconcile().await;
                        tokio::task::yield_now().await;
                    }
                }

                let tasks = h.engine.list().await;
                let active = tasks.iter().filter(|t| t.counts_toward_admission()).count();
                prop_assert!(active <= limit, "active {active} > limit {limit}");

                // Every tracked task is persisted, and deletion marks stick.
                for t in &tasks {
                    let stored = h.store.record(&t.name);
                    prop_assert!(stored.is_some(), "{} tracked but not stored", t.name);
                    if t.is_deleted() {
                        prop_assert!(stored.unwrap().is_deleted());
                    }
                }
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
