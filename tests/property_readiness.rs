// tests/property_readiness.rs

use jobdag::dag::{Dag, Readiness};
use jobdag::fs::MockFileSystem;
use jobdag::types::State;
use jobdag_test_utils::builders::DagBuilder;
use proptest::prelude::*;

fn any_state() -> impl Strategy<Value = State> {
    prop_oneof![
        Just(State::Created),
        Just(State::Staged),
        Just(State::Running),
        Just(State::Success),
        Just(State::Fail),
    ]
}

/// `p<i>` writes `f<i>.txt` and reads `f<i-1>.txt`; `extra_parents[i]`
/// adds explicit parent edges to earlier processes.
fn chain(states: &[State], extra_parents: &[Vec<usize>]) -> Dag {
    let mut builder = DagBuilder::shell();
    for i in 0..states.len() {
        let name = format!("p{i}");
        let output = format!("f{i}.txt");
        let input = i.checked_sub(1).map(|j| format!("f{j}.txt"));
        let inputs: Vec<&str> = input.iter().map(String::as_str).collect();
        builder = builder.task(&name, "step", &inputs, &[output.as_str()]);
    }
    for (i, parents) in extra_parents.iter().enumerate().take(states.len()) {
        for &j in parents.iter().filter(|&&j| j < i) {
            builder = builder.after(&format!("p{i}"), &format!("p{j}"));
        }
    }
    for (i, state) in states.iter().enumerate() {
        builder = builder.state(&format!("p{i}"), *state);
    }
    builder.build()
}

proptest! {
    #[test]
    fn runnable_means_dispatchable_with_all_prerequisites_done(
        states in prop::collection::vec(any_state(), 1..8),
        extra_parents in prop::collection::vec(prop::collection::vec(0usize..8, 0..3), 8),
    ) {
        let dag = chain(&states, &extra_parents);
        let fs = MockFileSystem::new();
        let readiness = Readiness::new(&dag, &fs);

        for (i, state) in states.iter().enumerate() {
            let process = dag.get_process(&format!("p{i}")).unwrap();
            let producer_done = i == 0 || states[i - 1] == State::Success;
            let parents_done = extra_parents[i]
                .iter()
                .filter(|&&j| j < i)
                .all(|&j| states[j] == State::Success);
            let expected = state.is_dispatchable() && producer_done && parents_done;

            prop_assert_eq!(readiness.is_runnable(process), expected, "p{}", i);
        }
    }

    #[test]
    fn failed_producer_blocks_everything_downstream(
        len in 2usize..8,
        failed in 0usize..7,
    ) {
        let failed = failed % (len - 1);
        let states: Vec<State> = (0..len)
            .map(|i| if i < failed {
                State::Success
            } else if i == failed {
                State::Fail
            } else {
                State::Created
            })
            .collect();
        let dag = chain(&states, &[]);
        let fs = MockFileSystem::new();

        let runnable = Readiness::new(&dag, &fs).runnable();
        prop_assert!(runnable.is_empty());
    }
}
