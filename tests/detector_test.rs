use watcher_lib::{core::detector::changed, git::remote::RemoteRefSnapshot};

const MASTER_ABC: &str = "ref-abc123  refs/heads/master";
const MASTER_DEF: &str = "ref-def456  refs/heads/master";

#[test]
fn test_identical_output_is_not_a_change() {
    let baseline = RemoteRefSnapshot::new(0, MASTER_ABC);
    let candidate = RemoteRefSnapshot::new(0, MASTER_ABC);

    assert!(!changed(&baseline, &candidate));
}

#[test]
fn test_different_output_is_a_change() {
    let baseline = RemoteRefSnapshot::new(0, MASTER_ABC);
    let candidate = RemoteRefSnapshot::new(0, MASTER_DEF);

    assert!(changed(&baseline, &candidate));
}

#[test]
fn test_inconclusive_candidate_never_changes() {
    let baseline = RemoteRefSnapshot::new(0, MASTER_ABC);
    let outputs = ["", MASTER_ABC, MASTER_DEF, "fatal: could not read from remote"];

    for code in [1, 2, 128, 124, 127, -1] {
        for output in outputs {
            let candidate = RemoteRefSnapshot::new(code, output);
            assert!(
                !changed(&baseline, &candidate),
                "exit code {code} with output {output:?} must not count as a change"
            );
        }
    }
}

#[test]
fn test_comparison_is_exact_text() {
    let baseline = RemoteRefSnapshot::new(0, format!("{MASTER_ABC}\n"));
    // same ref, different whitespace: still a change
    let candidate = RemoteRefSnapshot::new(0, MASTER_ABC);

    assert!(changed(&baseline, &candidate));
}

#[test]
fn test_conclusive_answer_after_inconclusive_baseline_is_a_change() {
    let baseline = RemoteRefSnapshot::inconclusive(128);
    let candidate = RemoteRefSnapshot::new(0, MASTER_ABC);

    assert!(changed(&baseline, &candidate));
}
