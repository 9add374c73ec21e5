//! List composition: AND over regular conditions, OR over triggers, with
//! negation and error folding.

use std::fs::File;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use unit_conditions::{test_list, Condition, ConditionKind, ConditionResult};

struct Fixture {
    _dir: TempDir,
    existing: PathBuf,
    missing: PathBuf,
}

impl Fixture {
    fn new() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("present");
        File::create(&existing).unwrap();
        let missing = dir.path().join("absent");
        Fixture { _dir: dir, existing, missing }
    }

    fn exists(&self, path: &Path, trigger: bool, negate: bool) -> Condition {
        Condition::new(
            ConditionKind::PathExists,
            path.to_str().unwrap(),
            trigger,
            negate,
        )
    }
}

/// A condition that always errors out without touching the host: the memory
/// size is unparseable.
fn erroring(trigger: bool, negate: bool) -> Condition {
    Condition::new(ConditionKind::Memory, "bogus", trigger, negate)
}

#[test]
fn empty_list_holds() {
    assert!(test_list(&mut [], &[]));
}

#[test]
fn regular_conditions_form_a_conjunction() {
    let f = Fixture::new();

    let mut all_pass = vec![
        f.exists(&f.existing, false, false),
        f.exists(&f.missing, false, true),
    ];
    assert!(test_list(&mut all_pass, &[]));

    let mut one_fails = vec![
        f.exists(&f.existing, false, false),
        f.exists(&f.missing, false, false),
        f.exists(&f.existing, false, false),
    ];
    assert!(!test_list(&mut one_fails, &[]));

    // Short-circuit: the condition after the failing one stays untested.
    assert_eq!(one_fails[1].result(), ConditionResult::Failed);
    assert_eq!(one_fails[2].result(), ConditionResult::Untested);
}

#[test]
fn triggers_form_a_disjunction() {
    let f = Fixture::new();

    // A negated trigger on a missing path is satisfied; the second trigger
    // fails but one true trigger is enough.
    let mut list = vec![
        f.exists(&f.missing, true, true),
        f.exists(&f.missing, true, false),
        f.exists(&f.existing, false, false),
    ];
    assert!(test_list(&mut list, &[]));

    // All triggers false: the verdict is false even though the regular
    // condition passes.
    let mut list = vec![
        f.exists(&f.existing, true, true),
        f.exists(&f.missing, true, false),
        f.exists(&f.existing, false, false),
    ];
    assert!(!test_list(&mut list, &[]));
}

#[test]
fn no_triggers_means_the_or_group_is_vacuous() {
    let f = Fixture::new();
    let mut list = vec![f.exists(&f.existing, false, false)];
    assert!(test_list(&mut list, &[]));
}

#[test]
fn negate_flips_outcome_but_not_errors() {
    let f = Fixture::new();

    let mut c = f.exists(&f.existing, false, true);
    assert!(!c.test(&[]).unwrap());
    assert_eq!(c.result(), ConditionResult::Failed);

    let mut c = f.exists(&f.missing, false, true);
    assert!(c.test(&[]).unwrap());
    assert_eq!(c.result(), ConditionResult::Succeeded);

    // An error stays an error, negated or not.
    let mut c = erroring(false, true);
    assert!(c.test(&[]).is_err());
    assert_eq!(c.result(), ConditionResult::Error);
}

#[test]
fn errors_fail_regular_conditions() {
    let f = Fixture::new();
    let mut list = vec![erroring(false, false), f.exists(&f.existing, false, false)];
    assert!(!test_list(&mut list, &[]));
    assert_eq!(list[0].result(), ConditionResult::Error);
}

#[test]
fn errors_do_not_trigger() {
    let f = Fixture::new();

    // The erroring trigger counts as "not triggered", so the verdict hangs
    // on the other trigger.
    let mut list = vec![erroring(true, false), f.exists(&f.existing, true, false)];
    assert!(test_list(&mut list, &[]));

    let mut list = vec![erroring(true, false), f.exists(&f.missing, true, false)];
    assert!(!test_list(&mut list, &[]));

    // Negation does not turn an erroring trigger into a triggered one.
    let mut list = vec![erroring(true, true)];
    assert!(!test_list(&mut list, &[]));
}

#[test]
fn environment_conditions_use_the_injected_environment() {
    let env = vec!["PATH=/usr/bin".to_string(), "FLAG".to_string()];

    let mut exact = Condition::new(ConditionKind::Environment, "PATH=/usr/bin", false, false);
    assert!(exact.test(&env).unwrap());

    let mut keyed = Condition::new(ConditionKind::Environment, "PATH", false, false);
    assert!(keyed.test(&env).unwrap());

    let mut bare = Condition::new(ConditionKind::Environment, "FLAG", false, false);
    assert!(bare.test(&env).unwrap());

    let mut wrong = Condition::new(ConditionKind::Environment, "PATH=/usr/sbin", false, false);
    assert!(!wrong.test(&env).unwrap());

    let mut prefix = Condition::new(ConditionKind::Environment, "PAT", false, false);
    assert!(!prefix.test(&env).unwrap());
}

#[test]
fn results_are_recorded() {
    let f = Fixture::new();
    let mut list = vec![
        f.exists(&f.existing, false, false),
        f.exists(&f.missing, true, false),
        f.exists(&f.existing, true, false),
    ];
    assert!(test_list(&mut list, &[]));
    assert_eq!(list[0].result(), ConditionResult::Succeeded);
    assert_eq!(list[1].result(), ConditionResult::Failed);
    assert_eq!(list[2].result(), ConditionResult::Succeeded);
}
