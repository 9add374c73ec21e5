use std::collections::HashSet;

use unit_conditions::{Condition, ConditionKind, ConditionResult};

#[test]
fn name_tables_are_total_and_injective() {
    let mut condition_names = HashSet::new();
    let mut assert_names = HashSet::new();
    for kind in ConditionKind::ALL {
        assert!(condition_names.insert(kind.to_condition_str()));
        assert!(assert_names.insert(kind.to_assert_str()));
    }
    assert_eq!(condition_names.len(), ConditionKind::ALL.len());
    assert_eq!(assert_names.len(), ConditionKind::ALL.len());
}

#[test]
fn name_tables_mirror_each_other() {
    for kind in ConditionKind::ALL {
        let condition = kind.to_condition_str();
        let asserted = kind.to_assert_str();
        assert_eq!(condition.strip_prefix("Condition"), asserted.strip_prefix("Assert"));
    }
}

#[test]
fn names_round_trip() {
    for kind in ConditionKind::ALL {
        assert_eq!(ConditionKind::from_condition_str(kind.to_condition_str()), Some(kind));
        assert_eq!(ConditionKind::from_assert_str(kind.to_assert_str()), Some(kind));
    }
    assert_eq!(ConditionKind::from_condition_str("ConditionBogus"), None);
    assert_eq!(ConditionKind::from_assert_str("ConditionPathExists"), None);
    assert_eq!(ConditionKind::from_condition_str("AssertPathExists"), None);
}

#[test]
fn well_known_spellings() {
    assert_eq!(ConditionKind::AcPower.to_condition_str(), "ConditionACPower");
    assert_eq!(ConditionKind::Cpus.to_condition_str(), "ConditionCPUs");
    assert_eq!(ConditionKind::CpuFeature.to_condition_str(), "ConditionCPUFeature");
    assert_eq!(ConditionKind::OsRelease.to_condition_str(), "ConditionOSRelease");
    assert_eq!(ConditionKind::IoPressure.to_assert_str(), "AssertIOPressure");
    assert_eq!(
        ConditionKind::KernelCommandLine.to_assert_str(),
        "AssertKernelCommandLine"
    );
}

#[test]
fn result_names() {
    assert_eq!(ConditionResult::Untested.as_str(), "untested");
    assert_eq!(ConditionResult::Succeeded.as_str(), "succeeded");
    assert_eq!(ConditionResult::Failed.as_str(), "failed");
    assert_eq!(ConditionResult::Error.as_str(), "error");
}

#[test]
fn dump_format() {
    let mut c = Condition::new(ConditionKind::PathExists, "/", true, true);
    c.test(&[]).unwrap();

    let mut out = Vec::new();
    c.dump(&mut out, "pfx", ConditionKind::to_condition_str).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "pfx\tConditionPathExists: |!/ failed\n"
    );

    let mut out = Vec::new();
    c.dump(&mut out, "", ConditionKind::to_assert_str).unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "\tAssertPathExists: |!/ failed\n"
    );
}
