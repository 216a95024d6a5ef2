// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

use super::*;
use proptest::prelude::*;
use vigil_core::RlimitSpec;

#[test]
fn plain_command_execs_directly() {
    let plan = plan_command(&ProcessDef::command("/usr/sbin/webd --foreground -p 80"));
    assert_eq!(
        plan,
        CommandPlan::Direct {
            argv: vec![
                "/usr/sbin/webd".into(),
                "--foreground".into(),
                "-p".into(),
                "80".into()
            ]
        }
    );
}

#[test]
fn metacharacters_route_through_shell_with_exec() {
    let plan = plan_command(&ProcessDef::command("/bin/echo $HOSTNAME > /tmp/name"));
    assert_eq!(
        plan,
        CommandPlan::ShellCommand { line: "exec /bin/echo $HOSTNAME > /tmp/name".into() }
    );
}

#[test]
fn single_line_script_uses_dash_c() {
    let plan = plan_command(&ProcessDef::script("exec /usr/sbin/webd\n"));
    assert_eq!(plan, CommandPlan::ShellCommand { line: "exec /usr/sbin/webd".into() });
}

#[test]
fn multi_line_script_is_fed_through_pipe() {
    let body = "mkdir -p /run/webd\nexec /usr/sbin/webd\n";
    let plan = plan_command(&ProcessDef::script(body));
    assert_eq!(plan, CommandPlan::ShellFeed { body: body.into() });
}

#[test]
fn error_record_roundtrip() {
    let record = SetupErrorRecord { step: SetupStep::Chroot as u32, arg: 0, errno: 2 };
    let decoded = SetupErrorRecord::decode(&record.encode());
    assert_eq!(decoded, record);
}

#[test]
fn chroot_record_decodes_to_typed_error() {
    let class = vigil_core::test_support::service_class("bad", "/bin/true");
    let record = SetupErrorRecord {
        step: SetupStep::Chroot as u32,
        arg: 0,
        errno: Errno::ENOENT as i32,
    };
    let err = SpawnError::from_record(record, &class);
    assert_eq!(err, SpawnError::Chroot(Errno::ENOENT));
    assert!(!err.is_temporary());
}

#[test]
fn rlimit_record_names_the_limit() {
    let mut class = vigil_core::test_support::service_class("svc", "/bin/true");
    class.limits.push((
        ResourceKind::Nofile,
        RlimitSpec { soft: Some(1024), hard: Some(4096) },
    ));
    let record = SetupErrorRecord {
        step: SetupStep::Rlimit as u32,
        arg: 0,
        errno: Errno::EPERM as i32,
    };
    let err = SpawnError::from_record(record, &class);
    assert_eq!(err, SpawnError::Rlimit { kind: ResourceKind::Nofile, errno: Errno::EPERM });
}

#[test]
fn unknown_step_is_bad_record() {
    let class = vigil_core::test_support::service_class("svc", "/bin/true");
    let record = SetupErrorRecord { step: 99, arg: 0, errno: 1 };
    assert_eq!(SpawnError::from_record(record, &class), SpawnError::BadRecord);
}

#[test]
fn fork_failure_is_temporary() {
    assert!(SpawnError::Fork(Errno::EAGAIN).is_temporary());
}

proptest! {
    #[test]
    fn record_roundtrips_for_all_values(step in 0u32..8, arg in any::<i32>(), errno in any::<i32>()) {
        let record = SetupErrorRecord { step, arg, errno };
        prop_assert_eq!(SetupErrorRecord::decode(&record.encode()), record);
    }
}
