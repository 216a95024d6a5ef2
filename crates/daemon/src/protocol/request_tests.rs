// SPDX-License-Identifier: MIT
// Copyright (c) 2026 The vigil developers

use super::*;
use yare::parameterized;

#[parameterized(
    ping = { Request::Ping },
    hello = { Request::Hello { version: "0.2.0".into() } },
    start_wait = { Request::Start { name: "web".into(), env: vec!["PORT=80".into()], wait: true } },
    stop = { Request::Stop { name: "web".into(), env: vec![], wait: false } },
    restart = { Request::Restart { name: "web".into(), env: vec![], wait: true } },
    emit = { Request::Emit { name: "power-status".into(), env: vec!["STATE=low".into()], wait: false } },
    list = { Request::List },
    status = { Request::Status { name: "web".into() } },
    reload = { Request::ReloadConfiguration },
    log_priority = { Request::SetLogPriority { priority: "debug".into() } },
)]
fn roundtrip(request: Request) {
    let json = serde_json::to_string(&request).unwrap();
    let back: Request = serde_json::from_str(&json).unwrap();
    assert_eq!(back, request);
}

#[test]
fn wait_and_env_default_when_absent() {
    let request: Request = serde_json::from_str(r#"{"type":"Start","name":"web"}"#).unwrap();
    assert_eq!(request, Request::Start { name: "web".into(), env: vec![], wait: false });
}

#[test]
fn unknown_type_is_rejected() {
    let result: Result<Request, _> = serde_json::from_str(r#"{"type":"Nonsense"}"#);
    assert!(result.is_err());
}
