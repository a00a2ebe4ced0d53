#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub const NOW: &str = "2026-10-17T09:00:00Z";

pub fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

/// A running `portald` with a frozen clock, talking JSON lines over stdio.
pub struct Sidecar {
    child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Sidecar {
    pub fn spawn(workspace: Option<&Path>, now: &str) -> Self {
        let exe = env!("CARGO_BIN_EXE_portald");
        let mut cmd = Command::new(exe);
        cmd.env("PORTALD_NOW", now)
            .env_remove("PORTALD_WORKSPACE")
            .env_remove("PORTALD_UTC_OFFSET_MINUTES")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());
        if let Some(ws) = workspace {
            cmd.env("PORTALD_WORKSPACE", ws);
        }
        let mut child = cmd.spawn().expect("spawn portald");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = child.stdout.take().expect("child stdout");
        Self {
            child,
            stdin,
            reader: BufReader::new(stdout),
            next_id: 1,
        }
    }

    pub fn open(workspace: &Path) -> Self {
        Self::spawn(Some(workspace), NOW)
    }

    pub fn open_at(workspace: &Path, now: &str) -> Self {
        Self::spawn(Some(workspace), now)
    }

    pub fn send_raw(&mut self, line: &str) -> Value {
        writeln!(self.stdin, "{}", line).expect("write request");
        self.stdin.flush().expect("flush request");
        let mut out = String::new();
        self.reader.read_line(&mut out).expect("read response line");
        assert!(!out.trim().is_empty(), "empty response for {}", line);
        serde_json::from_str(out.trim()).expect("parse response json")
    }

    pub fn request(&mut self, method: &str, params: Value) -> Value {
        let id = self.next_id.to_string();
        self.next_id += 1;
        let payload = json!({ "id": id, "method": method, "params": params });
        let value = self.send_raw(&payload.to_string());
        assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
        value
    }

    pub fn request_ok(&mut self, method: &str, params: Value) -> Value {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{} failed: {}",
            method,
            value
        );
        value.get("result").cloned().unwrap_or(Value::Null)
    }

    /// Calls `method` expecting a failure and returns its error code.
    pub fn request_err(&mut self, method: &str, params: Value) -> String {
        let value = self.request(method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value["error"]["code"].as_str().unwrap_or("").to_string()
    }

    /// Same as `request_ok` with `actorId` merged into the params.
    pub fn call(&mut self, actor: &str, method: &str, mut params: Value) -> Value {
        params["actorId"] = json!(actor);
        self.request_ok(method, params)
    }

    pub fn call_err(&mut self, actor: &str, method: &str, mut params: Value) -> String {
        params["actorId"] = json!(actor);
        self.request_err(method, params)
    }

    pub fn sign_in(&mut self, id: &str, name: Option<&str>) -> Value {
        self.request_ok(
            "profiles.upsert",
            json!({ "id": id, "email": format!("{}@school.test", id), "name": name }),
        )
    }

    /// Signs in the first account and makes it admin.
    pub fn bootstrap_admin(&mut self, id: &str) {
        self.sign_in(id, Some("Admin"));
        self.request_ok("admin.bootstrap", json!({ "actorId": id }));
    }

    pub fn approve(&mut self, admin: &str, user: &str, role: &str) {
        self.call(admin, "admin.users.update", json!({ "userId": user, "role": role }));
    }

    /// A fully set-up, approved student.
    pub fn add_student(&mut self, admin: &str, id: &str, name: &str, grade: &str) {
        self.sign_in(id, Some(name));
        self.approve(admin, id, "student");
        self.request_ok(
            "profile.setup",
            json!({ "actorId": id, "name": name, "grade": grade }),
        );
    }

    pub fn add_teacher(&mut self, admin: &str, id: &str, name: &str) {
        self.sign_in(id, Some(name));
        self.approve(admin, id, "teacher");
    }

    pub fn finish(mut self) {
        drop(self.stdin);
        let _ = self.child.wait();
    }
}
