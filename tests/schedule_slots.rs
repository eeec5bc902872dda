use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
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

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_classboardd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn classboardd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: Value,
) -> Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

struct Board {
    _child: Child,
    stdin: ChildStdin,
    reader: BufReader<ChildStdout>,
    next_id: u64,
}

impl Board {
    fn open(prefix: &str) -> Board {
        let workspace = temp_dir(prefix);
        let (_child, mut stdin, mut reader) = spawn_sidecar();
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "ws",
            "workspace.select",
            json!({ "path": workspace.to_string_lossy() }),
        );
        Board {
            _child,
            stdin,
            reader,
            next_id: 1,
        }
    }

    fn call(&mut self, method: &str, params: Value) -> Value {
        let id = format!("{}", self.next_id);
        self.next_id += 1;
        request_ok(&mut self.stdin, &mut self.reader, &id, method, params)
    }

    fn call_err(&mut self, method: &str, params: Value) -> String {
        let id = format!("{}", self.next_id);
        self.next_id += 1;
        let value = request(&mut self.stdin, &mut self.reader, &id, method, params);
        assert_eq!(
            value.get("ok").and_then(|v| v.as_bool()),
            Some(false),
            "{} unexpectedly succeeded: {}",
            method,
            value
        );
        value["error"]["code"].as_str().expect("error code").to_string()
    }

    fn seed_course(&mut self, name: &str) -> String {
        let teacher = self.call(
            "users.create",
            json!({ "name": format!("teacher of {}", name), "email": format!("{}@example.com", name.replace(' ', ".")), "role": "teacher" }),
        )["userId"]
            .as_str()
            .expect("userId")
            .to_string();
        self.call(
            "courses.create",
            json!({ "name": name, "teacherId": teacher }),
        )["courseId"]
            .as_str()
            .expect("courseId")
            .to_string()
    }
}

#[test]
fn assigning_the_same_slot_twice_is_a_conflict() {
    let mut board = Board::open("classboard-slot-conflict");
    let math = board.seed_course("Toán X");
    let literature = board.seed_course("Văn Y");

    let assigned = board.call(
        "schedule.assign",
        json!({ "courseId": math, "date": "2024-06-03", "period": "Sáng", "orderIndex": 0 }),
    );
    assert_eq!(assigned["entry"]["date"], json!("2024-06-03"));
    assert_eq!(assigned["entry"]["orderIndex"], json!(0));

    let code = board.call_err(
        "schedule.assign",
        json!({ "courseId": literature, "date": "2024-06-03", "period": "Sáng", "orderIndex": 0 }),
    );
    assert_eq!(code, "conflict");

    // The losing assignment left no row behind: only one populated cell.
    let week = board.call("schedule.week", json!({ "date": "2024-06-03" }));
    let cell = &week["grid"]["Sáng"][0][0];
    assert_eq!(cell["courseName"], json!("Toán X"));
    assert_eq!(week["grid"]["Sáng"][0][1]["type"], json!("empty"));
}

#[test]
fn second_slot_of_the_same_period_is_free() {
    let mut board = Board::open("classboard-slot-second");
    let math = board.seed_course("Toán Z");
    let literature = board.seed_course("Văn Z");

    board.call(
        "schedule.assign",
        json!({ "courseId": math, "date": "2024-06-03", "period": "Sáng", "orderIndex": 0 }),
    );
    board.call(
        "schedule.assign",
        json!({ "courseId": literature, "date": "2024-06-03", "period": "Sáng", "orderIndex": 1 }),
    );

    let week = board.call("schedule.week", json!({ "date": "2024-06-03" }));
    assert_eq!(week["grid"]["Sáng"][0][0]["courseName"], json!("Toán Z"));
    assert_eq!(week["grid"]["Sáng"][0][1]["courseName"], json!("Văn Z"));
}

#[test]
fn week_window_runs_monday_through_sunday() {
    let mut board = Board::open("classboard-week-window");
    let course = board.seed_course("Hóa W");

    // Monday and the following Sunday land in one window.
    board.call(
        "schedule.assign",
        json!({ "courseId": course, "date": "2024-06-03", "period": "Sáng", "orderIndex": 0 }),
    );
    board.call(
        "schedule.assign",
        json!({ "courseId": course, "date": "2024-06-09", "period": "Tối", "orderIndex": 1 }),
    );
    // The next Monday does not.
    board.call(
        "schedule.assign",
        json!({ "courseId": course, "date": "2024-06-10", "period": "Sáng", "orderIndex": 0 }),
    );

    // Queried from the Sunday, the window still starts the previous Monday.
    let week = board.call("schedule.week", json!({ "date": "2024-06-09" }));
    assert_eq!(week["weekStart"], json!("2024-06-03"));
    assert_eq!(week["weekEnd"], json!("2024-06-09"));
    assert_eq!(week["grid"]["Sáng"][0][0]["type"], json!("class"));
    assert_eq!(week["grid"]["Tối"][6][1]["type"], json!("class"));

    let next_week = board.call("schedule.week", json!({ "date": "2024-06-10" }));
    assert_eq!(next_week["weekStart"], json!("2024-06-10"));
    assert_eq!(next_week["grid"]["Sáng"][0][0]["type"], json!("class"));
    assert_eq!(next_week["grid"]["Tối"][6][1]["type"], json!("empty"));
}

#[test]
fn assignment_validation_rejects_bad_input() {
    let mut board = Board::open("classboard-slot-validation");
    let course = board.seed_course("Sinh V");

    let code = board.call_err(
        "schedule.assign",
        json!({ "courseId": course, "date": "03/06/2024", "period": "Sáng" }),
    );
    assert_eq!(code, "bad_params");

    let code = board.call_err(
        "schedule.assign",
        json!({ "courseId": course, "date": "2024-06-03", "period": "Midnight" }),
    );
    assert_eq!(code, "bad_params");

    let code = board.call_err(
        "schedule.assign",
        json!({ "courseId": course, "date": "2024-06-03", "period": "Sáng", "orderIndex": 2 }),
    );
    assert_eq!(code, "bad_params");

    let code = board.call_err(
        "schedule.assign",
        json!({ "courseId": "missing-course", "date": "2024-06-03", "period": "Sáng" }),
    );
    assert_eq!(code, "not_found");
}

#[test]
fn unassign_frees_the_slot_for_reassignment() {
    let mut board = Board::open("classboard-slot-unassign");
    let course = board.seed_course("Nhạc U");

    let entry_id = board.call(
        "schedule.assign",
        json!({ "courseId": course, "date": "2024-06-04", "period": "Chiều" }),
    )["entry"]["id"]
        .as_str()
        .expect("entry id")
        .to_string();

    board.call("schedule.unassign", json!({ "entryId": entry_id }));

    // The identical triple can be assigned again.
    board.call(
        "schedule.assign",
        json!({ "courseId": course, "date": "2024-06-04", "period": "Chiều" }),
    );

    let code = board.call_err("schedule.unassign", json!({ "entryId": "gone" }));
    assert_eq!(code, "not_found");
}
