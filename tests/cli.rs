use std::io::Write;
use std::process::{Command, Output};
use tempfile::NamedTempFile;

const HELLO: &str = r#"{
    "functions": [ {
        "name": "greet",
        "params": [ { "name": "who" } ],
        "code": [
            { "op": { "push": "hello " } },
            { "op": { "local": { "name": "who", "intent": "R" } } },
            { "op": { "arith": { "op": "concat", "in_place": false } } },
            { "op": { "return": true } }
        ]
    } ],
    "main": [
        { "op": { "find_function": "greet" } },
        { "op": { "global": { "name": "argv", "intent": "R" } } },
        { "op": { "index": { "key": 1, "intent": "R" } } },
        { "op": { "prepare_arg": "by_value" } },
        { "op": { "invoke": { "argc": 1, "discard": false } } },
        { "op": "echo" }
    ]
}"#;

fn program_file(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(text.as_bytes()).expect("write program");
    file
}

fn opvm(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_opvm"))
        .args(args)
        .output()
        .expect("failed to run opvm")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_run_passes_script_arguments() {
    let file = program_file(HELLO);
    let path = file.path().to_str().unwrap();
    let output = opvm(&["run", path, "world"]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "hello world");
}

#[test]
fn test_run_exit_status() {
    let file = program_file(r#"{ "main": [ { "op": { "push": 7 } }, { "op": { "exit": true } } ] }"#);
    let output = opvm(&["run", file.path().to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(7));
}

#[test]
fn test_uncaught_exception_exits_with_255() {
    let file = program_file(
        r#"{ "main": [
            { "op": { "class_new": { "class": "Exception", "no_ctor": 0 } } },
            { "op": { "push": "oops" } },
            { "op": { "prepare_arg": "by_value" } },
            { "op": { "invoke": { "argc": 1, "discard": true } } },
            { "op": "throw" }
        ] }"#,
    );
    let output = opvm(&["run", file.path().to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(255));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Uncaught exception 'Exception' with message 'oops'"));
}

#[test]
fn test_dump_lists_every_block() {
    let file = program_file(HELLO);
    let output = opvm(&["dump", file.path().to_str().unwrap()]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("{main}"));
    assert!(text.contains("greet()"));
}

#[test]
fn test_verify_accepts_and_rejects() {
    let good = program_file(HELLO);
    let output = opvm(&["verify", good.path().to_str().unwrap()]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("{main}: ok"));

    let bad = program_file(r#"{ "main": [ { "op": "drop" } ] }"#);
    let output = opvm(&["verify", bad.path().to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stdout(&output).contains("stack underflow at instruction 0"));
}

#[test]
fn test_malformed_program_is_reported() {
    let file = program_file("{ not json");
    let output = opvm(&["run", file.path().to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("parsing"));
}
