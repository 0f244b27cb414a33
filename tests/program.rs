use php_opvm::core::value::Val;
use php_opvm::runtime::program::Program;
use php_opvm::vm::engine::VmError;
use php_opvm::vm::executor::{ExecutionConfig, execute_program};

const ADD_PROGRAM: &str = r#"{
    "functions": [ {
        "name": "add",
        "params": [ { "name": "a" }, { "name": "b", "default": 3 } ],
        "code": [
            { "op": { "local": { "name": "a", "intent": "R" } } },
            { "op": { "local": { "name": "b", "intent": "R" } } },
            { "op": { "arith": { "op": "add", "in_place": false } } },
            { "op": { "return": true } }
        ]
    } ],
    "main": [
        { "op": { "find_function": "add" } },
        { "op": { "push": 2 } },
        { "op": { "prepare_arg": "by_value" } },
        { "op": { "invoke": { "argc": 1, "discard": false } } },
        { "op": "echo", "line": 4 }
    ]
}"#;

#[test]
fn test_program_file_runs() {
    let program = Program::from_json(ADD_PROGRAM).unwrap();
    let result = execute_program(&program, &[], ExecutionConfig::default()).unwrap();
    assert_eq!(result.stdout, "5");
    assert_eq!(result.value, Val::Null);
    assert_eq!(result.function_calls, 1);
}

#[test]
fn test_program_survives_a_json_round_trip() {
    let program = Program::from_json(ADD_PROGRAM).unwrap();
    let text = program.to_json().unwrap();
    let again = Program::from_json(&text).unwrap();
    assert_eq!(again.main, program.main);
    assert_eq!(again.functions[0].code, program.functions[0].code);
    assert_eq!(again.main.instructions()[4].line, 4);
}

#[test]
fn test_program_constants_and_classes() {
    let program = Program::from_json(
        r#"{
            "constants": { "GREETING": "hi" },
            "classes": [ {
                "name": "Greeter",
                "methods": [ {
                    "name": "greet",
                    "is_static": true,
                    "code": [
                        { "op": { "constant": "GREETING" } },
                        { "op": { "return": true } }
                    ]
                } ]
            } ],
            "main": [
                { "op": { "find_static_method": { "class": "Greeter", "method": "greet" } } },
                { "op": { "invoke": { "argc": 0, "discard": false } } },
                { "op": { "return": true } }
            ]
        }"#,
    )
    .unwrap();
    let result = execute_program(&program, &[], ExecutionConfig::default()).unwrap();
    assert_eq!(result.value, Val::string(b"hi"));
}

#[test]
fn test_invalid_class_hierarchy_fails_before_running() {
    let program = Program::from_json(
        r#"{ "classes": [ { "name": "B", "parent": "Missing" } ], "main": [ { "op": "echo" } ] }"#,
    )
    .unwrap();
    let failure = execute_program(&program, &[], ExecutionConfig::default()).unwrap_err();
    assert!(matches!(failure.error, VmError::Fatal(ref msg) if msg.contains("unknown class Missing")));
}
