use assert_cmd::Command;
use std::io::Write;

fn lox() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("lox"))
}

fn script(source: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::with_suffix(".lox").unwrap();
    write!(file, "{}", source).unwrap();
    file
}

fn strip_ansi(s: &str) -> String {
    let mut result = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' {
            in_escape = true;
        } else if in_escape {
            if c == 'm' {
                in_escape = false;
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[test]
fn runs_file_successfully() {
    let file = script("print \"hello\";\n");
    lox()
        .arg(file.path())
        .assert()
        .success()
        .stdout("hello\n");
}

#[test]
fn runs_classes_from_file() {
    let file = script(
        "class Greeter {\n  init(name) { this.name = name; }\n  greet() { return \"hi \" + this.name; }\n}\nprint Greeter(\"lox\").greet();\n",
    );
    lox()
        .arg(file.path())
        .assert()
        .success()
        .stdout("hi lox\n");
}

#[test]
fn too_many_args_is_a_usage_error() {
    lox()
        .args(["one.lox", "two.lox"])
        .assert()
        .code(2)
        .stderr(predicates::str::contains("Usage: lox"));
}

#[test]
fn missing_file_exits_65() {
    lox()
        .arg("no_such_script.lox")
        .assert()
        .code(65)
        .stderr(predicates::str::contains("Could not read script"));
}

#[test]
fn syntax_error_exits_65() {
    let file = script("print 1 +;\n");
    let output = lox().arg(file.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(65));
    assert!(output.stdout.is_empty());
    let stderr = strip_ansi(&String::from_utf8_lossy(&output.stderr));
    assert!(stderr.contains("Syntax error [line 1]"), "{}", stderr);
    assert!(stderr.contains("Expect expression."), "{}", stderr);
}

#[test]
fn resolution_error_exits_65_without_running() {
    let file = script("print \"first\";\nreturn 1;\n");
    let output = lox().arg(file.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(65));
    assert!(output.stdout.is_empty());
    let stderr = strip_ansi(&String::from_utf8_lossy(&output.stderr));
    assert!(stderr.contains("Can't return from top-level code."), "{}", stderr);
}

#[test]
fn runtime_error_exits_70_after_earlier_output() {
    let file = script("print \"before\";\nprint -\"x\";\nprint \"after\";\n");
    let output = lox().arg(file.path()).output().unwrap();
    assert_eq!(output.status.code(), Some(70));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "before\n");
    let stderr = strip_ansi(&String::from_utf8_lossy(&output.stderr));
    assert!(stderr.contains("Runtime error [line 2]"), "{}", stderr);
}

#[test]
fn file_errors_show_filename() {
    let file = script("@\n");
    let output = lox().arg(file.path()).output().unwrap();
    let stderr = strip_ansi(&String::from_utf8_lossy(&output.stderr));
    assert!(stderr.contains(&*file.path().to_string_lossy()), "{}", stderr);
}

#[test]
fn unused_locals_warn_but_still_run() {
    let file = script("{\n  var unused = 1;\n  print 2;\n}\n");
    let output = lox().arg(file.path()).output().unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "2\n");
    let stderr = strip_ansi(&String::from_utf8_lossy(&output.stderr));
    assert!(stderr.contains("Warning"), "{}", stderr);
    assert!(stderr.contains("'unused'"), "{}", stderr);
}

#[test]
fn allow_unused_silences_warnings() {
    let file = script("{ var unused = 1; }\n");
    lox()
        .arg("--allow-unused")
        .arg(file.path())
        .assert()
        .success()
        .stderr(predicates::str::is_empty());
}

#[test]
fn print_ast_shows_statements_before_output() {
    let file = script("var a = 1 + 2;\nprint a * (a - 1);\n");
    let output = lox()
        .arg("--print-ast")
        .arg(file.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    insta::assert_snapshot!(stdout, @r"
    (var a (+ 1 2))
    (print (* a (group (- a 1))))
    6
    ");
}

#[test]
fn verbose_flag_logs_to_stderr_only() {
    let file = script("print 1;\n");
    let output = lox().arg("-v").arg(file.path()).output().unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "1\n");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("evaluating"), "{}", stderr);
}

#[test]
fn piped_input_runs_as_a_script() {
    lox()
        .write_stdin("var x = 1;\n{\n  var x = 99;\n  print x;\n}\nprint x;\n")
        .assert()
        .success()
        .stdout("99\n1\n")
        .stderr(predicates::str::is_empty());
}

#[test]
fn empty_piped_input_succeeds() {
    lox().write_stdin("").assert().success();
}

#[test]
fn piped_input_does_not_auto_print() {
    lox()
        .write_stdin("var a = 1;\na\n")
        .assert()
        .code(65)
        .stderr(predicates::str::contains("Expect ';' after expression."));
}

#[test]
fn errors_are_printed_once() {
    let output = lox().write_stdin("@\n").output().unwrap();
    assert_eq!(output.status.code(), Some(65));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert_eq!(stderr.matches("Unexpected character").count(), 1);
}

#[test]
fn help_lists_flags() {
    lox()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("--allow-unused"))
        .stdout(predicates::str::contains("--print-ast"));
}
