//! Integration tests for the session against the concrete REPL scenarios,
//! plus `use` loading and the golden script runner.

use std::io::Write;

use rill_repl::{check_file, GoldenResult, Session, SessionConfig};

fn session() -> Session {
    Session::new(SessionConfig::default())
}

#[test]
fn transcript_of_reference_scenarios() {
    let mut s = session();
    let cases: &[(&str, &str)] = &[
        ("1 + 2;", "val it = 3 : int"),
        (
            "from i in [3, 1, 2] where i < 3 yield i * 10;",
            "val it = [10, 20] : int list",
        ),
        ("let val x = 1 and x = 2 in x end;", "val it = 2 : int"),
        ("from b where b;", "val it = [true] : bool list"),
        (
            "from i in [1,2,3] compute sum over i;",
            "val it = 6 : int",
        ),
        ("10 div 0;", "uncaught exception Div"),
    ];
    for (input, expected) in cases {
        let out = s.eval_chunk(input);
        assert_eq!(out.last().map(String::as_str), Some(*expected), "for {input}");
    }
}

#[test]
fn output_is_byte_identical_across_fresh_sessions() {
    let program = "val r = {b = 2, a = 1}; \
                   from e in [{a=2,b=3},{a=2,b=1},{a=1,b=1}] group e.a compute sb = sum of e.b;";
    let first = Session::new(SessionConfig::default()).eval_chunk(program);
    let second = Session::new(SessionConfig::default()).eval_chunk(program);
    assert_eq!(first, second);
}

#[test]
fn record_source_order_does_not_change_output() {
    let mut s = session();
    let a = s.eval_chunk("{a = 1, b = 2};");
    let b = s.eval_chunk("{b = 2, a = 1};");
    assert_eq!(a, b);
}

#[test]
fn transcript_snapshot() {
    let mut s = session();
    let out = s
        .eval_chunk("val x = {b = 2, a = 1}; x.a + x.b;")
        .join("\n");
    insta::assert_snapshot!(out, @r"
    val x = {a = 1, b = 2} : {a:int, b:int}
    val it = 3 : int
    ");
}

#[test]
fn use_loads_a_script_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("lib.smli");
    let mut file = std::fs::File::create(&path).expect("create script");
    writeln!(file, "val shared = 21;").expect("write script");
    drop(file);

    let config = SessionConfig {
        script_directory: dir.path().to_path_buf(),
        ..SessionConfig::default()
    };
    let mut s = Session::new(config);
    let out = s.eval_chunk("use \"lib.smli\";");
    assert!(out.contains(&"val shared = 21 : int".to_string()), "got {out:?}");
    assert!(out.contains(&"val it = () : unit".to_string()), "got {out:?}");
    assert_eq!(s.eval_chunk("shared * 2;"), vec!["val it = 42 : int"]);
}

#[test]
fn use_depth_is_bounded() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("loop.smli");
    let mut file = std::fs::File::create(&path).expect("create script");
    writeln!(file, "use \"loop.smli\";").expect("write script");
    drop(file);

    let config = SessionConfig {
        script_directory: dir.path().to_path_buf(),
        max_use_depth: 3,
        ..SessionConfig::default()
    };
    let mut s = Session::new(config);
    let out = s.eval_chunk("use \"loop.smli\";");
    assert!(
        out.iter().any(|l| l.contains("maximum use depth")),
        "expected depth error, got {out:?}"
    );
}

#[test]
fn missing_use_file_reports_error() {
    let mut s = session();
    let out = s.eval_chunk("use \"no-such-file.smli\";");
    assert!(out[0].contains("use failed"), "got {out:?}");
}

#[test]
fn golden_script_matches() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("golden.smli");
    let mut file = std::fs::File::create(&path).expect("create script");
    write!(
        file,
        "fun fact n = if n = 0 then 1 else n * fact (n - 1);\n\
         > val fact = fn : int -> int\n\
         fact 5;\n\
         > val it = 120 : int\n"
    )
    .expect("write script");
    drop(file);

    let result = check_file(&path, SessionConfig::default()).expect("script runs");
    assert_eq!(result, GoldenResult::Matches);
}

#[test]
fn golden_script_divergence_is_reported() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("bad.smli");
    let mut file = std::fs::File::create(&path).expect("create script");
    write!(file, "1 + 2;\n> val it = 4 : int\n").expect("write script");
    drop(file);

    match check_file(&path, SessionConfig::default()).expect("script runs") {
        GoldenResult::Differs { expected, actual } => {
            assert_eq!(expected, vec!["val it = 4 : int"]);
            assert_eq!(actual, vec!["val it = 3 : int"]);
        }
        GoldenResult::Matches => panic!("divergence should be reported"),
    }
}
