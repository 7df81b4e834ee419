//! End-to-end scenarios run against the full
//! lex -> parse -> evaluate pipeline exactly as a host embedder would.

use bumpalo::Bump;
use vela_core::io::CollectSink;
use vela_core::Interpreter;

fn run(source: &str) -> (bool, Vec<String>) {
    let arena = Bump::new();
    let sink = CollectSink::default();
    let mut interp = Interpreter::with_sink(&arena, Box::new(sink.clone()));
    let ok = interp.run(source);
    (ok, sink.lines())
}

#[test]
fn s1_precedence_arithmetic() {
    let (ok, lines) = run("var x = 2 + 3 * 4; print(x);");
    assert!(ok);
    assert_eq!(lines, vec!["14"]);
}

#[test]
fn s2_recursive_factorial() {
    let (ok, lines) = run(
        "function fact(n){ if (n <= 1) return 1; return n * fact(n-1); }
         print(fact(5));",
    );
    assert!(ok);
    assert_eq!(lines, vec!["120"]);
}

#[test]
fn s3_array_push_and_size() {
    let (ok, lines) = run("var a[] = [1,2,3]; a.push(4); print(a.size());");
    assert!(ok);
    assert_eq!(lines, vec!["4"]);
}

#[test]
fn s4_struct_constructor_positional_args() {
    let (ok, lines) = run(
        "struct P { var x = 0; var y = 0; }
         var p = P(3,4); print(p.x); print(p.y);",
    );
    assert!(ok);
    assert_eq!(lines, vec!["3", "4"]);
}

#[test]
fn s5_for_loop_accumulation() {
    let (ok, lines) = run(
        "var s = 0;
         for (var i = 1; i <= 10; i = i + 1) { s += i; }
         print(s);",
    );
    assert!(ok);
    assert_eq!(lines, vec!["55"]);
}

#[test]
fn s6_division_by_zero_aborts() {
    let (ok, lines) = run("print(1/0);");
    assert!(!ok);
    assert!(lines.is_empty(), "the print never runs once the divide unwinds");
}
