//! Testable properties of the language's runtime behavior.

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
fn p1_numeric_print_is_canonical_decimal() {
    let (ok, lines) = run("print(2 + 3 * 4); print(1 / 4);");
    assert!(ok);
    assert_eq!(lines, vec!["14", "0.25"]);
}

#[test]
fn p2_string_concatenation_preserves_length() {
    // `len` lives in vela-cli, not the core's surface,
    // so this checks the concatenation result directly rather than via
    // a length native.
    let (ok, lines) = run("var s = \"ab\" + \"cde\"; print(s);");
    assert!(ok);
    assert_eq!(lines, vec!["abcde"]);
}

#[test]
fn p3_wrong_arity_call_is_fatal() {
    let (ok, _) = run("function add(a, b) { return a + b; } print(add(1));");
    assert!(!ok);
}

#[test]
fn p4_block_scope_hides_inner_declaration() {
    let (ok, _) = run("{ var x = 1; } print(x);");
    assert!(!ok, "x should be out of scope once the block closes");
}

#[test]
fn p5_break_exits_only_innermost_loop() {
    let (ok, lines) = run(
        "var seen = 0;
         for (var i = 0; i < 3; i++) {
             for (var j = 0; j < 3; j++) {
                 if (j == 1) break;
                 seen += 1;
             }
         }
         print(seen);",
    );
    assert!(ok);
    assert_eq!(lines, vec!["3"]);
}

#[test]
fn p5_break_outside_loop_is_warning_not_error() {
    let (ok, _) = run("break; print(1);");
    assert!(ok);
}

#[test]
fn p6_array_push_pop_round_trip() {
    let (ok, lines) = run(
        "var a[] = [1,2,3];
         a.push(9);
         var w = a.pop();
         print(w); print(a.size());",
    );
    assert!(ok);
    assert_eq!(lines, vec!["9", "3"]);
}

#[test]
fn p7_map_set_is_idempotent() {
    let (ok, lines) = run(
        "var m{};
         m.set(\"k\", 1);
         m.set(\"k\", 1);
         print(m.size());
         print(m.find(\"k\"));",
    );
    assert!(ok);
    assert_eq!(lines, vec!["1", "1"]);
}

#[test]
fn p8_struct_field_write_read() {
    let (ok, lines) = run(
        "struct P { var x = 0; }
         var p = P(1);
         p.x = 5;
         print(p.x);
         p.missing = 9;
         print(p.x);",
    );
    assert!(ok);
    assert_eq!(lines, vec!["5", "5"]);
}

#[test]
fn p9_parenthesization_matches_precedence() {
    let (ok, lines) = run("print(2 + 3 * 4); print((2 + 3) * 4);");
    assert!(ok);
    assert_eq!(lines, vec!["14", "20"]);
}
