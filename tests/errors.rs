use rstest::rstest;
use stencil::{compile, substitute, vars, EvalError, Options, Position, Scope, Template, TemplateError};

fn compile_named(source: &str, name: &str) -> Result<Template, TemplateError> {
    Template::new(source, Options::new().name(name))
}

// ── Compile-time ──

#[test]
fn unclosed_if_names_the_opener() {
    let err = compile_named("{{if x}}", "foo.html").unwrap_err();
    assert_eq!(err.to_string(), "No {{endif}} at line 1 column 3 in foo.html");
}

#[test]
fn for_without_in() {
    let err = compile_named("{{for x}}", "foo2.html").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Bad for (no \"in\") in \"x\" at line 1 column 3 in foo2.html"
    );
}

#[rstest]
#[case("{{endif}}", "{{endif}} without matching {{if}}")]
#[case("{{else}}", "{{else}} without matching {{if}}")]
#[case("{{if 1}}{{else}}{{elif 2}}{{endif}}", "{{elif}} after {{else}}")]
#[case("{{if 1}}{{for i in x}}{{endif}}", "No {{endfor}} to close {{for}} before {{endif}}")]
#[case("{{break}}", "{{break}} outside of a for loop")]
#[case("{{for i in x}}{{def b}}{{continue}}{{enddef}}{{endfor}}", "{{continue}} outside of a for loop")]
#[case("{{while x}}", "Unknown directive \"while\"")]
#[case("{{if}}", "{{if}} requires an argument")]
#[case("{{endif x}}", "Unexpected text after {{endif}}")]
#[case("a }} b", "}} outside expression")]
#[case("{{ a {{ b }}", "{{ inside expression")]
#[case("{{ a", "No }} to finish last expression")]
#[case("{{if 1}}{{inherit 'p'}}{{endif}}", "{{inherit}} is only allowed at the top level")]
#[case("{{inherit 'a'}}{{inherit 'b'}}", "Duplicate {{inherit}}")]
fn syntax_errors(#[case] source: &str, #[case] message: &str) {
    let err = compile(source).unwrap_err();
    assert!(matches!(err, TemplateError::Syntax { .. }), "{err:?}");
    assert!(
        err.to_string().starts_with(message),
        "{:?} does not start with {:?}",
        err.to_string(),
        message
    );
}

#[test]
fn bad_expression_is_a_syntax_error() {
    let err = compile("x {{1 +}}").unwrap_err();
    assert!(matches!(err, TemplateError::Syntax { .. }));
    assert_eq!(err.position(), Some(Position::new(1, 5)));
}

#[test]
fn errors_point_at_later_lines() {
    let err = compile("line one\nline two\n  {{for a b}}").unwrap_err();
    assert_eq!(err.position(), Some(Position::new(3, 5)));
}

// ── Render-time ──

#[test]
fn undefined_name_reports_name_and_position() {
    let err = substitute("{{x}}", Scope::new()).unwrap_err();
    assert_eq!(err.to_string(), "name 'x' is not defined at line 1 column 3");
    let TemplateError::Runtime { error, .. } = err else {
        panic!("expected a runtime error");
    };
    assert!(matches!(error, EvalError::Undefined(name) if name == "x"));
}

#[test]
fn runtime_errors_carry_the_template_name() {
    let t = compile_named("ok\n  {{user.missing}}", "page.txt").unwrap();
    let err = t.render(vars!(user = serde_json::json!({"name": "x"}))).unwrap_err();
    assert_eq!(
        err.to_string(),
        "'dict' object has no attribute 'missing' at line 2 column 5 in page.txt"
    );
}

#[test]
fn code_block_errors_point_at_the_failing_line() {
    let t = compile("line1\n{{py:\nx = 1\ny = x + 'a'\n}}").unwrap();
    let err = t.render(Scope::new()).unwrap_err();
    assert_eq!(
        err.to_string(),
        "unsupported operand type(s) for +: 'int' and 'str' at line 4 column 1"
    );
}

#[test]
fn unpacking_the_wrong_number_of_items_fails() {
    let err = substitute("{{for a, b in x}}{{a}}{{endfor}}", vars!(x = vec![vec![1, 2, 3]])).unwrap_err();
    let TemplateError::Runtime { error, .. } = err else {
        panic!("expected a runtime error");
    };
    assert!(matches!(error, EvalError::Unpack { expected: 2, found: 3 }));
}

#[rstest]
#[case("{{1 / 0}}", "division by zero")]
#[case("{{[1][5]}}", "list index out of range")]
#[case("{{ {'a': 1}['b'] }}", "key 'b' not found")]
#[case("{{5()}}", "'int' object is not callable")]
#[case("{{for i in 3}}{{endfor}}", "'int' object is not iterable")]
#[case("{{1 < 'a'}}", "ordering not supported between instances of 'int' and 'str'")]
#[case("{{'ab' * 9223372036854775807}}", "repeated sequence is too long")]
#[case("{{[1] * 10 ** 12}}", "repeated sequence is too long")]
fn evaluation_failures(#[case] source: &str, #[case] message: &str) {
    let err = substitute(source, Scope::new()).unwrap_err();
    assert!(matches!(err, TemplateError::Runtime { .. }), "{err:?}");
    assert!(err.to_string().starts_with(message), "{}", err);
}

#[test]
fn host_function_errors_propagate() {
    let t = Template::new(
        "{{fail()}}",
        Options::new().function("fail", |_, _| Err(EvalError::custom("service unavailable"))),
    )
    .unwrap();
    let err = t.render(Scope::new()).unwrap_err();
    assert_eq!(err.to_string(), "service unavailable at line 1 column 3");
}
