use bytelox::interpret;

#[test]
fn if_else() {
    let source = r#"
if (false) print "a"; else print "b";
if (true) print "c"; else print "d";
if (nil) print "e";
if (0) { print "zero is truthy"; }
if ("") print "so is the empty string";
"#;
    let mut out = Vec::new();
    interpret(source, &mut out).unwrap();
    let out = String::from_utf8(out).unwrap();
    let expected = "b\nc\nzero is truthy\nso is the empty string\n";
    assert_eq!(&out, expected);
}

#[test]
fn dangling_else_binds_to_nearest_if() {
    let source = "if (true) if (false) print \"inner\"; else print \"else\";";
    let mut out = Vec::new();
    interpret(source, &mut out).unwrap();
    let out = String::from_utf8(out).unwrap();
    assert_eq!(&out, "else\n");
}

#[test]
fn while_loop() {
    let source = r#"
var i = 0;
while (i < 3) {
    print i;
    i = i + 1;
}
while (false) print "never";
"#;
    let mut out = Vec::new();
    interpret(source, &mut out).unwrap();
    let out = String::from_utf8(out).unwrap();
    let expected = "0\n1\n2\n";
    assert_eq!(&out, expected);
}

#[test]
fn for_loop() {
    let source = "for (var i = 0; i < 3; i = i + 1) print i;";
    let mut out = Vec::new();
    interpret(source, &mut out).unwrap();
    let out = String::from_utf8(out).unwrap();
    let expected = "0\n1\n2\n";
    assert_eq!(&out, expected);
}

#[test]
fn for_loop_clauses_are_optional() {
    let source = r#"
var i = 0;
for (; i < 2;) {
    print i;
    i = i + 1;
}
for (i = 10; i > 8; i = i - 1) print i;
"#;
    let mut out = Vec::new();
    interpret(source, &mut out).unwrap();
    let out = String::from_utf8(out).unwrap();
    let expected = "0\n1\n10\n9\n";
    assert_eq!(&out, expected);
}

#[test]
fn for_loop_variable_is_scoped() {
    let source = "var i = \"outer\"; for (var i = 0; i < 1; i = i + 1) {} print i;";
    let mut out = Vec::new();
    interpret(source, &mut out).unwrap();
    let out = String::from_utf8(out).unwrap();
    assert_eq!(&out, "outer\n");
}

#[test]
fn nested_loops() {
    let source = r#"
for (var i = 0; i < 3; i = i + 1) {
    var row = "";
    var j = 0;
    while (j < 3) {
        if (j <= i) row = row + "*";
        j = j + 1;
    }
    print row;
}
"#;
    let mut out = Vec::new();
    interpret(source, &mut out).unwrap();
    let out = String::from_utf8(out).unwrap();
    let expected = "*\n**\n***\n";
    assert_eq!(&out, expected);
}

#[test]
fn logical_operators_yield_operands() {
    let source = r#"
print 1 and 2;
print nil and 2;
print false or "default";
print 1 or 2;
print false or nil;
print true and false or "x";
"#;
    let mut out = Vec::new();
    interpret(source, &mut out).unwrap();
    let out = String::from_utf8(out).unwrap();
    let expected = "2\nnil\ndefault\n1\nnil\nx\n";
    assert_eq!(&out, expected);
}

#[test]
fn short_circuit() {
    let source = r#"
fun sideEffect() {
    print "called";
    return true;
}
print false and sideEffect();
print true or sideEffect();
print true and sideEffect();
print false or sideEffect();
"#;
    let mut out = Vec::new();
    interpret(source, &mut out).unwrap();
    let out = String::from_utf8(out).unwrap();
    let expected = "false\ntrue\ncalled\ntrue\ncalled\ntrue\n";
    assert_eq!(&out, expected);
}

#[test]
fn long_loop_body() {
    let mut body = String::new();
    for _ in 0..3000 {
        body.push_str("x = x + 1;\n");
    }
    let source = format!("var x = 0;\nvar i = 0;\nwhile (i < 2) {{\n{body}i = i + 1;\n}}\nprint x;");
    let mut out = Vec::new();
    interpret(&source, &mut out).unwrap();
    let out = String::from_utf8(out).unwrap();
    assert_eq!(out, "6000\n");
}

#[test]
fn jump_too_large() {
    let mut body = String::new();
    for _ in 0..10000 {
        body.push_str("x = x + 1;\n");
    }
    let source = format!("var x = 0;\nif (true) {{\n{body}}}");
    let mut out = Vec::new();
    let err = interpret(&source, &mut out).unwrap_err();
    assert!(err.to_string().contains("Too much code to jump over"), "{err}");
}
