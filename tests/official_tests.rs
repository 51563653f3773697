use bytelox::{interpret, InterpretResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static EXPECTED_OUTPUT: Lazy<Regex> = Lazy::new(|| Regex::new("// expect: ?(.*)").unwrap());
static EXPECTED_ERROR: Lazy<Regex> = Lazy::new(|| Regex::new("// (Error.*)").unwrap());
static EXPECTED_ERROR_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new("// \\[((java|c) )?line (\\d+)] (Error.*)").unwrap());
static EXPECTED_RUNTIME_ERROR: Lazy<Regex> =
    Lazy::new(|| Regex::new("// expect runtime error: (.+)").unwrap());

fn execute_test(source: &str) {
    let lines = source.lines();
    let mut expected_output = String::new();
    let mut expected_errors: HashSet<String> = HashSet::new();
    let mut expected_runtime_error: Option<(usize, String)> = None;
    for (linenum, line) in lines.enumerate() {
        if let Some(m) = EXPECTED_OUTPUT.captures(line) {
            expected_output.push_str(&m[1]);
            expected_output.push('\n');
        } else if let Some(m) = EXPECTED_ERROR.captures(line) {
            expected_errors.insert(m[1].to_string());
        } else if let Some(m) = EXPECTED_ERROR_LINE.captures(line) {
            expected_errors.insert(format!("[line {}] {}", &m[3], &m[4]));
        } else if let Some(m) = EXPECTED_RUNTIME_ERROR.captures(line) {
            expected_runtime_error = Some((linenum + 1, m[1].to_string()))
        }
    }
    let mut out = Vec::new();
    let res = interpret(source, &mut out);
    let out = String::from_utf8(out).unwrap();
    if let Some((line, runtime_error)) = expected_runtime_error {
        assert!(res.is_err(), "Expected runtime error, got output:\n{out}");
        let res = res.unwrap_err();
        assert_eq!(res.result(), InterpretResult::RuntimeError, "{res}");
        let res = res.to_string();
        assert!(
            res.contains(&runtime_error),
            "Got:\n{res}, expected to find:\n{runtime_error}"
        );
        let location = format!("[line {line}]");
        assert!(
            res.contains(&location),
            "Got:\n{res}, expected to find:\n{location}"
        );
        assert_eq!(out, expected_output);
    } else if expected_errors.is_empty() {
        assert!(res.is_ok(), "Expected OK, got {}", res.unwrap_err());
        assert_eq!(out, expected_output);
    } else {
        assert!(res.is_err(), "Expected compile errors, got output:\n{out}");
        let res = res.unwrap_err();
        assert_eq!(res.result(), InterpretResult::CompileError, "{res}");
        assert!(out.is_empty());
        let res = res.to_string();
        for e in expected_errors {
            assert!(res.contains(&e), "Got:\n{res}, expected to find:\n{e}")
        }
    }
}

macro_rules! test_bundled {
    ($folder:literal : $($files:literal),+ ,) => {
        paste::item! {
            mod [< bundled_$folder >] {
                test_bundled_inner!($folder: $($files),+);
            }
        }
    };
}

macro_rules! test_bundled_inner {
    ($folder:literal : $file:literal) => {
        paste::item! {
            #[test]
            #[cfg_attr(miri, ignore)]
            fn [< test_ $file >]() {
                // Embed so Miri can work
                let source = include_str!(concat!("lox/", $folder, "/", $file, ".lox"));
                crate::execute_test(source)
            }
        }
    };
    ($folder:literal : $file:literal, $($files:literal),+ ) => {
        test_bundled_inner!($folder: $file);
        test_bundled_inner!($folder: $($files),+);
    };
}

test_bundled!("assignment":
    "associativity",
    "global",
    "grouping",
    "infix_operator",
    "local",
    "prefix_operator",
    "syntax",
    "undefined",
);

test_bundled!("block":
    "empty",
    "scope",
);

test_bundled!("bool":
    "equality",
    "not",
);

test_bundled!("comments":
    "line_at_eof",
    "only_line_comment",
    "only_line_comment_and_line",
    "unicode",
);

test_bundled!("for":
    "fun_in_body",
    "return_inside",
    "scope",
    "statement_condition",
    "statement_increment",
    "statement_initializer",
    "syntax",
    "var_in_body",
);

test_bundled!("function":
    "body_must_be_block",
    "call_non_name",
    "duplicate",
    "empty_body",
    "extra_arguments",
    "missing_arguments",
    "missing_comma_in_parameters",
    "mutual_recursion",
    "nested_call_with_arguments",
    "nested_declaration",
    "parameters",
    "recursion",
    "stack_overflow",
    "undefined",
);

test_bundled!("if":
    "dangling_else",
    "else",
    "fun_in_then",
    "if",
    "truth",
    "var_in_else",
    "var_in_then",
);

test_bundled!("logical_operator":
    "and",
    "and_truth",
    "or",
    "or_truth",
);

test_bundled!("nil":
    "literal",
);

test_bundled!("number":
    "leading_dot",
    "literals",
    "trailing_dot",
);

test_bundled!("operator":
    "add",
    "add_bool_nil",
    "add_num_nil",
    "add_string_nil",
    "comparison",
    "divide",
    "divide_by_zero",
    "divide_nonnum_num",
    "equals",
    "greater_nonnum_num",
    "greater_or_equal_nonnum_num",
    "less_num_nonnum",
    "less_or_equal_num_nonnum",
    "multiply",
    "multiply_nonnum_num",
    "negate",
    "negate_nonnum",
    "not",
    "not_equals",
    "subtract",
    "subtract_num_nonnum",
);

test_bundled!("precedence":
    "precedence",
);

test_bundled!("print":
    "missing_argument",
);

test_bundled!("return":
    "after_else",
    "after_if",
    "after_while",
    "at_top_level",
    "in_function",
    "return_nil_if_no_value",
);

test_bundled!("scanning":
    "unexpected_character",
);

test_bundled!("string":
    "error_after_multiline",
    "literals",
    "multiline",
    "unterminated",
);

test_bundled!("variable":
    "collide_with_parameter",
    "duplicate_local",
    "duplicate_parameter",
    "in_middle_of_block",
    "in_nested_block",
    "redeclare_global",
    "redefine_global",
    "scope_reuse_in_different_blocks",
    "shadow_and_local",
    "shadow_global",
    "shadow_local",
    "undefined_global",
    "undefined_local",
    "uninitialized",
    "use_false_as_var",
    "use_global_in_initializer",
    "use_local_in_initializer",
    "use_nil_as_var",
);

test_bundled!("while":
    "fun_in_body",
    "return_inside",
    "syntax",
    "var_in_body",
);
