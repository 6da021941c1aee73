// Parser robustness tests for the Sprig grammar.
//
// Each suite feeds source fragments through the lexer and parser and
// checks that good input parses and bad input fails with the expected
// diagnostic, without panicking.

use sprig::error::SprigError;
use sprig::lexer::Lexer;
use sprig::parser::Parser;

/// Test result for a single test case
#[derive(Debug)]
pub enum TestResult {
    Pass,
    Fail(String),
    Crash(String),
}

/// Individual test case
#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub input: String,
    pub should_succeed: bool,
    pub expected_error_contains: Option<String>,
}

impl TestCase {
    pub fn should_succeed(name: &str, input: &str) -> Self {
        Self {
            name: name.to_string(),
            input: input.to_string(),
            should_succeed: true,
            expected_error_contains: None,
        }
    }

    pub fn should_fail(name: &str, input: &str) -> Self {
        Self {
            name: name.to_string(),
            input: input.to_string(),
            should_succeed: false,
            expected_error_contains: None,
        }
    }

    pub fn should_fail_with_message(name: &str, input: &str, expected_msg: &str) -> Self {
        Self {
            name: name.to_string(),
            input: input.to_string(),
            should_succeed: false,
            expected_error_contains: Some(expected_msg.to_string()),
        }
    }
}

/// Test suite containing multiple test cases
#[derive(Debug)]
pub struct TestSuite {
    pub name: String,
    pub tests: Vec<TestCase>,
}

impl TestSuite {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tests: Vec::new(),
        }
    }

    pub fn add_test(&mut self, test: TestCase) {
        self.tests.push(test);
    }

    pub fn run(&self) -> TestSuiteResults {
        let mut results = TestSuiteResults::new(&self.name);

        println!("Running test suite: {}", self.name);
        println!("{}", "=".repeat(50));

        for test in &self.tests {
            let result = run_single_test(test);
            results.add_result(&test.name, result);
        }

        results.print_summary();
        results
    }
}

/// Results for a test suite run
#[derive(Debug)]
pub struct TestSuiteResults {
    pub suite_name: String,
    pub results: Vec<(String, TestResult)>,
    pub passed: usize,
    pub failed: usize,
    pub crashed: usize,
}

impl TestSuiteResults {
    pub fn new(suite_name: &str) -> Self {
        Self {
            suite_name: suite_name.to_string(),
            results: Vec::new(),
            passed: 0,
            failed: 0,
            crashed: 0,
        }
    }

    pub fn add_result(&mut self, test_name: &str, result: TestResult) {
        match &result {
            TestResult::Pass => {
                self.passed += 1;
                println!("  ok  {}", test_name);
            }
            TestResult::Fail(msg) => {
                self.failed += 1;
                println!("  FAIL {}: {}", test_name, msg);
            }
            TestResult::Crash(msg) => {
                self.crashed += 1;
                println!("  CRASH {}: {}", test_name, msg);
            }
        }
        self.results.push((test_name.to_string(), result));
    }

    pub fn print_summary(&self) {
        println!();
        println!("Test Suite: {} - Summary", self.suite_name);
        println!("{}", "-".repeat(30));
        println!("Passed:  {}", self.passed);
        println!("Failed:  {}", self.failed);
        println!("Crashed: {}", self.crashed);
        println!("Total:   {}", self.results.len());
        println!();
    }

    pub fn is_all_passed(&self) -> bool {
        self.crashed == 0 && self.failed == 0
    }
}

/// Run a single test case, catching panics so a crash is reported rather
/// than aborting the whole suite.
fn run_single_test(test: &TestCase) -> TestResult {
    let result = std::panic::catch_unwind(|| parse_input(&test.input));

    match result {
        Ok(parse_result) => match (parse_result, test.should_succeed) {
            (Ok(_), true) => TestResult::Pass,
            (Ok(_), false) => {
                TestResult::Fail("Expected parsing to fail, but it succeeded".to_string())
            }
            (Err(errors), false) => {
                if let Some(expected) = &test.expected_error_contains {
                    if errors.iter().any(|e| e.message.contains(expected)) {
                        TestResult::Pass
                    } else {
                        let messages: Vec<&str> =
                            errors.iter().map(|e| e.message.as_str()).collect();
                        TestResult::Fail(format!(
                            "No error contains expected text '{}'; got {:?}",
                            expected, messages
                        ))
                    }
                } else {
                    TestResult::Pass
                }
            }
            (Err(errors), true) => TestResult::Fail(format!(
                "Expected parsing to succeed, but got error: {}",
                errors[0].message
            )),
        },
        Err(panic_info) => {
            let panic_msg = if let Some(s) = panic_info.downcast_ref::<String>() {
                s.clone()
            } else if let Some(s) = panic_info.downcast_ref::<&str>() {
                s.to_string()
            } else {
                "Unknown panic".to_string()
            };
            TestResult::Crash(panic_msg)
        }
    }
}

fn parse_input(input: &str) -> Result<sprig::ast::Program, Vec<SprigError>> {
    let tokens = Lexer::new(input.to_string()).scan_tokens()?;
    Parser::new(tokens).parse()
}

// ============================================================================
// Test Suite Creation Functions
// ============================================================================

fn create_malformed_expression_tests() -> TestSuite {
    let mut suite = TestSuite::new("Malformed Expressions");

    suite.add_test(TestCase::should_fail_with_message(
        "unmatched_opening_paren",
        "(1 + 2;",
        "Expected ')' after expression.",
    ));

    suite.add_test(TestCase::should_fail_with_message(
        "unmatched_opening_paren_nested",
        "((1 + 2);",
        "Expected ')' after expression.",
    ));

    suite.add_test(TestCase::should_fail_with_message(
        "unmatched_closing_paren",
        "1 + 2);",
        "Expected ';' after expression.",
    ));

    suite.add_test(TestCase::should_fail_with_message(
        "empty_parens",
        "();",
        "Expected expression",
    ));

    suite.add_test(TestCase::should_fail_with_message(
        "unmatched_opening_bracket",
        "let x = [1, 2;",
        "Expected ']' at end of set.",
    ));

    suite.add_test(TestCase::should_fail_with_message(
        "unmatched_opening_brace",
        "{ let x = 1;",
        "Expected '}' at end of block.",
    ));

    suite.add_test(TestCase::should_fail_with_message(
        "stray_closing_brace",
        "let x = 1; }",
        "Expected expression, found '}'.",
    ));

    suite
}

fn create_edge_case_tests() -> TestSuite {
    let mut suite = TestSuite::new("Edge Cases");

    suite.add_test(TestCase::should_succeed("empty_input", ""));
    suite.add_test(TestCase::should_succeed("only_whitespace", "   \n\t  "));
    suite.add_test(TestCase::should_succeed("only_comment", "// nothing here\n"));

    suite.add_test(TestCase::should_fail("eof_after_operator", "1 +"));
    suite.add_test(TestCase::should_fail("eof_inside_group", "(1 + "));
    suite.add_test(TestCase::should_fail("eof_inside_call", "foo(1,"));

    let deep = format!("{}{}{}", "(".repeat(100), "1", ")".repeat(100));
    suite.add_test(TestCase::should_succeed(
        "deeply_nested_parens",
        &format!("{};", deep),
    ));

    // One mistake per statement, each reported independently
    suite.add_test(TestCase::should_fail("multiple_errors", "let = 1; let x = ;"));

    suite
}

fn create_operator_tests() -> TestSuite {
    let mut suite = TestSuite::new("Operator Tests");

    suite.add_test(TestCase::should_succeed("arithmetic", "1 + 2 * 3 - 4 / 5 % 6;"));
    suite.add_test(TestCase::should_succeed("comparisons", "1 < 2 == 3 >= 4;"));
    suite.add_test(TestCase::should_succeed("logical", "true and false or nil;"));
    suite.add_test(TestCase::should_succeed("unary_chain", "!!-1;"));

    suite.add_test(TestCase::should_fail("missing_left_operand", "* 1;"));
    suite.add_test(TestCase::should_fail("missing_right_operand", "1 *;"));

    // `--` lexes as a decrement operator, never as double negation
    suite.add_test(TestCase::should_fail_with_message(
        "decrement_of_literal",
        "1 -- 2;",
        "Invalid increment target.",
    ));

    suite.add_test(TestCase::should_succeed("increment_variable", "x++;"));
    suite.add_test(TestCase::should_succeed("halve_variable", "x---;"));
    suite.add_test(TestCase::should_succeed("increment_index", "x[0]++;"));
    suite.add_test(TestCase::should_fail_with_message(
        "increment_call_result",
        "foo()++;",
        "Invalid increment target.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "increment_grouped_index",
        "(x)[0]++;",
        "Invalid increment target.",
    ));

    suite
}

fn create_declaration_tests() -> TestSuite {
    let mut suite = TestSuite::new("Declarations");

    suite.add_test(TestCase::should_succeed("var_declaration", "let x = 42;"));
    suite.add_test(TestCase::should_succeed("var_without_initializer", "let x;"));
    suite.add_test(TestCase::should_fail_with_message(
        "var_missing_name",
        "let = 5;",
        "Expected variable name.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "var_missing_semicolon",
        "let x = 1",
        "Expected ';' after variable declaration.",
    ));

    suite.add_test(TestCase::should_succeed(
        "function_declaration",
        "def add(a, b) { return a + b; }",
    ));
    suite.add_test(TestCase::should_succeed("function_no_params", "def f() { }"));
    suite.add_test(TestCase::should_fail_with_message(
        "function_missing_name",
        "def (a) { }",
        "Expected function name.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "function_missing_body",
        "def f(a);",
        "Expected '{' before function body.",
    ));

    suite.add_test(TestCase::should_succeed(
        "class_declaration",
        "class Counter { def init() { this.n = 0; } def bump() { this.n = this.n + 1; } }",
    ));
    suite.add_test(TestCase::should_succeed(
        "class_with_superclass",
        "class B < A { def get() { return super.get(); } }",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "class_method_without_def",
        "class A { init() { } }",
        "Expected 'def' before method declaration.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "class_missing_superclass_name",
        "class B < { }",
        "Expected superclass name.",
    ));

    suite
}

fn create_control_flow_tests() -> TestSuite {
    let mut suite = TestSuite::new("Control Flow");

    suite.add_test(TestCase::should_succeed("valid_if", "if (true) { x = 1; }"));
    suite.add_test(TestCase::should_succeed(
        "if_else",
        "if (x > 0) { y = 1; } else { y = 2; }",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "if_missing_parens",
        "if true { x = 1; }",
        "Expected '(' after 'if'.",
    ));

    suite.add_test(TestCase::should_succeed("valid_while", "while (true) { x = 1; }"));
    suite.add_test(TestCase::should_fail("while_missing_condition", "while { x = 1; }"));

    suite.add_test(TestCase::should_succeed(
        "valid_for",
        "for (let i = 0; i < 10; i = i + 1) { print i; }",
    ));
    suite.add_test(TestCase::should_succeed("for_empty_clauses", "for (;;) { exit; }"));
    suite.add_test(TestCase::should_fail_with_message(
        "for_missing_semicolon",
        "for (let i = 0 i < 10; i++) { }",
        "Expected ';' after variable declaration.",
    ));

    suite.add_test(TestCase::should_succeed(
        "foreach_with_index",
        "foreach (let item; things; let i) { print item; }",
    ));
    suite.add_test(TestCase::should_succeed(
        "foreach_without_index",
        "foreach (let item; things;) { print item; }",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "foreach_missing_let",
        "foreach (item; things;) { }",
        "Expected variable initializer (for iterator)",
    ));

    suite.add_test(TestCase::should_succeed("exit_statement", "exit;"));
    suite.add_test(TestCase::should_succeed("next_statement", "next;"));
    suite.add_test(TestCase::should_fail_with_message(
        "exit_missing_semicolon",
        "exit",
        "Expected ';' after statement.",
    ));

    suite.add_test(TestCase::should_succeed("bare_return", "return;"));
    suite.add_test(TestCase::should_succeed("return_value", "return 1 + 2;"));

    suite
}

fn create_literal_tests() -> TestSuite {
    let mut suite = TestSuite::new("Literals");

    suite.add_test(TestCase::should_succeed("integer_literal", "42;"));
    suite.add_test(TestCase::should_succeed("fractional_literal", "3.14;"));
    suite.add_test(TestCase::should_succeed("string_literal", "\"hello\";"));
    suite.add_test(TestCase::should_succeed("booleans_and_nil", "true; false; nil;"));
    suite.add_test(TestCase::should_succeed(
        "string_with_backslash_n",
        "\"line one\\nline two\";",
    ));

    suite.add_test(TestCase::should_fail("double_dot_number", "3.14.159;"));
    suite.add_test(TestCase::should_fail("trailing_dot", "42.;"));
    suite.add_test(TestCase::should_fail("leading_dot", ".42;"));

    suite.add_test(TestCase::should_fail_with_message(
        "unterminated_string",
        "\"hello",
        "Unterminated string",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "unexpected_character",
        "let x = 1 @ 2;",
        "Unexpected character",
    ));

    suite
}

fn create_set_literal_tests() -> TestSuite {
    let mut suite = TestSuite::new("Set Literals");

    suite.add_test(TestCase::should_succeed("empty_set", "let s = [];"));
    suite.add_test(TestCase::should_succeed("simple_set", "let s = [1, 2, 3];"));
    suite.add_test(TestCase::should_succeed(
        "nested_set",
        "let s = [[1, 2], [3], []];",
    ));
    suite.add_test(TestCase::should_succeed("mixed_set", "let s = [1, \"two\", nil];"));
    // A single trailing comma is tolerated; a double comma is not
    suite.add_test(TestCase::should_succeed("trailing_comma", "let s = [1, 2,];"));
    suite.add_test(TestCase::should_fail_with_message(
        "double_comma",
        "let s = [1,,2];",
        "Expected expression",
    ));

    suite.add_test(TestCase::should_succeed("index_chain", "s[0][1];"));
    suite.add_test(TestCase::should_fail_with_message(
        "index_missing_bracket",
        "s[0;",
        "Expected ']' after index.",
    ));

    suite
}

fn create_call_and_property_tests() -> TestSuite {
    let mut suite = TestSuite::new("Calls and Properties");

    suite.add_test(TestCase::should_succeed("simple_call", "foo();"));
    suite.add_test(TestCase::should_succeed("call_with_args", "foo(1, 2, 3);"));
    suite.add_test(TestCase::should_succeed("chained_calls", "f()();"));
    suite.add_test(TestCase::should_succeed("property_access", "obj.field;"));
    suite.add_test(TestCase::should_succeed("method_call", "obj.method(1);"));
    suite.add_test(TestCase::should_succeed("index_then_call", "s[0].strip();"));
    suite.add_test(TestCase::should_succeed("super_call", "super.method();"));

    suite.add_test(TestCase::should_fail("call_missing_paren", "foo(1, 2;"));
    suite.add_test(TestCase::should_fail_with_message(
        "call_trailing_comma",
        "foo(1, 2,);",
        "Expected expression",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "property_missing_name",
        "obj.;",
        "Expected property name after '.'.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "bare_super",
        "super;",
        "Expected '.' after 'super'.",
    ));
    // Indexing binds to primaries only: a property result cannot be indexed
    suite.add_test(TestCase::should_fail_with_message(
        "index_after_property",
        "obj.field[0];",
        "Expected ';' after expression.",
    ));

    suite
}

fn create_assignment_tests() -> TestSuite {
    let mut suite = TestSuite::new("Assignments");

    suite.add_test(TestCase::should_succeed("simple_assignment", "x = 1;"));
    suite.add_test(TestCase::should_succeed("chained_assignment", "x = y = 2;"));
    suite.add_test(TestCase::should_succeed("property_assignment", "obj.field = 3;"));
    suite.add_test(TestCase::should_succeed("index_assignment", "s[0] = 4;"));
    suite.add_test(TestCase::should_succeed("nested_index_assignment", "s[0][1] = 5;"));
    suite.add_test(TestCase::should_succeed("set_literal_value", "x = [1, 2];"));

    suite.add_test(TestCase::should_fail_with_message(
        "assign_to_literal",
        "1 = x;",
        "Invalid assignment target.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "assign_to_call",
        "foo() = 1;",
        "Invalid assignment target.",
    ));
    suite.add_test(TestCase::should_fail_with_message(
        "assign_to_computed_index",
        "foo()[0] = 1;",
        "Invalid assignment target.",
    ));
    suite.add_test(TestCase::should_fail("missing_value", "x = ;"));

    suite
}

fn create_positive_program_tests() -> TestSuite {
    let mut suite = TestSuite::new("Positive Programs");

    suite.add_test(TestCase::should_succeed(
        "closure_program",
        "def makeCounter() {\n\
         \x20 let n = 0;\n\
         \x20 def inc() { n = n + 1; return n; }\n\
         \x20 return inc;\n\
         }\n\
         let c = makeCounter();\n\
         c();",
    ));

    suite.add_test(TestCase::should_succeed(
        "class_program",
        "class A { def init(n) { this.n = n; } }\n\
         class B < A { def get() { return this.n; } }\n\
         let b = B(5);\n\
         println(b.get());",
    ));

    suite.add_test(TestCase::should_succeed(
        "loop_program",
        "let s = [3, 1, 2];\n\
         s.sort();\n\
         foreach (let v; s; let i) { println(i, v); }",
    ));

    suite.add_test(TestCase::should_succeed(
        "keywords_case_insensitive",
        "LET x = 1; WHILE (x < 3) { x = x + 1; } PRINT x;",
    ));

    suite
}

// ============================================================================
// Main Test Function
// ============================================================================

#[test]
fn comprehensive_parser_tests() {
    let mut all_passed = true;

    let suites = vec![
        create_malformed_expression_tests(),
        create_edge_case_tests(),
        create_operator_tests(),
        create_declaration_tests(),
        create_control_flow_tests(),
        create_literal_tests(),
        create_set_literal_tests(),
        create_call_and_property_tests(),
        create_assignment_tests(),
        create_positive_program_tests(),
    ];

    for suite in suites {
        let results = suite.run();
        if !results.is_all_passed() {
            all_passed = false;
        }
    }

    assert!(all_passed, "some parser test cases failed; see output above");
}
