//! End-to-end coverage for the concrete scenarios and the concurrent
//! scope-isolation property (spec.md §8). There is no real parser in this
//! crate, so every program here is a hand-built `ast::Program` — the same
//! style the unit tests in `src/module/mod.rs` already use.

use std::collections::HashMap;
use std::sync::Arc;

use agent_script::ast::{BinaryOp, Block, Expr, Program, Stmt};
use agent_script::error::{ModuleError, RuntimeError, ToolError};
use agent_script::eval::{EvalContext, eval_program};
use agent_script::module::{EmbeddedFs, Origin, ScriptParser};
use agent_script::runtime::{Runtime, RuntimeConfig};
use agent_script::tools::default_tools;
use agent_script::value::{SdkModelRef, Tier, Value};
use agent_script::Environment;

struct NoopParser;
impl ScriptParser for NoopParser {
    fn parse(&self, _source: &str) -> Result<Program, String> {
        Ok(Program { statements: vec![] })
    }
}

fn new_runtime() -> Arc<Runtime> {
    let config = RuntimeConfig::default();
    Arc::new(Runtime::new(Arc::new(NoopParser), default_tools(&config)))
}

// Scenario 1 (spec.md §8): `x = 2 + 3 * 4` evaluates to 14, not 20 —
// multiplication binds tighter than addition even though the tree is built
// by hand rather than by a precedence-climbing parser.
#[tokio::test]
async fn arithmetic_respects_operator_precedence() {
    let rt = new_runtime();
    let ctx = EvalContext::default();
    let program = Program {
        statements: vec![Stmt::Assign {
            target: Expr::Identifier("x".to_string()),
            value: Expr::binary(
                BinaryOp::Add,
                Expr::Number(2.0),
                Expr::binary(BinaryOp::Mul, Expr::Number(3.0), Expr::Number(4.0)),
            ),
        }],
    };

    let result = eval_program(&rt, &ctx, &program, &rt.global_env).await.unwrap();
    assert_eq!(result, Value::Number(14.0));
    assert_eq!(rt.global_env.get("x"), Some(Value::Number(14.0)));
}

// Scenario 2 (spec.md §8): object literals preserve source order, and
// `Object.keys` reports that order rather than any hash-based ordering.
#[tokio::test]
async fn object_keys_preserves_literal_order() {
    let rt = new_runtime();
    let ctx = EvalContext::default();
    let program = Program {
        statements: vec![
            Stmt::Assign {
                target: Expr::Identifier("o".to_string()),
                value: Expr::Object(vec![
                    ("b".to_string(), Expr::Number(1.0)),
                    ("a".to_string(), Expr::Number(2.0)),
                ]),
            },
            Stmt::Assign {
                target: Expr::Identifier("keys".to_string()),
                value: Expr::call(
                    Expr::member(Expr::Identifier("Object".to_string()), "keys"),
                    vec![Expr::Identifier("o".to_string())],
                ),
            },
        ],
    };

    eval_program(&rt, &ctx, &program, &rt.global_env).await.unwrap();
    let Some(Value::Array(keys)) = rt.global_env.get("keys") else {
        panic!("expected keys to be bound to an array");
    };
    let keys: Vec<String> = keys.read().unwrap().iter().map(Value::string).collect();
    assert_eq!(keys, vec!["b".to_string(), "a".to_string()]);
}

// Scenario 3 (spec.md §8): `gsh.models.TIER` is a late-bound reference, not
// a snapshot taken at agent-declaration time. An agent declared while the
// tier pointed at one model still resolves to whichever model the tier
// points at when it is next read.
#[tokio::test]
async fn agent_model_resolves_to_the_currently_bound_tier() {
    let rt = new_runtime();
    let ctx = EvalContext::default();
    let program = Program {
        statements: vec![
            Stmt::ModelDecl {
                name: "m1".to_string(),
                fields: vec![
                    ("provider".to_string(), Expr::Str("openai".to_string())),
                    ("apiKey".to_string(), Expr::Str("k1".to_string())),
                    ("model".to_string(), Expr::Str("m1-id".to_string())),
                ],
            },
            Stmt::ModelDecl {
                name: "m2".to_string(),
                fields: vec![
                    ("provider".to_string(), Expr::Str("openai".to_string())),
                    ("apiKey".to_string(), Expr::Str("k2".to_string())),
                    ("model".to_string(), Expr::Str("m2-id".to_string())),
                ],
            },
            Stmt::Assign {
                target: Expr::member(Expr::member(Expr::Identifier("gsh".to_string()), "models"), "workhorse"),
                value: Expr::Identifier("m1".to_string()),
            },
            Stmt::AgentDecl {
                name: "reviewer".to_string(),
                fields: vec![
                    (
                        "model".to_string(),
                        Expr::member(Expr::member(Expr::Identifier("gsh".to_string()), "models"), "workhorse"),
                    ),
                    ("systemPrompt".to_string(), Expr::Str("you review code".to_string())),
                ],
            },
            // Rebind the tier *after* the agent is declared.
            Stmt::Assign {
                target: Expr::member(Expr::member(Expr::Identifier("gsh".to_string()), "models"), "workhorse"),
                value: Expr::Identifier("m2".to_string()),
            },
        ],
    };

    eval_program(&rt, &ctx, &program, &rt.global_env).await.unwrap();

    let Some(Value::Agent(agent)) = rt.global_env.get("reviewer") else {
        panic!("expected reviewer to be bound to an agent");
    };
    assert_eq!(agent.model(), Value::SdkModelRef(SdkModelRef { tier: Tier::Workhorse }));

    let Some(Value::Model(m2)) = rt.global_env.get("m2") else {
        panic!("expected m2 to be bound to a model");
    };
    let bound = rt.sdk_models.get(Tier::Workhorse).expect("workhorse tier bound");
    assert!(Arc::ptr_eq(&bound, &m2), "workhorse tier should resolve to the model bound last");
}

// Scenario 4 (spec.md §8): `a.gsh` importing `b.gsh` which imports `a.gsh`
// back is rejected rather than deadlocking or silently short-circuiting.
#[tokio::test]
async fn circular_import_is_rejected() {
    struct StaticFs(HashMap<&'static str, &'static str>);
    impl EmbeddedFs for StaticFs {
        fn read(&self, path: &str) -> Option<String> {
            self.0.get(path).map(|s| s.to_string())
        }
    }
    struct TaggedParser;
    impl ScriptParser for TaggedParser {
        fn parse(&self, source: &str) -> Result<Program, String> {
            let other = if source == "a" { "./b.gsh" } else { "./a.gsh" };
            Ok(Program {
                statements: vec![Stmt::Import { symbols: vec![], path: other.to_string() }],
            })
        }
    }

    let config = RuntimeConfig::default();
    let rt = Arc::new(Runtime::new(Arc::new(TaggedParser), default_tools(&config)));
    let fs: HashMap<&'static str, &'static str> =
        [("/a.gsh", "a"), ("/b.gsh", "b")].into_iter().collect();
    let origin = Origin::Embedded { fs: Arc::new(StaticFs(fs)), base_dir: "/".to_string() };
    let ctx = EvalContext { origin: Some(origin), exported: None };
    let program = Program {
        statements: vec![Stmt::Import { symbols: vec![], path: "./a.gsh".to_string() }],
    };

    let err = eval_program(&rt, &ctx, &program, &rt.global_env).await.unwrap_err();
    assert!(
        err.to_string().contains("circular import"),
        "expected a circular import error, got: {err}"
    );
    assert!(err.to_string().contains("/a.gsh"), "expected the cycle key in the message, got: {err}");
}

// Scenario 5 (spec.md §8): C exports `cValue`; B imports it and re-exports
// a derived `bValue`; A imports only `bValue`. A never sees `cValue` in its
// own scope even though evaluating B required importing it.
#[tokio::test]
async fn recursive_import_only_binds_the_symbols_actually_imported() {
    struct StaticFs(HashMap<&'static str, &'static str>);
    impl EmbeddedFs for StaticFs {
        fn read(&self, path: &str) -> Option<String> {
            self.0.get(path).map(|s| s.to_string())
        }
    }
    struct TaggedParser;
    impl ScriptParser for TaggedParser {
        fn parse(&self, source: &str) -> Result<Program, String> {
            match source {
                "c" => Ok(Program {
                    statements: vec![Stmt::Export(Box::new(Stmt::Assign {
                        target: Expr::Identifier("cValue".to_string()),
                        value: Expr::Number(100.0),
                    }))],
                }),
                "b" => Ok(Program {
                    statements: vec![
                        Stmt::Import { symbols: vec!["cValue".to_string()], path: "./c.gsh".to_string() },
                        Stmt::Export(Box::new(Stmt::Assign {
                            target: Expr::Identifier("bValue".to_string()),
                            value: Expr::binary(BinaryOp::Add, Expr::Identifier("cValue".to_string()), Expr::Number(50.0)),
                        })),
                    ],
                }),
                other => panic!("unexpected module source: {other}"),
            }
        }
    }

    let config = RuntimeConfig::default();
    let rt = Arc::new(Runtime::new(Arc::new(TaggedParser), default_tools(&config)));
    let fs: HashMap<&'static str, &'static str> =
        [("/b.gsh", "b"), ("/c.gsh", "c")].into_iter().collect();
    let origin = Origin::Embedded { fs: Arc::new(StaticFs(fs)), base_dir: "/".to_string() };
    let ctx = EvalContext { origin: Some(origin), exported: None };
    let program = Program {
        statements: vec![Stmt::Import { symbols: vec!["bValue".to_string()], path: "./b.gsh".to_string() }],
    };

    let a_env = Environment::root();
    eval_program(&rt, &ctx, &program, &a_env).await.unwrap();

    assert_eq!(a_env.get("bValue"), Some(Value::Number(150.0)));
    assert_eq!(a_env.get("cValue"), None, "A imported only bValue, cValue must not leak into its scope");
}

// Scenario 6 (spec.md §8): `edit_file` surfaces its exact-occurrence-count
// message verbatim through the ordinary `gsh.tools.edit_file(...)` call
// path, not just from the tool's own unit test.
#[tokio::test]
async fn edit_file_reports_the_exact_occurrence_count_through_the_call_path() {
    let rt = new_runtime();
    let ctx = EvalContext::default();

    let dir = std::env::temp_dir().join(format!("spec_scenarios_edit_file_{}", std::process::id()));
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let path = dir.join("dup.txt");
    tokio::fs::write(&path, "x\nx\n").await.unwrap();

    let call = Expr::call(
        Expr::member(Expr::member(Expr::Identifier("gsh".to_string()), "tools"), "edit_file"),
        vec![Expr::Object(vec![
            ("file_path".to_string(), Expr::Str(path.to_str().unwrap().to_string())),
            ("find".to_string(), Expr::Str("x".to_string())),
            ("replace".to_string(), Expr::Str("y".to_string())),
        ])],
    );
    let program = Program { statements: vec![Stmt::Expr(call)] };

    let err = eval_program(&rt, &ctx, &program, &rt.global_env).await.unwrap_err();
    assert_eq!(
        err,
        RuntimeError::Tool(ToolError::NotExactlyOnce(
            "find string appears 2 times in file (must appear exactly once)".to_string()
        ))
    );

    tokio::fs::remove_dir_all(&dir).await.ok();
}

// Testable property (spec.md §8): concurrent `EmitEvent` calls get their own
// scope. A handler registered once via `gsh.use` must not let one caller's
// context leak into another's, even when many calls race on separate tasks.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_emits_do_not_cross_contaminate_handler_scope() {
    let rt = new_runtime();
    let ctx = EvalContext::default();

    // `gsh.use("tag", (ctx, next) => ctx)` — an identity handler whose body
    // reads only its own call-scoped `ctx` parameter.
    let handler = Expr::ToolLiteral {
        params: vec!["ctx".to_string(), "next".to_string()],
        body: Arc::new(Block {
            statements: vec![Stmt::Return(Some(Expr::Identifier("ctx".to_string())))],
        }),
    };
    let registration = Expr::call(
        Expr::member(Expr::Identifier("gsh".to_string()), "use"),
        vec![Expr::Str("tag".to_string()), handler],
    );
    eval_program(&rt, &ctx, &Program { statements: vec![Stmt::Expr(registration)] }, &rt.global_env)
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..32 {
        let rt = rt.clone();
        tasks.push(tokio::spawn(async move {
            let result = rt.events.emit("tag", Value::Number(i as f64)).await.unwrap();
            (i, result)
        }));
    }

    for task in tasks {
        let (i, result) = task.await.unwrap();
        assert_eq!(result, Value::Number(i as f64), "caller {i} observed a different caller's context");
    }
}

#[tokio::test]
async fn unknown_bare_module_name_is_rejected_before_touching_any_filesystem() {
    let rt = new_runtime();
    let ctx = EvalContext::default();
    let program = Program {
        statements: vec![Stmt::Import { symbols: vec![], path: "somelib".to_string() }],
    };
    let err = eval_program(&rt, &ctx, &program, &rt.global_env).await.unwrap_err();
    assert_eq!(err, RuntimeError::Module(ModuleError::BareModuleName("somelib".to_string())));
}
