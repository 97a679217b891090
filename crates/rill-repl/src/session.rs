//! REPL session: the accumulated environments and the per-declaration
//! pipeline (parse, infer, lower, normalize, evaluate, print).
//!
//! The session owns the type environment, the datatype registry, the
//! global value bindings, and the in-memory backend tables. Each chunk of
//! input runs declaration by declaration: an error aborts the current
//! declaration only, never the session.

use std::path::PathBuf;
use std::rc::Rc;

use rill_common::diag::Diagnostic;
use rill_common::span::LineIndex;
use rill_core::{lower_decl, normalize_decl, CoreDecl, FreshGen, NormalizeOptions};
use rill_eval::{print_value, Env, Evaluator, MemoryBackend, Packet, Value};
use rill_parser::ast::{Decl, DeclKind, ExprKind};
use rill_typeck::{check_decl, Scheme, TypeEnv, TypePrinter, TypeRegistry, TypeckOptions};
use rustc_hash::{FxHashMap, FxHashSet};

/// Session configuration, filled from the CLI flags.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Name used in diagnostics for interactive input.
    pub source_name: String,
    /// Base directory for `use`.
    pub directory: PathBuf,
    /// Directory for script files (defaults to `directory`).
    pub script_directory: PathBuf,
    /// Bound on nested `use` calls.
    pub max_use_depth: u32,
    pub match_coverage_enabled: bool,
    pub inline_pass_count: u32,
    pub hybrid: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            source_name: "stdIn".to_string(),
            directory: PathBuf::from("."),
            script_directory: PathBuf::from("."),
            max_use_depth: 10,
            match_coverage_enabled: true,
            inline_pass_count: 10,
            hybrid: false,
        }
    }
}

/// A live session.
pub struct Session {
    pub config: SessionConfig,
    tenv: TypeEnv,
    registry: TypeRegistry,
    globals: FxHashMap<String, Value>,
    backend: MemoryBackend,
    external_tables: FxHashSet<String>,
    use_depth: u32,
}

impl Session {
    pub fn new(config: SessionConfig) -> Session {
        let (tenv, registry) = rill_typeck::initial_env();
        Session {
            config,
            tenv,
            registry,
            globals: rill_eval::builtins::install(),
            backend: MemoryBackend::new(),
            external_tables: FxHashSet::default(),
            use_depth: 0,
        }
    }

    /// Register an external backend table visible to push-down. The rows
    /// become a bag-typed binding in both environments.
    pub fn register_table(
        &mut self,
        name: &str,
        row_ty: rill_typeck::Type,
        rows: Vec<Value>,
    ) {
        self.tenv.insert(
            name.to_string(),
            rill_typeck::Binding::Val(Scheme::mono(rill_typeck::Type::bag(row_ty))),
        );
        self.globals
            .insert(name.to_string(), Value::bag(rows.clone()));
        self.backend.add_table(name, rows);
        self.external_tables.insert(name.to_string());
    }

    /// Evaluate a chunk of input (one or more `;`-terminated
    /// declarations), returning the output lines.
    pub fn eval_chunk(&mut self, source: &str) -> Vec<String> {
        let mut out = Vec::new();
        let index = LineIndex::new(source);
        let parse = rill_parser::parse(source);
        for diag in &parse.errors {
            out.push(diag.render(&self.config.source_name, &index));
        }
        for decl in &parse.decls {
            self.eval_decl(decl, &index, &mut out);
        }
        out
    }

    fn eval_decl(&mut self, decl: &Decl, index: &LineIndex, out: &mut Vec<String>) {
        // `use "<path>"` runs a script against the current session.
        if let Some(path) = use_target(decl) {
            self.run_use(&path, out);
            return;
        }

        let ty_opts = TypeckOptions {
            match_coverage_enabled: self.config.match_coverage_enabled,
        };
        let checked = check_decl(decl, &mut self.tenv, &mut self.registry, &ty_opts);
        for warning in &checked.warnings {
            out.push(
                warning
                    .to_diagnostic(&self.registry, decl.span)
                    .render(&self.config.source_name, index),
            );
        }
        if !checked.ok() {
            for error in &checked.errors {
                out.push(
                    error
                        .to_diagnostic(&self.registry, decl.span)
                        .render(&self.config.source_name, index),
                );
            }
            return;
        }

        let mut fresh = FreshGen::new();
        let lowered = lower_decl(decl, &checked, &self.tenv, &self.registry, &mut fresh);
        let norm_opts = NormalizeOptions {
            inline_pass_count: self.config.inline_pass_count,
            hybrid: self.config.hybrid,
            external_tables: self.external_tables.clone(),
        };
        let normalized =
            match normalize_decl(lowered, &norm_opts, &self.registry, &mut fresh) {
                Ok(d) => d,
                Err(diag) => {
                    out.push(diag.render(&self.config.source_name, index));
                    return;
                }
            };

        let env = Env::root(Rc::new(self.globals.clone()));
        let mut evaluator = Evaluator::with_backend(&self.registry, &self.backend);
        match evaluator.run_decl(&env, &normalized) {
            Ok(binds) => {
                let schemes: FxHashMap<&str, &Scheme> = checked
                    .bound_values
                    .iter()
                    .map(|(n, s)| (n.as_str(), s))
                    .collect();
                for (name, value) in &binds {
                    out.push(self.binding_line(name, value, schemes.get(name.as_str())));
                }
                for (name, value) in binds {
                    self.globals.insert(name, value);
                }
                self.echo_static(decl, &normalized, out);
            }
            Err(packet) => out.push(render_uncaught(&packet)),
        }
    }

    /// `val <name> = <value> : <type>`.
    fn binding_line(&self, name: &str, value: &Value, scheme: Option<&&Scheme>) -> String {
        let value_text = print_value(value);
        match scheme {
            Some(scheme) => {
                let ty_text = TypePrinter::new(&self.registry).print_scheme(scheme);
                format!("val {name} = {value_text} : {ty_text}")
            }
            None => format!("val {name} = {value_text}"),
        }
    }

    /// Echo lines for declarations that bind no values.
    fn echo_static(&self, decl: &Decl, normalized: &CoreDecl, out: &mut Vec<String>) {
        match (&decl.kind, normalized) {
            (DeclKind::Datatype(binds), _) => {
                for bind in binds {
                    if let Some(id) = self.registry.lookup(&bind.name) {
                        let def = self.registry.get(id);
                        let ctors = def
                            .ctors
                            .iter()
                            .map(|c| c.name.clone())
                            .collect::<Vec<_>>()
                            .join(" | ");
                        out.push(format!("datatype {} = {ctors}", bind.name));
                    }
                }
            }
            (DeclKind::TypeAlias { name, .. }, _) => out.push(format!("type {name}")),
            (DeclKind::Over(name), _) => out.push(format!("over {name}")),
            (DeclKind::Signature { name, .. }, _) => {
                out.push(format!("signature {name}"))
            }
            (DeclKind::Exception { name, .. }, _) => {
                out.push(format!("exception {name}"))
            }
            (DeclKind::Val { inst: true, .. }, CoreDecl::Instance { name, .. }) => {
                out.push(format!("val inst {name} = fn"))
            }
            _ => {}
        }
    }

    /// Run a script through `use`, bounded by the configured depth.
    fn run_use(&mut self, path: &str, out: &mut Vec<String>) {
        if self.use_depth >= self.config.max_use_depth {
            out.push(format!(
                "uncaught exception Error \"maximum use depth exceeded loading {path}\""
            ));
            return;
        }
        let full = self.config.script_directory.join(path);
        let text = match std::fs::read_to_string(&full) {
            Ok(text) => text,
            Err(e) => {
                out.push(format!(
                    "uncaught exception Error \"use failed: {}: {e}\"",
                    full.display()
                ));
                return;
            }
        };
        self.use_depth += 1;
        let lines = self.eval_chunk(&text);
        self.use_depth -= 1;
        out.extend(lines);
        out.push("val it = () : unit".to_string());
    }
}

/// Recognize a top-level `use "<path>"` declaration.
fn use_target(decl: &Decl) -> Option<String> {
    let DeclKind::Expr(e) = &decl.kind else {
        return None;
    };
    let ExprKind::App(f, arg) = &e.kind else {
        return None;
    };
    if !matches!(&f.kind, ExprKind::Ident(name) if name == "use") {
        return None;
    }
    match &arg.kind {
        ExprKind::Str(path) => Some(path.clone()),
        _ => None,
    }
}

fn render_uncaught(packet: &Packet) -> String {
    match &packet.payload {
        Some(payload) => format!(
            "uncaught exception {} {}",
            packet.name,
            print_value(payload)
        ),
        None => format!("uncaught exception {}", packet.name),
    }
}

/// Render a plain diagnostic line, for callers outside the session.
pub fn render_diag(diag: &Diagnostic, source_name: &str, source: &str) -> String {
    diag.render(source_name, &LineIndex::new(source))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(SessionConfig::default())
    }

    #[test]
    fn arithmetic_binds_it() {
        let mut s = session();
        assert_eq!(s.eval_chunk("1 + 2;"), vec!["val it = 3 : int"]);
    }

    #[test]
    fn factorial_scenario() {
        let mut s = session();
        let out = s.eval_chunk("fun fact n = if n = 0 then 1 else n * fact (n - 1); fact 5;");
        assert_eq!(
            out,
            vec![
                "val fact = fn : int -> int",
                "val it = 120 : int",
            ]
        );
    }

    #[test]
    fn pipeline_scenario() {
        let mut s = session();
        assert_eq!(
            s.eval_chunk("from i in [3, 1, 2] where i < 3 yield i * 10;"),
            vec!["val it = [10, 20] : int list"]
        );
    }

    #[test]
    fn group_scenario() {
        let mut s = session();
        assert_eq!(
            s.eval_chunk(
                "from e in [{a=2,b=3},{a=2,b=1},{a=1,b=1}] group e.a compute sb = sum of e.b;"
            ),
            vec!["val it = [{a = 1, sb = 1}, {a = 2, sb = 4}] : {a:int, sb:int} list"]
        );
    }

    #[test]
    fn datatype_scenario() {
        let mut s = session();
        let out = s.eval_chunk(
            "datatype 'a tree = Leaf of 'a | Node of 'a tree * 'a tree; Node (Leaf 1, Leaf 2);",
        );
        assert_eq!(
            out,
            vec![
                "datatype tree = Leaf | Node",
                "val it = Node (Leaf 1, Leaf 2) : int tree",
            ]
        );
    }

    #[test]
    fn extent_scenario() {
        let mut s = session();
        assert_eq!(
            s.eval_chunk("from b where b;"),
            vec!["val it = [true] : bool list"]
        );
    }

    #[test]
    fn nonexhaustive_fun_warns() {
        let mut s = session();
        let out = s.eval_chunk("fun f 1 = \"one\" | f 2 = \"two\";");
        assert!(
            out.iter().any(|l| l.contains("Warning") && l.contains("nonexhaustive")),
            "expected a NON-EXHAUSTIVE warning, got {out:?}"
        );
        assert!(out.iter().any(|l| l.starts_with("val f = fn")));
    }

    #[test]
    fn terminal_compute_scenario() {
        let mut s = session();
        assert_eq!(
            s.eval_chunk("from i in [1,2,3] compute sum over i;"),
            vec!["val it = 6 : int"]
        );
    }

    #[test]
    fn uncaught_div_reports_but_session_survives() {
        let mut s = session();
        let out = s.eval_chunk("10 div 0;");
        assert_eq!(out, vec!["uncaught exception Div"]);
        assert_eq!(s.eval_chunk("1 + 1;"), vec!["val it = 2 : int"]);
    }

    #[test]
    fn type_error_aborts_declaration_only() {
        let mut s = session();
        let out = s.eval_chunk("1 + true; 2 + 3;");
        assert!(out[0].contains("stdIn:"), "diagnostic line: {}", out[0]);
        assert_eq!(out[1], "val it = 5 : int");
    }

    #[test]
    fn bindings_accumulate_across_chunks() {
        let mut s = session();
        s.eval_chunk("val x = 21;");
        assert_eq!(s.eval_chunk("x * 2;"), vec!["val it = 42 : int"]);
    }

    #[test]
    fn polymorphic_binding_prints_scheme() {
        let mut s = session();
        assert_eq!(
            s.eval_chunk("fn x => x;"),
            vec!["val it = fn : 'a -> 'a"]
        );
    }

    #[test]
    fn backend_tables_answer_queries() {
        use rill_typeck::{Label, Type};
        let mut s = session();
        let row = |a: i64| {
            Value::record(vec![(Label::new("a"), Value::int(a))])
        };
        s.register_table(
            "emps",
            Type::record(vec![(Label::new("a"), Type::int())]),
            vec![row(1), row(2), row(3)],
        );
        let out = s.eval_chunk("from e in emps where e.a < 3 yield e.a;");
        assert_eq!(out, vec!["val it = [1, 2] : int bag"]);
    }
}
