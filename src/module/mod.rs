//! Module system: path resolution, selective import, cycle detection
//! (spec.md §4.3).

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::ast::Program;
use crate::error::ModuleError;
use crate::value::Value;

/// Read-only, path-keyed tree backing the embedded origin kind (spec.md §6
/// "Embedded FS capability").
pub trait EmbeddedFs: Send + Sync {
    fn read(&self, path: &str) -> Option<String>;
}

/// The lexer/parser is an external collaborator (spec.md §1); the module
/// system only needs the capability to turn module source text into a
/// `Program` the evaluator can walk.
pub trait ScriptParser: Send + Sync {
    fn parse(&self, source: &str) -> Result<Program, String>;
}

/// The backing store and base directory a relative import resolves against
/// (spec.md GLOSSARY "Origin").
#[derive(Clone)]
pub enum Origin {
    Embedded {
        fs: Arc<dyn EmbeddedFs>,
        base_dir: String,
    },
    Filesystem {
        base_dir: PathBuf,
    },
}

impl Origin {
    fn kind_tag(&self) -> &'static str {
        match self {
            Origin::Embedded { .. } => "embed",
            Origin::Filesystem { .. } => "fs",
        }
    }
}

impl std::fmt::Debug for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Origin::Embedded { base_dir, .. } => {
                f.debug_struct("Origin::Embedded").field("base_dir", base_dir).finish()
            }
            Origin::Filesystem { base_dir } => {
                f.debug_struct("Origin::Filesystem").field("base_dir", base_dir).finish()
            }
        }
    }
}

/// Joins a relative module path (`./foo`, `../bar/baz`) against a base
/// directory using plain string/path segment logic — no filesystem access,
/// so it works identically for the embedded and real-filesystem origins.
fn join_relative(base_dir: &str, relative: &str) -> String {
    let mut segments: Vec<&str> = base_dir.split('/').filter(|s| !s.is_empty()).collect();
    for part in relative.split('/') {
        match part {
            "." | "" => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    format!("/{}", segments.join("/"))
}

fn parent_dir(path: &str) -> String {
    match path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
        None => String::new(),
    }
}

/// Import path resolution (spec.md §4.3 steps 1-4).
pub fn resolve_path(
    current: Option<&Origin>,
    path: &str,
) -> Result<(Origin, String), ModuleError> {
    if path.starts_with("./") || path.starts_with("../") {
        return match current {
            Some(Origin::Embedded { fs, base_dir }) => {
                let resolved = join_relative(base_dir, path);
                Ok((
                    Origin::Embedded {
                        fs: Arc::clone(fs),
                        base_dir: parent_dir(&resolved),
                    },
                    resolved,
                ))
            }
            Some(Origin::Filesystem { base_dir }) => {
                let resolved = base_dir.join(path);
                let resolved = normalize(&resolved);
                let base_dir = resolved.parent().map(Path::to_path_buf).unwrap_or_default();
                Ok((
                    Origin::Filesystem { base_dir },
                    resolved.to_string_lossy().into_owned(),
                ))
            }
            // Step 3: no current origin set — resolve against the process cwd.
            None => {
                let cwd = std::env::current_dir().unwrap_or_default();
                let resolved = normalize(&cwd.join(path));
                let base_dir = resolved.parent().map(Path::to_path_buf).unwrap_or_default();
                Ok((
                    Origin::Filesystem { base_dir },
                    resolved.to_string_lossy().into_owned(),
                ))
            }
        };
    }

    if let Some(stripped) = path.strip_prefix('/') {
        let _ = stripped;
        // Step 2: absolute paths force filesystem origin.
        let resolved = normalize(Path::new(path));
        let base_dir = resolved.parent().map(Path::to_path_buf).unwrap_or_default();
        return Ok((
            Origin::Filesystem { base_dir },
            resolved.to_string_lossy().into_owned(),
        ));
    }

    // Step 4: bare module names are rejected.
    Err(ModuleError::BareModuleName(path.to_string()))
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        use std::path::Component;
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn read_source(origin: &Origin, resolved_path: &str) -> Result<String, ModuleError> {
    match origin {
        Origin::Embedded { fs, .. } => fs
            .read(resolved_path)
            .ok_or_else(|| ModuleError::EmbedFsMissing(resolved_path.to_string())),
        Origin::Filesystem { .. } => std::fs::read_to_string(resolved_path)
            .map_err(|_| ModuleError::NotFound(resolved_path.to_string())),
    }
}

fn strip_shebang(source: &str) -> &str {
    if let Some(rest) = source.strip_prefix("#!") {
        if let Some(newline) = rest.find('\n') {
            return &rest[newline + 1..];
        }
        return "";
    }
    source
}

/// Caches completed module exports and tracks in-progress imports to detect
/// cycles (spec.md §4.3 steps 1-9).
pub struct ModuleLoader {
    parser: Arc<dyn ScriptParser>,
    in_progress: RwLock<HashSet<String>>,
    completed: RwLock<HashMap<String, HashMap<String, Value>>>,
}

/// What the caller must do to actually evaluate a freshly-parsed module body
/// against a fresh child-of-global environment and collect its exports. The
/// module loader owns resolution/caching/cycle-detection; the evaluator
/// (which alone knows how to walk a `Program`) supplies this callback,
/// keeping `crate::module` free of a dependency on `crate::eval`.
pub type EvalModuleBody<'a> = dyn FnMut(&Program, Origin) -> Result<HashMap<String, Value>, ModuleError>
    + 'a;

impl ModuleLoader {
    pub fn new(parser: Arc<dyn ScriptParser>) -> Self {
        Self {
            parser,
            in_progress: RwLock::new(HashSet::new()),
            completed: RwLock::new(HashMap::new()),
        }
    }

    /// Runs steps 1-9 of the import procedure and returns the resolved
    /// `{name -> value}` pairs the importer should bind.
    pub fn import(
        &self,
        current_origin: Option<&Origin>,
        path: &str,
        symbols: &[String],
        eval_module_body: &mut EvalModuleBody<'_>,
    ) -> Result<HashMap<String, Value>, ModuleError> {
        let (origin, resolved_path) = resolve_path(current_origin, path)?;
        let key = format!("{}:{}", origin.kind_tag(), resolved_path);

        if self
            .in_progress
            .read()
            .expect("module in-progress set lock poisoned")
            .contains(&key)
        {
            return Err(ModuleError::CircularImport(key));
        }

        let exports = if let Some(exports) = self
            .completed
            .read()
            .expect("module exports cache lock poisoned")
            .get(&key)
        {
            exports.clone()
        } else {
            self.in_progress
                .write()
                .expect("module in-progress set lock poisoned")
                .insert(key.clone());

            let result = self.load_and_evaluate(&origin, &resolved_path, &key, eval_module_body);

            // Restoration must occur on the error path too (spec.md §4.3
            // step 8 / §7 "Module errors restore saved ... on the way out").
            self.in_progress
                .write()
                .expect("module in-progress set lock poisoned")
                .remove(&key);

            let exports = result?;
            self.completed
                .write()
                .expect("module exports cache lock poisoned")
                .insert(key.clone(), exports.clone());
            exports
        };

        let mut bindings = HashMap::new();
        for symbol in symbols {
            match exports.get(symbol) {
                Some(value) => {
                    bindings.insert(symbol.clone(), value.clone());
                }
                None => {
                    return Err(ModuleError::NoSuchExport {
                        module: path.to_string(),
                        export: symbol.clone(),
                    });
                }
            }
        }
        Ok(bindings)
    }

    fn load_and_evaluate(
        &self,
        origin: &Origin,
        resolved_path: &str,
        key: &str,
        eval_module_body: &mut EvalModuleBody<'_>,
    ) -> Result<HashMap<String, Value>, ModuleError> {
        let source = read_source(origin, resolved_path)?;
        let source = strip_shebang(&source);
        let program = self
            .parser
            .parse(source)
            .map_err(|message| ModuleError::ParseError {
                file: key.to_string(),
                message,
            })?;
        eval_module_body(&program, origin.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_resolves_against_current_base_dir() {
        let current = Origin::Filesystem {
            base_dir: PathBuf::from("/scripts/lib"),
        };
        let (origin, resolved) = resolve_path(Some(&current), "./helpers.gsh").unwrap();
        assert_eq!(resolved, "/scripts/lib/helpers.gsh");
        assert!(matches!(origin, Origin::Filesystem { .. }));
    }

    #[test]
    fn parent_relative_path_walks_up_a_directory() {
        let current = Origin::Filesystem {
            base_dir: PathBuf::from("/scripts/lib/nested"),
        };
        let (_, resolved) = resolve_path(Some(&current), "../a.gsh").unwrap();
        assert_eq!(resolved, "/scripts/lib/a.gsh");
    }

    #[test]
    fn absolute_path_forces_filesystem_origin_regardless_of_current() {
        struct EmptyFs;
        impl EmbeddedFs for EmptyFs {
            fn read(&self, _path: &str) -> Option<String> {
                None
            }
        }
        let current = Origin::Embedded {
            fs: Arc::new(EmptyFs),
            base_dir: "/".to_string(),
        };
        let (origin, resolved) = resolve_path(Some(&current), "/abs/path.gsh").unwrap();
        assert_eq!(resolved, "/abs/path.gsh");
        assert!(matches!(origin, Origin::Filesystem { .. }));
    }

    #[test]
    fn bare_module_names_are_rejected() {
        let err = resolve_path(None, "somelib").unwrap_err();
        assert_eq!(err, ModuleError::BareModuleName("somelib".to_string()));
    }

    #[test]
    fn shebang_is_stripped_from_the_first_line_only() {
        let source = "#!/usr/bin/env gsh\nx = 1\n";
        assert_eq!(strip_shebang(source), "x = 1\n");
        assert_eq!(strip_shebang("x = 1\n"), "x = 1\n");
    }

    struct StaticFs(HashMap<&'static str, &'static str>);
    impl EmbeddedFs for StaticFs {
        fn read(&self, path: &str) -> Option<String> {
            self.0.get(path).map(|s| s.to_string())
        }
    }

    struct NoopParser;
    impl ScriptParser for NoopParser {
        fn parse(&self, _source: &str) -> Result<Program, String> {
            Ok(Program { statements: vec![] })
        }
    }

    #[test]
    fn cyclic_import_is_detected() {
        let loader = ModuleLoader::new(Arc::new(NoopParser));
        let fs: HashMap<&'static str, &'static str> =
            [("/a.gsh", "import \"./b.gsh\""), ("/b.gsh", "import \"./a.gsh\"")].into();
        let origin = Origin::Embedded {
            fs: Arc::new(StaticFs(fs)),
            base_dir: "/".to_string(),
        };

        let key_a = "embed:/a.gsh".to_string();
        loader
            .in_progress
            .write()
            .unwrap()
            .insert(key_a.clone());

        let mut body = |_: &Program, _: Origin| Ok(HashMap::new());
        let err = loader
            .import(Some(&origin), "/a.gsh", &[], &mut body)
            .unwrap_err();
        assert_eq!(err, ModuleError::CircularImport(key_a));
    }

    #[test]
    fn completed_imports_are_served_from_cache() {
        let loader = ModuleLoader::new(Arc::new(NoopParser));
        let origin = Origin::Filesystem {
            base_dir: PathBuf::from("/"),
        };
        let mut calls = 0;
        let mut body = |_: &Program, _: Origin| {
            calls += 1;
            let mut exports = HashMap::new();
            exports.insert("x".to_string(), Value::Number(1.0));
            Ok(exports)
        };
        loader
            .import(Some(&origin), "/m.gsh", &["x".to_string()], &mut body)
            .unwrap();
        loader
            .import(Some(&origin), "/m.gsh", &["x".to_string()], &mut body)
            .unwrap();
        assert_eq!(calls, 1);
    }

    #[test]
    fn unknown_export_fails() {
        let loader = ModuleLoader::new(Arc::new(NoopParser));
        let origin = Origin::Filesystem {
            base_dir: PathBuf::from("/"),
        };
        let mut body = |_: &Program, _: Origin| Ok(HashMap::new());
        let err = loader
            .import(Some(&origin), "/m.gsh", &["missing".to_string()], &mut body)
            .unwrap_err();
        assert_eq!(
            err,
            ModuleError::NoSuchExport {
                module: "/m.gsh".to_string(),
                export: "missing".to_string()
            }
        );
    }
}
