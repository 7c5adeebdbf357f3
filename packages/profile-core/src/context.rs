//! The sandboxed control-definition evaluator (C4). A [`ProfileContext`]
//! walks parsed DSL statements top to bottom and exposes only the
//! capabilities named in the control-file grammar: `control`/`rule`,
//! `describe`, `title`, `only_if`, `attribute`, `skip_control`/
//! `skip_rule`, `require`. It never touches the filesystem, network, or
//! process environment directly — only through [`crate::require_loader::RequireLoader`].

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rand::Rng;
use serde_json::Value as Json;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::control::{full_id, Control, ControlBuilder, RuleRegistry, SourceLocation};
use crate::dsl::{self, Statement};
use crate::metadata::TagMap;
use crate::report::Diagnostic;
use crate::require_loader::RequireLoader;

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("{file}:{line}: {msg}")]
    Unit {
        file: PathBuf,
        line: u32,
        msg: String,
    },
}

#[derive(Clone, Debug)]
pub struct Attribute {
    pub name: String,
    pub value: Json,
    pub description: Option<String>,
    pub required: bool,
}

/// An `attribute` declaration's option hash, parsed from DSL text.
#[derive(Clone, Debug, Default)]
pub struct AttributeOptions {
    pub default: Option<Json>,
    pub description: Option<String>,
    pub required: bool,
}

pub struct ProfileContext {
    profile_id: String,
    registry: RuleRegistry,
    attributes: IndexMap<String, Attribute>,
    require_loader: RequireLoader,
    skip_flag: bool,
    current_group_title: Option<String>,
    diagnostics: Vec<EvaluationError>,
    inputs: IndexMap<String, Json>,
}

impl ProfileContext {
    pub fn new(profile_id: impl Into<String>, require_loader: RequireLoader) -> Self {
        Self {
            profile_id: profile_id.into(),
            registry: RuleRegistry::new(),
            attributes: IndexMap::new(),
            require_loader,
            skip_flag: false,
            current_group_title: None,
            diagnostics: Vec::new(),
            inputs: IndexMap::new(),
        }
    }

    /// Pre-seeds attribute values (e.g. from a caller-supplied inputs
    /// file), consulted by `attribute()` before falling back to its
    /// declared default.
    pub fn with_inputs(mut self, inputs: IndexMap<String, Json>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    pub fn attributes(&self) -> &IndexMap<String, Attribute> {
        &self.attributes
    }

    pub fn diagnostics(&self) -> &[EvaluationError] {
        &self.diagnostics
    }

    pub fn require_loader(&self) -> &RequireLoader {
        &self.require_loader
    }

    pub fn require_loader_mut(&mut self) -> &mut RequireLoader {
        &mut self.require_loader
    }

    /// Evaluates one control file's top-level statements, in source
    /// order. A failure evaluating one unit is recorded and skipped; the
    /// rest of the file continues (§"error handling" contract).
    #[instrument(skip(self, source), fields(file = %file.display()))]
    pub fn evaluate_control_file(&mut self, file: &Path, source: &str) {
        let statements = match dsl::parse_statements(source) {
            Ok(s) => s,
            Err(e) => {
                self.diagnostics.push(EvaluationError::Unit {
                    file: file.to_path_buf(),
                    line: 0,
                    msg: e.to_string(),
                });
                return;
            }
        };
        for stmt in statements {
            self.evaluate_top_level(file, &stmt);
        }
    }

    fn evaluate_top_level(&mut self, file: &Path, stmt: &Statement) {
        match stmt.name.as_str() {
            "control" | "rule" => self.evaluate_control(file, stmt),
            "describe" => self.evaluate_anonymous_describe(file, stmt),
            "title" => {
                if let Some(t) = dsl::parse_single_string_arg(&stmt.args_text) {
                    self.current_group_title = Some(t);
                }
            }
            "only_if" => {
                self.skip_flag = true;
                debug!("only_if sets sticky skip flag");
            }
            "attribute" | "input" => {
                self.evaluate_attribute(stmt);
            }
            "skip_control" | "skip_rule" => {
                if let Some(id) = dsl::parse_single_string_arg(&stmt.args_text) {
                    let full = full_id(&self.profile_id, &id);
                    if !self.registry.mark_skip(&full) {
                        self.diagnostics.push(EvaluationError::Unit {
                            file: file.to_path_buf(),
                            line: stmt.line,
                            msg: format!("skip_control referenced unknown id {id:?}"),
                        });
                    }
                }
            }
            "require" => {
                if let Some(path) = dsl::parse_single_string_arg(&stmt.args_text) {
                    if self.require_loader.load(&path).is_none() {
                        self.diagnostics.push(EvaluationError::Unit {
                            file: file.to_path_buf(),
                            line: stmt.line,
                            msg: format!("require referenced unknown module {path:?}"),
                        });
                    }
                }
            }
            other => {
                warn!(statement = other, "unrecognized top-level statement");
            }
        }
    }

    fn evaluate_control(&mut self, file: &Path, stmt: &Statement) {
        let Some(local_id) = dsl::parse_single_string_arg(&stmt.args_text) else {
            self.diagnostics.push(EvaluationError::Unit {
                file: file.to_path_buf(),
                line: stmt.line,
                msg: "control/rule requires a string id argument".to_string(),
            });
            return;
        };
        let body_src = stmt.block.clone().unwrap_or_default();
        let mut builder = ControlBuilder::default();
        if let Err(e) = self.evaluate_control_body(file, &body_src, &mut builder) {
            self.diagnostics.push(e);
            return;
        }
        let skip = self.skip_flag || builder.only_if_called;
        let control = Control {
            id: full_id(&self.profile_id, &local_id),
            title: builder.title,
            desc: builder.desc,
            impact: builder.impact.unwrap_or(0.5),
            refs: builder.refs,
            tags: builder.tags,
            checks: builder.checks,
            code: body_src,
            source_location: SourceLocation {
                file: file.to_path_buf(),
                line: stmt.line,
            },
            skip,
            group_title: self.current_group_title.clone(),
        };
        if skip {
            self.skip_flag = true;
        }
        self.registry.register(control);
    }

    fn evaluate_control_body(
        &mut self,
        file: &Path,
        body_src: &str,
        builder: &mut ControlBuilder,
    ) -> Result<(), EvaluationError> {
        let statements = dsl::parse_statements(body_src).map_err(|e| EvaluationError::Unit {
            file: file.to_path_buf(),
            line: 0,
            msg: e.to_string(),
        })?;
        for stmt in statements {
            match stmt.name.as_str() {
                "title" => {
                    if let Some(t) = dsl::parse_single_string_arg(&stmt.args_text) {
                        builder.title(t);
                    }
                }
                "desc" => {
                    if let Some(d) = dsl::parse_single_string_arg(&stmt.args_text) {
                        builder.desc(d);
                    }
                }
                "impact" => {
                    let n: f64 = stmt.args_text.trim().parse().map_err(|_| EvaluationError::Unit {
                        file: file.to_path_buf(),
                        line: stmt.line,
                        msg: format!("impact requires a numeric argument, got {:?}", stmt.args_text),
                    })?;
                    builder.impact(n);
                }
                "tag" => {
                    for (k, v) in dsl::parse_hash_args(&stmt.args_text) {
                        builder.tag(k, v);
                    }
                }
                "ref" | "reference" => {
                    builder.reference(parse_ref_value(&stmt.args_text));
                }
                "describe" => {
                    builder.describe(stmt.args_text.clone(), stmt.block.clone());
                }
                "only_if" => {
                    builder.only_if();
                }
                other => {
                    warn!(statement = other, "unrecognized control-body statement");
                }
            }
        }
        Ok(())
    }

    fn evaluate_anonymous_describe(&mut self, file: &Path, stmt: &Statement) {
        let id = self.synthesize_id(file, stmt.line);
        let control = Control {
            id,
            title: None,
            desc: None,
            impact: 0.5,
            refs: vec![],
            tags: TagMap::new(),
            checks: vec![crate::control::CheckSpec {
                kind: "describe".to_string(),
                args: vec![Json::String(stmt.args_text.clone())],
                body: stmt.block.clone(),
            }],
            code: stmt.args_text.clone(),
            source_location: SourceLocation {
                file: file.to_path_buf(),
                line: stmt.line,
            },
            skip: self.skip_flag,
            group_title: self.current_group_title.clone(),
        };
        self.registry.register(control);
    }

    fn synthesize_id(&self, file: &Path, line: u32) -> String {
        let basename = file
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let mut rng = rand::thread_rng();
        let suffix: String = (0..16)
            .map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap())
            .collect();
        format!("(generated from {basename}:{line} {suffix})")
    }

    fn evaluate_attribute(&mut self, stmt: &Statement) {
        let parts = dsl::split_top_level_commas(&stmt.args_text);
        let Some(name) = parts.first().and_then(|p| {
            dsl::parse_single_string_arg(p)
        }) else {
            return;
        };
        let opts_text = parts.get(1..).map(|p| p.join(", ")).unwrap_or_default();
        let opts = dsl::parse_hash_args(&opts_text);
        let default = opts.get("default").cloned();
        let description = opts
            .get("description")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let required = opts.get("required").and_then(|v| v.as_bool()).unwrap_or(false);

        let value = self
            .inputs
            .get(&name)
            .cloned()
            .or_else(|| default.clone())
            .unwrap_or(Json::Null);

        self.attributes.insert(
            name.clone(),
            Attribute {
                name,
                value,
                description,
                required,
            },
        );
    }

    pub fn into_parts(self) -> (RuleRegistry, IndexMap<String, Attribute>, Vec<EvaluationError>) {
        (self.registry, self.attributes, self.diagnostics)
    }
}

fn parse_ref_value(args_text: &str) -> Json {
    if args_text.contains(':') && !args_text.trim_start().starts_with(['\'', '"']) {
        let map = dsl::parse_hash_args(args_text);
        Json::Object(map.into_iter().collect())
    } else {
        dsl::parse_literal(args_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::require_loader::RequireLoader;
    use std::path::Path;

    fn ctx() -> ProfileContext {
        ProfileContext::new("", RequireLoader::new())
    }

    #[test]
    fn minimal_control_registers() {
        let mut c = ctx();
        let src = "control 'c1' do\n  impact 0.7\n  title 't'\n  desc 'd'\n  describe file('/etc/hosts') do\n    it { should exist }\n  end\nend";
        c.evaluate_control_file(Path::new("controls/a.rb"), src);
        assert!(c.diagnostics().is_empty());
        let control = c.registry().get("c1").unwrap();
        assert_eq!(control.title.as_deref(), Some("t"));
        assert_eq!(control.clamped_impact(), 0.7);
        assert_eq!(control.checks.len(), 1);
    }

    #[test]
    fn anonymous_describe_gets_synthetic_id() {
        let mut c = ctx();
        c.evaluate_control_file(Path::new("controls/a.rb"), "describe file('/x') do\n  it { should exist }\nend");
        assert_eq!(c.registry().len(), 1);
        let (id, control) = c.registry().iter().next().unwrap();
        assert!(id.starts_with("(generated from a.rb:1 "));
        assert!(control.is_synthetic());
    }

    #[test]
    fn only_if_marks_sticky_skip() {
        let mut c = ctx();
        c.evaluate_control_file(
            Path::new("controls/a.rb"),
            "control 'c1' do\n  only_if { false }\nend\ncontrol 'c2' do\nend",
        );
        assert!(c.registry().get("c1").unwrap().skip);
        assert!(c.registry().get("c2").unwrap().skip);
    }

    #[test]
    fn duplicate_control_ids_in_one_file_merge() {
        let mut c = ctx();
        c.evaluate_control_file(
            Path::new("controls/a.rb"),
            "control 'c1' do\n  title 'first'\nend\ncontrol 'c1' do\n  title 'second'\nend",
        );
        assert_eq!(c.registry().len(), 1);
        assert_eq!(c.registry().get("c1").unwrap().title.as_deref(), Some("second"));
    }
}
