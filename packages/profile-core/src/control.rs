//! Control data model and the insertion-ordered registry that merges
//! duplicate control ids.

use std::path::PathBuf;

use derive_more::Display;
use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::metadata::TagMap;

#[derive(Clone, Debug, Default, PartialEq, Display)]
#[display("{}:{}", file.display(), line)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: u32,
}

/// Opaque to the core: captured verbatim from the authored `describe`
/// block and handed to whatever evaluates resources against a real
/// target. The core never interprets `kind`/`args`/`body`.
#[derive(Clone, Debug, PartialEq)]
pub struct CheckSpec {
    pub kind: String,
    pub args: Vec<Json>,
    pub body: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Control {
    pub id: String,
    pub title: Option<String>,
    pub desc: Option<String>,
    /// Raw, unclamped impact as authored; [`Control::clamped_impact`]
    /// applies the [0.0, 1.0] clamp lazily so `check()` can still warn
    /// about out-of-range values.
    pub impact: f64,
    pub refs: Vec<Json>,
    pub tags: TagMap,
    pub checks: Vec<CheckSpec>,
    pub code: String,
    pub source_location: SourceLocation,
    pub skip: bool,
    pub group_title: Option<String>,
}

impl Control {
    pub fn clamped_impact(&self) -> f64 {
        self.impact.clamp(0.0, 1.0)
    }

    pub fn is_synthetic(&self) -> bool {
        self.id.starts_with("(generated ")
    }
}

/// Builder passed to a control-definition closure; mirrors the capability
/// calls a profile author would use inside `control "id" do ... end`.
#[derive(Default)]
pub struct ControlBuilder {
    pub(crate) title: Option<String>,
    pub(crate) desc: Option<String>,
    pub(crate) impact: Option<f64>,
    pub(crate) refs: Vec<Json>,
    pub(crate) tags: TagMap,
    pub(crate) checks: Vec<CheckSpec>,
    pub(crate) only_if_called: bool,
}

impl ControlBuilder {
    pub fn title(&mut self, title: impl Into<String>) -> &mut Self {
        self.title = Some(title.into());
        self
    }

    pub fn desc(&mut self, desc: impl Into<String>) -> &mut Self {
        self.desc = Some(desc.into());
        self
    }

    pub fn impact(&mut self, impact: f64) -> &mut Self {
        self.impact = Some(impact);
        self
    }

    pub fn tag(&mut self, key: impl Into<String>, value: Json) -> &mut Self {
        self.tags.insert(key.into(), value);
        self
    }

    pub fn reference(&mut self, value: Json) -> &mut Self {
        self.refs.push(value);
        self
    }

    pub fn describe(&mut self, subject: impl Into<String>, body: Option<String>) -> &mut Self {
        self.checks.push(CheckSpec {
            kind: "describe".to_string(),
            args: vec![Json::String(subject.into())],
            body,
        });
        self
    }

    pub fn only_if(&mut self) -> &mut Self {
        self.only_if_called = true;
        self
    }
}

/// Insertion-ordered store of fully-qualified control id to [`Control`],
/// merging re-registrations of the same id (a profile + dependency
/// overriding the same control, or a file registering the same control
/// twice) field by field: later non-empty values win, checks and tags
/// accumulate.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    controls: IndexMap<String, Control>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, control: Control) {
        match self.controls.get_mut(&control.id) {
            Some(existing) => merge(existing, control),
            None => {
                self.controls.insert(control.id.clone(), control);
            }
        }
    }

    pub fn mark_skip(&mut self, id: &str) -> bool {
        if let Some(c) = self.controls.get_mut(id) {
            c.skip = true;
            true
        } else {
            false
        }
    }

    pub fn get(&self, id: &str) -> Option<&Control> {
        self.controls.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Control)> {
        self.controls.iter()
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    pub fn into_inner(self) -> IndexMap<String, Control> {
        self.controls
    }
}

fn merge(existing: &mut Control, incoming: Control) {
    if incoming.title.is_some() {
        existing.title = incoming.title;
    }
    if incoming.desc.is_some() {
        existing.desc = incoming.desc;
    }
    existing.impact = incoming.impact;
    existing.refs.extend(incoming.refs);
    for (k, v) in incoming.tags {
        existing.tags.insert(k, v);
    }
    existing.checks.extend(incoming.checks);
    existing.code = incoming.code;
    existing.source_location = incoming.source_location;
    existing.skip = existing.skip || incoming.skip;
    if incoming.group_title.is_some() {
        existing.group_title = incoming.group_title;
    }
}

/// Builds the fully-qualified id `profile_id/local_id`, or just
/// `local_id` when there is no enclosing profile namespace to add (the
/// root profile under evaluation).
pub fn full_id(profile_id: &str, local_id: &str) -> String {
    if profile_id.is_empty() {
        local_id.to_string()
    } else {
        format!("{profile_id}/{local_id}")
    }
}
