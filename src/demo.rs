//! Demo namespace: a small widget inventory kept in memory.
//!
//! Used by both binaries when no other action functions are registered, and by the
//! integration tests as a realistic end-to-end target.

use crate::error::{ActionError, ConfigError};
use crate::interaction::DisplayStyle;
use crate::registry::{ActionRegistry, Invocation};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub const NAMESPACE: &str = "demo";

/// The shipped `demo.yml`.
pub const DEMO_DOCUMENT: &str = include_str!("../data/actionsmap/demo.yml");

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Widget {
    pub name: String,
    pub color: Option<String>,
    pub tags: Vec<String>,
    pub parts: Vec<String>,
}

#[derive(Debug, Default)]
pub struct WidgetStore {
    widgets: Mutex<BTreeMap<String, Widget>>,
}

impl WidgetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.widgets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.lock().is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Widget> {
        self.widgets.lock().get(name).cloned()
    }

    fn list(&self, color: Option<&str>, limit: Option<usize>) -> Vec<Widget> {
        self.widgets
            .lock()
            .values()
            .filter(|w| color.map_or(true, |c| w.color.as_deref() == Some(c)))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    fn create(&self, widget: Widget, dry_run: bool) -> Result<Widget, ActionError> {
        let mut widgets = self.widgets.lock();
        if widgets.contains_key(&widget.name) {
            return Err(ActionError::AlreadyExists(format!("widget '{}'", widget.name)));
        }
        if !dry_run {
            widgets.insert(widget.name.clone(), widget.clone());
        }
        Ok(widget)
    }

    fn delete(&self, name: &str, dry_run: bool) -> Result<(), ActionError> {
        let mut widgets = self.widgets.lock();
        if !widgets.contains_key(name) {
            return Err(ActionError::NotFound(format!("widget '{}'", name)));
        }
        if !dry_run {
            widgets.remove(name);
        }
        Ok(())
    }

    fn add_parts(&self, name: &str, parts: Vec<String>, dry_run: bool) -> Result<Widget, ActionError> {
        let mut widgets = self.widgets.lock();
        let widget = widgets
            .get_mut(name)
            .ok_or_else(|| ActionError::NotFound(format!("widget '{}'", name)))?;
        if dry_run {
            let mut preview = widget.clone();
            preview.parts.extend(parts);
            return Ok(preview);
        }
        widget.parts.extend(parts);
        Ok(widget.clone())
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, ActionError> {
    serde_json::to_value(value).map_err(|e| ActionError::Failed(e.to_string()))
}

fn required<'a>(inv: &'a Invocation<'_>, name: &str) -> Result<&'a str, ActionError> {
    inv.args
        .str(name)
        .ok_or_else(|| ActionError::Invalid(format!("missing {}", name)))
}

/// Register every demo action against `store`.
pub fn register(registry: &mut ActionRegistry, store: Arc<WidgetStore>) -> Result<(), ConfigError> {
    let s = store.clone();
    registry.register("demo.widget.list", move |inv| {
        let limit = inv.args.int("limit").map(|n| n.max(0) as usize);
        let widgets = s.list(inv.args.str("color"), limit);
        Ok(json!({ "widgets": to_value(&widgets)? }))
    })?;

    let s = store.clone();
    registry.register("demo.widget.show", move |inv| {
        let name = required(inv, "name")?;
        let widget = s
            .get(name)
            .ok_or_else(|| ActionError::NotFound(format!("widget '{}'", name)))?;
        to_value(&widget)
    })?;

    let s = store.clone();
    registry.register("demo.widget.create", move |inv| {
        let widget = Widget {
            name: required(inv, "name")?.to_string(),
            color: inv.args.str("color").map(str::to_string),
            tags: inv.args.list("tag"),
            parts: Vec::new(),
        };
        let created = s.create(widget, inv.globals.flag("dry_run"))?;
        if let Some(auth) = inv.auth {
            info!(widget = %created.name, profile = %auth.profile, "Widget created");
        }
        inv.interaction.display(
            &format!("{} '{}'", inv.interaction.translate("widget_created"), created.name),
            DisplayStyle::Success,
        );
        to_value(&created)
    })?;

    let s = store.clone();
    registry.register("demo.widget.delete", move |inv| {
        s.delete(required(inv, "name")?, inv.globals.flag("dry_run"))?;
        Ok(Value::Null)
    })?;

    let s = store;
    registry.register("demo.widget.part.add", move |inv| {
        let name = required(inv, "widget")?;
        let widget = s.add_parts(name, inv.args.list("part"), inv.globals.flag("dry_run"))?;
        to_value(&widget)
    })?;

    Ok(())
}

/// Write `demo.yml` under `<data_dir>/actionsmap/` unless one is already there.
pub fn install(data_dir: &Path) -> Result<PathBuf, ConfigError> {
    let dir = data_dir.join("actionsmap");
    let path = dir.join(format!("{}.yml", NAMESPACE));
    if path.exists() {
        return Ok(path);
    }
    fs::create_dir_all(&dir).map_err(|source| ConfigError::Read {
        path: dir.clone(),
        source,
    })?;
    fs::write(&path, DEMO_DOCUMENT).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    info!(path = %path.display(), "Installed demo action map");
    Ok(path)
}
