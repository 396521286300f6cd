//=========================================================================
// Widgets
//=========================================================================
//
// Self-contained input components attached to a step.
//
// Architecture:
//   StepDef.widget: WidgetSpec { name, options }
//        ↓ WidgetRegistry::create (on exec_step)
//   Box<dyn Widget>
//        ├─ get_values()  merged into done() data
//        └─ destroy()     on step exit
//
// Rendering lives outside the crate; a widget here only owns values.
//
//=========================================================================

//=== External Dependencies ===============================================

use std::collections::HashMap;
use std::rc::Rc;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

//=== Internal Dependencies ===============================================

use crate::core::stage::HookError;

//=== WidgetSpec ==========================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetSpec {
    pub name: String,
    #[serde(default)]
    pub options: Map<String, Value>,
}

impl WidgetSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Map::new(),
        }
    }

    pub fn with_option(mut self, name: &str, value: Value) -> Self {
        self.options.insert(name.to_string(), value);
        self
    }
}

//=== Widget ==============================================================

pub trait Widget {
    /// Current values, merged into the data sent by `done()`.
    fn get_values(&mut self) -> Map<String, Value>;

    /// Rejects `done()` while the widget holds invalid input.
    fn is_valid(&self) -> bool {
        true
    }

    fn destroy(&mut self) {}
}

pub type WidgetFactory = Rc<dyn Fn(&WidgetSpec) -> Result<Box<dyn Widget>, HookError>>;

//=== WidgetRegistry ======================================================

#[derive(Clone, Default)]
pub struct WidgetRegistry {
    factories: HashMap<String, WidgetFactory>,
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&WidgetSpec) -> Result<Box<dyn Widget>, HookError> + 'static,
    {
        debug!("WidgetRegistry: registered '{}'", name);
        self.factories.insert(name.to_string(), Rc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Builds the widget named by `spec`; `None` if no factory is known.
    pub fn create(&self, spec: &WidgetSpec) -> Option<Result<Box<dyn Widget>, HookError>> {
        self.factories.get(&spec.name).map(|f| f(spec))
    }
}

//=== StaticWidget ========================================================

/// Widget returning fixed values, taken from its `values` option.
#[derive(Debug, Clone, Default)]
pub struct StaticWidget {
    values: Map<String, Value>,
    destroyed: bool,
}

impl StaticWidget {
    pub fn from_spec(spec: &WidgetSpec) -> Self {
        let values = spec
            .options
            .get("values")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Self { values, destroyed: false }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl Widget for StaticWidget {
    fn get_values(&mut self) -> Map<String, Value> {
        self.values.clone()
    }

    fn destroy(&mut self) {
        self.destroyed = true;
    }
}

//=========================================================================
// Unit Tests
//=========================================================================
