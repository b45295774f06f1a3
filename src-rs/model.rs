//! Typed views over the bridge's JSON responses.
//!
//! Node shapes differ between widget kinds: children may arrive under
//! `children`, `contentView` (a single node) or `views`, and window titles
//! under `title` or `windowTitle`. Those variants are folded together here,
//! once, so tree searches only ever walk [`ElementNode::children`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Frame {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Frame {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "RawNode")]
pub struct ElementNode {
    pub class: Option<String>,
    pub text: Option<String>,
    pub frame: Option<Frame>,
    pub children: Vec<ElementNode>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ElementNode {
    pub fn is_class(&self, class_name: &str) -> bool {
        self.class.as_deref() == Some(class_name)
    }
}

/// A value of the wrong shape reads as absent instead of failing the
/// whole document.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(serde_json::from_value(Value::deserialize(deserializer)?).ok())
}

fn parse_list<T: DeserializeOwned>(items: Vec<Value>) -> Vec<T> {
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect()
}

/// List entries that do not parse are dropped; a non-list reads as empty.
fn lenient_vec<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => parse_list(items),
        _ => Vec::new(),
    })
}

/// Child nodes arrive either as a list or as one node.
fn lenient_nodes<'de, D>(deserializer: D) -> std::result::Result<Vec<ElementNode>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => parse_list(items),
        node @ Value::Object(_) => parse_list(vec![node]),
        _ => Vec::new(),
    })
}

#[derive(Deserialize)]
struct RawNode {
    #[serde(default, deserialize_with = "lenient")]
    class: Option<String>,
    #[serde(default)]
    text: Option<Value>,
    #[serde(default, deserialize_with = "lenient")]
    frame: Option<Frame>,
    #[serde(default, deserialize_with = "lenient_nodes")]
    children: Vec<ElementNode>,
    #[serde(default, rename = "contentView", deserialize_with = "lenient_nodes")]
    content_view: Vec<ElementNode>,
    #[serde(default, deserialize_with = "lenient_nodes")]
    views: Vec<ElementNode>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<RawNode> for ElementNode {
    fn from(raw: RawNode) -> Self {
        let children = raw
            .children
            .into_iter()
            .chain(raw.content_view)
            .chain(raw.views)
            .collect();
        let text = match raw.text {
            Some(Value::String(s)) => Some(s),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        ElementNode {
            class: raw.class,
            text,
            frame: raw.frame,
            children,
            extra: raw.extra,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "RawWindow")]
pub struct WindowSnapshot {
    pub title: Option<String>,
    pub window_title: Option<String>,
    pub visibility: Option<String>,
    /// The window itself as a node: class, frame, text and view tree.
    pub node: ElementNode,
}

#[derive(Deserialize)]
struct RawWindow {
    #[serde(default, deserialize_with = "lenient")]
    title: Option<String>,
    #[serde(default, rename = "windowTitle", deserialize_with = "lenient")]
    window_title: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    visibility: Option<String>,
    #[serde(flatten)]
    node: RawNode,
}

impl From<RawWindow> for WindowSnapshot {
    fn from(raw: RawWindow) -> Self {
        WindowSnapshot {
            title: raw.title,
            window_title: raw.window_title,
            visibility: raw.visibility,
            node: raw.node.into(),
        }
    }
}

impl WindowSnapshot {
    /// Exact match against either title key.
    pub fn has_title(&self, title: &str) -> bool {
        self.title.as_deref() == Some(title) || self.window_title.as_deref() == Some(title)
    }

    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .or(self.window_title.as_deref())
            .unwrap_or("")
    }

    pub fn class(&self) -> &str {
        self.node.class.as_deref().unwrap_or("")
    }

    pub fn frame(&self) -> Option<Frame> {
        self.node.frame
    }

    pub fn is_visible(&self) -> bool {
        self.visibility.as_deref() == Some("visible")
    }

    /// Elements inside the window's root view.
    pub fn elements(&self) -> &[ElementNode] {
        self.node
            .children
            .first()
            .map(|root| root.children.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UiState {
    #[serde(rename = "uiTestingEnabled", default)]
    pub ui_testing_enabled: bool,
    #[serde(default, deserialize_with = "lenient_vec")]
    pub windows: Vec<WindowSnapshot>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UiState {
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn window(&self, title: &str) -> Option<&WindowSnapshot> {
        self.windows.iter().find(|w| w.has_title(title))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MenuItem {
    pub title: String,
    pub enabled: bool,
    pub action: Option<String>,
    pub shortcut: Option<String>,
    pub has_submenu: bool,
    pub separator: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Menu {
    pub title: String,
    pub enabled: bool,
    pub items: Vec<MenuItem>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MenuState {
    pub success: bool,
    pub menus: Vec<Menu>,
}

impl MenuState {
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn menu(&self, title: &str) -> Option<&Menu> {
        self.menus.iter().find(|m| m.title == title)
    }
}

/// A menu item annotated with the title of the menu it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopedMenuItem {
    pub menu: String,
    #[serde(flatten)]
    pub item: MenuItem,
}
