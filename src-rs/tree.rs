//! Depth-first searches over parsed UI snapshots.

use crate::model::{ElementNode, UiState, WindowSnapshot};

/// Pre-order depth-first walk starting at `root` (inclusive).
pub fn descendants(root: &ElementNode) -> impl Iterator<Item = &ElementNode> {
    let mut stack = vec![root];
    std::iter::from_fn(move || {
        let next = stack.pop()?;
        stack.extend(next.children.iter().rev());
        Some(next)
    })
}

fn all_nodes(state: &UiState) -> impl Iterator<Item = &ElementNode> {
    state.windows.iter().flat_map(|w| descendants(&w.node))
}

pub fn window_exists(state: &UiState, title: &str) -> bool {
    state.windows.iter().any(|w| w.has_title(title))
}

pub fn text_matches(haystack: &str, needle: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        haystack.contains(needle)
    } else {
        haystack.to_lowercase().contains(&needle.to_lowercase())
    }
}

/// Substring search across every `text` field of every window.
pub fn text_visible(state: &UiState, text: &str, case_sensitive: bool) -> bool {
    all_nodes(state)
        .filter_map(|node| node.text.as_deref())
        .any(|t| text_matches(t, text, case_sensitive))
}

pub fn count_by_class(state: &UiState, class_name: &str) -> usize {
    all_nodes(state).filter(|n| n.is_class(class_name)).count()
}

pub fn contains_class(state: &UiState, class_name: &str) -> bool {
    all_nodes(state).any(|n| n.is_class(class_name))
}

/// First node whose text equals `text` exactly.
pub fn find_by_text<'a>(state: &'a UiState, text: &str) -> Option<&'a ElementNode> {
    all_nodes(state).find(|n| n.text.as_deref() == Some(text))
}

/// Non-empty texts in a window, in tree order.
pub fn window_texts(window: &WindowSnapshot) -> Vec<String> {
    descendants(&window.node)
        .filter_map(|n| n.text.as_deref())
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .collect()
}
