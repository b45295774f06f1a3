//! Menu queries and assertions on [`WorkspaceClient`].

use crate::client::WorkspaceClient;
use crate::error::{Result, UiTestError};
use crate::model::{MenuItem, MenuState, ScopedMenuItem};

impl WorkspaceClient {
    /// Every menu and item with its enabled flag.
    pub fn menu_state(&self) -> Result<MenuState> {
        MenuState::from_value(self.checked(&["list-menus"], "get menu state")?)
    }

    /// Items of the menu titled exactly `menu`.
    pub fn menu_items(&self, menu: &str) -> Result<Vec<MenuItem>> {
        let state = self.menu_state()?;
        state
            .menu(menu)
            .map(|m| m.items.clone())
            .ok_or_else(|| UiTestError::not_found("menu", menu))
    }

    pub fn menu_item(&self, menu: &str, item: &str) -> Result<MenuItem> {
        self.menu_items(menu)?
            .into_iter()
            .find(|i| i.title == item)
            .ok_or_else(|| UiTestError::not_found("menu item", format!("{menu} > {item}")))
    }

    /// `NotFound` when the item is absent; a present but disabled item is
    /// simply `false`.
    pub fn is_menu_item_enabled(&self, menu: &str, item: &str) -> Result<bool> {
        Ok(self.menu_item(menu, item)?.enabled)
    }

    pub fn enabled_menu_items(&self, menu: Option<&str>) -> Result<Vec<ScopedMenuItem>> {
        self.partition_items(menu, true)
    }

    pub fn disabled_menu_items(&self, menu: Option<&str>) -> Result<Vec<ScopedMenuItem>> {
        self.partition_items(menu, false)
    }

    fn partition_items(&self, menu: Option<&str>, enabled: bool) -> Result<Vec<ScopedMenuItem>> {
        let state = self.menu_state()?;
        Ok(state
            .menus
            .iter()
            .filter(|m| menu.map_or(true, |title| m.title == title))
            .flat_map(|m| {
                m.items
                    .iter()
                    .filter(|i| !i.separator && i.enabled == enabled)
                    .map(|i| ScopedMenuItem {
                        menu: m.title.clone(),
                        item: i.clone(),
                    })
            })
            .collect())
    }

    pub fn assert_menu_item_enabled(&self, menu: &str, item: &str, msg: Option<&str>) -> Result<()> {
        if self.is_menu_item_enabled(menu, item)? {
            return Ok(());
        }
        Err(UiTestError::assertion(msg.map(str::to_string).unwrap_or_else(
            || format!("Menu item '{menu} > {item}' is disabled"),
        )))
    }

    pub fn assert_menu_item_disabled(
        &self,
        menu: &str,
        item: &str,
        msg: Option<&str>,
    ) -> Result<()> {
        if !self.is_menu_item_enabled(menu, item)? {
            return Ok(());
        }
        Err(UiTestError::assertion(msg.map(str::to_string).unwrap_or_else(
            || format!("Menu item '{menu} > {item}' is enabled (expected disabled)"),
        )))
    }
}
