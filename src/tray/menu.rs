//! Context menu building and activation lookup

use crate::tray::model::{MenuCallback, MenuItem};
use log::debug;
use std::collections::HashMap;
use std::fmt;

/// Identifier tying a native menu entry back to its callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(pub u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action-{}", self.0)
    }
}

/// Backend-agnostic widget description produced from a menu tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeMenu {
    pub entries: Vec<NativeEntry>,
}

impl NativeMenu {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeEntry {
    Separator,
    Item {
        label: String,
        enabled: bool,
        action: Option<ActionId>,
    },
    Check {
        label: String,
        enabled: bool,
        checked: bool,
        action: Option<ActionId>,
    },
    Submenu {
        label: String,
        enabled: bool,
        action: Option<ActionId>,
        children: NativeMenu,
    },
}

impl NativeEntry {
    pub fn label(&self) -> Option<&str> {
        match self {
            NativeEntry::Separator => None,
            NativeEntry::Item { label, .. }
            | NativeEntry::Check { label, .. }
            | NativeEntry::Submenu { label, .. } => Some(label),
        }
    }

    pub fn action(&self) -> Option<ActionId> {
        match self {
            NativeEntry::Separator => None,
            NativeEntry::Item { action, .. }
            | NativeEntry::Check { action, .. }
            | NativeEntry::Submenu { action, .. } => *action,
        }
    }

    pub fn children(&self) -> Option<&NativeMenu> {
        match self {
            NativeEntry::Submenu { children, .. } => Some(children),
            _ => None,
        }
    }
}

/// Callbacks reachable from the currently installed menu
#[derive(Default)]
pub struct ActionRegistry {
    items: HashMap<ActionId, MenuItem>,
}

impl ActionRegistry {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Callback and item snapshot for an activated entry
    pub fn resolve(&self, id: ActionId) -> Option<(MenuCallback, MenuItem)> {
        let item = self.items.get(&id)?;
        let callback = item.callback.clone()?;
        Some((callback, item.clone()))
    }

    fn register(&mut self, id: ActionId, item: &MenuItem) {
        self.items.insert(id, item.clone());
    }
}

/// Result of one build: the widget description plus its callbacks
pub struct BuiltMenu {
    pub menu: NativeMenu,
    pub actions: ActionRegistry,
}

/// Converts menu trees into native menu descriptions
pub struct MenuBuilder {
    next_action: u64,
}

impl MenuBuilder {
    pub fn new() -> Self {
        Self { next_action: 1 }
    }

    /// Build the native description of `items`
    ///
    /// Action ids keep increasing across builds, so an activation that races
    /// with a rebuild can never resolve to an item of the newer menu.
    pub fn build(&mut self, items: &[MenuItem]) -> BuiltMenu {
        let mut actions = ActionRegistry::default();
        let menu = self.build_level(items, &mut actions);
        debug!(
            "Built menu with {} top-level entries and {} actions",
            menu.len(),
            actions.len()
        );
        BuiltMenu { menu, actions }
    }

    fn build_level(&mut self, items: &[MenuItem], actions: &mut ActionRegistry) -> NativeMenu {
        let mut entries = Vec::with_capacity(items.len());

        for item in items {
            if item.is_separator() {
                entries.push(NativeEntry::Separator);
                continue;
            }

            let label = item.text.clone();
            let enabled = !item.disabled;
            let action = item.callback.as_ref().map(|_| {
                let id = self.allocate();
                actions.register(id, item);
                id
            });

            let entry = if !item.submenu.is_empty() {
                NativeEntry::Submenu {
                    label,
                    enabled,
                    action,
                    children: self.build_level(&item.submenu, actions),
                }
            } else if item.checkbox {
                NativeEntry::Check {
                    label,
                    enabled,
                    checked: item.checked,
                    action,
                }
            } else {
                NativeEntry::Item {
                    label,
                    enabled,
                    action,
                }
            };
            entries.push(entry);
        }

        NativeMenu { entries }
    }

    fn allocate(&mut self) -> ActionId {
        let id = ActionId(self.next_action);
        self.next_action += 1;
        id
    }
}

impl Default for MenuBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_separator_ignores_other_fields() {
        let mut separator = MenuItem::separator().with_callback(|_| {}).disabled();
        separator.checkbox = true;

        let built = MenuBuilder::new().build(&[separator]);
        assert_eq!(built.menu.entries, vec![NativeEntry::Separator]);
        assert!(built.actions.is_empty());
    }

    #[test]
    fn test_submenu_wins_over_checkbox() {
        let item = MenuItem::new("Parent")
            .checkbox(true)
            .with_submenu(vec![MenuItem::new("Child")]);

        let built = MenuBuilder::new().build(&[item]);
        let children = built.menu.entries[0].children().expect("submenu entry");
        assert_eq!(children.len(), 1);
    }

    #[test]
    fn test_resolve_invokes_with_item() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let item = MenuItem::new("Context Item")
            .with_context(42i32)
            .with_callback(move |item| {
                if item.context_ref::<i32>() == Some(&42) {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            });

        let built = MenuBuilder::new().build(&[item]);
        let id = built.menu.entries[0].action().expect("action registered");
        let (callback, snapshot) = built.actions.resolve(id).expect("resolvable");
        callback(&snapshot);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_action_ids_not_reused_across_builds() {
        let mut builder = MenuBuilder::new();
        let first = builder.build(&[MenuItem::new("A").with_callback(|_| {})]);
        let second = builder.build(&[MenuItem::new("A").with_callback(|_| {})]);
        let old = first.menu.entries[0].action().unwrap();
        assert_ne!(Some(old), second.menu.entries[0].action());
        assert!(second.actions.resolve(old).is_none());
    }
}
