//! Tray state description handed to the controller by the host

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Label that turns a menu item into a separator
pub const SEPARATOR_TEXT: &str = "-";

/// Handler invoked on the UI-loop thread when a menu item is activated
pub type MenuCallback = Arc<dyn Fn(&MenuItem) + Send + Sync>;

/// Handler invoked on the UI-loop thread when a notification is clicked
pub type NotificationCallback = Arc<dyn Fn() + Send + Sync>;

/// Opaque caller data carried by a menu item
pub type ItemContext = Arc<dyn Any + Send + Sync>;

/// One node of the context menu tree
#[derive(Clone, Default)]
pub struct MenuItem {
    pub text: String,
    pub disabled: bool,
    pub checkbox: bool,
    pub checked: bool,
    /// Children; a non-empty list turns this item into a submenu
    pub submenu: Vec<MenuItem>,
    pub callback: Option<MenuCallback>,
    pub context: Option<ItemContext>,
}

impl MenuItem {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn separator() -> Self {
        Self::new(SEPARATOR_TEXT)
    }

    pub fn is_separator(&self) -> bool {
        self.text == SEPARATOR_TEXT
    }

    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&MenuItem) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    pub fn with_submenu(mut self, children: Vec<MenuItem>) -> Self {
        self.submenu = children;
        self
    }

    /// Make this a checkable item in the given state
    pub fn checkbox(mut self, checked: bool) -> Self {
        self.checkbox = true;
        self.checked = checked;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    pub fn with_context<T: Any + Send + Sync>(mut self, context: T) -> Self {
        self.context = Some(Arc::new(context));
        self
    }

    /// Borrow the context as `T`, if it is one
    pub fn context_ref<T: Any>(&self) -> Option<&T> {
        self.context.as_deref().and_then(|ctx| ctx.downcast_ref::<T>())
    }
}

impl fmt::Debug for MenuItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MenuItem")
            .field("text", &self.text)
            .field("disabled", &self.disabled)
            .field("checkbox", &self.checkbox)
            .field("checked", &self.checked)
            .field("submenu", &self.submenu)
            .field("callback", &self.callback.is_some())
            .field("context", &self.context.is_some())
            .finish()
    }
}

/// Transient notification request
#[derive(Clone, Default)]
pub struct Notification {
    pub title: String,
    pub text: String,
    /// Falls back to the tray icon when unset
    pub icon: Option<String>,
    pub on_click: Option<NotificationCallback>,
}

impl Notification {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn on_click<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_click = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notification")
            .field("title", &self.title)
            .field("text", &self.text)
            .field("icon", &self.icon)
            .field("on_click", &self.on_click.is_some())
            .finish()
    }
}

/// Complete snapshot of what the tray should show
#[derive(Debug, Clone, Default)]
pub struct TrayState {
    pub icon: String,
    pub tooltip: String,
    pub menu: Vec<MenuItem>,
    pub notification: Option<Notification>,
    /// Icons worth resolving once at init
    pub preload_icons: Vec<String>,
}

impl TrayState {
    pub fn new(icon: impl Into<String>, tooltip: impl Into<String>) -> Self {
        Self {
            icon: icon.into(),
            tooltip: tooltip.into(),
            ..Self::default()
        }
    }

    pub fn with_menu(mut self, menu: Vec<MenuItem>) -> Self {
        self.menu = menu;
        self
    }

    pub fn with_notification(mut self, notification: Notification) -> Self {
        self.notification = Some(notification);
        self
    }

    /// Find a top-level or nested item by its path of indices
    pub fn item_mut(&mut self, path: &[usize]) -> Option<&mut MenuItem> {
        let (first, rest) = path.split_first()?;
        let mut item = self.menu.get_mut(*first)?;
        for index in rest {
            item = item.submenu.get_mut(*index)?;
        }
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_separator_detection() {
        assert!(MenuItem::separator().is_separator());
        assert!(!MenuItem::new("Quit").is_separator());
    }

    #[test]
    fn test_context_downcast() {
        let item = MenuItem::new("Context Item").with_context(42i32);
        assert_eq!(item.context_ref::<i32>(), Some(&42));
        assert_eq!(item.context_ref::<String>(), None);
    }

    #[test]
    fn test_item_mut_walks_submenus() {
        let mut state = TrayState::new("icon", "tip").with_menu(vec![
            MenuItem::new("Hello"),
            MenuItem::new("SubMenu").with_submenu(vec![MenuItem::new("THIRD"), MenuItem::new("FOUR")]),
        ]);
        assert_eq!(state.item_mut(&[1, 1]).map(|item| item.text.clone()), Some("FOUR".to_string()));
        assert!(state.item_mut(&[1, 5]).is_none());
        assert!(state.item_mut(&[]).is_none());
    }
}
