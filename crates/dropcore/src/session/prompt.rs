//! Outbound prompts: text plus the menu the user may answer with.

use crate::core::types::{Category, DeliveryMode};

pub const CATEGORY_PROMPT: &str = "What would you like to download?";
pub const DELIVERY_PROMPT: &str = "Would you like to download directly or get the command?";
pub const COMMAND_PROMPT: &str = "Run the following command on your machine to download:";
pub const INVALID_SOURCE: &str = "Please send a valid YouTube link.";
pub const START_PROMPT: &str = "Send me a YouTube link to start.";

/// One selectable option of a menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuOption {
    Category(Category),
    Mode(DeliveryMode),
    Back,
}

impl MenuOption {
    pub fn label(&self) -> &'static str {
        match self {
            MenuOption::Category(category) => category.display_name(),
            MenuOption::Mode(mode) => mode.display_name(),
            MenuOption::Back => "⬅️ Back",
        }
    }
}

/// What the orchestrator wants shown to the user after an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPrompt {
    pub text: String,
    /// Empty when no menu is attached
    pub options: Vec<MenuOption>,
    /// Preformatted command line, shown verbatim
    pub command: Option<String>,
}

impl OutboundPrompt {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            options: Vec::new(),
            command: None,
        }
    }

    pub fn with_options(text: impl Into<String>, options: Vec<MenuOption>) -> Self {
        Self {
            text: text.into(),
            options,
            command: None,
        }
    }

    pub fn category_menu(text: impl Into<String>) -> Self {
        Self::with_options(text, category_options())
    }

    pub fn delivery_menu(text: impl Into<String>, category: Category) -> Self {
        Self::with_options(text, delivery_options(category))
    }

    pub fn has_menu(&self) -> bool {
        !self.options.is_empty()
    }

    /// Full message body: text followed by the command line, if any.
    pub fn body(&self) -> String {
        match &self.command {
            Some(command) => format!("{}\n\n{}", self.text, command),
            None => self.text.clone(),
        }
    }
}

/// Every category, in menu order.
pub fn category_options() -> Vec<MenuOption> {
    Category::menu_order().into_iter().map(MenuOption::Category).collect()
}

/// Full videos are only offered as a command; everything else can also be
/// downloaded directly.
pub fn delivery_options(category: Category) -> Vec<MenuOption> {
    let mut options = Vec::with_capacity(3);
    if category.allows_direct_download() {
        options.push(MenuOption::Mode(DeliveryMode::DirectDownload));
    }
    options.push(MenuOption::Mode(DeliveryMode::ObtainCommand));
    options.push(MenuOption::Back);
    options
}
