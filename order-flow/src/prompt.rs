use serde::{Deserialize, Serialize};

use crate::action::Action;

/// Inline button; `data` is the encoded [`Action`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            data: action.encode(),
        }
    }

    pub fn action(&self) -> Option<Action> {
        Action::decode(&self.data).ok()
    }
}

/// Outbound message for one step: text, optional image and button rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub text: String,
    pub photo: Option<String>,
    pub keyboard: Vec<Vec<Button>>,
}

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            photo: None,
            keyboard: Vec::new(),
        }
    }

    pub fn with_photo(mut self, photo: Option<String>) -> Self {
        self.photo = photo.filter(|p| !p.is_empty());
        self
    }

    pub fn with_keyboard(mut self, keyboard: Vec<Vec<Button>>) -> Self {
        self.keyboard = keyboard;
        self
    }

    /// All buttons, row by row.
    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.keyboard.iter().flatten()
    }

    pub fn has_action(&self, action: &Action) -> bool {
        let data = action.encode();
        self.buttons().any(|b| b.data == data)
    }
}

/// Navigation row appended under every step.
pub fn nav_row(include_back: bool) -> Vec<Button> {
    let mut row = Vec::with_capacity(2);
    if include_back {
        row.push(Button::new("🔙 Назад", Action::Back));
    }
    row.push(Button::new("🏠 Главное меню", Action::MainMenu));
    row
}
