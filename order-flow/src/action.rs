//! Button actions and the events that drive the wizard.
//!
//! Actions travel through the chat platform as short `prefix:args` strings
//! attached to inline buttons; [`Action::decode`] turns them back into
//! typed values and [`Event::from`] maps them onto engine events.

use serde::{Deserialize, Serialize};

use crate::{
    error::{FlowError, Result},
    repository::FileDescriptor,
    step::{AboutSection, Branch, Field},
};

/// Telegram rejects callback data longer than this.
pub const MAX_CALLBACK_BYTES: usize = 64;

/// What a button does when pressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Main menu item; the raw value is kept so unknown items can reset.
    Menu(String),
    Set { field: Field, value: String },
    Back,
    MainMenu,
    AddDescription,
    Submit,
    About(AboutSection),
}

impl Action {
    pub fn menu(item: impl Into<String>) -> Self {
        Action::Menu(item.into())
    }

    pub fn set(field: Field, value: impl Into<String>) -> Self {
        Action::Set {
            field,
            value: value.into(),
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Action::Menu(item) => format!("menu:{}", item),
            Action::Set { field, value } => format!("set:{}:{}", field.as_str(), value),
            Action::Back => "nav:back".to_string(),
            Action::MainMenu => "nav:menu".to_string(),
            Action::AddDescription => "review:add_description".to_string(),
            Action::Submit => "review:send".to_string(),
            Action::About(section) => format!("about:{}", section.code()),
        }
    }

    pub fn decode(data: &str) -> Result<Self> {
        let invalid = || FlowError::InvalidAction(data.to_string());
        let (prefix, rest) = data.split_once(':').ok_or_else(invalid)?;
        match prefix {
            "menu" => Ok(Action::Menu(rest.to_string())),
            "set" => {
                // The value may itself contain ':'.
                let (field, value) = rest.split_once(':').ok_or_else(invalid)?;
                Ok(Action::Set {
                    field: field.parse()?,
                    value: value.to_string(),
                })
            }
            "nav" => match rest {
                "back" => Ok(Action::Back),
                "menu" => Ok(Action::MainMenu),
                _ => Err(invalid()),
            },
            "review" => match rest {
                "add_description" => Ok(Action::AddDescription),
                "send" => Ok(Action::Submit),
                _ => Err(invalid()),
            },
            "about" => AboutSection::from_code(rest)
                .map(Action::About)
                .ok_or_else(invalid),
            _ => Err(invalid()),
        }
    }
}

/// Inbound event for one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// `/start` or any other request to show the main menu from scratch.
    Restart,
    Start { branch: Branch },
    OpenAbout,
    AboutSection { section: AboutSection },
    OptionSelected { field: Field, value: String },
    TextReceived { text: String },
    FileReceived { file: FileDescriptor },
    AddDescription,
    Submit,
    Back,
    MainMenu,
}

impl From<Action> for Event {
    fn from(action: Action) -> Self {
        match action {
            Action::Menu(item) => match item.as_str() {
                "about" => Event::OpenAbout,
                other => match other.parse::<Branch>() {
                    Ok(branch) if branch.first_step().is_some() => Event::Start { branch },
                    _ => Event::MainMenu,
                },
            },
            Action::Set { field, value } => Event::OptionSelected { field, value },
            Action::Back => Event::Back,
            Action::MainMenu => Event::MainMenu,
            Action::AddDescription => Event::AddDescription,
            Action::Submit => Event::Submit,
            Action::About(section) => Event::AboutSection { section },
        }
    }
}
