use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FlowError;

/// Payload key holding the branch name; written once at session start.
pub const BRANCH_KEY: &str = "branch";

/// Marker carried by option values that ask for a free-text alternative.
pub const OTHER_MARKER: &str = "🤔";

pub const TECH_FDM: &str = "FDM";
pub const TECH_RESIN: &str = "Фотополимер";
pub const TECH_UNKNOWN: &str = "Не знаю";

/// Value recorded for `file` when the user skips the attachment step.
pub const FILE_SKIPPED: &str = "нет";

/// Top-level request category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Print,
    Scan,
    Idea,
    Dialog,
}

impl Branch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Print => "print",
            Branch::Scan => "scan",
            Branch::Idea => "idea",
            Branch::Dialog => "dialog",
        }
    }

    /// Human-readable request type used in summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Branch::Print => "Рассчитать печать",
            Branch::Scan => "3D-сканирование",
            Branch::Idea => "Нет модели / Хочу придумать",
            Branch::Dialog => "Диалог",
        }
    }

    /// Step rendered right after the branch is chosen. `Dialog` orders are
    /// opened by staff conversations and have no wizard.
    pub fn first_step(&self) -> Option<StepId> {
        match self {
            Branch::Print => Some(StepId::PrintTech),
            Branch::Scan => Some(StepId::ScanType),
            Branch::Idea => Some(StepId::IdeaType),
            Branch::Dialog => None,
        }
    }
}

impl FromStr for Branch {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "print" => Ok(Branch::Print),
            "scan" => Ok(Branch::Scan),
            "idea" => Ok(Branch::Idea),
            "dialog" => Ok(Branch::Dialog),
            other => Err(FlowError::InvalidAction(format!("unknown branch: {}", other))),
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer fields collected into the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Technology,
    Material,
    MaterialCustom,
    ScanType,
    IdeaType,
    Description,
    File,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::Technology,
        Field::Material,
        Field::MaterialCustom,
        Field::ScanType,
        Field::IdeaType,
        Field::Description,
        Field::File,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Technology => "technology",
            Field::Material => "material",
            Field::MaterialCustom => "material_custom",
            Field::ScanType => "scan_type",
            Field::IdeaType => "idea_type",
            Field::Description => "description",
            Field::File => "file",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Field::Technology => "Технология",
            Field::Material => "Материал",
            Field::MaterialCustom => "Свой материал",
            Field::ScanType => "Тип сканирования",
            Field::IdeaType => "Категория",
            Field::Description => "Описание",
            Field::File => "Файл",
        }
    }
}

impl FromStr for Field {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Field::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| FlowError::InvalidAction(format!("unknown field: {}", s)))
    }
}

/// Fields that are filled from a free-text message rather than a button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
    MaterialCustom,
    Description,
}

impl TextField {
    pub fn field(&self) -> Field {
        match self {
            TextField::MaterialCustom => Field::MaterialCustom,
            TextField::Description => Field::Description,
        }
    }

    /// Short acknowledgement sent before the follow-up step.
    pub fn ack(&self) -> &'static str {
        match self {
            TextField::MaterialCustom => "Принято ✅",
            TextField::Description => "Описание добавлено ✅",
        }
    }
}

/// Identifier of a rendered wizard step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    PrintTech,
    PrintMaterial,
    PrintMaterialCustom,
    AttachFile,
    Description,
    Review,
    ScanType,
    IdeaType,
    About,
}

impl StepId {
    pub const ALL: [StepId; 9] = [
        StepId::PrintTech,
        StepId::PrintMaterial,
        StepId::PrintMaterialCustom,
        StepId::AttachFile,
        StepId::Description,
        StepId::Review,
        StepId::ScanType,
        StepId::IdeaType,
        StepId::About,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepId::PrintTech => "print_tech",
            StepId::PrintMaterial => "print_material",
            StepId::PrintMaterialCustom => "print_material_custom",
            StepId::AttachFile => "attach_file",
            StepId::Description => "description",
            StepId::Review => "review",
            StepId::ScanType => "scan_type",
            StepId::IdeaType => "idea_type",
            StepId::About => "about",
        }
    }

    /// The payload field a free-text message fills while this step is shown.
    pub fn text_field(&self) -> Option<TextField> {
        match self {
            StepId::PrintMaterialCustom => Some(TextField::MaterialCustom),
            StepId::Description => Some(TextField::Description),
            _ => None,
        }
    }

    /// First steps of a branch offer no back button, only the main menu.
    pub fn offers_back(&self) -> bool {
        !matches!(
            self,
            StepId::PrintTech | StepId::ScanType | StepId::IdeaType | StepId::About
        )
    }
}

impl FromStr for StepId {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepId::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| FlowError::InvalidAction(format!("unknown step: {}", s)))
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Informational pages reachable from the "about" step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AboutSection {
    Equipment,
    Projects,
    Contacts,
    Map,
}

impl AboutSection {
    pub const ALL: [AboutSection; 4] = [
        AboutSection::Equipment,
        AboutSection::Projects,
        AboutSection::Contacts,
        AboutSection::Map,
    ];

    /// Short code used in callback data.
    pub fn code(&self) -> &'static str {
        match self {
            AboutSection::Equipment => "eq",
            AboutSection::Projects => "projects",
            AboutSection::Contacts => "contacts",
            AboutSection::Map => "map",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        AboutSection::ALL.into_iter().find(|s| s.code() == code)
    }

    pub fn text_key(&self) -> &'static str {
        match self {
            AboutSection::Equipment => "about_equipment_text",
            AboutSection::Projects => "about_projects_text",
            AboutSection::Contacts => "about_contacts_text",
            AboutSection::Map => "about_map_text",
        }
    }

    pub fn photo_key(&self) -> &'static str {
        match self {
            AboutSection::Equipment => "photo_about_equipment",
            AboutSection::Projects => "photo_about_projects",
            AboutSection::Contacts => "photo_about_contacts",
            AboutSection::Map => "photo_about_map",
        }
    }
}
