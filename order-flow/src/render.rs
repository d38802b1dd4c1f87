//! Pure step rendering.
//!
//! Every function here is a function of the step, the payload and the content
//! snapshot only. Nothing is sent or stored; the engine decides when the
//! resulting [`Prompt`] is delivered.

use crate::{
    action::Action,
    content::Content,
    payload::Payload,
    prompt::{Button, Prompt, nav_row},
    step::{
        AboutSection, BRANCH_KEY, Field, FILE_SKIPPED, StepId, TECH_FDM, TECH_RESIN, TECH_UNKNOWN,
    },
    summary::payload_summary,
};

/// A selectable option before content lookup.
struct Choice {
    toggle: Option<&'static str>,
    label_key: &'static str,
    label: &'static str,
    action: Action,
}

impl Choice {
    fn new(toggle: &'static str, label_key: &'static str, label: &'static str, action: Action) -> Self {
        Self {
            toggle: Some(toggle),
            label_key,
            label,
            action,
        }
    }

    fn set(toggle: &'static str, label_key: &'static str, label: &'static str, field: Field, value: &str) -> Self {
        Self::new(toggle, label_key, label, Action::set(field, value))
    }

    /// Option that cannot be switched off; an empty key keeps the fixed label.
    fn fixed(label_key: &'static str, label: &'static str, action: Action) -> Self {
        Self {
            toggle: None,
            label_key,
            label,
            action,
        }
    }
}

/// One row per enabled choice. Toggles default to enabled.
fn option_rows(choices: Vec<Choice>, content: &Content) -> Vec<Vec<Button>> {
    choices
        .into_iter()
        .filter(|c| c.toggle.is_none_or(|key| content.get_bool(key, true)))
        .map(|c| {
            let label = if c.label_key.is_empty() {
                c.label.to_string()
            } else {
                content.text(c.label_key, c.label)
            };
            vec![Button::new(label, c.action)]
        })
        .collect()
}


fn technology(payload: &Payload) -> &str {
    payload
        .get(Field::Technology.as_str())
        .map(str::trim)
        .unwrap_or_default()
}

/// Print steps show a technology-specific picture when one is configured.
fn print_photo(payload: &Payload, content: &Content) -> Option<String> {
    let specific = match technology(payload) {
        TECH_FDM => Some("photo_print_fdm"),
        TECH_RESIN => Some("photo_print_resin"),
        _ => None,
    };
    specific
        .and_then(|key| non_placeholder(content, key))
        .or_else(|| content.photo("photo_print"))
}

fn non_placeholder(content: &Content, key: &str) -> Option<String> {
    match content.get(key) {
        "" => None,
        value => Some(value.to_string()),
    }
}

pub fn main_menu(content: &Content) -> Prompt {
    let mut rows = option_rows(
        vec![
            Choice::new("enabled_menu_print", "btn_menu_print", "📐 Рассчитать печать", Action::menu("print")),
            Choice::new("enabled_menu_scan", "btn_menu_scan", "📡 3D-сканирование", Action::menu("scan")),
            Choice::new(
                "enabled_menu_idea",
                "btn_menu_idea",
                "❓ Нет модели / Хочу придумать",
                Action::menu("idea"),
            ),
            Choice::new("enabled_menu_about", "btn_menu_about", "ℹ️ О нас", Action::menu("about")),
        ],
        content,
    );
    if rows.is_empty() {
        rows.push(vec![Button::new("ℹ️ О нас", Action::menu("about"))]);
    }

    Prompt::new(content.text(
        "welcome_menu_msg",
        "Привет! 👋 Я бот Chel3D.\nВыберите, что вам нужно — и я соберу заявку по шагам.",
    ))
    .with_photo(content.photo("photo_main_menu"))
    .with_keyboard(rows)
}

/// Every step ends with the navigation row; whether it offers "back" is up to the step.
pub fn render(step: StepId, payload: &Payload, content: &Content) -> Prompt {
    let mut prompt = match step {
        StepId::PrintTech => print_tech(payload, content),
        StepId::PrintMaterial => print_material(payload, content),
        StepId::PrintMaterialCustom => Prompt::new(content.text(
            "text_describe_material",
            "Опишите материал/смолу свободным текстом:",
        ))
        .with_photo(print_photo(payload, content)),
        StepId::AttachFile => attach_file(payload, content),
        StepId::Description => Prompt::new(content.text(
            "text_describe_task",
            "Опишите задачу, размеры, сроки и важные детали:",
        ))
        .with_photo(content.placeholder()),
        StepId::Review => review(payload, content),
        StepId::ScanType => scan_type(content),
        StepId::IdeaType => idea_type(content),
        StepId::About => about(content),
    };
    prompt.keyboard.push(nav_row(step.offers_back()));
    prompt
}

fn print_tech(payload: &Payload, content: &Content) -> Prompt {
    let rows = option_rows(
        vec![
            Choice::set("enabled_print_fdm", "btn_print_fdm", "🧵 FDM (Пластик)", Field::Technology, TECH_FDM),
            Choice::set("enabled_print_resin", "btn_print_resin", "💧 Фотополимер", Field::Technology, TECH_RESIN),
            Choice::set(
                "enabled_print_unknown",
                "btn_print_unknown",
                "🤷 Не знаю",
                Field::Technology,
                TECH_UNKNOWN,
            ),
        ],
        content,
    );

    Prompt::new(content.text("text_print_tech", "🖨 Выберите технологию печати:"))
        .with_photo(print_photo(payload, content))
        .with_keyboard(rows)
}

/// Material options and prompt text both depend on the chosen technology.
fn print_material(payload: &Payload, content: &Content) -> Prompt {
    let technology = technology(payload);
    let text_key = match technology {
        TECH_FDM => "text_select_material_fdm",
        TECH_RESIN => "text_select_material_resin",
        TECH_UNKNOWN => "text_select_material_unknown",
        _ => "text_select_material",
    };
    let generic = content.text("text_select_material", "Выберите материал:");

    let items: &[(&'static str, &'static str)] = match technology {
        TECH_FDM => &[
            ("btn_mat_petg", "PET-G"),
            ("btn_mat_pla", "PLA"),
            ("btn_mat_petg_carbon", "PET-G Carbon"),
            ("btn_mat_tpu", "TPU"),
            ("btn_mat_nylon", "Нейлон"),
            ("btn_mat_other", "🤔 Другой материал"),
        ],
        TECH_RESIN => &[
            ("btn_resin_standard", "Стандартная"),
            ("btn_resin_abs", "ABS-Like"),
            ("btn_resin_tpu", "TPU-Like"),
            ("btn_resin_nylon", "Нейлон-Like"),
            ("btn_resin_other", "🤔 Другая смола"),
        ],
        _ => &[("", "Пропустить")],
    };
    // The stored value is the built-in label, so renamed buttons still route.
    let choices = items
        .iter()
        .map(|&(key, label)| Choice::fixed(key, label, Action::set(Field::Material, label)))
        .collect();

    Prompt::new(content.text(text_key, &generic))
        .with_photo(print_photo(payload, content))
        .with_keyboard(option_rows(choices, content))
}

fn attach_file(payload: &Payload, content: &Content) -> Prompt {
    let is_idea = payload.get(BRANCH_KEY) == Some("idea");
    let default_text = if is_idea {
        "Прикрепите фото или эскиз для заявки. Если фото нет — нажмите «Пропустить»."
    } else {
        "Прикрепите STL/3MF/OBJ или фото. Или нажмите кнопку ниже:"
    };
    let photo = if is_idea {
        content.photo("photo_idea")
    } else {
        print_photo(payload, content)
    };

    Prompt::new(content.text("text_attach_file", default_text))
        .with_photo(photo)
        .with_keyboard(vec![vec![Button::new(
            "Пропустить",
            Action::set(Field::File, FILE_SKIPPED),
        )]])
}

fn review(payload: &Payload, content: &Content) -> Prompt {
    Prompt::new(format!(
        "Проверьте заявку и отправьте её менеджеру:\n\n{}",
        payload_summary(payload)
    ))
    .with_photo(content.placeholder())
    .with_keyboard(review_keyboard())
}

fn review_keyboard() -> Vec<Vec<Button>> {
    vec![
        vec![Button::new("➕ Добавить описание", Action::AddDescription)],
        vec![Button::new("✅ Отправить заявку", Action::Submit)],
    ]
}

fn scan_type(content: &Content) -> Prompt {
    let f = Field::ScanType;
    let rows = option_rows(
        vec![
            Choice::set("enabled_scan_human", "btn_scan_human", "🧑 Человек", f, "Человек"),
            Choice::set("enabled_scan_object", "btn_scan_object", "📦 Предмет", f, "Предмет"),
            Choice::set(
                "enabled_scan_industrial",
                "btn_scan_industrial",
                "🏭 Промышленный объект",
                f,
                "Промышленный объект",
            ),
            Choice::set("enabled_scan_other", "btn_scan_other", "🤔 Другое", f, "Другое"),
        ],
        content,
    );

    Prompt::new(content.text("text_scan_type", "📡 Выберите тип объекта для 3D-сканирования:"))
        .with_photo(content.photo("photo_scan"))
        .with_keyboard(rows)
}

fn idea_type(content: &Content) -> Prompt {
    let f = Field::IdeaType;
    let rows = option_rows(
        vec![
            Choice::set("enabled_idea_photo", "btn_idea_photo", "✏️ По фото/эскизу", f, "По фото/эскизу"),
            Choice::set(
                "enabled_idea_award",
                "btn_idea_award",
                "🏆 Сувенир/Кубок/Медаль",
                f,
                "Сувенир/Кубок/Медаль",
            ),
            Choice::set("enabled_idea_master", "btn_idea_master", "📏 Мастер-модель", f, "Мастер-модель"),
            Choice::set("enabled_idea_sign", "btn_idea_sign", "🎨 Вывески", f, "Вывески"),
            Choice::set("enabled_idea_other", "btn_idea_other", "🤔 Другое", f, "Другое"),
        ],
        content,
    );

    Prompt::new(content.text("text_idea_type", "✏️ Выберите направление:"))
        .with_photo(content.photo("photo_idea"))
        .with_keyboard(rows)
}

fn about(content: &Content) -> Prompt {
    let page = Action::About;
    let rows = option_rows(
        vec![
            Choice::new(
                "enabled_about_equipment",
                "btn_about_equipment",
                "🏭 Оборудование",
                page(AboutSection::Equipment),
            ),
            Choice::new(
                "enabled_about_projects",
                "btn_about_projects",
                "🖼 Наши проекты",
                page(AboutSection::Projects),
            ),
            Choice::new("enabled_about_contacts", "btn_about_contacts", "📞 Контакты", page(AboutSection::Contacts)),
            Choice::new("enabled_about_map", "btn_about_map", "📍 На карте", page(AboutSection::Map)),
        ],
        content,
    );

    Prompt::new(content.text(
        "about_text",
        "🏢 Chel3D — 3D-печать, моделирование и сканирование.\nВыберите раздел:",
    ))
    .with_photo(content.photo("photo_about"))
    .with_keyboard(rows)
}

pub fn about_section(section: AboutSection, content: &Content) -> Prompt {
    Prompt::new(content.text(section.text_key(), "ℹ️ О нас"))
        .with_photo(content.photo(section.photo_key()))
        .with_keyboard(vec![nav_row(true)])
}

pub fn submitted(content: &Content) -> Prompt {
    Prompt::new(content.text(
        "text_submit_ok",
        "✅ Заявка отправлена! Менеджер скоро напишет вам в этот чат.",
    ))
    .with_photo(content.placeholder())
    .with_keyboard(vec![nav_row(false)])
}

/// Plain acknowledgement, e.g. after free text was accepted.
pub fn ack(text: &str, content: &Content) -> Prompt {
    Prompt::new(text)
        .with_photo(content.placeholder())
        .with_keyboard(vec![nav_row(true)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn content(values: &[(&str, &str)]) -> Content {
        Content::new(
            values
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            "",
        )
    }

    fn print_payload(technology: &str) -> Payload {
        [("branch", "print"), ("technology", technology)]
            .into_iter()
            .collect()
    }

    fn option_values(prompt: &Prompt) -> Vec<String> {
        prompt
            .buttons()
            .filter_map(|b| match b.action() {
                Some(Action::Set { value, .. }) => Some(value),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn material_options_follow_technology() {
        let empty = content(&[]);

        let fdm = render(StepId::PrintMaterial, &print_payload("FDM"), &empty);
        assert_eq!(
            option_values(&fdm),
            vec!["PET-G", "PLA", "PET-G Carbon", "TPU", "Нейлон", "🤔 Другой материал"]
        );

        let resin = render(StepId::PrintMaterial, &print_payload("Фотополимер"), &empty);
        assert_eq!(option_values(&resin).len(), 5);
        assert!(option_values(&resin).contains(&"ABS-Like".to_string()));

        let other = render(StepId::PrintMaterial, &print_payload("SLS"), &empty);
        assert_eq!(option_values(&other), vec!["Пропустить"]);
    }

    #[test]
    fn material_prompt_text_depends_on_technology() {
        let cfg = content(&[
            ("text_select_material_fdm", "Какой пластик?"),
            ("text_select_material", "Материал?"),
        ]);
        assert_eq!(
            render(StepId::PrintMaterial, &print_payload("FDM"), &cfg).text,
            "Какой пластик?"
        );
        assert_eq!(
            render(StepId::PrintMaterial, &print_payload("Фотополимер"), &cfg).text,
            "Материал?"
        );
        assert_eq!(
            render(StepId::PrintMaterial, &print_payload("FDM"), &content(&[])).text,
            "Выберите материал:"
        );
    }

    #[test]
    fn renamed_material_button_keeps_routing_value() {
        let cfg = content(&[("btn_mat_other", "Что-то своё")]);
        let prompt = render(StepId::PrintMaterial, &print_payload("FDM"), &cfg);
        let button = prompt
            .buttons()
            .find(|b| b.label == "Что-то своё")
            .unwrap();
        assert_eq!(button.data, "set:material:🤔 Другой материал");
    }

    #[test]
    fn toggles_filter_options() {
        let cfg = content(&[("enabled_scan_human", "false"), ("enabled_scan_other", "0")]);
        let prompt = render(StepId::ScanType, &Payload::new(), &cfg);
        assert_eq!(option_values(&prompt), vec!["Предмет", "Промышленный объект"]);
        // First step of a branch: main menu only, no back.
        assert_eq!(prompt.keyboard.last().unwrap(), &nav_row(false));
    }

    #[test]
    fn fully_disabled_step_still_renders() {
        let cfg = content(&[
            ("enabled_print_fdm", "off"),
            ("enabled_print_resin", "off"),
            ("enabled_print_unknown", "off"),
        ]);
        let prompt = render(StepId::PrintTech, &print_payload(""), &cfg);
        assert!(option_values(&prompt).is_empty());
        assert_eq!(prompt.keyboard, vec![nav_row(false)]);
    }

    #[test]
    fn main_menu_never_empty() {
        let cfg = content(&[
            ("enabled_menu_print", "no"),
            ("enabled_menu_scan", "no"),
            ("enabled_menu_idea", "no"),
            ("enabled_menu_about", "no"),
        ]);
        let prompt = main_menu(&cfg);
        assert_eq!(prompt.keyboard.len(), 1);
        assert_eq!(prompt.keyboard[0][0].data, "menu:about");
    }

    #[test]
    fn print_photo_prefers_technology_image() {
        let cfg = content(&[("photo_print", "print.png"), ("photo_print_resin", "resin.png")]);
        let resin = render(StepId::PrintMaterial, &print_payload("Фотополимер"), &cfg);
        assert_eq!(resin.photo.as_deref(), Some("resin.png"));
        let fdm = render(StepId::PrintMaterial, &print_payload("FDM"), &cfg);
        assert_eq!(fdm.photo.as_deref(), Some("print.png"));
    }

    #[test]
    fn attach_file_text_differs_for_ideas() {
        let idea: Payload = [("branch", "idea")].into_iter().collect();
        let prompt = render(StepId::AttachFile, &idea, &content(&[("photo_idea", "idea.jpg")]));
        assert!(prompt.text.starts_with("Прикрепите фото или эскиз"));
        assert_eq!(prompt.photo.as_deref(), Some("idea.jpg"));
        assert!(prompt.has_action(&Action::set(Field::File, FILE_SKIPPED)));
    }

    #[test]
    fn rendering_is_deterministic() {
        let cfg = content(&[("text_print_tech", "Технология?")]);
        let payload = print_payload("FDM");
        for step in StepId::ALL {
            assert_eq!(render(step, &payload, &cfg), render(step, &payload, &cfg));
        }
    }

    #[test]
    fn review_embeds_summary() {
        let payload: Payload = [("branch", "scan"), ("scan_type", "Предмет")]
            .into_iter()
            .collect();
        let prompt = render(StepId::Review, &payload, &content(&[]));
        assert!(prompt.text.ends_with(&payload_summary(&payload)));
        assert!(prompt.has_action(&Action::Submit));
        assert!(prompt.has_action(&Action::AddDescription));
    }

    #[test]
    fn back_button_follows_step_flag() {
        let cfg = content(&[]);
        let payload = print_payload("FDM");
        for step in StepId::ALL {
            let prompt = render(step, &payload, &cfg);
            assert_eq!(
                prompt.keyboard.last(),
                Some(&nav_row(step.offers_back())),
                "{}",
                step
            );
            assert_eq!(prompt.has_action(&Action::Back), step.offers_back(), "{}", step);
        }
        assert!(!StepId::PrintTech.offers_back());
        assert!(StepId::Review.offers_back());
    }
}
