//! WizardEngine – applies one inbound [`Event`] to a user's session and returns the prompts to
//! show next.
//!
//! Each call follows the same _lock → load → apply → persist → save_ pattern:
//!
//! * events for one user are serialized through a per-session lock, events for different users
//!   run concurrently;
//! * the content store is read once per event, so every prompt of one reply sees the same
//!   configuration;
//! * payload changes are written to the order repository before the prompts are returned, so a
//!   caller that delivers them afterwards can never get ahead of the stored order.
//!
//! Repository and delivery failures are logged and swallowed: the user always gets the next
//! prompt. Only a failing [`SessionStorage`] is reported to the caller.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    action::Event,
    content::{Content, ContentStore, keys},
    error::Result,
    notify::{ContactInfo, NotificationRelay, NotificationRequest},
    prompt::Prompt,
    render,
    repository::{Customer, Direction, FileDescriptor, OrderRepository},
    step::{AboutSection, BRANCH_KEY, Branch, Field, StepId},
    storage::{Session, SessionStorage},
    summary::payload_summary,
    transitions::{TransitionTable, order_wizard},
    transport::ChatId,
};

/// Process-level defaults; content store values override them per event.
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub placeholder_photo: String,
    pub orders_chat_id: Option<String>,
}

#[derive(Clone)]
pub struct WizardEngine {
    sessions: Arc<dyn SessionStorage>,
    orders: Arc<dyn OrderRepository>,
    content: Arc<dyn ContentStore>,
    relay: NotificationRelay,
    transitions: Arc<TransitionTable>,
    settings: EngineSettings,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl WizardEngine {
    pub fn new(
        sessions: Arc<dyn SessionStorage>,
        orders: Arc<dyn OrderRepository>,
        content: Arc<dyn ContentStore>,
        relay: NotificationRelay,
        settings: EngineSettings,
    ) -> Self {
        Self {
            sessions,
            orders,
            content,
            relay,
            transitions: Arc::new(order_wizard()),
            settings,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Fresh snapshot of the content store.
    pub async fn content(&self) -> Content {
        Content::fetch(self.content.as_ref(), &self.settings.placeholder_photo).await
    }

    /// Handle one event for `customer` and return the prompts to deliver, in order.
    pub async fn handle(&self, customer: &Customer, event: Event) -> Result<Vec<Prompt>> {
        let key = customer.user_id.to_string();
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.handle_locked(&key, customer, event).await
        };

        drop(lock);
        self.locks.remove_if(&key, |_, l| Arc::strong_count(l) == 1);
        result
    }

    async fn handle_locked(&self, key: &str, customer: &Customer, event: Event) -> Result<Vec<Prompt>> {
        let content = self.content().await;
        let mut session = self
            .sessions
            .get(key)
            .await?
            .unwrap_or_else(|| Session::new(key));

        debug!(
            user_id = customer.user_id,
            step = ?session.current_step,
            event = ?event,
            "handling event"
        );
        let prompts = self.apply(&mut session, customer, event, &content).await;

        if session == Session::new(key) {
            self.sessions.delete(key).await?;
        } else {
            self.sessions.save(session).await?;
        }
        Ok(prompts)
    }

    async fn apply(
        &self,
        session: &mut Session,
        customer: &Customer,
        event: Event,
        content: &Content,
    ) -> Vec<Prompt> {
        match event {
            Event::Restart | Event::MainMenu => vec![self.return_to_main_menu(session, content)],
            Event::Start { branch } => vec![self.start(session, customer, branch, content).await],
            Event::OpenAbout => vec![self.render_step(session, StepId::About, false, content)],
            Event::AboutSection { section } => self.show_about_section(session, section, content).await,
            Event::Back => vec![self.go_back(session, content)],
            Event::OptionSelected { field, value } => {
                self.option_selected(session, field, value, content).await
            }
            Event::TextReceived { text } => self.text_received(session, &text, content).await,
            Event::FileReceived { file } => self.file_received(session, file, content).await,
            Event::AddDescription if session.is_active() => {
                vec![self.render_step(session, StepId::Description, false, content)]
            }
            Event::Submit if session.is_active() => vec![self.submit(session, content).await],
            Event::AddDescription | Event::Submit => {
                debug!(user_id = customer.user_id, "no active order, back to main menu");
                vec![self.return_to_main_menu(session, content)]
            }
        }
    }

    /// Make `step` current and render it.
    ///
    /// Unless `came_from_back` is set, the previous step is pushed onto the history first.
    /// Re-rendering the step that is already current leaves the history alone.
    pub fn render_step(
        &self,
        session: &mut Session,
        step: StepId,
        came_from_back: bool,
        content: &Content,
    ) -> Prompt {
        if !came_from_back {
            if let Some(current) = session.current_step.filter(|c| *c != step) {
                session.history.push(current);
            }
        }
        session.current_step = Some(step);
        session.waiting_for_text = step.text_field();
        render::render(step, &session.payload, content)
    }

    /// Step back one entry; with nothing to go back to this is a full reset.
    pub fn go_back(&self, session: &mut Session, content: &Content) -> Prompt {
        match session.history.pop() {
            Some(previous) => self.render_step(session, previous, true, content),
            None => self.return_to_main_menu(session, content),
        }
    }

    pub fn return_to_main_menu(&self, session: &mut Session, content: &Content) -> Prompt {
        clear(session);
        render::main_menu(content)
    }

    async fn start(
        &self,
        session: &mut Session,
        customer: &Customer,
        branch: Branch,
        content: &Content,
    ) -> Prompt {
        let Some(first) = branch.first_step() else {
            return self.return_to_main_menu(session, content);
        };

        clear(session);
        session.branch = Some(branch);
        session.payload.set(BRANCH_KEY, branch.as_str());

        match self.orders.create_order(customer, branch).await {
            Ok(order_id) => {
                info!(user_id = customer.user_id, order_id, branch = %branch, "draft order created");
                session.order_id = Some(order_id);
            }
            Err(e) => error!(
                user_id = customer.user_id,
                branch = %branch,
                error = %e,
                "failed to create order, continuing without one"
            ),
        }

        self.render_step(session, first, false, content)
    }

    async fn show_about_section(
        &self,
        session: &Session,
        section: AboutSection,
        content: &Content,
    ) -> Vec<Prompt> {
        self.persist(session).await;
        vec![render::about_section(section, content)]
    }

    async fn option_selected(
        &self,
        session: &mut Session,
        field: Field,
        value: String,
        content: &Content,
    ) -> Vec<Prompt> {
        if !session.is_active() {
            debug!(session_id = %session.id, field = %field.as_str(), "option outside a wizard");
            return vec![self.return_to_main_menu(session, content)];
        }

        session.payload.set(field.as_str(), value.as_str());
        self.persist(session).await;

        match self.transitions.next_for_option(field, &value) {
            Some(next) => vec![self.render_step(session, next, false, content)],
            None => {
                warn!(session_id = %session.id, field = %field.as_str(), "no transition for field");
                vec![self.return_to_main_menu(session, content)]
            }
        }
    }

    async fn text_received(&self, session: &mut Session, text: &str, content: &Content) -> Vec<Prompt> {
        let Some(waiting) = session.waiting_for_text.take() else {
            debug!(session_id = %session.id, "text ignored, not waiting for input");
            return Vec::new();
        };

        let text = text.trim();
        session.payload.set(waiting.field().as_str(), text);
        self.persist(session).await;

        if let Some(order_id) = session.order_id.filter(|_| !text.is_empty()) {
            if let Err(e) = self.orders.add_message(order_id, Direction::In, text).await {
                error!(order_id, error = %e, "failed to log inbound message");
            }
        }

        let next = self.transitions.next_for_text(waiting).unwrap_or(StepId::Review);
        vec![
            render::ack(waiting.ack(), content),
            self.render_step(session, next, false, content),
        ]
    }

    async fn file_received(
        &self,
        session: &mut Session,
        file: FileDescriptor,
        content: &Content,
    ) -> Vec<Prompt> {
        let Some(order_id) = session.order_id.filter(|_| session.is_active()) else {
            debug!(session_id = %session.id, "file ignored, no order in progress");
            return Vec::new();
        };

        if let Err(e) = self.orders.add_file(order_id, &file).await {
            error!(order_id, file_id = %file.file_id, error = %e, "failed to record file");
        }
        let name = file.display_name().to_string();
        session.payload.set(Field::File.as_str(), name.as_str());
        session.pending_files.push(file);
        self.persist(session).await;

        let next = self
            .transitions
            .next_for_option(Field::File, &name)
            .unwrap_or(StepId::Review);
        vec![self.render_step(session, next, false, content)]
    }

    async fn submit(&self, session: &mut Session, content: &Content) -> Prompt {
        let summary = payload_summary(&session.payload);

        match session.order_id {
            Some(order_id) => {
                if let Err(e) = self.orders.finalize(order_id, &summary).await {
                    error!(order_id, error = %e, "failed to finalize order");
                }
                let contact = match self.orders.get_order(order_id).await {
                    Ok(order) => order.as_ref().map(ContactInfo::from),
                    Err(e) => {
                        warn!(order_id, error = %e, "order lookup failed, notifying without contact");
                        None
                    }
                };
                let request = NotificationRequest {
                    order_id,
                    summary,
                    contact,
                    files: session.pending_files.clone(),
                };
                let chat = self.orders_chat(content);
                self.relay.dispatch(chat.as_ref(), &request).await;
                info!(order_id, "order submitted");
            }
            None => warn!(session_id = %session.id, "submit without a stored order"),
        }

        let prompt = render::submitted(content);
        clear(session);
        prompt
    }

    /// Write the payload snapshot and its summary; failures are only logged.
    async fn persist(&self, session: &Session) {
        let Some(order_id) = session.order_id else {
            return;
        };
        let summary = payload_summary(&session.payload);
        if let Err(e) = self
            .orders
            .update_payload(order_id, &session.payload, &summary)
            .await
        {
            error!(order_id, error = %e, "failed to persist payload");
        }
    }

    fn orders_chat(&self, content: &Content) -> Option<ChatId> {
        match content.get(keys::ORDERS_CHAT_ID) {
            "" => self.settings.orders_chat_id.as_deref().and_then(ChatId::parse),
            configured => ChatId::parse(configured),
        }
    }
}

fn clear(session: &mut Session) {
    *session = Session::new(std::mem::take(&mut session.id));
}
