pub mod action;
pub mod admin;
pub mod content;
pub mod desk;
pub mod engine;
pub mod error;
pub mod notify;
pub mod payload;
pub mod postgres;
pub mod prompt;
pub mod render;
pub mod repository;
pub mod step;
pub mod storage;
pub mod summary;
pub mod transitions;
pub mod transport;

// Re-export commonly used types
pub use action::{Action, Event};
pub use admin::ContentAdmin;
pub use content::{Content, ContentStore, InMemoryContentStore};
pub use desk::{FileView, OperatorDesk, OrderView};
pub use engine::{EngineSettings, WizardEngine};
pub use error::{FlowError, Result};
pub use notify::{NotificationRelay, NotificationRequest};
pub use payload::Payload;
pub use postgres::{PostgresContentStore, PostgresOrderRepository};
pub use prompt::{Button, Prompt};
pub use repository::{
    Customer, FileDescriptor, FileKind, InMemoryOrderRepository, Order, OrderRepository,
    OrderStatus,
};
pub use step::{AboutSection, Branch, Field, StepId};
pub use storage::{InMemorySessionStorage, Session, SessionStorage};
pub use summary::payload_summary;
pub use transitions::{TransitionTable, TransitionTableBuilder, order_wizard};
pub use transport::{ChatId, ChatTransport, deliver_all, deliver_prompt};
