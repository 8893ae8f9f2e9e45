//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod console_notification_dispatcher;
mod in_memory_definition_repository;
mod in_memory_record_store;

pub use console_notification_dispatcher::ConsoleNotificationDispatcher;
pub use in_memory_definition_repository::InMemoryDefinitionRepository;
pub use in_memory_record_store::InMemoryRecordStore;
