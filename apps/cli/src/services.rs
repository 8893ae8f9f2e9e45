use std::sync::Arc;

use dynapp_application::{
    DerivedFieldService, NotificationService, PermissionService, ProcessService,
    RecordMutationService, SchemaService,
};
use dynapp_infrastructure::{
    ConsoleNotificationDispatcher, InMemoryDefinitionRepository, InMemoryRecordStore,
};

use crate::cli_config::CliConfig;

/// Services wired over the in-memory adapters.
pub struct Services {
    pub definitions: Arc<InMemoryDefinitionRepository>,
    pub records: Arc<InMemoryRecordStore>,
    pub schemas: SchemaService,
    pub permissions: PermissionService,
    pub process: ProcessService,
    pub notifications: NotificationService,
    pub mutations: RecordMutationService,
}

impl Services {
    pub fn build(config: &CliConfig) -> Self {
        let definitions = Arc::new(InMemoryDefinitionRepository::new());
        let records = Arc::new(InMemoryRecordStore::new());

        let permissions = PermissionService::new(definitions.clone(), definitions.clone());
        let schemas = SchemaService::new(definitions.clone(), permissions.clone());
        let process =
            ProcessService::new(definitions.clone(), definitions.clone(), records.clone());
        let notifications = NotificationService::new(
            definitions.clone(),
            definitions.clone(),
            Arc::new(ConsoleNotificationDispatcher::new()),
            config.record_number_prefix.as_str(),
        );
        let mutations = RecordMutationService::new(
            definitions.clone(),
            records.clone(),
            permissions.clone(),
            process.clone(),
            DerivedFieldService::new(records.clone()),
            notifications.clone(),
        )
        .with_currency_symbol(config.currency_symbol.as_str());

        Self {
            definitions,
            records,
            schemas,
            permissions,
            process,
            notifications,
            mutations,
        }
    }
}
