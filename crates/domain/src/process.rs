use std::collections::HashSet;

use dynapp_core::{AppError, AppId, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How the assignees of a status share the open step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssigneeType {
    /// Exactly one assignee.
    One,
    /// Every assignee must act.
    All,
    /// Any one of the assignees may act.
    Any,
}

/// Who may invoke a process action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionType {
    /// Only the current assignee.
    #[default]
    Normal,
    /// Anyone, bypassing the assignee check.
    NonAssignee,
}

/// Structured reason a transition request was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum TransitionRejection {
    /// Process management is switched off for the app.
    #[error("process management is disabled for this app")]
    ProcessDisabled,
    /// The action id is not part of the graph.
    #[error("unknown process action '{action_id}'")]
    UnknownAction {
        /// Requested action id.
        action_id: String,
    },
    /// The action does not leave the record's current status.
    #[error(
        "action '{action_id}' starts at '{expected}' but the record is at '{}'",
        .actual.as_deref().unwrap_or("<none>")
    )]
    InvalidTransition {
        /// Requested action id.
        action_id: String,
        /// Status the action leaves from.
        expected: String,
        /// Status the record is in.
        actual: Option<String>,
    },
    /// A normal action was requested by someone other than the assignee.
    #[error("actor '{actor_id}' is not assigned to status '{status_id}'")]
    NotAssignee {
        /// Requesting actor.
        actor_id: String,
        /// Status holding the assignment.
        status_id: String,
    },
    /// The target status is final but still carries an assignment.
    #[error("final status '{status_id}' must not carry an open assignment")]
    OpenAssignmentOnFinalStatus {
        /// Offending target status.
        status_id: String,
    },
}

/// One node of the status graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatus {
    id: NonEmptyString,
    name: NonEmptyString,
    #[serde(default)]
    is_initial: bool,
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    assignee_type: Option<AssigneeType>,
}

impl ProcessStatus {
    /// Creates a validated status.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        is_initial: bool,
        is_final: bool,
        assignee_type: Option<AssigneeType>,
    ) -> AppResult<Self> {
        let status = Self {
            id: NonEmptyString::new(id)?,
            name: NonEmptyString::new(name)?,
            is_initial,
            is_final,
            assignee_type,
        };
        status.validate()?;
        Ok(status)
    }

    fn validate(&self) -> AppResult<()> {
        if self.is_final && self.assignee_type.is_some() {
            return Err(AppError::Validation(format!(
                "final status '{}' must not carry an assignee_type",
                self.id
            )));
        }

        Ok(())
    }

    /// Returns the status id.
    #[must_use]
    pub fn id(&self) -> &NonEmptyString {
        &self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &NonEmptyString {
        &self.name
    }

    /// Returns whether new records start here.
    #[must_use]
    pub fn is_initial(&self) -> bool {
        self.is_initial
    }

    /// Returns whether the status ends the process.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.is_final
    }

    /// Returns the assignee type.
    #[must_use]
    pub fn assignee_type(&self) -> Option<AssigneeType> {
        self.assignee_type
    }
}

/// One directed edge of the status graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessAction {
    id: NonEmptyString,
    name: NonEmptyString,
    from_status_id: NonEmptyString,
    to_status_id: NonEmptyString,
    #[serde(default)]
    action_type: ActionType,
}

impl ProcessAction {
    /// Creates an action.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        from_status_id: impl Into<String>,
        to_status_id: impl Into<String>,
        action_type: ActionType,
    ) -> AppResult<Self> {
        Ok(Self {
            id: NonEmptyString::new(id)?,
            name: NonEmptyString::new(name)?,
            from_status_id: NonEmptyString::new(from_status_id)?,
            to_status_id: NonEmptyString::new(to_status_id)?,
            action_type,
        })
    }

    /// Returns the action id.
    #[must_use]
    pub fn id(&self) -> &NonEmptyString {
        &self.id
    }

    /// Returns the display name.
    #[must_use]
    pub fn name(&self) -> &NonEmptyString {
        &self.name
    }

    /// Returns the source status id.
    #[must_use]
    pub fn from_status_id(&self) -> &NonEmptyString {
        &self.from_status_id
    }

    /// Returns the target status id.
    #[must_use]
    pub fn to_status_id(&self) -> &NonEmptyString {
        &self.to_status_id
    }

    /// Returns who may invoke the action.
    #[must_use]
    pub fn action_type(&self) -> ActionType {
        self.action_type
    }
}

/// Status graph of one app. Whether it is enforced is a schema flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessDefinition {
    app_id: AppId,
    statuses: Vec<ProcessStatus>,
    #[serde(default)]
    actions: Vec<ProcessAction>,
}

impl ProcessDefinition {
    /// Creates a validated status graph.
    pub fn new(
        app_id: AppId,
        statuses: Vec<ProcessStatus>,
        actions: Vec<ProcessAction>,
    ) -> AppResult<Self> {
        let definition = Self {
            app_id,
            statuses,
            actions,
        };
        definition.validate()?;
        Ok(definition)
    }

    /// Re-checks every graph invariant; the definition-save path calls this.
    pub fn validate(&self) -> AppResult<()> {
        if self.statuses.is_empty() {
            return Err(AppError::Validation(
                "process definitions require at least one status".to_owned(),
            ));
        }

        let mut status_ids = HashSet::new();
        for status in &self.statuses {
            status.validate()?;
            if !status_ids.insert(status.id.as_str()) {
                return Err(AppError::Validation(format!(
                    "duplicate status id '{}'",
                    status.id
                )));
            }
        }

        let initial_count = self.statuses.iter().filter(|status| status.is_initial).count();
        if initial_count != 1 {
            return Err(AppError::Validation(format!(
                "process definitions require exactly one initial status, found {initial_count}"
            )));
        }

        let mut action_ids = HashSet::new();
        for action in &self.actions {
            if !action_ids.insert(action.id.as_str()) {
                return Err(AppError::Validation(format!(
                    "duplicate action id '{}'",
                    action.id
                )));
            }
            for endpoint in [&action.from_status_id, &action.to_status_id] {
                if !status_ids.contains(endpoint.as_str()) {
                    return Err(AppError::Validation(format!(
                        "action '{}' references unknown status '{endpoint}'",
                        action.id
                    )));
                }
            }
        }

        Ok(())
    }

    /// Returns the owning app.
    #[must_use]
    pub fn app_id(&self) -> AppId {
        self.app_id
    }

    /// Returns all statuses.
    #[must_use]
    pub fn statuses(&self) -> &[ProcessStatus] {
        &self.statuses
    }

    /// Returns all actions.
    #[must_use]
    pub fn actions(&self) -> &[ProcessAction] {
        &self.actions
    }

    /// Returns the initial status.
    pub fn initial_status(&self) -> AppResult<&ProcessStatus> {
        self.statuses
            .iter()
            .find(|status| status.is_initial)
            .ok_or_else(|| {
                AppError::Internal("process definition has no initial status".to_owned())
            })
    }

    /// Finds a status by id.
    #[must_use]
    pub fn status(&self, status_id: &str) -> Option<&ProcessStatus> {
        self.statuses
            .iter()
            .find(|status| status.id.as_str() == status_id)
    }

    /// Finds an action by id.
    #[must_use]
    pub fn action(&self, action_id: &str) -> Option<&ProcessAction> {
        self.actions
            .iter()
            .find(|action| action.id.as_str() == action_id)
    }

    /// Authorizes an action against a record's current status.
    ///
    /// `assignees` lists the users currently assigned to the record's status;
    /// picking them is the job of the external assignment step.
    pub fn authorize_transition(
        &self,
        current_status: Option<&str>,
        action_id: &str,
        actor_id: &str,
        assignees: &[String],
    ) -> Result<&ProcessAction, TransitionRejection> {
        let action = self
            .action(action_id)
            .ok_or_else(|| TransitionRejection::UnknownAction {
                action_id: action_id.to_owned(),
            })?;

        if current_status != Some(action.from_status_id.as_str()) {
            return Err(TransitionRejection::InvalidTransition {
                action_id: action_id.to_owned(),
                expected: action.from_status_id.as_str().to_owned(),
                actual: current_status.map(str::to_owned),
            });
        }

        let from_status = self.status(action.from_status_id.as_str());
        if from_status.is_some_and(|status| status.assignee_type.is_some())
            && action.action_type == ActionType::Normal
            && !assignees.iter().any(|assignee| assignee == actor_id)
        {
            return Err(TransitionRejection::NotAssignee {
                actor_id: actor_id.to_owned(),
                status_id: action.from_status_id.as_str().to_owned(),
            });
        }

        if self
            .status(action.to_status_id.as_str())
            .is_some_and(|status| status.is_final && status.assignee_type.is_some())
        {
            return Err(TransitionRejection::OpenAssignmentOnFinalStatus {
                status_id: action.to_status_id.as_str().to_owned(),
            });
        }

        Ok(action)
    }

    /// Returns the actions leaving a status.
    pub fn actions_from<'a>(
        &'a self,
        status_id: &'a str,
    ) -> impl Iterator<Item = &'a ProcessAction> {
        self.actions
            .iter()
            .filter(move |action| action.from_status_id.as_str() == status_id)
    }
}
