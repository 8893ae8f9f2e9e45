use serde::{Deserialize, Serialize};

/// The user attempting an operation, with role and organization memberships.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    id: String,
    display_name: String,
    #[serde(default)]
    role_ids: Vec<String>,
    #[serde(default)]
    org_id: Option<String>,
    #[serde(default)]
    org_ancestor_ids: Vec<String>,
}

impl Actor {
    /// Creates an actor from identity provider data.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        role_ids: Vec<String>,
        org_id: Option<String>,
        org_ancestor_ids: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            role_ids,
            org_id,
            org_ancestor_ids,
        }
    }

    /// Returns the stable user id.
    #[must_use]
    pub fn id(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the display name for the current user.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_str()
    }

    /// Returns the role memberships.
    #[must_use]
    pub fn role_ids(&self) -> &[String] {
        &self.role_ids
    }

    /// Returns the direct organization, if any.
    #[must_use]
    pub fn org_id(&self) -> Option<&str> {
        self.org_id.as_deref()
    }

    /// Returns the ancestors of the direct organization, nearest first.
    #[must_use]
    pub fn org_ancestor_ids(&self) -> &[String] {
        &self.org_ancestor_ids
    }

    /// Returns whether the actor holds the role.
    #[must_use]
    pub fn has_role(&self, role_id: &str) -> bool {
        self.role_ids.iter().any(|value| value == role_id)
    }

    /// Returns whether the actor belongs to the organization.
    ///
    /// With `include_sub_organizations`, membership of any descendant
    /// organization also counts, which is checked through the ancestor chain.
    #[must_use]
    pub fn belongs_to_org(&self, org_id: &str, include_sub_organizations: bool) -> bool {
        if self.org_id.as_deref() == Some(org_id) {
            return true;
        }

        include_sub_organizations && self.org_ancestor_ids.iter().any(|value| value == org_id)
    }
}
