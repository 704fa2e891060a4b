//! Attachments: removable overlays of explicit permission values.
//!
//! An attachment belongs to exactly one `Permissible`. Callers never hold the
//! attachment itself once it is live; they hold an `AttachmentHandle` and go
//! through the owning principal for every edit, so every edit is followed by a
//! recalculation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use bastion_contracts::{
    error::{BastionError, BastionResult},
    key::PermissionKey,
    principal::{AttachmentId, PrincipalId},
};

use crate::traits::{AttachmentOwner, TaskHandle};

/// Invoked once, after an attachment has been removed from its principal.
pub type RemovalCallback = Box<dyn FnOnce(&AttachmentInfo) + Send + 'static>;

/// A cheap, cloneable reference to a live attachment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttachmentHandle {
    pub id: AttachmentId,
    /// The principal the attachment was added to.
    pub principal: PrincipalId,
}

/// Read-only view of an attachment for introspection and removal callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentInfo {
    pub id: AttachmentId,
    pub owner: String,
    pub permissions: BTreeMap<PermissionKey, bool>,
    /// Expiry delay in ticks, when the attachment removes itself.
    pub expires_after: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Expiry {
    pub(crate) ticks: u64,
    pub(crate) task: TaskHandle,
}

/// An ordered overlay of explicit permission values contributed by one owner.
pub struct Attachment {
    id: AttachmentId,
    owner: Arc<dyn AttachmentOwner>,
    permissions: BTreeMap<PermissionKey, bool>,
    on_removed: Option<RemovalCallback>,
    pub(crate) expiry: Option<Expiry>,
}

impl Attachment {
    /// Build a detached attachment for `owner`.
    ///
    /// Returns `BastionError::InvalidOwner` if the owner is disabled or has an
    /// empty name.
    pub fn new(owner: Arc<dyn AttachmentOwner>) -> BastionResult<Self> {
        validate_owner(owner.as_ref())?;
        Ok(Self {
            id: AttachmentId::new(),
            owner,
            permissions: BTreeMap::new(),
            on_removed: None,
            expiry: None,
        })
    }

    pub fn id(&self) -> AttachmentId {
        self.id
    }

    pub fn owner(&self) -> &Arc<dyn AttachmentOwner> {
        &self.owner
    }

    /// Explicit values in key order.
    pub fn permissions(&self) -> &BTreeMap<PermissionKey, bool> {
        &self.permissions
    }

    pub fn set_permission(&mut self, name: impl AsRef<str>, value: bool) -> BastionResult<()> {
        self.permissions.insert(PermissionKey::new(name)?, value);
        Ok(())
    }

    /// Remove an explicit value. Returns true when one was present.
    pub fn unset_permission(&mut self, name: impl AsRef<str>) -> BastionResult<bool> {
        Ok(self.permissions.remove(&PermissionKey::new(name)?).is_some())
    }

    pub fn set_removal_callback(&mut self, callback: RemovalCallback) {
        self.on_removed = Some(callback);
    }

    pub fn info(&self) -> AttachmentInfo {
        AttachmentInfo {
            id: self.id,
            owner: self.owner.name().to_string(),
            permissions: self.permissions.clone(),
            expires_after: self.expiry.map(|e| e.ticks),
        }
    }

    /// Consume the attachment, running its removal callback if it has one.
    pub(crate) fn notify_removed(mut self) {
        if let Some(callback) = self.on_removed.take() {
            let info = self.info();
            callback(&info);
        }
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("id", &self.id)
            .field("owner", &self.owner.name())
            .field("permissions", &self.permissions)
            .field("has_callback", &self.on_removed.is_some())
            .field("expiry", &self.expiry)
            .finish()
    }
}

pub(crate) fn validate_owner(owner: &dyn AttachmentOwner) -> BastionResult<()> {
    if owner.name().trim().is_empty() {
        return Err(BastionError::InvalidOwner {
            owner: String::new(),
            reason: "owner name cannot be empty".to_string(),
        });
    }
    if !owner.is_enabled() {
        return Err(BastionError::InvalidOwner {
            owner: owner.name().to_string(),
            reason: "owner is disabled".to_string(),
        });
    }
    Ok(())
}

/// Optional settings for `Permissible::create_attachment`.
///
/// ```rust,ignore
/// let options = AttachmentOptions::new()
///     .permission("world.fly", true)
///     .expire_after(200)
///     .on_removed(|info| println!("{} expired", info.id));
/// ```
#[derive(Default)]
pub struct AttachmentOptions {
    pub(crate) permission: Option<(String, bool)>,
    pub(crate) expiry_ticks: Option<u64>,
    pub(crate) on_removed: Option<RemovalCallback>,
}

impl AttachmentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the attachment with one explicit value.
    pub fn permission(mut self, name: impl Into<String>, value: bool) -> Self {
        self.permission = Some((name.into(), value));
        self
    }

    /// Remove the attachment automatically after `ticks` scheduler ticks.
    pub fn expire_after(mut self, ticks: u64) -> Self {
        self.expiry_ticks = Some(ticks);
        self
    }

    pub fn on_removed(mut self, callback: impl FnOnce(&AttachmentInfo) + Send + 'static) -> Self {
        self.on_removed = Some(Box::new(callback));
        self
    }
}

impl fmt::Debug for AttachmentOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachmentOptions")
            .field("permission", &self.permission)
            .field("expiry_ticks", &self.expiry_ticks)
            .field("has_callback", &self.on_removed.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::testing::TestOwner;

    #[test]
    fn disabled_owner_is_rejected() {
        let owner = TestOwner::new("worldedit");
        owner.disable();

        match Attachment::new(owner) {
            Err(BastionError::InvalidOwner { owner, reason }) => {
                assert_eq!(owner, "worldedit");
                assert!(reason.contains("disabled"));
            }
            other => panic!("expected InvalidOwner, got {:?}", other),
        }
    }

    #[test]
    fn unnamed_owner_is_rejected() {
        let result = Attachment::new(TestOwner::new("  "));
        assert!(matches!(result, Err(BastionError::InvalidOwner { .. })));
    }

    #[test]
    fn explicit_values_are_normalized() {
        let mut attachment = Attachment::new(TestOwner::new("essentials")).unwrap();
        attachment.set_permission("Chat.Color", true).unwrap();
        attachment.set_permission("chat.color", false).unwrap();

        assert_eq!(attachment.permissions().len(), 1);
        assert!(attachment.unset_permission("CHAT.COLOR").unwrap());
        assert!(!attachment.unset_permission("chat.color").unwrap());
        assert!(attachment.set_permission("", true).is_err());
    }

    #[test]
    fn removal_callback_runs_once_with_final_view() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let mut attachment = Attachment::new(TestOwner::new("essentials")).unwrap();
        attachment.set_permission("fly", true).unwrap();
        attachment.set_removal_callback(Box::new(move |info| {
            sink.lock().unwrap().push(info.clone());
        }));

        let id = attachment.id();
        attachment.notify_removed();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, id);
        assert_eq!(seen[0].owner, "essentials");
        assert_eq!(seen[0].permissions.len(), 1);
    }

    #[test]
    fn info_serializes_with_normalized_keys() {
        let mut attachment = Attachment::new(TestOwner::new("essentials")).unwrap();
        attachment.set_permission("World.Fly", true).unwrap();

        let json = serde_json::to_value(attachment.info()).unwrap();
        assert_eq!(json["owner"], "essentials");
        assert_eq!(json["permissions"]["world.fly"], true);
        assert!(json["expires_after"].is_null());
    }
}
