use std::path::PathBuf;

/// Collaborator that cuts off access to a message's attachment once the
/// message is quarantined. Implementations must be idempotent: moderation
/// calls this at most once per message, but an operator may re-run it.
pub trait AccessControl: Send + Sync {
    fn revoke_access(&self, message_id: i64) -> anyhow::Result<()>;
}

/// Marker-file revocation under an attachment root: drops
/// `<root>/<message_id>/revoked`, which the file-serving layer checks
/// before handing out attachment bytes.
#[derive(Debug, Clone)]
pub struct FsAccessControl {
    root: PathBuf,
}

impl FsAccessControl {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AccessControl for FsAccessControl {
    fn revoke_access(&self, message_id: i64) -> anyhow::Result<()> {
        let dir = self.root.join(message_id.to_string());
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join("revoked"), b"")?;
        Ok(())
    }
}

/// No-op implementation for deployments without attachment storage.
#[derive(Debug, Clone)]
pub struct NullAccessControl;

impl AccessControl for NullAccessControl {
    fn revoke_access(&self, _message_id: i64) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn revoke_is_idempotent_and_leaves_a_marker() {
        let root = std::env::temp_dir().join(format!("eddy-access-{}", Uuid::new_v4()));
        let access = FsAccessControl::new(&root);

        access.revoke_access(42).unwrap();
        access.revoke_access(42).unwrap();

        assert!(root.join("42").join("revoked").exists());
        std::fs::remove_dir_all(&root).unwrap();
    }
}
