//! The local key/value store surface: device identity, the local user's
//! key history, cached groups, resource keys, and provisional user keys —
//! each with a minimal, direct SQL mapping.

use async_trait::async_trait;
use tc_crypto::keys::{Hash, PublicEncryptionKey, PublicSignatureKey};
use tc_proto::{DeviceId, GroupId, ResourceId, UserId};

use crate::db::Db;
use crate::error::StoreError;
use crate::models::{Group, GroupPrivateKeys, ProvisionalUserKeys, SymmetricKeyBytes, UserKeyPairEntry};

fn to_array<const N: usize>(bytes: &[u8], field: &'static str) -> Result<[u8; N], StoreError> {
    bytes
        .try_into()
        .map_err(|_| StoreError::Corrupt(format!("{field} has wrong length: {}", bytes.len())))
}

#[derive(Debug, Clone)]
pub struct DeviceKeys {
    pub user_id: UserId,
    pub device_id: DeviceId,
    pub signature_secret_key: [u8; 32],
    pub encryption_secret_key: [u8; 32],
}

/// Everything the rest of the workspace needs to persist or reload,
/// expressed as one trait so a non-SQLite backend (e.g. an in-memory
/// fake for tests) can stand in for `SqliteLocalStore`.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn set_device_keys(&self, keys: &DeviceKeys, trustchain_public_signature_key: &PublicSignatureKey) -> Result<(), StoreError>;
    async fn device_keys(&self) -> Result<Option<DeviceKeys>, StoreError>;
    async fn trustchain_public_signature_key(&self) -> Result<Option<PublicSignatureKey>, StoreError>;
    async fn set_device_initialized(&self, initialized: bool) -> Result<(), StoreError>;
    async fn device_initialized(&self) -> Result<bool, StoreError>;

    async fn push_local_user_key(&self, public: &PublicEncryptionKey, secret: &[u8; 32]) -> Result<(), StoreError>;
    async fn local_user_keys(&self) -> Result<Vec<UserKeyPairEntry>, StoreError>;

    async fn put_group(&self, group: &Group) -> Result<(), StoreError>;
    async fn group(&self, group_id: &GroupId) -> Result<Option<Group>, StoreError>;
    async fn groups(&self, group_ids: &[GroupId]) -> Result<Vec<Group>, StoreError>;
    /// Looks a cached group up by its public encryption key — the only
    /// handle a `KeyPublishToUserGroup` block carries on the wire.
    async fn group_by_public_encryption_key(&self, key: &PublicEncryptionKey) -> Result<Option<Group>, StoreError>;

    async fn put_resource_key(&self, resource_id: &ResourceId, key: &SymmetricKeyBytes) -> Result<(), StoreError>;
    async fn resource_key(&self, resource_id: &ResourceId) -> Result<Option<SymmetricKeyBytes>, StoreError>;

    async fn put_provisional_user_keys(
        &self,
        app_public_signature_key: &PublicSignatureKey,
        tanker_public_signature_key: &PublicSignatureKey,
        keys: &ProvisionalUserKeys,
    ) -> Result<(), StoreError>;
    async fn provisional_user_keys(
        &self,
        app_public_signature_key: &PublicSignatureKey,
        tanker_public_signature_key: &PublicSignatureKey,
    ) -> Result<Option<ProvisionalUserKeys>, StoreError>;

    async fn flush_all_caches(&self) -> Result<(), StoreError>;
}

pub struct SqliteLocalStore {
    db: Db,
}

impl SqliteLocalStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn set_device_keys(&self, keys: &DeviceKeys, trustchain_public_signature_key: &PublicSignatureKey) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO device_identity (id, user_id, device_id, signature_secret_key, encryption_secret_key, trustchain_public_signature_key, device_initialized)
             VALUES (1, ?, ?, ?, ?, ?, 0)
             ON CONFLICT(id) DO UPDATE SET user_id = excluded.user_id, device_id = excluded.device_id,
               signature_secret_key = excluded.signature_secret_key, encryption_secret_key = excluded.encryption_secret_key,
               trustchain_public_signature_key = excluded.trustchain_public_signature_key",
        )
        .bind(keys.user_id.as_bytes().to_vec())
        .bind(keys.device_id.as_bytes().to_vec())
        .bind(keys.signature_secret_key.to_vec())
        .bind(keys.encryption_secret_key.to_vec())
        .bind(trustchain_public_signature_key.as_bytes().to_vec())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn device_keys(&self) -> Result<Option<DeviceKeys>, StoreError> {
        let row: Option<(Vec<u8>, Vec<u8>, Vec<u8>, Vec<u8>)> = sqlx::query_as(
            "SELECT user_id, device_id, signature_secret_key, encryption_secret_key FROM device_identity WHERE id = 1",
        )
        .fetch_optional(self.db.pool())
        .await?;
        let Some((user_id, device_id, sig, enc)) = row else { return Ok(None) };
        Ok(Some(DeviceKeys {
            user_id: UserId::from_bytes(to_array(&user_id, "user_id")?),
            device_id: DeviceId::from_bytes(to_array(&device_id, "device_id")?),
            signature_secret_key: to_array(&sig, "signature_secret_key")?,
            encryption_secret_key: to_array(&enc, "encryption_secret_key")?,
        }))
    }

    async fn trustchain_public_signature_key(&self) -> Result<Option<PublicSignatureKey>, StoreError> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT trustchain_public_signature_key FROM device_identity WHERE id = 1")
                .fetch_optional(self.db.pool())
                .await?;
        row.map(|(bytes,)| Ok(PublicSignatureKey::from_bytes(to_array(&bytes, "trustchain_public_signature_key")?)))
            .transpose()
    }

    async fn set_device_initialized(&self, initialized: bool) -> Result<(), StoreError> {
        sqlx::query("UPDATE device_identity SET device_initialized = ? WHERE id = 1")
            .bind(initialized)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    async fn device_initialized(&self) -> Result<bool, StoreError> {
        let row: Option<(bool,)> = sqlx::query_as("SELECT device_initialized FROM device_identity WHERE id = 1")
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.map(|(v,)| v).unwrap_or(false))
    }

    async fn push_local_user_key(&self, public: &PublicEncryptionKey, secret: &[u8; 32]) -> Result<(), StoreError> {
        let next_position: (i64,) = sqlx::query_as("SELECT COALESCE(MAX(position), -1) + 1 FROM local_user_keys")
            .fetch_one(self.db.pool())
            .await?;
        sqlx::query("INSERT INTO local_user_keys (position, public_encryption_key, private_encryption_key) VALUES (?, ?, ?)")
            .bind(next_position.0)
            .bind(public.as_bytes().to_vec())
            .bind(secret.to_vec())
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    async fn local_user_keys(&self) -> Result<Vec<UserKeyPairEntry>, StoreError> {
        let rows: Vec<(Vec<u8>, Vec<u8>)> =
            sqlx::query_as("SELECT public_encryption_key, private_encryption_key FROM local_user_keys ORDER BY position ASC")
                .fetch_all(self.db.pool())
                .await?;
        rows.into_iter()
            .map(|(public, private)| {
                Ok(UserKeyPairEntry {
                    public_encryption_key: PublicEncryptionKey::from_bytes(to_array(&public, "public_encryption_key")?),
                    private_encryption_key: Some(to_array(&private, "private_encryption_key")?),
                })
            })
            .collect()
    }

    async fn put_group(&self, group: &Group) -> Result<(), StoreError> {
        let (sig_secret, enc_secret) = match &group.private_keys {
            Some(keys) => (Some(keys.signature_keypair_secret.to_vec()), Some(keys.encryption_keypair_secret.to_vec())),
            None => (None, None),
        };
        sqlx::query(
            "INSERT INTO groups (group_id, public_signature_key, public_encryption_key, last_block_hash, last_key_rotation_block_hash, signature_secret_key, encryption_secret_key, sealed_private_signature_key)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(group_id) DO UPDATE SET
               public_signature_key = excluded.public_signature_key,
               public_encryption_key = excluded.public_encryption_key,
               last_block_hash = excluded.last_block_hash,
               last_key_rotation_block_hash = excluded.last_key_rotation_block_hash,
               signature_secret_key = excluded.signature_secret_key,
               encryption_secret_key = excluded.encryption_secret_key,
               sealed_private_signature_key = excluded.sealed_private_signature_key",
        )
        .bind(group.group_id.as_bytes().to_vec())
        .bind(group.public_signature_key.as_bytes().to_vec())
        .bind(group.public_encryption_key.as_bytes().to_vec())
        .bind(group.last_block_hash.as_bytes().to_vec())
        .bind(group.last_key_rotation_block_hash.as_bytes().to_vec())
        .bind(sig_secret)
        .bind(enc_secret)
        .bind(group.sealed_private_signature_key.clone())
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn group(&self, group_id: &GroupId) -> Result<Option<Group>, StoreError> {
        let row: Option<(Vec<u8>, Vec<u8>, Vec<u8>, Vec<u8>, Vec<u8>, Option<Vec<u8>>, Option<Vec<u8>>, Vec<u8>)> = sqlx::query_as(
            "SELECT group_id, public_signature_key, public_encryption_key, last_block_hash, last_key_rotation_block_hash, signature_secret_key, encryption_secret_key, sealed_private_signature_key FROM groups WHERE group_id = ?",
        )
        .bind(group_id.as_bytes().to_vec())
        .fetch_optional(self.db.pool())
        .await?;
        let Some((gid, sig_pub, enc_pub, last_hash, last_rotation, sig_secret, enc_secret, sealed)) = row else {
            return Ok(None);
        };
        let private_keys = match (sig_secret, enc_secret) {
            (Some(s), Some(e)) => Some(GroupPrivateKeys {
                signature_keypair_secret: to_array(&s, "group.signature_secret_key")?,
                encryption_keypair_secret: to_array(&e, "group.encryption_secret_key")?,
            }),
            _ => None,
        };
        Ok(Some(Group {
            group_id: GroupId::from_bytes(to_array(&gid, "group.group_id")?),
            public_signature_key: PublicSignatureKey::from_bytes(to_array(&sig_pub, "group.public_signature_key")?),
            public_encryption_key: PublicEncryptionKey::from_bytes(to_array(&enc_pub, "group.public_encryption_key")?),
            last_block_hash: Hash::from_bytes(to_array(&last_hash, "group.last_block_hash")?),
            last_key_rotation_block_hash: Hash::from_bytes(to_array(&last_rotation, "group.last_key_rotation_block_hash")?),
            private_keys,
            sealed_private_signature_key: sealed,
        }))
    }

    async fn groups(&self, group_ids: &[GroupId]) -> Result<Vec<Group>, StoreError> {
        let mut out = Vec::with_capacity(group_ids.len());
        for id in group_ids {
            if let Some(g) = self.group(id).await? {
                out.push(g);
            }
        }
        Ok(out)
    }

    async fn group_by_public_encryption_key(&self, key: &PublicEncryptionKey) -> Result<Option<Group>, StoreError> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT group_id FROM groups WHERE public_encryption_key = ?")
                .bind(key.as_bytes().to_vec())
                .fetch_optional(self.db.pool())
                .await?;
        let Some((gid,)) = row else { return Ok(None) };
        self.group(&GroupId::from_bytes(to_array(&gid, "group.group_id")?)).await
    }

    async fn put_resource_key(&self, resource_id: &ResourceId, key: &SymmetricKeyBytes) -> Result<(), StoreError> {
        sqlx::query("INSERT OR REPLACE INTO resource_keys (resource_id, key) VALUES (?, ?)")
            .bind(resource_id.as_bytes().to_vec())
            .bind(key.0.to_vec())
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    async fn resource_key(&self, resource_id: &ResourceId) -> Result<Option<SymmetricKeyBytes>, StoreError> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT key FROM resource_keys WHERE resource_id = ?")
            .bind(resource_id.as_bytes().to_vec())
            .fetch_optional(self.db.pool())
            .await?;
        row.map(|(key,)| Ok(SymmetricKeyBytes(to_array(&key, "resource_key")?))).transpose()
    }

    async fn put_provisional_user_keys(
        &self,
        app_public_signature_key: &PublicSignatureKey,
        tanker_public_signature_key: &PublicSignatureKey,
        keys: &ProvisionalUserKeys,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO provisional_user_keys
               (app_public_signature_key, tanker_public_signature_key, app_public_encryption_key, app_private_encryption_key, tanker_public_encryption_key, tanker_private_encryption_key)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(app_public_signature_key.as_bytes().to_vec())
        .bind(tanker_public_signature_key.as_bytes().to_vec())
        .bind(keys.app_encryption_public_key.as_bytes().to_vec())
        .bind(keys.app_encryption_private_key.map(|k| k.to_vec()))
        .bind(keys.tanker_encryption_public_key.as_bytes().to_vec())
        .bind(keys.tanker_encryption_private_key.map(|k| k.to_vec()))
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    async fn provisional_user_keys(
        &self,
        app_public_signature_key: &PublicSignatureKey,
        tanker_public_signature_key: &PublicSignatureKey,
    ) -> Result<Option<ProvisionalUserKeys>, StoreError> {
        let row: Option<(Vec<u8>, Option<Vec<u8>>, Vec<u8>, Option<Vec<u8>>)> = sqlx::query_as(
            "SELECT app_public_encryption_key, app_private_encryption_key, tanker_public_encryption_key, tanker_private_encryption_key
             FROM provisional_user_keys WHERE app_public_signature_key = ? AND tanker_public_signature_key = ?",
        )
        .bind(app_public_signature_key.as_bytes().to_vec())
        .bind(tanker_public_signature_key.as_bytes().to_vec())
        .fetch_optional(self.db.pool())
        .await?;
        let Some((app_pub, app_priv, tanker_pub, tanker_priv)) = row else { return Ok(None) };
        Ok(Some(ProvisionalUserKeys {
            app_encryption_public_key: PublicEncryptionKey::from_bytes(to_array(&app_pub, "app_public_encryption_key")?),
            app_encryption_private_key: app_priv.map(|v| to_array(&v, "app_private_encryption_key")).transpose()?,
            tanker_encryption_public_key: PublicEncryptionKey::from_bytes(to_array(&tanker_pub, "tanker_public_encryption_key")?),
            tanker_encryption_private_key: tanker_priv.map(|v| to_array(&v, "tanker_private_encryption_key")).transpose()?,
        }))
    }

    async fn flush_all_caches(&self) -> Result<(), StoreError> {
        self.db.flush_all_caches().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteLocalStore {
        SqliteLocalStore::new(Db::open_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn device_keys_roundtrip() {
        let store = store().await;
        let keys = DeviceKeys {
            user_id: UserId::from_bytes([1u8; 32]),
            device_id: DeviceId::from_bytes([2u8; 32]),
            signature_secret_key: [3u8; 32],
            encryption_secret_key: [4u8; 32],
        };
        let trustchain_key = PublicSignatureKey::from_bytes([5u8; 32]);
        store.set_device_keys(&keys, &trustchain_key).await.unwrap();

        let loaded = store.device_keys().await.unwrap().unwrap();
        assert_eq!(loaded.user_id, keys.user_id);
        assert_eq!(store.trustchain_public_signature_key().await.unwrap().unwrap(), trustchain_key);
        assert!(!store.device_initialized().await.unwrap());
        store.set_device_initialized(true).await.unwrap();
        assert!(store.device_initialized().await.unwrap());
    }

    #[tokio::test]
    async fn local_user_keys_preserve_chronological_order() {
        let store = store().await;
        let k1 = PublicEncryptionKey::from_bytes([1u8; 32]);
        let k2 = PublicEncryptionKey::from_bytes([2u8; 32]);
        store.push_local_user_key(&k1, &[10u8; 32]).await.unwrap();
        store.push_local_user_key(&k2, &[20u8; 32]).await.unwrap();

        let keys = store.local_user_keys().await.unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].public_encryption_key, k1);
        assert_eq!(keys[1].public_encryption_key, k2);
    }

    #[tokio::test]
    async fn resource_key_roundtrips() {
        let store = store().await;
        let id = ResourceId::from_bytes([9u8; 16]);
        let key = SymmetricKeyBytes([7u8; 32]);
        store.put_resource_key(&id, &key).await.unwrap();
        let loaded = store.resource_key(&id).await.unwrap().unwrap();
        assert_eq!(loaded.0, key.0);
    }
}
