//! The session's private, lock-guarded state: which accessors and
//! resolvers are live, the local device's identity once known, and the
//! shared [`ChainState`] projection every accessor pulls into.

use std::collections::HashMap;
use std::sync::Arc;

use tc_groups::GroupManager;
use tc_proto::{Block, Requester, TrustchainId};
use tc_share::{KeyReceiver, ShareResolver};
use tc_store::chain_state::ChainState;
use tc_store::models::LocalUser;
use tc_store::{GroupAccessor, LocalStore, LocalUserAccessor, ProvisionalUserAccessor, UserAccessor};
use tc_verifier::verify_block;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::Error;
use crate::identity::Identity;
use crate::status::Status;

pub(crate) struct SessionState {
    pub status: Status,
    pub trustchain_id: Option<TrustchainId>,
    pub requester: Arc<dyn Requester>,
    pub local_store: Arc<dyn LocalStore>,
    pub chain_state: Arc<AsyncMutex<ChainState>>,

    pub local_user: Option<LocalUser>,
    pub user_accessor: Option<Arc<UserAccessor>>,
    pub group_accessor: Option<Arc<GroupAccessor>>,
    pub provisional_user_accessor: Option<Arc<ProvisionalUserAccessor>>,
    pub local_user_accessor: Option<Arc<LocalUserAccessor>>,
    pub share_resolver: Option<Arc<ShareResolver>>,
    pub key_receiver: Option<Arc<KeyReceiver>>,
    pub group_manager: Option<Arc<GroupManager>>,

    /// Set between `start()` and a successful `registerIdentity`/`verifyIdentity`.
    pub pending_identity: Option<Identity>,
    /// Consecutive failed verification attempts, keyed by user id.
    pub verification_attempts: HashMap<[u8; 32], u32>,
}

impl SessionState {
    pub fn new(requester: Arc<dyn Requester>, local_store: Arc<dyn LocalStore>) -> Self {
        Self {
            status: Status::Stopped,
            trustchain_id: None,
            requester,
            local_store,
            chain_state: Arc::new(AsyncMutex::new(ChainState::new())),
            local_user: None,
            user_accessor: None,
            group_accessor: None,
            provisional_user_accessor: None,
            local_user_accessor: None,
            share_resolver: None,
            key_receiver: None,
            group_manager: None,
            pending_identity: None,
            verification_attempts: HashMap::new(),
        }
    }

    pub fn require_ready(&self) -> Result<(), Error> {
        if self.status != Status::Ready {
            return Err(Error::precondition_failed(format!(
                "session is not ready (status = {:?})",
                self.status
            )));
        }
        Ok(())
    }

    pub fn trustchain_id(&self) -> Result<TrustchainId, Error> {
        self.trustchain_id.ok_or_else(|| Error::internal("trustchain id is not set"))
    }

    /// Build every accessor/resolver/manager once `trustchain_id` is set.
    /// Idempotent: callable again after `local_store` gains new state.
    pub fn build_runtime(&mut self) {
        let trustchain_id = match self.trustchain_id {
            Some(id) => id,
            None => return,
        };
        let user_accessor = Arc::new(UserAccessor::new(trustchain_id, self.chain_state.clone(), self.requester.clone()));
        let group_accessor = Arc::new(GroupAccessor::new(
            trustchain_id,
            self.chain_state.clone(),
            self.requester.clone(),
            self.local_store.clone(),
        ));
        let provisional_user_accessor = Arc::new(ProvisionalUserAccessor::new(
            trustchain_id,
            self.chain_state.clone(),
            self.requester.clone(),
            self.local_store.clone(),
        ));
        let local_user_accessor = Arc::new(LocalUserAccessor::new(
            trustchain_id,
            self.chain_state.clone(),
            self.requester.clone(),
            self.local_store.clone(),
        ));
        self.share_resolver =
            Some(Arc::new(ShareResolver::new(trustchain_id, user_accessor.clone(), group_accessor.clone())));
        self.key_receiver = Some(Arc::new(KeyReceiver::new(
            trustchain_id,
            self.requester.clone(),
            self.local_store.clone(),
            local_user_accessor.clone(),
            group_accessor.clone(),
            provisional_user_accessor.clone(),
        )));
        self.group_manager = Some(Arc::new(GroupManager::new(trustchain_id, self.local_store.clone())));
        self.user_accessor = Some(user_accessor);
        self.group_accessor = Some(group_accessor);
        self.provisional_user_accessor = Some(provisional_user_accessor);
        self.local_user_accessor = Some(local_user_accessor);
    }

    /// Pull the whole trustchain from genesis, verifying and applying each
    /// block in ascending index order. Needed once before a device can be
    /// created, to learn the trustchain root's hash (the `author` every
    /// first device is created under) and to catch this device's local
    /// projection up with any devices/revocations it missed.
    pub async fn sync_chain(&self) -> Result<(), Error> {
        let trustchain_id = self.trustchain_id()?;
        let mut blocks = self.requester.get_blocks(&trustchain_id, 0).await?;
        blocks.sort_by_key(|b| b.index);
        let mut guard = self.chain_state.lock().await;
        for block in &blocks {
            verify_block(block, &*guard)?;
            guard.apply_block(block);
        }
        Ok(())
    }

    pub async fn next_chain_index(&self) -> u64 {
        self.chain_state.lock().await.highest_applied_index.map_or(1, |h| h + 1)
    }

    pub async fn push_and_apply(&self, block: &Block) -> Result<(), Error> {
        self.requester.push_block(block).await?;
        let mut guard = self.chain_state.lock().await;
        verify_block(block, &*guard)?;
        guard.apply_block(block);
        Ok(())
    }
}
