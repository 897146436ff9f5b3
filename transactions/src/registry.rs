//! Handler registry keyed by `(type group, type, version)`.

use std::collections::BTreeMap;

use ark_ledger::AttributeSchema;
use ark_types::{Milestone, Transaction};

use crate::{Handler, HandlerKey, TransactionError, TransactionHandler};

#[derive(Clone, Debug, Default)]
pub struct TransactionHandlerRegistry {
    handlers: BTreeMap<HandlerKey, Handler>,
}

impl TransactionHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every core handler.
    pub fn with_core_handlers() -> Result<Self, TransactionError> {
        let mut registry = Self::new();
        for handler in Handler::core_handlers() {
            registry.register(handler)?;
        }
        Ok(registry)
    }

    /// Register `handler`. Its dependencies must already be registered.
    pub fn register(&mut self, handler: Handler) -> Result<(), TransactionError> {
        let key = handler.key();
        if self.handlers.contains_key(&key) {
            return Err(TransactionError::DuplicateHandler(key));
        }
        if let Some(dependency) = handler
            .dependencies()
            .into_iter()
            .find(|dependency| !self.handlers.contains_key(dependency))
        {
            return Err(TransactionError::MissingDependency { handler: key, dependency });
        }
        tracing::debug!(handler = %key, "registered transaction handler");
        self.handlers.insert(key, handler);
        Ok(())
    }

    pub fn registered_handlers(&self) -> impl Iterator<Item = &Handler> {
        self.handlers.values()
    }

    pub fn get_registered_handler_by_type(
        &self,
        type_group: u32,
        transaction_type: u16,
        version: u8,
    ) -> Result<&Handler, TransactionError> {
        let key = HandlerKey::new(type_group, transaction_type, version);
        self.handlers.get(&key).ok_or(TransactionError::InvalidTransactionType(key))
    }

    pub fn get_activated_handlers<'a>(
        &'a self,
        milestone: &'a Milestone,
    ) -> impl Iterator<Item = &'a Handler> + 'a {
        self.handlers.values().filter(move |handler| handler.is_activated(milestone))
    }

    /// The handler for a type, provided it is active under `milestone`.
    pub fn get_activated_handler_by_type(
        &self,
        type_group: u32,
        transaction_type: u16,
        version: u8,
        milestone: &Milestone,
    ) -> Result<&Handler, TransactionError> {
        let handler = self.get_registered_handler_by_type(type_group, transaction_type, version)?;
        if !handler.is_activated(milestone) {
            return Err(TransactionError::DeactivatedTransactionHandler(handler.key()));
        }
        Ok(handler)
    }

    pub fn get_activated_handler_for_data(
        &self,
        tx: &Transaction,
        milestone: &Milestone,
    ) -> Result<&Handler, TransactionError> {
        let key = HandlerKey::of(tx);
        self.get_activated_handler_by_type(key.type_group, key.transaction_type, key.version, milestone)
    }

    /// Every wallet attribute the registered handlers use. Several versions
    /// of one handler share their attributes.
    pub fn attribute_schema(&self) -> AttributeSchema {
        let mut schema = AttributeSchema::new();
        for path in self.handlers.values().flat_map(|handler| handler.wallet_attributes()) {
            if !schema.contains(path) {
                // Only fails on duplicates, which the check above rules out.
                let _ = schema.register(*path);
            }
        }
        schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::htlc_claim::HtlcClaimHandler;
    use crate::transfer::TransferHandler;
    use ark_ledger::attribute_paths;
    use ark_types::{CoreTransactionType, Milestones, CORE_TYPE_GROUP};

    fn milestone(aip11: bool) -> Milestone {
        let mut milestone = Milestones::default().at(1).clone();
        milestone.aip11 = aip11;
        milestone
    }

    #[test]
    fn core_handlers_register() {
        let registry = TransactionHandlerRegistry::with_core_handlers().unwrap();
        assert_eq!(registry.registered_handlers().count(), 16);

        let transfer = registry
            .get_registered_handler_by_type(CORE_TYPE_GROUP, CoreTransactionType::Transfer.as_u16(), 2)
            .unwrap();
        assert_eq!(*transfer, Handler::Transfer(TransferHandler { version: 2 }));
    }

    #[test]
    fn duplicate_rejected() {
        let mut registry = TransactionHandlerRegistry::new();
        registry.register(Handler::Transfer(TransferHandler { version: 2 })).unwrap();
        let err = registry.register(Handler::Transfer(TransferHandler { version: 2 })).unwrap_err();
        assert!(matches!(err, TransactionError::DuplicateHandler(_)));
    }

    #[test]
    fn dependency_must_come_first() {
        let mut registry = TransactionHandlerRegistry::new();
        let err = registry.register(Handler::HtlcClaim(HtlcClaimHandler)).unwrap_err();
        match err {
            TransactionError::MissingDependency { handler, dependency } => {
                assert_eq!(handler, HandlerKey::core(CoreTransactionType::HtlcClaim, 2));
                assert_eq!(dependency, HandlerKey::core(CoreTransactionType::HtlcLock, 2));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn activation_follows_aip11() {
        let registry = TransactionHandlerRegistry::with_core_handlers().unwrap();
        let before = milestone(false);
        let after = milestone(true);

        // Before AIP11 only version 1 handlers and the legacy multi-signature are live.
        assert!(registry.get_activated_handlers(&before).all(|h| h.key().version == 1));
        assert_eq!(registry.get_activated_handlers(&after).count(), 15);

        let ipfs = CoreTransactionType::Ipfs.as_u16();
        let err = registry
            .get_activated_handler_by_type(CORE_TYPE_GROUP, ipfs, 2, &before)
            .unwrap_err();
        assert!(matches!(err, TransactionError::DeactivatedTransactionHandler(_)));
        assert!(registry.get_activated_handler_by_type(CORE_TYPE_GROUP, ipfs, 2, &after).is_ok());

        let legacy = CoreTransactionType::MultiSignature.as_u16();
        assert!(registry.get_activated_handler_by_type(CORE_TYPE_GROUP, legacy, 1, &before).is_ok());
        assert!(registry.get_activated_handler_by_type(CORE_TYPE_GROUP, legacy, 1, &after).is_err());
    }

    #[test]
    fn unknown_type_rejected() {
        let registry = TransactionHandlerRegistry::with_core_handlers().unwrap();
        let err = registry.get_registered_handler_by_type(2, 0, 2).unwrap_err();
        assert!(matches!(err, TransactionError::InvalidTransactionType(_)));
    }

    #[test]
    fn schema_collects_attributes() {
        let schema = TransactionHandlerRegistry::with_core_handlers().unwrap().attribute_schema();
        assert!(schema.contains(attribute_paths::DELEGATE_USERNAME));
        assert!(schema.contains(attribute_paths::HTLC_LOCKED_BALANCE));
        assert!(schema.contains(attribute_paths::VOTE));
    }
}
