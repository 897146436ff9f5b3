//! Votes and unvotes.
//!
//! A wallet votes for at most one delegate. Version 2 transactions may carry
//! an unvote followed by a vote to switch delegates in one step; the list is
//! checked and applied in order.

use ark_ledger::{attribute_paths, index_names, AttributeValue, Wallet};
use ark_types::{CoreTransactionType, PublicKey, Transaction, Vote};

use crate::handler::{credit_sender, debit_sender, require};
use crate::{HandlerContext, HandlerKey, TransactionError, TransactionHandler};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoteHandler {
    pub version: u8,
}

impl VoteHandler {
    fn max_votes(&self) -> usize {
        if self.version < 2 {
            1
        } else {
            2
        }
    }

    fn votes<'t>(&self, tx: &'t Transaction) -> Result<&'t [Vote], TransactionError> {
        let votes = require(tx.votes(), "votes")?;
        if votes.is_empty() || votes.len() > self.max_votes() {
            return Err(TransactionError::InvalidTransactionData(format!(
                "expected 1 to {} votes, got {}",
                self.max_votes(),
                votes.len()
            )));
        }
        Ok(votes)
    }
}

impl TransactionHandler for VoteHandler {
    fn key(&self) -> HandlerKey {
        HandlerKey::core(CoreTransactionType::Vote, self.version)
    }

    fn wallet_attributes(&self) -> &'static [&'static str] {
        &[attribute_paths::VOTE]
    }

    fn check_type_rules(
        &self,
        tx: &Transaction,
        sender: &Wallet,
        ctx: &HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let mut current: Option<PublicKey> = sender.vote().copied();
        for vote in self.votes(tx)? {
            match vote {
                Vote::Unvote(delegate) => {
                    match current {
                        None => return Err(TransactionError::NoVote),
                        Some(voted) if voted != *delegate => {
                            return Err(TransactionError::UnvoteMismatch)
                        }
                        Some(_) => {}
                    }
                    current = None;
                }
                Vote::Vote(delegate) => {
                    if current.is_some() {
                        return Err(TransactionError::AlreadyVoted);
                    }
                    let wallet = ctx
                        .wallets
                        .find_by_index(index_names::PUBLIC_KEYS, &delegate.to_hex())?;
                    match wallet {
                        Some(w) if w.is_resigned_delegate() => {
                            return Err(TransactionError::VotedForResignedDelegate(delegate.to_hex()))
                        }
                        Some(w) if w.is_delegate() => {}
                        _ => return Err(TransactionError::VotedForNonDelegate(delegate.to_hex())),
                    }
                    current = Some(*delegate);
                }
            }
        }
        Ok(())
    }

    fn apply_to_sender(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let votes = self.votes(tx)?;
        let address = debit_sender(self, tx, ctx, tx.amount + tx.fee)?;
        let wallet = ctx.wallets.find_by_address(&address);
        for vote in votes {
            match vote {
                Vote::Vote(delegate) => {
                    wallet.set_attribute(attribute_paths::VOTE, AttributeValue::PublicKey(*delegate))?;
                }
                Vote::Unvote(_) => {
                    wallet.forget_attribute(attribute_paths::VOTE);
                }
            }
        }
        Ok(())
    }

    fn revert_for_sender(
        &self,
        tx: &Transaction,
        ctx: &mut HandlerContext<'_>,
    ) -> Result<(), TransactionError> {
        let votes = self.votes(tx)?;
        let address = credit_sender(tx, ctx, tx.amount + tx.fee)?;
        let wallet = ctx.wallets.find_by_address(&address);
        for vote in votes.iter().rev() {
            match vote {
                Vote::Vote(_) => {
                    wallet.forget_attribute(attribute_paths::VOTE);
                }
                Vote::Unvote(delegate) => {
                    wallet.set_attribute(attribute_paths::VOTE, AttributeValue::PublicKey(*delegate))?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate_registration::DelegateRegistrationHandler;
    use crate::delegate_resignation::DelegateResignationHandler;
    use crate::test_support::{keypair, tx, Fixture};
    use ark_types::{KeyPair, TransactionAsset};

    const HANDLER: VoteHandler = VoteHandler { version: 2 };

    fn make_delegate(fx: &mut Fixture, kp: &KeyPair, name: &str) {
        fx.fund(kp, 1_000);
        let reg = tx(CoreTransactionType::DelegateRegistration, kp)
            .asset(TransactionAsset::Delegate { username: name.into() })
            .sign(kp);
        DelegateRegistrationHandler { version: 2 }.apply(&reg, &mut fx.ctx()).unwrap();
    }

    fn vote_tx(sender: &KeyPair, nonce: u64, votes: Vec<Vote>) -> Transaction {
        tx(CoreTransactionType::Vote, sender)
            .nonce(nonce)
            .asset(TransactionAsset::Votes(votes))
            .sign(sender)
    }

    #[test]
    fn vote_then_revert() {
        let mut fx = Fixture::new();
        let delegate = keypair(1);
        let voter = keypair(2);
        make_delegate(&mut fx, &delegate, "d1");
        fx.fund(&voter, 100);

        let vote = vote_tx(&voter, 1, vec![Vote::Vote(delegate.public)]);
        HANDLER.apply(&vote, &mut fx.ctx()).unwrap();
        assert_eq!(fx.wallet(&voter).vote(), Some(&delegate.public));

        HANDLER.revert(&vote, &mut fx.ctx()).unwrap();
        assert!(!fx.wallet(&voter).has_voted());
    }

    #[test]
    fn vote_errors() {
        let mut fx = Fixture::new();
        let d1 = keypair(1);
        let d2 = keypair(2);
        let voter = keypair(3);
        make_delegate(&mut fx, &d1, "d1");
        make_delegate(&mut fx, &d2, "d2");
        fx.fund(&voter, 100);

        let err = HANDLER
            .apply(&vote_tx(&voter, 1, vec![Vote::Unvote(d1.public)]), &mut fx.ctx())
            .unwrap_err();
        assert!(matches!(err, TransactionError::NoVote));

        let err = HANDLER
            .apply(&vote_tx(&voter, 1, vec![Vote::Vote(keypair(9).public)]), &mut fx.ctx())
            .unwrap_err();
        assert!(matches!(err, TransactionError::VotedForNonDelegate(_)));

        HANDLER.apply(&vote_tx(&voter, 1, vec![Vote::Vote(d1.public)]), &mut fx.ctx()).unwrap();

        let err = HANDLER
            .apply(&vote_tx(&voter, 2, vec![Vote::Vote(d2.public)]), &mut fx.ctx())
            .unwrap_err();
        assert!(matches!(err, TransactionError::AlreadyVoted));

        let err = HANDLER
            .apply(&vote_tx(&voter, 2, vec![Vote::Unvote(d2.public)]), &mut fx.ctx())
            .unwrap_err();
        assert!(matches!(err, TransactionError::UnvoteMismatch));
    }

    #[test]
    fn switch_vote_in_one_transaction() {
        let mut fx = Fixture::new();
        let d1 = keypair(1);
        let d2 = keypair(2);
        let voter = keypair(3);
        make_delegate(&mut fx, &d1, "d1");
        make_delegate(&mut fx, &d2, "d2");
        fx.fund(&voter, 100);
        HANDLER.apply(&vote_tx(&voter, 1, vec![Vote::Vote(d1.public)]), &mut fx.ctx()).unwrap();

        let switch = vote_tx(&voter, 2, vec![Vote::Unvote(d1.public), Vote::Vote(d2.public)]);
        HANDLER.apply(&switch, &mut fx.ctx()).unwrap();
        assert_eq!(fx.wallet(&voter).vote(), Some(&d2.public));

        HANDLER.revert(&switch, &mut fx.ctx()).unwrap();
        assert_eq!(fx.wallet(&voter).vote(), Some(&d1.public));
    }

    #[test]
    fn resigned_delegate_cannot_receive_votes() {
        let mut fx = Fixture::new();
        fx.milestone.active_delegates = 1;
        let d1 = keypair(1);
        let d2 = keypair(2);
        let voter = keypair(3);
        make_delegate(&mut fx, &d1, "d1");
        make_delegate(&mut fx, &d2, "d2");
        make_delegate(&mut fx, &keypair(4), "d3");
        let resign = tx(CoreTransactionType::DelegateResignation, &d1).nonce(2).sign(&d1);
        DelegateResignationHandler.apply(&resign, &mut fx.ctx()).unwrap();
        fx.fund(&voter, 100);

        let err = HANDLER
            .apply(&vote_tx(&voter, 1, vec![Vote::Vote(d1.public)]), &mut fx.ctx())
            .unwrap_err();
        assert!(matches!(err, TransactionError::VotedForResignedDelegate(_)));
    }

    #[test]
    fn v1_accepts_a_single_vote() {
        let mut fx = Fixture::new();
        let d1 = keypair(1);
        let voter = keypair(2);
        make_delegate(&mut fx, &d1, "d1");
        fx.fund(&voter, 100);
        let two = tx(CoreTransactionType::Vote, &voter)
            .version(1)
            .asset(TransactionAsset::Votes(vec![Vote::Vote(d1.public), Vote::Unvote(d1.public)]))
            .sign(&voter);
        let err = VoteHandler { version: 1 }.apply(&two, &mut fx.ctx()).unwrap_err();
        assert!(matches!(err, TransactionError::InvalidTransactionData(_)));
    }
}
