//! epoch rewards
//!
//! half of the pool is shared equally, the other half in proportion to
//! `ceiling - slash_points` among members that scored votes during the
//! epoch and stay below the ceiling.

use tracing::{info, warn};
use warden_primitives::{params, Address, Balance, BlockNumber, ParameterStore, Treasury, TssManager};

use crate::error::Result;
use crate::types::{MaintainerEvent, RewardOutcome, RewardReport};
use crate::MaintainerRegistry;

/// weight of a member in the proportional half
///
/// a member that scored nothing this epoch takes the equal share only.
pub fn reward_weight(slash_points: u128, score: u128, ceiling: u128) -> u128 {
    if score == 0 {
        0
    } else {
        ceiling.saturating_sub(slash_points)
    }
}

/// per-member shares of `total`; members are `(account, weight)`
///
/// shares never sum above `total`. with every weight at zero the whole
/// pool is split equally.
pub fn split_reward(total: Balance, members: &[(Address, u128)]) -> Vec<(Address, Balance)> {
    if members.is_empty() {
        return Vec::new();
    }
    let n = members.len() as u128;
    let weight_sum = members.iter().fold(0u128, |acc, (_, w)| acc.saturating_add(*w));

    if weight_sum == 0 {
        let each = total / n;
        return members.iter().map(|(a, _)| (*a, each)).collect();
    }

    let equal = (total / 2) / n;
    let proportional_pool = total - total / 2;
    members
        .iter()
        .map(|(account, w)| (*account, equal + mul_div(proportional_pool, *w, weight_sum)))
        .collect()
}

/// floor(a * b / c) for b <= c, without overflowing u128
fn mul_div(a: u128, b: u128, c: u128) -> u128 {
    match a.checked_mul(b) {
        Some(p) => p / c,
        None => (a / c) * b + (a % c).saturating_mul(b) / c,
    }
}

impl MaintainerRegistry {
    /// pay the next unpaid epoch once its hand-off has finished
    pub fn distribute_reward<P, Tr, T>(
        &mut self,
        params: &P,
        treasury: &mut Tr,
        tss: &T,
    ) -> Result<RewardOutcome>
    where
        P: ParameterStore + ?Sized,
        Tr: Treasury + ?Sized,
        T: TssManager + ?Sized,
    {
        let epoch_id = self.state.reward_epoch + 1;
        let Some(epoch) = self.epochs.get(&epoch_id) else {
            return Ok(RewardOutcome::NotReady);
        };
        if epoch.migrated_block == 0 {
            return Ok(RewardOutcome::NotReady);
        }

        let served: BlockNumber = epoch.end_block.saturating_sub(epoch.start_block);
        let total = (served as u128).saturating_mul(params.get_by_name(params::REWARD_PER_BLOCK));
        let ceiling = params.get_by_name(params::ADDITIONAL_REWARD_MAX_SLASH_POINT);
        let scores = self.scores.get(&epoch_id);
        let members: Vec<(Address, u128)> = epoch
            .maintainers
            .iter()
            .map(|a| {
                let score = scores.and_then(|s| s.per_member.get(a)).copied().unwrap_or(0);
                (*a, reward_weight(tss.slash_point(a), score, ceiling))
            })
            .collect();

        let shares = split_reward(total, &members);
        let remainder = total - shares.iter().map(|(_, a)| *a).sum::<Balance>();

        let mut paid: Balance = 0;
        let mut failed = Vec::new();
        for (account, amount) in shares {
            if amount == 0 {
                continue;
            }
            match treasury.transfer(&account, amount) {
                Ok(()) => {
                    paid += amount;
                    self.events.push(MaintainerEvent::RewardPaid { epoch_id, account, amount });
                }
                Err(e) => {
                    warn!(epoch_id, %account, amount, error = %e, "reward transfer failed");
                    failed.push(account);
                    self.events.push(MaintainerEvent::RewardFailed {
                        epoch_id,
                        account,
                        amount,
                        reason: e.reason,
                    });
                }
            }
        }

        self.state.reward_epoch = epoch_id;
        info!(epoch_id, total, paid, failed = failed.len(), "epoch reward distributed");
        self.events.push(MaintainerEvent::RewardDistributed { epoch_id, total, paid, remainder });
        Ok(RewardOutcome::Paid(RewardReport { epoch_id, total, paid, failed, remainder }))
    }
}
