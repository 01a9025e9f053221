//! Reward bounds. Defaults follow the protocol constants; operators can
//! override any of them.

use postfiat_config::{DEFAULT_DAILY_REWARD_LIMIT, MAX_REWARD_AMOUNT, MIN_REWARD_AMOUNT};

#[derive(Debug, Clone, Copy)]
pub struct RewardPolicy {
    pub min_reward: u64,
    pub max_reward: u64,
    /// Per-user ceiling over a trailing 24 hours.
    pub daily_limit: u64,
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self {
            min_reward: MIN_REWARD_AMOUNT,
            max_reward: MAX_REWARD_AMOUNT,
            daily_limit: DEFAULT_DAILY_REWARD_LIMIT,
        }
    }
}

impl RewardPolicy {
    /// Clamp a judged reward into
    /// `[min, min(max, proposed, daily_remaining)]`.
    pub fn clamp(&self, judged: i64, proposed: Option<u64>, daily_spent: f64) -> u64 {
        let daily_remaining = self
            .daily_limit
            .saturating_sub(daily_spent.max(0.0) as u64);
        let ceiling = self
            .max_reward
            .min(proposed.unwrap_or(self.max_reward))
            .min(daily_remaining)
            .max(self.min_reward);
        (judged.unsigned_abs()).clamp(self.min_reward, ceiling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_to_proposed_and_global_bounds() {
        let policy = RewardPolicy::default();
        assert_eq!(policy.clamp(45, Some(60), 0.0), 45);
        assert_eq!(policy.clamp(90, Some(60), 0.0), 60);
        assert_eq!(policy.clamp(5000, None, 0.0), 1200);
        assert_eq!(policy.clamp(0, Some(60), 0.0), 1);
        assert_eq!(policy.clamp(-45, Some(60), 0.0), 45);
    }

    #[test]
    fn daily_budget_caps_the_ceiling() {
        let policy = RewardPolicy {
            daily_limit: 100,
            ..Default::default()
        };
        assert_eq!(policy.clamp(80, Some(90), 50.0), 50);
        // Exhausted budget still pays the floor, never more.
        assert_eq!(policy.clamp(80, Some(90), 100.0), 1);
    }
}
