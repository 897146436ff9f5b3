use proptest::prelude::*;

use ark_types::{calculate_round, Amount, Balance, Milestone, Milestones, Slots};

fn milestones(delegates: &[(u64, u32)]) -> Milestones {
    Milestones::new(
        delegates
            .iter()
            .map(|&(height, active_delegates)| Milestone {
                height,
                blocktime: 8,
                active_delegates,
                reward: Amount::ZERO,
                aip11: true,
                max_transactions: 150,
            })
            .collect(),
    )
    .unwrap()
}

proptest! {
    /// Crediting then debiting the same amount restores the balance.
    #[test]
    fn balance_credit_debit_inverse(start in any::<i64>(), amount in any::<u64>()) {
        let mut balance = Balance::new(i128::from(start));
        balance += Amount::new(amount);
        balance -= Amount::new(amount);
        prop_assert_eq!(balance, Balance::new(i128::from(start)));
    }

    /// Every height lies inside the round reported for it.
    #[test]
    fn height_within_its_round(height in 1u64..1_000_000, delegates in 1u32..200) {
        let ms = milestones(&[(1, delegates)]);
        let info = calculate_round(height, &ms);
        prop_assert!(info.round_height <= height);
        prop_assert!(height < info.round_height + u64::from(info.max_delegates));
        prop_assert_eq!(info.round, (height - 1) / u64::from(delegates) + 1);
    }

    /// Rounds never decrease as the height grows, even across delegate-count changes.
    #[test]
    fn rounds_are_monotonic(height in 1u64..10_000, change in 2u64..5_000, a in 1u32..60, b in 1u32..60) {
        let ms = milestones(&[(1, a), (change, b)]);
        let here = calculate_round(height, &ms);
        let next = calculate_round(height + 1, &ms);
        prop_assert!(next.round == here.round || next.round == here.round + 1);
        if next.round == here.round + 1 {
            prop_assert_eq!(next.round_height, height + 1);
        }
    }

    /// The milestone active at a height never starts above it.
    #[test]
    fn milestone_lookup_not_in_future(height in 1u64..100_000, change in 2u64..100_000) {
        let ms = milestones(&[(1, 51), (change, 53)]);
        let active = ms.at(height);
        prop_assert!(active.height <= height);
        prop_assert_eq!(active.height == change, height >= change);
    }

    /// Slot numbers are non-decreasing in the timestamp.
    #[test]
    fn slot_number_monotonic(t in 0u32..u32::MAX - 1) {
        let slots = Slots::new(0, milestones(&[(1, 51)]));
        prop_assert!(slots.slot_number(t, 1) <= slots.slot_number(t + 1, 1));
    }

    /// Time until the next slot is positive and at most one slot long.
    #[test]
    fn time_left_bounded(now in 0u64..10_000_000_000) {
        let slots = Slots::new(0, milestones(&[(1, 51)]));
        let left = slots.time_until_next_slot_ms(now, 1);
        prop_assert!(left > 0);
        prop_assert!(left <= 8_000);
    }
}
