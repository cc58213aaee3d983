//! Synthetic customer population for demos and load tests.
//!
//! Each customer is drawn from one behaviour segment. Segment shares and
//! field ranges are fixed here; the seed alone decides the population.

use crate::{rng::SeededRng, snapshot::CustomerSnapshot, types::CustomerId};
use serde::{Deserialize, Serialize};

const POPULATION_STREAM: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Segment {
    SteadyEarner,
    IncomeShock,
    CashHeavy,
    ExpenseCompressed,
    HighVelocity,
    Dormant,
}

/// (segment, population share). Shares sum to 1.0.
const SEGMENT_SHARES: [(Segment, f64); 6] = [
    (Segment::SteadyEarner, 0.50),
    (Segment::IncomeShock, 0.12),
    (Segment::CashHeavy, 0.12),
    (Segment::ExpenseCompressed, 0.12),
    (Segment::HighVelocity, 0.08),
    (Segment::Dormant, 0.06),
];

#[derive(Debug, Clone, PartialEq)]
pub struct DemoCustomer {
    pub customer_id: CustomerId,
    pub segment: Segment,
    pub snapshot: CustomerSnapshot,
}

/// Generate `count` customers with ids `c-000000`, `c-000001`, ...
pub fn generate(seed: u64, count: usize) -> Vec<DemoCustomer> {
    let mut rng = SeededRng::new(seed, POPULATION_STREAM);
    (0..count)
        .map(|i| {
            let segment = pick_segment(&mut rng);
            DemoCustomer {
                customer_id: format!("c-{i:06}"),
                segment,
                snapshot: draw_snapshot(segment, &mut rng),
            }
        })
        .collect()
}

fn pick_segment(rng: &mut SeededRng) -> Segment {
    let roll = rng.next_f64();
    let mut cumulative = 0.0;
    for (segment, share) in SEGMENT_SHARES {
        cumulative += share;
        if roll < cumulative {
            return segment;
        }
    }
    Segment::SteadyEarner
}

fn draw_snapshot(segment: Segment, rng: &mut SeededRng) -> CustomerSnapshot {
    let (salary_count, txn_count, withdrawals, essential, discretionary) = match segment {
        Segment::SteadyEarner => {
            let essential = rng.range_f64(2_000.0, 6_000.0);
            (
                rng.range_u64(2, 3),
                rng.range_u64(10, 40),
                rng.range_u64(0, 4),
                essential,
                essential * rng.range_f64(1.0, 1.8),
            )
        }
        Segment::IncomeShock => {
            let essential = rng.range_f64(1_500.0, 5_000.0);
            (
                0,
                rng.range_u64(3, 30),
                rng.range_u64(0, 8),
                essential,
                essential * rng.range_f64(0.6, 1.4),
            )
        }
        Segment::CashHeavy => {
            let essential = rng.range_f64(1_000.0, 4_000.0);
            (
                rng.range_u64(1, 2),
                rng.range_u64(10, 35),
                rng.range_u64(6, 16),
                essential,
                essential * rng.range_f64(0.8, 1.5),
            )
        }
        Segment::ExpenseCompressed => {
            let essential = rng.range_f64(5_000.0, 12_000.0);
            // A slice of this segment has cut discretionary spend entirely.
            let discretionary = if rng.chance(0.25) {
                0.0
            } else {
                essential / rng.range_f64(1.2, 5.0)
            };
            (rng.range_u64(1, 2), rng.range_u64(5, 25), rng.range_u64(0, 6), essential, discretionary)
        }
        Segment::HighVelocity => {
            let essential = rng.range_f64(5_500.0, 9_000.0);
            (
                1,
                rng.range_u64(51, 90),
                rng.range_u64(2, 8),
                essential,
                essential * rng.range_f64(0.9, 1.6),
            )
        }
        Segment::Dormant => (0, rng.range_u64(0, 2), 0, rng.range_f64(0.0, 300.0), 0.0),
    };

    let essential = cents(essential);
    let discretionary = cents(discretionary);
    let last_salary_ts = if salary_count > 0 {
        format!(
            "2024-{:02}-{:02} 09:00:00",
            rng.range_u64(1, 12),
            rng.range_u64(1, 28)
        )
    } else {
        String::new()
    };

    CustomerSnapshot {
        txn_count,
        withdrawals,
        salary_count,
        total_spend: cents(essential + discretionary),
        essential_spend: essential,
        discretionary_spend: discretionary,
        last_salary_ts,
    }
}

fn cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
