//! Seed data for UI development
//!
//! Generates a deterministic set of page-load events spread over several
//! transactions and over all three score buckets, so the detail panel has
//! something to show without a real SDK sending data.

use webvitals_protocol::*;

use crate::storage::SampleStore;

/// (transaction, project slug, project id)
const TRANSACTIONS: [(&str, &str, u64); 4] = [
    ("/", "storefront", 1),
    ("/checkout", "storefront", 1),
    ("/products/:id", "storefront", 1),
    ("/dashboard", "admin-console", 2),
];

const SEED_EVENTS: usize = 48;

/// Minutes between two consecutive seed events
const SPACING_MINUTES: u64 = 25;

/// Load seed events into the store
pub fn load_seed_data(store: &SampleStore) -> u32 {
    store.ingest(generate_seed_events(Timestamp::now()))
}

/// Build the seed events, newest at `now`
pub fn generate_seed_events(now: Timestamp) -> Vec<TransactionEvent> {
    (0..SEED_EVENTS).map(|i| seed_event(i, now)).collect()
}

fn seed_event(i: usize, now: Timestamp) -> TransactionEvent {
    let (transaction, project_slug, project_id) = TRANSACTIONS[i % TRANSACTIONS.len()];

    let measurements = Measurements::from_fn(|vital| {
        let missing = match vital {
            // No user interaction, so no input delay
            WebVital::Fid => i % 4 == 3,
            WebVital::Ttfb => i % 7 == 0,
            _ => false,
        };
        (!missing).then(|| seed_value(vital, i))
    });

    let lcp = measurements.lcp.unwrap_or_default();
    let age_nanos = (i as u64) * SPACING_MINUTES * 60 * 1_000_000_000;

    TransactionEvent {
        project_id,
        sample: TransactionSample {
            id: EventId(seed_id(0x01, i)),
            replay_id: (i % 3 != 1).then(|| ReplayId(seed_id(0x02, i))),
            profile_id: (i % 2 == 0).then(|| ProfileId(seed_id(0x03, i))),
            transaction: transaction.to_string(),
            project_slug: project_slug.to_string(),
            timestamp: Timestamp(now.0.saturating_sub(age_nanos)),
            measurements,
            duration_ms: (i % 11 != 5).then_some(lcp + 400.0),
        },
    }
}

/// A value for `vital` in the good, meh or poor range, rotating per event
fn seed_value(vital: WebVital, i: usize) -> f64 {
    let vital_index = WebVital::ALL
        .iter()
        .position(|v| *v == vital)
        .unwrap_or_default();
    let jitter = ((i * 37 + vital_index * 11) % 100) as f64 / 100.0;

    let p90 = *PERFORMANCE_SCORE_P90S.get(vital);
    let median = *PERFORMANCE_SCORE_MEDIANS.get(vital);

    let value = match (i + vital_index) % 3 {
        0 => p90 * (0.4 + 0.5 * jitter),
        1 => p90 + (median - p90) * (0.1 + 0.8 * jitter),
        _ => median * (1.1 + 1.5 * jitter),
    };

    if vital.is_duration() {
        value.round()
    } else {
        (value * 1000.0).round() / 1000.0
    }
}

/// Deterministic id bytes that still look random in their short form
fn seed_id(kind: u8, i: usize) -> [u8; 16] {
    let mut bytes = [0u8; 16];
    let mixed = (i as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    bytes[..8].copy_from_slice(&mixed.to_be_bytes());
    bytes[8] = kind;
    bytes[12..].copy_from_slice(&(i as u32).to_be_bytes());
    bytes
}
