#![no_main]

use chrono::Utc;
use libfuzzer_sys::fuzz_target;
use mtrack_core::aggregate::Aggregator;
use mtrack_core::input::IntervalTable;
use mtrack_core::model::{IntervalRecord, ResolvedRow};
use mtrack_core::resolve::{OverlapPolicy, Resolver};

fn resolve(sequence: Vec<IntervalRecord>, policy: OverlapPolicy) -> Vec<ResolvedRow> {
    let mut aggregator = Aggregator::new(Vec::new());
    for row in Resolver::with_policy(sequence, Utc, policy) {
        let Ok(row) = row else { break };
        assert!(!row.x.is_empty() && !row.y.is_empty());
        let Ok(()) = aggregator.observe(row);
    }
    let Ok(rows) = aggregator.finish();
    assert!(rows.windows(2).all(|w| w[0].key() != w[1].key()));
    rows
}

fuzz_target!(|data: &[u8]| {
    let Ok(table) = IntervalTable::from_reader(data, &Utc, "fuzz.csv") else {
        return;
    };

    for policy in [OverlapPolicy::Reject, OverlapPolicy::Allow] {
        resolve(table.all(), policy);

        for id in table.ids() {
            let rows = resolve(table.by_id(id), policy);
            assert!(rows.iter().all(|row| &row.machine_id == id));
        }
    }
});
