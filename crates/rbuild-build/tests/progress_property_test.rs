//! Property-based tests for overall progress monotonicity

use proptest::prelude::*;
use rbuild_build::{Dialect, Policy, ProgressEvent, ProgressRange, RangeCompositor};
use tokio::sync::mpsc;

/// Contiguous, non-overlapping ranges covering [0, 100]
fn arb_ranges() -> impl Strategy<Value = Vec<ProgressRange>> {
    prop::collection::vec(0.0f64..100.0, 0..6).prop_map(|mut cuts| {
        cuts.sort_by(|a, b| a.total_cmp(b));
        let mut bounds = vec![0.0];
        bounds.extend(cuts);
        bounds.push(100.0);
        bounds.windows(2).map(|w| ProgressRange::new(w[0], w[1])).collect()
    })
}

/// Output of a well-behaved ninja run: counters never go backwards
fn arb_ninja_output() -> impl Strategy<Value = Vec<String>> {
    (1u32..200, prop::collection::vec(0u32..200, 0..30), prop::collection::vec(any::<bool>(), 0..30))
        .prop_map(|(total, mut done, noise)| {
            done.sort_unstable();
            let mut lines = Vec::new();
            for (i, d) in done.into_iter().enumerate() {
                if noise.get(i).copied().unwrap_or(false) {
                    lines.push("ninja: entering directory".to_string());
                }
                lines.push(format!("[{}/{}] CXX file{}.cc", d.min(total), total, i));
            }
            lines
        })
}

fn arb_make_output() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(0u32..=100, 0..30).prop_map(|mut percents| {
        percents.sort_unstable();
        percents.into_iter().map(|p| format!("[{p:3}%] Building CXX object")).collect()
    })
}

proptest! {
    #[test]
    fn overall_progress_never_decreases(
        ranges in arb_ranges(),
        outputs in prop::collection::vec(prop_oneof![
            arb_ninja_output().prop_map(|l| (Dialect::Ninja, l)),
            arb_make_output().prop_map(|l| (Dialect::Make, l)),
            prop::collection::vec("[a-z ]{0,20}", 0..120).prop_map(|l| (Dialect::Configure, l)),
            prop::collection::vec("[a-z ]{0,20}", 0..10).prop_map(|l| (Dialect::Passthrough, l)),
        ], 7),
    ) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut compositor = RangeCompositor::new(tx);

        for (range, (dialect, lines)) in ranges.iter().zip(outputs) {
            compositor.enter(*range, "stage");
            let mut policy = Policy::new(dialect);
            for line in lines {
                if let Some(update) = policy.process(ProgressEvent::output(line)) {
                    compositor.on_policy_update(update);
                }
            }
        }
        drop(compositor);

        let mut previous = 0.0f64;
        while let Ok(status) = rx.try_recv() {
            prop_assert!(status.progress >= previous - 1e-9, "{} < {}", status.progress, previous);
            prop_assert!((0.0..=100.0 + 1e-9).contains(&status.progress));
            previous = status.progress;
        }
    }

    #[test]
    fn scaled_progress_stays_in_range(min in 0.0f64..100.0, width in 0.0f64..100.0, local in 0.0f64..=100.0) {
        let range = ProgressRange::new(min, (min + width).min(100.0));
        let scaled = range.scale(local);
        prop_assert!(scaled >= range.min() - 1e-9);
        prop_assert!(scaled <= range.max() + 1e-9);
    }
}
