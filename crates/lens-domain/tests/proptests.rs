use lens_domain::services::listing::{classify_listing, ListingPolicy, ListingStatus};
use lens_domain::services::reaction::ReactionEngine;
use lens_domain::services::series::{reconcile, CandleBatch};
use lens_domain::value_objects::candle::Candle;
use lens_domain::value_objects::fingerprint::RequestFingerprint;
use lens_domain::value_objects::reaction::{DataSufficiency, Horizon};
use proptest::prelude::*;
use std::collections::BTreeMap;

const T: i64 = 1_700_000_040;

fn batches_strategy() -> impl Strategy<Value = Vec<CandleBatch>> {
    prop::collection::vec(
        (
            0i64..5,
            prop::collection::vec((-150i64..300, 0.01f64..1_000.0), 0..60),
        ),
        1..6,
    )
    .prop_map(|raw| {
        raw.into_iter()
            .enumerate()
            .map(|(sequence, (fetched_at, points))| CandleBatch {
                fetched_at,
                sequence,
                candles: points
                    .into_iter()
                    .map(|(minute, close)| Candle::new(T + minute * 60 + 7, close))
                    .collect(),
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn reconciled_open_times_strictly_increase(batches in batches_strategy()) {
        let (series, report) = reconcile("PEPE_USDT", T - 7200, T + 14_400, batches);
        prop_assert!(series
            .candles()
            .windows(2)
            .all(|w| w[0].open_time < w[1].open_time));
        prop_assert!(series.candles().iter().all(|c| c.open_time % 60 == 0));
        prop_assert_eq!(
            report.input,
            series.len() + report.duplicates + report.out_of_window + report.invalid_close
        );
    }

    #[test]
    fn reaction_is_deterministic_and_consistent(batches in batches_strategy()) {
        let (series, _) = reconcile("PEPE_USDT", T - 7200, T + 14_400, batches);
        let horizons: Vec<Horizon> = [5, 15, 60, 240]
            .into_iter()
            .filter_map(|m| Horizon::from_minutes(m).ok())
            .collect();
        let engine = ReactionEngine::default();
        let first = engine.compute(&series, T, &horizons);
        let second = engine.compute(&series, T, &horizons);
        prop_assert_eq!(&first, &second);

        if let Ok(record) = first {
            prop_assert!(record.baseline_price() > 0.0);
            prop_assert!(record.baseline.time <= T);
            let present = record.horizons.iter().filter(|h| h.value.is_some()).count();
            prop_assert!(present > 0);
            prop_assert_eq!(
                record.sufficiency == DataSufficiency::Complete,
                present == horizons.len()
            );
        }
    }

    #[test]
    fn listing_ignores_candles_after_the_boundary(
        batches in batches_strategy(),
        extra in prop::collection::vec(0i64..240, 0..20),
    ) {
        let (series, _) = reconcile("PEPE_USDT", T - 7200, T + 14_400, batches.clone());
        let mut padded = batches;
        padded.push(CandleBatch {
            fetched_at: 10,
            sequence: 99,
            candles: extra.into_iter().map(|m| Candle::new(T + m * 60, 1.0)).collect(),
        });
        let (wider, _) = reconcile("PEPE_USDT", T - 7200, T + 14_400, padded);
        let policy = ListingPolicy::default();
        let before = classify_listing(&series, T, &policy);
        let after = classify_listing(&wider, T, &policy);
        prop_assert_eq!(before, after);
        prop_assert!(matches!(
            before,
            ListingStatus::Tradable | ListingStatus::NotYetListed | ListingStatus::Indeterminate
        ));
    }

    #[test]
    fn fingerprint_ignores_padding_and_trailing_slash(
        params in prop::collection::btree_map("[a-z]{1,6}", "[a-zA-Z0-9_]{0,8}", 0..6),
    ) {
        let padded: BTreeMap<String, String> = params
            .iter()
            .map(|(k, v)| (k.clone(), format!(" {v} ")))
            .collect();
        prop_assert_eq!(
            RequestFingerprint::compute("https://x/api/kline", &params),
            RequestFingerprint::compute("https://x/api/kline/", &padded)
        );
    }
}
