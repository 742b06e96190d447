//! Property tests for the persisted job record conversion.

use model::{JobDefinition, JobStats, RetentionPolicy, Tool};
use proptest::prelude::*;

fn tool_strategy() -> impl Strategy<Value = Tool> {
    prop_oneof![Just(Tool::Borg), Just(Tool::Restic), Just(Tool::Rsync)]
}

fn retention_strategy() -> impl Strategy<Value = RetentionPolicy> {
    (0u32..48, 0u32..31, 0u32..12, 0u32..24, 0u32..10).prop_map(
        |(keep_hourly, keep_daily, keep_weekly, keep_monthly, keep_yearly)| RetentionPolicy {
            keep_hourly,
            keep_daily,
            keep_weekly,
            keep_monthly,
            keep_yearly,
        },
    )
}

fn stats_strategy() -> impl Strategy<Value = Option<JobStats>> {
    proptest::option::of(
        (
            proptest::option::of(any::<u64>()),
            proptest::option::of(any::<u64>()),
            proptest::option::of(0u64..86_400),
        )
            .prop_map(|(bytes_processed, files_processed, duration_seconds)| JobStats {
                bytes_processed,
                files_processed,
                duration_seconds,
            }),
    )
}

prop_compose! {
    fn definition_strategy()(
        id in any::<i64>(),
        name in "[a-zA-Z0-9 _-]{1,24}",
        system_id in proptest::option::of(any::<i64>()),
        location_id in proptest::option::of(any::<i64>()),
        tool in tool_strategy(),
        source_paths in proptest::collection::vec("/[a-z0-9/ ._\"\\\\-]{0,20}", 0..5),
        schedule in proptest::option::of("[0-9*/ ]{1,16}"),
        retention in retention_strategy(),
        enabled in any::<bool>(),
        last_status in proptest::option::of("(success|failed|running)"),
        stats in stats_strategy(),
    ) -> JobDefinition {
        JobDefinition {
            id,
            name,
            system_id,
            location_id,
            tool,
            source_paths,
            schedule,
            retention,
            enabled,
            last_run: None,
            last_status,
            stats,
        }
    }
}

proptest! {
    #[test]
    fn record_round_trip_is_lossless(definition in definition_strategy()) {
        let record = definition.to_record().unwrap();
        let restored = record.to_definition().unwrap();
        prop_assert_eq!(restored, definition);
    }

    #[test]
    fn encoded_source_paths_parse_as_json_array(definition in definition_strategy()) {
        let record = definition.to_record().unwrap();
        let paths: Vec<String> = serde_json::from_str(&record.source_paths).unwrap();
        prop_assert_eq!(paths, definition.source_paths);
    }
}
