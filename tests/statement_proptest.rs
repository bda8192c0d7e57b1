use chrono::{DateTime, TimeZone, Utc};
use node_metrics::metrics::statement::{BindValue, count_statement, delete_statement, select_statement};
use node_metrics::metrics::{MetricAggregate, MetricFilter, SortDescriptor, SortField};
use proptest::prelude::*;

fn date_strategy() -> impl Strategy<Value = Option<DateTime<Utc>>> {
    prop::option::of((1_600_000_000i64..1_800_000_000).prop_map(|s| {
        Utc.timestamp_opt(s, 0).single().unwrap_or_else(Utc::now)
    }))
}

fn selector_strategy() -> impl Strategy<Value = (Option<String>, Vec<String>)> {
    prop_oneof![
        Just((None, Vec::new())),
        "x[a-z]{0,5}".prop_map(|v| (Some(v), Vec::new())),
        prop::collection::vec("x[a-z']{0,5}", 1..4).prop_map(|vs| (None, vs)),
    ]
}

fn aggregates_strategy() -> impl Strategy<Value = Vec<MetricAggregate>> {
    prop::sample::subsequence(
        vec![
            MetricAggregate::MINIMUM,
            MetricAggregate::MAXIMUM,
            MetricAggregate::AVERAGE,
            MetricAggregate::COUNT,
            MetricAggregate::SUM,
            MetricAggregate::QUANTILE_25,
            MetricAggregate::QUANTILE_75,
        ],
        0..=7,
    )
    .prop_shuffle()
}

fn sorts_strategy() -> impl Strategy<Value = Vec<SortDescriptor>> {
    let field = prop_oneof![
        Just(SortField::Timestamp),
        Just(SortField::Type),
        Just(SortField::Name),
        Just(SortField::Value),
    ];
    prop::collection::vec(
        (field, any::<bool>()).prop_map(|(field, descending)| SortDescriptor { field, descending }),
        0..3,
    )
}

prop_compose! {
    fn filter_strategy()(
        start_date in date_strategy(),
        end_date in date_strategy(),
        (metric_type, types) in selector_strategy(),
        (name, names) in selector_strategy(),
        aggregates in aggregates_strategy(),
        sorts in sorts_strategy(),
        offset in prop::option::of(0u64..1000),
        max in prop::option::of(1u64..1000),
        most_recent in any::<bool>(),
    ) -> MetricFilter {
        let most_recent = most_recent && aggregates.is_empty();
        MetricFilter {
            start_date,
            end_date,
            metric_type,
            types,
            name,
            names,
            aggregates,
            sorts,
            offset,
            max,
            most_recent,
            with_total_results_count: false,
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn select_is_deterministic(filter in filter_strategy()) {
        let a = select_statement(&filter).unwrap();
        let b = select_statement(&filter.clone()).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn placeholders_match_binds(filter in filter_strategy()) {
        let stmt = select_statement(&filter).unwrap();
        prop_assert_eq!(stmt.max_placeholder_index(), stmt.binds.len());
        for i in 1..=stmt.binds.len() {
            let placeholder = format!("?{i}");
            prop_assert!(stmt.sql.contains(&placeholder), "missing {}", placeholder);
        }

        let count = count_statement(&filter).unwrap();
        prop_assert_eq!(count.max_placeholder_index(), count.binds.len());
    }

    #[test]
    fn pagination_only_appends(filter in filter_strategy()) {
        let unpaged = MetricFilter { offset: None, max: None, ..filter.clone() };
        let base = select_statement(&unpaged).unwrap();
        let paged = select_statement(&filter).unwrap();

        prop_assert!(paged.sql.starts_with(&base.sql));
        prop_assert_eq!(&paged.binds[..base.binds.len()], &base.binds[..]);

        let tail = &paged.binds[base.binds.len()..];
        let mut expected = Vec::new();
        if let Some(offset) = filter.offset {
            expected.push(BindValue::Integer(offset as i64));
        }
        if let Some(max) = filter.max {
            expected.push(BindValue::Integer(max as i64));
        }
        prop_assert_eq!(tail, &expected[..]);
    }

    #[test]
    fn user_text_never_reaches_sql(filter in filter_strategy()) {
        let stmt = select_statement(&filter).unwrap();
        for value in filter.type_criteria().into_iter().chain(filter.name_criteria()) {
            let quoted = format!("'{value}'");
            prop_assert!(!stmt.sql.contains(&quoted));
        }
    }

    #[test]
    fn delete_binds_only_raw_criteria(filter in filter_strategy()) {
        let raw = MetricFilter {
            aggregates: Vec::new(),
            offset: None,
            max: None,
            most_recent: false,
            ..filter
        };
        let stmt = delete_statement(&raw).unwrap();
        let expected = usize::from(raw.start_date.is_some())
            + usize::from(raw.end_date.is_some())
            + raw.type_criteria().len()
            + raw.name_criteria().len();
        prop_assert_eq!(stmt.binds.len(), expected);
        prop_assert_eq!(stmt.max_placeholder_index(), expected);
    }
}
