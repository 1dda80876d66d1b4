//! The configured source roster: which sources feed the panel and what
//! weekly columns each one produces.

use showpulse_aggregate::{AggregateOp, OutputColumn, SourceSpec};

fn sum(name: &str, metric: &str) -> OutputColumn {
    OutputColumn::new(
        name,
        AggregateOp::Sum {
            metric: metric.to_owned(),
        },
    )
}

/// All sources the pipeline knows about.
#[must_use]
pub(crate) fn default_source_specs() -> Vec<SourceSpec> {
    vec![
        SourceSpec::new(
            "tiktok",
            vec![
                OutputColumn::new("tt_posts", AggregateOp::Count),
                sum("tt_sum_views", "views"),
                sum("tt_sum_likes", "likes"),
                sum("tt_sum_comments", "comments"),
                sum("tt_sum_shares", "shares"),
                OutputColumn::new("tt_posting_days", AggregateOp::DistinctDays),
            ],
        ),
        SourceSpec::new(
            "instagram",
            vec![
                OutputColumn::new("ig_posts", AggregateOp::Count),
                sum("ig_sum_likes", "likes"),
                sum("ig_sum_comments", "comments"),
                OutputColumn::new("ig_posting_days", AggregateOp::DistinctDays),
            ],
        ),
        SourceSpec::new(
            "trends",
            vec![OutputColumn::new(
                "gt_index",
                AggregateOp::Mean {
                    metric: "interest".to_owned(),
                },
            )],
        ),
        SourceSpec::new(
            "wikipedia",
            vec![sum("wp_pageviews", "pageviews")],
        ),
    ]
}

pub(crate) fn find_source_spec(name: &str) -> Option<SourceSpec> {
    default_source_specs().into_iter().find(|s| s.source == name)
}

/// Panel columns worth deriving model features from. Count-style columns are
/// left out; volume and interest metrics carry the signal.
#[must_use]
pub(crate) fn feature_base_metrics() -> Vec<String> {
    vec![
        "tt_sum_views".to_owned(),
        "tt_sum_likes".to_owned(),
        "ig_sum_likes".to_owned(),
        "gt_index".to_owned(),
        "wp_pageviews".to_owned(),
    ]
}
