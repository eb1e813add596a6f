//! Adaptive-bitrate variant selection.
//!
//! Stages run in a fixed order: `avoid_codecs`, then `prefer_codecs`, then
//! either `force_lowest` or `cap_kbps`. Only the avoid stage may empty the
//! pool.

use crate::params::Propagated;
use crate::playlist::Variant;

/// Apply the ABR constraints in `params` to `variants`, preserving order.
pub fn select(variants: Vec<Variant>, params: &Propagated) -> Vec<Variant> {
    let mut pool = variants;

    if !params.avoid_codecs.is_empty() {
        pool.retain(|v| !v.matches_any_codec(&params.avoid_codecs));
    }

    if !params.prefer_codecs.is_empty()
        && pool.iter().any(|v| v.matches_any_codec(&params.prefer_codecs))
    {
        pool.retain(|v| v.matches_any_codec(&params.prefer_codecs));
    }

    if params.force_lowest {
        return lowest(pool);
    }

    if let Some(cap_kbps) = params.cap_kbps {
        let limit = cap_kbps.saturating_mul(1000);
        let within_cap = |v: &Variant| v.bandwidth.is_some_and(|bw| bw <= limit);

        if pool.iter().any(within_cap) {
            pool.retain(within_cap);
        } else {
            return lowest(pool);
        }
    }

    pool
}

/// The single lowest-bandwidth variant; a missing bandwidth sorts last and
/// ties keep the first one seen.
fn lowest(pool: Vec<Variant>) -> Vec<Variant> {
    let rank = |v: &Variant| v.bandwidth.unwrap_or(u64::MAX);

    let mut best: Option<usize> = None;
    for (i, variant) in pool.iter().enumerate() {
        if best.map_or(true, |b| rank(variant) < rank(&pool[b])) {
            best = Some(i);
        }
    }

    match best {
        Some(i) => pool.into_iter().nth(i).into_iter().collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn variant(name: &str, bandwidth: Option<u64>, codecs: Option<&str>) -> Variant {
        Variant {
            info_line: format!("#EXT-X-STREAM-INF:NAME={name}"),
            extra_tags: Vec::new(),
            uri: Url::parse(&format!("http://example.com/{name}.m3u8")).unwrap(),
            bandwidth,
            codecs: codecs.map(str::to_string),
        }
    }

    fn ladder() -> Vec<Variant> {
        vec![
            variant("hd-hevc", Some(3_000_000), Some("hvc1.1.6.l93,mp4a.40.2")),
            variant("hd", Some(2_000_000), Some("avc1.64001f,mp4a.40.2")),
            variant("sd", Some(800_000), Some("avc1.4d401e,mp4a.40.2")),
            variant("unknown", None, None),
        ]
    }

    fn names(pool: &[Variant]) -> Vec<&str> {
        pool.iter()
            .map(|v| v.info_line.trim_start_matches("#EXT-X-STREAM-INF:NAME="))
            .collect()
    }

    #[test]
    fn no_constraints_keeps_everything_in_order() {
        let out = select(ladder(), &Propagated::default());
        assert_eq!(names(&out), vec!["hd-hevc", "hd", "sd", "unknown"]);
    }

    #[test]
    fn force_lowest_picks_minimum() {
        let params = Propagated {
            force_lowest: true,
            ..Default::default()
        };
        let out = select(ladder(), &params);
        assert_eq!(names(&out), vec!["sd"]);
    }

    #[test]
    fn force_lowest_ties_keep_first_seen() {
        let pool = vec![
            variant("a", Some(500), None),
            variant("b", Some(500), None),
        ];
        let params = Propagated {
            force_lowest: true,
            ..Default::default()
        };
        assert_eq!(names(&select(pool, &params)), vec!["a"]);
    }

    #[test]
    fn force_lowest_with_only_unknown_bandwidth() {
        let pool = vec![variant("x", None, None), variant("y", None, None)];
        let params = Propagated {
            force_lowest: true,
            ..Default::default()
        };
        assert_eq!(names(&select(pool, &params)), vec!["x"]);
    }

    #[test]
    fn cap_keeps_variants_at_or_below_limit() {
        let params = Propagated {
            cap_kbps: Some(2000),
            ..Default::default()
        };
        assert_eq!(names(&select(ladder(), &params)), vec!["hd", "sd"]);
    }

    #[test]
    fn cap_below_everything_falls_back_to_lowest() {
        let params = Propagated {
            cap_kbps: Some(100),
            ..Default::default()
        };
        assert_eq!(names(&select(ladder(), &params)), vec!["sd"]);
    }

    #[test]
    fn avoid_removes_matching_codecs() {
        let params = Propagated {
            avoid_codecs: vec!["hvc1".into()],
            ..Default::default()
        };
        assert_eq!(names(&select(ladder(), &params)), vec!["hd", "sd", "unknown"]);
    }

    #[test]
    fn avoid_may_empty_the_pool() {
        let pool = vec![
            variant("a", Some(1), Some("hevc")),
            variant("b", Some(2), Some("hevc,mp4a")),
        ];
        let params = Propagated {
            avoid_codecs: vec!["hevc".into()],
            force_lowest: true,
            cap_kbps: Some(1),
            prefer_codecs: vec!["avc1".into()],
            ..Default::default()
        };
        assert!(select(pool, &params).is_empty());
    }

    #[test]
    fn prefer_narrows_when_matched() {
        let params = Propagated {
            prefer_codecs: vec!["hvc1".into()],
            ..Default::default()
        };
        assert_eq!(names(&select(ladder(), &params)), vec!["hd-hevc"]);
    }

    #[test]
    fn prefer_without_match_leaves_pool() {
        let params = Propagated {
            prefer_codecs: vec!["av01".into()],
            ..Default::default()
        };
        assert_eq!(select(ladder(), &params).len(), 4);
    }

    #[test]
    fn prefer_runs_before_force_lowest() {
        let params = Propagated {
            prefer_codecs: vec!["avc1".into()],
            force_lowest: true,
            ..Default::default()
        };
        assert_eq!(names(&select(ladder(), &params)), vec!["sd"]);

        let params = Propagated {
            prefer_codecs: vec!["hvc1".into()],
            force_lowest: true,
            ..Default::default()
        };
        assert_eq!(names(&select(ladder(), &params)), vec!["hd-hevc"]);
    }
}
