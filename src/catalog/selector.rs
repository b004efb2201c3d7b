// src/catalog/selector.rs
use std::cmp::Ordering;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, info};

use super::{ImageryCatalog, SceneCandidate, SceneQuery};
use crate::error::Result;
use crate::geometry::BoundingBox;

/// Result of a scene search. Finding nothing is an ordinary outcome.
#[derive(Clone, Debug, PartialEq)]
pub enum SceneSelection {
    Selected(SceneCandidate),
    NoneFound,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SelectionParams {
    pub target_date: NaiveDate,
    pub max_cloud_cover: f64,
    pub lookback_days: u32,
}

/// Midnight UTC at the start of `date`.
pub fn target_instant(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

/// Query the catalog over `[target - lookback, target]` and keep the
/// acquisition closest to the target instant.
pub fn select_scene(
    catalog: &dyn ImageryCatalog,
    bbox: &BoundingBox,
    params: &SelectionParams,
) -> Result<SceneSelection> {
    let target = target_instant(params.target_date);
    let query = SceneQuery {
        bbox: *bbox,
        start: target - Duration::days(i64::from(params.lookback_days)),
        end: target,
        max_cloud_cover: params.max_cloud_cover,
    };
    info!(
        "Searching scenes over {} in {} (cloud cover < {}%)",
        bbox,
        query.datetime_interval(),
        params.max_cloud_cover
    );

    let candidates = catalog.search(&query)?;
    debug!("Catalog returned {} candidates", candidates.len());

    let usable: Vec<SceneCandidate> = candidates
        .into_iter()
        .filter(|c| {
            let keep = c.acquired >= query.start && c.acquired <= query.end;
            if !keep {
                debug!("Dropping {}: acquired {} outside the search window", c.id, c.acquired);
            }
            keep
        })
        // candidates without a footprint are trusted to cover the query
        .filter(|c| match &c.footprint {
            Some(footprint) if !footprint.intersects(bbox) => {
                debug!("Dropping {}: footprint {} misses {}", c.id, footprint, bbox);
                false
            }
            _ => true,
        })
        .collect();

    Ok(match closest_candidate(usable, target, params.max_cloud_cover) {
        Some(scene) => {
            info!(
                "Selected scene {} acquired {} ({:.1}% cloud)",
                scene.id, scene.acquired, scene.cloud_cover
            );
            SceneSelection::Selected(scene)
        }
        None => {
            info!("No scene found for {}", params.target_date);
            SceneSelection::NoneFound
        }
    })
}

fn compare_candidates(a: &SceneCandidate, b: &SceneCandidate, target: DateTime<Utc>) -> Ordering {
    let distance = |c: &SceneCandidate| (c.acquired - target).num_milliseconds().abs();
    distance(a)
        .cmp(&distance(b))
        .then_with(|| a.cloud_cover.total_cmp(&b.cloud_cover))
        // later acquisition first
        .then_with(|| b.acquired.cmp(&a.acquired))
        .then_with(|| a.id.cmp(&b.id))
}

/// Pick the candidate closest in time to `target`.
///
/// Candidates at or above `max_cloud_cover` are discarded regardless of what
/// the catalog query promised. Ties go to lower cloud cover, then the later
/// acquisition, then the smaller id, so the choice never depends on the order
/// the catalog returned.
pub fn closest_candidate(
    candidates: Vec<SceneCandidate>,
    target: DateTime<Utc>,
    max_cloud_cover: f64,
) -> Option<SceneCandidate> {
    candidates
        .into_iter()
        .filter(|c| {
            let clear = c.cloud_cover < max_cloud_cover;
            if !clear {
                debug!("Dropping {}: cloud cover {:.1}% >= {}%", c.id, c.cloud_cover, max_cloud_cover);
            }
            clear
        })
        .min_by(|a, b| compare_candidates(a, b, target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn candidate(id: &str, days_before: i64, cloud: f64, target: DateTime<Utc>) -> SceneCandidate {
        SceneCandidate {
            id: id.to_string(),
            acquired: target - Duration::days(days_before),
            cloud_cover: cloud,
            assets: BTreeMap::new(),
            footprint: None,
        }
    }

    fn target() -> DateTime<Utc> {
        target_instant(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
    }

    #[test]
    fn target_is_midnight_utc() {
        assert_eq!(target().to_rfc3339(), "2024-06-01T00:00:00+00:00");
    }

    #[test]
    fn closest_acquisition_wins() {
        let t = target();
        let picked = closest_candidate(
            vec![candidate("a", 10, 3.0, t), candidate("b", 2, 9.0, t), candidate("c", 40, 1.0, t)],
            t,
            15.0,
        )
        .unwrap();
        assert_eq!(picked.id, "b");
    }

    #[test]
    fn cloud_threshold_is_reapplied() {
        let t = target();
        let picked = closest_candidate(
            vec![candidate("cloudy", 1, 15.0, t), candidate("clear", 5, 14.9, t)],
            t,
            15.0,
        )
        .unwrap();
        assert_eq!(picked.id, "clear");
    }

    #[test]
    fn ties_prefer_lower_cloud_then_smaller_id() {
        let t = target();
        let picked = closest_candidate(
            vec![candidate("z", 3, 4.0, t), candidate("y", 3, 2.0, t), candidate("x", 3, 2.0, t)],
            t,
            15.0,
        )
        .unwrap();
        assert_eq!(picked.id, "x");
    }

    struct FixedCatalog(Vec<SceneCandidate>);

    impl ImageryCatalog for FixedCatalog {
        fn search(&self, _query: &SceneQuery) -> Result<Vec<SceneCandidate>> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn scenes_outside_the_area_are_skipped() {
        let t = target();
        let aoi = BoundingBox::new(100.5, 13.7, 100.6, 13.8).unwrap();
        let mut elsewhere = candidate("elsewhere", 1, 1.0, t);
        elsewhere.footprint = BoundingBox::new(102.0, 13.0, 103.0, 14.0).ok();
        let mut covering = candidate("covering", 4, 1.0, t);
        covering.footprint = BoundingBox::new(99.9, 13.5, 100.9, 14.5).ok();
        let unknown = candidate("unknown", 6, 1.0, t);

        let params = SelectionParams {
            target_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            max_cloud_cover: 15.0,
            lookback_days: 30,
        };
        let catalog = FixedCatalog(vec![elsewhere, unknown.clone(), covering]);
        match select_scene(&catalog, &aoi, &params).unwrap() {
            SceneSelection::Selected(scene) => assert_eq!(scene.id, "covering"),
            other => panic!("unexpected {:?}", other),
        }

        let catalog = FixedCatalog(vec![unknown]);
        match select_scene(&catalog, &aoi, &params).unwrap() {
            SceneSelection::Selected(scene) => assert_eq!(scene.id, "unknown"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn empty_input_selects_nothing() {
        assert!(closest_candidate(Vec::new(), target(), 15.0).is_none());
    }
}
