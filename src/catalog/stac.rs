// src/catalog/stac.rs
//! Blocking STAC API item-search client.
//!
//! Searches one collection with `POST /search`, follows `next` links until the
//! configured item cap, and optionally signs asset hrefs with a Planetary
//! Computer SAS token so GDAL can read them directly.
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{ImageryCatalog, SceneCandidate, SceneQuery};
use crate::config::CatalogConfig;
use crate::error::{Error, Result};
use crate::geometry::BoundingBox;
use crate::processing::indices::BandId;

const PC_SAS_TOKEN_URL: &str = "https://planetarycomputer.microsoft.com/api/sas/v1/token";

/// Body for `POST /search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StacSearchRequest {
    pub collections: Vec<String>,
    pub bbox: Vec<f64>,
    pub datetime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    /// Pagination fields some APIs put in `next` link bodies
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl StacSearchRequest {
    pub fn from_query(query: &SceneQuery, collection: &str, page_size: u32) -> Self {
        Self {
            collections: vec![collection.to_string()],
            bbox: query.bbox.to_array().to_vec(),
            datetime: query.datetime_interval(),
            query: Some(json!({ "eo:cloud_cover": { "lt": query.max_cloud_cover } })),
            limit: Some(page_size),
            extra: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StacItemCollection {
    #[serde(default)]
    pub features: Vec<StacItem>,
    #[serde(default)]
    pub links: Vec<StacLink>,
}

impl StacItemCollection {
    pub fn next_link(&self) -> Option<&StacLink> {
        self.links.iter().find(|l| l.rel == "next")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StacItem {
    pub id: String,
    #[serde(default)]
    pub bbox: Option<Vec<f64>>,
    pub properties: StacItemProperties,
    #[serde(default)]
    pub assets: HashMap<String, StacAsset>,
    #[serde(default)]
    pub collection: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StacItemProperties {
    pub datetime: Option<String>,
    #[serde(rename = "eo:cloud_cover")]
    pub eo_cloud_cover: Option<f64>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StacAsset {
    pub href: String,
    #[serde(rename = "type")]
    pub type_: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StacLink {
    pub rel: String,
    pub href: String,
    pub method: Option<String>,
    pub body: Option<Value>,
    pub merge: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct SasToken {
    token: String,
}

/// Append a SAS token query string to an asset href.
pub fn sign_href(href: &str, token: &str) -> String {
    let token = token.trim_start_matches('?');
    if href.contains('?') {
        format!("{}&{}", href, token)
    } else {
        format!("{}?{}", href, token)
    }
}

impl StacItem {
    /// Convert to a scene candidate. Items without an acquisition time or a
    /// cloud-cover figure cannot be ranked and yield `None`.
    pub fn to_candidate(&self, token: Option<&str>) -> Option<SceneCandidate> {
        let acquired = match self.properties.datetime.as_deref().map(DateTime::parse_from_rfc3339) {
            Some(Ok(dt)) => dt.with_timezone(&Utc),
            Some(Err(e)) => {
                warn!("Skipping item {}: bad datetime: {}", self.id, e);
                return None;
            }
            None => {
                warn!("Skipping item {}: no datetime", self.id);
                return None;
            }
        };
        let Some(cloud_cover) = self.properties.eo_cloud_cover else {
            warn!("Skipping item {}: no eo:cloud_cover", self.id);
            return None;
        };

        let assets: BTreeMap<BandId, String> = self
            .assets
            .iter()
            .filter_map(|(key, asset)| {
                let band = key.parse::<BandId>().ok()?;
                let href = match token {
                    Some(t) => sign_href(&asset.href, t),
                    None => asset.href.clone(),
                };
                Some((band, href))
            })
            .collect();

        let footprint = match self.bbox.as_deref() {
            Some([a, b, c, d]) => BoundingBox::new(*a, *b, *c, *d).ok(),
            _ => None,
        };

        Some(SceneCandidate { id: self.id.clone(), acquired, cloud_cover, assets, footprint })
    }
}

/// STAC API implementation of [`ImageryCatalog`].
pub struct StacCatalog {
    config: CatalogConfig,
    client: reqwest::blocking::Client,
    token: Mutex<Option<String>>,
}

impl StacCatalog {
    pub fn new(config: CatalogConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("vi-calc/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { config, client, token: Mutex::new(None) })
    }

    pub fn search_url(&self) -> String {
        let base = self.config.url.trim_end_matches('/');
        if base.ends_with("/search") {
            base.to_string()
        } else {
            format!("{}/search", base)
        }
    }

    fn check(response: reqwest::blocking::Response, what: &str) -> Result<reqwest::blocking::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().unwrap_or_default();
        Err(Error::Catalog(format!(
            "{} returned HTTP {}: {}",
            what,
            status,
            body.chars().take(500).collect::<String>()
        )))
    }

    fn post_search(&self, url: &str, body: &Value) -> Result<StacItemCollection> {
        let response = self.client.post(url).json(body).send()?;
        let page = Self::check(response, "STAC search")?.json::<StacItemCollection>()?;
        Ok(page)
    }

    /// Request body for a POST `next` link, honouring `merge`.
    fn next_request_body(link: &StacLink, previous: &Value) -> Value {
        match (&link.body, link.merge.unwrap_or(false)) {
            (Some(link_body), true) => {
                let mut merged = previous.clone();
                if let (Some(base), Some(overlay)) = (merged.as_object_mut(), link_body.as_object()) {
                    for (k, v) in overlay {
                        base.insert(k.clone(), v.clone());
                    }
                }
                merged
            }
            (Some(link_body), false) => link_body.clone(),
            (None, _) => previous.clone(),
        }
    }

    fn follow_next(&self, link: &StacLink, body: &Value) -> Result<StacItemCollection> {
        let method = link.method.as_deref().unwrap_or("GET").to_ascii_uppercase();
        if method == "POST" {
            self.post_search(&link.href, body)
        } else {
            let response = self.client.get(&link.href).send()?;
            Ok(Self::check(response, "STAC pagination")?.json::<StacItemCollection>()?)
        }
    }

    /// Collection-scoped SAS token, fetched once per catalog instance.
    fn sas_token(&self) -> Result<String> {
        let mut cached = self.token.lock();
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }
        let url = format!("{}/{}", PC_SAS_TOKEN_URL, self.config.collection);
        debug!("Requesting SAS token from {}", url);
        let response = self.client.get(&url).send()?;
        let token = Self::check(response, "SAS token request")?.json::<SasToken>()?.token;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// All items matching `query`, across pages, up to `max_items`.
    pub fn search_items(&self, query: &SceneQuery) -> Result<Vec<StacItem>> {
        let request = StacSearchRequest::from_query(query, &self.config.collection, self.config.page_size);
        let mut body = serde_json::to_value(&request)?;
        let url = self.search_url();
        debug!("POST {} {}", url, body);

        let mut page = self.post_search(&url, &body)?;
        let mut items = Vec::new();
        loop {
            let next = page.next_link().cloned();
            items.append(&mut page.features);
            if items.len() >= self.config.max_items {
                break;
            }
            match next {
                Some(link) => {
                    body = Self::next_request_body(&link, &body);
                    let next_page = self.follow_next(&link, &body)?;
                    if next_page.features.is_empty() {
                        break;
                    }
                    page = next_page;
                }
                None => break,
            }
        }
        items.truncate(self.config.max_items);
        Ok(items)
    }
}

impl ImageryCatalog for StacCatalog {
    fn search(&self, query: &SceneQuery) -> Result<Vec<SceneCandidate>> {
        let items = self.search_items(query)?;
        debug!("STAC search returned {} items", items.len());
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let token = if self.config.sign_assets { Some(self.sas_token()?) } else { None };
        Ok(items
            .iter()
            .filter_map(|item| item.to_candidate(token.as_deref()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PAGE: &str = r#"{
      "type": "FeatureCollection",
      "features": [{
        "type": "Feature",
        "id": "S2B_MSIL2A_20240528T033539_R061_T47PPR_20240528T073030",
        "bbox": [99.9, 13.5, 100.9, 14.5],
        "properties": {"datetime": "2024-05-28T03:48:10.024000Z", "eo:cloud_cover": 7.25},
        "assets": {
          "B04": {"href": "https://x.blob.core.windows.net/B04.tif", "type": "image/tiff"},
          "B08": {"href": "https://x.blob.core.windows.net/B08.tif"},
          "visual": {"href": "https://x.blob.core.windows.net/TCI.tif"},
          "SCL": {"href": "https://x.blob.core.windows.net/SCL.tif"}
        },
        "collection": "sentinel-2-l2a"
      }],
      "links": [{"rel": "next", "href": "https://stac/search", "method": "POST",
                 "body": {"token": "next:abc"}, "merge": true}]
    }"#;

    #[test]
    fn parses_item_into_candidate() {
        let page: StacItemCollection = serde_json::from_str(PAGE).unwrap();
        assert_eq!(page.next_link().unwrap().method.as_deref(), Some("POST"));
        let c = page.features[0].to_candidate(Some("st=1&sig=abc")).unwrap();
        assert_eq!(c.acquired, Utc.with_ymd_and_hms(2024, 5, 28, 3, 48, 10).unwrap() + chrono::Duration::milliseconds(24));
        assert_eq!(c.cloud_cover, 7.25);
        assert_eq!(c.assets.len(), 3);
        assert_eq!(c.asset(BandId::B04), Some("https://x.blob.core.windows.net/B04.tif?st=1&sig=abc"));
        assert!(c.asset(BandId::Scl).is_some());
        assert_eq!(c.footprint.unwrap().to_array(), [99.9, 13.5, 100.9, 14.5]);
    }

    #[test]
    fn item_without_cloud_cover_is_skipped() {
        let json = r#"{"id":"x","properties":{"datetime":"2024-05-28T03:48:10Z"},"assets":{}}"#;
        let item: StacItem = serde_json::from_str(json).unwrap();
        assert!(item.to_candidate(None).is_none());
    }

    #[test]
    fn search_body_carries_filters() {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let query = SceneQuery {
            bbox: BoundingBox::new(100.0, 13.0, 101.0, 14.0).unwrap(),
            start,
            end: start + chrono::Duration::days(150),
            max_cloud_cover: 15.0,
        };
        let body = serde_json::to_value(StacSearchRequest::from_query(&query, "sentinel-2-l2a", 100)).unwrap();
        assert_eq!(body["collections"][0], "sentinel-2-l2a");
        assert_eq!(body["datetime"], "2024-01-02T00:00:00Z/2024-05-31T00:00:00Z");
        assert_eq!(body["query"]["eo:cloud_cover"]["lt"], 15.0);
        assert_eq!(body["bbox"][3], 14.0);
    }

    #[test]
    fn merged_next_body_keeps_filters() {
        let page: StacItemCollection = serde_json::from_str(PAGE).unwrap();
        let previous = json!({"collections": ["sentinel-2-l2a"], "limit": 100});
        let body = StacCatalog::next_request_body(page.next_link().unwrap(), &previous);
        assert_eq!(body["token"], "next:abc");
        assert_eq!(body["limit"], 100);
    }

    #[test]
    fn signing_respects_existing_query() {
        assert_eq!(sign_href("https://a/b.tif", "?t=1"), "https://a/b.tif?t=1");
        assert_eq!(sign_href("https://a/b.tif?x=2", "t=1"), "https://a/b.tif?x=2&t=1");
    }
}
