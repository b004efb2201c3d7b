// src/processing/indices/mod.rs
//! Registry of the supported vegetation indices.
//!
//! Every index is one row of [`INDICES`]: the bands it reads, in the order its
//! formula receives them, and a per-pixel function over reflectance values.
//! Lookups go through the table only, so a new index is a new row.
mod formulas;

pub(crate) use formulas::MAX_BANDS;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default denominator stabilization constant.
pub const EPSILON: f32 = 1e-6;

/// Sentinel-2 L2A band identifiers, named after their STAC asset keys.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BandId {
    B02,
    B03,
    B04,
    B05,
    B07,
    B08,
    B11,
    B12,
    /// Scene classification layer
    #[serde(rename = "SCL")]
    Scl,
}

impl BandId {
    pub const ALL: [BandId; 9] = [
        BandId::B02,
        BandId::B03,
        BandId::B04,
        BandId::B05,
        BandId::B07,
        BandId::B08,
        BandId::B11,
        BandId::B12,
        BandId::Scl,
    ];

    /// STAC asset key
    pub fn as_str(&self) -> &'static str {
        match self {
            BandId::B02 => "B02",
            BandId::B03 => "B03",
            BandId::B04 => "B04",
            BandId::B05 => "B05",
            BandId::B07 => "B07",
            BandId::B08 => "B08",
            BandId::B11 => "B11",
            BandId::B12 => "B12",
            BandId::Scl => "SCL",
        }
    }

    pub fn common_name(&self) -> &'static str {
        match self {
            BandId::B02 => "Blue",
            BandId::B03 => "Green",
            BandId::B04 => "Red",
            BandId::B05 => "Red Edge 1",
            BandId::B07 => "Red Edge 3",
            BandId::B08 => "NIR",
            BandId::B11 => "SWIR 1",
            BandId::B12 => "SWIR 2",
            BandId::Scl => "Scene Classification",
        }
    }

    /// Native ground sample distance in metres.
    pub fn native_resolution(&self) -> u32 {
        match self {
            BandId::B02 | BandId::B03 | BandId::B04 | BandId::B08 => 10,
            BandId::B05 | BandId::B07 | BandId::B11 | BandId::B12 | BandId::Scl => 20,
        }
    }
}

impl fmt::Display for BandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BandId {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        BandId::ALL
            .iter()
            .copied()
            .find(|b| b.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown band identifier: {s}"))
    }
}

/// Per-pixel formula: reflectance values in `bands` order, then epsilon.
pub type PixelFormula = fn(&[f32], f32) -> f32;

/// One registered vegetation index.
pub struct IndexDefinition {
    pub id: &'static str,
    pub name: &'static str,
    pub bands: &'static [BandId],
    pub formula_text: &'static str,
    pub formula: PixelFormula,
    pub epsilon: f32,
    /// Fixed colour-scale bounds; `None` means stretch to the data
    pub display_range: (Option<f32>, Option<f32>),
    pub keywords: &'static [&'static str],
}

impl IndexDefinition {
    pub fn requires(&self, band: BandId) -> bool {
        self.bands.contains(&band)
    }
}

impl fmt::Debug for IndexDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexDefinition")
            .field("id", &self.id)
            .field("bands", &self.bands)
            .field("formula_text", &self.formula_text)
            .finish()
    }
}

use BandId::{B02, B03, B04, B05, B07, B08};

pub static INDICES: [IndexDefinition; 22] = [
    IndexDefinition {
        id: "ARVI",
        name: "Atmospherically Resistant Vegetation Index",
        bands: &[B02, B04, B08],
        formula_text: "(NIR - (Red - (Blue - Red))) / (NIR + (Red - (Blue - Red)))",
        formula: formulas::arvi,
        epsilon: EPSILON,
        display_range: (None, None),
        keywords: &["haze-resistant vegetation signal", "aerosol-corrected greenness", "polluted-air environments"],
    },
    IndexDefinition {
        id: "DVI",
        name: "Difference Vegetation Index",
        bands: &[B04, B08],
        formula_text: "NIR - Red",
        formula: formulas::dvi,
        epsilon: EPSILON,
        display_range: (None, None),
        keywords: &["basic greenness difference", "coarse vegetation amount", "simple density check"],
    },
    IndexDefinition {
        id: "EVI",
        name: "Enhanced Vegetation Index",
        bands: &[B02, B04, B08],
        formula_text: "2.5 * ((NIR - Red) / (NIR + 6*Red - 7.5*Blue + 1))",
        formula: formulas::evi,
        epsilon: EPSILON,
        display_range: (Some(0.0), None),
        keywords: &["atmospheric-corrected vegetation signal", "dense foliage analysis", "minimizes soil/haze effects"],
    },
    IndexDefinition {
        id: "EVI2",
        name: "Two-band Enhanced Vegetation Index",
        bands: &[B04, B08],
        formula_text: "2.5 * ((NIR - Red) / (NIR + 2.4*Red + 1))",
        formula: formulas::evi2,
        epsilon: EPSILON,
        display_range: (None, None),
        keywords: &["EVI without blue band", "sensor-friendly", "green biomass detection"],
    },
    IndexDefinition {
        id: "GARI",
        name: "Green Atmospherically Resistant Index",
        bands: &[B02, B03, B04, B08],
        formula_text: "(NIR - (Green - (Blue - Red))) / (NIR + (Green - (Blue - Red)))",
        formula: formulas::gari,
        epsilon: EPSILON,
        display_range: (None, None),
        keywords: &["chlorophyll refinement", "reduced blue scattering influence", "pigment-based vitality"],
    },
    IndexDefinition {
        id: "GCI",
        name: "Green Chlorophyll Index",
        bands: &[B03, B08],
        formula_text: "(NIR / Green) - 1",
        formula: formulas::gci,
        epsilon: EPSILON,
        display_range: (None, None),
        keywords: &["chlorophyll concentration", "nitrogen nutrition assessment", "leaf pigment monitoring"],
    },
    IndexDefinition {
        id: "GDVI",
        name: "Generalized Difference Vegetation Index",
        bands: &[B04, B08],
        formula_text: "(NIR^2 - Red^2) / (NIR^2 + Red^2)",
        formula: formulas::gdvi,
        epsilon: EPSILON,
        display_range: (None, None),
        keywords: &["biomass sensitivity", "canopy density mapping", "strong greenness response"],
    },
    IndexDefinition {
        id: "GNDVI",
        name: "Green Normalized Difference Vegetation Index",
        bands: &[B03, B08],
        formula_text: "(NIR - Green) / (NIR + Green)",
        formula: formulas::gndvi,
        epsilon: EPSILON,
        display_range: (None, None),
        keywords: &["nitrogen status", "water stress detection", "chlorophyll sensitivity"],
    },
    IndexDefinition {
        id: "GRRVI",
        name: "Green-Red Ratio Vegetation Index",
        bands: &[B03, B04],
        formula_text: "(Green - Red) / (Green + Red)",
        formula: formulas::grrvi,
        epsilon: EPSILON,
        display_range: (None, None),
        keywords: &["early-stage vegetation detection", "red/green sensitivity", "emerging crop monitoring"],
    },
    IndexDefinition {
        id: "IPVI",
        name: "Infrared Percentage Vegetation Index",
        bands: &[B04, B08],
        formula_text: "NIR / (NIR + Red)",
        formula: formulas::ipvi,
        epsilon: EPSILON,
        display_range: (None, None),
        keywords: &["normalized greenness mapping", "broad-area vegetation comparison", "NDVI-style scaling"],
    },
    IndexDefinition {
        id: "MSAVI",
        name: "Modified Soil Adjusted Vegetation Index",
        bands: &[B04, B08],
        formula_text: "(2*NIR + 1 - sqrt((2*NIR + 1)^2 - 8*(NIR - Red))) / 2",
        formula: formulas::msavi,
        epsilon: EPSILON,
        display_range: (None, None),
        keywords: &["bare-soil suppression", "early-growth crop detection", "emerging vegetation"],
    },
    IndexDefinition {
        id: "MSR",
        name: "Modified Simple Ratio",
        bands: &[B04, B08],
        formula_text: "(NIR/Red - 1) / sqrt(NIR/Red + 1)",
        formula: formulas::msr,
        epsilon: EPSILON,
        display_range: (None, None),
        keywords: &["improved SR accuracy", "better nonlinear response", "general vegetation monitoring"],
    },
    IndexDefinition {
        id: "NDVI",
        name: "Normalized Difference Vegetation Index",
        bands: &[B04, B08],
        formula_text: "(NIR - Red) / (NIR + Red)",
        formula: formulas::ndvi,
        epsilon: EPSILON,
        display_range: (Some(0.0), Some(1.0)),
        keywords: &["general vegetation vigor", "biomass estimate", "overall plant health"],
    },
    IndexDefinition {
        id: "NDWI",
        name: "Normalized Difference Water Index",
        bands: &[B03, B08],
        formula_text: "(Green - NIR) / (Green + NIR)",
        formula: formulas::ndwi,
        epsilon: EPSILON,
        display_range: (None, None),
        keywords: &["water body detection", "vegetation water content", "moisture mapping"],
    },
    IndexDefinition {
        id: "OSAVI",
        name: "Optimized Soil Adjusted Vegetation Index",
        bands: &[B04, B08],
        formula_text: "(NIR - Red) / (NIR + Red + 0.16)",
        formula: formulas::osavi,
        epsilon: EPSILON,
        display_range: (None, None),
        keywords: &["enhanced SAVI", "better soil isolation", "open-field crop monitoring"],
    },
    IndexDefinition {
        id: "RDVI",
        name: "Renormalized Difference Vegetation Index",
        bands: &[B04, B08],
        formula_text: "(NIR - Red) / sqrt(NIR + Red)",
        formula: formulas::rdvi,
        epsilon: EPSILON,
        display_range: (None, None),
        keywords: &["mid-range biomass sensitivity", "improved canopy contrast", "stress variation detection"],
    },
    IndexDefinition {
        id: "RECI",
        name: "Red Edge Chlorophyll Index",
        bands: &[B05, B07],
        formula_text: "(RE3 / RE1) - 1",
        formula: formulas::reci,
        epsilon: EPSILON,
        display_range: (None, None),
        keywords: &["chlorophyll content", "red edge sensitivity", "nitrogen status"],
    },
    IndexDefinition {
        id: "SAVI",
        name: "Soil Adjusted Vegetation Index",
        bands: &[B04, B08],
        formula_text: "((NIR - Red) / (NIR + Red + 0.5)) * 1.5",
        formula: formulas::savi,
        epsilon: EPSILON,
        display_range: (Some(0.0), None),
        keywords: &["low-vegetation areas", "soil-background reduction", "sparse crop fields"],
    },
    IndexDefinition {
        id: "SIPI",
        name: "Structure Insensitive Pigment Index",
        bands: &[B02, B04, B08],
        formula_text: "(NIR - Blue) / (NIR - Red)",
        formula: formulas::sipi,
        epsilon: EPSILON,
        display_range: (None, None),
        keywords: &["carotenoid-chlorophyll ratio", "leaf yellowing detection", "pigment stress"],
    },
    IndexDefinition {
        id: "SIPI2",
        name: "Structure Insensitive Pigment Index 2",
        bands: &[B02, B04, B08],
        formula_text: "(NIR - Blue) / (NIR + Red)",
        formula: formulas::sipi2,
        epsilon: EPSILON,
        display_range: (None, None),
        keywords: &["enhanced carotenoid sensitivity", "refined stress color signal", "leaf pigment change"],
    },
    IndexDefinition {
        id: "SR",
        name: "Simple Ratio",
        bands: &[B04, B08],
        formula_text: "NIR / Red",
        formula: formulas::sr,
        epsilon: EPSILON,
        display_range: (None, None),
        keywords: &["vegetation sensitivity in low-density areas", "strong ratio-based greenness", "canopy response"],
    },
    IndexDefinition {
        id: "WDRVI",
        name: "Wide Dynamic Range Vegetation Index",
        bands: &[B04, B08],
        formula_text: "(0.1*NIR - Red) / (0.1*NIR + Red)",
        formula: formulas::wdrvi,
        epsilon: EPSILON,
        display_range: (None, None),
        keywords: &["dense-canopy monitoring", "reduced NDVI saturation", "high-biomass crops"],
    },
];

/// Find an index by identifier, ignoring case.
pub fn lookup(id: &str) -> Result<&'static IndexDefinition> {
    let id = id.trim();
    INDICES
        .iter()
        .find(|def| def.id.eq_ignore_ascii_case(id))
        .ok_or_else(|| Error::UnknownIndex(id.to_string()))
}

/// One band of an index as shown in listings.
#[derive(Debug, Clone, Serialize)]
pub struct BandInfo {
    pub id: BandId,
    pub common_name: &'static str,
    pub resolution_m: u32,
}

/// Listing entry for `vi-calc indices`.
#[derive(Debug, Clone, Serialize)]
pub struct IndexInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub formula: &'static str,
    pub bands: Vec<BandInfo>,
    pub keywords: &'static [&'static str],
}

impl From<&IndexDefinition> for IndexInfo {
    fn from(def: &IndexDefinition) -> Self {
        IndexInfo {
            id: def.id,
            name: def.name,
            formula: def.formula_text,
            bands: def
                .bands
                .iter()
                .map(|&id| BandInfo { id, common_name: id.common_name(), resolution_m: id.native_resolution() })
                .collect(),
            keywords: def.keywords,
        }
    }
}

impl fmt::Display for IndexInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<6} {}", self.id, self.name)?;
        writeln!(f, "       formula:  {}", self.formula)?;
        let bands: Vec<String> = self
            .bands
            .iter()
            .map(|b| format!("{} {} ({} m)", b.id, b.common_name, b.resolution_m))
            .collect();
        writeln!(f, "       bands:    {}", bands.join(", "))?;
        write!(f, "       keywords: {}", self.keywords.join(", "))
    }
}

/// Listing of every registered index, in table order.
pub fn index_catalog() -> Vec<IndexInfo> {
    INDICES.iter().map(IndexInfo::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn registry_ids_are_unique() {
        let ids: HashSet<_> = INDICES.iter().map(|d| d.id).collect();
        assert_eq!(ids.len(), INDICES.len());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        assert_eq!(lookup("ndvi").unwrap().id, "NDVI");
        assert_eq!(lookup(" Sipi2 ").unwrap().id, "SIPI2");
    }

    #[test]
    fn lookup_unknown_names_the_identifier() {
        let err = lookup("NDXI").unwrap_err();
        assert!(err.to_string().contains("NDXI"));
    }

    #[test]
    fn band_ids_parse_from_asset_keys() {
        assert_eq!("b08".parse::<BandId>().unwrap(), BandId::B08);
        assert_eq!("SCL".parse::<BandId>().unwrap(), BandId::Scl);
        assert!("B99".parse::<BandId>().is_err());
    }

    #[test]
    fn listing_shows_bands_with_resolution() {
        let catalog = index_catalog();
        assert_eq!(catalog.len(), INDICES.len());

        let reci = catalog.iter().find(|info| info.id == "RECI").unwrap();
        assert!(reci.bands.iter().all(|b| b.resolution_m == 20));
        let text = reci.to_string();
        assert!(text.contains("B05 Red Edge 1 (20 m)"), "{}", text);
        assert!(text.contains("keywords:"));

        let ndvi = serde_json::to_value(catalog.iter().find(|info| info.id == "NDVI").unwrap()).unwrap();
        assert_eq!(ndvi["bands"][1]["id"], "B08");
        assert_eq!(ndvi["bands"][1]["resolution_m"], 10);
        assert!(!ndvi["keywords"].as_array().unwrap().is_empty());
    }

    #[test]
    fn every_index_reads_at_least_one_band() {
        for def in INDICES.iter() {
            assert!(!def.bands.is_empty(), "{} has no bands", def.id);
            assert!(def.bands.len() <= formulas::MAX_BANDS, "{} reads too many bands", def.id);
        }
    }
}
