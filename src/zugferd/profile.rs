use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::xrechnung;

/// ZUGFeRD / Factur-X conformance profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZugferdProfile {
    /// Minimal machine-readable data (no line items).
    Minimum,
    /// Basic data without line items.
    BasicWl,
    /// Basic with line items.
    Basic,
    /// Full EN 16931 European norm.
    #[default]
    EN16931,
    /// Extended profile (beyond EN 16931).
    Extended,
    /// XRechnung profile (German public sector).
    XRechnung,
}

impl ZugferdProfile {
    /// The URN identifier used in the CII XML `GuidelineSpecifiedDocumentContextParameter`.
    pub fn urn(&self) -> &'static str {
        match self {
            Self::Minimum => "urn:factur-x.eu:1p0:minimum",
            Self::BasicWl => "urn:factur-x.eu:1p0:basicwl",
            Self::Basic => "urn:cen.eu:en16931:2017#compliant#urn:factur-x.eu:1p0:basic",
            Self::EN16931 => "urn:cen.eu:en16931:2017",
            Self::Extended => "urn:cen.eu:en16931:2017#conformant#urn:factur-x.eu:1p0:extended",
            Self::XRechnung => xrechnung::XRECHNUNG_CUSTOMIZATION_ID,
        }
    }

    /// The XMP ConformanceLevel value.
    pub fn conformance_level(&self) -> &'static str {
        match self {
            Self::Minimum => "MINIMUM",
            Self::BasicWl => "BASIC WL",
            Self::Basic => "BASIC",
            Self::EN16931 => "EN 16931",
            Self::Extended => "EXTENDED",
            Self::XRechnung => "XRECHNUNG",
        }
    }

    /// The AFRelationship value for the PDF FileSpec.
    pub fn af_relationship(&self) -> &'static str {
        match self {
            Self::Minimum | Self::BasicWl => "Data",
            _ => "Alternative",
        }
    }

    /// Whether the profile carries invoice lines (BG-25).
    pub fn has_lines(&self) -> bool {
        !matches!(self, Self::Minimum | Self::BasicWl)
    }
}

impl fmt::Display for ZugferdProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.conformance_level())
    }
}

impl FromStr for ZugferdProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "minimum" => Ok(Self::Minimum),
            "basicwl" => Ok(Self::BasicWl),
            "basic" => Ok(Self::Basic),
            "en16931" | "comfort" => Ok(Self::EN16931),
            "extended" => Ok(Self::Extended),
            "xrechnung" => Ok(Self::XRechnung),
            other => Err(format!("unknown ZUGFeRD profile: {other}")),
        }
    }
}
