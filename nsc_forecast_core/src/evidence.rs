use std::collections::HashSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{check_range, ForecastError, ForecastResult};

/// Quality tier of a piece of evidence. A is direct primary evidence, D is weak/secondary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EvidenceTier {
    A,
    B,
    C,
    D,
}

impl EvidenceTier {
    /// Parse a tier label ("A".."D", case-insensitive).
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "A" => Some(EvidenceTier::A),
            "B" => Some(EvidenceTier::B),
            "C" => Some(EvidenceTier::C),
            "D" => Some(EvidenceTier::D),
            _ => None,
        }
    }
}

impl fmt::Display for EvidenceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EvidenceTier::A => "A",
            EvidenceTier::B => "B",
            EvidenceTier::C => "C",
            EvidenceTier::D => "D",
        };
        f.write_str(s)
    }
}

/// Wire form of [`Evidence`]. Deserialization goes through this and is validated.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceRecord {
    pub id: String,
    pub claim: String,
    pub polarity: f64,
    #[serde(rename = "type")]
    pub tier: EvidenceTier,
    pub verifiability: f64,
    #[serde(default)]
    pub corroborations_indep: u32,
    pub consistency: f64,
    /// `"YYYY-MM-DD"`, an RFC 3339 timestamp (date part kept), or `"n/a"`.
    #[serde(default, with = "published_date")]
    pub published_at: Option<NaiveDate>,
    #[serde(default)]
    pub urls: Vec<String>,
    pub origin_id: String,
}

mod published_date {
    use chrono::{DateTime, NaiveDate, NaiveDateTime};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    const NOT_AVAILABLE: &str = "n/a";

    fn parse(raw: &str) -> Option<Option<NaiveDate>> {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case(NOT_AVAILABLE) {
            return Some(None);
        }
        if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Some(Some(d));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(Some(dt.naive_utc().date()));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|dt| Some(dt.date()))
    }

    pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(d) => s.collect_str(d),
            None => s.serialize_str(NOT_AVAILABLE),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw {
            None => Ok(None),
            Some(raw) => parse(&raw)
                .ok_or_else(|| D::Error::custom(format!("unrecognised publishedAt value {:?}", raw))),
        }
    }
}

/// One discrete claim bearing on the question.
///
/// Fields are private: polarity, verifiability and consistency are checked at
/// construction and cannot leave their intervals afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EvidenceRecord", into = "EvidenceRecord")]
pub struct Evidence {
    id: String,
    claim: String,
    polarity: f64,
    tier: EvidenceTier,
    verifiability: f64,
    corroborations_indep: u32,
    consistency: f64,
    published_at: Option<NaiveDate>,
    urls: Vec<String>,
    origin_id: String,
}

impl Evidence {
    /// Create evidence with neutral quality signals (verifiability 0.5, consistency 0.5,
    /// no corroborations). Use the `with_*` methods to refine them.
    pub fn new(
        id: impl Into<String>,
        claim: impl Into<String>,
        origin_id: impl Into<String>,
        polarity: f64,
        tier: EvidenceTier,
    ) -> ForecastResult<Self> {
        Ok(Self {
            id: id.into(),
            claim: claim.into(),
            polarity: check_range("polarity", polarity, -1.0, 1.0)?,
            tier,
            verifiability: 0.5,
            corroborations_indep: 0,
            consistency: 0.5,
            published_at: None,
            urls: Vec::new(),
            origin_id: origin_id.into(),
        })
    }

    pub fn with_verifiability(mut self, v: f64) -> ForecastResult<Self> {
        self.verifiability = check_range("verifiability", v, 0.0, 1.0)?;
        Ok(self)
    }

    pub fn with_consistency(mut self, c: f64) -> ForecastResult<Self> {
        self.consistency = check_range("consistency", c, 0.0, 1.0)?;
        Ok(self)
    }

    pub fn with_corroborations(mut self, n: u32) -> Self {
        self.corroborations_indep = n;
        self
    }

    pub fn with_published_at(mut self, date: NaiveDate) -> Self {
        self.published_at = Some(date);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.urls.push(url.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn claim(&self) -> &str {
        &self.claim
    }

    pub fn polarity(&self) -> f64 {
        self.polarity
    }

    pub fn tier(&self) -> EvidenceTier {
        self.tier
    }

    pub fn verifiability(&self) -> f64 {
        self.verifiability
    }

    pub fn corroborations_indep(&self) -> u32 {
        self.corroborations_indep
    }

    pub fn consistency(&self) -> f64 {
        self.consistency
    }

    pub fn published_at(&self) -> Option<NaiveDate> {
        self.published_at
    }

    /// Publication date as shown in reports ("n/a" when unknown).
    pub fn published_label(&self) -> String {
        self.published_at
            .map(|d| d.to_string())
            .unwrap_or_else(|| "n/a".to_string())
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn origin_id(&self) -> &str {
        &self.origin_id
    }
}

impl TryFrom<EvidenceRecord> for Evidence {
    type Error = ForecastError;

    fn try_from(r: EvidenceRecord) -> ForecastResult<Self> {
        let mut ev = Evidence::new(r.id, r.claim, r.origin_id, r.polarity, r.tier)?
            .with_verifiability(r.verifiability)?
            .with_consistency(r.consistency)?
            .with_corroborations(r.corroborations_indep);
        ev.published_at = r.published_at;
        ev.urls = r.urls;
        Ok(ev)
    }
}

impl From<Evidence> for EvidenceRecord {
    fn from(e: Evidence) -> Self {
        EvidenceRecord {
            id: e.id,
            claim: e.claim,
            polarity: e.polarity,
            tier: e.tier,
            verifiability: e.verifiability,
            corroborations_indep: e.corroborations_indep,
            consistency: e.consistency,
            published_at: e.published_at,
            urls: e.urls,
            origin_id: e.origin_id,
        }
    }
}

/// Evidence partitioned by polarity sign.
#[derive(Clone, Debug, Default)]
pub struct ProConView<'a> {
    pub pro: Vec<&'a Evidence>,
    pub con: Vec<&'a Evidence>,
    /// Zero-polarity items. Counted, but neither pro nor con.
    pub neutral: Vec<&'a Evidence>,
}

/// Holds the evidence of one forecasting session, in insertion order.
#[derive(Clone, Debug, Default)]
pub struct EvidenceStore {
    items: Vec<Evidence>,
    ids: HashSet<String>,
}

impl EvidenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one item. Fails if the id is already present; the store is unchanged then.
    pub fn add(&mut self, ev: Evidence) -> ForecastResult<()> {
        if self.ids.contains(ev.id()) {
            return Err(ForecastError::DuplicateId(ev.id().to_string()));
        }
        self.ids.insert(ev.id().to_string());
        self.items.push(ev);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn get(&self, id: &str) -> Option<&Evidence> {
        if !self.ids.contains(id) {
            return None;
        }
        self.items.iter().find(|e| e.id() == id)
    }

    /// All items in insertion order.
    pub fn items(&self) -> &[Evidence] {
        &self.items
    }

    /// Partition by polarity sign.
    pub fn all(&self) -> ProConView<'_> {
        let mut view = ProConView::default();
        for ev in &self.items {
            if ev.polarity() > 0.0 {
                view.pro.push(ev);
            } else if ev.polarity() < 0.0 {
                view.con.push(ev);
            } else {
                view.neutral.push(ev);
            }
        }
        view
    }

    /// Remove the given ids. Returns the ids that were actually present.
    pub fn remove<S: AsRef<str>>(&mut self, ids: &[S]) -> Vec<String> {
        let mut removed = Vec::new();
        for id in ids {
            let id = id.as_ref();
            if self.ids.remove(id) {
                removed.push(id.to_string());
            }
        }
        if !removed.is_empty() {
            let ids = &self.ids;
            self.items.retain(|e| ids.contains(e.id()));
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
