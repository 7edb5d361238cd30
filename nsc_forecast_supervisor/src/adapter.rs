//! Domain adapter layer: convert raw search hits into `nsc_forecast_core::Evidence`.
//!
//! This module is intentionally small and policy-light:
//! - no model calls
//! - no domain-specific scoring rules
//!
//! Upstream extraction scores each hit (polarity, verifiability, ...) and hands
//! the scores over as scalars on a `SearchRecord`. An `EvidenceBuilder` (or the
//! provided `BasicEvidenceBuilder`) maps records into typed evidence, and
//! `RecordSource` glues a record provider and a builder into an `EvidenceSource`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use nsc_forecast_core::{Evidence, EvidenceTier};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ServiceError;
use crate::services::{EvidenceSource, SearchRequest};

/// A raw search hit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub title: String,
    pub content: String,
    /// May be empty (knowledge-based results carry no URL).
    pub url: String,
    /// Publisher or source type; becomes the evidence origin.
    pub source: String,
    pub relevance_score: f64,
    pub published_at: Option<NaiveDate>,
    /// Tier label ("A".."D") if upstream assigned one.
    pub tier: Option<String>,
    /// Upstream scores. Common keys: "polarity", "verifiability", "consistency", "corroborations".
    pub scalars: HashMap<String, f64>,
}

impl SearchRecord {
    /// Convenience constructor.
    pub fn new(title: impl Into<String>, content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            source: source.into(),
            relevance_score: 0.7,
            ..Self::default()
        }
    }

    /// Set a scalar value.
    pub fn with_scalar(mut self, key: impl Into<String>, value: f64) -> Self {
        self.scalars.insert(key.into(), value);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }

    pub fn with_published_at(mut self, date: NaiveDate) -> Self {
        self.published_at = Some(date);
        self
    }
}

/// Lightweight normalization configuration.
///
/// Only clamps raw scores into the ranges `Evidence` accepts and fills defaults
/// for missing or non-finite values.
#[derive(Clone, Copy, Debug)]
pub struct Normalizer {
    pub default_verifiability: f64,
    pub default_consistency: f64,
    pub default_tier: EvidenceTier,
    /// Upper bound on the corroboration count taken from a record.
    pub corroborations_max: u32,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            default_verifiability: 0.5,
            default_consistency: 0.5,
            default_tier: EvidenceTier::C,
            corroborations_max: 50,
        }
    }
}

impl Normalizer {
    #[inline]
    fn clamp_unit(x: Option<f64>, default: f64) -> f64 {
        match x {
            Some(v) if v.is_finite() => v.clamp(0.0, 1.0),
            _ => default,
        }
    }

    #[inline]
    fn clamp_polarity(x: f64) -> Option<f64> {
        if !x.is_finite() {
            return None;
        }
        Some(x.clamp(-1.0, 1.0))
    }

    #[inline]
    fn corroborations(&self, x: Option<f64>) -> u32 {
        match x {
            Some(v) if v.is_finite() && v > 0.0 => (v.round() as u32).min(self.corroborations_max),
            _ => 0,
        }
    }
}

/// Trait: map a `SearchRecord` into zero or more `Evidence` items.
pub trait EvidenceBuilder: Send + Sync {
    fn build(&self, req: &SearchRequest, record: &SearchRecord) -> Vec<Evidence>;
}

/// Scalar keys read by `BasicEvidenceBuilder`.
#[derive(Clone, Debug)]
pub struct BasicKeys {
    pub polarity: &'static str,
    pub verifiability: &'static str,
    pub consistency: &'static str,
    pub corroborations: &'static str,
}

impl Default for BasicKeys {
    fn default() -> Self {
        Self {
            polarity: "polarity",
            verifiability: "verifiability",
            consistency: "consistency",
            corroborations: "corroborations",
        }
    }
}

/// Basic builder that expects upstream scores in `SearchRecord::scalars`.
///
/// Records without a finite polarity carry no direction and are dropped.
/// The evidence id is derived from source, title and content, so the same hit
/// found by two queries gets the same id.
#[derive(Clone, Debug, Default)]
pub struct BasicEvidenceBuilder {
    pub normalizer: Normalizer,
    pub keys: BasicKeys,
}

/// Deterministic FNV-1a hash (stable across runs).
fn fnv1a_u64(parts: &[&str]) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for part in parts {
        for b in part.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        // separator so ("ab","c") and ("a","bc") differ
        h ^= 0xff;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

/// Stable evidence id for a record.
pub fn record_id(record: &SearchRecord) -> String {
    let h = fnv1a_u64(&[record.source.trim(), record.title.trim(), record.content.trim()]);
    format!("e{:012x}", h & 0xffff_ffff_ffff)
}

impl EvidenceBuilder for BasicEvidenceBuilder {
    fn build(&self, req: &SearchRequest, record: &SearchRecord) -> Vec<Evidence> {
        let n = &self.normalizer;
        let Some(polarity) = record
            .scalars
            .get(self.keys.polarity)
            .and_then(|p| Normalizer::clamp_polarity(*p))
        else {
            debug!(query = %req.query, title = %record.title, "record without polarity dropped");
            return Vec::new();
        };

        let verifiability = Normalizer::clamp_unit(
            record.scalars.get(self.keys.verifiability).copied(),
            n.default_verifiability,
        );
        let consistency = Normalizer::clamp_unit(
            record.scalars.get(self.keys.consistency).copied(),
            n.default_consistency,
        );
        let corroborations = n.corroborations(record.scalars.get(self.keys.corroborations).copied());
        let tier = record
            .tier
            .as_deref()
            .and_then(EvidenceTier::parse)
            .unwrap_or(n.default_tier);

        let claim = if record.content.trim().is_empty() {
            record.title.trim().to_string()
        } else {
            record.content.trim().to_string()
        };
        let origin = match record.source.trim() {
            "" => "unknown".to_string(),
            s => s.to_lowercase(),
        };

        // All values are clamped above; construction only fails on NaN, which clamp_* filtered.
        let built = Evidence::new(record_id(record), claim, origin, polarity, tier)
            .and_then(|e| e.with_verifiability(verifiability))
            .and_then(|e| e.with_consistency(consistency))
            .map(|e| e.with_corroborations(corroborations));

        match built {
            Ok(mut ev) => {
                if let Some(d) = record.published_at {
                    ev = ev.with_published_at(d);
                }
                if !record.url.trim().is_empty() {
                    ev = ev.with_url(record.url.trim());
                }
                vec![ev]
            }
            Err(e) => {
                debug!(error = %e, title = %record.title, "record rejected");
                Vec::new()
            }
        }
    }
}

/// Helper: build evidence for a batch of records.
pub fn build_evidence_batch<B: EvidenceBuilder + ?Sized>(
    builder: &B,
    req: &SearchRequest,
    records: &[SearchRecord],
) -> Vec<Evidence> {
    let mut out = Vec::new();
    for rec in records {
        out.extend(builder.build(req, rec));
    }
    out
}

/// Anything that returns raw search hits for a query.
#[async_trait]
pub trait RecordProvider: Send + Sync {
    async fn fetch(&self, req: &SearchRequest) -> Result<Vec<SearchRecord>, ServiceError>;
}

/// An `EvidenceSource` made of a record provider plus a builder.
pub struct RecordSource<P, B> {
    provider: P,
    builder: B,
}

impl<P: RecordProvider, B: EvidenceBuilder> RecordSource<P, B> {
    pub fn new(provider: P, builder: B) -> Self {
        Self { provider, builder }
    }
}

#[async_trait]
impl<P: RecordProvider, B: EvidenceBuilder> EvidenceSource for RecordSource<P, B> {
    async fn search(&self, req: &SearchRequest) -> Result<Vec<Evidence>, ServiceError> {
        let records = self.provider.fetch(req).await?;
        Ok(build_evidence_batch(&self.builder, req, &records))
    }
}
