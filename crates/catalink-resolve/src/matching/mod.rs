//! Ranked candidate search for one query record.

pub mod text;

use std::collections::HashSet;

use catalink_core::config::MatchingConfig;
use catalink_core::{Filter, ProductField, ProductRecord, ProductStore, ProductSummary, StoredProduct};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::identifiers::gtin::lookup_values;
use text::{code_parts, name_tokens, normalize_text, similarity, truncate_chars};

const EXPLANATION_NAME_CHARS: usize = 50;
const MANUFACTURER_BOOST: f64 = 0.10;
const MANUFACTURER_BOOST_CAP: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    ExactBarcode,
    ExactEan,
    ExactCode,
    ManufacturerRef,
    FuzzyNameHigh,
    FuzzyNameMedium,
    PartialCode,
}

impl MatchType {
    /// Base score awarded for this kind of match.
    pub fn base_score(&self) -> f64 {
        match self {
            Self::ExactBarcode | Self::ExactEan => 1.0,
            Self::ExactCode => 0.95,
            Self::ManufacturerRef => 0.85,
            Self::FuzzyNameHigh => 0.75,
            Self::FuzzyNameMedium => 0.60,
            Self::PartialCode => 0.50,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Self::ExactBarcode | Self::ExactEan | Self::ExactCode)
    }
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExactBarcode => write!(f, "exact_barcode"),
            Self::ExactEan => write!(f, "exact_ean"),
            Self::ExactCode => write!(f, "exact_code"),
            Self::ManufacturerRef => write!(f, "manufacturer_ref"),
            Self::FuzzyNameHigh => write!(f, "fuzzy_name_high"),
            Self::FuzzyNameMedium => write!(f, "fuzzy_name_medium"),
            Self::PartialCode => write!(f, "partial_code"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub candidate_id: Uuid,
    pub candidate_summary: ProductSummary,
    pub score: f64,
    pub match_type: MatchType,
    pub explanation: String,
}

/// Score bucket for a name similarity, `None` below the minimum threshold.
pub fn fuzzy_bucket(similarity: f64, config: &MatchingConfig) -> Option<MatchType> {
    if similarity >= config.fuzzy_high_threshold {
        Some(MatchType::FuzzyNameHigh)
    } else if similarity >= config.fuzzy_min_threshold {
        Some(MatchType::FuzzyNameMedium)
    } else {
        None
    }
}

/// Results collected so far plus the ids already claimed by an earlier matcher.
#[derive(Default)]
struct Candidates {
    results: Vec<MatchResult>,
    seen: HashSet<Uuid>,
}

impl Candidates {
    fn contains(&self, id: &Uuid) -> bool {
        self.seen.contains(id)
    }

    fn push(&mut self, product: &StoredProduct, match_type: MatchType, score: f64, explanation: String) {
        if !self.seen.insert(product.id) {
            return;
        }
        self.results.push(MatchResult {
            candidate_id: product.id,
            candidate_summary: ProductSummary::from(product),
            score: score.clamp(0.0, 1.0),
            match_type,
            explanation,
        });
    }

    fn len(&self) -> usize {
        self.results.len()
    }
}

/// Runs the matcher battery for a query record against a product store.
///
/// Exact barcode, exact EAN, exact internal code and manufacturer reference
/// always run; fuzzy name and partial code only top up a result set that is
/// still below `max_results`. A product claimed by an earlier matcher is
/// never reported again.
pub struct MatchEvaluator<'a, S: ProductStore + ?Sized> {
    store: &'a S,
    config: MatchingConfig,
}

impl<'a, S: ProductStore + ?Sized> MatchEvaluator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            config: MatchingConfig::default(),
        }
    }

    pub fn with_config(mut self, config: MatchingConfig) -> Self {
        self.config = config;
        self
    }

    /// Ranked candidates for `query`, best first, at most `max_results`.
    pub fn find_matches(&self, query: &ProductRecord, max_results: usize) -> Result<Vec<MatchResult>> {
        if max_results == 0 {
            return Ok(Vec::new());
        }

        let mut found = Candidates::default();
        self.match_barcode(query, &mut found)?;
        self.match_ean(query, &mut found)?;
        self.match_code(query, &mut found)?;
        self.match_manufacturer_ref(query, &mut found)?;
        if found.len() < max_results {
            self.match_fuzzy_name(query, max_results, &mut found)?;
        }
        if found.len() < max_results {
            self.match_partial_code(query, max_results, &mut found)?;
        }

        let mut results = found.results;
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(max_results);

        info!(
            name = query.text(ProductField::Name).unwrap_or_default(),
            matches = results.len(),
            "match search finished"
        );
        Ok(results)
    }

    fn match_barcode(&self, query: &ProductRecord, found: &mut Candidates) -> Result<()> {
        let Some(barcode) = query.text(ProductField::Barcode) else {
            return Ok(());
        };
        let filter = Filter::In(ProductField::Barcode, lookup_values(barcode));
        let products = self.store.find(&filter, self.config.exact_limit)?;
        debug!(barcode, hits = products.len(), "exact barcode matcher");

        for product in &products {
            found.push(
                product,
                MatchType::ExactBarcode,
                MatchType::ExactBarcode.base_score(),
                format!("Barcode exact: {barcode}"),
            );
        }
        Ok(())
    }

    fn match_ean(&self, query: &ProductRecord, found: &mut Candidates) -> Result<()> {
        let Some(ean) = query.text(ProductField::CodeEan) else {
            return Ok(());
        };
        if query.text(ProductField::Barcode) == Some(ean) {
            return Ok(());
        }
        let values = lookup_values(ean);
        let filter = Filter::Any(vec![
            Filter::In(ProductField::CodeEan, values.clone()),
            Filter::In(ProductField::Barcode, values),
        ]);
        let products = self.store.find(&filter, self.config.exact_limit)?;
        debug!(ean, hits = products.len(), "exact EAN matcher");

        for product in &products {
            found.push(
                product,
                MatchType::ExactEan,
                MatchType::ExactEan.base_score(),
                format!("EAN exact: {ean}"),
            );
        }
        Ok(())
    }

    fn match_code(&self, query: &ProductRecord, found: &mut Candidates) -> Result<()> {
        let Some(code) = query.text(ProductField::DefaultCode) else {
            return Ok(());
        };
        let filter = Filter::eq(ProductField::DefaultCode, code);
        let products = self.store.find(&filter, self.config.exact_limit)?;
        debug!(code, hits = products.len(), "exact code matcher");

        for product in &products {
            found.push(
                product,
                MatchType::ExactCode,
                MatchType::ExactCode.base_score(),
                format!("Code exact: {code}"),
            );
        }
        Ok(())
    }

    fn match_manufacturer_ref(&self, query: &ProductRecord, found: &mut Candidates) -> Result<()> {
        let Some(reference) = query.text(ProductField::ManufacturerRef) else {
            return Ok(());
        };
        let manufacturer = query.text(ProductField::Manufacturer).map(normalize_text);
        let filter = Filter::eq(ProductField::ManufacturerRef, reference);
        let products = self.store.find(&filter, self.config.manufacturer_ref_limit)?;
        debug!(reference, hits = products.len(), "manufacturer reference matcher");

        for product in &products {
            let same_maker = match (&manufacturer, product.record.text(ProductField::Manufacturer)) {
                (Some(ours), Some(theirs)) => !ours.is_empty() && *ours == normalize_text(theirs),
                _ => false,
            };
            let base = MatchType::ManufacturerRef.base_score();
            let (score, explanation) = if same_maker {
                (
                    (base + MANUFACTURER_BOOST).min(MANUFACTURER_BOOST_CAP),
                    format!(
                        "Manufacturer ref: {reference} ({})",
                        product.record.text(ProductField::Manufacturer).unwrap_or_default()
                    ),
                )
            } else {
                (base, format!("Manufacturer ref: {reference}"))
            };
            found.push(product, MatchType::ManufacturerRef, score, explanation);
        }
        Ok(())
    }

    fn match_fuzzy_name(
        &self,
        query: &ProductRecord,
        max_results: usize,
        found: &mut Candidates,
    ) -> Result<()> {
        let Some(name) = query.text(ProductField::Name) else {
            return Ok(());
        };
        let normalized = normalize_text(name);
        let tokens = name_tokens(&normalized);
        if tokens.is_empty() {
            return Ok(());
        }

        let filter = Filter::contains_any(ProductField::Name, tokens);
        let products = self.store.find(&filter, self.config.fuzzy_scan_limit)?;

        let mut scored: Vec<(&StoredProduct, &str, f64)> = products
            .iter()
            .filter(|p| !found.contains(&p.id))
            .filter_map(|p| {
                let candidate = p.record.text(ProductField::Name)?;
                let sim = similarity(self.config.similarity, &normalized, &normalize_text(candidate));
                (sim >= self.config.fuzzy_min_threshold).then_some((p, candidate, sim))
            })
            .collect();
        scored.sort_by(|a, b| b.2.total_cmp(&a.2));
        scored.truncate(self.config.fuzzy_keep);
        debug!(
            scanned = products.len(),
            kept = scored.len(),
            "fuzzy name matcher"
        );

        for (product, candidate, sim) in scored {
            if found.len() >= max_results {
                break;
            }
            let Some(match_type) = fuzzy_bucket(sim, &self.config) else {
                continue;
            };
            found.push(
                product,
                match_type,
                match_type.base_score(),
                format!(
                    "Name similar ({:.0}%): {}",
                    sim * 100.0,
                    truncate_chars(candidate, EXPLANATION_NAME_CHARS)
                ),
            );
        }
        Ok(())
    }

    fn match_partial_code(
        &self,
        query: &ProductRecord,
        max_results: usize,
        found: &mut Candidates,
    ) -> Result<()> {
        let Some(code) = query.text(ProductField::DefaultCode) else {
            return Ok(());
        };
        let parts = code_parts(code);
        if parts.is_empty() {
            return Ok(());
        }

        let filter = Filter::contains_any(ProductField::DefaultCode, parts);
        let products = self.store.find(&filter, self.config.partial_scan_limit)?;

        let candidates: Vec<&StoredProduct> = products
            .iter()
            .filter(|p| !found.contains(&p.id))
            .filter(|p| p.record.text(ProductField::DefaultCode) != Some(code))
            .take(self.config.partial_keep)
            .collect();
        debug!(
            scanned = products.len(),
            kept = candidates.len(),
            "partial code matcher"
        );

        for product in candidates {
            if found.len() >= max_results {
                break;
            }
            let other = product.record.text(ProductField::DefaultCode).unwrap_or_default();
            found.push(
                product,
                MatchType::PartialCode,
                MatchType::PartialCode.base_score(),
                format!("Partial code: {other}"),
            );
        }
        Ok(())
    }
}
