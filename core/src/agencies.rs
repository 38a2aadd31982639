//! Agency listing
//!
//! Reloads the canonical listing through the retry wrapper, then runs the
//! search / sort / paginate pass the directory pages show.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{DefaultOnNull, serde_as};

use crate::backend::{Backend, BackendError, Filter, FilterOp, Order, Row};
use crate::retry::{self, CircuitBreaker, RetryConfig};

pub const DEFAULT_PAGE_SIZE: usize = 12;

/// A listed agency. Absent or `null` columns read as their default.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agency {
    pub id: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    pub name: String,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub location: String,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub description: String,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub contact_email: String,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub trust_score: f64,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_hours: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Agency {
    fn from_row(row: Row) -> Option<Agency> {
        match serde_json::from_value(Value::Object(row)) {
            Ok(agency) => Some(agency),
            Err(err) => {
                tracing::warn!(error = %err, "skipping malformed agency row");
                None
            }
        }
    }

    fn matches_search(&self, needle: &str) -> bool {
        [&self.name, &self.location, &self.description]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AgencySort {
    #[default]
    Newest,
    Name,
    /// Highest trust score first
    TrustScore,
    PriceLow,
    PriceHigh,
}

impl AgencySort {
    pub fn as_str(self) -> &'static str {
        match self {
            AgencySort::Newest => "newest",
            AgencySort::Name => "name",
            AgencySort::TrustScore => "trust_score",
            AgencySort::PriceLow => "price_low",
            AgencySort::PriceHigh => "price_high",
        }
    }

    fn compare(self, a: &Agency, b: &Agency) -> Ordering {
        match self {
            AgencySort::Newest => b.created_at.cmp(&a.created_at),
            AgencySort::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            AgencySort::TrustScore => b.trust_score.total_cmp(&a.trust_score),
            AgencySort::PriceLow => a.price.total_cmp(&b.price),
            AgencySort::PriceHigh => b.price.total_cmp(&a.price),
        }
    }
}

impl fmt::Display for AgencySort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgencySort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" => Ok(AgencySort::Newest),
            "name" => Ok(AgencySort::Name),
            "trust_score" | "trust" | "rating" => Ok(AgencySort::TrustScore),
            "price_low" => Ok(AgencySort::PriceLow),
            "price_high" => Ok(AgencySort::PriceHigh),
            other => Err(format!(
                "unknown sort '{other}' (expected newest, name, trust_score, price_low, price_high)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgencyQuery {
    /// Case-insensitive substring over name, location and description
    pub search: Option<String>,
    pub location: Option<String>,
    pub min_trust_score: Option<f64>,
    pub max_price: Option<f64>,
    pub owner_id: Option<String>,
    pub sort: AgencySort,
    /// 1-based
    pub page: usize,
    pub page_size: usize,
}

impl Default for AgencyQuery {
    fn default() -> Self {
        Self {
            search: None,
            location: None,
            min_trust_score: None,
            max_price: None,
            owner_id: None,
            sort: AgencySort::default(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl AgencyQuery {
    fn server_filter(&self) -> Filter {
        let mut filter = Filter::new();
        if let Some(location) = self.location.as_deref().filter(|l| !l.trim().is_empty()) {
            filter = filter.with("location", FilterOp::ILike, format!("*{}*", location.trim()));
        }
        if let Some(owner) = &self.owner_id {
            filter = filter.eq("owner_id", owner.as_str());
        }
        if let Some(min) = self.min_trust_score {
            filter = filter.with("trust_score", FilterOp::Gte, min);
        }
        if let Some(max) = self.max_price {
            filter = filter.with("price", FilterOp::Lte, max);
        }
        filter
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgencyPage {
    pub items: Vec<Agency>,
    /// Matches across all pages
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

/// Fetch, filter, sort and paginate the listing.
pub async fn list_agencies(
    backend: &dyn Backend,
    collection: &str,
    breaker: &CircuitBreaker,
    config: &RetryConfig,
    query: &AgencyQuery,
) -> retry::Result<AgencyPage, BackendError> {
    let filter = query.server_filter();
    let order = [Order::desc("created_at")];

    let rows = retry::execute_with_retry(
        || backend.query(collection, &filter, &order),
        config,
        breaker,
    )
    .await?;

    let mut agencies: Vec<Agency> = rows.into_iter().filter_map(Agency::from_row).collect();

    if let Some(needle) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let needle = needle.to_lowercase();
        agencies.retain(|a| a.matches_search(&needle));
    }
    agencies.sort_by(|a, b| query.sort.compare(a, b));

    Ok(paginate(agencies, query.page, query.page_size))
}

fn paginate(agencies: Vec<Agency>, page: usize, page_size: usize) -> AgencyPage {
    let page_size = page_size.max(1);
    let page = page.max(1);
    let total = agencies.len();
    let total_pages = total.div_ceil(page_size);

    let items = agencies
        .into_iter()
        .skip((page - 1).saturating_mul(page_size))
        .take(page_size)
        .collect();

    AgencyPage {
        items,
        total,
        page,
        page_size,
        total_pages,
    }
}
