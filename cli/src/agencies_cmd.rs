use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use edudir_core::agencies::{AgencyPage, AgencyQuery, AgencySort, DEFAULT_PAGE_SIZE, list_agencies};
use edudir_core::backend;
use edudir_core::config::AppConfig;

#[derive(Debug, Parser)]
pub struct AgenciesArgs {
    /// Match name, location or description.
    #[arg(long = "search", short = 's')]
    pub search: Option<String>,

    #[arg(long = "location")]
    pub location: Option<String>,

    /// Minimum trust score (0-100).
    #[arg(long = "min-trust")]
    pub min_trust: Option<f64>,

    #[arg(long = "max-price")]
    pub max_price: Option<f64>,

    #[arg(long = "owner")]
    pub owner: Option<String>,

    /// newest, name, trust_score, price_low or price_high.
    #[arg(long = "sort", default_value = "newest")]
    pub sort: AgencySort,

    #[arg(long = "page", default_value_t = 1)]
    pub page: usize,

    #[arg(long = "page-size", default_value_t = DEFAULT_PAGE_SIZE)]
    pub page_size: usize,

    /// Output as JSON.
    #[arg(long = "json", short = 'j')]
    pub json: bool,
}

impl AgenciesArgs {
    fn to_query(&self) -> AgencyQuery {
        AgencyQuery {
            search: self.search.clone(),
            location: self.location.clone(),
            min_trust_score: self.min_trust,
            max_price: self.max_price,
            owner_id: self.owner.clone(),
            sort: self.sort,
            page: self.page,
            page_size: self.page_size,
        }
    }
}

pub async fn run_agencies(args: &AgenciesArgs, config: &AppConfig) -> anyhow::Result<ExitCode> {
    let backend = backend::from_settings(&config.backend).context("connecting to backend")?;
    let breaker = config.retry.build_breaker();

    let page = match list_agencies(
        backend.as_ref(),
        &config.import.collection,
        &breaker,
        &config.retry.to_retry_config(),
        &args.to_query(),
    )
    .await
    {
        Ok(page) => page,
        Err(err) => {
            tracing::error!(error = %err, "listing failed");
            eprintln!("{}", err.user_message());
            return Ok(ExitCode::FAILURE);
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&page)?);
    } else {
        print_table(&page);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_table(page: &AgencyPage) {
    if page.items.is_empty() {
        println!("No agencies found");
        return;
    }
    println!("{:<36} {:<28} {:<16} {:>5} {:>10}", "ID", "NAME", "LOCATION", "TRUST", "PRICE");
    for agency in &page.items {
        println!(
            "{:<36} {:<28} {:<16} {:>5.0} {:>10.2}",
            agency.id,
            truncate(&agency.name, 28),
            truncate(&agency.location, 16),
            agency.trust_score,
            agency.price
        );
    }
    println!(
        "page {}/{} ({} total)",
        page.page,
        page.total_pages.max(1),
        page.total
    );
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}
